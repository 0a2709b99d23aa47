use crate::core::message::next_counter_after;
use serde::{Deserialize, Serialize};

/// A generation result as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputItem {
    pub id: String,
    #[serde(rename = "imageRef", default)]
    pub image_ref: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub loading: bool,
}

/// Changes applied to an output in one step.
#[derive(Debug, Clone, Default)]
pub struct OutputUpdate {
    pub image_ref: Option<Option<String>>,
    pub text: Option<String>,
    pub loading: Option<bool>,
}

impl OutputUpdate {
    /// Streaming progress: new text, still loading.
    pub fn progress(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// Terminal state: replaces image and text and clears `loading`.
    pub fn finished(image_ref: Option<String>, text: impl Into<String>) -> Self {
        Self {
            image_ref: Some(image_ref),
            text: Some(text.into()),
            loading: Some(false),
        }
    }

    fn apply(self, item: &mut OutputItem) {
        if let Some(image_ref) = self.image_ref {
            item.image_ref = image_ref;
        }
        if let Some(text) = self.text {
            item.text = text;
        }
        if let Some(loading) = self.loading {
            item.loading = loading;
        }
    }
}

/// Generation results, most recent first.
#[derive(Debug, Clone, Default)]
pub struct OutputList {
    items: Vec<OutputItem>,
    next_id: u64,
}

impl OutputList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a list from persisted outputs, discarding any that were still
    /// loading when they were written.
    pub fn from_items(items: Vec<OutputItem>) -> Self {
        let next_id = next_counter_after(items.iter().map(|item| item.id.as_str()));
        let items = items.into_iter().filter(|item| !item.loading).collect();
        Self { items, next_id }
    }

    pub fn items(&self) -> &[OutputItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&OutputItem> {
        self.items.iter().find(|item| item.id == id)
    }

    /// Inserts a loading output at the front and returns its id.
    pub fn create(&mut self, image_ref: Option<String>, text: impl Into<String>) -> String {
        let id = self.next_id.to_string();
        self.next_id += 1;
        self.items.insert(
            0,
            OutputItem {
                id: id.clone(),
                image_ref,
                text: text.into(),
                loading: true,
            },
        );
        id
    }

    /// Applies `update` to the output with `id`. Returns false when the output
    /// has been removed in the meantime.
    pub fn update(&mut self, id: &str, update: OutputUpdate) -> bool {
        match self.items.iter_mut().find(|item| item.id == id) {
            Some(item) => {
                update.apply(item);
                true
            }
            None => false,
        }
    }

    pub fn delete(&mut self, id: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|item| item.id != id);
        self.items.len() != before
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Outputs worth persisting: everything that is no longer loading.
    pub fn settled(&self) -> Vec<OutputItem> {
        self.items
            .iter()
            .filter(|item| !item.loading)
            .cloned()
            .collect()
    }
}

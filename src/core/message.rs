use crate::core::blob::{is_image_mime, ImagePayload};
use serde::{Deserialize, Serialize};

/// One composable entry of the prompt: text plus an optional image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageItem {
    pub id: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub image: Option<ImagePayload>,
}

impl MessageItem {
    fn empty(id: String) -> Self {
        Self {
            id,
            text: String::new(),
            image: None,
        }
    }

    /// True when the item would contribute nothing to a request.
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty() && self.image.is_none()
    }
}

/// Where a dragged item lands relative to its drop target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropPosition {
    Before,
    After,
}

impl DropPosition {
    pub fn from_insert_before(insert_before: bool) -> Self {
        if insert_before {
            DropPosition::Before
        } else {
            DropPosition::After
        }
    }
}

/// Ordered message items with a private, never-decreasing id counter.
#[derive(Debug, Clone, Default)]
pub struct MessageList {
    items: Vec<MessageItem>,
    next_id: u64,
}

impl MessageList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a list from persisted items. The counter resumes past the
    /// largest numeric id so restored ids are never handed out again.
    pub fn from_items(items: Vec<MessageItem>) -> Self {
        let next_id = next_counter_after(items.iter().map(|item| item.id.as_str()));
        Self { items, next_id }
    }

    pub fn items(&self) -> &[MessageItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&MessageItem> {
        self.items.iter().find(|item| item.id == id)
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut MessageItem> {
        self.items.iter_mut().find(|item| item.id == id)
    }

    /// Appends an empty item and returns its freshly assigned id.
    pub fn add(&mut self) -> String {
        let id = self.next_id.to_string();
        self.next_id += 1;
        self.items.push(MessageItem::empty(id.clone()));
        id
    }

    /// Appends an item built from `text` and `image` in one step. Used when
    /// staging template entries.
    pub fn push(&mut self, text: String, image: Option<ImagePayload>) -> String {
        let id = self.add();
        if let Some(item) = self.items.last_mut() {
            item.text = text;
            item.image = image;
        }
        id
    }

    pub fn delete(&mut self, id: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|item| item.id != id);
        self.items.len() != before
    }

    /// Drops every item. The id counter is left untouched.
    pub fn delete_all(&mut self) {
        self.items.clear();
    }

    pub fn update_text(&mut self, id: &str, text: impl Into<String>) -> bool {
        match self.get_mut(id) {
            Some(item) => {
                item.text = text.into();
                true
            }
            None => false,
        }
    }

    /// Replaces the item's image wholesale. Rejected when the declared MIME
    /// type is not an image type.
    pub fn update_image(&mut self, id: &str, raw_data: Vec<u8>, mime_type: &str) -> bool {
        if !is_image_mime(mime_type) {
            return false;
        }
        match self.get_mut(id) {
            Some(item) => {
                item.image = Some(ImagePayload::new(raw_data, mime_type));
                true
            }
            None => false,
        }
    }

    pub fn remove_image(&mut self, id: &str) -> bool {
        match self.get_mut(id) {
            Some(item) => item.image.take().is_some(),
            None => false,
        }
    }

    pub fn reorder(&mut self, dragged_id: &str, target_id: &str, position: DropPosition) -> bool {
        reorder_items(&mut self.items, dragged_id, target_id, position)
    }
}

/// Moves `dragged_id` next to `target_id`.
///
/// The target index is looked up after the dragged item has been removed, so a
/// forward drag lands one slot earlier than the target's original index.
/// Unknown ids and self-drops leave the list unchanged.
pub fn reorder_items(
    items: &mut Vec<MessageItem>,
    dragged_id: &str,
    target_id: &str,
    position: DropPosition,
) -> bool {
    if dragged_id == target_id {
        return false;
    }
    let Some(from) = items.iter().position(|item| item.id == dragged_id) else {
        return false;
    };
    if !items.iter().any(|item| item.id == target_id) {
        return false;
    }

    let dragged = items.remove(from);
    let Some(target) = items.iter().position(|item| item.id == target_id) else {
        items.insert(from, dragged);
        return false;
    };
    let insert_at = match position {
        DropPosition::Before => target,
        DropPosition::After => target + 1,
    };
    items.insert(insert_at, dragged);
    insert_at != from
}

/// First counter value strictly greater than every numeric id in `ids`.
pub(crate) fn next_counter_after<'a>(ids: impl Iterator<Item = &'a str>) -> u64 {
    ids.filter_map(|id| id.parse::<u64>().ok())
        .max()
        .map(|max| max + 1)
        .unwrap_or(0)
}

//! The prompt-building session.
//!
//! [`Studio`] owns the message list, the output list, the credential and the
//! system message. Every mutation is written through to the key-value store
//! and followed by a full redraw of the render sink. Generation flows live in
//! [`generation`], template loading in [`template`].

pub mod generation;
pub mod template;


use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

use crate::core::constants::{DEFAULT_IMAGE_MODEL, DEFAULT_TEXT_MODEL};
use crate::core::gen_stream::GenerativeService;
use crate::core::message::{DropPosition, MessageItem, MessageList};
use crate::core::output::{OutputItem, OutputList, OutputUpdate};
use crate::core::store::{
    KeyValueStore, KEY_API_KEY, KEY_MESSAGES, KEY_OUTPUTS, KEY_SYSTEM_MESSAGE,
};

pub use generation::ValidationError;
pub use template::{BlobFetcher, DefaultBlobFetcher, FetchedBlob, Template, TemplateError};

/// What the render sink gets to look at after each mutation.
pub struct StudioView<'a> {
    pub messages: &'a [MessageItem],
    pub outputs: &'a [OutputItem],
    pub system_message: &'a str,
}

/// Redraw callback. Invoked while the studio state is locked, so
/// implementations must not call back into the [`Studio`].
pub trait RenderSink: Send + Sync {
    fn redraw(&self, view: &StudioView<'_>);
}

/// Sink for headless sessions.
pub struct NullSink;

impl RenderSink for NullSink {
    fn redraw(&self, _view: &StudioView<'_>) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub image_model: String,
    pub text_model: String,
}

impl Default for ModelSelection {
    fn default() -> Self {
        Self {
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            text_model: DEFAULT_TEXT_MODEL.to_string(),
        }
    }
}

pub struct StudioParams {
    pub store: Arc<dyn KeyValueStore>,
    pub service: Arc<dyn GenerativeService>,
    pub fetcher: Arc<dyn BlobFetcher>,
    pub sink: Arc<dyn RenderSink>,
    pub models: ModelSelection,
}

#[derive(Default)]
struct StudioState {
    messages: MessageList,
    outputs: OutputList,
    system_message: String,
    api_key: String,
}

pub struct Studio {
    state: Mutex<StudioState>,
    store: Arc<dyn KeyValueStore>,
    service: Arc<dyn GenerativeService>,
    fetcher: Arc<dyn BlobFetcher>,
    sink: Arc<dyn RenderSink>,
    models: ModelSelection,
}

impl Studio {
    /// Starts an empty session. Nothing is read from the store.
    pub fn new(params: StudioParams) -> Self {
        Self::with_state(params, StudioState::default())
    }

    /// Starts a session from whatever the store holds. Unreadable keys are
    /// logged and treated as absent.
    pub fn restore(params: StudioParams) -> Self {
        let store = params.store.as_ref();
        let api_key = read_key::<String>(store, KEY_API_KEY).unwrap_or_default();
        let system_message = read_key::<String>(store, KEY_SYSTEM_MESSAGE).unwrap_or_default();
        let messages = read_key::<Vec<MessageItem>>(store, KEY_MESSAGES).unwrap_or_default();
        let outputs = read_key::<Vec<OutputItem>>(store, KEY_OUTPUTS).unwrap_or_default();
        debug!(
            messages = messages.len(),
            outputs = outputs.len(),
            "restored studio state"
        );

        let studio = Self::with_state(
            params,
            StudioState {
                messages: MessageList::from_items(messages),
                outputs: OutputList::from_items(outputs),
                system_message,
                api_key,
            },
        );
        studio.redraw(&studio.lock());
        studio
    }

    fn with_state(params: StudioParams, state: StudioState) -> Self {
        let StudioParams {
            store,
            service,
            fetcher,
            sink,
            models,
        } = params;
        Self {
            state: Mutex::new(state),
            store,
            service,
            fetcher,
            sink,
            models,
        }
    }

    fn lock(&self) -> MutexGuard<'_, StudioState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn models(&self) -> &ModelSelection {
        &self.models
    }

    pub fn api_key(&self) -> String {
        self.lock().api_key.clone()
    }

    pub fn set_api_key(&self, api_key: impl Into<String>) {
        let mut state = self.lock();
        state.api_key = api_key.into();
        self.persist(KEY_API_KEY, Value::String(state.api_key.clone()));
    }

    pub fn system_message(&self) -> String {
        self.lock().system_message.clone()
    }

    pub fn set_system_message(&self, text: impl Into<String>) {
        let mut state = self.lock();
        state.system_message = text.into();
        self.persist(KEY_SYSTEM_MESSAGE, Value::String(state.system_message.clone()));
        self.redraw(&state);
    }

    pub fn messages(&self) -> Vec<MessageItem> {
        self.lock().messages.items().to_vec()
    }

    pub fn message(&self, id: &str) -> Option<MessageItem> {
        self.lock().messages.get(id).cloned()
    }

    pub fn outputs(&self) -> Vec<OutputItem> {
        self.lock().outputs.items().to_vec()
    }

    pub fn output(&self, id: &str) -> Option<OutputItem> {
        self.lock().outputs.get(id).cloned()
    }

    pub fn add_message(&self) -> String {
        let mut id = String::new();
        self.mutate_messages(|messages| {
            id = messages.add();
            true
        });
        id
    }

    pub fn delete_message(&self, id: &str) -> bool {
        self.mutate_messages(|messages| messages.delete(id))
    }

    pub fn delete_all_messages(&self) {
        self.mutate_messages(|messages| {
            messages.delete_all();
            true
        });
    }

    pub fn update_message_text(&self, id: &str, text: impl Into<String>) -> bool {
        let text = text.into();
        self.mutate_messages(|messages| messages.update_text(id, text))
    }

    /// Attaches an image. Returns false (and changes nothing) when the
    /// declared type is not an image type or the item does not exist.
    pub fn update_message_image(&self, id: &str, raw_data: Vec<u8>, mime_type: &str) -> bool {
        let accepted = self.mutate_messages(|messages| messages.update_image(id, raw_data, mime_type));
        if !accepted {
            debug!(%id, %mime_type, "image attachment rejected");
        }
        accepted
    }

    pub fn remove_message_image(&self, id: &str) -> bool {
        self.mutate_messages(|messages| messages.remove_image(id))
    }

    pub fn reorder_messages(&self, dragged_id: &str, target_id: &str, insert_before: bool) -> bool {
        let position = DropPosition::from_insert_before(insert_before);
        self.mutate_messages(|messages| messages.reorder(dragged_id, target_id, position))
    }

    pub fn delete_output(&self, id: &str) -> bool {
        let mut state = self.lock();
        let removed = state.outputs.delete(id);
        if removed {
            self.persist_outputs(&state);
            self.redraw(&state);
        }
        removed
    }

    pub fn clear_outputs(&self) {
        let mut state = self.lock();
        state.outputs.clear();
        self.persist_outputs(&state);
        self.redraw(&state);
    }

    /// Runs `op` on the message list; when it reports a change the list is
    /// persisted and the sink redrawn.
    fn mutate_messages(&self, op: impl FnOnce(&mut MessageList) -> bool) -> bool {
        let mut state = self.lock();
        let changed = op(&mut state.messages);
        if changed {
            self.persist_messages(&state);
            self.redraw(&state);
        }
        changed
    }

    fn update_output(&self, id: &str, update: OutputUpdate) {
        let mut state = self.lock();
        let terminal = update.loading == Some(false);
        if !state.outputs.update(id, update) {
            debug!(%id, "output removed before update");
            return;
        }
        if terminal {
            self.persist_outputs(&state);
        }
        self.redraw(&state);
    }

    fn persist_messages(&self, state: &StudioState) {
        match serde_json::to_value(state.messages.items()) {
            Ok(value) => self.persist(KEY_MESSAGES, value),
            Err(err) => warn!(error = %err, "failed to encode messages"),
        }
    }

    fn persist_outputs(&self, state: &StudioState) {
        match serde_json::to_value(state.outputs.settled()) {
            Ok(value) => self.persist(KEY_OUTPUTS, value),
            Err(err) => warn!(error = %err, "failed to encode outputs"),
        }
    }

    fn persist(&self, key: &str, value: Value) {
        if let Err(err) = self.store.set(key, value) {
            warn!(%key, error = %err, "failed to persist state");
        }
    }

    fn redraw(&self, state: &StudioState) {
        self.sink.redraw(&StudioView {
            messages: state.messages.items(),
            outputs: state.outputs.items(),
            system_message: &state.system_message,
        });
    }
}

fn read_key<T: serde::de::DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Option<T> {
    match store.get(key) {
        Ok(Some(value)) => match serde_json::from_value(value) {
            Ok(parsed) => Some(parsed),
            Err(err) => {
                warn!(%key, error = %err, "ignoring unreadable stored value");
                None
            }
        },
        Ok(None) => None,
        Err(err) => {
            warn!(%key, error = %err, "failed to read stored value");
            None
        }
    }
}

//! End-to-end generation requests.
//!
//! Each call creates its own output, snapshots the message list into a
//! request, consumes the response stream and settles the output exactly once.
//! Transport and API failures end up in the output text; only validation
//! problems reach the caller.

use futures_util::StreamExt;
use std::fmt;
use tracing::{debug, info, warn};

use super::Studio;
use crate::api::{GenerateContentRequest, Part};
use crate::core::blob::data_url_from_base64;
use crate::core::constants::{
    GENERATING_TEXT, IMAGE_SUCCESS_TEXT, NO_IMAGE_TEXT, NO_TEXT_TEXT, PLACEHOLDER_IMAGE_REF,
};
use crate::core::gen_stream::ApiError;
use crate::core::output::OutputUpdate;
use crate::core::serializer::{build_request, GenerationMode};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    MissingCredential,
    /// No system message and no message items.
    EmptyRequest,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::MissingCredential => write!(f, "Please enter an API key first."),
            ValidationError::EmptyRequest => write!(
                f,
                "Add a system message or at least one message before generating."
            ),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Everything an image stream produced, in arrival order.
#[derive(Debug, Default)]
struct ImageHarvest {
    images: Vec<String>,
    text: String,
}

impl ImageHarvest {
    fn absorb(&mut self, parts: &[Part]) {
        for part in parts {
            match part {
                Part::Text { text } => self.text.push_str(text),
                Part::InlineData { inline_data } => self.images.push(data_url_from_base64(
                    &inline_data.mime_type,
                    &inline_data.data,
                )),
                Part::Other(_) => {}
            }
        }
    }

    fn into_update(self) -> OutputUpdate {
        let has_text = !self.text.trim().is_empty();
        match self.images.into_iter().next() {
            Some(first) => {
                let text = if has_text {
                    self.text
                } else {
                    IMAGE_SUCCESS_TEXT.to_string()
                };
                OutputUpdate::finished(Some(first), text)
            }
            None => {
                let text = if has_text {
                    self.text
                } else {
                    NO_IMAGE_TEXT.to_string()
                };
                OutputUpdate::finished(Some(PLACEHOLDER_IMAGE_REF.to_string()), text)
            }
        }
    }
}

/// Output text for a failed request. API errors already carry their label.
fn failure_text(err: &ApiError) -> String {
    match err {
        ApiError::Api(detail) => detail.clone(),
        other => format!("Error: {other}"),
    }
}

impl Studio {
    fn validate(&self, credential: &str, system_text: &str) -> Result<(), ValidationError> {
        if credential.trim().is_empty() {
            return Err(ValidationError::MissingCredential);
        }
        if system_text.trim().is_empty() && self.lock().messages.is_empty() {
            return Err(ValidationError::EmptyRequest);
        }
        Ok(())
    }

    /// Creates the pending output and serializes the current message list in
    /// one critical section, so the request reflects the list as it was when
    /// the user asked.
    fn begin(
        &self,
        mode: GenerationMode,
        placeholder: Option<String>,
        system_text: &str,
    ) -> (String, GenerateContentRequest) {
        let (output_id, request) = {
            let mut state = self.lock();
            let request = build_request(mode, state.messages.items(), Some(system_text));
            let output_id = state.outputs.create(placeholder, GENERATING_TEXT);
            self.redraw(&state);
            (output_id, request)
        };
        debug!(
            mode = mode.label(),
            %output_id,
            parts = request.user_parts().len(),
            "generation started"
        );
        (output_id, request)
    }

    /// Generates an image from the current messages. Returns the id of the
    /// output that carries the result.
    pub async fn run_image_generation(
        &self,
        credential: &str,
        system_text: &str,
    ) -> Result<String, ValidationError> {
        self.validate(credential, system_text)?;
        let (output_id, request) = self.begin(
            GenerationMode::Image,
            Some(PLACEHOLDER_IMAGE_REF.to_string()),
            system_text,
        );

        let update = match self.harvest_images(credential, request).await {
            Ok(harvest) => {
                info!(
                    %output_id,
                    images = harvest.images.len(),
                    "image generation finished"
                );
                harvest.into_update()
            }
            Err(err) => {
                warn!(%output_id, error = %err, "image generation failed");
                OutputUpdate::finished(Some(PLACEHOLDER_IMAGE_REF.to_string()), failure_text(&err))
            }
        };
        self.update_output(&output_id, update);
        Ok(output_id)
    }

    /// The output is left untouched until the stream has ended.
    async fn harvest_images(
        &self,
        credential: &str,
        request: GenerateContentRequest,
    ) -> Result<ImageHarvest, ApiError> {
        let mut stream = self
            .service
            .submit_stream(credential, &self.models.image_model, request)
            .await?;
        let mut harvest = ImageHarvest::default();
        while let Some(chunk) = stream.next().await {
            harvest.absorb(chunk?.parts());
        }
        Ok(harvest)
    }

    /// Generates text from the current messages, updating the output as each
    /// chunk arrives. Returns the output id.
    pub async fn run_text_generation(
        &self,
        credential: &str,
        system_text: &str,
    ) -> Result<String, ValidationError> {
        self.validate(credential, system_text)?;
        let (output_id, request) = self.begin(GenerationMode::Text, None, system_text);

        let update = match self.stream_text(&output_id, credential, request).await {
            Ok(text) => {
                info!(%output_id, chars = text.len(), "text generation finished");
                let text = if text.is_empty() {
                    NO_TEXT_TEXT.to_string()
                } else {
                    text
                };
                OutputUpdate::finished(None, text)
            }
            Err(err) => {
                warn!(%output_id, error = %err, "text generation failed");
                OutputUpdate::finished(None, failure_text(&err))
            }
        };
        self.update_output(&output_id, update);
        Ok(output_id)
    }

    async fn stream_text(
        &self,
        output_id: &str,
        credential: &str,
        request: GenerateContentRequest,
    ) -> Result<String, ApiError> {
        let mut stream = self
            .service
            .submit_stream(credential, &self.models.text_model, request)
            .await?;
        let mut text = String::new();
        while let Some(chunk) = stream.next().await {
            text.push_str(&chunk?.text());
            self.update_output(output_id, OutputUpdate::progress(text.clone()));
        }
        Ok(text)
    }
}

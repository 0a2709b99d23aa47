//! Turns the message list into `generateContent` request payloads.

use crate::api::{Content, GenerateContentRequest, GenerationConfig, Part, ResponseModality};
use crate::core::message::MessageItem;

/// Marker text announcing the inline image part that follows it.
pub const IMAGE_SENTINEL: &str = "See image:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationMode {
    Image,
    Text,
}

impl GenerationMode {
    /// Separator between an item's text and the image sentinel.
    ///
    /// Image requests have always used a newline and text requests a single
    /// space; both are kept so existing prompts serialize byte-for-byte the same.
    pub fn sentinel_separator(self) -> &'static str {
        match self {
            GenerationMode::Image => "\n",
            GenerationMode::Text => " ",
        }
    }

    pub fn response_modalities(self) -> Vec<ResponseModality> {
        match self {
            GenerationMode::Image => vec![ResponseModality::Image, ResponseModality::Text],
            GenerationMode::Text => vec![ResponseModality::Text],
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            GenerationMode::Image => "image",
            GenerationMode::Text => "text",
        }
    }
}

/// Serializes items in order, skipping blank ones.
pub fn message_parts(items: &[MessageItem], mode: GenerationMode) -> Vec<Part> {
    let mut parts = Vec::new();
    for item in items {
        if item.is_blank() {
            continue;
        }
        let text = item.text.trim();
        match &item.image {
            Some(image) => {
                let label = if text.is_empty() {
                    IMAGE_SENTINEL.to_string()
                } else {
                    format!("{text}{}{IMAGE_SENTINEL}", mode.sentinel_separator())
                };
                parts.push(Part::text(label));
                parts.push(Part::inline(image.mime_type(), image.to_base64()));
            }
            None => parts.push(Part::text(text)),
        }
    }
    parts
}

/// Blank system text counts as absent; anything else is sent untouched.
fn non_empty(system_text: Option<&str>) -> Option<&str> {
    system_text.filter(|text| !text.trim().is_empty())
}

/// Image requests carry the system instruction as the leading user part; the
/// image models ignore a separate system channel.
pub fn build_image_request(
    items: &[MessageItem],
    system_text: Option<&str>,
) -> GenerateContentRequest {
    let mut parts = Vec::new();
    if let Some(system) = non_empty(system_text) {
        parts.push(Part::text(system));
    }
    parts.extend(message_parts(items, GenerationMode::Image));

    GenerateContentRequest {
        contents: vec![Content::user(parts)],
        system_instruction: None,
        generation_config: GenerationConfig {
            response_modalities: GenerationMode::Image.response_modalities(),
        },
    }
}

pub fn build_text_request(
    items: &[MessageItem],
    system_text: Option<&str>,
) -> GenerateContentRequest {
    GenerateContentRequest {
        contents: vec![Content::user(message_parts(items, GenerationMode::Text))],
        system_instruction: non_empty(system_text).map(|system| Content {
            role: None,
            parts: vec![Part::text(system)],
        }),
        generation_config: GenerationConfig {
            response_modalities: GenerationMode::Text.response_modalities(),
        },
    }
}

pub fn build_request(
    mode: GenerationMode,
    items: &[MessageItem],
    system_text: Option<&str>,
) -> GenerateContentRequest {
    match mode {
        GenerationMode::Image => build_image_request(items, system_text),
        GenerationMode::Text => build_text_request(items, system_text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::blob::ImagePayload;

    fn item(id: &str, text: &str, image: Option<ImagePayload>) -> MessageItem {
        MessageItem {
            id: id.to_string(),
            text: text.to_string(),
            image,
        }
    }

    fn png() -> ImagePayload {
        ImagePayload::new(vec![0x89, 0x50, 0x4e, 0x47], "image/png")
    }

    #[test]
    fn image_mode_separates_sentinel_with_newline() {
        let parts = message_parts(&[item("0", "hi", Some(png()))], GenerationMode::Image);
        assert_eq!(
            parts,
            vec![
                Part::text("hi\nSee image:"),
                Part::inline("image/png", "iVBORw=="),
            ]
        );
    }

    #[test]
    fn text_mode_separates_sentinel_with_space() {
        let parts = message_parts(&[item("0", "hi", Some(png()))], GenerationMode::Text);
        assert_eq!(
            parts,
            vec![
                Part::text("hi See image:"),
                Part::inline("image/png", "iVBORw=="),
            ]
        );
    }

    #[test]
    fn image_without_text_emits_bare_sentinel() {
        let parts = message_parts(&[item("0", "  \n", Some(png()))], GenerationMode::Image);
        assert_eq!(parts[0], Part::text(IMAGE_SENTINEL));
        assert_eq!(parts.len(), 2);
    }

    #[test]
    fn blank_items_are_skipped_and_text_is_trimmed() {
        let items = [item("0", "   ", None), item("1", "  a  ", None)];
        assert_eq!(
            message_parts(&items, GenerationMode::Text),
            vec![Part::text("a")]
        );
        assert_eq!(
            message_parts(&items, GenerationMode::Image),
            vec![Part::text("a")]
        );
    }

    #[test]
    fn image_request_leads_with_system_text() {
        let items = [item("0", "draw a cat", None)];
        let request = build_image_request(&items, Some("house style"));

        assert!(request.system_instruction.is_none());
        assert_eq!(
            request.user_parts(),
            &[Part::text("house style"), Part::text("draw a cat")]
        );
        assert_eq!(
            request.generation_config.response_modalities,
            vec![ResponseModality::Image, ResponseModality::Text]
        );
        assert_eq!(request.contents[0].role.as_deref(), Some("user"));
    }

    #[test]
    fn text_request_moves_system_text_to_instruction() {
        let items = [item("0", "summarize", None)];
        let request = build_text_request(&items, Some("be brief"));

        assert_eq!(request.user_parts(), &[Part::text("summarize")]);
        let system = request.system_instruction.expect("system instruction");
        assert_eq!(system.parts, vec![Part::text("be brief")]);
        assert_eq!(
            request.generation_config.response_modalities,
            vec![ResponseModality::Text]
        );
    }

    #[test]
    fn blank_system_text_is_dropped_in_both_modes() {
        let items = [item("0", "x", None)];
        assert_eq!(
            build_request(GenerationMode::Image, &items, Some(" ")).user_parts(),
            &[Part::text("x")]
        );
        assert!(build_request(GenerationMode::Text, &items, Some(""))
            .system_instruction
            .is_none());
    }

    #[test]
    fn system_text_is_sent_as_given() {
        let items = [item("0", "x", None)];
        let system = "  Keep the palette warm.\n";
        assert_eq!(
            build_request(GenerationMode::Image, &items, Some(system)).user_parts()[0],
            Part::text(system)
        );
        let instruction = build_request(GenerationMode::Text, &items, Some(system))
            .system_instruction
            .expect("system instruction");
        assert_eq!(instruction.parts, vec![Part::text(system)]);
    }

    #[test]
    fn parts_follow_list_order() {
        let items = [
            item("3", "first", None),
            item("1", "", Some(png())),
            item("2", "last", None),
        ];
        let parts = message_parts(&items, GenerationMode::Image);
        let kinds: Vec<&str> = parts
            .iter()
            .map(|part| part.as_text().unwrap_or("<inline>"))
            .collect();
        assert_eq!(kinds, ["first", "See image:", "<inline>", "last"]);
    }
}

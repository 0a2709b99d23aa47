//! User-facing strings and defaults shared by the generation flows.

/// Text shown on an output while its request is in flight.
pub const GENERATING_TEXT: &str = "Generating…";

pub const IMAGE_SUCCESS_TEXT: &str = "Image successfully generated.";

pub const NO_IMAGE_TEXT: &str =
    "No image was returned. The model may have declined the request or answered with text only.";

pub const NO_TEXT_TEXT: &str = "No text was returned by the model.";

/// Grey square shown while an image is pending and when none came back.
pub const PLACEHOLDER_IMAGE_REF: &str = "data:image/svg+xml;base64,PHN2ZyB4bWxucz0iaHR0cDovL3d3dy53My5vcmcvMjAwMC9zdmciIHdpZHRoPSIyNTYiIGhlaWdodD0iMjU2Ij48cmVjdCB3aWR0aD0iMTAwJSIgaGVpZ2h0PSIxMDAlIiBmaWxsPSIjZGRkIi8+PC9zdmc+";

pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image-preview";
pub const DEFAULT_TEXT_MODEL: &str = "gemini-2.5-flash";

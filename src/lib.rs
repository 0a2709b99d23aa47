//! Promptdeck composes multimodal prompts and sends them to Gemini models.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns the prompt session: the message and output lists, request
//!   serialization, the streaming client, persistence, templates and config.
//! - [`api`] defines the `generateContent` payloads exchanged with the service.
//! - [`cli`] parses command-line arguments and renders streamed results.
//! - [`logging`] installs the `tracing` subscriber for the binary.
//! - [`utils`] holds small helpers such as MIME guessing.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`].

pub mod api;
pub mod cli;
pub mod core;
pub mod logging;
pub mod utils;

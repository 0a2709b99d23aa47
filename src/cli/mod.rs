//! Command-line interface parsing and handling
//!
//! Every invocation opens the session stored under the state directory, runs
//! one command against it and exits. Generation commands stream their output
//! to stdout as it arrives.

pub mod images;
pub mod render;


use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::debug;

use crate::cli::images::save_output_image;
use crate::cli::render::TerminalSink;
use crate::core::builtin_templates::{find_builtin_template, load_builtin_templates};
use crate::core::config::{Config, ConfigKey};
use crate::core::constants::PLACEHOLDER_IMAGE_REF;
use crate::core::gen_stream::GeminiClient;
use crate::core::message::MessageItem;
use crate::core::output::OutputItem;
use crate::core::store::{FileStore, DEFAULT_TABLE};
use crate::core::studio::{DefaultBlobFetcher, RenderSink, Studio, StudioParams, Template};
use crate::utils::mime::mime_for_path;

/// Fallback credential when none has been stored with `promptdeck key`.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

#[derive(Parser)]
#[command(name = "promptdeck")]
#[command(about = "Compose multimodal prompts and generate images or text with Gemini")]
#[command(
    long_about = "Promptdeck keeps an ordered deck of prompt messages (text plus an optional \
image) and a system message, and sends them to a Gemini model to generate images or text. \
The deck and the results persist between invocations.\n\n\
Typical session:\n\
  promptdeck key <API_KEY>\n\
  promptdeck system \"You are a product photographer.\"\n\
  promptdeck add \"A ceramic mug on a wooden table\"\n\
  promptdeck attach 0 reference.jpg\n\
  promptdeck image\n\
  promptdeck save-image <OUTPUT_ID>\n\n\
Environment Variables:\n\
  GEMINI_API_KEY    Used when no key has been stored\n\
  PROMPTDECK_LOG    Log filter, e.g. promptdeck=debug (default: warn)"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Write diagnostic logs to this file instead of stderr
    #[arg(short = 'l', long, global = true)]
    pub log: Option<PathBuf>,

    /// Use this directory for the session instead of the configured one
    #[arg(long, global = true, value_name = "DIR")]
    pub state_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Store the API key used for generation
    Key {
        /// API key; omit to show whether one is stored
        key: Option<String>,
    },
    /// Set the system message, or print it when no text is given
    System {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        text: Vec<String>,
    },
    /// Append a message and print its id
    Add {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        text: Vec<String>,
    },
    /// Replace the text of a message
    Edit {
        id: String,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        text: Vec<String>,
    },
    /// Attach an image file to a message, replacing any previous image
    Attach {
        id: String,
        /// Image file to attach
        #[arg(required_unless_present = "remove")]
        path: Option<PathBuf>,
        /// MIME type to use instead of guessing from the extension
        #[arg(long)]
        mime: Option<String>,
        /// Remove the message's image instead
        #[arg(long, conflicts_with = "path")]
        remove: bool,
    },
    /// Move a message next to another one
    Move {
        id: String,
        target: String,
        /// Place before the target instead of after it
        #[arg(long)]
        before: bool,
    },
    /// Delete a message
    Rm { id: String },
    /// Delete all messages
    Clear,
    /// Show the system message and all messages
    List,
    /// Replace the messages with a template (built-in id or JSON file)
    Template { source: String },
    /// List built-in templates
    Templates,
    /// Generate an image from the current messages
    Image,
    /// Generate text from the current messages
    Text,
    /// List generated outputs, newest first
    Outputs {
        /// Delete one output
        #[arg(long, value_name = "ID", conflicts_with = "clear")]
        delete: Option<String>,
        /// Delete all outputs
        #[arg(long)]
        clear: bool,
    },
    /// Write an output's image to disk
    SaveImage {
        id: String,
        /// Target directory (defaults to the current directory)
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Set configuration values, or print them when no key is given
    Set {
        key: Option<String>,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        value: Vec<String>,
    },
    /// Unset configuration values
    Unset { key: String },
}

pub fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    crate::logging::init_tracing(args.log.as_deref())?;
    tokio::runtime::Runtime::new()?.block_on(async_main(args))
}

async fn async_main(args: Args) -> Result<(), Box<dyn Error>> {
    let config_path = Config::get_config_path()?;
    match args.command {
        Commands::Set { key, value } => set_config(&config_path, key, value),
        Commands::Unset { key } => {
            let key: ConfigKey = key.parse()?;
            Config::update_at(&config_path, |config| config.unset(key))?;
            println!("✅ Unset {key}");
            Ok(())
        }
        command => {
            let config = Config::load_from_path(&config_path)?;
            let state_dir = match args.state_dir {
                Some(dir) => dir,
                None => config.resolve_state_dir()?,
            };
            let studio = open_studio(&config, &state_dir, Arc::new(TerminalSink::stdout()))?;
            run_session_command(&studio, command).await
        }
    }
}

fn set_config(config_path: &Path, key: Option<String>, value: Vec<String>) -> Result<(), Box<dyn Error>> {
    let Some(key) = key else {
        Config::load_from_path(config_path)?.print_all();
        return Ok(());
    };
    let key: ConfigKey = key.parse()?;
    let value = value.join(" ");
    if value.trim().is_empty() {
        return Err(format!("Missing value for {key}").into());
    }
    Config::update_at(config_path, |config| config.set(key, &value))?;
    println!("✅ Set {key} to: {}", value.trim());
    Ok(())
}

pub fn open_studio(
    config: &Config,
    state_dir: &Path,
    sink: Arc<dyn RenderSink>,
) -> Result<Studio, Box<dyn Error>> {
    let store = FileStore::open(state_dir, DEFAULT_TABLE);
    debug!(path = %store.path().display(), "opened session store");
    let client = reqwest::Client::new();
    Ok(Studio::restore(StudioParams {
        store: Arc::new(store),
        service: Arc::new(GeminiClient::new(client.clone(), config.api_base_url())),
        fetcher: Arc::new(DefaultBlobFetcher::new(client)),
        sink,
        models: config.models(),
    }))
}

/// Stored key first, then the environment.
fn credential(studio: &Studio) -> String {
    let stored = studio.api_key();
    if !stored.trim().is_empty() {
        return stored;
    }
    std::env::var(API_KEY_ENV).unwrap_or_default()
}

fn require_message(studio: &Studio, id: &str) -> Result<(), Box<dyn Error>> {
    match studio.message(id) {
        Some(_) => Ok(()),
        None => Err(format!("No message with id {id}").into()),
    }
}

pub async fn run_session_command(studio: &Studio, command: Commands) -> Result<(), Box<dyn Error>> {
    match command {
        Commands::Key { key: Some(key) } => {
            studio.set_api_key(key.trim());
            println!("✅ API key stored");
        }
        Commands::Key { key: None } => {
            if studio.api_key().trim().is_empty() {
                println!("No API key stored (falls back to ${API_KEY_ENV})");
            } else {
                println!("An API key is stored");
            }
        }
        Commands::System { text } if text.is_empty() => {
            println!("{}", studio.system_message());
        }
        Commands::System { text } => {
            studio.set_system_message(text.join(" "));
        }
        Commands::Add { text } => {
            let id = studio.add_message();
            if !text.is_empty() {
                studio.update_message_text(&id, text.join(" "));
            }
            println!("{id}");
        }
        Commands::Edit { id, text } => {
            if !studio.update_message_text(&id, text.join(" ")) {
                return Err(format!("No message with id {id}").into());
            }
        }
        Commands::Attach {
            id,
            path: _,
            mime: _,
            remove: true,
        } => {
            require_message(studio, &id)?;
            studio.remove_message_image(&id);
        }
        Commands::Attach {
            id, path, mime, ..
        } => {
            require_message(studio, &id)?;
            let path = path.ok_or("Missing image path")?;
            let mime_type = match mime {
                Some(mime) => mime,
                None => mime_for_path(&path)
                    .ok_or_else(|| format!("Cannot tell the type of {}; pass --mime", path.display()))?
                    .to_string(),
            };
            let bytes = tokio::fs::read(&path).await?;
            if !studio.update_message_image(&id, bytes, &mime_type) {
                return Err(format!("{} is {mime_type}, not an image", path.display()).into());
            }
        }
        Commands::Move { id, target, before } => {
            require_message(studio, &id)?;
            require_message(studio, &target)?;
            studio.reorder_messages(&id, &target, before);
        }
        Commands::Rm { id } => {
            if !studio.delete_message(&id) {
                return Err(format!("No message with id {id}").into());
            }
        }
        Commands::Clear => studio.delete_all_messages(),
        Commands::List => print_messages(&studio.system_message(), &studio.messages()),
        Commands::Template { source } => {
            let template = resolve_template(&source).await?;
            let count = studio.load_template(&template).await?;
            println!("✅ Loaded {count} message(s)");
        }
        Commands::Templates => {
            for template in load_builtin_templates()? {
                println!(
                    "{:<16} {}",
                    template.id.as_deref().unwrap_or("-"),
                    template.description.as_deref().unwrap_or("")
                );
            }
        }
        Commands::Image => {
            studio
                .run_image_generation(&credential(studio), &studio.system_message())
                .await?;
        }
        Commands::Text => {
            studio
                .run_text_generation(&credential(studio), &studio.system_message())
                .await?;
        }
        Commands::Outputs {
            delete: Some(id), ..
        } => {
            if !studio.delete_output(&id) {
                return Err(format!("No output with id {id}").into());
            }
        }
        Commands::Outputs { clear: true, .. } => studio.clear_outputs(),
        Commands::Outputs { .. } => print_outputs(&studio.outputs()),
        Commands::SaveImage { id, dir } => {
            let output = studio
                .output(&id)
                .ok_or_else(|| format!("No output with id {id}"))?;
            let dir = dir.unwrap_or_else(|| PathBuf::from("."));
            let path = save_output_image(&output, &dir).await?;
            println!("✅ Saved {}", path.display());
        }
        Commands::Set { .. } | Commands::Unset { .. } => {
            return Err("Configuration commands do not take a session".into());
        }
    }
    Ok(())
}

async fn resolve_template(source: &str) -> Result<Template, Box<dyn Error>> {
    let path = Path::new(source);
    if path.is_file() {
        let raw = tokio::fs::read_to_string(path).await?;
        return Ok(Template::from_json(&raw)?);
    }
    Ok(find_builtin_template(source)?)
}

fn print_messages(system_message: &str, messages: &[MessageItem]) {
    if system_message.trim().is_empty() {
        println!("system: (none)");
    } else {
        println!("system: {system_message}");
    }
    for item in messages {
        let image = item
            .image
            .as_ref()
            .map(|image| format!(" [{} image, {} bytes]", image.mime_type(), image.raw_data().len()))
            .unwrap_or_default();
        println!("{:>4}  {}{}", item.id, item.text, image);
    }
}

fn print_outputs(outputs: &[OutputItem]) {
    if outputs.is_empty() {
        println!("No outputs yet.");
        return;
    }
    for item in outputs {
        let kind = match item.image_ref.as_deref() {
            Some(PLACEHOLDER_IMAGE_REF) => "placeholder",
            Some(_) => "image",
            None => "text",
        };
        println!("{:>4}  [{kind}] {}", item.id, item.text);
    }
}

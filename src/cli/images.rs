use chrono::{DateTime, Local};
use std::error::Error;
use std::path::{Path, PathBuf};

use crate::core::blob::{decode_data_url, is_image_mime};
use crate::core::constants::PLACEHOLDER_IMAGE_REF;
use crate::core::output::OutputItem;
use crate::utils::mime::extension_for_mime;

/// `promptdeck-20250114-093015-3.png`
pub fn image_file_name(output_id: &str, mime_type: &str, now: DateTime<Local>) -> String {
    format!(
        "promptdeck-{}-{}.{}",
        now.format("%Y%m%d-%H%M%S"),
        output_id,
        extension_for_mime(mime_type)
    )
}

/// Writes the generated image of `output` into `dir` and returns its path.
pub async fn save_output_image(output: &OutputItem, dir: &Path) -> Result<PathBuf, Box<dyn Error>> {
    if output.loading {
        return Err(format!("Output {} is still generating", output.id).into());
    }
    let image_ref = match output.image_ref.as_deref() {
        Some(image_ref) if image_ref != PLACEHOLDER_IMAGE_REF => image_ref,
        _ => return Err(format!("Output {} has no generated image", output.id).into()),
    };
    let (mime_type, bytes) = decode_data_url(image_ref)?;
    if !is_image_mime(&mime_type) {
        return Err(format!("Output {} holds {mime_type}, not an image", output.id).into());
    }

    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(image_file_name(&output.id, &mime_type, Local::now()));
    tokio::fs::write(&path, &bytes).await?;
    Ok(path)
}

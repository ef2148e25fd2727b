//! Turns picked image files into attachments. Files that cannot be read or
//! decoded are skipped without aborting the rest of the selection.

use std::path::{Path, PathBuf};

use image::ImageFormat;
use shared::domain::ImageAttachment;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum AttachmentError {
    #[error("failed to read image {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to decode image {path}: {source}")]
    Decode {
        path: PathBuf,
        source: image::ImageError,
    },
}

pub async fn load_image(path: &Path) -> Result<ImageAttachment, AttachmentError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| AttachmentError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    let label = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    decode_attachment(label, bytes).map_err(|source| AttachmentError::Decode {
        path: path.to_path_buf(),
        source,
    })
}

/// Loads every path in order, dropping the ones that fail.
pub async fn load_images<P: AsRef<Path>>(paths: &[P]) -> Vec<ImageAttachment> {
    let mut images = Vec::with_capacity(paths.len());
    for path in paths {
        match load_image(path.as_ref()).await {
            Ok(image) => images.push(image),
            Err(err) => warn!(error = %err, "skipping attachment"),
        }
    }
    images
}

/// Sniffs the format from the bytes, checks that they decode, and wraps them.
pub fn decode_attachment(
    label: impl Into<String>,
    bytes: Vec<u8>,
) -> Result<ImageAttachment, image::ImageError> {
    let format = image::guess_format(&bytes)?;
    let decoded = image::load_from_memory_with_format(&bytes, format)?;
    let label = label.into();
    debug!(
        label = %label,
        width = decoded.width(),
        height = decoded.height(),
        format = ?format,
        "decoded attachment"
    );
    Ok(ImageAttachment::new(mime_type(format), label, bytes))
}

fn mime_type(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Png => "image/png",
        ImageFormat::Jpeg => "image/jpeg",
        ImageFormat::Gif => "image/gif",
        ImageFormat::WebP => "image/webp",
        ImageFormat::Bmp => "image/bmp",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
#[path = "tests/attachments_tests.rs"]
mod tests;

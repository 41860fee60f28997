//! HEIC/HEIF normalization.
//!
//! The image pipeline cannot decode HEIC containers, so matching sources are
//! converted to JPEG up front by an external converter (`heif-convert` or
//! ImageMagick) invoked over temporary files.

use std::path::Path;
use std::process::ExitStatus;
use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum HeicError {
    #[error("no HEIC converter is available; install heif-convert or ImageMagick, or set HEIC_CONVERTER")]
    NoConverter,
    #[error("HEIC conversion i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("HEIC converter exited with {status}: {stderr}")]
    Converter { status: ExitStatus, stderr: String },
}

/// Convert a fully buffered HEIC/HEIF image to JPEG.
pub async fn convert_to_jpeg(converter: &Path, input: &[u8]) -> Result<Vec<u8>, HeicError> {
    let dir = tempfile::tempdir()?;
    let input_path = dir.path().join("input.heic");
    let output_path = dir.path().join("output.jpg");
    tokio::fs::write(&input_path, input).await?;

    let output = Command::new(converter)
        .arg(&input_path)
        .arg(&output_path)
        .output()
        .await?;
    if !output.status.success() {
        return Err(HeicError::Converter {
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    Ok(tokio::fs::read(&output_path).await?)
}

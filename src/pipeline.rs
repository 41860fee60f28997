use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::io::{Limits, Reader};
use image::{DynamicImage, ImageFormat};
use serde::Deserialize;
use std::io::Cursor;
use thiserror::Error;

use crate::ops::{FormatOut, Op};

const DEFAULT_JPEG_QUALITY: u8 = 80;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("unable to determine input image format: {0}")]
    UnknownFormat(#[source] image::ImageError),
    #[error("image decode failed: {0}")]
    Decode(#[source] image::ImageError),
    #[error("image encode failed: {0}")]
    Encode(#[source] image::ImageError),
}

/// Global engine initialization options, taken from the `options` query
/// parameter. Unknown fields are ignored; the whole parameter is ignored if
/// it fails to parse as a JSON object.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineOptions {
    /// `false` (the default) disables decode limits entirely, `true`
    /// restores the decoder's stock limits, a number caps allocation bytes.
    pub limit_input_pixels: Option<serde_json::Value>,
}

impl EngineOptions {
    /// Parse the raw `options` parameter value. The value is only considered
    /// when longer than one byte; anything that fails to parse falls back to
    /// defaults.
    pub fn from_param(raw: Option<&str>) -> EngineOptions {
        let Some(raw) = raw.filter(|raw| raw.len() > 1) else {
            return EngineOptions::default();
        };
        match serde_json::from_str(raw) {
            Ok(options) => options,
            Err(error) => {
                tracing::debug!(%error, "ignoring malformed options parameter");
                EngineOptions::default()
            }
        }
    }

    fn limits(&self) -> Limits {
        use serde_json::Value;
        match &self.limit_input_pixels {
            Some(Value::Bool(true)) => Limits::default(),
            Some(Value::Number(n)) => {
                let mut limits = Limits::no_limits();
                limits.max_alloc = n.as_u64();
                limits
            }
            _ => Limits::no_limits(),
        }
    }
}

pub struct Output {
    pub bytes: Vec<u8>,
    pub format: FormatOut,
}

/// Decode the source bytes, apply the operations in order, and re-encode.
///
/// Format-selection operations update the pending output format instead of
/// touching pixels; the last one wins, as does the last quality setting.
pub fn run(input: &[u8], options: &EngineOptions, ops: &[Op]) -> Result<Output, PipelineError> {
    let input_format = image::guess_format(input).map_err(PipelineError::UnknownFormat)?;

    let mut reader = Reader::new(Cursor::new(input));
    reader.set_format(input_format);
    reader.limits(options.limits());
    let mut image = reader.decode().map_err(PipelineError::Decode)?;

    let mut format = FormatOut::Input;
    let mut quality = None;
    for op in ops {
        match op {
            Op::ToFormat {
                format: selected,
                quality: q,
            } => {
                format = FormatOut::Output(*selected);
                if q.is_some() {
                    quality = *q;
                }
            }
            other => image = apply(image, other),
        }
    }

    let target = match format {
        FormatOut::Input => input_format,
        FormatOut::Output(selected) => selected.to_image_format(),
    };
    let bytes = encode(&image, target, quality)?;
    Ok(Output { bytes, format })
}

fn apply(image: DynamicImage, op: &Op) -> DynamicImage {
    match op {
        Op::Resize { width, height } => resize(image, *width, *height),
        Op::Extract {
            left,
            top,
            width,
            height,
        } => image.crop_imm(*left, *top, *width, *height),
        Op::Rotate { quarter_turns } => match quarter_turns {
            1 => image.rotate90(),
            2 => image.rotate180(),
            3 => image.rotate270(),
            _ => image,
        },
        Op::Flip => image.flipv(),
        Op::Flop => image.fliph(),
        Op::Grayscale => image.grayscale(),
        Op::Negate => {
            let mut image = image;
            image.invert();
            image
        }
        Op::Blur { sigma } => image.blur(*sigma),
        Op::Sharpen { sigma } => image.unsharpen(*sigma, 1),
        // format selection is handled by the caller
        Op::ToFormat { .. } => image,
    }
}

fn resize(image: DynamicImage, width: Option<u32>, height: Option<u32>) -> DynamicImage {
    match (width, height) {
        // both dimensions: cover-fit, cropping the overflow
        (Some(w), Some(h)) => image.resize_to_fill(w, h, FilterType::Lanczos3),
        // one dimension: scale preserving the aspect ratio
        (Some(w), None) => image.resize(w, u32::MAX, FilterType::Lanczos3),
        (None, Some(h)) => image.resize(u32::MAX, h, FilterType::Lanczos3),
        (None, None) => image,
    }
}

fn encode(
    image: &DynamicImage,
    format: ImageFormat,
    quality: Option<u8>,
) -> Result<Vec<u8>, PipelineError> {
    let mut buffer = Cursor::new(Vec::new());
    match format {
        ImageFormat::Jpeg => {
            // JPEG has no alpha channel
            let rgb = image.to_rgb8();
            let mut encoder = JpegEncoder::new_with_quality(
                &mut buffer,
                quality.unwrap_or(DEFAULT_JPEG_QUALITY),
            );
            encoder.encode_image(&rgb).map_err(PipelineError::Encode)?;
        }
        // these encoders only accept 8-bit RGB(A)
        ImageFormat::WebP | ImageFormat::Gif => {
            DynamicImage::ImageRgba8(image.to_rgba8())
                .write_to(&mut buffer, format)
                .map_err(PipelineError::Encode)?;
        }
        other => {
            image
                .write_to(&mut buffer, other)
                .map_err(PipelineError::Encode)?;
        }
    }
    Ok(buffer.into_inner())
}

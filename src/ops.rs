use image::ImageFormat;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OpError {
    #[error("invalid JSON arguments for `{name}`: {source}")]
    InvalidJson {
        name: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("missing required argument for `{0}`")]
    MissingArgument(&'static str),
    #[error("invalid argument for `{0}`")]
    InvalidArgument(&'static str),
    #[error("unsupported output format `{0}`")]
    UnsupportedFormat(String),
    #[error("rotation angle must be a whole multiple of 90 degrees")]
    UnsupportedAngle,
}

/// Output formats the pipeline can encode to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Jpeg,
    Png,
    WebP,
    Gif,
    Tiff,
    Bmp,
}

impl OutputFormat {
    pub fn from_name(name: &str) -> Result<OutputFormat, OpError> {
        match name {
            "jpeg" | "jpg" => Ok(OutputFormat::Jpeg),
            "png" => Ok(OutputFormat::Png),
            "webp" => Ok(OutputFormat::WebP),
            "gif" => Ok(OutputFormat::Gif),
            "tiff" | "tif" => Ok(OutputFormat::Tiff),
            "bmp" => Ok(OutputFormat::Bmp),
            other => Err(OpError::UnsupportedFormat(other.to_string())),
        }
    }

    pub fn to_image_format(self) -> ImageFormat {
        match self {
            OutputFormat::Jpeg => ImageFormat::Jpeg,
            OutputFormat::Png => ImageFormat::Png,
            OutputFormat::WebP => ImageFormat::WebP,
            OutputFormat::Gif => ImageFormat::Gif,
            OutputFormat::Tiff => ImageFormat::Tiff,
            OutputFormat::Bmp => ImageFormat::Bmp,
        }
    }

    /// Extension used when rewriting the output filename.
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpeg",
            OutputFormat::Png => "png",
            OutputFormat::WebP => "webp",
            OutputFormat::Gif => "gif",
            OutputFormat::Tiff => "tiff",
            OutputFormat::Bmp => "bmp",
        }
    }
}

/// Output format selected by the pipeline. `Input` means no format operation
/// ran and the image is re-encoded to whatever format it arrived in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatOut {
    Input,
    Output(OutputFormat),
}

/// A single parsed transformation operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Resize {
        width: Option<u32>,
        height: Option<u32>,
    },
    Extract {
        left: u32,
        top: u32,
        width: u32,
        height: u32,
    },
    /// Quarter turns clockwise (0..=3), normalized from the degree argument.
    Rotate {
        quarter_turns: u32,
    },
    Flip,
    Flop,
    Grayscale,
    Negate,
    Blur {
        sigma: f32,
    },
    Sharpen {
        sigma: f32,
    },
    ToFormat {
        format: OutputFormat,
        quality: Option<u8>,
    },
}

/// The full set of recognized operation names. Anything else is skipped
/// without touching its value, so a typo'd name never fails the request.
const OP_NAMES: &[&str] = &[
    "resize",
    "extract",
    "rotate",
    "flip",
    "flop",
    "grayscale",
    "greyscale",
    "negate",
    "blur",
    "sharpen",
    "toFormat",
    "jpeg",
    "jpg",
    "png",
    "webp",
    "gif",
    "tiff",
    "bmp",
];

impl Op {
    /// Resolve a query parameter against the operation table.
    ///
    /// Returns `Ok(None)` for unrecognized names. For recognized names the
    /// value is JSON-decoded into an argument list: an empty value means no
    /// arguments, a JSON array passes through, any other JSON value becomes
    /// a one-element list.
    pub fn parse(name: &str, raw_value: &str) -> Result<Option<Op>, OpError> {
        if !OP_NAMES.contains(&name) {
            return Ok(None);
        }
        let args = parse_args(name, raw_value)?;
        let op = match name {
            "resize" => parse_resize(&args)?,
            "extract" => parse_extract(&args)?,
            "rotate" => parse_rotate(&args)?,
            "flip" => Op::Flip,
            "flop" => Op::Flop,
            "grayscale" | "greyscale" => Op::Grayscale,
            "negate" => Op::Negate,
            "blur" => Op::Blur {
                sigma: parse_sigma(&args, "blur")?,
            },
            "sharpen" => Op::Sharpen {
                sigma: parse_sigma(&args, "sharpen")?,
            },
            "toFormat" => parse_to_format(&args)?,
            // format-named shorthands: jpeg={"quality":80} etc.
            _ => Op::ToFormat {
                format: OutputFormat::from_name(name)?,
                quality: match args.first() {
                    Some(Value::Object(map)) => parse_quality(map)?,
                    _ => None,
                },
            },
        };
        Ok(Some(op))
    }
}

fn parse_args(name: &str, raw_value: &str) -> Result<Vec<Value>, OpError> {
    if raw_value.is_empty() {
        return Ok(Vec::new());
    }
    let value: Value = serde_json::from_str(raw_value).map_err(|source| OpError::InvalidJson {
        name: name.to_string(),
        source,
    })?;
    Ok(match value {
        Value::Array(items) => items,
        other => vec![other],
    })
}

/// An optional positive dimension: absent or JSON null means "unset".
fn parse_dimension(value: Option<&Value>, op: &'static str) -> Result<Option<u32>, OpError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .filter(|n| *n > 0)
            .map(Some)
            .ok_or(OpError::InvalidArgument(op)),
    }
}

fn parse_resize(args: &[Value]) -> Result<Op, OpError> {
    let (width, height) = if let Some(Value::Object(map)) = args.first() {
        (
            parse_dimension(map.get("width"), "resize")?,
            parse_dimension(map.get("height"), "resize")?,
        )
    } else {
        (
            parse_dimension(args.first(), "resize")?,
            parse_dimension(args.get(1), "resize")?,
        )
    };
    if width.is_none() && height.is_none() {
        return Err(OpError::MissingArgument("resize"));
    }
    Ok(Op::Resize { width, height })
}

fn parse_extract(args: &[Value]) -> Result<Op, OpError> {
    let Some(Value::Object(map)) = args.first() else {
        return Err(OpError::MissingArgument("extract"));
    };
    let offset = |key: &str| -> Result<u32, OpError> {
        map.get(key)
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
            .ok_or(OpError::InvalidArgument("extract"))
    };
    let left = offset("left")?;
    let top = offset("top")?;
    let width = parse_dimension(map.get("width"), "extract")?
        .ok_or(OpError::MissingArgument("extract"))?;
    let height = parse_dimension(map.get("height"), "extract")?
        .ok_or(OpError::MissingArgument("extract"))?;
    Ok(Op::Extract {
        left,
        top,
        width,
        height,
    })
}

fn parse_rotate(args: &[Value]) -> Result<Op, OpError> {
    let degrees = args
        .first()
        .ok_or(OpError::MissingArgument("rotate"))?
        .as_i64()
        .ok_or(OpError::InvalidArgument("rotate"))?;
    if degrees % 90 != 0 {
        return Err(OpError::UnsupportedAngle);
    }
    let quarter_turns = (((degrees / 90) % 4 + 4) % 4) as u32;
    Ok(Op::Rotate { quarter_turns })
}

fn parse_sigma(args: &[Value], op: &'static str) -> Result<f32, OpError> {
    match args.first() {
        None => Ok(1.0),
        Some(value) => value
            .as_f64()
            .filter(|sigma| *sigma >= 0.0)
            .map(|sigma| sigma as f32)
            .ok_or(OpError::InvalidArgument(op)),
    }
}

fn parse_to_format(args: &[Value]) -> Result<Op, OpError> {
    let name = args
        .first()
        .ok_or(OpError::MissingArgument("toFormat"))?
        .as_str()
        .ok_or(OpError::InvalidArgument("toFormat"))?;
    let quality = match args.get(1) {
        Some(Value::Object(map)) => parse_quality(map)?,
        None => None,
        Some(_) => return Err(OpError::InvalidArgument("toFormat")),
    };
    Ok(Op::ToFormat {
        format: OutputFormat::from_name(name)?,
        quality,
    })
}

fn parse_quality(map: &serde_json::Map<String, Value>) -> Result<Option<u8>, OpError> {
    match map.get("quality") {
        None => Ok(None),
        Some(value) => value
            .as_u64()
            .and_then(|q| u8::try_from(q).ok())
            .filter(|q| (1..=100).contains(q))
            .map(Some)
            .ok_or(OpError::InvalidArgument("quality")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_value_becomes_single_argument() {
        let op = Op::parse("resize", "320").unwrap().unwrap();
        assert_eq!(
            op,
            Op::Resize {
                width: Some(320),
                height: None
            }
        );
    }

    #[test]
    fn array_value_passes_through_as_argument_list() {
        let op = Op::parse("resize", "[320,240]").unwrap().unwrap();
        assert_eq!(
            op,
            Op::Resize {
                width: Some(320),
                height: Some(240)
            }
        );
    }

    #[test]
    fn resize_accepts_object_form_and_null_width() {
        let op = Op::parse("resize", r#"{"height":200}"#).unwrap().unwrap();
        assert_eq!(
            op,
            Op::Resize {
                width: None,
                height: Some(200)
            }
        );
        let op = Op::parse("resize", "[null,200]").unwrap().unwrap();
        assert_eq!(
            op,
            Op::Resize {
                width: None,
                height: Some(200)
            }
        );
    }

    #[test]
    fn resize_without_dimensions_is_an_error() {
        assert!(Op::parse("resize", "{}").is_err());
        assert!(Op::parse("resize", "").is_err());
    }

    #[test]
    fn absent_value_means_no_arguments() {
        assert_eq!(Op::parse("flip", "").unwrap(), Some(Op::Flip));
    }

    #[test]
    fn unrecognized_name_is_skipped_even_with_malformed_value() {
        assert_eq!(Op::parse("bogus", "{not json").unwrap(), None);
    }

    #[test]
    fn malformed_json_on_recognized_name_fails() {
        assert!(matches!(
            Op::parse("rotate", "{not json"),
            Err(OpError::InvalidJson { .. })
        ));
    }

    #[test]
    fn rotate_normalizes_negative_angles() {
        let op = Op::parse("rotate", "-90").unwrap().unwrap();
        assert_eq!(op, Op::Rotate { quarter_turns: 3 });
        let op = Op::parse("rotate", "450").unwrap().unwrap();
        assert_eq!(op, Op::Rotate { quarter_turns: 1 });
    }

    #[test]
    fn rotate_rejects_non_quarter_angles() {
        assert!(matches!(
            Op::parse("rotate", "45"),
            Err(OpError::UnsupportedAngle)
        ));
    }

    #[test]
    fn to_format_takes_name_and_quality() {
        let op = Op::parse("toFormat", r#"["jpeg",{"quality":70}]"#)
            .unwrap()
            .unwrap();
        assert_eq!(
            op,
            Op::ToFormat {
                format: OutputFormat::Jpeg,
                quality: Some(70)
            }
        );
    }

    #[test]
    fn to_format_rejects_unknown_format() {
        assert!(matches!(
            Op::parse("toFormat", r#""pdf""#),
            Err(OpError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn format_shorthand_carries_quality() {
        let op = Op::parse("jpeg", r#"{"quality":55}"#).unwrap().unwrap();
        assert_eq!(
            op,
            Op::ToFormat {
                format: OutputFormat::Jpeg,
                quality: Some(55)
            }
        );
        let op = Op::parse("png", "").unwrap().unwrap();
        assert_eq!(
            op,
            Op::ToFormat {
                format: OutputFormat::Png,
                quality: None
            }
        );
    }

    #[test]
    fn jpg_is_an_alias_for_jpeg() {
        let op = Op::parse("jpg", "").unwrap().unwrap();
        assert_eq!(
            op,
            Op::ToFormat {
                format: OutputFormat::Jpeg,
                quality: None
            }
        );
    }

    #[test]
    fn quality_out_of_range_is_an_error() {
        assert!(Op::parse("jpeg", r#"{"quality":0}"#).is_err());
        assert!(Op::parse("jpeg", r#"{"quality":101}"#).is_err());
    }
}

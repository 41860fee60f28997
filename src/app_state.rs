use regex::Regex;
use reqwest::Client;
use std::env;
use std::path::PathBuf;

/// Matches an HEIC/HEIF marker anywhere in a filename, not just as the final
/// extension. Intentionally loose: `photo.heic.bak` triggers conversion too.
const HEIC_PATTERN: &str = r"(?i)\.hei[cf]";

#[derive(Clone, Debug)]
pub struct AppState {
    pub client: Client,
    pub heic_pattern: Regex,
    /// Whether HEIC/HEIF sources are converted to JPEG before decoding.
    pub heic_enabled: bool,
    /// Resolved path of the external HEIC-to-JPEG converter, if any.
    pub heic_converter: Option<PathBuf>,
    /// Whether the global `options` query parameter is honored.
    pub options_enabled: bool,
}

impl AppState {
    pub fn new() -> AppState {
        let heic_enabled = !matches!(env::var("HEIC_CONVERSION"), Ok(value) if value == "off");
        let options_enabled = !matches!(env::var("OPTIONS_PARAM"), Ok(value) if value == "off");

        let heic_converter = match env::var("HEIC_CONVERTER") {
            Ok(path) => Some(PathBuf::from(path)),
            Err(_) => ["heif-convert", "magick", "convert"]
                .iter()
                .find_map(|tool| which::which(tool).ok()),
        };

        AppState {
            client: Client::new(),
            heic_pattern: Regex::new(HEIC_PATTERN).unwrap(),
            heic_enabled,
            heic_converter,
            options_enabled,
        }
    }

    pub fn is_heic(&self, filename: &str) -> bool {
        self.heic_pattern.is_match(filename)
    }
}

use crate::ops::FormatOut;

/// Rewrite a filename's extension to match the pipeline's output format.
///
/// `FormatOut::Input` keeps the name untouched, and so does a name without
/// any dot (there is no extension to rewrite, and none is invented).
pub fn rewrite_extension(filename: &str, format: &FormatOut) -> String {
    let FormatOut::Output(format) = format else {
        return filename.to_string();
    };
    match filename.rfind('.') {
        Some(dot) => format!("{}.{}", &filename[..dot], format.extension()),
        None => filename.to_string(),
    }
}

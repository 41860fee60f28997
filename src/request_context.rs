use url::form_urlencoded;

/// Name of the required source-URL parameter.
pub const URL_PARAM: &str = "url";
/// Name of the optional engine-options parameter.
pub const OPTIONS_PARAM: &str = "options";

/// Query parameters of a single request, with operation order preserved.
///
/// A plain map extractor would lose the order of the keys, but the order in
/// which operations are supplied governs the order in which they run, so the
/// raw query string is parsed into an ordered pair list instead.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub url: Option<String>,
    pub options: Option<String>,
    /// Remaining `name=value` pairs in query-string order. An empty value
    /// means the operation was supplied without arguments.
    pub operations: Vec<(String, String)>,
}

impl RequestContext {
    pub fn parse(query: &str) -> RequestContext {
        let mut ctx = RequestContext::default();
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                URL_PARAM => {
                    if ctx.url.is_none() {
                        ctx.url = Some(value.into_owned());
                    }
                }
                OPTIONS_PARAM => {
                    if ctx.options.is_none() {
                        ctx.options = Some(value.into_owned());
                    }
                }
                _ => ctx.operations.push((key.into_owned(), value.into_owned())),
            }
        }
        ctx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_url_and_options() {
        let ctx = RequestContext::parse("url=https%3A%2F%2Fexample.com%2Fa.jpg&options=%7B%7D");
        assert_eq!(ctx.url.as_deref(), Some("https://example.com/a.jpg"));
        assert_eq!(ctx.options.as_deref(), Some("{}"));
        assert!(ctx.operations.is_empty());
    }

    #[test]
    fn preserves_operation_order() {
        let ctx = RequestContext::parse("rotate=90&url=x&resize=320");
        let names: Vec<&str> = ctx.operations.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["rotate", "resize"]);
    }

    #[test]
    fn bare_parameter_has_empty_value() {
        let ctx = RequestContext::parse("url=x&flip");
        assert_eq!(ctx.operations, [("flip".to_string(), String::new())]);
    }

    #[test]
    fn missing_url_is_none() {
        let ctx = RequestContext::parse("resize=100");
        assert!(ctx.url.is_none());
    }
}

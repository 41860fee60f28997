use crate::app_state::AppState;
use crate::error::ProcessError;
use crate::heic::HeicError;
use crate::ops::{FormatOut, Op};
use crate::pipeline::EngineOptions;
use crate::request_context::RequestContext;
use axum::{
    extract::{RawQuery, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use percent_encoding::percent_decode_str;
use std::{env, net::SocketAddr};
use tracing_subscriber::EnvFilter;
use url::Url;

mod app_state;
mod error;
mod fetch;
mod filename;
mod heic;
mod ops;
mod pipeline;
mod request_context;

// 30 days of shared-cache freshness
const CACHE_CONTROL_VALUE: &str = "s-maxage=2592000";

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let app_state = AppState::new();
    if app_state.heic_enabled && app_state.heic_converter.is_none() {
        tracing::warn!("HEIC conversion is enabled but no converter was found; HEIC sources will fail");
    }
    let app = Router::new().route("/", get(handle)).with_state(app_state);

    let addr = SocketAddr::new(
        "0.0.0.0".parse().unwrap(),
        env::var("PORT").unwrap_or("3080".into()).parse().unwrap(),
    );
    tracing::info!("Image Transformation Service starting on {addr}");
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await
        .unwrap();
}

#[axum_macros::debug_handler]
async fn handle(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
) -> Result<Response, (StatusCode, String)> {
    let ctx = RequestContext::parse(query.as_deref().unwrap_or(""));

    if ctx.url.as_deref().map_or(true, str::is_empty) {
        return Err((
            StatusCode::BAD_REQUEST,
            "Image URL is required".to_string(),
        ));
    }

    match process(&state, &ctx).await {
        Ok(response) => Ok(response),
        Err(error) => {
            tracing::error!(%error, "failed to process image");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error processing image".to_string(),
            ))
        }
    }
}

async fn process(state: &AppState, ctx: &RequestContext) -> Result<Response, ProcessError> {
    // the query parser already decoded once; decode a second time to match
    // callers that percent-encode the whole source URL
    let src = percent_decode_str(ctx.url.as_deref().unwrap_or_default()).decode_utf8()?;
    let url = Url::parse(&src)?;
    let filename = url
        .path_segments()
        .and_then(|segments| segments.last())
        .unwrap_or("")
        .to_string();

    let bytes = fetch::fetch_data(&state.client, url.as_str()).await?;

    // normalize unsupported containers to JPEG before decoding
    let bytes = if state.heic_enabled && state.is_heic(&filename) {
        let converter = state
            .heic_converter
            .as_deref()
            .ok_or(HeicError::NoConverter)?;
        heic::convert_to_jpeg(converter, &bytes).await?
    } else {
        bytes
    };

    let options = if state.options_enabled {
        EngineOptions::from_param(ctx.options.as_deref())
    } else {
        EngineOptions::default()
    };

    let mut ops = Vec::new();
    for (name, value) in &ctx.operations {
        match Op::parse(name, value)? {
            Some(op) => ops.push(op),
            None => tracing::debug!(name = %name, "skipping unrecognized operation"),
        }
    }

    let output = pipeline::run(&bytes, &options, &ops)?;

    Ok((
        StatusCode::OK,
        response_headers(&filename, &output.format),
        output.bytes,
    )
        .into_response())
}

/// Assemble the success-response headers from the source filename and the
/// pipeline's output format: content type inferred from the rewritten
/// filename (falling back to `image/*`), the fixed shared-cache lifetime,
/// and an inline content disposition carrying the rewritten filename.
fn response_headers(filename: &str, format: &FormatOut) -> [(header::HeaderName, String); 3] {
    let filename = filename::rewrite_extension(filename, format);
    let content_type = mime_guess::from_path(&filename)
        .first()
        .map(|mime| mime.to_string())
        .unwrap_or_else(|| "image/*".to_string());
    [
        (header::CONTENT_TYPE, content_type),
        (header::CACHE_CONTROL, CACHE_CONTROL_VALUE.to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("inline; filename=\"{filename}\""),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::OutputFormat;

    fn header_value<'a>(
        headers: &'a [(header::HeaderName, String); 3],
        name: header::HeaderName,
    ) -> &'a str {
        headers
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
            .expect("header must be present")
    }

    #[test]
    fn unchanged_format_keeps_the_source_filename_and_type() {
        let headers = response_headers("photo.jpg", &FormatOut::Input);
        assert_eq!(header_value(&headers, header::CONTENT_TYPE), "image/jpeg");
        assert_eq!(
            header_value(&headers, header::CACHE_CONTROL),
            "s-maxage=2592000"
        );
        assert_eq!(
            header_value(&headers, header::CONTENT_DISPOSITION),
            "inline; filename=\"photo.jpg\""
        );
    }

    #[test]
    fn png_output_rewrites_the_content_type_and_filename() {
        let headers = response_headers("photo.jpg", &FormatOut::Output(OutputFormat::Png));
        assert_eq!(header_value(&headers, header::CONTENT_TYPE), "image/png");
        assert_eq!(
            header_value(&headers, header::CONTENT_DISPOSITION),
            "inline; filename=\"photo.png\""
        );
    }

    #[test]
    fn unrecognized_extension_falls_back_to_the_image_wildcard() {
        let headers = response_headers("download", &FormatOut::Input);
        assert_eq!(header_value(&headers, header::CONTENT_TYPE), "image/*");
        assert_eq!(
            header_value(&headers, header::CONTENT_DISPOSITION),
            "inline; filename=\"download\""
        );
    }

    #[tokio::test]
    async fn missing_url_is_a_400_with_the_exact_body() {
        let result = handle(State(AppState::new()), RawQuery(None)).await;
        let (status, body) = result.expect_err("request without url must fail");
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "Image URL is required");
    }

    #[tokio::test]
    async fn empty_url_is_a_400() {
        let query = Some("url=&resize=100".to_string());
        let result = handle(State(AppState::new()), RawQuery(query)).await;
        let (status, body) = result.expect_err("request with empty url must fail");
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "Image URL is required");
    }

    #[tokio::test]
    async fn unparseable_url_collapses_to_the_generic_500() {
        let query = Some("url=not%20a%20url".to_string());
        let result = handle(State(AppState::new()), RawQuery(query)).await;
        let (status, body) = result.expect_err("request with a bogus url must fail");
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, "Error processing image");
    }
}

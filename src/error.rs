use thiserror::Error;

use crate::fetch::FetchError;
use crate::heic::HeicError;
use crate::ops::OpError;
use crate::pipeline::PipelineError;

/// Everything that can go wrong while serving a request. The handler logs
/// the specific cause and collapses all of these to a generic 500.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("invalid source url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("source url is not valid percent-encoded utf-8: {0}")]
    UrlEncoding(#[from] std::str::Utf8Error),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Heic(#[from] HeicError),
    #[error(transparent)]
    Op(#[from] OpError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

use reqwest::Client;
use std::io::{self, Write};
use thiserror::Error;

const MAX_SIZE: u64 = 100 * 1024 * 1024; // Maximum response size in bytes (100 MB)

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("response body exceeded the maximum of {MAX_SIZE} bytes")]
    TooLarge,
    #[error("error sending request: {0}")]
    Send(#[source] reqwest::Error),
    #[error("upstream returned an error status: {0}")]
    Status(#[source] reqwest::Error),
    #[error("error reading response body: {0}")]
    Chunk(#[source] reqwest::Error),
    #[error("error buffering response body: {0}")]
    Buffer(#[from] io::Error),
}

pub async fn fetch_data(client: &Client, url: &str) -> Result<Vec<u8>, FetchError> {
    let mut response = client
        .get(url)
        .send()
        .await
        .map_err(FetchError::Send)?
        .error_for_status()
        .map_err(FetchError::Status)?;

    let mut content_length = 0;
    let mut body = Vec::new();
    let mut writer = io::Cursor::new(&mut body);
    loop {
        // stream the response so we can cap how large the requested data is
        // without having to download the entire thing first
        let chunk = response.chunk().await.map_err(FetchError::Chunk)?;
        let Some(chunk) = chunk else {
            break;
        };
        content_length += chunk.len() as u64;
        if content_length > MAX_SIZE {
            return Err(FetchError::TooLarge);
        }
        writer.write_all(&chunk)?;
    }

    Ok(body)
}

use std::time::Duration;

use futures::StreamExt;

use crate::error::{ClientError, error_for_status};

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// A fully buffered download plus the metadata needed to store it.
#[derive(Debug)]
pub struct Download {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
    pub final_url: String,
}

pub fn download_client() -> Result<reqwest::Client, ClientError> {
    Ok(reqwest::Client::builder()
        .timeout(DOWNLOAD_TIMEOUT)
        .build()?)
}

/// Streams `url` into memory, following redirects, and fails once the body
/// grows past `max_bytes`. The declared `Content-Length` is checked up front
/// so oversized files are rejected before any transfer happens.
pub async fn fetch_bounded(
    http: &reqwest::Client,
    url: &str,
    max_bytes: u64,
) -> Result<Download, ClientError> {
    let response = http.get(url).send().await?;
    let response = error_for_status(response).await?;

    if let Some(declared) = response.content_length()
        && declared > max_bytes
    {
        return Err(ClientError::TooLarge { limit: max_bytes });
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_owned());
    let final_url = response.url().to_string();

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len() as u64 + chunk.len() as u64 > max_bytes {
            return Err(ClientError::TooLarge { limit: max_bytes });
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(Download {
        bytes,
        content_type,
        final_url,
    })
}

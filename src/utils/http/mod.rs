use anyhow::{Context, Result, bail};
use reqwest::{Client, Response};
use std::time::Duration;

/// Connect timeout applied to every outbound client.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Marker appended to a body cut at the size limit.
pub const TRUNCATION_MARKER: &str = "\n[truncated]";

/// Build a `reqwest::Client` bounded by `timeout` end to end.
///
/// The connect timeout never exceeds the overall timeout.
pub fn http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .connect_timeout(CONNECT_TIMEOUT.min(timeout))
        .timeout(timeout)
        .build()
        .context("Failed to build HTTP client")
}

/// Read a response body, keeping at most `max_bytes`.
///
/// A declared `Content-Length` above the limit is rejected before reading.
/// Returns the bytes and whether a streamed body was cut at the limit.
pub async fn limited_body(mut resp: Response, max_bytes: usize) -> Result<(Vec<u8>, bool)> {
    if let Some(len) = resp.content_length()
        && usize::try_from(len).map_or(true, |len| len > max_bytes)
    {
        bail!("response body too large: {} bytes (limit {})", len, max_bytes);
    }

    let mut buf = Vec::new();
    while let Some(chunk) = resp.chunk().await? {
        let room = max_bytes.saturating_sub(buf.len());
        if chunk.len() > room {
            buf.extend_from_slice(&chunk[..room]);
            return Ok((buf, true));
        }
        buf.extend_from_slice(&chunk);
    }
    Ok((buf, false))
}

/// [`limited_body`] decoded as lossy UTF-8, tagged with
/// [`TRUNCATION_MARKER`] when cut. For diagnostics such as error bodies.
pub async fn limited_text(resp: Response, max_bytes: usize) -> Result<String> {
    let (bytes, truncated) = limited_body(resp, max_bytes).await?;
    let mut text = String::from_utf8_lossy(&bytes).into_owned();
    if truncated {
        text.push_str(TRUNCATION_MARKER);
    }
    Ok(text)
}

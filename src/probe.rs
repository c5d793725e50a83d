//! Image probe resolving an image URL to its natural dimensions.
//!
//! DESIGN
//! ======
//! `HttpImageProbe` streams the response body chunk by chunk and feeds the
//! growing prefix to a `HeaderSniffer`. As soon as the `image` crate can
//! read dimensions from the prefix the request is dropped, so a large
//! background is neither decoded nor downloaded in full. A body whose
//! header does not appear within `MAX_HEADER_BYTES` is rejected.
//!
//! Any transport, status or decode failure means the image is unreachable
//! for authoring purposes; the variants exist for logging.

use std::io::Cursor;
use std::time::Duration;

use tracing::debug;

use crate::config::ProbeTimeouts;
use crate::error::ErrorCode;
use crate::state::Coord;

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("image url is empty")]
    EmptyUrl,
    #[error("image request failed: {0}")]
    Request(String),
    #[error("image response error: status {status}")]
    Status { status: u16 },
    #[error("image decode failed: {0}")]
    Decode(String),
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

impl ErrorCode for ProbeError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::EmptyUrl => "E_PROBE_EMPTY_URL",
            Self::Request(_) => "E_PROBE_REQUEST",
            Self::Status { .. } => "E_PROBE_STATUS",
            Self::Decode(_) => "E_PROBE_DECODE",
            Self::HttpClientBuild(_) => "E_HTTP_CLIENT_BUILD",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Request(_) | Self::Status { status: 429 | 500..=599 })
    }
}

/// Loads an image resource and reports its natural size.
#[async_trait::async_trait]
pub trait ImageProbe: Send + Sync {
    async fn probe(&self, url: &str) -> Result<Coord, ProbeError>;
}

pub struct HttpImageProbe {
    http: reqwest::Client,
}

impl HttpImageProbe {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(timeouts: ProbeTimeouts) -> Result<Self, ProbeError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeouts.request_secs))
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .build()
            .map_err(|e| ProbeError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http })
    }
}

#[async_trait::async_trait]
impl ImageProbe for HttpImageProbe {
    async fn probe(&self, url: &str) -> Result<Coord, ProbeError> {
        if url.trim().is_empty() {
            return Err(ProbeError::EmptyUrl);
        }

        let mut response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| ProbeError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::Status { status: status.as_u16() });
        }

        let mut sniffer = HeaderSniffer::new(MAX_HEADER_BYTES);
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| ProbeError::Request(e.to_string()))?
        {
            if let Some(size) = sniffer.push(&chunk)? {
                debug!(%url, width = size.x, height = size.y, read = sniffer.len(), "probed image");
                return Ok(size);
            }
        }

        let size = sniffer.finish()?;
        debug!(%url, width = size.x, height = size.y, read = sniffer.len(), "probed image");
        Ok(size)
    }
}

/// Upper bound on how much of a body is buffered while looking for the
/// image header.
pub const MAX_HEADER_BYTES: usize = 1024 * 1024;

/// Accumulates a body prefix until image dimensions can be read from it.
#[derive(Debug)]
pub struct HeaderSniffer {
    buf: Vec<u8>,
    limit: usize,
}

impl HeaderSniffer {
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self { buf: Vec::new(), limit }
    }

    /// Bytes buffered so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Append a chunk and try to read dimensions from the prefix.
    /// `Ok(None)` means more bytes are needed.
    ///
    /// # Errors
    ///
    /// Returns `Decode` once the limit is reached without a readable header.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Option<Coord>, ProbeError> {
        let room = self.limit.saturating_sub(self.buf.len());
        self.buf.extend_from_slice(&chunk[..chunk.len().min(room)]);

        match decode_dimensions(&self.buf) {
            Ok(size) => Ok(Some(size)),
            Err(_) if self.buf.len() < self.limit => Ok(None),
            Err(e) => Err(ProbeError::Decode(format!("no image header within {} bytes: {e}", self.limit))),
        }
    }

    /// Read dimensions from whatever arrived before the body ended.
    ///
    /// # Errors
    ///
    /// Returns `Decode` if the buffered bytes hold no readable header.
    pub fn finish(&self) -> Result<Coord, ProbeError> {
        decode_dimensions(&self.buf)
    }
}

/// Read the natural dimensions from encoded image bytes.
///
/// # Errors
///
/// Returns `Decode` if the format is unknown or the header is malformed.
pub fn decode_dimensions(bytes: &[u8]) -> Result<Coord, ProbeError> {
    let reader = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| ProbeError::Decode(e.to_string()))?;
    let (width, height) = reader
        .into_dimensions()
        .map_err(|e| ProbeError::Decode(e.to_string()))?;
    Ok(Coord::new(f64::from(width), f64::from(height)))
}

#[cfg(test)]
#[path = "probe_test.rs"]
mod tests;

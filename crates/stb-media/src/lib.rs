//! HTTP media adapter.
//!
//! Downloads received images for the sticker workflow.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use stb_core::{errors::Error, ports::MediaFetcher, Result};

#[derive(Clone, Debug)]
pub struct HttpMediaFetcher {
    http: reqwest::Client,
    max_bytes: u64,
}

impl HttpMediaFetcher {
    pub fn new(timeout: Duration, max_bytes: u64) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| Error::External(format!("http client build error: {e}")))?;
        Ok(Self { http, max_bytes })
    }
}

#[async_trait]
impl MediaFetcher for HttpMediaFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let mut resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| Error::External(format!("media request error: {e}")))?;

        if !resp.status().is_success() {
            return Err(Error::External(format!(
                "media download failed: {}",
                resp.status()
            )));
        }

        if let Some(len) = resp.content_length() {
            if len > self.max_bytes {
                return Err(Error::External(format!(
                    "media too large: {len} bytes (limit {})",
                    self.max_bytes
                )));
            }
        }

        // Content-Length may be absent or wrong, so the cap is enforced while streaming.
        let mut body = Vec::new();
        while let Some(chunk) = resp
            .chunk()
            .await
            .map_err(|e| Error::External(format!("media read error: {e}")))?
        {
            if (body.len() + chunk.len()) as u64 > self.max_bytes {
                return Err(Error::External(format!(
                    "media too large: more than {} bytes",
                    self.max_bytes
                )));
            }
            body.extend_from_slice(&chunk);
        }

        debug!(bytes = body.len(), "media downloaded");
        Ok(body)
    }
}

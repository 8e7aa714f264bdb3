/// Core error type.
///
/// Adapter crates map their specific errors into this type so the router can
/// treat every failure the same way (log, optional fallback text, continue).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("send rejected: {0}")]
    Send(String),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Failures of the sticker sub-flow. All of them are recovered by the router.
#[derive(Debug, thiserror::Error)]
pub enum StickerError {
    #[error("unusable image payload: {0}")]
    MalformedInput(String),

    #[error("image download failed for {url}: {reason}")]
    DownloadFailed { url: String, reason: String },

    #[error("sticker send failed: {0}")]
    SendFailed(#[source] Error),
}

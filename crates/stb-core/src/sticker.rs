use std::{sync::Arc, time::Duration};

use tracing::{info, warn};

use crate::{
    domain::{ChatId, ContactId, ImageRef, OutgoingReply, StickerPayload, STICKER_MIME},
    errors::StickerError,
    messaging::port::MessagingPort,
    ports::MediaFetcher,
    replies,
    session::SessionStore,
};

#[derive(Clone, Copy, Debug)]
pub struct StickerLimits {
    pub download_timeout: Duration,
    pub max_image_bytes: u64,
}

impl Default for StickerLimits {
    fn default() -> Self {
        Self {
            download_timeout: Duration::from_secs(30),
            max_image_bytes: 64 * 1024 * 1024,
        }
    }
}

/// Image -> sticker sub-flow entered from `AwaitingImage`.
pub struct StickerWorkflow {
    fetcher: Arc<dyn MediaFetcher>,
    messenger: Arc<dyn MessagingPort>,
    sessions: Arc<SessionStore>,
    limits: StickerLimits,
}

impl StickerWorkflow {
    pub fn new(
        fetcher: Arc<dyn MediaFetcher>,
        messenger: Arc<dyn MessagingPort>,
        sessions: Arc<SessionStore>,
        limits: StickerLimits,
    ) -> Self {
        Self {
            fetcher,
            messenger,
            sessions,
            limits,
        }
    }

    /// Download the image and package it as a sticker.
    pub async fn build(&self, image: &ImageRef) -> Result<OutgoingReply, StickerError> {
        if image.remote_url.trim().is_empty() {
            return Err(StickerError::MalformedInput(
                "image has no download url".to_string(),
            ));
        }

        let download_failed = |reason: String| StickerError::DownloadFailed {
            url: image.remote_url.clone(),
            reason,
        };

        let bytes = tokio::time::timeout(
            self.limits.download_timeout,
            self.fetcher.fetch(&image.remote_url),
        )
        .await
        .map_err(|_| {
            download_failed(format!(
                "timed out after {}ms",
                self.limits.download_timeout.as_millis()
            ))
        })?
        .map_err(|e| download_failed(e.to_string()))?;

        if bytes.is_empty() {
            return Err(download_failed("empty body".to_string()));
        }
        if bytes.len() as u64 > self.limits.max_image_bytes {
            return Err(download_failed(format!(
                "{} bytes exceeds limit of {}",
                bytes.len(),
                self.limits.max_image_bytes
            )));
        }

        // Thumbnail is the downloaded image itself, not a scaled render.
        Ok(OutgoingReply::Sticker(StickerPayload {
            url: image.remote_url.clone(),
            direct_path: image.direct_path.clone(),
            media_key: image.media_key.clone(),
            byte_length: image.byte_length,
            mime_type: STICKER_MIME.to_string(),
            thumbnail: bytes,
        }))
    }

    /// Build the sticker and send it into `chat`.
    pub async fn convert(
        &self,
        chat: &ChatId,
        image: &ImageRef,
    ) -> Result<OutgoingReply, StickerError> {
        let sticker = self.build(image).await?;
        self.messenger
            .send(chat, &sticker)
            .await
            .map_err(StickerError::SendFailed)?;
        Ok(sticker)
    }

    /// Full sub-flow: convert, fall back to the failure text on any error,
    /// and always return the sender to `Idle`.
    ///
    /// Returns every reply that was handed to the transport.
    pub async fn run(
        &self,
        sender: &ContactId,
        chat: &ChatId,
        image: &ImageRef,
    ) -> Vec<OutgoingReply> {
        let mut sent = Vec::new();

        match self.convert(chat, image).await {
            Ok(sticker) => {
                info!(%sender, %chat, "sticker sent");
                sent.push(sticker);
            }
            Err(e) => {
                warn!(%sender, %chat, error = %e, "sticker workflow failed");
                let fallback = OutgoingReply::text(replies::STICKER_FAILED);
                if let Err(e) = self.messenger.send(chat, &fallback).await {
                    warn!(%chat, error = %e, "failed to send sticker failure notice");
                }
                sent.push(fallback);
            }
        }

        self.sessions.clear(sender).await;
        sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{errors::Error, session::SessionState, Result};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FakeFetcher {
        body: Option<Vec<u8>>,
        delay: Duration,
    }

    #[async_trait]
    impl MediaFetcher for FakeFetcher {
        async fn fetch(&self, _url: &str) -> Result<Vec<u8>> {
            tokio::time::sleep(self.delay).await;
            self.body
                .clone()
                .ok_or_else(|| Error::External("connection refused".to_string()))
        }
    }

    #[derive(Default)]
    struct FakeMessenger {
        reject_stickers: bool,
        sends: Mutex<Vec<OutgoingReply>>,
    }

    #[async_trait]
    impl MessagingPort for FakeMessenger {
        async fn own_id(&self) -> Option<ContactId> {
            None
        }

        async fn send(&self, _chat: &ChatId, reply: &OutgoingReply) -> Result<()> {
            if self.reject_stickers && matches!(reply, OutgoingReply::Sticker(_)) {
                return Err(Error::Send("media upload rejected".to_string()));
            }
            self.sends.lock().unwrap().push(reply.clone());
            Ok(())
        }
    }

    fn image() -> ImageRef {
        ImageRef {
            remote_url: "https://mmg.example/img.enc".to_string(),
            direct_path: "/v/t62/img.enc".to_string(),
            media_key: vec![7; 32],
            byte_length: 4,
        }
    }

    fn workflow(
        body: Option<Vec<u8>>,
        delay: Duration,
        messenger: Arc<FakeMessenger>,
        sessions: Arc<SessionStore>,
    ) -> StickerWorkflow {
        StickerWorkflow::new(
            Arc::new(FakeFetcher { body, delay }),
            messenger,
            sessions,
            StickerLimits {
                download_timeout: Duration::from_millis(200),
                max_image_bytes: 16,
            },
        )
    }

    fn sender() -> ContactId {
        ContactId::new("a@s.whatsapp.net")
    }

    fn chat() -> ChatId {
        ChatId::new("a@s.whatsapp.net")
    }

    #[tokio::test]
    async fn build_copies_media_fields_and_uses_bytes_as_thumbnail() {
        let wf = workflow(
            Some(vec![1, 2, 3, 4]),
            Duration::ZERO,
            Arc::new(FakeMessenger::default()),
            Arc::new(SessionStore::new()),
        );
        let OutgoingReply::Sticker(s) = wf.build(&image()).await.unwrap() else {
            panic!("expected sticker");
        };
        assert_eq!(s.url, image().remote_url);
        assert_eq!(s.direct_path, image().direct_path);
        assert_eq!(s.media_key, vec![7; 32]);
        assert_eq!(s.byte_length, 4);
        assert_eq!(s.mime_type, "image/webp");
        assert_eq!(s.thumbnail, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn build_rejects_missing_url_and_oversized_bodies() {
        let wf = workflow(
            Some(vec![0; 17]),
            Duration::ZERO,
            Arc::new(FakeMessenger::default()),
            Arc::new(SessionStore::new()),
        );

        let mut bad = image();
        bad.remote_url = String::new();
        assert!(matches!(
            wf.build(&bad).await,
            Err(StickerError::MalformedInput(_))
        ));
        assert!(matches!(
            wf.build(&image()).await,
            Err(StickerError::DownloadFailed { .. })
        ));
    }

    #[tokio::test]
    async fn slow_download_times_out() {
        let wf = workflow(
            Some(vec![1]),
            Duration::from_secs(5),
            Arc::new(FakeMessenger::default()),
            Arc::new(SessionStore::new()),
        );
        let err = wf.build(&image()).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn run_success_sends_sticker_and_resets_state() {
        let messenger = Arc::new(FakeMessenger::default());
        let sessions = Arc::new(SessionStore::new());
        sessions.set(&sender(), SessionState::AwaitingImage).await;
        let wf = workflow(
            Some(vec![9, 9]),
            Duration::ZERO,
            messenger.clone(),
            sessions.clone(),
        );

        let sent = wf.run(&sender(), &chat(), &image()).await;

        assert_eq!(sent.len(), 1);
        assert!(matches!(sent[0], OutgoingReply::Sticker(_)));
        assert_eq!(messenger.sends.lock().unwrap().len(), 1);
        assert_eq!(sessions.get(&sender()).await, SessionState::Idle);
    }

    #[tokio::test]
    async fn run_download_failure_sends_fallback_and_resets_state() {
        let messenger = Arc::new(FakeMessenger::default());
        let sessions = Arc::new(SessionStore::new());
        sessions.set(&sender(), SessionState::AwaitingImage).await;
        let wf = workflow(None, Duration::ZERO, messenger.clone(), sessions.clone());

        let sent = wf.run(&sender(), &chat(), &image()).await;

        assert_eq!(sent, vec![OutgoingReply::text(replies::STICKER_FAILED)]);
        assert_eq!(
            messenger.sends.lock().unwrap().clone(),
            vec![OutgoingReply::text(replies::STICKER_FAILED)]
        );
        assert_eq!(sessions.get(&sender()).await, SessionState::Idle);
    }

    #[tokio::test]
    async fn run_malformed_input_sends_fallback_and_resets_state() {
        let messenger = Arc::new(FakeMessenger::default());
        let sessions = Arc::new(SessionStore::new());
        sessions.set(&sender(), SessionState::AwaitingImage).await;
        let wf = workflow(
            Some(vec![1]),
            Duration::ZERO,
            messenger.clone(),
            sessions.clone(),
        );
        let mut bad = image();
        bad.remote_url = String::new();

        let sent = wf.run(&sender(), &chat(), &bad).await;

        assert_eq!(sent, vec![OutgoingReply::text(replies::STICKER_FAILED)]);
        assert_eq!(
            messenger.sends.lock().unwrap().clone(),
            vec![OutgoingReply::text(replies::STICKER_FAILED)]
        );
        assert_eq!(sessions.get(&sender()).await, SessionState::Idle);
    }

    #[tokio::test]
    async fn run_send_failure_sends_fallback_and_resets_state() {
        let messenger = Arc::new(FakeMessenger {
            reject_stickers: true,
            ..Default::default()
        });
        let sessions = Arc::new(SessionStore::new());
        sessions.set(&sender(), SessionState::AwaitingImage).await;
        let wf = workflow(
            Some(vec![1]),
            Duration::ZERO,
            messenger.clone(),
            sessions.clone(),
        );

        assert!(matches!(
            wf.convert(&chat(), &image()).await,
            Err(StickerError::SendFailed(_))
        ));

        let sent = wf.run(&sender(), &chat(), &image()).await;
        assert_eq!(sent, vec![OutgoingReply::text(replies::STICKER_FAILED)]);
        assert_eq!(sessions.get(&sender()).await, SessionState::Idle);
    }
}

use std::{sync::Arc, time::Duration};

use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use stb_bridge::BridgeMessenger;
use stb_core::{
    config::Config,
    engine::Engine,
    messaging::{
        port::MessagingPort,
        throttled::{ThrottleConfig, ThrottledMessenger},
    },
    presence::PresenceTracker,
    router::MessageRouter,
    session::SessionStore,
    sticker::{StickerLimits, StickerWorkflow},
};
use stb_media::HttpMediaFetcher;

mod health;

/// How long in-flight replies get to reach stdout once input has stopped.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    stb_core::logging::init("stb")?;

    let cfg = Config::load()?;
    info!(owner = %cfg.owner_jid, policy = ?cfg.greeting_policy, "sticker bot starting");

    let health = health::spawn(&cfg.health_addr).await?;

    // Raw bridge for acks/identity; everything that sends goes through the pacing decorator.
    let (bridge, frames) = BridgeMessenger::new(cfg.bridge_ack_timeout, cfg.bot_jid.clone());
    let bridge = Arc::new(bridge);
    let messenger: Arc<dyn MessagingPort> = Arc::new(ThrottledMessenger::new(
        bridge.clone(),
        ThrottleConfig {
            global_min_interval: cfg.send_global_interval,
            per_chat_min_interval: cfg.send_chat_interval,
        },
    ));

    let fetcher = Arc::new(HttpMediaFetcher::new(
        cfg.download_timeout,
        cfg.max_image_bytes,
    )?);
    let presence = Arc::new(PresenceTracker::new(cfg.owner_jid.clone()));
    let sessions = Arc::new(SessionStore::new());
    let sticker = StickerWorkflow::new(
        fetcher,
        messenger.clone(),
        sessions.clone(),
        StickerLimits {
            download_timeout: cfg.download_timeout,
            max_image_bytes: cfg.max_image_bytes,
        },
    );
    let router = Arc::new(MessageRouter::new(
        presence.clone(),
        sessions,
        messenger,
        sticker,
        cfg.greeting_policy,
    ));
    let engine = Engine::new(presence, router, cfg.sender_idle_timeout);

    let mut pump = tokio::spawn(stb_bridge::pump_outbound(frames, tokio::io::stdout()));

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown requested");
                cancel.cancel();
            }
        });
    }

    let result = stb_bridge::serve(
        BufReader::new(tokio::io::stdin()),
        &engine,
        &bridge,
        cancel,
    )
    .await;

    // The pump ends once every frame sender is gone; workers still routing
    // hold the last ones until their queues are empty.
    info!(
        active_senders = engine.active_senders(),
        "input stopped, flushing replies"
    );
    engine.close();
    drop(engine);
    drop(bridge);
    match tokio::time::timeout(SHUTDOWN_GRACE, &mut pump).await {
        Ok(Ok(Err(e))) => warn!(error = %e, "outbound pump failed"),
        Ok(_) => {}
        Err(_) => {
            warn!("replies still pending at shutdown, dropping them");
            pump.abort();
        }
    }

    health.abort();
    result?;

    info!("sticker bot stopped");
    Ok(())
}

use std::{env, path::Path, str::FromStr, time::Duration};

use tracing::info;

use crate::{domain::ContactId, errors::Error, Result};

/// When the presence-aware greeting is sent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GreetingPolicy {
    /// On every routable message, whatever the sender's state.
    #[default]
    Every,
    /// Only while the sender is `Idle`.
    Idle,
}

impl FromStr for GreetingPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "every" => Ok(Self::Every),
            "idle" => Ok(Self::Idle),
            other => Err(Error::Config(format!(
                "GREETING_POLICY must be `every` or `idle`, got `{other}`"
            ))),
        }
    }
}

/// Typed runtime configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub owner_jid: ContactId,
    /// Static own identity; otherwise learned from the transport.
    pub bot_jid: Option<ContactId>,
    pub health_addr: String,

    // Sticker workflow
    pub download_timeout: Duration,
    pub max_image_bytes: u64,

    // Routing
    pub greeting_policy: GreetingPolicy,
    pub sender_idle_timeout: Duration,

    // Outbound pacing
    pub send_global_interval: Duration,
    pub send_chat_interval: Duration,

    // Bridge
    pub bridge_ack_timeout: Duration,
}

impl Config {
    /// Load from the process environment, after merging an optional `.env`.
    pub fn load() -> Result<Self> {
        let path = Path::new(".env");
        if merge_env_file(path)? {
            info!(path = %path.display(), "merged environment file");
        }
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let owner_jid = lookup("OWNER_JID")
            .and_then(non_empty)
            .map(ContactId)
            .ok_or_else(|| {
                Error::Config("OWNER_JID environment variable is required".to_string())
            })?;
        let bot_jid = lookup("BOT_JID").and_then(non_empty).map(ContactId);
        let health_addr = lookup("HEALTH_ADDR")
            .and_then(non_empty)
            .unwrap_or_else(|| "0.0.0.0:3000".to_string());

        let download_timeout =
            Duration::from_millis(parse_num(&lookup, "DOWNLOAD_TIMEOUT_MS")?.unwrap_or(30_000));
        let max_image_bytes = parse_num(&lookup, "MAX_IMAGE_BYTES")?.unwrap_or(64 * 1024 * 1024);

        let greeting_policy = match lookup("GREETING_POLICY").and_then(non_empty) {
            Some(v) => v.parse()?,
            None => GreetingPolicy::default(),
        };
        let sender_idle_timeout =
            Duration::from_secs(parse_num(&lookup, "SENDER_IDLE_SECS")?.unwrap_or(300));

        let send_global_interval =
            Duration::from_millis(parse_num(&lookup, "SEND_GLOBAL_INTERVAL_MS")?.unwrap_or(40));
        let send_chat_interval =
            Duration::from_millis(parse_num(&lookup, "SEND_CHAT_INTERVAL_MS")?.unwrap_or(1050));

        let bridge_ack_timeout =
            Duration::from_millis(parse_num(&lookup, "BRIDGE_ACK_TIMEOUT_MS")?.unwrap_or(15_000));

        if download_timeout.is_zero() {
            return Err(Error::Config(
                "DOWNLOAD_TIMEOUT_MS must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            owner_jid,
            bot_jid,
            health_addr,
            download_timeout,
            max_image_bytes,
            greeting_policy,
            sender_idle_timeout,
            send_global_interval,
            send_chat_interval,
            bridge_ack_timeout,
        })
    }
}

fn parse_num(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<u64>> {
    let Some(raw) = lookup(key).and_then(non_empty) else {
        return Ok(None);
    };
    raw.trim()
        .parse::<u64>()
        .map(Some)
        .map_err(|_| Error::Config(format!("{key} must be a non-negative integer, got `{raw}`")))
}

/// Merge `path` into the process environment without overriding variables
/// that are already set. Returns whether the file existed.
fn merge_env_file(path: &Path) -> Result<bool> {
    match dotenvy::from_path(path) {
        Ok(()) => Ok(true),
        Err(e) if e.not_found() => Ok(false),
        Err(e) => Err(Error::Config(format!("{}: {e}", path.display()))),
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn owner_is_required() {
        let err = Config::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(matches!(err, Error::Config(m) if m.contains("OWNER_JID")));

        let err = Config::from_lookup(lookup_from(&[("OWNER_JID", "  ")])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn defaults() {
        let cfg = Config::from_lookup(lookup_from(&[("OWNER_JID", "owner@s.whatsapp.net")]))
            .unwrap();
        assert_eq!(cfg.owner_jid, ContactId::new("owner@s.whatsapp.net"));
        assert_eq!(cfg.bot_jid, None);
        assert_eq!(cfg.health_addr, "0.0.0.0:3000");
        assert_eq!(cfg.download_timeout, Duration::from_secs(30));
        assert_eq!(cfg.max_image_bytes, 64 * 1024 * 1024);
        assert_eq!(cfg.greeting_policy, GreetingPolicy::Every);
        assert_eq!(cfg.sender_idle_timeout, Duration::from_secs(300));
        assert_eq!(cfg.send_chat_interval, Duration::from_millis(1050));
        assert_eq!(cfg.bridge_ack_timeout, Duration::from_secs(15));
    }

    #[test]
    fn overrides_and_validation() {
        let cfg = Config::from_lookup(lookup_from(&[
            ("OWNER_JID", "owner@s.whatsapp.net"),
            ("BOT_JID", "bot@s.whatsapp.net"),
            ("GREETING_POLICY", "Idle"),
            ("DOWNLOAD_TIMEOUT_MS", "2500"),
        ]))
        .unwrap();
        assert_eq!(cfg.bot_jid, Some(ContactId::new("bot@s.whatsapp.net")));
        assert_eq!(cfg.greeting_policy, GreetingPolicy::Idle);
        assert_eq!(cfg.download_timeout, Duration::from_millis(2500));

        let err = Config::from_lookup(lookup_from(&[
            ("OWNER_JID", "owner@s.whatsapp.net"),
            ("MAX_IMAGE_BYTES", "lots"),
        ]))
        .unwrap_err();
        assert!(matches!(err, Error::Config(m) if m.contains("MAX_IMAGE_BYTES")));

        assert!("sometimes".parse::<GreetingPolicy>().is_err());
        assert!(Config::from_lookup(lookup_from(&[
            ("OWNER_JID", "owner@s.whatsapp.net"),
            ("DOWNLOAD_TIMEOUT_MS", "0"),
        ]))
        .is_err());
    }

    #[test]
    fn env_file_fills_gaps_without_overriding() {
        let path = env::temp_dir().join(format!("stb-config-{}.env", std::process::id()));
        std::fs::write(
            &path,
            "STB_TEST_FROM_FILE=\"file\"\nSTB_TEST_ALREADY_SET=file\n",
        )
        .unwrap();
        env::set_var("STB_TEST_ALREADY_SET", "outer");

        assert!(merge_env_file(&path).unwrap());
        assert_eq!(env::var("STB_TEST_FROM_FILE").unwrap(), "file");
        assert_eq!(env::var("STB_TEST_ALREADY_SET").unwrap(), "outer");

        std::fs::remove_file(&path).unwrap();
        assert!(!merge_env_file(&path).unwrap());
    }
}

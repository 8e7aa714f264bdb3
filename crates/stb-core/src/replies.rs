//! Fixed reply texts.

use std::time::Duration;

use crate::presence::{OfflineDuration, OwnerStatus};

pub const GREETING_ONLINE: &str = "👤 Owner sedang online.\n📋 Menu:\n1. Buat stiker";
pub const GREETING_OFFLINE: &str = "👤 Owner sedang offline. Silakan tunggu ya~";
pub const PATIENCE_SUFFIX: &str = "\n⚠️ Owner sudah offline lebih dari 3 jam, mohon bersabar.";
pub const SEND_PHOTO: &str = "📸 Silakan kirim foto untuk diubah jadi stiker";
pub const STICKER_FAILED: &str = "❌ Gagal bikin stiker, coba lagi!";

/// Menu entry that starts the sticker flow.
pub const MENU_STICKER: &str = "1";

/// Absence after which [`PATIENCE_SUFFIX`] is appended. Must match its wording.
pub const PATIENCE_AFTER: Duration = Duration::from_secs(3 * 3600);

pub fn greeting(status: OwnerStatus, away: OfflineDuration) -> String {
    match status {
        OwnerStatus::Online => GREETING_ONLINE.to_string(),
        OwnerStatus::Offline if away.exceeds(PATIENCE_AFTER) => {
            format!("{GREETING_OFFLINE}{PATIENCE_SUFFIX}")
        }
        OwnerStatus::Offline => GREETING_OFFLINE.to_string(),
    }
}

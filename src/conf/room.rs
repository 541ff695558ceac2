//! Room membership settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

/// Room membership settings.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize, SmartDefault)]
#[serde(default)]
pub struct Room {
    /// Maximum time to wait for the signalling relay to accept a join
    /// request.
    ///
    /// Defaults to `10s`.
    #[default(Duration::from_secs(10))]
    #[serde(with = "humantime_serde")]
    pub join_timeout: Duration,

    /// How many times a failed peer session initiated by this client is
    /// re-created before it's given up.
    ///
    /// Defaults to `1`.
    #[default(1)]
    pub max_session_restarts: u32,
}

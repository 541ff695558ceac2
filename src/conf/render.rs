//! Settings of the bounded readiness check of rendered tracks.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

/// Settings of the bounded readiness check of rendered tracks.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize, SmartDefault)]
#[serde(default)]
pub struct Render {
    /// Maximum number of attach attempts, including the first one.
    ///
    /// Defaults to `2`.
    #[default(2)]
    pub max_attempts: u32,

    /// Delay before the first re-attach.
    ///
    /// Defaults to `600ms`.
    #[default(Duration::from_millis(600))]
    #[serde(with = "humantime_serde")]
    pub initial_delay: Duration,

    /// Multiplier of the delay applied after every re-attach.
    ///
    /// Defaults to `2.0`.
    #[default(2.0)]
    pub multiplier: f32,

    /// Upper bound of the delay between re-attaches.
    ///
    /// Defaults to `2s`.
    #[default(Duration::from_secs(2))]
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
}

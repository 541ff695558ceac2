//! Audio activity detection settings.

use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

/// Audio activity detection settings.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize, SmartDefault)]
#[serde(default)]
pub struct AudioActivity {
    /// Mean frequency magnitude (in `0..=255` range) above which a
    /// participant is considered speaking.
    ///
    /// Defaults to `5.0`.
    #[default(5.0)]
    pub speaking_threshold: f32,
}

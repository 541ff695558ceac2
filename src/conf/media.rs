//! Local media capture settings.

use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

/// Local media capture settings.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize, SmartDefault)]
#[serde(default)]
pub struct Media {
    /// What happens to the camera track when video is turned off.
    ///
    /// Defaults to [`VideoOffPolicy::Release`].
    pub video_off: VideoOffPolicy,

    /// Whether stopping a screen share re-acquires the camera if it isn't
    /// live at that moment.
    ///
    /// Defaults to `true`.
    #[default(true)]
    pub recover_camera_after_screen_share: bool,
}

/// Possible ways of turning the local camera off.
#[derive(
    Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize, SmartDefault,
)]
#[serde(rename_all = "lowercase")]
pub enum VideoOffPolicy {
    /// Camera track is stopped, so the hardware is released, and a fresh
    /// track is acquired when video is turned on again.
    #[default]
    Release,

    /// Camera track is kept and only disabled, so turning video on again
    /// needs no acquisition, but the hardware stays busy.
    Disable,
}

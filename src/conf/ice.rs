//! [ICE] servers settings.
//!
//! [ICE]: https://webrtcglossary.com/ice

use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

/// [ICE] servers settings.
///
/// [ICE]: https://webrtcglossary.com/ice
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize, SmartDefault)]
#[serde(default)]
pub struct Ice {
    /// [STUN]/[TURN] servers every peer connection is configured with.
    ///
    /// Defaults to the public Google [STUN] servers.
    ///
    /// [STUN]: https://webrtcglossary.com/stun
    /// [TURN]: https://webrtcglossary.com/turn
    #[default(vec![
        IceServer::stun("stun:stun.l.google.com:19302"),
        IceServer::stun("stun:stun1.l.google.com:19302"),
    ])]
    pub servers: Vec<IceServer>,
}

/// Single [STUN]/[TURN] server settings.
///
/// [STUN]: https://webrtcglossary.com/stun
/// [TURN]: https://webrtcglossary.com/turn
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct IceServer {
    /// URLs of this server.
    pub urls: Vec<String>,

    /// Username to authorize with, if the server requires it.
    #[serde(default)]
    pub username: Option<String>,

    /// Credential to authorize with, if the server requires it.
    #[serde(default)]
    pub credential: Option<String>,
}

impl IceServer {
    /// Creates a new unauthenticated [STUN] server entry.
    ///
    /// [STUN]: https://webrtcglossary.com/stun
    #[must_use]
    pub fn stun<S: Into<String>>(url: S) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            credential: None,
        }
    }
}

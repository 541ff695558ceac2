//! Capabilities the orchestrator consumes but doesn't implement: media
//! capture, peer-to-peer transport and rendering surfaces.
//!
//! Every collaborator is represented by a trait, so the orchestrator runs
//! on top of any WebRTC implementation providing them.

mod media;
mod peer_connection;

use std::borrow::Cow;

use derive_more::Display;

#[doc(inline)]
pub use self::{
    media::{
        DisplayMediaStreamConstraints, MediaDevices, MediaStreamConstraints,
        MediaStreamTrack, MediaStreamTrackState, RenderTarget,
    },
    peer_connection::{
        PeerConnectionState, RtcPeerConnection, RtcPeerConnectionFactory,
        SdpType,
    },
};

/// Error reported by a platform collaborator.
#[derive(Clone, Debug, Display, Eq, PartialEq)]
#[display(fmt = "{}: {}", name, message)]
pub struct Error {
    /// Name of this [`Error`], e.g. `NotAllowedError`.
    pub name: Cow<'static, str>,

    /// Human-readable description of this [`Error`].
    pub message: String,
}

impl Error {
    /// Creates a new [`Error`] with the provided `name` and `message`.
    #[inline]
    pub fn new<N, M>(name: N, message: M) -> Self
    where
        N: Into<Cow<'static, str>>,
        M: Into<String>,
    {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// Kind of a media track.
#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
pub enum MediaKind {
    /// Audio track.
    #[display(fmt = "audio")]
    Audio,

    /// Video track.
    #[display(fmt = "video")]
    Video,
}

/// Source of a local media track.
#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
pub enum MediaSourceKind {
    /// Media is sourced by a media device (webcam or microphone).
    #[display(fmt = "device")]
    Device,

    /// Media is obtained with screen capture.
    #[display(fmt = "display")]
    Display,
}

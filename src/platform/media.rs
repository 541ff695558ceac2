//! Media capture and rendering capabilities.

use std::rc::Rc;

use async_trait::async_trait;
use futures::stream::LocalBoxStream;

use super::{Error, MediaKind};

/// State of a [`MediaStreamTrack`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MediaStreamTrackState {
    /// Track is producing media.
    Live,

    /// Track is stopped and won't produce media anymore.
    Ended,
}

/// Handle to a platform media track, either captured locally or received
/// from a remote peer.
pub trait MediaStreamTrack: std::fmt::Debug {
    /// Returns unique ID of this track.
    fn id(&self) -> String;

    /// Returns [`MediaKind`] of this track.
    fn kind(&self) -> MediaKind;

    /// Indicates whether this track is enabled.
    fn enabled(&self) -> bool;

    /// Enables or disables this track in place.
    ///
    /// Disabled track produces silence or black frames, but keeps its
    /// source busy.
    fn set_enabled(&self, enabled: bool);

    /// Returns current [`MediaStreamTrackState`] of this track.
    fn ready_state(&self) -> MediaStreamTrackState;

    /// Stops this track, releasing its source.
    fn stop(&self);

    /// Sets a callback invoked once the platform ends this track on its own
    /// (e.g. when screen sharing is stopped via OS UI).
    ///
    /// `None` removes the previously set callback.
    fn on_ended(&self, f: Option<Box<dyn FnOnce()>>);

    /// Returns stream of frequency-domain magnitudes (`0..=255` per bin) of
    /// this track's audio, one item per analysis frame.
    ///
    /// `None` if this track carries no audio. The stream ends when this
    /// track ends.
    fn audio_frames(&self) -> Option<LocalBoxStream<'static, Vec<u8>>> {
        None
    }
}

/// Constraints of [`MediaDevices::get_user_media()`] call.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MediaStreamConstraints {
    /// Whether a microphone track is requested.
    pub audio: bool,

    /// Whether a camera track is requested.
    pub video: bool,
}

/// Constraints of [`MediaDevices::get_display_media()`] call.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DisplayMediaStreamConstraints {
    /// Whether a system audio track is requested alongside the screen video.
    pub audio: bool,
}

/// Local media capture capability.
#[async_trait(?Send)]
pub trait MediaDevices {
    /// Captures microphone and/or camera tracks.
    ///
    /// # Errors
    ///
    /// If no suitable device exists or permission is denied.
    async fn get_user_media(
        &self,
        caps: MediaStreamConstraints,
    ) -> Result<Vec<Rc<dyn MediaStreamTrack>>, Error>;

    /// Captures a screen (with optional system audio).
    ///
    /// # Errors
    ///
    /// If the user or the source cancels the capture.
    async fn get_display_media(
        &self,
        caps: DisplayMediaStreamConstraints,
    ) -> Result<Vec<Rc<dyn MediaStreamTrack>>, Error>;
}

/// Surface a track is rendered onto (e.g. a video tile).
pub trait RenderTarget {
    /// Attaches the provided track to this target, replacing the previous
    /// one.
    fn attach(&self, track: &Rc<dyn MediaStreamTrack>);

    /// Indicates whether the attached track is actually being rendered
    /// (e.g. the video has non-zero dimensions).
    fn is_rendering(&self) -> bool;
}

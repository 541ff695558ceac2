//! Local media track captured by [`MediaManager`].
//!
//! [`MediaManager`]: crate::media::MediaManager

use std::rc::Rc;

use crate::{
    media::{MediaKind, MediaSourceKind},
    platform,
};

/// Locally captured media track.
///
/// Stops the underlying [`platform::MediaStreamTrack`] once dropped, so a
/// capture device is never held by a forgotten [`Track`].
#[derive(Debug)]
pub struct Track {
    /// Actual [`platform::MediaStreamTrack`].
    track: Rc<dyn platform::MediaStreamTrack>,

    /// Source this [`Track`] is captured from.
    source_kind: MediaSourceKind,
}

impl Track {
    /// Wraps the provided [`platform::MediaStreamTrack`].
    #[inline]
    #[must_use]
    pub fn new(
        track: Rc<dyn platform::MediaStreamTrack>,
        source_kind: MediaSourceKind,
    ) -> Self {
        Self { track, source_kind }
    }

    /// Returns ID of this [`Track`].
    #[inline]
    #[must_use]
    pub fn id(&self) -> String {
        self.track.id()
    }

    /// Returns [`MediaKind`] of this [`Track`].
    #[inline]
    #[must_use]
    pub fn kind(&self) -> MediaKind {
        self.track.kind()
    }

    /// Returns [`MediaSourceKind`] of this [`Track`].
    #[inline]
    #[must_use]
    pub fn source_kind(&self) -> MediaSourceKind {
        self.source_kind
    }

    /// Returns the underlying [`platform::MediaStreamTrack`].
    #[inline]
    #[must_use]
    pub fn platform_track(&self) -> &Rc<dyn platform::MediaStreamTrack> {
        &self.track
    }

    /// Indicates whether this [`Track`] still produces media.
    #[inline]
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.track.ready_state() == platform::MediaStreamTrackState::Live
    }

    /// Indicates whether this [`Track`] is enabled.
    #[inline]
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.track.enabled()
    }

    /// Enables or disables this [`Track`] in place.
    #[inline]
    pub fn set_enabled(&self, enabled: bool) {
        self.track.set_enabled(enabled);
    }

    /// Stops this [`Track`], releasing its source.
    ///
    /// Stopping an already stopped [`Track`] is no-op.
    pub fn stop(&self) {
        self.track.on_ended(None);
        if self.is_live() {
            self.track.stop();
        }
    }
}

impl Drop for Track {
    #[inline]
    fn drop(&mut self) {
        self.stop();
    }
}

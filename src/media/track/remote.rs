//! Media track received from a remote peer.

use std::rc::Rc;

use crate::{media::MediaKind, platform, utils::Callback};

/// Inner of a remote [`Track`].
struct Inner {
    /// Actual [`platform::MediaStreamTrack`].
    track: Rc<dyn platform::MediaStreamTrack>,

    /// Callback invoked once this [`Track`] is released by its session.
    on_stopped: Callback<()>,
}

/// Wrapper around a received remote [`platform::MediaStreamTrack`].
///
/// Clones refer to the same track.
#[derive(Clone)]
pub struct Track(Rc<Inner>);

impl Track {
    /// Wraps the provided received [`platform::MediaStreamTrack`].
    #[must_use]
    pub fn new(track: Rc<dyn platform::MediaStreamTrack>) -> Self {
        Self(Rc::new(Inner {
            track,
            on_stopped: Callback::default(),
        }))
    }

    /// Returns ID of this [`Track`].
    #[inline]
    #[must_use]
    pub fn id(&self) -> String {
        self.0.track.id()
    }

    /// Returns [`MediaKind`] of this [`Track`].
    #[inline]
    #[must_use]
    pub fn kind(&self) -> MediaKind {
        self.0.track.kind()
    }

    /// Returns the underlying [`platform::MediaStreamTrack`].
    #[inline]
    #[must_use]
    pub fn platform_track(&self) -> &Rc<dyn platform::MediaStreamTrack> {
        &self.0.track
    }

    /// Sets callback invoked once this [`Track`] is released by its session,
    /// so the renderer can detach it.
    #[inline]
    pub fn on_stopped<F: Fn(()) + 'static>(&self, f: F) {
        self.0.on_stopped.set_func(f);
    }

    /// Releases this [`Track`], notifying the renderer.
    pub(crate) fn stop(&self) {
        self.0.track.stop();
        self.0.on_stopped.call1(());
        self.0.on_stopped.clear();
    }
}

impl std::fmt::Debug for Track {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Track").field(&self.0.track).finish()
    }
}

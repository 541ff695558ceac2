//! Audio-Activity Detector: "is speaking" signal and intensity of a track's
//! audio, used for visual feedback only.

use std::{cell::RefCell, rc::Rc};

use futures::{
    future::{self, AbortHandle, LocalBoxFuture},
    stream::LocalBoxStream,
    FutureExt as _, StreamExt as _,
};
use medea_reactive::ObservableCell;

use crate::{conf, log::prelude::*, platform};

/// Audio activity derived from a single analysis frame.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct AudioActivity {
    /// Whether the participant is speaking now.
    pub speaking: bool,

    /// Loudness in `0..=100` range.
    pub intensity: u8,
}

impl AudioActivity {
    /// Derives [`AudioActivity`] from the provided frequency-domain frame
    /// (magnitudes in `0..=255` range per bin).
    #[must_use]
    pub fn analyse(frame: &[u8], speaking_threshold: f32) -> Self {
        if frame.is_empty() {
            return Self::default();
        }
        let sum: u64 = frame.iter().map(|m| u64::from(*m)).sum();
        #[allow(clippy::cast_precision_loss)]
        let mean = sum as f64 / frame.len() as f64;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let intensity = (mean * 100.0 / 255.0).round().min(100.0) as u8;
        Self {
            speaking: mean > f64::from(speaking_threshold),
            intensity,
        }
    }
}

/// Detector of a single track's [`AudioActivity`].
///
/// Holds the track's audio pipeline open only while attached to a track
/// carrying audio.
pub struct AudioActivityDetector {
    /// Mean magnitude above which the participant is considered speaking.
    speaking_threshold: f32,

    /// Latest [`AudioActivity`].
    activity: Rc<ObservableCell<AudioActivity>>,

    /// Handle aborting the running analysis loop.
    abort: RefCell<Option<AbortHandle>>,
}

impl AudioActivityDetector {
    /// Creates a new detached [`AudioActivityDetector`].
    #[must_use]
    pub fn new(conf: &conf::AudioActivity) -> Self {
        Self {
            speaking_threshold: conf.speaking_threshold,
            activity: Rc::new(ObservableCell::new(AudioActivity::default())),
            abort: RefCell::new(None),
        }
    }

    /// Returns the latest [`AudioActivity`].
    #[inline]
    #[must_use]
    pub fn activity(&self) -> AudioActivity {
        self.activity.get()
    }

    /// Returns [`Stream`] of [`AudioActivity`] changes, starting with the
    /// current one.
    ///
    /// [`Stream`]: futures::Stream
    #[inline]
    pub fn on_change(&self) -> LocalBoxStream<'static, AudioActivity> {
        self.activity.subscribe()
    }

    /// Indicates whether an analysis loop is running.
    #[inline]
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.abort.borrow().is_some()
    }

    /// Attaches this [`AudioActivityDetector`] to the provided track,
    /// detaching it from the previous one.
    ///
    /// Returns the analysis loop which must be driven by the caller (e.g.
    /// spawned onto a local executor). It completes once the track ends or
    /// this [`AudioActivityDetector`] is detached.
    ///
    /// Returns `None` if the track carries no audio.
    pub fn attach(
        &self,
        track: &Rc<dyn platform::MediaStreamTrack>,
    ) -> Option<LocalBoxFuture<'static, ()>> {
        self.detach();
        if track.kind() != platform::MediaKind::Audio {
            return None;
        }
        let frames = track.audio_frames()?;

        let activity = Rc::clone(&self.activity);
        let threshold = self.speaking_threshold;
        let analysis = frames.for_each(move |frame| {
            activity.set(AudioActivity::analyse(&frame, threshold));
            future::ready(())
        });
        let (analysis, abort) = future::abortable(analysis);
        drop(self.abort.borrow_mut().replace(abort));

        let activity = Rc::clone(&self.activity);
        let track_id = track.id();
        Some(
            analysis
                .map(move |res| {
                    if res.is_ok() {
                        debug!("Audio of {} track ended", track_id);
                    }
                    activity.set(AudioActivity::default());
                })
                .boxed_local(),
        )
    }

    /// Stops the running analysis loop, releasing the track's audio.
    pub fn detach(&self) {
        if let Some(abort) = self.abort.borrow_mut().take() {
            abort.abort();
            self.activity.set(AudioActivity::default());
        }
    }
}

impl Drop for AudioActivityDetector {
    fn drop(&mut self) {
        self.detach();
    }
}

//! Media Source Manager: owner of the local capture state.

use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

use derive_more::Display;
use futures::{channel::mpsc, lock::Mutex, stream::LocalBoxStream};
use medea_reactive::ObservableCell;
use meshroom_signalling_proto::MediaFlags;
use tracerr::Traced;

use crate::{
    conf,
    log::prelude::*,
    media::{local, MediaKind, MediaSourceKind},
    platform::{
        self, DisplayMediaStreamConstraints, MediaStreamConstraints,
    },
    utils::Caused,
};

/// Errors occurring in [`MediaManager`].
#[derive(Clone, Debug, Display, Caused)]
#[cause(error = "platform::Error")]
pub enum MediaManagerError {
    /// Camera or microphone is missing, or access to it is denied.
    #[display(fmt = "Media device is unavailable: {}", _0)]
    DeviceUnavailable(platform::Error),

    /// Screen capture has been cancelled by the user or the source.
    #[display(fmt = "Screen capture has been declined: {}", _0)]
    CaptureDeclined(platform::Error),

    /// Operation requires local media which hasn't been acquired.
    #[display(fmt = "No local media stream exists")]
    NoLocalStream,

    /// [`MediaManager`] has been disposed while the operation was in
    /// progress, so its result has been discarded.
    #[display(fmt = "MediaManager has been disposed")]
    Disposed,
}

/// Outbound tracks every peer session sends.
#[derive(Clone, Debug, Default)]
pub struct LocalTracks {
    /// Microphone track.
    pub audio: Option<Rc<local::Track>>,

    /// Screen video track while sharing the screen, camera track otherwise.
    pub video: Option<Rc<local::Track>>,
}

impl LocalTracks {
    /// Returns the outbound track of the provided [`MediaKind`].
    #[inline]
    #[must_use]
    pub fn get(&self, kind: MediaKind) -> Option<&Rc<local::Track>> {
        match kind {
            MediaKind::Audio => self.audio.as_ref(),
            MediaKind::Video => self.video.as_ref(),
        }
    }

    /// Iterates over all the present outbound tracks.
    pub fn iter(&self) -> impl Iterator<Item = &Rc<local::Track>> {
        self.audio.iter().chain(self.video.iter())
    }
}

impl PartialEq for LocalTracks {
    fn eq(&self, other: &Self) -> bool {
        fn same(
            a: &Option<Rc<local::Track>>,
            b: &Option<Rc<local::Track>>,
        ) -> bool {
            match (a, b) {
                (Some(a), Some(b)) => Rc::ptr_eq(a, b),
                (None, None) => true,
                _ => false,
            }
        }
        same(&self.audio, &other.audio) && same(&self.video, &other.video)
    }
}

/// Change notification emitted by [`MediaManager`] on every mutation of the
/// local media state.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LocalMediaUpdate {
    /// Current media publishing flags.
    pub flags: MediaFlags,

    /// Current outbound tracks.
    pub tracks: LocalTracks,
}

/// Local capture state exclusively owned by [`MediaManager`].
#[derive(Default)]
struct LocalMediaState {
    mic_track: Option<Rc<local::Track>>,
    cam_track: Option<Rc<local::Track>>,
    screen_video_track: Option<Rc<local::Track>>,
    screen_audio_track: Option<Rc<local::Track>>,
    audio_enabled: bool,
    video_enabled: bool,
    screen_sharing: bool,
}

impl LocalMediaState {
    /// Indicates whether any camera or microphone track has been acquired.
    fn has_local_stream(&self) -> bool {
        self.mic_track.is_some() || self.cam_track.is_some()
    }

    /// Indicates whether the camera track exists and produces media.
    fn is_camera_live(&self) -> bool {
        self.cam_track.as_ref().map_or(false, |t| t.is_live())
    }

    /// Indicates whether the microphone track exists and produces media.
    fn is_mic_live(&self) -> bool {
        self.mic_track.as_ref().map_or(false, |t| t.is_live())
    }

    /// Builds a [`LocalMediaUpdate`] of this [`LocalMediaState`].
    fn snapshot(&self) -> LocalMediaUpdate {
        let video = if self.screen_sharing {
            self.screen_video_track.clone()
        } else if self.video_enabled {
            self.cam_track.clone()
        } else {
            None
        };
        LocalMediaUpdate {
            flags: MediaFlags {
                audio_enabled: self.audio_enabled,
                video_enabled: self.video_enabled,
                screen_sharing: self.screen_sharing,
            },
            tracks: LocalTracks {
                audio: self.mic_track.clone(),
                video,
            },
        }
    }

    /// Stops the screen capture tracks and resets the sharing flag.
    fn release_screen(&mut self) {
        for track in self
            .screen_video_track
            .take()
            .into_iter()
            .chain(self.screen_audio_track.take())
        {
            track.stop();
        }
        self.screen_sharing = false;
    }

    /// Stops all the owned tracks and resets all the flags.
    fn release_all(&mut self) {
        self.release_screen();
        for track in
            self.mic_track.take().into_iter().chain(self.cam_track.take())
        {
            track.stop();
        }
        self.audio_enabled = false;
        self.video_enabled = false;
    }
}

/// Subscribers to the platform-initiated screen share endings.
type EndedSubscribers = Rc<RefCell<Vec<mpsc::UnboundedSender<String>>>>;

/// Actual data of a [`MediaManager`].
struct InnerMediaManager {
    /// Capture capability.
    devices: Rc<dyn platform::MediaDevices>,

    /// Capture policies.
    conf: conf::Media,

    /// Current local capture state.
    state: RefCell<LocalMediaState>,

    /// Last published [`LocalMediaUpdate`].
    published: ObservableCell<LocalMediaUpdate>,

    /// Serializes all the mutations, so an asynchronous one never interleaves
    /// with another.
    writer: Mutex<()>,

    /// Incremented on every disposal, so acquisitions started before it are
    /// discarded.
    epoch: Cell<u64>,

    /// Subscribers to the screen share endings initiated by the platform.
    screen_share_ended_subs: EndedSubscribers,
}

/// Media Source Manager.
///
/// Owns the camera, microphone and screen capture tracks, and exposes toggle
/// operations over them. Every mutation is published as a
/// [`LocalMediaUpdate`].
#[derive(Clone)]
pub struct MediaManager(Rc<InnerMediaManager>);

impl MediaManager {
    /// Creates a new [`MediaManager`] capturing media via the provided
    /// [`platform::MediaDevices`].
    #[must_use]
    pub fn new(
        devices: Rc<dyn platform::MediaDevices>,
        conf: conf::Media,
    ) -> Self {
        Self(Rc::new(InnerMediaManager {
            devices,
            conf,
            state: RefCell::default(),
            published: ObservableCell::new(LocalMediaUpdate::default()),
            writer: Mutex::new(()),
            epoch: Cell::new(0),
            screen_share_ended_subs: Rc::default(),
        }))
    }

    /// Returns current media publishing flags.
    #[inline]
    #[must_use]
    pub fn flags(&self) -> MediaFlags {
        self.0.published.borrow().flags
    }

    /// Returns current outbound tracks.
    #[inline]
    #[must_use]
    pub fn local_tracks(&self) -> LocalTracks {
        self.0.published.borrow().tracks.clone()
    }

    /// Returns the current camera track, if any, even if it isn't sent.
    #[must_use]
    pub fn camera_track(&self) -> Option<Rc<local::Track>> {
        self.0.state.borrow().cam_track.clone()
    }

    /// Returns the current screen capture tracks.
    #[must_use]
    pub fn screen_tracks(&self) -> Vec<Rc<local::Track>> {
        let state = self.0.state.borrow();
        state
            .screen_video_track
            .iter()
            .chain(state.screen_audio_track.iter())
            .cloned()
            .collect()
    }

    /// Returns [`Stream`] of [`LocalMediaUpdate`]s, starting with the current
    /// one.
    ///
    /// [`Stream`]: futures::Stream
    #[inline]
    pub fn on_update(&self) -> LocalBoxStream<'static, LocalMediaUpdate> {
        self.0.published.subscribe()
    }

    /// Returns [`Stream`] of screen video track IDs the platform has ended on
    /// its own.
    ///
    /// [`Stream`]: futures::Stream
    pub fn on_screen_share_ended(&self) -> LocalBoxStream<'static, String> {
        let (tx, rx) = mpsc::unbounded();
        self.0.screen_share_ended_subs.borrow_mut().push(tx);
        Box::pin(rx)
    }

    /// Captures camera and microphone, replacing the previously captured
    /// ones, and enables both.
    ///
    /// # Errors
    ///
    /// With [`MediaManagerError::DeviceUnavailable`] if capture fails.
    ///
    /// With [`MediaManagerError::Disposed`] if this [`MediaManager`] has been
    /// disposed during the capture.
    pub async fn acquire_camera_and_mic(
        &self,
    ) -> Result<LocalTracks, Traced<MediaManagerError>> {
        let _guard = self.0.writer.lock().await;

        let tracks = self
            .acquire(MediaStreamConstraints {
                audio: true,
                video: true,
            })
            .await
            .map_err(tracerr::wrap!())?;
        let (mic, cam) = split_by_kind(tracks);
        let mic = mic.ok_or_else(|| missing_device(MediaKind::Audio))?;
        let cam = cam.ok_or_else(|| missing_device(MediaKind::Video))?;
        mic.set_enabled(true);
        cam.set_enabled(true);

        {
            let mut state = self.0.state.borrow_mut();
            for old in state.mic_track.replace(mic).into_iter().chain(
                state.cam_track.replace(cam),
            ) {
                old.stop();
            }
            state.audio_enabled = true;
            state.video_enabled = true;
        }
        self.publish();

        Ok(self.local_tracks())
    }

    /// Flips the microphone enabled state in place, without re-capturing it.
    ///
    /// Returns the new audio enabled state.
    ///
    /// # Errors
    ///
    /// With [`MediaManagerError::NoLocalStream`] if no microphone has been
    /// captured.
    pub async fn toggle_audio(
        &self,
    ) -> Result<bool, Traced<MediaManagerError>> {
        let _guard = self.0.writer.lock().await;

        let enabled = {
            let mut state = self.0.state.borrow_mut();
            let mic = state.mic_track.clone().ok_or_else(|| {
                tracerr::new!(MediaManagerError::NoLocalStream)
            })?;
            state.audio_enabled = !state.audio_enabled;
            mic.set_enabled(state.audio_enabled);
            state.audio_enabled
        };
        self.publish();

        Ok(enabled)
    }

    /// Turns the camera off or on according to the [`conf::VideoOffPolicy`].
    ///
    /// Returns the new video enabled state.
    ///
    /// # Errors
    ///
    /// With [`MediaManagerError::NoLocalStream`] if no local media has been
    /// captured.
    ///
    /// With [`MediaManagerError::DeviceUnavailable`] if the camera cannot be
    /// re-captured. Video stays disabled in such case.
    pub async fn toggle_video(
        &self,
    ) -> Result<bool, Traced<MediaManagerError>> {
        let _guard = self.0.writer.lock().await;

        let (has_stream, enabled) = {
            let state = self.0.state.borrow();
            (state.has_local_stream(), state.video_enabled)
        };
        if !has_stream {
            return Err(tracerr::new!(MediaManagerError::NoLocalStream));
        }

        if enabled {
            self.disable_camera();
            self.publish();
            return Ok(false);
        }

        let retained = self
            .0
            .state
            .borrow()
            .cam_track
            .clone()
            .filter(|t| t.is_live());
        let cam = if let Some(cam) = retained {
            cam
        } else {
            self.acquire_camera().await.map_err(tracerr::wrap!())?
        };
        cam.set_enabled(true);
        {
            let mut state = self.0.state.borrow_mut();
            if let Some(old) = state.cam_track.replace(Rc::clone(&cam)) {
                if !Rc::ptr_eq(&old, &cam) {
                    old.stop();
                }
            }
            state.video_enabled = true;
        }
        self.publish();

        Ok(true)
    }

    /// Starts sharing the screen. No-op if the screen is shared already.
    ///
    /// If the platform ends the screen capture on its own, its track ID is
    /// emitted into [`MediaManager::on_screen_share_ended()`] streams.
    ///
    /// # Errors
    ///
    /// With [`MediaManagerError::CaptureDeclined`] if the capture is
    /// cancelled.
    pub async fn start_screen_share(
        &self,
    ) -> Result<(), Traced<MediaManagerError>> {
        let _guard = self.0.writer.lock().await;
        self.start_screen_share_exclusive()
            .await
            .map_err(tracerr::wrap!())
    }

    /// Stops sharing the screen. No-op if the screen isn't shared.
    ///
    /// If the camera isn't live afterwards and
    /// [`conf::Media::recover_camera_after_screen_share`] is set, camera (and
    /// microphone, if it isn't live too) is re-captured.
    ///
    /// # Errors
    ///
    /// With [`MediaManagerError::DeviceUnavailable`] if the camera cannot be
    /// re-captured. The screen share is stopped anyway.
    pub async fn stop_screen_share(
        &self,
    ) -> Result<(), Traced<MediaManagerError>> {
        let _guard = self.0.writer.lock().await;
        self.stop_screen_share_exclusive()
            .await
            .map_err(tracerr::wrap!())
    }

    /// Stops sharing the screen only if it's still captured by the screen
    /// video track with the provided ID.
    ///
    /// # Errors
    ///
    /// See [`MediaManager::stop_screen_share()`].
    pub async fn stop_screen_share_if_current(
        &self,
        track_id: &str,
    ) -> Result<(), Traced<MediaManagerError>> {
        let _guard = self.0.writer.lock().await;
        let is_current = self
            .0
            .state
            .borrow()
            .screen_video_track
            .as_ref()
            .map_or(false, |t| t.id() == track_id);
        if !is_current {
            return Ok(());
        }
        self.stop_screen_share_exclusive()
            .await
            .map_err(tracerr::wrap!())
    }

    /// Starts or stops sharing the screen, depending on whether it's shared
    /// at the moment.
    ///
    /// Returns the new screen sharing state.
    ///
    /// # Errors
    ///
    /// See [`MediaManager::start_screen_share()`] and
    /// [`MediaManager::stop_screen_share()`].
    pub async fn toggle_screen_share(
        &self,
    ) -> Result<bool, Traced<MediaManagerError>> {
        let _guard = self.0.writer.lock().await;
        if self.0.state.borrow().screen_sharing {
            self.stop_screen_share_exclusive()
                .await
                .map_err(tracerr::wrap!())?;
            Ok(false)
        } else {
            self.start_screen_share_exclusive()
                .await
                .map_err(tracerr::wrap!())?;
            Ok(true)
        }
    }

    /// Releases all the captured tracks unconditionally and resets all the
    /// flags.
    ///
    /// Results of the captures being in progress are discarded once they
    /// complete.
    pub fn dispose(&self) {
        self.0.epoch.set(self.0.epoch.get().wrapping_add(1));
        self.0.state.borrow_mut().release_all();
        self.publish();
    }

    /// Captures tracks with the provided constraints, discarding them if this
    /// [`MediaManager`] gets disposed meanwhile.
    async fn acquire(
        &self,
        caps: MediaStreamConstraints,
    ) -> Result<Vec<Rc<local::Track>>, Traced<MediaManagerError>> {
        let epoch = self.0.epoch.get();
        let tracks = self
            .0
            .devices
            .get_user_media(caps)
            .await
            .map_err(MediaManagerError::DeviceUnavailable)
            .map_err(tracerr::wrap!())?;
        let tracks: Vec<_> = tracks
            .into_iter()
            .map(|t| Rc::new(local::Track::new(t, MediaSourceKind::Device)))
            .collect();
        if self.0.epoch.get() != epoch {
            debug!(
                "Discarding {} tracks captured after disposal",
                tracks.len(),
            );
            return Err(tracerr::new!(MediaManagerError::Disposed));
        }
        Ok(tracks)
    }

    /// Captures a fresh camera track.
    async fn acquire_camera(
        &self,
    ) -> Result<Rc<local::Track>, Traced<MediaManagerError>> {
        let tracks = self
            .acquire(MediaStreamConstraints {
                audio: false,
                video: true,
            })
            .await
            .map_err(tracerr::wrap!())?;
        split_by_kind(tracks)
            .1
            .ok_or_else(|| missing_device(MediaKind::Video))
    }

    /// Turns the camera off according to the [`conf::VideoOffPolicy`].
    fn disable_camera(&self) {
        let mut state = self.0.state.borrow_mut();
        match self.0.conf.video_off {
            conf::VideoOffPolicy::Release => {
                if let Some(cam) = state.cam_track.take() {
                    cam.stop();
                }
            }
            conf::VideoOffPolicy::Disable => {
                if let Some(cam) = &state.cam_track {
                    cam.set_enabled(false);
                }
            }
        }
        state.video_enabled = false;
    }

    /// Starts sharing the screen. Must be called under the writer lock.
    async fn start_screen_share_exclusive(
        &self,
    ) -> Result<(), Traced<MediaManagerError>> {
        if self.0.state.borrow().screen_sharing {
            return Ok(());
        }

        let epoch = self.0.epoch.get();
        let tracks = self
            .0
            .devices
            .get_display_media(DisplayMediaStreamConstraints { audio: true })
            .await
            .map_err(MediaManagerError::CaptureDeclined)
            .map_err(tracerr::wrap!())?;
        let tracks: Vec<_> = tracks
            .into_iter()
            .map(|t| Rc::new(local::Track::new(t, MediaSourceKind::Display)))
            .collect();
        if self.0.epoch.get() != epoch {
            return Err(tracerr::new!(MediaManagerError::Disposed));
        }
        let (audio, video) = split_by_kind(tracks);
        let video = video.ok_or_else(|| {
            tracerr::new!(MediaManagerError::CaptureDeclined(
                platform::Error::new(
                    "NotFoundError",
                    "Screen capture provided no video track",
                )
            ))
        })?;

        let track_id = video.id();
        let subs = Rc::clone(&self.0.screen_share_ended_subs);
        video.platform_track().on_ended(Some(Box::new(move || {
            subs.borrow_mut()
                .retain(|tx| tx.unbounded_send(track_id.clone()).is_ok());
        })));

        {
            let mut state = self.0.state.borrow_mut();
            state.screen_video_track = Some(video);
            state.screen_audio_track = audio;
            state.screen_sharing = true;
        }
        self.publish();

        Ok(())
    }

    /// Stops sharing the screen, recovering the camera if needed. Must be
    /// called under the writer lock.
    async fn stop_screen_share_exclusive(
        &self,
    ) -> Result<(), Traced<MediaManagerError>> {
        let (needs_camera, needs_mic) = {
            let mut state = self.0.state.borrow_mut();
            if !state.screen_sharing {
                return Ok(());
            }
            state.release_screen();
            (
                self.0.conf.recover_camera_after_screen_share
                    && !state.is_camera_live(),
                !state.is_mic_live(),
            )
        };
        if !needs_camera {
            self.publish();
            return Ok(());
        }

        let recovered = self
            .acquire(MediaStreamConstraints {
                audio: needs_mic,
                video: true,
            })
            .await;
        let tracks = match recovered {
            Ok(tracks) => tracks,
            Err(e) => {
                warn!("Failed to recover camera after screen share: {}", e);
                self.publish();
                return Err(e);
            }
        };
        {
            let (mic, cam) = split_by_kind(tracks);
            let mut state = self.0.state.borrow_mut();
            if let Some(cam) = cam {
                cam.set_enabled(true);
                if let Some(old) = state.cam_track.replace(cam) {
                    old.stop();
                }
                state.video_enabled = true;
            }
            if let Some(mic) = mic {
                mic.set_enabled(true);
                if let Some(old) = state.mic_track.replace(mic) {
                    old.stop();
                }
                state.audio_enabled = true;
            }
        }
        self.publish();

        Ok(())
    }

    /// Publishes the current [`LocalMediaUpdate`].
    fn publish(&self) {
        let snapshot = self.0.state.borrow().snapshot();
        self.0.published.set(snapshot);
    }
}

impl Drop for InnerMediaManager {
    fn drop(&mut self) {
        self.state.borrow_mut().release_all();
    }
}

/// Splits the provided tracks into the first audio and the first video one,
/// dropping (and so stopping) the rest.
fn split_by_kind(
    tracks: Vec<Rc<local::Track>>,
) -> (Option<Rc<local::Track>>, Option<Rc<local::Track>>) {
    let mut audio = None;
    let mut video = None;
    for track in tracks {
        let slot = match track.kind() {
            MediaKind::Audio => &mut audio,
            MediaKind::Video => &mut video,
        };
        if slot.is_none() {
            *slot = Some(track);
        }
    }
    (audio, video)
}

/// Builds [`MediaManagerError::DeviceUnavailable`] for a capture which didn't
/// provide a track of the requested [`MediaKind`].
fn missing_device(kind: MediaKind) -> Traced<MediaManagerError> {
    tracerr::new!(MediaManagerError::DeviceUnavailable(platform::Error::new(
        "NotFoundError",
        format!("No {} track has been captured", kind),
    )))
}

//! In-memory media devices and transports which deliver media between each
//! other through the exchanged session descriptions.

use std::{
    cell::{Cell, RefCell},
    collections::{HashMap, HashSet},
    rc::Rc,
};

use async_trait::async_trait;
use meshroom::{
    conf::IceServer,
    platform::{
        DisplayMediaStreamConstraints, Error, MediaDevices, MediaKind,
        MediaStreamConstraints, MediaStreamTrack, MediaStreamTrackState,
        PeerConnectionState, RtcPeerConnection, RtcPeerConnectionFactory,
        SdpType,
    },
};
use meshroom_signalling_proto::IceCandidate;

#[derive(Debug)]
pub struct Track {
    id: String,
    kind: MediaKind,
    enabled: Cell<bool>,
    stopped: Cell<bool>,
}

impl Track {
    pub fn new(id: String, kind: MediaKind) -> Rc<Self> {
        Rc::new(Self {
            id,
            kind,
            enabled: Cell::new(true),
            stopped: Cell::new(false),
        })
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.get()
    }
}

impl MediaStreamTrack for Track {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn enabled(&self) -> bool {
        self.enabled.get()
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.set(enabled);
    }

    fn ready_state(&self) -> MediaStreamTrackState {
        if self.stopped.get() {
            MediaStreamTrackState::Ended
        } else {
            MediaStreamTrackState::Live
        }
    }

    fn stop(&self) {
        self.stopped.set(true);
    }

    fn on_ended(&self, _: Option<Box<dyn FnOnce()>>) {}
}

/// Camera, microphone and screen of a single client.
pub struct Devices {
    owner: String,
    captured: Cell<u32>,
    pub tracks: RefCell<Vec<Rc<Track>>>,
}

impl Devices {
    pub fn new(owner: &str) -> Rc<Self> {
        Rc::new(Self {
            owner: owner.into(),
            captured: Cell::new(0),
            tracks: RefCell::default(),
        })
    }

    fn capture(
        &self,
        source: &str,
        kind: MediaKind,
    ) -> Rc<dyn MediaStreamTrack> {
        self.captured.set(self.captured.get() + 1);
        let track = Track::new(
            format!("{}-{}-{}", self.owner, source, self.captured.get()),
            kind,
        );
        self.tracks.borrow_mut().push(Rc::clone(&track));
        track
    }
}

#[async_trait(?Send)]
impl MediaDevices for Devices {
    async fn get_user_media(
        &self,
        caps: MediaStreamConstraints,
    ) -> Result<Vec<Rc<dyn MediaStreamTrack>>, Error> {
        let mut tracks = Vec::new();
        if caps.audio {
            tracks.push(self.capture("mic", MediaKind::Audio));
        }
        if caps.video {
            tracks.push(self.capture("cam", MediaKind::Video));
        }
        Ok(tracks)
    }

    async fn get_display_media(
        &self,
        _: DisplayMediaStreamConstraints,
    ) -> Result<Vec<Rc<dyn MediaStreamTrack>>, Error> {
        Ok(vec![self.capture("screen", MediaKind::Video)])
    }
}

type OnTrack = Box<dyn FnMut(Rc<dyn MediaStreamTrack>)>;
type OnCandidate = Box<dyn FnMut(IceCandidate)>;
type OnState = Box<dyn FnMut(PeerConnectionState)>;

/// Transport announcing the kinds it sends in its session descriptions, and
/// producing a remote track for every kind announced by the other side.
#[derive(Default)]
pub struct Transport {
    senders: RefCell<HashMap<MediaKind, Option<String>>>,
    received: RefCell<HashSet<MediaKind>>,
    offers: Cell<u32>,
    gathered: Cell<u32>,
    pub replaced: RefCell<Vec<(MediaKind, Option<String>)>>,
    pub remote_candidates: RefCell<Vec<IceCandidate>>,
    pub closed: Cell<bool>,
    on_track: RefCell<Option<OnTrack>>,
    on_candidate: RefCell<Option<OnCandidate>>,
    on_state: RefCell<Option<OnState>>,
}

impl Transport {
    pub fn offers_made(&self) -> u32 {
        self.offers.get()
    }

    /// Returns the ID of the track sent in the slot of the provided kind.
    pub fn sending(&self, kind: MediaKind) -> Option<String> {
        self.senders.borrow().get(&kind).cloned().flatten()
    }

    fn local_description(&self) -> String {
        let mut kinds: Vec<_> =
            self.senders.borrow().keys().map(ToString::to_string).collect();
        kinds.sort();
        format!("v=0 {}", kinds.join(" "))
    }

    fn gather_candidate(&self) {
        self.gathered.set(self.gathered.get() + 1);
        let candidate = IceCandidate {
            candidate: format!("candidate:{}", self.gathered.get()),
            sdp_m_line_index: Some(0),
            sdp_mid: None,
        };
        if let Some(f) = self.on_candidate.borrow_mut().as_mut() {
            f(candidate);
        }
    }

    fn receive(&self, sdp: &str) {
        for kind in sdp.split_whitespace().skip(1) {
            let kind = match kind {
                "audio" => MediaKind::Audio,
                "video" => MediaKind::Video,
                _ => continue,
            };
            if !self.received.borrow_mut().insert(kind) {
                continue;
            }
            let track: Rc<dyn MediaStreamTrack> =
                Track::new(format!("remote-{}", kind), kind);
            if let Some(f) = self.on_track.borrow_mut().as_mut() {
                f(track);
            }
        }
    }
}

#[async_trait(?Send)]
impl RtcPeerConnection for Transport {
    async fn create_and_set_offer(&self) -> Result<String, Error> {
        self.offers.set(self.offers.get() + 1);
        let sdp = self.local_description();
        self.gather_candidate();
        Ok(sdp)
    }

    async fn create_and_set_answer(&self) -> Result<String, Error> {
        let sdp = self.local_description();
        self.gather_candidate();
        Ok(sdp)
    }

    async fn set_remote_description(&self, sdp: SdpType) -> Result<(), Error> {
        match sdp {
            SdpType::Offer(sdp) => {
                for kind in [MediaKind::Audio, MediaKind::Video].iter() {
                    if sdp.contains(&kind.to_string()) {
                        let _ = self
                            .senders
                            .borrow_mut()
                            .entry(*kind)
                            .or_insert(None);
                    }
                }
                self.receive(&sdp);
            }
            SdpType::Answer(sdp) => {
                self.receive(&sdp);
                if let Some(f) = self.on_state.borrow_mut().as_mut() {
                    f(PeerConnectionState::Connected);
                }
            }
        }
        Ok(())
    }

    async fn rollback(&self) -> Result<(), Error> {
        Ok(())
    }

    async fn add_ice_candidate(
        &self,
        candidate: &IceCandidate,
    ) -> Result<(), Error> {
        self.remote_candidates.borrow_mut().push(candidate.clone());
        Ok(())
    }

    fn has_sender(&self, kind: MediaKind) -> bool {
        self.senders.borrow().contains_key(&kind)
    }

    fn add_track(&self, track: Rc<dyn MediaStreamTrack>) -> Result<(), Error> {
        drop(
            self.senders
                .borrow_mut()
                .insert(track.kind(), Some(track.id())),
        );
        Ok(())
    }

    async fn replace_track(
        &self,
        kind: MediaKind,
        track: Option<Rc<dyn MediaStreamTrack>>,
    ) -> Result<(), Error> {
        let id = track.map(|t| t.id());
        self.replaced.borrow_mut().push((kind, id.clone()));
        drop(self.senders.borrow_mut().insert(kind, id));
        Ok(())
    }

    fn on_track(&self, f: Option<OnTrack>) {
        *self.on_track.borrow_mut() = f;
    }

    fn on_ice_candidate(&self, f: Option<OnCandidate>) {
        *self.on_candidate.borrow_mut() = f;
    }

    fn on_connection_state_change(&self, f: Option<OnState>) {
        *self.on_state.borrow_mut() = f;
    }

    fn close(&self) {
        self.closed.set(true);
    }
}

#[derive(Default)]
pub struct Transports {
    pub created: RefCell<Vec<Rc<Transport>>>,
}

impl Transports {
    pub fn last(&self) -> Rc<Transport> {
        self.created.borrow().last().cloned().unwrap()
    }
}

impl RtcPeerConnectionFactory for Transports {
    fn create(
        &self,
        _: &[IceServer],
    ) -> Result<Rc<dyn RtcPeerConnection>, Error> {
        let transport = Rc::new(Transport::default());
        self.created.borrow_mut().push(Rc::clone(&transport));
        Ok(transport)
    }
}

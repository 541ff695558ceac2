//! Peer Session Negotiator: per remote participant offer/answer/ICE state
//! machine on top of a [`platform::RtcPeerConnection`].

mod ice_candidates;
mod repo;

use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    fmt,
    rc::Rc,
};

use derive_more::Display;
use futures::{channel::mpsc, stream::LocalBoxStream};
use medea_reactive::ObservableCell;
use meshroom_macro::dispatchable;
use meshroom_signalling_proto::{IceCandidate, UserId};
use tracerr::Traced;

use crate::{
    conf::IceServer,
    log::prelude::*,
    media::{local, remote, LocalTracks, MediaKind},
    platform::{self, PeerConnectionState, SdpType},
    utils::Caused,
};

#[doc(inline)]
pub use self::{ice_candidates::PendingCandidates, repo::PeerRepository};

/// Events emitted from a [`platform::RtcPeerConnection`].
#[dispatchable(self: &Self, async_trait(?Send))]
#[derive(Clone, Debug)]
pub enum PeerEvent {
    /// [`platform::RtcPeerConnection`] discovered new ICE candidate.
    IceCandidateDiscovered {
        /// ID of the remote participant the candidate is for.
        remote_id: UserId,

        /// Discovered candidate.
        candidate: IceCandidate,
    },

    /// [`platform::RtcPeerConnection`] received new track from the remote
    /// participant.
    NewRemoteTrack {
        /// ID of the remote participant the track is received from.
        remote_id: UserId,

        /// Received track.
        track: Rc<dyn platform::MediaStreamTrack>,
    },

    /// [`platform::RtcPeerConnection`]'s transport state changed.
    ConnectionStateChanged {
        /// ID of the remote participant the transport is connected to.
        remote_id: UserId,

        /// New transport state.
        state: PeerConnectionState,
    },

    /// [`PeerConnection`] moved to another [`NegotiationState`].
    NegotiationStateChanged {
        /// ID of the remote participant of the session.
        remote_id: UserId,

        /// New negotiation state.
        state: NegotiationState,
    },
}

/// State of a [`PeerConnection`]'s negotiation.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum NegotiationState {
    /// Created, nothing exchanged yet.
    #[display(fmt = "idle")]
    Idle,

    /// Producing the initial offer.
    #[display(fmt = "offering")]
    Offering,

    /// Producing the answer to the initial offer.
    #[display(fmt = "answering")]
    Answering,

    /// Descriptions are being exchanged, no remote media received yet.
    #[display(fmt = "negotiating")]
    Negotiating,

    /// Remote media is flowing.
    #[display(fmt = "connected")]
    Connected,

    /// Media composition of a connected session is being renegotiated.
    #[display(fmt = "renegotiating")]
    Renegotiating,

    /// Transport failed fatally.
    #[display(fmt = "failed")]
    Failed,

    /// Resources are released.
    #[display(fmt = "closed")]
    Closed,
}

impl NegotiationState {
    /// Indicates whether no negotiation step can run in this state.
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Failed | Self::Closed)
    }
}

/// Side of the initial offer/answer exchange a [`PeerConnection`] takes.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum NegotiationRole {
    /// Sends the initial offer.
    #[display(fmt = "offerer")]
    Offerer,

    /// Answers the initial offer.
    #[display(fmt = "answerer")]
    Answerer,
}

/// Errors occurring in [`PeerConnection`].
#[derive(Clone, Debug, Display, Caused)]
#[cause(error = "platform::Error")]
pub enum PeerError {
    /// Transport cannot be created.
    #[display(fmt = "Failed to create RtcPeerConnection: {}", _0)]
    RtcPeerConnection(platform::Error),

    /// Transport-level failure moved the session to
    /// [`NegotiationState::Failed`].
    #[display(fmt = "Negotiation failed: {}", _0)]
    NegotiationFailed(platform::Error),

    /// Session has been closed while the operation was in progress.
    #[display(fmt = "PeerConnection is closed")]
    Closed,
}

type Result<T> = std::result::Result<T, Traced<PeerError>>;

/// Negotiated media session with a single remote participant.
pub struct PeerConnection {
    /// ID of the remote participant.
    remote_id: UserId,

    /// Side of the initial exchange this [`PeerConnection`] takes.
    role: NegotiationRole,

    /// Whether this side yields when offers cross.
    polite: bool,

    /// Underlying transport.
    peer: Rc<dyn platform::RtcPeerConnection>,

    /// Current [`NegotiationState`].
    state: ObservableCell<NegotiationState>,

    /// Local tracks attached to the transport, by kind.
    local_tracks: RefCell<HashMap<MediaKind, Rc<local::Track>>>,

    /// Tracks received from the remote participant, by kind.
    remote_tracks: RefCell<HashMap<MediaKind, remote::Track>>,

    /// Remote candidates which cannot be applied yet.
    pending_candidates: PendingCandidates,

    /// Whether a remote description has been applied.
    has_remote_description: Cell<bool>,

    /// Whether a sent local offer hasn't been answered yet.
    awaiting_answer: Cell<bool>,

    /// Whether the media composition changed in a way only a new
    /// offer/answer cycle can deliver.
    needs_renegotiation: Cell<bool>,

    /// Whether [`PendingCandidates`] are being applied right now.
    draining: Cell<bool>,

    /// [`PeerEvent`]s tx.
    peer_events_sender: mpsc::UnboundedSender<PeerEvent>,
}

impl PeerConnection {
    /// Creates a new [`PeerConnection`] in [`NegotiationState::Idle`].
    ///
    /// Provided `peer_events_sender` will be used to emit [`PeerEvent`]s
    /// from the created transport.
    ///
    /// # Errors
    ///
    /// With [`PeerError::RtcPeerConnection`] if the transport cannot be
    /// created.
    pub fn new(
        remote_id: UserId,
        role: NegotiationRole,
        polite: bool,
        factory: &dyn platform::RtcPeerConnectionFactory,
        ice_servers: &[IceServer],
        peer_events_sender: mpsc::UnboundedSender<PeerEvent>,
    ) -> Result<Rc<Self>> {
        let peer = factory
            .create(ice_servers)
            .map_err(PeerError::RtcPeerConnection)
            .map_err(tracerr::wrap!())?;

        let (id, tx) = (remote_id.clone(), peer_events_sender.clone());
        peer.on_ice_candidate(Some(Box::new(move |candidate| {
            let _ = tx.unbounded_send(PeerEvent::IceCandidateDiscovered {
                remote_id: id.clone(),
                candidate,
            });
        })));
        let (id, tx) = (remote_id.clone(), peer_events_sender.clone());
        peer.on_track(Some(Box::new(move |track| {
            let _ = tx.unbounded_send(PeerEvent::NewRemoteTrack {
                remote_id: id.clone(),
                track,
            });
        })));
        let (id, tx) = (remote_id.clone(), peer_events_sender.clone());
        peer.on_connection_state_change(Some(Box::new(move |state| {
            let _ = tx.unbounded_send(PeerEvent::ConnectionStateChanged {
                remote_id: id.clone(),
                state,
            });
        })));

        Ok(Rc::new(Self {
            remote_id,
            role,
            polite,
            peer,
            state: ObservableCell::new(NegotiationState::Idle),
            local_tracks: RefCell::default(),
            remote_tracks: RefCell::default(),
            pending_candidates: PendingCandidates::default(),
            has_remote_description: Cell::new(false),
            awaiting_answer: Cell::new(false),
            needs_renegotiation: Cell::new(false),
            draining: Cell::new(false),
            peer_events_sender,
        }))
    }

    /// Returns ID of the remote participant.
    #[inline]
    #[must_use]
    pub fn remote_id(&self) -> &UserId {
        &self.remote_id
    }

    /// Returns [`NegotiationRole`] of this [`PeerConnection`].
    #[inline]
    #[must_use]
    pub fn role(&self) -> NegotiationRole {
        self.role
    }

    /// Returns current [`NegotiationState`].
    #[inline]
    #[must_use]
    pub fn state(&self) -> NegotiationState {
        self.state.get()
    }

    /// Returns stream of [`NegotiationState`] changes, starting with the
    /// current one.
    #[inline]
    pub fn on_state_change(
        &self,
    ) -> LocalBoxStream<'static, NegotiationState> {
        self.state.subscribe()
    }

    /// Returns all the received remote tracks.
    #[must_use]
    pub fn remote_tracks(&self) -> Vec<remote::Track> {
        self.remote_tracks.borrow().values().cloned().collect()
    }

    /// Returns kinds of the local tracks attached to the transport.
    #[must_use]
    pub fn local_tracks_attached(&self) -> Vec<MediaKind> {
        self.local_tracks.borrow().keys().copied().collect()
    }

    /// Returns the local track of the provided [`MediaKind`] attached to the
    /// transport.
    #[must_use]
    pub fn local_track(&self, kind: MediaKind) -> Option<Rc<local::Track>> {
        self.local_tracks.borrow().get(&kind).cloned()
    }

    /// Returns count of the buffered remote ICE candidates.
    #[inline]
    #[must_use]
    pub fn pending_candidates_count(&self) -> usize {
        self.pending_candidates.len()
    }

    /// Attaches the provided local tracks and produces the initial offer.
    ///
    /// Returns the offer to be sent to the remote participant.
    ///
    /// # Errors
    ///
    /// With [`PeerError::NegotiationFailed`] if the transport fails, or
    /// [`PeerError::Closed`] if this [`PeerConnection`] is closed meanwhile.
    pub async fn create_outgoing(
        &self,
        tracks: &LocalTracks,
    ) -> Result<String> {
        self.set_state(NegotiationState::Offering);
        self.attach_tracks(tracks)?;

        let offer = self.peer.create_and_set_offer().await;
        self.ensure_open()?;
        let offer = offer.map_err(|e| self.fail_with(e))?;

        self.awaiting_answer.set(true);
        self.set_state(NegotiationState::Negotiating);
        Ok(offer)
    }

    /// Applies the provided remote offer and produces an answer to it.
    ///
    /// Returns `None` if the offer is stale and has been dropped.
    ///
    /// # Errors
    ///
    /// With [`PeerError::NegotiationFailed`] if the transport fails, or
    /// [`PeerError::Closed`] if this [`PeerConnection`] is closed meanwhile.
    pub async fn handle_incoming_offer(
        &self,
        offer: String,
        tracks: &LocalTracks,
    ) -> Result<Option<String>> {
        let prev = self.state();
        match prev {
            NegotiationState::Idle => {
                self.set_state(NegotiationState::Answering);
                self.apply_remote_description(SdpType::Offer(offer)).await?;
                let unoffered: Vec<_> = tracks
                    .iter()
                    .map(|t| t.kind())
                    .filter(|kind| !self.peer.has_sender(*kind))
                    .collect();
                self.attach_tracks(tracks)?;
                if !unoffered.is_empty() {
                    debug!(
                        "Offer of {} lacks {:?} slots, renegotiation required",
                        self.remote_id, unoffered,
                    );
                    self.needs_renegotiation.set(true);
                }
            }
            NegotiationState::Negotiating
            | NegotiationState::Connected
            | NegotiationState::Renegotiating => {
                if self.awaiting_answer.get() {
                    if !self.polite {
                        debug!(
                            "Dropping offer of {}: own offer is outstanding",
                            self.remote_id,
                        );
                        return Ok(None);
                    }
                    debug!("Rolling back own offer to {}", self.remote_id);
                    let rolled_back = self.peer.rollback().await;
                    self.ensure_open()?;
                    rolled_back.map_err(|e| self.fail_with(e))?;
                    self.awaiting_answer.set(false);
                    self.needs_renegotiation.set(true);
                }
                if prev == NegotiationState::Connected {
                    self.set_state(NegotiationState::Renegotiating);
                }
                self.apply_remote_description(SdpType::Offer(offer)).await?;
            }
            NegotiationState::Offering
            | NegotiationState::Answering
            | NegotiationState::Failed
            | NegotiationState::Closed => {
                debug!(
                    "Dropping stale offer of {} in {} state",
                    self.remote_id, prev,
                );
                return Ok(None);
            }
        }

        let answer = self.peer.create_and_set_answer().await;
        self.ensure_open()?;
        let answer = answer.map_err(|e| self.fail_with(e))?;
        self.finish_exchange();
        Ok(Some(answer))
    }

    /// Applies the provided remote answer to the outstanding local offer.
    ///
    /// Stale answers are dropped.
    ///
    /// # Errors
    ///
    /// With [`PeerError::NegotiationFailed`] if the transport fails, or
    /// [`PeerError::Closed`] if this [`PeerConnection`] is closed meanwhile.
    pub async fn handle_incoming_answer(&self, answer: String) -> Result<()> {
        let state = self.state();
        let expected = matches!(
            state,
            NegotiationState::Negotiating | NegotiationState::Renegotiating
        );
        if !expected || !self.awaiting_answer.get() {
            debug!(
                "Dropping stale answer of {} in {} state",
                self.remote_id, state,
            );
            return Ok(());
        }
        self.awaiting_answer.set(false);
        self.apply_remote_description(SdpType::Answer(answer)).await?;
        self.finish_exchange();
        Ok(())
    }

    /// Supplies the provided remote candidate to the transport, or buffers
    /// it until the remote description is applied.
    ///
    /// # Errors
    ///
    /// With [`PeerError::Closed`] if this [`PeerConnection`] is closed
    /// meanwhile.
    pub async fn handle_incoming_candidate(
        &self,
        candidate: IceCandidate,
    ) -> Result<()> {
        if self.state().is_terminal() {
            debug!("Dropping candidate of {}: session is over", self.remote_id);
            return Ok(());
        }
        if !self.has_remote_description.get()
            || self.draining.get()
            || !self.pending_candidates.is_empty()
        {
            self.pending_candidates.push(candidate);
            return Ok(());
        }
        self.add_candidate(&candidate).await
    }

    /// Records the provided received remote track, replacing the previous
    /// one of the same kind.
    ///
    /// Moves a [`NegotiationState::Negotiating`] session to
    /// [`NegotiationState::Connected`].
    ///
    /// Returns `None` if this [`PeerConnection`] is already closed.
    pub fn add_remote_track(
        &self,
        track: Rc<dyn platform::MediaStreamTrack>,
    ) -> Option<remote::Track> {
        if self.state().is_terminal() {
            track.stop();
            return None;
        }
        let track = remote::Track::new(track);
        let old = self
            .remote_tracks
            .borrow_mut()
            .insert(track.kind(), track.clone());
        if let Some(old) = old {
            old.stop();
        }
        if self.state() == NegotiationState::Negotiating {
            self.set_state(NegotiationState::Connected);
        }
        Some(track)
    }

    /// Substitutes the outbound tracks with the provided ones.
    ///
    /// Slots negotiated already are substituted in place. Track kinds never
    /// sent before require a new offer, which is produced right away if the
    /// session is [`NegotiationState::Connected`], or once it gets there
    /// otherwise.
    ///
    /// Returns the offer to be sent to the remote participant, if any.
    ///
    /// # Errors
    ///
    /// With [`PeerError::NegotiationFailed`] if the transport fails, or
    /// [`PeerError::Closed`] if this [`PeerConnection`] is closed meanwhile.
    pub async fn update_local_tracks(
        &self,
        tracks: &LocalTracks,
    ) -> Result<Option<String>> {
        let state = self.state();
        if state == NegotiationState::Idle || state.is_terminal() {
            return Ok(None);
        }

        for kind in [MediaKind::Audio, MediaKind::Video].iter().copied() {
            let new = tracks.get(kind).cloned();
            let unchanged = match (self.local_track(kind), &new) {
                (Some(old), Some(new)) => Rc::ptr_eq(&old, new),
                (None, None) => true,
                _ => false,
            };
            if unchanged {
                continue;
            }

            if self.peer.has_sender(kind) {
                debug!("Replacing {} track sent to {}", kind, self.remote_id);
                let replaced = self
                    .peer
                    .replace_track(
                        kind,
                        new.as_ref().map(|t| Rc::clone(t.platform_track())),
                    )
                    .await;
                self.ensure_open()?;
                if let Err(e) = replaced {
                    warn!(
                        "Failed to replace {} track sent to {}: {}",
                        kind, self.remote_id, e,
                    );
                    if let Some(track) = &new {
                        self.add_track(track)?;
                    }
                }
            } else if let Some(track) = &new {
                debug!(
                    "Adding {} track sent to {}, renegotiation required",
                    kind, self.remote_id,
                );
                self.add_track(track)?;
            }

            let mut local_tracks = self.local_tracks.borrow_mut();
            match new {
                Some(track) => drop(local_tracks.insert(kind, track)),
                None => drop(local_tracks.remove(&kind)),
            }
        }

        self.renegotiate_if_needed().await
    }

    /// Starts a new offer/answer cycle if the media composition requires it
    /// and the session is [`NegotiationState::Connected`] with no offer
    /// outstanding.
    ///
    /// Returns the offer to be sent to the remote participant, if any.
    ///
    /// # Errors
    ///
    /// With [`PeerError::NegotiationFailed`] if the transport fails, or
    /// [`PeerError::Closed`] if this [`PeerConnection`] is closed meanwhile.
    pub async fn renegotiate_if_needed(&self) -> Result<Option<String>> {
        if !self.needs_renegotiation.get()
            || self.awaiting_answer.get()
            || self.state() != NegotiationState::Connected
        {
            return Ok(None);
        }
        debug!("Renegotiating session with {}", self.remote_id);
        self.needs_renegotiation.set(false);
        self.set_state(NegotiationState::Renegotiating);

        let offer = self.peer.create_and_set_offer().await;
        self.ensure_open()?;
        let offer = offer.map_err(|e| self.fail_with(e))?;
        self.awaiting_answer.set(true);
        Ok(Some(offer))
    }

    /// Moves this [`PeerConnection`] to [`NegotiationState::Failed`].
    ///
    /// No-op if it's closed already.
    pub fn fail(&self) {
        if !self.state().is_terminal() {
            error!("Session with {} failed", self.remote_id);
            self.set_state(NegotiationState::Failed);
        }
    }

    /// Releases all the tracks, listeners and the transport of this
    /// [`PeerConnection`].
    ///
    /// Safe to call from any state, repeated calls are no-op.
    pub fn close(&self) {
        if self.state() == NegotiationState::Closed {
            return;
        }
        self.set_state(NegotiationState::Closed);
        self.peer.on_track(None);
        self.peer.on_ice_candidate(None);
        self.peer.on_connection_state_change(None);
        self.peer.close();
        self.local_tracks.borrow_mut().clear();
        let remote: Vec<_> =
            self.remote_tracks.borrow_mut().drain().map(|(_, t)| t).collect();
        for track in remote {
            track.stop();
        }
        self.pending_candidates.clear();
    }

    /// Adds all the provided local tracks to the transport.
    fn attach_tracks(&self, tracks: &LocalTracks) -> Result<()> {
        for track in tracks.iter() {
            self.add_track(track)?;
            drop(
                self.local_tracks
                    .borrow_mut()
                    .insert(track.kind(), Rc::clone(track)),
            );
        }
        Ok(())
    }

    /// Adds the provided local track to the transport, marking the session
    /// for renegotiation.
    fn add_track(&self, track: &Rc<local::Track>) -> Result<()> {
        self.peer
            .add_track(Rc::clone(track.platform_track()))
            .map_err(|e| self.fail_with(e))?;
        if self.state() != NegotiationState::Offering
            && self.state() != NegotiationState::Answering
        {
            self.needs_renegotiation.set(true);
        }
        Ok(())
    }

    /// Applies the provided remote description and drains the buffered
    /// candidates.
    async fn apply_remote_description(&self, sdp: SdpType) -> Result<()> {
        let applied = self.peer.set_remote_description(sdp).await;
        self.ensure_open()?;
        applied.map_err(|e| self.fail_with(e))?;
        self.has_remote_description.set(true);
        self.drain_candidates().await
    }

    /// Applies all the buffered candidates in their receive order.
    async fn drain_candidates(&self) -> Result<()> {
        self.draining.set(true);
        while let Some(candidate) = self.pending_candidates.pop() {
            if let Err(e) = self.add_candidate(&candidate).await {
                self.draining.set(false);
                return Err(e);
            }
        }
        self.draining.set(false);
        Ok(())
    }

    /// Supplies the provided candidate to the transport.
    ///
    /// Rejected candidates are logged only, as the remaining ones may still
    /// form a route.
    async fn add_candidate(&self, candidate: &IceCandidate) -> Result<()> {
        let added = self.peer.add_ice_candidate(candidate).await;
        self.ensure_open()?;
        if let Err(e) = added {
            warn!(
                "Failed to add ICE candidate of {}: {}",
                self.remote_id, e,
            );
        }
        Ok(())
    }

    /// Settles the state after a completed offer/answer exchange.
    fn finish_exchange(&self) {
        let state = if self.state() == NegotiationState::Renegotiating
            || !self.remote_tracks.borrow().is_empty()
        {
            NegotiationState::Connected
        } else {
            NegotiationState::Negotiating
        };
        self.set_state(state);
    }

    /// Errors with [`PeerError::Closed`] if this [`PeerConnection`] has been
    /// closed.
    fn ensure_open(&self) -> Result<()> {
        if self.state() == NegotiationState::Closed {
            return Err(tracerr::new!(PeerError::Closed));
        }
        Ok(())
    }

    /// Moves this [`PeerConnection`] to [`NegotiationState::Failed`] because
    /// of the provided transport error.
    fn fail_with(&self, err: platform::Error) -> Traced<PeerError> {
        error!("Negotiation with {} failed: {}", self.remote_id, err);
        self.fail();
        tracerr::new!(PeerError::NegotiationFailed(err))
    }

    /// Updates the current [`NegotiationState`].
    fn set_state(&self, state: NegotiationState) {
        let prev = self.state.replace(state);
        if prev != state {
            debug!(
                "Session with {} moved from {} to {}",
                self.remote_id, prev, state,
            );
            let _ = self.peer_events_sender.unbounded_send(
                PeerEvent::NegotiationStateChanged {
                    remote_id: self.remote_id.clone(),
                    state,
                },
            );
        }
    }
}

impl fmt::Debug for PeerConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerConnection")
            .field("remote_id", &self.remote_id)
            .field("role", &self.role)
            .field("state", &self.state())
            .finish()
    }
}

impl Drop for PeerConnection {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod spec;

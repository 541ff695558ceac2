//! Room Membership Reconciler: keeps the mesh of peer sessions consistent
//! with the room membership.

use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    rc::Rc,
};

use async_trait::async_trait;
use derive_more::{Display, From};
use futures::{
    channel::{mpsc, oneshot},
    future::LocalBoxFuture,
    stream::{self, LocalBoxStream},
    FutureExt as _, StreamExt as _,
};
use medea_reactive::ObservableCell;
use meshroom_signalling_proto::{
    Command, Event, EventHandler, IceCandidate, MediaFlags, MediaFlagsPatch,
    Message, MessageKind, Participant, RoomId, SdpType, SessionDescription,
    UserId,
};
use tracerr::Traced;

use crate::{
    conf::{self, Conf},
    log::prelude::*,
    media::{remote, LocalMediaUpdate, MediaManager, MediaManagerError},
    participants::Participants,
    peer::{
        NegotiationRole, NegotiationState, PeerConnection, PeerError,
        PeerEvent, PeerEventHandler, PeerRepository,
    },
    platform::{self, PeerConnectionState},
    signalling::SignallingChannel,
    utils::{Callback, Callback2, Caused, MeshroomError},
};

/// Flags every participant is assumed to have right after joining.
const JOINED_FLAGS: MediaFlags = MediaFlags {
    audio_enabled: true,
    video_enabled: true,
    screen_sharing: false,
};

/// State of a [`Room`] membership.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum RoomState {
    #[display(fmt = "disconnected")]
    Disconnected,

    #[display(fmt = "joining")]
    Joining,

    #[display(fmt = "joined")]
    Joined,

    #[display(fmt = "leaving")]
    Leaving,
}

/// Errors of [`Room::join()`].
#[derive(Clone, Debug, Display, Caused)]
#[cause(error = "platform::Error")]
pub enum RoomJoinError {
    /// Relay doesn't know the requested room.
    #[display(fmt = "Room not found")]
    RoomNotFound,

    /// Relay rejected the provided password.
    #[display(fmt = "Invalid password")]
    InvalidPassword,

    /// Relay rejected the join request for another reason.
    #[display(fmt = "Join rejected: {}", _0)]
    Rejected(String),

    /// Camera or microphone cannot be captured.
    #[display(fmt = "Media device is unavailable: {}", _0)]
    DeviceUnavailable(platform::Error),

    /// [`Room`] is joined or being joined already.
    #[display(fmt = "Room is joined already")]
    AlreadyJoined,

    /// [`Room::leave()`] has been called while joining.
    #[display(fmt = "Join has been aborted")]
    Aborted,

    /// Relay hasn't replied in time.
    #[display(fmt = "Join request timed out")]
    Timeout,
}

/// Errors reported by a joined [`Room`].
#[derive(Clone, Debug, Display, From, Caused)]
#[cause(error = "platform::Error")]
pub enum RoomError {
    /// Operation requires the [`Room`] to be joined.
    #[display(fmt = "Room is not joined")]
    #[from(ignore)]
    NotJoined,

    /// Relay reported an error.
    #[display(fmt = "Signalling relay error: {}", _0)]
    #[from(ignore)]
    Relay(String),

    /// Local media operation failed.
    #[display(fmt = "{}", _0)]
    MediaManager(#[cause] MediaManagerError),

    /// Peer session failed.
    #[display(fmt = "{}", _0)]
    Peer(#[cause] PeerError),
}

/// Everything a [`Room`] reacts on, merged into a single ordered stream.
enum RoomInput {
    Signal(Event),
    Peer(PeerEvent),
    LocalMedia(LocalMediaUpdate),
    ScreenShareEnded(String),
}

/// Membership in a single room and the mesh of peer sessions within it.
///
/// [`Room::run()`] must be driven for the [`Room`] to react on anything.
#[derive(Clone)]
pub struct Room(Rc<InnerRoom>);

impl Room {
    /// Creates a new disconnected [`Room`].
    #[must_use]
    pub fn new(
        signalling: Rc<dyn SignallingChannel>,
        devices: Rc<dyn platform::MediaDevices>,
        transports: Rc<dyn platform::RtcPeerConnectionFactory>,
        conf: &Conf,
    ) -> Self {
        let (peer_events_tx, peer_events_rx) = mpsc::unbounded();
        let media_manager = MediaManager::new(devices, conf.media.clone());
        let inputs = stream::select_all(vec![
            signalling.subscribe().map(RoomInput::Signal).boxed_local(),
            peer_events_rx.map(RoomInput::Peer).boxed_local(),
            media_manager
                .on_update()
                .map(RoomInput::LocalMedia)
                .boxed_local(),
            media_manager
                .on_screen_share_ended()
                .map(RoomInput::ScreenShareEnded)
                .boxed_local(),
        ])
        .boxed_local();

        Self(Rc::new(InnerRoom {
            signalling,
            media_manager,
            peers: PeerRepository::new(
                transports,
                conf.ice.servers.clone(),
                peer_events_tx,
            ),
            participants: Participants::default(),
            state: ObservableCell::new(RoomState::Disconnected),
            local_id: RefCell::new(None),
            join_sent: Cell::new(false),
            join_result: RefCell::new(None),
            published_flags: Cell::new(JOINED_FLAGS),
            restarts: RefCell::default(),
            inputs: RefCell::new(Some(inputs)),
            conf: conf.room.clone(),
            on_remote_track: Callback2::default(),
            on_peer_state_change: Callback2::default(),
            on_peer_failed: Callback::default(),
            on_message: Callback::default(),
            on_error: Callback::default(),
        }))
    }

    /// Returns the event loop of this [`Room`].
    ///
    /// It handles signalling events, transport callbacks and local media
    /// changes one by one, in their arrival order, and completes once this
    /// [`Room`] is dropped. Only the first call returns a working loop.
    pub fn run(&self) -> LocalBoxFuture<'static, ()> {
        let inputs = self.0.inputs.borrow_mut().take();
        let room = Rc::downgrade(&self.0);
        async move {
            let mut inputs = match inputs {
                Some(inputs) => inputs,
                None => return,
            };
            while let Some(input) = inputs.next().await {
                match room.upgrade() {
                    Some(room) => room.handle(input).await,
                    None => break,
                }
            }
        }
        .boxed_local()
    }

    /// Handles all the inputs which are ready right now, if
    /// [`Room::run()`] hasn't taken them.
    pub async fn drain_pending(&self) {
        let inputs = self.0.inputs.borrow_mut().take();
        if let Some(mut inputs) = inputs {
            while let Some(Some(input)) = inputs.next().now_or_never() {
                self.0.handle(input).await;
            }
            *self.0.inputs.borrow_mut() = Some(inputs);
        }
    }

    /// Captures camera and microphone, then asks the relay to join the
    /// provided room.
    ///
    /// Resolves once the relay accepts or rejects the request.
    ///
    /// # Errors
    ///
    /// With [`RoomJoinError::DeviceUnavailable`] if local media cannot be
    /// captured, in which case no request is sent.
    ///
    /// With [`RoomJoinError::RoomNotFound`], [`RoomJoinError::InvalidPassword`]
    /// or [`RoomJoinError::Rejected`] if the relay rejects the request.
    ///
    /// With [`RoomJoinError::Timeout`] if the relay doesn't reply within
    /// [`conf::Room::join_timeout`].
    ///
    /// With [`RoomJoinError::Aborted`] if [`Room::leave()`] is called
    /// meanwhile.
    ///
    /// With [`RoomJoinError::AlreadyJoined`] if this [`Room`] isn't
    /// [`RoomState::Disconnected`].
    pub async fn join(
        &self,
        room_id: RoomId,
        user_name: String,
        password: Option<String>,
    ) -> Result<(), Traced<RoomJoinError>> {
        let inner = &self.0;
        if inner.state.get() != RoomState::Disconnected {
            return Err(tracerr::new!(RoomJoinError::AlreadyJoined));
        }
        inner.state.set(RoomState::Joining);
        info!("Joining room {} as {}", room_id, user_name);

        if let Err(e) = inner.media_manager.acquire_camera_and_mic().await {
            warn!("Failed to capture local media: {}", e);
            if inner.state.get() == RoomState::Joining {
                inner.state.set(RoomState::Disconnected);
            }
            return Err(tracerr::new!(match e.into_parts().0 {
                MediaManagerError::DeviceUnavailable(e) => {
                    RoomJoinError::DeviceUnavailable(e)
                }
                _ => RoomJoinError::Aborted,
            }));
        }
        if inner.state.get() != RoomState::Joining {
            return Err(tracerr::new!(RoomJoinError::Aborted));
        }

        let (tx, rx) = oneshot::channel();
        drop(inner.join_result.borrow_mut().replace(tx));
        inner.join_sent.set(true);
        inner.signalling.send_command(Command::JoinRoom {
            room_id,
            user_name,
            password,
        });

        match tokio::time::timeout(inner.conf.join_timeout, rx).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(e))) => Err(tracerr::new!(e)),
            Ok(Err(oneshot::Canceled)) => {
                Err(tracerr::new!(RoomJoinError::Aborted))
            }
            Err(_) => {
                warn!("Relay hasn't replied to join request in time");
                self.leave();
                Err(tracerr::new!(RoomJoinError::Timeout))
            }
        }
    }

    /// Destroys all the peer sessions, releases local media and notifies
    /// the relay.
    ///
    /// Calling it on a [`RoomState::Disconnected`] [`Room`] is no-op.
    pub fn leave(&self) {
        let inner = &self.0;
        let state = inner.state.get();
        if state == RoomState::Disconnected || state == RoomState::Leaving {
            return;
        }
        info!("Leaving room");
        inner.state.set(RoomState::Leaving);

        inner.peers.clear();
        inner.participants.clear();
        inner.restarts.borrow_mut().clear();
        drop(inner.join_result.borrow_mut().take());
        if inner.join_sent.replace(false) {
            inner.signalling.send_command(Command::LeaveRoom);
        }
        inner.media_manager.dispose();
        inner.published_flags.set(JOINED_FLAGS);
        drop(inner.local_id.borrow_mut().take());

        inner.state.set(RoomState::Disconnected);
    }

    /// Mutes or unmutes the microphone.
    ///
    /// Returns whether the microphone is unmuted now.
    ///
    /// # Errors
    ///
    /// See [`MediaManager::toggle_audio()`].
    pub async fn toggle_audio(&self) -> Result<bool, Traced<RoomError>> {
        self.0
            .media_manager
            .toggle_audio()
            .await
            .map_err(tracerr::map_from_and_wrap!())
    }

    /// Turns the camera off or on.
    ///
    /// Returns whether the camera is on now.
    ///
    /// # Errors
    ///
    /// See [`MediaManager::toggle_video()`].
    pub async fn toggle_video(&self) -> Result<bool, Traced<RoomError>> {
        self.0
            .media_manager
            .toggle_video()
            .await
            .map_err(tracerr::map_from_and_wrap!())
    }

    /// Starts or stops sharing the screen.
    ///
    /// Returns whether the screen is shared now.
    ///
    /// # Errors
    ///
    /// See [`MediaManager::toggle_screen_share()`].
    pub async fn toggle_screen_share(&self) -> Result<bool, Traced<RoomError>> {
        self.0
            .media_manager
            .toggle_screen_share()
            .await
            .map_err(tracerr::map_from_and_wrap!())
    }

    /// Sends a chat message to the room.
    ///
    /// # Errors
    ///
    /// With [`RoomError::NotJoined`] if this [`Room`] isn't joined.
    pub fn send_message(
        &self,
        content: String,
        kind: MessageKind,
    ) -> Result<(), Traced<RoomError>> {
        if self.0.state.get() != RoomState::Joined {
            return Err(tracerr::new!(RoomError::NotJoined));
        }
        self.0
            .signalling
            .send_command(Command::SendMessage { content, kind });
        Ok(())
    }

    /// Returns current [`RoomState`].
    #[inline]
    #[must_use]
    pub fn state(&self) -> RoomState {
        self.0.state.get()
    }

    /// Returns [`Stream`] of [`RoomState`] changes, starting with the current
    /// one.
    ///
    /// [`Stream`]: futures::Stream
    #[inline]
    pub fn on_state_change(&self) -> LocalBoxStream<'static, RoomState> {
        self.0.state.subscribe()
    }

    /// Returns ID the relay assigned to this client, once joined.
    #[must_use]
    pub fn local_id(&self) -> Option<UserId> {
        self.0.local_id.borrow().clone()
    }

    /// Returns all the remote room members.
    #[inline]
    #[must_use]
    pub fn participants(&self) -> Vec<Participant> {
        self.0.participants.all()
    }

    /// Returns the Peer Session Table of this [`Room`].
    #[inline]
    #[must_use]
    pub fn peers(&self) -> &PeerRepository {
        &self.0.peers
    }

    /// Returns [`MediaManager`] owning the local media of this [`Room`].
    #[inline]
    #[must_use]
    pub fn media_manager(&self) -> &MediaManager {
        &self.0.media_manager
    }

    /// Sets callback invoked when a remote member appears.
    pub fn on_participant_joined<F: Fn(Participant) + 'static>(&self, f: F) {
        self.0.participants.on_joined(f);
    }

    /// Sets callback invoked when a remote member leaves.
    pub fn on_participant_left<F: Fn(UserId) + 'static>(&self, f: F) {
        self.0.participants.on_left(f);
    }

    /// Sets callback invoked when a remote member changes its media flags.
    pub fn on_participant_updated<F: Fn(Participant) + 'static>(&self, f: F) {
        self.0.participants.on_updated(f);
    }

    /// Sets callback invoked on every track received from a remote member.
    pub fn on_remote_track<F>(&self, f: F)
    where
        F: Fn(UserId, remote::Track) + 'static,
    {
        self.0.on_remote_track.set_func(f);
    }

    /// Sets callback invoked on every [`NegotiationState`] change of a peer
    /// session.
    pub fn on_peer_state_change<F>(&self, f: F)
    where
        F: Fn(UserId, NegotiationState) + 'static,
    {
        self.0.on_peer_state_change.set_func(f);
    }

    /// Sets callback invoked when a peer session fails.
    pub fn on_peer_failed<F: Fn(UserId) + 'static>(&self, f: F) {
        self.0.on_peer_failed.set_func(f);
    }

    /// Sets callback invoked on every chat message.
    pub fn on_message<F: Fn(Message) + 'static>(&self, f: F) {
        self.0.on_message.set_func(f);
    }

    /// Sets callback invoked on errors not related to any user action.
    pub fn on_error<F: Fn(MeshroomError) + 'static>(&self, f: F) {
        self.0.on_error.set_func(f);
    }
}

/// Actual data of a [`Room`].
struct InnerRoom {
    /// Channel to the signalling relay.
    signalling: Rc<dyn SignallingChannel>,

    /// Owner of the local media.
    media_manager: MediaManager,

    /// Peer Session Table.
    peers: PeerRepository,

    /// Remote room members.
    participants: Participants,

    /// Current [`RoomState`].
    state: ObservableCell<RoomState>,

    /// ID the relay assigned to this client.
    local_id: RefCell<Option<UserId>>,

    /// Whether the relay has been asked to join.
    join_sent: Cell<bool>,

    /// Resolves the pending [`Room::join()`] call.
    join_result: RefCell<Option<oneshot::Sender<Result<(), RoomJoinError>>>>,

    /// Media flags last published to the relay.
    published_flags: Cell<MediaFlags>,

    /// How many times the session with a remote member has been re-created.
    restarts: RefCell<HashMap<UserId, u32>>,

    /// Inputs not taken by [`Room::run()`] yet.
    inputs: RefCell<Option<LocalBoxStream<'static, RoomInput>>>,

    /// Membership settings.
    conf: conf::Room,

    on_remote_track: Callback2<UserId, remote::Track>,

    on_peer_state_change: Callback2<UserId, NegotiationState>,

    on_peer_failed: Callback<UserId>,

    on_message: Callback<Message>,

    on_error: Callback<MeshroomError>,
}

impl InnerRoom {
    /// Dispatches the provided [`RoomInput`] to its handler.
    async fn handle(&self, input: RoomInput) {
        match input {
            RoomInput::Signal(event) => event.dispatch_with(self).await,
            RoomInput::Peer(event) => event.dispatch_with(self).await,
            RoomInput::LocalMedia(update) => {
                self.on_local_media_update(update).await;
            }
            RoomInput::ScreenShareEnded(track_id) => {
                self.on_screen_share_ended(&track_id).await;
            }
        }
    }

    /// Indicates whether this [`InnerRoom`] is [`RoomState::Joined`].
    fn is_joined(&self) -> bool {
        self.state.get() == RoomState::Joined
    }

    /// Returns ID the relay assigned to this client.
    fn local_id(&self) -> Option<UserId> {
        self.local_id.borrow().clone()
    }

    /// Reports the provided error via `on_error` callback.
    fn report(&self, err: Traced<RoomError>) {
        error!("{}", err.as_ref());
        self.on_error.call1(MeshroomError::from(err));
    }

    /// Publishes every media flag which differs from the last published one.
    fn publish_flags(&self, flags: MediaFlags) {
        let published = self.published_flags.replace(flags);
        if published.audio_enabled != flags.audio_enabled {
            self.signalling.send_command(Command::ToggleAudio {
                enabled: flags.audio_enabled,
            });
        }
        if published.video_enabled != flags.video_enabled {
            self.signalling.send_command(Command::ToggleVideo {
                enabled: flags.video_enabled,
            });
        }
        if published.screen_sharing != flags.screen_sharing {
            self.signalling.send_command(Command::ToggleScreenShare {
                enabled: flags.screen_sharing,
            });
        }
    }

    /// Sends the provided local offer to the provided remote member.
    fn send_offer(&self, to: &UserId, sdp: String) {
        self.signalling.send_command(Command::WebrtcOffer {
            offer: SessionDescription::offer(sdp),
            to_user_id: to.clone(),
        });
    }

    /// Creates a session with the provided remote member and sends it an
    /// offer, re-creating the session if it fails and restarts remain.
    async fn connect(&self, remote_id: UserId) {
        loop {
            let local_id = match self.local_id() {
                Some(id) => id,
                None => return,
            };
            let result = match self.peers.create(
                &local_id,
                remote_id.clone(),
                NegotiationRole::Offerer,
            ) {
                Ok(peer) => {
                    let tracks = self.media_manager.local_tracks();
                    peer.create_outgoing(&tracks)
                        .await
                        .map(|offer| self.send_offer(&remote_id, offer))
                }
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => return,
                Err(e) => {
                    if !self.session_failed(&remote_id, e) {
                        return;
                    }
                }
            }
        }
    }

    /// Destroys the failed session with the provided remote member.
    ///
    /// Returns whether the session should be re-created.
    fn session_failed(
        &self,
        remote_id: &UserId,
        err: Traced<PeerError>,
    ) -> bool {
        if let PeerError::Closed = err.as_ref() {
            debug!("Session with {} was destroyed meanwhile", remote_id);
            return false;
        }
        self.report(tracerr::map_from_and_new!(err));
        self.destroy_failed_session(remote_id)
    }

    /// Destroys the session with the provided remote member which has moved
    /// to [`NegotiationState::Failed`], isolating the failure.
    ///
    /// Returns whether the session should be re-created.
    fn destroy_failed_session(&self, remote_id: &UserId) -> bool {
        let role = self.peers.get(remote_id).map(|peer| {
            peer.fail();
            peer.role()
        });
        let _ = self.peers.remove(remote_id);
        self.on_peer_failed.call1(remote_id.clone());

        if role != Some(NegotiationRole::Offerer)
            || !self.is_joined()
            || !self.participants.contains(remote_id)
        {
            return false;
        }
        let mut restarts = self.restarts.borrow_mut();
        let restarted = restarts.entry(remote_id.clone()).or_default();
        if *restarted >= self.conf.max_session_restarts {
            warn!("Giving up session with {}", remote_id);
            return false;
        }
        *restarted += 1;
        info!(
            "Re-creating session with {}, attempt {}",
            remote_id, restarted,
        );
        true
    }

    /// Reacts on the provided negotiation step result of the session with
    /// the provided remote member.
    async fn after_negotiation(
        &self,
        remote_id: &UserId,
        result: Result<Option<String>, Traced<PeerError>>,
    ) {
        match result {
            Ok(Some(offer)) => self.send_offer(remote_id, offer),
            Ok(None) => (),
            Err(e) => {
                if self.session_failed(remote_id, e) {
                    self.connect(remote_id.clone()).await;
                }
            }
        }
    }

    /// Substitutes outbound tracks of every session and publishes changed
    /// media flags.
    ///
    /// Updates queued before a newer one are stale, so the current state of
    /// the [`MediaManager`] is applied instead of the queued snapshot.
    async fn on_local_media_update(&self, update: LocalMediaUpdate) {
        if !self.is_joined() {
            return;
        }
        if update.flags != self.media_manager.flags() {
            debug!("Applying current local media instead of a stale update");
        }
        self.publish_flags(self.media_manager.flags());
        let tracks = self.media_manager.local_tracks();
        for peer in self.peers.get_all() {
            let result = peer.update_local_tracks(&tracks).await;
            self.after_negotiation(peer.remote_id(), result).await;
        }
    }

    /// Stops the screen share the platform has ended, unless a newer one
    /// replaced it.
    async fn on_screen_share_ended(&self, track_id: &str) {
        if let Err(e) = self
            .media_manager
            .stop_screen_share_if_current(track_id)
            .await
        {
            self.report(tracerr::map_from_and_new!(e));
        }
    }

    /// Returns the session with the provided remote member, or `None` if the
    /// message from it is stale.
    fn peer_for(&self, remote_id: &UserId) -> Option<Rc<PeerConnection>> {
        if !self.is_joined() {
            debug!("Dropping message of {}: room isn't joined", remote_id);
            return None;
        }
        let peer = self.peers.get(remote_id);
        if peer.is_none() {
            debug!("Dropping message of {}: no session", remote_id);
        }
        peer
    }
}

#[async_trait(?Send)]
impl EventHandler for InnerRoom {
    type Output = ();

    /// Sets the authoritative member set and completes the join.
    async fn on_room_users(&self, user_id: UserId, users: Vec<Participant>) {
        if self.state.get() != RoomState::Joining {
            debug!("Dropping stale room-users");
            return;
        }
        info!("Joined room as {} with {} members", user_id, users.len());
        drop(self.local_id.borrow_mut().replace(user_id.clone()));
        self.participants
            .reset(users.into_iter().filter(|u| u.id != user_id));
        self.state.set(RoomState::Joined);

        self.publish_flags(self.media_manager.flags());
        if let Some(tx) = self.join_result.borrow_mut().take() {
            let _ = tx.send(Ok(()));
        }
    }

    /// Adds the member and offers it a session, as the newcomer never
    /// initiates.
    async fn on_user_joined(&self, user: Participant) {
        if !self.is_joined() {
            debug!("Dropping user-joined of {}: room isn't joined", user.id);
            return;
        }
        if Some(&user.id) == self.local_id.borrow().as_ref() {
            return;
        }
        let remote_id = user.id.clone();
        if !self.participants.insert(user) {
            debug!("Ignoring duplicate user-joined of {}", remote_id);
            return;
        }
        let _ = self.restarts.borrow_mut().remove(&remote_id);
        self.connect(remote_id).await;
    }

    async fn on_user_left(&self, user_id: UserId) {
        if !self.is_joined() {
            return;
        }
        let _ = self.participants.remove(&user_id);
        let _ = self.peers.remove(&user_id);
        let _ = self.restarts.borrow_mut().remove(&user_id);
    }

    async fn on_user_media_updated(
        &self,
        user_id: UserId,
        media_state: MediaFlagsPatch,
    ) {
        if !self.is_joined() {
            return;
        }
        if self.participants.update(&user_id, &media_state).is_none() {
            debug!("Dropping media update of unknown {}", user_id);
        }
    }

    async fn on_new_message(&self, message: Message) {
        self.on_message.call1(message);
    }

    /// Answers the offer, creating a session if there is none yet.
    async fn on_webrtc_offer(
        &self,
        offer: SessionDescription,
        from_user_id: UserId,
    ) {
        if !self.is_joined()
            || offer.kind != SdpType::Offer
            || !self.participants.contains(&from_user_id)
        {
            debug!("Dropping stale offer of {}", from_user_id);
            return;
        }
        let local_id = match self.local_id() {
            Some(id) => id,
            None => return,
        };
        let peer = match self.peers.create(
            &local_id,
            from_user_id.clone(),
            NegotiationRole::Answerer,
        ) {
            Ok(peer) => peer,
            Err(e) => {
                let _ = self.session_failed(&from_user_id, e);
                return;
            }
        };

        let tracks = self.media_manager.local_tracks();
        match peer.handle_incoming_offer(offer.sdp, &tracks).await {
            Ok(Some(answer)) => {
                self.signalling.send_command(Command::WebrtcAnswer {
                    answer: SessionDescription::answer(answer),
                    to_user_id: from_user_id.clone(),
                });
                let result = peer.renegotiate_if_needed().await;
                self.after_negotiation(&from_user_id, result).await;
            }
            Ok(None) => (),
            Err(e) => {
                if self.session_failed(&from_user_id, e) {
                    self.connect(from_user_id).await;
                }
            }
        }
    }

    async fn on_webrtc_answer(
        &self,
        answer: SessionDescription,
        from_user_id: UserId,
    ) {
        if answer.kind != SdpType::Answer {
            debug!("Dropping malformed answer of {}", from_user_id);
            return;
        }
        if let Some(peer) = self.peer_for(&from_user_id) {
            let result = match peer.handle_incoming_answer(answer.sdp).await {
                Ok(()) => peer.renegotiate_if_needed().await,
                Err(e) => Err(e),
            };
            self.after_negotiation(&from_user_id, result).await;
        }
    }

    async fn on_ice_candidate(
        &self,
        candidate: IceCandidate,
        from_user_id: UserId,
    ) {
        if let Some(peer) = self.peer_for(&from_user_id) {
            let result = peer
                .handle_incoming_candidate(candidate)
                .await
                .map(|_| None);
            self.after_negotiation(&from_user_id, result).await;
        }
    }

    /// Fails the pending join, or reports the relay error otherwise.
    async fn on_error(&self, message: String) {
        if self.state.get() != RoomState::Joining {
            self.report(tracerr::new!(RoomError::Relay(message)));
            return;
        }
        let err = if message.contains("Room not found") {
            RoomJoinError::RoomNotFound
        } else if message.contains("Invalid password") {
            RoomJoinError::InvalidPassword
        } else {
            RoomJoinError::Rejected(message)
        };
        warn!("Join rejected: {}", err);

        self.join_sent.set(false);
        self.media_manager.dispose();
        self.state.set(RoomState::Disconnected);
        if let Some(tx) = self.join_result.borrow_mut().take() {
            let _ = tx.send(Err(err));
        }
    }
}

#[async_trait(?Send)]
impl PeerEventHandler for InnerRoom {
    type Output = ();

    async fn on_ice_candidate_discovered(
        &self,
        remote_id: UserId,
        candidate: IceCandidate,
    ) {
        if self.is_joined() && self.peers.get(&remote_id).is_some() {
            self.signalling.send_command(Command::IceCandidate {
                candidate,
                to_user_id: remote_id,
            });
        }
    }

    async fn on_new_remote_track(
        &self,
        remote_id: UserId,
        track: Rc<dyn platform::MediaStreamTrack>,
    ) {
        let peer = match self.peers.get(&remote_id) {
            Some(peer) => peer,
            None => {
                track.stop();
                return;
            }
        };
        if let Some(track) = peer.add_remote_track(track) {
            debug!("Received {} track from {}", track.kind(), remote_id);
            self.on_remote_track.call2(remote_id.clone(), track);
            let result = peer.renegotiate_if_needed().await;
            self.after_negotiation(&remote_id, result).await;
        }
    }

    async fn on_connection_state_changed(
        &self,
        remote_id: UserId,
        state: PeerConnectionState,
    ) {
        debug!("Transport to {} is {:?}", remote_id, state);
        if state != PeerConnectionState::Failed
            || self.peers.get(&remote_id).is_none()
        {
            return;
        }
        error!("Transport to {} failed", remote_id);
        if self.destroy_failed_session(&remote_id) {
            self.connect(remote_id).await;
        }
    }

    async fn on_negotiation_state_changed(
        &self,
        remote_id: UserId,
        state: NegotiationState,
    ) {
        self.on_peer_state_change.call2(remote_id, state);
    }
}

impl Drop for InnerRoom {
    fn drop(&mut self) {
        if self.join_sent.get() {
            self.signalling.send_command(Command::LeaveRoom);
        }
        self.peers.clear();
        self.media_manager.dispose();
    }
}

//! Peer-to-peer transport capability.

use std::rc::Rc;

use async_trait::async_trait;
use meshroom_signalling_proto::IceCandidate;

use crate::conf::IceServer;

use super::{Error, MediaKind, MediaStreamTrack};

/// [RTCPeerConnectionState][1] representation.
///
/// [1]: https://w3.org/TR/webrtc/#rtcpeerconnectionstate-enum
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PeerConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// Remote session description applied to a [`RtcPeerConnection`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SdpType {
    /// SDP offer.
    Offer(String),

    /// SDP answer.
    Answer(String),
}

/// Transport of a single pairwise media session.
///
/// All the callbacks are invoked synchronously from inside the platform
/// event loop.
#[async_trait(?Send)]
pub trait RtcPeerConnection {
    /// Creates an SDP offer, sets it as the local description and returns
    /// it.
    ///
    /// # Errors
    ///
    /// If the platform fails to create or set the offer.
    async fn create_and_set_offer(&self) -> Result<String, Error>;

    /// Creates an SDP answer to the applied remote offer, sets it as the
    /// local description and returns it.
    ///
    /// # Errors
    ///
    /// If the platform fails to create or set the answer.
    async fn create_and_set_answer(&self) -> Result<String, Error>;

    /// Applies the provided remote description.
    ///
    /// # Errors
    ///
    /// If the description is malformed or doesn't fit the current
    /// signalling state.
    async fn set_remote_description(&self, sdp: SdpType) -> Result<(), Error>;

    /// Rolls back the local offer which hasn't been answered yet.
    ///
    /// # Errors
    ///
    /// If there is no local offer to roll back.
    async fn rollback(&self) -> Result<(), Error>;

    /// Supplies the provided remote ICE candidate to the transport.
    ///
    /// # Errors
    ///
    /// If the candidate is malformed or cannot be applied.
    async fn add_ice_candidate(
        &self,
        candidate: &IceCandidate,
    ) -> Result<(), Error>;

    /// Indicates whether an outbound track slot of the provided
    /// [`MediaKind`] has been negotiated already.
    fn has_sender(&self, kind: MediaKind) -> bool;

    /// Adds a new outbound track. Requires renegotiation to take effect.
    ///
    /// # Errors
    ///
    /// If the transport is closed.
    fn add_track(&self, track: Rc<dyn MediaStreamTrack>) -> Result<(), Error>;

    /// Replaces the track of an already negotiated outbound slot of the
    /// provided [`MediaKind`] without renegotiation. `None` makes the slot
    /// send nothing.
    ///
    /// # Errors
    ///
    /// If there is no such slot or the track doesn't fit it.
    async fn replace_track(
        &self,
        kind: MediaKind,
        track: Option<Rc<dyn MediaStreamTrack>>,
    ) -> Result<(), Error>;

    /// Sets a callback invoked on every received remote track.
    fn on_track(&self, f: Option<Box<dyn FnMut(Rc<dyn MediaStreamTrack>)>>);

    /// Sets a callback invoked on every discovered local ICE candidate.
    fn on_ice_candidate(&self, f: Option<Box<dyn FnMut(IceCandidate)>>);

    /// Sets a callback invoked on every [`PeerConnectionState`] change.
    fn on_connection_state_change(
        &self,
        f: Option<Box<dyn FnMut(PeerConnectionState)>>,
    );

    /// Closes this transport, releasing all its resources.
    fn close(&self);
}

/// Factory of [`RtcPeerConnection`]s.
pub trait RtcPeerConnectionFactory {
    /// Creates a new [`RtcPeerConnection`] using the provided ICE servers.
    ///
    /// # Errors
    ///
    /// If the platform fails to create a transport.
    fn create(
        &self,
        ice_servers: &[IceServer],
    ) -> Result<Rc<dyn RtcPeerConnection>, Error>;
}

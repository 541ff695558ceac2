//! Peer Session Table.

use std::{cell::RefCell, collections::HashMap, rc::Rc};

use futures::channel::mpsc;
use meshroom_signalling_proto::UserId;
use tracerr::Traced;

use crate::{conf::IceServer, log::prelude::*, platform};

use super::{NegotiationRole, PeerConnection, PeerError, PeerEvent};

/// [`PeerConnection`]s factory and repository, keyed by the remote
/// participant ID.
///
/// Holds at most one [`PeerConnection`] per remote participant.
pub struct PeerRepository {
    /// Remote participant ID to its [`PeerConnection`].
    peers: RefCell<HashMap<UserId, Rc<PeerConnection>>>,

    /// Factory of the transports for the created [`PeerConnection`]s.
    factory: Rc<dyn platform::RtcPeerConnectionFactory>,

    /// ICE servers every created [`PeerConnection`] is configured with.
    ice_servers: Vec<IceServer>,

    /// Sender that will be injected into all [`PeerConnection`]s created by
    /// this [`PeerRepository`].
    peer_events_sender: mpsc::UnboundedSender<PeerEvent>,
}

impl PeerRepository {
    /// Creates a new empty [`PeerRepository`].
    #[must_use]
    pub fn new(
        factory: Rc<dyn platform::RtcPeerConnectionFactory>,
        ice_servers: Vec<IceServer>,
        peer_events_sender: mpsc::UnboundedSender<PeerEvent>,
    ) -> Self {
        Self {
            peers: RefCell::default(),
            factory,
            ice_servers,
            peer_events_sender,
        }
    }

    /// Creates a new [`PeerConnection`] with the provided remote participant,
    /// or returns the existing one.
    ///
    /// `local_id` is used to decide which side yields when both send offers
    /// at once.
    ///
    /// # Errors
    ///
    /// If the transport cannot be created.
    pub fn create(
        &self,
        local_id: &UserId,
        remote_id: UserId,
        role: NegotiationRole,
    ) -> Result<Rc<PeerConnection>, Traced<PeerError>> {
        if let Some(peer) = self.get(&remote_id) {
            return Ok(peer);
        }
        let polite = local_id < &remote_id;
        let peer = PeerConnection::new(
            remote_id.clone(),
            role,
            polite,
            self.factory.as_ref(),
            &self.ice_servers,
            self.peer_events_sender.clone(),
        )
        .map_err(tracerr::wrap!())?;
        debug!("Created {} session with {}", role, remote_id);
        drop(self.peers.borrow_mut().insert(remote_id, Rc::clone(&peer)));
        Ok(peer)
    }

    /// Returns [`PeerConnection`] with the provided remote participant.
    #[inline]
    #[must_use]
    pub fn get(&self, remote_id: &UserId) -> Option<Rc<PeerConnection>> {
        self.peers.borrow().get(remote_id).cloned()
    }

    /// Returns all the stored [`PeerConnection`]s.
    #[must_use]
    pub fn get_all(&self) -> Vec<Rc<PeerConnection>> {
        self.peers.borrow().values().cloned().collect()
    }

    /// Returns IDs of all the remote participants having a
    /// [`PeerConnection`].
    #[must_use]
    pub fn remote_ids(&self) -> Vec<UserId> {
        self.peers.borrow().keys().cloned().collect()
    }

    /// Returns count of the stored [`PeerConnection`]s.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.peers.borrow().len()
    }

    /// Indicates whether there are no [`PeerConnection`]s.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.peers.borrow().is_empty()
    }

    /// Closes and removes [`PeerConnection`] with the provided remote
    /// participant.
    ///
    /// Returns `false` if there was no such [`PeerConnection`].
    pub fn remove(&self, remote_id: &UserId) -> bool {
        let removed = self.peers.borrow_mut().remove(remote_id);
        removed.map_or(false, |peer| {
            peer.close();
            debug!("Destroyed session with {}", remote_id);
            true
        })
    }

    /// Closes and removes all the [`PeerConnection`]s.
    pub fn clear(&self) {
        let peers: Vec<_> =
            self.peers.borrow_mut().drain().map(|(_, p)| p).collect();
        for peer in peers {
            peer.close();
        }
    }
}

impl Drop for PeerRepository {
    fn drop(&mut self) {
        self.clear();
    }
}

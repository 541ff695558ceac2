//! Remote ICE candidates received before the remote description.

use std::{cell::RefCell, collections::VecDeque};

use meshroom_signalling_proto::IceCandidate;

/// Ordered buffer of remote [`IceCandidate`]s which cannot be applied yet.
#[derive(Debug, Default)]
pub struct PendingCandidates(RefCell<VecDeque<IceCandidate>>);

impl PendingCandidates {
    /// Enqueues the provided [`IceCandidate`] after all the already buffered
    /// ones.
    #[inline]
    pub fn push(&self, candidate: IceCandidate) {
        self.0.borrow_mut().push_back(candidate);
    }

    /// Dequeues the earliest buffered [`IceCandidate`].
    #[inline]
    pub fn pop(&self) -> Option<IceCandidate> {
        self.0.borrow_mut().pop_front()
    }

    /// Returns count of the buffered [`IceCandidate`]s.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    /// Indicates whether there are no buffered [`IceCandidate`]s.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    /// Drops all the buffered [`IceCandidate`]s.
    #[inline]
    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }
}

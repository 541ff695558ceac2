//! Registry of the remote room members.

use std::{cell::RefCell, collections::HashMap};

use meshroom_signalling_proto::{MediaFlagsPatch, Participant, UserId};

use crate::utils::Callback;

/// Remote members of a room, as reported by the signalling relay.
///
/// Notifies the rendering layer about every change.
#[derive(Default)]
pub struct Participants {
    /// Remote members by their IDs.
    members: RefCell<HashMap<UserId, Participant>>,

    /// Callback invoked when a member appears.
    on_joined: Callback<Participant>,

    /// Callback invoked when a member disappears.
    on_left: Callback<UserId>,

    /// Callback invoked when a member's record changes.
    on_updated: Callback<Participant>,
}

impl Participants {
    /// Sets callback invoked when a member appears.
    #[inline]
    pub fn on_joined<F: Fn(Participant) + 'static>(&self, f: F) {
        self.on_joined.set_func(f);
    }

    /// Sets callback invoked when a member disappears.
    #[inline]
    pub fn on_left<F: Fn(UserId) + 'static>(&self, f: F) {
        self.on_left.set_func(f);
    }

    /// Sets callback invoked when a member's record changes.
    #[inline]
    pub fn on_updated<F: Fn(Participant) + 'static>(&self, f: F) {
        self.on_updated.set_func(f);
    }

    /// Replaces all the members with the provided ones.
    pub fn reset<I: IntoIterator<Item = Participant>>(&self, members: I) {
        self.clear();
        for member in members {
            let _ = self.insert(member);
        }
    }

    /// Adds the provided member.
    ///
    /// Returns `false` if a member with the same ID is present already, in
    /// which case nothing changes.
    pub fn insert(&self, member: Participant) -> bool {
        let added = {
            let mut members = self.members.borrow_mut();
            if members.contains_key(&member.id) {
                false
            } else {
                drop(members.insert(member.id.clone(), member.clone()));
                true
            }
        };
        if added {
            self.on_joined.call1(member);
        }
        added
    }

    /// Removes the member with the provided ID.
    pub fn remove(&self, id: &UserId) -> Option<Participant> {
        let removed = self.members.borrow_mut().remove(id);
        if removed.is_some() {
            self.on_left.call1(id.clone());
        }
        removed
    }

    /// Merges the provided flags into the record of the member with the
    /// provided ID.
    ///
    /// Returns the updated record, or `None` if there is no such member.
    pub fn update(
        &self,
        id: &UserId,
        patch: &MediaFlagsPatch,
    ) -> Option<Participant> {
        let updated = self.members.borrow_mut().get_mut(id).map(|member| {
            member.media.apply(patch);
            member.clone()
        });
        if let Some(member) = &updated {
            self.on_updated.call1(member.clone());
        }
        updated
    }

    /// Returns record of the member with the provided ID.
    #[inline]
    #[must_use]
    pub fn get(&self, id: &UserId) -> Option<Participant> {
        self.members.borrow().get(id).cloned()
    }

    /// Indicates whether the member with the provided ID is present.
    #[inline]
    #[must_use]
    pub fn contains(&self, id: &UserId) -> bool {
        self.members.borrow().contains_key(id)
    }

    /// Returns all the members.
    #[must_use]
    pub fn all(&self) -> Vec<Participant> {
        self.members.borrow().values().cloned().collect()
    }

    /// Returns count of the members.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.borrow().len()
    }

    /// Indicates whether there are no members.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.borrow().is_empty()
    }

    /// Removes all the members.
    pub fn clear(&self) {
        let ids: Vec<_> =
            self.members.borrow_mut().drain().map(|(id, _)| id).collect();
        for id in ids {
            self.on_left.call1(id);
        }
    }
}

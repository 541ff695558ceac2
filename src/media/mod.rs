//! Local media capture state and media track handles.

mod manager;
pub mod track;

#[doc(inline)]
pub use self::{
    manager::{LocalMediaUpdate, LocalTracks, MediaManager, MediaManagerError},
    track::{local, remote},
};
#[doc(inline)]
pub use crate::platform::{MediaKind, MediaSourceKind};

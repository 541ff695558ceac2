//! Meshroom: orchestrator of mesh-topology WebRTC rooms.
//!
//! Every room member holds a direct peer session with every other member.
//! [`Room`] keeps this mesh consistent with the membership reported by a
//! signalling relay, while [`MediaManager`] owns the local capture state
//! shared by all the sessions.
//!
//! Platform capabilities (media capture, transports, rendering surfaces and
//! the relay connection) are consumed via traits from the [`platform`] and
//! [`signalling`] modules.
//!
//! [`MediaManager`]: media::MediaManager

// TODO: Remove `clippy::must_use_candidate` once the issue below is resolved:
//       https://github.com/rust-lang/rust-clippy/issues/4779
#![allow(clippy::module_name_repetitions, clippy::must_use_candidate)]
#![forbid(unsafe_code)]

pub mod audio_activity;
pub mod conf;
pub mod log;
pub mod media;
pub mod participants;
pub mod peer;
pub mod platform;
pub mod render;
pub mod room;
pub mod signalling;
pub mod utils;

#[doc(inline)]
pub use self::{
    audio_activity::{AudioActivity, AudioActivityDetector},
    conf::Conf,
    room::{Room, RoomError, RoomJoinError, RoomState},
    utils::MeshroomError,
};

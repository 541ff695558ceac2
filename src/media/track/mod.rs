//! Wrappers around platform media tracks.

pub mod local;
pub mod remote;

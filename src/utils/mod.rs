//! Miscellaneous utility structs and functions.

mod backoff_delayer;
mod callback;
mod errors;

#[doc(inline)]
pub use self::{
    backoff_delayer::BackoffDelayer,
    callback::{Callback, Callback2},
    errors::{Caused, MeshroomError},
};

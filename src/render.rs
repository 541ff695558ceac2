//! Bounded readiness check of tracks attached to render targets.

use std::rc::Rc;

use derive_more::Display;
use tracerr::Traced;

use crate::{
    conf,
    log::prelude::*,
    platform::{self, RenderTarget},
    utils::BackoffDelayer,
};

/// Track hasn't started rendering after all the attempts.
#[derive(Clone, Debug, Display, Eq, PartialEq)]
#[display(
    fmt = "Track {} is not rendered after {} attempts",
    track_id,
    attempts
)]
pub struct NotReadyError {
    /// ID of the attached track.
    pub track_id: String,

    /// Number of the performed attach attempts.
    pub attempts: u32,
}

/// Attaches the provided track to the provided [`RenderTarget`] and verifies
/// it's actually rendered, re-attaching it after a backoff delay otherwise.
///
/// # Errors
///
/// With [`NotReadyError`] if the track isn't rendered after
/// [`conf::Render::max_attempts`].
pub async fn attach_with_retry(
    target: &dyn RenderTarget,
    track: &Rc<dyn platform::MediaStreamTrack>,
    policy: &conf::Render,
) -> Result<(), Traced<NotReadyError>> {
    let mut delayer = BackoffDelayer::new(
        policy.initial_delay,
        policy.multiplier,
        policy.max_delay,
    );
    let max_attempts = policy.max_attempts.max(1);

    let mut attempt = 1;
    loop {
        target.attach(track);
        if target.is_rendering() {
            return Ok(());
        }
        if attempt >= max_attempts {
            return Err(tracerr::new!(NotReadyError {
                track_id: track.id(),
                attempts: attempt,
            }));
        }
        delayer.delay().await;
        if target.is_rendering() {
            return Ok(());
        }
        debug!("Re-attaching track {}, attempt {}", track.id(), attempt + 1);
        attempt += 1;
    }
}

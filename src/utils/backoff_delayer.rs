//! Delayer which increases delay time by provided multiplier on every delay
//! call.

use std::time::Duration;

/// Delayer which increases delay time by provided multiplier on every delay
/// call.
///
/// Delay time increasing will be stopped when [`BackoffDelayer::max_delay`]
/// of `current_delay` is reached. First delay will be
/// [`BackoffDelayer::current_delay`].
#[derive(Debug)]
pub struct BackoffDelayer {
    /// Delay of the next [`BackoffDelayer::delay`] call.
    ///
    /// Will be increased by [`BackoffDelayer::delay`] call.
    current_delay: Duration,

    /// Max delay for which this [`BackoffDelayer`] may delay.
    max_delay: Duration,

    /// The multiplier by which [`BackoffDelayer::current_delay`] will be
    /// multiplied on [`BackoffDelayer::delay`] call.
    multiplier: f32,
}

impl BackoffDelayer {
    /// Returns new [`BackoffDelayer`].
    #[inline]
    #[must_use]
    pub fn new(
        starting_delay: Duration,
        multiplier: f32,
        max_delay: Duration,
    ) -> Self {
        Self {
            current_delay: starting_delay,
            max_delay,
            multiplier: multiplier.max(0.0),
        }
    }

    /// Returns [`Duration`] for a next delay.
    fn next_delay(&mut self) -> Duration {
        if self.is_max_delay_reached() {
            self.max_delay
        } else {
            let delay = self.current_delay;
            #[allow(
                clippy::cast_possible_truncation,
                clippy::cast_precision_loss,
                clippy::cast_sign_loss
            )]
            let next = (self.current_delay.as_nanos() as f64
                * f64::from(self.multiplier))
            .round() as u64;
            self.current_delay = Duration::from_nanos(next);
            delay
        }
    }

    /// Returns `true` when max delay ([`BackoffDelayer::max_delay`]) is
    /// reached.
    #[inline]
    fn is_max_delay_reached(&self) -> bool {
        self.current_delay >= self.max_delay
    }

    /// Resolves after [`BackoffDelayer::current_delay`] delay.
    ///
    /// Next call of this function will delay
    /// [`BackoffDelayer::current_delay`] * [`BackoffDelayer::multiplier`].
    pub async fn delay(&mut self) {
        tokio::time::sleep(self.next_delay()).await;
    }
}

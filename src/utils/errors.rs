//! Error reporting helpers.

use std::fmt::Display;

use derive_more::Display;
use tracerr::{Trace, Traced};

use crate::platform;

pub use meshroom_macro::Caused;

/// Representation of an error which can be caused by an error returned from
/// the platform side.
pub trait Caused {
    /// Type of the wrapped platform error.
    type Error;

    /// Returns name of the error.
    fn name(&self) -> &'static str;

    /// Returns platform error if it is the cause.
    fn cause(self) -> Option<Self::Error>;
}

/// Representation of an error reported to the rendering layer.
///
/// Contains platform error if it is the cause, and trace information.
#[derive(Clone, Debug, Display)]
#[display(fmt = "{}: {}\n{}", name, message, trace)]
pub struct MeshroomError {
    name: &'static str,
    message: String,
    trace: Trace,
    source: Option<platform::Error>,
}

impl MeshroomError {
    /// Returns name of the error.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns message of the error.
    #[inline]
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns trace information of the error.
    #[inline]
    #[must_use]
    pub fn trace(&self) -> &Trace {
        &self.trace
    }

    /// Returns platform error if it is the cause.
    #[inline]
    #[must_use]
    pub fn source(&self) -> Option<&platform::Error> {
        self.source.as_ref()
    }
}

impl<E> From<(E, Trace)> for MeshroomError
where
    E: Caused + Display,
    E::Error: Into<platform::Error>,
{
    fn from((err, trace): (E, Trace)) -> Self {
        Self {
            name: err.name(),
            message: err.to_string(),
            trace,
            source: err.cause().map(Into::into),
        }
    }
}

impl<E> From<Traced<E>> for MeshroomError
where
    E: Caused + Display,
    E::Error: Into<platform::Error>,
{
    #[inline]
    fn from(traced: Traced<E>) -> Self {
        Self::from(traced.into_parts())
    }
}

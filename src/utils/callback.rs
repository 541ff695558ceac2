//! Wrappers around callbacks provided by the rendering layer.

use std::cell::RefCell;

/// Boxed single argument callback function.
pub type Function<A> = Box<dyn Fn(A)>;

/// Wrapper for a single argument callback function.
pub struct Callback<A>(RefCell<Option<Function<A>>>);

impl<A> Callback<A> {
    /// Sets an inner [`Function`].
    #[inline]
    pub fn set_func<F: Fn(A) + 'static>(&self, f: F) {
        drop(self.0.borrow_mut().replace(Box::new(f)));
    }

    /// Indicates whether this [`Callback`] is set.
    #[inline]
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.0.borrow().as_ref().is_some()
    }

    /// Invokes underlying [`Function`] (if any) passing the single provided
    /// argument to it.
    #[inline]
    pub fn call1<T: Into<A>>(&self, arg: T) {
        if let Some(f) = self.0.borrow().as_ref() {
            f(arg.into());
        }
    }

    /// Removes an inner [`Function`].
    #[inline]
    pub fn clear(&self) {
        drop(self.0.borrow_mut().take());
    }
}

impl<A> Default for Callback<A> {
    #[inline]
    fn default() -> Self {
        Self(RefCell::new(None))
    }
}

/// Wrapper for a two arguments callback function.
pub struct Callback2<A, B>(RefCell<Option<Box<dyn Fn(A, B)>>>);

impl<A, B> Callback2<A, B> {
    /// Sets an inner function.
    #[inline]
    pub fn set_func<F: Fn(A, B) + 'static>(&self, f: F) {
        drop(self.0.borrow_mut().replace(Box::new(f)));
    }

    /// Invokes underlying function (if any) passing the two provided
    /// arguments to it.
    #[inline]
    pub fn call2<T: Into<A>, U: Into<B>>(&self, arg1: T, arg2: U) {
        if let Some(f) = self.0.borrow().as_ref() {
            f(arg1.into(), arg2.into());
        }
    }

    /// Removes an inner function.
    #[inline]
    pub fn clear(&self) {
        drop(self.0.borrow_mut().take());
    }
}

impl<A, B> Default for Callback2<A, B> {
    #[inline]
    fn default() -> Self {
        Self(RefCell::new(None))
    }
}

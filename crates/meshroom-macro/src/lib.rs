//! Macros for [Meshroom] session orchestrator.
//!
//! This crate is intended for inner use only by [Meshroom].
//!
//! [Meshroom]: ../meshroom/index.html

#![forbid(non_ascii_idents, unsafe_code)]

mod caused;
mod dispatchable;

use proc_macro::TokenStream;
use synstructure::decl_derive;

/// Turns an `enum` into a set of handler callbacks.
///
/// For `enum Foo` a `FooHandler` trait is generated with one `on_*` method
/// per variant (its name is the `snake_case`d variant name), and a
/// `Foo::dispatch_with()` method calling the matching handler method.
///
/// Named fields are passed as separate arguments in declaration order,
/// unnamed fields are passed as a single tuple, unit variants get no
/// arguments. Every method returns the associated `Output` type.
///
/// ```
/// use meshroom_macro::dispatchable;
///
/// #[dispatchable]
/// enum Signal {
///     Joined { user: String },
///     Left(String),
///     Ping,
/// }
///
/// #[derive(Default)]
/// struct Members(Vec<String>);
///
/// impl SignalHandler for Members {
///     type Output = usize;
///
///     fn on_joined(&mut self, user: String) -> usize {
///         self.0.push(user);
///         self.0.len()
///     }
///
///     fn on_left(&mut self, user: String) -> usize {
///         self.0.retain(|u| u != &user);
///         self.0.len()
///     }
///
///     fn on_ping(&mut self) -> usize {
///         self.0.len()
///     }
/// }
///
/// let mut members = Members::default();
/// let joined = Signal::Joined { user: "u1".into() };
/// assert_eq!(joined.dispatch_with(&mut members), 1);
/// assert_eq!(Signal::Left("u1".into()).dispatch_with(&mut members), 0);
/// assert_eq!(Signal::Ping.dispatch_with(&mut members), 0);
/// ```
///
/// # Arguments
///
/// - `self: <type>` changes the receiver of the generated methods (only
///   `&Self` and `&mut Self` are accepted), `&mut Self` is used by default;
/// - `async_trait(<args>)` makes the generated methods `async` and puts
///   `#[async_trait(<args>)]` onto the generated trait.
///
/// ```
/// use async_trait::async_trait;
/// use meshroom_macro::dispatchable;
///
/// #[dispatchable(self: &Self, async_trait(?Send))]
/// enum Event {
///     Ping(u32),
/// }
///
/// struct Pong;
///
/// #[async_trait(?Send)]
/// impl EventHandler for Pong {
///     type Output = u32;
///
///     async fn on_ping(&self, n: u32) -> u32 {
///         n + 1
///     }
/// }
///
/// let pong = futures::executor::block_on(Event::Ping(1).dispatch_with(&Pong));
/// assert_eq!(pong, 2);
/// ```
#[proc_macro_attribute]
pub fn dispatchable(args: TokenStream, input: TokenStream) -> TokenStream {
    let args = syn::parse_macro_input!(args as dispatchable::Args);
    let item = syn::parse_macro_input!(input as syn::ItemEnum);
    dispatchable::expand(item, &args)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}

decl_derive!([Caused, attributes(cause)] =>
/// Generates implementation of `Caused` trait for errors represented as enum
/// or struct.
///
/// # How to use
///
/// ### 1. Declare wrapper for platform error and enum for error variants.
///
/// The `cause()` method returns error if nested error has its type declared
/// as an argument of the attribute `#[cause(error = "path::to::Error")]`.
///
/// ```
/// use meshroom_macro::Caused;
///
/// # trait Caused {
/// #     type Error;
/// #     fn name(&self) -> &'static str;
/// #     fn cause(self) -> Option<Self::Error>;
/// # }
/// #
/// struct PlatformError;
///
/// #[derive(Caused)]
/// #[cause(error = "PlatformError")]
/// enum FooError {
///     Internal,
///     Platform(PlatformError),
/// }
///
/// let err = FooError::Internal;
/// assert_eq!(err.name(), "Internal");
/// assert!(err.cause().is_none());
///
/// let err = FooError::Platform(PlatformError);
/// assert!(err.cause().is_some());
/// ```
///
/// If enum variant has attribute `#[cause]` it will call the `cause()`
/// method on nested error.
///
/// ```
/// # use meshroom_macro::Caused;
/// #
/// # trait Caused {
/// #     type Error;
/// #     fn name(&self) -> &'static str;
/// #     fn cause(self) -> Option<Self::Error>;
/// # }
/// #
/// # struct PlatformError;
/// #
/// # #[derive(Caused)]
/// # #[cause(error = "PlatformError")]
/// # enum FooError {
/// #     Internal,
/// #     Platform(PlatformError),
/// # }
/// #
/// #[derive(Caused)]
/// #[cause(error = "PlatformError")]
/// enum BarError {
///     Foo(#[cause] FooError),
/// }
///
/// let err = BarError::Foo(FooError::Internal);
/// assert!(err.cause().is_none());
///
/// let err = BarError::Foo(FooError::Platform(PlatformError));
/// assert!(err.cause().is_some());
/// ```
caused::derive);

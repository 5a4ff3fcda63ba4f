//! Settle-once promises with chainable continuations.
//!
//! A [`Promise`] is created pending and settles exactly once, either
//! fulfilled with a value or rejected with a reason. Continuations attached
//! with [`then`](Promise::then), [`catch`](Promise::catch) and
//! [`finally`](Promise::finally) run once, in registration order, on
//! whichever thread settles the promise. No executor or thread pool is
//! involved: asynchrony comes from whoever holds the [`Resolver`].
//!
//! # Examples
//!
//! ```
//! use promise_chain::{Outcome, Promise};
//! use std::thread;
//!
//! let (promise, resolver) = Promise::<u32, String>::deferred();
//! let doubled = promise.then(|value| Promise::fulfilled(value * 2));
//!
//! thread::spawn(move || resolver.fulfill(21)).join().unwrap();
//! assert_eq!(doubled.peek(), Some(Outcome::Fulfilled(42)));
//! ```
//!
//! Promises are also futures, so any executor can wait on them:
//!
//! ```
//! use promise_chain::Promise;
//! use futures::executor::block_on;
//!
//! let promise = Promise::<&str, ()>::rejected(())
//!     .catch(|_| Some(Promise::fulfilled("recovered")));
//! assert_eq!(block_on(promise), Ok("recovered"));
//! ```
mod future;
mod outcome;
mod promise;
mod resolver;

pub use outcome::Outcome;
pub use promise::Promise;
pub use resolver::Resolver;

use thiserror::Error;

/// Misuse of a [`Resolver`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The promise already has an outcome.
    #[error("promise is already settled")]
    AlreadySettled,
    /// A promise was asked to adopt its own outcome.
    #[error("promise cannot be resolved with itself")]
    SelfAdoption,
}

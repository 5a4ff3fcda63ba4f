use std::fmt;

use crate::{Error, Outcome, Promise};

/// The settlement capability of one [`Promise`].
///
/// A resolver may be cloned and sent to other threads, but its promise
/// settles only once: the first of [`fulfill`](Self::fulfill),
/// [`reject`](Self::reject) or an adopted outcome wins, and every later
/// attempt fails with [`Error::AlreadySettled`]. The panicking methods treat
/// that as a programming error; the `try_` methods report it instead.
///
/// # Examples
///
/// ```
/// use promise_chain::{Error, Promise};
///
/// let (promise, resolver) = Promise::<&str, ()>::deferred();
/// assert!(!promise.is_settled());
/// resolver.fulfill("done");
/// assert!(promise.is_settled());
/// assert_eq!(resolver.try_reject(()), Err(Error::AlreadySettled));
/// ```
pub struct Resolver<T, E> {
    promise: Promise<T, E>,
}

impl<T, E> Clone for Resolver<T, E> {
    fn clone(&self) -> Self {
        Self {
            promise: self.promise.clone(),
        }
    }
}

impl<T, E> fmt::Debug for Resolver<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("promise", &self.promise)
            .finish()
    }
}

impl<T, E> Resolver<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    pub(crate) fn new(promise: Promise<T, E>) -> Self {
        Self { promise }
    }

    /// The promise this resolver settles.
    pub fn promise(&self) -> &Promise<T, E> {
        &self.promise
    }

    /// Fulfills the promise and runs its continuations on this thread.
    ///
    /// # Panics
    ///
    /// If the promise is already settled, or if a continuation panics.
    pub fn fulfill(&self, value: T) {
        self.settle(Outcome::Fulfilled(value))
    }

    /// Rejects the promise and runs its continuations on this thread.
    ///
    /// # Panics
    ///
    /// If the promise is already settled, or if a continuation panics.
    pub fn reject(&self, reason: E) {
        self.settle(Outcome::Rejected(reason))
    }

    /// Makes the promise follow `other`: it settles when `other` does, with
    /// the same outcome. Chains of adoption collapse to the final outcome.
    ///
    /// # Panics
    ///
    /// If the promise is already settled or `other` is the promise itself.
    pub fn resolve_with(&self, other: Promise<T, E>) {
        if let Err(err) = self.try_resolve_with(other) {
            panic!("cannot resolve promise: {err}");
        }
    }

    /// Settles with an outcome of either kind.
    ///
    /// # Panics
    ///
    /// If the promise is already settled.
    pub fn settle(&self, outcome: Outcome<T, E>) {
        if let Err(err) = self.try_settle(outcome) {
            panic!("cannot settle promise: {err}");
        }
    }

    pub fn try_fulfill(&self, value: T) -> Result<(), Error> {
        self.try_settle(Outcome::Fulfilled(value))
    }

    pub fn try_reject(&self, reason: E) -> Result<(), Error> {
        self.try_settle(Outcome::Rejected(reason))
    }

    pub fn try_resolve_with(&self, other: Promise<T, E>) -> Result<(), Error> {
        self.promise.adopt(other)
    }

    pub fn try_settle(&self, outcome: Outcome<T, E>) -> Result<(), Error> {
        self.promise.settle(outcome)
    }
}

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::task::Waker;

use parking_lot::Mutex;

use crate::{Error, Outcome, Resolver};

type Reaction<T, E> = Box<dyn FnOnce(Outcome<T, E>) + Send>;

type Job = Box<dyn FnOnce()>;

thread_local! {
    // Continuations waiting behind the outermost settlement on this thread.
    static PENDING: RefCell<Option<VecDeque<Job>>> = RefCell::new(None);
}

/// A value that settles once, in the future, as fulfilled or rejected.
///
/// Cloning a `Promise` yields another handle to the same settlement. Only
/// the matching [`Resolver`] can settle it.
///
/// # Examples
///
/// ```
/// use promise_chain::{Outcome, Promise};
///
/// let promise = Promise::<i32, String>::new(|resolver| resolver.fulfill(1))
///     .then(|value| Promise::fulfilled(value + 1))
///     .finally(|| None);
/// assert_eq!(promise.peek(), Some(Outcome::Fulfilled(2)));
/// ```
pub struct Promise<T, E> {
    inner: Arc<Mutex<Inner<T, E>>>,
}

struct Inner<T, E> {
    outcome: Option<Outcome<T, E>>,
    reactions: VecDeque<Reaction<T, E>>,
    wakers: Vec<Waker>,
}

impl<T, E> Clone for Promise<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T, E> fmt::Debug for Promise<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        let state = inner.outcome.as_ref().map_or("pending", Outcome::kind);
        f.debug_struct("Promise")
            .field("state", &state)
            .field("continuations", &inner.reactions.len())
            .finish()
    }
}

impl<T, E> Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// Creates a promise and runs `setup` on the spot with its [`Resolver`].
    ///
    /// `setup` may settle right away or hand the resolver to something that
    /// settles later, on any thread.
    ///
    /// ```
    /// use promise_chain::Promise;
    /// use std::{thread, time::Duration};
    ///
    /// let promise = Promise::<u64, ()>::new(|resolver| {
    ///     thread::spawn(move || {
    ///         thread::sleep(Duration::from_millis(10));
    ///         resolver.fulfill(42);
    ///     });
    /// });
    /// assert_eq!(futures::executor::block_on(promise), Ok(42));
    /// ```
    pub fn new<F>(setup: F) -> Self
    where
        F: FnOnce(Resolver<T, E>),
    {
        let (promise, resolver) = Self::deferred();
        setup(resolver);
        promise
    }

    /// A pending promise together with the resolver that settles it.
    pub fn deferred() -> (Self, Resolver<T, E>) {
        let promise = Self {
            inner: Arc::new(Mutex::new(Inner {
                outcome: None,
                reactions: VecDeque::new(),
                wakers: vec![],
            })),
        };
        let resolver = Resolver::new(promise.clone());
        (promise, resolver)
    }

    pub fn fulfilled(value: T) -> Self {
        Self::new(|resolver| resolver.fulfill(value))
    }

    pub fn rejected(reason: E) -> Self {
        Self::new(|resolver| resolver.reject(reason))
    }

    /// A new promise that adopts the outcome of `promise`.
    pub fn resolved_from(promise: Promise<T, E>) -> Self {
        Self::new(|resolver| resolver.resolve_with(promise))
    }

    pub fn is_settled(&self) -> bool {
        self.inner.lock().outcome.is_some()
    }

    /// A snapshot of the outcome, or `None` while pending.
    pub fn peek(&self) -> Option<Outcome<T, E>> {
        self.inner.lock().outcome.clone()
    }

    /// Chains `on_fulfilled`; the returned promise adopts whatever promise
    /// it returns. A rejection passes through untouched.
    pub fn then<U, F>(&self, on_fulfilled: F) -> Promise<U, E>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Promise<U, E> + Send + 'static,
    {
        self.then_or_else(on_fulfilled, |_| None)
    }

    /// Like [`then`](Self::then), with a rejection handler.
    ///
    /// When `on_rejected` returns a promise the child adopts it. When it
    /// returns `None` the child is rejected with the original reason.
    pub fn then_or_else<U, F, R>(&self, on_fulfilled: F, on_rejected: R) -> Promise<U, E>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Promise<U, E> + Send + 'static,
        R: FnOnce(E) -> Option<Promise<U, E>> + Send + 'static,
    {
        let (child, resolver) = Promise::deferred();
        self.defer(move |outcome| match outcome {
            Outcome::Fulfilled(value) => resolver.resolve_with(on_fulfilled(value)),
            Outcome::Rejected(reason) => match on_rejected(reason.clone()) {
                Some(recovery) => resolver.resolve_with(recovery),
                None => resolver.reject(reason),
            },
        });
        child
    }

    /// Handles a rejection. A fulfilled value passes through untouched.
    ///
    /// Returning a promise recovers (or swaps in a new reason); returning
    /// `None` re-rejects with the very same reason.
    ///
    /// ```
    /// use promise_chain::{Outcome, Promise};
    ///
    /// let promise = Promise::<u8, &str>::rejected("first")
    ///     .catch(|_| None)
    ///     .catch(|reason| Some(Promise::rejected(if reason == "first" { "second" } else { "?" })));
    /// assert_eq!(promise.peek(), Some(Outcome::Rejected("second")));
    /// ```
    pub fn catch<F>(&self, on_rejected: F) -> Promise<T, E>
    where
        F: FnOnce(E) -> Option<Promise<T, E>> + Send + 'static,
    {
        let (child, resolver) = Promise::deferred();
        self.defer(move |outcome| match outcome {
            Outcome::Fulfilled(value) => resolver.fulfill(value),
            Outcome::Rejected(reason) => match on_rejected(reason.clone()) {
                Some(recovery) => resolver.resolve_with(recovery),
                None => resolver.reject(reason),
            },
        });
        child
    }

    /// Runs `on_settled` whatever the outcome.
    ///
    /// If it returns a promise, the child adopts that promise instead of the
    /// original outcome; this may turn a fulfillment into a rejection or the
    /// other way round. `None` keeps the original outcome.
    pub fn finally<F>(&self, on_settled: F) -> Promise<T, E>
    where
        F: FnOnce() -> Option<Promise<T, E>> + Send + 'static,
    {
        let (child, resolver) = Promise::deferred();
        self.defer(move |outcome| match on_settled() {
            Some(update) => resolver.resolve_with(update),
            None => resolver.settle(outcome),
        });
        child
    }

    /// Runs `on_fulfilled` for its effect; the child fulfills with `()`.
    pub fn on_fulfilled<F>(&self, on_fulfilled: F) -> Promise<(), E>
    where
        F: FnOnce(T) + Send + 'static,
    {
        self.then(move |value| {
            on_fulfilled(value);
            Promise::fulfilled(())
        })
    }

    /// Runs `on_rejected` for its effect; the reason passes through.
    pub fn on_rejected<F>(&self, on_rejected: F) -> Promise<T, E>
    where
        F: FnOnce(E) + Send + 'static,
    {
        self.catch(move |reason| {
            on_rejected(reason);
            None
        })
    }

    /// Runs `on_settled` for its effect; the outcome passes through.
    pub fn on_settled<F>(&self, on_settled: F) -> Promise<T, E>
    where
        F: FnOnce() + Send + 'static,
    {
        self.finally(move || {
            on_settled();
            None
        })
    }

    pub(crate) fn settle(&self, outcome: Outcome<T, E>) -> Result<(), Error> {
        let (wakers, reactions) = {
            let mut inner = self.inner.lock();
            if inner.outcome.is_some() {
                return Err(Error::AlreadySettled);
            }
            inner.outcome = Some(outcome.clone());
            (
                std::mem::take(&mut inner.wakers),
                std::mem::take(&mut inner.reactions),
            )
        };
        tracing::trace!(
            outcome = outcome.kind(),
            continuations = reactions.len(),
            "promise settled"
        );

        for waker in wakers {
            waker.wake()
        }

        dispatch(reactions.into_iter().map(|reaction| {
            let outcome = outcome.clone();
            Box::new(move || reaction(outcome)) as Job
        }));
        Ok(())
    }

    pub(crate) fn adopt(&self, source: Promise<T, E>) -> Result<(), Error> {
        if Arc::ptr_eq(&self.inner, &source.inner) {
            return Err(Error::SelfAdoption);
        }
        if self.is_settled() {
            return Err(Error::AlreadySettled);
        }
        tracing::trace!("promise adopting another promise");
        let target = self.clone();
        source.defer(move |outcome| {
            if let Err(err) = target.settle(outcome) {
                panic!("cannot adopt outcome: {err}");
            }
        });
        Ok(())
    }

    /// Runs `reaction` now if settled, otherwise queues it.
    fn defer<F>(&self, reaction: F)
    where
        F: FnOnce(Outcome<T, E>) + Send + 'static,
    {
        let mut inner = self.inner.lock();
        let settled = inner.outcome.clone();
        match settled {
            Some(outcome) => {
                drop(inner);
                reaction(outcome);
            }
            None => inner.reactions.push_back(Box::new(reaction)),
        }
    }

    /// Returns the outcome, or remembers `waker` for when it arrives.
    pub(crate) fn poll_outcome(&self, waker: &Waker) -> Option<Outcome<T, E>> {
        // Wakers are only released at settlement, so a dropped future leaves
        // its wakers here until then.
        let mut inner = self.inner.lock();
        if inner.outcome.is_none() && !inner.wakers.iter().any(|w| w.will_wake(waker)) {
            inner.wakers.push(waker.clone());
        }
        inner.outcome.clone()
    }
}

impl<T, E> From<Result<T, E>> for Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    fn from(result: Result<T, E>) -> Self {
        Self::new(|resolver| resolver.settle(result.into()))
    }
}

/// Runs `jobs` in order on this thread.
///
/// The outermost call drains the thread's queue. A settlement made by a
/// running continuation appends its jobs to that queue and returns, so
/// chains of adoption settle in a loop rather than by recursion.
fn dispatch(jobs: impl Iterator<Item = Job>) {
    let outermost = PENDING.with(|pending| {
        let mut pending = pending.borrow_mut();
        match pending.as_mut() {
            Some(queue) => {
                queue.extend(jobs);
                false
            }
            None => {
                *pending = Some(jobs.collect());
                true
            }
        }
    });
    if !outermost {
        return;
    }

    let _drain = Drain;
    while let Some(job) =
        PENDING.with(|pending| pending.borrow_mut().as_mut().and_then(VecDeque::pop_front))
    {
        job();
    }
}

/// Resets the thread's queue once the outermost dispatch ends.
struct Drain;

impl Drop for Drain {
    /// After a panic the jobs still queued are never run.
    fn drop(&mut self) {
        let orphaned = PENDING.with(|pending| pending.borrow_mut().take());
        let dropped = orphaned.map_or(0, |queue| queue.len());
        if dropped > 0 {
            tracing::warn!(dropped, "continuation panicked during settlement");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Promise;
    use crate::{Error, Outcome};
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::sync::{mpsc, Arc, Mutex};
    use std::thread;

    fn recorder() -> (Arc<Mutex<Vec<usize>>>, impl Fn(usize) + Clone + Send + 'static) {
        let log = Arc::new(Mutex::new(vec![]));
        let sink = log.clone();
        (log, move |i| sink.lock().unwrap().push(i))
    }

    #[test]
    fn test_continuations_fire_in_registration_order() {
        let (promise, resolver) = Promise::<u8, ()>::deferred();
        let (log, record) = recorder();
        for i in 0..5 {
            let record = record.clone();
            promise.on_settled(move || record(i));
        }
        assert!(log.lock().unwrap().is_empty());
        resolver.fulfill(1);
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_continuations_are_cleared_after_settlement() {
        let (promise, resolver) = Promise::<u8, ()>::deferred();
        promise.on_settled(|| ());
        promise.on_settled(|| ());
        assert_eq!(promise.inner.lock().reactions.len(), 2);
        resolver.fulfill(1);
        assert!(promise.inner.lock().reactions.is_empty());
    }

    #[test]
    fn test_late_registration_runs_immediately() {
        let promise = Promise::<u8, ()>::fulfilled(3);
        let (log, record) = recorder();
        promise.on_fulfilled(move |value| record(value as usize));
        assert_eq!(*log.lock().unwrap(), vec![3]);
    }

    #[test]
    fn test_registration_during_dispatch_runs_immediately() {
        let (promise, resolver) = Promise::<u8, ()>::deferred();
        let log = Arc::new(Mutex::new(vec![]));
        let reentrant = promise.clone();
        let sink = log.clone();
        promise.on_settled(move || {
            assert!(reentrant.is_settled());
            let inner = sink.clone();
            reentrant.on_settled(move || inner.lock().unwrap().push("inner"));
            sink.lock().unwrap().push("after-register");
        });
        let sink = log.clone();
        promise.on_settled(move || sink.lock().unwrap().push("second"));
        resolver.fulfill(0);
        assert_eq!(*log.lock().unwrap(), vec!["inner", "after-register", "second"]);
    }

    #[test]
    fn test_nested_settlement_is_queued_not_recursed() {
        let (outer, outer_resolver) = Promise::<u8, ()>::deferred();
        let (nested, nested_resolver) = Promise::<u8, ()>::deferred();
        let (log, record) = recorder();
        {
            let record = record.clone();
            nested.on_settled(move || record(1));
        }
        {
            let record = record.clone();
            outer.on_settled(move || {
                nested_resolver.fulfill(2);
                assert!(nested.is_settled());
                record(0);
            });
        }
        outer.on_settled(move || record(2));
        outer_resolver.fulfill(1);
        assert_eq!(*log.lock().unwrap(), vec![0, 2, 1]);
    }

    #[test]
    fn test_settle_twice_is_rejected() {
        let promise = Promise::<u8, ()>::fulfilled(1);
        assert_eq!(
            promise.settle(Outcome::Fulfilled(2)),
            Err(Error::AlreadySettled)
        );
        assert_eq!(promise.settle(Outcome::Rejected(())), Err(Error::AlreadySettled));
        assert_eq!(promise.peek(), Some(Outcome::Fulfilled(1)));
    }

    #[test]
    fn test_adopt_self_is_rejected() {
        let (promise, _resolver) = Promise::<u8, ()>::deferred();
        assert_eq!(promise.adopt(promise.clone()), Err(Error::SelfAdoption));
        assert!(!promise.is_settled());
    }

    #[test]
    fn test_adopt_after_settlement_is_rejected() {
        let promise = Promise::<u8, ()>::fulfilled(1);
        let (other, _resolver) = Promise::deferred();
        assert_eq!(promise.adopt(other), Err(Error::AlreadySettled));
    }

    #[test]
    fn test_panicking_continuation_drops_the_queue() {
        let (promise, resolver) = Promise::<u8, ()>::deferred();
        let (log, record) = recorder();
        promise.on_settled(|| panic!("boom"));
        {
            let record = record.clone();
            promise.on_settled(move || record(1));
        }

        let result = catch_unwind(AssertUnwindSafe(|| resolver.fulfill(7)));
        assert!(result.is_err());
        assert!(promise.is_settled());
        assert!(log.lock().unwrap().is_empty());

        promise.on_settled(move || record(2));
        assert_eq!(*log.lock().unwrap(), vec![2]);
    }

    #[test]
    fn test_late_registration_survives_a_panicking_drain() {
        let (promise, resolver) = Promise::<u8, ()>::deferred();
        let (log, record) = recorder();
        let (started_tx, started_rx) = mpsc::channel();
        let (registered_tx, registered_rx) = mpsc::channel::<()>();
        promise.on_settled(move || {
            started_tx.send(()).unwrap();
            registered_rx.recv().unwrap();
            panic!("boom");
        });
        {
            let record = record.clone();
            promise.on_settled(move || record(1));
        }

        let late = promise.clone();
        let other = thread::spawn(move || {
            started_rx.recv().unwrap();
            let child = late.on_settled(move || record(2));
            registered_tx.send(()).unwrap();
            child.is_settled()
        });

        let result = catch_unwind(AssertUnwindSafe(|| resolver.fulfill(7)));
        assert!(result.is_err());
        assert!(other.join().expect("the registering thread panicked"));
        assert_eq!(*log.lock().unwrap(), vec![2]);
    }

    #[test]
    fn test_waker_registered_once_and_released_at_settlement() {
        let (promise, resolver) = Promise::<u8, ()>::deferred();
        let waker = futures::task::noop_waker();
        assert_eq!(promise.poll_outcome(&waker), None);
        assert_eq!(promise.poll_outcome(&waker), None);
        assert_eq!(promise.inner.lock().wakers.len(), 1);
        resolver.fulfill(4);
        assert!(promise.inner.lock().wakers.is_empty());
        assert_eq!(promise.poll_outcome(&waker), Some(Outcome::Fulfilled(4)));
    }

    #[test]
    fn test_debug_reports_state() {
        let (promise, resolver) = Promise::<u8, ()>::deferred();
        assert!(format!("{promise:?}").contains("pending"));
        resolver.reject(());
        assert!(format!("{promise:?}").contains("rejected"));
    }
}

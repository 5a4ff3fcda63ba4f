//! Awaiting a promise.
//!
//! A promise can be polled by any number of tasks at once. Each pending
//! poll leaves its waker behind and every waker is woken when the promise
//! settles, before its continuations run.
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::Promise;

impl<T, E> Future for Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.poll_outcome(cx.waker()) {
            Some(outcome) => Poll::Ready(outcome.into_result()),
            None => Poll::Pending,
        }
    }
}

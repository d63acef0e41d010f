//! Single-fire completion signals
//!
//! Repository calls return their value synchronously and, next to it, a
//! [`Completion`] that fires exactly once when the operation's background
//! part is done. The signal travels over a `tokio::sync::oneshot` channel, so
//! the single-fire guarantee comes from the sender being consumed.
//!
//! Inside a tokio runtime with [`CompletionMode::Deferred`] the signal is
//! sent from a spawned task after the caller got its value; otherwise it is
//! sent before the call returns.

use crate::config::CompletionMode;
use crate::core::error::RecordError;
use futures::FutureExt;
use std::future::Future;
use std::ops::Deref;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::oneshot::{self, error::TryRecvError};

type Outcome = Result<(), RecordError>;

/// Receiving half of a completion signal
///
/// Await it (it is a `Future`), bound the wait with [`Completion::wait`],
/// or hand it a callback with [`Completion::on_complete`].
#[derive(Debug)]
pub struct Completion {
    receiver: oneshot::Receiver<Outcome>,
}

impl Completion {
    /// Fire `outcome` according to `mode` and return the receiving half
    pub fn dispatch(mode: CompletionMode, outcome: Outcome) -> Self {
        let (sender, receiver) = oneshot::channel();
        match (mode, Handle::try_current()) {
            (CompletionMode::Deferred, Ok(handle)) => {
                handle.spawn(async move {
                    tokio::task::yield_now().await;
                    // receiver may already be gone; nobody is listening then
                    let _ = sender.send(outcome);
                });
            }
            _ => {
                let _ = sender.send(outcome);
            }
        }
        Self { receiver }
    }

    /// Already-fired signal
    pub fn ready(outcome: Outcome) -> Self {
        Self::dispatch(CompletionMode::Immediate, outcome)
    }

    /// Wait for the signal, failing with `CompletionTimedOut` after `timeout`
    pub async fn wait(self, timeout: Duration) -> Outcome {
        match tokio::time::timeout(timeout, self).await {
            Ok(outcome) => outcome,
            Err(_) => Err(RecordError::CompletionTimedOut {
                millis: timeout.as_millis(),
            }),
        }
    }

    /// Invoke `handler` exactly once with the outcome.
    ///
    /// Runs inline when the signal already fired, otherwise on a task of the
    /// current runtime (or by blocking when there is none).
    pub fn on_complete<F>(mut self, handler: F)
    where
        F: FnOnce(Outcome) + Send + 'static,
    {
        match self.receiver.try_recv() {
            Ok(outcome) => handler(outcome),
            Err(TryRecvError::Closed) => handler(Err(RecordError::CompletionDropped)),
            Err(TryRecvError::Empty) => match Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move { handler(self.await) });
                }
                Err(_) => handler(futures::executor::block_on(self)),
            },
        }
    }
}

impl Future for Completion {
    type Output = Outcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.receiver
            .poll_unpin(cx)
            .map(|received| received.unwrap_or(Err(RecordError::CompletionDropped)))
    }
}

/// A synchronously computed value plus its completion signal
#[derive(Debug)]
pub struct Fetched<T> {
    pub value: T,
    pub completion: Completion,
}

impl<T> Fetched<T> {
    pub fn new(value: T, completion: Completion) -> Self {
        Self { value, completion }
    }

    /// Drop the signal and keep the value
    pub fn into_value(self) -> T {
        self.value
    }

    /// Wait for the signal, then hand back the value
    pub async fn settle(self) -> Result<T, RecordError> {
        self.completion.await?;
        Ok(self.value)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Fetched<U> {
        Fetched {
            value: f(self.value),
            completion: self.completion,
        }
    }
}

impl<T> Deref for Fetched<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

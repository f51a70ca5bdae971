//! Synchronization primitives.
//!
//! - [`ResponseSender`] and [`ResponseReceiver`] carry the result of a request from the
//!   processing context to whoever waits for it.
//! - [`lock`] acquires a [`Mutex`] that is never poisoned.

use std::sync::{Mutex, MutexGuard};
use tokio::sync::oneshot;

/// Creates a connected pair of [`ResponseSender`] and [`ResponseReceiver`].
///
/// A response can be sent from the [`ResponseSender`] with a call to `send`, and received by the
/// [`ResponseReceiver`] with a call to `get`.
pub fn response_channels<T, E>() -> (ResponseSender<T, E>, ResponseReceiver<T, E>)
where
    T: Send,
    E: Send,
{
    let (sender, receiver) = oneshot::channel();
    (ResponseSender::new(sender), ResponseReceiver::new(receiver))
}

/// Receives a response from the associated [`ResponseSender`].
#[derive(Debug)]
pub struct ResponseReceiver<T, E> {
    inner: oneshot::Receiver<Result<T, E>>,
}

impl<T, E> ResponseReceiver<T, E>
where
    T: Send,
    E: Send,
{
    fn new(inner: oneshot::Receiver<Result<T, E>>) -> Self {
        Self { inner }
    }

    /// Gets the response from the [`ResponseSender`].
    ///
    /// This function returns [`None`] if the sender is dropped before sending the response.
    pub async fn get(self) -> Option<Result<T, E>> {
        self.inner.await.ok()
    }
}

/// Sends a response to the associated [`ResponseReceiver`].
#[derive(Debug)]
pub struct ResponseSender<T, E> {
    inner: oneshot::Sender<Result<T, E>>,
}

impl<T, E> ResponseSender<T, E> {
    fn new(inner: oneshot::Sender<Result<T, E>>) -> Self {
        Self { inner }
    }

    /// Send the given [`Result`] to the [`ResponseReceiver`].
    pub fn send(self, result: Result<T, E>) {
        let _ = self.inner.send(result);
    }
}

/// Locks the given mutex.
///
/// # Panics
///
/// Panics if the mutex is poisoned, which happens when a different thread panics while holding
/// the lock. Handlers are never invoked while a lock is held, so this only happens on bugs.
#[allow(clippy::expect_used)]
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().expect("mutex should not be poisoned")
}

//! Shared handles to the eventual result of a request.
//!
//! Every requester of the same logical request holds a clone of one
//! [`ResultHandle`]. The batch that owns the request holds the matching
//! [`Resolver`] and completes it exactly once; dropping the resolver without
//! completing it resolves every handle with [`BatchError::Abandoned`], so no
//! waiter is left hanging.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::oneshot;

use crate::error::{BatchError, BatchResult};

/// Cloneable future resolving to the outcome of one request.
pub struct ResultHandle<V> {
    inner: Shared<BoxFuture<'static, BatchResult<V>>>,
}

/// Completes the handles created alongside it.
pub struct Resolver<V> {
    sender: oneshot::Sender<BatchResult<V>>,
}

impl<V> ResultHandle<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Creates an unresolved handle and the resolver that completes it.
    pub fn pending() -> (Resolver<V>, Self) {
        let (sender, receiver) = oneshot::channel();
        let inner = async move {
            receiver
                .await
                .unwrap_or_else(|_| Err(BatchError::Abandoned))
        }
        .boxed()
        .shared();

        (Resolver { sender }, Self { inner })
    }

    /// Creates a handle that is already resolved.
    pub fn ready(result: BatchResult<V>) -> Self {
        Self {
            inner: futures::future::ready(result).boxed().shared(),
        }
    }

    /// Returns the outcome if some waiter already drove the handle to completion.
    pub fn peek(&self) -> Option<&BatchResult<V>> {
        self.inner.peek()
    }

    /// Whether the handle completed with an error.
    pub fn is_failed(&self) -> bool {
        matches!(self.peek(), Some(Err(_)))
    }
}

impl<V> Resolver<V> {
    /// Delivers the outcome to every handle. Handles dropped by their callers
    /// are ignored.
    pub fn resolve(self, result: BatchResult<V>) {
        let _ = self.sender.send(result);
    }
}

impl<V> Clone for ResultHandle<V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<V> Future for ResultHandle<V>
where
    V: Clone,
{
    type Output = BatchResult<V>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.get_mut().inner.poll_unpin(cx)
    }
}

impl<V> fmt::Debug for ResultHandle<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultHandle").finish_non_exhaustive()
    }
}

impl<V> fmt::Debug for Resolver<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("closed", &self.sender.is_closed())
            .finish()
    }
}

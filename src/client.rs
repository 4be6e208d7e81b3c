//! The protocol client contract and the connection state shared by its implementations.
//!
//! Every client owns exactly one transport, guarded by a `tokio::sync::Mutex` that is held
//! for a whole request/response exchange. Concurrent callers therefore queue up instead of
//! interleaving frames on the wire.
//!
//! Operations are cancelled by dropping their future (for example through
//! `tokio::time::timeout` or `tokio::select!`). A future dropped while an exchange is in
//! flight closes the transport, the client then reports `is_connected() == false` and must
//! be connected again before further use.
use crate::error::{Error, Result};
use crate::protocol::ProtocolType;
use crate::result::{BatchReadResult, BatchWriteResult, OperationResult, ReadResult, WriteResult};
use crate::value::Value;
use async_trait::async_trait;
use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, MutexGuard};

/// How the default batch operations react to a failed entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchPolicy {
    /// Attempt every entry.
    Continue,
    /// Stop after the first failed entry; the failure is the last result returned.
    StopOnFirstError,
}

/// Uniform asynchronous access to an addressable device.
///
/// No method returns `Err` or panics on device or transport failures; failures are reported
/// through the returned result values.
#[async_trait]
pub trait ProtocolClient: Send + Sync {
    fn protocol(&self) -> ProtocolType;

    /// Opens the transport. Returns `true` if the client is connected afterwards.
    ///
    /// Calling it on a connected client does nothing. A failed attempt leaves the client
    /// disconnected and can be retried.
    async fn connect(&self) -> bool;

    /// Closes the transport. Safe to call on a disconnected client.
    async fn disconnect(&self);

    /// Cached connection state; this does not probe the device.
    fn is_connected(&self) -> bool;

    async fn read(&self, address: &str, length: u16) -> ReadResult;

    async fn write(&self, address: &str, value: Value) -> WriteResult;

    fn batch_policy(&self) -> BatchPolicy {
        BatchPolicy::Continue
    }

    /// Reads one element from each address, strictly in order, on the same connection.
    async fn batch_read(&self, addresses: &[&str]) -> BatchReadResult {
        let mut batch = BatchReadResult::default();
        for address in addresses {
            let result = self.read(address, 1).await;
            let failed = !result.is_success();
            batch.results.push(result);
            if failed && self.batch_policy() == BatchPolicy::StopOnFirstError {
                break;
            }
        }
        batch
    }

    /// Writes each value, strictly in order, on the same connection.
    async fn batch_write(&self, values: &[(&str, Value)]) -> BatchWriteResult {
        let mut batch = BatchWriteResult::default();
        for (address, value) in values {
            let result = self.write(address, value.clone()).await;
            let failed = !result.is_success();
            batch.results.push(result);
            if failed && self.batch_policy() == BatchPolicy::StopOnFirstError {
                break;
            }
        }
        batch
    }

    /// Disconnects and marks the client unusable. Every later operation fails with
    /// [`Error::Disposed`].
    fn dispose(&self);
}

/// Transport and counter, only reachable through the lock.
pub(crate) struct Session<T> {
    link: Option<T>,
    sequence: u16,
}

/// Connection state shared by the concrete clients.
pub(crate) struct ClientCore<T> {
    endpoint: String,
    session: Mutex<Session<T>>,
    connected: AtomicBool,
    disposed: AtomicBool,
}

impl<T: Send> ClientCore<T> {
    pub(crate) fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            session: Mutex::new(Session {
                link: None,
                sequence: 0,
            }),
            connected: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
        }
    }

    pub(crate) fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire) && !self.disposed.load(Ordering::Acquire)
    }

    /// Fails fast if the client cannot issue a request right now.
    pub(crate) fn check_ready(&self) -> Result<()> {
        if self.disposed.load(Ordering::Acquire) {
            Err(Error::Disposed)
        } else if !self.connected.load(Ordering::Acquire) {
            Err(Error::NotConnected)
        } else {
            Ok(())
        }
    }

    pub(crate) async fn connect<F, Fut>(&self, open: F) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = io::Result<T>>,
    {
        if self.disposed.load(Ordering::Acquire) {
            log::warn!("Cannot connect to {}: client has been disposed", self.endpoint);
            return false;
        }
        let mut session = self.session.lock().await;
        if session.link.is_some() && self.connected.load(Ordering::Acquire) {
            return true;
        }
        match open().await {
            Ok(link) if !self.disposed.load(Ordering::Acquire) => {
                session.link = Some(link);
                self.connected.store(true, Ordering::Release);
                log::info!("Connected to {}", self.endpoint);
                true
            }
            Ok(_) => false,
            Err(error) => {
                session.link = None;
                self.connected.store(false, Ordering::Release);
                log::warn!("Cannot connect to {}: {error}", self.endpoint);
                false
            }
        }
    }

    pub(crate) async fn disconnect(&self) {
        let mut session = self.session.lock().await;
        if session.link.take().is_some() {
            log::info!("Disconnected from {}", self.endpoint);
        }
        self.connected.store(false, Ordering::Release);
    }

    pub(crate) fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.connected.store(false, Ordering::Release);
        match self.session.try_lock() {
            Ok(mut session) => {
                if session.link.take().is_some() {
                    log::info!("Disconnected from {} on dispose", self.endpoint);
                }
            }
            // The running exchange drops the link when it finishes.
            Err(_) => log::debug!("Dispose of {} deferred to the running exchange", self.endpoint),
        }
    }

    /// Acquires the transport for one request/response exchange.
    pub(crate) async fn begin(&self) -> Result<Exchange<'_, T>> {
        self.check_ready()?;
        let session = self.session.lock().await;
        self.check_ready()?;
        if session.link.is_none() {
            return Err(Error::NotConnected);
        }
        Ok(Exchange {
            core: self,
            session,
            settled: false,
        })
    }
}

/// Exclusive access to the transport for one exchange.
///
/// Dropping an exchange without [`Exchange::finish`] closes the transport, since the peer may
/// still be sending the response to a request nobody is waiting for.
pub(crate) struct Exchange<'a, T> {
    core: &'a ClientCore<T>,
    session: MutexGuard<'a, Session<T>>,
    settled: bool,
}

impl<T> Exchange<'_, T> {
    /// Next transaction/command id of this client, starting at 1 and wrapping at 65536.
    pub(crate) fn next_sequence(&mut self) -> u16 {
        self.session.sequence = self.session.sequence.wrapping_add(1);
        self.session.sequence
    }

    pub(crate) fn link(&mut self) -> Result<&mut T> {
        self.session.link.as_mut().ok_or(Error::NotConnected)
    }

    /// Ends the exchange. Timeouts and transport failures close the link.
    pub(crate) fn finish<R>(mut self, outcome: Result<R>) -> Result<R> {
        self.settled = true;
        if let Err(error) = &outcome {
            if error.breaks_link() {
                self.close(&error.to_string());
            }
        }
        if self.core.disposed.load(Ordering::Acquire) {
            self.session.link = None;
        }
        outcome
    }

    fn close(&mut self, reason: &str) {
        if self.session.link.take().is_some() {
            log::warn!("Closing connection to {}: {reason}", self.core.endpoint);
        }
        self.core.connected.store(false, Ordering::Release);
    }
}

impl<T> Drop for Exchange<'_, T> {
    fn drop(&mut self) {
        if !self.settled {
            self.close("exchange abandoned before completion");
        }
    }
}

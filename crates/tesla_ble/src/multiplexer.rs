//! Request multiplexer (C6): correlates inbound notifications to pending
//! outbound requests by the 16-byte UUID embedded in every Routable
//! Message, with per-request timeouts and transport-disconnect cancellation.
//!
//! The pending-request table and the transport's single write path are the
//! small critical section the design calls out: writes are serialized
//! through a `tokio::sync::Mutex` around the transport (the next `send`
//! waits for the previous one to finish), and the table itself sits behind
//! a `parking_lot::Mutex` for the short, synchronous lookups the dispatch
//! loop and `send_and_await` both need.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex};

use crate::codec::{decode_routable, RoutableMessage};
use crate::error::{Error, Result, TransportError};
use crate::transport::{BleTransportSend, TransportEvent};

/// Runs after a matching response arrives, before the result is handed to
/// the caller. Used to authenticate and decrypt an encrypted response;
/// returns the plaintext on success.
pub type PostHandler = Box<dyn FnOnce(&RoutableMessage) -> Result<Vec<u8>> + Send>;

/// What `send_and_await` hands back once a request completes.
pub enum PendingOutcome {
    /// No post-handler was supplied; the raw decoded message.
    Raw(RoutableMessage),
    /// The post-handler's output (typically decrypted plaintext).
    Decrypted(Vec<u8>),
}

struct PendingEntry {
    responder: oneshot::Sender<Result<PendingOutcome>>,
    post_handler: Option<PostHandler>,
}

/// Removes `uuid` from the pending table when dropped. Idempotent: the
/// dispatch loop or a timeout branch may have already removed the entry,
/// in which case this is a harmless no-op.
struct PendingGuard<'a> {
    pending: &'a Arc<Mutex<HashMap<[u8; 16], PendingEntry>>>,
    uuid: [u8; 16],
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.lock().remove(&self.uuid);
    }
}

/// Correlates outbound requests with inbound notifications over a single
/// [`BleTransportSend`] connection.
pub struct Multiplexer<T: BleTransportSend> {
    transport: AsyncMutex<T>,
    pending: Arc<Mutex<HashMap<[u8; 16], PendingEntry>>>,
    request_timeout: Duration,
}

impl<T> Multiplexer<T>
where
    T: BleTransportSend<Error = TransportError> + Send + 'static,
{
    /// Takes ownership of an already-connected transport and its event
    /// stream (obtained via `transport.take_events()`) and starts the
    /// background dispatch loop.
    ///
    /// The dispatch task is detached rather than tracked: it exits on its
    /// own once it sees a `Disconnected` event, which both `disconnect()`
    /// and a dropped transport's closed event channel eventually produce.
    pub fn new(transport: T, events: mpsc::UnboundedReceiver<TransportEvent>, request_timeout: Duration) -> Self {
        let pending: Arc<Mutex<HashMap<[u8; 16], PendingEntry>>> = Arc::new(Mutex::new(HashMap::new()));
        tokio::spawn(dispatch_loop(events, Arc::clone(&pending)));

        Multiplexer {
            transport: AsyncMutex::new(transport),
            pending,
            request_timeout,
        }
    }

    /// Register `uuid`, submit `outbound` to the transport, and await a
    /// correlated response (or timeout/disconnect).
    ///
    /// If the returned future is itself dropped before completing (a caller
    /// wrapping this in its own `select!`/timeout), the pending entry is
    /// still reclaimed: `_guard` removes it on drop regardless of how this
    /// function exits.
    pub async fn send_and_await(
        &self,
        outbound: Vec<u8>,
        uuid: [u8; 16],
        post_handler: Option<PostHandler>,
    ) -> Result<PendingOutcome> {
        let (responder, receiver) = oneshot::channel();
        self.pending.lock().insert(
            uuid,
            PendingEntry {
                responder,
                post_handler,
            },
        );
        let _guard = PendingGuard {
            pending: &self.pending,
            uuid,
        };

        let send_result = {
            let mut transport = self.transport.lock().await;
            transport.send(&outbound).await
        };
        if let Err(err) = send_result {
            return Err(Error::Transport(err));
        }

        tokio::select! {
            outcome = receiver => {
                outcome.map_err(|_| Error::Transport(TransportError::Disconnected))?
            }
            _ = tokio::time::sleep(self.request_timeout) => {
                Err(Error::Timeout)
            }
        }
    }

    /// Write `payload` directly to the transport without registering a
    /// pending request or awaiting any correlated response. Used by
    /// operations (key enrollment) whose envelope carries no UUID of its own
    /// and which only need the write acknowledged by the transport.
    pub async fn send(&self, payload: &[u8]) -> Result<()> {
        self.transport.lock().await.send(payload).await.map_err(Error::Transport)
    }

    pub async fn disconnect(&self) {
        self.transport.lock().await.disconnect().await;

        // `disconnect()` drives a `Disconnected` event through the dispatch
        // loop, which fails every pending request; nothing further to do
        // here beyond tearing down the underlying connection.
    }

    /// Disconnect and hand the bare transport back, for callers (the
    /// façade) that want to retry a connection without re-discovering a
    /// device from scratch.
    pub async fn into_transport(self) -> T {
        self.transport.lock().await.disconnect().await;
        self.transport.into_inner()
    }
}

async fn dispatch_loop(
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
    pending: Arc<Mutex<HashMap<[u8; 16], PendingEntry>>>,
) {
    while let Some(event) = events.recv().await {
        match event {
            TransportEvent::Message(bytes) => handle_message(&bytes, &pending),
            TransportEvent::Disconnected => {
                let mut table = pending.lock();
                for (_, entry) in table.drain() {
                    let _ = entry.responder.send(Err(Error::Transport(TransportError::Disconnected)));
                }
                return;
            }
        }
    }
}

fn handle_message(bytes: &[u8], pending: &Arc<Mutex<HashMap<[u8; 16], PendingEntry>>>) {
    let message = match decode_routable(bytes) {
        Ok(message) => message,
        Err(err) => {
            tracing::warn!(error = %err, "failed to decode inbound message; discarding");
            return;
        }
    };

    let uuid: [u8; 16] = match message.uuid.as_slice().try_into() {
        Ok(uuid) => uuid,
        Err(_) => {
            tracing::warn!("inbound message uuid is not 16 bytes; discarding");
            return;
        }
    };

    let entry = pending.lock().remove(&uuid);
    let Some(entry) = entry else {
        tracing::debug!(uuid = %hex::encode(uuid), "inbound message matched no pending request; discarding");
        return;
    };

    let outcome = match entry.post_handler {
        Some(handler) => handler(&message).map(PendingOutcome::Decrypted),
        None => Ok(PendingOutcome::Raw(message)),
    };
    let _ = entry.responder.send(outcome);
}

//! In-process [`super::BleTransport`] double used by the integration test
//! suite, gated behind the `mock` feature (or always in `#[cfg(test)]`
//! builds) rather than hand-rolled per call site.
//!
//! A [`MockTransport`]/[`MockVehicleHandle`] pair models the two ends of the
//! BLE link: the transport is what the façade under test drives, and the
//! handle is the test's "hand" on the simulated vehicle, letting it inspect
//! outbound writes and inject inbound notifications -- chunked however the
//! test likes, including the stale-gap and arbitrary-split scenarios the
//! reassembler has to handle from real hardware.

use std::time::Instant;

use tokio::sync::mpsc;

use crate::error::TransportError;

use super::{frame, DiscoveryContext, Reassembler, TransportEvent, MAX_MESSAGE_LEN};

pub struct MockTransport {
    connected: bool,
    chunk_size: usize,
    write_tx: mpsc::UnboundedSender<Vec<u8>>,
    raw_notify_rx: Option<mpsc::UnboundedReceiver<Vec<u8>>>,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    events_rx: Option<mpsc::UnboundedReceiver<TransportEvent>>,
}

/// The test's handle on the simulated vehicle side of the link.
pub struct MockVehicleHandle {
    write_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    inbound_reassembler: Reassembler,
    raw_notify_tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl MockTransport {
    /// `chunk_size` is the GATT write/notification chunk size this mock
    /// uses when nothing else is specified; individual test calls can
    /// still pass their own chunking via [`MockVehicleHandle::notify_chunked`].
    pub fn new(chunk_size: usize) -> (Self, MockVehicleHandle) {
        let (write_tx, write_rx) = mpsc::unbounded_channel();
        let (raw_notify_tx, raw_notify_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let transport = MockTransport {
            connected: false,
            chunk_size,
            write_tx,
            raw_notify_rx: Some(raw_notify_rx),
            events_tx,
            events_rx: Some(events_rx),
        };

        let vehicle = MockVehicleHandle {
            write_rx,
            inbound_reassembler: Reassembler::new(),
            raw_notify_tx,
        };

        (transport, vehicle)
    }
}

impl super::BleTransportSend for MockTransport {
    type Error = TransportError;
    type Device = ();

    async fn connect(&mut self, _device: Option<()>, _discovery: DiscoveryContext) -> Result<(), TransportError> {
        let mut raw_notify_rx = self
            .raw_notify_rx
            .take()
            .expect("MockTransport::connect called twice");
        let events_tx = self.events_tx.clone();

        tokio::spawn(async move {
            let mut reassembler = Reassembler::new();
            while let Some(chunk) = raw_notify_rx.recv().await {
                for message in reassembler.push_chunk(&chunk, Instant::now()) {
                    if events_tx.send(TransportEvent::Message(message)).is_err() {
                        return;
                    }
                }
            }
            let _ = events_tx.send(TransportEvent::Disconnected);
        });

        self.connected = true;
        Ok(())
    }

    async fn send(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        if payload.len() > MAX_MESSAGE_LEN {
            return Err(TransportError::PayloadTooLarge(payload.len()));
        }
        if !self.connected {
            return Err(TransportError::Disconnected);
        }

        let framed = frame(payload).expect("payload length already checked");
        for chunk in framed.chunks(self.chunk_size) {
            self.write_tx
                .send(chunk.to_vec())
                .map_err(|_| TransportError::Disconnected)?;
        }
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.connected = false;
        let _ = self.events_tx.send(TransportEvent::Disconnected);
    }

    fn take_events(&mut self) -> mpsc::UnboundedReceiver<TransportEvent> {
        self.events_rx.take().expect("take_events called without an active connection")
    }
}

impl MockVehicleHandle {
    /// Receive the next complete message the client transport wrote,
    /// reassembling raw write chunks exactly as the real vehicle would.
    pub async fn recv_client_message(&mut self) -> Option<Vec<u8>> {
        loop {
            let chunk = self.write_rx.recv().await?;
            let messages = self.inbound_reassembler.push_chunk_no_gap_check(&chunk);
            if let Some(message) = messages.into_iter().next() {
                return Some(message);
            }
        }
    }

    /// Simulate the vehicle notifying the client with a complete message,
    /// split into `chunk_size`-byte pieces.
    pub fn notify_chunked(&self, payload: &[u8], chunk_size: usize) {
        let framed = frame(payload).expect("test payload fits in one frame");
        for chunk in framed.chunks(chunk_size.max(1)) {
            // A disconnected client (dropped receiver) simply stops seeing
            // further notifications; nothing to report to the test.
            let _ = self.raw_notify_tx.send(chunk.to_vec());
        }
    }

    /// Send one raw, unframed byte slice as a single notification chunk --
    /// used by tests that want to control chunk boundaries precisely (e.g.
    /// splitting a frame's length header across two chunks).
    pub fn notify_raw_chunk(&self, chunk: &[u8]) {
        let _ = self.raw_notify_tx.send(chunk.to_vec());
    }
}

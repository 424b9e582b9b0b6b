//! BLE transport (C4): scanning/connecting to the vehicle, framing outbound
//! writes, and reassembling inbound notifications into whole messages.
//!
//! The transport is expressed as an async trait so the façade (C7) and the
//! multiplexer (C6) can be written once against [`BleTransport`] and run
//! either against real hardware ([`btleplug::BtleplugTransport`]) or an
//! in-process double ([`mock::MockTransport`]) in tests, the same way the
//! teacher crate abstracts hardware-backed keys behind `EcdsaKey`/
//! `SecureEcdsaKey` with a software implementation for tests.

pub mod btleplug_transport;
pub mod reassembler;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

use std::error::Error;

use tokio::sync::mpsc;

pub use reassembler::{frame, Reassembler, MAX_MESSAGE_LEN};

/// Events the transport delivers asynchronously, independent of any
/// in-flight `send`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A complete, reassembled message from the vehicle.
    Message(Vec<u8>),
    /// The BLE connection was lost. No further `Message` events will follow
    /// until a fresh `connect()`.
    Disconnected,
}

/// Governs how `connect()` picks a device when none is supplied by the
/// caller. Mirrors [`crate::config::DiscoveryMode`]; the transport layer
/// only needs the resulting prefix and timeout, not the full session config.
#[derive(Debug, Clone)]
pub struct DiscoveryContext {
    pub mode: crate::config::DiscoveryMode,
    /// Required local-name prefix under `VinPrefixValidation`/`VinPrefixPromptFilter`.
    pub name_prefix: Option<String>,
    pub scan_timeout: std::time::Duration,
}

/// Contract for a BLE transport carrying the Tesla vehicle service.
///
/// Implementations own exactly one underlying connection. `connect` is not
/// required to be idempotent at this layer (the façade is responsible for
/// that); calling it while already connected is implementation-defined.
#[trait_variant::make(BleTransportSend: Send)]
pub trait BleTransport {
    type Error: Error + Send + Sync + 'static;
    /// A platform-specific handle to a preselected device, as produced by a
    /// prior scan performed outside the core (e.g. by the UI layer under
    /// `VinPrefixPromptFilter`).
    type Device: Send;

    /// Scan for (or adopt a preselected) device, connect, discover the
    /// fixed Tesla service, and subscribe to RX notifications.
    async fn connect(&mut self, device: Option<Self::Device>, discovery: DiscoveryContext) -> Result<(), Self::Error>;

    /// Frame and write `payload` (must be `<= MAX_MESSAGE_LEN` bytes),
    /// chunked to the negotiated block length. Serialized with respect to
    /// any other in-flight `send` on this transport.
    async fn send(&mut self, payload: &[u8]) -> Result<(), Self::Error>;

    /// Cancel subscriptions, close the connection, and clear buffers.
    async fn disconnect(&mut self);

    /// Take ownership of the event stream. Must be called exactly once per
    /// `connect()`; the returned receiver yields every [`TransportEvent`]
    /// for the lifetime of the connection, ending with exactly one
    /// `Disconnected`.
    fn take_events(&mut self) -> mpsc::UnboundedReceiver<TransportEvent>;
}

//! An authenticated, encrypted command-and-state channel with a Tesla
//! vehicle over Bluetooth Low Energy.
//!
//! This crate is the cryptographic transport core: a framed message
//! transport over a fixed-UUID BLE service, a P-256 ECDH handshake that
//! authenticates a vehicle-supplied session context, an AES-GCM encrypted
//! request/response layer keyed per domain with anti-replay counters and
//! expiries, and a request/response multiplexer that correlates asynchronous
//! BLE notifications to outstanding requests.
//!
//! It does not implement a full vehicle command grammar, persist session
//! state across process restarts, discover multiple vehicles concurrently in
//! one [`Session`], or recover from a corrupted session other than by
//! re-handshaking. Profile/key persistence, UI, and platform permission
//! prompts are external collaborators this crate does not provide.
//!
//! [`Session`] is the main entry point: construct one with a transport (the
//! real [`transport::btleplug_transport::BtleplugTransport`] or, for tests,
//! [`transport::mock::MockTransport`]), `connect()`, and then `get_state()`
//! or `send_add_key_request()`.

pub mod codec;
pub mod config;
pub mod error;
mod multiplexer;
/// Generated protobuf types (the vendor wire schema), exposed for callers
/// that want to inspect a [`VehicleStateResult::decoded_response`] or
/// [`VehicleStateResult::vehicle_data`] beyond the accessors this crate
/// provides directly.
pub mod pb;
pub mod session;
mod session_state;
pub mod transport;
pub mod vin;

pub use codec::{Domain, KeyFormFactor, Role, VehicleDataCategory};
pub use config::{DiscoveryMode, SessionConfig};
pub use error::{AuthenticationError, ConfigError, Error, ProtocolError, Result, TransportError};
pub use session::{Session, VehicleStateResult};
pub use tesla_ble_common::crypto::PrivateKey;
pub use transport::btleplug_transport::BtleplugTransport;
pub use transport::{BleTransport, BleTransportSend};
pub use vin::Vin;

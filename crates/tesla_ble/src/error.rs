//! The crate-level error taxonomy (§7 of the design). Each variant is a
//! *kind*, not a single failure mode; library consumers match on these
//! variants instead of downcasting an opaque `anyhow::Error`, since the core
//! is meant to have a small, enumerable error surface.

use tesla_ble_common::{CryptoError, MetadataError};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("authentication error: {0}")]
    Authentication(#[from] AuthenticationError),

    #[error("vehicle reported an error: {reason}")]
    VehicleReported { reason: String },

    #[error("request timed out waiting for a response")]
    Timeout,

    #[error("cryptographic error: {0}")]
    Crypto(#[from] CryptoError),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("VIN must be exactly 17 ASCII characters, got {0:?}")]
    InvalidVin(String),
    #[error("discovery mode requires a caller-supplied device")]
    DiscoveryModeRequiresDevice,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("no vehicle advertisement matching the expected prefix found within the scan timeout")]
    ScanTimedOut,
    #[error("BLE adapter/GATT error: {0}")]
    Ble(String),
    #[error("permission to use Bluetooth was denied")]
    PermissionDenied,
    #[error("the BLE connection was lost")]
    Disconnected,
    #[error("payload of {0} bytes exceeds the 1024-byte frame limit")]
    PayloadTooLarge(usize),
}

impl From<btleplug::Error> for TransportError {
    fn from(value: btleplug::Error) -> Self {
        TransportError::Ble(value.to_string())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed wire message: {0}")]
    Malformed(String),
    #[error("message exceeds the 1024-byte maximum frame size ({0} bytes)")]
    OversizedFrame(usize),
    #[error("required field `{0}` was absent")]
    MissingField(&'static str),
    #[error("metadata canonicalization failed: {0}")]
    Metadata(#[from] MetadataError),
}

impl From<prost::DecodeError> for ProtocolError {
    fn from(value: prost::DecodeError) -> Self {
        ProtocolError::Malformed(value.to_string())
    }
}

impl From<prost::EncodeError> for ProtocolError {
    fn from(value: prost::EncodeError) -> Self {
        ProtocolError::Malformed(value.to_string())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthenticationError {
    #[error("session info HMAC verification failed")]
    SessionInfoTagMismatch,
    #[error("AES-GCM decryption of the response failed")]
    ResponseDecryptionFailed,
}

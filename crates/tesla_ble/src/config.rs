//! Tunable configuration for a session façade instance. There is no
//! persisted configuration surface in scope here (that lives with the
//! profile store, outside the core); this is just the handful of
//! constructor-time knobs named throughout the design.

use std::time::Duration;

/// How a BLE device is selected when no device is preselected by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryMode {
    /// Accept the first BLE advertisement seen during a scan, regardless of
    /// its local name.
    Unfiltered,
    /// Only accept advertisements whose local name begins with the
    /// VIN-derived prefix (see [`crate::vin::advertised_name_prefix`]).
    VinPrefixValidation,
    /// Device selection is performed by the UI layer and handed to
    /// `connect()`; the transport treats this identically to
    /// [`DiscoveryMode::VinPrefixValidation`] once a device is supplied, and
    /// rejects an attempt to scan on its own behalf.
    VinPrefixPromptFilter,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long `connect()` scans for a matching advertisement before
    /// failing with `TransportError::ScanTimedOut`.
    pub scan_timeout: Duration,
    /// How long `send_and_await` waits for a correlated response before
    /// failing with `Error::Timeout`.
    pub request_timeout: Duration,
    /// TTL (in seconds) given to `expires_at` on outbound encrypted commands.
    pub command_ttl_secs: u32,
    /// MTU requested from the platform BLE stack; best-effort.
    pub preferred_mtu: u16,
    /// Floor below which `block_length` is never halved.
    pub min_block_length: usize,
    /// `block_length` used when the negotiated MTU is unknown.
    pub default_block_length: usize,
    pub discovery_mode: DiscoveryMode,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            scan_timeout: Duration::from_secs(20),
            request_timeout: Duration::from_secs(10),
            command_ttl_secs: 10,
            preferred_mtu: 247,
            min_block_length: 20,
            default_block_length: 185,
            discovery_mode: DiscoveryMode::VinPrefixValidation,
        }
    }
}

impl SessionConfig {
    /// `block_length = min(preferred, max(floor, mtu - 3))`, falling back to
    /// `default_block_length` when `mtu` is unknown.
    pub fn block_length_for_mtu(&self, mtu: Option<u16>) -> usize {
        match mtu {
            Some(mtu) => {
                let usable = (mtu as i32 - 3).max(self.min_block_length as i32) as usize;
                usable.min(self.preferred_mtu as usize)
            }
            None => self.default_block_length,
        }
    }
}

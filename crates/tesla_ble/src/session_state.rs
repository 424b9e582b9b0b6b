//! Session state (C5): the per-domain cryptographic and counter state
//! established by a successful handshake.
//!
//! Owned exclusively by the façade. Mutated only through the handshake
//! (initial set) and an encrypted command send (`counter` increments).
//! Dropped on disconnect, handshake failure, response-authentication
//! failure, or an explicit reset, forcing a fresh handshake on next use.

use std::time::{Duration, Instant};

use tesla_ble_common::crypto::SessionKeys;

use crate::codec::Domain;

/// Cryptographic and counter state for one authenticated session with the
/// vehicle. `aes_key`/`session_info_key` are destroyed (the struct is
/// simply dropped) when the session is discarded; they never leave here.
pub struct SessionState {
    pub aes_key: [u8; 16],
    pub session_info_key: [u8; 32],
    counter: u32,
    pub epoch: Vec<u8>,
    pub vehicle_public_key: [u8; 65],
    pub client_public_key: [u8; 65],
    pub domain: Domain,

    /// `now_ms - clock_time * 1000` at handshake time, used to derive
    /// `vehicle_time_seconds()`.
    time_zero: Instant,
    clock_time_at_handshake: u32,
    /// High-water mark used to clamp `vehicle_time_seconds()` to be
    /// monotonic non-decreasing across host wall-clock jumps (§9).
    high_water_mark: u64,
}

impl SessionState {
    pub fn new(
        keys: SessionKeys,
        epoch: Vec<u8>,
        clock_time: u32,
        vehicle_public_key: [u8; 65],
        client_public_key: [u8; 65],
        domain: Domain,
        now: Instant,
    ) -> Self {
        SessionState {
            aes_key: keys.aes_key,
            session_info_key: keys.session_info_key,
            counter: 0,
            epoch,
            vehicle_public_key,
            client_public_key,
            domain,
            time_zero: now,
            clock_time_at_handshake: clock_time,
            high_water_mark: clock_time as u64,
        }
    }

    /// `counter := counter + 1`, returning the new value. The spec requires
    /// strictly increasing counters for the lifetime of the session; this
    /// is the only place `counter` is mutated.
    pub fn next_counter(&mut self) -> u32 {
        self.counter += 1;
        self.counter
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }

    /// `floor((now - time_zero) / 1000) + clock_time_at_handshake`, clamped
    /// to never go backwards relative to the previous call even if the host
    /// wall clock jumps.
    pub fn vehicle_time_seconds(&mut self, now: Instant) -> u32 {
        let elapsed = now.saturating_duration_since(self.time_zero);
        let computed = self.clock_time_at_handshake as u64 + elapsed.as_secs();
        let clamped = computed.max(self.high_water_mark);
        self.high_water_mark = clamped;
        clamped as u32
    }
}

/// Convenience for computing an expiry a fixed number of seconds out from
/// `vehicle_time_seconds()`.
pub fn expires_at(state: &mut SessionState, now: Instant, ttl: Duration) -> u32 {
    state.vehicle_time_seconds(now).saturating_add(ttl.as_secs() as u32)
}

//! Length-prefixed framing and fragment reassembly.
//!
//! This piece is implementation-agnostic: it knows nothing about BLE, GATT,
//! or `btleplug`. It is handed raw notification chunks as they arrive and
//! emits complete, length-delimited messages. Both [`super::btleplug::BtleplugTransport`]
//! and [`super::mock::MockTransport`] drive the exact same state machine so
//! the fragmentation/reassembly behavior is never duplicated or allowed to
//! drift between the production and test backends.

use std::time::{Duration, Instant};

/// Every logical message is prefixed with a 2-byte big-endian length; the
/// vehicle never sends (and this client never sends) a message larger than
/// this many bytes.
pub const MAX_MESSAGE_LEN: usize = 1024;

/// If more than this elapses between two notification chunks, any partial
/// buffer is assumed to belong to a truncated message (e.g. a reconnect
/// mid-frame) and is discarded rather than prepended to.
const STALE_GAP: Duration = Duration::from_millis(1000);

/// Frames an outbound payload as `len(2, BE) || payload`.
///
/// Returns `None` if `payload` exceeds [`MAX_MESSAGE_LEN`]; callers should
/// treat that as a caller bug (the codec never produces an oversized
/// envelope) rather than a recoverable transport error.
pub fn frame(payload: &[u8]) -> Option<Vec<u8>> {
    if payload.len() > MAX_MESSAGE_LEN {
        return None;
    }
    let mut out = Vec::with_capacity(payload.len() + 2);
    out.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    out.extend_from_slice(payload);
    Some(out)
}

/// Incremental length-prefixed frame reassembly over an unreliable,
/// chunk-at-a-time notification stream.
///
/// Owned exclusively by one transport connection; reset on reconnect.
pub struct Reassembler {
    buffer: Vec<u8>,
    last_chunk_at: Option<Instant>,
}

impl Reassembler {
    pub fn new() -> Self {
        Reassembler {
            buffer: Vec::new(),
            last_chunk_at: None,
        }
    }

    /// Feed one notification chunk. Returns every complete message the
    /// chunk completed (normally zero or one, but a single chunk could in
    /// principle complete one message and start buffering the next).
    pub fn push_chunk(&mut self, chunk: &[u8], now: Instant) -> Vec<Vec<u8>> {
        self.push_chunk_impl(chunk, Some(now))
    }

    /// Like [`Reassembler::push_chunk`], but never applies the stale-gap
    /// reset. Used by callers (and unit tests) that just want plain framing
    /// without wall-clock sensitivity.
    pub fn push_chunk_no_gap_check(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        self.push_chunk_impl(chunk, None)
    }

    fn push_chunk_impl(&mut self, chunk: &[u8], now: Option<Instant>) -> Vec<Vec<u8>> {
        if let Some(now) = now {
            if let Some(last) = self.last_chunk_at {
                if now.saturating_duration_since(last) > STALE_GAP {
                    tracing::debug!(
                        buffered = self.buffer.len(),
                        "discarding partial reassembly buffer after a stale gap"
                    );
                    self.buffer.clear();
                }
            }
            self.last_chunk_at = Some(now);
        }

        self.buffer.extend_from_slice(chunk);

        let mut messages = Vec::new();
        loop {
            if self.buffer.len() < 2 {
                break;
            }
            let len = u16::from_be_bytes([self.buffer[0], self.buffer[1]]) as usize;
            if len > MAX_MESSAGE_LEN {
                // Oversize guard: this can only happen if the stream is out of
                // sync (e.g. we resumed mid-frame after a stale-gap reset that
                // missed the true frame boundary). There is no way to recover
                // alignment, so drop everything buffered and wait for the next
                // frame to start cleanly.
                tracing::warn!(len, "oversized length header; resetting reassembly buffer");
                self.buffer.clear();
                break;
            }
            if self.buffer.len() < 2 + len {
                break;
            }
            let message = self.buffer[2..2 + len].to_vec();
            self.buffer.drain(0..2 + len);
            messages.push(message);
        }

        messages
    }

    /// Discard any partial buffer (used on disconnect).
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.last_chunk_at = None;
    }
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new()
    }
}

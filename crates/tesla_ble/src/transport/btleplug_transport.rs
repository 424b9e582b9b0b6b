//! Production [`super::BleTransport`] backed by `btleplug`.

use std::time::{Duration, Instant};

use btleplug::api::{
    Central, CharPropFlags, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::time;
use uuid::Uuid;

use crate::error::TransportError;

use super::{DiscoveryContext, Reassembler, TransportEvent, MAX_MESSAGE_LEN};

/// Tesla's fixed vehicle BLE service and its two characteristics.
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x00000211_b2d1_43f0_9b88_960cebf8b91e);
pub const TX_CHARACTERISTIC_UUID: Uuid = Uuid::from_u128(0x00000212_b2d1_43f0_9b88_960cebf8b91e);
pub const RX_CHARACTERISTIC_UUID: Uuid = Uuid::from_u128(0x00000213_b2d1_43f0_9b88_960cebf8b91e);

/// 16-bit pairing service advertised alongside the full vehicle service,
/// also usable as a scan filter.
pub const PAIRING_SERVICE_UUID: Uuid = Uuid::from_u128(0x00001122_0000_1000_8000_00805f9b34fb);

/// Which write mode is currently favored; flipped on repeated write failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PreferredWriteMode {
    WithResponse,
    WithoutResponse,
}

struct Connected {
    peripheral: Peripheral,
    tx_characteristic: Characteristic,
    write_mode: PreferredWriteMode,
    block_length: usize,
    min_block_length: usize,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
}

/// `btleplug`-backed [`super::BleTransport`]. Owns at most one connection at
/// a time.
pub struct BtleplugTransport {
    manager: Manager,
    preferred_mtu: u16,
    default_block_length: usize,
    min_block_length: usize,
    connected: Option<Connected>,
    events_rx: Option<mpsc::UnboundedReceiver<TransportEvent>>,
}

impl BtleplugTransport {
    pub async fn new(preferred_mtu: u16, default_block_length: usize, min_block_length: usize) -> Result<Self, TransportError> {
        let manager = Manager::new().await.map_err(TransportError::from)?;
        Ok(BtleplugTransport {
            manager,
            preferred_mtu,
            default_block_length,
            min_block_length,
            connected: None,
            events_rx: None,
        })
    }

    async fn first_adapter(&self) -> Result<Adapter, TransportError> {
        let adapters = self.manager.adapters().await.map_err(TransportError::from)?;
        adapters
            .into_iter()
            .next()
            .ok_or_else(|| TransportError::Ble("no Bluetooth adapter available".to_string()))
    }

    async fn discover(&self, adapter: &Adapter, discovery: &DiscoveryContext) -> Result<Peripheral, TransportError> {
        adapter
            .start_scan(ScanFilter {
                services: vec![SERVICE_UUID],
            })
            .await
            .map_err(TransportError::from)?;

        let deadline = Instant::now() + discovery.scan_timeout;
        loop {
            for peripheral in adapter.peripherals().await.map_err(TransportError::from)? {
                if matches_discovery(&peripheral, discovery).await {
                    let _ = adapter.stop_scan().await;
                    return Ok(peripheral);
                }
            }

            if Instant::now() >= deadline {
                let _ = adapter.stop_scan().await;
                return Err(TransportError::ScanTimedOut);
            }
            time::sleep(Duration::from_millis(200)).await;
        }
    }
}

async fn matches_discovery(peripheral: &Peripheral, discovery: &DiscoveryContext) -> bool {
    use crate::config::DiscoveryMode;

    match discovery.mode {
        DiscoveryMode::Unfiltered => true,
        DiscoveryMode::VinPrefixValidation | DiscoveryMode::VinPrefixPromptFilter => {
            let Some(prefix) = discovery.name_prefix.as_deref() else {
                return false;
            };
            let Ok(Some(properties)) = peripheral.properties().await else {
                return false;
            };
            properties
                .local_name
                .as_deref()
                .is_some_and(|name| name.starts_with(prefix))
        }
    }
}

impl super::BleTransportSend for BtleplugTransport {
    type Error = TransportError;
    type Device = Peripheral;

    async fn connect(&mut self, device: Option<Self::Device>, discovery: DiscoveryContext) -> Result<(), TransportError> {
        use crate::config::DiscoveryMode;

        let peripheral = match device {
            Some(peripheral) => peripheral,
            None => {
                if matches!(discovery.mode, DiscoveryMode::VinPrefixPromptFilter) {
                    return Err(TransportError::Ble(
                        "VinPrefixPromptFilter requires a caller-supplied device".to_string(),
                    ));
                }
                let adapter = self.first_adapter().await?;
                self.discover(&adapter, &discovery).await?
            }
        };

        peripheral.connect().await.map_err(TransportError::from)?;
        peripheral.discover_services().await.map_err(TransportError::from)?;

        let characteristics = peripheral.characteristics();
        let tx_characteristic = characteristics
            .iter()
            .find(|c| c.uuid == TX_CHARACTERISTIC_UUID)
            .cloned()
            .ok_or_else(|| TransportError::Ble("TX characteristic not found".to_string()))?;
        let rx_characteristic = characteristics
            .iter()
            .find(|c| c.uuid == RX_CHARACTERISTIC_UUID)
            .cloned()
            .ok_or_else(|| TransportError::Ble("RX characteristic not found".to_string()))?;

        peripheral
            .subscribe(&rx_characteristic)
            .await
            .map_err(TransportError::from)?;

        // `btleplug` has no portable, cross-platform MTU-request API; this is
        // the "best-effort" the spec allows for. We fall back to the
        // configured default block length rather than negotiating.
        tracing::debug!(
            requested_mtu = self.preferred_mtu,
            "MTU negotiation is best-effort and not exposed uniformly by the BLE stack; using configured default block length"
        );
        let block_length = self.default_block_length;

        let write_mode = if tx_characteristic.properties.contains(CharPropFlags::WRITE) {
            PreferredWriteMode::WithResponse
        } else {
            PreferredWriteMode::WithoutResponse
        };

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        self.events_rx = Some(events_rx);

        let mut notifications = peripheral.notifications().await.map_err(TransportError::from)?;
        let notify_tx = events_tx.clone();
        tokio::spawn(async move {
            let mut reassembler = Reassembler::new();
            while let Some(notification) = notifications.next().await {
                if notification.uuid != RX_CHARACTERISTIC_UUID {
                    continue;
                }
                for message in reassembler.push_chunk(&notification.value, Instant::now()) {
                    if notify_tx.send(TransportEvent::Message(message)).is_err() {
                        return;
                    }
                }
            }
            let _ = notify_tx.send(TransportEvent::Disconnected);
        });

        self.connected = Some(Connected {
            peripheral,
            tx_characteristic,
            write_mode,
            block_length,
            min_block_length: self.min_block_length,
            events_tx,
        });

        Ok(())
    }

    async fn send(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        if payload.len() > MAX_MESSAGE_LEN {
            return Err(TransportError::PayloadTooLarge(payload.len()));
        }
        let Some(connected) = self.connected.as_mut() else {
            return Err(TransportError::Disconnected);
        };

        let framed = super::frame(payload).expect("payload length already checked");

        for chunk in framed.chunks(connected.block_length) {
            write_with_fallback(connected, chunk).await?;
        }

        Ok(())
    }

    async fn disconnect(&mut self) {
        if let Some(connected) = self.connected.take() {
            let _ = connected.peripheral.disconnect().await;
            let _ = connected.events_tx.send(TransportEvent::Disconnected);
        }
    }

    fn take_events(&mut self) -> mpsc::UnboundedReceiver<TransportEvent> {
        self.events_rx.take().expect("take_events called without an active connection")
    }
}

/// Write one chunk, falling back to the other write mode on failure and
/// halving `block_length` (down to its floor) after repeated failures,
/// mirroring the teacher heuristic: some BLE stacks report transient
/// failures on the first write mode that clear on the second attempt.
async fn write_with_fallback(connected: &mut Connected, chunk: &[u8]) -> Result<(), TransportError> {
    let write_type = match connected.write_mode {
        PreferredWriteMode::WithResponse => WriteType::WithResponse,
        PreferredWriteMode::WithoutResponse => WriteType::WithoutResponse,
    };

    let first_attempt = connected
        .peripheral
        .write(&connected.tx_characteristic, chunk, write_type)
        .await;

    if first_attempt.is_ok() {
        return Ok(());
    }

    let fallback_type = match connected.write_mode {
        PreferredWriteMode::WithResponse => WriteType::WithoutResponse,
        PreferredWriteMode::WithoutResponse => WriteType::WithResponse,
    };

    let second_attempt = connected
        .peripheral
        .write(&connected.tx_characteristic, chunk, fallback_type)
        .await;

    match second_attempt {
        Ok(()) => {
            connected.write_mode = match connected.write_mode {
                PreferredWriteMode::WithResponse => PreferredWriteMode::WithoutResponse,
                PreferredWriteMode::WithoutResponse => PreferredWriteMode::WithResponse,
            };
            Ok(())
        }
        Err(err) => {
            connected.block_length = (connected.block_length / 2).max(connected.min_block_length);
            tracing::warn!(
                new_block_length = connected.block_length,
                "write failed in both modes, halving block length"
            );
            Err(TransportError::from(err))
        }
    }
}

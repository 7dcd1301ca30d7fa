//! BLE GATT serial link to an ELM327 adapter
//!
//! Cheap BLE OBD dongles bridge the ELM327 UART onto a GATT characteristic
//! pair: one notify characteristic for adapter-to-host bytes and one
//! writable characteristic for host-to-adapter bytes. Several incompatible
//! profiles are in the wild; the link probes the known ones after service
//! discovery unless the configuration pins a specific profile.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    bleuuid::uuid_from_u16, Central, CharPropFlags, Characteristic, Manager as _, Peripheral as _,
    ScanFilter, WriteType,
};
use btleplug::platform::{Manager, Peripheral};
use futures::StreamExt;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::config::{BleConfig, GattProfile};

use super::error::TransportError;
use super::link::{LinkEvent, ObdLink};

const EVENT_CHANNEL_CAPACITY: usize = 64;
const SCAN_POLL_INTERVAL: Duration = Duration::from_millis(250);

const NORDIC_UART_SERVICE: Uuid = Uuid::from_u128(0x6e400001_b5a3_f393_e0a9_e50e24dcca9e);
const NORDIC_UART_NOTIFY: Uuid = Uuid::from_u128(0x6e400003_b5a3_f393_e0a9_e50e24dcca9e);
const NORDIC_UART_WRITE: Uuid = Uuid::from_u128(0x6e400002_b5a3_f393_e0a9_e50e24dcca9e);

/// (service, notify characteristic, write characteristic) for a profile
fn profile_uuids(profile: GattProfile) -> (Uuid, Uuid, Uuid) {
    match profile {
        // LELink clones expose a single characteristic for both directions
        GattProfile::LeLink => (
            uuid_from_u16(0xFFE0),
            uuid_from_u16(0xFFE1),
            uuid_from_u16(0xFFE1),
        ),
        GattProfile::Veepeak => (
            uuid_from_u16(0xFFF0),
            uuid_from_u16(0xFFF1),
            uuid_from_u16(0xFFF2),
        ),
        GattProfile::NordicUart => (NORDIC_UART_SERVICE, NORDIC_UART_NOTIFY, NORDIC_UART_WRITE),
    }
}

const PROBE_ORDER: [GattProfile; 3] = [
    GattProfile::LeLink,
    GattProfile::Veepeak,
    GattProfile::NordicUart,
];

struct LinkState {
    peripheral: Peripheral,
    write_char: Characteristic,
    write_type: WriteType,
    notify_task: JoinHandle<()>,
}

/// [`ObdLink`] over a BLE GATT serial bridge
pub struct BleLink {
    config: BleConfig,
    events_tx: broadcast::Sender<LinkEvent>,
    state: tokio::sync::Mutex<Option<LinkState>>,
    connected: Arc<AtomicBool>,
}

impl BleLink {
    pub fn new(config: BleConfig) -> Self {
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            config,
            events_tx,
            state: tokio::sync::Mutex::new(None),
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    async fn find_peripheral(&self) -> Result<Peripheral, TransportError> {
        let manager = Manager::new()
            .await
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;
        let adapters = manager
            .adapters()
            .await
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;
        let adapter = adapters.into_iter().next().ok_or(TransportError::NoAdapter)?;

        adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;

        let deadline =
            tokio::time::Instant::now() + Duration::from_millis(self.config.connect_timeout_ms);
        let found = loop {
            let peripherals = adapter
                .peripherals()
                .await
                .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;
            let mut found = None;
            for peripheral in peripherals {
                let Ok(Some(properties)) = peripheral.properties().await else {
                    continue;
                };
                if self.matches_target(&properties.address.to_string(), properties.local_name.as_deref())
                {
                    found = Some(peripheral);
                    break;
                }
            }
            if let Some(peripheral) = found {
                break peripheral;
            }
            if tokio::time::Instant::now() >= deadline {
                let _ = adapter.stop_scan().await;
                return Err(TransportError::ConnectFailed(format!(
                    "adapter {} not found within {}ms",
                    self.config.address, self.config.connect_timeout_ms
                )));
            }
            tokio::time::sleep(SCAN_POLL_INTERVAL).await;
        };

        if let Err(e) = adapter.stop_scan().await {
            debug!(error = %e, "failed to stop scan cleanly");
        }
        Ok(found)
    }

    fn matches_target(&self, address: &str, local_name: Option<&str>) -> bool {
        if address.eq_ignore_ascii_case(&self.config.address) {
            return true;
        }
        // Platforms that hide the MAC address still report the local name
        local_name.is_some_and(|name| name.eq_ignore_ascii_case(&self.config.address))
    }

    fn resolve_profile(
        &self,
        peripheral: &Peripheral,
    ) -> Result<(GattProfile, Characteristic, Characteristic), TransportError> {
        let characteristics = peripheral.characteristics();
        let candidates: &[GattProfile] = match self.config.profile {
            Some(profile) => std::slice::from_ref(
                PROBE_ORDER
                    .iter()
                    .find(|p| **p == profile)
                    .unwrap_or(&PROBE_ORDER[0]),
            ),
            None => &PROBE_ORDER,
        };
        for &profile in candidates {
            let (_, notify_uuid, write_uuid) = profile_uuids(profile);
            let notify = characteristics.iter().find(|c| {
                c.uuid == notify_uuid
                    && c.properties
                        .intersects(CharPropFlags::NOTIFY | CharPropFlags::INDICATE)
            });
            let write = characteristics.iter().find(|c| {
                c.uuid == write_uuid
                    && c.properties
                        .intersects(CharPropFlags::WRITE | CharPropFlags::WRITE_WITHOUT_RESPONSE)
            });
            if let (Some(notify), Some(write)) = (notify, write) {
                return Ok((profile, notify.clone(), write.clone()));
            }
        }
        Err(TransportError::ProfileNotFound(self.config.address.clone()))
    }
}

#[async_trait]
impl ObdLink for BleLink {
    async fn open(&self) -> Result<(), TransportError> {
        let mut state = self.state.lock().await;
        if state.is_some() {
            return Ok(());
        }

        let peripheral = self.find_peripheral().await?;
        if !peripheral
            .is_connected()
            .await
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?
        {
            peripheral
                .connect()
                .await
                .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;
        }
        peripheral
            .discover_services()
            .await
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;

        let (profile, notify_char, write_char) = self.resolve_profile(&peripheral)?;
        let write_type = if write_char
            .properties
            .contains(CharPropFlags::WRITE_WITHOUT_RESPONSE)
        {
            WriteType::WithoutResponse
        } else {
            WriteType::WithResponse
        };
        info!(
            address = %self.config.address,
            profile = ?profile,
            "connected to BLE adapter"
        );

        peripheral
            .subscribe(&notify_char)
            .await
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;
        let mut notifications = peripheral
            .notifications()
            .await
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;

        let tx = self.events_tx.clone();
        let connected = Arc::clone(&self.connected);
        let notify_uuid = notify_char.uuid;
        let notify_task = tokio::spawn(async move {
            while let Some(notification) = notifications.next().await {
                if notification.uuid != notify_uuid {
                    continue;
                }
                trace!(len = notification.value.len(), "ble notification");
                let _ = tx.send(LinkEvent::Data(notification.value));
            }
            // Stream end means the peripheral dropped off
            if connected.swap(false, Ordering::SeqCst) {
                warn!("ble notification stream closed");
                let _ = tx.send(LinkEvent::Closed);
            }
        });

        *state = Some(LinkState {
            peripheral,
            write_char,
            write_type,
            notify_task,
        });
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        let mut state = self.state.lock().await;
        self.connected.store(false, Ordering::SeqCst);
        if let Some(state) = state.take() {
            state.notify_task.abort();
            if let Err(e) = state.peripheral.disconnect().await {
                debug!(error = %e, "disconnect failed");
            }
        }
        Ok(())
    }

    async fn write(&self, data: &[u8]) -> Result<(), TransportError> {
        let state = self.state.lock().await;
        let state = state.as_ref().ok_or(TransportError::NotConnected)?;
        state
            .peripheral
            .write(&state.write_char, data, state.write_type)
            .await
            .map_err(|e| TransportError::WriteFailed(e.to_string()))
    }

    fn subscribe(&self) -> broadcast::Receiver<LinkEvent> {
        self.events_tx.subscribe()
    }

    fn is_open(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_profiles_use_distinct_services() {
        let (lelink, _, _) = profile_uuids(GattProfile::LeLink);
        let (veepeak, _, _) = profile_uuids(GattProfile::Veepeak);
        let (nordic, _, _) = profile_uuids(GattProfile::NordicUart);
        assert_ne!(lelink, veepeak);
        assert_ne!(veepeak, nordic);
    }

    #[test]
    fn lelink_shares_one_characteristic_for_both_directions() {
        let (_, notify, write) = profile_uuids(GattProfile::LeLink);
        assert_eq!(notify, write);
        let (_, notify, write) = profile_uuids(GattProfile::NordicUart);
        assert_ne!(notify, write);
    }
}

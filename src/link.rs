//! The radio link a [`crate::session::DeviceSession`] talks through, and its
//! Bluetooth Low Energy implementation.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::LinkError;
use crate::protocol::CONTROL_CHARACTERISTIC;
use crate::types::{Channel, LinkEvent};

/// Transport collaborator owned by a session.
///
/// Implementations deliver inbound payloads out of band, as [`LinkEvent`]s on a
/// channel the host drains into
/// [`DeviceSession::handle_event`](crate::session::DeviceSession::handle_event).
/// Each method suspends until the transport acknowledges the step.
#[async_trait]
pub trait RadioLink: Send {
    /// Establish the link and discover its characteristics.
    async fn connect(&mut self) -> Result<(), LinkError>;

    /// Enable notifications for `channel`.
    async fn subscribe(&mut self, channel: Channel) -> Result<(), LinkError>;

    /// Write one raw frame to the control characteristic.
    async fn send(&mut self, frame: &[u8]) -> Result<(), LinkError>;

    /// Tear the link down.
    async fn disconnect(&mut self) -> Result<(), LinkError>;
}

// ── LinkConfig ────────────────────────────────────────────────────────────────

/// Scan and connection settings for [`BleLink`].
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// BLE scan duration in seconds before giving up. Default: `15`.
    pub scan_timeout_secs: u64,
    /// Match devices whose advertised name starts with this string.
    /// Default: `"Muse"`.
    pub name_prefix: String,
    /// Hard limit on the BLE connect call. Default: `10`.
    pub connect_timeout_secs: u64,
    /// Hard limit on GATT service discovery. Default: `15`.
    pub discover_timeout_secs: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            scan_timeout_secs: 15,
            name_prefix: "Muse".into(),
            connect_timeout_secs: 10,
            discover_timeout_secs: 15,
        }
    }
}

// ── MuseDevice ────────────────────────────────────────────────────────────────

/// A headset found during a scan.
#[derive(Clone, Debug)]
pub struct MuseDevice {
    /// Advertised name, e.g. `"Muse-AB12"`.
    pub name: String,
    /// Platform identifier: a UUID on macOS / Windows, a MAC address on Linux.
    pub id: String,
    peripheral: Peripheral,
    adapter: Adapter,
}

async fn first_adapter() -> Result<Adapter, LinkError> {
    let manager = Manager::new().await?;
    let adapter = manager
        .adapters()
        .await?
        .into_iter()
        .next()
        .ok_or(LinkError::NoAdapter)?;

    // CoreBluetooth ignores scan requests until the manager reports PoweredOn.
    #[cfg(target_os = "macos")]
    {
        use btleplug::api::CentralState;

        let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
        loop {
            match adapter.adapter_state().await {
                Ok(CentralState::PoweredOn) => break,
                Ok(state) if tokio::time::Instant::now() >= deadline => {
                    warn!("macOS: adapter still {state:?} after 3 s, scanning anyway");
                    break;
                }
                Ok(state) => debug!("macOS: adapter state = {state:?}, waiting"),
                Err(e) => {
                    warn!("macOS: adapter_state() error: {e}");
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        tokio::time::sleep(Duration::from_millis(300)).await;
    }

    Ok(adapter)
}

async fn advertised_name(p: &Peripheral) -> Option<String> {
    p.properties().await.ok().flatten().and_then(|props| props.local_name)
}

// ── BleLink ───────────────────────────────────────────────────────────────────

/// State that only exists while a peripheral is connected.
struct Connected {
    chars: BTreeSet<Characteristic>,
    control: Characteristic,
    tasks: Vec<JoinHandle<()>>,
}

/// [`RadioLink`] over btleplug.
///
/// Notifications from every subscribed characteristic are mapped to a
/// [`Channel`] and forwarded on the receiver returned by [`BleLink::new`],
/// followed by [`LinkEvent::Disconnected`] when the adapter reports the
/// peripheral gone or the notification stream ends.
pub struct BleLink {
    device: MuseDevice,
    config: LinkConfig,
    events: mpsc::Sender<LinkEvent>,
    connected: Option<Connected>,
}

impl BleLink {
    /// Wrap a scanned device.  Returns the link and the receiver its events arrive on.
    pub fn new(device: MuseDevice, config: LinkConfig) -> (Self, mpsc::Receiver<LinkEvent>) {
        let (tx, rx) = mpsc::channel(256);
        let link = Self {
            device,
            config,
            events: tx,
            connected: None,
        };
        (link, rx)
    }

    pub fn device(&self) -> &MuseDevice {
        &self.device
    }

    /// Scan for `scan_timeout_secs` and return every matching device in range.
    pub async fn scan_all(config: &LinkConfig) -> Result<Vec<MuseDevice>, LinkError> {
        let adapter = first_adapter().await?;
        info!("scan_all: scanning for {} s …", config.scan_timeout_secs);
        adapter.start_scan(ScanFilter::default()).await?;
        tokio::time::sleep(Duration::from_secs(config.scan_timeout_secs)).await;
        adapter.stop_scan().await.ok();

        let mut found = vec![];
        for p in adapter.peripherals().await? {
            if let Some(name) = advertised_name(&p).await {
                if name.starts_with(&config.name_prefix) {
                    let id = p.id().to_string();
                    info!("scan_all: found {name}  id={id}");
                    found.push(MuseDevice {
                        name,
                        id,
                        peripheral: p,
                        adapter: adapter.clone(),
                    });
                }
            }
        }
        info!("scan_all: {} device(s) found", found.len());
        Ok(found)
    }

    /// Poll the scan results until the first matching device appears.
    pub async fn find_first(config: &LinkConfig) -> Result<MuseDevice, LinkError> {
        let adapter = first_adapter().await?;
        let prefix = config.name_prefix.as_str();
        info!(
            "Scanning for {prefix}* (timeout: {} s) …",
            config.scan_timeout_secs
        );
        adapter.start_scan(ScanFilter::default()).await?;

        let search = async {
            loop {
                for p in adapter.peripherals().await.unwrap_or_default() {
                    if let Some(name) = advertised_name(&p).await {
                        if name.starts_with(prefix) {
                            return (name, p);
                        }
                    }
                }
                tokio::time::sleep(Duration::from_millis(250)).await;
            }
        };
        let result =
            tokio::time::timeout(Duration::from_secs(config.scan_timeout_secs), search).await;
        adapter.stop_scan().await.ok();

        let (name, peripheral) = result.map_err(|_| LinkError::DeviceNotFound {
            prefix: prefix.to_owned(),
            secs: config.scan_timeout_secs,
        })?;
        info!("Found device: {name}");
        Ok(MuseDevice {
            name,
            id: peripheral.id().to_string(),
            peripheral,
            adapter,
        })
    }

    fn connected(&self) -> Result<&Connected, LinkError> {
        self.connected.as_ref().ok_or(LinkError::NotConnected)
    }

    fn find_char(chars: &BTreeSet<Characteristic>, uuid: Uuid) -> Result<Characteristic, LinkError> {
        chars
            .iter()
            .find(|c| c.uuid == uuid)
            .cloned()
            .ok_or(LinkError::CharacteristicNotFound(uuid))
    }

    /// Forward adapter disconnect events for this peripheral.
    fn spawn_disconnect_watcher(&self) -> JoinHandle<()> {
        let adapter = self.device.adapter.clone();
        let peripheral_id = self.device.peripheral.id();
        let tx = self.events.clone();
        tokio::spawn(async move {
            let mut events = match adapter.events().await {
                Ok(events) => events,
                Err(e) => {
                    warn!("Disconnect watcher: could not subscribe to adapter events: {e}");
                    return;
                }
            };
            while let Some(event) = events.next().await {
                if let CentralEvent::DeviceDisconnected(id) = event {
                    if id == peripheral_id {
                        info!("Disconnect watcher: device {id:?} disconnected.");
                        let _ = tx.send(LinkEvent::Disconnected).await;
                        break;
                    }
                }
            }
        })
    }

    /// Tag each notification with its channel and forward it.
    async fn spawn_notification_pump(&self) -> Result<JoinHandle<()>, LinkError> {
        let mut notifications = self.device.peripheral.notifications().await?;
        let tx = self.events.clone();
        Ok(tokio::spawn(async move {
            let mut count: u64 = 0;
            while let Some(notif) = notifications.next().await {
                count += 1;
                if count <= 5 || count % 500 == 0 {
                    debug!("notif #{count} uuid={} len={}", notif.uuid, notif.value.len());
                }
                let Some(channel) = Channel::from_uuid(notif.uuid) else {
                    debug!("Unknown notification from {}", notif.uuid);
                    continue;
                };
                let event = LinkEvent::Notification {
                    channel,
                    data: notif.value,
                };
                if tx.send(event).await.is_err() {
                    return;
                }
            }
            info!("Notification stream ended – device disconnected.");
            let _ = tx.send(LinkEvent::Disconnected).await;
        }))
    }

    fn stop_tasks(&mut self) {
        if let Some(connected) = self.connected.take() {
            for task in connected.tasks {
                task.abort();
            }
        }
    }
}

#[async_trait]
impl RadioLink for BleLink {
    async fn connect(&mut self) -> Result<(), LinkError> {
        self.stop_tasks();
        let peripheral = &self.device.peripheral;

        // BlueZ can block forever on Connect when the device is out of range.
        let secs = self.config.connect_timeout_secs;
        tokio::time::timeout(Duration::from_secs(secs), peripheral.connect())
            .await
            .map_err(|_| LinkError::Timeout { step: "connect", secs })??;

        // BlueZ reports the link up before the remote GATT cache is populated.
        #[cfg(target_os = "linux")]
        tokio::time::sleep(Duration::from_millis(600)).await;

        let secs = self.config.discover_timeout_secs;
        tokio::time::timeout(Duration::from_secs(secs), peripheral.discover_services())
            .await
            .map_err(|_| LinkError::Timeout { step: "discover_services", secs })??;
        info!("Connected and services discovered: {}", self.device.name);

        let chars = peripheral.characteristics();
        let control = Self::find_char(&chars, CONTROL_CHARACTERISTIC)?;
        let tasks = vec![
            self.spawn_notification_pump().await?,
            self.spawn_disconnect_watcher(),
        ];
        self.connected = Some(Connected {
            chars,
            control,
            tasks,
        });
        Ok(())
    }

    async fn subscribe(&mut self, channel: Channel) -> Result<(), LinkError> {
        let c = Self::find_char(&self.connected()?.chars, channel.uuid())?;
        self.device.peripheral.subscribe(&c).await?;
        debug!("subscribed to {channel}");
        Ok(())
    }

    async fn send(&mut self, frame: &[u8]) -> Result<(), LinkError> {
        let control = &self.connected()?.control;
        self.device
            .peripheral
            .write(control, frame, WriteType::WithoutResponse)
            .await?;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), LinkError> {
        self.stop_tasks();
        self.device.peripheral.disconnect().await?;
        Ok(())
    }
}

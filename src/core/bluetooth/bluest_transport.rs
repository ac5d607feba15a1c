//! Peripheral transport backed by `bluest`
//! Wraps the platform Bluetooth stack (CoreBluetooth, WinRT, BlueZ).

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use bluest::{Adapter, Characteristic, ConnectionEvent, Device};
use futures_util::StreamExt;
use log::{debug, error, info, warn};
use tokio::sync::{OnceCell, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::core::bluetooth::error::TransportError;
use crate::core::bluetooth::transport::{
    EventInbox, PeripheralTransport, Sink, Subscription, publish,
};
use crate::core::bluetooth::types::{
    AdapterState, CharacteristicNode, CharacteristicUpdate, DiscoveredPeripheral, PeripheralId,
    ScanRequest, ServiceNode, ServiceTree, TransportEvent, TransportEventKind,
};

impl From<bluest::Error> for TransportError {
    fn from(e: bluest::Error) -> Self {
        TransportError::Operation(e.to_string())
    }
}

type Sinks = Arc<Mutex<Vec<Sink>>>;

fn emit(sinks: &Sinks, event: TransportEvent) {
    publish(&mut lock(sinks), &event);
}

struct ScanTask {
    cancel_token: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct BluestTransport {
    adapter: OnceCell<Adapter>,
    /// Devices seen during scanning, by id
    devices: Arc<Mutex<HashMap<PeripheralId, Device>>>,
    sinks: Sinks,
    scan_task: Mutex<Option<ScanTask>>,
    /// Running notification forwarders, by peripheral and characteristic
    notifications: Mutex<HashMap<(PeripheralId, Uuid), CancellationToken>>,
    /// Running connection-event watchers, by peripheral
    watchers: Mutex<HashMap<PeripheralId, CancellationToken>>,
}

impl Default for BluestTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl BluestTransport {
    pub fn new() -> Self {
        Self {
            adapter: OnceCell::new(),
            devices: Arc::new(Mutex::new(HashMap::new())),
            sinks: Arc::new(Mutex::new(Vec::new())),
            scan_task: Mutex::new(None),
            notifications: Mutex::new(HashMap::new()),
            watchers: Mutex::new(HashMap::new()),
        }
    }

    fn adapter(&self) -> Result<&Adapter, TransportError> {
        self.adapter.get().ok_or(TransportError::NotInitialized)
    }

    fn device(&self, id: &PeripheralId) -> Result<Device, TransportError> {
        lock(&self.devices)
            .get(id)
            .cloned()
            .ok_or_else(|| TransportError::UnknownPeripheral(id.clone()))
    }

    async fn characteristic(
        &self,
        id: &PeripheralId,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<Characteristic, TransportError> {
        let device = self.device(id)?;
        let services = device.services().await?;
        let service = services
            .into_iter()
            .find(|s| s.uuid() == service)
            .ok_or(TransportError::ServiceNotFound(service))?;
        service
            .characteristics()
            .await?
            .into_iter()
            .find(|c| c.uuid() == characteristic)
            .ok_or(TransportError::CharacteristicNotFound(characteristic))
    }

    /// Emits `Disconnected` when the link to `device` drops, for as long as
    /// the connection lasts.
    fn watch_connection(&self, id: PeripheralId, adapter: Adapter, device: Device) {
        let cancel_token = CancellationToken::new();
        if let Some(previous) = lock(&self.watchers).insert(id.clone(), cancel_token.clone()) {
            previous.cancel();
        }
        let sinks = self.sinks.clone();

        tokio::spawn(async move {
            let mut events = match adapter.device_connection_events(&device).await {
                Ok(events) => events,
                Err(e) => {
                    error!("[{}] could not watch connection events: {}", id, e);
                    return;
                }
            };
            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => break,
                    event = events.next() => match event {
                        Some(ConnectionEvent::Disconnected) | None => {
                            info!("[{}] link dropped", id);
                            emit(&sinks, TransportEvent::Disconnected(id.clone()));
                            break;
                        }
                        Some(ConnectionEvent::Connected) => {}
                    },
                }
            }
        });
    }

    fn stop_forwarders(&self, id: &PeripheralId) {
        if let Some(token) = lock(&self.watchers).remove(id) {
            token.cancel();
        }
        lock(&self.notifications).retain(|(peripheral, _), token| {
            if peripheral == id {
                token.cancel();
                false
            } else {
                true
            }
        });
    }

    async fn run_scan(
        adapter: Adapter,
        devices: Arc<Mutex<HashMap<PeripheralId, Device>>>,
        sinks: Sinks,
        request: ScanRequest,
        cancel_token: CancellationToken,
    ) {
        let mut scan_stream = match adapter.scan(&request.service_filter).await {
            Ok(stream) => stream,
            Err(e) => {
                error!("Bluetooth scan could not start: {}", e);
                emit(&sinks, TransportEvent::ScanStopped);
                return;
            }
        };
        let deadline = tokio::time::sleep(request.duration);
        tokio::pin!(deadline);
        let mut seen = HashSet::new();

        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => break,
                _ = &mut deadline => {
                    info!("Scan duration elapsed");
                    break;
                }
                result = scan_stream.next() => {
                    let Some(found) = result else {
                        info!("Bluetooth scan stream has ended.");
                        break;
                    };
                    let id = PeripheralId::new(found.device.id().to_string());
                    if !seen.insert(id.clone()) && !request.allow_duplicates {
                        continue;
                    }
                    let name = found
                        .adv_data
                        .local_name
                        .clone()
                        .or_else(|| found.device.name().ok());
                    lock(&devices).insert(id.clone(), found.device.clone());

                    let mut discovered = DiscoveredPeripheral::new(id)
                        .with_service_hints(found.adv_data.services.clone());
                    discovered.name = name;
                    discovered.rssi = found.rssi;
                    emit(&sinks, TransportEvent::Discovered(discovered));
                }
            }
        }

        emit(&sinks, TransportEvent::ScanStopped);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl PeripheralTransport for BluestTransport {
    async fn initialize(&self) -> Result<(), TransportError> {
        self.adapter
            .get_or_try_init(|| async {
                Adapter::default().await.ok_or(TransportError::AdapterUnavailable)
            })
            .await?;
        info!("Bluetooth adapter found.");
        Ok(())
    }

    async fn adapter_state(&self) -> AdapterState {
        let Ok(adapter) = self.adapter() else {
            return AdapterState::Unknown;
        };
        match adapter.is_available().await {
            Ok(true) => AdapterState::PoweredOn,
            Ok(false) => AdapterState::PoweredOff,
            Err(e) => {
                warn!("Could not query adapter state: {}", e);
                AdapterState::Unknown
            }
        }
    }

    async fn request_enable(&self) -> Result<(), TransportError> {
        info!("Enabling the adapter programmatically is not supported here, use system settings");
        Ok(())
    }

    async fn start_scan(&self, request: &ScanRequest) -> Result<(), TransportError> {
        let adapter = self.adapter()?.clone();
        self.stop_scan().await?;

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(Self::run_scan(
            adapter,
            self.devices.clone(),
            self.sinks.clone(),
            request.clone(),
            cancel_token.clone(),
        ));
        *lock(&self.scan_task) = Some(ScanTask {
            cancel_token,
            handle,
        });
        info!("Device scan task started.");
        Ok(())
    }

    async fn stop_scan(&self) -> Result<(), TransportError> {
        let task = lock(&self.scan_task).take();
        if let Some(task) = task {
            task.cancel_token.cancel();
            if let Err(e) = task.handle.await {
                error!("Scan task finished with an unexpected join error: {:?}", e);
            }
        }
        Ok(())
    }

    async fn connect(&self, id: &PeripheralId) -> Result<(), TransportError> {
        let adapter = self.adapter()?.clone();
        let device = self.device(id)?;
        if !device.is_connected().await {
            adapter.connect_device(&device).await?;
        }
        emit(&self.sinks, TransportEvent::Connected(id.clone()));
        self.watch_connection(id.clone(), adapter, device);
        Ok(())
    }

    async fn disconnect(&self, id: &PeripheralId) -> Result<(), TransportError> {
        let adapter = self.adapter()?;
        let device = self.device(id)?;
        self.stop_forwarders(id);
        if device.is_connected().await {
            adapter.disconnect_device(&device).await?;
        } else {
            info!("Device {} not connected", id);
        }
        emit(&self.sinks, TransportEvent::Disconnected(id.clone()));
        Ok(())
    }

    async fn discover_services(&self, id: &PeripheralId) -> Result<ServiceTree, TransportError> {
        let device = self.device(id)?;
        let mut services = Vec::new();
        for service in device.services().await? {
            let mut characteristics = Vec::new();
            for characteristic in service.characteristics().await? {
                let descriptors = match characteristic.descriptors().await {
                    Ok(descriptors) => descriptors.iter().map(|d| d.uuid()).collect(),
                    Err(e) => {
                        warn!("[{}] descriptors of {} unavailable: {}", id, characteristic.uuid(), e);
                        Vec::new()
                    }
                };
                characteristics.push(CharacteristicNode::new(characteristic.uuid(), descriptors));
            }
            services.push(ServiceNode::new(service.uuid(), characteristics));
        }
        Ok(ServiceTree::new(services))
    }

    async fn read_rssi(&self, id: &PeripheralId) -> Result<i16, TransportError> {
        Ok(self.device(id)?.rssi().await?)
    }

    async fn read_descriptor(
        &self,
        id: &PeripheralId,
        service: Uuid,
        characteristic: Uuid,
        descriptor: Uuid,
    ) -> Result<Vec<u8>, TransportError> {
        let characteristic = self.characteristic(id, service, characteristic).await?;
        let descriptor = characteristic
            .descriptors()
            .await?
            .into_iter()
            .find(|d| d.uuid() == descriptor)
            .ok_or(TransportError::DescriptorNotFound(descriptor))?;
        Ok(descriptor.read().await?)
    }

    async fn read(
        &self,
        id: &PeripheralId,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<Vec<u8>, TransportError> {
        let characteristic = self.characteristic(id, service, characteristic).await?;
        Ok(characteristic.read().await?)
    }

    async fn write(
        &self,
        id: &PeripheralId,
        service: Uuid,
        characteristic: Uuid,
        data: &[u8],
        max_packet_size: usize,
    ) -> Result<(), TransportError> {
        let characteristic = self.characteristic(id, service, characteristic).await?;
        for chunk in data.chunks(max_packet_size.max(1)) {
            characteristic.write(chunk).await?;
        }
        Ok(())
    }

    async fn start_notification(
        &self,
        id: &PeripheralId,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<(), TransportError> {
        let key = (id.clone(), characteristic);
        if lock(&self.notifications).contains_key(&key) {
            debug!("[{}] already subscribed to {}", id, characteristic);
            return Ok(());
        }

        let notify_char = self.characteristic(id, service, characteristic).await?;
        let cancel_token = CancellationToken::new();
        let (ready_tx, ready_rx) = oneshot::channel();
        let sinks = self.sinks.clone();
        let peripheral_id = id.clone();
        let task_token = cancel_token.clone();

        tokio::spawn(async move {
            let mut stream = match notify_char.notify().await {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    stream
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(TransportError::from(e)));
                    return;
                }
            };
            loop {
                tokio::select! {
                    _ = task_token.cancelled() => break,
                    item = stream.next() => match item {
                        Some(Ok(value)) => emit(
                            &sinks,
                            TransportEvent::CharacteristicUpdated(CharacteristicUpdate {
                                peripheral_id: peripheral_id.clone(),
                                service,
                                characteristic,
                                value,
                            }),
                        ),
                        Some(Err(e)) => {
                            error!("Error in notification stream: {}", e);
                            break;
                        }
                        None => break,
                    },
                }
            }
            info!("Notification stream ended");
        });

        ready_rx
            .await
            .map_err(|_| TransportError::operation("notification task ended early"))??;
        lock(&self.notifications).insert(key, cancel_token);
        Ok(())
    }

    fn subscribe(&self, kind: TransportEventKind, inbox: EventInbox) -> Subscription {
        let subscription = Subscription::new(kind);
        lock(&self.sinks).push(Sink {
            kind,
            inbox,
            liveness: subscription.liveness(),
        });
        subscription
    }
}

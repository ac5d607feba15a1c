//! Transport event dispatch
//! One handler per event kind, all feeding a single ordered inbox that one
//! task drains. The subscriptions live exactly as long as the dispatcher.

use log::{debug, info};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::bluetooth::connection::ConnectionSequencer;
use crate::core::bluetooth::data_channel::DataChannel;
use crate::core::bluetooth::scanner::ScanController;
use crate::core::bluetooth::transport::{PeripheralTransport, Subscription};
use crate::core::bluetooth::types::{TransportEvent, TransportEventKind};

/// Routes each transport event to the component that owns it.
pub struct EventRouter<T: PeripheralTransport> {
    pub scanner: ScanController<T>,
    pub sequencer: ConnectionSequencer<T>,
    pub data: DataChannel<T>,
}

impl<T: PeripheralTransport> EventRouter<T> {
    pub async fn route(&self, event: TransportEvent) {
        match event {
            TransportEvent::Discovered(discovered) => self.scanner.on_discover(discovered).await,
            TransportEvent::ScanStopped => self.scanner.on_scan_stop().await,
            TransportEvent::Connected(id) => self.sequencer.on_connect_ack(&id).await,
            TransportEvent::Disconnected(id) => self.sequencer.on_disconnect(&id).await,
            TransportEvent::CharacteristicUpdated(update) => self.data.on_characteristic_update(update),
        }
    }
}

/// Owns the event subscriptions of one screen session.
pub struct EventDispatcher {
    subscriptions: Vec<Subscription>,
    shutdown: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl EventDispatcher {
    /// Registers one handler per event kind and starts draining the inbox.
    pub fn attach<T: PeripheralTransport>(transport: &T, router: EventRouter<T>) -> Self {
        let (inbox, mut events) = mpsc::unbounded_channel();
        let subscriptions: Vec<Subscription> = TransportEventKind::ALL
            .iter()
            .map(|kind| transport.subscribe(*kind, inbox.clone()))
            .collect();
        drop(inbox);

        let shutdown = CancellationToken::new();
        let cancel = shutdown.clone();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    event = events.recv() => match event {
                        Some(event) => router.route(event).await,
                        None => break,
                    },
                }
            }
            debug!("Event dispatch loop ended");
        });

        info!("Registered {} transport event handlers", subscriptions.len());
        Self {
            subscriptions,
            shutdown,
            task: Some(task),
        }
    }

    pub fn active_subscriptions(&self) -> usize {
        self.subscriptions.iter().filter(|s| s.is_active()).count()
    }

    /// Deregisters every handler and waits for the dispatch loop to exit.
    pub async fn detach(mut self) {
        self.release();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    fn release(&mut self) {
        if self.subscriptions.is_empty() {
            return;
        }
        info!("Removing {} transport event handlers", self.subscriptions.len());
        self.subscriptions.clear();
        self.shutdown.cancel();
    }
}

impl Drop for EventDispatcher {
    fn drop(&mut self) {
        self.release();
    }
}

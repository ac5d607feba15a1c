//! Reads, writes and notifications on a Ready peripheral.

mod common;

use std::time::Duration;

use ble_peripheral_demo_lib::core::bluetooth::{
    BleError, CharacteristicUpdate, ConnectionStatus, DEFAULT_MAX_PACKET_SIZE, MockCall, MockOp, PeripheralId,
    Rejection, ServiceBinding, TransportError, TransportEvent, UUID_DEVICE_SERVICE, UUID_RECEIVE_CHAR,
    UUID_TRANSFER_CHAR,
};
use tokio::time::sleep;
use uuid::Uuid;

fn data_calls(call: &MockCall) -> bool {
    matches!(
        call,
        MockCall::Read { .. } | MockCall::Write { .. } | MockCall::StartNotification { .. }
    )
}

#[tokio::test(start_paused = true)]
async fn write_subscribes_then_writes_after_settle() {
    let (transport, manager) = common::with_peripheral("AA").await;
    let binding = common::connect_ready(&manager, "AA").await;
    transport.clear_calls();
    let id = PeripheralId::from("AA");

    let task = {
        let manager = manager.clone();
        let binding = binding.clone();
        tokio::spawn(async move { manager.write(&binding, b"Hello World").await })
    };

    sleep(Duration::from_millis(500)).await;
    assert_eq!(
        transport.calls(),
        vec![MockCall::StartNotification {
            id: id.clone(),
            service: UUID_DEVICE_SERVICE,
            characteristic: UUID_RECEIVE_CHAR,
        }]
    );

    task.await.unwrap().unwrap();
    assert_eq!(
        transport.calls().last(),
        Some(&MockCall::Write {
            id,
            service: UUID_DEVICE_SERVICE,
            characteristic: UUID_TRANSFER_CHAR,
            data: b"Hello World".to_vec(),
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
        })
    );
}

#[tokio::test(start_paused = true)]
async fn write_passes_explicit_packet_size() {
    let (transport, manager) = common::with_peripheral("AA").await;
    let binding = common::connect_ready(&manager, "AA").await;

    manager.write_with_packet_size(&binding, &[7; 40], 20).await.unwrap();

    assert_eq!(
        transport.count(|call| matches!(call, MockCall::Write { max_packet_size: 20, .. })),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn read_returns_receive_characteristic_value() {
    let (transport, manager) = common::with_peripheral("AA").await;
    let binding = common::connect_ready(&manager, "AA").await;
    transport.set_read_value(b"pong".to_vec());

    let value = manager.read(&binding).await.unwrap();

    assert_eq!(value, b"pong".to_vec());
    assert_eq!(
        transport.count(|call| matches!(
            call,
            MockCall::Read { characteristic, .. } if *characteristic == UUID_RECEIVE_CHAR
        )),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn data_calls_are_rejected_unless_ready() {
    let (transport, manager) = common::with_peripheral("AA").await;
    let id = PeripheralId::from("AA");
    let binding = manager.config().binding_for(&id);
    let not_ready = BleError::OperationRejected(Rejection::NotReady(id.clone()));

    assert_eq!(manager.read(&binding).await, Err(not_ready.clone()));
    assert_eq!(manager.write(&binding, b"x").await, Err(not_ready.clone()));

    // A binding kept around after the link went away is stale.
    common::connect_ready(&manager, "AA").await;
    transport.emit(TransportEvent::Disconnected(id.clone()));
    common::settle().await;
    assert_eq!(manager.read(&binding).await, Err(not_ready.clone()));
    assert_eq!(manager.write(&binding, b"x").await, Err(not_ready));

    assert_eq!(transport.count(data_calls), 0);
}

#[tokio::test(start_paused = true)]
async fn link_dropping_during_settle_cancels_the_write() {
    let (transport, manager) = common::with_peripheral("AA").await;
    let binding = common::connect_ready(&manager, "AA").await;
    let id = PeripheralId::from("AA");

    let task = {
        let manager = manager.clone();
        let binding = binding.clone();
        tokio::spawn(async move { manager.write(&binding, b"Hello").await })
    };
    sleep(Duration::from_millis(300)).await;
    assert_eq!(transport.count(|call| matches!(call, MockCall::StartNotification { .. })), 1);

    transport.emit(TransportEvent::Disconnected(id.clone()));

    assert_eq!(
        task.await.unwrap(),
        Err(BleError::OperationRejected(Rejection::NotReady(id.clone())))
    );
    assert_eq!(
        manager.peripheral(&id).await.unwrap().status(),
        &ConnectionStatus::Disconnected
    );
    assert_eq!(transport.count(|call| matches!(call, MockCall::Write { .. })), 0);
}

#[tokio::test(start_paused = true)]
async fn binding_other_than_the_published_one_is_rejected() {
    let (transport, manager) = common::with_peripheral("AA").await;
    let published = common::connect_ready(&manager, "AA").await;
    let foreign = ServiceBinding {
        transfer: Uuid::from_u128(0x1234),
        ..published.clone()
    };
    let not_ready = BleError::OperationRejected(Rejection::NotReady("AA".into()));

    assert_eq!(manager.write(&foreign, b"x").await, Err(not_ready.clone()));
    assert_eq!(manager.read(&foreign).await, Err(not_ready));
    assert_eq!(transport.count(data_calls), 0);

    manager.write(&published, b"x").await.unwrap();
    assert_eq!(transport.count(|call| matches!(call, MockCall::Write { .. })), 1);
}

#[tokio::test(start_paused = true)]
async fn write_failure_is_reported() {
    let (transport, manager) = common::with_peripheral("AA").await;
    let binding = common::connect_ready(&manager, "AA").await;
    transport.fail(MockOp::Write, TransportError::CharacteristicNotFound(UUID_TRANSFER_CHAR));

    let result = manager.write(&binding, b"x").await;

    assert_eq!(
        result,
        Err(BleError::TransportFailure(TransportError::CharacteristicNotFound(
            UUID_TRANSFER_CHAR
        )))
    );
    assert_eq!(
        manager.peripheral(&"AA".into()).await.unwrap().status(),
        &ConnectionStatus::Ready
    );
}

#[tokio::test(start_paused = true)]
async fn notifications_are_forwarded_without_touching_state() {
    let (transport, manager) = common::with_peripheral("AA").await;
    common::connect_ready(&manager, "AA").await;
    let mut notifications = manager.notifications();
    let before = manager.snapshot().await;

    let update = CharacteristicUpdate {
        peripheral_id: "AA".into(),
        service: UUID_DEVICE_SERVICE,
        characteristic: UUID_RECEIVE_CHAR,
        value: vec![1, 2, 3],
    };
    transport.emit(TransportEvent::CharacteristicUpdated(update.clone()));

    assert_eq!(notifications.recv().await.unwrap(), update);
    assert_eq!(manager.snapshot().await, before);
}

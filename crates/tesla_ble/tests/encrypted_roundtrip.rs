//! End-to-end encrypted command/response scenarios (S3, S6) driven against
//! `MockTransport`.

mod support;

use tesla_ble::pb::tesla::ble::car_server;
use tesla_ble::{Error, VehicleDataCategory};
use tesla_ble_common::crypto::PrivateKey;

#[tokio::test]
async fn encrypted_get_state_round_trips() {
    let (mut session, vehicle) = support::connect_session().await;
    let client_priv = PrivateKey::generate().unwrap();

    let call = tokio::spawn(async move {
        let result = session.get_state(VehicleDataCategory::Drive, &client_priv).await;
        (session, result)
    });

    let keys = support::respond_to_valid_handshake(&vehicle, 40).await;

    let response = car_server::Response {
        action_status: Some(car_server::ActionStatus {
            result: 0,
            result_reason: None,
        }),
        vehicle_data: Some(car_server::VehicleData {
            vehicle_data: Some(car_server::vehicle_data::VehicleData::DriveState(car_server::DriveState {})),
        }),
    };
    let action = support::respond_to_get_vehicle_data(
        &vehicle,
        keys.aes_key,
        tesla_ble::Domain::Infotainment,
        response,
        40,
    )
    .await;

    assert!(matches!(
        action.action_msg,
        Some(tesla_ble::pb::tesla::ble::car_server::action::ActionMsg::VehicleAction(_))
    ));

    let (_session, result) = call.await.unwrap();
    let state = result.expect("get_state should succeed");
    assert_eq!(state.category, VehicleDataCategory::Drive);
    assert!(state.vehicle_data.is_some());
}

#[tokio::test]
async fn vehicle_reported_error_surfaces_its_reason() {
    let (mut session, vehicle) = support::connect_session().await;
    let client_priv = PrivateKey::generate().unwrap();

    let call = tokio::spawn(async move {
        let result = session.get_state(VehicleDataCategory::Drive, &client_priv).await;
        (session, result)
    });

    let keys = support::respond_to_valid_handshake(&vehicle, 40).await;

    let response = car_server::Response {
        action_status: Some(car_server::ActionStatus {
            result: 1,
            result_reason: Some(car_server::ResultReason {
                plain_text: "key not paired".to_string(),
            }),
        }),
        vehicle_data: None,
    };
    support::respond_to_get_vehicle_data(&vehicle, keys.aes_key, tesla_ble::Domain::Infotainment, response, 40).await;

    let (_session, result) = call.await.unwrap();
    match result {
        Err(Error::VehicleReported { reason }) => assert_eq!(reason, "key not paired"),
        other => panic!("expected a vehicle-reported error, got {other:?}"),
    }
}

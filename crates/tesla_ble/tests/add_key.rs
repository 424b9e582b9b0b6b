//! `send_add_key_request` writes the VCSEC envelope and returns as soon as
//! the transport acknowledges the write, without waiting for any response
//! (the envelope carries no UUID a vehicle reply could correlate against).

mod support;

use prost::Message;

use tesla_ble::pb::tesla::ble::vcsec::{to_vcsec_message, ToVCSECMessage};
use tesla_ble::{KeyFormFactor, Role};

#[tokio::test]
async fn send_add_key_request_returns_once_the_write_is_acknowledged() {
    let (mut session, vehicle) = support::connect_session().await;
    let public_key = [9u8; 65];

    let result = tokio::time::timeout(
        std::time::Duration::from_secs(1),
        session.send_add_key_request(None, &public_key, Role::Driver, KeyFormFactor::IosDevice),
    )
    .await
    .expect("send_add_key_request must not wait for a vehicle response")
    .expect("write to the mock transport never fails");
    let _ = result;

    let outbound = vehicle
        .recv_client_message()
        .await
        .expect("expected the VCSEC add-key envelope to have been written");
    let decoded = ToVCSECMessage::decode(outbound.as_slice()).unwrap();
    assert!(matches!(decoded.sub_message, Some(to_vcsec_message::SubMessage::SignedMessage(_))));
}

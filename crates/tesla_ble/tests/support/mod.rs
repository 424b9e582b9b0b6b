//! Shared harness for the end-to-end scenarios in `tests/`: a simulated
//! vehicle counterpart that drives a [`MockVehicleHandle`] the same way real
//! vehicle firmware would drive the other end of the BLE link, including
//! computing its own session keys, HMAC tags, and AES-GCM AAD independently
//! of the façade under test.

use prost::Message;

use tesla_ble::pb::tesla::ble::car_server;
use tesla_ble::pb::tesla::ble::common::SignatureType;
use tesla_ble::pb::tesla::ble::signatures::{self, SignatureData};
use tesla_ble::pb::tesla::ble::universal_message::{self, destination::SubDestination, RoutableMessage};
use tesla_ble::transport::mock::{MockTransport, MockVehicleHandle};
use tesla_ble::{Domain, Session, SessionConfig, Vin};
use tesla_ble_common::crypto::{
    aes_gcm_decrypt, aes_gcm_encrypt, derive_session_keys, ecdh, hmac_sha256, parse_public_key, random_array, sha256,
    PrivateKey,
};
use tesla_ble_common::metadata::{serialize, MetadataItem, MetadataTag};

pub const TEST_VIN: &str = "5YJ3E1EA7JF000000";

pub fn test_vin() -> Vin {
    Vin::new(TEST_VIN).unwrap()
}

pub fn test_config() -> SessionConfig {
    SessionConfig {
        request_timeout: std::time::Duration::from_secs(5),
        ..SessionConfig::default()
    }
}

/// Construct a `Session<MockTransport>` and connect it (the mock backend
/// never fails to connect), returning the façade and the test's handle on
/// the simulated vehicle.
pub async fn connect_session() -> (Session<MockTransport>, MockVehicleHandle) {
    let (transport, vehicle) = MockTransport::new(64);
    let mut session = Session::new(transport, test_vin(), Domain::Infotainment, test_config());
    session.connect(None).await.expect("mock transport connect never fails");
    (session, vehicle)
}

/// Session keys the simulated vehicle derived during a handshake, handed
/// back so later steps (an encrypted command/response exchange) can act as
/// the vehicle side without re-deriving anything.
pub struct VehicleSessionKeys {
    pub aes_key: [u8; 16],
}

fn session_info_tag(session_info_key: &[u8; 32], uuid: &[u8], session_info_bytes: &[u8]) -> [u8; 32] {
    let items = [
        MetadataItem::new(MetadataTag::SignatureType, vec![SignatureType::Hmac as u8]),
        MetadataItem::new(MetadataTag::Personalization, TEST_VIN.as_bytes().to_vec()),
        MetadataItem::new(MetadataTag::Challenge, uuid.to_vec()),
    ];
    let metadata = serialize(&items).unwrap();
    let mut input = metadata;
    input.extend_from_slice(session_info_bytes);
    hmac_sha256(session_info_key, &input)
}

/// Receive the client's `SessionInfoRequest`, respond with a correctly
/// signed `SessionInfo`, and return the derived session keys (S1).
pub async fn respond_to_valid_handshake(vehicle: &MockVehicleHandle, chunk_size: usize) -> VehicleSessionKeys {
    let outbound = vehicle
        .recv_client_message()
        .await
        .expect("client did not send a session info request");
    let request = RoutableMessage::decode(outbound.as_slice()).unwrap();
    let uuid = request.uuid.clone();
    let client_pub_bytes = request
        .signature_data
        .expect("session info request carries signerIdentity")
        .signer_identity
        .expect("session info request carries signerIdentity")
        .public_key;
    let client_pub = parse_public_key(&client_pub_bytes).unwrap();

    let vehicle_priv = PrivateKey::generate().unwrap();
    let vehicle_pub = vehicle_priv.public_key();
    let shared = ecdh(&vehicle_priv, &client_pub);
    let keys = derive_session_keys(&shared);

    let session_info = signatures::SessionInfo {
        counter: 0,
        epoch: vec![0u8; 16],
        clock_time: 100,
        public_key: vehicle_pub.to_vec(),
    };
    let session_info_bytes = session_info.encode_to_vec();
    let tag = session_info_tag(&keys.session_info_key, &uuid, &session_info_bytes);

    let response = RoutableMessage {
        uuid,
        session_info: session_info_bytes,
        signature_data: Some(SignatureData {
            sig_type: Some(signatures::signature_data::SigType::SessionInfoTag(signatures::HmacSignatureData {
                tag: tag.to_vec(),
            })),
            signer_identity: None,
        }),
        ..Default::default()
    };
    vehicle.notify_chunked(&response.encode_to_vec(), chunk_size);

    VehicleSessionKeys { aes_key: keys.aes_key }
}

/// Like [`respond_to_valid_handshake`], but flips one byte of the
/// `sessionInfo` bytes actually placed on the wire after the HMAC tag was
/// computed over the untampered bytes (S2): the client's verification must
/// fail and it must not retain any derived session state.
pub async fn respond_to_tampered_handshake(vehicle: &MockVehicleHandle, chunk_size: usize) {
    let outbound = vehicle
        .recv_client_message()
        .await
        .expect("client did not send a session info request");
    let request = RoutableMessage::decode(outbound.as_slice()).unwrap();
    let uuid = request.uuid.clone();
    let client_pub_bytes = request
        .signature_data
        .expect("session info request carries signerIdentity")
        .signer_identity
        .expect("session info request carries signerIdentity")
        .public_key;
    let client_pub = parse_public_key(&client_pub_bytes).unwrap();

    let vehicle_priv = PrivateKey::generate().unwrap();
    let vehicle_pub = vehicle_priv.public_key();
    let shared = ecdh(&vehicle_priv, &client_pub);
    let keys = derive_session_keys(&shared);

    let session_info = signatures::SessionInfo {
        counter: 0,
        epoch: vec![0u8; 16],
        clock_time: 100,
        public_key: vehicle_pub.to_vec(),
    };
    let session_info_bytes = session_info.encode_to_vec();
    let tag = session_info_tag(&keys.session_info_key, &uuid, &session_info_bytes);

    let mut tampered = session_info_bytes;
    tampered[0] ^= 0xFF;

    let response = RoutableMessage {
        uuid,
        session_info: tampered,
        signature_data: Some(SignatureData {
            sig_type: Some(signatures::signature_data::SigType::SessionInfoTag(signatures::HmacSignatureData {
                tag: tag.to_vec(),
            })),
            signer_identity: None,
        }),
        ..Default::default()
    };
    vehicle.notify_chunked(&response.encode_to_vec(), chunk_size);
}

/// Receive one encrypted `GetVehicleData` command, verify and decrypt it the
/// way the real vehicle firmware would, and reply with `response` encrypted
/// under the same session AES key. Returns the decoded plaintext `Action`
/// for the caller to assert against.
pub async fn respond_to_get_vehicle_data(
    vehicle: &MockVehicleHandle,
    aes_key: [u8; 16],
    domain: Domain,
    response: car_server::Response,
    chunk_size: usize,
) -> car_server::Action {
    let outbound = vehicle
        .recv_client_message()
        .await
        .expect("client did not send an encrypted command");
    let request = RoutableMessage::decode(outbound.as_slice()).unwrap();

    let sig = match request
        .signature_data
        .as_ref()
        .and_then(|sd| sd.sig_type.as_ref())
        .expect("encrypted command carries AES_GCM_PersonalizedData")
    {
        signatures::signature_data::SigType::AesGcmPersonalizedData(data) => data.clone(),
        _ => panic!("expected an AES-GCM-personalized command"),
    };

    let mut request_metadata_items = vec![
        MetadataItem::new(MetadataTag::SignatureType, vec![SignatureType::AesGcmPersonalized as u8]),
        MetadataItem::new(MetadataTag::Domain, vec![domain as u8]),
        MetadataItem::new(MetadataTag::Personalization, TEST_VIN.as_bytes().to_vec()),
        MetadataItem::new(MetadataTag::Epoch, sig.epoch.clone()),
        MetadataItem::u32_be(MetadataTag::ExpiresAt, sig.expires_at),
        MetadataItem::u32_be(MetadataTag::Counter, sig.counter),
    ];
    if request.flags != 0 {
        request_metadata_items.push(MetadataItem::u32_be(MetadataTag::Flags, request.flags));
    }
    let request_metadata = serialize(&request_metadata_items).unwrap();
    let request_aad = sha256(&request_metadata);

    let mut ciphertext_with_tag = request.protobuf_message_as_bytes.clone();
    ciphertext_with_tag.extend_from_slice(&sig.tag);
    let request_nonce: [u8; 12] = sig.nonce.as_slice().try_into().unwrap();

    let plaintext = aes_gcm_decrypt(&aes_key, &request_nonce, &ciphertext_with_tag, &request_aad)
        .expect("request ciphertext failed to authenticate under the expected AAD");
    let action = car_server::Action::decode(plaintext.as_slice()).unwrap();

    let mut request_tag = [0u8; 16];
    request_tag.copy_from_slice(&sig.tag);
    let mut request_hash = vec![SignatureType::AesGcmPersonalized as u8];
    request_hash.extend_from_slice(&request_tag);

    let response_metadata_items = [
        MetadataItem::new(MetadataTag::SignatureType, vec![SignatureType::AesGcmResponse as u8]),
        MetadataItem::new(MetadataTag::Domain, vec![domain as u8]),
        MetadataItem::new(MetadataTag::Personalization, TEST_VIN.as_bytes().to_vec()),
        MetadataItem::u32_be(MetadataTag::Counter, sig.counter),
        MetadataItem::u32_be(MetadataTag::Flags, 0),
        MetadataItem::new(MetadataTag::RequestHash, request_hash),
        MetadataItem::new(MetadataTag::Fault, vec![0]),
    ];
    let response_metadata = serialize(&response_metadata_items).unwrap();
    let response_aad = sha256(&response_metadata);

    let response_plaintext = response.encode_to_vec();
    let response_nonce = random_array::<12>();
    let ciphertext_with_tag = aes_gcm_encrypt(&aes_key, &response_nonce, &response_plaintext, &response_aad).unwrap();
    let split_at = ciphertext_with_tag.len() - 16;
    let (ciphertext, tag_slice) = ciphertext_with_tag.split_at(split_at);

    let response_message = RoutableMessage {
        uuid: request.uuid.clone(),
        from_destination: Some(universal_message::Destination {
            sub_destination: Some(SubDestination::Domain(domain as i32)),
        }),
        protobuf_message_as_bytes: ciphertext.to_vec(),
        flags: 0,
        signature_data: Some(SignatureData {
            sig_type: Some(signatures::signature_data::SigType::AesGcmResponseData(
                signatures::AesGcmResponseSignatureData {
                    nonce: response_nonce.to_vec(),
                    counter: sig.counter,
                    tag: tag_slice.to_vec(),
                },
            )),
            signer_identity: None,
        }),
        ..Default::default()
    };
    vehicle.notify_chunked(&response_message.encode_to_vec(), chunk_size);

    action
}

use prost::Message;

use crate::error::ProtocolError;
use crate::pb::tesla::ble::common::Domain;
use crate::pb::tesla::ble::signatures::{
    self, AesGcmPersonalizedSignatureData, AesGcmResponseSignatureData, HmacSignatureData, KeyIdentity,
    SignatureData,
};
use crate::pb::tesla::ble::universal_message::{destination::SubDestination, Destination, RoutableMessage, SessionInfoRequest};

/// Build a `Destination` that addresses a domain (used for `toDestination`
/// on outbound messages).
fn domain_destination(domain: Domain) -> Destination {
    Destination {
        sub_destination: Some(SubDestination::Domain(domain as i32)),
    }
}

/// Build a `Destination` carrying a 16-byte client routing address (used for
/// `fromDestination` on outbound messages).
fn routing_destination(routing_address: &[u8; 16]) -> Destination {
    Destination {
        sub_destination: Some(SubDestination::RoutingAddress(routing_address.to_vec())),
    }
}

/// Encode a `SessionInfoRequest` envelope: the first message sent to a
/// vehicle to kick off a handshake.
pub fn encode_session_info_request(
    domain: Domain,
    our_public_key: &[u8; 65],
    routing_address: &[u8; 16],
    uuid: &[u8; 16],
) -> Vec<u8> {
    let message = RoutableMessage {
        to_destination: Some(domain_destination(domain)),
        from_destination: Some(routing_destination(routing_address)),
        session_info_request: Some(SessionInfoRequest {
            public_key_domain: domain as i32,
        }),
        uuid: uuid.to_vec(),
        signature_data: Some(SignatureData {
            sig_type: None,
            signer_identity: Some(KeyIdentity {
                public_key: our_public_key.to_vec(),
            }),
        }),
        ..Default::default()
    };

    message.encode_to_vec()
}

/// Decode a complete, reassembled frame into a structured `RoutableMessage`.
pub fn decode_routable(bytes: &[u8]) -> Result<RoutableMessage, ProtocolError> {
    RoutableMessage::decode(bytes).map_err(ProtocolError::from)
}

pub struct DecodedSessionInfo {
    pub counter: u32,
    pub epoch: Vec<u8>,
    pub clock_time: u32,
    pub public_key: Vec<u8>,
}

/// Decode the opaque `sessionInfo` bytes of a handshake response.
pub fn decode_session_info(session_info_bytes: &[u8]) -> Result<DecodedSessionInfo, ProtocolError> {
    let info = signatures::SessionInfo::decode(session_info_bytes)?;
    Ok(DecodedSessionInfo {
        counter: info.counter,
        epoch: info.epoch,
        clock_time: info.clock_time,
        public_key: info.public_key,
    })
}

/// Extract the 32-byte HMAC tag from `signatureData.sessionInfoTag.tag`.
pub fn extract_session_info_tag(message: &RoutableMessage) -> Result<[u8; 32], ProtocolError> {
    let sig_data = message
        .signature_data
        .as_ref()
        .ok_or(ProtocolError::MissingField("signatureData"))?;

    let tag_bytes = match &sig_data.sig_type {
        Some(signatures::signature_data::SigType::SessionInfoTag(HmacSignatureData { tag })) => tag,
        _ => return Err(ProtocolError::MissingField("signatureData.sessionInfoTag")),
    };

    tag_bytes
        .as_slice()
        .try_into()
        .map_err(|_| ProtocolError::Malformed("session info tag is not 32 bytes".into()))
}

/// Parameters for [`encode_encrypted_command`].
pub struct EncryptedCommandParams<'a> {
    pub domain: Domain,
    pub routing_address: &'a [u8; 16],
    pub uuid: &'a [u8; 16],
    pub ciphertext: &'a [u8],
    pub flags: u32,
    pub signer_public_key: &'a [u8; 65],
    pub epoch: &'a [u8],
    pub nonce: &'a [u8; 12],
    pub counter: u32,
    pub expires_at: u32,
    pub tag: &'a [u8; 16],
}

/// Encode an AES-GCM-personalized encrypted command envelope.
pub fn encode_encrypted_command(params: EncryptedCommandParams<'_>) -> Vec<u8> {
    let message = RoutableMessage {
        to_destination: Some(domain_destination(params.domain)),
        from_destination: Some(routing_destination(params.routing_address)),
        protobuf_message_as_bytes: params.ciphertext.to_vec(),
        uuid: params.uuid.to_vec(),
        flags: params.flags,
        signature_data: Some(SignatureData {
            sig_type: Some(signatures::signature_data::SigType::AesGcmPersonalizedData(
                AesGcmPersonalizedSignatureData {
                    epoch: params.epoch.to_vec(),
                    nonce: params.nonce.to_vec(),
                    counter: params.counter,
                    expires_at: params.expires_at,
                    tag: params.tag.to_vec(),
                },
            )),
            signer_identity: Some(KeyIdentity {
                public_key: params.signer_public_key.to_vec(),
            }),
        }),
        ..Default::default()
    };

    message.encode_to_vec()
}

/// The `AES_GCM_ResponseData` fields the multiplexer's post-handler needs
/// from an encrypted response.
pub struct ResponseSignature {
    pub nonce: [u8; 12],
    pub counter: u32,
    pub tag: [u8; 16],
}

pub fn extract_response_signature(message: &RoutableMessage) -> Result<ResponseSignature, ProtocolError> {
    let sig_data = message
        .signature_data
        .as_ref()
        .ok_or(ProtocolError::MissingField("signatureData"))?;

    let AesGcmResponseSignatureData { nonce, counter, tag } = match &sig_data.sig_type {
        Some(signatures::signature_data::SigType::AesGcmResponseData(data)) => data,
        _ => return Err(ProtocolError::MissingField("signatureData.AES_GCM_ResponseData")),
    };

    let nonce: [u8; 12] = nonce
        .as_slice()
        .try_into()
        .map_err(|_| ProtocolError::Malformed("response nonce is not 12 bytes".into()))?;
    let tag: [u8; 16] = tag
        .as_slice()
        .try_into()
        .map_err(|_| ProtocolError::Malformed("response tag is not 16 bytes".into()))?;

    Ok(ResponseSignature {
        nonce,
        counter: *counter,
        tag,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_info_request_round_trips() {
        let our_pub = [4u8; 65];
        let routing = [9u8; 16];
        let uuid = [1u8; 16];

        let bytes = encode_session_info_request(Domain::Infotainment, &our_pub, &routing, &uuid);
        let decoded = decode_routable(&bytes).unwrap();

        assert_eq!(decoded.uuid, uuid.to_vec());
        assert_eq!(
            decoded.from_destination.unwrap().sub_destination,
            Some(SubDestination::RoutingAddress(routing.to_vec()))
        );
        assert_eq!(
            decoded.signature_data.unwrap().signer_identity.unwrap().public_key,
            our_pub.to_vec()
        );
    }

    #[test]
    fn encrypted_command_round_trips() {
        let routing = [2u8; 16];
        let uuid = [3u8; 16];
        let signer_pub = [4u8; 65];
        let epoch = [0u8; 16];
        let nonce = [5u8; 12];
        let tag = [6u8; 16];

        let bytes = encode_encrypted_command(EncryptedCommandParams {
            domain: Domain::Infotainment,
            routing_address: &routing,
            uuid: &uuid,
            ciphertext: b"ciphertext",
            flags: 2,
            signer_public_key: &signer_pub,
            epoch: &epoch,
            nonce: &nonce,
            counter: 1,
            expires_at: 100,
            tag: &tag,
        });

        let decoded = decode_routable(&bytes).unwrap();
        assert_eq!(decoded.protobuf_message_as_bytes, b"ciphertext");
        assert_eq!(decoded.flags, 2);
    }

    #[test]
    fn session_info_tag_extraction_requires_hmac_variant() {
        let message = RoutableMessage {
            signature_data: Some(SignatureData {
                sig_type: None,
                signer_identity: None,
            }),
            ..Default::default()
        };

        assert!(extract_session_info_tag(&message).is_err());
    }
}

use prost::Message;

pub use crate::pb::tesla::ble::vcsec::{KeyFormFactor, Role};
use crate::pb::tesla::ble::common::SignatureType;
use crate::pb::tesla::ble::vcsec::{
    to_vcsec_message, whitelist_operation, KeyMetadata, PermissionChange, PublicKey, SignedMessage, ToVCSECMessage,
    UnsignedMessage, WhitelistOperation,
};

/// Build the VCSEC envelope for an "add key to whitelist" request.
///
/// The inner `WhitelistOperation` is carried unsigned (no ECDSA signature
/// over it); the outer envelope nonetheless uses the `SignedMessage`
/// variant with `signatureType = PRESENT_KEY` rather than `unsignedMessage`
/// directly, per the vendor wire contract. This form is accepted only while
/// the vehicle is awaiting an NFC-tap approval for key enrollment -- the
/// physical tap is the actual authorization check, not anything in this
/// envelope.
pub fn encode_vcsec_add_key_request(public_key_raw: &[u8], role: Role, form_factor: KeyFormFactor) -> Vec<u8> {
    let unsigned = UnsignedMessage {
        whitelist_operation: Some(WhitelistOperation {
            add_key_to_whitelist_and_add_permissions: Some(
                whitelist_operation::AddKeyToWhitelistAndAddPermissions {
                    key: Some(PublicKey {
                        public_key_raw: public_key_raw.to_vec(),
                    }),
                    permission: Some(PermissionChange { key_role: role as i32 }),
                    metadata_for_key: Some(KeyMetadata {
                        key_form_factor: form_factor as i32,
                    }),
                },
            ),
        }),
    };

    let message = ToVCSECMessage {
        sub_message: Some(to_vcsec_message::SubMessage::SignedMessage(SignedMessage {
            signature_type: SignatureType::PresentKey as i32,
            protobuf_message_as_bytes: unsigned.encode_to_vec(),
        })),
    };

    message.encode_to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_key_request_round_trips() {
        let public_key = [7u8; 65];
        let bytes = encode_vcsec_add_key_request(&public_key, Role::Driver, KeyFormFactor::IosDevice);

        let decoded = ToVCSECMessage::decode(bytes.as_slice()).unwrap();
        let Some(to_vcsec_message::SubMessage::SignedMessage(signed)) = decoded.sub_message else {
            panic!("expected a signed message envelope");
        };
        assert_eq!(signed.signature_type, SignatureType::PresentKey as i32);

        let unsigned = UnsignedMessage::decode(signed.protobuf_message_as_bytes.as_slice()).unwrap();
        let op = unsigned.whitelist_operation.unwrap();
        let add = op.add_key_to_whitelist_and_add_permissions.unwrap();
        assert_eq!(add.key.unwrap().public_key_raw, public_key.to_vec());
        assert_eq!(add.permission.unwrap().key_role, Role::Driver as i32);
        assert_eq!(add.metadata_for_key.unwrap().key_form_factor, KeyFormFactor::IosDevice as i32);
    }
}

//! Encode/decode for the Routable Message envelope and its nested payloads.
//!
//! The wire schema itself lives under `proto/` and is compiled by
//! `build.rs`; this module is the thin, hand-written layer on top that
//! knows how to build and interpret the specific message shapes the core
//! emits and consumes (it does not attempt to be a general-purpose
//! protobuf-message builder).

mod routable;
mod vcsec;
mod vehicle_data;

pub use routable::{
    decode_routable, decode_session_info, encode_encrypted_command, encode_session_info_request,
    extract_response_signature, extract_session_info_tag, DecodedSessionInfo, EncryptedCommandParams,
    ResponseSignature,
};
pub use vcsec::{encode_vcsec_add_key_request, KeyFormFactor, Role};
pub use vehicle_data::{
    decode_car_server_response, encode_get_vehicle_data, response_error_reason, response_is_error,
    VehicleDataCategory,
};

use crate::pb::tesla::ble::common;

pub type Domain = common::Domain;
pub type RoutableMessage = crate::pb::tesla::ble::universal_message::RoutableMessage;
pub type SignatureData = crate::pb::tesla::ble::signatures::SignatureData;

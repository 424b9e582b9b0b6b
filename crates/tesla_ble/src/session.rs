//! Session façade (C7): the single entry point the rest of an application
//! talks to. Wires the transport, multiplexer, codec and crypto layers
//! together into `connect` / `ensure_session` / `get_state` /
//! `send_add_key_request` / `disconnect`, generic over the transport
//! implementation rather than hard-coding one -- so the same façade logic
//! runs against real hardware or an in-process double.

use std::time::{Duration, Instant};

use tesla_ble_common::crypto::{
    aes_gcm_decrypt, aes_gcm_encrypt, derive_session_keys, ecdh, parse_public_key, random_array, sha256, verify_hmac,
    PrivateKey,
};
use tesla_ble_common::metadata::{serialize, MetadataItem, MetadataTag};

use crate::codec::{
    decode_car_server_response, decode_session_info, encode_encrypted_command, encode_get_vehicle_data,
    encode_session_info_request, encode_vcsec_add_key_request, extract_response_signature, extract_session_info_tag,
    response_error_reason, response_is_error, Domain, EncryptedCommandParams, KeyFormFactor, Role, RoutableMessage,
    VehicleDataCategory,
};
use crate::config::{DiscoveryMode, SessionConfig};
use crate::error::{AuthenticationError, ConfigError, Error, ProtocolError, Result};
use crate::multiplexer::{Multiplexer, PendingOutcome, PostHandler};
use crate::pb::tesla::ble::car_server::{Response, VehicleData};
use crate::pb::tesla::ble::common::SignatureType;
use crate::pb::tesla::ble::universal_message::destination::SubDestination;
use crate::session_state::{expires_at, SessionState};
use crate::transport::{BleTransportSend, DiscoveryContext, TransportEvent};
use crate::vin::Vin;

/// Default flags: bit 1 set, requesting an encrypted response.
const DEFAULT_COMMAND_FLAGS: u32 = 0b10;

/// The result of a successful [`Session::get_state`] call.
pub struct VehicleStateResult {
    pub category: VehicleDataCategory,
    /// The decrypted plaintext `CarServer.Response` bytes, for callers that
    /// want to keep the wire form around (logging, replay in tests).
    pub raw_bytes: Vec<u8>,
    pub decoded_response: Response,
    pub vehicle_data: Option<VehicleData>,
}

enum Link<T: BleTransportSend<Error = crate::error::TransportError> + Send + 'static> {
    Idle(T),
    Active(Multiplexer<T>),
}

/// A session with one vehicle, over one transport instance.
///
/// Not `Clone`/`Sync` by design: exactly one task owns a `Session` and
/// drives it; concurrent requests against the same vehicle go through the
/// multiplexer the `Session` owns internally, not through multiple `Session`
/// handles.
pub struct Session<T: BleTransportSend<Error = crate::error::TransportError> + Send + 'static> {
    config: SessionConfig,
    vin: Vin,
    domain: Domain,
    routing_address: [u8; 16],
    link: Option<Link<T>>,
    state: Option<SessionState>,
}

impl<T> Session<T>
where
    T: BleTransportSend<Error = crate::error::TransportError> + Send + 'static,
{
    /// Construct a session bound to `vin`/`domain`, holding `transport`
    /// unconnected. A fresh 16-byte routing address is drawn now and reused
    /// for the lifetime of this façade instance.
    pub fn new(transport: T, vin: Vin, domain: Domain, config: SessionConfig) -> Self {
        Session {
            config,
            vin,
            domain,
            routing_address: random_array::<16>(),
            link: Some(Link::Idle(transport)),
            state: None,
        }
    }

    pub fn vin(&self) -> &Vin {
        &self.vin
    }

    /// Idempotent: a no-op if already connected. Does not perform a
    /// handshake; only establishes the BLE link and starts the multiplexer.
    pub async fn connect(&mut self, device: Option<T::Device>) -> Result<()> {
        let link = self.link.take().expect("Session.link is always Some between calls");

        let mut transport = match link {
            Link::Active(multiplexer) => {
                self.link = Some(Link::Active(multiplexer));
                return Ok(());
            }
            Link::Idle(transport) => transport,
        };

        if matches!(self.config.discovery_mode, DiscoveryMode::VinPrefixPromptFilter) && device.is_none() {
            self.link = Some(Link::Idle(transport));
            return Err(Error::Config(ConfigError::DiscoveryModeRequiresDevice));
        }

        let discovery = DiscoveryContext {
            mode: self.config.discovery_mode,
            name_prefix: Some(self.vin.advertised_name_prefix()),
            scan_timeout: self.config.scan_timeout,
        };

        match transport.connect(device, discovery).await {
            Ok(()) => {
                tracing::info!(vin = self.vin.as_str(), "BLE connection established");
                let events = transport.take_events();
                let multiplexer = Multiplexer::new(transport, events, self.config.request_timeout);
                self.link = Some(Link::Active(multiplexer));
                Ok(())
            }
            Err(err) => {
                tracing::warn!(vin = self.vin.as_str(), error = %err, "BLE connect failed");
                self.link = Some(Link::Idle(transport));
                Err(Error::Transport(err))
            }
        }
    }

    /// Tears down the BLE connection (failing any pending requests) and
    /// discards session state, forcing a fresh handshake on next use.
    pub async fn disconnect(&mut self) {
        tracing::info!(vin = self.vin.as_str(), "disconnecting");
        self.state = None;

        let link = self.link.take().expect("Session.link is always Some between calls");
        self.link = Some(match link {
            Link::Idle(transport) => Link::Idle(transport),
            Link::Active(multiplexer) => Link::Idle(multiplexer.into_transport().await),
        });
    }

    fn active_multiplexer(&self) -> Result<&Multiplexer<T>> {
        match self.link.as_ref() {
            Some(Link::Active(multiplexer)) => Ok(multiplexer),
            _ => Err(Error::Transport(crate::error::TransportError::Disconnected)),
        }
    }

    /// If a session is already established, returns immediately. Otherwise
    /// performs the full handshake, deriving fresh session keys from `priv`.
    pub async fn ensure_session(&mut self, private_key: &PrivateKey) -> Result<()> {
        if self.state.is_some() {
            return Ok(());
        }
        self.handshake(private_key).await
    }

    /// Discards any established session, forcing the next `get_state` (or
    /// explicit `ensure_session`) call to re-handshake.
    pub fn reset_session(&mut self) {
        self.state = None;
    }

    async fn handshake(&mut self, private_key: &PrivateKey) -> Result<()> {
        let our_pub = private_key.public_key();
        let uuid = random_array::<16>();

        let outbound = encode_session_info_request(self.domain, &our_pub, &self.routing_address, &uuid);

        let outcome = self.active_multiplexer()?.send_and_await(outbound, uuid, None).await?;
        let message = match outcome {
            PendingOutcome::Raw(message) => message,
            PendingOutcome::Decrypted(_) => {
                unreachable!("a session info request never installs a post-handler")
            }
        };

        if message.session_info.is_empty() {
            return Err(Error::Protocol(ProtocolError::MissingField("sessionInfo")));
        }
        let session_info = decode_session_info(&message.session_info)?;
        let session_info_tag = extract_session_info_tag(&message)?;

        let vehicle_public_key = parse_public_key(&session_info.public_key)?;
        let shared_secret = ecdh(private_key, &vehicle_public_key);
        let keys = derive_session_keys(&shared_secret);

        let metadata_items = [
            MetadataItem::new(MetadataTag::SignatureType, vec![SignatureType::Hmac as u8]),
            MetadataItem::new(MetadataTag::Personalization, self.vin.as_bytes().to_vec()),
            MetadataItem::new(MetadataTag::Challenge, uuid.to_vec()),
        ];
        let metadata = serialize(&metadata_items).map_err(ProtocolError::from)?;

        let mut hmac_input = metadata;
        hmac_input.extend_from_slice(&message.session_info);

        if !verify_hmac(&keys.session_info_key, &hmac_input, &session_info_tag) {
            // `keys` and `session_info` are local to this call and go out of
            // scope here without ever reaching `self.state`.
            tracing::warn!(vin = self.vin.as_str(), "session info HMAC verification failed");
            return Err(Error::Authentication(AuthenticationError::SessionInfoTagMismatch));
        }

        let vehicle_public_key_bytes: [u8; 65] = session_info
            .public_key
            .as_slice()
            .try_into()
            .map_err(|_| Error::Protocol(ProtocolError::Malformed("vehicle public key is not 65 bytes".into())))?;

        self.state = Some(SessionState::new(
            keys,
            session_info.epoch,
            session_info.clock_time,
            vehicle_public_key_bytes,
            our_pub,
            self.domain,
            Instant::now(),
        ));

        tracing::info!(vin = self.vin.as_str(), "handshake established");
        Ok(())
    }

    /// Fetch one category of vehicle state. Establishes a session first if
    /// necessary.
    pub async fn get_state(&mut self, category: VehicleDataCategory, private_key: &PrivateKey) -> Result<VehicleStateResult> {
        self.ensure_session(private_key).await?;

        let plaintext = encode_get_vehicle_data(category);
        let decrypted = self.send_encrypted(&plaintext, DEFAULT_COMMAND_FLAGS).await?;
        let response = decode_car_server_response(&decrypted)?;

        if response_is_error(&response) {
            let reason = response_error_reason(&response).unwrap_or("unknown vehicle error").to_string();
            tracing::warn!(vin = self.vin.as_str(), reason = %reason, "vehicle reported an error");
            return Err(Error::VehicleReported { reason });
        }

        let vehicle_data = response.vehicle_data.clone();
        Ok(VehicleStateResult {
            category,
            raw_bytes: decrypted,
            decoded_response: response,
            vehicle_data,
        })
    }

    /// Encrypt `plaintext` under the current session, send it, and decrypt
    /// the correlated response. Requires `self.state` to already be set.
    async fn send_encrypted(&mut self, plaintext: &[u8], flags: u32) -> Result<Vec<u8>> {
        let now = Instant::now();
        let domain = self.domain;
        let vin_bytes = self.vin.as_bytes().to_vec();

        let state = self
            .state
            .as_mut()
            .expect("send_encrypted is only called after ensure_session has succeeded");

        let counter = state.next_counter();
        let ttl = Duration::from_secs(self.config.command_ttl_secs as u64);
        let expires = expires_at(state, now, ttl);
        let epoch = state.epoch.clone();
        let aes_key = state.aes_key;
        let client_public_key = state.client_public_key;

        let mut request_metadata = vec![
            MetadataItem::new(MetadataTag::SignatureType, vec![SignatureType::AesGcmPersonalized as u8]),
            MetadataItem::new(MetadataTag::Domain, vec![domain as u8]),
            MetadataItem::new(MetadataTag::Personalization, vin_bytes.clone()),
            MetadataItem::new(MetadataTag::Epoch, epoch.clone()),
            MetadataItem::u32_be(MetadataTag::ExpiresAt, expires),
            MetadataItem::u32_be(MetadataTag::Counter, counter),
        ];
        if flags != 0 {
            request_metadata.push(MetadataItem::u32_be(MetadataTag::Flags, flags));
        }
        let metadata = serialize(&request_metadata).map_err(ProtocolError::from)?;
        let aad = sha256(&metadata);

        let nonce = random_array::<12>();
        let ciphertext_with_tag = aes_gcm_encrypt(&aes_key, &nonce, plaintext, &aad)?;
        let split_at = ciphertext_with_tag.len() - 16;
        let (ciphertext, tag_slice) = ciphertext_with_tag.split_at(split_at);
        let tag: [u8; 16] = tag_slice.try_into().expect("AES-GCM tag is 16 bytes");

        let uuid = random_array::<16>();
        let outbound = encode_encrypted_command(EncryptedCommandParams {
            domain,
            routing_address: &self.routing_address,
            uuid: &uuid,
            ciphertext,
            flags,
            signer_public_key: &client_public_key,
            epoch: &epoch,
            nonce: &nonce,
            counter,
            expires_at: expires,
            tag: &tag,
        });

        let post_handler = build_response_decryptor(aes_key, tag, vin_bytes, domain);

        let outcome = self
            .active_multiplexer()?
            .send_and_await(outbound, uuid, Some(post_handler))
            .await;

        match outcome {
            Ok(PendingOutcome::Decrypted(plaintext)) => Ok(plaintext),
            Ok(PendingOutcome::Raw(_)) => unreachable!("an encrypted command always installs a post-handler"),
            Err(Error::Authentication(auth_err)) => {
                // A failed response authentication invalidates the session
                // (§4.7 state machine: Established -> Invalidated -> NoSession).
                tracing::warn!(vin = self.vin.as_str(), error = %auth_err, "response authentication failed; invalidating session");
                self.state = None;
                Err(Error::Authentication(auth_err))
            }
            Err(Error::Timeout) => {
                tracing::warn!(vin = self.vin.as_str(), "request timed out waiting for a response");
                Err(Error::Timeout)
            }
            Err(other) => Err(other),
        }
    }

    /// Enroll a new key on the vehicle. Does not require (or use) an
    /// authenticated session: the vehicle accepts this only while a human
    /// has physically tapped an existing authorized key/card, which is the
    /// actual authorization check.
    ///
    /// The VCSEC envelope this builds carries no UUID of its own (unlike a
    /// `RoutableMessage`), so there is nothing for a response to correlate
    /// against; this returns as soon as the transport has acknowledged the
    /// write, not after any round trip.
    pub async fn send_add_key_request(
        &mut self,
        device: Option<T::Device>,
        public_key_raw: &[u8],
        role: Role,
        form_factor: KeyFormFactor,
    ) -> Result<()> {
        self.connect(device).await?;

        let payload = encode_vcsec_add_key_request(public_key_raw, role, form_factor);
        self.active_multiplexer()?.send(&payload).await
    }
}

/// Build the post-handler that authenticates and decrypts an encrypted
/// command's response, per the AAD construction in §4.6.
fn build_response_decryptor(aes_key: [u8; 16], request_tag: [u8; 16], vin_bytes: Vec<u8>, fallback_domain: Domain) -> PostHandler {
    Box::new(move |message: &RoutableMessage| -> Result<Vec<u8>> {
        let response_sig = extract_response_signature(message)?;

        let response_domain = message
            .from_destination
            .as_ref()
            .and_then(|d| d.sub_destination.as_ref())
            .and_then(|sd| match sd {
                SubDestination::Domain(domain) => Some(*domain as u8),
                _ => None,
            })
            .unwrap_or(fallback_domain as u8);

        let fault = message
            .signed_message_status
            .as_ref()
            .map(|status| status.signed_message_fault as u8)
            .unwrap_or(0);

        let mut request_hash = vec![SignatureType::AesGcmPersonalized as u8];
        request_hash.extend_from_slice(&request_tag);

        let response_metadata = [
            MetadataItem::new(MetadataTag::SignatureType, vec![SignatureType::AesGcmResponse as u8]),
            MetadataItem::new(MetadataTag::Domain, vec![response_domain]),
            MetadataItem::new(MetadataTag::Personalization, vin_bytes.clone()),
            MetadataItem::u32_be(MetadataTag::Counter, response_sig.counter),
            MetadataItem::u32_be(MetadataTag::Flags, message.flags),
            MetadataItem::new(MetadataTag::RequestHash, request_hash),
            MetadataItem::new(MetadataTag::Fault, vec![fault]),
        ];
        let metadata = serialize(&response_metadata).map_err(ProtocolError::from)?;
        let aad = sha256(&metadata);

        let mut ciphertext_with_tag = message.protobuf_message_as_bytes.clone();
        ciphertext_with_tag.extend_from_slice(&response_sig.tag);

        aes_gcm_decrypt(&aes_key, &response_sig.nonce, &ciphertext_with_tag, &aad)
            .map_err(|_| Error::Authentication(AuthenticationError::ResponseDecryptionFailed))
    })
}

//! P-256 key handling, ECDH, AES-GCM and HMAC-SHA256 primitives, plus the
//! CSPRNG helpers the rest of the crate builds on.
//!
//! The key derivation used here (a truncated SHA-1 of the ECDH shared
//! secret as an AES-128 key) is dictated by interoperability with the
//! vehicle's own BLE stack. It is a protocol quirk, not a statement that
//! SHA-1 is suitable for anything else. Do not "fix" it by swapping in
//! HKDF; that would simply stop working with real vehicles.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes128Gcm, Nonce};
use elliptic_curve::sec1::ToEncodedPoint;
use hmac::{Hmac, Mac};
use p256::ecdh::diffie_hellman;
use p256::elliptic_curve::rand_core::{CryptoRng, RngCore};
use p256::{PublicKey, SecretKey};
use rand_core::OsRng;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::CryptoError;

/// Maximum number of resampling attempts before giving up on generating a
/// private key. [`SecretKey::random`] can in principle hand back the
/// all-zero scalar; resampling guards against that vanishingly unlikely case.
const MAX_SCALAR_ATTEMPTS: u32 = 8;

/// A 32-byte P-256 scalar, together with its (lazily computable) public point.
#[derive(Clone)]
pub struct PrivateKey(SecretKey);

impl PrivateKey {
    /// Generate a new private key using the platform CSPRNG, resampling if
    /// the drawn scalar is degenerate.
    pub fn generate() -> Result<Self, CryptoError> {
        Self::generate_with_rng(&mut OsRng)
    }

    pub fn generate_with_rng<R: RngCore + CryptoRng>(rng: &mut R) -> Result<Self, CryptoError> {
        for _ in 0..MAX_SCALAR_ATTEMPTS {
            let key = SecretKey::random(rng);
            // `SecretKey::random` only ever returns non-zero scalars in [1, n-1],
            // but we check explicitly since that invariant is load-bearing here.
            let is_zero = key.to_bytes().iter().all(|b| *b == 0);
            if !is_zero {
                return Ok(PrivateKey(key));
            }
        }
        Err(CryptoError::ScalarGeneration {
            attempts: MAX_SCALAR_ATTEMPTS,
        })
    }

    /// Construct a private key from a raw 32-byte big-endian scalar.
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, CryptoError> {
        SecretKey::from_slice(bytes)
            .map(PrivateKey)
            .map_err(|_| CryptoError::InvalidPrivateKey)
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes().into()
    }

    /// The 65-byte uncompressed public point `0x04 || x || y`.
    pub fn public_key(&self) -> [u8; 65] {
        let point = self.0.public_key().to_encoded_point(false);
        let mut out = [0u8; 65];
        out.copy_from_slice(point.as_bytes());
        out
    }

    fn secret(&self) -> &SecretKey {
        &self.0
    }
}

/// Parse a 65-byte uncompressed P-256 point as received from the vehicle.
pub fn parse_public_key(bytes: &[u8]) -> Result<PublicKey, CryptoError> {
    PublicKey::from_sec1_bytes(bytes).map_err(|_| CryptoError::InvalidPublicKey)
}

/// `ECDH(our_priv, peer_pub)`, returning the 32-byte x-coordinate of the
/// shared point (not a hashed/derived secret -- callers derive keys from it
/// with [`derive_session_keys`]).
pub fn ecdh(private_key: &PrivateKey, peer_public: &PublicKey) -> [u8; 32] {
    let shared = diffie_hellman(
        private_key.secret().to_nonzero_scalar(),
        peer_public.as_affine(),
    );
    let mut out = [0u8; 32];
    out.copy_from_slice(shared.raw_secret_bytes().as_slice());
    out
}

/// Session keys derived once per handshake from the raw ECDH shared secret.
pub struct SessionKeys {
    /// 16-byte AES-128 key: `SHA1(shared)[0..16]`.
    pub aes_key: [u8; 16],
    /// `HMAC_SHA256(aes_key, "session info")`.
    pub session_info_key: [u8; 32],
}

pub fn derive_session_keys(shared_secret: &[u8; 32]) -> SessionKeys {
    let digest = sha1(shared_secret);
    let mut aes_key = [0u8; 16];
    aes_key.copy_from_slice(&digest[0..16]);

    let session_info_key = hmac_sha256(&aes_key, b"session info");

    SessionKeys {
        aes_key,
        session_info_key,
    }
}

/// AES-GCM encrypt `plaintext` under `key`/`nonce`, authenticating `aad`.
/// Returns `ciphertext || tag` (tag is the trailing 16 bytes).
pub fn aes_gcm_encrypt(
    key: &[u8; 16],
    nonce: &[u8; 12],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes128Gcm::new_from_slice(key).map_err(|_| CryptoError::InvalidKeyOrNonce)?;
    let nonce = Nonce::from_slice(nonce);
    cipher
        .encrypt(
            nonce,
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| CryptoError::AeadAuthFailed)
}

/// AES-GCM decrypt `ciphertext_with_tag` (ciphertext followed by the 16-byte
/// tag) under `key`/`nonce`, authenticating `aad`.
pub fn aes_gcm_decrypt(
    key: &[u8; 16],
    nonce: &[u8; 12],
    ciphertext_with_tag: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes128Gcm::new_from_slice(key).map_err(|_| CryptoError::InvalidKeyOrNonce)?;
    let nonce = Nonce::from_slice(nonce);
    cipher
        .decrypt(
            nonce,
            Payload {
                msg: ciphertext_with_tag,
                aad,
            },
        )
        .map_err(|_| CryptoError::AeadAuthFailed)
}

type HmacSha256 = Hmac<Sha256>;

pub fn hmac_sha256(key: &[u8], msg: &[u8]) -> [u8; 32] {
    // A key of any length is valid for HMAC; `new_from_slice` only fails for
    // ciphers with a fixed key size, which Hmac<Sha256> is not.
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC-SHA256 accepts any key length");
    mac.update(msg);
    mac.finalize().into_bytes().into()
}

/// Verify `expected` against `HMAC_SHA256(key, msg)` in constant time.
pub fn verify_hmac(key: &[u8], msg: &[u8], expected: &[u8; 32]) -> bool {
    let actual = hmac_sha256(key, msg);
    actual.ct_eq(expected).into()
}

pub fn sha1(msg: &[u8]) -> [u8; 20] {
    Sha1::digest(msg).into()
}

pub fn sha256(msg: &[u8]) -> [u8; 32] {
    Sha256::digest(msg).into()
}

/// `n` random bytes from the platform CSPRNG.
pub fn random_bytes(n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    OsRng.fill_bytes(&mut buf);
    buf
}

pub fn random_array<const N: usize>() -> [u8; N] {
    let mut buf = [0u8; N];
    OsRng.fill_bytes(&mut buf);
    buf
}

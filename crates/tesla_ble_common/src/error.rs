/// Errors raised by the crypto and metadata primitives.
///
/// This is deliberately narrow: callers higher up the stack (the codec, the
/// multiplexer, the façade) wrap these into their own error enums rather than
/// letting them leak unchanged, matching the layered taxonomy described for
/// the crate as a whole.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("CSPRNG failed to produce a valid P-256 scalar after {attempts} attempts")]
    ScalarGeneration { attempts: u32 },
    #[error("invalid private key scalar")]
    InvalidPrivateKey,
    #[error("invalid public key point")]
    InvalidPublicKey,
    #[error("AES-GCM key or nonce has the wrong length")]
    InvalidKeyOrNonce,
    #[error("AES-GCM authentication failed")]
    AeadAuthFailed,
}

#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("metadata tags must be appended in strictly ascending order (got {got} after {prev})")]
    TagsOutOfOrder { prev: u8, got: u8 },
    #[error("metadata value for tag {tag} is {len} bytes, exceeding the 255-byte limit")]
    ValueTooLong { tag: u8, len: usize },
}

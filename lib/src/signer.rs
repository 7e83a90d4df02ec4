//! Signing context around an enclave-held Aleo keypair.
//!
//! The context owns the only copy of the private key for the lifetime of the
//! process. Every operation that touches the key serialises on an internal
//! mutex; callers share the context behind an `Arc` and never see the key
//! material itself.

use std::sync::Mutex;

use rand::rngs::OsRng;
use snarkvm_console::account::{Address, PrivateKey, Signature};
use snarkvm_console::network::{MainnetV0, Network};
use snarkvm_console::prelude::*;
use snarkvm_console::program::Plaintext;
use snarkvm_console::types::Field;

use crate::encoding::{chunks_for_len, format_chunks};
use crate::error::{EncodingError, SigningError};

pub type CurrentNetwork = MainnetV0;

/// Digest width of the message hash, in bytes.
pub const MESSAGE_HASH_SIZE: usize = 16;
/// Smallest message the hasher and signer accept.
pub const MIN_MESSAGE_SIZE: usize = 16;

struct SignerInner {
    private_key: PrivateKey<CurrentNetwork>,
}

pub struct SigningContext {
    inner: Mutex<SignerInner>,
    address: String,
}

impl SigningContext {
    /// Generate a fresh keypair from OS entropy. Under Gramine the entropy
    /// source is the enclave's RDRAND-backed one.
    pub fn generate() -> Result<Self, SigningError> {
        let private_key: PrivateKey<CurrentNetwork> = PrivateKey::new(&mut OsRng)
            .map_err(|e| SigningError::KeypairGeneration(e.to_string()))?;
        let address = Address::try_from(&private_key)
            .map_err(|e| SigningError::KeypairGeneration(e.to_string()))?
            .to_string();
        Ok(Self {
            inner: Mutex::new(SignerInner { private_key }),
            address,
        })
    }

    /// The signer's public Aleo address (`aleo1...`).
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Render `message` as `target_chunks` chunk envelopes. See
    /// [`format_chunks`].
    pub fn format_message(
        &self,
        message: &[u8],
        target_chunks: usize,
    ) -> Result<String, SigningError> {
        Ok(format_chunks(message, target_chunks)?)
    }

    /// Hash a message to 16 bytes with Poseidon8.
    ///
    /// A message that is already in chunk-envelope form is hashed as-is;
    /// anything else is formatted first, which requires at least
    /// [`MIN_MESSAGE_SIZE`] bytes.
    pub fn hash_message(&self, message: &[u8]) -> Result<[u8; MESSAGE_HASH_SIZE], SigningError> {
        if message.len() < MIN_MESSAGE_SIZE {
            return Err(EncodingError::MessageTooShort(message.len()).into());
        }
        let digest = digest_field(message)?;
        let bytes = digest
            .to_bytes_le()
            .map_err(|e| SigningError::MessageHashing(e.to_string()))?;
        let mut out = [0u8; MESSAGE_HASH_SIZE];
        out.copy_from_slice(&bytes[..MESSAGE_HASH_SIZE]);
        Ok(out)
    }

    /// Sign a message with the enclave-held key, returning the textual
    /// signature (`sign1...`). The message is hashed as in
    /// [`Self::hash_message`] and the digest field is what gets signed.
    pub fn sign(&self, message: &[u8]) -> Result<String, SigningError> {
        if message.len() < MIN_MESSAGE_SIZE {
            return Err(EncodingError::MessageTooShort(message.len()).into());
        }
        let digest = digest_field(message)?;
        let inner = self.inner.lock().expect("signer mutex poisoned");
        let signature = Signature::sign(&inner.private_key, &[digest], &mut OsRng)
            .map_err(|e| SigningError::SignatureGeneration(e.to_string()))?;
        Ok(signature.to_string())
    }
}

/// Interpret a message as an Aleo plaintext struct and reduce it to a single
/// field element with Poseidon8.
fn digest_field(message: &[u8]) -> Result<Field<CurrentNetwork>, SigningError> {
    let plaintext = parse_plaintext(message)?;
    let fields = plaintext
        .to_fields()
        .map_err(|e| SigningError::MessageHashing(e.to_string()))?;
    CurrentNetwork::hash_psd8(&fields).map_err(|e| SigningError::MessageHashing(e.to_string()))
}

fn parse_plaintext(message: &[u8]) -> Result<Plaintext<CurrentNetwork>, SigningError> {
    // Already-formatted messages arrive as the chunk-envelope text.
    if let Ok(text) = std::str::from_utf8(message) {
        if let Ok(plaintext) = Plaintext::from_str(text) {
            return Ok(plaintext);
        }
    }
    let formatted = format_chunks(message, chunks_for_len(message.len()))?;
    Plaintext::from_str(&formatted).map_err(|e| SigningError::MessageHashing(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    fn context() -> SigningContext {
        SigningContext::generate().unwrap()
    }

    #[test]
    fn address_is_bech32_aleo() {
        let ctx = context();
        assert!(ctx.address().starts_with("aleo1"), "{}", ctx.address());
    }

    #[test]
    fn hash_of_formatted_sixteen_ones() {
        let ctx = context();
        let formatted = ctx.format_message(&[0x01; 16], 1).unwrap();
        let digest = ctx.hash_message(formatted.as_bytes()).unwrap();
        assert_eq!(digest, hex!("8a552d99b2a45758798a4868b1c33530"));
    }

    #[test]
    fn hash_of_formatted_hundred_ones() {
        let ctx = context();
        let formatted = ctx.format_message(&[0x01; 100], 1).unwrap();
        let digest = ctx.hash_message(formatted.as_bytes()).unwrap();
        assert_eq!(digest, hex!("4c59992c83e51813e25cc6e0bd6f1425"));
    }

    #[test]
    fn raw_and_formatted_messages_hash_identically() {
        let ctx = context();
        let raw = [0x01; 16];
        let formatted = ctx.format_message(&raw, 1).unwrap();
        assert_eq!(
            ctx.hash_message(&raw).unwrap(),
            ctx.hash_message(formatted.as_bytes()).unwrap()
        );
    }

    #[test]
    fn hashing_is_deterministic_across_contexts() {
        let a = context().hash_message(&[0x42; 64]).unwrap();
        let b = context().hash_message(&[0x42; 64]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn short_messages_are_rejected() {
        let ctx = context();
        assert!(matches!(
            ctx.hash_message(&[0u8; 15]),
            Err(SigningError::Encoding(EncodingError::MessageTooShort(15)))
        ));
        assert!(matches!(
            ctx.sign(&[0u8; 15]),
            Err(SigningError::Encoding(EncodingError::MessageTooShort(15)))
        ));
    }

    #[test]
    fn boundary_lengths_sign() {
        let ctx = context();
        assert!(ctx.sign(&[7u8; 16]).unwrap().starts_with("sign1"));
        assert!(ctx.sign(&[7u8; 17]).unwrap().starts_with("sign1"));
    }
}

//! Signature operations

use crate::keys::{PrivateKey, PublicKey};
use crate::CryptoError;
use ed25519_dalek::{Signature, Signer, Verifier};

/// Length of an ed25519 signature in bytes
pub const SIGNATURE_LEN: usize = 64;

/// Sign a message with a private key
pub fn sign_message(key: &PrivateKey, message: &[u8]) -> Vec<u8> {
    let sig: Signature = key.inner().sign(message);
    sig.to_bytes().to_vec()
}

/// Verify a signature with a public key
pub fn verify_signature(
    key: &PublicKey,
    message: &[u8],
    signature: &[u8],
) -> Result<(), CryptoError> {
    let bytes: [u8; SIGNATURE_LEN] = signature
        .try_into()
        .map_err(|_| CryptoError::VerificationFailed)?;
    let sig = Signature::from_bytes(&bytes);
    key.inner()
        .verify(message, &sig)
        .map_err(|_| CryptoError::VerificationFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let key = PrivateKey::generate();
        let sig = sign_message(&key, b"release body");
        assert_eq!(sig.len(), SIGNATURE_LEN);
        verify_signature(&key.public_key(), b"release body", &sig).unwrap();
    }

    #[test]
    fn test_verify_rejects_wrong_message_or_key() {
        let key = PrivateKey::generate();
        let other = PrivateKey::generate();
        let sig = sign_message(&key, b"release body");

        assert!(verify_signature(&key.public_key(), b"tampered", &sig).is_err());
        assert!(verify_signature(&other.public_key(), b"release body", &sig).is_err());
        assert!(verify_signature(&key.public_key(), b"release body", &sig[..10]).is_err());
    }
}

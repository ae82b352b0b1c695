//! ECDSA P-256 cryptographic operations for the Ember protocol.
//!
//! Provides key generation, signing, and signature verification. Uses the
//! RustCrypto `p256` crate; messages are hashed with SHA-256 before signing
//! (the curve's default digest), and signatures travel as lowercase hex of
//! their ASN.1-DER encoding.
//!
//! The public key hex encoding is the uncompressed SEC1 form
//! (`04 ‖ X ‖ Y`, 65 bytes, 130 hex characters). This encoding **is** the
//! account address: address equality is byte equality.

use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use std::fmt;

use crate::error::CryptoError;

/// P-256 keypair for signing transaction inputs.
///
/// Wraps [`p256::ecdsa::SigningKey`]. Use [`KeyPair::generate`] for random
/// keys or [`KeyPair::from_private_hex`] to restore one from its hex form.
pub struct KeyPair {
    signing_key: SigningKey,
}

impl KeyPair {
    /// Generate a random keypair using the OS cryptographic RNG.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::random(&mut rand::rngs::OsRng),
        }
    }

    /// Restore a keypair from the hex encoding of its 32-byte scalar.
    pub fn from_private_hex(private_hex: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(private_hex).map_err(|_| CryptoError::InvalidPrivateKey)?;
        let signing_key =
            SigningKey::from_slice(&bytes).map_err(|_| CryptoError::InvalidPrivateKey)?;
        Ok(Self { signing_key })
    }

    /// Hex encoding of the private scalar (32 bytes, 64 hex chars).
    pub fn private_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }

    /// Hex encoding of the public key in uncompressed SEC1 form.
    ///
    /// This string doubles as the account address.
    pub fn public_hex(&self) -> String {
        let point = self.signing_key.verifying_key().to_encoded_point(false);
        hex::encode(point.as_bytes())
    }

    /// Sign a message, returning the DER signature as lowercase hex.
    ///
    /// The message bytes are hashed with SHA-256 internally.
    pub fn sign(&self, message: &str) -> String {
        let signature: Signature = self.signing_key.sign(message.as_bytes());
        hex::encode(signature.to_der().as_bytes())
    }
}

impl Clone for KeyPair {
    fn clone(&self) -> Self {
        Self {
            signing_key: self.signing_key.clone(),
        }
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public_hex())
            .finish_non_exhaustive()
    }
}

/// Sign a message with a hex-encoded private key.
///
/// Convenience wrapper for callers that hold raw key material (e.g. the
/// transaction-submission RPC, which receives a `pubkey → privkey` map).
pub fn sign(message: &str, private_hex: &str) -> Result<String, CryptoError> {
    Ok(KeyPair::from_private_hex(private_hex)?.sign(message))
}

/// Verify a hex-DER signature over a message under a SEC1 hex public key.
///
/// Returns `false` for any decoding failure or mismatch rather than an
/// error: a garbled signature is simply not a valid one.
pub fn verify(message: &str, signature_hex: &str, public_hex: &str) -> bool {
    let Ok(key_bytes) = hex::decode(public_hex) else {
        return false;
    };
    let Ok(verifying_key) = VerifyingKey::from_sec1_bytes(&key_bytes) else {
        return false;
    };
    let Ok(sig_bytes) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(signature) = Signature::from_der(&sig_bytes) else {
        return false;
    };
    verifying_key.verify(message.as_bytes(), &signature).is_ok()
}

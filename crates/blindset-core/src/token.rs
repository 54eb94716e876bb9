//! Query tokens: small integers sealed with AES-256-GCM
//!
//! Token layout: `nonce (12) || ciphertext (8) || tag (16)`. The plaintext is the
//! integer as 8 big-endian bytes. Keys are provisioned out of band.

use std::fmt;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::constants::{TOKEN_NONCE_LEN, TOKEN_PLAINTEXT_LEN, TOKEN_TAG_LEN};
use crate::error::CryptoError;

/// 32-byte shared key between two roles, zeroized on drop
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct TokenKey([u8; 32]);

impl TokenKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut bytes = [0u8; 32];
        rng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Parse a 64-character hex key
    pub fn from_hex(hex_key: &str) -> Result<Self, CryptoError> {
        let mut decoded = hex::decode(hex_key.trim())
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        if decoded.len() != 32 {
            let len = decoded.len();
            decoded.zeroize();
            return Err(CryptoError::InvalidKey(format!(
                "expected 32 bytes, got {}",
                len
            )));
        }
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&decoded);
        decoded.zeroize();
        Ok(Self(bytes))
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.0))
    }

    /// Seal an integer
    pub fn encrypt<R: RngCore + CryptoRng>(
        &self,
        value: u64,
        rng: &mut R,
    ) -> Result<QueryToken, CryptoError> {
        let mut nonce = [0u8; TOKEN_NONCE_LEN];
        rng.fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher()
            .encrypt(Nonce::from_slice(&nonce), value.to_be_bytes().as_ref())
            .map_err(|_| CryptoError::EncryptionFailed)?;

        let mut bytes = Vec::with_capacity(TOKEN_NONCE_LEN + ciphertext.len());
        bytes.extend_from_slice(&nonce);
        bytes.extend_from_slice(&ciphertext);
        Ok(QueryToken(bytes))
    }

    /// Open a token sealed under this key
    pub fn decrypt(&self, token: &QueryToken) -> Result<u64, CryptoError> {
        let bytes = token.as_bytes();
        if bytes.len() < TOKEN_NONCE_LEN + TOKEN_TAG_LEN {
            return Err(CryptoError::MalformedToken(format!(
                "token is {} bytes, shorter than nonce and tag",
                bytes.len()
            )));
        }

        let (nonce, ciphertext) = bytes.split_at(TOKEN_NONCE_LEN);
        let plaintext = self
            .cipher()
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::AuthenticationFailed)?;

        let plaintext: [u8; TOKEN_PLAINTEXT_LEN] =
            plaintext.as_slice().try_into().map_err(|_| {
                CryptoError::MalformedToken(format!(
                    "plaintext is {} bytes, expected {}",
                    plaintext.len(),
                    TOKEN_PLAINTEXT_LEN
                ))
            })?;
        Ok(u64::from_be_bytes(plaintext))
    }
}

impl fmt::Debug for TokenKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TokenKey(..)")
    }
}

/// Opaque sealed integer, serialized as hex
#[derive(Clone, PartialEq, Eq)]
pub struct QueryToken(Vec<u8>);

impl QueryToken {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        hex::decode(s)
            .map(Self)
            .map_err(|e| CryptoError::MalformedToken(e.to_string()))
    }
}

impl fmt::Debug for QueryToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QueryToken({})", self.to_hex())
    }
}

impl Serialize for QueryToken {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for QueryToken {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

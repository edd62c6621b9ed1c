//! Credential encryption.
//!
//! Service-account passwords are stored as AES-256-GCM ciphertext and
//! decrypted on demand, immediately before the sync tool is spawned. The
//! rest of the system treats this module as an opaque
//! `encrypt(plaintext) -> ciphertext` / `decrypt(ciphertext) -> plaintext`
//! pair. Errors name the failing field but never include ciphertext or any
//! partial plaintext.

use aes_gcm::aead::{Aead, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key, KeyInit, Nonce};

use crate::error::CoreError;

/// Environment variable holding the 64-hex-character (32-byte) key.
pub const KEY_ENV: &str = "SYNCHUB_CREDENTIAL_KEY";

/// AES-GCM nonce length in bytes.
const NONCE_LEN: usize = 12;

/// Encrypts and decrypts stored credential material.
pub struct CredentialCipher {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for CredentialCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialCipher")
            .field("cipher", &"<redacted>")
            .finish()
    }
}

impl CredentialCipher {
    /// Build a cipher from a 32-byte key.
    pub fn new(key: &[u8; 32]) -> Self {
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)),
        }
    }

    /// Build a cipher from a 64-hex-character key string.
    pub fn from_hex_key(hex_key: &str) -> Result<Self, CoreError> {
        let bytes = hex::decode(hex_key).map_err(|_| CoreError::Credential {
            field: "key".to_string(),
            reason: "key is not valid hex",
        })?;
        let key: [u8; 32] = bytes.try_into().map_err(|_| CoreError::Credential {
            field: "key".to_string(),
            reason: "key must be exactly 32 bytes (64 hex characters)",
        })?;
        Ok(Self::new(&key))
    }

    /// Build a cipher from the `SYNCHUB_CREDENTIAL_KEY` environment
    /// variable.
    pub fn from_env() -> Result<Self, CoreError> {
        let hex_key = std::env::var(KEY_ENV).map_err(|_| CoreError::Credential {
            field: "key".to_string(),
            reason: "SYNCHUB_CREDENTIAL_KEY is not set",
        })?;
        Self::from_hex_key(&hex_key)
    }

    /// Encrypt a plaintext credential. Returns `nonce || ciphertext` as a
    /// lowercase hex string.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CoreError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext =
            self.cipher
                .encrypt(&nonce, plaintext.as_bytes())
                .map_err(|_| CoreError::Credential {
                    field: "plaintext".to_string(),
                    reason: "encryption failed",
                })?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(nonce.as_slice());
        out.extend_from_slice(&ciphertext);
        Ok(hex::encode(&out))
    }

    /// Decrypt a stored hex ciphertext. `field` names the credential being
    /// decrypted (e.g. `"example-service.password"`) and is the only
    /// context attached to a failure.
    pub fn decrypt(&self, ciphertext_hex: &str, field: &str) -> Result<String, CoreError> {
        let bytes = hex::decode(ciphertext_hex).map_err(|_| CoreError::Credential {
            field: field.to_string(),
            reason: "stored value is not valid hex",
        })?;
        if bytes.len() <= NONCE_LEN {
            return Err(CoreError::Credential {
                field: field.to_string(),
                reason: "stored value is too short",
            });
        }

        let (nonce, ciphertext) = bytes.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CoreError::Credential {
                field: field.to_string(),
                reason: "decryption failed",
            })?;

        String::from_utf8(plaintext).map_err(|_| CoreError::Credential {
            field: field.to_string(),
            reason: "decrypted value is not valid UTF-8",
        })
    }
}

// ---------------------------------------------------------------------------
// hex encoding helpers (no extra dep)
// ---------------------------------------------------------------------------

mod hex {
    /// Encode bytes as a lowercase hex string.
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes
            .as_ref()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect()
    }

    /// Decode a hex string into bytes. Rejects odd lengths and non-hex
    /// characters.
    pub fn decode(s: &str) -> Result<Vec<u8>, ()> {
        if s.len() % 2 != 0 {
            return Err(());
        }
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(|_| ()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn test_cipher() -> CredentialCipher {
        CredentialCipher::new(&[7u8; 32])
    }

    #[test]
    fn encrypt_then_decrypt_round_trips() {
        let cipher = test_cipher();
        let ciphertext = cipher.encrypt("hunter2").unwrap();
        assert_ne!(ciphertext, "hunter2");
        let plaintext = cipher.decrypt(&ciphertext, "acct.password").unwrap();
        assert_eq!(plaintext, "hunter2");
    }

    #[test]
    fn ciphertexts_differ_per_encryption() {
        let cipher = test_cipher();
        let a = cipher.encrypt("same secret").unwrap();
        let b = cipher.encrypt("same secret").unwrap();
        // Fresh nonce per call.
        assert_ne!(a, b);
    }

    #[test]
    fn wrong_key_fails_without_leaking() {
        let ciphertext = test_cipher().encrypt("top secret").unwrap();
        let other = CredentialCipher::new(&[9u8; 32]);

        let err = other.decrypt(&ciphertext, "acct.password").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("acct.password"));
        assert!(!message.contains("top secret"));
        assert!(!message.contains(&ciphertext));
    }

    #[test]
    fn garbage_ciphertext_is_rejected() {
        let cipher = test_cipher();
        assert_matches!(
            cipher.decrypt("not hex!", "acct.password"),
            Err(CoreError::Credential { .. })
        );
        assert_matches!(
            cipher.decrypt("abcd", "acct.password"),
            Err(CoreError::Credential { .. })
        );
    }

    #[test]
    fn hex_key_must_be_32_bytes() {
        assert_matches!(
            CredentialCipher::from_hex_key("abcd"),
            Err(CoreError::Credential { .. })
        );
        let ok = CredentialCipher::from_hex_key(&"ab".repeat(32));
        assert!(ok.is_ok());
    }
}

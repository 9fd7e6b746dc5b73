//! Credential encryption shared with credential issuers
//!
//! Credentials travel as Fernet tokens (AES-128-CBC + HMAC-SHA256) under a
//! key distributed out-of-band. The agent decrypts them only at the point of
//! use; the plaintext is held in a [`SecretString`] so it is zeroized on drop
//! and redacted from `Debug` output.

use fernet::Fernet;
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use thiserror::Error;

/// Errors produced by credential operations
///
/// Messages never include the token or the plaintext.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialError {
    /// The configured key is not a URL-safe base64 encoding of 32 bytes
    #[error("Invalid encryption key: expected URL-safe base64 of 32 bytes")]
    InvalidKey,

    /// Token malformed, signed with another key, or expired
    #[error("Credential could not be decrypted (malformed token, wrong key, or expired)")]
    Decryption,

    /// Token verified but the plaintext is not UTF-8
    #[error("Decrypted credential is not valid UTF-8")]
    InvalidUtf8,
}

/// Fernet cipher built from the process-wide encryption key
pub struct CredentialCipher {
    fernet: Fernet,
    ttl_secs: Option<u64>,
}

impl CredentialCipher {
    /// Builds a cipher from a URL-safe base64 key
    pub fn new(key: &str) -> Result<Self, CredentialError> {
        let fernet = Fernet::new(key.trim()).ok_or(CredentialError::InvalidKey)?;
        Ok(Self {
            fernet,
            ttl_secs: None,
        })
    }

    /// Rejects tokens issued more than `ttl_secs` seconds ago
    pub fn with_ttl(mut self, ttl_secs: Option<u64>) -> Self {
        self.ttl_secs = ttl_secs;
        self
    }

    /// Generates a fresh random key suitable for [`CredentialCipher::new`]
    pub fn generate_key() -> String {
        Fernet::generate_key()
    }

    /// Encrypts a plaintext credential into a Fernet token
    pub fn encrypt(&self, plaintext: &str) -> String {
        self.fernet.encrypt(plaintext.as_bytes())
    }

    /// Decrypts a Fernet token into an in-memory secret
    pub fn decrypt(&self, token: &str) -> Result<DecryptedCredential, CredentialError> {
        let token = token.trim();
        let bytes = match self.ttl_secs {
            Some(ttl) => self.fernet.decrypt_with_ttl(token, ttl),
            None => self.fernet.decrypt(token),
        }
        .map_err(|_| CredentialError::Decryption)?;

        DecryptedCredential::from_bytes(bytes)
    }
}

impl fmt::Debug for CredentialCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialCipher")
            .field("key", &"[REDACTED]")
            .field("ttl_secs", &self.ttl_secs)
            .finish()
    }
}

/// Plaintext credential, only reachable through [`DecryptedCredential::expose`]
pub struct DecryptedCredential {
    value: SecretString,
}

impl DecryptedCredential {
    fn from_bytes(bytes: Vec<u8>) -> Result<Self, CredentialError> {
        let value = String::from_utf8(bytes).map_err(|_| CredentialError::InvalidUtf8)?;
        Ok(Self {
            value: SecretString::from(value),
        })
    }

    /// Exposes the plaintext for injection into a clone operation
    ///
    /// Never log or persist the returned value.
    pub fn expose(&self) -> &str {
        self.value.expose_secret()
    }

    pub fn len(&self) -> usize {
        self.expose().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for DecryptedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DecryptedCredential([REDACTED, {} bytes])", self.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> CredentialCipher {
        CredentialCipher::new(&CredentialCipher::generate_key()).unwrap()
    }

    #[test]
    fn test_encrypt_decrypt() {
        let cipher = cipher();
        let token = cipher.encrypt("ghp_exampletoken");

        assert_ne!(token, "ghp_exampletoken");
        let decrypted = cipher.decrypt(&token).unwrap();
        assert_eq!(decrypted.expose(), "ghp_exampletoken");
    }

    #[test]
    fn test_wrong_key_fails() {
        let token = cipher().encrypt("secret");
        let result = cipher().decrypt(&token);
        assert_eq!(result.unwrap_err(), CredentialError::Decryption);
    }

    #[test]
    fn test_malformed_token_fails() {
        let result = cipher().decrypt("not-a-fernet-token");
        assert_eq!(result.unwrap_err(), CredentialError::Decryption);
    }

    #[test]
    fn test_invalid_key_rejected() {
        assert_eq!(
            CredentialCipher::new("tooshort").unwrap_err(),
            CredentialError::InvalidKey
        );
    }

    #[test]
    fn test_key_whitespace_trimmed() {
        let key = format!("  {}\n", CredentialCipher::generate_key());
        assert!(CredentialCipher::new(&key).is_ok());
    }

    #[test]
    fn test_expired_token_rejected() {
        let key = CredentialCipher::generate_key();
        let issuer = Fernet::new(&key).unwrap();
        // Issued at the Unix epoch, far outside any TTL
        let token = issuer.encrypt_at_time(b"secret", 0);

        let cipher = CredentialCipher::new(&key).unwrap().with_ttl(Some(60));
        assert_eq!(cipher.decrypt(&token).unwrap_err(), CredentialError::Decryption);

        let lenient = CredentialCipher::new(&key).unwrap();
        assert_eq!(lenient.decrypt(&token).unwrap().expose(), "secret");
    }

    #[test]
    fn test_debug_never_shows_plaintext() {
        let cipher = cipher();
        let decrypted = cipher.decrypt(&cipher.encrypt("hunter2")).unwrap();

        let debug = format!("{:?} {:?}", decrypted, cipher);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn test_error_messages_do_not_echo_input() {
        let token = "gAAAAABsecretlookingtoken";
        let err = cipher().decrypt(token).unwrap_err();
        assert!(!err.to_string().contains(token));
    }
}

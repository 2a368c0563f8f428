//! Cryptographic primitives: authenticated encryption, credential hashing,
//! and message signing.
//!
//! Every function validates its inputs before doing any cipher work, and all
//! underlying library failures are normalized into [`CryptoError`].

use aes_gcm::{
    aead::{
        generic_array::{typenum::U16, GenericArray},
        Aead, KeyInit,
    },
    aes::Aes256,
    AesGcm,
};
use argon2::{
    password_hash::{rand_core::OsRng as HashRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::CryptoError;

/// AES-256-GCM with a 16-byte IV, matching the payload format used by the
/// surrounding product (the GCM default is 12 bytes).
type Aes256Gcm16 = AesGcm<Aes256, U16>;

const KEY_LEN: usize = 32;
const IV_LEN: usize = 16;
const TAG_LEN: usize = 16;
const MIN_PASSWORD_LEN: usize = 8;

/// Authenticated ciphertext, externally represented as base64 strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedPayload {
    pub ciphertext: String,
    pub iv: String,
    pub tag: String,
}

/// Newtype for password to prevent accidental logging
#[derive(Clone)]
pub struct Password(String);

impl Password {
    pub fn new(password: String) -> Self {
        Self(password)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Password(***)")
    }
}

/// Newtype for a PHC-format password hash
#[derive(Debug, Clone)]
pub struct PasswordHashString(String);

impl PasswordHashString {
    pub fn new(hash: String) -> Self {
        Self(hash)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// Encrypt `plaintext` under a 32-byte key with AES-256-GCM.
///
/// A fresh random 16-byte IV is generated on every call, so encrypting the
/// same plaintext twice never yields the same payload.
pub fn encrypt(plaintext: &str, key: &[u8]) -> Result<EncryptedPayload, CryptoError> {
    if plaintext.is_empty() {
        return Err(CryptoError::InvalidInput("plaintext must not be empty"));
    }
    if key.len() != KEY_LEN {
        return Err(CryptoError::InvalidKeyLength(key.len()));
    }

    let cipher = Aes256Gcm16::new_from_slice(key)
        .map_err(|e| CryptoError::Cipher(e.to_string()))?;

    let mut iv = [0u8; IV_LEN];
    rand::rngs::OsRng.fill_bytes(&mut iv);
    let nonce = GenericArray::from_slice(&iv);

    // The AEAD appends the 16-byte tag to the ciphertext; split it back out
    // so the payload carries the three parts separately.
    let mut ciphertext = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|_| CryptoError::Cipher("encryption failed".to_string()))?;
    let tag = ciphertext.split_off(ciphertext.len() - TAG_LEN);

    Ok(EncryptedPayload {
        ciphertext: BASE64.encode(ciphertext),
        iv: BASE64.encode(iv),
        tag: BASE64.encode(tag),
    })
}

/// Decrypt an [`EncryptedPayload`] under a 32-byte key.
///
/// Tag verification is part of decryption: any corruption of ciphertext, IV,
/// or tag fails with [`CryptoError::TagMismatch`] and no plaintext is
/// returned.
pub fn decrypt(payload: &EncryptedPayload, key: &[u8]) -> Result<String, CryptoError> {
    if key.len() != KEY_LEN {
        return Err(CryptoError::InvalidKeyLength(key.len()));
    }

    let ciphertext = decode_field(&payload.ciphertext, "ciphertext")?;
    let iv = decode_field(&payload.iv, "iv")?;
    let tag = decode_field(&payload.tag, "tag")?;

    if ciphertext.is_empty() {
        return Err(CryptoError::InvalidInput("ciphertext must not be empty"));
    }
    if iv.len() != IV_LEN {
        return Err(CryptoError::InvalidInput("iv must be exactly 16 bytes"));
    }
    if tag.len() != TAG_LEN {
        return Err(CryptoError::InvalidInput("tag must be exactly 16 bytes"));
    }

    let cipher = Aes256Gcm16::new_from_slice(key)
        .map_err(|e| CryptoError::Cipher(e.to_string()))?;
    let nonce = GenericArray::from_slice(&iv);

    let mut combined = ciphertext;
    combined.extend_from_slice(&tag);

    let plaintext = cipher
        .decrypt(nonce, combined.as_ref())
        .map_err(|_| CryptoError::TagMismatch)?;

    String::from_utf8(plaintext)
        .map_err(|_| CryptoError::Encoding("plaintext is not valid UTF-8".to_string()))
}

/// Hash a password with Argon2id.
///
/// The output is a self-describing PHC string (algorithm, cost parameters,
/// and salt included), so verification needs no side channel. Minimum
/// password length is enforced here rather than by the caller.
pub fn hash_password(password: &Password) -> Result<PasswordHashString, CryptoError> {
    if password.as_str().chars().count() < MIN_PASSWORD_LEN {
        return Err(CryptoError::InvalidInput(
            "password must be at least 8 characters",
        ));
    }

    let argon2 = Argon2::default();
    let salt = SaltString::generate(&mut HashRng);

    let hash = argon2
        .hash_password(password.as_str().as_bytes(), &salt)
        .map_err(|e| CryptoError::Cipher(format!("password hashing failed: {}", e)))?
        .to_string();

    Ok(PasswordHashString::new(hash))
}

/// Verify a password against a stored hash.
///
/// The hash format is validated first; the comparison itself goes through
/// Argon2's own verifier, so its cost does not depend on where a mismatch
/// occurs. A mismatch is `Ok(false)`, not an error.
pub fn verify_password(
    password: &Password,
    hash: &PasswordHashString,
) -> Result<bool, CryptoError> {
    let parsed = PasswordHash::new(hash.as_str())
        .map_err(|e| CryptoError::InvalidHashFormat(e.to_string()))?;

    match Argon2::default().verify_password(password.as_str().as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(CryptoError::Cipher(format!(
            "password verification failed: {}",
            e
        ))),
    }
}

/// Compute an HMAC-SHA256 signature over `data`, hex-encoded.
///
/// Deterministic for a given `(data, key)` pair; always 64 hex characters.
pub fn generate_signature(data: &str, key: &str) -> Result<String, CryptoError> {
    if data.is_empty() {
        return Err(CryptoError::InvalidInput("data must not be empty"));
    }
    if key.is_empty() {
        return Err(CryptoError::InvalidInput("key must not be empty"));
    }

    // Fully qualified: `aead::KeyInit` is in scope for the AES cipher and
    // also provides a `new_from_slice`.
    let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(key.as_bytes())
        .map_err(|e| CryptoError::Cipher(e.to_string()))?;
    mac.update(data.as_bytes());

    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn decode_field(value: &str, field: &'static str) -> Result<Vec<u8>, CryptoError> {
    if value.is_empty() {
        return Err(CryptoError::InvalidInput(field));
    }
    BASE64
        .decode(value)
        .map_err(|e| CryptoError::Encoding(format!("{}: {}", field, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> Vec<u8> {
        vec![0x61; 32]
    }

    #[test]
    fn test_encrypt_decrypt_round_trip() {
        let key = test_key();
        let payload = encrypt("hello world", &key).expect("encrypt failed");
        let plaintext = decrypt(&payload, &key).expect("decrypt failed");
        assert_eq!(plaintext, "hello world");
    }

    #[test]
    fn test_payload_serializes_as_base64_triple() {
        let payload = encrypt("hello world", &test_key()).unwrap();
        let json = serde_json::to_value(&payload).unwrap();

        assert!(json["ciphertext"].is_string());
        assert!(json["iv"].is_string());
        assert!(json["tag"].is_string());

        let parsed: EncryptedPayload = serde_json::from_value(json).unwrap();
        assert_eq!(decrypt(&parsed, &test_key()).unwrap(), "hello world");
    }

    #[test]
    fn test_encrypt_unique_iv_per_call() {
        let key = test_key();
        let a = encrypt("same input", &key).unwrap();
        let b = encrypt("same input", &key).unwrap();
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_encrypt_rejects_bad_key_length() {
        let err = encrypt("data", &[0u8; 16]).unwrap_err();
        assert!(matches!(err, CryptoError::InvalidKeyLength(16)));

        let err = decrypt(
            &encrypt("data", &test_key()).unwrap(),
            &[0u8; 31],
        )
        .unwrap_err();
        assert!(matches!(err, CryptoError::InvalidKeyLength(31)));
    }

    #[test]
    fn test_encrypt_rejects_empty_plaintext() {
        let err = encrypt("", &test_key()).unwrap_err();
        assert!(matches!(err, CryptoError::InvalidInput(_)));
    }

    #[test]
    fn test_decrypt_detects_tampered_tag() {
        let key = test_key();
        let mut payload = encrypt("hello world", &key).unwrap();

        let mut tag = BASE64.decode(&payload.tag).unwrap();
        let last = tag.len() - 1;
        tag[last] ^= 0x01;
        payload.tag = BASE64.encode(tag);

        assert!(matches!(
            decrypt(&payload, &key).unwrap_err(),
            CryptoError::TagMismatch
        ));
    }

    #[test]
    fn test_decrypt_detects_tampered_ciphertext() {
        let key = test_key();
        let mut payload = encrypt("hello world", &key).unwrap();

        let mut ct = BASE64.decode(&payload.ciphertext).unwrap();
        ct[0] ^= 0x80;
        payload.ciphertext = BASE64.encode(ct);

        assert!(matches!(
            decrypt(&payload, &key).unwrap_err(),
            CryptoError::TagMismatch
        ));
    }

    #[test]
    fn test_decrypt_detects_tampered_iv() {
        let key = test_key();
        let mut payload = encrypt("hello world", &key).unwrap();

        let mut iv = BASE64.decode(&payload.iv).unwrap();
        iv[3] ^= 0x01;
        payload.iv = BASE64.encode(iv);

        assert!(matches!(
            decrypt(&payload, &key).unwrap_err(),
            CryptoError::TagMismatch
        ));
    }

    #[test]
    fn test_decrypt_rejects_wrong_iv_length() {
        let key = test_key();
        let mut payload = encrypt("hello world", &key).unwrap();
        payload.iv = BASE64.encode([0u8; 12]);

        assert!(matches!(
            decrypt(&payload, &key).unwrap_err(),
            CryptoError::InvalidInput(_)
        ));
    }

    #[test]
    fn test_hash_password_is_self_describing() {
        let password = Password::new("correct horse battery".to_string());
        let hash = hash_password(&password).expect("hash failed");
        assert!(hash.as_str().starts_with("$argon2"));
    }

    #[test]
    fn test_hash_password_enforces_minimum_length() {
        let err = hash_password(&Password::new("short".to_string())).unwrap_err();
        assert!(matches!(err, CryptoError::InvalidInput(_)));
    }

    #[test]
    fn test_hash_password_length_counts_characters_not_bytes() {
        // Four characters but twelve bytes: still too short.
        let err = hash_password(&Password::new("日本語字".to_string())).unwrap_err();
        assert!(matches!(err, CryptoError::InvalidInput(_)));

        // Nine multibyte characters pass.
        assert!(hash_password(&Password::new("日本語のパスワード".to_string())).is_ok());
    }

    #[test]
    fn test_verify_password_matches_and_rejects() {
        let password = Password::new("mySecurePassword123".to_string());
        let hash = hash_password(&password).unwrap();

        assert!(verify_password(&password, &hash).unwrap());
        assert!(!verify_password(&Password::new("wrongPassword1".to_string()), &hash).unwrap());
    }

    #[test]
    fn test_verify_password_rejects_malformed_hash() {
        let err = verify_password(
            &Password::new("mySecurePassword123".to_string()),
            &PasswordHashString::new("not-a-phc-string".to_string()),
        )
        .unwrap_err();
        assert!(matches!(err, CryptoError::InvalidHashFormat(_)));
    }

    #[test]
    fn test_hash_password_salts_independently() {
        let password = Password::new("mySecurePassword123".to_string());
        let h1 = hash_password(&password).unwrap();
        let h2 = hash_password(&password).unwrap();
        assert_ne!(h1.as_str(), h2.as_str());
    }

    #[test]
    fn test_signature_deterministic_64_hex() {
        let a = generate_signature("payload", "secret").unwrap();
        let b = generate_signature("payload", "secret").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));

        let c = generate_signature("payload", "other-secret").unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_signature_rejects_empty_input() {
        assert!(generate_signature("", "secret").is_err());
        assert!(generate_signature("payload", "").is_err());
    }
}

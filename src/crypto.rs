// Authenticated encryption for the opaque session artifact

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose, Engine as _};
use rand::RngCore;
use serde::{de::DeserializeOwned, Serialize};

/// Nonce size for AES-256-GCM encryption (96 bits)
pub const NONCE_SIZE: usize = 12;

/// Encryption key size for AES-256 (256 bits)
pub const ENCRYPTION_KEY_SIZE: usize = 32;

/// Encrypt any serializable value into an opaque token using AES-256-GCM
///
/// The value is serialized to JSON, encrypted under a random nonce, and the
/// result is returned as base64url(nonce + ciphertext). The GCM tag makes the
/// token tamper-evident: any modification fails decryption instead of yielding
/// a different-looking payload.
///
/// # Errors
///
/// Returns an error if:
/// - Serialization fails
/// - Key length is invalid
/// - AES encryption fails
pub fn encrypt_data<T: Serialize>(data: &T, key: &[u8]) -> Result<String> {
    if key.len() != ENCRYPTION_KEY_SIZE {
        return Err(anyhow!(
            "Invalid key length: expected {} bytes, got {}",
            ENCRYPTION_KEY_SIZE,
            key.len()
        ));
    }

    let json_data = serde_json::to_string(data).context("Failed to serialize data")?;

    // Generate random nonce
    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let ciphertext = cipher
        .encrypt(nonce, json_data.as_bytes())
        .map_err(|e| anyhow!("AES encryption failed: {e}"))?;

    // Combine nonce + ciphertext and encode as base64
    let mut combined = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    combined.extend_from_slice(&nonce_bytes);
    combined.extend_from_slice(&ciphertext);

    Ok(general_purpose::URL_SAFE_NO_PAD.encode(&combined))
}

/// Decrypt an opaque token produced by [`encrypt_data`]
///
/// A failure here is ordinary control flow for session handling: a malformed,
/// truncated, or tampered token means "no usable session", never a panic.
///
/// # Errors
///
/// Returns an error if:
/// - Key length is invalid
/// - Base64 decoding fails
/// - Data length is invalid
/// - AES decryption fails or the authentication tag does not verify
/// - Deserialization fails
pub fn decrypt_data<T: DeserializeOwned>(encrypted_data: &str, key: &[u8]) -> Result<T> {
    if key.len() != ENCRYPTION_KEY_SIZE {
        return Err(anyhow!(
            "Invalid key length: expected {} bytes, got {}",
            ENCRYPTION_KEY_SIZE,
            key.len()
        ));
    }

    let combined = general_purpose::URL_SAFE_NO_PAD
        .decode(encrypted_data)
        .context("Failed to decode base64 data")?;

    if combined.len() < NONCE_SIZE {
        return Err(anyhow!("Invalid data length"));
    }

    // Split nonce and ciphertext
    let (nonce_bytes, ciphertext) = combined.split_at(NONCE_SIZE);
    let nonce = Nonce::from_slice(nonce_bytes);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let plaintext = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|e| anyhow!("AES decryption failed: {e}"))?;

    let data: T = serde_json::from_slice(&plaintext)
        .context("Failed to deserialize data from decrypted JSON")?;

    Ok(data)
}

/// Derive a proper 32-byte encryption key from input key material
///
/// Ensures that any configured secret is extended or truncated to exactly
/// 32 bytes for use with AES-256. Keys shorter than 32 bytes are extended
/// with a simple hash-based scheme.
///
/// # Note
///
/// This is a simple key derivation method. For production use with weak keys,
/// consider using proper key derivation functions like PBKDF2 or HKDF.
#[must_use]
pub fn derive_encryption_key(input_key: &[u8]) -> [u8; ENCRYPTION_KEY_SIZE] {
    let mut encryption_key = [0u8; ENCRYPTION_KEY_SIZE];
    let key_len = std::cmp::min(input_key.len(), ENCRYPTION_KEY_SIZE);
    encryption_key[..key_len].copy_from_slice(&input_key[..key_len]);

    // If key is shorter than 32 bytes, derive the rest using a simple hash
    if key_len < ENCRYPTION_KEY_SIZE {
        for i in key_len..ENCRYPTION_KEY_SIZE {
            encryption_key[i] =
                encryption_key[i % key_len].wrapping_add(u8::try_from(i % 256).unwrap_or(0));
        }
    }

    encryption_key
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SessionPayload;

    const TEST_SECRET: &[u8] = b"test_secret_key_for_codec_32byte";

    fn test_key() -> [u8; ENCRYPTION_KEY_SIZE] {
        derive_encryption_key(TEST_SECRET)
    }

    fn sample_payload() -> SessionPayload {
        SessionPayload {
            refresh_token: "refresh-abc".to_string(),
            expires_at: 1_700_000_000_000,
            user_id: Some("u1".to_string()),
            segment_key: Some("seg-7".to_string()),
        }
    }

    #[test]
    fn test_round_trip() {
        let key = test_key();
        let payload = sample_payload();

        let token = encrypt_data(&payload, &key).unwrap();
        let decrypted: SessionPayload = decrypt_data(&token, &key).unwrap();

        assert_eq!(decrypted, payload);
    }

    #[test]
    fn test_round_trip_without_identity_fields() {
        let key = test_key();
        let payload = SessionPayload {
            refresh_token: "refresh-abc".to_string(),
            expires_at: 42,
            user_id: None,
            segment_key: None,
        };

        let token = encrypt_data(&payload, &key).unwrap();
        let decrypted: SessionPayload = decrypt_data(&token, &key).unwrap();

        assert_eq!(decrypted, payload);
    }

    #[test]
    fn test_tamper_detection() {
        let key = test_key();
        let token = encrypt_data(&sample_payload(), &key).unwrap();

        // Flip one bit in every byte position of the decoded token in turn;
        // the GCM tag must reject each variant
        let mut raw = general_purpose::URL_SAFE_NO_PAD.decode(&token).unwrap();
        for i in 0..raw.len() {
            raw[i] ^= 0x01;
            let tampered = general_purpose::URL_SAFE_NO_PAD.encode(&raw);
            let result: Result<SessionPayload> = decrypt_data(&tampered, &key);
            assert!(result.is_err(), "tampered byte {i} was accepted");
            raw[i] ^= 0x01;
        }
    }

    #[test]
    fn test_decrypt_rejects_garbage() {
        let key = test_key();

        let result: Result<SessionPayload> = decrypt_data("not-a-token", &key);
        assert!(result.is_err());

        let result: Result<SessionPayload> = decrypt_data("", &key);
        assert!(result.is_err());
    }

    #[test]
    fn test_decrypt_rejects_truncated_token() {
        let key = test_key();
        let token = encrypt_data(&sample_payload(), &key).unwrap();

        // Shorter than a nonce after decoding
        let raw = general_purpose::URL_SAFE_NO_PAD.decode(&token).unwrap();
        let truncated = general_purpose::URL_SAFE_NO_PAD.encode(&raw[..NONCE_SIZE - 4]);
        let result: Result<SessionPayload> = decrypt_data(&truncated, &key);
        assert!(result.is_err());
    }

    #[test]
    fn test_wrong_key_fails() {
        let key = test_key();
        let other_key = derive_encryption_key(b"a_completely_different_secret_00");
        let token = encrypt_data(&sample_payload(), &key).unwrap();

        let result: Result<SessionPayload> = decrypt_data(&token, &other_key);
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_key_length() {
        let short_key = [0u8; 16];
        let result = encrypt_data(&sample_payload(), &short_key);
        assert!(result.is_err());

        let result: Result<SessionPayload> = decrypt_data("anything", &short_key);
        assert!(result.is_err());
    }

    #[test]
    fn test_derive_encryption_key_lengths() {
        // Short keys are extended deterministically
        let key1 = derive_encryption_key(b"short");
        let key2 = derive_encryption_key(b"short");
        assert_eq!(key1, key2);
        assert_eq!(key1.len(), ENCRYPTION_KEY_SIZE);

        // Long keys are truncated
        let long = [7u8; 64];
        let key = derive_encryption_key(&long);
        assert_eq!(&key[..], &long[..ENCRYPTION_KEY_SIZE]);

        // Different inputs produce different keys
        assert_ne!(derive_encryption_key(b"aaaa"), derive_encryption_key(b"bbbb"));
    }
}

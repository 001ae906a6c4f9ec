//! Password-based sealing of keyring secrets
//!
//! The key is derived with Argon2id from the password and a random 16-byte
//! salt, then used for AES-256-GCM. The sealed form is
//! `salt || nonce || ciphertext`.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use zeroize::Zeroize;

use crate::error::VaultError;
use crate::Result;

const SALT_LENGTH: usize = 16;
const NONCE_LENGTH: usize = 12;
const KEY_LENGTH: usize = 32;

// Argon2id: 19 MiB, 2 passes, 1 lane
const ARGON2_MEMORY_KIB: u32 = 19_456;
const ARGON2_PASSES: u32 = 2;
const ARGON2_LANES: u32 = 1;

fn cipher_for(password: &str, salt: &[u8]) -> Result<Aes256Gcm> {
    let params = Params::new(
        ARGON2_MEMORY_KIB,
        ARGON2_PASSES,
        ARGON2_LANES,
        Some(KEY_LENGTH),
    )
    .map_err(|e| VaultError::internal(format!("argon2 params: {}", e)))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut key = [0u8; KEY_LENGTH];
    argon2
        .hash_password_into(password.as_bytes(), salt, &mut key)
        .map_err(|e| VaultError::internal(format!("key derivation failed: {}", e)))?;

    let cipher =
        Aes256Gcm::new_from_slice(&key).map_err(|_| VaultError::internal("invalid cipher key"));
    key.zeroize();
    cipher
}

/// Seal `plaintext` under `password`
pub fn encrypt(password: &str, plaintext: &[u8]) -> Result<Vec<u8>> {
    let mut salt = [0u8; SALT_LENGTH];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    let cipher = cipher_for(password, &salt)?;

    let mut nonce_bytes = [0u8; NONCE_LENGTH];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| VaultError::internal("encryption failed"))?;

    let mut out = Vec::with_capacity(SALT_LENGTH + NONCE_LENGTH + ciphertext.len());
    out.extend_from_slice(&salt);
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Open data sealed by [`encrypt`]; a wrong password fails with `Internal`
pub fn decrypt(password: &str, sealed: &[u8]) -> Result<Vec<u8>> {
    if sealed.len() < SALT_LENGTH + NONCE_LENGTH {
        return Err(VaultError::internal("sealed secret too short"));
    }

    let (salt, rest) = sealed.split_at(SALT_LENGTH);
    let (nonce_bytes, ciphertext) = rest.split_at(NONCE_LENGTH);
    let cipher = cipher_for(password, salt)?;

    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| VaultError::internal("decryption failed, wrong password or corrupted secret"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_and_open() {
        let sealed = encrypt("hunter2", b"seed bytes").unwrap();
        assert_eq!(decrypt("hunter2", &sealed).unwrap(), b"seed bytes");
    }

    #[test]
    fn test_wrong_password_is_internal_error() {
        let sealed = encrypt("hunter2", b"seed bytes").unwrap();
        assert!(matches!(decrypt("hunter3", &sealed), Err(VaultError::Internal(_))));
    }

    #[test]
    fn test_salt_and_nonce_are_fresh_per_seal() {
        let a = encrypt("pw", b"same").unwrap();
        let b = encrypt("pw", b"same").unwrap();
        // Same password, different derived keys
        assert_ne!(a[..SALT_LENGTH], b[..SALT_LENGTH]);
        assert_ne!(a, b);
        assert_eq!(decrypt("pw", &b).unwrap(), b"same");
    }

    #[test]
    fn test_tampered_salt_fails_to_open() {
        let mut sealed = encrypt("pw", b"secret").unwrap();
        sealed[0] ^= 0xff;
        assert!(decrypt("pw", &sealed).is_err());
    }

    #[test]
    fn test_truncated_secret_is_rejected() {
        assert!(decrypt("pw", &[0u8; SALT_LENGTH + NONCE_LENGTH - 1]).is_err());
    }
}

//! Encryption of the API key stored in the config file.
//!
//! Tokens use the Fernet layout: `0x80 | timestamp (u64 BE) | IV (16) | AES-128-CBC ciphertext |
//! HMAC-SHA256 (32)`, URL-safe base64 encoded. The 32-byte key is split into a signing half and
//! an encryption half. The key is derived from a per-machine seed, so a copied config file does
//! not carry a usable key to another machine. Anyone with access to the machine can still derive
//! it: this is obfuscation at rest, not confidentiality.

use std::time::{SystemTime, UNIX_EPOCH};

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::Aes128;
use base64::{engine::general_purpose::URL_SAFE, Engine as _};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;

const TOKEN_VERSION: u8 = 0x80;
const BLOCK_SIZE: usize = 16;
const HEADER_LEN: usize = 1 + 8 + BLOCK_SIZE;
const MAC_LEN: usize = 32;
const KEY_CONTEXT: &[u8] = b"snip2excel/config-key/v1";

type HmacSha256 = Hmac<Sha256>;
type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("token is not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),
    #[error("token is malformed")]
    Malformed,
    #[error("token signature does not match")]
    Signature,
    #[error("token could not be decrypted")]
    Decrypt,
    #[error("decrypted value is not UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Symmetric cipher for short secrets kept in the config file.
#[derive(Clone)]
pub struct KeyCipher {
    signing_key: [u8; 16],
    encryption_key: [u8; 16],
}

impl std::fmt::Debug for KeyCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("KeyCipher(..)")
    }
}

impl KeyCipher {
    pub fn from_key(key: [u8; 32]) -> Self {
        let mut signing_key = [0u8; 16];
        let mut encryption_key = [0u8; 16];
        signing_key.copy_from_slice(&key[..16]);
        encryption_key.copy_from_slice(&key[16..]);
        Self {
            signing_key,
            encryption_key,
        }
    }

    /// Derives the key from arbitrary seed material.
    pub fn from_seed(seed: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(KEY_CONTEXT);
        hasher.update(seed.as_bytes());
        Self::from_key(hasher.finalize().into())
    }

    /// Cipher bound to the current machine.
    pub fn for_this_machine() -> Self {
        Self::from_seed(&crate::machine_id::key_seed())
    }

    /// Encrypts `plaintext`. Empty input stays empty so an unset key round-trips as `""`.
    pub fn encrypt(&self, plaintext: &str) -> String {
        if plaintext.is_empty() {
            return String::new();
        }
        let mut iv = [0u8; BLOCK_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut iv);
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        self.encrypt_with(plaintext.as_bytes(), iv, timestamp)
    }

    fn encrypt_with(&self, plaintext: &[u8], iv: [u8; BLOCK_SIZE], timestamp: u64) -> String {
        let ciphertext = Aes128CbcEnc::new(&self.encryption_key.into(), &iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

        let mut token = Vec::with_capacity(HEADER_LEN + ciphertext.len() + MAC_LEN);
        token.push(TOKEN_VERSION);
        token.extend_from_slice(&timestamp.to_be_bytes());
        token.extend_from_slice(&iv);
        token.extend_from_slice(&ciphertext);
        let tag = self.mac().chain_update(&token).finalize().into_bytes();
        token.extend_from_slice(&tag);

        URL_SAFE.encode(token)
    }

    /// Decrypts a token produced by [`KeyCipher::encrypt`]. Empty input decrypts to `""`.
    pub fn decrypt(&self, token: &str) -> Result<String, SecretError> {
        let token = token.trim();
        if token.is_empty() {
            return Ok(String::new());
        }
        let data = URL_SAFE.decode(token)?;
        if data.len() < HEADER_LEN + BLOCK_SIZE + MAC_LEN || data[0] != TOKEN_VERSION {
            return Err(SecretError::Malformed);
        }

        let (signed, tag) = data.split_at(data.len() - MAC_LEN);
        self.mac()
            .chain_update(signed)
            .verify_slice(tag)
            .map_err(|_| SecretError::Signature)?;

        let ciphertext = &signed[HEADER_LEN..];
        if ciphertext.len() % BLOCK_SIZE != 0 {
            return Err(SecretError::Malformed);
        }
        let iv: [u8; BLOCK_SIZE] = signed[9..HEADER_LEN]
            .try_into()
            .map_err(|_| SecretError::Malformed)?;
        let plaintext = Aes128CbcDec::new(&self.encryption_key.into(), &iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| SecretError::Decrypt)?;

        Ok(String::from_utf8(plaintext)?)
    }

    fn mac(&self) -> HmacSha256 {
        <HmacSha256 as Mac>::new_from_slice(&self.signing_key)
            .unwrap_or_else(|_| unreachable!("HMAC accepts keys of any length"))
    }
}

//! Hybrid RSA/AES envelope for payloads sent to the remote analytics service.
//!
//! Each call draws a fresh AES-256 key and a fresh 128-bit IV, encrypts the
//! JSON body with AES-256-CBC (PKCS#7), and wraps the key with RSA-OAEP
//! (SHA-1, the OpenSSL default the receiver expects). All three parts travel
//! base64-encoded.

use aes::Aes256;
use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use rand::RngExt;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::errors::EncryptionError;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

const AES_KEY_LEN: usize = 32;
const AES_IV_LEN: usize = 16;

/// Encrypted payload as posted to the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub encrypted_data: String,
    pub encrypted_key: String,
    pub iv: String,
}

/// Parsed recipient key. Parse once and reuse for every envelope.
#[derive(Debug, Clone)]
pub struct EnvelopeKey {
    public_key: RsaPublicKey,
}

impl EnvelopeKey {
    /// Accepts SPKI (`BEGIN PUBLIC KEY`) and PKCS#1 (`BEGIN RSA PUBLIC KEY`) PEM.
    pub fn from_pem(pem: &str) -> Result<Self, EncryptionError> {
        let pem = pem.trim();
        let public_key = RsaPublicKey::from_public_key_pem(pem)
            .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
            .map_err(|e| {
                let err = EncryptionError::KeyLoad(e.to_string());
                error!("Failed to load public key: {}", e);
                err
            })?;
        Ok(Self { public_key })
    }

    /// Serializes `payload` to JSON and seals it.
    pub fn seal<T: Serialize + ?Sized>(&self, payload: &T) -> Result<Envelope, EncryptionError> {
        let json = serde_json::to_vec(payload).map_err(|e| {
            error!("JSON encoding failed: {}", e);
            EncryptionError::JsonEncode(e.to_string())
        })?;
        self.seal_bytes(&json)
    }

    fn seal_bytes(&self, plaintext: &[u8]) -> Result<Envelope, EncryptionError> {
        let mut key = [0u8; AES_KEY_LEN];
        let mut iv = [0u8; AES_IV_LEN];
        let mut rng = rand::rng();
        rng.fill(&mut key);
        rng.fill(&mut iv);

        let ciphertext = Aes256CbcEnc::new_from_slices(&key, &iv)
            .map_err(|e| {
                error!("AES encryption failed: {}", e);
                EncryptionError::AesEncrypt(e.to_string())
            })?
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

        let wrapped_key = self
            .public_key
            .encrypt(&mut rsa::rand_core::OsRng, Oaep::new::<sha1::Sha1>(), &key)
            .map_err(|e| {
                error!("RSA encryption failed: {}", e);
                EncryptionError::RsaEncrypt(e.to_string())
            })?;

        Ok(Envelope {
            encrypted_data: BASE64.encode(ciphertext),
            encrypted_key: BASE64.encode(wrapped_key),
            iv: BASE64.encode(iv),
        })
    }
}

/// One-shot helper: parse `public_key_pem` and seal `payload`.
pub fn encrypt<T: Serialize + ?Sized>(
    payload: &T,
    public_key_pem: &str,
) -> Result<Envelope, EncryptionError> {
    EnvelopeKey::from_pem(public_key_pem)?.seal(payload)
}

impl Envelope {
    /// Reverses [`EnvelopeKey::seal`] with the matching private key.
    pub fn open(&self, private_key: &RsaPrivateKey) -> Result<Vec<u8>, EncryptionError> {
        let decode = |field: &str, value: &str| {
            BASE64
                .decode(value)
                .map_err(|e| EncryptionError::AesEncrypt(format!("{}: {}", field, e)))
        };
        let ciphertext = decode("encrypted_data", &self.encrypted_data)?;
        let wrapped_key = decode("encrypted_key", &self.encrypted_key)?;
        let iv = decode("iv", &self.iv)?;

        let key = private_key
            .decrypt(Oaep::new::<sha1::Sha1>(), &wrapped_key)
            .map_err(|e| EncryptionError::RsaEncrypt(e.to_string()))?;

        Aes256CbcDec::new_from_slices(&key, &iv)
            .map_err(|e| EncryptionError::AesEncrypt(e.to_string()))?
            .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
            .map_err(|e| EncryptionError::AesEncrypt(e.to_string()))
    }
}

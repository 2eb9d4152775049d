//! WEAPI encryption for Netease Cloud Music API.
//!
//! Flow: JSON → AES-CBC(preset_key) → base64 → AES-CBC(random_key) → base64 = params
//! RSA:  `reverse(random_key)` → `modpow(e, n)` → hex, zero-padded to 256 chars = `encSecKey`
//!
//! The preset key, IV, and RSA public key are protocol constants lifted from
//! the Netease web client. They are not secrets. The only secret is the
//! 16-byte random key, which is minted fresh for every request.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use aes::Aes128;
use base64::{Engine, engine::general_purpose::STANDARD as B64};
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
use cbc::{Decryptor, Encryptor};
use num_bigint::BigUint;
use rand::{TryRngCore, rngs::OsRng};
use serde_json::Value;

use crate::error::{NeteaseError, Result};

/// CBC initialisation vector shared by both AES passes.
pub const IV: &[u8; 16] = b"0102030405060708";
/// Fixed key of the first AES pass.
pub const PRESET_KEY: &[u8; 16] = b"0CoJUm6Qyw8W8jud";
/// Public exponent of the WEAPI RSA key.
pub const RSA_EXPONENT: u32 = 65537;

// RSA-1024 public key extracted from Netease web client
const RSA_MODULUS_HEX: &str = "\
    e0b509f6259df8642dbc35662901477df22677ec152b5ff68ace615bb7b72515\
    2b3ab17a876aea8a5aa76d2e417629ec4ee341f56135fccf695280104e0312ec\
    bda92557c93870114af6c9d05c4f7f0c3685b7a46bee255932575cce10b424d\
    813cfe4875d3e82047b97ddef52741d546b8e289dc6935b3ece0462db0a22b8e7";

const KEY_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
// Largest multiple of the alphabet size that fits in a byte.
const SAMPLE_LIMIT: u8 = 248;

type Aes128CbcEnc = Encryptor<Aes128>;
type Aes128CbcDec = Decryptor<Aes128>;

/// The per-request random AES key.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey([u8; 16]);

impl SecretKey {
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(..)")
    }
}

/// Source of per-request random keys.
///
/// Production code uses [`OsKeySource`]. Tests may inject a fixed key so a
/// stub server can open the payload.
pub trait KeySource: Send + Sync {
    fn generate(&self) -> Result<SecretKey>;
}

/// Draws alphanumeric keys from the operating system CSPRNG.
///
/// There is no fallback generator: if the OS cannot supply entropy the
/// request fails with [`NeteaseError::Crypto`].
#[derive(Debug, Default, Clone, Copy)]
pub struct OsKeySource;

impl KeySource for OsKeySource {
    fn generate(&self) -> Result<SecretKey> {
        let mut key = [0u8; 16];
        let mut filled = 0;
        let mut pool = [0u8; 32];
        while filled < key.len() {
            OsRng
                .try_fill_bytes(&mut pool)
                .map_err(|e| NeteaseError::Crypto(format!("OS entropy unavailable: {e}")))?;
            for &b in pool.iter().filter(|&&b| b < SAMPLE_LIMIT) {
                if filled == key.len() {
                    break;
                }
                key[filled] = KEY_ALPHABET[usize::from(b) % KEY_ALPHABET.len()];
                filled += 1;
            }
        }
        Ok(SecretKey(key))
    }
}

/// Key material for a single request: the fresh random key plus the
/// protocol constants it is combined with.
#[derive(Debug, Clone)]
pub struct SessionKeyMaterial {
    random_key: SecretKey,
}

impl SessionKeyMaterial {
    /// Mint new material from `source`.
    pub fn fresh(source: &dyn KeySource) -> Result<Self> {
        Ok(Self { random_key: source.generate()? })
    }

    pub fn with_key(random_key: SecretKey) -> Self {
        Self { random_key }
    }

    pub fn random_key(&self) -> &SecretKey {
        &self.random_key
    }

    pub fn fixed_key(&self) -> &'static [u8; 16] {
        PRESET_KEY
    }

    pub fn rsa_modulus(&self) -> Result<BigUint> {
        BigUint::parse_bytes(RSA_MODULUS_HEX.replace(' ', "").as_bytes(), 16)
            .ok_or_else(|| NeteaseError::Crypto("invalid RSA modulus".into()))
    }

    pub fn rsa_exponent(&self) -> BigUint {
        BigUint::from(RSA_EXPONENT)
    }
}

/// A logical API call before signing.
///
/// `params` is an ordered map, so the serialized form is stable regardless
/// of insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestEnvelope {
    path: String,
    params: BTreeMap<String, Value>,
}

impl RequestEnvelope {
    /// Start an envelope for `path` (the part after `/weapi`, e.g. `/song/lyric`).
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            params: BTreeMap::new(),
        }
    }

    /// Add a parameter.
    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Build an envelope from a JSON object.
    pub fn from_json(path: impl Into<String>, data: Value) -> Result<Self> {
        let Value::Object(map) = data else {
            return Err(NeteaseError::Other("request params must be a JSON object".into()));
        };
        Ok(Self {
            path: path.into(),
            params: map.into_iter().collect(),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn params(&self) -> &BTreeMap<String, Value> {
        &self.params
    }

    /// Compact JSON with keys in sorted order; `{}` when empty.
    pub fn canonical_params(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.params)?)
    }
}

/// WEAPI encrypted payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedPayload {
    /// Sent as the `params` form field.
    pub enc_text: String,
    pub enc_sec_key: String,
}

impl EncryptedPayload {
    /// URL-encoded form body.
    pub fn form_body(&self) -> String {
        format!(
            "params={}&encSecKey={}",
            urlencoding::encode(&self.enc_text),
            self.enc_sec_key,
        )
    }
}

/// Stateless WEAPI codec.
///
/// Encryption draws a new key from the configured [`KeySource`] on every
/// call and keeps nothing between calls.
#[derive(Clone)]
pub struct CryptoEngine {
    keys: Arc<dyn KeySource>,
}

impl Default for CryptoEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CryptoEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CryptoEngine").finish_non_exhaustive()
    }
}

impl CryptoEngine {
    pub fn new() -> Self {
        Self::with_key_source(Arc::new(OsKeySource))
    }

    pub fn with_key_source(keys: Arc<dyn KeySource>) -> Self {
        Self { keys }
    }

    /// Encrypt `envelope` with freshly minted key material.
    pub fn encrypt(&self, envelope: &RequestEnvelope) -> Result<EncryptedPayload> {
        let material = SessionKeyMaterial::fresh(self.keys.as_ref())?;
        encrypt_with(envelope, &material)
    }

    /// Decrypt a response body sealed with the preset key.
    pub fn decrypt(&self, body: &[u8]) -> Result<Vec<u8>> {
        decrypt(body)
    }
}

/// Encrypt `envelope` using the given key material.
pub fn encrypt_with(
    envelope: &RequestEnvelope,
    material: &SessionKeyMaterial,
) -> Result<EncryptedPayload> {
    let text = envelope.canonical_params()?;

    let pass1 = aes_cbc_encrypt(text.as_bytes(), material.fixed_key(), IV)?;
    let pass1_b64 = B64.encode(&pass1);

    let pass2 = aes_cbc_encrypt(pass1_b64.as_bytes(), material.random_key().as_bytes(), IV)?;
    let enc_text = B64.encode(&pass2);

    let enc_sec_key = rsa_encrypt(material)?;

    Ok(EncryptedPayload { enc_text, enc_sec_key })
}

/// Decrypt a base64 AES-CBC body sealed with the preset key.
pub fn decrypt(body: &[u8]) -> Result<Vec<u8>> {
    let ciphertext = B64
        .decode(body.trim_ascii())
        .map_err(|e| NeteaseError::MalformedResponse(format!("invalid base64: {e}")))?;
    aes_cbc_decrypt(&ciphertext, PRESET_KEY, IV)
}

/// Inverse of [`decrypt`]: seal `plaintext` with the preset key.
pub fn seal(plaintext: &[u8]) -> Result<String> {
    Ok(B64.encode(aes_cbc_encrypt(plaintext, PRESET_KEY, IV)?))
}

/// Undo both AES passes of an `encText` given its random key.
///
/// This is what the server does after unwrapping `encSecKey`.
pub fn open_params(enc_text: &str, key: &SecretKey) -> Result<String> {
    let outer = B64
        .decode(enc_text)
        .map_err(|e| NeteaseError::MalformedResponse(format!("invalid base64: {e}")))?;
    let inner_b64 = aes_cbc_decrypt(&outer, key.as_bytes(), IV)?;
    let inner = B64
        .decode(&inner_b64)
        .map_err(|e| NeteaseError::MalformedResponse(format!("invalid base64: {e}")))?;
    let plain = aes_cbc_decrypt(&inner, PRESET_KEY, IV)?;
    String::from_utf8(plain).map_err(|e| NeteaseError::MalformedResponse(e.to_string()))
}

/// AES-128-CBC encrypt with PKCS7 padding.
fn aes_cbc_encrypt(plaintext: &[u8], key: &[u8; 16], iv: &[u8; 16]) -> Result<Vec<u8>> {
    let enc = Aes128CbcEnc::new(key.into(), iv.into());
    // Always room for one extra block of padding.
    let pad_len = 16 - (plaintext.len() % 16);
    let mut buf = vec![0u8; plaintext.len() + pad_len];
    buf[..plaintext.len()].copy_from_slice(plaintext);
    let ct = enc
        .encrypt_padded_mut::<Pkcs7>(&mut buf, plaintext.len())
        .map_err(|_| NeteaseError::Crypto("AES padding buffer too small".into()))?;
    Ok(ct.to_vec())
}

/// AES-128-CBC decrypt and strip PKCS7 padding.
fn aes_cbc_decrypt(ciphertext: &[u8], key: &[u8; 16], iv: &[u8; 16]) -> Result<Vec<u8>> {
    if ciphertext.is_empty() || ciphertext.len() % 16 != 0 {
        return Err(NeteaseError::MalformedResponse(format!(
            "ciphertext length {} is not a positive multiple of 16",
            ciphertext.len()
        )));
    }
    let dec = Aes128CbcDec::new(key.into(), iv.into());
    let mut buf = ciphertext.to_vec();
    let pt = dec
        .decrypt_padded_mut::<Pkcs7>(&mut buf)
        .map_err(|_| NeteaseError::MalformedResponse("bad PKCS7 padding".into()))?;
    Ok(pt.to_vec())
}

/// RSA `NO_PADDING` encrypt: reverse key, `modpow(e, n)`, hex output.
fn rsa_encrypt(material: &SessionKeyMaterial) -> Result<String> {
    let reversed: Vec<u8> = material.random_key().as_bytes().iter().copied().rev().collect();
    let m = BigUint::from_bytes_be(&reversed);
    let cipher = m.modpow(&material.rsa_exponent(), &material.rsa_modulus()?);
    Ok(format!("{cipher:0>256x}"))
}

/// The `encSecKey` a request signed with `key` carries.
pub fn wrap_key(key: &SecretKey) -> Result<String> {
    rsa_encrypt(&SessionKeyMaterial::with_key(key.clone()))
}

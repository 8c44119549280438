//! AES-128-CBC + HMAC-SHA256 (encrypt-then-MAC) envelope, with separate
//! 128-bit keys derived from a single 256-bit master key via HMAC domain
//! separation. The envelope is a single version byte, a 16-byte IV, the
//! ciphertext, and a 32-byte MAC tag, url-safe base64 encoded with no padding.

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::Engine as _;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use lockbox_domain::{Error, Result};

const VERSION: u8 = 1;
const IV_LEN: usize = 16;
const MAC_LEN: usize = 32;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type HmacSha256 = Hmac<Sha256>;

/// Holds the two 128-bit subkeys derived from the process's master key.
/// Only this type ever touches key material; callers pass and receive
/// opaque base64 envelope strings.
pub struct Vault {
    enc_key: [u8; 16],
    mac_key: [u8; 16],
}

impl Vault {
    /// `master_key` must be exactly 32 bytes.
    pub fn new(master_key: &[u8]) -> Result<Self> {
        if master_key.len() != 32 {
            return Err(Error::Vault(format!(
                "master key must be 32 bytes, got {}",
                master_key.len()
            )));
        }
        let enc_key = derive_subkey(master_key, b"lockbox-vault-enc");
        let mac_key = derive_subkey(master_key, b"lockbox-vault-mac");
        Ok(Self { enc_key, mac_key })
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let mut iv = [0u8; IV_LEN];
        rand::thread_rng().fill_bytes(&mut iv);

        let ciphertext =
            Aes128CbcEnc::new(&self.enc_key.into(), &iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

        let mut body = Vec::with_capacity(1 + IV_LEN + ciphertext.len());
        body.push(VERSION);
        body.extend_from_slice(&iv);
        body.extend_from_slice(&ciphertext);

        let tag = self.mac(&body);
        body.extend_from_slice(&tag);

        Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(body))
    }

    pub fn decrypt(&self, envelope: &str) -> Result<String> {
        let raw = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(envelope)
            .map_err(|e| Error::Vault(format!("malformed envelope: {e}")))?;

        if raw.len() < 1 + IV_LEN + MAC_LEN {
            return Err(Error::Vault("envelope too short".into()));
        }

        let (signed, tag) = raw.split_at(raw.len() - MAC_LEN);
        let expected_tag = self.mac(signed);
        if !bool::from(expected_tag.ct_eq(tag)) {
            return Err(Error::Vault("MAC verification failed".into()));
        }

        let version = signed[0];
        if version != VERSION {
            return Err(Error::Vault(format!("unsupported envelope version {version}")));
        }

        let iv = &signed[1..1 + IV_LEN];
        let ciphertext = &signed[1 + IV_LEN..];

        let plaintext = Aes128CbcDec::new(&self.enc_key.into(), iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|e| Error::Vault(format!("padding/decrypt failure: {e}")))?;

        String::from_utf8(plaintext).map_err(|e| Error::Vault(format!("non-utf8 plaintext: {e}")))
    }

    fn mac(&self, data: &[u8]) -> [u8; MAC_LEN] {
        let mut mac = HmacSha256::new_from_slice(&self.mac_key).expect("HMAC accepts any key length");
        mac.update(data);
        mac.finalize().into_bytes().into()
    }
}

fn derive_subkey(master_key: &[u8], label: &[u8]) -> [u8; 16] {
    let mut mac = HmacSha256::new_from_slice(master_key).expect("HMAC accepts any key length");
    mac.update(label);
    let digest = mac.finalize().into_bytes();
    let mut out = [0u8; 16];
    out.copy_from_slice(&digest[..16]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_vault() -> Vault {
        Vault::new(&[7u8; 32]).unwrap()
    }

    #[test]
    fn round_trip() {
        let vault = test_vault();
        let envelope = vault.encrypt("hunter2").unwrap();
        assert_eq!(vault.decrypt(&envelope).unwrap(), "hunter2");
    }

    #[test]
    fn tampered_envelope_rejected() {
        let vault = test_vault();
        let mut envelope = vault.encrypt("hunter2").unwrap();
        envelope.pop();
        envelope.push(if envelope.ends_with('A') { 'B' } else { 'A' });
        assert!(vault.decrypt(&envelope).is_err());
    }

    #[test]
    fn wrong_key_rejected() {
        let vault = test_vault();
        let envelope = vault.encrypt("hunter2").unwrap();
        let other = Vault::new(&[9u8; 32]).unwrap();
        assert!(other.decrypt(&envelope).is_err());
    }

    #[test]
    fn rejects_non_32_byte_keys() {
        assert!(Vault::new(&[0u8; 16]).is_err());
    }

    #[test]
    fn distinct_ivs_produce_distinct_envelopes() {
        let vault = test_vault();
        let a = vault.encrypt("hunter2").unwrap();
        let b = vault.encrypt("hunter2").unwrap();
        assert_ne!(a, b);
    }
}

//! Object-level encryption handler.
//!
//! Owns the parsed `/Encrypt` dictionary and the derived file key, and
//! performs per-object decryption and (for the rewriter) encryption.

use md5::{Digest, Md5};

use super::{algorithms, cbc_decrypt, cbc_encrypt, rc4_crypt, Cipher, EncryptDict, Permissions};
use crate::error::{Error, Result};
use crate::object::Object;

/// Encryption handler for one document.
#[derive(Debug, Clone)]
pub struct EncryptionHandler {
    dict: EncryptDict,
    file_id: Vec<u8>,
    file_key: Option<Vec<u8>>,
}

impl EncryptionHandler {
    /// Create a handler from the `/Encrypt` dictionary object and the
    /// first element of the trailer's `/ID` array.
    pub fn new(encrypt_obj: &Object, file_id: Vec<u8>) -> Result<Self> {
        let dict = EncryptDict::from_object(encrypt_obj)?;
        log::info!(
            "document is encrypted: V={} R={} cipher={:?}",
            dict.version,
            dict.revision,
            dict.cipher
        );
        Ok(Self {
            dict,
            file_id,
            file_key: None,
        })
    }

    /// Build a handler from an already parsed dictionary and a known file
    /// key. Used by the writer when re-encrypting a mutated document.
    pub fn with_file_key(dict: EncryptDict, file_id: Vec<u8>, file_key: Vec<u8>) -> Self {
        Self {
            dict,
            file_id,
            file_key: Some(file_key),
        }
    }

    /// Attempt authentication with a password, first as the user password,
    /// then as the owner password. On success the file key is retained.
    pub fn authenticate(&mut self, password: &[u8]) -> Result<bool> {
        let key = if self.dict.revision >= 5 {
            self.authenticate_r5(password)?
        } else {
            self.authenticate_legacy(password)
        };

        match key {
            Some(key) => {
                self.file_key = Some(key);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn authenticate_legacy(&self, password: &[u8]) -> Option<Vec<u8>> {
        algorithms::verify_user_password_legacy(
            password,
            &self.dict.user_value,
            &self.dict.owner_value,
            self.dict.permissions,
            &self.file_id,
            self.dict.revision,
            self.dict.key_length,
            self.dict.encrypt_metadata,
        )
        .or_else(|| {
            algorithms::verify_owner_password_legacy(
                password,
                &self.dict.user_value,
                &self.dict.owner_value,
                self.dict.permissions,
                &self.file_id,
                self.dict.revision,
                self.dict.key_length,
                self.dict.encrypt_metadata,
            )
        })
    }

    fn authenticate_r5(&self, password: &[u8]) -> Result<Option<Vec<u8>>> {
        if algorithms::verify_password_r5(password, &self.dict.user_value, &self.file_id) {
            let password_key = algorithms::compute_password_key_r5(password, &self.file_id);
            let wrapped = self
                .dict
                .user_encrypted
                .as_deref()
                .ok_or_else(|| Error::Decryption("missing /UE".to_string()))?;
            return algorithms::unwrap_file_key_r5(&password_key, wrapped).map(Some);
        }

        if algorithms::verify_password_r5(password, &self.dict.owner_value, &self.file_id) {
            let password_key = algorithms::compute_password_key_r5(password, &self.file_id);
            let wrapped = self
                .dict
                .owner_encrypted
                .as_deref()
                .ok_or_else(|| Error::Decryption("missing /OE".to_string()))?;
            return algorithms::unwrap_file_key_r5(&password_key, wrapped).map(Some);
        }

        Ok(None)
    }

    /// True after a successful `authenticate`.
    pub fn is_authenticated(&self) -> bool {
        self.file_key.is_some()
    }

    /// The derived file encryption key.
    pub fn file_key(&self) -> Option<&[u8]> {
        self.file_key.as_deref()
    }

    /// The parsed encryption dictionary.
    pub fn dict(&self) -> &EncryptDict {
        &self.dict
    }

    /// Typed permission flags.
    pub fn permissions(&self) -> Permissions {
        self.dict.permissions()
    }

    /// Decrypt one object's string or stream bytes.
    ///
    /// For AES the leading 16 ciphertext bytes are the IV. The caller is
    /// responsible for the exemptions (xref streams, the /Encrypt
    /// dictionary itself are never encrypted).
    pub fn decrypt_object_bytes(&self, data: &[u8], obj_num: u32, gen_num: u16) -> Result<Vec<u8>> {
        let file_key = self
            .file_key
            .as_deref()
            .ok_or_else(|| Error::Decryption("not authenticated".to_string()))?;

        match self.dict.cipher {
            Cipher::Identity => Ok(data.to_vec()),
            Cipher::Rc4 => {
                let key = algorithms::compute_object_key(file_key, obj_num, gen_num, false);
                Ok(rc4_crypt(&key, data))
            }
            Cipher::Aes128 => {
                let key = algorithms::compute_object_key(file_key, obj_num, gen_num, true);
                let (iv, ciphertext) = split_iv(data)?;
                cbc_decrypt(&key, iv, ciphertext)
            }
            Cipher::Aes256 => {
                // The 32-byte file key is used directly, no per-object step
                let (iv, ciphertext) = split_iv(data)?;
                cbc_decrypt(file_key, iv, ciphertext)
            }
        }
    }

    /// Encrypt one object's string or stream bytes with a freshly derived
    /// per-object key. The inverse of [`decrypt_object_bytes`].
    ///
    /// [`decrypt_object_bytes`]: Self::decrypt_object_bytes
    pub fn encrypt_object_bytes(&self, data: &[u8], obj_num: u32, gen_num: u16) -> Result<Vec<u8>> {
        let file_key = self
            .file_key
            .as_deref()
            .ok_or_else(|| Error::Decryption("not authenticated".to_string()))?;

        match self.dict.cipher {
            Cipher::Identity => Ok(data.to_vec()),
            Cipher::Rc4 => {
                let key = algorithms::compute_object_key(file_key, obj_num, gen_num, false);
                Ok(rc4_crypt(&key, data))
            }
            Cipher::Aes128 => {
                let key = algorithms::compute_object_key(file_key, obj_num, gen_num, true);
                let iv = self.derive_iv(obj_num, gen_num, data.len());
                let mut out = iv.to_vec();
                out.extend(cbc_encrypt(&key, &iv, data)?);
                Ok(out)
            }
            Cipher::Aes256 => {
                let iv = self.derive_iv(obj_num, gen_num, data.len());
                let mut out = iv.to_vec();
                out.extend(cbc_encrypt(file_key, &iv, data)?);
                Ok(out)
            }
        }
    }

    /// IV for re-encryption, derived from the file key, the object id and
    /// the payload length. Deterministic so rewrites are reproducible.
    fn derive_iv(&self, obj_num: u32, gen_num: u16, len: usize) -> [u8; 16] {
        let mut hasher = Md5::new();
        hasher.update(self.file_key.as_deref().unwrap_or_default());
        hasher.update(obj_num.to_le_bytes());
        hasher.update(gen_num.to_le_bytes());
        hasher.update((len as u64).to_le_bytes());
        hasher.finalize().into()
    }
}

fn split_iv(data: &[u8]) -> Result<(&[u8], &[u8])> {
    if data.len() < 16 {
        return Err(Error::Decryption(format!(
            "AES payload too short for an IV ({} bytes)",
            data.len()
        )));
    }
    Ok(data.split_at(16))
}

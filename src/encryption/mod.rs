//! Standard security handler (ISO 32000 §7.6).
//!
//! Password-based key derivation and object-level cipher dispatch for
//! V=1..5 / R=2..6: RC4-40, RC4-128, AES-128-CBC and AES-256-CBC.
//! Certificate-based handlers are out of scope and rejected as
//! unsupported.

use crate::error::{Error, Result};
use crate::object::Object;

mod aes;
mod algorithms;
mod handler;
mod rc4;

pub use algorithms::{
    compute_file_key_legacy, compute_object_key, compute_owner_value, compute_password_key_r5,
    compute_stored_value_r5, compute_user_value_r2, compute_user_value_r3, pad_password,
    unwrap_file_key_r5, verify_owner_password_legacy, verify_password_r5,
    verify_user_password_legacy, wrap_file_key_r5,
};
pub use handler::EncryptionHandler;

pub(crate) use aes::{cbc_decrypt, cbc_encrypt};
pub(crate) use rc4::rc4_crypt;

/// Cipher selected by the V/R combination and the `/CF` crypt filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cipher {
    /// RC4 stream cipher (V=1, V=2, or V=4 with /CFM /V2)
    Rc4,
    /// AES-128-CBC (V=4 with /CFM /AESV2)
    Aes128,
    /// AES-256-CBC (V=5 with /CFM /AESV3)
    Aes256,
    /// Identity crypt filter: data passes through unencrypted
    Identity,
}

impl Cipher {
    /// True for the AES variants.
    pub fn is_aes(&self) -> bool {
        matches!(self, Cipher::Aes128 | Cipher::Aes256)
    }
}

/// Parsed `/Encrypt` dictionary of the standard security handler.
#[derive(Debug, Clone)]
pub struct EncryptDict {
    /// Security handler name; only "Standard" is supported
    pub filter: String,
    /// Algorithm version (V): 1, 2, 4 or 5
    pub version: u32,
    /// Revision (R): 2..6
    pub revision: u32,
    /// Key length in bytes: 5, 16 or 32
    pub key_length: usize,
    /// Stored owner value (O): 32 bytes for r<=4, 48 for r>=5
    pub owner_value: Vec<u8>,
    /// Stored user value (U): 32 bytes for r<=4, 48 for r>=5
    pub user_value: Vec<u8>,
    /// Wrapped owner file key (OE), r>=5 only
    pub owner_encrypted: Option<Vec<u8>>,
    /// Wrapped user file key (UE), r>=5 only
    pub user_encrypted: Option<Vec<u8>>,
    /// Permission bits (P)
    pub permissions: i32,
    /// Whether the metadata stream is encrypted
    pub encrypt_metadata: bool,
    /// Cipher for streams and strings, from V and the /CF subdictionary
    pub cipher: Cipher,
}

impl EncryptDict {
    /// Parse the `/Encrypt` dictionary object.
    pub fn from_object(obj: &Object) -> Result<Self> {
        let dict = obj
            .as_dict()
            .ok_or_else(|| Error::InvalidPdf("/Encrypt is not a dictionary".to_string()))?;

        let filter = dict
            .get("Filter")
            .and_then(|o| o.as_name())
            .ok_or_else(|| Error::InvalidPdf("/Encrypt missing /Filter".to_string()))?
            .to_string();
        if filter != "Standard" {
            return Err(Error::Unsupported(format!(
                "security handler /{} (only the standard handler is supported)",
                filter
            )));
        }

        let version = dict
            .get("V")
            .and_then(|o| o.as_integer())
            .ok_or_else(|| Error::InvalidPdf("/Encrypt missing /V".to_string()))?
            as u32;
        let revision = dict
            .get("R")
            .and_then(|o| o.as_integer())
            .ok_or_else(|| Error::InvalidPdf("/Encrypt missing /R".to_string()))?
            as u32;

        if !matches!(version, 1 | 2 | 4 | 5) || !(2..=6).contains(&revision) {
            return Err(Error::Unsupported(format!(
                "encryption V={} R={}",
                version, revision
            )));
        }

        let owner_value = dict
            .get("O")
            .and_then(|o| o.as_string())
            .ok_or_else(|| Error::InvalidPdf("/Encrypt missing /O".to_string()))?
            .to_vec();
        let user_value = dict
            .get("U")
            .and_then(|o| o.as_string())
            .ok_or_else(|| Error::InvalidPdf("/Encrypt missing /U".to_string()))?
            .to_vec();

        let expected_len = if revision >= 5 { 48 } else { 32 };
        if owner_value.len() != expected_len || user_value.len() != expected_len {
            return Err(Error::InvalidPdf(format!(
                "/O and /U must be {} bytes for R={} (got {} and {})",
                expected_len,
                revision,
                owner_value.len(),
                user_value.len()
            )));
        }

        let permissions = dict
            .get("P")
            .and_then(|o| o.as_integer())
            .ok_or_else(|| Error::InvalidPdf("/Encrypt missing /P".to_string()))?
            as i32;

        let encrypt_metadata = dict
            .get("EncryptMetadata")
            .and_then(|o| o.as_bool())
            .unwrap_or(true);

        let key_length = match dict.get("Length").and_then(|o| o.as_integer()) {
            Some(bits) => (bits / 8) as usize,
            None => match version {
                1 => 5,
                2 | 4 => 16,
                _ => 32,
            },
        };
        if !matches!(key_length, 5..=16 | 32) {
            return Err(Error::InvalidPdf(format!(
                "implausible key length {} bytes",
                key_length
            )));
        }

        let cipher = resolve_cipher(dict, version)?;

        let owner_encrypted = dict.get("OE").and_then(|o| o.as_string()).map(|s| s.to_vec());
        let user_encrypted = dict.get("UE").and_then(|o| o.as_string()).map(|s| s.to_vec());

        if revision >= 5 && (owner_encrypted.is_none() || user_encrypted.is_none()) {
            return Err(Error::InvalidPdf(
                "/Encrypt R>=5 requires /OE and /UE".to_string(),
            ));
        }

        Ok(EncryptDict {
            filter,
            version,
            revision,
            key_length,
            owner_value,
            user_value,
            owner_encrypted,
            user_encrypted,
            permissions,
            encrypt_metadata,
            cipher,
        })
    }

    /// Typed view over the permission bits.
    pub fn permissions(&self) -> Permissions {
        Permissions::from_bits(self.permissions)
    }
}

/// Determine the object cipher from V and the `/CF` crypt-filter
/// subdictionary named by `/StmF`.
fn resolve_cipher(dict: &std::collections::HashMap<String, Object>, version: u32) -> Result<Cipher> {
    match version {
        1 | 2 => Ok(Cipher::Rc4),
        4 | 5 => {
            let stream_filter = dict
                .get("StmF")
                .and_then(|o| o.as_name())
                .unwrap_or("StdCF");
            if stream_filter == "Identity" {
                return Ok(Cipher::Identity);
            }
            let method = dict
                .get("CF")
                .and_then(|o| o.as_dict())
                .and_then(|cf| cf.get(stream_filter))
                .and_then(|sub| sub.as_dict())
                .and_then(|sub| sub.get("CFM"))
                .and_then(|o| o.as_name());
            match method {
                Some("AESV2") => Ok(Cipher::Aes128),
                Some("AESV3") => Ok(Cipher::Aes256),
                Some("V2") => Ok(Cipher::Rc4),
                Some("Identity") => Ok(Cipher::Identity),
                // No /CF at all: V=4 historically means RC4, V=5 AES-256
                None if version == 4 => Ok(Cipher::Rc4),
                None => Ok(Cipher::Aes256),
                Some(other) => Err(Error::Unsupported(format!("crypt filter method /{}", other))),
            }
        }
        other => Err(Error::Unsupported(format!("encryption version {}", other))),
    }
}

/// User access permissions decoded from the `/P` field.
#[derive(Debug, Clone, Copy)]
pub struct Permissions {
    bits: i32,
}

impl Permissions {
    /// Wrap raw `/P` bits.
    pub fn from_bits(bits: i32) -> Self {
        Self { bits }
    }

    /// The raw `/P` bits.
    pub fn bits(&self) -> i32 {
        self.bits
    }

    /// Printing allowed.
    pub fn can_print(&self) -> bool {
        self.bits & (1 << 2) != 0
    }

    /// Content modification allowed.
    pub fn can_modify(&self) -> bool {
        self.bits & (1 << 3) != 0
    }

    /// Text/graphics extraction allowed.
    pub fn can_copy(&self) -> bool {
        self.bits & (1 << 4) != 0
    }

    /// Annotation editing allowed.
    pub fn can_annotate(&self) -> bool {
        self.bits & (1 << 5) != 0
    }

    /// Form filling allowed (r>=3).
    pub fn can_fill_forms(&self) -> bool {
        self.bits & (1 << 8) != 0
    }

    /// Document assembly allowed (r>=3).
    pub fn can_assemble(&self) -> bool {
        self.bits & (1 << 10) != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base_dict(v: i64, r: i64, value_len: usize) -> HashMap<String, Object> {
        let mut dict = HashMap::new();
        dict.insert("Filter".to_string(), Object::Name("Standard".to_string()));
        dict.insert("V".to_string(), Object::Integer(v));
        dict.insert("R".to_string(), Object::Integer(r));
        dict.insert("O".to_string(), Object::String(vec![0; value_len]));
        dict.insert("U".to_string(), Object::String(vec![0; value_len]));
        dict.insert("P".to_string(), Object::Integer(-3904));
        dict
    }

    #[test]
    fn test_parse_v2_r3() {
        let mut dict = base_dict(2, 3, 32);
        dict.insert("Length".to_string(), Object::Integer(128));
        let parsed = EncryptDict::from_object(&Object::Dictionary(dict)).unwrap();
        assert_eq!(parsed.cipher, Cipher::Rc4);
        assert_eq!(parsed.key_length, 16);
        assert_eq!(parsed.permissions, -3904);
        assert!(parsed.encrypt_metadata);
    }

    #[test]
    fn test_parse_v1_defaults_to_40_bit() {
        let dict = base_dict(1, 2, 32);
        let parsed = EncryptDict::from_object(&Object::Dictionary(dict)).unwrap();
        assert_eq!(parsed.key_length, 5);
        assert_eq!(parsed.cipher, Cipher::Rc4);
    }

    #[test]
    fn test_parse_v4_aes_crypt_filter() {
        let mut dict = base_dict(4, 4, 32);
        let mut std_cf = HashMap::new();
        std_cf.insert("CFM".to_string(), Object::Name("AESV2".to_string()));
        std_cf.insert("Length".to_string(), Object::Integer(16));
        let mut cf = HashMap::new();
        cf.insert("StdCF".to_string(), Object::Dictionary(std_cf));
        dict.insert("CF".to_string(), Object::Dictionary(cf));
        dict.insert("StmF".to_string(), Object::Name("StdCF".to_string()));
        dict.insert("Length".to_string(), Object::Integer(128));

        let parsed = EncryptDict::from_object(&Object::Dictionary(dict)).unwrap();
        assert_eq!(parsed.cipher, Cipher::Aes128);
    }

    #[test]
    fn test_parse_v5_requires_ue_oe() {
        let dict = base_dict(5, 6, 48);
        assert!(EncryptDict::from_object(&Object::Dictionary(dict.clone())).is_err());

        let mut dict = dict;
        dict.insert("UE".to_string(), Object::String(vec![0; 32]));
        dict.insert("OE".to_string(), Object::String(vec![0; 32]));
        dict.insert("Length".to_string(), Object::Integer(256));
        let parsed = EncryptDict::from_object(&Object::Dictionary(dict)).unwrap();
        assert_eq!(parsed.cipher, Cipher::Aes256);
        assert_eq!(parsed.key_length, 32);
    }

    #[test]
    fn test_rejects_wrong_value_length() {
        let dict = base_dict(2, 3, 16);
        assert!(EncryptDict::from_object(&Object::Dictionary(dict)).is_err());
    }

    #[test]
    fn test_rejects_certificate_handler() {
        let mut dict = base_dict(2, 3, 32);
        dict.insert("Filter".to_string(), Object::Name("Adobe.PubSec".to_string()));
        match EncryptDict::from_object(&Object::Dictionary(dict)) {
            Err(Error::Unsupported(_)) => {}
            other => panic!("expected Unsupported, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_rejects_future_version() {
        let dict = base_dict(6, 6, 48);
        assert!(matches!(
            EncryptDict::from_object(&Object::Dictionary(dict)),
            Err(Error::Unsupported(_))
        ));
    }

    #[test]
    fn test_permissions_bits() {
        // -3904 = 0xFFFFF0C0: everything interesting is denied
        let perms = Permissions::from_bits(-3904);
        assert!(!perms.can_print());
        assert!(!perms.can_modify());
        assert!(!perms.can_copy());
        assert!(!perms.can_fill_forms());

        // -4 = all permissions granted
        let open = Permissions::from_bits(-4);
        assert!(open.can_print());
        assert!(open.can_annotate());
        assert!(open.can_assemble());
    }

    #[test]
    fn test_identity_stream_filter() {
        let mut dict = base_dict(4, 4, 32);
        dict.insert("StmF".to_string(), Object::Name("Identity".to_string()));
        let parsed = EncryptDict::from_object(&Object::Dictionary(dict)).unwrap();
        assert_eq!(parsed.cipher, Cipher::Identity);
    }
}

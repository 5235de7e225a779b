//! AES primitives for the standard security handler.
//!
//! CBC mode with PKCS#7 padding for object payloads (the IV rides as the
//! first 16 ciphertext bytes at the object layer, handled by the caller),
//! plus raw per-block ECB operations for the revision 5/6 password
//! verification and key unwrap.

use aes::cipher::{
    block_padding::NoPadding, BlockDecrypt, BlockDecryptMut, BlockEncrypt, BlockEncryptMut,
    KeyInit, KeyIvInit,
};
use aes::{Aes128, Aes256};
use cbc::{Decryptor, Encryptor};

use crate::error::{Error, Result};

type Aes128CbcEnc = Encryptor<Aes128>;
type Aes128CbcDec = Decryptor<Aes128>;
type Aes256CbcEnc = Encryptor<Aes256>;
type Aes256CbcDec = Decryptor<Aes256>;

/// AES-CBC decrypt with PKCS#7 padding removal. Key must be 16 or 32 bytes.
pub fn cbc_decrypt(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    if iv.len() != 16 {
        return Err(Error::Decryption("AES IV must be 16 bytes".to_string()));
    }
    if data.is_empty() {
        return Ok(Vec::new());
    }
    if !data.len().is_multiple_of(16) {
        return Err(Error::Decryption(
            "AES ciphertext length not a multiple of 16".to_string(),
        ));
    }

    let mut buffer = data.to_vec();
    match key.len() {
        16 => {
            let cipher = Aes128CbcDec::new(key.into(), iv.into());
            cipher
                .decrypt_padded_mut::<NoPadding>(&mut buffer)
                .map_err(|_| Error::Decryption("AES-128 decryption failed".to_string()))?;
        }
        32 => {
            let cipher = Aes256CbcDec::new(key.into(), iv.into());
            cipher
                .decrypt_padded_mut::<NoPadding>(&mut buffer)
                .map_err(|_| Error::Decryption("AES-256 decryption failed".to_string()))?;
        }
        other => {
            return Err(Error::Decryption(format!("AES key must be 16 or 32 bytes, got {}", other)))
        }
    }

    strip_pkcs7(&mut buffer)?;
    Ok(buffer)
}

/// AES-CBC encrypt with PKCS#7 padding. Key must be 16 or 32 bytes.
pub fn cbc_encrypt(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    if iv.len() != 16 {
        return Err(Error::Decryption("AES IV must be 16 bytes".to_string()));
    }

    let mut buffer = data.to_vec();
    let pad = 16 - (data.len() % 16);
    buffer.extend(std::iter::repeat(pad as u8).take(pad));
    let len = buffer.len();

    match key.len() {
        16 => {
            let cipher = Aes128CbcEnc::new(key.into(), iv.into());
            cipher
                .encrypt_padded_mut::<NoPadding>(&mut buffer, len)
                .map_err(|_| Error::Decryption("AES-128 encryption failed".to_string()))?;
        }
        32 => {
            let cipher = Aes256CbcEnc::new(key.into(), iv.into());
            cipher
                .encrypt_padded_mut::<NoPadding>(&mut buffer, len)
                .map_err(|_| Error::Decryption("AES-256 encryption failed".to_string()))?;
        }
        other => {
            return Err(Error::Decryption(format!("AES key must be 16 or 32 bytes, got {}", other)))
        }
    }

    Ok(buffer)
}

/// AES-128-ECB encrypt; input length must be a multiple of 16.
pub fn ecb128_encrypt(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    if key.len() != 16 {
        return Err(Error::Decryption("ECB key must be 16 bytes".to_string()));
    }
    if !data.len().is_multiple_of(16) {
        return Err(Error::Decryption("ECB input not a multiple of 16".to_string()));
    }
    let cipher = Aes128::new(key.into());
    let mut out = data.to_vec();
    for block in out.chunks_exact_mut(16) {
        cipher.encrypt_block(aes::Block::from_mut_slice(block));
    }
    Ok(out)
}

/// AES-128-ECB decrypt; input length must be a multiple of 16.
pub fn ecb128_decrypt(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    if key.len() != 16 {
        return Err(Error::Decryption("ECB key must be 16 bytes".to_string()));
    }
    if data.is_empty() || !data.len().is_multiple_of(16) {
        return Err(Error::Decryption("ECB input not a multiple of 16".to_string()));
    }
    let cipher = Aes128::new(key.into());
    let mut out = data.to_vec();
    for block in out.chunks_exact_mut(16) {
        cipher.decrypt_block(aes::Block::from_mut_slice(block));
    }
    Ok(out)
}

/// Remove PKCS#7 padding in place, validating every padding byte.
pub fn strip_pkcs7(buffer: &mut Vec<u8>) -> Result<()> {
    let pad = *buffer.last().ok_or_else(|| {
        Error::Decryption("empty buffer has no PKCS#7 padding".to_string())
    })? as usize;
    if pad == 0 || pad > 16 || pad > buffer.len() {
        return Err(Error::Decryption(format!("invalid PKCS#7 padding byte {}", pad)));
    }
    let body = buffer.len() - pad;
    if buffer[body..].iter().any(|&b| b as usize != pad) {
        return Err(Error::Decryption("inconsistent PKCS#7 padding".to_string()));
    }
    buffer.truncate(body);
    Ok(())
}

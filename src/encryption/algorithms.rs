//! Key derivation and password verification for the standard security
//! handler, revisions 2 through 6.

use md5::{Digest, Md5};
use sha2::Sha256;

use super::{aes, rc4::rc4_crypt};
use crate::error::{Error, Result};

/// The canonical 32-byte password padding string (Algorithm 2, step 1).
pub(crate) const PADDING: [u8; 32] = [
    0x28, 0xBF, 0x4E, 0x5E, 0x4E, 0x75, 0x8A, 0x41, 0x64, 0x00, 0x4E, 0x56, 0xFF, 0xFA, 0x01,
    0x08, 0x2E, 0x2E, 0x00, 0xB6, 0xD0, 0x68, 0x3E, 0x80, 0x2F, 0x0C, 0xA9, 0xFE, 0x64, 0x53,
    0x69, 0x7A,
];

/// Salt appended when deriving AES per-object keys.
const AES_OBJECT_SALT: [u8; 4] = [0x73, 0x41, 0x6C, 0x54]; // "sAlT"

/// Pad or truncate a password to 32 bytes with the canonical padding.
/// An empty password yields the padding string itself.
pub fn pad_password(password: &[u8]) -> [u8; 32] {
    let mut padded = [0u8; 32];
    let len = password.len().min(32);
    padded[..len].copy_from_slice(&password[..len]);
    padded[len..].copy_from_slice(&PADDING[..32 - len]);
    padded
}

/// Algorithm 2: derive the file encryption key for revisions 2-4.
pub fn compute_file_key_legacy(
    password: &[u8],
    owner_value: &[u8],
    permissions: i32,
    file_id: &[u8],
    revision: u32,
    key_length: usize,
    encrypt_metadata: bool,
) -> Vec<u8> {
    let mut hasher = Md5::new();
    hasher.update(pad_password(password));
    hasher.update(&owner_value[..owner_value.len().min(32)]);
    hasher.update(permissions.to_le_bytes());
    hasher.update(file_id);
    if revision >= 4 && !encrypt_metadata {
        hasher.update([0xFF, 0xFF, 0xFF, 0xFF]);
    }
    let mut digest = hasher.finalize().to_vec();

    if revision >= 3 {
        for _ in 0..50 {
            let mut hasher = Md5::new();
            hasher.update(&digest[..key_length]);
            digest = hasher.finalize().to_vec();
        }
    }

    digest.truncate(key_length);
    digest
}

/// Algorithm 4: the stored user value for revision 2.
pub fn compute_user_value_r2(file_key: &[u8]) -> Vec<u8> {
    rc4_crypt(file_key, &PADDING)
}

/// Algorithm 5: the stored user value for revisions 3-4.
///
/// MD5 of padding + file id, RC4-encrypted, then 19 further passes with
/// the key bytes XORed with the pass index. 16 hash bytes followed by 16
/// bytes of padding (zeros here; the tail is never compared).
pub fn compute_user_value_r3(file_key: &[u8], file_id: &[u8]) -> Vec<u8> {
    let mut hasher = Md5::new();
    hasher.update(PADDING);
    hasher.update(file_id);
    let mut value = hasher.finalize().to_vec();

    value = rc4_crypt(file_key, &value);
    for i in 1..=19u8 {
        let pass_key: Vec<u8> = file_key.iter().map(|&b| b ^ i).collect();
        value = rc4_crypt(&pass_key, &value);
    }

    value.extend_from_slice(&[0u8; 16]);
    value
}

/// Algorithm 4/5 check: derive the key from `password` and compare the
/// recomputed user value's 16-byte prefix against the stored one.
/// Returns the file key on success.
pub fn verify_user_password_legacy(
    password: &[u8],
    user_value: &[u8],
    owner_value: &[u8],
    permissions: i32,
    file_id: &[u8],
    revision: u32,
    key_length: usize,
    encrypt_metadata: bool,
) -> Option<Vec<u8>> {
    let key = compute_file_key_legacy(
        password,
        owner_value,
        permissions,
        file_id,
        revision,
        key_length,
        encrypt_metadata,
    );

    let expected = if revision >= 3 {
        compute_user_value_r3(&key, file_id)
    } else {
        compute_user_value_r2(&key)
    };

    if user_value.len() >= 16 && constant_time_compare(&user_value[..16], &expected[..16]) {
        Some(key)
    } else {
        None
    }
}

/// Derive the RC4 key that protects the `/O` value (Algorithm 3 steps a-d).
fn owner_rc4_key(owner_password: &[u8], revision: u32, key_length: usize) -> Vec<u8> {
    let mut hasher = Md5::new();
    hasher.update(pad_password(owner_password));
    let mut digest = hasher.finalize().to_vec();

    if revision >= 3 {
        for _ in 0..50 {
            let mut hasher = Md5::new();
            hasher.update(&digest);
            digest = hasher.finalize().to_vec();
        }
    }

    digest.truncate(key_length);
    digest
}

/// Compute the stored `/O` value from the owner and user passwords.
pub fn compute_owner_value(
    owner_password: &[u8],
    user_password: &[u8],
    revision: u32,
    key_length: usize,
) -> Vec<u8> {
    let key = owner_rc4_key(owner_password, revision, key_length);
    let mut value = pad_password(user_password).to_vec();

    if revision >= 3 {
        for i in 0..20u8 {
            let pass_key: Vec<u8> = key.iter().map(|&b| b ^ i).collect();
            value = rc4_crypt(&pass_key, &value);
        }
    } else {
        value = rc4_crypt(&key, &value);
    }

    value
}

/// Algorithm 7: decrypt `/O` with the owner password to recover the padded
/// user password, then run the user-password check with it.
/// Returns the file key on success.
pub fn verify_owner_password_legacy(
    password: &[u8],
    user_value: &[u8],
    owner_value: &[u8],
    permissions: i32,
    file_id: &[u8],
    revision: u32,
    key_length: usize,
    encrypt_metadata: bool,
) -> Option<Vec<u8>> {
    let key = owner_rc4_key(password, revision, key_length);

    let mut recovered = owner_value.to_vec();
    if revision >= 3 {
        for i in (0..20u8).rev() {
            let pass_key: Vec<u8> = key.iter().map(|&b| b ^ i).collect();
            recovered = rc4_crypt(&pass_key, &recovered);
        }
    } else {
        recovered = rc4_crypt(&key, &recovered);
    }

    verify_user_password_legacy(
        &recovered,
        user_value,
        owner_value,
        permissions,
        file_id,
        revision,
        key_length,
        encrypt_metadata,
    )
}

/// Revision 5/6 password key: SHA-256 of password and the first 8 file-id
/// bytes, then 64 further SHA-256 iterations over the running hash.
pub fn compute_password_key_r5(password: &[u8], file_id: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(password);
    hasher.update(&file_id[..file_id.len().min(8)]);
    let mut digest: [u8; 32] = hasher.finalize().into();

    for _ in 0..64 {
        let mut hasher = Sha256::new();
        hasher.update(digest);
        digest = hasher.finalize().into();
    }

    digest
}

/// Recompute bytes 8..40 of a 48-byte `/U` or `/O` value from a password.
///
/// Those bytes hold SHA-256(password ‖ validation salt) encrypted with
/// AES-128-ECB under the first 16 bytes of the password key.
pub fn compute_validation_r5(password: &[u8], stored: &[u8], file_id: &[u8]) -> Result<Vec<u8>> {
    if stored.len() != 48 {
        return Err(Error::Decryption(format!(
            "password verification value must be 48 bytes, got {}",
            stored.len()
        )));
    }
    let validation_salt = &stored[..8];

    let mut hasher = Sha256::new();
    hasher.update(password);
    hasher.update(validation_salt);
    let digest: [u8; 32] = hasher.finalize().into();

    let key = compute_password_key_r5(password, file_id);
    aes::ecb128_encrypt(&key[..16], &digest)
}

/// Verify a password against a 48-byte `/U` or `/O` value (revision 5/6).
pub fn verify_password_r5(password: &[u8], stored: &[u8], file_id: &[u8]) -> bool {
    match compute_validation_r5(password, stored, file_id) {
        Ok(recomputed) => constant_time_compare(&recomputed, &stored[8..40]),
        Err(_) => false,
    }
}

/// Unwrap the file encryption key from a `/UE` or `/OE` value.
///
/// AES-128-ECB decrypt under the first 16 bytes of the password key. A
/// 48-byte value carries PKCS#7 padding which is stripped; a bare 32-byte
/// value (common in the wild) is the key itself. Anything else, and bad
/// padding on the 48-byte form, is fatal.
pub fn unwrap_file_key_r5(password_key: &[u8; 32], wrapped: &[u8]) -> Result<Vec<u8>> {
    let mut plain = aes::ecb128_decrypt(&password_key[..16], wrapped)?;
    match plain.len() {
        32 => Ok(plain),
        48 => {
            aes::strip_pkcs7(&mut plain)?;
            if plain.len() != 32 {
                return Err(Error::Decryption(format!(
                    "unwrapped file key is {} bytes, expected 32",
                    plain.len()
                )));
            }
            Ok(plain)
        }
        other => Err(Error::Decryption(format!(
            "wrapped file key is {} bytes, expected 32 or 48",
            other
        ))),
    }
}

/// Wrap a 32-byte file key for storage as `/UE` or `/OE`.
pub fn wrap_file_key_r5(password_key: &[u8; 32], file_key: &[u8]) -> Result<Vec<u8>> {
    let mut padded = file_key.to_vec();
    padded.extend(std::iter::repeat(16u8).take(16));
    aes::ecb128_encrypt(&password_key[..16], &padded)
}

/// Build a 48-byte `/U` or `/O` value for a password with the given salts.
pub fn compute_stored_value_r5(
    password: &[u8],
    validation_salt: &[u8; 8],
    key_salt: &[u8; 8],
    file_id: &[u8],
) -> Result<Vec<u8>> {
    let mut hasher = Sha256::new();
    hasher.update(password);
    hasher.update(validation_salt);
    let digest: [u8; 32] = hasher.finalize().into();

    let key = compute_password_key_r5(password, file_id);
    let encrypted = aes::ecb128_encrypt(&key[..16], &digest)?;

    let mut stored = Vec::with_capacity(48);
    stored.extend_from_slice(validation_salt);
    stored.extend_from_slice(&encrypted);
    stored.extend_from_slice(key_salt);
    Ok(stored)
}

/// Per-object key for revisions 2-4: MD5 of the file key, the low 3 bytes
/// of the object number, the low 2 bytes of the generation, and the AES
/// salt when an AES crypt filter is active. Truncated to
/// min(key length + 5, 16).
pub fn compute_object_key(file_key: &[u8], obj_num: u32, gen_num: u16, aes: bool) -> Vec<u8> {
    let mut hasher = Md5::new();
    hasher.update(file_key);
    hasher.update(&obj_num.to_le_bytes()[..3]);
    hasher.update(gen_num.to_le_bytes());
    if aes {
        hasher.update(AES_OBJECT_SALT);
    }
    let digest = hasher.finalize();
    let len = (file_key.len() + 5).min(16);
    digest[..len].to_vec()
}

/// Constant-time slice comparison.
pub fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad_password_empty_is_padding() {
        assert_eq!(pad_password(b""), PADDING);
    }

    #[test]
    fn test_pad_password_short() {
        let padded = pad_password(b"test");
        assert_eq!(&padded[..4], b"test");
        assert_eq!(&padded[4..], &PADDING[..28]);
    }

    #[test]
    fn test_pad_password_long_truncates() {
        let long = [b'x'; 40];
        let padded = pad_password(&long);
        assert_eq!(padded, [b'x'; 32]);
    }

    #[test]
    fn test_file_key_length_by_revision() {
        let key = compute_file_key_legacy(b"pw", &[0u8; 32], -1, b"id", 2, 5, true);
        assert_eq!(key.len(), 5);
        let key = compute_file_key_legacy(b"pw", &[0u8; 32], -1, b"id", 3, 16, true);
        assert_eq!(key.len(), 16);
    }

    #[test]
    fn test_user_check_r2_round_trip() {
        let owner_value = compute_owner_value(b"owner", b"user", 2, 5);
        let key = compute_file_key_legacy(b"user", &owner_value, -1, b"fileid", 2, 5, true);
        let user_value = compute_user_value_r2(&key);

        let recovered =
            verify_user_password_legacy(b"user", &user_value, &owner_value, -1, b"fileid", 2, 5, true);
        assert_eq!(recovered, Some(key));

        assert!(verify_user_password_legacy(
            b"wrong", &user_value, &owner_value, -1, b"fileid", 2, 5, true
        )
        .is_none());
    }

    #[test]
    fn test_user_check_r3_round_trip() {
        let owner_value = compute_owner_value(b"owner", b"user", 3, 16);
        let key = compute_file_key_legacy(b"user", &owner_value, -3904, b"fileid", 3, 16, true);
        let user_value = compute_user_value_r3(&key, b"fileid");
        assert_eq!(user_value.len(), 32);

        let recovered = verify_user_password_legacy(
            b"user",
            &user_value,
            &owner_value,
            -3904,
            b"fileid",
            3,
            16,
            true,
        );
        assert_eq!(recovered, Some(key));
    }

    #[test]
    fn test_owner_check_recovers_user_password() {
        let owner_value = compute_owner_value(b"secret-owner", b"user", 3, 16);
        let key = compute_file_key_legacy(b"user", &owner_value, -1, b"id0", 3, 16, true);
        let user_value = compute_user_value_r3(&key, b"id0");

        let via_owner = verify_owner_password_legacy(
            b"secret-owner",
            &user_value,
            &owner_value,
            -1,
            b"id0",
            3,
            16,
            true,
        );
        assert_eq!(via_owner, Some(key));

        assert!(verify_owner_password_legacy(
            b"not-the-owner",
            &user_value,
            &owner_value,
            -1,
            b"id0",
            3,
            16,
            true
        )
        .is_none());
    }

    #[test]
    fn test_r5_password_key_is_32_bytes_and_stable() {
        let a = compute_password_key_r5(b"testpass", b"0123456789abcdef");
        let b = compute_password_key_r5(b"testpass", b"0123456789abcdef");
        assert_eq!(a, b);
        assert_ne!(a, compute_password_key_r5(b"other", b"0123456789abcdef"));
    }

    #[test]
    fn test_r5_stored_value_round_trip() {
        let file_id = b"someid00rest-ignored";
        let stored =
            compute_stored_value_r5(b"testpass", b"vsalt000", b"ksalt000", file_id).unwrap();
        assert_eq!(stored.len(), 48);
        assert!(verify_password_r5(b"testpass", &stored, file_id));
        assert!(!verify_password_r5(b"wrong", &stored, file_id));
    }

    #[test]
    fn test_r5_key_wrap_round_trip() {
        let password_key = compute_password_key_r5(b"testpass", b"fileid00");
        let file_key = [0xABu8; 32];
        let wrapped = wrap_file_key_r5(&password_key, &file_key).unwrap();
        assert_eq!(wrapped.len(), 48);
        assert_eq!(unwrap_file_key_r5(&password_key, &wrapped).unwrap(), file_key);
    }

    #[test]
    fn test_r5_unwrap_rejects_ragged_input() {
        let password_key = compute_password_key_r5(b"pw", b"id");
        assert!(unwrap_file_key_r5(&password_key, &[0u8; 20]).is_err());
    }

    #[test]
    fn test_object_key_lengths() {
        let key = compute_object_key(&[1, 2, 3, 4, 5], 1, 0, false);
        assert_eq!(key.len(), 10);
        let key = compute_object_key(&[0u8; 16], 1, 0, true);
        assert_eq!(key.len(), 16);
    }

    #[test]
    fn test_object_key_depends_on_object_and_salt() {
        let file_key = [9u8; 16];
        let a = compute_object_key(&file_key, 5, 0, false);
        let b = compute_object_key(&file_key, 6, 0, false);
        let c = compute_object_key(&file_key, 5, 0, true);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare(b"abc", b"abc"));
        assert!(!constant_time_compare(b"abc", b"abd"));
        assert!(!constant_time_compare(b"abc", b"abcd"));
    }
}

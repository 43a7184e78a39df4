// Copyright (c) 2026 Burrow Project
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Passphrase to symmetric key derivation.
//!
//! Every routine reads the passphrase from a [`SecureBuffer`] and returns the
//! key in a [`Zeroizing`] vector. Intermediate hash inputs are zeroized too.
//!
//! # Schemes
//!
//! ```text
//! ssh.com     K1 = MD5(pw), Ki = MD5(pw || K1 .. K(i-1))
//! OpenSSL     Di = MD5(D(i-1) || pw || salt)            (EVP_BytesToKey, 1 round)
//! PuTTY       SHA1(00000000 || pw) || SHA1(00000001 || pw)
//! PuTTY MAC   SHA1("putty-private-key-file-mac-key" || pw)
//! ```

use crate::ssh::secure::SecureBuffer;
use burrow_platform::BurrowResult;
use sha1::{Digest, Sha1};
use zeroize::{Zeroize, Zeroizing};

const MD5_LEN: usize = 16;

/// PuTTY key-file MAC key prefix
pub const PUTTY_MAC_KEY_PREFIX: &[u8] = b"putty-private-key-file-mac-key";

/// Derives `length` key bytes from a passphrase (ssh.com scheme).
///
/// # Example
///
/// ```rust
/// use burrow_proto::ssh::privatekey::kdf::passphrase_to_key;
/// use burrow_proto::ssh::secure::SecureBuffer;
///
/// let pw = SecureBuffer::from_bytes(b"abc");
/// let key = passphrase_to_key(&pw, 24).unwrap();
/// assert_eq!(key.len(), 24);
/// ```
pub fn passphrase_to_key(
    passphrase: &SecureBuffer,
    length: usize,
) -> BurrowResult<Zeroizing<Vec<u8>>> {
    passphrase.with_bytes(|pw| {
        let rounds = length.div_ceil(MD5_LEN);
        let mut key = Zeroizing::new(Vec::with_capacity(rounds * MD5_LEN));
        let mut input = Zeroizing::new(Vec::with_capacity(pw.len() + rounds * MD5_LEN));

        while key.len() < length {
            input.clear();
            input.extend_from_slice(pw);
            input.extend_from_slice(&key[..]);
            let mut digest = md5::compute(&input[..]);
            key.extend_from_slice(&digest.0);
            digest.0.zeroize();
        }

        key.truncate(length);
        key
    })
}

/// OpenSSL `EVP_BytesToKey` with MD5 and a single iteration.
///
/// Legacy PEM files use the first eight bytes of the IV as `salt`.
pub fn openssl_bytes_to_key(
    passphrase: &SecureBuffer,
    salt: &[u8],
    length: usize,
) -> BurrowResult<Zeroizing<Vec<u8>>> {
    passphrase.with_bytes(|pw| {
        let rounds = length.div_ceil(MD5_LEN);
        let mut key = Zeroizing::new(Vec::with_capacity(rounds * MD5_LEN));
        let mut input = Zeroizing::new(Vec::with_capacity(MD5_LEN + pw.len() + salt.len()));
        let mut previous = [0u8; MD5_LEN];
        let mut first = true;

        while key.len() < length {
            input.clear();
            if !first {
                input.extend_from_slice(&previous);
            }
            input.extend_from_slice(pw);
            input.extend_from_slice(salt);
            let mut digest = md5::compute(&input[..]);
            previous.copy_from_slice(&digest.0);
            key.extend_from_slice(&digest.0);
            digest.0.zeroize();
            first = false;
        }

        previous.zeroize();
        key.truncate(length);
        key
    })
}

/// AES-256 key for PuTTY private key blobs.
pub fn putty_cipher_key(passphrase: &SecureBuffer) -> BurrowResult<Zeroizing<Vec<u8>>> {
    passphrase.with_bytes(|pw| {
        let mut key = Zeroizing::new(Vec::with_capacity(40));
        for counter in 0u32..2 {
            let mut hasher = Sha1::new();
            hasher.update(counter.to_be_bytes());
            hasher.update(pw);
            let mut digest = hasher.finalize();
            key.extend_from_slice(&digest);
            digest.as_mut_slice().zeroize();
        }
        key.truncate(32);
        key
    })
}

/// HMAC key used for the `Private-MAC` / `Private-Hash` check.
///
/// Unencrypted files use an empty passphrase.
pub fn putty_mac_key(passphrase: Option<&SecureBuffer>) -> BurrowResult<Zeroizing<Vec<u8>>> {
    let derive = |pw: &[u8]| {
        let mut hasher = Sha1::new();
        hasher.update(PUTTY_MAC_KEY_PREFIX);
        hasher.update(pw);
        let mut digest = hasher.finalize();
        let key = Zeroizing::new(digest.to_vec());
        digest.as_mut_slice().zeroize();
        key
    };
    match passphrase {
        Some(pw) => pw.with_bytes(derive),
        None => {
            let empty: &[u8] = &[];
            Ok(derive(empty))
        }
    }
}

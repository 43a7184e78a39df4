// Copyright (c) 2026 Burrow Project
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Block ciphers named by private key files.
//!
//! All of them run in CBC mode without padding; each file format handles its
//! own padding rules.

use burrow_platform::{BurrowError, BurrowResult};
use cipher::block_padding::NoPadding;
use cipher::{BlockCipher, BlockDecryptMut, BlockEncryptMut, KeyInit, KeyIvInit};

/// Cipher used to protect a private key blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFileCipher {
    /// Triple DES (EDE, three keys), CBC
    TripleDesCbc,
    /// AES-128, CBC
    Aes128Cbc,
    /// AES-192, CBC
    Aes192Cbc,
    /// AES-256, CBC
    Aes256Cbc,
}

impl KeyFileCipher {
    /// Parses an SSH cipher name (`3des-cbc`, `aes256-cbc`, ...).
    pub fn from_ssh_name(name: &str) -> Option<Self> {
        match name {
            "3des-cbc" => Some(Self::TripleDesCbc),
            "aes128-cbc" => Some(Self::Aes128Cbc),
            "aes192-cbc" => Some(Self::Aes192Cbc),
            "aes256-cbc" => Some(Self::Aes256Cbc),
            _ => None,
        }
    }

    /// Parses an OpenSSL `DEK-Info` cipher name.
    pub fn from_pem_name(name: &str) -> Option<Self> {
        match name {
            "DES-EDE3-CBC" => Some(Self::TripleDesCbc),
            "AES-128-CBC" => Some(Self::Aes128Cbc),
            "AES-192-CBC" => Some(Self::Aes192Cbc),
            "AES-256-CBC" => Some(Self::Aes256Cbc),
            _ => None,
        }
    }

    /// SSH name of the cipher.
    pub fn ssh_name(&self) -> &'static str {
        match self {
            Self::TripleDesCbc => "3des-cbc",
            Self::Aes128Cbc => "aes128-cbc",
            Self::Aes192Cbc => "aes192-cbc",
            Self::Aes256Cbc => "aes256-cbc",
        }
    }

    /// Key length in bytes.
    pub fn key_size(&self) -> usize {
        match self {
            Self::TripleDesCbc => 24,
            Self::Aes128Cbc => 16,
            Self::Aes192Cbc => 24,
            Self::Aes256Cbc => 32,
        }
    }

    /// Block (and IV) length in bytes.
    pub fn block_size(&self) -> usize {
        match self {
            Self::TripleDesCbc => 8,
            _ => 16,
        }
    }

    /// Decrypts `data` in place.
    ///
    /// # Errors
    ///
    /// Fails with [`BurrowError::Security`] on a bad key or IV length and
    /// [`BurrowError::Format`] when `data` is not a whole number of blocks.
    pub fn decrypt(&self, key: &[u8], iv: &[u8], data: &mut [u8]) -> BurrowResult<()> {
        match self {
            Self::TripleDesCbc => decrypt_cbc::<des::TdesEde3>(key, iv, data),
            Self::Aes128Cbc => decrypt_cbc::<aes::Aes128>(key, iv, data),
            Self::Aes192Cbc => decrypt_cbc::<aes::Aes192>(key, iv, data),
            Self::Aes256Cbc => decrypt_cbc::<aes::Aes256>(key, iv, data),
        }
    }

    /// Encrypts `data` in place. `data` must already be block aligned.
    pub fn encrypt(&self, key: &[u8], iv: &[u8], data: &mut [u8]) -> BurrowResult<()> {
        match self {
            Self::TripleDesCbc => encrypt_cbc::<des::TdesEde3>(key, iv, data),
            Self::Aes128Cbc => encrypt_cbc::<aes::Aes128>(key, iv, data),
            Self::Aes192Cbc => encrypt_cbc::<aes::Aes192>(key, iv, data),
            Self::Aes256Cbc => encrypt_cbc::<aes::Aes256>(key, iv, data),
        }
    }
}

fn decrypt_cbc<C>(key: &[u8], iv: &[u8], data: &mut [u8]) -> BurrowResult<()>
where
    C: BlockCipher + BlockDecryptMut + KeyInit,
{
    let decryptor = cbc::Decryptor::<C>::new_from_slices(key, iv)
        .map_err(|_| BurrowError::Security("Invalid cipher key or IV length".to_string()))?;
    decryptor
        .decrypt_padded_mut::<NoPadding>(data)
        .map_err(|_| BurrowError::Format("Encrypted data is not block aligned".to_string()))?;
    Ok(())
}

fn encrypt_cbc<C>(key: &[u8], iv: &[u8], data: &mut [u8]) -> BurrowResult<()>
where
    C: BlockCipher + BlockEncryptMut + KeyInit,
{
    let encryptor = cbc::Encryptor::<C>::new_from_slices(key, iv)
        .map_err(|_| BurrowError::Security("Invalid cipher key or IV length".to_string()))?;
    let len = data.len();
    encryptor
        .encrypt_padded_mut::<NoPadding>(data, len)
        .map_err(|_| BurrowError::Format("Plaintext is not block aligned".to_string()))?;
    Ok(())
}

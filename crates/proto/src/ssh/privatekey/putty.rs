// Copyright (c) 2026 Burrow Project
// SPDX-License-Identifier: MIT OR Apache-2.0

//! PuTTY `.ppk` private key files, versions 1 and 2.
//!
//! ```text
//! PuTTY-User-Key-File-2: ssh-rsa
//! Encryption: aes256-cbc
//! Comment: rsa-key-20261019
//! Public-Lines: 4
//! ...
//! Private-Lines: 8
//! ...
//! Private-MAC: <hex>
//! ```

use super::cipher::KeyFileCipher;
use super::kdf::{putty_cipher_key, putty_mac_key};
use super::Ssh2PrivateKeyLoader;
use crate::ssh::codec::{DataReader, DataWriter};
use crate::ssh::keypair::{mod_inverse, DsaKeyPair, KeyPair, PublicKeyAlgorithm, RsaKeyPair};
use crate::ssh::messages::{MessageCatalog, MessageKey};
use crate::ssh::secure::SecureBuffer;
use base64::Engine;
use burrow_platform::{BurrowError, BurrowResult};
use hmac::{Hmac, Mac};
use secrecy::SecretString;
use sha1::{Digest, Sha1};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

/// Header prefix of version 1 files
pub const PUTTY_V1_HEADER: &str = "PuTTY-User-Key-File-1: ";
/// Header prefix of version 2 files
pub const PUTTY_V2_HEADER: &str = "PuTTY-User-Key-File-2: ";

const PUTTY_CIPHER: KeyFileCipher = KeyFileCipher::Aes256Cbc;

type HmacSha1 = Hmac<Sha1>;

/// Decoder for PuTTY private key files.
pub struct PuttyPrivateKeyLoader<'a> {
    data: &'a [u8],
    messages: &'a MessageCatalog,
}

struct PuttyFile<'t> {
    version: u8,
    algorithm: &'t str,
    encryption: &'t str,
    comment: &'t str,
    public: Vec<u8>,
    private: Zeroizing<Vec<u8>>,
    mac: MacLine<'t>,
}

#[derive(Clone, Copy)]
enum MacLine<'t> {
    Hmac(&'t str),
    Hash(&'t str),
}

impl<'a> PuttyPrivateKeyLoader<'a> {
    /// Creates a loader over the raw file contents.
    pub fn new(data: &'a [u8], messages: &'a MessageCatalog) -> Self {
        Self { data, messages }
    }

    fn not_valid(&self, detail: &str) -> BurrowError {
        BurrowError::Format(self.messages.detail(MessageKey::NotValidPrivateKeyFile, detail))
    }

    fn wrong_passphrase(&self) -> BurrowError {
        BurrowError::WrongPassphrase(self.messages.get(MessageKey::WrongPassphrase).to_string())
    }

    fn header<'t>(
        &self,
        lines: &mut impl Iterator<Item = &'t str>,
        name: &str,
    ) -> BurrowResult<&'t str> {
        let line = lines.next().ok_or_else(|| self.not_valid("unexpected eof"))?;
        line.strip_prefix(name)
            .and_then(|rest| rest.strip_prefix(": "))
            .ok_or_else(|| self.not_valid(&format!("missing {}", name)))
    }

    fn base64_block<'t>(
        &self,
        lines: &mut impl Iterator<Item = &'t str>,
        name: &str,
    ) -> BurrowResult<Vec<u8>> {
        let count: usize = self
            .header(lines, name)?
            .trim()
            .parse()
            .map_err(|_| self.not_valid(&format!("bad {}", name)))?;
        let mut encoded = String::new();
        for _ in 0..count {
            let line = lines.next().ok_or_else(|| self.not_valid("unexpected eof"))?;
            encoded.push_str(line.trim());
        }
        base64::engine::general_purpose::STANDARD
            .decode(encoded.as_bytes())
            .map_err(|_| self.not_valid("bad base64 body"))
    }

    fn parse_file<'t>(&self, text: &'t str) -> BurrowResult<PuttyFile<'t>> {
        let mut lines = text.lines().map(|l| l.trim_end_matches('\r'));

        let first = lines.next().unwrap_or_default();
        let (version, algorithm) = if let Some(alg) = first.strip_prefix(PUTTY_V2_HEADER) {
            (2, alg.trim())
        } else if let Some(alg) = first.strip_prefix(PUTTY_V1_HEADER) {
            (1, alg.trim())
        } else {
            return Err(self.not_valid("missing header"));
        };

        let encryption = self.header(&mut lines, "Encryption")?.trim();
        let comment = self.header(&mut lines, "Comment")?;
        let public = self.base64_block(&mut lines, "Public-Lines")?;
        let private = Zeroizing::new(self.base64_block(&mut lines, "Private-Lines")?);

        let last = lines.next().ok_or_else(|| self.not_valid("unexpected eof"))?;
        let mac = if let Some(hex) = last.strip_prefix("Private-MAC: ") {
            MacLine::Hmac(hex.trim())
        } else if let Some(hex) = last.strip_prefix("Private-Hash: ") {
            MacLine::Hash(hex.trim())
        } else {
            return Err(self.not_valid("missing Private-MAC"));
        };

        Ok(PuttyFile {
            version,
            algorithm,
            encryption,
            comment,
            public,
            private,
            mac,
        })
    }

    fn verify_mac(
        &self,
        file: &PuttyFile<'_>,
        secure: Option<&SecureBuffer>,
    ) -> BurrowResult<bool> {
        let mut data = DataWriter::with_capacity(file.public.len() + file.private.len() + 256);
        if file.version == 2 {
            data.write_string(file.algorithm);
            data.write_string(file.encryption);
            data.write_string(file.comment);
            data.write_as_string(&file.public);
            data.write_as_string(&file.private);
        } else {
            data.write(&file.private);
        }

        let (expected_hex, computed) = match file.mac {
            MacLine::Hmac(hex) => {
                let key = putty_mac_key(secure)?;
                let mut mac = <HmacSha1 as Mac>::new_from_slice(&key)
                    .map_err(|_| BurrowError::Security("Invalid MAC key length".to_string()))?;
                mac.update(data.as_slice());
                (hex, mac.finalize().into_bytes().to_vec())
            }
            MacLine::Hash(hex) => (hex, Sha1::digest(data.as_slice()).to_vec()),
        };
        let expected = hex::decode(expected_hex).map_err(|_| self.not_valid("bad MAC"))?;
        Ok(bool::from(expected.ct_eq(&computed)))
    }

    fn decode_keys(
        &self,
        kind: PublicKeyAlgorithm,
        file: &PuttyFile<'_>,
    ) -> BurrowResult<KeyPair> {
        let mut public = DataReader::new(&file.public);
        let truncated = |_| self.not_valid("truncated public blob");
        if public.read_string().map_err(truncated)? != file.algorithm.as_bytes() {
            return Err(self.not_valid("public key algorithm mismatch"));
        }
        let mut next_public = || public.read_mpint().map_err(truncated);
        let mut private = DataReader::new(&file.private);
        let mut next_private = || private.read_mpint().map_err(|_| self.wrong_passphrase());

        match kind {
            PublicKeyAlgorithm::Rsa => {
                let e = next_public()?;
                let n = next_public()?;
                let d = next_private()?;
                let p = next_private()?;
                let q = next_private()?;
                next_private()?; // iqmp, recomputed below
                let u = mod_inverse(&p, &q).ok_or_else(|| self.wrong_passphrase())?;
                Ok(RsaKeyPair::new(&e, &d, &n, &u, &p, &q)?.into())
            }
            PublicKeyAlgorithm::Dsa => {
                let p = next_public()?;
                let q = next_public()?;
                let g = next_public()?;
                let y = next_public()?;
                let x = next_private()?;
                Ok(DsaKeyPair::new(&p, &q, &g, &y, &x)?.into())
            }
        }
    }
}

impl Ssh2PrivateKeyLoader for PuttyPrivateKeyLoader<'_> {
    fn load(&self, passphrase: Option<&SecretString>) -> BurrowResult<(KeyPair, String)> {
        let text = std::str::from_utf8(self.data).map_err(|_| self.not_valid("not text"))?;
        let mut file = self.parse_file(text)?;

        let kind = PublicKeyAlgorithm::from_ssh_name(file.algorithm).ok_or_else(|| {
            BurrowError::UnsupportedMethod(
                self.messages.get(MessageKey::UnsupportedAuthenticationMethod).to_string(),
            )
        })?;

        let encrypted = match file.encryption {
            "none" => false,
            name if KeyFileCipher::from_ssh_name(name) == Some(PUTTY_CIPHER) => true,
            name => {
                return Err(BurrowError::UnsupportedMethod(
                    self.messages.detail(MessageKey::UnsupportedCipher, name),
                ))
            }
        };

        let secure = match (encrypted, passphrase) {
            (false, _) => None,
            (true, Some(passphrase)) => Some(SecureBuffer::from_secret(passphrase)),
            (true, None) => {
                return Err(BurrowError::WrongPassphrase(
                    self.messages.get(MessageKey::PassphraseRequired).to_string(),
                ))
            }
        };

        if let Some(secure) = secure.as_ref() {
            if file.private.len() % PUTTY_CIPHER.block_size() != 0 {
                return Err(self.not_valid("private blob is not block aligned"));
            }
            let key = putty_cipher_key(secure)?;
            let iv = [0u8; 16];
            PUTTY_CIPHER.decrypt(&key, &iv, &mut file.private)?;
        }

        if !self.verify_mac(&file, secure.as_ref())? {
            return Err(if encrypted {
                self.wrong_passphrase()
            } else {
                BurrowError::Format(self.messages.get(MessageKey::MacMismatch).to_string())
            });
        }

        let key_pair = self.decode_keys(kind, &file)?;
        if !key_pair.is_consistent() {
            return Err(self.not_valid("inconsistent key parameters"));
        }

        Ok((key_pair, file.comment.to_string()))
    }
}

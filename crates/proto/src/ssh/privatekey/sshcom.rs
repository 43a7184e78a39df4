// Copyright (c) 2026 Burrow Project
// SPDX-License-Identifier: MIT OR Apache-2.0

//! ssh.com (SECSH) private key files.
//!
//! # Layout
//!
//! ```text
//! ---- BEGIN SSH2 ENCRYPTED PRIVATE KEY ----
//! Comment: "1024-bit rsa"
//! <base64, wrapped>
//! ---- END SSH2 ENCRYPTED PRIVATE KEY ----
//! ```
//!
//! The decoded blob is:
//!
//! ```text
//! uint32  magic (0x3f6ff9eb)
//! uint32  total length
//! string  key type
//! string  cipher ("none" or "3des-cbc")
//! string  body, encrypted with a zero IV when the cipher is not "none"
//! ```
//!
//! The body starts with a `uint32` parameter length followed by bit-count
//! prefixed integers: `e d n u p q` for RSA, or a zero word then
//! `p g q y x` for DSA.

use super::cipher::KeyFileCipher;
use super::kdf::passphrase_to_key;
use super::Ssh2PrivateKeyLoader;
use crate::ssh::codec::{DataReader, DataWriter};
use crate::ssh::keypair::{DsaKeyPair, KeyPair, PublicKeyAlgorithm, RsaKeyPair};
use crate::ssh::messages::{MessageCatalog, MessageKey};
use crate::ssh::secure::SecureBuffer;
use base64::Engine;
use burrow_platform::{BurrowError, BurrowResult};
use secrecy::SecretString;
use zeroize::Zeroizing;

/// Magic number at the start of every ssh.com key blob
pub const SSHCOM_MAGIC: u32 = 0x3f6f_f9eb;

/// First line of a private key file
pub const PRIVATE_KEY_HEADER: &str = "---- BEGIN SSH2 ENCRYPTED PRIVATE KEY ----";

/// Last line of a private key file
pub const PRIVATE_KEY_FOOTER: &str = "---- END SSH2 ENCRYPTED PRIVATE KEY ----";

/// Key type string for RSA keys
pub const RSA_KEY_TYPE: &str = "if-modn{sign{rsa-pkcs1-sha1},encrypt{rsa-pkcs1v2-oaep}}";

/// Key type string for DSA keys
pub const DSA_KEY_TYPE: &str = "dl-modp{sign{dsa-nist-sha1},dh{plain}}";

const COMMENT_PREFIX: &str = "Comment: ";
const EXPORT_CIPHER: KeyFileCipher = KeyFileCipher::TripleDesCbc;

/// Decoder for ssh.com private key files.
pub struct SshComPrivateKeyLoader<'a> {
    data: &'a [u8],
    messages: &'a MessageCatalog,
}

impl<'a> SshComPrivateKeyLoader<'a> {
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

    /// Splits the armor into the comment and the base64 body.
    fn read_armor(&self, text: &str) -> BurrowResult<(String, String)> {
        let mut lines = text.lines();
        match lines.next() {
            Some(line) if line.trim_end() == PRIVATE_KEY_HEADER => {}
            _ => return Err(self.not_valid("missing header")),
        }

        let mut comment = String::new();
        let mut body = String::new();
        let mut pending_header: Option<String> = None;

        loop {
            let line = lines
                .next()
                .ok_or_else(|| self.not_valid("unexpected eof"))?
                .trim_end_matches('\r');

            if let Some(mut header) = pending_header.take() {
                match line.strip_suffix('\\') {
                    Some(part) => {
                        header.push_str(part);
                        pending_header = Some(header);
                    }
                    None => {
                        header.push_str(line);
                        take_comment(&header, &mut comment);
                    }
                }
                continue;
            }

            if line == PRIVATE_KEY_FOOTER {
                break;
            }

            if line.contains(':') {
                match line.strip_suffix('\\') {
                    Some(part) => pending_header = Some(part.to_string()),
                    None => take_comment(line, &mut comment),
                }
            } else {
                body.push_str(line.strip_suffix('\\').unwrap_or(line).trim());
            }
        }

        Ok((comment, body))
    }

    fn decode_body(&self, body: &[u8], kind: PublicKeyAlgorithm) -> BurrowResult<KeyPair> {
        let mut reader = DataReader::new(body);
        let param_len = reader.read_u32()? as usize;
        if param_len > reader.rest() {
            return Err(self.wrong_passphrase());
        }
        let mut reader = DataReader::with_range(body, reader.offset(), param_len)?;

        match kind {
            PublicKeyAlgorithm::Rsa => {
                let e = reader.read_bigint_with_bits()?;
                let d = reader.read_bigint_with_bits()?;
                let n = reader.read_bigint_with_bits()?;
                let u = reader.read_bigint_with_bits()?;
                let p = reader.read_bigint_with_bits()?;
                let q = reader.read_bigint_with_bits()?;
                Ok(RsaKeyPair::new(&e, &d, &n, &u, &p, &q)?.into())
            }
            PublicKeyAlgorithm::Dsa => {
                if reader.read_u32()? != 0 {
                    return Err(BurrowError::UnsupportedMethod(
                        self.messages.get(MessageKey::UnsupportedDsaKeyFormat).to_string(),
                    ));
                }
                let p = reader.read_bigint_with_bits()?;
                let g = reader.read_bigint_with_bits()?;
                let q = reader.read_bigint_with_bits()?;
                let y = reader.read_bigint_with_bits()?;
                let x = reader.read_bigint_with_bits()?;
                Ok(DsaKeyPair::new(&p, &q, &g, &y, &x)?.into())
            }
        }
    }
}

fn take_comment(header: &str, comment: &mut String) {
    if let Some(value) = header.strip_prefix(COMMENT_PREFIX) {
        *comment = value.to_string();
    }
}

fn key_kind(key_type: &str) -> Option<PublicKeyAlgorithm> {
    if key_type.contains("if-modn") {
        Some(PublicKeyAlgorithm::Rsa)
    } else if key_type.contains("dl-modp") {
        Some(PublicKeyAlgorithm::Dsa)
    } else {
        None
    }
}

impl Ssh2PrivateKeyLoader for SshComPrivateKeyLoader<'_> {
    fn load(&self, passphrase: Option<&SecretString>) -> BurrowResult<(KeyPair, String)> {
        let text = std::str::from_utf8(self.data).map_err(|_| self.not_valid("not text"))?;
        let (comment, encoded) = self.read_armor(text)?;

        let blob = Zeroizing::new(
            base64::engine::general_purpose::STANDARD
                .decode(encoded.as_bytes())
                .map_err(|_| self.not_valid("bad base64 body"))?,
        );

        let mut reader = DataReader::new(&blob);
        let truncated = |_| self.not_valid("truncated body");
        if reader.read_u32().map_err(truncated)? != SSHCOM_MAGIC {
            return Err(BurrowError::Format(
                self.messages.get(MessageKey::MagicCodeUnmatched).to_string(),
            ));
        }
        reader.read_u32().map_err(truncated)?; // total length
        let key_type = reader.read_utf8().map_err(truncated)?;
        let cipher_name = reader.read_utf8().map_err(truncated)?;
        let mut body = Zeroizing::new(reader.read_string().map_err(truncated)?.to_vec());

        let kind = key_kind(&key_type).ok_or_else(|| {
            BurrowError::UnsupportedMethod(
                self.messages.get(MessageKey::UnsupportedAuthenticationMethod).to_string(),
            )
        })?;

        let encrypted = cipher_name != "none";
        if encrypted {
            let cipher = KeyFileCipher::from_ssh_name(&cipher_name).ok_or_else(|| {
                BurrowError::UnsupportedMethod(
                    self.messages.detail(MessageKey::UnsupportedCipher, &cipher_name),
                )
            })?;
            let passphrase = passphrase.ok_or_else(|| {
                BurrowError::WrongPassphrase(
                    self.messages.get(MessageKey::PassphraseRequired).to_string(),
                )
            })?;
            if body.len() % cipher.block_size() != 0 {
                return Err(self.not_valid("body is not block aligned"));
            }

            let secure = SecureBuffer::from_secret(passphrase);
            let key = passphrase_to_key(&secure, cipher.key_size())?;
            let iv = vec![0u8; cipher.block_size()];
            cipher.decrypt(&key, &iv, &mut body)?;
        }

        let key_pair = self.decode_body(&body, kind).map_err(|e| {
            if encrypted {
                self.wrong_passphrase()
            } else {
                e
            }
        })?;

        if !key_pair.is_consistent() {
            return Err(if encrypted {
                self.wrong_passphrase()
            } else {
                self.not_valid("inconsistent key parameters")
            });
        }

        Ok((key_pair, comment))
    }
}

/// Builds the binary ssh.com blob for `key`.
///
/// With a passphrase the body is zero padded to the 3DES block size and
/// encrypted with a key from [`passphrase_to_key`].
pub fn encode_private_blob(
    key: &KeyPair,
    passphrase: Option<&SecretString>,
) -> BurrowResult<Zeroizing<Vec<u8>>> {
    let mut body = DataWriter::with_capacity(2048);
    body.write_u32(0);
    match key {
        KeyPair::Rsa(k) => {
            body.write_bigint_with_bits(&k.e());
            body.write_bigint_with_bits(&k.d());
            body.write_bigint_with_bits(&k.n());
            body.write_bigint_with_bits(&k.u());
            body.write_bigint_with_bits(&k.p());
            body.write_bigint_with_bits(&k.q());
        }
        KeyPair::Dsa(k) => {
            body.write_u32(0);
            body.write_bigint_with_bits(&k.p());
            body.write_bigint_with_bits(&k.g());
            body.write_bigint_with_bits(&k.q());
            body.write_bigint_with_bits(&k.y());
            body.write_bigint_with_bits(&k.x());
        }
    }
    let param_len = body.len() - 4;
    body.set_u32_at(0, param_len as u32);

    if passphrase.is_some() {
        let block = EXPORT_CIPHER.block_size();
        let padding = block - body.len() % block;
        body.write(&vec![0u8; padding]);
    }
    let mut body = Zeroizing::new(body.into_bytes());

    let cipher_name = match passphrase {
        Some(passphrase) => {
            let secure = SecureBuffer::from_secret(passphrase);
            let cipher_key = passphrase_to_key(&secure, EXPORT_CIPHER.key_size())?;
            let iv = vec![0u8; EXPORT_CIPHER.block_size()];
            EXPORT_CIPHER.encrypt(&cipher_key, &iv, &mut body)?;
            EXPORT_CIPHER.ssh_name()
        }
        None => "none",
    };

    let mut blob = DataWriter::with_capacity(body.len() + 128);
    blob.write_u32(SSHCOM_MAGIC);
    blob.write_u32(0);
    blob.write_string(match key {
        KeyPair::Rsa(_) => RSA_KEY_TYPE,
        KeyPair::Dsa(_) => DSA_KEY_TYPE,
    });
    blob.write_string(cipher_name);
    blob.write_as_string(&body);
    let total = blob.len();
    blob.set_u32_at(4, total as u32);

    Ok(Zeroizing::new(blob.into_bytes()))
}

//! User authentication keys.
//!
//! A [`UserAuthKey`] pairs a decoded [`KeyPair`] with the comment stored in
//! its key file, and knows how to write the key back out:
//!
//! - ssh.com private key (`---- BEGIN SSH2 ENCRYPTED PRIVATE KEY ----`)
//! - SECSH public key (`---- BEGIN SSH2 PUBLIC KEY ----`)
//! - OpenSSH public key line (`ssh-rsa AAAA...`)

use crate::ssh::codec::DataWriter;
use crate::ssh::keypair::{KeyPair, PublicKeyAlgorithm};
use crate::ssh::privatekey::{sshcom, PrivateKeyLoader};
use base64::Engine;
use burrow_platform::BurrowResult;
use secrecy::SecretString;
use std::io::Write;
use std::path::Path;
use tracing::debug;

/// Column limit of SECSH key file blocks
const MAX_LINE_LEN: usize = 70;

const PUBLIC_KEY_HEADER: &str = "---- BEGIN SSH2 PUBLIC KEY ----";
const PUBLIC_KEY_FOOTER: &str = "---- END SSH2 PUBLIC KEY ----";

/// A key pair used for SSH2 public key authentication.
#[derive(Debug, Clone)]
pub struct UserAuthKey {
    key_pair: KeyPair,
    comment: String,
}

impl UserAuthKey {
    /// Wraps a key pair with an empty comment.
    pub fn new(key_pair: impl Into<KeyPair>) -> Self {
        Self {
            key_pair: key_pair.into(),
            comment: String::new(),
        }
    }

    /// Sets the comment.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    /// Loads a private key file in any supported SSH2 format.
    ///
    /// # Errors
    ///
    /// See [`PrivateKeyLoader::load_ssh2_private_key`].
    pub fn from_file<P: AsRef<Path>>(
        path: P,
        passphrase: Option<&SecretString>,
    ) -> BurrowResult<Self> {
        let loader = PrivateKeyLoader::from_file(path)?;
        let (key_pair, comment) = loader.load_ssh2_private_key(passphrase)?;
        Ok(Self { key_pair, comment })
    }

    /// Public key algorithm of the pair.
    pub fn algorithm(&self) -> PublicKeyAlgorithm {
        self.key_pair.algorithm()
    }

    /// Decoded key pair.
    pub fn key_pair(&self) -> &KeyPair {
        &self.key_pair
    }

    /// Comment read from the key file, empty if none.
    pub fn comment(&self) -> &str {
        &self.comment
    }

    /// Signs `data` and returns the raw signature.
    pub fn sign(&self, data: &[u8]) -> BurrowResult<Vec<u8>> {
        self.key_pair.sign(data)
    }

    /// Signs `data` and wraps the result as an SSH signature blob:
    /// `string(algorithm) || string(signature)`.
    pub fn sign_blob(&self, data: &[u8]) -> BurrowResult<Vec<u8>> {
        let signature = self.key_pair.sign(data)?;
        let mut writer = DataWriter::with_capacity(signature.len() + 32);
        writer.write_string(self.key_pair.algorithm_name());
        writer.write_as_string(&signature);
        Ok(writer.into_bytes())
    }

    /// SSH wire encoding of the public key.
    pub fn public_key_blob(&self) -> Vec<u8> {
        self.key_pair.public_key_blob()
    }

    /// MD5 fingerprint as colon separated hex.
    pub fn fingerprint_md5(&self) -> String {
        self.key_pair.fingerprint_md5()
    }

    /// `SHA256:<base64>` fingerprint of the public key blob.
    pub fn fingerprint_sha256(&self) -> String {
        self.key_pair.fingerprint_sha256()
    }

    /// Writes the private key in ssh.com format.
    ///
    /// An empty `comment` omits the `Comment:` header. With a passphrase the
    /// body is encrypted with `3des-cbc`.
    pub fn write_private_secsh<W: Write>(
        &self,
        out: &mut W,
        comment: &str,
        passphrase: Option<&SecretString>,
    ) -> BurrowResult<()> {
        let blob = sshcom::encode_private_blob(&self.key_pair, passphrase)?;
        let body = zeroize::Zeroizing::new(
            base64::engine::general_purpose::STANDARD.encode(blob.as_slice()),
        );

        writeln!(out, "{}", sshcom::PRIVATE_KEY_HEADER)?;
        write_comment(out, comment)?;
        write_key_file_block(out, &body, false)?;
        writeln!(out, "{}", sshcom::PRIVATE_KEY_FOOTER)?;

        debug!(
            algorithm = self.key_pair.algorithm_name(),
            encrypted = passphrase.is_some(),
            "Wrote ssh.com private key"
        );
        Ok(())
    }

    /// Writes the public key in SECSH format.
    pub fn write_public_secsh<W: Write>(&self, out: &mut W, comment: &str) -> BurrowResult<()> {
        let body = base64::engine::general_purpose::STANDARD.encode(self.public_key_blob());

        writeln!(out, "{}", PUBLIC_KEY_HEADER)?;
        write_comment(out, comment)?;
        write_key_file_block(out, &body, false)?;
        writeln!(out, "{}", PUBLIC_KEY_FOOTER)?;
        Ok(())
    }

    /// Writes the public key as a single OpenSSH `authorized_keys` line.
    pub fn write_public_openssh<W: Write>(&self, out: &mut W) -> BurrowResult<()> {
        writeln!(out, "{}", self.public_openssh_line())?;
        Ok(())
    }

    /// `<algorithm> <base64 blob>` without a trailing newline.
    pub fn public_openssh_line(&self) -> String {
        format!(
            "{} {}",
            self.key_pair.algorithm_name(),
            base64::engine::general_purpose::STANDARD.encode(self.public_key_blob())
        )
    }
}

fn write_comment<W: Write>(out: &mut W, comment: &str) -> BurrowResult<()> {
    if !comment.is_empty() {
        write_key_file_block(out, &format!("Comment: {}", comment), true)?;
    }
    Ok(())
}

/// Writes `data` wrapped at [`MAX_LINE_LEN`] columns.
///
/// Escaped blocks end every continued line with `\`, so those lines carry
/// one character less of payload. A block whose last character is itself a
/// `\` gets a marker and an empty final line, so readers keep the literal.
fn write_key_file_block<W: Write>(out: &mut W, data: &str, escape: bool) -> BurrowResult<()> {
    let step = if escape {
        MAX_LINE_LEN - 1
    } else {
        MAX_LINE_LEN
    };

    let mut rest = data;
    while rest.chars().count() > MAX_LINE_LEN {
        let split = rest
            .char_indices()
            .nth(step)
            .map_or(rest.len(), |(index, _)| index);
        out.write_all(rest[..split].as_bytes())?;
        if escape {
            out.write_all(b"\\")?;
        }
        out.write_all(b"\n")?;
        rest = &rest[split..];
    }
    out.write_all(rest.as_bytes())?;
    if escape && rest.ends_with('\\') {
        out.write_all(b"\\\n")?;
    }
    out.write_all(b"\n")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssh::codec::DataReader;
    use crate::ssh::keypair::tests::{rsa_512, toy_dsa};

    fn block(data: &str, escape: bool) -> String {
        let mut out = Vec::new();
        write_key_file_block(&mut out, data, escape).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_block_short_line() {
        assert_eq!(block("abc", false), "abc\n");
        assert_eq!(block("abc", true), "abc\n");
    }

    #[test]
    fn test_block_exact_width_is_not_split() {
        let line = "x".repeat(70);
        assert_eq!(block(&line, true), format!("{}\n", line));
        assert_eq!(block(&line, false), format!("{}\n", line));
    }

    #[test]
    fn test_block_unescaped_wrap() {
        let data = "a".repeat(150);
        let out = block(&data, false);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].len(), 70);
        assert_eq!(lines[1].len(), 70);
        assert_eq!(lines[2].len(), 10);
    }

    #[test]
    fn test_block_escaped_wrap() {
        let data = "b".repeat(140);
        let out = block(&data, true);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], format!("{}\\", "b".repeat(69)));
        assert_eq!(lines[1], format!("{}\\", "b".repeat(69)));
        assert_eq!(lines[2], "bb");
    }

    #[test]
    fn test_block_multibyte_comment() {
        let data = "é".repeat(75);
        let out = block(&data, true);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0].chars().count(), 70);
        assert!(lines[0].ends_with('\\'));
        assert_eq!(lines[1].chars().count(), 6);
    }

    #[test]
    fn test_block_trailing_backslash_is_continued() {
        assert_eq!(block("C:\\keys\\", true), "C:\\keys\\\\\n\n");
        assert_eq!(block("C:\\keys\\", false), "C:\\keys\\\n");
    }

    #[test]
    fn test_comment_with_trailing_backslash_round_trips() {
        let passphrase = SecretString::from("pw".to_string());
        let wrapped = format!("{}\\", "w".repeat(61));
        for comment in ["C:\\keys\\", "\\", "trailing \\\\", wrapped.as_str()] {
            let key = UserAuthKey::new(toy_dsa()).with_comment(comment);
            let mut out = Vec::new();
            key.write_private_secsh(&mut out, key.comment(), Some(&passphrase))
                .unwrap();

            let (loaded, loaded_comment) = PrivateKeyLoader::from_bytes(out, "exported.key")
                .load_ssh2_private_key(Some(&passphrase))
                .unwrap();
            assert_eq!(&loaded, key.key_pair());
            assert_eq!(loaded_comment, comment, "{:?}", comment);
        }
    }

    #[test]
    fn test_sign_blob_layout() {
        let key = UserAuthKey::new(toy_dsa());
        let blob = key.sign_blob(b"session").unwrap();

        let mut reader = DataReader::new(&blob);
        assert_eq!(reader.read_utf8().unwrap(), "ssh-dss");
        let signature = reader.read_string().unwrap();
        assert_eq!(signature.len(), 2);
        assert!(key.key_pair().verify(b"session", signature));
        assert_eq!(reader.rest(), 0);
    }

    #[test]
    fn test_public_openssh_line() {
        let key = UserAuthKey::new(toy_dsa());
        let line = key.public_openssh_line();
        let (alg, body) = line.split_once(' ').unwrap();
        assert_eq!(alg, "ssh-dss");
        let blob = base64::engine::general_purpose::STANDARD
            .decode(body)
            .unwrap();
        assert_eq!(blob, key.public_key_blob());

        let mut out = Vec::new();
        key.write_public_openssh(&mut out).unwrap();
        assert_eq!(out, format!("{}\n", line).into_bytes());
    }

    #[test]
    fn test_public_secsh_layout() {
        let key = UserAuthKey::new(rsa_512());
        let mut out = Vec::new();
        key.write_public_secsh(&mut out, "work laptop").unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], PUBLIC_KEY_HEADER);
        assert_eq!(lines[1], "Comment: work laptop");
        assert_eq!(*lines.last().unwrap(), PUBLIC_KEY_FOOTER);
        assert!(lines.iter().all(|l| l.len() <= 70));

        let body: String = lines[2..lines.len() - 1].concat();
        let blob = base64::engine::general_purpose::STANDARD
            .decode(body)
            .unwrap();
        assert_eq!(blob, key.public_key_blob());
    }

    #[test]
    fn test_private_secsh_without_comment() {
        let key = UserAuthKey::new(toy_dsa());
        let mut out = Vec::new();
        key.write_private_secsh(&mut out, "", None).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.starts_with(sshcom::PRIVATE_KEY_HEADER));
        assert!(!text.contains("Comment:"));
        assert!(text.trim_end().ends_with(sshcom::PRIVATE_KEY_FOOTER));
    }

    #[test]
    fn test_private_secsh_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("id_dsa.key");
        let passphrase = SecretString::from("correct horse".to_string());
        let comment = format!("long comment {}", "z".repeat(120));

        let key = UserAuthKey::new(toy_dsa()).with_comment(comment.clone());
        let mut file = std::fs::File::create(&path).unwrap();
        key.write_private_secsh(&mut file, key.comment(), Some(&passphrase))
            .unwrap();
        drop(file);

        let loaded = UserAuthKey::from_file(&path, Some(&passphrase)).unwrap();
        assert_eq!(loaded.key_pair(), key.key_pair());
        assert_eq!(loaded.comment(), comment);
        assert_eq!(loaded.fingerprint_md5(), key.fingerprint_md5());
    }
}

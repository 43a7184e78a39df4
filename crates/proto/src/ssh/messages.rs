//! User-facing error strings for the key-file loaders.
//!
//! Loaders take a [`MessageCatalog`] so callers can localise or reword the
//! text that ends up inside [`BurrowError`](burrow_platform::BurrowError)
//! values. The default catalog is English.

use std::collections::HashMap;

/// Identifies one loader message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKey {
    /// Header or structure is not a private key file
    NotValidPrivateKeyFile,
    /// Decryption produced inconsistent data
    WrongPassphrase,
    /// Key file is encrypted but no passphrase was given
    PassphraseRequired,
    /// SSH1 or unrecognized file
    UnsupportedPrivateKeyFormat,
    /// ssh.com DSA key with a non-zero prefix word
    UnsupportedDsaKeyFormat,
    /// Key type is neither RSA nor DSA
    UnsupportedAuthenticationMethod,
    /// Cipher named by the key file is not implemented
    UnsupportedCipher,
    /// Magic number of an ssh.com blob does not match
    MagicCodeUnmatched,
    /// PuTTY MAC or hash check failed
    MacMismatch,
    /// Key file exceeds the size limit
    KeyFileTooLarge,
    /// Key file could not be read completely
    CouldNotReadKeyFile,
}

impl MessageKey {
    /// Built-in English text.
    pub fn default_text(self) -> &'static str {
        match self {
            MessageKey::NotValidPrivateKeyFile => "not a valid private key file",
            MessageKey::WrongPassphrase => "wrong passphrase",
            MessageKey::PassphraseRequired => "passphrase is required",
            MessageKey::UnsupportedPrivateKeyFormat => "unsupported private key format",
            MessageKey::UnsupportedDsaKeyFormat => "unsupported DSA key format",
            MessageKey::UnsupportedAuthenticationMethod => "unsupported authentication method",
            MessageKey::UnsupportedCipher => "unsupported cipher",
            MessageKey::MagicCodeUnmatched => "magic code unmatched",
            MessageKey::MacMismatch => "MAC mismatch",
            MessageKey::KeyFileTooLarge => "key file is too large",
            MessageKey::CouldNotReadKeyFile => "could not read the key file",
        }
    }
}

/// Message lookup with per-key overrides.
#[derive(Debug, Clone, Default)]
pub struct MessageCatalog {
    overrides: HashMap<MessageKey, String>,
}

impl MessageCatalog {
    /// English catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the text for one key.
    pub fn with_message(mut self, key: MessageKey, text: impl Into<String>) -> Self {
        self.overrides.insert(key, text.into());
        self
    }

    /// Text for `key`.
    pub fn get(&self, key: MessageKey) -> &str {
        self.overrides
            .get(&key)
            .map(String::as_str)
            .unwrap_or_else(|| key.default_text())
    }

    /// Text for `key` followed by a parenthesised detail.
    pub fn detail(&self, key: MessageKey, detail: &str) -> String {
        format!("{} ({})", self.get(key), detail)
    }
}

//! SSH2 key handling and tunnel streams for the Burrow node transports.
//!
//! This crate provides:
//!
//! - **Private key loading** - OpenSSH PEM, ssh.com (SECSH) and PuTTY files,
//!   encrypted or not
//! - **RSA/DSA keys** - `ssh-rsa` and `ssh-dss` signatures, public key blobs,
//!   fingerprints, export to SECSH and OpenSSH formats
//! - **Tunnels** - a blocking [`std::io::Read`]/[`std::io::Write`] stream over
//!   a forwarded SSH channel, driven by an external SSH connector
//!
//! # Features
//!
//! - `ssh` (default) - SSH key and tunnel support
//! - `serde` - `Serialize`/`Deserialize` for configuration types
//!
//! # Example
//!
//! ```no_run
//! use burrow_proto::ssh::UserAuthKey;
//! use secrecy::SecretString;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let passphrase = SecretString::from("passphrase".to_string());
//! let key = UserAuthKey::from_file("id_rsa", Some(&passphrase))?;
//!
//! println!("{} {}", key.fingerprint_sha256(), key.comment());
//! let mut out = std::io::stdout();
//! key.write_public_openssh(&mut out)?;
//! # Ok(())
//! # }
//! ```
//!
//! # Security
//!
//! - All cryptographic primitives come from vetted RustCrypto crates
//! - Constant-time MAC comparison for PuTTY files
//! - Secure memory handling with `zeroize` and `secrecy`
//! - Fuzz target for the key file parsers

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

#[cfg(feature = "ssh")]
pub mod ssh;

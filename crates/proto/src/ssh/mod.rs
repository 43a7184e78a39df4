//! SSH2 client key management and tunnel plumbing.
//!
//! # Architecture
//!
//! The implementation is layered:
//!
//! 1. **Codec** ([`codec`]) - SSH binary encoding, big integers in both
//!    length conventions
//! 2. **Secrets** ([`secure`]) - Zeroizing passphrase buffers
//! 3. **Key files** ([`privatekey`]) - Format detection and decoders for
//!    OpenSSH PEM, ssh.com and PuTTY keys
//! 4. **Keys** ([`keypair`], [`authkey`]) - RSA/DSA signing, public blobs,
//!    fingerprints and export
//! 5. **Tunnels** ([`channel`], [`tunnel`], [`transport`]) - Channel
//!    registry, blocking streams and the tunnel transport over an external
//!    SSH connector
//!
//! # Security Considerations
//!
//! - **Wrong passphrases are detected**: every decoded key is checked for
//!   internal consistency before it is returned
//! - **Memory Safety**: Passphrases and key material are zeroized on drop
//!   using [`zeroize`]
//! - **No Unsafe Code**: Pure Rust implementation without `unsafe`
//!
//! # Example
//!
//! ```rust
//! use burrow_proto::ssh::privatekey::PrivateKeyFormat;
//!
//! let format = PrivateKeyFormat::detect(b"PuTTY-User-Key-File-2: ssh-rsa\r\n");
//! assert_eq!(format, PrivateKeyFormat::Ssh2Putty);
//! ```
//!
//! # References
//!
//! - [RFC 4251](https://datatracker.ietf.org/doc/html/rfc4251) - SSH Protocol Architecture
//! - [RFC 4254](https://datatracker.ietf.org/doc/html/rfc4254) - SSH Connection Protocol
//! - [RFC 4716](https://datatracker.ietf.org/doc/html/rfc4716) - SSH Public Key File Format

pub mod authkey;
pub mod channel;
pub mod codec;
pub mod config;
pub mod keypair;
pub mod messages;
pub mod privatekey;
pub mod secure;
pub mod transport;
pub mod tunnel;

// Re-export main types
pub use authkey::UserAuthKey;
pub use channel::{
    ChannelEntry, ChannelEvent, ChannelEventReceiver, ChannelRegistry, ConnectionEventReceiver,
    SshChannel, SshConnectionHandle,
};
pub use codec::{DataReader, DataWriter};
pub use config::{AuthenticationType, TunnelConfig, TunnelConfigBuilder};
pub use keypair::{DsaKeyPair, KeyPair, PublicKeyAlgorithm, RsaKeyPair};
pub use messages::{MessageCatalog, MessageKey};
pub use privatekey::{PrivateKeyFormat, PrivateKeyLoader, Ssh2PrivateKeyLoader};
pub use secure::{SecureArray, SecureBuffer, SecureCharBuffer};
pub use transport::{
    ConnectionParameters, PassphraseSource, SshConnector, StaticPassphrase, TunnelTransport,
};
pub use tunnel::TunnelStream;

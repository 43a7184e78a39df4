//! Tunnel transport configuration
//!
//! Provides [`TunnelConfig`] and its builder for
//! [`TunnelTransport`](crate::ssh::transport::TunnelTransport).

use crate::ssh::keypair::PublicKeyAlgorithm;
use burrow_platform::{BurrowError, BurrowResult};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Default SSH server port
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Default deadline for the tunnel channel to become ready
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(20_000);

/// Default forwarding window size
pub const DEFAULT_WINDOW_SIZE: u32 = 0x1000;

/// Default maximum channel packet size
pub const DEFAULT_MAX_PACKET_SIZE: u32 = 0x10000;

/// Cipher preference, most preferred first
pub const DEFAULT_CIPHERS: &[&str] = &[
    "blowfish-cbc",
    "3des-cbc",
    "aes192-ctr",
    "aes256-ctr",
    "aes128-ctr",
];

/// SSH user authentication method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AuthenticationType {
    /// `password`
    #[default]
    Password,
    /// `publickey` with a private key file
    PublicKey,
    /// `keyboard-interactive`
    KeyboardInteractive,
}

impl AuthenticationType {
    /// Method name used on the wire
    pub fn method_name(&self) -> &'static str {
        match self {
            AuthenticationType::Password => "password",
            AuthenticationType::PublicKey => "publickey",
            AuthenticationType::KeyboardInteractive => "keyboard-interactive",
        }
    }
}

impl fmt::Display for AuthenticationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.method_name())
    }
}

impl FromStr for AuthenticationType {
    type Err = BurrowError;

    /// Accepts the wire names and the enum names, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "password" => Ok(AuthenticationType::Password),
            "publickey" => Ok(AuthenticationType::PublicKey),
            "keyboard-interactive" | "keyboardinteractive" => {
                Ok(AuthenticationType::KeyboardInteractive)
            }
            _ => Err(BurrowError::Config(format!(
                "unknown authentication type: {}",
                s
            ))),
        }
    }
}

/// Tunnel transport configuration
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TunnelConfig {
    /// SSH server port (default 22)
    pub ssh_port: u16,

    /// SSH user name
    pub user_name: String,

    /// Private key file, only used with [`AuthenticationType::PublicKey`]
    pub private_key_path: Option<PathBuf>,

    /// Deadline for the tunnel channel to become ready
    pub connect_timeout: Duration,

    /// User authentication method
    pub authentication: AuthenticationType,

    /// Remote node name, passed to the passphrase source
    pub node_name: String,

    /// Forwarding window size
    pub window_size: u32,

    /// Maximum channel packet size
    pub max_packet_size: u32,

    /// Cipher names, most preferred first
    pub preferred_ciphers: Vec<String>,

    /// Host key algorithms, most preferred first
    pub preferred_host_key_algorithms: Vec<PublicKeyAlgorithm>,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            ssh_port: DEFAULT_SSH_PORT,
            user_name: String::new(),
            private_key_path: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            authentication: AuthenticationType::default(),
            node_name: String::new(),
            window_size: DEFAULT_WINDOW_SIZE,
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
            preferred_ciphers: DEFAULT_CIPHERS.iter().map(|c| c.to_string()).collect(),
            preferred_host_key_algorithms: vec![PublicKeyAlgorithm::Rsa, PublicKeyAlgorithm::Dsa],
        }
    }
}

impl TunnelConfig {
    /// Create builder for tunnel configuration
    pub fn builder() -> TunnelConfigBuilder {
        TunnelConfigBuilder::new()
    }

    /// Validate configuration
    pub fn validate(&self) -> BurrowResult<()> {
        if self.ssh_port == 0 {
            return Err(BurrowError::Config("ssh_port cannot be 0".into()));
        }
        if self.user_name.is_empty() {
            return Err(BurrowError::Config("user_name cannot be empty".into()));
        }
        if self.connect_timeout.is_zero() {
            return Err(BurrowError::Config("connect_timeout cannot be zero".into()));
        }
        if self.authentication == AuthenticationType::PublicKey && self.private_key_path.is_none()
        {
            return Err(BurrowError::Config(
                "private_key_path is required for publickey authentication".into(),
            ));
        }
        if self.window_size == 0 {
            return Err(BurrowError::Config("window_size cannot be 0".into()));
        }
        if self.max_packet_size == 0 {
            return Err(BurrowError::Config("max_packet_size cannot be 0".into()));
        }
        if self.preferred_ciphers.is_empty() {
            return Err(BurrowError::Config("At least one cipher required".into()));
        }
        if self.preferred_host_key_algorithms.is_empty() {
            return Err(BurrowError::Config(
                "At least one host key algorithm required".into(),
            ));
        }
        Ok(())
    }
}

/// Builder for TunnelConfig
#[derive(Default)]
pub struct TunnelConfigBuilder {
    ssh_port: Option<u16>,
    user_name: Option<String>,
    private_key_path: Option<PathBuf>,
    connect_timeout: Option<Duration>,
    authentication: Option<AuthenticationType>,
    node_name: Option<String>,
    window_size: Option<u32>,
    max_packet_size: Option<u32>,
    preferred_ciphers: Option<Vec<String>>,
    preferred_host_key_algorithms: Option<Vec<PublicKeyAlgorithm>>,
}

impl TunnelConfigBuilder {
    /// Create new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set SSH server port
    pub fn with_ssh_port(mut self, port: u16) -> Self {
        self.ssh_port = Some(port);
        self
    }

    /// Set SSH user name
    pub fn with_user_name(mut self, user: impl Into<String>) -> Self {
        self.user_name = Some(user.into());
        self
    }

    /// Set private key file
    pub fn with_private_key_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.private_key_path = Some(path.into());
        self
    }

    /// Set tunnel readiness deadline
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set authentication method
    pub fn with_authentication(mut self, authentication: AuthenticationType) -> Self {
        self.authentication = Some(authentication);
        self
    }

    /// Set remote node name
    pub fn with_node_name(mut self, node: impl Into<String>) -> Self {
        self.node_name = Some(node.into());
        self
    }

    /// Set forwarding window size
    pub fn with_window_size(mut self, size: u32) -> Self {
        self.window_size = Some(size);
        self
    }

    /// Set maximum channel packet size
    pub fn with_max_packet_size(mut self, size: u32) -> Self {
        self.max_packet_size = Some(size);
        self
    }

    /// Set cipher preference
    pub fn with_preferred_ciphers<I, S>(mut self, ciphers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.preferred_ciphers = Some(ciphers.into_iter().map(Into::into).collect());
        self
    }

    /// Set host key algorithm preference
    pub fn with_preferred_host_key_algorithms(
        mut self,
        algorithms: Vec<PublicKeyAlgorithm>,
    ) -> Self {
        self.preferred_host_key_algorithms = Some(algorithms);
        self
    }

    /// Build TunnelConfig with validation
    pub fn build(self) -> BurrowResult<TunnelConfig> {
        let defaults = TunnelConfig::default();
        let config = TunnelConfig {
            ssh_port: self.ssh_port.unwrap_or(defaults.ssh_port),
            user_name: self
                .user_name
                .ok_or_else(|| BurrowError::Config("user_name is required".into()))?,
            private_key_path: self.private_key_path,
            connect_timeout: self.connect_timeout.unwrap_or(defaults.connect_timeout),
            authentication: self.authentication.unwrap_or(defaults.authentication),
            node_name: self.node_name.unwrap_or_default(),
            window_size: self.window_size.unwrap_or(defaults.window_size),
            max_packet_size: self.max_packet_size.unwrap_or(defaults.max_packet_size),
            preferred_ciphers: self.preferred_ciphers.unwrap_or(defaults.preferred_ciphers),
            preferred_host_key_algorithms: self
                .preferred_host_key_algorithms
                .unwrap_or(defaults.preferred_host_key_algorithms),
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TunnelConfig::default();
        assert_eq!(config.ssh_port, 22);
        assert_eq!(config.connect_timeout, Duration::from_millis(20_000));
        assert_eq!(config.authentication, AuthenticationType::Password);
        assert_eq!(config.window_size, 0x1000);
        assert_eq!(
            config.preferred_host_key_algorithms,
            vec![PublicKeyAlgorithm::Rsa, PublicKeyAlgorithm::Dsa]
        );
        assert_eq!(config.preferred_ciphers[0], "blowfish-cbc");
    }

    #[test]
    fn test_builder() {
        let config = TunnelConfig::builder()
            .with_user_name("erl")
            .with_node_name("node@host")
            .with_ssh_port(2222)
            .with_authentication(AuthenticationType::PublicKey)
            .with_private_key_path("/home/erl/.ssh/id_rsa")
            .with_preferred_ciphers(["aes128-ctr"])
            .build()
            .unwrap();

        assert_eq!(config.ssh_port, 2222);
        assert_eq!(config.node_name, "node@host");
        assert_eq!(config.preferred_ciphers, vec!["aes128-ctr".to_string()]);
        assert_eq!(config.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
    }

    #[test]
    fn test_builder_requires_user() {
        let err = TunnelConfig::builder().build().unwrap_err();
        assert!(matches!(err, BurrowError::Config(ref m) if m == "user_name is required"));
    }

    #[test]
    fn test_publickey_requires_key_path() {
        let err = TunnelConfig::builder()
            .with_user_name("erl")
            .with_authentication(AuthenticationType::PublicKey)
            .build()
            .unwrap_err();
        assert!(matches!(err, BurrowError::Config(_)));
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let config = TunnelConfig {
            user_name: "erl".into(),
            connect_timeout: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_authentication_from_str() {
        assert_eq!(
            "PublicKey".parse::<AuthenticationType>().unwrap(),
            AuthenticationType::PublicKey
        );
        assert_eq!(
            "keyboard-interactive".parse::<AuthenticationType>().unwrap(),
            AuthenticationType::KeyboardInteractive
        );
        assert!("kerberos".parse::<AuthenticationType>().is_err());
    }
}

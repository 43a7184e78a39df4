//! SSH tunnel transport.
//!
//! [`TunnelTransport`] drives an external SSH implementation (an
//! [`SshConnector`]) to open a local to remote port forward, and exposes the
//! forwarded channel as a blocking [`TunnelStream`].
//!
//! # Connect sequence
//!
//! 1. Ask the [`PassphraseSource`] for the secret of (node, user)
//! 2. For public key authentication, load the identity file with that secret
//! 3. Connect and request `direct-tcpip` to `host:port` from `localhost:0`
//! 4. Poll the readiness flag every [`POLL_INTERVAL`] until the deadline
//! 5. Wire channel data into a new [`TunnelStream`]
//!
//! Every channel and connection event is reported to the [`TraceObserver`]
//! as a record prefixed with `SSH`, and as a `tracing` event.
//!
//! # Example
//!
//! ```no_run
//! use burrow_proto::ssh::config::TunnelConfig;
//! use burrow_proto::ssh::transport::{SshConnector, StaticPassphrase, TunnelTransport};
//! use burrow_platform::NullObserver;
//! use std::io::{Read, Write};
//! use std::sync::Arc;
//!
//! # fn run<C: SshConnector>(connector: C) -> Result<(), Box<dyn std::error::Error>> {
//! let config = TunnelConfig::builder()
//!     .with_user_name("erlang")
//!     .with_node_name("node@db1")
//!     .build()?;
//! let passphrases = Arc::new(StaticPassphrase::new("secret"));
//! let observer = Arc::new(NullObserver);
//! let mut transport = TunnelTransport::new(connector, config, passphrases, observer);
//!
//! let stream = transport.connect("db1.example.com", 4369)?;
//! (&*stream).write_all(b"ping")?;
//! let mut reply = [0u8; 4];
//! (&*stream).read_exact(&mut reply)?;
//! transport.close();
//! # Ok(())
//! # }
//! ```

use crate::ssh::authkey::UserAuthKey;
use crate::ssh::channel::{
    ChannelEventReceiver, ConnectionEventReceiver, SshChannel, SshConnectionHandle,
};
use crate::ssh::config::{AuthenticationType, TunnelConfig};
use crate::ssh::keypair::PublicKeyAlgorithm;
use crate::ssh::tunnel::{TunnelStream, POLL_INTERVAL};
use burrow_platform::{
    BurrowError, BurrowResult, Direction, TraceLevel, TraceObserver, TraceRecord,
};
use secrecy::SecretString;
use std::fmt;
use std::sync::atomic::{AtomicI8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Error text when the channel does not become ready in time
pub const CREATE_TUNNEL_ERROR: &str = "cannot create SSH tunnel";

/// Host the forward claims to originate from
const ORIGINATOR_HOST: &str = "localhost";

const CHANNEL_PENDING: i8 = 0;
const CHANNEL_READY: i8 = 1;
const CHANNEL_FAILED: i8 = -1;

/// Supplies passwords or key passphrases on demand.
pub trait PassphraseSource: Send + Sync {
    /// Secret for `user_name` when connecting to `node_name`, if any.
    fn passphrase(&self, node_name: &str, user_name: &str) -> Option<SecretString>;
}

/// A passphrase source that always returns the same secret.
pub struct StaticPassphrase(SecretString);

impl StaticPassphrase {
    /// Wraps `secret`.
    pub fn new(secret: impl Into<String>) -> Self {
        Self(SecretString::from(secret.into()))
    }
}

impl PassphraseSource for StaticPassphrase {
    fn passphrase(&self, _node_name: &str, _user_name: &str) -> Option<SecretString> {
        Some(self.0.clone())
    }
}

/// Everything an [`SshConnector`] needs to open and authenticate a connection.
#[derive(Clone)]
pub struct ConnectionParameters {
    /// SSH server host
    pub host: String,
    /// SSH server port
    pub port: u16,
    /// SSH user name
    pub user_name: String,
    /// Password, or the passphrase the identity was decrypted with
    pub password: Option<SecretString>,
    /// User authentication method
    pub authentication: AuthenticationType,
    /// Decoded identity for public key authentication
    pub identity: Option<Arc<UserAuthKey>>,
    /// Host key algorithms, most preferred first
    pub preferred_host_key_algorithms: Vec<PublicKeyAlgorithm>,
    /// Cipher names, most preferred first
    pub preferred_ciphers: Vec<String>,
    /// Forwarding window size
    pub window_size: u32,
    /// Maximum channel packet size
    pub max_packet_size: u32,
    /// Deadline for the tunnel channel to become ready
    pub connect_timeout: Duration,
}

impl fmt::Debug for ConnectionParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParameters")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user_name", &self.user_name)
            .field("authentication", &self.authentication)
            .field("identity", &self.identity.as_ref().map(|k| k.algorithm()))
            .field("window_size", &self.window_size)
            .finish_non_exhaustive()
    }
}

/// Opens SSH connections.
pub trait SshConnector: Send + Sync {
    /// Connects and authenticates. Connection level events go to `receiver`.
    fn connect(
        &self,
        params: &ConnectionParameters,
        receiver: Arc<dyn ConnectionEventReceiver>,
    ) -> BurrowResult<Arc<dyn SshConnectionHandle>>;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Receives channel and connection events on the transport's behalf.
struct TunnelEvents {
    readiness: AtomicI8,
    channel: Mutex<Option<Arc<dyn SshChannel>>>,
    stream: Mutex<StreamSlot>,
    observer: Arc<dyn TraceObserver>,
}

/// Data that arrives before the stream exists is held in `early`, up to
/// `limit` bytes. Nothing is accepted while no tunnel is being opened.
#[derive(Default)]
struct StreamSlot {
    accepting: bool,
    limit: usize,
    stream: Option<Weak<TunnelStream>>,
    early: Vec<u8>,
}

impl TunnelEvents {
    fn new(observer: Arc<dyn TraceObserver>) -> Self {
        Self {
            readiness: AtomicI8::new(CHANNEL_PENDING),
            channel: Mutex::new(None),
            stream: Mutex::new(StreamSlot::default()),
            observer,
        }
    }

    fn trace(&self, level: TraceLevel, direction: Direction, message: &str) {
        debug!(direction = ?direction, "SSH {}", message);
        self.observer
            .on_trace(&TraceRecord::new(level, direction, format!("SSH {}", message)));
    }

    /// Prepares for a new tunnel, holding back at most `early_limit` bytes
    /// until the stream is attached.
    fn reset(&self, early_limit: usize) {
        self.readiness.store(CHANNEL_PENDING, Ordering::SeqCst);
        *lock(&self.channel) = None;
        *lock(&self.stream) = StreamSlot {
            accepting: true,
            limit: early_limit,
            ..StreamSlot::default()
        };
    }

    /// Forgets the channel and stream, dropping any held back data.
    fn detach(&self) {
        *lock(&self.channel) = None;
        *lock(&self.stream) = StreamSlot::default();
    }

    fn readiness(&self) -> i8 {
        self.readiness.load(Ordering::SeqCst)
    }

    fn set_channel(&self, channel: Arc<dyn SshChannel>) {
        *lock(&self.channel) = Some(channel);
    }

    /// Routes further data into `stream`, flushing anything held back.
    fn attach_stream(&self, stream: &Arc<TunnelStream>) {
        let mut slot = lock(&self.stream);
        if !slot.early.is_empty() {
            stream.enqueue_data(&slot.early);
            slot.early.clear();
        }
        slot.stream = Some(Arc::downgrade(stream));
    }
}

impl ChannelEventReceiver for TunnelEvents {
    fn on_data(&self, data: &[u8]) {
        self.trace(
            TraceLevel::Wire,
            Direction::Inbound,
            &format!("Data {} bytes", data.len()),
        );
        let mut slot = lock(&self.stream);
        if let Some(stream) = slot.stream.as_ref().and_then(Weak::upgrade) {
            stream.enqueue_data(data);
            return;
        }
        if !slot.accepting {
            debug!(bytes = data.len(), "Dropping data for detached tunnel");
            return;
        }
        let room = slot.limit.saturating_sub(slot.early.len());
        if data.len() > room {
            warn!(
                bytes = data.len() - room,
                limit = slot.limit,
                "Dropping data received before the tunnel was ready"
            );
        }
        slot.early.extend_from_slice(&data[..data.len().min(room)]);
    }

    fn on_extended_data(&self, data_type: u32, data: &[u8]) {
        self.trace(
            TraceLevel::Ctrl,
            Direction::Inbound,
            &format!("EXTENDED DATA type {} ({} bytes)", data_type, data.len()),
        );
    }

    fn on_channel_ready(&self) {
        self.readiness.store(CHANNEL_READY, Ordering::SeqCst);
        self.trace(TraceLevel::Ctrl, Direction::Inbound, "Channel Ready");
    }

    fn on_channel_error(&self, reason: &str) {
        self.readiness.store(CHANNEL_FAILED, Ordering::SeqCst);
        self.trace(
            TraceLevel::Ctrl,
            Direction::Inbound,
            &format!("Channel ERROR: {}", reason),
        );
    }

    fn on_channel_eof(&self) {
        self.trace(TraceLevel::Ctrl, Direction::Inbound, "Channel EOF");
        let channel = lock(&self.channel).clone();
        if let Some(channel) = channel {
            if let Err(e) = channel.close() {
                warn!("Failed to close channel on EOF: {}", e);
            }
            if let Err(e) = channel.connection().close() {
                warn!("Failed to close connection on EOF: {}", e);
            }
        }
    }

    fn on_channel_closed(&self) {
        self.trace(TraceLevel::Ctrl, Direction::Inbound, "Channel closed");
    }
}

impl ConnectionEventReceiver for TunnelEvents {
    fn on_debug_message(&self, _always_display: bool, message: &[u8]) {
        self.trace(
            TraceLevel::Ctrl,
            Direction::Inbound,
            &format!("DEBUG: {}", String::from_utf8_lossy(message)),
        );
    }

    fn on_ignore_message(&self, data: &[u8]) {
        self.trace(
            TraceLevel::Ctrl,
            Direction::Inbound,
            &format!("Ignore: {}", String::from_utf8_lossy(data)),
        );
    }

    fn on_authentication_prompt(&self, prompts: &[String]) {
        let first = prompts.first().map_or("(empty)", String::as_str);
        self.trace(
            TraceLevel::Ctrl,
            Direction::Inbound,
            &format!("Auth Prompt {}", first),
        );
    }

    fn on_error(&self, error: &str) {
        warn!("SSH connection error: {}", error);
        self.trace(TraceLevel::Ctrl, Direction::Inbound, &format!("ERROR: {}", error));
    }

    fn on_connection_closed(&self) {
        self.trace(TraceLevel::Ctrl, Direction::Inbound, "Connection closed");
    }

    fn on_unknown_message(&self, message_type: u8, _data: &[u8]) {
        self.trace(
            TraceLevel::Ctrl,
            Direction::Inbound,
            &format!("Unknown Message {}", message_type),
        );
    }

    fn on_transmission(&self, kind: &str, detail: &str) {
        self.trace(
            TraceLevel::Ctrl,
            Direction::Outbound,
            &format!("SSH:{}:{}", kind, detail),
        );
    }

    fn on_reception(&self, kind: &str, detail: &str) {
        self.trace(
            TraceLevel::Ctrl,
            Direction::Inbound,
            &format!("SSH:{}:{}", kind, detail),
        );
    }
}

/// Blocking tunnel to a remote host:port over SSH.
pub struct TunnelTransport<C: SshConnector> {
    connector: C,
    config: TunnelConfig,
    passphrases: Arc<dyn PassphraseSource>,
    events: Arc<TunnelEvents>,
    connection: Option<Arc<dyn SshConnectionHandle>>,
    stream: Option<Arc<TunnelStream>>,
    remote: Option<(String, u16)>,
}

impl<C: SshConnector> TunnelTransport<C> {
    /// Creates a transport that is not yet connected.
    pub fn new(
        connector: C,
        config: TunnelConfig,
        passphrases: Arc<dyn PassphraseSource>,
        observer: Arc<dyn TraceObserver>,
    ) -> Self {
        Self {
            connector,
            config,
            passphrases,
            events: Arc::new(TunnelEvents::new(observer)),
            connection: None,
            stream: None,
            remote: None,
        }
    }

    /// Configuration the transport was created with.
    pub fn config(&self) -> &TunnelConfig {
        &self.config
    }

    /// Remote `host:port` of the current tunnel.
    pub fn remote_endpoint(&self) -> Option<(&str, u16)> {
        self.remote.as_ref().map(|(host, port)| (host.as_str(), *port))
    }

    /// Stream of the current tunnel, if connected.
    pub fn stream(&self) -> Option<Arc<TunnelStream>> {
        self.stream.clone()
    }

    /// Opens a tunnel to `host:port` within the configured connect timeout.
    pub fn connect(&mut self, host: &str, port: u16) -> BurrowResult<Arc<TunnelStream>> {
        self.connect_with_timeout(host, port, self.config.connect_timeout)
    }

    /// Opens a tunnel to `host:port`, waiting at most `timeout` for the
    /// channel to become ready.
    ///
    /// # Errors
    ///
    /// - [`BurrowError::Config`] for an invalid configuration
    /// - Any error from loading the identity file or from the connector
    /// - [`BurrowError::Channel`] if the channel fails or is not ready in time
    pub fn connect_with_timeout(
        &mut self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> BurrowResult<Arc<TunnelStream>> {
        self.close();
        match self.open_tunnel(host, port, timeout) {
            Ok(stream) => {
                info!(host, port, "SSH tunnel established");
                Ok(stream)
            }
            Err(e) => {
                self.events
                    .trace(TraceLevel::Ctrl, Direction::Inbound, &e.to_string());
                warn!(host, port, "SSH tunnel failed: {}", e);
                self.close();
                Err(e)
            }
        }
    }

    fn connection_parameters(&self, host: &str) -> BurrowResult<ConnectionParameters> {
        let config = &self.config;
        let password = self
            .passphrases
            .passphrase(&config.node_name, &config.user_name);

        let identity = match config.authentication {
            AuthenticationType::PublicKey => {
                let path = config.private_key_path.as_ref().ok_or_else(|| {
                    BurrowError::Config(
                        "private_key_path is required for publickey authentication".into(),
                    )
                })?;
                let key = UserAuthKey::from_file(path, password.as_ref())?;
                debug!(
                    algorithm = key.key_pair().algorithm_name(),
                    fingerprint = %key.fingerprint_sha256(),
                    "Loaded identity"
                );
                Some(Arc::new(key))
            }
            _ => None,
        };

        Ok(ConnectionParameters {
            host: host.to_string(),
            port: config.ssh_port,
            user_name: config.user_name.clone(),
            password,
            authentication: config.authentication,
            identity,
            preferred_host_key_algorithms: config.preferred_host_key_algorithms.clone(),
            preferred_ciphers: config.preferred_ciphers.clone(),
            window_size: config.window_size,
            max_packet_size: config.max_packet_size,
            connect_timeout: config.connect_timeout,
        })
    }

    fn open_tunnel(
        &mut self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> BurrowResult<Arc<TunnelStream>> {
        self.config.validate()?;
        let params = self.connection_parameters(host)?;

        self.events.reset(self.config.window_size as usize);
        let connection_events: Arc<dyn ConnectionEventReceiver> = self.events.clone();
        let connection = self.connector.connect(&params, connection_events)?;
        self.connection = Some(Arc::clone(&connection));

        let receiver: Arc<dyn ChannelEventReceiver> = self.events.clone();
        let channel = connection.forward_port(receiver, host, port, ORIGINATOR_HOST, 0)?;
        self.events.set_channel(Arc::clone(&channel));

        let deadline = Instant::now() + timeout;
        while self.events.readiness() == CHANNEL_PENDING && Instant::now() < deadline {
            thread::sleep(POLL_INTERVAL);
        }
        if self.events.readiness() != CHANNEL_READY {
            return Err(BurrowError::Channel(CREATE_TUNNEL_ERROR.to_string()));
        }

        let stream = Arc::new(TunnelStream::new(channel));
        self.events.attach_stream(&stream);
        self.stream = Some(Arc::clone(&stream));
        self.remote = Some((host.to_string(), port));
        Ok(stream)
    }

    /// Closes the stream and the connection. Safe to call repeatedly.
    ///
    /// Data the peer sends afterwards is dropped.
    pub fn close(&mut self) {
        self.events.detach();
        if let Some(stream) = self.stream.take() {
            stream.close();
        }
        if let Some(connection) = self.connection.take() {
            if connection.is_open() {
                if let Err(e) = connection.close() {
                    warn!("Failed to close SSH connection: {}", e);
                }
            }
        }
        self.remote = None;
    }
}

impl<C: SshConnector> Drop for TunnelTransport<C> {
    fn drop(&mut self) {
        self.close();
    }
}

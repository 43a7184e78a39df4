//! Integration tests for the SSH tunnel transport.
//!
//! A scripted fake server stands in for a real SSH implementation. It
//! records the connection parameters and drives the channel callbacks from
//! its own threads, the way a network delivery thread would.

mod common;

use burrow_platform::{BurrowError, BurrowResult, CollectingObserver, Direction};
use burrow_proto::ssh::channel::{
    ChannelEventReceiver, ConnectionEventReceiver, SshChannel, SshConnectionHandle,
};
use burrow_proto::ssh::config::{AuthenticationType, TunnelConfig};
use burrow_proto::ssh::transport::{
    ConnectionParameters, PassphraseSource, SshConnector, StaticPassphrase, TunnelTransport,
};
use burrow_proto::ssh::PublicKeyAlgorithm;
use secrecy::{ExposeSecret, SecretString};
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// What the fake server does once a forward is requested
#[derive(Clone, Copy)]
enum Script {
    /// Send a banner, confirm the channel, echo every write
    Echo,
    /// Never answer
    Silent,
    /// Refuse the channel
    Refuse,
    /// Send data but never confirm the channel
    Stale,
}

const BANNER: &[u8] = b"banner:";

type Forward = (String, u16, String, u16);

struct FakeServer {
    script: Mutex<Script>,
    open: AtomicBool,
    params: Mutex<Option<ConnectionParameters>>,
    forwards: Mutex<Vec<Forward>>,
    receiver: Mutex<Option<Arc<dyn ChannelEventReceiver>>>,
    connection_receiver: Mutex<Option<Arc<dyn ConnectionEventReceiver>>>,
}

impl FakeServer {
    fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script),
            open: AtomicBool::new(false),
            params: Mutex::new(None),
            forwards: Mutex::new(Vec::new()),
            receiver: Mutex::new(None),
            connection_receiver: Mutex::new(None),
        })
    }

    fn set_script(&self, script: Script) {
        *self.script.lock().unwrap() = script;
    }

    fn params(&self) -> ConnectionParameters {
        self.params.lock().unwrap().clone().expect("connected")
    }

    fn channel_receiver(&self) -> Arc<dyn ChannelEventReceiver> {
        self.receiver.lock().unwrap().clone().expect("forwarded")
    }

    fn connection_events(&self) -> Arc<dyn ConnectionEventReceiver> {
        self.connection_receiver
            .lock()
            .unwrap()
            .clone()
            .expect("connected")
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

struct FakeConnector(Arc<FakeServer>);

impl SshConnector for FakeConnector {
    fn connect(
        &self,
        params: &ConnectionParameters,
        receiver: Arc<dyn ConnectionEventReceiver>,
    ) -> BurrowResult<Arc<dyn SshConnectionHandle>> {
        receiver.on_transmission("SSH_MSG_KEXINIT", "client");
        receiver.on_reception("SSH_MSG_KEXINIT", "server");
        *self.0.connection_receiver.lock().unwrap() = Some(receiver);
        *self.0.params.lock().unwrap() = Some(params.clone());
        self.0.open.store(true, Ordering::SeqCst);
        Ok(Arc::new(FakeConnection(Arc::clone(&self.0))))
    }
}

struct FakeConnection(Arc<FakeServer>);

impl SshConnectionHandle for FakeConnection {
    fn is_open(&self) -> bool {
        self.0.is_open()
    }

    fn close(&self) -> BurrowResult<()> {
        self.0.open.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn forward_port(
        &self,
        receiver: Arc<dyn ChannelEventReceiver>,
        remote_host: &str,
        remote_port: u16,
        originator_host: &str,
        originator_port: u16,
    ) -> BurrowResult<Arc<dyn SshChannel>> {
        let server = &self.0;
        server.forwards.lock().unwrap().push((
            remote_host.to_string(),
            remote_port,
            originator_host.to_string(),
            originator_port,
        ));
        *server.receiver.lock().unwrap() = Some(Arc::clone(&receiver));

        let script = *server.script.lock().unwrap();
        let events = Arc::clone(&receiver);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            match script {
                Script::Echo => {
                    events.on_data(BANNER);
                    events.on_channel_ready();
                }
                Script::Refuse => events.on_channel_error("connect failed"),
                Script::Stale => events.on_data(b"stale"),
                Script::Silent => {}
            }
        });

        Ok(Arc::new(EchoChannel {
            server: Arc::clone(server),
            receiver,
            closed: AtomicBool::new(false),
        }))
    }
}

struct EchoChannel {
    server: Arc<FakeServer>,
    receiver: Arc<dyn ChannelEventReceiver>,
    closed: AtomicBool,
}

impl SshChannel for EchoChannel {
    fn transmit(&self, data: &[u8]) -> BurrowResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BurrowError::Channel("channel closed".into()));
        }
        let receiver = Arc::clone(&self.receiver);
        let data = data.to_vec();
        thread::spawn(move || receiver.on_data(&data));
        Ok(())
    }

    fn close(&self) -> BurrowResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn connection(&self) -> Arc<dyn SshConnectionHandle> {
        Arc::new(FakeConnection(Arc::clone(&self.server)))
    }
}

struct RecordingPassphrase {
    requests: Mutex<Vec<(String, String)>>,
    secret: &'static str,
}

impl PassphraseSource for RecordingPassphrase {
    fn passphrase(&self, node_name: &str, user_name: &str) -> Option<SecretString> {
        self.requests
            .lock()
            .unwrap()
            .push((node_name.to_string(), user_name.to_string()));
        Some(SecretString::from(self.secret.to_string()))
    }
}

fn config() -> TunnelConfig {
    TunnelConfig::builder()
        .with_user_name("erlang")
        .with_node_name("node@db1")
        .with_connect_timeout(Duration::from_secs(2))
        .build()
        .unwrap()
}

fn transport(
    server: &Arc<FakeServer>,
    config: TunnelConfig,
    secret: &str,
) -> TunnelTransport<FakeConnector> {
    TunnelTransport::new(
        FakeConnector(Arc::clone(server)),
        config,
        Arc::new(StaticPassphrase::new(secret)),
        Arc::new(CollectingObserver::new()),
    )
}

#[test]
fn test_tunnel_echo() {
    let server = FakeServer::new(Script::Echo);
    let observer = Arc::new(CollectingObserver::new());
    let passphrases = Arc::new(RecordingPassphrase {
        requests: Mutex::new(Vec::new()),
        secret: "hunter2",
    });

    let mut transport = TunnelTransport::new(
        FakeConnector(Arc::clone(&server)),
        config(),
        passphrases.clone(),
        observer.clone(),
    );
    let stream = transport.connect("db1.example.com", 4369).unwrap();
    assert_eq!(transport.remote_endpoint(), Some(("db1.example.com", 4369)));

    // The banner arrived before the stream existed
    let mut banner = [0u8; 7];
    (&*stream).read_exact(&mut banner).unwrap();
    assert_eq!(&banner, BANNER);

    (&*stream).write_all(b"ping").unwrap();
    let mut echo = [0u8; 4];
    (&*stream).read_exact(&mut echo).unwrap();
    assert_eq!(&echo, b"ping");

    let params = server.params();
    assert_eq!(params.host, "db1.example.com");
    assert_eq!(params.port, 22);
    assert_eq!(params.user_name, "erlang");
    assert_eq!(params.password.as_ref().unwrap().expose_secret(), "hunter2");
    assert_eq!(params.authentication, AuthenticationType::Password);
    assert!(params.identity.is_none());
    assert_eq!(
        params.preferred_host_key_algorithms,
        vec![PublicKeyAlgorithm::Rsa, PublicKeyAlgorithm::Dsa]
    );
    assert_eq!(params.window_size, 0x1000);

    assert_eq!(
        *passphrases.requests.lock().unwrap(),
        vec![("node@db1".to_string(), "erlang".to_string())]
    );
    assert_eq!(
        *server.forwards.lock().unwrap(),
        vec![(
            "db1.example.com".to_string(),
            4369,
            "localhost".to_string(),
            0
        )]
    );

    let records = observer.records();
    assert!(records
        .iter()
        .any(|r| r.message == "SSH Channel Ready" && r.direction == Direction::Inbound));
    assert!(records.iter().all(|r| r.message.starts_with("SSH ")));

    transport.close();
    assert!(!server.is_open());
    let mut rest = Vec::new();
    assert_eq!((&*stream).read_to_end(&mut rest).unwrap(), 0);
}

#[test]
fn test_tunnel_not_ready_times_out() {
    let server = FakeServer::new(Script::Silent);
    let observer = Arc::new(CollectingObserver::new());
    let mut transport = TunnelTransport::new(
        FakeConnector(Arc::clone(&server)),
        config(),
        Arc::new(StaticPassphrase::new("pw")),
        observer.clone(),
    );

    let start = Instant::now();
    let err = transport
        .connect_with_timeout("db1", 4369, Duration::from_millis(200))
        .unwrap_err();
    let elapsed = start.elapsed();

    assert!(matches!(err, BurrowError::Channel(ref m) if m == "cannot create SSH tunnel"));
    assert!(elapsed >= Duration::from_millis(200));
    assert!(elapsed < Duration::from_secs(2));
    assert!(transport.stream().is_none());
    assert!(!server.is_open());
    assert!(observer
        .records()
        .iter()
        .any(|r| r.message.contains("cannot create SSH tunnel")));
}

#[test]
fn test_tunnel_refused_fails_fast() {
    let server = FakeServer::new(Script::Refuse);
    let mut transport = transport(&server, config(), "pw");

    let start = Instant::now();
    let err = transport
        .connect_with_timeout("db1", 4369, Duration::from_secs(5))
        .unwrap_err();
    assert!(matches!(err, BurrowError::Channel(_)));
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[test]
fn test_publickey_identity_is_loaded() {
    let server = FakeServer::new(Script::Echo);
    let config = TunnelConfig::builder()
        .with_user_name("erlang")
        .with_authentication(AuthenticationType::PublicKey)
        .with_private_key_path(common::fixture("rsa_sshcom_3des.key"))
        .build()
        .unwrap();

    let mut transport = transport(&server, config, common::PASSPHRASE);
    transport.connect("db1", 4369).unwrap();

    let identity = server.params().identity.expect("identity loaded");
    common::assert_rsa_fixture(identity.key_pair());
    assert_eq!(identity.comment(), "\"1024-bit rsa, burrow test\"");
}

#[test]
fn test_publickey_wrong_passphrase_surfaces() {
    let server = FakeServer::new(Script::Echo);
    let config = TunnelConfig::builder()
        .with_user_name("erlang")
        .with_authentication(AuthenticationType::PublicKey)
        .with_private_key_path(common::fixture("rsa_putty_aes.ppk"))
        .build()
        .unwrap();

    let mut transport = transport(&server, config, "wrong");
    let err = transport.connect("db1", 4369).unwrap_err();
    assert!(err.is_wrong_passphrase());
    // Never got as far as connecting
    assert!(server.params.lock().unwrap().is_none());
}

#[test]
fn test_eof_unblocks_reader_and_closes_connection() {
    let server = FakeServer::new(Script::Echo);
    let mut transport = transport(&server, config(), "pw");
    let stream = transport.connect("db1", 4369).unwrap();

    let mut banner = [0u8; 7];
    (&*stream).read_exact(&mut banner).unwrap();

    let reader = {
        let stream = Arc::clone(&stream);
        thread::spawn(move || {
            let mut buf = [0u8; 8];
            (&*stream).read(&mut buf).unwrap()
        })
    };
    thread::sleep(Duration::from_millis(30));

    server.channel_receiver().on_channel_eof();

    assert_eq!(reader.join().unwrap(), 0);
    assert!(!server.is_open());
}

#[test]
fn test_connection_events_reach_observer() {
    let server = FakeServer::new(Script::Echo);
    let observer = Arc::new(CollectingObserver::new());
    let mut transport = TunnelTransport::new(
        FakeConnector(Arc::clone(&server)),
        config(),
        Arc::new(StaticPassphrase::new("pw")),
        observer.clone(),
    );
    transport.connect("db1", 4369).unwrap();

    let events = server.connection_events();
    events.on_debug_message(false, b"server going down");
    events.on_authentication_prompt(&[]);
    events.on_error("connection reset");
    events.on_connection_closed();

    let records = observer.records();
    let has = |message: &str, direction: Direction| {
        records
            .iter()
            .any(|r| r.message == message && r.direction == direction)
    };
    assert!(has("SSH SSH:SSH_MSG_KEXINIT:client", Direction::Outbound));
    assert!(has("SSH SSH:SSH_MSG_KEXINIT:server", Direction::Inbound));
    assert!(has("SSH DEBUG: server going down", Direction::Inbound));
    assert!(has("SSH Auth Prompt (empty)", Direction::Inbound));
    assert!(has("SSH ERROR: connection reset", Direction::Inbound));
    assert!(has("SSH Connection closed", Direction::Inbound));
}

#[test]
fn test_data_before_failed_open_is_discarded() {
    let server = FakeServer::new(Script::Stale);
    let mut transport = transport(&server, config(), "pw");

    let err = transport
        .connect_with_timeout("db1", 4369, Duration::from_millis(150))
        .unwrap_err();
    assert!(matches!(err, BurrowError::Channel(_)));

    // The failed channel keeps talking after the transport gave up
    server.channel_receiver().on_data(b"more stale data");

    server.set_script(Script::Echo);
    let stream = transport.connect("db1", 4369).unwrap();

    let mut banner = [0u8; 7];
    (&*stream).read_exact(&mut banner).unwrap();
    assert_eq!(&banner, BANNER);

    (&*stream).write_all(b"ok").unwrap();
    let mut echo = [0u8; 2];
    (&*stream).read_exact(&mut echo).unwrap();
    assert_eq!(&echo, b"ok");
}

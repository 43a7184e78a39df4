//! SSH channel abstractions and the local channel registry.
//!
//! The SSH transport itself lives outside this crate. It is consumed through
//! four traits:
//!
//! - [`SshConnectionHandle`]: an open connection that can forward ports
//! - [`SshChannel`]: one forwarded channel on that connection
//! - [`ChannelEventReceiver`]: callbacks the transport invokes from its
//!   delivery thread
//! - [`ConnectionEventReceiver`]: connection level messages and packet
//!   tracing
//!
//! [`ChannelRegistry`] maps locally assigned channel ids to receivers so a
//! transport can route incoming events.

use burrow_platform::{BurrowError, BurrowResult};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

/// Callbacks for channel events.
///
/// Called from the transport's delivery thread. Implementations must not
/// panic and never return errors; failures are traced instead.
pub trait ChannelEventReceiver: Send + Sync {
    /// Channel data arrived.
    fn on_data(&self, data: &[u8]);

    /// Extended (stderr) data arrived.
    fn on_extended_data(&self, data_type: u32, data: &[u8]) {
        let _ = (data_type, data);
    }

    /// The peer confirmed the channel open.
    fn on_channel_ready(&self);

    /// The channel could not be opened or failed.
    fn on_channel_error(&self, reason: &str);

    /// The peer will send no more data.
    fn on_channel_eof(&self) {}

    /// The channel is closed.
    fn on_channel_closed(&self) {}
}

/// Callbacks for connection level events.
///
/// Every method has an empty default. Like channel callbacks these run on
/// the transport's delivery thread and must not block.
pub trait ConnectionEventReceiver: Send + Sync {
    /// `SSH_MSG_DEBUG` arrived.
    fn on_debug_message(&self, always_display: bool, message: &[u8]) {
        let _ = (always_display, message);
    }

    /// `SSH_MSG_IGNORE` arrived.
    fn on_ignore_message(&self, data: &[u8]) {
        let _ = data;
    }

    /// The server sent keyboard-interactive prompts.
    fn on_authentication_prompt(&self, prompts: &[String]) {
        let _ = prompts;
    }

    /// The connection failed.
    fn on_error(&self, error: &str) {
        let _ = error;
    }

    /// The connection is closed.
    fn on_connection_closed(&self) {}

    /// A message of an unhandled type arrived.
    fn on_unknown_message(&self, message_type: u8, data: &[u8]) {
        let _ = (message_type, data);
    }

    /// A packet was sent. `kind` names the message, `detail` summarizes it.
    fn on_transmission(&self, kind: &str, detail: &str) {
        let _ = (kind, detail);
    }

    /// A packet was received.
    fn on_reception(&self, kind: &str, detail: &str) {
        let _ = (kind, detail);
    }
}

/// An open SSH connection.
pub trait SshConnectionHandle: Send + Sync {
    /// Returns true while the connection is usable.
    fn is_open(&self) -> bool;

    /// Closes the connection. Closing twice is not an error.
    fn close(&self) -> BurrowResult<()>;

    /// Opens a `direct-tcpip` channel to `remote_host:remote_port`.
    ///
    /// Events for the new channel go to `receiver`. The returned channel is
    /// usable once [`ChannelEventReceiver::on_channel_ready`] fires.
    fn forward_port(
        &self,
        receiver: Arc<dyn ChannelEventReceiver>,
        remote_host: &str,
        remote_port: u16,
        originator_host: &str,
        originator_port: u16,
    ) -> BurrowResult<Arc<dyn SshChannel>>;
}

/// One channel on an SSH connection.
pub trait SshChannel: Send + Sync {
    /// Sends `data` to the peer.
    fn transmit(&self, data: &[u8]) -> BurrowResult<()>;

    /// Closes the channel. Closing twice is not an error.
    fn close(&self) -> BurrowResult<()>;

    /// Connection the channel belongs to.
    fn connection(&self) -> Arc<dyn SshConnectionHandle>;
}

/// Channel event routed through [`ChannelRegistry::dispatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// Channel data
    Data(Vec<u8>),
    /// Extended data with its type code
    ExtendedData(u32, Vec<u8>),
    /// Open confirmation
    Ready,
    /// Open failure or channel error
    Error(String),
    /// End of data
    Eof,
    /// Channel closed
    Closed,
}

/// A registered channel.
pub struct ChannelEntry {
    local_id: u32,
    receiver: Arc<dyn ChannelEventReceiver>,
    channel: Mutex<Option<Arc<dyn SshChannel>>>,
}

impl ChannelEntry {
    /// Locally assigned channel id.
    pub fn local_id(&self) -> u32 {
        self.local_id
    }

    /// Receiver the registry routes events to.
    pub fn receiver(&self) -> Arc<dyn ChannelEventReceiver> {
        Arc::clone(&self.receiver)
    }

    /// Channel attached to this entry, if known yet.
    pub fn channel(&self) -> Option<Arc<dyn SshChannel>> {
        lock(&self.channel).clone()
    }

    fn set_channel(&self, channel: Arc<dyn SshChannel>) {
        *lock(&self.channel) = Some(channel);
    }

    /// Hands `event` to the receiver.
    pub fn deliver(&self, event: &ChannelEvent) {
        let receiver = &self.receiver;
        match event {
            ChannelEvent::Data(data) => receiver.on_data(data),
            ChannelEvent::ExtendedData(data_type, data) => {
                receiver.on_extended_data(*data_type, data)
            }
            ChannelEvent::Ready => receiver.on_channel_ready(),
            ChannelEvent::Error(reason) => receiver.on_channel_error(reason),
            ChannelEvent::Eof => receiver.on_channel_eof(),
            ChannelEvent::Closed => receiver.on_channel_closed(),
        }
    }
}

impl fmt::Debug for ChannelEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelEntry")
            .field("local_id", &self.local_id)
            .field("attached", &self.channel().is_some())
            .finish()
    }
}

#[derive(Default)]
struct RegistryInner {
    next_id: u32,
    entries: Vec<Arc<ChannelEntry>>,
}

/// Registry of local channels.
///
/// A single lock guards both the id sequence and the entries. Ids increase
/// monotonically and are never reused.
#[derive(Default)]
pub struct ChannelRegistry {
    inner: Mutex<RegistryInner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl ChannelRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `receiver` under a fresh local id.
    ///
    /// `channel` may be attached later with [`attach_channel`](Self::attach_channel)
    /// when the transport only creates it after the id is known.
    ///
    /// # Errors
    ///
    /// Returns [`BurrowError::Channel`] once the id space is exhausted.
    pub fn register(
        &self,
        channel: Option<Arc<dyn SshChannel>>,
        receiver: Arc<dyn ChannelEventReceiver>,
    ) -> BurrowResult<Arc<ChannelEntry>> {
        let mut inner = lock(&self.inner);
        let local_id = inner.next_id;
        inner.next_id = local_id
            .checked_add(1)
            .ok_or_else(|| BurrowError::Channel("channel ids exhausted".into()))?;

        let entry = Arc::new(ChannelEntry {
            local_id,
            receiver,
            channel: Mutex::new(channel),
        });
        inner.entries.push(Arc::clone(&entry));
        debug!("Registered channel {}", local_id);
        Ok(entry)
    }

    /// Looks up an entry by local id.
    pub fn find(&self, local_id: u32) -> Option<Arc<ChannelEntry>> {
        lock(&self.inner)
            .entries
            .iter()
            .find(|entry| entry.local_id == local_id)
            .cloned()
    }

    /// Attaches `channel` to a registered entry. Returns false for unknown ids.
    pub fn attach_channel(&self, local_id: u32, channel: Arc<dyn SshChannel>) -> bool {
        match self.find(local_id) {
            Some(entry) => {
                entry.set_channel(channel);
                true
            }
            None => {
                warn!("Cannot attach to unknown channel {}", local_id);
                false
            }
        }
    }

    /// Removes an entry. Returns false if the id was not registered.
    pub fn unregister(&self, local_id: u32) -> bool {
        let mut inner = lock(&self.inner);
        match inner.entries.iter().position(|e| e.local_id == local_id) {
            Some(index) => {
                inner.entries.remove(index);
                debug!("Unregistered channel {}", local_id);
                true
            }
            None => false,
        }
    }

    /// Number of registered channels.
    pub fn len(&self) -> usize {
        lock(&self.inner).entries.len()
    }

    /// Returns true if no channel is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Routes `event` to the receiver of `local_id`.
    ///
    /// The receiver runs without the registry lock held. A [`ChannelEvent::Closed`]
    /// event also unregisters the channel.
    pub fn dispatch(&self, local_id: u32, event: ChannelEvent) -> bool {
        let Some(entry) = self.find(local_id) else {
            warn!("Received message for unknown channel {}", local_id);
            return false;
        };

        entry.deliver(&event);
        if event == ChannelEvent::Closed {
            self.unregister(local_id);
        }
        true
    }
}

impl fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = lock(&self.inner);
        f.debug_struct("ChannelRegistry")
            .field("next_id", &inner.next_id)
            .field("entries", &inner.entries.len())
            .finish()
    }
}

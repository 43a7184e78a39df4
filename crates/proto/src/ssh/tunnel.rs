//! Blocking stream over a forwarded SSH channel.
//!
//! Channel data is pushed in by the transport's delivery thread through
//! [`TunnelStream::enqueue_data`] and pulled out by consumers with
//! [`std::io::Read`]. Reads wake on a signal from the producer and on a
//! short poll interval, so a closed connection is noticed even when no final
//! event arrives.

use crate::ssh::channel::SshChannel;
use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, warn};

/// How long a blocked read waits before re-checking the connection
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Synchronous byte stream over an [`SshChannel`].
pub struct TunnelStream {
    channel: Arc<dyn SshChannel>,
    pending: Mutex<VecDeque<u8>>,
    signal: Condvar,
    closed: AtomicBool,
}

impl TunnelStream {
    /// Wraps an open channel.
    pub fn new(channel: Arc<dyn SshChannel>) -> Self {
        Self {
            channel,
            pending: Mutex::new(VecDeque::new()),
            signal: Condvar::new(),
            closed: AtomicBool::new(false),
        }
    }

    fn queue(&self) -> MutexGuard<'_, VecDeque<u8>> {
        match self.pending.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Appends channel data and wakes a blocked reader.
    pub fn enqueue_data(&self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        self.queue().extend(data);
        self.signal.notify_all();
    }

    /// Number of buffered bytes not yet read.
    pub fn pending(&self) -> usize {
        self.queue().len()
    }

    /// Returns true once [`close`](Self::close) has run.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Reads buffered data into `buf`, blocking until some is available.
    ///
    /// Returns fewer bytes than `buf.len()` when less is buffered, and 0 once
    /// the queue is empty and the stream or its connection is closed.
    pub fn read_data(&self, buf: &mut [u8]) -> usize {
        if buf.is_empty() {
            return 0;
        }

        loop {
            let queue = self.queue();
            if !queue.is_empty() {
                return drain_into(queue, buf);
            }
            if self.is_closed() {
                return 0;
            }
            drop(queue);

            // Queried unlocked, the connection may feed this stream from is_open
            let open = self.channel.connection().is_open();

            let queue = self.queue();
            if !queue.is_empty() {
                return drain_into(queue, buf);
            }
            if !open {
                return 0;
            }
            if let Err(poisoned) = self.signal.wait_timeout(queue, POLL_INTERVAL) {
                drop(poisoned.into_inner());
            }
        }
    }

    /// Sends `data` through the channel.
    pub fn write_data(&self, data: &[u8]) -> io::Result<()> {
        if self.is_closed() {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "tunnel stream is closed",
            ));
        }
        self.channel
            .transmit(data)
            .map_err(|e| io::Error::new(io::ErrorKind::BrokenPipe, e.to_string()))
    }

    /// Closes the channel, then its connection.
    ///
    /// Only the first call has an effect. Blocked readers return 0 after
    /// draining what is buffered.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.channel.close() {
            warn!("Failed to close tunnel channel: {}", e);
        }
        if let Err(e) = self.channel.connection().close() {
            warn!("Failed to close tunnel connection: {}", e);
        }
        debug!("Tunnel stream closed");
        self.signal.notify_all();
    }
}

fn drain_into(mut queue: MutexGuard<'_, VecDeque<u8>>, buf: &mut [u8]) -> usize {
    let count = buf.len().min(queue.len());
    for (slot, byte) in buf.iter_mut().zip(queue.drain(..count)) {
        *slot = byte;
    }
    count
}

impl Drop for TunnelStream {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for TunnelStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TunnelStream")
            .field("pending", &self.pending())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl io::Read for &TunnelStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.read_data(buf))
    }
}

impl io::Write for &TunnelStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_data(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl io::Read for TunnelStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.read_data(buf))
    }
}

impl io::Write for TunnelStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_data(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

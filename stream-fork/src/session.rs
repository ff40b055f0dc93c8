//! Per-consumer session state and its delivery task.

use std::{
    net::SocketAddr,
    sync::{
        Arc, Weak,
        atomic::{AtomicUsize, Ordering},
    },
};

use bytes::Bytes;
use tokio::{
    io::AsyncWrite,
    select,
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tracing::{debug, warn};

use crate::{codec::write_frame, registry::Registry};

pub type SessionId = u64;

/// Registry-side half of a consumer session.
///
/// The registry owns the only queue sender; the spawned delivery task owns
/// the receiver and the socket.
pub struct Session {
    id: SessionId,
    peer: SocketAddr,
    queue: mpsc::UnboundedSender<Bytes>,
    depth: Arc<AtomicUsize>,
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl Session {
    /// Spawns the delivery task for `socket` and returns the handle that the
    /// registry keeps.
    pub(crate) fn spawn<W>(
        id: SessionId,
        peer: SocketAddr,
        socket: W,
        registry: Weak<Registry>,
    ) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (queue, inbox) = mpsc::unbounded_channel();
        let (stop, stopped) = watch::channel(false);
        let depth = Arc::new(AtomicUsize::new(0));

        let delivery = Delivery {
            id,
            peer,
            inbox,
            depth: Arc::clone(&depth),
            stopped,
            registry,
        };
        let task = tokio::spawn(delivery.run(socket));

        Self {
            id,
            peer,
            queue,
            depth,
            stop,
            task,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Messages enqueued but not yet taken by the delivery task.
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Acquire)
    }

    pub(crate) fn enqueue(&self, message: Bytes) {
        // Count before sending so the delivery task never decrements below zero.
        self.depth.fetch_add(1, Ordering::AcqRel);
        if self.queue.send(message).is_err() {
            self.depth.fetch_sub(1, Ordering::AcqRel);
            debug!(session = self.id, "delivery task already gone; message dropped");
        }
    }

    /// Signals the delivery task to stop and hands back its join handle.
    /// The socket closes when the task drops it.
    pub(crate) fn close(self) -> JoinHandle<()> {
        let _ = self.stop.send(true);
        self.task
    }
}

struct Delivery {
    id: SessionId,
    peer: SocketAddr,
    inbox: mpsc::UnboundedReceiver<Bytes>,
    depth: Arc<AtomicUsize>,
    stopped: watch::Receiver<bool>,
    registry: Weak<Registry>,
}

impl Delivery {
    async fn run<W>(mut self, mut socket: W)
    where
        W: AsyncWrite + Unpin,
    {
        loop {
            let message = select! {
                biased;
                _ = self.stopped.wait_for(|stop| *stop) => break,
                message = self.inbox.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };
            self.depth.fetch_sub(1, Ordering::AcqRel);

            let written = select! {
                biased;
                _ = self.stopped.wait_for(|stop| *stop) => break,
                written = write_frame(&mut socket, &message) => written,
            };

            if let Err(err) = written {
                warn!(session = self.id, peer = %self.peer, error = %err, "failed to deliver message");
                if let Some(registry) = self.registry.upgrade() {
                    registry.evict(self.id);
                }
                break;
            }
        }

        debug!(session = self.id, peer = %self.peer, "delivery task finished");
    }
}

//! Session registry and the producer-facing broadcaster.
//!
//! All admission, fan-out and eviction decisions go through one mutex. The
//! lock is never held across an await point, so `push` stays synchronous and
//! never waits on a consumer.

use std::{
    collections::BTreeMap,
    net::SocketAddr,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};

use bytes::Bytes;
use tokio::{io::AsyncWrite, task::JoinHandle};
use tracing::{info, warn};

use crate::session::{Session, SessionId};

pub struct Registry {
    sessions: Mutex<BTreeMap<SessionId, Session>>,
    next_id: AtomicU64,
    max_sessions: usize,
    max_queue_depth: usize,
}

impl Registry {
    pub fn new(max_sessions: usize, max_queue_depth: usize) -> Arc<Self> {
        Arc::new(Self {
            sessions: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
            max_sessions,
            max_queue_depth,
        })
    }

    fn sessions(&self) -> MutexGuard<'_, BTreeMap<SessionId, Session>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a new session for `socket` unless the registry is full.
    ///
    /// On rejection the socket is handed back untouched so the caller decides
    /// how to drop it.
    pub fn admit<W>(self: &Arc<Self>, peer: SocketAddr, socket: W) -> Result<SessionId, W>
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let mut sessions = self.sessions();
        if sessions.len() >= self.max_sessions {
            return Err(socket);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let session = Session::spawn(id, peer, socket, Arc::downgrade(self));
        sessions.insert(id, session);
        info!(session = id, %peer, total = sessions.len(), "consumer connected");
        Ok(id)
    }

    /// Fans `message` out to every registered session.
    ///
    /// Sessions whose backlog has reached the depth limit are evicted first
    /// and do not receive this message.
    pub fn push(&self, message: Bytes) {
        let mut sessions = self.sessions();

        let lagging: Vec<SessionId> = sessions
            .values()
            .filter(|session| session.depth() >= self.max_queue_depth)
            .map(Session::id)
            .collect();

        for id in lagging {
            if let Some(session) = sessions.remove(&id) {
                warn!(
                    session = id,
                    peer = %session.peer(),
                    depth = session.depth(),
                    "evicting consumer: queue depth limit reached"
                );
                drop(session.close());
            }
        }

        for session in sessions.values() {
            session.enqueue(message.clone());
        }
    }

    /// Removes a session and stops its delivery task. Evicting an id that is
    /// no longer registered does nothing.
    pub fn evict(&self, id: SessionId) -> bool {
        let Some(session) = self.sessions().remove(&id) else {
            return false;
        };
        warn!(session = id, peer = %session.peer(), "consumer disconnected");
        drop(session.close());
        true
    }

    /// Queue depth of every registered session, in admission order.
    pub fn snapshot_queue_depths(&self) -> Vec<usize> {
        self.sessions().values().map(Session::depth).collect()
    }

    pub fn session_count(&self) -> usize {
        self.sessions().len()
    }

    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    /// Removes every session and returns the delivery tasks to join.
    pub(crate) fn close_all(&self) -> Vec<JoinHandle<()>> {
        let drained = std::mem::take(&mut *self.sessions());
        drained
            .into_values()
            .map(|session| {
                info!(session = session.id(), peer = %session.peer(), "closing consumer");
                session.close()
            })
            .collect()
    }
}

/// Cloneable producer handle. `push` is fire-and-forget and callable from any
/// thread or task.
#[derive(Clone)]
pub struct Broadcaster {
    registry: Arc<Registry>,
}

impl Broadcaster {
    pub(crate) fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    pub fn push(&self, message: impl Into<Bytes>) {
        self.registry.push(message.into());
    }

    pub fn snapshot_queue_depths(&self) -> Vec<usize> {
        self.registry.snapshot_queue_depths()
    }

    pub fn session_count(&self) -> usize {
        self.registry.session_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::read_frame;
    use std::time::Duration;
    use tokio::{io::DuplexStream, time::timeout};

    fn peer(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn admit_pipe(registry: &Arc<Registry>, port: u16) -> (SessionId, DuplexStream) {
        let (writer, reader) = tokio::io::duplex(64 * 1024);
        let id = match registry.admit(peer(port), writer) {
            Ok(id) => id,
            Err(_) => panic!("registry unexpectedly full"),
        };
        (id, reader)
    }

    async fn next_message(reader: &mut DuplexStream) -> Option<Bytes> {
        timeout(Duration::from_secs(1), read_frame(reader))
            .await
            .expect("frame within timeout")
            .expect("read frame")
    }

    #[tokio::test]
    async fn admission_stops_at_max_sessions() {
        let registry = Registry::new(2, 600);
        let _first = admit_pipe(&registry, 1);
        let _second = admit_pipe(&registry, 2);

        let (third, _reader) = tokio::io::duplex(64);
        assert!(registry.admit(peer(3), third).is_err());
        assert_eq!(registry.session_count(), 2);
    }

    #[tokio::test]
    async fn evict_is_idempotent() {
        let registry = Registry::new(4, 600);
        let (id, mut reader) = admit_pipe(&registry, 1);

        assert!(registry.evict(id));
        assert!(!registry.evict(id));
        assert_eq!(registry.session_count(), 0);
        assert!(next_message(&mut reader).await.is_none());
    }

    #[tokio::test]
    async fn lagging_session_is_evicted_before_enqueue() {
        let registry = Registry::new(4, 3);
        let (_slow, mut slow_reader) = admit_pipe(&registry, 1);

        // No await between pushes: the delivery task cannot drain anything.
        for byte in 0..3u8 {
            registry.push(Bytes::from(vec![byte]));
        }
        assert_eq!(registry.snapshot_queue_depths(), vec![3]);

        let (_fresh, mut fresh_reader) = admit_pipe(&registry, 2);
        registry.push(Bytes::from_static(b"last"));

        assert_eq!(registry.session_count(), 1);
        assert_eq!(registry.snapshot_queue_depths(), vec![1]);
        assert_eq!(next_message(&mut fresh_reader).await.as_deref(), Some(&b"last"[..]));
        assert!(next_message(&mut slow_reader).await.is_none());
    }

    #[tokio::test]
    async fn depths_are_reported_in_admission_order() {
        let registry = Registry::new(4, 600);
        let (_a, _ra) = admit_pipe(&registry, 1);
        registry.push(Bytes::from_static(b"x"));
        let (_b, _rb) = admit_pipe(&registry, 2);
        registry.push(Bytes::from_static(b"y"));

        assert_eq!(registry.snapshot_queue_depths(), vec![2, 1]);
    }

    #[tokio::test]
    async fn close_all_empties_registry() {
        let registry = Registry::new(4, 600);
        let (_a, mut ra) = admit_pipe(&registry, 1);
        let (_b, mut rb) = admit_pipe(&registry, 2);

        for task in registry.close_all() {
            task.await.expect("delivery task joins");
        }
        assert_eq!(registry.session_count(), 0);
        assert!(next_message(&mut ra).await.is_none());
        assert!(next_message(&mut rb).await.is_none());
    }
}

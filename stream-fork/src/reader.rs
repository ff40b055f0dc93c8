//! Consumer side of the fan-out protocol.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use futures::{Stream, stream};
use tokio::{
    io::{AsyncRead, AsyncWriteExt},
    net::TcpStream,
};
use tracing::{debug, info};

use crate::{codec::read_frame, error::ReaderError};

/// Outcome of a single read from the server.
#[derive(Debug)]
pub enum StreamEvent {
    Message(String),
    /// The server closed the connection, possibly in the middle of a frame.
    EndOfStream,
    Fault(ReaderError),
}

/// Pull-only view of a server connection.
///
/// Once a read ends the stream or fails, the reader stays terminated; connect
/// again to get a fresh sequence.
pub struct StreamReader<R = TcpStream> {
    inner: R,
    finished: bool,
}

impl StreamReader<TcpStream> {
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        let mut stream = TcpStream::connect(addr)
            .await
            .with_context(|| format!("failed to connect to {addr}"))?;
        stream
            .shutdown()
            .await
            .context("failed to half-close connection for writing")?;

        info!(peer = %addr, "connected");
        Ok(Self::new(stream))
    }
}

impl<R> StreamReader<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            finished: false,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub async fn next_event(&mut self) -> StreamEvent {
        if self.finished {
            return StreamEvent::EndOfStream;
        }

        let event = match read_frame(&mut self.inner).await {
            Ok(Some(payload)) => match String::from_utf8(payload.to_vec()) {
                Ok(text) => StreamEvent::Message(text),
                Err(err) => StreamEvent::Fault(err.into()),
            },
            Ok(None) => StreamEvent::EndOfStream,
            Err(err) => StreamEvent::Fault(err.into()),
        };

        if !matches!(event, StreamEvent::Message(_)) {
            self.finished = true;
        }
        event
    }

    /// Like [`next_event`](Self::next_event) but a close and a fault both come
    /// back as `None`.
    pub async fn next_message(&mut self) -> Option<String> {
        match self.next_event().await {
            StreamEvent::Message(text) => Some(text),
            StreamEvent::EndOfStream => None,
            StreamEvent::Fault(err) => {
                debug!(error = %err, "stream ended with a fault");
                None
            }
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = String> {
        stream::unfold(self, |mut reader| async move {
            let text = reader.next_message().await?;
            Some((text, reader))
        })
    }
}

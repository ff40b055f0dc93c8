//! Single-producer, multi-consumer fan-out over TCP.
//!
//! A producer pushes discrete messages; every connected consumer receives each
//! one as a length-prefixed frame. Each module has one job:
//!
//! - [`codec`] is the 4-byte big-endian length prefix framing used by both ends.
//! - [`session`] holds one consumer's queue and the task that writes it out.
//! - [`registry`] tracks live sessions, enforces the session limit, and fans
//!   messages out, evicting consumers whose backlog grows too large.
//! - [`server`] accepts connections and tears everything down on shutdown.
//! - [`reader`] is the consumer side: a pull-only stream of text messages.
//! - [`producer`] is the demo counter loop driven by the binary.
//! - [`cli`] and [`config`] carry the command line and server settings.
//!
//! Integration tests drive a real server over loopback TCP.

pub mod cli;
pub mod codec;
pub mod config;
pub mod error;
pub mod producer;
pub mod reader;
pub mod registry;
pub mod server;
pub mod session;

pub use error::{ConfigError, FrameError, ReaderError};
pub use registry::Broadcaster;
pub use server::Server;

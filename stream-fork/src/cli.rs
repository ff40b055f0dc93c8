use std::{net::SocketAddr, time::Duration};

use clap::{Args, Parser, Subcommand};

use crate::{
    config::{DEFAULT_BIND, DEFAULT_MAX_QUEUE_DEPTH, DEFAULT_MAX_SESSIONS, ServerConfig},
    producer::CounterSettings,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the fan-out server with the demo counter producer.
    Serve(ServeArgs),
    /// Connect to a server and print every message it sends.
    Read(ReadArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Socket address the server should bind to. Use port 0 for an ephemeral port.
    #[arg(long, default_value = DEFAULT_BIND)]
    pub listen: SocketAddr,

    /// Maximum number of concurrently connected consumers.
    #[arg(long, default_value_t = DEFAULT_MAX_SESSIONS)]
    pub max_sessions: usize,

    /// Backlog at which a slow consumer is disconnected.
    #[arg(long, default_value_t = DEFAULT_MAX_QUEUE_DEPTH)]
    pub max_queue_depth: usize,

    /// Delay between produced messages, in milliseconds.
    #[arg(long, default_value_t = 1000)]
    pub interval_ms: u64,

    /// The producer pushes the values 1..COUNT.
    #[arg(long, default_value_t = 1000)]
    pub count: u64,

    /// Seconds between queue depth reports.
    #[arg(long, default_value_t = 10)]
    pub report_secs: u64,
}

impl ServeArgs {
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            bind: self.listen,
            max_sessions: self.max_sessions,
            max_queue_depth: self.max_queue_depth,
        }
    }

    pub fn counter_settings(&self) -> CounterSettings {
        CounterSettings {
            count: self.count,
            interval: Duration::from_millis(self.interval_ms),
            report_every: Duration::from_secs(self.report_secs),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ReadArgs {
    /// Address of the server to connect to.
    #[arg(long, default_value = DEFAULT_BIND)]
    pub server: SocketAddr,
}

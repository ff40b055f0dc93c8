//! Demo producer: pushes an incrementing counter to every consumer.

use std::{future::Future, time::Duration};

use tokio::{
    select,
    time::{Instant, sleep},
};
use tracing::info;

use crate::registry::Broadcaster;

#[derive(Debug, Clone)]
pub struct CounterSettings {
    /// Values `1..count` are pushed.
    pub count: u64,
    pub interval: Duration,
    /// How often per-session queue depths are logged.
    pub report_every: Duration,
}

impl Default for CounterSettings {
    fn default() -> Self {
        Self {
            count: 1000,
            interval: Duration::from_secs(1),
            report_every: Duration::from_secs(10),
        }
    }
}

/// Pushes the decimal counter values until done or until `shutdown` fires.
/// Returns how many values were pushed.
pub async fn run_counter<F>(broadcaster: Broadcaster, settings: CounterSettings, shutdown: F) -> u64
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut last_report = Instant::now();
    let mut pushed = 0;

    for value in 1..settings.count {
        broadcaster.push(value.to_string());
        pushed += 1;

        select! {
            _ = &mut shutdown => break,
            _ = sleep(settings.interval) => {}
        }

        if last_report.elapsed() >= settings.report_every {
            info!(depths = ?broadcaster.snapshot_queue_depths(), "consumer queue depths");
            last_report = Instant::now();
        }
    }

    pushed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::ServerConfig, server::Server};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn pushes_values_below_count() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let server = Server::new(listener, &ServerConfig::default());
        let settings = CounterSettings {
            count: 4,
            interval: Duration::from_millis(1),
            report_every: Duration::from_millis(1),
        };

        let pushed = run_counter(server.broadcaster(), settings, std::future::pending()).await;
        assert_eq!(pushed, 3);
    }

    #[tokio::test]
    async fn stops_when_shutdown_fires() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let server = Server::new(listener, &ServerConfig::default());
        let settings = CounterSettings {
            count: 1000,
            interval: Duration::from_secs(60),
            ..CounterSettings::default()
        };

        let pushed = run_counter(server.broadcaster(), settings, async {}).await;
        assert_eq!(pushed, 1);
    }
}

use anyhow::Result;
use clap::Parser;
use tokio::{io::AsyncWriteExt, sync::oneshot};
use tracing::{info, warn};

use stream_fork::{
    cli::{Cli, Command, ReadArgs, ServeArgs},
    producer,
    reader::{StreamEvent, StreamReader},
    server::Server,
};

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Read(args) => read(args).await,
    }
}

async fn serve(args: ServeArgs) -> Result<()> {
    let server = Server::bind(&args.server_config()).await?;
    let addr = server.local_addr()?;
    println!("stream-fork listening on {addr}");
    info!(%addr, "server listening");

    let broadcaster = server.broadcaster();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let listener = tokio::spawn(server.run_until(async move {
        let _ = stop_rx.await;
    }));

    let pushed = producer::run_counter(broadcaster, args.counter_settings(), async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = ?err, "failed to install ctrl-c handler");
        }
    })
    .await;
    info!(pushed, "producer finished");

    let _ = stop_tx.send(());
    listener.await??;
    Ok(())
}

async fn read(args: ReadArgs) -> Result<()> {
    let mut reader = StreamReader::connect(args.server).await?;
    let mut stdout = tokio::io::stdout();

    loop {
        match reader.next_event().await {
            StreamEvent::Message(text) => {
                stdout.write_all(text.as_bytes()).await?;
                stdout.write_all(b"\n").await?;
                stdout.flush().await?;
            }
            StreamEvent::EndOfStream => {
                info!("server closed the connection");
                return Ok(());
            }
            StreamEvent::Fault(err) => {
                warn!(error = %err, "stream failed");
                return Err(err.into());
            }
        }
    }
}

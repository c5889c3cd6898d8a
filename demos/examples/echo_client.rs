use bytes::Bytes;
use clap::Parser;
use hawser::{error_channel, io_interface_future, Framing, Net};
use hawser_rt::ExecutorBuilder;
use log::{error, info};
use std::time::Duration;
use tokio::sync::broadcast;

#[derive(Parser)]
#[command(name = "Echo Client")]
#[command(version = "0.2.0")]
#[command(about = "Sends delimited messages and prints echoes", long_about = None)]
struct Cli {
    #[arg(short, long)]
    debug: bool,
    #[arg(long, default_value_t = format!("127.0.0.1"))]
    host: String,
    #[arg(long, default_value_t = 8080)]
    port: u16,
    #[arg(long, default_value_t = 50)]
    count: usize,
    #[arg(long, default_value_t = 100)]
    interval_ms: u64,
    #[arg(long, default_value_t = format!("INFO"))]
    log_level: String,
}

async fn run(mut stop_rx: broadcast::Receiver<()>, cli: Cli) -> anyhow::Result<()> {
    let net = Net::new();
    let connector = net.make_tcp_connector(&cli.host, cli.port, Duration::from_millis(500));

    let (err_cb, mut errors) = error_channel();
    let ready = io_interface_future(&connector, err_cb)?;

    info!("connecting to {}:{}", cli.host, cli.port);
    let io = tokio::select! {
        _ = stop_rx.recv() => return Ok(()),
        io = ready => io?,
    };

    io.start_io(
        Framing::delimiter(&b"\r\n"[..]),
        Box::new(|msg, _io, endp| {
            info!("echo from {}: {}", endp, String::from_utf8_lossy(msg));
            true
        }),
    )?;

    for i in 0..cli.count {
        let msg = format!("message {}\r\n", i);
        if !io.send(Bytes::from(msg))? {
            break;
        }
        tokio::select! {
            _ = stop_rx.recv() => break,
            _ = tokio::time::sleep(Duration::from_millis(cli.interval_ms)) => {}
        }
    }

    // give the last echoes a moment to arrive
    tokio::time::sleep(Duration::from_millis(200)).await;
    net.stop_all();
    if let Some(event) = errors.recv().await {
        info!("final event: {}", event.err);
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    hawser_demos::init_logging(cli.debug, &cli.log_level)?;

    let (stop_tx, stop_rx) = broadcast::channel::<()>(1);
    let mut stop_tx = Some(stop_tx);
    ctrlc::set_handler(move || {
        if let Some(stop_tx) = stop_tx.take() {
            let _ = stop_tx.send(());
        }
    })?;

    ExecutorBuilder::new().name("echo-client").run(async move {
        if let Err(err) = run(stop_rx, cli).await {
            error!("run got error: {}", err);
        }
    });

    Ok(())
}

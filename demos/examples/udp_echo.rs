use clap::Parser;
use hawser::{error_channel, io_interface_future, Net};
use hawser_rt::ExecutorBuilder;
use log::{error, info};
use tokio::sync::broadcast;

#[derive(Parser)]
#[command(name = "UDP Echo")]
#[command(version = "0.2.0")]
#[command(about = "Echoes every datagram back to its sender", long_about = None)]
struct Cli {
    #[arg(short, long)]
    debug: bool,
    #[arg(long, default_value_t = format!("0.0.0.0"))]
    host: String,
    #[arg(long, default_value_t = 8081)]
    port: u16,
    #[arg(long, default_value_t = 2048)]
    max_size: usize,
    #[arg(long, default_value_t = format!("INFO"))]
    log_level: String,
}

async fn run(mut stop_rx: broadcast::Receiver<()>, cli: Cli) -> anyhow::Result<()> {
    let net = Net::new();
    let udp = net.make_udp(Some(format!("{}:{}", cli.host, cli.port).parse()?));

    let (err_cb, mut errors) = error_channel();
    let ready = io_interface_future(&udp, err_cb)?;
    let io = tokio::select! {
        _ = stop_rx.recv() => return Ok(()),
        io = ready => io?,
    };

    io.start_io(
        cli.max_size,
        Box::new(|msg, io, sender| {
            info!("echoing {} bytes to {}", msg.len(), sender);
            let _ = io.send_to(bytes::Bytes::copy_from_slice(msg), sender);
            true
        }),
    )?;
    info!("udp echo on {}:{}", cli.host, cli.port);
    info!("try `nc -u {} {}` in another shell", cli.host, cli.port);

    loop {
        tokio::select! {
            _ = stop_rx.recv() => break,
            Some(event) = errors.recv() => info!("event: {}", event.err),
        }
    }

    net.stop_all();
    info!("udp echo shut down");
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

    ExecutorBuilder::new().name("udp-echo").run(async move {
        if let Err(err) = run(stop_rx, cli).await {
            error!("run got error: {}", err);
        }
    });

    Ok(())
}

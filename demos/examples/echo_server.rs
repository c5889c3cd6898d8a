use bytes::Bytes;
use clap::Parser;
use hawser::{error_channel, start_with_io_channel, Framing, Net};
use hawser_rt::ExecutorBuilder;
use log::{error, info};
use tokio::sync::broadcast;

#[derive(Parser)]
#[command(name = "Echo Server")]
#[command(version = "0.2.0")]
#[command(about = "Line-delimited TCP echo server on hawser", long_about = None)]
struct Cli {
    #[arg(short, long)]
    debug: bool,
    #[arg(long, default_value_t = format!("0.0.0.0"))]
    host: String,
    #[arg(long, default_value_t = 8080)]
    port: u16,
    #[arg(long, default_value_t = format!("INFO"))]
    log_level: String,
}

async fn run(mut stop_rx: broadcast::Receiver<()>, host: String, port: u16) -> anyhow::Result<()> {
    let net = Net::new();
    let acceptor = net.make_tcp_acceptor(format!("{}:{}", host, port).parse()?, true);

    let (err_cb, mut errors) = error_channel();
    let mut io_events = start_with_io_channel(&acceptor, err_cb)?;

    info!("echo server listening on {}:{}", host, port);
    loop {
        tokio::select! {
            _ = stop_rx.recv() => break,
            Some(event) = errors.recv() => {
                info!("event: {} ({} handlers live)", event.err, event.count);
            }
            Some(event) = io_events.recv() => {
                if event.starting {
                    info!("connection up from {:?}", event.io.remote_endpoint().ok());
                    event.io.start_io(
                        Framing::delimiter(&b"\r\n"[..]),
                        Box::new(|msg, io, endp| {
                            info!("echoing {} bytes to {}", msg.len(), endp);
                            let _ = io.send(Bytes::copy_from_slice(msg));
                            true
                        }),
                    )?;
                }
            }
        }
    }

    net.stop_all();
    info!("echo server shut down");
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    hawser_demos::init_logging(cli.debug, &cli.log_level)?;

    let (stop_tx, stop_rx) = broadcast::channel::<()>(1);

    info!("Press Ctrl-C to stop");
    info!("try `nc {} {}` in another shell", cli.host, cli.port);
    let mut stop_tx = Some(stop_tx);
    ctrlc::set_handler(move || {
        if let Some(stop_tx) = stop_tx.take() {
            let _ = stop_tx.send(());
        }
    })?;

    let host = cli.host;
    let port = cli.port;
    ExecutorBuilder::new().name("echo-server").run(async move {
        if let Err(err) = run(stop_rx, host, port).await {
            error!("run got error: {}", err);
        }
    });

    Ok(())
}

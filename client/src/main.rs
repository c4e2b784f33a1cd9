use clap::Parser;
use client::network::Client;
use log::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:3001")]
    server: String,

    /// Bearer token obtained from the identity service
    #[arg(short, long)]
    token: String,

    /// Initial latitude to report
    #[arg(long, default_value = "0.0")]
    latitude: f64,

    /// Initial longitude to report
    #[arg(long, default_value = "0.0")]
    longitude: f64,

    /// Seconds between location reports
    #[arg(short, long, default_value = "5")]
    interval: u64,

    /// Drift randomly around the starting position
    #[arg(long)]
    wander: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Connecting to: {}", args.server);

    let mut client = Client::connect(
        &args.server,
        &args.token,
        args.latitude,
        args.longitude,
        args.interval,
        args.wander,
    )
    .await?;

    client.run().await?;
    client.disconnect().await;

    Ok(())
}

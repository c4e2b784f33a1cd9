use clap::Parser;
use log::info;
use server::auth::TokenVerifier;
use server::geocode::Geocoder;
use server::network::Server;

/// Main-method of the application.
/// Parses command-line arguments, builds the server, and runs it until
/// the process is interrupted.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Server IP address to bind to
        #[clap(short = 'H', long, default_value = "127.0.0.1")]
        host: String,
        /// Server port to listen on
        #[clap(short, long, default_value_t = shared::DEFAULT_PORT)]
        port: u16,
        /// HMAC secret shared with the identity service that issues tokens
        /// (falls back to the JWT_SECRET environment variable)
        #[clap(long)]
        secret: Option<String>,
        /// Reverse-geocoding endpoint, e.g. https://nominatim.openstreetmap.org/reverse
        /// (omit to disable address enrichment)
        #[clap(long)]
        geocode_url: Option<String>,
    }

    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    // Parse command line arguments
    let args = Args::parse();

    let secret = match args.secret.or_else(|| std::env::var("JWT_SECRET").ok()) {
        Some(secret) => secret,
        None => {
            return Err("no token secret configured: pass --secret or set JWT_SECRET".into());
        }
    };

    let geocoder = match args.geocode_url {
        Some(url) => Geocoder::new(url),
        None => {
            info!("Address enrichment disabled (no --geocode-url)");
            Geocoder::disabled()
        }
    };

    let address = format!("{}:{}", args.host, args.port);
    let server = Server::bind(&address, TokenVerifier::new(secret.as_bytes()), geocoder).await?;

    // Spawn server thread
    let server_handle = tokio::spawn(server.run());

    // Handle shutdown gracefully
    tokio::select! {
        result = server_handle => {
            match result {
                Ok(Err(e)) => eprintln!("Server error: {}", e),
                Err(e) => eprintln!("Server task panicked: {}", e),
                Ok(Ok(())) => {}
            }
        }
        _ = tokio::signal::ctrl_c() => {
            println!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    Ok(())
}

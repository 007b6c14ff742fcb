use dnsrouted_cli::parse_cli;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let cli = parse_cli();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    if let Err(err) = dnsrouted_app::run_with_args(cli).await {
        tracing::error!("{err:#}");
        std::process::exit(1);
    }
}

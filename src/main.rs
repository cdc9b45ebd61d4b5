use clap::Parser;
use earthlight::{application::Application, cli::Cli, view::EarthView};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    tracing::info!("earthlight v{} starting", env!("CARGO_PKG_VERSION"));

    let window = cli.window_builder();
    let result = pollster::block_on(Application::<EarthView>::init(cli.view_config(), window));
    if let Err(err) = result {
        tracing::error!("{err:#}");
        std::process::exit(1);
    }
}

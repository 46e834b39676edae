use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use network_injector::app::ApplicationBuilder;
use network_injector::config::Cli;
use utils::logging;
use utils::version;

/// Sets up global panic hooks.
fn setup_global_hooks() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        default_hook(panic_info);
        tracing::error!("Thread panicked: {}", panic_info);
    }));
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_global_hooks();

    let cli = Cli::parse();
    let _guard = logging::init();

    tracing::info!(
        "Starting network injector {} (branch {})",
        &**version::VERSION,
        version::branch()
    );

    let settings = cli
        .injector
        .resolve()
        .context("invalid configuration")?;
    tracing::info!(
        "Watching networks tagged {:?} on host {}",
        settings.ports.network_tag,
        settings.ports.host_id
    );

    let app = ApplicationBuilder::new(settings).build().await?;

    let result = app.run().await;
    app.shutdown().await?;

    result
}

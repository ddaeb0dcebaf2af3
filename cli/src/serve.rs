use anyhow::Result;
use tokio_util::sync::CancellationToken;

use hnotify::{init, Config, Database};

pub fn cmd() -> clap::Command {
    clap::Command::new("serve")
        .display_order(10)
        .about("Run the periodic notification cycle and serve the subscription pages")
}

pub async fn run(config: Config) -> Result<()> {
    hnotify::tracing::init(&config).unwrap_or_else(|e| {
        eprintln!("failed to initialize tracing (perhaps it was already initialized?): {e}")
    });

    let db = Database::open(&config.db_path)?;
    let services = init::initialize(config, &db)?;
    let cancel = CancellationToken::new();

    let scheduler = tokio::spawn(services.scheduler().run(cancel.clone()));
    let mut server = tokio::spawn(hnotify::axum::start_with(services, cancel.clone()));

    // Wait for either ctrl_c signal or the server stopping on its own
    let finished = tokio::select! {
        _ = tokio::signal::ctrl_c() => None,
        result = &mut server => Some(result),
    };
    cancel.cancel();

    let result = match finished {
        Some(result) => result,
        None => {
            println!("Initiating graceful shutdown...");
            server.await
        }
    };
    scheduler.await?;
    db.flush().await?;
    result??;

    Ok(())
}

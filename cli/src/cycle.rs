use anyhow::{Error, Result};

use hnotify::{init, Config, Database};

pub fn cmd() -> clap::Command {
    clap::Command::new("run")
        .display_order(20)
        .about("Run a single notification cycle and print its report")
}

pub async fn run(config: Config) -> Result<()> {
    hnotify::tracing::init(&config).unwrap_or_else(|e| {
        eprintln!("failed to initialize tracing (perhaps it was already initialized?): {e}")
    });

    let db = Database::open(&config.db_path)?;
    let services = init::initialize(config, &db)?;

    let report = services
        .scheduler()
        .trigger()
        .await
        .ok_or_else(|| Error::msg("a cycle is already running"))??;
    db.flush().await?;

    println!("ranked:        {}", report.ranked);
    println!("fetched:       {}", report.fetch.fetched);
    println!("skipped:       {}", report.fetch.skipped);
    println!("failed:        {}", report.fetch.failed);
    println!("matched items: {}", report.matched_items);
    println!("notifications: {}", report.notifications);
    println!("failed sends:  {}", report.failed_batches);

    Ok(())
}

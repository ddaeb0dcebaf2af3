mod cycle;
mod init;
mod serve;
mod subscribers;

use clap::{Arg, Command};
use hnotify::{config, Config};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const AUTHORS: &str = env!("CARGO_PKG_AUTHORS");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cmd().get_matches();

    // Without an explicit `--config` the default file in the working
    // directory is used if present, otherwise the built-in defaults.
    let mut config: Config = match matches.get_one::<String>("config") {
        Some(path) => config::load_from(path)?,
        None => config::load().unwrap_or_default(),
    };
    if let Some(level) = matches.get_one::<String>("verbosity") {
        config.tracing.level = level.parse()?;
    }

    match matches.subcommand() {
        Some(("serve", _)) => serve::run(config).await?,
        Some(("run", _)) => cycle::run(config).await?,
        Some(("init", m)) => init::run(m)?,
        Some(("subscribers", m)) => subscribers::run(m, &config)?,
        _ => unreachable!("subcommand is required"),
    }

    Ok(())
}

pub fn cmd() -> Command {
    Command::new("hnotify")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .infer_subcommands(true)
        .version(VERSION)
        .author(AUTHORS)
        .about("Email notifications for top-ranked feed items")
        .subcommand(serve::cmd())
        .subcommand(cycle::cmd())
        .subcommand(init::cmd())
        .subcommand(subscribers::cmd())
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .value_name("PATH")
                .global(true)
                .help("Path to the config file"),
        )
        .arg(
            Arg::new("verbosity")
                .long("verbosity")
                .short('v')
                .display_order(100)
                .value_name("level")
                .value_parser(["trace", "debug", "info", "warn", "error", "none"])
                .global(true)
                .help("Set the verbosity of the log output"),
        )
}

use std::path::PathBuf;

use anyhow::{Error, Result};
use clap::{Arg, ArgAction, ArgMatches};

use hnotify::{config, Config};

pub fn cmd() -> clap::Command {
    clap::Command::new("init")
        .display_order(30)
        .about("Write a config file with default values")
        .arg(
            Arg::new("path")
                .value_name("PATH")
                .help("Target file, defaults to hnotify.toml in the working directory"),
        )
        .arg(
            Arg::new("force")
                .long("force")
                .short('f')
                .action(ArgAction::SetTrue)
                .help("Overwrite an existing file"),
        )
}

pub fn run(matches: &ArgMatches) -> Result<()> {
    let path = matches
        .get_one::<String>("path")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(config::CONFIG_FILE));

    if path.exists() && !matches.get_flag("force") {
        return Err(Error::msg(format!(
            "{} already exists, use --force to overwrite",
            path.display()
        )));
    }

    config::save(&Config::default(), &path)?;
    println!("wrote default config to {}", path.display());
    Ok(())
}

use anyhow::{Error, Result};
use clap::{arg, ArgMatches};

use hnotify::keywords;
use hnotify::subscriber::{Subscriber, SubscriberStore};
use hnotify::{Config, Database};

pub fn cmd() -> clap::Command {
    clap::Command::new("subscribers")
        .subcommand_required(true)
        .display_order(40)
        .about("Inspect subscribers")
        .subcommand(clap::Command::new("list").about("Lists all subscribers"))
        .subcommand(
            clap::Command::new("show")
                .arg_required_else_help(true)
                .about("Shows a single subscriber")
                .arg(arg!(<email> "Subscriber email")),
        )
}

pub fn run(matches: &ArgMatches, config: &Config) -> Result<()> {
    let db = Database::open(&config.db_path)?;
    let store = SubscriberStore::new(&db)?;

    match matches.subcommand() {
        Some(("list", _)) => {
            let mut subscribers = store.list()?;
            subscribers.sort_by(|a, b| a.email.cmp(&b.email));
            println!(
                "{:<40} {:<8} {:>9} {:>6}  keywords",
                "email", "state", "threshold", "sent"
            );
            for s in &subscribers {
                println!(
                    "{:<40} {:<8} {:>9} {:>6}  {}",
                    s.email,
                    s.state().to_string(),
                    s.threshold,
                    s.sent_items.len(),
                    keywords::join(&s.keywords)
                );
            }
            println!("{} subscribers", subscribers.len());
        }
        Some(("show", m)) => {
            let email = m
                .get_one::<String>("email")
                .ok_or_else(|| Error::msg("email is required"))?;
            let subscriber = store
                .find_by_email(email)?
                .ok_or_else(|| Error::msg(format!("no subscriber with email {email}")))?;
            print_subscriber(&subscriber);
        }
        _ => unreachable!("subcommand is required"),
    }

    Ok(())
}

fn print_subscriber(s: &Subscriber) {
    println!("id:         {}", s.id);
    println!("email:      {}", s.email);
    println!("state:      {}", s.state());
    println!("threshold:  {}", s.threshold);
    println!("keywords:   {}", keywords::join(&s.keywords));
    println!("created at: {}", s.created_at);
    println!(
        "sent items: {}",
        s.sent_items
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );
}

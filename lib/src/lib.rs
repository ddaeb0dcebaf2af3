//! Email notifications for top-ranked feed items.
//!
//! A cycle fetches the current ranking, pulls every item concurrently and
//! emails each item once to the subscribers whose score threshold and
//! keyword filter it satisfies. Subscribers manage themselves through
//! single-use links sent to their inbox.

#[macro_use]
extern crate serde_derive;

pub mod config;
pub mod db;
pub mod email;
pub mod error;
pub mod feed;
pub mod fetch;
pub mod init;
pub mod keywords;
pub mod matching;
pub mod mock;
pub mod notify;
pub mod pipeline;
pub mod routes;
pub mod scheduler;
pub mod subscriber;
pub mod subscription;
pub mod token;
pub mod tracing;

#[cfg(feature = "axum")]
pub mod axum;

pub use config::Config;
pub use db::Database;
pub use error::{Error, ErrorKind, Result};

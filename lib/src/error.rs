use std::backtrace::Backtrace;
use std::fmt::{Display, Formatter};

pub type Result<T> = std::result::Result<T, Error>;

/// Message shown for any lifecycle link that fails validation, whether the
/// email is unknown or the token is wrong.
pub const INVALID_LINK_MESSAGE: &str = "Error: The link is not valid.";

/// Message shown for internal and transient failures.
pub const GENERIC_FAILURE_MESSAGE: &str = "Oops! An error occurred.";

#[derive(Debug)]
pub struct Error {
    pub kind: ErrorKind,
    pub backtrace: Backtrace,
}

impl std::error::Error for Error {}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            backtrace: Backtrace::capture(),
        }
    }

    pub fn category(&self) -> Category {
        self.kind.category()
    }

    /// Whether the error's own message can be shown to the person who caused
    /// it. Everything else is only available through the application logs.
    pub fn is_user_visible(&self) -> bool {
        matches!(
            self.category(),
            Category::Validation | Category::Authorization
        )
    }

    /// Text safe to put in a response body.
    pub fn user_message(&self) -> String {
        match (&self.kind, self.category()) {
            (ErrorKind::BadInput(msg), _) => msg.clone(),
            (_, Category::Validation) => self.kind.to_string(),
            (_, Category::Authorization) => INVALID_LINK_MESSAGE.to_string(),
            _ => GENERIC_FAILURE_MESSAGE.to_string(),
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind)?;
        if self.backtrace.status() == std::backtrace::BacktraceStatus::Captured {
            write!(f, ", {}", self.backtrace)?;
        }
        Ok(())
    }
}

/// Coarse classification deciding how an error is surfaced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Category {
    /// Bad user input. Shown to the user, nothing mutated.
    Validation,
    /// Token mismatch or missing record. Shown as a generic invalid link.
    Authorization,
    /// Store, config or programming failure. Logged with detail only.
    Internal,
    /// Network or upstream failure that may succeed on the next cycle.
    Transient,
}

#[derive(thiserror::Error, Debug)]
pub enum ErrorKind {
    #[error("unexpected error")]
    StdIoError(#[from] std::io::Error),

    #[error("config error: {0}")]
    ConfigError(#[from] config::ConfigError),

    #[error("reqwest error: {0}")]
    ReqwestError(#[from] reqwest::Error),
    #[error("feed responded with status {0}")]
    FeedStatus(reqwest::StatusCode),
    #[error("timed out: {0}")]
    Timeout(String),

    #[error("lettre email error: {0}")]
    LettreEmailError(#[from] lettre::error::Error),
    #[error("lettre smtp error: {0}")]
    LettreSmtpError(#[from] lettre::transport::smtp::Error),
    #[error("failed parsing email address: {0}")]
    EmailParseError(String),
    #[error("failed sending email through smtp: {0}")]
    EmailBadResponse(String),

    #[error("bad input: {0}")]
    BadInput(String),

    #[error("invalid link")]
    InvalidLink,

    #[error("subscriber with this email already exists: {0}")]
    SubscriberExists(String),

    #[error("db error: {0}")]
    DbError(String),
    #[error("sled db error: {0}")]
    SledError(#[from] sled::Error),

    #[error("pot decode error: {0}")]
    PotError(#[from] pot::Error),
    #[error("json decode error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("toml encode error: {0}")]
    TomlError(#[from] toml::ser::Error),
    #[error("template render error: {0}")]
    TemplateError(#[from] askama::Error),

    #[error("uuid error: {0}")]
    UuidError(#[from] uuid::Error),
    #[error("url parse error: {0}")]
    UrlParseError(#[from] url::ParseError),

    #[error("other error: {0}")]
    Other(String),
}

impl ErrorKind {
    pub fn category(&self) -> Category {
        match self {
            ErrorKind::BadInput(_) => Category::Validation,
            ErrorKind::InvalidLink => Category::Authorization,
            ErrorKind::ReqwestError(_)
            | ErrorKind::FeedStatus(_)
            | ErrorKind::Timeout(_)
            | ErrorKind::JsonError(_)
            | ErrorKind::LettreSmtpError(_)
            | ErrorKind::EmailBadResponse(_) => Category::Transient,
            _ => Category::Internal,
        }
    }
}

impl From<ErrorKind> for Error {
    fn from(k: ErrorKind) -> Self {
        Self::new(k)
    }
}

impl From<String> for Error {
    fn from(e: String) -> Self {
        Self::new(ErrorKind::Other(e))
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::new(ErrorKind::StdIoError(e))
    }
}

impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Self::new(ErrorKind::ConfigError(e))
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Self::new(ErrorKind::ReqwestError(e))
    }
}

impl From<lettre::error::Error> for Error {
    fn from(e: lettre::error::Error) -> Self {
        Self::new(ErrorKind::LettreEmailError(e))
    }
}

impl From<lettre::transport::smtp::Error> for Error {
    fn from(e: lettre::transport::smtp::Error) -> Self {
        Self::new(ErrorKind::LettreSmtpError(e))
    }
}

impl From<sled::Error> for Error {
    fn from(e: sled::Error) -> Self {
        Self::new(ErrorKind::SledError(e))
    }
}

impl From<pot::Error> for Error {
    fn from(e: pot::Error) -> Self {
        Self::new(ErrorKind::PotError(e))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::new(ErrorKind::JsonError(e))
    }
}

impl From<toml::ser::Error> for Error {
    fn from(e: toml::ser::Error) -> Self {
        Self::new(ErrorKind::TomlError(e))
    }
}

impl From<askama::Error> for Error {
    fn from(e: askama::Error) -> Self {
        Self::new(ErrorKind::TemplateError(e))
    }
}

impl From<uuid::Error> for Error {
    fn from(e: uuid::Error) -> Self {
        Self::new(ErrorKind::UuidError(e))
    }
}

impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Self::new(ErrorKind::UrlParseError(e))
    }
}

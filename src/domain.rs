use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::io::Error;
use std::num::NonZeroUsize;
use std::time::Duration;

use derive_setters::Setters;

use crate::pager::PagerConfig;

/// One item of a fetched collection. The backend owns the shape, we only display it.
pub type Record = serde_json::Value;

/// Query object handed to the backend. Empty means "no filter".
pub type Filter = BTreeMap<String, serde_json::Value>;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";
pub const DEFAULT_TABLE: &str = "products";
pub const DEFAULT_PAGE_SIZE: NonZeroUsize = NonZeroUsize::new(10).unwrap();

pub const HELP_TEXT: &str = "\
n / → / PgDn   next page
p / ← / PgUp   previous page
j / ↓          select next record
k / ↑          select previous record
r              refresh from backend
c              copy selected record (json)
?              show this help
Esc            close popup
q              quit";

#[derive(Debug)]
pub enum PVError {
    IoError(Error),
    Network(String),
    Backend { status: u16, body: String },
    Decode(String),
    InvalidConfig(String),
    FetchAborted,
}

impl Display for PVError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            PVError::IoError(e) => write!(f, "io error: {e}"),
            PVError::Network(msg) => write!(f, "network error: {msg}"),
            PVError::Backend { status, body } => {
                write!(f, "backend answered with status {status}")?;
                if !body.is_empty() {
                    write!(f, ": {body}")?;
                }
                Ok(())
            }
            PVError::Decode(msg) => write!(f, "invalid response: {msg}"),
            PVError::InvalidConfig(msg) => write!(f, "invalid configuration: {msg}"),
            PVError::FetchAborted => write!(f, "fetch stopped without an answer"),
        }
    }
}

impl std::error::Error for PVError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PVError::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<Error> for PVError {
    fn from(err: Error) -> Self {
        PVError::IoError(err)
    }
}

impl From<reqwest::Error> for PVError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            PVError::Decode(err.to_string())
        } else {
            PVError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for PVError {
    fn from(err: serde_json::Error) -> Self {
        PVError::Decode(err.to_string())
    }
}

#[derive(Debug, Clone, Setters)]
#[setters(prefix = "with_", into)]
pub struct PVConfig {
    pub base_url: String,
    pub table: String,
    pub filter: Filter,
    pub pager: PagerConfig,
    pub request_timeout: Duration,
    pub max_column_width: usize,
    pub event_poll_time: u64,
}

impl Default for PVConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            table: DEFAULT_TABLE.to_string(),
            filter: Filter::new(),
            pager: PagerConfig::default(),
            request_timeout: Duration::from_secs(30),
            max_column_width: 40,
            event_poll_time: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message {
    Quit,
    NextPage,
    PrevPage,
    MoveUp,
    MoveDown,
    Refresh,
    CopyRecord,
    Help,
    Exit,
}

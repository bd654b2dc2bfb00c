use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Generic(&'static str),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("could not load configuration: {0}")]
    Config(String),
    #[error("invalid value for {key}: {value}")]
    InvalidFilterValue { key: String, value: String },
    #[error("filter slot {0} out of range (max {max})", max = crate::filter::MAX_FILTERS - 1)]
    InvalidFilterSlot(usize),
    #[error("worker {0} failed: {1}")]
    Worker(usize, &'static str),
}

impl From<&'static str> for Error {
    fn from(s: &'static str) -> Self {
        Error::Generic(s)
    }
}

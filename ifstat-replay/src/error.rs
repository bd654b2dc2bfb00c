use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Generic(&'static str),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("pcap error: {0}")]
    Pcap(String),
    #[error(transparent)]
    Ifstat(#[from] libifstat::Error),
}

impl<I: std::fmt::Debug> From<pcap_parser::PcapError<I>> for Error {
    fn from(e: pcap_parser::PcapError<I>) -> Self {
        Error::Pcap(format!("{:?}", e))
    }
}

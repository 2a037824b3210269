use hyper::http;
use std::{io, sync};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),
    #[error("The recording has already been started")]
    AlreadyRunning,
    #[error("Invalid encoder state: {0}")]
    InvalidState(&'static str),
    #[error("Invalid scenario: {0}")]
    InvalidScenario(String),
    #[error("Xml error: {0}")]
    XmlError(#[from] quick_xml::Error),
    #[error("IoError: {0}")]
    IoError(#[from] io::Error),
    #[error("Watch error: {0}")]
    WatchError(#[from] notify::Error),
    #[error("The lock was poisoned")]
    PoisonedLock,
    #[error("The recording thread panicked")]
    ThreadPanicked,
    #[error("Invalid header name")]
    InvalidHeaderName,
    #[error("Invalid header value")]
    InvalidHeaderValue,
    #[error("Invalid uri: {0}")]
    InvalidUri(String),
    #[error("Hyper error: {0}")]
    HyperError(#[from] hyper::Error),
    #[error("Http Error: {0}")]
    HttpError(#[from] http::Error),
}

impl<T> From<sync::PoisonError<T>> for Error {
    fn from(_: sync::PoisonError<T>) -> Self {
        Error::PoisonedLock
    }
}

impl From<quick_xml::events::attributes::AttrError> for Error {
    fn from(e: quick_xml::events::attributes::AttrError) -> Self {
        Error::XmlError(e.into())
    }
}

impl From<hyper::header::InvalidHeaderName> for Error {
    fn from(_: hyper::header::InvalidHeaderName) -> Self {
        Error::InvalidHeaderName
    }
}

impl From<hyper::header::InvalidHeaderValue> for Error {
    fn from(_: hyper::header::InvalidHeaderValue) -> Self {
        Error::InvalidHeaderValue
    }
}

impl From<http::uri::InvalidUri> for Error {
    fn from(e: http::uri::InvalidUri) -> Self {
        Error::InvalidUri(e.to_string())
    }
}

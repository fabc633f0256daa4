use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("bus error: {0}")]
    Bus(String),
    #[error("sensor timeout")]
    Timeout,
    #[error("{0} not ready")]
    NotReady(&'static str),
    #[error("{0} disconnected")]
    Disconnected(&'static str),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;

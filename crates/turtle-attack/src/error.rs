use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AttackError>;

/// Failures of a single attack attempt, or of the attack setup itself.
///
/// Everything but `InvalidTarget` and `InvalidMethod` is local to one worker
/// attempt: it is reported as a `worker/error` event and the slot respawns.
#[derive(Error, Debug)]
pub enum AttackError {
    #[error("dial {addr:?}: {source}")]
    Dial {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("setup tcp conn: {0}")]
    Setup(#[source] io::Error),

    #[error("{stage}: {source}")]
    Write {
        stage: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("read from peer: {0}")]
    Read(#[source] io::Error),

    #[error("connection closed by peer")]
    PeerClosed,

    #[error("request: {0}")]
    Request(#[from] hyper::Error),

    #[error("invalid target: {0}")]
    InvalidTarget(String),

    #[error("invalid HTTP method {0:?}")]
    InvalidMethod(String),
}

impl AttackError {
    pub(crate) fn write(stage: &'static str, source: io::Error) -> Self {
        AttackError::Write { stage, source }
    }
}

use thiserror::Error;

/// Distinct failure kinds when loading a generated view script.
///
/// The loader reports compile failures, a script that does not resolve to
/// the expected view, and capability-interface mismatches separately so the
/// operator knows whether to regenerate the code or just re-import it.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Compile error: {0}")]
    Compile(String),

    #[error("View not found: {0}")]
    MissingView(String),

    #[error("Capability mismatch: {0}")]
    CapabilityMismatch(String),
}

#[derive(Error, Debug)]
pub enum Error {
    /// Driver unreachable or the remote session is gone. Forces the engine
    /// back to Disconnected.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The screen yielded zero usable elements. Aborts the analyse pass
    /// without touching the view cache.
    #[error("Discovery error: {0}")]
    Discovery(String),

    /// The AI backend rejected a prompt. Aborts the analyse pass.
    #[error("Generation error: {0}")]
    Generation(String),

    /// Generated code could not be turned into a bound view. Blocks execute
    /// until a fresh import succeeds.
    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    /// Action text failed the grammar. Rejected before any dispatch attempt.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The action raised during dispatch. Recorded on the action record and
    /// re-raised to the caller.
    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// True for errors that mean the driver session no longer exists.
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, Error::Connection(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

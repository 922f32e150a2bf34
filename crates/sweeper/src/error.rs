use thiserror::Error;

/// Errors that can occur in this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// The sweeper was already started.
    #[error("sweeper already started")]
    AlreadyStarted,
}

/// Errors that can occur while restoring a state snapshot.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("state snapshot has wrong length: expected {expected} bytes, got {actual}")]
    WrongLength { expected: usize, actual: usize },
}

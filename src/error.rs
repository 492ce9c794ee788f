use thiserror::Error;

/// Convenience result type for stage construction.
pub type ConfigResult<T> = Result<T, StageConfigError>;

/// Error type returned when a stage is configured with invalid parameters.
///
/// Runtime failures are never reported through this type: a failing callback or upstream
/// surfaces the caller's own error value unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StageConfigError {
    /// A batch stage was asked to group items into batches of zero.
    #[error("batch size must be > 0")]
    ZeroBatchSize,

    /// A stage name was provided but is empty or whitespace only.
    #[error("stage name must not be blank")]
    BlankName,
}

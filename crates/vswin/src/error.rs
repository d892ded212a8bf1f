//! # Error Types

/// `vswin` result type.
pub type Result<T> = std::result::Result<T, Error>;

/// `vswin` errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// Invalid argument to an operation.
    #[error("invalid argument '{arg}': {reason}")]
    InvalidArgument {
        /// Argument name.
        arg: &'static str,
        /// Why it's invalid.
        reason: String,
    },

    /// Invalid module configuration.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Construct an [`Error::InvalidArgument`].
    pub fn invalid_argument<S: Into<String>>(
        arg: &'static str,
        reason: S,
    ) -> Self {
        Self::InvalidArgument {
            arg,
            reason: reason.into(),
        }
    }
}

use thiserror::Error;

#[derive(Debug, Error)]
#[error(transparent)]
pub struct Error(Box<ErrorKind>);

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        self.0.as_ref()
    }

    pub fn into_kind(self) -> ErrorKind {
        *self.0
    }

    pub fn invalid_arg(name: impl Into<String>, message: impl Into<String>) -> Error {
        Error(
            ErrorKind::InvalidArgument {
                name: name.into(),
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn invalid_operation(name: impl Into<String>) -> Error {
        Error(ErrorKind::InvalidOperation { name: name.into() }.into())
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Error {
        Error(
            ErrorKind::Io {
                context: context.into(),
                source,
            }
            .into(),
        )
    }

    pub fn spawn(role: impl Into<String>, source: std::io::Error) -> Error {
        Error(
            ErrorKind::Spawn {
                role: role.into(),
                source,
            }
            .into(),
        )
    }

    pub fn worker_panicked(worker: usize) -> Error {
        Error(ErrorKind::WorkerPanicked { worker }.into())
    }

    pub fn source_panicked() -> Error {
        Error(ErrorKind::SourcePanicked.into())
    }

    pub fn tracker_panicked() -> Error {
        Error(ErrorKind::TrackerPanicked.into())
    }

    /// Returns `true` for errors that indicate a broken pipeline run
    /// (a panicked thread), as opposed to a rejected request.
    pub fn is_structural(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::WorkerPanicked { .. } | ErrorKind::SourcePanicked | ErrorKind::TrackerPanicked
        )
    }
}

#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("invalid argument {name}: {message}")]
    InvalidArgument { name: String, message: String },

    #[error("invalid operation {name}")]
    InvalidOperation { name: String },

    #[error("IO error for '{context}': {source}")]
    Io {
        context: String,
        source: std::io::Error,
    },

    #[error("failed to spawn {role} thread: {source}")]
    Spawn {
        role: String,
        source: std::io::Error,
    },

    #[error("worker {worker} panicked")]
    WorkerPanicked { worker: usize },

    #[error("source panicked")]
    SourcePanicked,

    #[error("completion tracker panicked")]
    TrackerPanicked,
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error(kind.into())
    }
}

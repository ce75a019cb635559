use std::path::PathBuf;

/// Discriminated error type, one variant per row of the error kind table:
/// surfacing policy lives at the call site (print + exit code in `main`),
/// not in this type.
#[derive(thiserror::Error, Debug)]
pub enum MydockerError {
    #[error("{0}")]
    UserInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("system call failed: {context}: {source}")]
    SystemCall {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("persistence error at {path}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("no free addresses in subnet")]
    NoFreeAddresses,
}

pub type Result<T> = std::result::Result<T, MydockerError>;

impl MydockerError {
    pub fn system_call(context: impl Into<String>, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        MydockerError::SystemCall {
            context: context.into(),
            source: Box::new(source),
        }
    }

    pub fn persistence(path: impl Into<PathBuf>, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        MydockerError::Persistence {
            path: path.into(),
            source: Box::new(source),
        }
    }
}

impl From<nix::Error> for MydockerError {
    fn from(err: nix::Error) -> Self {
        MydockerError::system_call("syscall", err)
    }
}

/// `stop` on an already-dead pid, or `rm` of already-missing state, is a
/// benign race rather than a failure: the caller treats it as success.
/// This mirrors the original's `strings.Contains(err.Error(), "no such process")`.
pub fn is_no_such_process(err: &nix::Error) -> bool {
    matches!(err, nix::Error::ESRCH)
}

pub fn ignore_not_found(result: std::io::Result<()>) -> std::io::Result<()> {
    match result {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

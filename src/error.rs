use thiserror::Error;

#[derive(Error, Debug)]
pub enum SqlRagError {
    #[error("Invalid input: {0}")]
    Input(String),

    #[error("Registry load error: {0}")]
    RegistryLoad(String),

    #[error("Retrieval error: {0}")]
    Retrieval(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unexpected error: {0}")]
    Unclassified(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Stage a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Input,
    RegistryLoad,
    Retrieval,
    Generation,
    Execution,
    Config,
    Unclassified,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Input => "input",
            ErrorKind::RegistryLoad => "registry_load",
            ErrorKind::Retrieval => "retrieval",
            ErrorKind::Generation => "generation",
            ErrorKind::Execution => "execution",
            ErrorKind::Config => "config",
            ErrorKind::Unclassified => "unclassified",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl SqlRagError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SqlRagError::Input(_) => ErrorKind::Input,
            SqlRagError::RegistryLoad(_) => ErrorKind::RegistryLoad,
            SqlRagError::Retrieval(_) => ErrorKind::Retrieval,
            SqlRagError::Generation(_) => ErrorKind::Generation,
            SqlRagError::Execution(_) => ErrorKind::Execution,
            SqlRagError::Config(_) => ErrorKind::Config,
            SqlRagError::Unclassified(_) | SqlRagError::Io(_) | SqlRagError::Json(_) => {
                ErrorKind::Unclassified
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, SqlRagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lower_level_errors_are_unclassified() {
        let io = SqlRagError::from(std::io::Error::new(std::io::ErrorKind::Other, "boom"));
        assert_eq!(io.kind(), ErrorKind::Unclassified);

        let json = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert_eq!(SqlRagError::from(json).kind(), ErrorKind::Unclassified);
    }

    #[test]
    fn test_stage_errors_keep_their_cause() {
        let err = SqlRagError::Execution("Unknown column 'x' in 'field list'".to_string());
        assert_eq!(err.kind(), ErrorKind::Execution);
        assert!(err.to_string().contains("Unknown column 'x'"));
    }
}

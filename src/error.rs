use crate::harness::ThreadRole;

pub type HarnessResult<T> = Result<T, HarnessError>;

#[derive(thiserror::Error, Debug)]
pub enum HarnessError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("library error: {0}")]
    Library(String),

    #[error("encode error: {0}")]
    Encode(String),

    #[error("failed to spawn {role} thread: {source}")]
    ThreadSpawn {
        role: ThreadRole,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} thread panicked")]
    ThreadPanicked(ThreadRole),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HarnessError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn library(msg: impl Into<String>) -> Self {
        Self::Library(msg.into())
    }

    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(
            HarnessError::validation("x")
                .to_string()
                .contains("validation error:")
        );
        assert!(
            HarnessError::library("x")
                .to_string()
                .contains("library error:")
        );
        assert!(HarnessError::encode("x").to_string().contains("encode error:"));
    }

    #[test]
    fn thread_errors_name_the_role() {
        let err = HarnessError::ThreadPanicked(ThreadRole::BoundsWait);
        assert_eq!(err.to_string(), "bounds query (wait) thread panicked");

        let err = HarnessError::ThreadSpawn {
            role: ThreadRole::Render,
            source: std::io::Error::other("no threads left"),
        };
        assert!(err.to_string().contains("render"));
        assert!(err.to_string().contains("no threads left"));
    }

    #[test]
    fn other_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = HarnessError::Other(anyhow::Error::new(base));
        assert!(err.to_string().contains("boom"));
    }
}

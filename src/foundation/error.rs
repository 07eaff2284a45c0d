pub type DitherResult<T> = Result<T, DitherError>;

#[derive(thiserror::Error, Debug)]
pub enum DitherError {
    #[error("validation error: {0}")]
    Validation(String),

    /// No compatible parallel/shader context. Never fatal to a session: the orchestrator falls
    /// back to the CPU path.
    #[error("initialization failure: {0}")]
    Initialization(String),

    #[error("frame processing failure: {0}")]
    FrameProcessing(String),

    #[error("worker protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DitherError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn initialization(msg: impl Into<String>) -> Self {
        Self::Initialization(msg.into())
    }

    pub fn frame_processing(msg: impl Into<String>) -> Self {
        Self::FrameProcessing(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    pub fn is_initialization(&self) -> bool {
        matches!(self, Self::Initialization(_))
    }
}

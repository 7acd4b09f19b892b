use thiserror::Error;

#[derive(Debug, Error)]
pub enum FftError {
    #[error("Invalid domain for {component}: {reason}")]
    InvalidDomain { component: &'static str, reason: String },

    #[error("Invalid boundary on axis {axis}: periodic must be paired with periodic")]
    InvalidBoundary { axis: usize },

    #[error("FFT backend error in {component}: {reason}")]
    Backend { component: &'static str, reason: String },

    #[error("Out of memory: failed to allocate {bytes} bytes for {component}")]
    OutOfMemory { component: &'static str, bytes: usize },
}

impl FftError {
    pub(crate) fn invalid_domain(component: &'static str, reason: impl Into<String>) -> Self {
        FftError::InvalidDomain {
            component,
            reason: reason.into(),
        }
    }

    pub(crate) fn backend(component: &'static str, reason: impl Into<String>) -> Self {
        FftError::Backend {
            component,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, FftError>;

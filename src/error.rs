//! Error handling for the uEye control layer

use std::time::Duration;

use crate::common::CameraStatus;
use crate::driver::ErrorCode;

/// Result type for camera operations
pub type Result<T> = std::result::Result<T, UeyeError>;

/// Errors that can occur while driving a camera
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum UeyeError {
    /// No device answered the open request (absent, unplugged, or claimed elsewhere)
    #[error("camera not connected: no device answered the open request")]
    NotConnected,
    /// The driver rejected a call with a non-success return code
    #[error("driver call failed: {code}")]
    Driver {
        /// Raw driver return code
        code: ErrorCode,
    },
    /// A caller-supplied value failed a local range or type check
    #[error("invalid value: {0}")]
    Validation(String),
    /// The wait for a completed frame elapsed with nothing ready
    #[error("timed out after {timeout:?} waiting for a frame")]
    Timeout {
        /// Wait duration that elapsed
        timeout: Duration,
    },
    /// The session was already opened once; sessions are single-shot
    #[error("camera session already opened")]
    AlreadyOpen,
    /// The operation needs a further-along session state
    #[error("camera not ready: session status is {0}")]
    NotReady(CameraStatus),
}

impl UeyeError {
    /// True when the error carries the given driver return code.
    pub fn is_code(&self, code: ErrorCode) -> bool {
        matches!(self, UeyeError::Driver { code: c } if *c == code)
    }
}

impl From<ErrorCode> for UeyeError {
    fn from(code: ErrorCode) -> Self {
        UeyeError::Driver { code }
    }
}

/// Maps the result of a frame wait. The timeout code keeps its own error
/// kind, carrying the wait duration that actually elapsed; every other
/// non-success code surfaces as a generic driver failure.
pub(crate) fn classify_wait<T>(
    result: std::result::Result<T, ErrorCode>,
    timeout: Duration,
) -> Result<T> {
    result.map_err(|code| {
        if code == ErrorCode::TIMED_OUT {
            UeyeError::Timeout { timeout }
        } else {
            UeyeError::Driver { code }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_code_classifies_as_timeout() {
        let waited = Duration::from_millis(250);
        let err = classify_wait::<()>(Err(ErrorCode::TIMED_OUT), waited).unwrap_err();
        assert_eq!(err, UeyeError::Timeout { timeout: waited });
    }

    #[test]
    fn test_other_codes_classify_as_driver() {
        let err = classify_wait::<()>(Err(ErrorCode::NO_SUCCESS), Duration::from_secs(1))
            .unwrap_err();
        assert!(err.is_code(ErrorCode::NO_SUCCESS));
    }

    #[test]
    fn test_display_includes_code_description() {
        let err = UeyeError::Driver {
            code: ErrorCode::CANT_OPEN_DEVICE,
        };
        let text = err.to_string();
        assert!(text.contains("3"), "unexpected display: {text}");
    }
}

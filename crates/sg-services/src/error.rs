use std::borrow::Cow;

use sg_core::security::hybrid::DecryptError;
use sg_core::soar::SoarError;
use sg_db::DbError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Failed to decrypt request: {0}")]
    Decrypt(#[from] DecryptError),
    #[error("{0}")]
    Soar(#[from] SoarError),
    #[error("{0}")]
    Db(#[from] DbError),
}

impl ServiceError {
    /// Primary output channel for the client: the process output for `soar`
    /// failures, the error message otherwise.
    pub fn output(&self) -> Cow<'_, [u8]> {
        match self {
            ServiceError::Soar(e) => e.output(),
            other => Cow::Owned(other.to_string().into_bytes()),
        }
    }

    /// Log channel for the client.
    pub fn loginfo(&self) -> Cow<'_, [u8]> {
        match self {
            ServiceError::Soar(e) => e.loginfo(),
            other => Cow::Owned(other.to_string().into_bytes()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_reports_message_on_both_channels() {
        let err = ServiceError::from(SoarError::DisallowedArgument {
            flag: "-config".to_string(),
        });
        assert!(String::from_utf8_lossy(&err.output()).contains("-config"));
        assert_eq!(err.output(), err.loginfo());
    }

    #[test]
    fn test_decrypt_failure_is_reported_as_message() {
        let err = ServiceError::from(DecryptError::Padding);
        assert_eq!(
            &*err.output(),
            b"Failed to decrypt request: invalid padding in decrypted body"
        );
    }
}

//! Failure classification for the endpoint pool.

use alloy::transports::{RpcError, TransportErrorKind};

use crate::retry::{AttemptError, RetryError};

/// Errors that may succeed on another endpoint.
///
/// Transient failures rotate the pool. Anything else is a well-formed answer
/// from the node and is returned to the caller as-is.
pub trait TransientError {
    /// Whether the failure is infrastructure-level (unreachable, rate
    /// limited, 5xx, timeout).
    fn is_transient(&self) -> bool;
}

impl TransientError for RpcError<TransportErrorKind> {
    fn is_transient(&self) -> bool {
        match self {
            RpcError::Transport(kind) => match kind {
                TransportErrorKind::BackendGone => true,
                TransportErrorKind::PubsubUnavailable => true,
                TransportErrorKind::MissingBatchResponse(_) => true,
                TransportErrorKind::HttpError(http) => {
                    http.status == 429 || (500..600).contains(&http.status)
                }
                // connection refused, DNS failure and client timeouts
                TransportErrorKind::Custom(_) => true,
                _ => false,
            },
            RpcError::ErrorResp(payload) => {
                payload.code == 429 || is_rate_limit_message(&payload.message)
            }
            RpcError::NullResp => true,
            RpcError::DeserError { text, .. } => is_rate_limit_message(text),
            _ => false,
        }
    }
}

impl<E: TransientError> TransientError for RetryError<E> {
    fn is_transient(&self) -> bool {
        match &self.last {
            AttemptError::Timeout(_) => true,
            AttemptError::Failed(err) => err.is_transient(),
        }
    }
}

fn is_rate_limit_message(message: &str) -> bool {
    let lowered = message.to_ascii_lowercase();
    lowered.contains("rate limit")
        || lowered.contains("too many requests")
        || lowered.contains("request limit")
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::rpc::json_rpc::ErrorPayload;
    use alloy::transports::HttpError;

    fn http(status: u16) -> RpcError<TransportErrorKind> {
        RpcError::Transport(TransportErrorKind::HttpError(HttpError {
            status,
            body: String::new(),
        }))
    }

    fn error_resp(code: i64, message: &str) -> RpcError<TransportErrorKind> {
        RpcError::ErrorResp(ErrorPayload {
            code,
            message: message.to_string().into(),
            data: None,
        })
    }

    #[test]
    fn test_http_status_classification() {
        assert!(http(429).is_transient());
        assert!(http(502).is_transient());
        assert!(http(503).is_transient());
        assert!(!http(400).is_transient());
        assert!(!http(401).is_transient());
    }

    #[test]
    fn test_network_failures_are_transient() {
        assert!(RpcError::<TransportErrorKind>::Transport(TransportErrorKind::BackendGone)
            .is_transient());
        assert!(TransportErrorKind::custom_str("connection refused").is_transient());
    }

    #[test]
    fn test_application_errors_are_not_transient() {
        assert!(!error_resp(-32602, "invalid params").is_transient());
        assert!(!error_resp(3, "execution reverted").is_transient());
        assert!(error_resp(-32005, "Rate limit exceeded").is_transient());
    }

    #[test]
    fn test_retry_error_delegates() {
        let timeout: RetryError<RpcError<TransportErrorKind>> = RetryError {
            name: "getLogs".to_string(),
            attempts: 5,
            last: AttemptError::Timeout(std::time::Duration::from_secs(20)),
        };
        assert!(timeout.is_transient());

        let rejected = RetryError {
            name: "getLogs".to_string(),
            attempts: 5,
            last: AttemptError::Failed(error_resp(-32602, "invalid params")),
        };
        assert!(!rejected.is_transient());
    }
}

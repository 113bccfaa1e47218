//! Error types and classification for the aggregation core

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for aggregator operations
pub type Result<T> = std::result::Result<T, AdapterError>;

/// Main error type for adapter and aggregation operations
#[derive(Debug, Error)]
pub enum AdapterError {
    /// Connection-related errors
    #[error("Connection failed for game {game_id}: {reason}")]
    ConnectionFailed {
        /// The game whose backend failed to connect
        game_id: String,
        /// Reason for the failure
        reason: String,
    },

    /// Connection timeout during fetch or probe operations
    #[error("Connection timeout for game {game_id} after {timeout_ms}ms")]
    ConnectionTimeout {
        /// The game whose backend timed out
        game_id: String,
        /// Timeout duration in milliseconds
        timeout_ms: u64,
    },

    /// Authentication failure against a game backend
    #[error("Authentication failed for game {game_id}")]
    AuthenticationFailed {
        /// The game where auth failed
        game_id: String,
    },

    /// Rate limit exceeded on a game backend API
    #[error("Rate limit exceeded for game {game_id}")]
    RateLimitExceeded {
        /// The game that rate limited us
        game_id: String,
    },

    /// Payload failed an integrity check (corruption, impossible values)
    #[error("Data integrity violation: {reason}")]
    DataCorruption {
        /// What was wrong with the data
        reason: String,
    },

    /// JSON parsing error from a backend response
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Required field missing from a backend payload
    #[error("Missing required field: {field}")]
    MissingField {
        /// The field that was missing
        field: String,
    },

    /// A domain rule was violated (ownership conflict, illegal state)
    #[error("Business rule violation: {0}")]
    RuleViolation(String),

    /// Non-success HTTP status surfaced by a backend
    #[error("Upstream returned status {status}: {body}")]
    UpstreamStatus {
        /// HTTP status code
        status: u16,
        /// Response body or summary
        body: String,
    },

    /// Configuration error in adapter or engine settings
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A second adapter was registered for the same game
    #[error("Adapter already registered for game {game_id}")]
    AlreadyRegistered {
        /// The game that already has a registration
        game_id: String,
    },

    /// Sync was started twice for the same game
    #[error("Sync already started for game {game_id}")]
    SyncAlreadyStarted {
        /// The game whose sync is already running
        game_id: String,
    },

    /// No active registration exists for the game
    #[error("No registered adapter for game {game_id}")]
    GameNotFound {
        /// The unknown game id
        game_id: String,
    },

    /// Circuit breaker fast-fail, distinct from any error category
    #[error("Circuit breaker open for service {service}")]
    CircuitBreakerOpen {
        /// The service whose circuit breaker is open
        service: String,
    },

    /// Validation error (payload rejected by the rule pipeline)
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// Not supported operation
    #[error("Operation not supported: {0}")]
    NotSupported(String),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// Generic errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// The five-way error taxonomy used by the retry executor and monitor
///
/// Classification is pure and deterministic: the same error always maps to
/// the same category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Transport-level failures: timeouts, refused connections, DNS
    Network,
    /// Credential and permission failures
    Auth,
    /// Corrupt, malformed or internally inconsistent data
    DataIntegrity,
    /// Domain rules violated by otherwise well-formed data
    BusinessLogic,
    /// Anything else coming from an upstream service
    ExternalService,
}

impl ErrorCategory {
    /// Classify free-text errors by message and optional HTTP status.
    ///
    /// Precedence order: network, auth, data integrity, business logic;
    /// anything unmatched is an external-service error.
    pub fn classify(message: &str, status: Option<u16>) -> Self {
        let msg = message.to_ascii_lowercase();

        if matches!(status, Some(408) | Some(502) | Some(503) | Some(504))
            || contains_any(
                &msg,
                &[
                    "timeout",
                    "timed out",
                    "connection",
                    "network",
                    "unreachable",
                    "dns",
                    "socket",
                    "econnrefused",
                ],
            )
        {
            return Self::Network;
        }

        if matches!(status, Some(401) | Some(403))
            || contains_any(
                &msg,
                &[
                    "unauthorized",
                    "forbidden",
                    "auth",
                    "api key",
                    "token expired",
                    "credential",
                ],
            )
        {
            return Self::Auth;
        }

        if contains_any(
            &msg,
            &[
                "corrupt",
                "checksum",
                "integrity",
                "malformed",
                "parse",
                "invalid data",
                "missing field",
            ],
        ) {
            return Self::DataIntegrity;
        }

        if matches!(status, Some(409) | Some(422))
            || contains_any(
                &msg,
                &["insufficient", "not allowed", "rule", "conflict", "duplicate"],
            )
        {
            return Self::BusinessLogic;
        }

        Self::ExternalService
    }

    /// Stable snake_case name, used as a metrics key
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Auth => "auth",
            Self::DataIntegrity => "data_integrity",
            Self::BusinessLogic => "business_logic",
            Self::ExternalService => "external_service",
        }
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

impl AdapterError {
    /// Map this error to exactly one [`ErrorCategory`].
    ///
    /// Structured variants map directly; free-text variants fall back to the
    /// message/status heuristics. `CircuitBreakerOpen` is a fast-fail signal
    /// rather than a classification, but for accounting purposes it counts
    /// against the external service.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ConnectionFailed { .. } | Self::ConnectionTimeout { .. } => {
                ErrorCategory::Network
            }
            Self::AuthenticationFailed { .. } => ErrorCategory::Auth,
            Self::DataCorruption { .. } | Self::JsonParse(_) | Self::MissingField { .. } => {
                ErrorCategory::DataIntegrity
            }
            Self::RuleViolation(_)
            | Self::AlreadyRegistered { .. }
            | Self::SyncAlreadyStarted { .. }
            | Self::ValidationFailed(_) => ErrorCategory::BusinessLogic,
            Self::UpstreamStatus { status, body } => {
                ErrorCategory::classify(body, Some(*status))
            }
            Self::Internal(msg) | Self::Configuration(msg) | Self::NotSupported(msg) => {
                ErrorCategory::classify(msg, None)
            }
            Self::Other(err) => ErrorCategory::classify(&err.to_string(), None),
            Self::RateLimitExceeded { .. }
            | Self::GameNotFound { .. }
            | Self::CircuitBreakerOpen { .. } => ErrorCategory::ExternalService,
        }
    }

    /// Whether this error is the circuit-breaker fast-fail signal
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitBreakerOpen { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_variants_map_directly() {
        let err = AdapterError::ConnectionTimeout {
            game_id: "g1".to_string(),
            timeout_ms: 5000,
        };
        assert_eq!(err.category(), ErrorCategory::Network);

        let err = AdapterError::AuthenticationFailed {
            game_id: "g1".to_string(),
        };
        assert_eq!(err.category(), ErrorCategory::Auth);

        let err = AdapterError::DataCorruption {
            reason: "asset owner empty".to_string(),
        };
        assert_eq!(err.category(), ErrorCategory::DataIntegrity);

        let err = AdapterError::RuleViolation("asset owned by two players".to_string());
        assert_eq!(err.category(), ErrorCategory::BusinessLogic);
    }

    #[test]
    fn classification_precedence_network_first() {
        // "timeout" (network) wins over "auth" appearing later in precedence
        assert_eq!(
            ErrorCategory::classify("auth service timeout", None),
            ErrorCategory::Network
        );
        assert_eq!(
            ErrorCategory::classify("token expired", None),
            ErrorCategory::Auth
        );
        assert_eq!(
            ErrorCategory::classify("checksum mismatch in payload", None),
            ErrorCategory::DataIntegrity
        );
        assert_eq!(
            ErrorCategory::classify("insufficient balance", None),
            ErrorCategory::BusinessLogic
        );
        assert_eq!(
            ErrorCategory::classify("something odd happened", None),
            ErrorCategory::ExternalService
        );
    }

    #[test]
    fn classification_uses_http_status() {
        assert_eq!(
            ErrorCategory::classify("", Some(503)),
            ErrorCategory::Network
        );
        assert_eq!(ErrorCategory::classify("", Some(401)), ErrorCategory::Auth);
        assert_eq!(
            ErrorCategory::classify("", Some(422)),
            ErrorCategory::BusinessLogic
        );
        assert_eq!(
            ErrorCategory::classify("", Some(500)),
            ErrorCategory::ExternalService
        );
    }

    #[test]
    fn classification_is_deterministic() {
        let a = ErrorCategory::classify("Connection refused by host", None);
        let b = ErrorCategory::classify("Connection refused by host", None);
        assert_eq!(a, b);
    }
}

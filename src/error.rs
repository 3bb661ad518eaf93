//! Crate-wide error taxonomy.
//!
//! Every fallible operation in this crate returns [`FleetError`]. Failures
//! from the container-runtime client ([`ClientError`]) are converted into the
//! taxonomy at component boundaries and never propagate raw.

use thiserror::Error;

/// Result type for fleet operations.
pub type Result<T> = std::result::Result<T, FleetError>;

/// Errors surfaced by fleet operations.
#[derive(Debug, Error)]
pub enum FleetError {
    /// A required field was still at its default before a side-effecting call.
    #[error("required fields not supplied: {}", .fields.join(", "))]
    IncompleteInput {
        /// Wire names of the missing fields.
        fields: Vec<&'static str>,
    },

    /// A label entry carried a namespace outside the fixed registry.
    #[error("unrecognized label namespace '{namespace}'")]
    UnrecognizedNamespace {
        /// The offending namespace discriminator.
        namespace: String,
    },

    /// The requested model type was not among the parsed label entries.
    #[error("no '{namespace}' entry decoded from label")]
    MissingModel {
        /// Namespace of the requested model.
        namespace: &'static str,
    },

    /// Every usable address in the bridge network is already bound.
    #[error("no free address left in network '{network}'")]
    AddressExhausted {
        /// Name of the exhausted network.
        network: String,
    },

    /// A dependency container (e.g. the identity node a connector joins) is
    /// not running.
    #[error("required service container is not running")]
    NotRunning,

    /// A container-runtime call failed.
    ///
    /// `container_created` tells the caller whether a container object had
    /// already been instantiated when the failure occurred, so the cleanup
    /// decision is explicit rather than guessed from the error text.
    #[error("container runtime operation failed")]
    Repository {
        /// The underlying client failure.
        #[source]
        source: ClientError,
        /// Whether a container was instantiated before the failure.
        container_created: bool,
    },

    /// Causally linked failures, e.g. a primary failure whose compensating
    /// cleanup also failed. The first entry is the primary.
    #[error("{}", .errors.first().map(|e| e.to_string()).unwrap_or_else(|| "combined failure".to_string()))]
    Combine {
        /// All linked failures, primary first.
        errors: Vec<FleetError>,
    },

    /// Defensive fallback when no other case applies.
    #[error("unknown error")]
    Unknown,
}

impl FleetError {
    /// Wrap a client failure that occurred before any container existed.
    pub fn repository(source: ClientError) -> Self {
        Self::Repository {
            source,
            container_created: false,
        }
    }

    /// Bundle a primary failure with its failed compensation.
    pub fn combine(primary: FleetError, secondary: FleetError) -> Self {
        Self::Combine {
            errors: vec![primary, secondary],
        }
    }

    /// Whether this failure left a container behind that needs removal.
    pub fn needs_cleanup(&self) -> bool {
        matches!(
            self,
            Self::Repository {
                container_created: true,
                ..
            }
        )
    }
}

/// Errors reported by the container-runtime client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The requested static address is already bound (create/start race).
    #[error("address already in use")]
    AddressInUse,

    /// The requested container name is already taken (create race).
    #[error("container name already in use")]
    NameInUse,

    /// The referenced resource does not exist.
    #[error("resource not found")]
    NotFound,

    /// The runtime rejected the request.
    #[error("runtime api error (status {status}): {message}")]
    Api {
        /// HTTP status code from the runtime API.
        status: u16,
        /// Error message from the runtime API.
        message: String,
    },

    /// Transport-level failure talking to the runtime socket.
    #[error("runtime transport error: {0}")]
    Transport(String),

    /// The runtime returned a response this crate cannot interpret.
    #[error("malformed runtime response: {0}")]
    Malformed(String),
}

impl ClientError {
    /// Whether this failure is a recoverable allocation collision.
    ///
    /// Collisions happen when a concurrent creator binds the same address or
    /// name between our allocation scan and the create call; they are the
    /// only class of failure the creator retries.
    pub fn is_collision(&self) -> bool {
        matches!(self, Self::AddressInUse | Self::NameInUse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combine_reports_primary_message() {
        let err = FleetError::combine(
            FleetError::AddressExhausted {
                network: "fleet-bridge".to_string(),
            },
            FleetError::Unknown,
        );

        assert_eq!(err.to_string(), "no free address left in network 'fleet-bridge'");
        match err {
            FleetError::Combine { errors } => assert_eq!(errors.len(), 2),
            other => panic!("expected Combine, got {other:?}"),
        }
    }

    #[test]
    fn collision_classification() {
        assert!(ClientError::AddressInUse.is_collision());
        assert!(ClientError::NameInUse.is_collision());
        assert!(!ClientError::NotFound.is_collision());
        assert!(
            !ClientError::Api {
                status: 500,
                message: "boom".to_string()
            }
            .is_collision()
        );
    }

    #[test]
    fn cleanup_flag_follows_container_created() {
        let created = FleetError::Repository {
            source: ClientError::Transport("socket closed".to_string()),
            container_created: true,
        };
        let not_created = FleetError::repository(ClientError::NotFound);

        assert!(created.needs_cleanup());
        assert!(!not_created.needs_cleanup());
    }
}

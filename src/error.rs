//! Error types for the driver plugin bridge

use thiserror::Error;

/// Main error type for bridge operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// The resource watch stream failed
    #[error("watch error: {0}")]
    Watch(#[from] kube::runtime::watcher::Error),

    /// Cluster configuration could not be translated (no discriminator, bad driver name)
    #[error("configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// No address is registered for the named driver
    #[error("driver {0} is not registered")]
    DriverNotFound(String),

    /// A driver service could not bind its listen address
    #[error("failed to bind {address}: {source}")]
    Bind {
        /// Address the bind was attempted on
        address: String,
        /// Underlying socket error
        #[source]
        source: std::io::Error,
    },

    /// The RPC channel failed (connection refused, deadline exceeded, reset)
    #[error("transport error: {0}")]
    Transport(String),

    /// The caller cancelled the call before it completed
    #[error("call cancelled")]
    Cancelled,

    /// The remote driver executed the call and returned an error
    #[error("driver error ({code:?}): {message}")]
    Driver {
        /// gRPC status code reported by the driver
        code: tonic::Code,
        /// Message reported by the driver
        message: String,
    },

    /// Driver binary installation error
    #[error("install error: {0}")]
    Install(String),

    /// One or more reconciliation handlers failed
    #[error("handler error: {0}")]
    Handler(String),
}

impl Error {
    /// Create a configuration error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create a transport error with the given message
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create an install error with the given message
    pub fn install(msg: impl Into<String>) -> Self {
        Self::Install(msg.into())
    }

    /// Create a handler error with the given message
    pub fn handler(msg: impl Into<String>) -> Self {
        Self::Handler(msg.into())
    }

    /// Returns true if the failure happened on the RPC channel rather than in the driver
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Cancelled)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<tonic::transport::Error> for Error {
    fn from(e: tonic::transport::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

impl From<tonic::Status> for Error {
    /// Split gRPC failures into channel failures and driver-reported failures
    fn from(status: tonic::Status) -> Self {
        use tonic::Code;

        match status.code() {
            Code::Unavailable | Code::DeadlineExceeded => {
                Self::Transport(status.message().to_string())
            }
            Code::Cancelled => Self::Cancelled,
            code => Self::Driver {
                code,
                message: status.message().to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Story: configuration errors explain why a cluster spec cannot be translated
    #[test]
    fn story_config_errors_are_reported_before_any_call() {
        let err = Error::config("no driver config found");
        assert!(err.to_string().contains("configuration error"));
        assert!(!err.is_transport());

        match Error::config("any message") {
            Error::Config(msg) => assert_eq!(msg, "any message"),
            _ => panic!("Expected Config variant"),
        }
    }

    /// Story: callers can tell a dead channel apart from a driver saying no
    #[test]
    fn story_transport_and_driver_errors_are_distinct() {
        let unavailable: Error = tonic::Status::unavailable("connection refused").into();
        assert!(unavailable.is_transport());

        let deadline: Error = tonic::Status::deadline_exceeded("too slow").into();
        assert!(deadline.is_transport());

        let cancelled: Error = tonic::Status::cancelled("caller went away").into();
        assert!(matches!(cancelled, Error::Cancelled));

        let business: Error = tonic::Status::invalid_argument("region is required").into();
        assert!(!business.is_transport());
        match business {
            Error::Driver { code, message } => {
                assert_eq!(code, tonic::Code::InvalidArgument);
                assert_eq!(message, "region is required");
            }
            other => panic!("Expected Driver variant, got {other:?}"),
        }
    }

    #[test]
    fn test_bind_error_names_the_address() {
        let err = Error::Bind {
            address: "127.0.0.1:4000".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "address in use"),
        };
        assert!(err.to_string().contains("127.0.0.1:4000"));
        assert!(err.to_string().contains("address in use"));
    }

    #[test]
    fn test_not_found_names_the_driver() {
        let err = Error::DriverNotFound("googlekubernetesengine".to_string());
        assert_eq!(
            err.to_string(),
            "driver googlekubernetesengine is not registered"
        );
    }
}

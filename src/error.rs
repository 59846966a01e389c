//! Error types for the Zabbix provider.

use thiserror::Error;

use crate::zabbix::ZabbixError;

/// Errors returned by provider operations.
///
/// Every error reaching the plugin host is rendered with its `Display`
/// output as an error diagnostic. Errors from the Zabbix API are passed
/// through unchanged.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The requested object was not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// A validation error occurred.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An internal error in the plugin protocol layer.
    #[error("SDK error: {0}")]
    Sdk(String),

    /// The provider configuration is invalid.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The requested resource or data source type is unknown.
    #[error("Unknown resource type: {0}")]
    UnknownResource(String),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A gRPC transport error occurred.
    #[error("Transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// The Zabbix API returned an error or could not be reached.
    #[error(transparent)]
    Api(#[from] ZabbixError),

    /// A lookup that must match at most one object matched several.
    /// The payload is the plural object kind, e.g. `applications`.
    #[error("multiple {0} found")]
    MultipleFound(&'static str),

    /// A resource operation was requested before `configure` succeeded.
    #[error("provider is not configured")]
    NotConfigured,

    /// The operation is not supported for this type.
    #[error("Unimplemented error: {0}")]
    Unimplemented(String),
}

impl From<ProviderError> for tonic::Status {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::NotFound(msg) => tonic::Status::not_found(msg),
            ProviderError::Validation(msg) => tonic::Status::invalid_argument(msg),
            ProviderError::Configuration(msg) => tonic::Status::failed_precondition(msg),
            ProviderError::UnknownResource(msg) => tonic::Status::not_found(msg),
            ProviderError::Sdk(msg) => tonic::Status::internal(msg),
            ProviderError::Serialization(err) => {
                tonic::Status::invalid_argument(format!("Serialization error: {}", err))
            },
            ProviderError::Transport(err) => {
                tonic::Status::unavailable(format!("Transport error: {}", err))
            },
            ProviderError::Api(err) => {
                if err.is_timeout() {
                    tonic::Status::deadline_exceeded(err.to_string())
                } else if err.is_api_error() {
                    tonic::Status::unknown(err.to_string())
                } else {
                    tonic::Status::unavailable(err.to_string())
                }
            },
            err @ ProviderError::MultipleFound(_) => {
                tonic::Status::failed_precondition(err.to_string())
            },
            err @ ProviderError::NotConfigured => {
                tonic::Status::failed_precondition(err.to_string())
            },
            ProviderError::Unimplemented(msg) => tonic::Status::unimplemented(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProviderError::NotFound("resource-123".to_string());
        assert_eq!(format!("{}", err), "Resource not found: resource-123");

        let err = ProviderError::Validation("invalid input".to_string());
        assert_eq!(format!("{}", err), "Validation error: invalid input");

        let err = ProviderError::UnknownResource("zabbix_widget".to_string());
        assert_eq!(format!("{}", err), "Unknown resource type: zabbix_widget");
    }

    #[test]
    fn test_local_error_messages() {
        let err = ProviderError::MultipleFound("applications");
        assert_eq!(err.to_string(), "multiple applications found");

        let err = ProviderError::Unimplemented("application update".to_string());
        assert!(err.to_string().starts_with("Unimplemented error"));

        assert_eq!(
            ProviderError::NotConfigured.to_string(),
            "provider is not configured"
        );
    }

    #[test]
    fn test_api_error_is_verbatim() {
        let err: ProviderError = ZabbixError::Api {
            code: -32500,
            message: "Application error.".to_string(),
            data: "No permissions to referred object or it does not exist!".to_string(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "Application error. (-32500): No permissions to referred object or it does not exist!"
        );

        let status: tonic::Status = err.into();
        assert_eq!(status.code(), tonic::Code::Unknown);
    }

    #[test]
    fn test_error_to_status() {
        let err = ProviderError::NotFound("test".to_string());
        let status: tonic::Status = err.into();
        assert_eq!(status.code(), tonic::Code::NotFound);

        let err = ProviderError::Validation("test".to_string());
        let status: tonic::Status = err.into();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);

        let err = ProviderError::Configuration("test".to_string());
        let status: tonic::Status = err.into();
        assert_eq!(status.code(), tonic::Code::FailedPrecondition);

        let err = ProviderError::Sdk("test".to_string());
        let status: tonic::Status = err.into();
        assert_eq!(status.code(), tonic::Code::Internal);

        let status: tonic::Status = ProviderError::MultipleFound("hosts").into();
        assert_eq!(status.code(), tonic::Code::FailedPrecondition);
        assert_eq!(status.message(), "multiple hosts found");

        let status: tonic::Status = ProviderError::NotConfigured.into();
        assert_eq!(status.code(), tonic::Code::FailedPrecondition);

        let status: tonic::Status = ProviderError::Unimplemented("x".to_string()).into();
        assert_eq!(status.code(), tonic::Code::Unimplemented);
    }
}

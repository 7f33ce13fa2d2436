//! OSS service errors and their translation into storage errors.

use thiserror::Error;

use ossnav_common::Error;

/// Result type for raw OSS calls.
pub type OssResult<T> = std::result::Result<T, OssError>;

/// An error returned by the OSS service or the transport under it.
#[derive(Debug, Error)]
pub enum OssError {
    /// The service answered with an error document.
    #[error("OSS error ({code}): {message}")]
    Service {
        status: u16,
        code: String,
        message: String,
        request_id: Option<String>,
        bucket: Option<String>,
        key: Option<String>,
    },

    /// The request never produced a response.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The response could not be decoded.
    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl OssError {
    /// A service error with no request id or resource details.
    pub fn service(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Service {
            status,
            code: code.into(),
            message: message.into(),
            request_id: None,
            bucket: None,
            key: None,
        }
    }

    /// `NoSuchBucket` for `bucket`.
    pub fn no_such_bucket(bucket: &str) -> Self {
        Self::service(404, "NoSuchBucket", "The specified bucket does not exist.")
            .with_bucket(bucket)
    }

    /// `NoSuchKey` for `key`.
    pub fn no_such_key(key: &str) -> Self {
        Self::service(404, "NoSuchKey", "The specified key does not exist.").with_key(key)
    }

    pub fn with_bucket(mut self, name: &str) -> Self {
        if let Self::Service { bucket, .. } = &mut self {
            *bucket = Some(name.to_string());
        }
        self
    }

    pub fn with_key(mut self, name: &str) -> Self {
        if let Self::Service { key, .. } = &mut self {
            *key = Some(name.to_string());
        }
        self
    }

    /// Service error code, if the service answered.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Service { code, .. } => Some(code),
            _ => None,
        }
    }
}

impl From<OssError> for Error {
    fn from(err: OssError) -> Self {
        match err {
            OssError::Service {
                code,
                message,
                bucket,
                key,
                ..
            } => match code.as_str() {
                "NoSuchBucket" => Error::BucketNotFound(bucket.unwrap_or_default()),
                "NoSuchKey" => Error::ObjectNotFound(key.unwrap_or_default()),
                "AccessDenied" => Error::PermissionDenied(message),
                "SignatureDoesNotMatch" => {
                    Error::Authentication("Invalid access key secret".to_string())
                }
                "InvalidAccessKeyId" => Error::Authentication("Invalid access key ID".to_string()),
                _ => Error::Storage(format!("OSS error: {}", message)),
            },
            OssError::Http(e) => Error::Network(e.to_string()),
            OssError::Malformed(message) => Error::Storage(format!("OSS error: {}", message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn translate(code: &str) -> Error {
        OssError::service(400, code, "something went wrong").into()
    }

    #[test]
    fn test_not_found_codes_map_to_specific_kinds() {
        let err: Error = OssError::no_such_bucket("photos").into();
        assert!(matches!(err, Error::BucketNotFound(ref b) if b == "photos"));

        let err: Error = OssError::no_such_key("a/b.txt").into();
        assert!(matches!(err, Error::ObjectNotFound(ref k) if k == "a/b.txt"));
    }

    #[test]
    fn test_credential_codes() {
        assert!(matches!(translate("AccessDenied"), Error::PermissionDenied(_)));
        match translate("SignatureDoesNotMatch") {
            Error::Authentication(msg) => assert_eq!(msg, "Invalid access key secret"),
            other => panic!("unexpected: {:?}", other),
        }
        match translate("InvalidAccessKeyId") {
            Error::Authentication(msg) => assert_eq!(msg, "Invalid access key ID"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_other_codes_are_generic() {
        match translate("InternalError") {
            Error::Storage(msg) => assert_eq!(msg, "OSS error: something went wrong"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_details_only_attach_to_service_errors() {
        let err = OssError::Malformed("bad xml".into()).with_key("k");
        assert!(err.code().is_none());
        assert!(matches!(Error::from(err), Error::Storage(_)));
    }
}

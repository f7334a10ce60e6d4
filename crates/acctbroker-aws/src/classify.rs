//! Classification of AWS SDK errors

use acctbroker_core::{ApiError, ApiErrorKind, classify_error_code};
use aws_sdk_organizations::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};

/// Which API call produced an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    /// `CreateAccount`; a lost response may still have created an account
    Submit,
    /// `DescribeCreateAccountStatus`; read-only
    Poll,
}

/// Turn an SDK error into an [`ApiError`].
///
/// Transport failures after the request may have reached AWS are
/// `Ambiguous` for submissions. Service errors are classified by their
/// error code.
pub fn classify_sdk_error<E, R>(err: SdkError<E, R>, call: Call) -> ApiError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    let kind = match &err {
        SdkError::ConstructionFailure(_) => ApiErrorKind::ValidationError,
        SdkError::TimeoutError(_) if call == Call::Submit => ApiErrorKind::Ambiguous,
        SdkError::TimeoutError(_) => ApiErrorKind::ServiceUnavailable,
        SdkError::DispatchFailure(failure) if failure.is_timeout() && call == Call::Submit => {
            ApiErrorKind::Ambiguous
        }
        SdkError::DispatchFailure(_) => ApiErrorKind::ServiceUnavailable,
        SdkError::ResponseError(_) if call == Call::Submit => ApiErrorKind::Ambiguous,
        SdkError::ResponseError(_) => ApiErrorKind::Unknown,
        _ => err
            .code()
            .map(classify_error_code)
            .unwrap_or(ApiErrorKind::Unknown),
    };

    let message = DisplayErrorContext(&err).to_string();
    tracing::debug!("AWS Organizations {:?} failed ({}): {}", call, kind, message);

    ApiError::new(kind, message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_organizations::error::ErrorMetadata;
    use aws_sdk_organizations::operation::create_account::CreateAccountError;

    type TestError = SdkError<CreateAccountError, ()>;

    fn service_error(code: &str) -> TestError {
        let meta = ErrorMetadata::builder()
            .code(code)
            .message("from test")
            .build();
        SdkError::service_error(CreateAccountError::generic(meta), ())
    }

    #[test]
    fn test_timeout_on_submit_is_ambiguous() {
        let err: TestError = SdkError::timeout_error("deadline elapsed");
        assert_eq!(
            classify_sdk_error(err, Call::Submit).kind,
            ApiErrorKind::Ambiguous
        );
    }

    #[test]
    fn test_timeout_on_poll_is_unavailable() {
        let err: TestError = SdkError::timeout_error("deadline elapsed");
        assert_eq!(
            classify_sdk_error(err, Call::Poll).kind,
            ApiErrorKind::ServiceUnavailable
        );
    }

    #[test]
    fn test_construction_failure_is_validation() {
        let err: TestError = SdkError::construction_failure("missing email");
        assert_eq!(
            classify_sdk_error(err, Call::Submit).kind,
            ApiErrorKind::ValidationError
        );
    }

    #[test]
    fn test_service_error_codes() {
        let cases = [
            ("TooManyRequestsException", ApiErrorKind::RateLimited),
            ("ConstraintViolationException", ApiErrorKind::QuotaExceeded),
            ("AccessDeniedException", ApiErrorKind::AccessDenied),
            ("UnsupportedAPIEndpointException", ApiErrorKind::Unknown),
        ];

        for (code, expected) in cases {
            let classified = classify_sdk_error(service_error(code), Call::Submit);
            assert_eq!(classified.kind, expected, "code {}", code);
        }
    }
}

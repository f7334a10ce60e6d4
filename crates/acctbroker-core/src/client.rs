//! Account-creation API abstraction

use crate::error::ApiError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Longest account name the account-creation API accepts
pub const MAX_ACCOUNT_NAME_LEN: usize = 50;
/// Shortest email the account-creation API accepts
pub const MIN_EMAIL_LEN: usize = 6;
/// Longest email the account-creation API accepts
pub const MAX_EMAIL_LEN: usize = 64;

/// Asynchronous account-creation API
///
/// Implementations classify every failure into [`ApiError`] before
/// returning it. Neither method retries. Requests reach `submit` already
/// checked by [`validate_request`].
#[async_trait]
pub trait AccountApi: Send + Sync {
    /// Returns the API name for logs (e.g., "aws-organizations")
    fn name(&self) -> &str;

    /// Submit one account-creation request
    async fn submit(
        &self,
        account_name: &str,
        email: &str,
    ) -> Result<SubmittedOperation, ApiError>;

    /// Fetch the current status of a submitted request. No side effects.
    async fn poll(&self, operation_id: &str) -> Result<OperationStatus, ApiError>;
}

/// Handle returned by a successful submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedOperation {
    #[serde(rename = "Id")]
    pub operation_id: String,

    /// External state at submission time
    #[serde(rename = "State")]
    pub state: String,
}

impl SubmittedOperation {
    /// Opaque operation data handed back to the platform
    pub fn operation_data(&self) -> String {
        serde_json::json!({ "Id": self.operation_id, "State": self.state }).to_string()
    }
}

/// Status of a submitted request as reported by the API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationStatus {
    pub operation_id: String,

    /// Raw external state (`IN_PROGRESS`, `SUCCEEDED`, `FAILED`, ...)
    pub state: String,

    pub account_id: Option<String>,
    pub account_name: Option<String>,
    pub failure_reason: Option<String>,
}

impl OperationStatus {
    pub fn new(operation_id: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            operation_id: operation_id.into(),
            state: state.into(),
            account_id: None,
            account_name: None,
            failure_reason: None,
        }
    }

    pub fn with_account_id(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    pub fn with_account_name(mut self, account_name: impl Into<String>) -> Self {
        self.account_name = Some(account_name.into());
        self
    }

    pub fn with_failure_reason(mut self, reason: impl Into<String>) -> Self {
        self.failure_reason = Some(reason.into());
        self
    }

    /// Operator-facing rendering of the whole payload
    pub fn describe(&self) -> String {
        let mut fields = vec![format!("Id: {:?}", self.operation_id)];
        if let Some(account_id) = &self.account_id {
            fields.push(format!("AccountId: {:?}", account_id));
        }
        if let Some(account_name) = &self.account_name {
            fields.push(format!("AccountName: {:?}", account_name));
        }
        if let Some(reason) = &self.failure_reason {
            fields.push(format!("FailureReason: {:?}", reason));
        }
        fields.push(format!("State: {:?}", self.state));

        format!("{{ {} }}", fields.join(", "))
    }
}

/// Check a creation request against the API's input constraints
pub fn validate_request(account_name: &str, email: &str) -> Result<(), ApiError> {
    let name_len = account_name.chars().count();
    if name_len == 0 || name_len > MAX_ACCOUNT_NAME_LEN {
        return Err(ApiError::validation(format!(
            "account name must be 1-{} characters, got {}",
            MAX_ACCOUNT_NAME_LEN, name_len
        )));
    }

    let email_len = email.chars().count();
    if !(MIN_EMAIL_LEN..=MAX_EMAIL_LEN).contains(&email_len) {
        return Err(ApiError::validation(format!(
            "email must be {}-{} characters, got {}",
            MIN_EMAIL_LEN, MAX_EMAIL_LEN, email_len
        )));
    }
    if !email.contains('@') {
        return Err(ApiError::validation(format!("email has no '@': {}", email)));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiErrorKind;

    #[test]
    fn test_operation_data() {
        let op = SubmittedOperation {
            operation_id: "car-999999999999".to_string(),
            state: "IN_PROGRESS".to_string(),
        };

        let data: serde_json::Value = serde_json::from_str(&op.operation_data()).unwrap();
        assert_eq!(data["Id"], "car-999999999999");
        assert_eq!(data["State"], "IN_PROGRESS");
    }

    #[test]
    fn test_describe() {
        let status = OperationStatus::new("car-1", "SUCCEEDED")
            .with_account_id("999999999999")
            .with_account_name("test-account");

        assert_eq!(
            status.describe(),
            r#"{ Id: "car-1", AccountId: "999999999999", AccountName: "test-account", State: "SUCCEEDED" }"#
        );
    }

    #[test]
    fn test_describe_failure() {
        let status =
            OperationStatus::new("car-2", "FAILED").with_failure_reason("EMAIL_ALREADY_EXISTS");
        let description = status.describe();
        assert!(description.contains("FailureReason: \"EMAIL_ALREADY_EXISTS\""));
        assert!(description.ends_with(r#"State: "FAILED" }"#));
    }

    #[test]
    fn test_validate_request() {
        assert!(validate_request("test-create", "foo+test-create@bar.com").is_ok());

        let long_name = "n".repeat(MAX_ACCOUNT_NAME_LEN + 1);
        let err = validate_request(&long_name, "foo@bar.com").unwrap_err();
        assert_eq!(err.kind, ApiErrorKind::ValidationError);

        assert!(validate_request("", "foo@bar.com").is_err());
        assert!(validate_request("a", "a@b.c").is_err());
        assert!(validate_request("a", "no-at-sign.example.com").is_err());

        let long_email = format!("{}@bar.com", "x".repeat(MAX_EMAIL_LEN));
        assert!(validate_request("a", &long_email).is_err());
    }
}

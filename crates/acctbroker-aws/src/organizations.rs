//! AWS Organizations account-creation client

use crate::classify::{Call, classify_sdk_error};
use acctbroker_core::{AccountApi, ApiError, OperationStatus, SubmittedOperation};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, SdkConfig};
use aws_sdk_organizations::Client;
use aws_sdk_organizations::types::CreateAccountStatus;

/// Account-creation API backed by AWS Organizations
///
/// Holds one SDK client built from configuration loaded at startup.
pub struct OrganizationsClient {
    client: Client,
}

impl OrganizationsClient {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    /// Load region and credentials from the standard AWS provider chain
    pub async fn from_env() -> Self {
        let config = aws_config::defaults(BehaviorVersion::latest()).load().await;
        tracing::debug!(
            "Loaded AWS configuration (region: {})",
            config
                .region()
                .map(|r| r.as_ref().to_string())
                .unwrap_or_else(|| "unset".to_string())
        );
        Self::new(&config)
    }
}

/// Convert the SDK's create-account status into an [`OperationStatus`]
pub fn operation_status(status: &CreateAccountStatus) -> Result<OperationStatus, ApiError> {
    let id = status
        .id()
        .ok_or_else(|| ApiError::unknown("create-account status has no request id"))?;
    let state = status
        .state()
        .ok_or_else(|| ApiError::unknown(format!("create-account request {} has no state", id)))?;

    let mut out = OperationStatus::new(id, state.as_str());
    if let Some(account_id) = status.account_id() {
        out = out.with_account_id(account_id);
    }
    if let Some(account_name) = status.account_name() {
        out = out.with_account_name(account_name);
    }
    if let Some(reason) = status.failure_reason() {
        out = out.with_failure_reason(reason.as_str());
    }
    Ok(out)
}

#[async_trait]
impl AccountApi for OrganizationsClient {
    fn name(&self) -> &str {
        "aws-organizations"
    }

    async fn submit(
        &self,
        account_name: &str,
        email: &str,
    ) -> Result<SubmittedOperation, ApiError> {
        tracing::info!("Creating account {} <{}>", account_name, email);

        let output = self
            .client
            .create_account()
            .account_name(account_name)
            .email(email)
            .send()
            .await
            .map_err(|e| classify_sdk_error(e, Call::Submit))?;

        let status = output
            .create_account_status()
            .ok_or_else(|| ApiError::ambiguous("CreateAccount returned no status"))?;
        let status = operation_status(status)?;

        Ok(SubmittedOperation {
            operation_id: status.operation_id,
            state: status.state,
        })
    }

    async fn poll(&self, operation_id: &str) -> Result<OperationStatus, ApiError> {
        let output = self
            .client
            .describe_create_account_status()
            .create_account_request_id(operation_id)
            .send()
            .await
            .map_err(|e| classify_sdk_error(e, Call::Poll))?;

        let status = output.create_account_status().ok_or_else(|| {
            ApiError::unknown(format!("no status returned for request {}", operation_id))
        })?;
        operation_status(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use acctbroker_core::ApiErrorKind;
    use aws_sdk_organizations::types::{CreateAccountFailureReason, CreateAccountState};

    #[test]
    fn test_operation_status_succeeded() {
        let status = CreateAccountStatus::builder()
            .id("car-999999999999")
            .state(CreateAccountState::Succeeded)
            .account_id("999999999999")
            .account_name("test-account")
            .build();

        let converted = operation_status(&status).unwrap();
        assert_eq!(converted.operation_id, "car-999999999999");
        assert_eq!(converted.state, "SUCCEEDED");
        assert_eq!(converted.account_id.as_deref(), Some("999999999999"));
        assert_eq!(converted.failure_reason, None);
    }

    #[test]
    fn test_operation_status_failed() {
        let status = CreateAccountStatus::builder()
            .id("car-1")
            .state(CreateAccountState::Failed)
            .failure_reason(CreateAccountFailureReason::EmailAlreadyExists)
            .build();

        let converted = operation_status(&status).unwrap();
        assert_eq!(converted.state, "FAILED");
        assert_eq!(
            converted.failure_reason.as_deref(),
            Some("EMAIL_ALREADY_EXISTS")
        );
    }

    #[test]
    fn test_operation_status_missing_fields() {
        let no_id = CreateAccountStatus::builder()
            .state(CreateAccountState::InProgress)
            .build();
        assert_eq!(
            operation_status(&no_id).unwrap_err().kind,
            ApiErrorKind::Unknown
        );

        let no_state = CreateAccountStatus::builder().id("car-1").build();
        assert!(operation_status(&no_state).is_err());
    }
}

//! Provisioning lifecycle controller

use crate::address::{derive_address, validate_base};
use crate::catalog::Catalog;
use crate::client::{AccountApi, SubmittedOperation, validate_request};
use crate::error::{ApiError, BrokerError, Result, StoreError};
use crate::status::{LastOperation, translate};
use crate::store::CorrelationStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Default bound on a single Submit call
pub const DEFAULT_SUBMIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings of the lifecycle controller
#[derive(Debug, Clone)]
pub struct BrokerSettings {
    /// Base address from which per-instance addresses are derived
    pub base_email: String,

    /// Deadline for a Submit call; elapsing makes the outcome ambiguous
    pub submit_timeout: Duration,
}

impl BrokerSettings {
    pub fn new(base_email: impl Into<String>) -> Self {
        Self {
            base_email: base_email.into(),
            submit_timeout: DEFAULT_SUBMIT_TIMEOUT,
        }
    }

    pub fn with_submit_timeout(mut self, timeout: Duration) -> Self {
        self.submit_timeout = timeout;
        self
    }
}

/// Accepted asynchronous provisioning request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionAccepted {
    /// Operation data the platform echoes back when polling
    pub operation: String,
}

/// Account broker
///
/// Provisioning submits exactly one creation request per instance and
/// records its operation id; status queries always go to the API.
pub struct Broker {
    api: Arc<dyn AccountApi>,
    store: Arc<dyn CorrelationStore>,
    settings: BrokerSettings,
    catalog: Catalog,
}

impl Broker {
    pub fn new(
        api: Arc<dyn AccountApi>,
        store: Arc<dyn CorrelationStore>,
        settings: BrokerSettings,
    ) -> Result<Self> {
        validate_base(&settings.base_email)?;

        Ok(Self {
            api,
            store,
            settings,
            catalog: Catalog::accounts(),
        })
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn settings(&self) -> &BrokerSettings {
        &self.settings
    }

    /// Submit account creation for `instance_id`
    pub async fn provision(
        &self,
        instance_id: &str,
        accepts_incomplete: bool,
    ) -> Result<ProvisionAccepted> {
        if !accepts_incomplete {
            return Err(BrokerError::SyncNotSupported);
        }

        let email = derive_address(&self.settings.base_email, instance_id)?;
        validate_request(instance_id, &email).map_err(BrokerError::SubmissionFailed)?;

        self.store.reserve(instance_id).await.map_err(|e| match e {
            StoreError::DuplicateInstance(id) => BrokerError::InstanceExists(id),
            other => BrokerError::Store(other),
        })?;

        let submitted = match self.submit(instance_id, &email).await {
            Ok(submitted) => submitted,
            Err(e) if e.is_ambiguous() => {
                tracing::warn!(
                    "Account creation for {} has an unknown outcome, keeping reservation: {}",
                    instance_id,
                    e
                );
                return Err(BrokerError::SubmissionFailed(e));
            }
            Err(e) => {
                if let Err(release_err) = self.store.release(instance_id).await {
                    tracing::error!(
                        instance_id,
                        submit_error = %e,
                        "reservation stuck: account creation was rejected (no account exists) \
                         but the reservation could not be released; run `acctbrokerd release {}`: {}",
                        instance_id,
                        release_err
                    );
                }
                return Err(BrokerError::SubmissionFailed(e));
            }
        };

        if let Err(source) = self.store.put(instance_id, &submitted.operation_id).await {
            tracing::error!(
                instance_id,
                operation_id = %submitted.operation_id,
                email = %email,
                "correlation lost: account creation submitted but not recorded: {}",
                source
            );
            return Err(BrokerError::CorrelationLost {
                instance_id: instance_id.to_string(),
                operation_id: submitted.operation_id,
                source,
            });
        }

        tracing::info!(
            "Account creation submitted for {} ({})",
            email,
            submitted.operation_id
        );

        Ok(ProvisionAccepted {
            operation: submitted.operation_data(),
        })
    }

    async fn submit(
        &self,
        instance_id: &str,
        email: &str,
    ) -> std::result::Result<SubmittedOperation, ApiError> {
        let timeout = self.settings.submit_timeout;
        match tokio::time::timeout(timeout, self.api.submit(instance_id, email)).await {
            Ok(result) => result,
            Err(_) => Err(ApiError::ambiguous(format!(
                "{} did not answer within {:?}",
                self.api.name(),
                timeout
            ))),
        }
    }

    /// Current state of the instance's creation request
    pub async fn last_operation(&self, instance_id: &str) -> Result<LastOperation> {
        let record = self
            .store
            .get(instance_id)
            .await?
            .ok_or_else(|| BrokerError::UnknownInstance(instance_id.to_string()))?;

        let status = self
            .api
            .poll(&record.operation_id)
            .await
            .map_err(BrokerError::PollFailed)?;

        tracing::debug!(
            "Operation {} of {} is {}",
            record.operation_id,
            instance_id,
            status.state
        );

        Ok(LastOperation {
            state: translate(&status.state),
            description: status.describe(),
        })
    }

    /// Accounts cannot be closed programmatically
    pub async fn deprovision(&self, instance_id: &str) -> Result<()> {
        tracing::info!("Rejected deprovision of {}", instance_id);
        Err(BrokerError::UnsupportedOperation("deprovision"))
    }

    pub async fn bind(&self, _instance_id: &str, _binding_id: &str) -> Result<()> {
        Err(BrokerError::UnsupportedOperation("bind"))
    }

    pub async fn unbind(&self, _instance_id: &str, _binding_id: &str) -> Result<()> {
        Err(BrokerError::UnsupportedOperation("unbind"))
    }

    pub async fn update(&self, _instance_id: &str) -> Result<()> {
        Err(BrokerError::UnsupportedOperation("update"))
    }
}

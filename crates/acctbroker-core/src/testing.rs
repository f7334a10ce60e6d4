//! Test doubles for the account-creation API and the correlation store

use crate::client::{AccountApi, OperationStatus, SubmittedOperation};
use crate::error::{ApiError, StoreError};
use crate::status::{IN_PROGRESS, SUCCEEDED};
use crate::store::{CorrelationEntry, CorrelationStore, InstanceRecord, MemoryCorrelationStore};
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

/// Operation id handed out by [`RecordingAccountApi`]
pub const TEST_OPERATION_ID: &str = "car-999999999999";

/// Account API double that records every call
pub struct RecordingAccountApi {
    operation_id: String,
    state: Mutex<String>,
    submit_error: Mutex<Option<ApiError>>,
    poll_error: Option<ApiError>,
    submit_delay: Option<Duration>,
    submitted: Mutex<Vec<(String, String)>>,
    polled: Mutex<Vec<String>>,
}

impl Default for RecordingAccountApi {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingAccountApi {
    pub fn new() -> Self {
        Self {
            operation_id: TEST_OPERATION_ID.to_string(),
            state: Mutex::new(IN_PROGRESS.to_string()),
            submit_error: Mutex::new(None),
            poll_error: None,
            submit_delay: None,
            submitted: Mutex::new(Vec::new()),
            polled: Mutex::new(Vec::new()),
        }
    }

    pub fn with_state(self, state: &str) -> Self {
        self.set_state(state);
        self
    }

    pub fn failing_submit(self, error: ApiError) -> Self {
        *self.submit_error.lock().unwrap() = Some(error);
        self
    }

    pub fn failing_poll(mut self, error: ApiError) -> Self {
        self.poll_error = Some(error);
        self
    }

    pub fn with_submit_delay(mut self, delay: Duration) -> Self {
        self.submit_delay = Some(delay);
        self
    }

    /// Change the external state reported by subsequent polls
    pub fn set_state(&self, state: &str) {
        *self.state.lock().unwrap() = state.to_string();
    }

    pub fn clear_submit_failure(&self) {
        *self.submit_error.lock().unwrap() = None;
    }

    /// `(account_name, email)` of every submit call
    pub fn submitted(&self) -> Vec<(String, String)> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn submit_count(&self) -> usize {
        self.submitted.lock().unwrap().len()
    }

    /// Operation ids of every poll call
    pub fn polled(&self) -> Vec<String> {
        self.polled.lock().unwrap().clone()
    }

    pub fn poll_count(&self) -> usize {
        self.polled.lock().unwrap().len()
    }
}

#[async_trait]
impl AccountApi for RecordingAccountApi {
    fn name(&self) -> &str {
        "recording"
    }

    async fn submit(
        &self,
        account_name: &str,
        email: &str,
    ) -> Result<SubmittedOperation, ApiError> {
        self.submitted
            .lock()
            .unwrap()
            .push((account_name.to_string(), email.to_string()));

        if let Some(delay) = self.submit_delay {
            tokio::time::sleep(delay).await;
        }

        let error = self.submit_error.lock().unwrap().clone();
        if let Some(error) = error {
            return Err(error);
        }

        Ok(SubmittedOperation {
            operation_id: self.operation_id.clone(),
            state: self.state.lock().unwrap().clone(),
        })
    }

    async fn poll(&self, operation_id: &str) -> Result<OperationStatus, ApiError> {
        self.polled.lock().unwrap().push(operation_id.to_string());

        if let Some(error) = &self.poll_error {
            return Err(error.clone());
        }

        let state = self.state.lock().unwrap().clone();
        let mut status =
            OperationStatus::new(operation_id, state.as_str()).with_account_name("test-account");
        if state == SUCCEEDED {
            status = status.with_account_id("999999999999");
        }
        Ok(status)
    }
}

/// Store whose `put` always fails as if storage were unreachable
#[derive(Debug, Default)]
pub struct UnwritableStore {
    inner: MemoryCorrelationStore,
}

impl UnwritableStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CorrelationStore for UnwritableStore {
    async fn reserve(&self, instance_id: &str) -> Result<(), StoreError> {
        self.inner.reserve(instance_id).await
    }

    async fn put(&self, _instance_id: &str, _operation_id: &str) -> Result<(), StoreError> {
        Err(StoreError::Io(std::io::Error::other("storage unreachable")))
    }

    async fn release(&self, instance_id: &str) -> Result<bool, StoreError> {
        self.inner.release(instance_id).await
    }

    async fn get(&self, instance_id: &str) -> Result<Option<InstanceRecord>, StoreError> {
        self.inner.get(instance_id).await
    }

    async fn pending(&self) -> Result<Vec<CorrelationEntry>, StoreError> {
        self.inner.pending().await
    }
}

/// Store whose `release` always fails as if storage were unreachable
#[derive(Debug, Default)]
pub struct UnreleasableStore {
    inner: MemoryCorrelationStore,
}

impl UnreleasableStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CorrelationStore for UnreleasableStore {
    async fn reserve(&self, instance_id: &str) -> Result<(), StoreError> {
        self.inner.reserve(instance_id).await
    }

    async fn put(&self, instance_id: &str, operation_id: &str) -> Result<(), StoreError> {
        self.inner.put(instance_id, operation_id).await
    }

    async fn release(&self, _instance_id: &str) -> Result<bool, StoreError> {
        Err(StoreError::Io(std::io::Error::other("storage unreachable")))
    }

    async fn get(&self, instance_id: &str) -> Result<Option<InstanceRecord>, StoreError> {
        self.inner.get(instance_id).await
    }

    async fn pending(&self) -> Result<Vec<CorrelationEntry>, StoreError> {
        self.inner.pending().await
    }
}

//! Account broker core
//!
//! Provisions cloud-provider accounts on demand behind an asynchronous
//! service-broker protocol. Account creation is itself asynchronous, so the
//! broker records which external operation belongs to which instance and
//! answers status polls by asking the account-creation API again.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                   acctbrokerd                    │
//! │            (HTTP, config, credentials)           │
//! └─────────────────────┬────────────────────────────┘
//!                       │
//! ┌─────────────────────▼────────────────────────────┐
//! │                 acctbroker-core                  │
//! │  ┌────────────────────────────────────────────┐  │
//! │  │         Broker (lifecycle controller)      │  │
//! │  └──────┬──────────────┬──────────────┬───────┘  │
//! │  ┌──────▼──────┐ ┌─────▼──────┐ ┌─────▼──────┐   │
//! │  │ Correlation │ │  Status    │ │  Address   │   │
//! │  │   Store     │ │ Translator │ │ derivation │   │
//! │  └─────────────┘ └────────────┘ └────────────┘   │
//! │  ┌────────────────────────────────────────────┐  │
//! │  │        trait AccountApi { submit, poll }   │  │
//! │  └────────────────────┬───────────────────────┘  │
//! └───────────────────────┼──────────────────────────┘
//!                         │
//!                 ┌───────▼────────┐
//!                 │ acctbroker-aws │
//!                 └────────────────┘
//! ```

pub mod address;
pub mod broker;
pub mod catalog;
pub mod client;
pub mod error;
pub mod status;
pub mod store;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

// Re-exports
pub use address::{derive_address, instance_tag, split_address, validate_base};
pub use broker::{Broker, BrokerSettings, DEFAULT_SUBMIT_TIMEOUT, ProvisionAccepted};
pub use catalog::{Catalog, Service, ServiceMetadata, ServicePlan};
pub use client::{AccountApi, OperationStatus, SubmittedOperation, validate_request};
pub use error::{
    AddressError, ApiError, ApiErrorKind, BrokerError, Result, StoreError, classify_error_code,
};
pub use status::{LastOperation, LastOperationState, translate};
pub use store::{
    CorrelationEntry, CorrelationState, CorrelationStore, EntryState, FileCorrelationStore,
    InstanceRecord, LockInfo, MemoryCorrelationStore, StoreLock,
};

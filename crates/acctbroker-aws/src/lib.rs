//! AWS Organizations backend for the account broker
//!
//! Implements [`acctbroker_core::AccountApi`] with the `CreateAccount` and
//! `DescribeCreateAccountStatus` calls. Credentials and region come from the
//! standard AWS provider chain.
//!
//! ## Required permissions
//!
//! - `organizations:CreateAccount`
//! - `organizations:DescribeCreateAccountStatus`

pub mod classify;
pub mod organizations;

pub use classify::{Call, classify_sdk_error};
pub use organizations::{OrganizationsClient, operation_status};

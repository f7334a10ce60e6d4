//! Service catalog advertised to the platform

use serde::{Deserialize, Serialize};

pub const SERVICE_ID: &str = "1d138a29-ac8b-4360-be9b-db50867fee95";
pub const SERVICE_NAME: &str = "aws-account";
pub const PLAN_ID: &str = "2e8718e2-0991-48d2-b3be-514303bf762d";
pub const PLAN_NAME: &str = "devsecops";

/// Catalog response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    pub services: Vec<Service>,
}

/// An offered service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub id: String,
    pub name: String,
    pub description: String,
    pub bindable: bool,
    pub plans: Vec<ServicePlan>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ServiceMetadata>,

    #[serde(default)]
    pub tags: Vec<String>,
}

/// A plan of a service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicePlan {
    pub id: String,
    pub name: String,
    pub description: String,
}

/// Display metadata of a service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceMetadata {
    pub display_name: String,
    pub documentation_url: String,
    pub support_url: String,
    pub provider_display_name: String,
}

impl Catalog {
    /// The single account service with its one plan
    pub fn accounts() -> Self {
        let description = "Provisions AWS accounts under the organization";

        Self {
            services: vec![Service {
                id: SERVICE_ID.to_string(),
                name: SERVICE_NAME.to_string(),
                description: description.to_string(),
                bindable: true,
                plans: vec![ServicePlan {
                    id: PLAN_ID.to_string(),
                    name: PLAN_NAME.to_string(),
                    description: description.to_string(),
                }],
                metadata: Some(ServiceMetadata {
                    display_name: "AWS account broker".to_string(),
                    documentation_url: "https://github.com/GSA/aws-account-broker".to_string(),
                    support_url: "https://github.com/GSA/aws-account-broker/issues/new"
                        .to_string(),
                    provider_display_name: "The IDI team in GSA IT".to_string(),
                }),
                tags: vec!["aws".to_string(), "iaas".to_string()],
            }],
        }
    }
}

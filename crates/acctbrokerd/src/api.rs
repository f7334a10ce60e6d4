//! Service-broker HTTP API (Open Service Broker v2 subset)

use crate::auth::{Credentials, require_basic_auth};
use acctbroker_core::{Broker, BrokerError, Catalog, LastOperation, ProvisionAccepted};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::{Json, Router, middleware};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub broker: Arc<Broker>,
}

/// Build the router. Everything under `/v2` requires basic auth.
pub fn build_router(broker: Arc<Broker>, credentials: Credentials) -> Router {
    let v2 = Router::new()
        .route("/catalog", get(catalog))
        .route(
            "/service_instances/{instance_id}",
            put(provision).delete(deprovision).patch(update),
        )
        .route(
            "/service_instances/{instance_id}/last_operation",
            get(last_operation),
        )
        .route(
            "/service_instances/{instance_id}/service_bindings/{binding_id}",
            put(bind).delete(unbind),
        )
        .route_layer(middleware::from_fn_with_state(
            Arc::new(credentials),
            require_basic_auth,
        ));

    Router::new()
        .route("/health", get(health))
        .nest("/v2", v2)
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { broker })
}

/// Error body of the broker protocol
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub description: String,
}

/// A [`BrokerError`] rendered as an HTTP response
#[derive(Debug)]
pub struct ApiFailure(pub BrokerError);

impl From<BrokerError> for ApiFailure {
    fn from(err: BrokerError) -> Self {
        Self(err)
    }
}

impl ApiFailure {
    fn parts(&self) -> (StatusCode, Option<&'static str>, String) {
        let err = &self.0;
        match err {
            BrokerError::SyncNotSupported => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Some("AsyncRequired"),
                err.to_string(),
            ),
            BrokerError::InvalidAddress(_) => (StatusCode::BAD_REQUEST, None, err.to_string()),
            BrokerError::InstanceExists(_) => (StatusCode::CONFLICT, None, err.to_string()),
            BrokerError::SubmissionFailed(api)
                if api.kind == acctbroker_core::ApiErrorKind::ValidationError =>
            {
                (StatusCode::BAD_REQUEST, None, err.to_string())
            }
            BrokerError::SubmissionFailed(_) | BrokerError::PollFailed(_) => {
                (StatusCode::BAD_GATEWAY, None, err.to_string())
            }
            BrokerError::CorrelationLost { .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                None,
                "Account creation was submitted but could not be recorded; \
                 contact the broker operator"
                    .to_string(),
            ),
            BrokerError::UnknownInstance(_) => (StatusCode::GONE, None, err.to_string()),
            BrokerError::UnsupportedOperation(_) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Some("NotSupported"),
                err.to_string(),
            ),
            BrokerError::Store(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                None,
                "Internal storage error".to_string(),
            ),
        }
    }
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        let (status, error, description) = self.parts();

        if status.is_server_error() {
            tracing::error!("{} -> {}", self.0, status);
        } else {
            tracing::debug!("{} -> {}", self.0, status);
        }

        let body = ErrorBody {
            error: error.map(str::to_string),
            description,
        };
        (status, Json(body)).into_response()
    }
}

/// `accepts_incomplete` query flag
#[derive(Debug, Default, Deserialize)]
pub struct AsyncQuery {
    #[serde(default)]
    pub accepts_incomplete: bool,
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn catalog(State(state): State<AppState>) -> Json<Catalog> {
    Json(state.broker.catalog().clone())
}

async fn provision(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
    Query(query): Query<AsyncQuery>,
) -> Result<(StatusCode, Json<ProvisionAccepted>), ApiFailure> {
    let accepted = state
        .broker
        .provision(&instance_id, query.accepts_incomplete)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(accepted)))
}

async fn last_operation(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
) -> Result<Json<LastOperation>, ApiFailure> {
    Ok(Json(state.broker.last_operation(&instance_id).await?))
}

async fn deprovision(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
) -> Result<StatusCode, ApiFailure> {
    state.broker.deprovision(&instance_id).await?;
    Ok(StatusCode::OK)
}

async fn update(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
) -> Result<StatusCode, ApiFailure> {
    state.broker.update(&instance_id).await?;
    Ok(StatusCode::OK)
}

async fn bind(
    State(state): State<AppState>,
    Path((instance_id, binding_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiFailure> {
    state.broker.bind(&instance_id, &binding_id).await?;
    Ok(StatusCode::CREATED)
}

async fn unbind(
    State(state): State<AppState>,
    Path((instance_id, binding_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiFailure> {
    state.broker.unbind(&instance_id, &binding_id).await?;
    Ok(StatusCode::OK)
}

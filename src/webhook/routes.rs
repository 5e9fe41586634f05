//! Admission webhook handlers
//!
//! Decodes `AdmissionReview` requests, hands the typed object to the
//! validator or the defaulting logic, and turns the outcome back into an
//! `AdmissionResponse`.

use crate::admission::{mutate_policy, AdmissionValidator, Verdict};
use crate::crd::{SriovNetworkNodePolicy, SriovNetworkPoolConfig, SriovOperatorConfig};
use crate::error::{Error, Result};
use crate::metrics::AdmissionMetrics;
use axum::{
    extract::{Json, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use kube::api::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

const POLICY_KIND: &str = "SriovNetworkNodePolicy";
const OPERATOR_CONFIG_KIND: &str = "SriovOperatorConfig";
const POOL_CONFIG_KIND: &str = "SriovNetworkPoolConfig";

/// Shared handler state
#[derive(Clone)]
struct AppState {
    validator: Arc<AdmissionValidator>,
    metrics: Arc<AdmissionMetrics>,
}

/// Builds the webhook router
pub struct WebhookRouter {
    validator: Arc<AdmissionValidator>,
    metrics: Arc<AdmissionMetrics>,
}

impl WebhookRouter {
    pub fn new(validator: Arc<AdmissionValidator>, metrics: Arc<AdmissionMetrics>) -> Self {
        Self { validator, metrics }
    }

    /// Build the Axum router
    pub fn build(self) -> Router {
        let state = AppState {
            validator: self.validator,
            metrics: self.metrics,
        };

        Router::new()
            .route("/validating-webhook", post(validating_webhook))
            .route("/mutating-webhook", post(mutating_webhook))
            .route("/healthz", get(health_check))
            .route("/readyz", get(health_check))
            .route("/metrics", get(metrics))
            .with_state(state)
    }
}

// =============================================================================
// Decoding
// =============================================================================

/// Decode the admitted object into its typed form, taking the namespace from
/// the request when the object does not carry one
fn decode<K: DeserializeOwned + kube::Resource>(
    object: &DynamicObject,
    namespace: Option<&str>,
) -> Result<K> {
    let mut typed: K = serde_json::from_value(serde_json::to_value(object)?)?;
    if typed.meta().namespace.is_none() {
        typed.meta_mut().namespace = namespace.map(str::to_string);
    }
    Ok(typed)
}

/// The new object, or the old one for deletes
fn admitted_object(request: &AdmissionRequest<DynamicObject>) -> Option<&DynamicObject> {
    request.object.as_ref().or(request.old_object.as_ref())
}

fn to_response(request: &AdmissionRequest<DynamicObject>, verdict: Verdict) -> AdmissionResponse {
    let mut response = AdmissionResponse::from(request);
    if !verdict.warnings.is_empty() {
        response.warnings = Some(verdict.warnings.clone());
    }
    match verdict.message() {
        Some(message) if !verdict.allowed => response.deny(message),
        _ => response,
    }
}

// =============================================================================
// Handlers
// =============================================================================

async fn validate(state: &AppState, request: &AdmissionRequest<DynamicObject>) -> Verdict {
    let Some(object) = admitted_object(request) else {
        return Verdict::allow(Vec::new());
    };
    let namespace = request.namespace.as_deref();
    let operation = request.operation.clone();

    match request.kind.kind.as_str() {
        POLICY_KIND => match decode::<SriovNetworkNodePolicy>(object, namespace) {
            Ok(policy) => state.validator.validate_policy(&policy, operation).await,
            Err(e) => Verdict::deny(Vec::new(), e),
        },
        OPERATOR_CONFIG_KIND => match decode::<SriovOperatorConfig>(object, namespace) {
            Ok(config) => state.validator.validate_operator_config(&config, operation).await,
            Err(e) => Verdict::deny(Vec::new(), e),
        },
        POOL_CONFIG_KIND => match decode::<SriovNetworkPoolConfig>(object, namespace) {
            Ok(config) => state.validator.validate_pool_config(&config, operation),
            Err(e) => Verdict::deny(Vec::new(), e),
        },
        other => {
            debug!("No validation for kind {}", other);
            Verdict::allow(Vec::new())
        }
    }
}

async fn validating_webhook(
    State(state): State<AppState>,
    Json(review): Json<AdmissionReview<DynamicObject>>,
) -> Json<AdmissionReview<DynamicObject>> {
    let request: AdmissionRequest<DynamicObject> = match review.try_into() {
        Ok(request) => request,
        Err(e) => {
            error!("Failed to parse admission request: {}", e);
            return Json(AdmissionResponse::invalid(e.to_string()).into_review());
        }
    };

    let start = Instant::now();
    let verdict = validate(&state, &request).await;
    state.metrics.observe(
        "validating",
        &request.kind.kind,
        verdict.allowed,
        start.elapsed().as_secs_f64(),
    );

    if !verdict.allowed {
        info!(
            "Denied {} {:?}: {}",
            request.kind.kind,
            request.name,
            verdict.message().unwrap_or_default()
        );
    }
    Json(to_response(&request, verdict).into_review())
}

fn mutate(request: &AdmissionRequest<DynamicObject>) -> Result<AdmissionResponse> {
    let response = AdmissionResponse::from(request);
    let creating_or_updating = matches!(request.operation, Operation::Create | Operation::Update);
    if request.kind.kind != POLICY_KIND || !creating_or_updating {
        return Ok(response);
    }
    let Some(object) = request.object.as_ref() else {
        return Ok(response);
    };

    let ops = mutate_policy(&serde_json::to_value(object)?)?;
    if ops.is_empty() {
        return Ok(response);
    }

    debug!("Defaulting policy {:?} with {} operations", request.name, ops.len());
    response
        .with_patch(json_patch::Patch(ops))
        .map_err(|e| Error::Internal(format!("failed to serialize patch: {}", e)))
}

async fn mutating_webhook(
    State(state): State<AppState>,
    Json(review): Json<AdmissionReview<DynamicObject>>,
) -> Json<AdmissionReview<DynamicObject>> {
    let request: AdmissionRequest<DynamicObject> = match review.try_into() {
        Ok(request) => request,
        Err(e) => {
            error!("Failed to parse admission request: {}", e);
            return Json(AdmissionResponse::invalid(e.to_string()).into_review());
        }
    };

    let start = Instant::now();
    let response = match mutate(&request) {
        Ok(response) => response,
        Err(e) => {
            error!("Failed to default {:?}: {}", request.name, e);
            AdmissionResponse::from(&request).deny(e.to_string())
        }
    };
    state.metrics.observe(
        "mutating",
        &request.kind.kind,
        response.allowed,
        start.elapsed().as_secs_f64(),
    );
    Json(response.into_review())
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

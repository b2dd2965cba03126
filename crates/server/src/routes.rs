use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use pedido_agent::ConversationRuntime;
use pedido_core::domain::customer::CustomerId;
use pedido_core::domain::notification::Channel;
use pedido_core::domain::order::{OrderId, OrderStatus};
use pedido_core::errors::DomainError;
use pedido_core::lifecycle::{OrderLifecycleManager, StatusSnapshot};

#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<ConversationRuntime>,
    pub lifecycle: Arc<OrderLifecycleManager>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/webhooks/inbound", post(inbound_message))
        .route("/orders/{id}", get(get_order))
        .route("/orders/{id}/transition", post(transition_order))
        .route("/customers/{id}/orders", get(list_customer_orders))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct InboundMessage {
    sender: String,
    text: String,
    channel: String,
}

#[derive(Debug, Serialize)]
struct InboundReply {
    reply: String,
}

#[derive(Debug, Deserialize)]
struct TransitionRequest {
    status: String,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

async fn inbound_message(
    State(state): State<AppState>,
    Json(message): Json<InboundMessage>,
) -> Result<Json<InboundReply>, ApiError> {
    let channel = Channel::parse(&message.channel)
        .ok_or_else(|| unprocessable(format!("unknown channel `{}`", message.channel)))?;

    let reply = state.runtime.handle_inbound_message(&message.sender, &message.text, channel).await;
    Ok(Json(InboundReply { reply }))
}

async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StatusSnapshot>, ApiError> {
    let order = state.lifecycle.get_order(&OrderId(id)).await.map_err(domain_error)?;
    Ok(Json(StatusSnapshot::of(&order)))
}

async fn transition_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<TransitionRequest>,
) -> Result<Json<StatusSnapshot>, ApiError> {
    let status = OrderStatus::parse(&request.status)
        .ok_or_else(|| unprocessable(format!("unknown order status `{}`", request.status)))?;

    let order = state
        .lifecycle
        .transition(&OrderId(id), status, request.reason.as_deref())
        .await
        .map_err(domain_error)?;
    Ok(Json(StatusSnapshot::of(&order)))
}

async fn list_customer_orders(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<StatusSnapshot>>, ApiError> {
    let orders = state
        .lifecycle
        .list_orders_for_customer(&CustomerId(id))
        .await
        .map_err(domain_error)?;
    Ok(Json(orders.iter().map(StatusSnapshot::of).collect()))
}

fn domain_error(error: DomainError) -> ApiError {
    let status = match &error {
        DomainError::NotFound { .. } => StatusCode::NOT_FOUND,
        DomainError::InvalidTransition { .. } | DomainError::Conflict { .. } => {
            StatusCode::CONFLICT
        }
        DomainError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        DomainError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ErrorBody { error: error.to_string() }))
}

fn unprocessable(message: String) -> ApiError {
    (StatusCode::UNPROCESSABLE_ENTITY, Json(ErrorBody { error: message }))
}

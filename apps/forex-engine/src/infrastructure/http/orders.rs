//! Order endpoints.

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::Deserialize;

use super::AppState;
use super::error::ApiError;
use crate::application::ports::OrderFilter;
use crate::application::services::SubmitOrder;
use crate::domain::order::{AccountId, Order, OrderId, OrderStatus};

/// Query string of `GET /orders`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListOrdersQuery {
    /// Only this account's orders.
    pub account: Option<String>,
    /// Only orders in this status.
    pub status: Option<String>,
}

impl ListOrdersQuery {
    fn into_filter(self) -> Result<OrderFilter, ApiError> {
        let account_id = self.account.as_deref().map(AccountId::parse).transpose()?;
        let status = self
            .status
            .map(|raw| {
                OrderStatus::from_str_case_insensitive(&raw)
                    .ok_or_else(|| ApiError::validation(format!("unknown status '{raw}'")))
            })
            .transpose()?;
        Ok(OrderFilter { account_id, status })
    }
}

/// `POST /orders`
pub async fn submit_order(
    State(state): State<AppState>,
    payload: Result<Json<SubmitOrder>, JsonRejection>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let Json(request) = payload?;
    let order = state.gateway.submit(request)?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// `GET /orders`
pub async fn list_orders(
    State(state): State<AppState>,
    query: Result<Query<ListOrdersQuery>, QueryRejection>,
) -> Result<Json<Vec<Order>>, ApiError> {
    let Query(query) = query?;
    let filter = query.into_filter()?;
    Ok(Json(state.gateway.list(&filter)))
}

/// `GET /orders/{id}`
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    Ok(Json(state.gateway.get(&OrderId::new(id))?))
}

/// `DELETE /orders/{id}`
pub async fn cancel_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    Ok(Json(state.gateway.cancel(&OrderId::new(id))?))
}

/// `POST /orders/{id}/execute`
pub async fn execute_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    Ok(Json(state.gateway.execute(&OrderId::new(id))?))
}

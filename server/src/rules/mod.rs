//! Host for the online-ticket decision graph.
//!
//! The graph is a JSON decision model evaluated by `zen-engine`. It is read
//! once at startup and shared read-only by every request.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error};
use zen_engine::model::DecisionContent;
use zen_engine::DecisionEngine;

use crate::utils::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OnlineTicketInput {
    pub is_ticket_first_sold_out: bool,
    pub is_ticket_sold_out: bool,
    pub total_seat: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OnlineTicketVerdict {
    pub seats: i64,
}

#[async_trait]
pub trait OnlineTicketRules: Send + Sync {
    async fn evaluate(&self, input: OnlineTicketInput) -> AppResult<OnlineTicketVerdict>;
}

pub struct ZenOnlineTicketRules {
    content: Arc<DecisionContent>,
}

impl ZenOnlineTicketRules {
    pub fn from_json(graph: &str) -> AppResult<Self> {
        let content: DecisionContent = serde_json::from_str(graph)
            .map_err(|e| AppError::internal(format!("invalid decision graph: {e}")))?;
        Ok(Self {
            content: Arc::new(content),
        })
    }

    pub fn from_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let graph = std::fs::read_to_string(path).map_err(|e| {
            AppError::internal(format!("failed to read decision graph {}: {e}", path.display()))
        })?;
        Self::from_json(&graph)
    }
}

#[async_trait]
impl OnlineTicketRules for ZenOnlineTicketRules {
    async fn evaluate(&self, input: OnlineTicketInput) -> AppResult<OnlineTicketVerdict> {
        let context = serde_json::to_value(input).map_err(|e| {
            error!(error = %e, "Failed to encode rule input");
            AppError::internal("failed to encode rule input")
        })?;
        let content = Arc::clone(&self.content);

        // The engine's values are not Send, so evaluation stays on one
        // blocking thread and only plain JSON crosses back.
        let result = tokio::task::spawn_blocking(move || -> Result<Value, String> {
            let engine = DecisionEngine::default();
            let decision = engine.create_decision(content);
            let response = futures::executor::block_on(decision.evaluate(context.into()))
                .map_err(|e| e.to_string())?;
            serde_json::to_value(&response.result).map_err(|e| e.to_string())
        })
        .await
        .map_err(|e| {
            error!(error = %e, "Rule evaluation task failed");
            AppError::internal("rule evaluation task failed")
        })?
        .map_err(|e| {
            error!(error = %e, "Rule evaluation failed");
            AppError::internal("rule evaluation failed")
        })?;

        debug!(?input, result = %result, "Online ticket rule evaluated");
        seats_from(&result)
    }
}

fn seats_from(result: &Value) -> AppResult<OnlineTicketVerdict> {
    let seats = &result["seats"];
    let seats = seats
        .as_i64()
        .or_else(|| seats.as_f64().map(|f| f.trunc() as i64))
        .or_else(|| seats.as_str().and_then(|s| s.trim().parse::<f64>().ok()).map(|f| f.trunc() as i64))
        .ok_or_else(|| {
            error!(%result, "Rule result has no numeric seats");
            AppError::internal("rule result has no numeric seats")
        })?;
    Ok(OnlineTicketVerdict { seats })
}

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use fairsched_core::{Task, ATTR_TENANT_ID};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::error::DispatchError;
use crate::usage::CompletionNotice;

/// Tenant carried downstream when a task's payload names none.
pub const DEFAULT_TENANT: &str = "default";

/// Everything the execution substrate needs to start one unit of work.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchRequest {
    pub workflow_type: String,
    pub workflow_id: String,
    pub payload: HashMap<String, serde_json::Value>,
    pub task_queue: String,
}

impl DispatchRequest {
    /// Build a request from a selected task; the payload is forwarded verbatim.
    pub fn from_task(task: Task, task_queue: impl Into<String>) -> Self {
        Self {
            workflow_type: task.workflow_type,
            workflow_id: task.workflow_id,
            payload: task.payload,
            task_queue: task_queue.into(),
        }
    }

    /// Tenant memo attached to the started unit: payload `tenantId`, else `"default"`.
    pub fn tenant(&self) -> &str {
        self.payload
            .get(ATTR_TENANT_ID)
            .and_then(|v| v.as_str())
            .unwrap_or(DEFAULT_TENANT)
    }
}

/// Hands selected tasks to the external execution substrate.
///
/// The loop spawns each call and never waits on it until drain, so
/// failures surface only then.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, request: DispatchRequest) -> Result<(), DispatchError>;
}

/// Blanket implementation so `Arc<dyn Dispatcher>` can be used directly.
#[async_trait]
impl<T: Dispatcher + ?Sized> Dispatcher for Arc<T> {
    async fn dispatch(&self, request: DispatchRequest) -> Result<(), DispatchError> {
        (**self).dispatch(request).await
    }
}

/// Dispatcher that only logs each request.
///
/// With a notice channel attached it also reports every request as
/// finished immediately, which feeds the usage bridge in local runs.
#[derive(Debug, Default, Clone)]
pub struct LoggingDispatcher {
    notices: Option<mpsc::UnboundedSender<CompletionNotice>>,
}

impl LoggingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_notices(notices: mpsc::UnboundedSender<CompletionNotice>) -> Self {
        Self {
            notices: Some(notices),
        }
    }
}

#[async_trait]
impl Dispatcher for LoggingDispatcher {
    async fn dispatch(&self, request: DispatchRequest) -> Result<(), DispatchError> {
        let started_at = Utc::now();
        info!(
            workflow_type = %request.workflow_type,
            workflow_id = %request.workflow_id,
            task_queue = %request.task_queue,
            tenant = %request.tenant(),
            "dispatched"
        );

        if let Some(tx) = &self.notices {
            let notice = CompletionNotice {
                tenant: Some(request.tenant().to_string()),
                started_at,
                finished_at: Utc::now(),
            };
            if tx.send(notice).is_err() {
                debug!(workflow_id = %request.workflow_id, "usage notice channel closed");
            }
        }
        Ok(())
    }
}

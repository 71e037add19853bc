//! Background task registry
//!
//! Cache puts and analytics writes must survive the response that triggered
//! them (spec §5). `BackgroundWorker` is a single-writer actor that tracks
//! spawned tasks by id so status can be queried and shutdown can wait for a
//! bounded drain, without a shared mutex guarding task state.

use std::sync::Arc;
use std::time::Duration;

use acton_reactive::prelude::*;
use dashmap::DashMap;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use super::messages::{
    CancelTask, GetAllTaskStatuses, GetTaskStatus, SubmitTask, TaskFinished, TaskStatusResponse,
};

/// Lifecycle of a single submitted task.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum TaskStatus {
    #[default]
    Running,
    Completed,
    Failed(String),
    Cancelled,
}

/// Actor state: task statuses and the cancellation tokens of tasks still running.
/// Held once, here, and shared with the `BackgroundWorker` handle via `Arc` so
/// `submit`/`status`/`drain` can read it without a message round-trip, while all
/// writes still flow through the agent's message handlers.
#[derive(Debug, Default)]
pub struct BackgroundWorkerState {
    statuses: Arc<DashMap<String, TaskStatus>>,
    tokens: Arc<DashMap<String, CancellationToken>>,
}

/// Handle used by the rest of the application to submit fire-and-forget work.
#[derive(Clone)]
pub struct BackgroundWorker {
    agent: AgentHandle,
    statuses: Arc<DashMap<String, TaskStatus>>,
    tokens: Arc<DashMap<String, CancellationToken>>,
}

impl BackgroundWorker {
    pub async fn spawn(runtime: &mut AgentRuntime) -> anyhow::Result<Self> {
        let statuses = Arc::new(DashMap::new());
        let tokens = Arc::new(DashMap::new());

        let mut agent = runtime.new_agent::<BackgroundWorkerState>();
        agent.model.statuses = statuses.clone();
        agent.model.tokens = tokens.clone();

        agent.mutate_on::<SubmitTask>(|agent, envelope| {
            let msg = envelope.message();
            agent.model.statuses.insert(msg.task_id.clone(), TaskStatus::Running);
            tracing::debug!(task_id = %msg.task_id, label = %msg.label, "background task submitted");
            AgentReply::immediate()
        });

        agent.mutate_on::<TaskFinished>(|agent, envelope| {
            let msg = envelope.message();
            let status = match &msg.error {
                Some(e) => TaskStatus::Failed(e.clone()),
                None => TaskStatus::Completed,
            };
            agent.model.statuses.insert(msg.task_id.clone(), status);
            agent.model.tokens.remove(&msg.task_id);
            AgentReply::immediate()
        });

        agent.mutate_on::<CancelTask>(|agent, envelope| {
            let msg = envelope.message();
            if let Some((_, token)) = agent.model.tokens.remove(&msg.task_id) {
                token.cancel();
                agent.model.statuses.insert(msg.task_id.clone(), TaskStatus::Cancelled);
            }
            AgentReply::immediate()
        });

        agent.act_on::<GetTaskStatus>(|agent, envelope| {
            let msg = envelope.message().clone();
            let status = agent
                .model
                .statuses
                .get(&msg.task_id)
                .map(|s| s.clone())
                .unwrap_or(TaskStatus::Failed("unknown task id".to_string()));
            let reply_envelope = envelope.reply_envelope();
            AgentReply::from_async(async move {
                reply_envelope
                    .send(TaskStatusResponse { task_id: msg.task_id, status })
                    .await;
            })
        });

        agent.act_on::<GetAllTaskStatuses>(|agent, envelope| {
            let all: Vec<TaskStatusResponse> = agent
                .model
                .statuses
                .iter()
                .map(|entry| TaskStatusResponse {
                    task_id: entry.key().clone(),
                    status: entry.value().clone(),
                })
                .collect();
            let reply_envelope = envelope.reply_envelope();
            AgentReply::from_async(async move {
                reply_envelope.send(all).await;
            })
        });

        agent.after_start(|_agent| {
            tracing::info!("background worker started");
            AgentReply::immediate()
        });

        agent.before_stop(|agent| {
            let running = agent
                .model
                .statuses
                .iter()
                .filter(|e| *e.value() == TaskStatus::Running)
                .count();
            tracing::info!(running, "background worker stopping");
            AgentReply::immediate()
        });

        agent.handle().subscribe::<SubmitTask>().await;
        agent.handle().subscribe::<TaskFinished>().await;
        agent.handle().subscribe::<CancelTask>().await;
        agent.handle().subscribe::<GetTaskStatus>().await;
        agent.handle().subscribe::<GetAllTaskStatuses>().await;

        let handle = agent.start().await;

        Ok(Self { agent: handle, statuses, tokens })
    }

    /// Submit a labeled future to run to completion independent of the request
    /// that spawned it. Cancellation is cooperative: the future receives a
    /// `CancellationToken` it may poll, but is not forcibly aborted.
    pub fn submit<F>(&self, label: impl Into<String>, task_id: impl Into<String>, fut: F)
    where
        F: FnOnce(CancellationToken) -> BoxFuture<'static, anyhow::Result<()>> + Send + 'static,
    {
        let task_id = task_id.into();
        let label = label.into();
        let token = CancellationToken::new();
        self.tokens.insert(task_id.clone(), token.clone());
        self.statuses.insert(task_id.clone(), TaskStatus::Running);

        let agent = self.agent.clone();
        let submit_task_id = task_id.clone();
        let submit_label = label.clone();
        tokio::spawn(async move {
            agent
                .send(SubmitTask { task_id: submit_task_id, label: submit_label })
                .await;
        });

        let agent = self.agent.clone();
        tokio::spawn(async move {
            let result = fut(token).await;
            let error = result.err().map(|e| e.to_string());
            if let Some(e) = &error {
                tracing::warn!(task_id = %task_id, label = %label, error = %e, "background task failed");
            }
            agent.send(TaskFinished { task_id, error }).await;
        });
    }

    pub fn status(&self, task_id: &str) -> TaskStatus {
        self.statuses
            .get(task_id)
            .map(|s| s.clone())
            .unwrap_or(TaskStatus::Failed("unknown task id".to_string()))
    }

    /// Wait up to `timeout` for all currently-tracked tasks to leave `Running`.
    pub async fn drain(&self, timeout: Duration) {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let running = self
                .statuses
                .iter()
                .filter(|e| *e.value() == TaskStatus::Running)
                .count();
            if running == 0 || tokio::time::Instant::now() >= deadline {
                if running > 0 {
                    tracing::warn!(running, "background worker drain timed out");
                }
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_status_equality() {
        assert_eq!(TaskStatus::Running, TaskStatus::Running);
        assert_ne!(TaskStatus::Completed, TaskStatus::Cancelled);
        assert_eq!(TaskStatus::Failed("x".into()), TaskStatus::Failed("x".into()));
    }
}

//! Frequency service and background task feed over HTTP.
//!
//! - `POST /freqs` answers a frequency list or a pending task handle
//! - `GET /freqs/results/{ref}` fetches a finished task's list
//! - `GET /tasks` lists background tasks of the session

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use tracing::debug;

use concordia_core::{
    FreqItem, FreqOutcome, FreqRequest, FrequencyService, Result, TaskInfo, TaskStatusFeed,
};

use crate::client::{segment, ConcordiaClient};

#[derive(Deserialize)]
struct ResultResponse {
    items: Vec<FreqItem>,
}

#[derive(Deserialize)]
struct TasksResponse {
    tasks: Vec<TaskInfo>,
}

#[async_trait]
impl FrequencyService for ConcordiaClient {
    async fn freq_list(&self, req: &FreqRequest) -> Result<FreqOutcome> {
        let outcome: FreqOutcome = self
            .send_json(self.request(Method::POST, "/freqs").json(req), "freq_list")
            .await?;
        if let FreqOutcome::Pending { ref task } = outcome {
            debug!(task_id = %task.task_id, cql = %req.cql, "Frequency list deferred");
        }
        Ok(outcome)
    }

    async fn fetch_result(&self, result_ref: &str) -> Result<Vec<FreqItem>> {
        let path = format!("/freqs/results/{}", segment(result_ref));
        let response: ResultResponse = self
            .send_json(self.request(Method::GET, &path), "fetch_result")
            .await?;
        Ok(response.items)
    }
}

#[async_trait]
impl TaskStatusFeed for ConcordiaClient {
    async fn list_tasks(&self) -> Result<Vec<TaskInfo>> {
        let response: TasksResponse = self
            .send_json(self.request(Method::GET, "/tasks"), "list_tasks")
            .await?;
        Ok(response.tasks)
    }
}

//! Job execution endpoints

use crate::AgentClient;
use crate::error::{ClientError, Result};
use kiln_core::domain::job::{JobRequest, JobResult};
use kiln_core::dto::job::JobAccepted;

impl AgentClient {
    /// Runs a job and waits for its result
    ///
    /// The request must not carry a `callback_url`; use
    /// [`AgentClient::submit_job`] for callback delivery.
    ///
    /// # Example
    /// ```no_run
    /// # use kiln_client::AgentClient;
    /// # use kiln_core::domain::job::JobRequest;
    /// # async fn example() -> anyhow::Result<()> {
    /// let client = AgentClient::new("http://localhost:8080", "agent-key");
    /// let result = client.execute_job(&JobRequest::new(1, "c3RlcHM6IFtdCg==")).await?;
    /// println!("exit code: {:?}", result.exit_code);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn execute_job(&self, request: &JobRequest) -> Result<JobResult> {
        if request.callback_url.is_some() {
            return Err(ClientError::InvalidRequest(
                "callback_url is set; use submit_job".to_string(),
            ));
        }

        let url = format!("{}/jobs/execute", self.base_url);
        let response = self.authorized(self.client.post(&url)).json(request).send().await?;

        self.handle_response(response).await
    }

    /// Submits a job whose result is delivered to its `callback_url`
    pub async fn submit_job(&self, request: &JobRequest) -> Result<JobAccepted> {
        if request.callback_url.is_none() {
            return Err(ClientError::InvalidRequest(
                "callback_url is required for asynchronous submission".to_string(),
            ));
        }

        let url = format!("{}/jobs/execute", self.base_url);
        let response = self.authorized(self.client.post(&url)).json(request).send().await?;

        self.handle_response(response).await
    }
}

use tracing::{info, instrument};

use crate::runner::{RequestError, Runner};
use crate::stream::LogStream;
use crate::types::Submission;

impl Runner {
    /// Run a previously built submission and stream its output
    ///
    /// Fails with [`RequestError::MustBuildFirst`] without touching the
    /// sandbox when the workspace holds no source. The job always gets a
    /// stdin, closed right after the submission's input (possibly none) is
    /// written.
    #[instrument(skip(self, submission), fields(language = %submission.language))]
    pub async fn run(&self, submission: &Submission) -> Result<LogStream, RequestError> {
        let language = self.language(&submission.language)?;
        let key = submission.key();
        let guard = self.locks.shared(&key).await;

        if !self.store.exists(&key, language).await {
            return Err(RequestError::MustBuildFirst);
        }

        let stdin = submission
            .stdin
            .as_deref()
            .map(|input| input.as_bytes().to_vec())
            .unwrap_or_default();

        let job = self
            .orchestrator
            .launch(language, &self.store.path(&key), language.run_command(), Some(stdin))
            .await?;
        info!(%key, id = %job.handle, "run started");

        Ok(self.stream_job(job, guard))
    }
}

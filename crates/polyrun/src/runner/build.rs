use tracing::{debug, info, instrument};

use crate::runner::{RequestError, Runner};
use crate::stream::LogStream;
use crate::types::Submission;
use crate::workspace::SubmissionKey;

/// Result of a successful build request
#[derive(Debug)]
pub enum BuildOutcome {
    /// Source saved; the language has no build step
    Staged { key: SubmissionKey },

    /// Build job started; its output follows
    Streaming(LogStream),
}

impl Runner {
    /// Save a submission's source and run the language's build command
    ///
    /// The workspace is held exclusively from the source write until the
    /// build output ends, so concurrent builds and runs of the same
    /// submission wait for it. Rebuilding overwrites the source in place.
    #[instrument(skip(self, submission), fields(language = %submission.language))]
    pub async fn build(&self, submission: &Submission) -> Result<BuildOutcome, RequestError> {
        let language = self.language(&submission.language)?;
        let key = submission.key();
        let guard = self.locks.exclusive(&key).await;

        let workspace = self.store.ensure(&key).await?;
        self.store
            .write_source(&key, language, submission.code.as_bytes())
            .await?;

        if !language.is_compiled() {
            debug!(%key, "no build step, source staged");
            return Ok(BuildOutcome::Staged { key });
        }

        let job = self
            .orchestrator
            .launch(language, &workspace, language.build_command(), None)
            .await?;
        info!(%key, id = %job.handle, "build started");

        Ok(BuildOutcome::Streaming(self.stream_job(job, guard)))
    }
}

use std::sync::Arc;

use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, error, info};

use crate::errors::SyncError;
use crate::policy::polling::{TickOutcome, VersionPollingService};

/// Initialize and start the scheduler with the version polling job.
///
/// The job fires every `polling.interval()`; the first run happens one
/// interval after startup since the initial load already ran.
pub async fn init_scheduler(polling: Arc<VersionPollingService>) -> Result<JobScheduler, SyncError> {
    let sched = JobScheduler::new()
        .await
        .map_err(|e| SyncError::Scheduler(format!("Failed to create job scheduler: {}", e)))?;

    let interval = polling.interval();
    let poll_job = Job::new_repeated_async(interval, move |_uuid, _l| {
        let polling = polling.clone();
        Box::pin(async move {
            run_tick(&polling).await;
        })
    })
    .map_err(|e| SyncError::Scheduler(format!("Failed to create version polling job: {}", e)))?;

    sched
        .add(poll_job)
        .await
        .map_err(|e| SyncError::Scheduler(format!("Failed to add version polling job: {}", e)))?;

    sched
        .start()
        .await
        .map_err(|e| SyncError::Scheduler(format!("Failed to start job scheduler: {}", e)))?;

    info!(interval_secs = interval.as_secs(), "Version polling job scheduled");

    Ok(sched)
}

/// One polling tick. Errors are logged and the next tick proceeds normally.
pub async fn run_tick(polling: &VersionPollingService) {
    match polling.check_version_and_reload().await {
        Ok(TickOutcome::Reloaded { from, to, report }) => {
            info!(from, to, rules = report.loaded, "Policy version changed, policies reloaded");
        }
        Ok(TickOutcome::Unchanged(version)) => {
            debug!(version, "Policy version unchanged");
        }
        Ok(TickOutcome::Skipped) => {
            debug!("Version source returned no value, skipping tick");
        }
        Ok(TickOutcome::Busy) => {
            debug!("Version check still running, tick skipped");
        }
        Ok(TickOutcome::Disabled) => {}
        Err(e) => {
            error!(
                error = %e,
                cached_version = polling.cached_version(),
                "Policy reload after version change failed"
            );
        }
    }
}

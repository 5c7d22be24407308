use anyhow::Result;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::state::SharedState;

/// Periodic housekeeping: expired reset tokens and stale rate limit counters.
pub struct Scheduler {
    state: SharedState,
    cron_expression: String,
}

impl Scheduler {
    #[must_use]
    pub fn new(state: SharedState) -> Self {
        let cron_expression = state.config.general.maintenance_cron.clone();
        Self {
            state,
            cron_expression,
        }
    }

    /// Starts the cron job. The returned handle keeps running until shut down.
    pub async fn start(&self) -> Result<JobScheduler> {
        let sched = JobScheduler::new().await?;

        let state = self.state.clone();
        let job = Job::new_async(self.cron_expression.as_str(), move |_uuid, _lock| {
            let state = state.clone();
            Box::pin(async move {
                if let Err(e) = state.run_maintenance().await {
                    error!("Scheduled maintenance failed: {}", e);
                }
            })
        })?;

        sched.add(job).await?;
        sched.start().await?;

        info!("Maintenance scheduler running with cron: {}", self.cron_expression);
        Ok(sched)
    }

    pub async fn run_once(&self) -> Result<()> {
        info!("Running maintenance now...");
        self.state.run_maintenance().await
    }
}

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::config::Config;
use crate::runner;

/// Wrapper around tokio-cron-scheduler for the in-process polling mode
pub struct Scheduler {
    inner: JobScheduler,
}

impl Scheduler {
    /// Create a scheduler with no jobs
    pub async fn new() -> Result<Self> {
        let inner = JobScheduler::new()
            .await
            .context("Failed to create job scheduler")?;
        Ok(Self { inner })
    }

    /// Add a recurring cron job. `cron_expr` uses the six-field format
    /// with seconds; an invalid expression is an error.
    pub async fn add_cron_job<F>(&self, cron_expr: &str, name: &str, task: F) -> Result<()>
    where
        F: Fn() -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>
            + Send
            + Sync
            + 'static,
    {
        let job_name = name.to_string();
        let job = Job::new_async(cron_expr, move |_uuid, _lock| {
            let name = job_name.clone();
            let fut = task();
            Box::pin(async move {
                info!("Running scheduled task: {}", name);
                fut.await;
            })
        })
        .with_context(|| format!("Invalid cron expression for {}: {}", name, cron_expr))?;

        self.inner
            .add(job)
            .await
            .with_context(|| format!("Failed to add job: {}", name))?;

        info!("Scheduled task '{}' with cron: {}", name, cron_expr);
        Ok(())
    }

    /// Start running the added jobs in the background
    pub async fn start(&self) -> Result<()> {
        self.inner
            .start()
            .await
            .context("Failed to start scheduler")?;
        info!("Scheduler started");
        Ok(())
    }

    /// Stop the scheduler and drop its jobs
    pub async fn shutdown(&mut self) -> Result<()> {
        self.inner
            .shutdown()
            .await
            .context("Failed to shutdown scheduler")?;
        info!("Scheduler stopped");
        Ok(())
    }
}

/// Runs the polling cycle on `scheduler.cron` until Ctrl-C.
///
/// A failed cycle is logged and the next tick starts from scratch.
pub async fn run(config: Arc<Config>) -> Result<()> {
    let mut scheduler = Scheduler::new().await?;

    let cron = config.scheduler.cron.clone();
    scheduler
        .add_cron_job(&cron, "polling cycle", move || {
            let config = Arc::clone(&config);
            Box::pin(async move {
                if let Err(e) = runner::run_cycle(&config).await {
                    error!("Polling cycle failed: {:#}", e);
                }
            })
        })
        .await?;

    scheduler.start().await?;
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown requested");
    scheduler.shutdown().await
}

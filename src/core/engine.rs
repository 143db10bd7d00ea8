//! Monitor - owns the alert store and drives both recurring tasks

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::{DetectionScheduler, PassSummary, StatsReporter};
use crate::alerts::{AlertStatistics, AlertStore};
use crate::config::Config;
use crate::detection::DetectorSet;
use crate::error::MonitorError;
use crate::positions::PositionGateway;

/// Disruption monitor.
///
/// Built once with validated configuration and a gateway; `start` launches the
/// detection scheduler and the statistics reporter, `stop` halts both and
/// waits for any in-flight pass.
///
/// Dropping a running monitor only signals shutdown. The tasks finish their
/// in-flight pass on the runtime in the background; `stop().await` is the only
/// way to wait for that.
pub struct Monitor {
    config: Arc<Config>,
    alerts: Arc<AlertStore>,
    scheduler: Arc<DetectionScheduler>,
    reporter: Arc<StatsReporter>,
    shutdown_tx: Option<broadcast::Sender<()>>,
    tasks: Vec<JoinHandle<()>>,
    start_time: Option<Instant>,
}

impl Monitor {
    pub fn new(config: Config, gateway: Arc<dyn PositionGateway>) -> Result<Self, MonitorError> {
        config.validate()?;
        let config = Arc::new(config);

        let alerts = Arc::new(AlertStore::new(config.alerts.recent_capacity));
        let scheduler = Arc::new(DetectionScheduler::new(
            DetectorSet::from_config(&config.detection)
                .with_timeout(config.scheduling.query_timeout()),
            gateway,
            Arc::clone(&alerts),
            config.scheduling.poll_interval(),
        ));
        let reporter = Arc::new(StatsReporter::new(
            Arc::clone(&alerts),
            config.scheduling.stats_interval(),
            config.alerts.report_sample_size,
            config.alerts.report_format,
        ));

        Ok(Self {
            config,
            alerts,
            scheduler,
            reporter,
            shutdown_tx: None,
            tasks: Vec::new(),
            start_time: None,
        })
    }

    pub fn start(&mut self) -> Result<(), MonitorError> {
        if self.shutdown_tx.is_some() {
            return Err(MonitorError::AlreadyRunning);
        }

        info!("Starting disruption monitor...");
        let (shutdown_tx, _) = broadcast::channel(1);

        let scheduler = Arc::clone(&self.scheduler);
        let scheduler_shutdown = shutdown_tx.subscribe();
        self.tasks.push(tokio::spawn(async move {
            scheduler.run(scheduler_shutdown).await;
        }));

        let reporter = Arc::clone(&self.reporter);
        let reporter_shutdown = shutdown_tx.subscribe();
        self.tasks.push(tokio::spawn(async move {
            reporter.run(reporter_shutdown).await;
        }));

        self.shutdown_tx = Some(shutdown_tx);
        self.start_time = Some(Instant::now());

        info!("Disruption monitor started");
        Ok(())
    }

    /// Stop both tasks and wait for them. A no-op when not running.
    pub async fn stop(&mut self) -> Result<(), MonitorError> {
        let Some(shutdown_tx) = self.shutdown_tx.take() else {
            return Ok(());
        };

        info!("Stopping disruption monitor...");
        let _ = shutdown_tx.send(());

        let mut first_error = None;
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!("Monitor task ended abnormally: {}", e);
                first_error.get_or_insert(MonitorError::from(e));
            }
        }

        info!("Disruption monitor stopped");
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Run a single detection pass outside the schedule
    pub async fn run_once(&self) -> PassSummary {
        self.scheduler.run_pass().await
    }

    /// Point-in-time copy of counts and recent alerts
    pub fn statistics(&self) -> AlertStatistics {
        self.alerts.snapshot()
    }

    pub fn alert_store(&self) -> Arc<AlertStore> {
        Arc::clone(&self.alerts)
    }

    pub fn reporter(&self) -> &StatsReporter {
        &self.reporter
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.shutdown_tx.is_some()
    }

    pub fn uptime(&self) -> u64 {
        self.start_time.map(|t| t.elapsed().as_secs()).unwrap_or(0)
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        // Signal only. The handles detach and each task exits after its
        // current pass, bounded by the query timeout.
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
    }
}

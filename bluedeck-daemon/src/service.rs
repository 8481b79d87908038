use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

use crate::aggregator::DeviceAggregator;
use crate::config::DaemonConfig;
use crate::device::{Address, Device};
use crate::dispatcher::{Action, CommandDispatcher};
use crate::error::Result;
use crate::jobs::{Job, JobRegistry};
use crate::process::CommandRunner;

/// Everything a request handler needs, built once at startup and shared.
pub struct BluedeckService {
    aggregator: DeviceAggregator,
    dispatcher: CommandDispatcher,
    jobs: Arc<JobRegistry>,
}

impl BluedeckService {
    pub fn new(runner: Arc<dyn CommandRunner>, config: &DaemonConfig) -> Self {
        let jobs = Arc::new(JobRegistry::new());
        Self {
            aggregator: DeviceAggregator::new(Arc::clone(&runner), config),
            dispatcher: CommandDispatcher::new(runner, Arc::clone(&jobs), config),
            jobs,
        }
    }

    pub async fn devices(&self) -> Result<Vec<Device>> {
        self.aggregator.snapshot().await
    }

    pub async fn scanning(&self) -> Result<bool> {
        self.aggregator.is_scanning().await
    }

    pub async fn battery(&self, mac: &str) -> Result<(Address, Option<u8>)> {
        let mac: Address = mac.parse()?;
        let battery = self.aggregator.battery(&mac).await;
        Ok((mac, battery))
    }

    pub async fn action(&self, action: Action, mac: &str) -> Result<String> {
        self.dispatcher.execute(action, mac).await
    }

    pub async fn set_volume(&self, mac: &str, volume: &Value) -> Result<bool> {
        self.dispatcher.set_volume(mac, volume).await
    }

    /// Kicks off discovery and returns the job as it was registered.
    /// Its progress is read back with [`BluedeckService::job`].
    pub async fn scan_on(&self) -> Job {
        self.dispatcher.scan_on().await.job
    }

    pub async fn job(&self, id: Uuid) -> Result<Job> {
        self.jobs.get(id).await
    }
}

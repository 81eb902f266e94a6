use crate::adaptor::{ChannelRegistrar, SensorAdaptor};
use crate::enabler::ChannelKey;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};

/// Interval-mode host: reads every registered channel file once per
/// interval, in channel order, and hands the bytes to the adaptor.
#[derive(Debug, Default)]
pub struct IntervalPoller {
    channels: Vec<(PathBuf, ChannelKey)>,
}

impl ChannelRegistrar for IntervalPoller {
    fn register_readable(&mut self, path: &Path, key: ChannelKey) {
        self.channels.push((path.to_path_buf(), key));
    }
}

impl IntervalPoller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn channels(&self) -> &[(PathBuf, ChannelKey)] {
        &self.channels
    }

    /// Run the polling loop until `shutdown` flips to true.
    pub fn spawn(
        mut self,
        adaptor: Arc<Mutex<SensorAdaptor>>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        self.channels.sort_by_key(|(_, key)| *key);

        tokio::spawn(async move {
            loop {
                if *shutdown.borrow() {
                    break;
                }

                for (path, key) in &self.channels {
                    let bytes = match tokio::fs::read(path).await {
                        Ok(bytes) => bytes,
                        Err(e) => {
                            warn!("[poller] read of {} failed: {}", path.display(), e);
                            // An empty read drops the cycle in progress
                            Vec::new()
                        }
                    };
                    adaptor.lock().await.process_sample(*key, &bytes);
                }

                tokio::select! {
                    _ = sleep(interval) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        })
    }
}

/// Start every adaptor and spawn one polling task per adaptor.
/// Adaptors that fail to start are logged and skipped.
pub async fn spawn_adaptor_tasks(
    adaptors: &[Arc<Mutex<SensorAdaptor>>],
    shutdown: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::new();

    for adaptor in adaptors {
        let mut poller = IntervalPoller::new();
        let (id, interval) = {
            let mut guard = adaptor.lock().await;
            if let Err(e) = guard.start(&mut poller) {
                error!("[{}] not started: {}", guard.id(), e);
                continue;
            }
            (guard.id().to_string(), guard.interval())
        };

        info!("[{}] polling {} channel(s) every {} ms", id, poller.channels().len(), interval);
        handles.push(poller.spawn(adaptor.clone(), Duration::from_millis(interval), shutdown.clone()));
    }

    handles
}

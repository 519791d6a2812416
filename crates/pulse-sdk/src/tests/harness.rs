//! Shared setup for client tests.

use crate::{DeviceInfo, Pulse, StaticDeviceInfo};
use pulse_config_and_utils::{Config, Paths};
use pulse_outbox::testing::{RecordedRequest, ScriptedTransport};
use pulse_outbox::QueuedDelivery;
use pulse_storage::{KeyValueStore, MemoryKeyValueStore};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub(crate) const WAIT: Duration = Duration::from_secs(5);

pub(crate) fn test_config() -> Config {
    let mut config = Config::new("pk_test");
    config.api_url = "https://collector.test".to_string();
    // Keep the interval out of the way; tests trigger passes explicitly.
    config.flush_interval_secs = 3600;
    config
}

pub(crate) fn test_device(ad_tracking_allowed: bool) -> Arc<StaticDeviceInfo> {
    Arc::new(
        StaticDeviceInfo::new(DeviceInfo {
            os_version: "14.2".to_string(),
            locale: "en_GB".to_string(),
            app_version: "2.3.0".to_string(),
            device_model: "Pixel 8".to_string(),
        })
        .with_ad_tracking(ad_tracking_allowed),
    )
}

pub(crate) struct TestClient {
    pub dir: TempDir,
    pub pulse: Pulse,
    pub transport: Arc<ScriptedTransport>,
}

impl TestClient {
    pub fn new(transport: ScriptedTransport) -> Self {
        Self::with_config(test_config(), transport, true)
    }

    pub fn with_config(config: Config, transport: ScriptedTransport, ad_tracking_allowed: bool) -> Self {
        Self::build(config, transport, ad_tracking_allowed, Arc::new(MemoryKeyValueStore::new()))
    }

    /// Client over a caller-supplied identity backend.
    pub fn with_store(transport: ScriptedTransport, store: Arc<dyn KeyValueStore>) -> Self {
        Self::build(test_config(), transport, true, store)
    }

    fn build(
        config: Config,
        transport: ScriptedTransport,
        ad_tracking_allowed: bool,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(transport);
        let pulse = Pulse::with_transport(
            config,
            Paths::with_base_dir(dir.path().to_path_buf()),
            test_device(ad_tracking_allowed),
            store,
            transport.clone(),
        )
        .unwrap();
        Self {
            dir,
            pulse,
            transport,
        }
    }

    pub fn paths(&self) -> Paths {
        Paths::with_base_dir(self.dir.path().to_path_buf())
    }

    pub fn queued(&self) -> Vec<QueuedDelivery> {
        self.pulse.pending_deliveries().unwrap()
    }

    /// Requests whose endpoint starts with `prefix`.
    pub fn requests_to(&self, prefix: &str) -> Vec<RecordedRequest> {
        self.transport
            .requests()
            .into_iter()
            .filter(|r| r.endpoint.starts_with(prefix))
            .collect()
    }
}

/// Poll `condition` until it holds or [`WAIT`] passes.
pub(crate) async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .is_ok()
}

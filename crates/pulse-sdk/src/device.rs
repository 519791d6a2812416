//! Device information supplied by the host.

/// Static facts about the device and app, attached to every event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub os_version: String,
    pub locale: String,
    pub app_version: String,
    pub device_model: String,
}

/// Host hook for device facts and the platform ad-tracking permission.
pub trait DeviceInfoProvider: Send + Sync {
    fn device_info(&self) -> DeviceInfo;

    /// Whether the platform allows tracking this user.
    fn ad_tracking_allowed(&self) -> bool {
        true
    }
}

/// Fixed [`DeviceInfoProvider`].
#[derive(Debug, Clone)]
pub struct StaticDeviceInfo {
    info: DeviceInfo,
    ad_tracking_allowed: bool,
}

impl StaticDeviceInfo {
    pub fn new(info: DeviceInfo) -> Self {
        Self {
            info,
            ad_tracking_allowed: true,
        }
    }

    /// Facts about the machine running this process.
    pub fn host() -> Self {
        let locale = std::env::var("LC_ALL")
            .or_else(|_| std::env::var("LANG"))
            .ok()
            .and_then(|raw| raw.split('.').next().map(str::to_string))
            .filter(|locale| !locale.is_empty())
            .unwrap_or_else(|| "en_US".to_string());

        Self::new(DeviceInfo {
            os_version: std::env::consts::OS.to_string(),
            locale,
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            device_model: std::env::consts::ARCH.to_string(),
        })
    }

    pub fn with_ad_tracking(mut self, allowed: bool) -> Self {
        self.ad_tracking_allowed = allowed;
        self
    }
}

impl DeviceInfoProvider for StaticDeviceInfo {
    fn device_info(&self) -> DeviceInfo {
        self.info.clone()
    }

    fn ad_tracking_allowed(&self) -> bool {
        self.ad_tracking_allowed
    }
}

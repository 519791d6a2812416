//! Wire payloads sent to the collector.

use crate::{DeviceInfo, Properties};
use pulse_intake_guard::Fingerprint;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Version reported in every event context.
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Collector endpoint paths, relative to the configured base URL.
pub mod endpoints {
    pub const SCREEN_VIEW: &str = "/api/track/event";
    pub const CUSTOM_EVENT: &str = "/api/track/custom-event";
    pub const IDENTIFY: &str = "/api/track/identify";

    /// Beacon endpoint. The API key travels in the query string.
    pub fn beacon(api_key: &str) -> String {
        with_api_key("/api/track/beacon", api_key)
    }

    /// Error endpoint. The API key travels in the query string.
    pub fn errors(api_key: &str) -> String {
        with_api_key("/api/track/errors", api_key)
    }

    fn with_api_key(path: &str, api_key: &str) -> String {
        let encoded: String = url::form_urlencoded::byte_serialize(api_key.as_bytes()).collect();
        format!("{path}?apiKey={encoded}")
    }
}

/// Error severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Debug,
    Info,
    Warning,
    #[default]
    Error,
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Fatal => "fatal",
        };
        f.write_str(name)
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            "fatal" => Ok(Self::Fatal),
            other => Err(format!("unknown severity: {other}")),
        }
    }
}

/// An error to report, independent of where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    pub message: String,
    pub stack: Option<String>,
    /// Where the error was raised, such as `file.rs:10:5`.
    pub source: Option<String>,
    pub error_type: String,
}

impl ErrorReport {
    pub fn new(message: impl Into<String>, error_type: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack: None,
            source: None,
            error_type: error_type.into(),
        }
    }

    /// Report for a Rust error value. The `source()` chain becomes the stack.
    pub fn from_error<E: std::error::Error + ?Sized>(error: &E) -> Self {
        let mut causes = Vec::new();
        let mut next = error.source();
        while let Some(cause) = next {
            causes.push(format!("caused by: {cause}"));
            next = cause.source();
        }

        let type_name = std::any::type_name::<E>();
        let short_name = type_name.rsplit("::").next().unwrap_or(type_name);

        Self {
            message: error.to_string(),
            stack: (!causes.is_empty()).then(|| causes.join("\n")),
            source: None,
            error_type: short_name.to_string(),
        }
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Device and attribution context attached to payloads.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventContext {
    pub os_version: String,
    pub locale: String,
    pub app_version: String,
    pub device_model: String,
    pub sdk_version: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_referrer: Option<String>,
}

impl EventContext {
    pub(crate) fn new(
        device: DeviceInfo,
        referrer: Option<String>,
        original_referrer: Option<String>,
    ) -> Self {
        Self {
            os_version: device.os_version,
            locale: device.locale,
            app_version: device.app_version,
            device_model: device.device_model,
            sdk_version: SDK_VERSION,
            referrer,
            original_referrer,
        }
    }
}

/// Fields shared by every payload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Envelope {
    pub visitor_id: String,
    pub session_id: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ScreenViewPayload {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub screen_name: String,
    pub properties: Properties,
    pub context: EventContext,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ScreenDurationPayload {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub screen_name: String,
    pub duration_ms: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CustomEventPayload {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub event_name: String,
    pub properties: Properties,
    pub context: EventContext,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct IdentifyPayload {
    #[serde(flatten)]
    pub envelope: Envelope,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub metadata: Properties,
    pub context: EventContext,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ErrorPayload {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub severity: Severity,
    pub error_type: String,
    /// Caller-supplied properties describing the situation.
    pub context: Properties,
    /// Device and attribution context.
    pub device: EventContext,
    pub fingerprint: Fingerprint,
}

//! # Pulse SDK
//!
//! Client-side analytics and error reporting. Events are encoded on a
//! background task, sent immediately when possible, and otherwise kept in a
//! durable on-disk queue that is drained on a timer, when the network comes
//! back, and when the host returns to the foreground.
//!
//! ## Example
//!
//! ```ignore
//! use pulse_sdk::{Pulse, StaticDeviceInfo};
//! use pulse_config_and_utils::{Config, Paths};
//! use pulse_storage::FileKeyValueStore;
//!
//! let paths = Paths::new()?;
//! let store = Arc::new(FileKeyValueStore::open(paths.identity_file())?);
//! let pulse = Pulse::new(Config::new("pk_live"), paths, Arc::new(StaticDeviceInfo::host()), store)?;
//!
//! pulse.track_custom_event("signup", Properties::new());
//! ```

mod client;
mod crash;
mod device;
mod dispatch;
mod error;
mod events;
mod value;

#[cfg(test)]
mod tests;

pub use client::Pulse;
pub use crash::PanicCapture;
pub use device::{DeviceInfo, DeviceInfoProvider, StaticDeviceInfo};
pub use dispatch::{DispatchOutcome, PendingDispatch};
pub use error::{ClientError, ClientResult};
pub use events::{endpoints, ErrorReport, EventContext, Severity, SDK_VERSION};
pub use value::{Properties, PropertyValue};

pub use pulse_outbox::{DrainReport, NetworkState, QueuedDelivery};

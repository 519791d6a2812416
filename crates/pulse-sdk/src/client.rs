//! The Pulse client context.

use crate::events::{
    endpoints, CustomEventPayload, Envelope, ErrorPayload, EventContext, IdentifyPayload,
    ScreenDurationPayload, ScreenViewPayload,
};
use crate::{
    ClientError, ClientResult, DeviceInfoProvider, DispatchOutcome, ErrorReport, PendingDispatch,
    Properties, Severity,
};
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use pulse_config_and_utils::{Config, CoreError, Paths};
use pulse_intake_guard::{normalize_stack, Fingerprint, IntakeDecision, IntakeGuard, IntakeGuardConfig};
use pulse_outbox::{
    ConnectivityMonitor, DeliveryEngine, DrainReport, FlushScheduler, FlushTrigger, HttpTransport,
    NetworkState, QueueStore, QueuedDelivery, SenderConfig, Transport,
};
use pulse_storage::{IdentityStore, KeyValueStore};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::time::Instant;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Queue directories owned by live clients.
static CLAIMED_QUEUES: Mutex<BTreeSet<PathBuf>> = parking_lot::const_mutex(BTreeSet::new());

/// Exclusive ownership of a queue directory for the life of a client.
#[derive(Debug)]
struct QueueClaim {
    dir: PathBuf,
}

impl QueueClaim {
    fn acquire(dir: PathBuf) -> ClientResult<Self> {
        let dir = dir.canonicalize().unwrap_or(dir);
        if !CLAIMED_QUEUES.lock().insert(dir.clone()) {
            return Err(ClientError::AlreadyConfigured(dir));
        }
        Ok(Self { dir })
    }
}

impl Drop for QueueClaim {
    fn drop(&mut self) {
        CLAIMED_QUEUES.lock().remove(&self.dir);
    }
}

/// Screen currently on display.
#[derive(Debug)]
struct ActiveScreen {
    name: String,
    /// `None` while the app is in the background.
    visible_since: Option<Instant>,
}

enum Event {
    ScreenView {
        name: String,
        properties: Properties,
    },
    ScreenDuration {
        name: String,
        duration_ms: u64,
    },
    CustomEvent {
        name: String,
        properties: Properties,
    },
    Identify {
        name: Option<String>,
        email: Option<String>,
        metadata: Properties,
    },
    Error {
        report: ErrorReport,
        severity: Severity,
        context: Properties,
        fingerprint: Fingerprint,
    },
}

impl Event {
    fn kind(&self) -> &'static str {
        match self {
            Self::ScreenView { .. } => "screen_view",
            Self::ScreenDuration { .. } => "screen_duration",
            Self::CustomEvent { .. } => "custom_event",
            Self::Identify { .. } => "identify",
            Self::Error { .. } => "error",
        }
    }
}

/// Explicitly constructed SDK client.
///
/// One live client may own a given queue directory at a time. Intake calls
/// never block on I/O: they hand the event to a background task and return a
/// [`PendingDispatch`].
pub struct Pulse {
    inner: Arc<ClientInner>,
}

pub(crate) struct ClientInner {
    config: Config,
    identity: IdentityStore,
    device: Arc<dyn DeviceInfoProvider>,
    engine: Arc<DeliveryEngine>,
    scheduler: Arc<FlushScheduler>,
    guard: IntakeGuard,
    runtime: Handle,
    screen: Mutex<Option<ActiveScreen>>,
    referrer: Mutex<Option<String>>,
    // Stand-in ids for when the identity store cannot be read or written.
    fallback_visitor_id: String,
    fallback_session_id: String,
    tracking_enabled: bool,
    _claim: QueueClaim,
}

impl Pulse {
    /// Create a client that delivers over HTTP to `config.api_url`.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn new(
        config: Config,
        paths: Paths,
        device: Arc<dyn DeviceInfoProvider>,
        store: Arc<dyn KeyValueStore>,
    ) -> ClientResult<Self> {
        config.validate()?;
        let transport = HttpTransport::new(SenderConfig::new(
            config.api_url.clone(),
            config.api_key.clone(),
        ))?;
        Self::with_transport(config, paths, device, store, Arc::new(transport))
    }

    /// Create a client with a custom [`Transport`].
    pub fn with_transport(
        config: Config,
        paths: Paths,
        device: Arc<dyn DeviceInfoProvider>,
        store: Arc<dyn KeyValueStore>,
        transport: Arc<dyn Transport>,
    ) -> ClientResult<Self> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|_| ClientError::NoRuntime)?;

        let queue_dir = paths.queue_dir();
        std::fs::create_dir_all(&queue_dir).map_err(CoreError::from)?;
        let claim = QueueClaim::acquire(queue_dir.clone())?;

        let queue = Arc::new(QueueStore::open(&queue_dir, config.max_queue_size)?);
        let engine = Arc::new(DeliveryEngine::new(
            queue,
            transport,
            ConnectivityMonitor::default(),
        ));
        let scheduler = Arc::new(FlushScheduler::new(engine.clone(), config.flush_interval()));
        let guard = IntakeGuard::new(IntakeGuardConfig {
            max_events: config.error_rate_limit.max_events,
            rate_window: config.error_rate_limit.window(),
            dedup_window: config.dedup_window(),
            dedup_enabled: config.dedup_enabled,
        });

        let tracking_enabled = !config.respect_ad_tracking || device.ad_tracking_allowed();
        if tracking_enabled {
            scheduler.start();
        } else {
            info!("Ad tracking not allowed on this device, event intake disabled");
        }

        info!(
            api_url = %config.api_url,
            queue_dir = %queue_dir.display(),
            "Pulse client configured"
        );

        Ok(Self {
            inner: Arc::new(ClientInner {
                config,
                identity: IdentityStore::new(store),
                device,
                engine,
                scheduler,
                guard,
                runtime,
                screen: Mutex::new(None),
                referrer: Mutex::new(None),
                fallback_visitor_id: uuid::Uuid::new_v4().to_string(),
                fallback_session_id: uuid::Uuid::new_v4().to_string(),
                tracking_enabled,
                _claim: claim,
            }),
        })
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Whether intake calls do anything for this client.
    pub fn is_tracking_enabled(&self) -> bool {
        self.inner.tracking_enabled
    }

    /// Record that a screen is now on display.
    ///
    /// The previous screen, if any, gets a duration beacon.
    pub fn track_screen_view(&self, name: &str, properties: Properties) -> PendingDispatch {
        if !self.inner.tracking_enabled {
            return PendingDispatch::ready(DispatchOutcome::Disabled);
        }

        let previous = self.inner.screen.lock().replace(ActiveScreen {
            name: name.to_string(),
            visible_since: Some(Instant::now()),
        });
        if let Some(previous) = previous {
            self.send_screen_duration(previous);
        }

        self.dispatch(Event::ScreenView {
            name: name.to_string(),
            properties,
        })
    }

    /// Automatic screen tracking hook for UI bindings.
    ///
    /// Tracks the screen only when `auto_track_screen_views` is on.
    pub fn screen_appeared(&self, name: &str, properties: Properties) -> PendingDispatch {
        if !self.inner.config.auto_track_screen_views {
            return PendingDispatch::ready(DispatchOutcome::Disabled);
        }
        self.track_screen_view(name, properties)
    }

    pub fn track_custom_event(&self, name: &str, properties: Properties) -> PendingDispatch {
        if !self.inner.tracking_enabled {
            return PendingDispatch::ready(DispatchOutcome::Disabled);
        }
        self.dispatch(Event::CustomEvent {
            name: name.to_string(),
            properties,
        })
    }

    pub fn identify(
        &self,
        name: Option<&str>,
        email: Option<&str>,
        metadata: Properties,
    ) -> PendingDispatch {
        if !self.inner.tracking_enabled {
            return PendingDispatch::ready(DispatchOutcome::Disabled);
        }
        self.dispatch(Event::Identify {
            name: name.map(str::to_string),
            email: email.map(str::to_string),
            metadata,
        })
    }

    /// Report a Rust error. Its `source()` chain is sent as the stack.
    pub fn capture_error<E: std::error::Error + ?Sized>(
        &self,
        error: &E,
        context: Properties,
        severity: Severity,
    ) -> PendingDispatch {
        self.capture_report(ErrorReport::from_error(error), context, severity)
    }

    pub fn capture_message(
        &self,
        message: &str,
        severity: Severity,
        context: Properties,
    ) -> PendingDispatch {
        self.capture_report(ErrorReport::new(message, "Message"), context, severity)
    }

    /// Report an error through the rate limit and dedup checks.
    pub fn capture_report(
        &self,
        report: ErrorReport,
        context: Properties,
        severity: Severity,
    ) -> PendingDispatch {
        if !self.inner.tracking_enabled {
            return PendingDispatch::ready(DispatchOutcome::Disabled);
        }
        match self.inner.admit_error(report, context, severity) {
            Ok(event) => self.dispatch(event),
            Err(outcome) => PendingDispatch::ready(outcome),
        }
    }

    /// Remember where the user came from.
    ///
    /// The first referrer of a session is also kept as the original referrer.
    pub fn set_referrer(&self, url: &str) {
        if !self.inner.tracking_enabled {
            return;
        }
        *self.inner.referrer.lock() = Some(url.to_string());
        // Touch the session first so a rotation cannot wipe this referrer.
        let recorded = self
            .inner
            .identity
            .session_id(self.inner.config.session_timeout())
            .and_then(|_| self.inner.identity.record_referrer(url));
        if let Err(e) = recorded {
            warn!(error = %e, "Failed to store original referrer");
        }
    }

    /// The host app became active. Resumes screen timing and flushes.
    pub fn handle_foreground_transition(&self) {
        if !self.inner.tracking_enabled {
            return;
        }
        if let Some(screen) = self.inner.screen.lock().as_mut() {
            screen.visible_since.get_or_insert_with(Instant::now);
        }
        if !self.inner.scheduler.request_flush(FlushTrigger::Foreground) {
            debug!("Flush already pending, foreground request coalesced");
        }
    }

    /// The host app went to the background. Sends the visible screen's
    /// duration beacon.
    pub fn handle_background_transition(&self) {
        if !self.inner.tracking_enabled {
            return;
        }
        let paused = {
            let mut screen = self.inner.screen.lock();
            screen.as_mut().and_then(|screen| {
                screen.visible_since.take().map(|since| ActiveScreen {
                    name: screen.name.clone(),
                    visible_since: Some(since),
                })
            })
        };
        if let Some(paused) = paused {
            self.send_screen_duration(paused);
        }
    }

    /// Run a drain pass now.
    ///
    /// Resolves to `None` when a pass was already running and this request
    /// was folded into it.
    pub fn flush(&self) -> JoinHandle<Option<DrainReport>> {
        let scheduler = Arc::clone(&self.inner.scheduler);
        self.inner.runtime.spawn(async move {
            match scheduler.flush_now(FlushTrigger::Manual).await {
                Ok(report) => report,
                Err(e) => {
                    warn!(error = %e, "Manual flush failed");
                    None
                }
            }
        })
    }

    /// Forget the visitor, the session, queued deliveries and recent errors.
    pub fn reset(&self) -> ClientResult<()> {
        self.inner.identity.reset()?;
        let removed = self.inner.engine.store().reset_all()?;
        self.inner.guard.reset();
        *self.inner.screen.lock() = None;
        *self.inner.referrer.lock() = None;
        info!(queued_removed = removed, "Pulse client reset");
        Ok(())
    }

    /// Report the host's network state.
    pub fn set_network_state(&self, state: NetworkState) {
        self.inner.engine.connectivity().set_state(state);
    }

    pub fn network_state(&self) -> NetworkState {
        self.inner.engine.connectivity().current()
    }

    pub fn visitor_id(&self) -> ClientResult<String> {
        Ok(self.inner.identity.visitor_id()?)
    }

    pub fn session_id(&self) -> ClientResult<String> {
        Ok(self.inner.identity.session_id(self.inner.config.session_timeout())?)
    }

    /// Every queued delivery, oldest first.
    pub fn pending_deliveries(&self) -> ClientResult<Vec<QueuedDelivery>> {
        Ok(self.inner.engine.store().dequeue_batch(usize::MAX)?)
    }

    /// Stop the background flush worker.
    pub fn shutdown(&self) {
        self.inner.scheduler.shutdown();
    }

    pub(crate) fn downgrade(&self) -> Weak<ClientInner> {
        Arc::downgrade(&self.inner)
    }

    fn dispatch(&self, event: Event) -> PendingDispatch {
        let inner = Arc::clone(&self.inner);
        let timestamp = Utc::now();
        PendingDispatch::running(
            self.inner
                .runtime
                .spawn(async move { inner.deliver(event, timestamp).await }),
        )
    }

    fn send_screen_duration(&self, screen: ActiveScreen) {
        let Some(since) = screen.visible_since else {
            return;
        };
        let duration_ms = u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX);
        // Fire and forget.
        drop(self.dispatch(Event::ScreenDuration {
            name: screen.name,
            duration_ms,
        }));
    }
}

impl ClientInner {
    /// Rate limit and dedup an error, producing the event to send.
    fn admit_error(
        &self,
        mut report: ErrorReport,
        context: Properties,
        severity: Severity,
    ) -> Result<Event, DispatchOutcome> {
        report.stack = report.stack.as_deref().map(normalize_stack);
        let fingerprint = Fingerprint::compute(
            &report.message,
            report.stack.as_deref(),
            report.source.as_deref(),
        );

        match self.guard.admit(&fingerprint) {
            IntakeDecision::Accepted => Ok(Event::Error {
                report,
                severity,
                context,
                fingerprint,
            }),
            IntakeDecision::RateLimited => Err(DispatchOutcome::RateLimited),
            IntakeDecision::Duplicate => Err(DispatchOutcome::Duplicate),
        }
    }

    async fn deliver(&self, event: Event, timestamp: DateTime<Utc>) -> DispatchOutcome {
        let kind = event.kind();
        let is_beacon = matches!(event, Event::ScreenDuration { .. });

        let (endpoint, body) = match self.encode(event, timestamp) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(event = kind, error = %e, "Failed to encode event, dropping it");
                return DispatchOutcome::Dropped;
            }
        };

        let outcome = if is_beacon {
            self.engine
                .send_beacon(endpoint, body)
                .await
                .map(DispatchOutcome::from)
                .unwrap_or(DispatchOutcome::Dropped)
        } else {
            self.engine.deliver(&endpoint, body).await.into()
        };
        debug!(event = kind, outcome = ?outcome, "Event dispatched");
        outcome
    }

    /// Build the endpoint and JSON body for an event.
    fn encode(&self, event: Event, timestamp: DateTime<Utc>) -> ClientResult<(String, Vec<u8>)> {
        let envelope = Envelope {
            visitor_id: self.envelope_visitor_id(),
            session_id: self.envelope_session_id(),
            timestamp: timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
        };

        let encoded = match event {
            Event::ScreenView { name, properties } => (
                endpoints::SCREEN_VIEW.to_string(),
                serde_json::to_vec(&ScreenViewPayload {
                    envelope,
                    screen_name: name,
                    properties,
                    context: self.context(),
                })?,
            ),
            Event::ScreenDuration { name, duration_ms } => (
                endpoints::beacon(&self.config.api_key),
                serde_json::to_vec(&ScreenDurationPayload {
                    envelope,
                    screen_name: name,
                    duration_ms,
                })?,
            ),
            Event::CustomEvent { name, properties } => (
                endpoints::CUSTOM_EVENT.to_string(),
                serde_json::to_vec(&CustomEventPayload {
                    envelope,
                    event_name: name,
                    properties,
                    context: self.context(),
                })?,
            ),
            Event::Identify {
                name,
                email,
                metadata,
            } => (
                endpoints::IDENTIFY.to_string(),
                serde_json::to_vec(&IdentifyPayload {
                    envelope,
                    name,
                    email,
                    metadata,
                    context: self.context(),
                })?,
            ),
            Event::Error {
                report,
                severity,
                context,
                fingerprint,
            } => (
                endpoints::errors(&self.config.api_key),
                serde_json::to_vec(&ErrorPayload {
                    envelope,
                    message: report.message,
                    stack: report.stack,
                    source: report.source,
                    severity,
                    error_type: report.error_type,
                    context,
                    device: self.context(),
                    fingerprint,
                })?,
            ),
        };
        Ok(encoded)
    }

    /// Stored visitor id, or this client's in-memory one if storage fails.
    fn envelope_visitor_id(&self) -> String {
        self.identity.visitor_id().unwrap_or_else(|e| {
            warn!(error = %e, "Identity store unavailable, using in-memory visitor id");
            self.fallback_visitor_id.clone()
        })
    }

    fn envelope_session_id(&self) -> String {
        self.identity
            .session_id(self.config.session_timeout())
            .unwrap_or_else(|e| {
                warn!(error = %e, "Identity store unavailable, using in-memory session id");
                self.fallback_session_id.clone()
            })
    }

    fn context(&self) -> EventContext {
        let original_referrer = self.identity.original_referrer().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to read original referrer");
            None
        });
        EventContext::new(
            self.device.device_info(),
            self.referrer.lock().clone(),
            original_referrer,
        )
    }

    /// Queue a fatal error for a panic without touching the network.
    pub(crate) fn record_panic(&self, report: ErrorReport) -> DispatchOutcome {
        if !self.tracking_enabled {
            return DispatchOutcome::Disabled;
        }
        let event = match self.admit_error(report, Properties::new(), Severity::Fatal) {
            Ok(event) => event,
            Err(outcome) => return outcome,
        };
        match self.encode(event, Utc::now()) {
            Ok((endpoint, body)) => self.engine.queue_payload(&endpoint, body).into(),
            Err(e) => {
                warn!(error = %e, "Failed to encode panic report");
                DispatchOutcome::Dropped
            }
        }
    }
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        self.scheduler.shutdown();
    }
}

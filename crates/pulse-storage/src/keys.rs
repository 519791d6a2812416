//! Storage key constants.

/// Storage keys used by the SDK.
pub struct StorageKeys;

impl StorageKeys {
    /// Visitor ID, persisted until reset
    pub const VISITOR_ID: &'static str = "pulse.visitor_id";

    /// Current session ID
    pub const SESSION_ID: &'static str = "pulse.session_id";

    /// Last session access time (RFC 3339)
    pub const SESSION_LAST_ACCESS: &'static str = "pulse.session_last_access";

    /// First-touch referrer for the current session
    pub const ORIGINAL_REFERRER: &'static str = "pulse.original_referrer";

    /// Every key the SDK owns, for full resets.
    pub const ALL: [&'static str; 4] = [
        Self::VISITOR_ID,
        Self::SESSION_ID,
        Self::SESSION_LAST_ACCESS,
        Self::ORIGINAL_REFERRER,
    ];
}

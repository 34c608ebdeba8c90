//! ECP notification event name constants.
//!
//! Notifications are server-to-client messages with no response expected.
//! Clients subscribe to these for real-time updates.

/// All ECP notification names, grouped by service namespace.
pub struct Notifications;

impl Notifications {
    // ── Authentication ──────────────────────────────────────────────────
    pub const AUTH_REQUIRED: &str = "auth/required";

    // ── Server lifecycle ────────────────────────────────────────────────
    pub const SERVER_CONNECTED: &str = "server/connected";

    // ── File system ─────────────────────────────────────────────────────
    pub const FILE_DID_CHANGE: &str = "file/didChange";
    pub const FILE_DID_CREATE: &str = "file/didCreate";
    pub const FILE_DID_DELETE: &str = "file/didDelete";

    // ── Terminal ────────────────────────────────────────────────────────
    pub const TERMINAL_OUTPUT: &str = "terminal/output";
    pub const TERMINAL_EXIT: &str = "terminal/exit";

    // ── Document ────────────────────────────────────────────────────────
    pub const DOCUMENT_DID_SAVE: &str = "document/didSave";
}

/// Type alias documenting intent at call sites that accept a notification
/// method name.
pub type NotificationName = str;

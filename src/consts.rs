//! Project-wide constants.

/// Environment variable holding the front-end configuration path.
pub const FRONTEND_CONFIG_ENV: &str = "FRONTEND_CONFIG_FILE";

/// Environment variable holding the back-end configuration path.
pub const BACKEND_CONFIG_ENV: &str = "BACKEND_CONFIG_FILE";

/// Environment variable selecting the logging profile (`DEV` or `PROD`).
pub const ENVIRONMENT_ENV: &str = "ENVIRONMENT";

pub const DEFAULT_FRONTEND_CONFIG: &str = "frontend/config.yaml";
pub const DEFAULT_BACKEND_CONFIG: &str = "backend/config.yaml";

/// Capacity of the channel that merges events from every front-end provider.
pub const INBOUND_CAPACITY: usize = 32;

/// Format an error that comes from the system rather than the assistant.
pub fn error_notice(content: &str) -> String {
    format!("[SYSTEM]Error: {content}")
}

//! Network-related constants.

/// Default port for the poolrs API server.
pub const DEFAULT_API_PORT: u16 = 6443;

/// Default API server address (HTTP).
pub const DEFAULT_API_ADDR: &str = "http://127.0.0.1:6443";

/// Join token used when neither the CLI nor the config file provides one.
pub const DEFAULT_JOIN_TOKEN: &str = "demo-token-123";

//! Shared constants for end-to-end tests

use std::time::Duration;

/// Slate name used for every scripted take
pub const TEST_SLATE: &str = "scene";

/// Upload host used by archive-backed tests
pub const TEST_HOST: &str = "render-01";

/// Upper bound for any single wait in a test
pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

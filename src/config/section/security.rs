//! `[security]` section configuration.
//!
//! # Example
//!
//! ```toml
//! [security]
//! inject_csp = true
//! allow = ["https://maps.example.org"]   # extra fetch sources
//! ```

use serde::{Deserialize, Serialize};

/// Content-security directive settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Inject a content-security directive into every document.
    pub inject_csp: bool,

    /// Extra sources allowed besides the archive itself, `data:` and `blob:`.
    pub allow: Vec<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            inject_csp: true,
            allow: Vec::new(),
        }
    }
}

impl SecurityConfig {
    /// Whitelisted sources joined for a policy value (leading space included).
    pub fn allow_list(&self) -> String {
        self.allow.iter().map(|s| format!(" {s}")).collect()
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitScope {
    Global,
    Tenant,
    Environment,
    Key,
}

impl fmt::Display for RateLimitScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RateLimitScope::Global => "global",
            RateLimitScope::Tenant => "tenant",
            RateLimitScope::Environment => "environment",
            RateLimitScope::Key => "key",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitWindow {
    PerMinute,
    PerDay,
}

impl RateLimitWindow {
    pub fn duration_seconds(self) -> i64 {
        match self {
            RateLimitWindow::PerMinute => 60,
            RateLimitWindow::PerDay => 86_400,
        }
    }
}

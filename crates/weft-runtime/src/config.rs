#![forbid(unsafe_code)]

//! Runtime configuration.
//!
//! Defaults suit interactive use. [`RuntimeConfig::from_env`] overlays
//! `WEFT_*` environment variables on top of the defaults; unparsable values
//! are ignored.

use std::env;

use weft_core::arena::{DEFAULT_GRAVEYARD_CAPACITY, DEFAULT_MAX_RESOLVE_DEPTH};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Drain the action queue at the end of every scheduling turn.
    /// Default: true.
    pub flush_at_turn_end: bool,

    /// Maximum turns a single `run_until_idle` may execute.
    /// Default: 10_000.
    pub turn_budget: usize,

    /// Free destroyed component slots at the end of every turn.
    /// Default: true.
    pub sweep_destroyed: bool,

    /// Log every outgoing request body at DEBUG.
    /// Default: false.
    pub log_wire_payloads: bool,

    /// Bound on chained attribute references.
    /// Default: 16.
    pub max_resolve_depth: usize,

    /// Freed component keys whose descriptor is kept for late lookups.
    /// Default: 1024.
    pub graveyard_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            flush_at_turn_end: true,
            turn_budget: 10_000,
            sweep_destroyed: true,
            log_wire_payloads: false,
            max_resolve_depth: DEFAULT_MAX_RESOLVE_DEPTH,
            graveyard_capacity: DEFAULT_GRAVEYARD_CAPACITY,
        }
    }
}

fn parse_flag(val: &str) -> Option<bool> {
    if val == "1" || val.eq_ignore_ascii_case("true") {
        Some(true)
    } else if val == "0" || val.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

impl RuntimeConfig {
    /// Defaults overlaid with `WEFT_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides(|key| env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup (used by tests).
    #[must_use]
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(val) = lookup("WEFT_FLUSH_AT_TURN_END")
            && let Some(flag) = parse_flag(&val)
        {
            self.flush_at_turn_end = flag;
        }
        if let Some(val) = lookup("WEFT_TURN_BUDGET")
            && let Ok(n) = val.parse()
        {
            self.turn_budget = n;
        }
        if let Some(val) = lookup("WEFT_SWEEP_DESTROYED")
            && let Some(flag) = parse_flag(&val)
        {
            self.sweep_destroyed = flag;
        }
        if let Some(val) = lookup("WEFT_LOG_WIRE")
            && let Some(flag) = parse_flag(&val)
        {
            self.log_wire_payloads = flag;
        }
        if let Some(val) = lookup("WEFT_MAX_RESOLVE_DEPTH")
            && let Ok(n) = val.parse()
        {
            self.max_resolve_depth = n;
        }
        if let Some(val) = lookup("WEFT_GRAVEYARD_CAPACITY")
            && let Ok(n) = val.parse()
        {
            self.graveyard_capacity = n;
        }
        self
    }

    #[must_use]
    pub fn with_flush_at_turn_end(mut self, enabled: bool) -> Self {
        self.flush_at_turn_end = enabled;
        self
    }

    #[must_use]
    pub fn with_turn_budget(mut self, budget: usize) -> Self {
        self.turn_budget = budget;
        self
    }

    #[must_use]
    pub fn with_sweep_destroyed(mut self, enabled: bool) -> Self {
        self.sweep_destroyed = enabled;
        self
    }

    #[must_use]
    pub fn with_wire_logging(mut self, enabled: bool) -> Self {
        self.log_wire_payloads = enabled;
        self
    }

    #[must_use]
    pub fn with_max_resolve_depth(mut self, depth: usize) -> Self {
        self.max_resolve_depth = depth;
        self
    }

    #[must_use]
    pub fn with_graveyard_capacity(mut self, capacity: usize) -> Self {
        self.graveyard_capacity = capacity;
        self
    }
}

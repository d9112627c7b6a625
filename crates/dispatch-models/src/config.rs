use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::records::Location;
use crate::summary::DEFAULT_PAGE_LIMIT;

/// Top-level configuration, loaded once at startup and passed down explicitly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DispatchConfig {
    pub store: StoreConfig,
    #[serde(default)]
    pub allocation: AllocationConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub reporting: ReportingConfig,
}

impl DispatchConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.store.sqlite_path.trim().is_empty() {
            return Err("store.sqlite_path must not be empty".to_string());
        }
        let budget = self.allocation.max_distance_per_agent;
        if budget.is_nan() || budget <= 0.0 {
            return Err(format!(
                "allocation.max_distance_per_agent must be positive, got {}",
                self.allocation.max_distance_per_agent
            ));
        }
        if self.allocation.base_offset < 0.0 {
            return Err(format!(
                "allocation.base_offset must not be negative, got {}",
                self.allocation.base_offset
            ));
        }
        if self.allocation.lease_seconds == 0 {
            return Err("allocation.lease_seconds must be at least 1".to_string());
        }
        if self.schedule.fire_time().is_none() {
            return Err(format!(
                "schedule time {:02}:{:02} is not a valid time of day",
                self.schedule.hour, self.schedule.minute
            ));
        }
        if self.reporting.default_page_size == 0 {
            return Err("reporting.default_page_size must be at least 1".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreConfig {
    /// Path to the SQLite database file.
    pub sqlite_path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sqlite_path: "data/dispatch.db".to_string(),
        }
    }
}

/// Which ledger history counts against an agent's distance budget.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BudgetWindow {
    /// Assignments committed earlier on the current local day count.
    #[default]
    Day,
    /// Strict per-pass budget: every pass starts each agent at zero, even
    /// if it already absorbed orders earlier the same day.
    Run,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AllocationConfig {
    /// Maximum cumulative estimated cost one agent may absorb.
    #[serde(default = "default_max_distance")]
    pub max_distance_per_agent: f64,
    /// Fixed cost added to every distance estimate.
    #[serde(default = "default_base_offset")]
    pub base_offset: f64,
    /// Point every order's cost is measured against.
    #[serde(default)]
    pub reference_point: Location,
    #[serde(default)]
    pub budget_window: BudgetWindow,
    /// How long a manual trigger waits for an in-flight pass before giving up.
    #[serde(default = "default_trigger_wait")]
    pub trigger_wait_seconds: u64,
    /// Lifetime of the store-wide allocation lease. A pass left holding it
    /// (e.g. a crashed process) blocks other processes for at most this long.
    #[serde(default = "default_lease_seconds")]
    pub lease_seconds: u64,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            max_distance_per_agent: default_max_distance(),
            base_offset: default_base_offset(),
            reference_point: Location::default(),
            budget_window: BudgetWindow::default(),
            trigger_wait_seconds: default_trigger_wait(),
            lease_seconds: default_lease_seconds(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduleConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Local hour of day (0-23) of the daily pass.
    #[serde(default = "default_hour")]
    pub hour: u32,
    #[serde(default)]
    pub minute: u32,
    /// Run one pass immediately when the daemon starts.
    #[serde(default)]
    pub run_on_startup: bool,
}

impl ScheduleConfig {
    pub fn fire_time(&self) -> Option<NaiveTime> {
        NaiveTime::from_hms_opt(self.hour, self.minute, 0)
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            hour: default_hour(),
            minute: 0,
            run_on_startup: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportingConfig {
    #[serde(default = "default_page_size")]
    pub default_page_size: u32,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
        }
    }
}

fn default_max_distance() -> f64 {
    100.0
}
fn default_base_offset() -> f64 {
    2.0
}
fn default_trigger_wait() -> u64 {
    30
}
fn default_lease_seconds() -> u64 {
    600
}
fn default_true() -> bool {
    true
}
fn default_hour() -> u32 {
    7
}
fn default_page_size() -> u32 {
    DEFAULT_PAGE_LIMIT
}

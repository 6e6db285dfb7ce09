//! Per-run cost accounting and rate-limit fallback routing.
//!
//! A [`CostRecorder`] is created for each pipeline run and passed explicitly
//! to every external call site. It keeps an append-only log of
//! [`CostRecord`]s and a set of backends that were rate limited during the
//! run. Once a backend is degraded, [`CostRecorder::route`] sends every
//! later call for that role to the role's paid fallback.
//!
//! # State Machine (per backend, per run)
//!
//! ```text
//! ┌─────────┐  rate-limit signal  ┌──────────┐
//! │ Healthy ├────────────────────►│ Degraded │  (until the run ends)
//! └─────────┘                     └──────────┘
//! ```
//!
//! Nothing is blacklisted across runs: a fresh recorder starts healthy.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{BackendId, Tier};

/// One external call, successful or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostRecord {
    /// Backend or model endpoint that was called.
    pub backend_id: BackendId,
    /// Tier of that backend.
    pub tier: Tier,
    /// Whether the call succeeded.
    pub success: bool,
    /// USD charged for the call (zero on failure for flat-rate backends).
    pub cost_usd: f64,
    /// Pipeline stage that made the call (e.g. `"search"`, `"synthesis"`).
    pub stage: String,
    /// When the call completed.
    pub timestamp: DateTime<Utc>,
    /// True when this call was made on a fallback route.
    pub fallback_triggered: bool,
}

/// Where the coordinator sends a call for a role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Call the requested backend.
    Primary(BackendId),
    /// The primary is degraded; call this paid fallback instead.
    Fallback(BackendId),
    /// The primary is degraded and no usable fallback exists.
    Unavailable,
}

/// Aggregated per-backend figures.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendCost {
    /// Calls made (any outcome).
    pub calls: usize,
    /// Calls that failed.
    pub failures: usize,
    /// Total USD.
    pub cost_usd: f64,
}

/// Read-only summary exposed to billing/observability collaborators.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostSummary {
    /// Calls to free-tier backends.
    pub free_calls: usize,
    /// Calls to paid-tier backends.
    pub paid_calls: usize,
    /// Calls that failed, any tier.
    pub failed_calls: usize,
    /// Whether any call in the run went through a fallback route.
    pub fallback_triggered: bool,
    /// Stages in which a fallback route was used.
    pub fallback_stages: BTreeSet<String>,
    /// Backends degraded during the run.
    pub degraded_backends: BTreeSet<BackendId>,
    /// Total USD across the run.
    pub total_cost_usd: f64,
    /// Per-backend breakdown.
    pub by_backend: BTreeMap<BackendId, BackendCost>,
}

#[derive(Debug, Default)]
struct RecorderState {
    records: Vec<CostRecord>,
    degraded: BTreeSet<BackendId>,
}

/// Per-run cost log and fallback router. Cheap to clone; clones share state.
#[derive(Debug, Clone, Default)]
pub struct CostRecorder {
    fallbacks: Arc<HashMap<String, BackendId>>,
    state: Arc<Mutex<RecorderState>>,
}

impl CostRecorder {
    /// Create a recorder with no fallback routes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a recorder with `role → paid fallback backend` routes.
    pub fn with_fallbacks(fallbacks: HashMap<String, BackendId>) -> Self {
        Self {
            fallbacks: Arc::new(fallbacks),
            state: Arc::default(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RecorderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The configured fallback for a role, if any.
    pub fn fallback_for(&self, role: &str) -> Option<&BackendId> {
        self.fallbacks.get(role)
    }

    /// Decide which backend should serve the next call for `role`.
    pub fn route(&self, role: &str, primary: &BackendId) -> Route {
        let state = self.lock();
        if !state.degraded.contains(primary) {
            return Route::Primary(primary.clone());
        }
        match self.fallbacks.get(role) {
            Some(fallback) if fallback != primary && !state.degraded.contains(fallback) => {
                Route::Fallback(fallback.clone())
            }
            _ => Route::Unavailable,
        }
    }

    /// Mark a backend degraded for the rest of the run.
    pub fn mark_degraded(&self, backend: &BackendId, reason: &str) {
        let newly = self.lock().degraded.insert(backend.clone());
        if newly {
            tracing::warn!(backend = %backend, reason, "backend degraded for the rest of this run");
        }
    }

    /// Whether a backend has been degraded in this run.
    pub fn is_degraded(&self, backend: &BackendId) -> bool {
        self.lock().degraded.contains(backend)
    }

    /// Append a call record.
    pub fn record(&self, record: CostRecord) {
        tracing::trace!(
            backend = %record.backend_id,
            tier = %record.tier,
            success = record.success,
            cost_usd = record.cost_usd,
            stage = record.stage.as_str(),
            "cost recorded"
        );
        self.lock().records.push(record);
    }

    /// Append a call record stamped with the current time.
    pub fn record_call(
        &self,
        backend_id: &BackendId,
        tier: Tier,
        stage: &str,
        success: bool,
        cost_usd: f64,
        fallback_triggered: bool,
    ) {
        self.record(CostRecord {
            backend_id: backend_id.clone(),
            tier,
            success,
            cost_usd,
            stage: stage.to_owned(),
            timestamp: Utc::now(),
            fallback_triggered,
        });
    }

    /// Snapshot of every record so far, in append order.
    pub fn records(&self) -> Vec<CostRecord> {
        self.lock().records.clone()
    }

    /// Aggregate the log.
    pub fn summary(&self) -> CostSummary {
        let state = self.lock();
        let mut summary = CostSummary {
            degraded_backends: state.degraded.clone(),
            ..CostSummary::default()
        };
        for record in &state.records {
            match record.tier {
                Tier::Free => summary.free_calls += 1,
                Tier::Paid => summary.paid_calls += 1,
            }
            if !record.success {
                summary.failed_calls += 1;
            }
            if record.fallback_triggered {
                summary.fallback_triggered = true;
                summary.fallback_stages.insert(record.stage.clone());
            }
            summary.total_cost_usd += record.cost_usd;
            let entry = summary
                .by_backend
                .entry(record.backend_id.clone())
                .or_default();
            entry.calls += 1;
            entry.cost_usd += record.cost_usd;
            if !record.success {
                entry.failures += 1;
            }
        }
        summary
    }

    /// Clear records and degraded state, keeping fallback routes.
    pub fn reset(&self) {
        let mut state = self.lock();
        state.records.clear();
        state.degraded.clear();
    }
}

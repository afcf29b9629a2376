use olapgate_core::{ExecutionHandle, ExecutionStats, LeafStats, StatsError};
use std::sync::Arc;

/// Handle over a fixed plan description and the producer's leaf counters.
#[derive(Debug)]
pub struct PlanHandle {
    plan: String,
    stats: Arc<ExecutionStats>,
}

impl PlanHandle {
    pub fn new(plan: impl Into<String>, stats: Arc<ExecutionStats>) -> Self {
        Self {
            plan: plan.into(),
            stats,
        }
    }
}

impl ExecutionHandle for PlanHandle {
    fn plan_dump(&self) -> String {
        self.plan.clone()
    }

    fn leaf_rows_bytes(&self) -> Result<LeafStats, StatsError> {
        self.stats.snapshot()
    }
}

// ABOUTME: Value types for the migration planner's output - an ordered list of idempotent
// ABOUTME: DDL scripts, each severity-tagged, with a rollback where the change is invertible

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Safe,
    Caution,
    Dangerous,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationStep {
    pub id: String,
    pub table_name: String,
    pub description: String,
    pub severity: Severity,
    /// Ordered idempotent statements (each `IF [NOT] EXISTS` guarded).
    pub up_sql: Vec<String>,
    /// `None` when the change is not invertible (e.g. a column drop would
    /// lose data that can't be reconstructed).
    pub down_sql: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MigrationPlan {
    pub steps: Vec<MigrationStep>,
}

impl MigrationPlan {
    pub fn push(&mut self, step: MigrationStep) {
        self.steps.push(step);
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn has_dangerous_steps(&self) -> bool {
        self.steps.iter().any(|s| s.severity == Severity::Dangerous)
    }
}

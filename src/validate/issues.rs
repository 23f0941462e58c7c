// ABOUTME: ValidationIssue value type and severity ordering for the schema validator
// ABOUTME: CRITICAL blocks sync, HIGH requires explicit confirmation, the rest are advisory

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub id: String,
    pub severity: Severity,
    pub category: String,
    pub table_name: String,
    pub column_name: Option<String>,
    pub message: String,
    pub details: Option<String>,
    pub recommendation: Option<String>,
}

impl ValidationIssue {
    pub fn new(
        severity: Severity,
        category: impl Into<String>,
        table_name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let category = category.into();
        let table_name = table_name.into();
        let message = message.into();
        ValidationIssue {
            id: format!("{}:{}:{}", category, table_name, severity_tag(severity)),
            severity,
            category,
            table_name,
            column_name: None,
            message,
            details: None,
            recommendation: None,
        }
    }

    pub fn with_column(mut self, column_name: impl Into<String>) -> Self {
        self.column_name = Some(column_name.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_recommendation(mut self, recommendation: impl Into<String>) -> Self {
        self.recommendation = Some(recommendation.into());
        self
    }
}

fn severity_tag(s: Severity) -> &'static str {
    match s {
        Severity::Critical => "critical",
        Severity::High => "high",
        Severity::Medium => "medium",
        Severity::Low => "low",
        Severity::Info => "info",
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaValidationResult {
    pub issues: Vec<ValidationIssue>,
}

impl SchemaValidationResult {
    pub fn push(&mut self, issue: ValidationIssue) {
        self.issues.push(issue);
    }

    pub fn has_blocking_issues(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::Critical)
    }

    pub fn requires_confirmation(&self) -> bool {
        self.issues
            .iter()
            .any(|i| i.severity == Severity::High || i.severity == Severity::Critical)
    }

    pub fn by_severity(&self, severity: Severity) -> Vec<&ValidationIssue> {
        self.issues.iter().filter(|i| i.severity == severity).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn critical_issue_blocks_sync() {
        let mut result = SchemaValidationResult::default();
        result.push(ValidationIssue::new(
            Severity::Critical,
            "missing_table",
            "orders",
            "table missing on target",
        ));
        assert!(result.has_blocking_issues());
        assert!(result.requires_confirmation());
    }

    #[test]
    fn low_severity_does_not_block_or_require_confirmation() {
        let mut result = SchemaValidationResult::default();
        result.push(ValidationIssue::new(
            Severity::Low,
            "extra_column",
            "orders",
            "source column absent in target",
        ));
        assert!(!result.has_blocking_issues());
        assert!(!result.requires_confirmation());
    }

    #[test]
    fn severity_ordering_places_critical_highest() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
        assert!(Severity::Low > Severity::Info);
    }
}

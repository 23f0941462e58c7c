// ABOUTME: Error classification shared by the retry primitives and the sync executor
// ABOUTME: Isolates the message-substring heuristics behind a single testable predicate

use std::fmt;

/// How a failure should be handled by the sync executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Worth retrying with backoff: connection resets, deadlocks, serialization
    /// failures, timeouts, connection pool exhaustion.
    Transient,
    /// Will never succeed by retrying: constraint violations, permission
    /// errors, invalid syntax, missing objects.
    Permanent,
    /// Escapes the batch loop entirely; the whole job is abandoned.
    Fatal,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorClass::Transient => "transient",
            ErrorClass::Permanent => "permanent",
            ErrorClass::Fatal => "fatal",
        };
        f.write_str(s)
    }
}

/// Fixed list of message fragments that mark a failure as transient.
/// Matched case-insensitively against the full error chain (`{:#}`).
const TRANSIENT_PATTERNS: &[&str] = &[
    "connection reset",
    "connection refused",
    "connection closed",
    "connection timed out",
    "could not connect",
    "server closed the connection",
    "timeout",
    "timed out",
    "deadlock detected",
    "could not serialize access",
    "too many connections",
    "broken pipe",
    "no route to host",
];

/// Fixed list of message fragments that mark a failure as permanent:
/// unique / FK / check / not-null, permission, syntax, missing object.
const PERMANENT_PATTERNS: &[&str] = &[
    "duplicate key value violates unique constraint",
    "violates unique constraint",
    "violates foreign key constraint",
    "violates check constraint",
    "violates not-null constraint",
    "null value in column",
    "permission denied",
    "authentication failed",
    "syntax error",
    "does not exist",
    "invalid input syntax",
    "value too long",
    "out of range",
];

/// Classify an error by walking its message and source chain for known
/// substrings. Transient patterns are checked first since a transient
/// condition (e.g. "connection reset") can coincidentally contain words
/// that also show up in permanent messages in obscure cases; in practice
/// the two lists are disjoint and order does not matter, but transient is
/// checked first to keep the common "retry me" path cheap.
pub fn classify(err: &anyhow::Error) -> ErrorClass {
    let full = format!("{:#}", err).to_lowercase();

    if TRANSIENT_PATTERNS.iter().any(|p| full.contains(p)) {
        return ErrorClass::Transient;
    }
    if PERMANENT_PATTERNS.iter().any(|p| full.contains(p)) {
        return ErrorClass::Permanent;
    }
    // Unknown failures default to permanent rather than transient: retrying
    // an error we don't recognize risks looping forever on something that
    // will never succeed. Per-table/job-fatal handling upstream still gets
    // a chance to react.
    ErrorClass::Permanent
}

/// Extract a short, stable category tag from a permanent error's message,
/// used for `skippedReasons.error` grouping and log messages, classifying
/// errors by message fragment.
pub fn permanent_category(err: &anyhow::Error) -> &'static str {
    let full = format!("{:#}", err).to_lowercase();
    if full.contains("unique constraint") || full.contains("duplicate key") {
        "unique_violation"
    } else if full.contains("foreign key") {
        "foreign_key_violation"
    } else if full.contains("check constraint") {
        "check_violation"
    } else if full.contains("not-null") || full.contains("null value in column") {
        "not_null_violation"
    } else if full.contains("permission denied") || full.contains("authentication failed") {
        "permission_denied"
    } else if full.contains("does not exist") {
        "missing_object"
    } else {
        "other"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn err(msg: &str) -> anyhow::Error {
        anyhow::anyhow!("{}", msg)
    }

    #[test]
    fn classifies_connection_reset_as_transient() {
        assert_eq!(classify(&err("connection reset by peer")), ErrorClass::Transient);
    }

    #[test]
    fn classifies_serialization_failure_as_transient() {
        assert_eq!(
            classify(&err("ERROR: could not serialize access due to concurrent update")),
            ErrorClass::Transient
        );
    }

    #[test]
    fn classifies_unique_violation_as_permanent() {
        assert_eq!(
            classify(&err("duplicate key value violates unique constraint \"users_pkey\"")),
            ErrorClass::Permanent
        );
    }

    #[test]
    fn classifies_unknown_error_as_permanent_by_default() {
        assert_eq!(classify(&err("something bizarre happened")), ErrorClass::Permanent);
    }

    #[test]
    fn permanent_category_groups_unique_violations() {
        assert_eq!(
            permanent_category(&err("duplicate key value violates unique constraint")),
            "unique_violation"
        );
    }

    #[test]
    fn permanent_category_groups_foreign_key_violations() {
        assert_eq!(
            permanent_category(&err("update or delete on table violates foreign key constraint")),
            "foreign_key_violation"
        );
    }

    #[test]
    fn permanent_category_falls_back_to_other() {
        assert_eq!(permanent_category(&err("weird failure")), "other");
    }
}

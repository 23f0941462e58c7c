// ABOUTME: Pure type-compatibility helpers used by the validator and migration planner
// ABOUTME: No I/O; operates entirely on already-introspected column metadata

use super::types::DetailedColumn;

/// Normalized type equivalence classes used to decide compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TypeFamily {
    Integer,
    FloatNumeric,
    Character,
    Timestamp,
    Boolean,
    Json,
    Uuid,
    Bytea,
    Other,
}

fn family_of(udt_name: &str) -> TypeFamily {
    match udt_name {
        "int2" | "int4" | "int8" | "smallint" | "integer" | "bigint" => TypeFamily::Integer,
        "numeric" | "decimal" | "float4" | "float8" | "real" | "double precision" => {
            TypeFamily::FloatNumeric
        }
        "text" | "varchar" | "bpchar" | "char" | "character varying" | "character" => {
            TypeFamily::Character
        }
        "timestamp" | "timestamptz" => TypeFamily::Timestamp,
        "bool" | "boolean" => TypeFamily::Boolean,
        "json" | "jsonb" => TypeFamily::Json,
        "uuid" => TypeFamily::Uuid,
        "bytea" => TypeFamily::Bytea,
        _ => TypeFamily::Other,
    }
}

/// Two UDT names are compatible if they normalize to the same family.
/// `Other` only matches an identical UDT name — there is no generic
/// fallback family.
pub fn are_types_compatible(a: &str, b: &str) -> bool {
    let fa = family_of(a);
    let fb = family_of(b);
    if fa == TypeFamily::Other || fb == TypeFamily::Other {
        a == b
    } else {
        fa == fb
    }
}

/// Whether a source column's values can be safely inserted into a target
/// column: type families must be compatible, the target must not be
/// narrower (shorter max length / lower numeric precision), and a
/// nullable source column may not feed a target column that is NOT NULL
/// without a default.
pub fn can_safely_insert(source: &DetailedColumn, target: &DetailedColumn) -> bool {
    if !are_types_compatible(&source.udt_name, &target.udt_name) {
        return false;
    }

    if let (Some(src_len), Some(tgt_len)) = (source.max_length, target.max_length) {
        if tgt_len < src_len {
            return false;
        }
    }

    if let (Some(src_prec), Some(tgt_prec)) = (source.numeric_precision, target.numeric_precision)
    {
        if tgt_prec < src_prec {
            return false;
        }
    }

    if source.is_nullable && !target.is_nullable && target.default_value.is_none() {
        return false;
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(udt_name: &str, nullable: bool, max_length: Option<i32>) -> DetailedColumn {
        DetailedColumn {
            name: "col".to_string(),
            data_type: udt_name.to_string(),
            udt_name: udt_name.to_string(),
            is_nullable: nullable,
            default_value: None,
            is_primary_key: false,
            is_generated: false,
            max_length,
            numeric_precision: None,
            ordinal_position: 0,
        }
    }

    #[test]
    fn integer_family_types_are_compatible() {
        assert!(are_types_compatible("int4", "int8"));
        assert!(are_types_compatible("smallint", "bigint"));
    }

    #[test]
    fn character_and_integer_families_are_incompatible() {
        assert!(!are_types_compatible("text", "int4"));
    }

    #[test]
    fn timestamp_and_timestamptz_are_compatible() {
        assert!(are_types_compatible("timestamp", "timestamptz"));
    }

    #[test]
    fn unknown_udt_names_require_exact_match() {
        assert!(are_types_compatible("hstore", "hstore"));
        assert!(!are_types_compatible("hstore", "citext"));
    }

    #[test]
    fn safely_insertable_when_target_is_wider() {
        let source = column("varchar", false, Some(50));
        let target = column("varchar", false, Some(100));
        assert!(can_safely_insert(&source, &target));
    }

    #[test]
    fn not_safely_insertable_when_target_is_narrower() {
        let source = column("varchar", false, Some(100));
        let target = column("varchar", false, Some(50));
        assert!(!can_safely_insert(&source, &target));
    }

    #[test]
    fn not_safely_insertable_when_nullable_source_hits_not_null_target_without_default() {
        let source = column("text", true, None);
        let mut target = column("text", false, None);
        target.default_value = None;
        assert!(!can_safely_insert(&source, &target));
    }

    #[test]
    fn safely_insertable_when_not_null_target_has_default() {
        let source = column("text", true, None);
        let mut target = column("text", false, None);
        target.default_value = Some("''".to_string());
        assert!(can_safely_insert(&source, &target));
    }
}

//! Deterministic category and sample-value inference.
//!
//! Priority order: the explicit jdbcType hint wins, then the usage context
//! for collections and literal sort fragments, then name-pattern
//! heuristics, then the generic string fallback. No randomness anywhere —
//! identical inputs always produce identical samples.

use super::{ParameterRef, SampleValue, UsageContext, ValueCategory};

/// Timestamp and date literals used for `*dtm*` / `*date*` parameters.
const SAMPLE_TIMESTAMP: &str = "20240101000000";
const SAMPLE_DATE: &str = "20240101";

/// Generic sample for string-ish parameters with no stronger signal.
const SAMPLE_TEXT: &str = "TEST";

/// Infer the category and sample value for a previously unseen parameter.
pub fn infer(param: &ParameterRef) -> (ValueCategory, SampleValue) {
    let name = param.name.to_ascii_lowercase();

    if let Some(jdbc) = param.jdbc_type.as_deref() {
        if let Some(inferred) = from_jdbc_type(jdbc, &name) {
            return inferred;
        }
    }

    if param.usage == UsageContext::Collection || name.starts_with("list") {
        return (
            ValueCategory::List,
            SampleValue::List(vec!["TEST1".to_string(), "TEST2".to_string()]),
        );
    }

    // Literal markers feeding ORDER BY clauses must stay bare SQL; a
    // column position keeps the statement executable.
    if name.contains("order") || name.contains("sort") {
        return (ValueCategory::String, SampleValue::Text("1".to_string()));
    }

    from_name_pattern(&name).unwrap_or_else(|| {
        (
            ValueCategory::String,
            SampleValue::Text(SAMPLE_TEXT.to_string()),
        )
    })
}

/// Inference from an explicit `jdbcType=` hint. The name still picks the
/// concrete sample within the hinted category.
fn from_jdbc_type(jdbc: &str, name: &str) -> Option<(ValueCategory, SampleValue)> {
    match jdbc.to_ascii_uppercase().as_str() {
        "INTEGER" | "BIGINT" | "SMALLINT" | "TINYINT" | "NUMERIC" | "DECIMAL" => {
            let n = if name.contains("seqno") || name.contains("id") {
                1
            } else {
                0
            };
            Some((ValueCategory::Number, SampleValue::Number(n)))
        }
        "VARCHAR" | "CHAR" | "TEXT" | "LONGVARCHAR" => {
            let text = if name.ends_with("yn") || name.ends_with("flag") {
                "Y"
            } else {
                SAMPLE_TEXT
            };
            Some((ValueCategory::String, SampleValue::Text(text.to_string())))
        }
        "TIMESTAMP" | "DATETIME" => Some((
            ValueCategory::Date,
            SampleValue::Text(SAMPLE_TIMESTAMP.to_string()),
        )),
        "DATE" => Some((
            ValueCategory::Date,
            SampleValue::Text(SAMPLE_DATE.to_string()),
        )),
        _ => None,
    }
}

/// Name-pattern heuristics, checked in a fixed order.
fn from_name_pattern(name: &str) -> Option<(ValueCategory, SampleValue)> {
    if name.contains("seqno") || name.ends_with("id") || name.ends_with("no") {
        return Some((ValueCategory::Number, SampleValue::Number(1)));
    }
    if name.ends_with("cnt") || name.ends_with("amt") {
        return Some((ValueCategory::Number, SampleValue::Number(0)));
    }
    if name.ends_with("yn") || name.ends_with("flag") {
        return Some((ValueCategory::Boolean, SampleValue::Text("Y".to_string())));
    }
    if name.ends_with("cd") || name.ends_with("code") {
        return Some((
            ValueCategory::String,
            SampleValue::Text(SAMPLE_TEXT.to_string()),
        ));
    }
    if name.contains("dtm") {
        return Some((
            ValueCategory::Date,
            SampleValue::Text(SAMPLE_TIMESTAMP.to_string()),
        ));
    }
    if name.contains("date") {
        return Some((
            ValueCategory::Date,
            SampleValue::Text(SAMPLE_DATE.to_string()),
        ));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn bind(name: &str, jdbc: Option<&str>) -> ParameterRef {
        ParameterRef {
            name: name.to_string(),
            jdbc_type: jdbc.map(str::to_string),
            usage: UsageContext::Bind,
        }
    }

    #[test]
    fn test_jdbc_hint_wins_over_name() {
        let (cat, value) = infer(&bind("statusCd", Some("INTEGER")));
        assert_eq!(cat, ValueCategory::Number);
        assert_eq!(value, SampleValue::Number(0));
    }

    #[test]
    fn test_id_suffix_is_number_one() {
        let (cat, value) = infer(&bind("userId", None));
        assert_eq!(cat, ValueCategory::Number);
        assert_eq!(value, SampleValue::Number(1));
    }

    #[test]
    fn test_cnt_suffix_is_number_zero() {
        let (_, value) = infer(&bind("retryCnt", None));
        assert_eq!(value, SampleValue::Number(0));
    }

    #[test]
    fn test_dtm_is_full_timestamp() {
        let (cat, value) = infer(&bind("regDtm", None));
        assert_eq!(cat, ValueCategory::Date);
        assert_eq!(value, SampleValue::Text("20240101000000".to_string()));
    }

    #[test]
    fn test_date_is_date_literal() {
        let (_, value) = infer(&bind("startDate", None));
        assert_eq!(value, SampleValue::Text("20240101".to_string()));
    }

    #[test]
    fn test_yn_suffix_is_boolean_y() {
        let (cat, value) = infer(&bind("useYn", None));
        assert_eq!(cat, ValueCategory::Boolean);
        assert_eq!(value, SampleValue::Text("Y".to_string()));
    }

    #[test]
    fn test_list_prefix_is_two_element_list() {
        let (cat, value) = infer(&bind("listIds", None));
        assert_eq!(cat, ValueCategory::List);
        assert_eq!(
            value,
            SampleValue::List(vec!["TEST1".to_string(), "TEST2".to_string()])
        );
    }

    #[test]
    fn test_collection_usage_is_list() {
        let param = ParameterRef {
            name: "targetKeys".to_string(),
            jdbc_type: None,
            usage: UsageContext::Collection,
        };
        let (cat, _) = infer(&param);
        assert_eq!(cat, ValueCategory::List);
    }

    #[test]
    fn test_generic_fallback_is_test_string() {
        let (cat, value) = infer(&bind("status", Some("VARCHAR")));
        assert_eq!(cat, ValueCategory::String);
        assert_eq!(value, SampleValue::Text("TEST".to_string()));
    }

    #[test]
    fn test_order_literal_is_column_position() {
        let param = ParameterRef {
            name: "orderby".to_string(),
            jdbc_type: None,
            usage: UsageContext::Literal,
        };
        let (_, value) = infer(&param);
        assert_eq!(value, SampleValue::Text("1".to_string()));
    }
}

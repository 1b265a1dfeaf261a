use crate::node::KeyValue;
use std::str::FromStr;
use tracing::warn;

/// Parses a numeric scalar, falling back to the zero value on failure.
pub(crate) fn parse_or_default<T>(node: &KeyValue, section: &str) -> T
where
    T: FromStr + Default,
    T::Err: std::fmt::Display,
{
    let Some(raw) = node.as_str() else {
        warn!(section, field = %node.name, "expected a scalar, found nested values");
        return T::default();
    };

    parse_text_or_default(raw, &node.name, section)
}

pub(crate) fn parse_text_or_default<T>(raw: &str, field: &str, section: &str) -> T
where
    T: FromStr + Default,
    T::Err: std::fmt::Display,
{
    match raw.trim().parse::<T>() {
        Ok(value) => value,
        Err(e) => {
            warn!(section, field, value = %raw, error = %e, "unparsable field, using default");
            T::default()
        }
    }
}

/// Flags are set only by the exact string "1".
pub(crate) fn flag(node: &KeyValue) -> bool {
    node.as_str() == Some("1")
}

pub(crate) fn text(node: &KeyValue) -> String {
    node.to_interchange_string()
}

pub(crate) fn unknown_field(section: &str, node: &KeyValue) {
    warn!(section, field = %node.name, "unrecognized field ignored");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_only_exact_one() {
        assert!(flag(&KeyValue::leaf("f", "1")));
        assert!(!flag(&KeyValue::leaf("f", "01")));
        assert!(!flag(&KeyValue::leaf("f", "true")));
        assert!(!flag(&KeyValue::leaf("f", " 1")));
        assert!(!flag(&KeyValue::branch("f", vec![])));
    }

    #[test]
    fn test_parse_or_default() {
        assert_eq!(parse_or_default::<u32>(&KeyValue::leaf("n", "12"), "t"), 12);
        assert_eq!(parse_or_default::<u32>(&KeyValue::leaf("n", "abc"), "t"), 0);
        assert_eq!(parse_or_default::<i64>(&KeyValue::leaf("n", "-3"), "t"), -3);
        assert_eq!(parse_or_default::<u64>(&KeyValue::branch("n", vec![]), "t"), 0);
    }
}

use crate::value::{Number, Value};
use std::fmt;
use std::sync::Arc;

/// Turns values into text when they are concatenated to strings.
///
/// A formatter returning `None` lets the next registered formatter try.
pub trait StringFormatter: Send + Sync {
    /// Format `value`, or `None` to let the next formatter try
    fn format(&self, value: &Value) -> Option<String>;
}

/// Formats floats with a fixed number of decimals
#[derive(Debug, Clone, Copy)]
pub struct FixedDecimalFormatter {
    /// Digits after the decimal point
    pub decimals: usize,
}

impl StringFormatter for FixedDecimalFormatter {
    fn format(&self, value: &Value) -> Option<String> {
        match value {
            Value::Numeric(Number::Float(f)) => Some(format!("{:.*}", self.decimals, f)),
            _ => None,
        }
    }
}

/// Formats byte arrays as lowercase hex, without a prefix
#[derive(Debug, Clone, Copy, Default)]
pub struct HexFormatter;

impl StringFormatter for HexFormatter {
    fn format(&self, value: &Value) -> Option<String> {
        value
            .as_bytes()
            .map(|bytes| bytes.iter().map(|b| format!("{:02x}", b)).collect())
    }
}

/// The formatters active for one expression, in registration order.
#[derive(Clone, Default)]
pub struct Formatters(Arc<[Arc<dyn StringFormatter>]>);

impl Formatters {
    pub fn new(formatters: Vec<Arc<dyn StringFormatter>>) -> Self {
        Self(formatters.into())
    }

    /// Format `value` with the first formatter accepting it, or its `Display`
    pub fn format(&self, value: &Value) -> String {
        if let Value::String(text) = value {
            return text.clone();
        }
        self.0
            .iter()
            .find_map(|formatter| formatter.format(value))
            .unwrap_or_else(|| value.to_string())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Formatters {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "Formatters({})", self.0.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_accepting_formatter_wins() {
        let formatters: Vec<Arc<dyn StringFormatter>> = vec![
            Arc::new(FixedDecimalFormatter { decimals: 2 }) as Arc<dyn StringFormatter>,
            Arc::new(HexFormatter),
        ];
        let formatters = Formatters::new(formatters);
        assert_eq!(formatters.format(&Value::from(1.5)), "1.50");
        assert_eq!(formatters.format(&Value::from(vec![0xab])), "ab");
        assert_eq!(formatters.format(&Value::from(3)), "3");
        assert_eq!(formatters.format(&Value::from("as is")), "as is");
    }

    #[test]
    fn defaults_to_display() {
        let formatters = Formatters::default();
        assert_eq!(formatters.format(&Value::from(vec![0xab])), "0xAB");
        assert_eq!(formatters.format(&Value::from(false)), "false");
    }
}

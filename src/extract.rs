//! Literal recognition.
//!
//! Extractors run over the raw text before any structural parsing and replace
//! every literal they recognize with a generated placeholder. Interpreters run
//! later, on the individual tokens left once the text has been split on its
//! operators.

use crate::definition::MathDefinition;
use crate::error::{Error, Result};
use crate::lexer::{is_identifier_part, scientific_number_len};
use crate::value::Value;
use hashbrown::HashMap;

pub(crate) const PLACEHOLDER_START: char = '\u{E000}';
pub(crate) const PLACEHOLDER_END: char = '\u{E001}';

/// Build a placeholder name. Placeholders use private-use characters, so they
/// never collide with user text or with operator tokens.
pub(crate) fn placeholder(tag: char, index: usize) -> String {
    format!("{}{}{}{}", PLACEHOLDER_START, tag, index, PLACEHOLDER_END)
}

/// Check if `token` is a generated placeholder
pub fn is_placeholder(token: &str) -> bool {
    token.starts_with(PLACEHOLDER_START) && token.ends_with(PLACEHOLDER_END) && token.len() > 2
}

/// What a constant placeholder stands for
#[derive(Debug, Clone, PartialEq)]
pub enum TableEntry {
    /// A literal value
    Value(Value),
    /// A parameter whose name was written between special symbol indicators
    ParameterName(String),
}

/// Parse-scoped table of extracted constants.
#[derive(Debug, Default)]
pub struct ConstantTable {
    entries: HashMap<String, TableEntry>,
    /// Reverse lookup, so the same literal is only registered once
    reverse: HashMap<String, String>,
}

impl ConstantTable {
    /// An empty table
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, key: String, entry: TableEntry) -> String {
        if let Some(name) = self.reverse.get(&key) {
            return name.clone();
        }
        let name = placeholder('c', self.entries.len());
        self.entries.insert(name.clone(), entry);
        self.reverse.insert(key, name.clone());
        name
    }

    /// Register a literal value and get its placeholder
    pub fn insert_value(&mut self, value: Value) -> String {
        let key = format!("{:?}", value);
        self.insert(key, TableEntry::Value(value))
    }

    /// Register a parameter name and get its placeholder
    pub fn insert_parameter_name(&mut self, name: &str) -> String {
        let key = format!("name:{}", name);
        self.insert(key, TableEntry::ParameterName(name.to_owned()))
    }

    /// The entry registered under `placeholder`
    pub fn get(&self, placeholder: &str) -> Option<&TableEntry> {
        self.entries.get(placeholder)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if there are no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Recognizes literals in the raw text of an expression.
pub trait ConstantExtractor: Send + Sync {
    /// Extractors with a higher level run first
    fn level(&self) -> i32 {
        0
    }

    /// Replace every literal found in `expression` with a placeholder
    /// registered in `constants`, and return the rewritten text.
    fn extract(
        &self,
        expression: &str,
        definition: &MathDefinition,
        constants: &mut ConstantTable,
    ) -> Result<String>;
}

/// Recognizes a single token left after the expression has been split on its
/// operators.
pub trait ConstantInterpreter: Send + Sync {
    /// Interpreters with a higher level are consulted first
    fn level(&self) -> i32 {
        0
    }

    /// The value denoted by `token`, if this interpreter recognizes it
    fn interpret(&self, token: &str) -> Option<Value>;
}

/// Recognizes expressions that must not be parsed at all. A match turns the
/// entire text into a single string constant.
pub trait PassThroughExtractor: Send + Sync {
    /// Check if `expression` must be kept as a string
    fn matches(&self, expression: &str) -> bool;
}

/// Pass-through extractor built from a predicate
pub struct PredicatePassThrough<F>(pub F);

impl<F> PassThroughExtractor for PredicatePassThrough<F>
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn matches(&self, expression: &str) -> bool {
        (self.0)(expression)
    }
}

/// Extracts quoted strings, honouring the escape character.
#[derive(Debug, Default, Clone, Copy)]
pub struct StringExtractor;

impl ConstantExtractor for StringExtractor {
    fn level(&self) -> i32 {
        1000
    }

    fn extract(
        &self,
        expression: &str,
        definition: &MathDefinition,
        constants: &mut ConstantTable,
    ) -> Result<String> {
        let quote = definition.string_indicator.as_str();
        let escape = definition.escape_character.as_str();
        let mut output = String::with_capacity(expression.len());
        let mut rest = expression;

        while let Some(start) = rest.find(quote) {
            output.push_str(&rest[..start]);
            rest = &rest[start + quote.len()..];

            let mut literal = String::new();
            loop {
                if rest.is_empty() {
                    return Err(Error::Structural(format!(
                        "unterminated string literal in '{}'",
                        expression
                    )));
                }
                if let Some(escaped) = rest.strip_prefix(escape) {
                    if let Some(after) = escaped.strip_prefix(quote) {
                        literal.push_str(quote);
                        rest = after;
                    } else if let Some(after) = escaped.strip_prefix(escape) {
                        literal.push_str(escape);
                        rest = after;
                    } else {
                        let mut chars = escaped.chars();
                        match chars.next() {
                            Some('n') => literal.push('\n'),
                            Some('t') => literal.push('\t'),
                            Some('r') => literal.push('\r'),
                            Some(other) => {
                                literal.push_str(escape);
                                literal.push(other);
                            }
                            None => literal.push_str(escape),
                        }
                        rest = chars.as_str();
                    }
                } else if let Some(after) = rest.strip_prefix(quote) {
                    rest = after;
                    break;
                } else {
                    let mut chars = rest.chars();
                    if let Some(c) = chars.next() {
                        literal.push(c);
                    }
                    rest = chars.as_str();
                }
            }
            output.push_str(&constants.insert_value(Value::String(literal)));
        }
        output.push_str(rest);
        Ok(output)
    }
}

/// Extracts parameter names written between the special symbol indicators,
/// e.g. `[flow-rate]`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SpecialSymbolExtractor;

impl ConstantExtractor for SpecialSymbolExtractor {
    fn level(&self) -> i32 {
        900
    }

    fn extract(
        &self,
        expression: &str,
        definition: &MathDefinition,
        constants: &mut ConstantTable,
    ) -> Result<String> {
        let (open, close) = &definition.special_symbol_indicators;
        let mut output = String::with_capacity(expression.len());
        let mut rest = expression;
        while let Some(start) = rest.find(open.as_str()) {
            output.push_str(&rest[..start]);
            let after_open = &rest[start + open.len()..];
            let end = after_open.find(close.as_str()).ok_or_else(|| {
                Error::Structural(format!("unterminated special symbol in '{}'", expression))
            })?;
            let name = after_open[..end].trim();
            if name.is_empty() {
                return Err(Error::Structural("empty special symbol".into()));
            }
            output.push_str(&constants.insert_parameter_name(name));
            rest = &after_open[end + close.len()..];
        }
        output.push_str(rest);
        Ok(output)
    }
}

/// Extracts numbers written in scientific notation, before the sign of their
/// exponent can be mistaken for an operator.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScientificNumberExtractor;

impl ConstantExtractor for ScientificNumberExtractor {
    fn level(&self) -> i32 {
        800
    }

    fn extract(
        &self,
        expression: &str,
        _definition: &MathDefinition,
        constants: &mut ConstantTable,
    ) -> Result<String> {
        let mut output = String::with_capacity(expression.len());
        let mut previous: Option<char> = None;
        let mut position = 0;
        while position < expression.len() {
            let rest = &expression[position..];
            let glued = previous.map_or(false, |c| is_identifier_part(c) || c == PLACEHOLDER_START);
            if !glued {
                if let Some(len) = scientific_number_len(rest) {
                    if let Ok(number) = rest[..len].parse::<f64>() {
                        output.push_str(&constants.insert_value(Value::from(number)));
                        position += len;
                        previous = rest[..len].chars().last();
                        continue;
                    }
                }
            }
            let c = rest.chars().next().unwrap_or_default();
            output.push(c);
            previous = Some(c);
            position += c.len_utf8().max(1);
        }
        Ok(output)
    }
}

/// Decimal integers and floats
#[derive(Debug, Default, Clone, Copy)]
pub struct NumberInterpreter;

impl ConstantInterpreter for NumberInterpreter {
    fn level(&self) -> i32 {
        100
    }

    fn interpret(&self, token: &str) -> Option<Value> {
        if token.is_empty() || !token.chars().all(|c| c.is_ascii_digit() || c == '.') {
            return None;
        }
        if let Ok(integer) = token.parse::<i64>() {
            return Some(Value::from(integer));
        }
        token.parse::<f64>().ok().map(Value::from)
    }
}

/// `true` and `false`, in any case
#[derive(Debug, Default, Clone, Copy)]
pub struct BooleanInterpreter;

impl ConstantInterpreter for BooleanInterpreter {
    fn level(&self) -> i32 {
        90
    }

    fn interpret(&self, token: &str) -> Option<Value> {
        if token.eq_ignore_ascii_case("true") {
            Some(Value::Boolean(true))
        } else if token.eq_ignore_ascii_case("false") {
            Some(Value::Boolean(false))
        } else {
            None
        }
    }
}

/// Hexadecimal byte arrays: `0x` followed by an even number of hex digits
#[derive(Debug, Default, Clone, Copy)]
pub struct ByteArrayInterpreter;

impl ConstantInterpreter for ByteArrayInterpreter {
    fn level(&self) -> i32 {
        80
    }

    fn interpret(&self, token: &str) -> Option<Value> {
        let digits = token.strip_prefix("0x").or_else(|| token.strip_prefix("0X"))?;
        if digits.is_empty() || digits.len() % 2 != 0 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        let bytes = (0..digits.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&digits[i..i + 2], 16))
            .collect::<std::result::Result<Vec<u8>, _>>()
            .ok()?;
        Some(Value::ByteArray(bytes))
    }
}

/// Well known mathematical constants
#[derive(Debug, Default, Clone, Copy)]
pub struct NamedConstantInterpreter;

impl ConstantInterpreter for NamedConstantInterpreter {
    fn level(&self) -> i32 {
        10
    }

    fn interpret(&self, token: &str) -> Option<Value> {
        let value = match token {
            "pi" | "π" => std::f64::consts::PI,
            "e" => std::f64::consts::E,
            "tau" | "τ" => std::f64::consts::TAU,
            "∞" => f64::INFINITY,
            _ => return None,
        };
        Some(Value::from(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn extract(extractor: &dyn ConstantExtractor, text: &str) -> (String, ConstantTable) {
        let mut constants = ConstantTable::new();
        let output = extractor
            .extract(text, &MathDefinition::default(), &mut constants)
            .unwrap();
        (output, constants)
    }

    #[test]
    fn strings() {
        let (output, constants) = extract(&StringExtractor, r#"a + "x\"y" + "x\"y" + "b""#);
        assert_eq!(constants.len(), 2);
        let first = placeholder('c', 0);
        assert_eq!(output, format!("a + {} + {} + {}", first, first, placeholder('c', 1)));
        assert_eq!(
            constants.get(&first),
            Some(&TableEntry::Value(Value::from("x\"y")))
        );
    }

    #[test]
    fn unterminated_string_is_structural() {
        let mut constants = ConstantTable::new();
        let result = StringExtractor.extract("\"abc", &MathDefinition::default(), &mut constants);
        assert!(matches!(result, Err(Error::Structural(_))));
    }

    #[test]
    fn special_symbols() {
        let (output, constants) = extract(&SpecialSymbolExtractor, "[flow-rate] * 2");
        assert_eq!(output, format!("{} * 2", placeholder('c', 0)));
        assert_eq!(
            constants.get(&placeholder('c', 0)),
            Some(&TableEntry::ParameterName("flow-rate".into()))
        );
    }

    #[test]
    fn scientific_numbers() {
        let (output, constants) = extract(&ScientificNumberExtractor, "1.5e-3+x2e5-2E2");
        assert_eq!(
            output,
            format!("{}+x2e5-{}", placeholder('c', 0), placeholder('c', 1))
        );
        assert_eq!(
            constants.get(&placeholder('c', 1)),
            Some(&TableEntry::Value(Value::from(200.0)))
        );
    }

    #[test_case("42" => Some(Value::from(42)) ; "integer")]
    #[test_case("4.25" => Some(Value::from(4.25)) ; "float")]
    #[test_case("abc" => None ; "identifier")]
    #[test_case("inf" => None ; "rust float keywords are not numbers")]
    fn numbers(token: &str) -> Option<Value> {
        NumberInterpreter.interpret(token)
    }

    #[test]
    fn other_interpreters() {
        assert_eq!(BooleanInterpreter.interpret("TRUE"), Some(Value::Boolean(true)));
        assert_eq!(
            ByteArrayInterpreter.interpret("0x0aFF"),
            Some(Value::ByteArray(vec![0x0a, 0xff]))
        );
        assert_eq!(ByteArrayInterpreter.interpret("0x0aF"), None);
        assert_eq!(
            NamedConstantInterpreter.interpret("pi"),
            Some(Value::from(std::f64::consts::PI))
        );
    }

    #[test]
    fn placeholders() {
        assert!(is_placeholder(&placeholder('s', 3)));
        assert!(!is_placeholder("s3"));
    }
}

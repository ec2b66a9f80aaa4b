use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// How operators of different kinds bind relative to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperatorPrecedenceStyle {
    /// Power binds tighter than multiplication, all comparisons share one level.
    Mathematical,
    /// C rules: power is multiplicative, relational binds tighter than equality.
    CStyle,
}

impl Default for OperatorPrecedenceStyle {
    fn default() -> Self {
        Self::Mathematical
    }
}

/// The textual symbols understood by the parser.
///
/// Every token can be overridden independently; the parser derives all of its
/// splitting and ordering decisions from the definition it is given.
///
/// ```
/// # use formulary::MathDefinition;
/// let definition = MathDefinition {
///     power: "**".into(),
///     ..MathDefinition::default()
/// };
/// assert!(definition.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MathDefinition {
    /// Addition and string concatenation, `+` by default
    pub add: String,
    /// `-` by default, also used for negation
    pub subtract: String,
    /// `*` by default
    pub multiply: String,
    /// `/` by default
    pub divide: String,
    /// `%` by default
    pub modulo: String,
    /// `^` by default
    pub power: String,
    /// `<<` by default
    pub left_shift: String,
    /// `>>` by default
    pub right_shift: String,
    /// Logical or bitwise and, `&` by default
    pub and: String,
    /// Logical or bitwise or, `|` by default
    pub or: String,
    /// Logical or bitwise exclusive or, `#` by default
    pub xor: String,
    /// Prefix negation of booleans and integers, `!` by default
    pub not: String,
    /// `=` by default
    pub equals: String,
    /// `!=` by default
    pub does_not_equal: String,
    /// `>` by default
    pub greater_than: String,
    /// `>=` by default
    pub greater_than_or_equal: String,
    /// `<` by default
    pub less_than: String,
    /// `<=` by default
    pub less_than_or_equal: String,
    /// Opening and closing parenthesis
    pub parentheses: (String, String),
    /// Delimiters for parameter names that contain reserved characters
    pub special_symbol_indicators: (String, String),
    /// Separates the arguments of a function call
    pub parameter_separator: String,
    /// Opens and closes string literals
    pub string_indicator: String,
    /// Escapes the string indicator inside string literals
    pub escape_character: String,
    /// How the operators are grouped into precedence levels
    pub operator_precedence_style: OperatorPrecedenceStyle,
}

impl Default for MathDefinition {
    fn default() -> Self {
        Self {
            add: "+".into(),
            subtract: "-".into(),
            multiply: "*".into(),
            divide: "/".into(),
            modulo: "%".into(),
            power: "^".into(),
            left_shift: "<<".into(),
            right_shift: ">>".into(),
            and: "&".into(),
            or: "|".into(),
            xor: "#".into(),
            not: "!".into(),
            equals: "=".into(),
            does_not_equal: "!=".into(),
            greater_than: ">".into(),
            greater_than_or_equal: ">=".into(),
            less_than: "<".into(),
            less_than_or_equal: "<=".into(),
            parentheses: ("(".into(), ")".into()),
            special_symbol_indicators: ("[".into(), "]".into()),
            parameter_separator: ",".into(),
            string_indicator: "\"".into(),
            escape_character: "\\".into(),
            operator_precedence_style: OperatorPrecedenceStyle::Mathematical,
        }
    }
}

impl MathDefinition {
    /// Every operator token, with the name of its field
    pub(crate) fn operator_tokens(&self) -> [(&'static str, &str); 18] {
        [
            ("add", &self.add),
            ("subtract", &self.subtract),
            ("multiply", &self.multiply),
            ("divide", &self.divide),
            ("modulo", &self.modulo),
            ("power", &self.power),
            ("left_shift", &self.left_shift),
            ("right_shift", &self.right_shift),
            ("and", &self.and),
            ("or", &self.or),
            ("xor", &self.xor),
            ("not", &self.not),
            ("equals", &self.equals),
            ("does_not_equal", &self.does_not_equal),
            ("greater_than", &self.greater_than),
            ("greater_than_or_equal", &self.greater_than_or_equal),
            ("less_than", &self.less_than),
            ("less_than_or_equal", &self.less_than_or_equal),
        ]
    }

    /// Tokens that delimit structure rather than operations
    fn structural_tokens(&self) -> [(&'static str, &str); 6] {
        [
            ("parentheses.0", &self.parentheses.0),
            ("parentheses.1", &self.parentheses.1),
            ("special_symbol_indicators.0", &self.special_symbol_indicators.0),
            ("special_symbol_indicators.1", &self.special_symbol_indicators.1),
            ("parameter_separator", &self.parameter_separator),
            ("string_indicator", &self.string_indicator),
        ]
    }

    /// Check that the definition can drive a parser.
    ///
    /// No token may be empty or contain whitespace, operators must be distinct,
    /// and no operator may overlap a structural token.
    pub fn validate(&self) -> Result<()> {
        let operators = self.operator_tokens();
        let structural = self.structural_tokens();
        let escape = [("escape_character", self.escape_character.as_str())];

        for (name, token) in operators.iter().chain(&structural).chain(&escape) {
            if token.is_empty() || token.chars().any(char::is_whitespace) {
                return Err(Error::InvalidDefinition(format!(
                    "'{}' must be a non-empty token without whitespace",
                    name
                )));
            }
        }
        for (i, (name, token)) in operators.iter().enumerate() {
            if let Some((other, _)) = operators[i + 1..].iter().find(|(_, t)| t == token) {
                return Err(Error::InvalidDefinition(format!(
                    "'{}' and '{}' share the token '{}'",
                    name, other, token
                )));
            }
            for (structural_name, structural_token) in &structural {
                if token.contains(structural_token) || structural_token.contains(token) {
                    return Err(Error::InvalidDefinition(format!(
                        "'{}' overlaps '{}' ('{}')",
                        name, structural_name, token
                    )));
                }
            }
        }
        if self.parentheses.0 == self.parentheses.1 {
            return Err(Error::InvalidDefinition(
                "opening and closing parentheses must differ".into(),
            ));
        }
        Ok(())
    }
}

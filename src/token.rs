use crate::definition::{MathDefinition, OperatorPrecedenceStyle};

/// Operators understood by the parser, named after their [`MathDefinition`]
/// fields
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Power,
    LeftShift,
    RightShift,
    And,
    Or,
    Xor,
    Not,
    Equals,
    DoesNotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// Arithmetic negation
    Negate,
    /// Logical or bitwise complement
    Not,
}

impl Op {
    /// Get the operator precedence. Operators with higher precedence should be
    /// evaluated first.
    pub fn precedence(self, style: OperatorPrecedenceStyle) -> u8 {
        match style {
            OperatorPrecedenceStyle::Mathematical => match self {
                Self::Or => 1,
                Self::Xor => 2,
                Self::And => 3,
                Self::Equals
                | Self::DoesNotEqual
                | Self::GreaterThan
                | Self::GreaterThanOrEqual
                | Self::LessThan
                | Self::LessThanOrEqual => 4,
                Self::LeftShift | Self::RightShift => 5,
                Self::Add | Self::Subtract => 6,
                Self::Multiply | Self::Divide | Self::Modulo => 7,
                Self::Power => 8,
                Self::Not => u8::MAX,
            },
            OperatorPrecedenceStyle::CStyle => match self {
                Self::Or => 1,
                Self::Xor => 2,
                Self::And => 3,
                Self::Equals | Self::DoesNotEqual => 4,
                Self::GreaterThan
                | Self::GreaterThanOrEqual
                | Self::LessThan
                | Self::LessThanOrEqual => 5,
                Self::LeftShift | Self::RightShift => 6,
                Self::Add | Self::Subtract => 7,
                Self::Multiply | Self::Divide | Self::Modulo | Self::Power => 8,
                Self::Not => u8::MAX,
            },
        }
    }

    /// Check if the operator can only appear in prefix position
    pub fn is_unary_only(self) -> bool {
        self == Self::Not
    }

    /// Check if the operator produces a boolean from two comparable operands
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            Self::Equals
                | Self::DoesNotEqual
                | Self::GreaterThan
                | Self::GreaterThanOrEqual
                | Self::LessThan
                | Self::LessThanOrEqual
        )
    }

    /// The unary form of the operator in prefix position. `None` for the
    /// identity `+` and for operators that cannot be prefixes.
    pub fn as_prefix(self) -> Option<Option<UnaryOp>> {
        match self {
            Self::Subtract => Some(Some(UnaryOp::Negate)),
            Self::Not => Some(Some(UnaryOp::Not)),
            Self::Add => Some(None),
            _ => None,
        }
    }

    /// The default token of the operator
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Subtract => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
            Self::Modulo => "%",
            Self::Power => "^",
            Self::LeftShift => "<<",
            Self::RightShift => ">>",
            Self::And => "&",
            Self::Or => "|",
            Self::Xor => "#",
            Self::Not => "!",
            Self::Equals => "=",
            Self::DoesNotEqual => "!=",
            Self::GreaterThan => ">",
            Self::GreaterThanOrEqual => ">=",
            Self::LessThan => "<",
            Self::LessThanOrEqual => "<=",
        }
    }
}

/// One operator found in a flattened expression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occurrence {
    /// Byte offset of the operator token
    pub start: usize,
    /// Byte offset just past the operator token
    pub end: usize,
    pub op: Op,
    pub level: u8,
    /// The operator has no left operand
    pub prefix: bool,
}

/// The operator tokens of a definition, ready for scanning
#[derive(Debug, Clone)]
pub struct Operators {
    /// Sorted longest token first, so `>=` wins over `>`
    tokens: Vec<(String, Op)>,
    style: OperatorPrecedenceStyle,
}

impl Operators {
    pub fn new(definition: &MathDefinition) -> Self {
        let ops = [
            Op::Add,
            Op::Subtract,
            Op::Multiply,
            Op::Divide,
            Op::Modulo,
            Op::Power,
            Op::LeftShift,
            Op::RightShift,
            Op::And,
            Op::Or,
            Op::Xor,
            Op::Not,
            Op::Equals,
            Op::DoesNotEqual,
            Op::GreaterThan,
            Op::GreaterThanOrEqual,
            Op::LessThan,
            Op::LessThanOrEqual,
        ];
        let mut tokens: Vec<(String, Op)> = definition
            .operator_tokens()
            .iter()
            .zip(ops)
            .map(|((_, token), op)| ((*token).to_owned(), op))
            .collect();
        tokens.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        Self {
            tokens,
            style: definition.operator_precedence_style,
        }
    }

    /// Level of a prefix operator at the start of an expression. Under
    /// `Mathematical` it binds looser than power, so `-2^2` is `-(2^2)`.
    pub fn prefix_level(&self) -> u8 {
        match self.style {
            OperatorPrecedenceStyle::Mathematical => Op::Power.precedence(self.style) - 1,
            OperatorPrecedenceStyle::CStyle => u8::MAX,
        }
    }

    /// Match an operator token at the start of `text`
    pub fn match_at(&self, text: &str) -> Option<(Op, usize)> {
        self.tokens
            .iter()
            .find(|(token, _)| text.starts_with(token.as_str()))
            .map(|(token, op)| (*op, token.len()))
    }

    /// Check if `text` ends with an operator token
    pub fn ends_with_operator(&self, text: &str) -> bool {
        self.tokens
            .iter()
            .any(|(token, _)| text.ends_with(token.as_str()))
    }

    /// Find every operator occurrence in `text`, left to right, annotated with
    /// its precedence level.
    pub fn sequence(&self, text: &str) -> Vec<Occurrence> {
        let mut occurrences: Vec<Occurrence> = Vec::new();
        let mut position = 0;
        while position < text.len() {
            if let Some((op, len)) = self.match_at(&text[position..]) {
                let prefix = occurrences.last().map_or(position == 0, |last| last.end == position);
                occurrences.push(Occurrence {
                    start: position,
                    end: position + len,
                    op,
                    level: op.precedence(self.style),
                    prefix,
                });
                position += len;
            } else {
                position += text[position..].chars().next().map_or(1, char::len_utf8);
            }
        }
        occurrences
    }

    /// Split `text` on every operator and on `separator`, dropping empty parts
    pub fn split<'a>(&self, text: &'a str, separator: &str) -> Vec<&'a str> {
        let mut parts = Vec::new();
        let mut start = 0;
        let mut position = 0;
        while position < text.len() {
            let rest = &text[position..];
            let matched = self
                .match_at(rest)
                .map(|(_, len)| len)
                .or_else(|| rest.starts_with(separator).then(|| separator.len()));
            if let Some(len) = matched {
                if start < position {
                    parts.push(&text[start..position]);
                }
                position += len;
                start = position;
            } else {
                position += rest.chars().next().map_or(1, char::len_utf8);
            }
        }
        if start < text.len() {
            parts.push(&text[start..]);
        }
        parts
    }
}

#[cfg(test)]
mod tests {
    use super::{Op, Operators};
    use crate::definition::{MathDefinition, OperatorPrecedenceStyle};

    #[test]
    fn longest_token_wins() {
        let operators = Operators::new(&MathDefinition::default());
        let found: Vec<Op> = operators.sequence("a>=b!=c<<2").iter().map(|o| o.op).collect();
        assert_eq!(
            found,
            vec![Op::GreaterThanOrEqual, Op::DoesNotEqual, Op::LeftShift]
        );
    }

    #[test]
    fn prefix_detection() {
        let operators = Operators::new(&MathDefinition::default());
        let found = operators.sequence("-a*-b");
        assert_eq!(found.len(), 3);
        assert!(found[0].prefix);
        assert!(!found[1].prefix);
        assert!(found[2].prefix);
    }

    #[test]
    fn precedence_styles() {
        let math = OperatorPrecedenceStyle::Mathematical;
        let c = OperatorPrecedenceStyle::CStyle;
        assert!(Op::Power.precedence(math) > Op::Multiply.precedence(math));
        assert_eq!(Op::Power.precedence(c), Op::Multiply.precedence(c));
        assert_eq!(Op::LessThan.precedence(math), Op::Equals.precedence(math));
        assert!(Op::LessThan.precedence(c) > Op::Equals.precedence(c));
    }

    #[test]
    fn split() {
        let operators = Operators::new(&MathDefinition::default());
        assert_eq!(operators.split("ab+c*-d,e", ","), vec!["ab", "c", "d", "e"]);
    }
}

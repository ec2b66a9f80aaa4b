//! The symbol table and parenthesis resolution.
//!
//! Parentheses are removed from the text one pair at a time, innermost first.
//! Each pair becomes a placeholder symbol, either a plain grouping holding the
//! inner text or a function call holding one symbol per argument.

use crate::definition::MathDefinition;
use crate::error::{Error, Result};
use crate::extract::placeholder;
use crate::lexer::is_identifier;
use crate::token::Operators;
use hashbrown::HashMap;

/// A function call found in the text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionCall {
    pub function: String,
    /// One symbol name per argument
    pub arguments: Vec<String>,
}

/// A named placeholder for a piece of the expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpressionSymbol {
    pub name: String,
    /// The text this symbol stands for, parentheses already replaced
    pub expression: String,
    /// Set when the symbol is a function call rather than a grouping
    pub call: Option<FunctionCall>,
}

impl ExpressionSymbol {
    pub fn is_function_call(&self) -> bool {
        self.call.is_some()
    }
}

/// Parse-scoped table of symbols, the first one being the whole expression.
#[derive(Debug)]
pub struct SymbolTable {
    symbols: Vec<ExpressionSymbol>,
    by_name: HashMap<String, usize>,
    /// Reverse lookup, so identical texts share one symbol
    by_expression: HashMap<String, String>,
}

impl SymbolTable {
    /// Create a table whose root symbol is `expression`
    pub fn new(expression: &str) -> Self {
        let mut table = Self {
            symbols: Vec::new(),
            by_name: HashMap::new(),
            by_expression: HashMap::new(),
        };
        table.register(expression.to_owned(), None);
        table
    }

    fn register(&mut self, expression: String, call: Option<FunctionCall>) -> String {
        if let Some(name) = self.by_expression.get(&expression) {
            return name.clone();
        }
        let name = placeholder('s', self.symbols.len());
        self.by_name.insert(name.clone(), self.symbols.len());
        self.by_expression.insert(expression.clone(), name.clone());
        self.symbols.push(ExpressionSymbol {
            name: name.clone(),
            expression,
            call,
        });
        name
    }

    /// The symbol standing for the whole expression
    pub fn root(&self) -> &ExpressionSymbol {
        &self.symbols[0]
    }

    pub fn get(&self, name: &str) -> Option<&ExpressionSymbol> {
        self.by_name.get(name).map(|&index| &self.symbols[index])
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExpressionSymbol> {
        self.symbols.iter()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Replace every parenthesis of every symbol with nested symbols.
    pub fn resolve_parentheses(
        &mut self,
        definition: &MathDefinition,
        operators: &Operators,
    ) -> Result<()> {
        let mut index = 0;
        while index < self.symbols.len() {
            if !self.symbols[index].is_function_call() {
                let text = self.symbols[index].expression.clone();
                let flattened = self.flatten(text, definition, operators)?;
                self.by_expression.insert(flattened.clone(), self.symbols[index].name.clone());
                self.symbols[index].expression = flattened;
            }
            index += 1;
        }
        Ok(())
    }

    fn flatten(
        &mut self,
        mut text: String,
        definition: &MathDefinition,
        operators: &Operators,
    ) -> Result<String> {
        let (open, close) = (&definition.parentheses.0, &definition.parentheses.1);
        let separator = definition.parameter_separator.as_str();

        loop {
            let close_at = match text.find(close.as_str()) {
                Some(position) => position,
                None if text.contains(open.as_str()) => {
                    return Err(Error::Structural(format!("unmatched '{}' in '{}'", open, text)));
                }
                None => return Ok(text),
            };
            let open_at = text[..close_at].rfind(open.as_str()).ok_or_else(|| {
                Error::Structural(format!("unmatched '{}' in '{}'", close, text))
            })?;
            let inner = &text[open_at + open.len()..close_at];
            let before = &text[..open_at];

            let (replace_from, name) = match function_name_start(before, separator, open, operators) {
                Some(name_start) => {
                    let function = &before[name_start..];
                    if !is_identifier(function) {
                        return Err(Error::Structural(format!(
                            "'{}' cannot be called as a function",
                            function
                        )));
                    }
                    let mut arguments = Vec::new();
                    if !inner.is_empty() {
                        for argument in inner.split(separator) {
                            if argument.is_empty() {
                                return Err(Error::Structural(format!(
                                    "empty argument in call to '{}'",
                                    function
                                )));
                            }
                            arguments.push(self.register(argument.to_owned(), None));
                        }
                    }
                    let expression =
                        format!("{}{}{}{}", function, open, arguments.join(separator), close);
                    let call = FunctionCall {
                        function: function.to_owned(),
                        arguments,
                    };
                    (name_start, self.register(expression, Some(call)))
                }
                None => {
                    if inner.is_empty() {
                        return Err(Error::Structural("empty parentheses".into()));
                    }
                    if inner.contains(separator) {
                        return Err(Error::Structural(format!(
                            "'{}' outside of a function call",
                            separator
                        )));
                    }
                    (open_at, self.register(inner.to_owned(), None))
                }
            };
            log::trace!("replacing '{}' with a symbol", &text[replace_from..close_at + close.len()]);
            text.replace_range(replace_from..close_at + close.len(), &name);
        }
    }
}

/// Where the function name before an opening parenthesis starts, if the
/// parenthesis opens a call. The name runs back to the nearest operator,
/// separator or opening parenthesis.
fn function_name_start(
    before: &str,
    separator: &str,
    open: &str,
    operators: &Operators,
) -> Option<usize> {
    let mut boundary = 0;
    let mut position = 0;
    while position < before.len() {
        let rest = &before[position..];
        let delimiter = operators
            .match_at(rest)
            .map(|(_, len)| len)
            .or_else(|| rest.starts_with(separator).then(|| separator.len()))
            .or_else(|| rest.starts_with(open).then(|| open.len()));
        if let Some(len) = delimiter {
            position += len;
            boundary = position;
        } else {
            position += rest.chars().next().map_or(1, char::len_utf8);
        }
    }
    if boundary < before.len() {
        Some(boundary)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(text: &str) -> Result<SymbolTable> {
        let definition = MathDefinition::default();
        let mut table = SymbolTable::new(text);
        table.resolve_parentheses(&definition, &Operators::new(&definition))?;
        Ok(table)
    }

    #[test]
    fn groupings() {
        let table = resolve("(1+2)*(3+4)").unwrap();
        assert_eq!(table.len(), 3);
        let s1 = placeholder('s', 1);
        let s2 = placeholder('s', 2);
        assert_eq!(table.root().expression, format!("{}*{}", s1, s2));
        assert_eq!(table.get(&s1).unwrap().expression, "1+2");
        assert!(!table.get(&s1).unwrap().is_function_call());
    }

    #[test]
    fn nested_groupings_resolve_innermost_first() {
        let table = resolve("((a))").unwrap();
        let s1 = placeholder('s', 1);
        let s2 = placeholder('s', 2);
        assert_eq!(table.get(&s1).unwrap().expression, "a");
        assert_eq!(table.get(&s2).unwrap().expression, s1);
        assert_eq!(table.root().expression, s2);
    }

    #[test]
    fn function_calls() {
        let table = resolve("2+max(x,3.5*y)").unwrap();
        let call_symbol = table.iter().find(|s| s.is_function_call()).unwrap();
        let call = call_symbol.call.as_ref().unwrap();
        assert_eq!(call.function, "max");
        assert_eq!(call.arguments.len(), 2);
        assert_eq!(table.get(&call.arguments[0]).unwrap().expression, "x");
        assert_eq!(table.get(&call.arguments[1]).unwrap().expression, "3.5*y");
        assert_eq!(table.root().expression, format!("2+{}", call_symbol.name));
    }

    #[test]
    fn zero_argument_calls() {
        let table = resolve("random()*2").unwrap();
        let call = table.iter().find_map(|s| s.call.clone()).unwrap();
        assert_eq!(call.function, "random");
        assert!(call.arguments.is_empty());
    }

    #[test]
    fn identical_texts_share_a_symbol() {
        let table = resolve("(a+1)*(a+1)").unwrap();
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn structural_errors() {
        for text in &["(1+2", "1+2)", ")(", "()", "(1,2)", "max(1,)"] {
            assert!(
                matches!(resolve(text), Err(Error::Structural(_))),
                "{} should not resolve",
                text
            );
        }
    }
}

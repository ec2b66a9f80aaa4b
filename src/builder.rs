//! Tokens to tree.
//!
//! Once every parenthesis has been replaced by a symbol, the text of each
//! grouping symbol is a flat sequence of operands and operators. The builder
//! first classifies every operand token, then splits each text at its
//! loosest-binding operator until only leaves remain.

use crate::ast::{Ast, Node, NodeId};
use crate::error::{Error, Result};
use crate::extract::{is_placeholder, ConstantInterpreter, ConstantTable, TableEntry};
use crate::lexer::is_identifier;
use crate::parameters::ParameterRegistry;
use crate::registry::LevelDictionary;
use crate::symbols::SymbolTable;
use crate::token::{Occurrence, Operators};
use crate::value::Value;
use hashbrown::HashMap;
use std::sync::Arc;

/// What an operand token stands for
#[derive(Debug, Clone, PartialEq)]
enum Leaf {
    Constant(Value),
    Symbol(String),
    Parameter(String),
}

pub(crate) struct NodeBuilder<'a> {
    operators: &'a Operators,
    symbols: &'a SymbolTable,
    parameters: &'a mut ParameterRegistry,
    leaves: HashMap<String, Leaf>,
    built: HashMap<String, NodeId>,
    ast: Ast,
}

impl<'a> NodeBuilder<'a> {
    /// Classify every operand token of every grouping symbol: extracted
    /// constant, symbol, interpreted literal, or parameter.
    pub fn populate(
        operators: &'a Operators,
        separator: &str,
        symbols: &'a SymbolTable,
        constants: &mut ConstantTable,
        interpreters: &LevelDictionary<Arc<dyn ConstantInterpreter>>,
        parameters: &'a mut ParameterRegistry,
    ) -> Result<Self> {
        let mut leaves = HashMap::new();
        for symbol in symbols.iter().filter(|symbol| !symbol.is_function_call()) {
            for token in operators.split(&symbol.expression, separator) {
                if leaves.contains_key(token) {
                    continue;
                }
                let leaf = classify(token, symbols, constants, interpreters)?;
                if let Leaf::Parameter(ref name) = leaf {
                    parameters.advertise(name);
                }
                leaves.insert(token.to_owned(), leaf);
            }
        }
        log::trace!("{} distinct operand tokens", leaves.len());
        Ok(Self {
            operators,
            symbols,
            parameters,
            leaves,
            built: HashMap::new(),
            ast: Ast::default(),
        })
    }

    /// Build the tree of the root symbol
    pub fn build(mut self) -> Result<Ast> {
        let symbols = self.symbols;
        let root = self.symbol(&symbols.root().name)?;
        self.ast.set_root(root);
        Ok(self.ast)
    }

    fn symbol(&mut self, name: &str) -> Result<NodeId> {
        if let Some(id) = self.built.get(name) {
            return Ok(*id);
        }
        let symbols = self.symbols;
        let symbol = symbols
            .get(name)
            .ok_or_else(|| Error::Structural(format!("unknown symbol {:?}", name)))?;
        let id = match symbol.call {
            Some(ref call) => {
                let arguments = call
                    .arguments
                    .iter()
                    .map(|argument| self.symbol(argument))
                    .collect::<Result<Vec<NodeId>>>()?;
                self.ast.push(Node::Call {
                    name: call.function.clone(),
                    function: None,
                    arguments,
                })
            }
            None => self.expression(&symbol.expression)?,
        };
        self.built.insert(name.to_owned(), id);
        Ok(id)
    }

    fn expression(&mut self, text: &str) -> Result<NodeId> {
        if text.is_empty() {
            return Err(Error::Structural("missing operand".into()));
        }
        let occurrences = self.operators.sequence(text);
        if occurrences.is_empty() {
            return self.leaf(text);
        }

        let split = split_point(&occurrences);
        let first = occurrences[0];
        let prefix_first = first.prefix
            && first.start == 0
            && split.map_or(true, |split| split.level > self.operators.prefix_level());
        if let Some(split) = split.filter(|_| !prefix_first) {
            if split.op.is_unary_only() {
                return Err(Error::Structural(format!(
                    "'{}' cannot be used between two operands",
                    &text[split.start..split.end]
                )));
            }
            let left = self.expression(&text[..split.start])?;
            let right = self.expression(&text[split.end..])?;
            return Ok(self.ast.push(Node::Binary {
                op: split.op,
                left,
                right,
            }));
        }

        // A prefix operator applying to the rest of the text
        let operand = &text[first.end..];
        match first.op.as_prefix() {
            Some(Some(op)) => {
                let operand = self.expression(operand)?;
                Ok(self.ast.push(Node::Unary { op, operand }))
            }
            Some(None) => self.expression(operand),
            None => Err(Error::Structural(format!(
                "'{}' is missing its left operand",
                &text[first.start..first.end]
            ))),
        }
    }

    fn leaf(&mut self, token: &str) -> Result<NodeId> {
        if let Some(id) = self.built.get(token) {
            return Ok(*id);
        }
        let leaf = self
            .leaves
            .get(token)
            .cloned()
            .ok_or_else(|| Error::Structural(format!("unexpected operand '{}'", token)))?;
        let id = match leaf {
            Leaf::Symbol(name) => self.symbol(&name)?,
            Leaf::Constant(value) => self.ast.push(Node::Constant(value)),
            Leaf::Parameter(name) => {
                let id = self.parameters.advertise(&name);
                self.ast.push(Node::Parameter(id))
            }
        };
        self.built.insert(token.to_owned(), id);
        Ok(id)
    }
}

/// The binary operator to split at: the loosest binding one, the last of them
/// when several share the lowest level.
fn split_point(occurrences: &[Occurrence]) -> Option<Occurrence> {
    occurrences
        .iter()
        .filter(|occurrence| !occurrence.prefix)
        .fold(None, |best: Option<&Occurrence>, occurrence| match best {
            Some(best) if best.level < occurrence.level => Some(best),
            _ => Some(occurrence),
        })
        .copied()
}

fn classify(
    token: &str,
    symbols: &SymbolTable,
    constants: &mut ConstantTable,
    interpreters: &LevelDictionary<Arc<dyn ConstantInterpreter>>,
) -> Result<Leaf> {
    if is_placeholder(token) {
        if let Some(entry) = constants.get(token) {
            return Ok(match entry {
                TableEntry::Value(value) => Leaf::Constant(value.clone()),
                TableEntry::ParameterName(name) => Leaf::Parameter(name.clone()),
            });
        }
        if symbols.get(token).is_some() {
            return Ok(Leaf::Symbol(token.to_owned()));
        }
    }
    if token.contains(|c: char| ('\u{E000}'..='\u{E001}').contains(&c)) {
        return Err(Error::Structural(format!("operator missing around {:?}", token)));
    }
    if let Some(value) = interpreters.iter().find_map(|interpreter| interpreter.interpret(token)) {
        constants.insert_value(value.clone());
        return Ok(Leaf::Constant(value));
    }
    if is_identifier(token) {
        return Ok(Leaf::Parameter(token.to_owned()));
    }
    Err(Error::Structural(format!("'{}' is neither a value nor a name", token)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{MathDefinition, OperatorPrecedenceStyle};
    use crate::extract::{BooleanInterpreter, NamedConstantInterpreter, NumberInterpreter};
    use crate::token::{Op, UnaryOp};
    use test_case::test_case;

    fn interpreters() -> LevelDictionary<Arc<dyn ConstantInterpreter>> {
        let mut interpreters: LevelDictionary<Arc<dyn ConstantInterpreter>> = LevelDictionary::new();
        interpreters.insert(100, Arc::new(NumberInterpreter));
        interpreters.insert(90, Arc::new(BooleanInterpreter));
        interpreters.insert(10, Arc::new(NamedConstantInterpreter));
        interpreters
    }

    fn build(text: &str) -> Result<(Ast, ParameterRegistry)> {
        build_with(text, &MathDefinition::default())
    }

    fn build_with(text: &str, definition: &MathDefinition) -> Result<(Ast, ParameterRegistry)> {
        let operators = Operators::new(definition);
        let mut symbols = SymbolTable::new(text);
        symbols.resolve_parentheses(definition, &operators)?;
        let mut constants = ConstantTable::new();
        let mut parameters = ParameterRegistry::new();
        let ast = NodeBuilder::populate(
            &operators,
            &definition.parameter_separator,
            &symbols,
            &mut constants,
            &interpreters(),
            &mut parameters,
        )?
        .build()?;
        Ok((ast, parameters))
    }

    /// Render the tree with explicit parentheses
    fn render(ast: &Ast, id: NodeId, parameters: &ParameterRegistry) -> String {
        match ast.node(id) {
            Node::Constant(value) => value.to_string(),
            Node::Parameter(p) => parameters.parameter(*p).name().to_owned(),
            Node::Unary { op: UnaryOp::Negate, operand } => format!("-{}", render(ast, *operand, parameters)),
            Node::Unary { op: UnaryOp::Not, operand } => format!("!{}", render(ast, *operand, parameters)),
            Node::Binary { op, left, right } => format!(
                "({} {} {})",
                render(ast, *left, parameters),
                op.symbol(),
                render(ast, *right, parameters)
            ),
            Node::Call { name, arguments, .. } => {
                let arguments: Vec<String> = arguments.iter().map(|a| render(ast, *a, parameters)).collect();
                format!("{}[{}]", name, arguments.join("; "))
            }
        }
    }

    #[test_case("2+3*4" => "(2 + (3 * 4))" ; "product binds tighter")]
    #[test_case("(2+3)*4" => "((2 + 3) * 4)" ; "groupings")]
    #[test_case("8-3-2" => "((8 - 3) - 2)" ; "left association")]
    #[test_case("2^3^2" => "((2 ^ 3) ^ 2)" ; "power associates left")]
    #[test_case("-2^2" => "-(2 ^ 2)" ; "power binds tighter than negation")]
    #[test_case("2*-3^2" => "(2 * -(3 ^ 2))" ; "negated power operand")]
    #[test_case("-a*b" => "(-a * b)" ; "negation binds tighter than product")]
    #[test_case("2^-3" => "(2 ^ -3)" ; "negative exponent")]
    #[test_case("a*-b" => "(a * -b)" ; "prefix after operator")]
    #[test_case("+a" => "a" ; "prefix plus is identity")]
    #[test_case("!a|b" => "(!a | b)" ; "not")]
    #[test_case("a>=b+1" => "(a >= (b + 1))" ; "comparisons bind loosest")]
    #[test_case("a!=b" => "(a != b)" ; "longest operator token")]
    #[test_case("2+max(x,3.5*y)" => "(2 + max[x; (3.5 * y)])" ; "function call")]
    #[test_case("random()" => "random[]" ; "zero argument call")]
    fn shapes(text: &str) -> String {
        let (ast, parameters) = build(text).unwrap();
        render(&ast, ast.root(), &parameters)
    }

    #[test_case("2*3^2" => "((2 * 3) ^ 2)" ; "power shares the product level")]
    #[test_case("-2^2" => "(-2 ^ 2)" ; "negation binds tightest")]
    #[test_case("a=b<c" => "(a = (b < c))" ; "relational binds tighter than equality")]
    #[test_case("a<<1<b" => "((a << 1) < b)" ; "shift binds tighter than relational")]
    fn c_style_shapes(text: &str) -> String {
        let definition = MathDefinition {
            operator_precedence_style: OperatorPrecedenceStyle::CStyle,
            ..MathDefinition::default()
        };
        let (ast, parameters) = build_with(text, &definition).unwrap();
        render(&ast, ast.root(), &parameters)
    }

    #[test]
    fn styles_disagree_on_equality_and_power() {
        let (ast, parameters) = build("2*3^2").unwrap();
        assert_eq!(render(&ast, ast.root(), &parameters), "(2 * (3 ^ 2))");
        let (ast, parameters) = build("a=b<c").unwrap();
        assert_eq!(render(&ast, ast.root(), &parameters), "((a = b) < c)");
    }

    #[test]
    fn parameters_are_shared() {
        let (ast, parameters) = build("x*x+y").unwrap();
        assert_eq!(parameters.names(), vec!["x", "y"]);
        let parameter_nodes = ast
            .ids()
            .filter(|id| matches!(ast.node(*id), Node::Parameter(_)))
            .count();
        assert_eq!(parameter_nodes, 2);
    }

    #[test]
    fn children_come_first() {
        let (ast, _) = build("(a+1)*(a+1)-max(a,2)").unwrap();
        for id in ast.ids() {
            assert!(ast.node(id).children().iter().all(|child| *child < id));
        }
        assert!(matches!(ast.node(ast.root()), Node::Binary { op: Op::Subtract, .. }));
    }

    #[test_case("2+" ; "missing right operand")]
    #[test_case("*2" ; "missing left operand")]
    #[test_case("a!b" ; "not between operands")]
    #[test_case("2..3" ; "malformed number")]
    fn structural_errors(text: &str) {
        assert!(matches!(build(text), Err(Error::Structural(_))));
    }

    #[test]
    fn named_constants_and_booleans() {
        let (ast, parameters) = build("pi*r").unwrap();
        assert_eq!(parameters.names(), vec!["r"]);
        assert!(ast.ids().any(|id| ast.node(id).value() == Some(&Value::from(std::f64::consts::PI))));
        let (ast, _) = build("TRUE").unwrap();
        assert_eq!(ast.value(), Some(&Value::from(true)));
    }
}

//! Type resolution.
//!
//! Every node and every parameter starts `Unknown`. The weak phase narrows
//! them to the sets of types allowed by the operators and functions using them,
//! bottom-up and top-down, until nothing changes anymore. One overload is then
//! picked per function call. The strong phase asserts the exact signature of
//! every selected overload and the type of every node whose set collapsed to a
//! single type, and the weak phase runs again to propagate the result.

use crate::ast::{Ast, Node, NodeId};
use crate::error::{Error, Result};
use crate::format::Formatters;
use crate::functions::{ArgumentInfo, FunctionDescriptor, FunctionLibrary, ParameterKind, Returns};
use crate::operations::OperatorContext;
use crate::parameters::{ParamId, ParameterRegistry};
use crate::token::{Op, UnaryOp};
use crate::types::{Conflict, TypeSet, TypeState};
use crate::value::{SupportedValueType, Value};
use std::sync::Arc;

const LOGICAL: TypeSet = TypeSet::NUMERIC
    .union(TypeSet::BOOLEAN)
    .union(TypeSet::BYTE_ARRAY);
const ORDERED: TypeSet = TypeSet::NUMERIC.union(TypeSet::STRING);

struct Resolver<'a> {
    ast: &'a mut Ast,
    parameters: &'a ParameterRegistry,
    states: Vec<TypeState>,
    library: &'a FunctionLibrary,
    formatters: &'a Formatters,
}

/// Resolve the types of every node of `ast` and of every parameter, picking
/// the overload of every function call on the way.
pub(crate) fn resolve(
    ast: &mut Ast,
    parameters: &mut ParameterRegistry,
    library: &FunctionLibrary,
    formatters: &Formatters,
) -> Result<()> {
    let states = parameters.states();
    let mut resolver = Resolver {
        ast,
        parameters,
        states,
        library,
        formatters,
    };
    resolver.fixpoint()?;
    resolver.select_overloads()?;
    resolver.strong_phase()?;
    resolver.fixpoint()?;
    let states = resolver.states;
    parameters.set_states(&states);
    Ok(())
}

impl Resolver<'_> {
    fn fixpoint(&mut self) -> Result<()> {
        let mut rounds = 0;
        loop {
            let mut changed = false;
            for id in self.ast.ids().collect::<Vec<_>>() {
                changed |= self.visit(id)?;
            }
            rounds += 1;
            if !changed {
                break;
            }
        }
        log::trace!("types settled after {} round(s)", rounds);
        Ok(())
    }

    /// Pick an overload for every call, folding constant operands first so
    /// that `max(2,3+4)` sees the constant `7`.
    fn select_overloads(&mut self) -> Result<()> {
        let context = OperatorContext {
            tolerance: None,
            formatters: self.formatters,
        };
        for id in self.ast.ids().collect::<Vec<_>>() {
            if let Node::Call {
                name,
                function: None,
                arguments,
            } = self.ast.node(id)
            {
                let (name, arguments) = (name.clone(), arguments.clone());
                let infos: Vec<ArgumentInfo> = arguments
                    .iter()
                    .map(|argument| ArgumentInfo {
                        state: self.ast.state(*argument),
                        constant: self.ast.node(*argument).value().and_then(Value::as_number),
                    })
                    .collect();
                let selected = self.library.select(&name, &infos)?;
                log::debug!("'{}' resolved to {}", name, selected.prototype());
                if let Node::Call { function, .. } = self.ast.node_mut(id) {
                    *function = Some(selected);
                }
            }
            self.ast.fold(id, context);
        }
        Ok(())
    }

    fn strong_phase(&mut self) -> Result<()> {
        for id in self.ast.ids().collect::<Vec<_>>() {
            if let Node::Call {
                function: Some(function),
                arguments,
                ..
            } = self.ast.node(id).clone()
            {
                for (kind, argument) in function.parameters.iter().zip(&arguments) {
                    if let Some(kind) = kind.exact() {
                        self.determine_strongly(*argument, kind)?;
                    }
                }
                if let Returns::Kind(kind) = function.returns {
                    self.determine_strongly(id, kind)?;
                }
            }
            if let Some(kind) = self.possible(id).single() {
                self.determine_strongly(id, kind)?;
            }
        }
        Ok(())
    }

    /// Assert that `id` is exactly `kind`, keeping parameters in sync with
    /// their nodes.
    fn determine_strongly(&mut self, id: NodeId, kind: SupportedValueType) -> Result<()> {
        let next = self
            .ast
            .state(id)
            .determine_strongly(kind)
            .map_err(|conflict| self.conflict(id, conflict))?;
        if let Node::Parameter(parameter) = *self.ast.node(id) {
            let state = &mut self.states[parameter.0];
            *state = state.determine_strongly(kind).map_err(|conflict| {
                Error::ExpressionNotValidLogically(format!(
                    "parameter '{}': {}",
                    self.parameters.parameter(parameter).name(),
                    conflict
                ))
            })?;
        }
        self.ast.set_state(id, next);
        Ok(())
    }

    /// Narrow `id` to `set`, keeping parameters in sync with their nodes.
    fn narrow(&mut self, id: NodeId, set: TypeSet) -> Result<bool> {
        let current = self.ast.state(id);
        let next = current
            .determine_weakly(set)
            .map_err(|conflict| self.conflict(id, conflict))?;
        if let Node::Parameter(parameter) = *self.ast.node(id) {
            self.narrow_parameter(parameter, set)?;
        }
        self.ast.set_state(id, next);
        Ok(next != current)
    }

    fn narrow_parameter(&mut self, id: ParamId, set: TypeSet) -> Result<()> {
        let state = &mut self.states[id.0];
        *state = state.determine_weakly(set).map_err(|conflict| {
            Error::ExpressionNotValidLogically(format!(
                "parameter '{}': {}",
                self.parameters.parameter(id).name(),
                conflict
            ))
        })?;
        Ok(())
    }

    fn conflict(&self, id: NodeId, conflict: Conflict) -> Error {
        let subject = match self.ast.node(id) {
            Node::Constant(value) => format!("constant {}", value),
            Node::Parameter(parameter) => format!("parameter '{}'", self.parameters.parameter(*parameter).name()),
            Node::Unary { op, .. } => format!("operand of {:?}", op),
            Node::Binary { op, .. } => format!("'{}' operation", op.symbol()),
            Node::Call { name, .. } => format!("call to '{}'", name),
        };
        Error::ExpressionNotValidLogically(format!("{}: {}", subject, conflict))
    }

    fn possible(&self, id: NodeId) -> TypeSet {
        self.ast.state(id).possible()
    }

    fn visit(&mut self, id: NodeId) -> Result<bool> {
        match self.ast.node(id).clone() {
            Node::Constant(_) => Ok(false),
            Node::Parameter(parameter) => {
                let set = self.states[parameter.0].possible();
                self.narrow(id, set)
            }
            Node::Unary {
                op: UnaryOp::Negate,
                operand,
            } => Ok(self.narrow(operand, TypeSet::NUMERIC)? | self.narrow(id, TypeSet::NUMERIC)?),
            Node::Unary { op: UnaryOp::Not, operand } => {
                let allowed = LOGICAL.intersection(self.possible(id));
                let changed = self.narrow(operand, allowed)?;
                let allowed = LOGICAL.intersection(self.possible(operand));
                Ok(changed | self.narrow(id, allowed)?)
            }
            Node::Binary { op, left, right } => self.visit_binary(id, op, left, right),
            Node::Call {
                name,
                function,
                arguments,
            } => {
                let candidates = match function {
                    Some(function) => vec![function],
                    None => self.library.candidates(&name, arguments.len())?.to_vec(),
                };
                self.visit_call(id, &candidates, &arguments)
            }
        }
    }

    fn visit_binary(&mut self, id: NodeId, op: Op, left: NodeId, right: NodeId) -> Result<bool> {
        let mut changed = false;
        match op {
            Op::Add => {
                let (l, r) = (self.possible(left), self.possible(right));
                let strong_string = |state: TypeState| state == TypeState::Strong(SupportedValueType::String);
                let result = if strong_string(self.ast.state(left)) || strong_string(self.ast.state(right)) {
                    TypeSet::STRING
                } else {
                    let mut result = l.intersection(r).intersection(TypeSet::NUMERIC.union(TypeSet::BYTE_ARRAY));
                    if l.union(r).contains(SupportedValueType::String) {
                        result = result.union(TypeSet::STRING);
                    }
                    result
                };
                changed |= self.narrow(id, result)?;
                let node = self.possible(id);
                changed |= self.narrow(left, addend(r, node))?;
                let l = self.possible(left);
                changed |= self.narrow(right, addend(l, node))?;
            }
            Op::Subtract
            | Op::Multiply
            | Op::Divide
            | Op::Modulo
            | Op::Power
            | Op::LeftShift
            | Op::RightShift => {
                changed |= self.narrow(left, TypeSet::NUMERIC)?;
                changed |= self.narrow(right, TypeSet::NUMERIC)?;
                changed |= self.narrow(id, TypeSet::NUMERIC)?;
            }
            Op::And | Op::Or | Op::Xor => {
                let allowed = LOGICAL
                    .intersection(self.possible(left))
                    .intersection(self.possible(right))
                    .intersection(self.possible(id));
                changed |= self.narrow(left, allowed)?;
                changed |= self.narrow(right, allowed)?;
                changed |= self.narrow(id, allowed)?;
            }
            Op::Equals | Op::DoesNotEqual => {
                let common = self.possible(left).intersection(self.possible(right));
                changed |= self.narrow(left, common)?;
                changed |= self.narrow(right, common)?;
                changed |= self.narrow(id, TypeSet::BOOLEAN)?;
            }
            Op::GreaterThan | Op::GreaterThanOrEqual | Op::LessThan | Op::LessThanOrEqual => {
                let common = ORDERED
                    .intersection(self.possible(left))
                    .intersection(self.possible(right));
                changed |= self.narrow(left, common)?;
                changed |= self.narrow(right, common)?;
                changed |= self.narrow(id, TypeSet::BOOLEAN)?;
            }
            Op::Not => {
                return Err(Error::ExpressionNotValidLogically(
                    "'!' used as a binary operator".into(),
                ))
            }
        }
        Ok(changed)
    }

    fn visit_call(
        &mut self,
        id: NodeId,
        candidates: &[Arc<FunctionDescriptor>],
        arguments: &[NodeId],
    ) -> Result<bool> {
        let mut changed = false;
        let mut results = TypeSet::EMPTY;
        let mut accepted = vec![TypeSet::EMPTY; arguments.len()];

        for candidate in candidates {
            let generic = candidate
                .parameters
                .iter()
                .zip(arguments)
                .filter(|(kind, _)| **kind == ParameterKind::Generic)
                .fold(TypeSet::ALL, |set, (_, argument)| set.intersection(self.possible(*argument)));
            for (index, kind) in candidate.parameters.iter().enumerate() {
                let set = if *kind == ParameterKind::Generic {
                    generic
                } else {
                    kind.accepted()
                };
                accepted[index] = accepted[index].union(set);
            }
            results = results.union(match candidate.returns {
                Returns::Kind(kind) => TypeSet::of(kind),
                Returns::Generic => generic,
            });
        }

        for (argument, set) in arguments.iter().zip(accepted) {
            changed |= self.narrow(*argument, set)?;
        }
        Ok(changed | self.narrow(id, results)?)
    }
}

/// The types an operand of `+` may have, given the other operand and the
/// result.
fn addend(other: TypeSet, result: TypeSet) -> TypeSet {
    let same = other
        .intersection(TypeSet::NUMERIC.union(TypeSet::BYTE_ARRAY))
        .intersection(result);
    if !result.contains(SupportedValueType::String) {
        same
    } else if other.contains(SupportedValueType::String) {
        TypeSet::ALL
    } else {
        same.union(TypeSet::STRING)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::NodeBuilder;
    use crate::definition::MathDefinition;
    use crate::extract::{
        BooleanInterpreter, ConstantExtractor, ConstantInterpreter, ConstantTable, NumberInterpreter,
        StringExtractor,
    };
    use crate::functions::{FunctionsSource, BUILTIN_FUNCTIONS};
    use crate::registry::LevelDictionary;
    use crate::symbols::SymbolTable;
    use crate::token::Operators;

    fn built(text: &str) -> Result<(Ast, ParameterRegistry)> {
        let definition = MathDefinition::default();
        let operators = Operators::new(&definition);
        let mut constants = ConstantTable::new();
        let text = StringExtractor.extract(text, &definition, &mut constants)?;
        let text: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        let mut symbols = SymbolTable::new(&text);
        symbols.resolve_parentheses(&definition, &operators)?;
        let mut interpreters: LevelDictionary<Arc<dyn ConstantInterpreter>> = LevelDictionary::new();
        interpreters.insert(100, Arc::new(NumberInterpreter));
        interpreters.insert(90, Arc::new(BooleanInterpreter));
        let mut parameters = ParameterRegistry::new();
        let ast = NodeBuilder::populate(
            &operators,
            &definition.parameter_separator,
            &symbols,
            &mut constants,
            &interpreters,
            &mut parameters,
        )?
        .build()?;
        Ok((ast, parameters))
    }

    fn resolved(text: &str) -> Result<(Ast, ParameterRegistry)> {
        let (mut ast, mut parameters) = built(text)?;
        let library = FunctionLibrary::new(std::iter::once(&*BUILTIN_FUNCTIONS));
        resolve(&mut ast, &mut parameters, &library, &Formatters::default())?;
        Ok((ast, parameters))
    }

    fn parameter_state(text: &str, name: &str) -> TypeState {
        let (_, parameters) = resolved(text).unwrap();
        parameters.parameter(parameters.get(name).unwrap()).state()
    }

    #[test]
    fn arithmetic_forces_numbers() {
        assert_eq!(parameter_state("x*2", "x"), TypeState::Strong(SupportedValueType::Numeric));
        assert_eq!(parameter_state("-x", "x"), TypeState::Strong(SupportedValueType::Numeric));
        let (ast, _) = resolved("x-1").unwrap();
        assert_eq!(ast.value_type(ast.root()), SupportedValueType::Numeric);
    }

    #[test]
    fn addition_may_concatenate() {
        assert_eq!(
            parameter_state("x+1", "x"),
            TypeState::Weak(TypeSet::NUMERIC.union(TypeSet::STRING))
        );
        let (ast, _) = resolved(r#"x+"abc""#).unwrap();
        assert_eq!(ast.value_type(ast.root()), SupportedValueType::String);
        assert_eq!(parameter_state(r#"x+"abc""#, "x"), TypeState::Unknown);
    }

    #[test]
    fn comparisons_and_logic() {
        let (ast, _) = resolved("a>b&c").unwrap();
        assert_eq!(ast.value_type(ast.root()), SupportedValueType::Boolean);
        assert_eq!(
            parameter_state("a>b&c", "a"),
            TypeState::Weak(TypeSet::NUMERIC.union(TypeSet::STRING))
        );
        assert_eq!(parameter_state("a>b&c", "c"), TypeState::Strong(SupportedValueType::Boolean));
        assert_eq!(parameter_state("a=true", "a"), TypeState::Strong(SupportedValueType::Boolean));
    }

    #[test]
    fn conflicts_are_logical_errors() {
        assert!(matches!(
            resolved(r#"(x-1)=3 & x="abc""#),
            Err(Error::ExpressionNotValidLogically(_))
        ));
        assert!(matches!(resolved(r#"1-"a""#), Err(Error::ExpressionNotValidLogically(_))));
        assert!(matches!(resolved("true<1"), Err(Error::ExpressionNotValidLogically(_))));
    }

    #[test]
    fn calls_select_overloads() {
        let (ast, _) = resolved("max(2,7)").unwrap();
        match ast.node(ast.root()) {
            Node::Call {
                function: Some(function),
                ..
            } => assert_eq!(function.prototype(), "max(integer, integer)"),
            other => panic!("unexpected root {:?}", other),
        }
        assert_eq!(parameter_state("sqrt(x)", "x"), TypeState::Strong(SupportedValueType::Numeric));
        assert_eq!(parameter_state("strlen(s)", "s"), TypeState::Strong(SupportedValueType::String));
        assert!(matches!(
            resolved(r#"sqrt("a")"#),
            Err(Error::FunctionCallNotValidLogically(_)) | Err(Error::ExpressionNotValidLogically(_))
        ));
        assert!(matches!(resolved("nope(1)"), Err(Error::FunctionCallNotValidLogically(_))));
    }

    #[test]
    fn selected_signatures_are_asserted() {
        let check = FunctionsSource::new("custom")
            .with(FunctionDescriptor::new(
                "check",
                vec![ParameterKind::Integer, ParameterKind::String],
                Returns::Kind(SupportedValueType::Boolean),
                |_| Ok(Value::from(true)),
            ))
            .with(FunctionDescriptor::new(
                "check",
                vec![ParameterKind::Float, ParameterKind::Boolean],
                Returns::Kind(SupportedValueType::Boolean),
                |_| Ok(Value::from(true)),
            ));
        let library = FunctionLibrary::new(vec![&*BUILTIN_FUNCTIONS, &check]);

        let (mut ast, mut parameters) = built("check(2,x)").unwrap();
        resolve(&mut ast, &mut parameters, &library, &Formatters::default()).unwrap();
        assert_eq!(
            parameters.parameter(parameters.get("x").unwrap()).state(),
            TypeState::Strong(SupportedValueType::String)
        );

        // the two calls select overloads disagreeing on x
        let (mut ast, mut parameters) = built("check(2,x)&check(2.5,x)").unwrap();
        assert!(matches!(
            resolve(&mut ast, &mut parameters, &library, &Formatters::default()),
            Err(Error::ExpressionNotValidLogically(_))
        ));
    }

    #[test]
    fn generic_calls() {
        let (ast, _) = resolved(r#"if(c,"a",b)"#).unwrap();
        assert_eq!(ast.value_type(ast.root()), SupportedValueType::String);
        assert_eq!(parameter_state(r#"if(c,"a",b)"#, "b"), TypeState::Strong(SupportedValueType::String));
        assert_eq!(parameter_state(r#"if(c,"a",b)"#, "c"), TypeState::Strong(SupportedValueType::Boolean));
    }
}

use crate::ast::Ast;
use crate::compile::{Compiled, Frame};
use crate::error::{Error, Result};
use crate::format::Formatters;
use crate::parameters::{ParamId, ParameterRegistry};
use crate::tolerance::Tolerance;
use crate::value::{SupportedValueType, Value};
use std::collections::HashMap;
use std::fmt;
use std::hash::BuildHasher;
use std::sync::Arc;

/// Source of parameter values for one evaluation.
///
/// Parameters are looked up by name, along with their position in
/// [`ComputedExpression::parameter_names`], so that both named and positional
/// providers can be used.
pub trait ParameterProvider {
    /// The value of parameter `name`, found at `position`
    fn value(&self, name: &str, position: usize) -> Option<Value>;
}

impl<S: BuildHasher> ParameterProvider for HashMap<String, Value, S> {
    fn value(&self, name: &str, _: usize) -> Option<Value> {
        self.get(name).cloned()
    }
}

impl ParameterProvider for hashbrown::HashMap<String, Value> {
    fn value(&self, name: &str, _: usize) -> Option<Value> {
        self.get(name).cloned()
    }
}

impl ParameterProvider for [(&str, Value)] {
    fn value(&self, name: &str, _: usize) -> Option<Value> {
        self.iter().find(|(key, _)| *key == name).map(|(_, value)| value.clone())
    }
}

impl<const N: usize> ParameterProvider for [(&str, Value); N] {
    fn value(&self, name: &str, position: usize) -> Option<Value> {
        self[..].value(name, position)
    }
}

/// Positional values
impl ParameterProvider for [Value] {
    fn value(&self, _: &str, position: usize) -> Option<Value> {
        self.get(position).cloned()
    }
}

impl<const N: usize> ParameterProvider for [Value; N] {
    fn value(&self, name: &str, position: usize) -> Option<Value> {
        self[..].value(name, position)
    }
}

impl ParameterProvider for Vec<Value> {
    fn value(&self, name: &str, position: usize) -> Option<Value> {
        self[..].value(name, position)
    }
}

/// No values at all
impl ParameterProvider for () {
    fn value(&self, _: &str, _: usize) -> Option<Value> {
        None
    }
}

/// Fallback lookup for parameters missing from the [`ParameterProvider`]
pub trait DataFinder {
    /// Look up the value of `key`
    fn try_get(&self, key: &str) -> Option<Value>;
}

impl<F> DataFinder for F
where
    F: Fn(&str) -> Option<Value>,
{
    fn try_get(&self, key: &str) -> Option<Value> {
        self(key)
    }
}

/// The compiled form of an expression, shared by every copy of it
pub(crate) struct CompiledTree {
    pub ast: Ast,
    pub root: Compiled,
}

/// A parsed, type-checked and compiled expression.
///
/// Expressions that could not be recognized are still represented, with
/// [`recognized_correctly`](ComputedExpression::recognized_correctly) returning
/// `false`, and fail to compute.
///
/// ```
/// # use formulary::{ExpressionParsingService, Value};
/// let service = ExpressionParsingService::new();
/// let expression = service.interpret("2 + max(x, 3.5*y)").unwrap();
/// assert_eq!(expression.parameter_names(), vec!["x", "y"]);
/// let value = expression.compute(&[("x", Value::from(1)), ("y", Value::from(2))], None);
/// assert_eq!(value, Ok(Value::from(9.0)));
/// ```
#[derive(Clone)]
pub struct ComputedExpression {
    text: Arc<str>,
    tree: Option<Arc<CompiledTree>>,
    parameters: ParameterRegistry,
    formatters: Formatters,
}

impl fmt::Debug for ComputedExpression {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("ComputedExpression")
            .field("text", &self.text)
            .field("recognized", &self.recognized_correctly())
            .field("parameters", &self.parameter_names())
            .field("result_type", &self.result_type())
            .finish()
    }
}

impl ComputedExpression {
    pub(crate) fn new(text: &str, tree: CompiledTree, parameters: ParameterRegistry, formatters: Formatters) -> Self {
        Self {
            text: Arc::from(text),
            tree: Some(Arc::new(tree)),
            parameters,
            formatters,
        }
    }

    pub(crate) fn not_recognized(text: &str, formatters: Formatters) -> Self {
        Self {
            text: Arc::from(text),
            tree: None,
            parameters: ParameterRegistry::new(),
            formatters,
        }
    }

    /// A copy sharing the compiled tree, with its own parameter registry
    pub(crate) fn fresh_copy(&self) -> Self {
        Self {
            text: Arc::clone(&self.text),
            tree: self.tree.clone(),
            parameters: self.parameters.fresh(),
            formatters: self.formatters.clone(),
        }
    }

    /// The text this expression was parsed from
    pub fn original_text(&self) -> &str {
        &self.text
    }

    /// Check if the text was parsed as an expression. Unrecognized texts cannot be computed.
    pub fn recognized_correctly(&self) -> bool {
        self.tree.is_some()
    }

    /// Names of the parameters, in order of first appearance
    pub fn parameter_names(&self) -> Vec<&str> {
        self.parameters.names()
    }

    /// The parameters of the expression, with their types
    pub fn parameters(&self) -> &ParameterRegistry {
        &self.parameters
    }

    /// Check if computing the expression reads any parameter
    pub fn has_parameters(&self) -> bool {
        self.tree.as_ref().map_or(false, |tree| tree.ast.has_parameters())
    }

    /// Check if the whole expression was folded into a constant
    pub fn is_constant(&self) -> bool {
        self.tree.as_ref().map_or(false, |tree| tree.ast.value().is_some())
    }

    /// The type of the computed value, `Unknown` when it depends on the type
    /// of the parameters
    pub fn result_type(&self) -> SupportedValueType {
        self.tree
            .as_ref()
            .map_or(SupportedValueType::Unknown, |tree| tree.ast.value_type(tree.ast.root()))
    }

    /// The tree of the expression, if it was recognized
    pub fn ast(&self) -> Option<&Ast> {
        self.tree.as_ref().map(|tree| &tree.ast)
    }

    /// Format `value` the way it would be when concatenated to a string
    pub fn format_value(&self, value: &Value) -> String {
        self.formatters.format(value)
    }

    /// Compute the value of the expression. Parameters are taken from
    /// `parameters`, then from `finder`.
    pub fn compute<P>(&self, parameters: &P, finder: Option<&dyn DataFinder>) -> Result<Value>
    where
        P: ParameterProvider + ?Sized,
    {
        self.evaluate(parameters, finder, None)
    }

    /// Compute the value of the expression, comparing numbers with `tolerance`
    pub fn compute_with_tolerance<P>(
        &self,
        parameters: &P,
        finder: Option<&dyn DataFinder>,
        tolerance: &Tolerance,
    ) -> Result<Value>
    where
        P: ParameterProvider + ?Sized,
    {
        self.evaluate(parameters, finder, Some(tolerance))
    }

    /// Compute the value of the expression, with parameter values given in
    /// the order of [`parameter_names`](ComputedExpression::parameter_names)
    pub fn compute_positional(&self, values: &[Value]) -> Result<Value> {
        self.evaluate(values, None, None)
    }

    fn evaluate<P>(&self, parameters: &P, finder: Option<&dyn DataFinder>, tolerance: Option<&Tolerance>) -> Result<Value>
    where
        P: ParameterProvider + ?Sized,
    {
        let tree = self
            .tree
            .as_ref()
            .ok_or_else(|| Error::NotRecognized(self.text.to_string()))?;

        let values = self
            .parameters
            .iter()
            .enumerate()
            .map(|(position, parameter)| {
                let value = parameters
                    .value(parameter.name(), position)
                    .or_else(|| finder.and_then(|finder| finder.try_get(parameter.name())))
                    .ok_or_else(|| Error::MissingParameter(parameter.name().to_owned()))?;
                self.parameters.bind(ParamId(position), value)
            })
            .collect::<Result<Vec<Value>>>()?;

        let frame = Frame {
            values: &values,
            tolerance,
            formatters: &self.formatters,
        };
        (tree.root)(&frame)
    }

    /// Lower the expression to native code, when it only uses floating point
    /// arithmetic and native functions.
    #[cfg(feature = "jit")]
    pub fn compile_native(&self) -> Option<crate::jit::NativeExpression> {
        let tree = self.tree.as_ref()?;
        match crate::jit::NativeExpression::compile(&tree.ast, self.parameters.len()) {
            Ok(native) => native,
            Err(error) => {
                log::warn!("native compilation of '{}' failed: {}", self.text, error);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::ExpressionParsingService;

    #[test]
    fn providers() {
        let service = ExpressionParsingService::new();
        let expression = service.interpret("a * b").unwrap();

        let mut named = HashMap::new();
        named.insert("a".to_owned(), Value::from(2));
        named.insert("b".to_owned(), Value::from(3));
        assert_eq!(expression.compute(&named, None), Ok(Value::from(6)));
        assert_eq!(
            expression.compute(&[("b", Value::from(4)), ("a", Value::from(2))], None),
            Ok(Value::from(8))
        );
        assert_eq!(expression.compute_positional(&[Value::from(5), Value::from(2)]), Ok(Value::from(10)));

        let finder = |key: &str| if key == "b" { Some(Value::from(7)) } else { None };
        assert_eq!(
            expression.compute(&[("a", Value::from(1))], Some(&finder)),
            Ok(Value::from(7))
        );
        assert_eq!(
            expression.compute(&(), None),
            Err(Error::MissingParameter("a".into()))
        );
    }

    #[test]
    fn parameter_types_are_checked() {
        let service = ExpressionParsingService::new();
        let expression = service.interpret("x - 1").unwrap();
        assert!(matches!(
            expression.compute(&[("x", Value::from("five"))], None),
            Err(Error::ParameterTypeMismatch(_))
        ));
    }

    #[test]
    fn unrecognized_expressions_do_not_compute() {
        let service = ExpressionParsingService::new();
        let expression = service.interpret("(1 + 2").unwrap();
        assert!(!expression.recognized_correctly());
        assert!(expression.ast().is_none());
        assert_eq!(expression.result_type(), SupportedValueType::Unknown);
        assert_eq!(
            expression.compute(&(), None),
            Err(Error::NotRecognized("(1 + 2".into()))
        );
    }

    #[test]
    fn fresh_copies_share_the_tree() {
        let service = ExpressionParsingService::new();
        let expression = service.interpret("x / 2").unwrap();
        expression.compute(&[("x", Value::from(1.5))], None).unwrap();
        let copy = expression.fresh_copy();
        assert!(Arc::ptr_eq(
            expression.tree.as_ref().unwrap(),
            copy.tree.as_ref().unwrap()
        ));
        assert_eq!(copy.compute(&[("x", Value::from(4))], None), Ok(Value::from(2)));
        assert_eq!(expression.compute(&[("x", Value::from(4))], None), Ok(Value::from(2.0)));
    }
}

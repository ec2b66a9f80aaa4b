use crate::error::{Error, Result};
use crate::types::TypeState;
use crate::value::{Number, SupportedValueType, Value};
use hashbrown::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};

/// Index of a parameter in its registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParamId(pub(crate) usize);

/// What has been observed about the numeric values bound to a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericRefinement {
    /// No numeric value bound yet
    Unrefined,
    /// Only integers so far
    Integer,
    /// At least one float; integers are widened from now on
    Float,
}

impl NumericRefinement {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Integer,
            2 => Self::Float,
            _ => Self::Unrefined,
        }
    }
}

/// A free variable of an expression
#[derive(Debug)]
pub struct Parameter {
    name: String,
    state: TypeState,
    refinement: AtomicU8,
}

impl Parameter {
    /// The name of the parameter
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The type the expression requires for this parameter
    pub fn value_type(&self) -> SupportedValueType {
        self.state.value_type()
    }

    /// How far the type of the parameter was determined
    pub fn state(&self) -> TypeState {
        self.state
    }

    /// What the values computed so far taught about its numbers
    pub fn refinement(&self) -> NumericRefinement {
        NumericRefinement::from_u8(self.refinement.load(Ordering::Acquire))
    }
}

impl Clone for Parameter {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            state: self.state,
            refinement: AtomicU8::new(self.refinement.load(Ordering::Acquire)),
        }
    }
}

/// One entry per distinct parameter name of an expression.
///
/// Every node referring to a parameter shares its entry. Cloning the registry
/// produces independent entries, so refinements made by one copy of a compiled
/// expression are invisible to the others.
#[derive(Debug, Clone, Default)]
pub struct ParameterRegistry {
    parameters: Vec<Parameter>,
    by_name: HashMap<String, ParamId>,
}

impl ParameterRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the id of `name`, registering it on first sight
    pub fn advertise(&mut self, name: &str) -> ParamId {
        if let Some(id) = self.by_name.get(name) {
            return *id;
        }
        let id = ParamId(self.parameters.len());
        log::trace!("advertising parameter '{}'", name);
        self.parameters.push(Parameter {
            name: name.to_owned(),
            state: TypeState::Unknown,
            refinement: AtomicU8::new(0),
        });
        self.by_name.insert(name.to_owned(), id);
        id
    }

    /// The id of `name`, if it was advertised
    pub fn get(&self, name: &str) -> Option<ParamId> {
        self.by_name.get(name).copied()
    }

    /// The parameter registered under `id`
    pub fn parameter(&self, id: ParamId) -> &Parameter {
        &self.parameters[id.0]
    }

    /// The parameters in order of first appearance
    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.iter()
    }

    /// Names of the parameters, in order of first appearance
    pub fn names(&self) -> Vec<&str> {
        self.parameters.iter().map(Parameter::name).collect()
    }

    /// Number of distinct parameters
    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    /// Check if there are no entries
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// A copy with the same parameters and types, but no refinement
    pub fn fresh(&self) -> Self {
        Self {
            parameters: self
                .parameters
                .iter()
                .map(|parameter| Parameter {
                    name: parameter.name.clone(),
                    state: parameter.state,
                    refinement: AtomicU8::new(0),
                })
                .collect(),
            by_name: self.by_name.clone(),
        }
    }

    pub(crate) fn states(&self) -> Vec<TypeState> {
        self.parameters.iter().map(|p| p.state).collect()
    }

    pub(crate) fn set_states(&mut self, states: &[TypeState]) {
        for (parameter, state) in self.parameters.iter_mut().zip(states) {
            parameter.state = *state;
        }
    }

    /// Check `value` against the type required for `id` and record its
    /// numeric representation. Integers bound after a float are widened.
    pub fn bind(&self, id: ParamId, value: Value) -> Result<Value> {
        let parameter = &self.parameters[id.0];
        if !parameter.state.possible().contains(value.value_type()) {
            return Err(Error::ParameterTypeMismatch(format!(
                "'{}' must be {}, got {}",
                parameter.name,
                parameter.state,
                value.value_type()
            )));
        }
        Ok(match value {
            Value::Numeric(Number::Float(_)) => {
                parameter.refinement.store(2, Ordering::Release);
                value
            }
            Value::Numeric(number @ Number::Integer(_)) => {
                let previous = parameter
                    .refinement
                    .compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire)
                    .unwrap_or_else(|current| current);
                if previous == 2 {
                    Value::Numeric(number.to_float())
                } else {
                    value
                }
            }
            other => other,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{NumericRefinement, ParameterRegistry};
    use crate::types::TypeState;
    use crate::value::{SupportedValueType, Value};

    #[test]
    fn advertise_is_idempotent() {
        let mut registry = ParameterRegistry::new();
        let x = registry.advertise("x");
        let y = registry.advertise("y");
        assert_eq!(registry.advertise("x"), x);
        assert_ne!(x, y);
        assert_eq!(registry.names(), vec!["x", "y"]);
    }

    #[test]
    fn binding_checks_types() {
        let mut registry = ParameterRegistry::new();
        let x = registry.advertise("x");
        registry.set_states(&[TypeState::Strong(SupportedValueType::Numeric)]);
        assert!(registry.bind(x, Value::from("text")).is_err());
        assert_eq!(registry.bind(x, Value::from(3)).unwrap(), Value::from(3));
    }

    #[test]
    fn refinement_widens_and_is_not_shared_by_clones() {
        let mut registry = ParameterRegistry::new();
        let x = registry.advertise("x");
        let copy = registry.clone();

        registry.bind(x, Value::from(1.5)).unwrap();
        assert_eq!(registry.parameter(x).refinement(), NumericRefinement::Float);
        assert!(matches!(
            registry.bind(x, Value::from(2)).unwrap().as_number(),
            Some(n) if !n.is_integer()
        ));

        assert_eq!(copy.parameter(x).refinement(), NumericRefinement::Unrefined);
        assert!(copy.bind(x, Value::from(2)).unwrap().as_number().unwrap().is_integer());
        assert_eq!(copy.parameter(x).refinement(), NumericRefinement::Integer);
        assert_eq!(registry.fresh().parameter(x).refinement(), NumericRefinement::Unrefined);
    }
}

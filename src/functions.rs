//! Function descriptors, the built-in library and overload selection.

use crate::error::{Error, Result};
use crate::types::{TypeSet, TypeState};
use crate::value::{Number, SupportedValueType, Value};
use hashbrown::HashMap;
use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

/// The type a function expects for one of its parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterKind {
    /// Any number, received as a float
    Float,
    /// An integral number, received as an `i64`
    Integer,
    /// An integral number fitting in 32 bits, received as an `i64`
    Int32,
    /// `true` or `false`
    Boolean,
    /// Text
    String,
    /// Raw bytes
    ByteArray,
    /// Any value
    Any,
    /// Any value, but all generic parameters of a call share one type
    Generic,
}

impl ParameterKind {
    pub(crate) fn accepted(self) -> TypeSet {
        match self {
            Self::Float | Self::Integer | Self::Int32 => TypeSet::NUMERIC,
            Self::Boolean => TypeSet::BOOLEAN,
            Self::String => TypeSet::STRING,
            Self::ByteArray => TypeSet::BYTE_ARRAY,
            Self::Any | Self::Generic => TypeSet::ALL,
        }
    }

    /// The single type this kind requires, if any
    pub(crate) fn exact(self) -> Option<SupportedValueType> {
        match self {
            Self::Float | Self::Integer | Self::Int32 => Some(SupportedValueType::Numeric),
            Self::Boolean => Some(SupportedValueType::Boolean),
            Self::String => Some(SupportedValueType::String),
            Self::ByteArray => Some(SupportedValueType::ByteArray),
            Self::Any | Self::Generic => None,
        }
    }

    /// Normalize an argument before it reaches the implementation
    fn coerce(self, value: Value, function: &str) -> Result<Value> {
        let mismatch = |value: &Value| {
            Error::Evaluation(format!(
                "{}: argument {} is not {}",
                function,
                value,
                self
            ))
        };
        match self {
            Self::Float => match value {
                Value::Numeric(number) => Ok(Value::Numeric(number.to_float())),
                other => Err(mismatch(&other)),
            },
            Self::Integer => match value.as_i64() {
                Some(integer) => Ok(Value::from(integer)),
                None => Err(mismatch(&value)),
            },
            Self::Int32 => match value.as_i64().filter(|i| i32::try_from(*i).is_ok()) {
                Some(integer) => Ok(Value::from(integer)),
                None => Err(mismatch(&value)),
            },
            Self::Any | Self::Generic => Ok(value),
            Self::Boolean | Self::String | Self::ByteArray => {
                if self.accepted().contains(value.value_type()) {
                    Ok(value)
                } else {
                    Err(mismatch(&value))
                }
            }
        }
    }
}

impl Display for ParameterKind {
    fn fmt(&self, fmt: &mut Formatter) -> fmt::Result {
        let name = match self {
            Self::Float => "float",
            Self::Integer => "integer",
            Self::Int32 => "int32",
            Self::Boolean => "boolean",
            Self::String => "string",
            Self::ByteArray => "bytearray",
            Self::Any => "any",
            Self::Generic => "T",
        };
        fmt.write_str(name)
    }
}

/// The type a function returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Returns {
    /// One fixed type
    Kind(SupportedValueType),
    /// The shared type of the generic parameters
    Generic,
}

/// Native implementation of a function
pub type Implementation = Arc<dyn Fn(&[Value]) -> Result<Value> + Send + Sync>;

/// A function callable from expressions
#[derive(Clone)]
pub struct FunctionDescriptor {
    /// Name used in expressions, matched without case
    pub name: String,
    /// The kind of every parameter, in order
    pub parameters: Vec<ParameterKind>,
    /// The type of the result
    pub returns: Returns,
    /// Pure functions with constant arguments are folded at parse time
    pub pure: bool,
    /// Computes the result from the arguments
    pub implementation: Implementation,
}

impl fmt::Debug for FunctionDescriptor {
    fn fmt(&self, fmt: &mut Formatter) -> fmt::Result {
        fmt.debug_struct("FunctionDescriptor")
            .field("prototype", &self.prototype())
            .field("returns", &self.returns)
            .field("pure", &self.pure)
            .finish()
    }
}

impl FunctionDescriptor {
    /// A pure function from its signature and implementation
    pub fn new<F>(name: &str, parameters: Vec<ParameterKind>, returns: Returns, implementation: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            name: name.to_owned(),
            parameters,
            returns,
            pure: true,
            implementation: Arc::new(implementation),
        }
    }

    /// A `float -> float` function
    pub fn float1(name: &str, function: fn(f64) -> f64) -> Self {
        Self::new(
            name,
            vec![ParameterKind::Float],
            Returns::Kind(SupportedValueType::Numeric),
            move |args| Ok(Value::from(function(float_arg(args, 0)?))),
        )
    }

    /// A `(float, float) -> float` function
    pub fn float2(name: &str, function: fn(f64, f64) -> f64) -> Self {
        Self::new(
            name,
            vec![ParameterKind::Float, ParameterKind::Float],
            Returns::Kind(SupportedValueType::Numeric),
            move |args| Ok(Value::from(function(float_arg(args, 0)?, float_arg(args, 1)?))),
        )
    }

    /// Mark the function as having side effects or varying results
    pub fn impure(mut self) -> Self {
        self.pure = false;
        self
    }

    /// Number of parameters
    pub fn arity(&self) -> usize {
        self.parameters.len()
    }

    /// Human readable prototype, e.g. `max(float, float)`
    pub fn prototype(&self) -> String {
        let parameters: Vec<String> = self.parameters.iter().map(ToString::to_string).collect();
        format!("{}({})", self.name, parameters.join(", "))
    }

    /// Coerce `arguments` to the declared parameter kinds and call the function
    pub fn call(&self, arguments: Vec<Value>) -> Result<Value> {
        if arguments.len() != self.arity() {
            return Err(Error::Evaluation(format!(
                "{} takes {} argument(s), got {}",
                self.prototype(),
                self.arity(),
                arguments.len()
            )));
        }
        let arguments = arguments
            .into_iter()
            .zip(&self.parameters)
            .map(|(value, kind)| kind.coerce(value, &self.name))
            .collect::<Result<Vec<Value>>>()?;
        (self.implementation)(&arguments)
    }

    /// Native `f64` entry point, for functions that can be called from
    /// generated machine code.
    #[cfg(feature = "jit")]
    pub(crate) fn native(&self) -> Option<fn(f64) -> f64> {
        NATIVE_FLOAT1.get(self.name.as_str()).copied().filter(|_| {
            self.parameters == [ParameterKind::Float]
        })
    }
}

pub(crate) fn float_arg(args: &[Value], index: usize) -> Result<f64> {
    args.get(index)
        .and_then(Value::as_f64)
        .ok_or_else(|| Error::Evaluation(format!("argument {} must be numeric", index)))
}

fn integer_arg(args: &[Value], index: usize) -> Result<i64> {
    args.get(index)
        .and_then(Value::as_i64)
        .ok_or_else(|| Error::Evaluation(format!("argument {} must be integral", index)))
}

fn arg(args: &[Value], index: usize) -> Result<&Value> {
    args.get(index)
        .ok_or_else(|| Error::Evaluation(format!("missing argument {}", index)))
}

fn str_arg(args: &[Value], index: usize) -> Result<&str> {
    arg(args, index)?.expect_str("function")
}

/// A named collection of functions registered together
#[derive(Debug, Clone, Default)]
pub struct FunctionsSource {
    /// Name of the source, for logging
    pub name: String,
    /// The functions of the source
    pub functions: Vec<FunctionDescriptor>,
}

impl FunctionsSource {
    /// An empty source
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            functions: Vec::new(),
        }
    }

    /// Add a function to the source
    pub fn with(mut self, function: FunctionDescriptor) -> Self {
        self.functions.push(function);
        self
    }
}

lazy_static! {
    /// Float functions that can be called from native code
    static ref NATIVE_FLOAT1: HashMap<&'static str, fn(f64) -> f64> = {
        let mut map = HashMap::<&'static str, fn(f64) -> f64>::new();
        map.insert("abs", f64::abs);
        map.insert("sign", f64::signum);
        map.insert("sqrt", f64::sqrt);
        map.insert("cbrt", f64::cbrt);
        map.insert("sin", f64::sin);
        map.insert("cos", f64::cos);
        map.insert("tan", f64::tan);
        map.insert("asin", f64::asin);
        map.insert("acos", f64::acos);
        map.insert("atan", f64::atan);
        map.insert("sinh", f64::sinh);
        map.insert("cosh", f64::cosh);
        map.insert("tanh", f64::tanh);
        map.insert("floor", f64::floor);
        map.insert("ceiling", f64::ceil);
        map.insert("round", f64::round);
        map.insert("trunc", f64::trunc);
        map.insert("exp", f64::exp);
        map.insert("ln", f64::ln);
        map.insert("log2", f64::log2);
        map.insert("log10", f64::log10);
        map.insert("erf", libm::erf);
        map.insert("gamma", libm::tgamma);
        map.shrink_to_fit();
        map
    };

    /// Functions every service knows about
    pub static ref BUILTIN_FUNCTIONS: FunctionsSource = builtin_functions();
}

fn builtin_functions() -> FunctionsSource {
    use ParameterKind::{Any, Boolean, ByteArray, Float, Generic, Int32, Integer, String as Str};
    let numeric = Returns::Kind(SupportedValueType::Numeric);
    let string = Returns::Kind(SupportedValueType::String);
    let boolean = Returns::Kind(SupportedValueType::Boolean);

    let mut source = FunctionsSource::new("builtin");
    let mut names: Vec<&&str> = NATIVE_FLOAT1.keys().collect();
    names.sort();
    for name in names {
        source = source.with(FunctionDescriptor::float1(name, NATIVE_FLOAT1[*name]));
    }

    source
        .with(FunctionDescriptor::new("abs", vec![Integer], numeric, |args| {
            let value = integer_arg(args, 0)?;
            Ok(value.checked_abs().map_or_else(|| Value::from(-(value as f64)), Value::from))
        }))
        .with(FunctionDescriptor::new("sign", vec![Integer], numeric, |args| {
            Ok(Value::from(integer_arg(args, 0)?.signum()))
        }))
        .with(FunctionDescriptor::new("round", vec![Float, Int32], numeric, |args| {
            let factor = 10f64.powi(integer_arg(args, 1)? as i32);
            Ok(Value::from((float_arg(args, 0)? * factor).round() / factor))
        }))
        .with(FunctionDescriptor::float2("min", f64::min))
        .with(FunctionDescriptor::new("min", vec![Integer, Integer], numeric, |args| {
            Ok(Value::from(integer_arg(args, 0)?.min(integer_arg(args, 1)?)))
        }))
        .with(FunctionDescriptor::float2("max", f64::max))
        .with(FunctionDescriptor::new("max", vec![Integer, Integer], numeric, |args| {
            Ok(Value::from(integer_arg(args, 0)?.max(integer_arg(args, 1)?)))
        }))
        .with(FunctionDescriptor::float2("pow", f64::powf))
        .with(FunctionDescriptor::new("pow", vec![Integer, Integer], numeric, |args| {
            Ok(Value::Numeric(
                Number::Integer(integer_arg(args, 0)?).power(Number::Integer(integer_arg(args, 1)?)),
            ))
        }))
        .with(FunctionDescriptor::float2("log", f64::log))
        .with(FunctionDescriptor::float2("atan2", f64::atan2))
        .with(FunctionDescriptor::new("clamp", vec![Float, Float, Float], numeric, |args| {
            let (value, low, high) = (float_arg(args, 0)?, float_arg(args, 1)?, float_arg(args, 2)?);
            Ok(Value::from(value.max(low).min(high)))
        }))
        .with(FunctionDescriptor::new("clamp", vec![Integer, Integer, Integer], numeric, |args| {
            let (value, low, high) = (integer_arg(args, 0)?, integer_arg(args, 1)?, integer_arg(args, 2)?);
            Ok(Value::from(value.max(low).min(high)))
        }))
        .with(
            FunctionDescriptor::new("random", vec![], numeric, |_| Ok(Value::from(rand::random::<f64>())))
                .impure(),
        )
        .with(FunctionDescriptor::new("strlen", vec![Str], numeric, |args| {
            Ok(Value::from(str_arg(args, 0)?.chars().count() as i64))
        }))
        .with(FunctionDescriptor::new("substring", vec![Str, Int32], string, |args| {
            let start = usize::try_from(integer_arg(args, 1)?).unwrap_or(0);
            Ok(Value::from(str_arg(args, 0)?.chars().skip(start).collect::<std::string::String>()))
        }))
        .with(FunctionDescriptor::new("substring", vec![Str, Int32, Int32], string, |args| {
            let start = usize::try_from(integer_arg(args, 1)?).unwrap_or(0);
            let length = usize::try_from(integer_arg(args, 2)?).unwrap_or(0);
            Ok(Value::from(
                str_arg(args, 0)?.chars().skip(start).take(length).collect::<std::string::String>(),
            ))
        }))
        .with(FunctionDescriptor::new("upper", vec![Str], string, |args| {
            Ok(Value::from(str_arg(args, 0)?.to_uppercase()))
        }))
        .with(FunctionDescriptor::new("lower", vec![Str], string, |args| {
            Ok(Value::from(str_arg(args, 0)?.to_lowercase()))
        }))
        .with(FunctionDescriptor::new("trim", vec![Str], string, |args| {
            Ok(Value::from(str_arg(args, 0)?.trim()))
        }))
        .with(FunctionDescriptor::new("concat", vec![Str, Str], string, |args| {
            Ok(Value::from(format!("{}{}", str_arg(args, 0)?, str_arg(args, 1)?)))
        }))
        .with(FunctionDescriptor::new("contains", vec![Str, Str], boolean, |args| {
            Ok(Value::from(str_arg(args, 0)?.contains(str_arg(args, 1)?)))
        }))
        .with(FunctionDescriptor::new("length", vec![ByteArray], numeric, |args| {
            Ok(Value::from(arg(args, 0)?.expect_bytes("length")?.len() as i64))
        }))
        .with(FunctionDescriptor::new("if", vec![Boolean, Generic, Generic], Returns::Generic, |args| {
            let branch = if arg(args, 0)?.expect_bool("if")? { 1 } else { 2 };
            arg(args, branch).cloned()
        }))
        .with(FunctionDescriptor::new("tostring", vec![Any], string, |args| {
            Ok(Value::from(arg(args, 0)?.to_string()))
        }))
}

/// What the resolver knows about one argument of a call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArgumentInfo {
    pub state: TypeState,
    /// Set for numeric constants
    pub constant: Option<Number>,
}

/// Function tables, indexed by lowercase name and arity.
#[derive(Debug, Default)]
pub struct FunctionLibrary {
    overloads: HashMap<(String, usize), Vec<Arc<FunctionDescriptor>>>,
    prototypes: Vec<String>,
}

impl FunctionLibrary {
    pub fn new<'a, I>(sources: I) -> Self
    where
        I: IntoIterator<Item = &'a FunctionsSource>,
    {
        let mut library = Self::default();
        for source in sources {
            log::debug!("registering {} functions from '{}'", source.functions.len(), source.name);
            for function in &source.functions {
                library.prototypes.push(function.prototype());
                library
                    .overloads
                    .entry((function.name.to_lowercase(), function.arity()))
                    .or_default()
                    .push(Arc::new(function.clone()));
            }
        }
        library
    }

    /// Every known prototype, in registration order
    pub fn prototypes(&self) -> &[String] {
        &self.prototypes
    }

    /// Every overload of `name` taking `arity` arguments
    pub fn candidates(&self, name: &str, arity: usize) -> Result<&[Arc<FunctionDescriptor>]> {
        self.overloads
            .get(&(name.to_lowercase(), arity))
            .map(Vec::as_slice)
            .ok_or_else(|| {
                Error::FunctionCallNotValidLogically(format!(
                    "no function '{}' taking {} argument(s)",
                    name, arity
                ))
            })
    }

    /// Pick the overload of `name` best matching `arguments`: most exact
    /// parameter matches first, then floating point, then 64-bit, then 32-bit
    /// integer parameters.
    pub fn select(&self, name: &str, arguments: &[ArgumentInfo]) -> Result<Arc<FunctionDescriptor>> {
        self.candidates(name, arguments.len())?
            .iter()
            .filter_map(|candidate| rank(candidate, arguments).map(|rank| (rank, candidate)))
            .max_by_key(|(rank, _)| *rank)
            .map(|(_, candidate)| Arc::clone(candidate))
            .ok_or_else(|| {
                let found: Vec<String> = arguments.iter().map(|a| a.state.to_string()).collect();
                Error::FunctionCallNotValidLogically(format!(
                    "no overload of '{}' accepts ({})",
                    name,
                    found.join(", ")
                ))
            })
    }
}

/// Ranking of a candidate for a call, `None` when it cannot accept the call.
fn rank(candidate: &FunctionDescriptor, arguments: &[ArgumentInfo]) -> Option<(usize, usize, usize, usize)> {
    let mut exact = 0;
    let (mut floats, mut integers, mut int32s) = (0, 0, 0);
    let mut generic = TypeSet::ALL;

    for (kind, argument) in candidate.parameters.iter().zip(arguments) {
        let possible = argument.state.possible();
        if possible.intersection(kind.accepted()).is_empty() {
            return None;
        }
        match kind {
            ParameterKind::Float => {
                floats += 1;
                if !matches!(argument.constant, Some(Number::Integer(_))) {
                    exact += 1;
                }
            }
            ParameterKind::Integer | ParameterKind::Int32 => {
                if *kind == ParameterKind::Integer {
                    integers += 1;
                } else {
                    int32s += 1;
                }
                if let Some(number) = argument.constant {
                    let integral = number.as_i64()?;
                    if *kind == ParameterKind::Int32 && i32::try_from(integral).is_err() {
                        return None;
                    }
                    if number.is_integer() {
                        exact += 1;
                    }
                }
            }
            ParameterKind::Generic => {
                generic = generic.intersection(possible);
                if generic.is_empty() {
                    return None;
                }
            }
            ParameterKind::Any => {}
            ParameterKind::Boolean | ParameterKind::String | ParameterKind::ByteArray => {
                if argument.state.is_strong() {
                    exact += 1;
                }
            }
        }
    }
    Some((exact, floats, integers, int32s))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant(number: Number) -> ArgumentInfo {
        ArgumentInfo {
            state: TypeState::Strong(SupportedValueType::Numeric),
            constant: Some(number),
        }
    }

    fn library() -> FunctionLibrary {
        FunctionLibrary::new(std::iter::once(&*BUILTIN_FUNCTIONS))
    }

    #[test]
    fn prefers_exact_integer_overloads() {
        let selected = library()
            .select("max", &[constant(Number::Integer(2)), constant(Number::Integer(7))])
            .unwrap();
        assert_eq!(selected.parameters, vec![ParameterKind::Integer, ParameterKind::Integer]);
    }

    #[test]
    fn falls_back_to_floats() {
        let selected = library()
            .select("max", &[constant(Number::Integer(2)), constant(Number::Float(7.5))])
            .unwrap();
        assert_eq!(selected.parameters, vec![ParameterKind::Float, ParameterKind::Float]);

        let unknown = ArgumentInfo {
            state: TypeState::Unknown,
            constant: None,
        };
        let selected = library()
            .select("max", &[unknown, constant(Number::Integer(2))])
            .unwrap();
        assert_eq!(selected.parameters, vec![ParameterKind::Float, ParameterKind::Float]);
    }

    #[test]
    fn unknown_functions_are_logical_errors() {
        assert!(matches!(
            library().select("frobnicate", &[]),
            Err(Error::FunctionCallNotValidLogically(_))
        ));
        let text = ArgumentInfo {
            state: TypeState::Strong(SupportedValueType::String),
            constant: None,
        };
        assert!(matches!(
            library().select("sqrt", &[text]),
            Err(Error::FunctionCallNotValidLogically(_))
        ));
    }

    #[test]
    fn names_are_case_insensitive() {
        assert!(library().select("SQRT", &[constant(Number::Float(4.0))]).is_ok());
        assert!(library().candidates("Strlen", 1).is_ok());
    }

    #[test]
    fn calls_coerce_arguments() {
        let round = library()
            .select("round", &[constant(Number::Float(3.14159)), constant(Number::Integer(2))])
            .unwrap();
        assert_eq!(
            round.call(vec![Value::from(3.14159), Value::from(2)]).unwrap(),
            Value::from(3.14)
        );
        assert!(round.call(vec![Value::from(3.1), Value::from(2.5)]).is_err());
    }

    #[test]
    fn wrong_arity_is_an_error() {
        let library = library();
        for (name, arity) in &[("if", 3), ("tostring", 1), ("length", 1), ("strlen", 1)] {
            let function = &library.candidates(name, *arity).unwrap()[0];
            assert!(
                matches!(function.call(vec![]), Err(Error::Evaluation(_))),
                "{}",
                name
            );
        }
        let branch = &library.candidates("if", 3).unwrap()[0];
        assert!(branch.call(vec![Value::from(true), Value::from(1)]).is_err());
        assert_eq!(
            branch.call(vec![Value::from(false), Value::from(1), Value::from(2)]),
            Ok(Value::from(2))
        );
    }

    #[test]
    fn prototypes() {
        let library = library();
        assert!(library.prototypes().iter().any(|p| p == "substring(string, int32, int32)"));
        assert!(library.prototypes().iter().any(|p| p == "if(boolean, T, T)"));
    }
}

#![warn(missing_docs, clippy::all, clippy::pedantic)]
#![allow(
    clippy::needless_return,
    clippy::missing_docs_in_private_items,
    clippy::non_ascii_literal
)]

//! Formulary, a crate for parsing, type-checking and compiling mathematical
//! expressions embedded in strings.
//!
//! Expressions are interpreted by an [`ExpressionParsingService`], which
//! turns a text into a [`ComputedExpression`]. The expression can then be
//! computed many times, with different values for its parameters:
//!
//! ```
//! use formulary::{ExpressionParsingService, Value};
//!
//! let service = ExpressionParsingService::new();
//! let expression = service.interpret("3 / c + b").unwrap();
//! assert_eq!(expression.parameter_names(), vec!["c", "b"]);
//!
//! let value = expression.compute(&[("c", Value::from(2)), ("b", Value::from(5))], None);
//! assert_eq!(value, Ok(Value::from(6.5)));
//! let value = expression.compute(&[("c", Value::from(1)), ("b", Value::from(10))], None);
//! assert_eq!(value, Ok(Value::from(13)));
//! ```
//!
//! Texts that do not have the structure of an expression are not errors, they
//! produce expressions that were not recognized:
//!
//! ```
//! # use formulary::ExpressionParsingService;
//! let service = ExpressionParsingService::new();
//! assert!(!service.interpret("2 +* 3").unwrap().recognized_correctly());
//! ```
//!
//! Expressions that make no sense for their types are errors:
//!
//! ```
//! # use formulary::{Error, ExpressionParsingService};
//! let service = ExpressionParsingService::new();
//! assert!(matches!(
//!     service.interpret("1 - \"one\""),
//!     Err(Error::ExpressionNotValidLogically(_))
//! ));
//! ```
//!
//! # Language definition
//!
//! The language understood by default contains:
//!
//! - integer and float literals: `12`, `-0.5`, `1.5e3`;
//! - byte arrays written in hexadecimal: `0x0F`;
//! - strings between double quotes, `"abc"`;
//! - booleans, `true` and `false` in any case, and the named constants `pi`,
//!   `e` and `tau`;
//! - parameters, whose names start with a letter or `_`;
//! - calls to registered functions: `max(a, 2)`, `sqrt(x)`, `if(c, a, b)`;
//! - arithmetic (`+ - * / % ^`), shifts (`<< >>`), comparisons
//!   (`= != < <= > >=`) and logical or bitwise operators (`& | # !`).
//!
//! The operators and their precedence are described by a [`MathDefinition`],
//! which can be replaced through [`ServiceOptions`].
//!
//! # Technical details
//!
//! Parentheses are first replaced by symbols, then each symbol is split at its
//! loosest-binding operator. The resulting tree is typed by a fixpoint over a
//! small lattice of value types, simplified by folding its constant parts, and
//! compiled to a tree of closures. With the `jit` feature, floating point
//! expressions can also be lowered to machine code.
//! [`CachedExpressionParsingService`] compiles every distinct text once.

#[macro_use]
extern crate lazy_static;

mod ast;
mod builder;
mod compile;
mod definition;
mod error;
mod expr;
mod extract;
mod format;
mod functions;
#[cfg(feature = "jit")]
mod jit;
mod lexer;
mod operations;
mod parameters;
mod registry;
mod resolve;
mod service;
mod symbols;
mod token;
mod tolerance;
mod types;
mod value;

pub use ast::{Ast, Node, NodeId};
pub use definition::{MathDefinition, OperatorPrecedenceStyle};
pub use error::{Error, Result};
pub use expr::{ComputedExpression, DataFinder, ParameterProvider};
pub use extract::{
    BooleanInterpreter, ByteArrayInterpreter, ConstantExtractor, ConstantInterpreter, ConstantTable,
    NamedConstantInterpreter, NumberInterpreter, PassThroughExtractor, PredicatePassThrough,
    ScientificNumberExtractor, SpecialSymbolExtractor, StringExtractor, TableEntry,
};
pub use format::{FixedDecimalFormatter, HexFormatter, StringFormatter};
pub use functions::{FunctionDescriptor, FunctionsSource, Implementation, ParameterKind, Returns, BUILTIN_FUNCTIONS};
#[cfg(feature = "jit")]
pub use jit::NativeExpression;
pub use lexer::is_identifier;
pub use parameters::{NumericRefinement, ParamId, Parameter, ParameterRegistry};
pub use service::{CachedExpressionParsingService, CancellationToken, ExpressionParsingService, ServiceOptions};
pub use token::{Op, UnaryOp};
pub use tolerance::Tolerance;
pub use types::{TypeSet, TypeState};
pub use value::{Number, SupportedValueType, Value};

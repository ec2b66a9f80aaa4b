//! Parsing services.
//!
//! [`ExpressionParsingService`] runs the whole pipeline on every call:
//! extraction, parenthesis resolution, tree building, type resolution,
//! folding and compilation. [`CachedExpressionParsingService`] memoizes the
//! result per expression text.

use crate::ast::{Ast, Node};
use crate::builder::NodeBuilder;
use crate::compile::compile;
use crate::definition::MathDefinition;
use crate::error::{Error, Result};
use crate::expr::{CompiledTree, ComputedExpression};
use crate::extract::{
    BooleanInterpreter, ByteArrayInterpreter, ConstantExtractor, ConstantInterpreter, ConstantTable,
    NamedConstantInterpreter, NumberInterpreter, PassThroughExtractor, ScientificNumberExtractor,
    SpecialSymbolExtractor, StringExtractor,
};
use crate::format::{Formatters, StringFormatter};
use crate::functions::{FunctionLibrary, FunctionsSource, BUILTIN_FUNCTIONS};
use crate::lexer::strip_whitespace;
use crate::parameters::ParameterRegistry;
use crate::registry::LevelDictionary;
use crate::resolve::resolve;
use crate::symbols::SymbolTable;
use crate::token::Operators;
use crate::value::Value;
use dashmap::DashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

/// Cooperative cancellation of an interpretation.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// A token that is not cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Request the cancellation of every interpretation watching this token
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Check if cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Construction options of a parsing service.
///
/// ```
/// # use formulary::{ExpressionParsingService, FixedDecimalFormatter, MathDefinition, ServiceOptions};
/// # use std::sync::Arc;
/// let definition = MathDefinition {
///     power: "**".into(),
///     ..MathDefinition::default()
/// };
/// let options = ServiceOptions::new()
///     .with_definition(definition)
///     .with_string_formatter(Arc::new(FixedDecimalFormatter { decimals: 2 }));
/// let service = ExpressionParsingService::with_options(options);
/// let expression = service.interpret("\"v=\" + 2**0.5").unwrap();
/// assert_eq!(expression.compute(&(), None).unwrap().to_string(), "v=1.41");
/// ```
#[derive(Clone, Default)]
pub struct ServiceOptions {
    definition: MathDefinition,
    function_sources: Vec<FunctionsSource>,
    extractors: Vec<Arc<dyn ConstantExtractor>>,
    interpreters: Vec<Arc<dyn ConstantInterpreter>>,
    pass_through: Vec<Arc<dyn PassThroughExtractor>>,
    formatters: Vec<Arc<dyn StringFormatter>>,
}

impl fmt::Debug for ServiceOptions {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("ServiceOptions")
            .field("definition", &self.definition)
            .field("function_sources", &self.function_sources.len())
            .field("extractors", &self.extractors.len())
            .field("interpreters", &self.interpreters.len())
            .field("pass_through", &self.pass_through.len())
            .field("formatters", &self.formatters.len())
            .finish()
    }
}

impl ServiceOptions {
    /// Default options: the default definition and the built-in functions
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `definition` instead of the default one
    pub fn with_definition(mut self, definition: MathDefinition) -> Self {
        self.definition = definition;
        self
    }

    /// Add a source of functions
    pub fn with_functions_source(mut self, source: FunctionsSource) -> Self {
        self.function_sources.push(source);
        self
    }

    /// Add an extractor, run in registration order after the built-in ones
    pub fn with_constant_extractor(mut self, extractor: Arc<dyn ConstantExtractor>) -> Self {
        self.extractors.push(extractor);
        self
    }

    /// Add an interpreter for identifiers
    pub fn with_constant_interpreter(mut self, interpreter: Arc<dyn ConstantInterpreter>) -> Self {
        self.interpreters.push(interpreter);
        self
    }

    /// Add an extractor for texts that must not be parsed
    pub fn with_pass_through_extractor(mut self, extractor: Arc<dyn PassThroughExtractor>) -> Self {
        self.pass_through.push(extractor);
        self
    }

    /// Add a formatter, consulted before the built-in ones
    pub fn with_string_formatter(mut self, formatter: Arc<dyn StringFormatter>) -> Self {
        self.formatters.push(formatter);
        self
    }
}

/// The frozen registries, built on first use
struct Engine {
    definition: MathDefinition,
    operators: Operators,
    library: FunctionLibrary,
    extractors: LevelDictionary<Arc<dyn ConstantExtractor>>,
    interpreters: LevelDictionary<Arc<dyn ConstantInterpreter>>,
    pass_through: Vec<Arc<dyn PassThroughExtractor>>,
}

struct Parsed {
    ast: Ast,
    parameters: ParameterRegistry,
}

impl Engine {
    fn new(options: &ServiceOptions) -> Result<Self> {
        options.definition.validate()?;

        let mut extractors: LevelDictionary<Arc<dyn ConstantExtractor>> = LevelDictionary::new();
        let builtin_extractors: [Arc<dyn ConstantExtractor>; 3] = [
            Arc::new(StringExtractor),
            Arc::new(SpecialSymbolExtractor),
            Arc::new(ScientificNumberExtractor),
        ];
        for extractor in builtin_extractors.into_iter().chain(options.extractors.iter().cloned()) {
            extractors.insert(extractor.level(), extractor);
        }

        let mut interpreters: LevelDictionary<Arc<dyn ConstantInterpreter>> = LevelDictionary::new();
        let builtin_interpreters: [Arc<dyn ConstantInterpreter>; 4] = [
            Arc::new(NumberInterpreter),
            Arc::new(BooleanInterpreter),
            Arc::new(ByteArrayInterpreter),
            Arc::new(NamedConstantInterpreter),
        ];
        for interpreter in builtin_interpreters.into_iter().chain(options.interpreters.iter().cloned()) {
            interpreters.insert(interpreter.level(), interpreter);
        }

        let library = FunctionLibrary::new(std::iter::once(&*BUILTIN_FUNCTIONS).chain(&options.function_sources));
        log::debug!(
            "registries frozen: {} functions, {} extractors, {} interpreters",
            library.prototypes().len(),
            extractors.len(),
            interpreters.len()
        );

        Ok(Self {
            operators: Operators::new(&options.definition),
            definition: options.definition.clone(),
            library,
            extractors,
            interpreters,
            pass_through: options.pass_through.clone(),
        })
    }

    fn parse(&self, expression: &str, formatters: &Formatters) -> Result<Parsed> {
        if self.pass_through.iter().any(|extractor| extractor.matches(expression)) {
            log::debug!("'{}' passed through as a string", expression);
            let mut ast = Ast::default();
            let root = ast.push(Node::Constant(Value::from(expression)));
            ast.set_root(root);
            return Ok(Parsed {
                ast,
                parameters: ParameterRegistry::new(),
            });
        }

        let definition = self.definition.clone();
        let mut constants = ConstantTable::new();
        let mut text = expression.to_owned();
        for extractor in self.extractors.iter() {
            text = extractor.extract(&text, &definition, &mut constants)?;
        }
        let text = strip_whitespace(&text, &self.operators)?;
        log::trace!("extracted {} constant(s): {:?}", constants.len(), text);

        let mut symbols = SymbolTable::new(&text);
        symbols.resolve_parentheses(&definition, &self.operators)?;

        let mut parameters = ParameterRegistry::new();
        let mut ast = NodeBuilder::populate(
            &self.operators,
            &definition.parameter_separator,
            &symbols,
            &mut constants,
            &self.interpreters,
            &mut parameters,
        )?
        .build()?;

        resolve(&mut ast, &mut parameters, &self.library, formatters)?;
        ast.simplify(formatters);
        Ok(Parsed { ast, parameters })
    }
}

struct Registries {
    pending: ServiceOptions,
    engine: Option<Arc<Engine>>,
}

/// Parses and compiles expressions, without caching.
///
/// Functions, extractors and interpreters can be registered until the first
/// interpretation, string formatters until the first successful one.
pub struct ExpressionParsingService {
    registries: RwLock<Registries>,
    formatters: RwLock<Vec<Arc<dyn StringFormatter>>>,
    formatters_frozen: AtomicBool,
    compilations: AtomicUsize,
}

impl Default for ExpressionParsingService {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ExpressionParsingService {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("ExpressionParsingService")
            .field("compilations", &self.compilations())
            .finish()
    }
}

impl ExpressionParsingService {
    /// A service with the default options
    pub fn new() -> Self {
        Self::with_options(ServiceOptions::default())
    }

    /// A service with `options` registered
    pub fn with_options(mut options: ServiceOptions) -> Self {
        let formatters = std::mem::take(&mut options.formatters);
        Self {
            registries: RwLock::new(Registries {
                pending: options,
                engine: None,
            }),
            formatters: RwLock::new(formatters),
            formatters_frozen: AtomicBool::new(false),
            compilations: AtomicUsize::new(0),
        }
    }

    fn register<F>(&self, what: &str, register: F) -> Result<()>
    where
        F: FnOnce(&mut ServiceOptions),
    {
        let mut registries = self.registries.write().unwrap_or_else(PoisonError::into_inner);
        if registries.engine.is_some() {
            return Err(Error::InvalidOperation(format!(
                "cannot register {} once the service is in use",
                what
            )));
        }
        register(&mut registries.pending);
        Ok(())
    }

    /// Register more functions, until the first interpretation
    pub fn register_functions_source(&self, source: FunctionsSource) -> Result<()> {
        self.register("functions", |options| options.function_sources.push(source))
    }

    /// Register a constant extractor, until the first interpretation
    pub fn register_constant_extractor(&self, extractor: Arc<dyn ConstantExtractor>) -> Result<()> {
        self.register("constant extractors", |options| options.extractors.push(extractor))
    }

    /// Register a constant interpreter, until the first interpretation
    pub fn register_constant_interpreter(&self, interpreter: Arc<dyn ConstantInterpreter>) -> Result<()> {
        self.register("constant interpreters", |options| options.interpreters.push(interpreter))
    }

    /// Register a pass-through extractor, until the first interpretation
    pub fn register_pass_through_extractor(&self, extractor: Arc<dyn PassThroughExtractor>) -> Result<()> {
        self.register("pass-through extractors", |options| options.pass_through.push(extractor))
    }

    /// Register a formatter, until the first successful interpretation
    pub fn register_string_formatter(&self, formatter: Arc<dyn StringFormatter>) -> Result<()> {
        let mut formatters = self.formatters.write().unwrap_or_else(PoisonError::into_inner);
        if self.formatters_frozen.load(Ordering::Acquire) {
            return Err(Error::InvalidOperation(
                "cannot register string formatters after an expression was interpreted".into(),
            ));
        }
        formatters.push(formatter);
        Ok(())
    }

    /// Prototypes of every function known to the service
    pub fn registered_functions(&self) -> Result<Vec<String>> {
        Ok(self.engine()?.library.prototypes().to_vec())
    }

    /// Number of expressions compiled so far
    pub fn compilations(&self) -> usize {
        self.compilations.load(Ordering::Relaxed)
    }

    fn engine(&self) -> Result<Arc<Engine>> {
        {
            let registries = self.registries.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(ref engine) = registries.engine {
                return Ok(Arc::clone(engine));
            }
        }
        let mut registries = self.registries.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(ref engine) = registries.engine {
            return Ok(Arc::clone(engine));
        }
        let engine = Arc::new(Engine::new(&registries.pending)?);
        registries.engine = Some(Arc::clone(&engine));
        Ok(engine)
    }

    /// Parse, type and compile `expression`
    pub fn interpret(&self, expression: &str) -> Result<Arc<ComputedExpression>> {
        self.interpret_with_cancellation(expression, &CancellationToken::default())
    }

    /// Interpret `expression`, giving up with [`Error::Cancelled`] once
    /// `cancellation` is cancelled.
    ///
    /// Text that does not have the structure of an expression is not an
    /// error: the result has `recognized_correctly() == false`.
    pub fn interpret_with_cancellation(
        &self,
        expression: &str,
        cancellation: &CancellationToken,
    ) -> Result<Arc<ComputedExpression>> {
        validate_input(expression)?;
        cancellation.check()?;
        let engine = self.engine()?;
        let formatters = Formatters::new(
            self.formatters
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        );

        let parsed = match engine.parse(expression, &formatters) {
            Ok(parsed) => parsed,
            Err(error) if error.is_soft() => {
                log::warn!("'{}' is not recognized: {}", expression, error);
                return Ok(Arc::new(ComputedExpression::not_recognized(expression, formatters)));
            }
            Err(error) => {
                log::debug!("'{}' rejected: {}", expression, error);
                return Err(error);
            }
        };

        cancellation.check()?;
        let root = compile(&parsed.ast)?;
        self.compilations.fetch_add(1, Ordering::Relaxed);
        self.formatters_frozen.store(true, Ordering::Release);
        Ok(Arc::new(ComputedExpression::new(
            expression,
            CompiledTree {
                ast: parsed.ast,
                root,
            },
            parsed.parameters,
            formatters,
        )))
    }
}

fn validate_input(expression: &str) -> Result<()> {
    if expression.trim().is_empty() {
        return Err(Error::InvalidArgument("the expression is empty".into()));
    }
    Ok(())
}

type CacheSlot = Arc<OnceLock<Result<Arc<ComputedExpression>>>>;

/// An [`ExpressionParsingService`] remembering every expression it compiled.
///
/// Each distinct text is compiled at most once, even when requested from
/// several threads at the same time. Expressions without parameters are
/// shared as is. Expressions with parameters are shared with the first caller
/// only; later callers get a copy sharing the compiled tree but holding its
/// own parameter registry.
#[derive(Default)]
pub struct CachedExpressionParsingService {
    service: ExpressionParsingService,
    cache: DashMap<Arc<str>, CacheSlot>,
}

impl fmt::Debug for CachedExpressionParsingService {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("CachedExpressionParsingService")
            .field("cached", &self.cache.len())
            .field("compilations", &self.service.compilations())
            .finish()
    }
}

impl CachedExpressionParsingService {
    /// A cached service with the default options
    pub fn new() -> Self {
        Self::default()
    }

    /// A cached service with `options` registered
    pub fn with_options(options: ServiceOptions) -> Self {
        Self {
            service: ExpressionParsingService::with_options(options),
            cache: DashMap::new(),
        }
    }

    /// The service doing the actual work
    pub fn service(&self) -> &ExpressionParsingService {
        &self.service
    }

    /// See [`ExpressionParsingService::register_functions_source`]
    pub fn register_functions_source(&self, source: FunctionsSource) -> Result<()> {
        self.service.register_functions_source(source)
    }

    /// See [`ExpressionParsingService::register_string_formatter`]
    pub fn register_string_formatter(&self, formatter: Arc<dyn StringFormatter>) -> Result<()> {
        self.service.register_string_formatter(formatter)
    }

    /// Names of the registered functions
    pub fn registered_functions(&self) -> Result<Vec<String>> {
        self.service.registered_functions()
    }

    /// Number of texts actually compiled
    pub fn compilations(&self) -> usize {
        self.service.compilations()
    }

    /// The compiled form of `expression`, compiling it on first use
    pub fn interpret(&self, expression: &str) -> Result<Arc<ComputedExpression>> {
        self.interpret_with_cancellation(expression, &CancellationToken::default())
    }

    /// Like `interpret`, watching `cancellation` while compiling
    pub fn interpret_with_cancellation(
        &self,
        expression: &str,
        cancellation: &CancellationToken,
    ) -> Result<Arc<ComputedExpression>> {
        validate_input(expression)?;
        loop {
            cancellation.check()?;
            let slot = self.slot(expression);
            let mut first = false;
            let result = slot.get_or_init(|| {
                first = true;
                self.service.interpret_with_cancellation(expression, cancellation)
            });

            match result {
                Ok(computed) if first || !computed.has_parameters() => return Ok(Arc::clone(computed)),
                Ok(computed) => return Ok(Arc::new(computed.fresh_copy())),
                Err(Error::Cancelled) => {
                    self.cache.remove_if(expression, |_, cached| Arc::ptr_eq(cached, &slot));
                    if first {
                        return Err(Error::Cancelled);
                    }
                    log::debug!("compilation of '{}' was cancelled by another caller, retrying", expression);
                }
                Err(error) => return Err(error.clone()),
            }
        }
    }

    fn slot(&self, expression: &str) -> CacheSlot {
        if let Some(slot) = self.cache.get(expression) {
            return Arc::clone(slot.value());
        }
        Arc::clone(
            self.cache
                .entry(Arc::from(expression))
                .or_insert_with(|| Arc::new(OnceLock::new()))
                .value(),
        )
    }

    /// Forget every cached expression
    pub fn clear(&self) {
        self.cache.clear();
    }

    /// Number of distinct texts cached
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Check if nothing was cached yet
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

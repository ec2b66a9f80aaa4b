//! Native code generation for floating point expressions.
//!
//! Expressions made only of numbers, numeric parameters, the arithmetic
//! operators and native `float -> float` functions can be lowered to machine
//! code with Cranelift. The generated function reads its parameters from a
//! contiguous `f64` buffer, in the order of the parameter registry.

use crate::ast::{Ast, Node, NodeId};
use crate::error::{Error, Result};
use crate::token::{Op, UnaryOp};
use crate::value::SupportedValueType;
use cranelift::codegen::settings;
use cranelift::prelude::*;
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{Linkage, Module};
use hashbrown::HashMap;
use std::fmt;
use std::mem;

const POW: &str = "pow";

type Entry = unsafe extern "C" fn(*const f64) -> f64;

fn codegen(error: impl fmt::Display) -> Error {
    Error::Evaluation(format!("native code generation failed: {}", error))
}

/// An expression compiled to machine code
pub struct NativeExpression {
    module: Option<JITModule>,
    entry: Entry,
    parameters: usize,
}

impl fmt::Debug for NativeExpression {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("NativeExpression")
            .field("parameters", &self.parameters)
            .finish()
    }
}

impl NativeExpression {
    /// Lower `ast` to machine code. `Ok(None)` when the tree uses anything
    /// that has no native form.
    pub(crate) fn compile(ast: &Ast, parameters: usize) -> Result<Option<Self>> {
        let mut natives = HashMap::new();
        if !lowerable(ast, ast.root(), &mut natives) {
            log::debug!("expression has no native form");
            return Ok(None);
        }

        let mut flags = settings::builder();
        flags.set("opt_level", "speed").map_err(codegen)?;
        let isa = cranelift_native::builder()
            .map_err(codegen)?
            .finish(settings::Flags::new(flags))
            .map_err(codegen)?;
        let mut jit_builder = JITBuilder::with_isa(isa, cranelift_module::default_libcall_names());
        jit_builder.symbol(POW, libm::pow as *const u8);
        for (symbol, function) in &natives {
            jit_builder.symbol(symbol.as_str(), *function as *const u8);
        }
        let mut module = JITModule::new(jit_builder);

        let mut signature = module.make_signature();
        let pointer = module.target_config().pointer_type();
        signature.params.push(AbiParam::new(pointer));
        signature.returns.push(AbiParam::new(types::F64));
        let id = module
            .declare_function("formulary_entry", Linkage::Local, &signature)
            .map_err(codegen)?;

        let mut context = module.make_context();
        context.func.signature = signature;
        let mut builder_context = FunctionBuilderContext::new();
        {
            let mut builder = FunctionBuilder::new(&mut context.func, &mut builder_context);
            let block = builder.create_block();
            builder.append_block_params_for_function_params(block);
            builder.switch_to_block(block);
            builder.seal_block(block);
            let values = builder.block_params(block)[0];

            let mut translator = Translator {
                ast,
                module: &mut module,
                builder,
                values,
                translated: vec![None; ast.len()],
            };
            let result = translator.node(ast.root())?;
            translator.builder.ins().return_(&[result]);
            translator.builder.finalize();
        }

        module.define_function(id, &mut context).map_err(codegen)?;
        module.clear_context(&mut context);
        module.finalize_definitions().map_err(codegen)?;
        let code = module.get_finalized_function(id);
        // SAFETY: the function was declared with the `Entry` signature
        let entry = unsafe { mem::transmute::<*const u8, Entry>(code) };
        log::debug!("compiled native expression with {} parameters", parameters);

        Ok(Some(Self {
            module: Some(module),
            entry,
            parameters,
        }))
    }

    /// Number of values expected by `eval`
    pub fn parameter_count(&self) -> usize {
        self.parameters
    }

    /// Evaluate with `values` in parameter order
    pub fn eval(&self, values: &[f64]) -> Result<f64> {
        if values.len() < self.parameters {
            return Err(Error::InvalidArgument(format!(
                "expected {} values, got {}",
                self.parameters,
                values.len()
            )));
        }
        // SAFETY: the buffer holds at least one value per parameter and the
        // code stays alive as long as `self`
        Ok(unsafe { (self.entry)(values.as_ptr()) })
    }

    /// Evaluate `count` times, one column of values per parameter
    pub fn eval_columns(&self, columns: &[&[f64]], count: usize) -> Result<Vec<f64>> {
        if columns.len() < self.parameters {
            return Err(Error::InvalidArgument(format!(
                "expected {} columns, got {}",
                self.parameters,
                columns.len()
            )));
        }
        if let Some(short) = columns.iter().position(|column| column.len() < count) {
            return Err(Error::InvalidArgument(format!(
                "column {} holds fewer than {} values",
                short, count
            )));
        }
        let mut row = vec![0.0; self.parameters];
        let mut results = Vec::with_capacity(count);
        for i in 0..count {
            for (slot, column) in row.iter_mut().zip(columns) {
                *slot = column[i];
            }
            // SAFETY: see `eval`
            results.push(unsafe { (self.entry)(row.as_ptr()) });
        }
        Ok(results)
    }
}

impl Drop for NativeExpression {
    fn drop(&mut self) {
        if let Some(module) = self.module.take() {
            // SAFETY: `entry` cannot be called once `self` is gone
            unsafe { module.free_memory() };
        }
    }
}

/// Check that every node reachable from `id` has a native form, collecting
/// the native functions to link.
fn lowerable(ast: &Ast, id: NodeId, natives: &mut HashMap<String, fn(f64) -> f64>) -> bool {
    if !ast.state(id).possible().contains(SupportedValueType::Numeric) {
        return false;
    }
    match ast.node(id) {
        Node::Constant(value) => value.as_f64().is_some(),
        Node::Parameter(_) => true,
        Node::Unary { op, operand } => *op == UnaryOp::Negate && lowerable(ast, *operand, natives),
        Node::Binary { op, left, right } => {
            matches!(op, Op::Add | Op::Subtract | Op::Multiply | Op::Divide | Op::Power)
                && lowerable(ast, *left, natives)
                && lowerable(ast, *right, natives)
        }
        Node::Call {
            function, arguments, ..
        } => match function.as_ref().and_then(|function| function.native().map(|native| (function, native))) {
            Some((function, native)) if arguments.len() == 1 => {
                natives.insert(symbol(&function.name), native);
                lowerable(ast, arguments[0], natives)
            }
            _ => false,
        },
    }
}

fn symbol(function: &str) -> String {
    format!("formulary_{}", function)
}

struct Translator<'a, 'b> {
    ast: &'a Ast,
    module: &'a mut JITModule,
    builder: FunctionBuilder<'b>,
    values: Value,
    translated: Vec<Option<Value>>,
}

impl Translator<'_, '_> {
    fn node(&mut self, id: NodeId) -> Result<Value> {
        if let Some(value) = self.translated[id.0] {
            return Ok(value);
        }
        let value = match self.ast.node(id) {
            Node::Constant(constant) => {
                let constant = constant
                    .as_f64()
                    .ok_or_else(|| codegen("non numeric constant"))?;
                self.builder.ins().f64const(constant)
            }
            Node::Parameter(parameter) => {
                let offset = i32::try_from(parameter.0 * mem::size_of::<f64>()).map_err(codegen)?;
                self.builder
                    .ins()
                    .load(types::F64, MemFlags::trusted(), self.values, offset)
            }
            Node::Unary { operand, .. } => {
                let operand = self.node(*operand)?;
                self.builder.ins().fneg(operand)
            }
            Node::Binary { op, left, right } => {
                let (left, right) = (self.node(*left)?, self.node(*right)?);
                match op {
                    Op::Add => self.builder.ins().fadd(left, right),
                    Op::Subtract => self.builder.ins().fsub(left, right),
                    Op::Multiply => self.builder.ins().fmul(left, right),
                    Op::Divide => self.builder.ins().fdiv(left, right),
                    Op::Power => self.call(POW, &[left, right])?,
                    other => return Err(codegen(format!("operator '{}'", other.symbol()))),
                }
            }
            Node::Call { name, arguments, .. } => {
                let arguments = arguments
                    .iter()
                    .map(|argument| self.node(*argument))
                    .collect::<Result<Vec<Value>>>()?;
                self.call(&symbol(name), &arguments)?
            }
        };
        self.translated[id.0] = Some(value);
        Ok(value)
    }

    fn call(&mut self, name: &str, arguments: &[Value]) -> Result<Value> {
        let mut signature = self.module.make_signature();
        for _ in arguments {
            signature.params.push(AbiParam::new(types::F64));
        }
        signature.returns.push(AbiParam::new(types::F64));
        let callee = self
            .module
            .declare_function(name, Linkage::Import, &signature)
            .map_err(codegen)?;
        let local = self.module.declare_func_in_func(callee, self.builder.func);
        let call = self.builder.ins().call(local, arguments);
        Ok(self.builder.inst_results(call)[0])
    }
}

#[cfg(test)]
mod tests {
    use crate::service::ExpressionParsingService;
    use crate::value::Value;

    #[test]
    fn arithmetic_matches_the_interpreter() {
        let service = ExpressionParsingService::new();
        let expression = service.interpret("(a + b * 3) / (2 + 3) - c ^ 2").unwrap();
        let native = expression.compile_native().unwrap();
        assert_eq!(native.parameter_count(), 3);
        let interpreted = expression
            .compute_positional(&[Value::from(31.0), Value::from(11.0), Value::from(2.0)])
            .unwrap();
        assert_eq!(Value::from(native.eval(&[31.0, 11.0, 2.0]).unwrap()), interpreted);
    }

    #[test]
    fn native_functions_are_linked() {
        let service = ExpressionParsingService::new();
        let expression = service.interpret("sqrt(x) + -x").unwrap();
        let native = expression.compile_native().unwrap();
        assert_eq!(native.eval(&[16.0]).unwrap(), -12.0);
        assert_eq!(
            native.eval_columns(&[&[1.0, 4.0, 9.0]], 3).unwrap(),
            vec![0.0, -2.0, -6.0]
        );
        assert!(native.eval(&[]).is_err());
        assert!(native.eval_columns(&[&[1.0]], 2).is_err());
    }

    #[test]
    fn other_expressions_stay_interpreted() {
        let service = ExpressionParsingService::new();
        for text in &["x > 1", "x % 2", "\"a\" + x", "max(x, 2)"] {
            let expression = service.interpret(text).unwrap();
            assert!(expression.compile_native().is_none(), "{}", text);
        }
    }
}

//! Closure generation.
//!
//! Every node reachable from the root is turned into a boxed closure exactly
//! once. Closures of shared sub-trees are shared too, so an expression such as
//! `(a+1)*(a+1)` compiles `a+1` a single time.

use crate::ast::{Ast, Node, NodeId};
use crate::error::{Error, Result};
use crate::format::Formatters;
use crate::operations::{self, OperatorContext};
use crate::token::Op;
use crate::tolerance::Tolerance;
use crate::value::Value;
use std::sync::Arc;

/// Everything a compiled expression reads during one evaluation
pub(crate) struct Frame<'a> {
    /// Bound parameter values, indexed by parameter id
    pub values: &'a [Value],
    pub tolerance: Option<&'a Tolerance>,
    pub formatters: &'a Formatters,
}

impl Frame<'_> {
    fn context(&self) -> OperatorContext<'_> {
        OperatorContext {
            tolerance: self.tolerance,
            formatters: self.formatters,
        }
    }
}

pub(crate) type Compiled = Arc<dyn Fn(&Frame) -> Result<Value> + Send + Sync>;

/// Compile the tree rooted at the root of `ast`
pub(crate) fn compile(ast: &Ast) -> Result<Compiled> {
    let mut compiler = Compiler {
        ast,
        compiled: vec![None; ast.len()],
        count: 0,
    };
    let root = compiler.node(ast.root())?;
    log::debug!("compiled {} of {} nodes", compiler.count, ast.len());
    Ok(root)
}

struct Compiler<'a> {
    ast: &'a Ast,
    compiled: Vec<Option<Compiled>>,
    count: usize,
}

impl Compiler<'_> {
    fn node(&mut self, id: NodeId) -> Result<Compiled> {
        if let Some(ref compiled) = self.compiled[id.0] {
            return Ok(Arc::clone(compiled));
        }
        let compiled: Compiled = match self.ast.node(id) {
            Node::Constant(value) => {
                let value = value.clone();
                Arc::new(move |_: &Frame| Ok(value.clone()))
            }
            Node::Parameter(parameter) => {
                let index = parameter.0;
                Arc::new(move |frame: &Frame| {
                    frame
                        .values
                        .get(index)
                        .cloned()
                        .ok_or_else(|| Error::Evaluation(format!("parameter #{} is not bound", index)))
                })
            }
            Node::Unary { op, operand } => {
                let (op, operand) = (*op, self.node(*operand)?);
                Arc::new(move |frame: &Frame| operations::unary(op, operand(frame)?))
            }
            Node::Binary { op, left, right } => {
                let (op, left, right) = (*op, self.node(*left)?, self.node(*right)?);
                match op {
                    Op::And => Arc::new(move |frame: &Frame| {
                        let left = left(frame)?;
                        if left == Value::Boolean(false) {
                            return Ok(left);
                        }
                        operations::binary(op, left, right(frame)?, frame.context())
                    }),
                    Op::Or => Arc::new(move |frame: &Frame| {
                        let left = left(frame)?;
                        if left == Value::Boolean(true) {
                            return Ok(left);
                        }
                        operations::binary(op, left, right(frame)?, frame.context())
                    }),
                    _ => Arc::new(move |frame: &Frame| {
                        operations::binary(op, left(frame)?, right(frame)?, frame.context())
                    }),
                }
            }
            Node::Call {
                name,
                function,
                arguments,
            } => {
                let function = function.clone().ok_or_else(|| {
                    Error::FunctionCallNotValidLogically(format!("no overload selected for '{}'", name))
                })?;
                let arguments = arguments
                    .iter()
                    .map(|argument| self.node(*argument))
                    .collect::<Result<Vec<Compiled>>>()?;
                Arc::new(move |frame: &Frame| {
                    let values = arguments
                        .iter()
                        .map(|argument| argument(frame))
                        .collect::<Result<Vec<Value>>>()?;
                    function.call(values)
                })
            }
        };
        self.count += 1;
        self.compiled[id.0] = Some(Arc::clone(&compiled));
        Ok(compiled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::ParamId;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn run(ast: &Ast, values: &[Value], tolerance: Option<&Tolerance>) -> Result<Value> {
        let formatters = Formatters::default();
        let frame = Frame {
            values,
            tolerance,
            formatters: &formatters,
        };
        compile(ast)?(&frame)
    }

    #[test]
    fn evaluates_parameters() {
        let mut ast = Ast::default();
        let x = ast.push(Node::Parameter(ParamId(0)));
        let one = ast.push(Node::Constant(Value::from(1)));
        let root = ast.push(Node::Binary {
            op: Op::Add,
            left: x,
            right: one,
        });
        ast.set_root(root);
        assert_eq!(run(&ast, &[Value::from(5)], None), Ok(Value::from(6)));
        assert_eq!(run(&ast, &[Value::from(0.5)], None), Ok(Value::from(1.5)));
    }

    #[test]
    fn comparisons_read_the_tolerance() {
        let mut ast = Ast::default();
        let five = ast.push(Node::Constant(Value::from(5)));
        let six = ast.push(Node::Constant(Value::from(6)));
        let root = ast.push(Node::Binary {
            op: Op::GreaterThanOrEqual,
            left: five,
            right: six,
        });
        ast.set_root(root);
        assert_eq!(run(&ast, &[], None), Ok(Value::from(false)));
        assert_eq!(
            run(&ast, &[], Some(&Tolerance::range(-1.0, 1.0))),
            Ok(Value::from(true))
        );
    }

    #[test]
    fn logical_operators_short_circuit() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let tracked = crate::functions::FunctionDescriptor::new(
            "tracked",
            vec![],
            crate::functions::Returns::Kind(crate::value::SupportedValueType::Boolean),
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Value::from(true))
            },
        );
        let mut ast = Ast::default();
        let no = ast.push(Node::Constant(Value::from(false)));
        let call = ast.push(Node::Call {
            name: "tracked".into(),
            function: Some(Arc::new(tracked)),
            arguments: vec![],
        });
        let root = ast.push(Node::Binary {
            op: Op::And,
            left: no,
            right: call,
        });
        ast.set_root(root);
        assert_eq!(run(&ast, &[], None), Ok(Value::from(false)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unresolved_calls_do_not_compile() {
        let mut ast = Ast::default();
        let root = ast.push(Node::Call {
            name: "f".into(),
            function: None,
            arguments: vec![],
        });
        ast.set_root(root);
        assert!(matches!(compile(&ast), Err(Error::FunctionCallNotValidLogically(_))));
    }
}

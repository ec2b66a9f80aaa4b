use crate::format::Formatters;
use crate::functions::FunctionDescriptor;
use crate::operations::{self, OperatorContext};
use crate::parameters::ParamId;
use crate::token::{Op, UnaryOp};
use crate::types::TypeState;
use crate::value::{SupportedValueType, Value};
use std::sync::Arc;

/// Index of a node in its [`Ast`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

/// Ast nodes for the expressions
#[derive(Debug, Clone)]
pub enum Node {
    /// A constant value
    Constant(Value),
    /// A parameter, to be bound at evaluation
    Parameter(ParamId),
    /// <op> <operand>
    #[allow(missing_docs)]
    Unary { op: UnaryOp, operand: NodeId },
    /// <left> <op> <right>
    #[allow(missing_docs)]
    Binary { op: Op, left: NodeId, right: NodeId },
    /// name(<arguments>), the overload being picked during type resolution
    Call {
        /// The name as written
        name: String,
        /// The selected overload, `None` until types are resolved
        function: Option<Arc<FunctionDescriptor>>,
        /// One node per argument
        arguments: Vec<NodeId>,
    },
}

impl Node {
    /// The nodes this node reads
    pub fn children(&self) -> Vec<NodeId> {
        match self {
            Self::Constant(_) | Self::Parameter(_) => Vec::new(),
            Self::Unary { operand, .. } => vec![*operand],
            Self::Binary { left, right, .. } => vec![*left, *right],
            Self::Call { arguments, .. } => arguments.clone(),
        }
    }

    /// If the node is a constant, get `Some(constant)`. Else, get `None`
    pub fn value(&self) -> Option<&Value> {
        if let Self::Constant(ref value) = *self {
            Some(value)
        } else {
            None
        }
    }
}

/// An arena of nodes. Children always have a lower id than their parents, so
/// a forward walk over the arena visits operands before the nodes using them.
#[derive(Debug, Clone)]
pub struct Ast {
    nodes: Vec<Node>,
    types: Vec<TypeState>,
    root: NodeId,
}

impl Default for Ast {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            types: Vec::new(),
            root: NodeId(0),
        }
    }
}

impl Ast {
    pub(crate) fn push(&mut self, node: Node) -> NodeId {
        let state = match node {
            Node::Constant(ref value) => TypeState::Strong(value.value_type()),
            _ => TypeState::Unknown,
        };
        self.nodes.push(node);
        self.types.push(state);
        NodeId(self.nodes.len() - 1)
    }

    pub(crate) fn set_root(&mut self, root: NodeId) {
        self.root = root;
    }

    /// The node producing the value of the whole expression
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// The node stored at `id`
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    /// Number of nodes, folded ones included
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the tree holds no node
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Every node id, children before their parents
    pub fn ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len()).map(NodeId)
    }

    /// The type state of `id`
    pub fn state(&self, id: NodeId) -> TypeState {
        self.types[id.0]
    }

    pub(crate) fn set_state(&mut self, id: NodeId, state: TypeState) {
        self.types[id.0] = state;
    }

    /// The type of the value produced by `id`
    pub fn value_type(&self, id: NodeId) -> SupportedValueType {
        self.types[id.0].value_type()
    }

    /// The value of the whole expression, when it is a constant
    pub fn value(&self) -> Option<&Value> {
        self.node(self.root).value()
    }

    /// Check if any node reachable from the root is a parameter
    pub fn has_parameters(&self) -> bool {
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            match self.node(id) {
                Node::Parameter(_) => return true,
                node => stack.extend(node.children()),
            }
        }
        false
    }

    /// Fold every node whose operands are all constants into a constant.
    ///
    /// Numeric comparisons are kept, since their result depends on the
    /// tolerance given at evaluation. Impure functions are kept too. A node
    /// whose evaluation fails is left alone, so the failure is reported when
    /// the expression is computed.
    pub fn simplify(&mut self, formatters: &Formatters) {
        let context = OperatorContext {
            tolerance: None,
            formatters,
        };
        for index in 0..self.nodes.len() {
            self.fold(NodeId(index), context);
        }
    }

    /// Fold `id` into a constant when its operands already are constants
    pub(crate) fn fold(&mut self, id: NodeId, context: OperatorContext) {
        let index = id.0;
        let folded = match &self.nodes[index] {
            Node::Constant(_) | Node::Parameter(_) => return,
            Node::Unary { op, operand } => match self.nodes[operand.0].value() {
                Some(value) => operations::unary(*op, value.clone()),
                None => return,
            },
            Node::Binary { op, left, right } => {
                match (self.nodes[left.0].value(), self.nodes[right.0].value()) {
                    (Some(Value::Numeric(_)), Some(Value::Numeric(_))) if op.is_comparison() => return,
                    (Some(l), Some(r)) => operations::binary(*op, l.clone(), r.clone(), context),
                    _ => return,
                }
            }
            Node::Call {
                function: Some(function),
                arguments,
                ..
            } if function.pure => {
                let values: Option<Vec<Value>> = arguments
                    .iter()
                    .map(|argument| self.nodes[argument.0].value().cloned())
                    .collect();
                match values {
                    Some(values) => function.call(values),
                    None => return,
                }
            }
            Node::Call { .. } => return,
        };
        match folded {
            Ok(value) => {
                log::trace!("folded node {} to {}", index, value);
                self.types[index] = TypeState::Strong(value.value_type());
                self.nodes[index] = Node::Constant(value);
            }
            Err(error) => log::debug!("node {} left unfolded: {}", index, error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Ast, Node};
    use crate::format::Formatters;
    use crate::functions::{FunctionLibrary, BUILTIN_FUNCTIONS};
    use crate::parameters::ParamId;
    use crate::token::Op;
    use crate::value::Value;

    fn binary(ast: &mut Ast, op: Op, left: Node, right: Node) -> super::NodeId {
        let left = ast.push(left);
        let right = ast.push(right);
        ast.push(Node::Binary { op, left, right })
    }

    #[test]
    // Verifies that we have reduced the input to a single value when possible
    fn simplify() {
        let mut ast = Ast::default();
        let sum = binary(&mut ast, Op::Add, Node::Constant(Value::from(3)), Node::Constant(Value::from(5)));
        let two = ast.push(Node::Constant(Value::from(2)));
        let root = ast.push(Node::Binary {
            op: Op::Power,
            left: sum,
            right: two,
        });
        ast.set_root(root);
        ast.simplify(&Formatters::default());
        assert_eq!(ast.value(), Some(&Value::from(64)));
        assert!(!ast.has_parameters());
    }

    #[test]
    fn keeps_parameters_and_numeric_comparisons() {
        let mut ast = Ast::default();
        let root = binary(
            &mut ast,
            Op::Multiply,
            Node::Parameter(ParamId(0)),
            Node::Constant(Value::from(2)),
        );
        ast.set_root(root);
        ast.simplify(&Formatters::default());
        assert!(ast.value().is_none());
        assert!(ast.has_parameters());

        let mut ast = Ast::default();
        let root = binary(
            &mut ast,
            Op::GreaterThan,
            Node::Constant(Value::from(2)),
            Node::Constant(Value::from(1)),
        );
        ast.set_root(root);
        ast.simplify(&Formatters::default());
        assert!(ast.value().is_none());
    }

    #[test]
    fn folds_pure_calls_only() {
        let library = FunctionLibrary::new(std::iter::once(&*BUILTIN_FUNCTIONS));
        let sqrt = library.select("sqrt", &[]).err();
        assert!(sqrt.is_some());

        let mut ast = Ast::default();
        let nine = ast.push(Node::Constant(Value::from(9.0)));
        let function = library
            .select(
                "sqrt",
                &[crate::functions::ArgumentInfo {
                    state: ast.state(nine),
                    constant: ast.node(nine).value().and_then(Value::as_number),
                }],
            )
            .unwrap();
        let root = ast.push(Node::Call {
            name: "sqrt".into(),
            function: Some(function),
            arguments: vec![nine],
        });
        ast.set_root(root);
        ast.simplify(&Formatters::default());
        assert_eq!(ast.value(), Some(&Value::from(3.0)));

        let mut ast = Ast::default();
        let random = library.select("random", &[]).unwrap();
        let root = ast.push(Node::Call {
            name: "random".into(),
            function: Some(random),
            arguments: Vec::new(),
        });
        ast.set_root(root);
        ast.simplify(&Formatters::default());
        assert!(ast.value().is_none());
    }
}

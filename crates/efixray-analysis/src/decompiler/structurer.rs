//! Structured control flow of a decompiled function body.
//!
//! The host decompiler hands over an already structured tree; this module
//! models it and provides a pre-order walk over every expression in it.

use super::expression::Expr;

/// Identifier of a basic block in the host's control flow graph.
pub type BlockId = u64;

/// A structured control flow node.
#[derive(Debug, Clone, PartialEq)]
pub enum StructuredNode {
    /// A basic block (sequence of statements).
    Block {
        id: BlockId,
        statements: Vec<Expr>,
        address_range: (u64, u64),
    },

    /// If statement (with optional else).
    If {
        condition: Expr,
        then_body: Vec<StructuredNode>,
        else_body: Option<Vec<StructuredNode>>,
    },

    /// While loop.
    While {
        condition: Expr,
        body: Vec<StructuredNode>,
    },

    /// Do-while loop.
    DoWhile {
        body: Vec<StructuredNode>,
        condition: Expr,
    },

    /// For loop.
    For {
        init: Option<Expr>,
        condition: Expr,
        update: Option<Expr>,
        body: Vec<StructuredNode>,
    },

    /// Infinite loop.
    Loop { body: Vec<StructuredNode> },

    /// Break statement.
    Break,

    /// Continue statement.
    Continue,

    /// Return statement.
    Return(Option<Expr>),

    /// Goto (for irreducible control flow).
    Goto(BlockId),

    /// Label (target of goto).
    Label(BlockId),

    /// Switch statement.
    Switch {
        value: Expr,
        cases: Vec<(Vec<i128>, Vec<StructuredNode>)>,
        default: Option<Vec<StructuredNode>>,
    },

    /// Sequence of nodes.
    Sequence(Vec<StructuredNode>),

    /// Raw expression/statement.
    Expr(Expr),
}

impl StructuredNode {
    /// Creates a block holding `statements`.
    pub fn block(id: BlockId, statements: Vec<Expr>) -> Self {
        StructuredNode::Block {
            id,
            statements,
            address_range: (0, 0),
        }
    }
}

/// Visits every expression under `nodes` in pre-order, depth first.
///
/// Each expression node is visited exactly once: a statement before its
/// sub-expressions, and conditions before the bodies they guard.
pub fn walk_exprs<'a>(nodes: &'a [StructuredNode], visit: &mut impl FnMut(&'a Expr)) {
    for node in nodes {
        walk_node(node, visit);
    }
}

fn walk_node<'a>(node: &'a StructuredNode, visit: &mut impl FnMut(&'a Expr)) {
    match node {
        StructuredNode::Block { statements, .. } => {
            for stmt in statements {
                walk_expr(stmt, visit);
            }
        }
        StructuredNode::If {
            condition,
            then_body,
            else_body,
        } => {
            walk_expr(condition, visit);
            walk_exprs(then_body, visit);
            if let Some(else_body) = else_body {
                walk_exprs(else_body, visit);
            }
        }
        StructuredNode::While { condition, body } => {
            walk_expr(condition, visit);
            walk_exprs(body, visit);
        }
        StructuredNode::DoWhile { body, condition } => {
            walk_exprs(body, visit);
            walk_expr(condition, visit);
        }
        StructuredNode::For {
            init,
            condition,
            update,
            body,
        } => {
            if let Some(init) = init {
                walk_expr(init, visit);
            }
            walk_expr(condition, visit);
            walk_exprs(body, visit);
            if let Some(update) = update {
                walk_expr(update, visit);
            }
        }
        StructuredNode::Loop { body } | StructuredNode::Sequence(body) => walk_exprs(body, visit),
        StructuredNode::Return(Some(expr)) | StructuredNode::Expr(expr) => walk_expr(expr, visit),
        StructuredNode::Switch {
            value,
            cases,
            default,
        } => {
            walk_expr(value, visit);
            for (_, body) in cases {
                walk_exprs(body, visit);
            }
            if let Some(default) = default {
                walk_exprs(default, visit);
            }
        }
        StructuredNode::Return(None)
        | StructuredNode::Break
        | StructuredNode::Continue
        | StructuredNode::Goto(_)
        | StructuredNode::Label(_) => {}
    }
}

fn walk_expr<'a>(root: &'a Expr, visit: &mut impl FnMut(&'a Expr)) {
    let mut stack = vec![root];
    while let Some(expr) = stack.pop() {
        visit(expr);
        stack.extend(expr.children().into_iter().rev());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decompiler::expression::{BinOpKind, CallTarget, ExprKind, Variable};

    fn x() -> Expr {
        Expr::var(Variable::stack(-8, 8).named("x"))
    }

    fn render(nodes: &[StructuredNode]) -> Vec<String> {
        let mut seen = Vec::new();
        walk_exprs(nodes, &mut |e| seen.push(e.to_string()));
        seen
    }

    #[test]
    fn test_pre_order() {
        let body = vec![StructuredNode::Expr(Expr::assign(
            x(),
            Expr::binop(BinOpKind::Add, Expr::int(1), Expr::int(2)),
        ))];
        assert_eq!(render(&body), vec!["x = 1 + 2", "x", "1 + 2", "1", "2"]);
    }

    #[test]
    fn test_conditions_before_bodies() {
        let body = vec![StructuredNode::If {
            condition: x(),
            then_body: vec![StructuredNode::block(0, vec![Expr::int(1)])],
            else_body: Some(vec![StructuredNode::Return(Some(Expr::int(2)))]),
        }];
        assert_eq!(render(&body), vec!["x", "1", "2"]);
    }

    #[test]
    fn test_nested_calls_each_visited_once() {
        let inner = Expr::call(CallTarget::Named("inner".into()), vec![]);
        let outer = Expr::call(CallTarget::Named("outer".into()), vec![inner]);
        let body = vec![StructuredNode::While {
            condition: Expr::int(1),
            body: vec![StructuredNode::Sequence(vec![StructuredNode::Expr(outer)])],
        }];

        let mut calls = 0;
        walk_exprs(&body, &mut |e| {
            if matches!(e.kind, ExprKind::Call { .. }) {
                calls += 1;
            }
        });
        assert_eq!(calls, 2);
    }
}

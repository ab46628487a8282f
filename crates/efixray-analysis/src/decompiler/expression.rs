//! Expression representation for decompiled code.
//!
//! Expressions are produced by the host decompiler; this module only models
//! them, renders them as C-like text and folds constants.

use efixray_types::CType;
use std::fmt;

/// A high-level expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
}

/// The kind of expression.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// A variable (register, stack slot, global).
    Var(Variable),

    /// An integer literal.
    IntLit(i128),

    /// Binary operation: left op right.
    BinOp {
        op: BinOpKind,
        left: Box<Expr>,
        right: Box<Expr>,
    },

    /// Unary operation: op expr.
    UnaryOp {
        op: UnaryOpKind,
        operand: Box<Expr>,
    },

    /// Memory dereference: *expr.
    Deref {
        addr: Box<Expr>,
        size: u8,
    },

    /// RIP-relative data reference with computed absolute address.
    GotRef {
        /// The computed absolute address (rip + inst_size + displacement).
        address: u64,
        /// The address of the instruction that created this reference.
        instruction_address: u64,
        /// Size of the dereference in bytes (0 for address-of/LEA).
        size: u8,
        /// The original expression for display if resolution fails.
        display_expr: Box<Expr>,
        /// True if this is a dereference (MOV), false if address-of (LEA).
        is_deref: bool,
    },

    /// Address-of: &expr.
    AddressOf(Box<Expr>),

    /// Member load through a pointer: base->field.
    FieldAccess {
        base: Box<Expr>,
        field_name: String,
        offset: usize,
    },

    /// Function call: func(args...).
    Call {
        target: CallTarget,
        args: Vec<Expr>,
        /// Address of the call instruction, when the host knows it.
        address: Option<u64>,
    },

    /// Assignment: lhs = rhs.
    Assign {
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },

    /// Conditional expression: cond ? then : else.
    Conditional {
        cond: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },

    /// Cast expression: (type)expr.
    Cast {
        expr: Box<Expr>,
        to: CType,
    },

    /// Unknown/unanalyzed expression.
    Unknown(String),
}

/// Binary operation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOpKind {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,

    // Bitwise
    And,
    Or,
    Xor,
    Shl,
    Shr,

    // Comparison
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,

    // Logical
    LogicalAnd,
    LogicalOr,
}

impl BinOpKind {
    /// Returns the operator string for display.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::And => "&",
            Self::Or => "|",
            Self::Xor => "^",
            Self::Shl => "<<",
            Self::Shr => ">>",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::LogicalAnd => "&&",
            Self::LogicalOr => "||",
        }
    }
}

/// Unary operation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOpKind {
    Neg,        // -x
    Not,        // ~x (bitwise)
    LogicalNot, // !x
}

impl UnaryOpKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Neg => "-",
            Self::Not => "~",
            Self::LogicalNot => "!",
        }
    }
}

/// Call target.
#[derive(Debug, Clone, PartialEq)]
pub enum CallTarget {
    /// Direct call to address.
    Direct(u64),
    /// Direct call to named function.
    Named(String),
    /// Indirect call through expression.
    Indirect(Box<Expr>),
}

/// A variable (abstraction over registers, stack slots, globals).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Variable {
    pub kind: VarKind,
    pub name: String,
    pub size: u8,
}

/// Variable kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VarKind {
    /// Register variable.
    Register(u16),
    /// Stack variable at offset from frame pointer.
    Stack(i64),
    /// Global variable at address.
    Global(u64),
    /// Function argument.
    Arg(u8),
    /// Temporary variable.
    Temp(u32),
}

impl Variable {
    /// Creates a register variable.
    pub fn register(id: u16, name: impl Into<String>, size: u8) -> Self {
        Self {
            kind: VarKind::Register(id),
            name: name.into(),
            size,
        }
    }

    /// Creates a stack variable.
    pub fn stack(offset: i64, size: u8) -> Self {
        let name = if offset < 0 {
            format!("var_{:x}", -offset)
        } else {
            format!("arg_{:x}", offset)
        };
        Self {
            kind: VarKind::Stack(offset),
            name,
            size,
        }
    }

    /// Creates a global variable.
    pub fn global(addr: u64, size: u8) -> Self {
        Self {
            kind: VarKind::Global(addr),
            name: format!("g_{:x}", addr),
            size,
        }
    }

    /// Renames the variable, keeping its storage.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl Expr {
    /// Creates a variable expression.
    pub fn var(v: Variable) -> Self {
        Self { kind: ExprKind::Var(v) }
    }

    /// Creates an integer literal.
    pub fn int(value: i128) -> Self {
        Self { kind: ExprKind::IntLit(value) }
    }

    /// Creates a binary operation.
    pub fn binop(op: BinOpKind, left: Expr, right: Expr) -> Self {
        Self {
            kind: ExprKind::BinOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
        }
    }

    /// Creates a unary operation.
    pub fn unary(op: UnaryOpKind, operand: Expr) -> Self {
        Self {
            kind: ExprKind::UnaryOp {
                op,
                operand: Box::new(operand),
            },
        }
    }

    /// Creates an assignment.
    pub fn assign(lhs: Expr, rhs: Expr) -> Self {
        Self {
            kind: ExprKind::Assign {
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
        }
    }

    /// Creates a memory dereference.
    pub fn deref(addr: Expr, size: u8) -> Self {
        Self {
            kind: ExprKind::Deref {
                addr: Box::new(addr),
                size,
            },
        }
    }

    /// Creates a RIP-relative address reference (LEA, not a load).
    pub fn got_addr(address: u64, instruction_address: u64, display_expr: Expr) -> Self {
        Self {
            kind: ExprKind::GotRef {
                address,
                instruction_address,
                size: 0,
                display_expr: Box::new(display_expr),
                is_deref: false,
            },
        }
    }

    /// Creates a RIP-relative load.
    pub fn got_ref(address: u64, instruction_address: u64, size: u8, display_expr: Expr) -> Self {
        Self {
            kind: ExprKind::GotRef {
                address,
                instruction_address,
                size,
                display_expr: Box::new(display_expr),
                is_deref: true,
            },
        }
    }

    /// Creates an address-of expression.
    pub fn address_of(inner: Expr) -> Self {
        Self {
            kind: ExprKind::AddressOf(Box::new(inner)),
        }
    }

    /// Creates a member load `base->field_name`.
    pub fn field(base: Expr, field_name: impl Into<String>, offset: usize) -> Self {
        Self {
            kind: ExprKind::FieldAccess {
                base: Box::new(base),
                field_name: field_name.into(),
                offset,
            },
        }
    }

    /// Creates a call expression.
    pub fn call(target: CallTarget, args: Vec<Expr>) -> Self {
        Self {
            kind: ExprKind::Call {
                target,
                args,
                address: None,
            },
        }
    }

    /// Creates a call expression tagged with its instruction address.
    pub fn call_at(address: u64, target: CallTarget, args: Vec<Expr>) -> Self {
        Self {
            kind: ExprKind::Call {
                target,
                args,
                address: Some(address),
            },
        }
    }

    /// Creates a cast.
    pub fn cast(expr: Expr, to: CType) -> Self {
        Self {
            kind: ExprKind::Cast {
                expr: Box::new(expr),
                to,
            },
        }
    }

    /// Creates an unknown expression.
    pub fn unknown(desc: impl Into<String>) -> Self {
        Self { kind: ExprKind::Unknown(desc.into()) }
    }

    /// Strips any number of casts.
    pub fn strip_casts(&self) -> &Expr {
        let mut current = self;
        while let ExprKind::Cast { expr, .. } = &current.kind {
            current = expr;
        }
        current
    }

    /// Direct sub-expressions, in evaluation order.
    pub fn children(&self) -> Vec<&Expr> {
        match &self.kind {
            ExprKind::Var(_) | ExprKind::IntLit(_) | ExprKind::Unknown(_) => Vec::new(),
            ExprKind::BinOp { left, right, .. } => vec![left, right],
            ExprKind::UnaryOp { operand, .. } => vec![operand],
            ExprKind::Deref { addr, .. } => vec![addr],
            ExprKind::GotRef { display_expr, .. } => vec![display_expr],
            ExprKind::AddressOf(inner) => vec![inner],
            ExprKind::FieldAccess { base, .. } => vec![base],
            ExprKind::Call { target, args, .. } => {
                let mut out: Vec<&Expr> = Vec::with_capacity(args.len() + 1);
                if let CallTarget::Indirect(t) = target {
                    out.push(t);
                }
                out.extend(args.iter());
                out
            }
            ExprKind::Assign { lhs, rhs } => vec![lhs, rhs],
            ExprKind::Conditional {
                cond,
                then_expr,
                else_expr,
            } => vec![cond, then_expr, else_expr],
            ExprKind::Cast { expr, .. } => vec![expr],
        }
    }

    /// Evaluates this expression as a constant data address.
    ///
    /// Accepts `&global`, RIP-relative address-of references, non-negative
    /// integer literals and sums/differences of those. Casts are looked
    /// through. Anything that depends on runtime state yields None.
    pub fn constant_address(&self) -> Option<u64> {
        match &self.strip_casts().kind {
            ExprKind::AddressOf(inner) => match &inner.strip_casts().kind {
                ExprKind::Var(Variable {
                    kind: VarKind::Global(addr),
                    ..
                }) => Some(*addr),
                // &*(T*)addr
                ExprKind::GotRef {
                    address,
                    is_deref: true,
                    ..
                } => Some(*address),
                _ => None,
            },
            ExprKind::GotRef {
                address,
                is_deref: false,
                ..
            } => Some(*address),
            ExprKind::IntLit(n) => u64::try_from(*n).ok(),
            ExprKind::BinOp { op, left, right } => {
                let l = left.constant_address()?;
                let r = right.constant_address()?;
                match op {
                    BinOpKind::Add => Some(l.wrapping_add(r)),
                    BinOpKind::Sub => Some(l.wrapping_sub(r)),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    /// Simplifies an expression by performing constant folding and algebraic simplifications.
    ///
    /// This includes:
    /// - Constant folding: `5 + 3` → `8`
    /// - Identity elimination: `x + 0` → `x`, `x * 1` → `x`
    /// - Zero multiplication: `x * 0` → `0`
    /// - Double negation: `--x` → `x`, `~~x` → `x`
    pub fn simplify(self) -> Self {
        match self.kind {
            ExprKind::BinOp { op, left, right } => {
                let left = left.simplify();
                let right = right.simplify();

                if let (ExprKind::IntLit(l), ExprKind::IntLit(r)) = (&left.kind, &right.kind) {
                    if let Some(result) = fold_binary_constants(op, *l, *r) {
                        return Self::int(result);
                    }
                }

                match op {
                    BinOpKind::Add | BinOpKind::Or | BinOpKind::Xor => {
                        if matches!(right.kind, ExprKind::IntLit(0)) {
                            return left;
                        }
                        if matches!(left.kind, ExprKind::IntLit(0)) {
                            return right;
                        }
                    }
                    BinOpKind::Sub | BinOpKind::Shl | BinOpKind::Shr => {
                        if matches!(right.kind, ExprKind::IntLit(0)) {
                            return left;
                        }
                        // x - x = 0
                        if op == BinOpKind::Sub && exprs_structurally_equal(&left, &right) {
                            return Self::int(0);
                        }
                    }
                    BinOpKind::Mul => {
                        if matches!(right.kind, ExprKind::IntLit(0))
                            || matches!(left.kind, ExprKind::IntLit(0))
                        {
                            return Self::int(0);
                        }
                        if matches!(right.kind, ExprKind::IntLit(1)) {
                            return left;
                        }
                        if matches!(left.kind, ExprKind::IntLit(1)) {
                            return right;
                        }
                    }
                    BinOpKind::Div => {
                        if matches!(right.kind, ExprKind::IntLit(1)) {
                            return left;
                        }
                    }
                    BinOpKind::And => {
                        if matches!(right.kind, ExprKind::IntLit(0))
                            || matches!(left.kind, ExprKind::IntLit(0))
                        {
                            return Self::int(0);
                        }
                    }
                    _ => {}
                }

                Self::binop(op, left, right)
            }
            ExprKind::UnaryOp { op, operand } => {
                let operand = operand.simplify();

                if let ExprKind::IntLit(n) = operand.kind {
                    return Self::int(match op {
                        UnaryOpKind::Neg => n.wrapping_neg(),
                        UnaryOpKind::Not => !n,
                        UnaryOpKind::LogicalNot => i128::from(n == 0),
                    });
                }

                if let ExprKind::UnaryOp {
                    op: inner_op,
                    operand: inner,
                } = operand.kind
                {
                    // !!x is a boolean, not x
                    if inner_op == op && op != UnaryOpKind::LogicalNot {
                        return *inner;
                    }
                    return Self::unary(op, Self::unary(inner_op, *inner));
                }

                Self::unary(op, operand)
            }
            ExprKind::Assign { lhs, rhs } => Self::assign(lhs.simplify(), rhs.simplify()),
            ExprKind::Deref { addr, size } => Self::deref(addr.simplify(), size),
            ExprKind::AddressOf(inner) => Self::address_of(inner.simplify()),
            ExprKind::Cast { expr, to } => Self::cast(expr.simplify(), to),
            ExprKind::FieldAccess {
                base,
                field_name,
                offset,
            } => Self::field(base.simplify(), field_name, offset),
            ExprKind::Call {
                target,
                args,
                address,
            } => Self {
                kind: ExprKind::Call {
                    target,
                    args: args.into_iter().map(Expr::simplify).collect(),
                    address,
                },
            },
            // Other expression kinds pass through unchanged
            kind => Self { kind },
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::Var(v) => write!(f, "{}", v.name),
            ExprKind::IntLit(n) => {
                if *n >= 0 && *n < 10 {
                    write!(f, "{}", n)
                } else if *n < 0 {
                    write!(f, "-{:#x}", n.unsigned_abs())
                } else {
                    write!(f, "{:#x}", n)
                }
            }
            ExprKind::BinOp { op, left, right } => {
                write!(f, "{} {} {}", left, op.as_str(), right)
            }
            ExprKind::UnaryOp { op, operand } => {
                write!(f, "{}{}", op.as_str(), operand)
            }
            ExprKind::Deref { addr, size } => {
                write!(f, "{}({})", deref_prefix(*size), addr)
            }
            ExprKind::GotRef {
                display_expr,
                size,
                is_deref,
                ..
            } => {
                if *is_deref {
                    write!(f, "{}({})", deref_prefix(*size), display_expr)
                } else {
                    write!(f, "{}", display_expr)
                }
            }
            ExprKind::AddressOf(e) => write!(f, "&{}", e),
            ExprKind::FieldAccess {
                base, field_name, ..
            } => write!(f, "{}->{}", base, field_name),
            ExprKind::Call { target, args, .. } => {
                match target {
                    CallTarget::Direct(addr) => write!(f, "sub_{:x}", addr)?,
                    CallTarget::Named(name) => write!(f, "{}", name)?,
                    CallTarget::Indirect(e) => write!(f, "({})", e)?,
                }
                write!(f, "(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            ExprKind::Assign { lhs, rhs } => write!(f, "{} = {}", lhs, rhs),
            ExprKind::Conditional {
                cond,
                then_expr,
                else_expr,
            } => {
                write!(f, "{} ? {} : {}", cond, then_expr, else_expr)
            }
            ExprKind::Cast { expr, to } => write!(f, "({}){}", to.to_c_string(None), expr),
            ExprKind::Unknown(s) => write!(f, "{}", s),
        }
    }
}

fn deref_prefix(size: u8) -> &'static str {
    match size {
        1 => "*(uint8_t*)",
        2 => "*(uint16_t*)",
        4 => "*(uint32_t*)",
        8 => "*(uint64_t*)",
        _ => "*",
    }
}

/// Performs constant folding for binary operations.
/// Returns Some(result) if both operands are constants, None otherwise.
fn fold_binary_constants(op: BinOpKind, left: i128, right: i128) -> Option<i128> {
    match op {
        BinOpKind::Add => Some(left.wrapping_add(right)),
        BinOpKind::Sub => Some(left.wrapping_sub(right)),
        BinOpKind::Mul => Some(left.wrapping_mul(right)),
        BinOpKind::Div => left.checked_div(right),
        BinOpKind::Mod => left.checked_rem(right),
        BinOpKind::And => Some(left & right),
        BinOpKind::Or => Some(left | right),
        BinOpKind::Xor => Some(left ^ right),
        BinOpKind::Shl => u32::try_from(right).ok().and_then(|r| left.checked_shl(r)),
        BinOpKind::Shr => u32::try_from(right).ok().and_then(|r| left.checked_shr(r)),
        // Comparison operators return 0 or 1
        BinOpKind::Eq => Some(i128::from(left == right)),
        BinOpKind::Ne => Some(i128::from(left != right)),
        BinOpKind::Lt => Some(i128::from(left < right)),
        BinOpKind::Le => Some(i128::from(left <= right)),
        BinOpKind::Gt => Some(i128::from(left > right)),
        BinOpKind::Ge => Some(i128::from(left >= right)),
        BinOpKind::LogicalAnd => Some(i128::from(left != 0 && right != 0)),
        BinOpKind::LogicalOr => Some(i128::from(left != 0 || right != 0)),
    }
}

/// Checks if two expressions are structurally equal.
/// Used for simplifications like `x - x = 0`.
fn exprs_structurally_equal(left: &Expr, right: &Expr) -> bool {
    match (&left.kind, &right.kind) {
        (ExprKind::Var(v1), ExprKind::Var(v2)) => v1 == v2,
        (ExprKind::IntLit(n1), ExprKind::IntLit(n2)) => n1 == n2,
        (
            ExprKind::BinOp {
                op: op1,
                left: l1,
                right: r1,
            },
            ExprKind::BinOp {
                op: op2,
                left: l2,
                right: r2,
            },
        ) => op1 == op2 && exprs_structurally_equal(l1, l2) && exprs_structurally_equal(r1, r2),
        (
            ExprKind::Deref { addr: a1, size: s1 },
            ExprKind::Deref { addr: a2, size: s2 },
        ) => s1 == s2 && exprs_structurally_equal(a1, a2),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rcx() -> Expr {
        Expr::var(Variable::register(1, "rcx", 8))
    }

    #[test]
    fn test_constant_folding_arithmetic() {
        let expr = Expr::binop(BinOpKind::Add, Expr::int(5), Expr::int(3));
        assert!(matches!(expr.simplify().kind, ExprKind::IntLit(8)));

        let expr = Expr::binop(BinOpKind::Mul, Expr::int(6), Expr::int(7));
        assert!(matches!(expr.simplify().kind, ExprKind::IntLit(42)));

        // Division by zero is left alone
        let expr = Expr::binop(BinOpKind::Div, Expr::int(1), Expr::int(0));
        assert!(matches!(expr.simplify().kind, ExprKind::BinOp { .. }));
    }

    #[test]
    fn test_identity_elimination() {
        let expr = Expr::binop(BinOpKind::Add, rcx(), Expr::int(0));
        assert_eq!(expr.simplify(), rcx());

        let expr = Expr::binop(BinOpKind::Mul, Expr::int(1), rcx());
        assert_eq!(expr.simplify(), rcx());

        let expr = Expr::binop(BinOpKind::Sub, rcx(), rcx());
        assert!(matches!(expr.simplify().kind, ExprKind::IntLit(0)));
    }

    #[test]
    fn test_double_negation() {
        let expr = Expr::unary(UnaryOpKind::Not, Expr::unary(UnaryOpKind::Not, rcx()));
        assert_eq!(expr.simplify(), rcx());

        let expr = Expr::unary(UnaryOpKind::Neg, Expr::int(5));
        assert!(matches!(expr.simplify().kind, ExprKind::IntLit(-5)));
    }

    #[test]
    fn test_double_logical_not_kept() {
        let expr = Expr::unary(
            UnaryOpKind::LogicalNot,
            Expr::unary(UnaryOpKind::LogicalNot, rcx()),
        );
        assert_eq!(expr.clone().simplify(), expr);

        let expr = Expr::unary(
            UnaryOpKind::LogicalNot,
            Expr::unary(UnaryOpKind::LogicalNot, Expr::int(7)),
        );
        assert!(matches!(expr.simplify().kind, ExprKind::IntLit(1)));
    }

    #[test]
    fn test_constant_address() {
        let g = Expr::address_of(Expr::var(Variable::global(0x1000, 16)));
        assert_eq!(g.constant_address(), Some(0x1000));

        let cast = Expr::cast(g.clone(), CType::ptr(CType::void()));
        assert_eq!(cast.constant_address(), Some(0x1000));

        let lea = Expr::got_addr(0x2040, 0x400, Expr::unknown("gGuid"));
        assert_eq!(lea.constant_address(), Some(0x2040));

        let offset = Expr::binop(BinOpKind::Add, Expr::int(0x3000), Expr::int(0x10));
        assert_eq!(offset.constant_address(), Some(0x3010));

        assert_eq!(rcx().constant_address(), None);
        assert_eq!(Expr::int(-1).constant_address(), None);
        assert_eq!(
            Expr::got_ref(0x2040, 0x400, 8, Expr::unknown("gPtr")).constant_address(),
            None
        );
    }

    #[test]
    fn test_display() {
        let bs = Expr::var(Variable::global(0x5000, 8).named("gBS"));
        let call = Expr::call(
            CallTarget::Indirect(Box::new(Expr::field(bs, "LocateProtocol", 0x140))),
            vec![
                Expr::address_of(Expr::var(Variable::global(0x1000, 16).named("gGuid"))),
                Expr::int(0),
                Expr::address_of(Expr::var(Variable::stack(-0x18, 8))),
            ],
        );
        assert_eq!(
            call.to_string(),
            "(gBS->LocateProtocol)(&gGuid, 0, &var_18)"
        );

        let cast = Expr::cast(rcx(), CType::ptr(CType::ptr(CType::void())));
        assert_eq!(cast.to_string(), "(void**)rcx");
        assert_eq!(Expr::int(0x140).to_string(), "0x140");
    }

    #[test]
    fn test_children_order() {
        let call = Expr::call(
            CallTarget::Indirect(Box::new(rcx())),
            vec![Expr::int(1), Expr::int(2)],
        );
        let kids = call.children();
        assert_eq!(kids.len(), 3);
        assert_eq!(kids[0], &rcx());
        assert_eq!(kids[2], &Expr::int(2));
    }
}

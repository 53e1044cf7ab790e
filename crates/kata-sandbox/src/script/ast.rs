//! Syntax tree for the script dialect.

use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    Var,
    Let,
    Const,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Plus,
    Typeof,
    Void,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
    In,
    InstanceOf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Nullish,
}

/// Assignment operators; `Assign` is plain `=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    Compound(BinaryOp),
}

/// A binding target in declarations, parameters and destructuring.
#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    Ident(String),
    Array {
        elements: Vec<Option<PatternElem>>,
        rest: Option<Box<Pattern>>,
    },
    Object {
        props: Vec<(String, PatternElem)>,
        rest: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PatternElem {
    pub pattern: Pattern,
    pub default: Option<Expr>,
}

impl Pattern {
    /// Collects every identifier bound by this pattern.
    pub fn bound_names(&self, out: &mut Vec<String>) {
        match self {
            Self::Ident(name) => out.push(name.clone()),
            Self::Array { elements, rest } => {
                for elem in elements.iter().flatten() {
                    elem.pattern.bound_names(out);
                }
                if let Some(rest) = rest {
                    rest.bound_names(out);
                }
            }
            Self::Object { props, rest } => {
                for (_, elem) in props {
                    elem.pattern.bound_names(out);
                }
                if let Some(rest) = rest {
                    out.push(rest.clone());
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FnBody {
    Block(Vec<Stmt>),
    Expr(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub pattern: Pattern,
    pub default: Option<Expr>,
    pub rest: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: Option<String>,
    pub params: Vec<Param>,
    pub body: FnBody,
    pub is_arrow: bool,
}

/// Array elements and call arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Expr(Expr),
    Spread(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropKey {
    Static(String),
    Computed(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Prop {
    Value(PropKey, Expr),
    Spread(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    Text(String),
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Num(f64),
    Str(String),
    Template(Vec<TemplatePart>),
    Bool(bool),
    Null,
    Ident(String),
    This,
    Array(Vec<Option<Item>>),
    Object(Vec<Prop>),
    Function(Rc<FunctionDef>),
    Unary(UnaryOp, Box<Expr>),
    Update {
        increment: bool,
        prefix: bool,
        target: Box<Expr>,
    },
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Logical(LogicalOp, Box<Expr>, Box<Expr>),
    Conditional(Box<Expr>, Box<Expr>, Box<Expr>),
    Assign {
        op: AssignOp,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    /// Destructuring assignment such as `[a, b] = [b, a]`.
    AssignPattern(Pattern, Box<Expr>),
    Member {
        object: Box<Expr>,
        property: String,
        optional: bool,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
        optional: bool,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Item>,
        optional: bool,
    },
    New {
        callee: Box<Expr>,
        args: Vec<Item>,
    },
    /// Boundary of an optional chain; short-circuits to `undefined`.
    OptionalChain(Box<Expr>),
    Sequence(Vec<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    pub test: Option<Expr>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ForHead {
    Decl(DeclKind, Pattern),
    Target(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Expr(Expr),
    Decl(DeclKind, Vec<(Pattern, Option<Expr>)>),
    Function(Rc<FunctionDef>),
    If(Expr, Box<Stmt>, Option<Box<Stmt>>),
    While(Expr, Box<Stmt>),
    DoWhile(Box<Stmt>, Expr),
    For {
        init: Option<Box<Stmt>>,
        test: Option<Expr>,
        update: Option<Expr>,
        body: Box<Stmt>,
    },
    ForOf(ForHead, Expr, Box<Stmt>),
    ForIn(ForHead, Expr, Box<Stmt>),
    Switch(Expr, Vec<SwitchCase>),
    Block(Vec<Stmt>),
    Return(Option<Expr>),
    Break,
    Continue,
    Throw(Expr),
    Try {
        block: Vec<Stmt>,
        param: Option<Pattern>,
        handler: Option<Vec<Stmt>>,
        finalizer: Option<Vec<Stmt>>,
    },
    Empty,
}

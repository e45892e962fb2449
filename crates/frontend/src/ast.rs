//! Abstract syntax tree for the C frontend.
//!
//! Every expression node carries a parser-assigned `ExprId`; the semantic
//! analyzer keys its type map on that id, so two syntactically identical
//! subexpressions get independent entries.

use crate::types::TypeOp;

/// Identity of one expression node within a translation unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExprId(pub u32);

/// Syntactic type: base name (`int`/`void`) plus declarator operators,
/// outermost first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeSpec {
    pub name: String,
    pub declarator_ops: Vec<TypeOp>,
}

impl TypeSpec {
    pub fn new(name: impl Into<String>) -> Self {
        TypeSpec {
            name: name.into(),
            declarator_ops: Vec::new(),
        }
    }

    pub fn with_ops(name: impl Into<String>, declarator_ops: Vec<TypeOp>) -> Self {
        TypeSpec {
            name: name.into(),
            declarator_ops,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expr {
    pub id: ExprId,
    pub kind: ExprKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExprKind {
    IntLiteral(String),
    FloatLiteral(String),
    CharLiteral(String),
    StringLiteral(String),
    Identifier(String),
    Unary {
        op: String,
        operand: Box<Expr>,
    },
    /// Prefix or postfix `++`/`--`.
    Update {
        op: String,
        operand: Box<Expr>,
        is_postfix: bool,
    },
    Binary {
        op: String,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Conditional {
        condition: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },
    Comma {
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Assign {
        op: String,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Subscript {
        base: Box<Expr>,
        index: Box<Expr>,
    },
    Member {
        base: Box<Expr>,
        member: String,
        through_pointer: bool,
    },
    Sizeof {
        expr: Option<Box<Expr>>,
        type_spec: Option<TypeSpec>,
    },
    Alignof {
        type_spec: TypeSpec,
    },
    Cast {
        type_spec: TypeSpec,
        expr: Box<Expr>,
    },
    CompoundLiteral {
        type_spec: TypeSpec,
        initializer: InitList,
    },
    /// GNU statement expression `({ ... })`.
    StatementExpr {
        body: Vec<Stmt>,
    },
    Generic {
        control: Box<Expr>,
        associations: Vec<GenericAssociation>,
    },
    /// GNU label address `&&label`.
    LabelAddress(String),
    /// `__builtin_offsetof(type, member)`.
    BuiltinOffsetof {
        type_spec: TypeSpec,
        member: String,
    },
}

/// One `_Generic` association; `type_spec` is `None` for `default`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericAssociation {
    pub type_spec: Option<TypeSpec>,
    pub expr: Expr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Designator {
    Field(String),
    Index(Expr),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitItem {
    pub designators: Vec<Designator>,
    pub initializer: Initializer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitList {
    pub items: Vec<InitItem>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Initializer {
    Expr(Expr),
    List(InitList),
}

/// One declarator of a declaration group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decl {
    pub type_spec: TypeSpec,
    pub name: String,
    pub init: Option<Initializer>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForInit {
    Decl(Vec<Decl>),
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
    Null,
    Compound(Vec<Stmt>),
    If {
        condition: Expr,
        then_body: Box<Stmt>,
        else_body: Option<Box<Stmt>>,
    },
    While {
        condition: Expr,
        body: Box<Stmt>,
    },
    DoWhile {
        body: Box<Stmt>,
        condition: Expr,
    },
    For {
        init: Option<ForInit>,
        condition: Option<Expr>,
        post: Option<Expr>,
        body: Box<Stmt>,
    },
    Switch {
        condition: Expr,
        body: Box<Stmt>,
    },
    Case {
        value: Expr,
        body: Box<Stmt>,
    },
    Default {
        body: Box<Stmt>,
    },
    Label {
        name: String,
        body: Box<Stmt>,
    },
    Goto {
        label: String,
    },
    /// GNU computed goto `goto *expr`.
    IndirectGoto {
        target: Expr,
    },
    Break,
    Continue,
    Return {
        value: Option<Expr>,
    },
    Expr(Expr),
    DeclGroup(Vec<Decl>),
    Typedef {
        type_spec: TypeSpec,
        name: String,
    },
    StaticAssert {
        condition: Expr,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub type_spec: TypeSpec,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDef {
    pub return_type: TypeSpec,
    pub name: String,
    pub params: Vec<Param>,
    /// `None` for a prototype.
    pub body: Option<Vec<Stmt>>,
}

/// Parsed translation unit: function definitions, file-scope object
/// declarations, and external prototypes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TranslationUnit {
    pub functions: Vec<FunctionDef>,
    pub declarations: Vec<Stmt>,
    pub externals: Vec<FunctionDef>,
}

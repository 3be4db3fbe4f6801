//! Syntax tree produced by the parser and consumed by the analyzer. Every node
//! carries the span it was parsed from so diagnostics can point back into the
//! source.

use strum::Display;

use super::Span;

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Identifier {
    pub span: Span,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub span: Span,
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub span: Span,
    pub kind: StatementKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatementKind {
    VariableDeclaration(Box<VariableDeclaration>),
    /// `S y := new S(1);`
    TypedDeclaration {
        ty: Identifier,
        name: Identifier,
        initializer: Box<Expression>,
    },
    FunctionDeclaration(Box<FunctionDeclaration>),
    ClassDeclaration(Box<ClassDeclaration>),
    Assignment {
        target: Box<Expression>,
        source: Box<Expression>,
    },
    Bump {
        operator: BumpKind,
        target: Box<Expression>,
    },
    /// A call evaluated for its side effects
    Call(Box<Expression>),
    Break,
    Continue,
    Return(Option<Box<Expression>>),
    If(Box<IfStatement>),
    While {
        test: Box<Expression>,
        body: Block,
    },
    /// `for (ingredient i := 0; i < 10; ++i) { ... }`
    For {
        init: Box<VariableDeclaration>,
        test: Box<Expression>,
        update: Box<Statement>,
        body: Block,
    },
    /// `for (i in 0..10) { ... }`
    ForRange {
        iterator: Identifier,
        low: Box<Expression>,
        high: Box<Expression>,
        body: Block,
    },
    /// `for (x in xs) { ... }`
    ForEach {
        iterator: Identifier,
        collection: Box<Expression>,
        body: Block,
    },
    Try {
        body: Block,
        rescue: Option<Box<RescueClause>>,
        cleanup: Option<Block>,
    },
    /// `eightysix("message", ValueError);`
    Throw {
        message: Box<Expression>,
        kind: Identifier,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum BumpKind {
    #[strum(serialize = "++")]
    Increment,
    #[strum(serialize = "--")]
    Decrement,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableDeclaration {
    pub span: Span,
    pub declarators: Vec<Declarator>,
    pub is_const: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Declarator {
    pub span: Span,
    pub name: Identifier,
    pub ty: Option<Type>,
    pub initializer: Option<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDeclaration {
    pub span: Span,
    pub name: Identifier,
    pub parameters: Vec<Parameter>,
    pub return_type: Option<Type>,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub span: Span,
    pub name: Identifier,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDeclaration {
    pub span: Span,
    pub name: Identifier,
    pub fields: Vec<Parameter>,
    pub methods: Vec<FunctionDeclaration>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfStatement {
    pub span: Span,
    pub test: Expression,
    pub consequent: Block,
    pub alternate: Option<ElseBranch>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ElseBranch {
    Block(Block),
    If(Box<IfStatement>),
}

/// `rescue (ValueError e) { ... }`
#[derive(Debug, Clone, PartialEq)]
pub struct RescueClause {
    pub span: Span,
    pub kind: Identifier,
    pub binding: Identifier,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Type {
    pub span: Span,
    pub kind: TypeKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeKind {
    Named(Identifier),
    Array(Box<Type>),
    Optional(Box<Type>),
    Function {
        parameters: Vec<Type>,
        return_type: Box<Type>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub span: Span,
    pub kind: ExpressionKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionKind {
    Literal(Literal),
    /// `raw int`
    EmptyOptional(Type),
    /// `[int]()`, the type is the array type itself
    EmptyArray(Type),
    Array(Vec<Expression>),
    Identifier(Identifier),
    Binary {
        operator: BinaryOperator,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
    },
    Unary {
        operator: UnaryOperator,
        operand: Box<Expression>,
    },
    Conditional {
        test: Box<Expression>,
        consequent: Box<Expression>,
        alternate: Box<Expression>,
    },
    Subscript {
        array: Box<Expression>,
        index: Box<Expression>,
    },
    Member {
        object: Box<Expression>,
        field: Identifier,
        optional_chain: bool,
    },
    Call {
        callee: Box<Expression>,
        arguments: Vec<Expression>,
    },
    New {
        class: Identifier,
        arguments: Vec<Expression>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Integer(i64),
    Float(f64),
    /// Kept verbatim, quotes and escapes included
    String(String),
    Boolean(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinaryOperator {
    pub span: Span,
    pub kind: BinaryOperatorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum BinaryOperatorKind {
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Subtract,
    #[strum(serialize = "*")]
    Multiply,
    #[strum(serialize = "/")]
    Divide,
    #[strum(serialize = "%")]
    Modulus,
    #[strum(serialize = "**")]
    Power,
    #[strum(serialize = "&&")]
    LogicalAnd,
    #[strum(serialize = "||")]
    LogicalOr,
    #[strum(serialize = "&")]
    BitwiseAnd,
    #[strum(serialize = "|")]
    BitwiseOr,
    #[strum(serialize = "^")]
    BitwiseXor,
    #[strum(serialize = "<<")]
    ShiftLeft,
    #[strum(serialize = ">>")]
    ShiftRight,
    #[strum(serialize = "==")]
    Equals,
    #[strum(serialize = "!=")]
    NotEquals,
    #[strum(serialize = "<")]
    LessThan,
    #[strum(serialize = "<=")]
    LessThanOrEqualTo,
    #[strum(serialize = ">")]
    GreaterThan,
    #[strum(serialize = ">=")]
    GreaterThanOrEqualTo,
    #[strum(serialize = "??")]
    Coalesce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperatorClass {
    /// `+ - * / % **`
    Arithmetic,
    /// `& | ^ << >>`
    Bitwise,
    /// `< <= > >=`
    Comparison,
    Equality,
    Logical,
    Coalesce,
}

impl BinaryOperatorKind {
    pub fn class(self) -> BinaryOperatorClass {
        match self {
            Self::Add
            | Self::Subtract
            | Self::Multiply
            | Self::Divide
            | Self::Modulus
            | Self::Power => BinaryOperatorClass::Arithmetic,
            Self::BitwiseAnd
            | Self::BitwiseOr
            | Self::BitwiseXor
            | Self::ShiftLeft
            | Self::ShiftRight => BinaryOperatorClass::Bitwise,
            Self::LessThan
            | Self::LessThanOrEqualTo
            | Self::GreaterThan
            | Self::GreaterThanOrEqualTo => BinaryOperatorClass::Comparison,
            Self::Equals | Self::NotEquals => BinaryOperatorClass::Equality,
            Self::LogicalAnd | Self::LogicalOr => BinaryOperatorClass::Logical,
            Self::Coalesce => BinaryOperatorClass::Coalesce,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnaryOperator {
    pub span: Span,
    pub kind: UnaryOperatorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum UnaryOperatorKind {
    #[strum(serialize = "-")]
    Negate,
    #[strum(serialize = "!")]
    Not,
    #[strum(serialize = "#")]
    Length,
    #[strum(serialize = "random")]
    Random,
    /// Lifts `T` into `T?`
    #[strum(serialize = "poached")]
    Wrap,
}

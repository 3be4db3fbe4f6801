//! The typed intermediate representation. The analyzer builds it, the
//! optimizer rewrites it in place and the backends render it.
//!
//! Expressions carry their resolved [`Type`]. Statements carry only what is
//! needed to regenerate code. Every name is an [`EntityId`] into
//! [`Program::entities`].

pub mod pretty_print;
pub mod visit;

use crate::{
    frontend::ast::{BinaryOperatorKind, BumpKind, UnaryOperatorKind},
    middle::{
        entity::{Entities, EntityId},
        ty::Type,
    },
};

pub use crate::frontend::ast::Literal;

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub statements: Block,
    pub entities: Entities,
}

pub type Block = Vec<Statement>;

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    VariableDeclaration(Declaration),
    FunctionDeclaration(FunctionDeclaration),
    /// Fields live on the class entity
    ClassDeclaration {
        class: EntityId,
        methods: Vec<FunctionDeclaration>,
    },
    Assignment {
        target: Expression,
        source: Expression,
    },
    Bump {
        target: Expression,
        operator: BumpKind,
    },
    Call(Expression),
    Break,
    Continue,
    Return(Expression),
    ShortReturn,
    If {
        test: Expression,
        consequent: Block,
        alternate: Option<Alternate>,
    },
    While {
        test: Expression,
        body: Block,
    },
    For {
        init: Vec<Declaration>,
        test: Expression,
        update: Box<Statement>,
        body: Block,
    },
    /// Iterates `low <= iterator < high`
    ForRange {
        iterator: EntityId,
        low: Expression,
        high: Expression,
        body: Block,
    },
    ForEach {
        iterator: EntityId,
        collection: Expression,
        body: Block,
    },
    Try {
        body: Block,
        rescue: Option<Rescue>,
        cleanup: Option<Block>,
    },
    Throw {
        kind: EntityId,
        message: Expression,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub variable: EntityId,
    /// Absent for declarations without a natural default (class typed ones)
    pub initializer: Option<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDeclaration {
    pub function: EntityId,
    pub parameters: Vec<EntityId>,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Alternate {
    Block(Block),
    /// `else if`, always a [`Statement::If`]
    If(Box<Statement>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rescue {
    /// The built-in error class being rescued
    pub kind: EntityId,
    pub binding: EntityId,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub kind: ExpressionKind,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionKind {
    Literal(Literal),
    EmptyOptional,
    EmptyArray,
    Array(Vec<Expression>),
    /// A variable, or a function used as a value
    Variable(EntityId),
    /// A field of the enclosing class referenced by its bare name inside a
    /// method
    SelfField(EntityId),
    Binary {
        operator: BinaryOperatorKind,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
    },
    Unary {
        operator: UnaryOperatorKind,
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
        field: EntityId,
        optional_chain: bool,
    },
    Call {
        callee: Callee,
        arguments: Vec<Expression>,
    },
    Construct {
        class: EntityId,
        arguments: Vec<Expression>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Callee {
    /// A declared function or intrinsic called by name
    Function(EntityId),
    /// A method on `receiver`, or on `this` when there is no receiver
    Method {
        receiver: Option<Box<Expression>>,
        method: EntityId,
    },
    /// Any other expression of function type
    Value(Box<Expression>),
}

impl Expression {
    pub fn new(kind: ExpressionKind, ty: Type) -> Self {
        Self { kind, ty }
    }

    pub fn literal(literal: Literal) -> Self {
        let ty = match &literal {
            Literal::Integer(_) => Type::int(),
            Literal::Float(_) => Type::float(),
            Literal::String(_) => Type::string(),
            Literal::Boolean(_) => Type::boolean(),
        };

        Self::new(ExpressionKind::Literal(literal), ty)
    }

    pub fn boolean(value: bool) -> Self {
        Self::literal(Literal::Boolean(value))
    }

    pub fn as_literal(&self) -> Option<&Literal> {
        match &self.kind {
            ExpressionKind::Literal(literal) => Some(literal),
            _ => None,
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self.as_literal() {
            Some(Literal::Boolean(value)) => Some(*value),
            _ => None,
        }
    }

    /// Whether evaluating the expression can have no side effect. Calls,
    /// construction and `random` are impure; everything else only reads.
    pub fn is_pure(&self) -> bool {
        match &self.kind {
            ExpressionKind::Literal(_)
            | ExpressionKind::EmptyOptional
            | ExpressionKind::EmptyArray
            | ExpressionKind::Variable(_)
            | ExpressionKind::SelfField(_) => true,
            ExpressionKind::Array(elements) => elements.iter().all(Expression::is_pure),
            ExpressionKind::Binary { lhs, rhs, .. } => lhs.is_pure() && rhs.is_pure(),
            ExpressionKind::Unary { operator, operand } => {
                *operator != UnaryOperatorKind::Random && operand.is_pure()
            }
            ExpressionKind::Conditional {
                test,
                consequent,
                alternate,
            } => test.is_pure() && consequent.is_pure() && alternate.is_pure(),
            ExpressionKind::Subscript { array, index } => array.is_pure() && index.is_pure(),
            ExpressionKind::Member { object, .. } => object.is_pure(),
            ExpressionKind::Call { .. } | ExpressionKind::Construct { .. } => false,
        }
    }

    /// Whether both expressions read the same storage location
    pub fn same_place(&self, other: &Expression) -> bool {
        match (&self.kind, &other.kind) {
            (ExpressionKind::Variable(a), ExpressionKind::Variable(b))
            | (ExpressionKind::SelfField(a), ExpressionKind::SelfField(b)) => a == b,
            _ => false,
        }
    }
}

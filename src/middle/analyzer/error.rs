use strum::Display;
use thiserror::Error;

use crate::{frontend::Position, middle::ty::Type};

/// The first rule a program violates. Analysis stops as soon as one is found.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{position}: {kind}")]
pub struct SemanticError {
    pub kind: SemanticErrorKind,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SemanticErrorKind {
    #[error("identifier `{0}` already declared")]
    AlreadyDeclared(String),
    #[error("identifier `{0}` not declared")]
    UndeclaredIdentifier(String),
    #[error(transparent)]
    TypeMismatch(#[from] TypeMismatch),
    #[error("expected {expected} argument(s) but found {actual}")]
    ArityMismatch { expected: usize, actual: usize },
    #[error(transparent)]
    IllegalControlFlow(#[from] ControlFlowViolation),
    #[error("{}", member_message(.member, .class, .private))]
    NoSuchMember {
        member: String,
        class: String,
        private: bool,
    },
    #[error("`{0}` is not an error kind")]
    InvalidErrorKind(String),
    #[error("expected a type but found `{0}`")]
    InvalidTypeAnnotation(String),
    #[error("cannot assign to read-only `{0}`")]
    ReadOnlyAssignment(String),
    #[error("class `{0}` cannot have a field of its own type")]
    RecursiveClass(String),
}

fn member_message(member: &str, class: &str, private: &bool) -> String {
    if *private {
        format!("member `{member}` of {class} is private")
    } else {
        format!("no member `{member}` on {class}")
    }
}

/// Where a value was being stored when an assignability check failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum TypeBoundary {
    #[strum(serialize = "declaration")]
    Declaration,
    #[strum(serialize = "assignment")]
    Assignment,
    #[strum(serialize = "function argument")]
    Argument,
    #[strum(serialize = "constructor argument")]
    ConstructorArgument,
    #[strum(serialize = "return")]
    Return,
    #[strum(serialize = "default operand")]
    Coalesce,
}

/// Where two operand types had to agree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum OperandContext {
    #[strum(serialize = "binary operator")]
    BinaryOperator,
    #[strum(serialize = "array literal")]
    ArrayElements,
    #[strum(serialize = "conditional")]
    ConditionalBranches,
}

/// What a position required of its operand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum TypeUsage {
    #[strum(serialize = "a boolean")]
    Boolean,
    #[strum(serialize = "an integer")]
    Integer,
    #[strum(serialize = "a number")]
    Numeric,
    #[strum(serialize = "a number or string")]
    NumericOrString,
    #[strum(serialize = "a string")]
    String,
    #[strum(serialize = "an array")]
    Array,
    #[strum(serialize = "an optional")]
    Optional,
    #[strum(serialize = "a class instance")]
    Class,
    #[strum(serialize = "an optional class instance")]
    OptionalClass,
    #[strum(serialize = "a function")]
    Callable,
    #[strum(serialize = "a value")]
    Value,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TypeMismatch {
    #[error("cannot assign a {actual} to a {expected} in {boundary}")]
    NotAssignable {
        expected: Type,
        actual: Type,
        boundary: TypeBoundary,
    },
    #[error("operands of {context} must have the same type, found {left} and {right}")]
    NotEquivalent {
        left: Type,
        right: Type,
        context: OperandContext,
    },
    #[error("expected {expected} but found {actual}")]
    InvalidOperand { expected: TypeUsage, actual: Type },
    #[error("`{0}` is a type, not a value")]
    NotAValue(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ControlFlowViolation {
    #[error("`break` can only appear in a loop")]
    Break,
    #[error("`continue` can only appear in a loop")]
    Continue,
    #[error("`return` can only appear in a function")]
    ReturnOutsideFunction,
    #[error("a value must be returned here")]
    MissingReturnValue,
    #[error("cannot return a value from a void function")]
    UnexpectedReturnValue,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_lead_with_position() {
        let error = SemanticError {
            kind: SemanticErrorKind::AlreadyDeclared("x".to_string()),
            position: Position::new(1, 22),
        };

        assert_eq!(error.to_string(), "1:22: identifier `x` already declared");
    }

    #[test]
    fn nested_messages() {
        let mismatch = SemanticErrorKind::from(TypeMismatch::NotAssignable {
            expected: Type::int(),
            actual: Type::string(),
            boundary: TypeBoundary::Argument,
        });

        assert_eq!(
            mismatch.to_string(),
            "cannot assign a string to a int in function argument"
        );

        let private = SemanticErrorKind::NoSuchMember {
            member: "_secret".to_string(),
            class: "S".to_string(),
            private: true,
        };

        assert_eq!(private.to_string(), "member `_secret` of S is private");
    }
}

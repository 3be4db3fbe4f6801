//! Expression rewrites: constant folding and algebraic simplification.
//!
//! Folding follows the arithmetic of the generated JavaScript so that folded
//! and unfolded programs print the same values. Integer results are only
//! folded while they stay exactly representable as a double, bitwise
//! operators work on 32-bit integers, and float results must be finite.

use super::Optimizer;
use crate::{
    frontend::ast::{BinaryOperatorKind, UnaryOperatorKind},
    middle::{
        ir::{Callee, Expression, ExpressionKind, Literal},
        ty::Type,
    },
};

/// Largest integer a JavaScript number holds exactly
const MAX_SAFE_INTEGER: u64 = (1 << 53) - 1;

/// What a binary expression collapses to when one side makes the operation
/// trivial
enum Simplified {
    Left,
    Right,
    Constant(Literal),
}

impl Optimizer {
    pub(super) fn fold(&mut self, expression: Expression) -> Expression {
        let Expression { kind, ty } = expression;

        match kind {
            ExpressionKind::Binary { operator, lhs, rhs } => {
                let lhs = self.fold(*lhs);
                let rhs = self.fold(*rhs);
                self.fold_binary(operator, lhs, rhs, ty)
            }
            ExpressionKind::Unary { operator, operand } => {
                let operand = self.fold(*operand);

                match evaluate_unary(operator, &operand) {
                    Some(value) => {
                        self.rewrote("constant unary");
                        Expression::literal(value)
                    }
                    None => Expression::new(
                        ExpressionKind::Unary {
                            operator,
                            operand: Box::new(operand),
                        },
                        ty,
                    ),
                }
            }
            ExpressionKind::Conditional {
                test,
                consequent,
                alternate,
            } => {
                let test = self.fold(*test);
                let consequent = self.fold(*consequent);
                let alternate = self.fold(*alternate);

                match test.as_boolean() {
                    Some(true) => {
                        self.rewrote("constant conditional");
                        consequent
                    }
                    Some(false) => {
                        self.rewrote("constant conditional");
                        alternate
                    }
                    None => Expression::new(
                        ExpressionKind::Conditional {
                            test: Box::new(test),
                            consequent: Box::new(consequent),
                            alternate: Box::new(alternate),
                        },
                        ty,
                    ),
                }
            }
            ExpressionKind::Array(elements) => Expression::new(
                ExpressionKind::Array(self.fold_all(elements)),
                ty,
            ),
            ExpressionKind::Subscript { array, index } => Expression::new(
                ExpressionKind::Subscript {
                    array: Box::new(self.fold(*array)),
                    index: Box::new(self.fold(*index)),
                },
                ty,
            ),
            ExpressionKind::Member {
                object,
                field,
                optional_chain,
            } => Expression::new(
                ExpressionKind::Member {
                    object: Box::new(self.fold(*object)),
                    field,
                    optional_chain,
                },
                ty,
            ),
            ExpressionKind::Call { callee, arguments } => {
                let callee = match callee {
                    Callee::Method { receiver, method } => Callee::Method {
                        receiver: receiver.map(|receiver| Box::new(self.fold(*receiver))),
                        method,
                    },
                    Callee::Value(value) => Callee::Value(Box::new(self.fold(*value))),
                    function @ Callee::Function(_) => function,
                };

                Expression::new(
                    ExpressionKind::Call {
                        callee,
                        arguments: self.fold_all(arguments),
                    },
                    ty,
                )
            }
            ExpressionKind::Construct { class, arguments } => Expression::new(
                ExpressionKind::Construct {
                    class,
                    arguments: self.fold_all(arguments),
                },
                ty,
            ),
            leaf @ (ExpressionKind::Literal(_)
            | ExpressionKind::EmptyOptional
            | ExpressionKind::EmptyArray
            | ExpressionKind::Variable(_)
            | ExpressionKind::SelfField(_)) => Expression::new(leaf, ty),
        }
    }

    fn fold_all(&mut self, expressions: Vec<Expression>) -> Vec<Expression> {
        expressions
            .into_iter()
            .map(|expression| self.fold(expression))
            .collect()
    }

    fn fold_binary(
        &mut self,
        operator: BinaryOperatorKind,
        lhs: Expression,
        rhs: Expression,
        ty: Type,
    ) -> Expression {
        if let (Some(l), Some(r)) = (lhs.as_literal(), rhs.as_literal()) {
            if let Some(value) = evaluate_binary(operator, l, r) {
                self.rewrote("constant binary");
                return Expression::literal(value);
            }
        }

        match simplify_binary(operator, &lhs, &rhs) {
            Some(Simplified::Left) => {
                self.rewrote("binary identity");
                lhs
            }
            Some(Simplified::Right) => {
                self.rewrote("binary identity");
                rhs
            }
            Some(Simplified::Constant(value)) => {
                self.rewrote("binary annihilator");
                Expression::literal(value)
            }
            None => Expression::new(
                ExpressionKind::Binary {
                    operator,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                ty,
            ),
        }
    }
}

fn is_zero(literal: Option<&Literal>) -> bool {
    match literal {
        Some(Literal::Integer(value)) => *value == 0,
        Some(Literal::Float(value)) => *value == 0.0,
        _ => false,
    }
}

fn is_one(literal: Option<&Literal>) -> bool {
    match literal {
        Some(Literal::Integer(value)) => *value == 1,
        Some(Literal::Float(value)) => *value == 1.0,
        _ => false,
    }
}

/// Short-circuit and identity rules. An operand is only dropped when it would
/// not have been evaluated at runtime or when evaluating it has no effect.
fn simplify_binary(
    operator: BinaryOperatorKind,
    lhs: &Expression,
    rhs: &Expression,
) -> Option<Simplified> {
    let (l, r) = (lhs.as_literal(), rhs.as_literal());

    match operator {
        BinaryOperatorKind::LogicalAnd => match (lhs.as_boolean(), rhs.as_boolean()) {
            (Some(true), _) => Some(Simplified::Right),
            (Some(false), _) => Some(Simplified::Left),
            (_, Some(true)) => Some(Simplified::Left),
            (_, Some(false)) if lhs.is_pure() => Some(Simplified::Right),
            _ => None,
        },
        BinaryOperatorKind::LogicalOr => match (lhs.as_boolean(), rhs.as_boolean()) {
            (Some(false), _) => Some(Simplified::Right),
            (Some(true), _) => Some(Simplified::Left),
            (_, Some(false)) => Some(Simplified::Left),
            (_, Some(true)) if lhs.is_pure() => Some(Simplified::Right),
            _ => None,
        },
        BinaryOperatorKind::Coalesce => {
            matches!(lhs.kind, ExpressionKind::EmptyOptional).then_some(Simplified::Right)
        }
        BinaryOperatorKind::Add if is_zero(r) => Some(Simplified::Left),
        BinaryOperatorKind::Add if is_zero(l) => Some(Simplified::Right),
        BinaryOperatorKind::Subtract if is_zero(r) => Some(Simplified::Left),
        BinaryOperatorKind::Multiply if is_one(r) => Some(Simplified::Left),
        BinaryOperatorKind::Multiply if is_one(l) => Some(Simplified::Right),
        // Only integers: a float could be NaN or infinite
        BinaryOperatorKind::Multiply
            if is_zero(r) && lhs.ty.is_int() && lhs.is_pure() =>
        {
            Some(Simplified::Constant(Literal::Integer(0)))
        }
        BinaryOperatorKind::Multiply
            if is_zero(l) && rhs.ty.is_int() && rhs.is_pure() =>
        {
            Some(Simplified::Constant(Literal::Integer(0)))
        }
        BinaryOperatorKind::Divide if is_one(r) => Some(Simplified::Left),
        BinaryOperatorKind::Power if is_zero(r) && lhs.is_pure() => {
            Some(Simplified::Constant(if lhs.ty.is_float() {
                Literal::Float(1.0)
            } else {
                Literal::Integer(1)
            }))
        }
        BinaryOperatorKind::Power if is_one(r) => Some(Simplified::Left),
        _ => None,
    }
}

/// Computes `l operator r` for two literals, or `None` when the result is not
/// a literal the generated code would produce exactly
pub(crate) fn evaluate_binary(
    operator: BinaryOperatorKind,
    l: &Literal,
    r: &Literal,
) -> Option<Literal> {
    match (l, r) {
        (Literal::Integer(a), Literal::Integer(b)) => evaluate_integer(operator, *a, *b),
        (Literal::Float(a), Literal::Float(b)) => evaluate_float(operator, *a, *b),
        (Literal::Boolean(a), Literal::Boolean(b)) => {
            let value = match operator {
                BinaryOperatorKind::LogicalAnd => *a && *b,
                BinaryOperatorKind::LogicalOr => *a || *b,
                BinaryOperatorKind::Equals => a == b,
                BinaryOperatorKind::NotEquals => a != b,
                _ => return None,
            };

            Some(Literal::Boolean(value))
        }
        _ => None,
    }
}

fn evaluate_integer(operator: BinaryOperatorKind, a: i64, b: i64) -> Option<Literal> {
    let value = match operator {
        BinaryOperatorKind::Add => a.checked_add(b)?,
        BinaryOperatorKind::Subtract => a.checked_sub(b)?,
        BinaryOperatorKind::Multiply => a.checked_mul(b)?,
        // Integer division truncates, matching the generated Math.trunc
        BinaryOperatorKind::Divide => a.checked_div(b)?,
        BinaryOperatorKind::Modulus => a.checked_rem(b)?,
        BinaryOperatorKind::Power => a.checked_pow(u32::try_from(b).ok()?)?,
        BinaryOperatorKind::BitwiseAnd => evaluate_bitwise(a, b, |a, b| a & b)?,
        BinaryOperatorKind::BitwiseOr => evaluate_bitwise(a, b, |a, b| a | b)?,
        BinaryOperatorKind::BitwiseXor => evaluate_bitwise(a, b, |a, b| a ^ b)?,
        BinaryOperatorKind::ShiftLeft => {
            evaluate_bitwise(a, b, |a, b| a.wrapping_shl(b as u32 & 31))?
        }
        BinaryOperatorKind::ShiftRight => evaluate_bitwise(a, b, |a, b| a >> (b & 31))?,
        BinaryOperatorKind::Equals => return Some(Literal::Boolean(a == b)),
        BinaryOperatorKind::NotEquals => return Some(Literal::Boolean(a != b)),
        BinaryOperatorKind::LessThan => return Some(Literal::Boolean(a < b)),
        BinaryOperatorKind::LessThanOrEqualTo => return Some(Literal::Boolean(a <= b)),
        BinaryOperatorKind::GreaterThan => return Some(Literal::Boolean(a > b)),
        BinaryOperatorKind::GreaterThanOrEqualTo => return Some(Literal::Boolean(a >= b)),
        BinaryOperatorKind::LogicalAnd
        | BinaryOperatorKind::LogicalOr
        | BinaryOperatorKind::Coalesce => return None,
    };

    (value.unsigned_abs() <= MAX_SAFE_INTEGER).then_some(Literal::Integer(value))
}

/// JavaScript bitwise operators convert their operands to 32-bit integers.
/// Operands outside that range are left for the runtime.
fn evaluate_bitwise(a: i64, b: i64, operation: impl FnOnce(i32, i32) -> i32) -> Option<i64> {
    let a = i32::try_from(a).ok()?;
    let b = i32::try_from(b).ok()?;

    Some(i64::from(operation(a, b)))
}

fn evaluate_float(operator: BinaryOperatorKind, a: f64, b: f64) -> Option<Literal> {
    let value = match operator {
        BinaryOperatorKind::Add => a + b,
        BinaryOperatorKind::Subtract => a - b,
        BinaryOperatorKind::Multiply => a * b,
        BinaryOperatorKind::Divide => a / b,
        BinaryOperatorKind::Modulus => a % b,
        BinaryOperatorKind::Power => a.powf(b),
        BinaryOperatorKind::Equals => return Some(Literal::Boolean(a == b)),
        BinaryOperatorKind::NotEquals => return Some(Literal::Boolean(a != b)),
        BinaryOperatorKind::LessThan => return Some(Literal::Boolean(a < b)),
        BinaryOperatorKind::LessThanOrEqualTo => return Some(Literal::Boolean(a <= b)),
        BinaryOperatorKind::GreaterThan => return Some(Literal::Boolean(a > b)),
        BinaryOperatorKind::GreaterThanOrEqualTo => return Some(Literal::Boolean(a >= b)),
        _ => return None,
    };

    value.is_finite().then_some(Literal::Float(value))
}

fn evaluate_unary(operator: UnaryOperatorKind, operand: &Expression) -> Option<Literal> {
    match (operator, operand.as_literal()?) {
        (UnaryOperatorKind::Negate, Literal::Integer(value)) => {
            value.checked_neg().map(Literal::Integer)
        }
        (UnaryOperatorKind::Negate, Literal::Float(value)) => Some(Literal::Float(-value)),
        (UnaryOperatorKind::Not, Literal::Boolean(value)) => Some(Literal::Boolean(!value)),
        _ => None,
    }
}

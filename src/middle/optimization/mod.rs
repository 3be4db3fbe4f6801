//! Sous Optimizer
//!
//! Rewrites the analyzed program into a smaller equivalent one. Every rule
//! works bottom-up, so a single pass reaches a fixed point and running the
//! optimizer twice changes nothing.
//!
//! Statements may disappear entirely (dead code, loops that never run,
//! self-assignments) or be replaced by several (constant `if` tests, unrolled
//! loops), which is why statement rules return a list.

mod fold;

use tracing::{debug, trace};

use crate::middle::{
    entity::EntityId,
    ir::{
        Alternate, Block, Declaration, Expression, ExpressionKind, FunctionDeclaration, Literal,
        Program, Rescue, Statement,
        visit::{Visitor, walk_statement},
    },
};

/// Loops over at most this many known values are unrolled
const MAX_UNROLLED_ITERATIONS: i64 = 5;

/// Optimizes the program in place
pub fn optimize(program: &mut Program) {
    let mut optimizer = Optimizer::default();

    let statements = std::mem::take(&mut program.statements);
    program.statements = optimizer.optimize_block(statements);

    debug!(rewrites = optimizer.rewrites, "optimization finished");
}

#[derive(Default)]
struct Optimizer {
    rewrites: usize,
}

impl Optimizer {
    fn rewrote(&mut self, rule: &'static str) {
        self.rewrites += 1;
        trace!(rule, "rewrite");
    }

    /// Optimizes each statement and drops whatever follows an unconditional
    /// jump
    fn optimize_block(&mut self, block: Block) -> Block {
        let total = block.len();
        let mut optimized = Block::with_capacity(total);

        for (index, statement) in block.into_iter().enumerate() {
            let start = optimized.len();
            optimized.extend(self.optimize_statement(statement));

            let Some(jump) = optimized[start..].iter().position(is_unconditional_jump) else {
                continue;
            };

            let end = start + jump + 1;
            if end < optimized.len() || index + 1 < total {
                self.rewrote("unreachable code");
            }

            optimized.truncate(end);
            break;
        }

        optimized
    }

    fn optimize_statement(&mut self, statement: Statement) -> Vec<Statement> {
        match statement {
            Statement::VariableDeclaration(declaration) => {
                vec![Statement::VariableDeclaration(
                    self.optimize_declaration(declaration),
                )]
            }
            Statement::FunctionDeclaration(function) => {
                vec![Statement::FunctionDeclaration(self.optimize_function(function))]
            }
            Statement::ClassDeclaration { class, methods } => {
                vec![Statement::ClassDeclaration {
                    class,
                    methods: methods
                        .into_iter()
                        .map(|method| self.optimize_function(method))
                        .collect(),
                }]
            }
            Statement::Assignment { target, source } => {
                let target = self.fold(target);
                let source = self.fold(source);

                if target.same_place(&source) {
                    self.rewrote("self assignment");
                    return vec![];
                }

                vec![Statement::Assignment { target, source }]
            }
            Statement::Bump { target, operator } => vec![Statement::Bump {
                target: self.fold(target),
                operator,
            }],
            Statement::Call(call) => vec![Statement::Call(self.fold(call))],
            Statement::Return(value) => vec![Statement::Return(self.fold(value))],
            Statement::Break | Statement::Continue | Statement::ShortReturn => vec![statement],
            Statement::If {
                test,
                consequent,
                alternate,
            } => self.optimize_if(test, consequent, alternate),
            Statement::While { test, body } => {
                let test = self.fold(test);

                if test.as_boolean() == Some(false) {
                    self.rewrote("loop never runs");
                    return vec![];
                }

                vec![Statement::While {
                    test,
                    body: self.optimize_block(body),
                }]
            }
            Statement::For {
                init,
                test,
                update,
                body,
            } => {
                let init = init
                    .into_iter()
                    .map(|declaration| self.optimize_declaration(declaration))
                    .collect::<Vec<_>>();
                let test = self.fold(test);

                let init_is_pure = init.iter().all(|declaration| {
                    declaration
                        .initializer
                        .as_ref()
                        .is_none_or(Expression::is_pure)
                });

                if test.as_boolean() == Some(false) && init_is_pure {
                    self.rewrote("loop never runs");
                    return vec![];
                }

                vec![Statement::For {
                    init,
                    test,
                    update: Box::new(self.optimize_update(*update)),
                    body: self.optimize_block(body),
                }]
            }
            Statement::ForRange {
                iterator,
                low,
                high,
                body,
            } => self.optimize_range_loop(iterator, low, high, body),
            Statement::ForEach {
                iterator,
                collection,
                body,
            } => self.optimize_collection_loop(iterator, collection, body),
            Statement::Try {
                body,
                rescue,
                cleanup,
            } => vec![Statement::Try {
                body: self.optimize_block(body),
                rescue: rescue.map(|rescue| Rescue {
                    body: self.optimize_block(rescue.body),
                    ..rescue
                }),
                cleanup: cleanup.map(|cleanup| self.optimize_block(cleanup)),
            }],
            Statement::Throw { kind, message } => vec![Statement::Throw {
                kind,
                message: self.fold(message),
            }],
        }
    }

    fn optimize_declaration(&mut self, declaration: Declaration) -> Declaration {
        Declaration {
            initializer: declaration
                .initializer
                .map(|initializer| self.fold(initializer)),
            ..declaration
        }
    }

    fn optimize_function(&mut self, function: FunctionDeclaration) -> FunctionDeclaration {
        FunctionDeclaration {
            body: self.optimize_block(function.body),
            ..function
        }
    }

    /// The update clause of a C-style loop must stay a single statement, so
    /// only its expressions are folded
    fn optimize_update(&mut self, update: Statement) -> Statement {
        match update {
            Statement::Assignment { target, source } => Statement::Assignment {
                target: self.fold(target),
                source: self.fold(source),
            },
            Statement::Bump { target, operator } => Statement::Bump {
                target: self.fold(target),
                operator,
            },
            other => other,
        }
    }

    /// An `if` with a constant test becomes the statements of the branch that
    /// is taken
    fn optimize_if(
        &mut self,
        test: Expression,
        consequent: Block,
        alternate: Option<Alternate>,
    ) -> Vec<Statement> {
        let test = self.fold(test);
        let consequent = self.optimize_block(consequent);

        let alternate = match alternate {
            Some(Alternate::Block(block)) => Some(Alternate::Block(self.optimize_block(block))),
            Some(Alternate::If(statement)) => {
                let mut statements = self.optimize_statement(*statement);

                match statements.as_slice() {
                    [] => None,
                    [Statement::If { .. }] => statements
                        .pop()
                        .map(|statement| Alternate::If(Box::new(statement))),
                    _ => Some(Alternate::Block(statements)),
                }
            }
            None => None,
        };

        match test.as_boolean() {
            Some(true) => {
                self.rewrote("constant if");
                consequent
            }
            Some(false) => {
                self.rewrote("constant if");

                match alternate {
                    Some(Alternate::Block(block)) => block,
                    Some(Alternate::If(statement)) => vec![*statement],
                    None => vec![],
                }
            }
            None => vec![Statement::If {
                test,
                consequent,
                alternate,
            }],
        }
    }

    fn optimize_range_loop(
        &mut self,
        iterator: EntityId,
        low: Expression,
        high: Expression,
        body: Block,
    ) -> Vec<Statement> {
        let low = self.fold(low);
        let high = self.fold(high);
        let body = self.optimize_block(body);

        if let (Some(Literal::Integer(l)), Some(Literal::Integer(h))) =
            (low.as_literal(), high.as_literal())
        {
            let (l, h) = (*l, *h);

            if h <= l {
                self.rewrote("loop never runs");
                return vec![];
            }

            if h.checked_sub(l)
                .is_some_and(|count| count <= MAX_UNROLLED_ITERATIONS)
                && can_unroll(&body)
            {
                self.rewrote("unrolled range");
                return unroll(
                    iterator,
                    (l..h).map(|value| Expression::literal(Literal::Integer(value))),
                    &body,
                );
            }
        }

        vec![Statement::ForRange {
            iterator,
            low,
            high,
            body,
        }]
    }

    fn optimize_collection_loop(
        &mut self,
        iterator: EntityId,
        collection: Expression,
        body: Block,
    ) -> Vec<Statement> {
        let collection = self.fold(collection);
        let body = self.optimize_block(body);

        match collection.kind {
            ExpressionKind::EmptyArray => {
                self.rewrote("loop never runs");
                vec![]
            }
            ExpressionKind::Array(elements)
                if elements.len() as i64 <= MAX_UNROLLED_ITERATIONS
                    && elements.iter().all(|element| element.as_literal().is_some())
                    && can_unroll(&body) =>
            {
                self.rewrote("unrolled collection");
                unroll(iterator, elements, &body)
            }
            kind => vec![Statement::ForEach {
                iterator,
                collection: Expression::new(kind, collection.ty),
                body,
            }],
        }
    }
}

fn is_unconditional_jump(statement: &Statement) -> bool {
    matches!(
        statement,
        Statement::Return(_)
            | Statement::ShortReturn
            | Statement::Break
            | Statement::Continue
            | Statement::Throw { .. }
    )
}

/// A body can be copied once per iteration when nothing in it leaves the loop
/// early and it declares nothing at its top level, since the copies share one
/// scope
fn can_unroll(body: &Block) -> bool {
    let declares = body.iter().any(|statement| {
        matches!(
            statement,
            Statement::VariableDeclaration(_)
                | Statement::FunctionDeclaration(_)
                | Statement::ClassDeclaration { .. }
        )
    });

    if declares {
        return false;
    }

    let mut exits = LoopExits::default();
    exits.visit_block(body);

    !exits.found
}

/// Declares the iterator with the first value, then reassigns it before
/// each later copy of the body
fn unroll(
    iterator: EntityId,
    values: impl IntoIterator<Item = Expression>,
    body: &Block,
) -> Vec<Statement> {
    let mut statements = vec![];

    for (index, value) in values.into_iter().enumerate() {
        if index == 0 {
            statements.push(Statement::VariableDeclaration(Declaration {
                variable: iterator,
                initializer: Some(value),
            }));
        } else {
            statements.push(Statement::Assignment {
                target: Expression::new(ExpressionKind::Variable(iterator), value.ty.clone()),
                source: value,
            });
        }

        statements.extend(body.iter().cloned());
    }

    statements
}

/// Finds a `break` or `continue` that belongs to the loop being inspected
#[derive(Default)]
struct LoopExits {
    found: bool,
}

impl Visitor for LoopExits {
    fn visit_statement(&mut self, statement: &Statement) {
        match statement {
            Statement::Break | Statement::Continue => self.found = true,
            _ => walk_statement(self, statement),
        }
    }

    // These belong to the nested loop
    fn visit_loop_body(&mut self, _: &Block) {}

    fn visit_function_declaration(&mut self, _: &FunctionDeclaration) {}

    fn visit_expression(&mut self, _: &Expression) {}
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    use super::*;
    use crate::{
        frontend::ast::{BinaryOperatorKind, BumpKind},
        index::Index,
        middle::{
            entity::Entities,
            ir::Callee,
            ty::Type,
        },
    };

    fn int(value: i64) -> Expression {
        Expression::literal(Literal::Integer(value))
    }

    fn variable(id: usize) -> Expression {
        Expression::new(ExpressionKind::Variable(EntityId::new(id)), Type::int())
    }

    fn serve(argument: Expression) -> Statement {
        Statement::Call(Expression::new(
            ExpressionKind::Call {
                callee: Callee::Function(EntityId::new(0)),
                arguments: vec![argument],
            },
            Type::void(),
        ))
    }

    fn optimized(statements: Block) -> Block {
        let mut program = Program {
            statements,
            entities: Entities::default(),
        };
        optimize(&mut program);
        program.statements
    }

    #[test]
    fn drops_code_after_return() {
        let body = vec![Statement::ShortReturn, serve(int(1)), serve(int(2))];

        assert_eq!(optimized(body), vec![Statement::ShortReturn]);
    }

    #[test]
    fn drops_self_assignment() {
        let statements = vec![Statement::Assignment {
            target: variable(3),
            source: variable(3),
        }];

        assert_eq!(optimized(statements), vec![]);
    }

    #[test]
    fn constant_if_inlines_the_taken_branch() {
        let statements = vec![Statement::If {
            test: Expression::boolean(false),
            consequent: vec![serve(int(1))],
            alternate: Some(Alternate::If(Box::new(Statement::If {
                test: Expression::boolean(true),
                consequent: vec![serve(int(2))],
                alternate: None,
            }))),
        }];

        assert_eq!(optimized(statements), vec![serve(int(2))]);
    }

    #[test]
    fn loops_that_never_run_disappear() {
        let statements = vec![
            Statement::While {
                test: Expression::boolean(false),
                body: vec![serve(int(1))],
            },
            Statement::ForRange {
                iterator: EntityId::new(3),
                low: int(10),
                high: int(2),
                body: vec![serve(variable(3))],
            },
            Statement::ForEach {
                iterator: EntityId::new(4),
                collection: Expression::new(
                    ExpressionKind::EmptyArray,
                    Type::array(Type::int()),
                ),
                body: vec![serve(variable(4))],
            },
            Statement::For {
                init: vec![Declaration {
                    variable: EntityId::new(5),
                    initializer: Some(int(0)),
                }],
                test: Expression::boolean(false),
                update: Box::new(Statement::Bump {
                    target: variable(5),
                    operator: BumpKind::Increment,
                }),
                body: vec![serve(variable(5))],
            },
        ];

        assert_eq!(optimized(statements), vec![]);
    }

    #[test]
    fn unrolls_small_literal_collections() {
        let collection = Expression::new(
            ExpressionKind::Array(vec![int(1), int(2)]),
            Type::array(Type::int()),
        );
        let statements = vec![Statement::ForEach {
            iterator: EntityId::new(3),
            collection,
            body: vec![serve(variable(3))],
        }];

        assert_eq!(
            optimized(statements),
            vec![
                Statement::VariableDeclaration(Declaration {
                    variable: EntityId::new(3),
                    initializer: Some(int(1)),
                }),
                serve(variable(3)),
                Statement::Assignment {
                    target: variable(3),
                    source: int(2),
                },
                serve(variable(3)),
            ]
        );
    }

    #[test]
    fn does_not_unroll_loops_that_exit_early() {
        let statements = vec![Statement::ForRange {
            iterator: EntityId::new(3),
            low: int(0),
            high: int(3),
            body: vec![Statement::If {
                test: Expression::new(
                    ExpressionKind::Binary {
                        operator: BinaryOperatorKind::Equals,
                        lhs: Box::new(variable(3)),
                        rhs: Box::new(int(1)),
                    },
                    Type::boolean(),
                ),
                consequent: vec![Statement::Break],
                alternate: None,
            }],
        }];

        assert_eq!(optimized(statements.clone()), statements);
    }

    #[test]
    fn breaks_in_nested_loops_do_not_prevent_unrolling() {
        let inner = Statement::While {
            test: Expression::new(ExpressionKind::Variable(EntityId::new(9)), Type::boolean()),
            body: vec![Statement::Break],
        };
        let statements = vec![Statement::ForRange {
            iterator: EntityId::new(3),
            low: int(0),
            high: int(2),
            body: vec![inner],
        }];

        assert_eq!(optimized(statements).len(), 4);
    }

    #[test]
    fn large_ranges_stay_loops() {
        let statements = vec![Statement::ForRange {
            iterator: EntityId::new(3),
            low: int(0),
            high: int(MAX_UNROLLED_ITERATIONS + 1),
            body: vec![serve(variable(3))],
        }];

        assert_eq!(optimized(statements.clone()), statements);
    }

    #[test]
    fn extreme_range_bounds_stay_loops() {
        for (low, high) in [(-5, i64::MAX), (i64::MIN, 0), (i64::MIN, i64::MAX)] {
            let statements = vec![Statement::ForRange {
                iterator: EntityId::new(3),
                low: int(low),
                high: int(high),
                body: vec![serve(variable(3))],
            }];

            assert_eq!(optimized(statements.clone()), statements);
        }
    }

    fn arb_expression() -> impl Strategy<Value = Expression> {
        let leaf = prop_oneof![
            (-50i64..50).prop_map(int),
            (3usize..6).prop_map(variable),
        ];

        leaf.prop_recursive(4, 24, 2, |inner| {
            (
                prop_oneof![
                    Just(BinaryOperatorKind::Add),
                    Just(BinaryOperatorKind::Subtract),
                    Just(BinaryOperatorKind::Multiply),
                    Just(BinaryOperatorKind::Divide),
                    Just(BinaryOperatorKind::Power),
                ],
                inner.clone(),
                inner,
            )
                .prop_map(|(operator, lhs, rhs)| {
                    Expression::new(
                        ExpressionKind::Binary {
                            operator,
                            lhs: Box::new(lhs),
                            rhs: Box::new(rhs),
                        },
                        Type::int(),
                    )
                })
        })
    }

    fn arb_test() -> impl Strategy<Value = Expression> {
        (arb_expression(), arb_expression()).prop_map(|(lhs, rhs)| {
            Expression::new(
                ExpressionKind::Binary {
                    operator: BinaryOperatorKind::LessThan,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                Type::boolean(),
            )
        })
    }

    fn arb_statement() -> impl Strategy<Value = Statement> {
        let leaf = prop_oneof![
            arb_expression().prop_map(serve),
            (3usize..6, arb_expression()).prop_map(|(id, source)| Statement::Assignment {
                target: variable(id),
                source,
            }),
            Just(Statement::Break),
        ];

        leaf.prop_recursive(3, 16, 3, |inner| {
            prop_oneof![
                (arb_test(), prop::collection::vec(inner.clone(), 0..3)).prop_map(
                    |(test, consequent)| Statement::If {
                        test,
                        consequent,
                        alternate: None,
                    }
                ),
                (arb_test(), prop::collection::vec(inner.clone(), 0..3))
                    .prop_map(|(test, body)| Statement::While { test, body }),
                (0i64..4, 0i64..8, prop::collection::vec(inner, 0..3)).prop_map(
                    |(low, high, body)| Statement::ForRange {
                        iterator: EntityId::new(6),
                        low: int(low),
                        high: int(high),
                        body,
                    }
                ),
            ]
        })
    }

    proptest! {
        #[test]
        fn optimizing_twice_changes_nothing(
            statements in prop::collection::vec(arb_statement(), 0..5),
        ) {
            let once = optimized(statements);
            let twice = optimized(once.clone());

            prop_assert_eq!(once, twice);
        }
    }
}

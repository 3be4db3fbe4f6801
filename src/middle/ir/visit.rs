use super::{
    Alternate, Block, Callee, Declaration, Expression, ExpressionKind, FunctionDeclaration,
    Program, Rescue, Statement,
};

/// Read-only traversal of the IR. Override a `visit_*` method to hook a node
/// kind and call the matching `walk_*` function to keep descending.
pub trait Visitor: Sized {
    fn visit_program(&mut self, program: &Program) {
        walk_block(self, &program.statements)
    }

    fn visit_block(&mut self, block: &Block) {
        walk_block(self, block)
    }

    fn visit_statement(&mut self, statement: &Statement) {
        walk_statement(self, statement)
    }

    fn visit_function_declaration(&mut self, function: &FunctionDeclaration) {
        walk_block(self, &function.body)
    }

    /// Called for every loop body, before its statements are visited
    fn visit_loop_body(&mut self, body: &Block) {
        walk_block(self, body)
    }

    fn visit_expression(&mut self, expression: &Expression) {
        walk_expression(self, expression)
    }
}

pub fn walk_block(visitor: &mut impl Visitor, block: &Block) {
    for statement in block {
        visitor.visit_statement(statement);
    }
}

fn walk_declaration(visitor: &mut impl Visitor, declaration: &Declaration) {
    if let Some(initializer) = &declaration.initializer {
        visitor.visit_expression(initializer);
    }
}

pub fn walk_statement(visitor: &mut impl Visitor, statement: &Statement) {
    match statement {
        Statement::VariableDeclaration(declaration) => walk_declaration(visitor, declaration),
        Statement::FunctionDeclaration(function) => visitor.visit_function_declaration(function),
        Statement::ClassDeclaration { methods, .. } => {
            for method in methods {
                visitor.visit_function_declaration(method);
            }
        }
        Statement::Assignment { target, source } => {
            visitor.visit_expression(target);
            visitor.visit_expression(source);
        }
        Statement::Bump { target, .. } => visitor.visit_expression(target),
        Statement::Call(call) => visitor.visit_expression(call),
        Statement::Break | Statement::Continue | Statement::ShortReturn => {}
        Statement::Return(expression) => visitor.visit_expression(expression),
        Statement::If {
            test,
            consequent,
            alternate,
        } => {
            visitor.visit_expression(test);
            visitor.visit_block(consequent);

            match alternate {
                Some(Alternate::Block(block)) => visitor.visit_block(block),
                Some(Alternate::If(statement)) => visitor.visit_statement(statement),
                None => {}
            }
        }
        Statement::While { test, body } => {
            visitor.visit_expression(test);
            visitor.visit_loop_body(body);
        }
        Statement::For {
            init,
            test,
            update,
            body,
        } => {
            for declaration in init {
                walk_declaration(visitor, declaration);
            }

            visitor.visit_expression(test);
            visitor.visit_statement(update);
            visitor.visit_loop_body(body);
        }
        Statement::ForRange {
            low, high, body, ..
        } => {
            visitor.visit_expression(low);
            visitor.visit_expression(high);
            visitor.visit_loop_body(body);
        }
        Statement::ForEach {
            collection, body, ..
        } => {
            visitor.visit_expression(collection);
            visitor.visit_loop_body(body);
        }
        Statement::Try {
            body,
            rescue,
            cleanup,
        } => {
            visitor.visit_block(body);

            if let Some(Rescue { body, .. }) = rescue {
                visitor.visit_block(body);
            }

            if let Some(cleanup) = cleanup {
                visitor.visit_block(cleanup);
            }
        }
        Statement::Throw { message, .. } => visitor.visit_expression(message),
    }
}

pub fn walk_expression(visitor: &mut impl Visitor, expression: &Expression) {
    match &expression.kind {
        ExpressionKind::Literal(_)
        | ExpressionKind::EmptyOptional
        | ExpressionKind::EmptyArray
        | ExpressionKind::Variable(_)
        | ExpressionKind::SelfField(_) => {}
        ExpressionKind::Array(elements) | ExpressionKind::Construct {
            arguments: elements,
            ..
        } => {
            for element in elements {
                visitor.visit_expression(element);
            }
        }
        ExpressionKind::Binary { lhs, rhs, .. } => {
            visitor.visit_expression(lhs);
            visitor.visit_expression(rhs);
        }
        ExpressionKind::Unary { operand, .. } => visitor.visit_expression(operand),
        ExpressionKind::Conditional {
            test,
            consequent,
            alternate,
        } => {
            visitor.visit_expression(test);
            visitor.visit_expression(consequent);
            visitor.visit_expression(alternate);
        }
        ExpressionKind::Subscript { array, index } => {
            visitor.visit_expression(array);
            visitor.visit_expression(index);
        }
        ExpressionKind::Member { object, .. } => visitor.visit_expression(object),
        ExpressionKind::Call { callee, arguments } => {
            match callee {
                Callee::Function(_) | Callee::Method { receiver: None, .. } => {}
                Callee::Method {
                    receiver: Some(receiver),
                    ..
                } => visitor.visit_expression(receiver),
                Callee::Value(value) => visitor.visit_expression(value),
            }

            for argument in arguments {
                visitor.visit_expression(argument);
            }
        }
    }
}

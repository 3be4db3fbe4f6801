use colored::Colorize;
use itertools::Itertools;

use crate::{
    index::Index,
    middle::{
        entity::{Entities, EntityId, EntityKind},
        ir::{
            Alternate, Block, Callee, Declaration, Expression, ExpressionKind,
            FunctionDeclaration, Literal, Program, Statement,
        },
        ty::TypeKind,
    },
};

/// Renders a program as an indented listing. Entities are shown as
/// `name#id` so that shadowed names stay distinguishable.
pub fn pretty_print_program(program: &Program) -> String {
    let mut printer = Printer {
        entities: &program.entities,
        output: String::new(),
        depth: 0,
    };

    printer.block(&program.statements);
    printer.output
}

struct Printer<'a> {
    entities: &'a Entities,
    output: String,
    depth: usize,
}

impl Printer<'_> {
    fn name(&self, id: EntityId) -> String {
        let entity = &self.entities[id];

        if entity.is_builtin() {
            entity.name.clone()
        } else {
            format!("{}#{}", entity.name, id.index())
        }
    }

    fn typed_name(&self, id: EntityId) -> String {
        match self.entities[id].value_type() {
            Some(ty) => format!("{}: {}", self.name(id).blue(), ty.colored()),
            None => self.name(id).blue().to_string(),
        }
    }

    fn line(&mut self, text: impl AsRef<str>) {
        self.output.push_str(&"  ".repeat(self.depth));
        self.output.push_str(text.as_ref());
        self.output.push('\n');
    }

    fn nested(&mut self, header: impl AsRef<str>, block: &Block) {
        self.line(format!("{} {}", header.as_ref(), "{".white()));
        self.depth += 1;
        self.block(block);
        self.depth -= 1;
        self.line("}".white().to_string());
    }

    fn block(&mut self, block: &Block) {
        for statement in block {
            self.statement(statement);
        }
    }

    fn declaration(&self, keyword: &str, declaration: &Declaration) -> String {
        let read_only = matches!(
            self.entities[declaration.variable].kind,
            EntityKind::Variable {
                read_only: true,
                ..
            }
        );

        let mut text = format!(
            "{} {}",
            if read_only { "const" } else { keyword }.magenta(),
            self.typed_name(declaration.variable)
        );

        if let Some(initializer) = &declaration.initializer {
            text.push_str(&format!(" = {}", self.expression(initializer)));
        }

        text
    }

    fn function(&mut self, keyword: &str, function: &FunctionDeclaration) {
        let return_type = match self.entities[function.function].value_type() {
            Some(ty) => match &**ty {
                TypeKind::Function { return_type, .. } => {
                    return_type.colored().to_string()
                }
                _ => ty.colored().to_string(),
            },
            None => "?".to_string(),
        };

        let header = format!(
            "{} {}({}) -> {}",
            keyword.magenta(),
            self.name(function.function).blue(),
            function
                .parameters
                .iter()
                .map(|parameter| self.typed_name(*parameter))
                .join(", "),
            return_type
        );

        self.nested(header, &function.body);
    }

    fn statement(&mut self, statement: &Statement) {
        match statement {
            Statement::VariableDeclaration(declaration) => {
                let text = self.declaration("let", declaration);
                self.line(text);
            }
            Statement::FunctionDeclaration(function) => self.function("fn", function),
            Statement::ClassDeclaration { class, methods } => {
                self.line(format!(
                    "{} {} {}",
                    "class".magenta(),
                    self.name(*class).blue(),
                    "{".white()
                ));
                self.depth += 1;

                if let EntityKind::Class { fields, .. } = &self.entities[*class].kind {
                    for field in fields {
                        let text = format!("{} {}", "field".magenta(), self.typed_name(*field));
                        self.line(text);
                    }
                }

                for method in methods {
                    self.function("method", method);
                }

                self.depth -= 1;
                self.line("}".white().to_string());
            }
            Statement::Assignment { target, source } => {
                let text = format!(
                    "{} {} {}",
                    self.expression(target),
                    "=".white(),
                    self.expression(source)
                );
                self.line(text);
            }
            Statement::Bump { target, operator } => {
                let text = format!("{}{}", self.expression(target), operator.to_string().white());
                self.line(text);
            }
            Statement::Call(call) => {
                let text = self.expression(call);
                self.line(text);
            }
            Statement::Break => self.line("break".magenta().to_string()),
            Statement::Continue => self.line("continue".magenta().to_string()),
            Statement::Return(value) => {
                let text = format!("{} {}", "return".magenta(), self.expression(value));
                self.line(text);
            }
            Statement::ShortReturn => self.line("return".magenta().to_string()),
            Statement::If { .. } => self.if_statement(statement, "if"),
            Statement::While { test, body } => {
                let header = format!("{} {}", "while".magenta(), self.expression(test));
                self.nested(header, body);
            }
            Statement::For {
                init,
                test,
                update,
                body,
            } => {
                let init = init
                    .iter()
                    .map(|declaration| self.declaration("let", declaration))
                    .join(", ");

                // The update is always a single line, render it on its own
                let mut update_printer = Printer {
                    entities: self.entities,
                    output: String::new(),
                    depth: 0,
                };
                update_printer.statement(update);

                let header = format!(
                    "{} ({init}; {}; {})",
                    "for".magenta(),
                    self.expression(test),
                    update_printer.output.trim_end()
                );
                self.nested(header, body);
            }
            Statement::ForRange {
                iterator,
                low,
                high,
                body,
            } => {
                let header = format!(
                    "{} {} {} {}..{}",
                    "for".magenta(),
                    self.typed_name(*iterator),
                    "in".magenta(),
                    self.expression(low),
                    self.expression(high)
                );
                self.nested(header, body);
            }
            Statement::ForEach {
                iterator,
                collection,
                body,
            } => {
                let header = format!(
                    "{} {} {} {}",
                    "for".magenta(),
                    self.typed_name(*iterator),
                    "in".magenta(),
                    self.expression(collection)
                );
                self.nested(header, body);
            }
            Statement::Try {
                body,
                rescue,
                cleanup,
            } => {
                self.nested("try".magenta().to_string(), body);

                if let Some(rescue) = rescue {
                    let header = format!(
                        "{} {} {}",
                        "rescue".magenta(),
                        self.name(rescue.kind).cyan(),
                        self.name(rescue.binding).blue()
                    );
                    self.nested(header, &rescue.body);
                }

                if let Some(cleanup) = cleanup {
                    self.nested("cleanup".magenta().to_string(), cleanup);
                }
            }
            Statement::Throw { kind, message } => {
                let text = format!(
                    "{} {}({})",
                    "throw".magenta(),
                    self.name(*kind).cyan(),
                    self.expression(message)
                );
                self.line(text);
            }
        }
    }

    fn if_statement(&mut self, statement: &Statement, keyword: &str) {
        let Statement::If {
            test,
            consequent,
            alternate,
        } = statement
        else {
            return self.statement(statement);
        };

        let header = format!("{} {}", keyword.magenta(), self.expression(test));
        self.nested(header, consequent);

        match alternate {
            Some(Alternate::Block(block)) => self.nested("else".magenta().to_string(), block),
            Some(Alternate::If(statement)) => self.if_statement(statement, "else if"),
            None => {}
        }
    }

    fn arguments(&self, arguments: &[Expression]) -> String {
        arguments
            .iter()
            .map(|argument| self.expression(argument))
            .join(", ")
    }

    fn expression(&self, expression: &Expression) -> String {
        match &expression.kind {
            ExpressionKind::Literal(literal) => match literal {
                Literal::Integer(value) => value.to_string().purple().to_string(),
                Literal::Float(value) => format!("{value:?}").purple().to_string(),
                Literal::String(value) => value.green().to_string(),
                Literal::Boolean(value) => value.to_string().purple().to_string(),
            },
            ExpressionKind::EmptyOptional => {
                format!("{} {}", "none".magenta(), expression.ty.colored())
            }
            ExpressionKind::EmptyArray => format!("{}()", expression.ty.colored()),
            ExpressionKind::Array(elements) => format!("[{}]", self.arguments(elements)),
            ExpressionKind::Variable(id) => self.name(*id).blue().to_string(),
            ExpressionKind::SelfField(id) => format!("self.{}", self.name(*id).blue()),
            ExpressionKind::Binary { operator, lhs, rhs } => format!(
                "({} {} {})",
                self.expression(lhs),
                operator.to_string().white(),
                self.expression(rhs)
            ),
            ExpressionKind::Unary { operator, operand } => {
                format!("{}({})", operator.to_string().white(), self.expression(operand))
            }
            ExpressionKind::Conditional {
                test,
                consequent,
                alternate,
            } => format!(
                "({} ? {} : {})",
                self.expression(test),
                self.expression(consequent),
                self.expression(alternate)
            ),
            ExpressionKind::Subscript { array, index } => {
                format!("{}[{}]", self.expression(array), self.expression(index))
            }
            ExpressionKind::Member {
                object,
                field,
                optional_chain,
            } => format!(
                "{}{}{}",
                self.expression(object),
                if *optional_chain { "?." } else { "." },
                self.name(*field).blue()
            ),
            ExpressionKind::Call { callee, arguments } => {
                let callee = match callee {
                    Callee::Function(id) => self.name(*id).blue().to_string(),
                    Callee::Method {
                        receiver: Some(receiver),
                        method,
                    } => format!("{}.{}", self.expression(receiver), self.name(*method).blue()),
                    Callee::Method {
                        receiver: None,
                        method,
                    } => format!("self.{}", self.name(*method).blue()),
                    Callee::Value(value) => self.expression(value),
                };

                format!("{callee}({})", self.arguments(arguments))
            }
            ExpressionKind::Construct { class, arguments } => format!(
                "{} {}({})",
                "new".magenta(),
                self.name(*class).cyan(),
                self.arguments(arguments)
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        frontend::ast::BinaryOperatorKind,
        middle::{
            entity::{builtin_entities, Entity},
            ty::Type,
        },
    };

    #[test]
    fn prints_declarations_and_loops() {
        colored::control::set_override(false);

        let (mut entities, _) = builtin_entities();
        let x = entities.push(Entity::variable("x", false, Type::int()));
        let i = entities.push(Entity::variable("i", true, Type::int()));

        let read_x = Expression::new(ExpressionKind::Variable(x), Type::int());

        let program = Program {
            statements: vec![
                Statement::VariableDeclaration(Declaration {
                    variable: x,
                    initializer: Some(Expression::new(
                        ExpressionKind::Binary {
                            operator: BinaryOperatorKind::Multiply,
                            lhs: Box::new(Expression::literal(Literal::Integer(3))),
                            rhs: Box::new(Expression::literal(Literal::Integer(7))),
                        },
                        Type::int(),
                    )),
                }),
                Statement::ForRange {
                    iterator: i,
                    low: Expression::literal(Literal::Integer(0)),
                    high: read_x.clone(),
                    body: vec![Statement::Break],
                },
            ],
            entities,
        };

        let x_name = format!("x#{}", x.index());
        let i_name = format!("i#{}", i.index());

        assert_eq!(
            pretty_print_program(&program),
            format!(
                "let {x_name}: int = (3 * 7)\nfor {i_name}: int in 0..{x_name} {{\n  break\n}}\n"
            )
        );
    }
}

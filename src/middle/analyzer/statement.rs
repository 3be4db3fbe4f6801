use tracing::trace;

use super::{
    AnalysisResult, Analyzer, ControlFlowViolation, SemanticErrorKind, TypeBoundary,
    TypeMismatch, TypeUsage,
};
use crate::{
    frontend::ast::{self, Identifier, StatementKind},
    middle::{
        entity::{Entity, EntityId, EntityKind},
        ir::{self, Literal},
        scope::ChildScope,
        ty::{Type, TypeKind},
    },
};

impl Analyzer<'_> {
    pub(super) fn analyze_statements(
        &mut self,
        statements: &[ast::Statement],
    ) -> AnalysisResult<ir::Block> {
        let mut block = ir::Block::new();

        for statement in statements {
            self.analyze_statement(statement, &mut block)?;
        }

        Ok(block)
    }

    fn analyze_block(&mut self, block: &ast::Block, scope: ChildScope) -> AnalysisResult<ir::Block> {
        self.scopes.enter(scope);
        let statements = self.analyze_statements(&block.statements)?;
        self.scopes.exit();

        Ok(statements)
    }

    /// Lowers one statement, appending the result to `block`. A declaration
    /// with several declarators becomes several IR declarations.
    fn analyze_statement(
        &mut self,
        statement: &ast::Statement,
        block: &mut ir::Block,
    ) -> AnalysisResult<()> {
        match &statement.kind {
            StatementKind::VariableDeclaration(declaration) => {
                for declaration in self.analyze_variable_declaration(declaration)? {
                    block.push(ir::Statement::VariableDeclaration(declaration));
                }
            }
            StatementKind::TypedDeclaration {
                ty,
                name,
                initializer,
            } => {
                let declared = self.resolve_type_name(ty)?;
                let span = initializer.span;
                let initializer = self.analyze_expression(initializer)?;
                self.check_assignable(&initializer, &declared, TypeBoundary::Declaration, span)?;

                let variable = self.declare(name, Entity::variable(&name.name, false, declared))?;

                block.push(ir::Statement::VariableDeclaration(ir::Declaration {
                    variable,
                    initializer: Some(initializer),
                }));
            }
            StatementKind::FunctionDeclaration(function) => {
                let function = self.analyze_function_declaration(function)?;
                block.push(ir::Statement::FunctionDeclaration(function));
            }
            StatementKind::ClassDeclaration(class) => {
                block.push(self.analyze_class_declaration(class)?);
            }
            StatementKind::Assignment { target, source } => {
                let target = self.analyze_place(target)?;
                let source_span = source.span;
                let source = self.analyze_expression(source)?;
                self.check_assignable(&source, &target.ty, TypeBoundary::Assignment, source_span)?;

                block.push(ir::Statement::Assignment { target, source });
            }
            StatementKind::Bump { operator, target } => {
                let span = target.span;
                let target = self.analyze_place(target)?;
                self.check_usage(&target.ty, TypeKind::is_int, TypeUsage::Integer, span)?;

                block.push(ir::Statement::Bump {
                    target,
                    operator: *operator,
                });
            }
            StatementKind::Call(call) => {
                block.push(ir::Statement::Call(self.analyze_expression(call)?));
            }
            StatementKind::Break | StatementKind::Continue => {
                let is_break = matches!(statement.kind, StatementKind::Break);

                if !self.scopes.in_loop() {
                    let violation = if is_break {
                        ControlFlowViolation::Break
                    } else {
                        ControlFlowViolation::Continue
                    };

                    return Err(self.error(statement.span, violation));
                }

                block.push(if is_break {
                    ir::Statement::Break
                } else {
                    ir::Statement::Continue
                });
            }
            StatementKind::Return(value) => {
                block.push(self.analyze_return(statement, value.as_deref())?);
            }
            StatementKind::If(if_statement) => {
                block.push(self.analyze_if_statement(if_statement)?);
            }
            StatementKind::While { test, body } => {
                let test = self.analyze_test(test)?;
                let body = self.analyze_block(body, ChildScope::looping())?;

                block.push(ir::Statement::While { test, body });
            }
            StatementKind::For {
                init,
                test,
                update,
                body,
            } => {
                // The loop variables live in their own scope around the body
                self.scopes.enter(ChildScope::block());

                let init = self.analyze_variable_declaration(init)?;
                let test = self.analyze_test(test)?;

                // The parser only accepts a bump or an assignment here, each
                // of which lowers to exactly one statement
                let mut updates = ir::Block::new();
                self.analyze_statement(update, &mut updates)?;
                let update = match updates.pop() {
                    Some(update) if updates.is_empty() => update,
                    _ => unreachable!("a loop update lowers to one statement"),
                };

                let body = self.analyze_block(body, ChildScope::looping())?;
                self.scopes.exit();

                block.push(ir::Statement::For {
                    init,
                    test,
                    update: Box::new(update),
                    body,
                });
            }
            StatementKind::ForRange {
                iterator,
                low,
                high,
                body,
            } => {
                let low_span = low.span;
                let high_span = high.span;
                let low = self.analyze_expression(low)?;
                let high = self.analyze_expression(high)?;
                self.check_usage(&low.ty, TypeKind::is_int, TypeUsage::Integer, low_span)?;
                self.check_usage(&high.ty, TypeKind::is_int, TypeUsage::Integer, high_span)?;

                self.scopes.enter(ChildScope::looping());
                let iterator =
                    self.declare(iterator, Entity::variable(&iterator.name, true, Type::int()))?;
                let body = self.analyze_statements(&body.statements)?;
                self.scopes.exit();

                block.push(ir::Statement::ForRange {
                    iterator,
                    low,
                    high,
                    body,
                });
            }
            StatementKind::ForEach {
                iterator,
                collection,
                body,
            } => {
                let span = collection.span;
                let collection = self.analyze_expression(collection)?;
                let Some(element) = collection.ty.element_type().cloned() else {
                    return Err(self.error(
                        span,
                        TypeMismatch::InvalidOperand {
                            expected: TypeUsage::Array,
                            actual: collection.ty.clone(),
                        },
                    ));
                };

                self.scopes.enter(ChildScope::looping());
                let iterator =
                    self.declare(iterator, Entity::variable(&iterator.name, true, element))?;
                let body = self.analyze_statements(&body.statements)?;
                self.scopes.exit();

                block.push(ir::Statement::ForEach {
                    iterator,
                    collection,
                    body,
                });
            }
            StatementKind::Try {
                body,
                rescue,
                cleanup,
            } => {
                let body = self.analyze_block(body, ChildScope::block())?;

                let rescue = match rescue {
                    Some(rescue) => {
                        let kind = self.resolve_error_kind(&rescue.kind)?;

                        self.scopes.enter(ChildScope::block());
                        let binding = self.declare(
                            &rescue.binding,
                            Entity::variable(&rescue.binding.name, false, self.class_type(kind)),
                        )?;
                        let body = self.analyze_statements(&rescue.body.statements)?;
                        self.scopes.exit();

                        Some(ir::Rescue {
                            kind,
                            binding,
                            body,
                        })
                    }
                    None => None,
                };

                let cleanup = match cleanup {
                    Some(cleanup) => Some(self.analyze_block(cleanup, ChildScope::block())?),
                    None => None,
                };

                block.push(ir::Statement::Try {
                    body,
                    rescue,
                    cleanup,
                });
            }
            StatementKind::Throw { message, kind } => {
                let kind = self.resolve_error_kind(kind)?;
                let span = message.span;
                let message = self.analyze_expression(message)?;
                self.check_usage(&message.ty, TypeKind::is_string, TypeUsage::String, span)?;

                block.push(ir::Statement::Throw { kind, message });
            }
        }

        Ok(())
    }

    fn analyze_variable_declaration(
        &mut self,
        declaration: &ast::VariableDeclaration,
    ) -> AnalysisResult<Vec<ir::Declaration>> {
        let mut declarations = Vec::with_capacity(declaration.declarators.len());

        for declarator in &declaration.declarators {
            let annotation = match &declarator.ty {
                Some(ty) => Some(self.resolve_type(ty)?),
                None => None,
            };

            // The initializer is analyzed before the name is in scope, so a
            // variable cannot refer to itself
            let initializer = match &declarator.initializer {
                Some(initializer) => {
                    let span = initializer.span;
                    let initializer = self.analyze_expression(initializer)?;
                    self.check_usage(
                        &initializer.ty,
                        |ty| !ty.is_void(),
                        TypeUsage::Value,
                        span,
                    )?;
                    Some((initializer, span))
                }
                None => None,
            };

            let (ty, initializer) = match (annotation, initializer) {
                (Some(ty), Some((initializer, span))) => {
                    self.check_assignable(&initializer, &ty, TypeBoundary::Declaration, span)?;
                    (ty, Some(initializer))
                }
                (None, Some((initializer, _))) => (initializer.ty.clone(), Some(initializer)),
                (Some(ty), None) => {
                    let initializer = default_value(&ty);
                    (ty, initializer)
                }
                // The parser requires a type or an initializer
                (None, None) => {
                    return Err(self.error(
                        declarator.span,
                        SemanticErrorKind::InvalidTypeAnnotation(declarator.name.name.clone()),
                    ));
                }
            };

            let variable = self.declare(
                &declarator.name,
                Entity::variable(&declarator.name.name, declaration.is_const, ty),
            )?;

            trace!(name = %declarator.name.name, id = ?variable, "declared variable");

            declarations.push(ir::Declaration {
                variable,
                initializer,
            });
        }

        Ok(declarations)
    }

    fn resolve_signature(
        &self,
        parameters: &[ast::Parameter],
        return_type: Option<&ast::Type>,
    ) -> AnalysisResult<Type> {
        let parameters = parameters
            .iter()
            .map(|parameter| self.resolve_type(&parameter.ty))
            .collect::<AnalysisResult<Vec<_>>>()?;

        let return_type = match return_type {
            Some(ty) => self.resolve_type(ty)?,
            None => Type::void(),
        };

        Ok(Type::function(parameters, return_type))
    }

    fn set_function_type(&mut self, function: EntityId, signature: Type) {
        if let EntityKind::Function { ty, .. } = &mut self.entities[function].kind {
            *ty = Some(signature);
        }
    }

    fn analyze_function_declaration(
        &mut self,
        declaration: &ast::FunctionDeclaration,
    ) -> AnalysisResult<ir::FunctionDeclaration> {
        // Declared before the signature is resolved so the body can recurse
        let function = self.declare(&declaration.name, Entity::function(&declaration.name.name))?;

        let signature =
            self.resolve_signature(&declaration.parameters, declaration.return_type.as_ref())?;
        self.set_function_type(function, signature);

        trace!(name = %declaration.name.name, id = ?function, "declared function");

        self.analyze_function_body(function, declaration)
    }

    /// Analyzes the parameters and body of a function whose entity already
    /// carries its signature
    fn analyze_function_body(
        &mut self,
        function: EntityId,
        declaration: &ast::FunctionDeclaration,
    ) -> AnalysisResult<ir::FunctionDeclaration> {
        let parameter_types = self
            .function_type(function)
            .map(|(parameters, _)| parameters.to_vec())
            .unwrap_or_default();

        self.scopes.enter(ChildScope::function(function));

        let parameters = declaration
            .parameters
            .iter()
            .zip(parameter_types)
            .map(|(parameter, ty)| {
                self.declare(&parameter.name, Entity::variable(&parameter.name.name, false, ty))
            })
            .collect::<AnalysisResult<Vec<_>>>()?;

        let body = self.analyze_statements(&declaration.body.statements)?;
        self.scopes.exit();

        Ok(ir::FunctionDeclaration {
            function,
            parameters,
            body,
        })
    }

    fn analyze_class_declaration(
        &mut self,
        declaration: &ast::ClassDeclaration,
    ) -> AnalysisResult<ir::Statement> {
        // The name is visible right away so that methods can use the class,
        // while field types that mention it are rejected
        let class = self.declare(
            &declaration.name,
            Entity {
                name: declaration.name.name.clone(),
                kind: EntityKind::Class {
                    fields: Vec::new(),
                    methods: Vec::new(),
                    error_kind: None,
                },
            },
        )?;

        self.scopes.enter(ChildScope::class(class));

        self.declaring_class = Some(class);
        let fields = declaration
            .fields
            .iter()
            .map(|field| {
                let ty = self.resolve_type(&field.ty)?;
                self.declare(
                    &field.name,
                    Entity {
                        name: field.name.name.clone(),
                        kind: EntityKind::Field { ty, builtin: false },
                    },
                )
            })
            .collect::<AnalysisResult<Vec<_>>>();
        self.declaring_class = None;
        let fields = fields?;

        if let EntityKind::Class { fields: slot, .. } = &mut self.entities[class].kind {
            *slot = fields;
        }

        // Every method signature is known before any method body is analyzed
        let mut methods = Vec::with_capacity(declaration.methods.len());
        for method in &declaration.methods {
            let id = self.declare(&method.name, Entity::function(&method.name.name))?;
            let signature = self.resolve_signature(&method.parameters, method.return_type.as_ref())?;
            self.set_function_type(id, signature);

            if let EntityKind::Class {
                methods: class_methods,
                ..
            } = &mut self.entities[class].kind
            {
                class_methods.push(id);
            }

            methods.push(id);
        }

        let methods = methods
            .into_iter()
            .zip(&declaration.methods)
            .map(|(id, method)| self.analyze_function_body(id, method))
            .collect::<AnalysisResult<Vec<_>>>()?;

        self.scopes.exit();

        trace!(name = %declaration.name.name, id = ?class, "declared class");

        Ok(ir::Statement::ClassDeclaration { class, methods })
    }

    fn analyze_return(
        &mut self,
        statement: &ast::Statement,
        value: Option<&ast::Expression>,
    ) -> AnalysisResult<ir::Statement> {
        let return_type = self
            .scopes
            .function()
            .and_then(|function| self.function_type(function))
            .map(|(_, return_type)| return_type.clone());

        let Some(return_type) = return_type else {
            return Err(self.error(statement.span, ControlFlowViolation::ReturnOutsideFunction));
        };

        match value {
            Some(_) if return_type.is_void() => Err(self.error(
                statement.span,
                ControlFlowViolation::UnexpectedReturnValue,
            )),
            Some(value) => {
                let span = value.span;
                let value = self.analyze_expression(value)?;
                self.check_assignable(&value, &return_type, TypeBoundary::Return, span)?;

                Ok(ir::Statement::Return(value))
            }
            None if return_type.is_void() => Ok(ir::Statement::ShortReturn),
            None => Err(self.error(statement.span, ControlFlowViolation::MissingReturnValue)),
        }
    }

    fn analyze_if_statement(&mut self, statement: &ast::IfStatement) -> AnalysisResult<ir::Statement> {
        let test = self.analyze_test(&statement.test)?;
        let consequent = self.analyze_block(&statement.consequent, ChildScope::block())?;

        let alternate = match &statement.alternate {
            Some(ast::ElseBranch::Block(block)) => Some(ir::Alternate::Block(
                self.analyze_block(block, ChildScope::block())?,
            )),
            Some(ast::ElseBranch::If(statement)) => Some(ir::Alternate::If(Box::new(
                self.analyze_if_statement(statement)?,
            ))),
            None => None,
        };

        Ok(ir::Statement::If {
            test,
            consequent,
            alternate,
        })
    }

    /// Analyzes a loop or `if` condition, which must be a boolean
    fn analyze_test(&mut self, test: &ast::Expression) -> AnalysisResult<ir::Expression> {
        let span = test.span;
        let test = self.analyze_expression(test)?;
        self.check_usage(&test.ty, TypeKind::is_boolean, TypeUsage::Boolean, span)?;

        Ok(test)
    }

    /// Analyzes the target of an assignment or bump. Only variables, fields
    /// and subscripts can be written to, and never read-only variables.
    fn analyze_place(&mut self, target: &ast::Expression) -> AnalysisResult<ir::Expression> {
        let span = target.span;
        let place = self.analyze_expression(target)?;

        let writable = match &place.kind {
            ir::ExpressionKind::Variable(id) => !self.entities[*id].is_read_only(),
            ir::ExpressionKind::SelfField(_) | ir::ExpressionKind::Subscript { .. } => true,
            ir::ExpressionKind::Member {
                field,
                optional_chain,
                ..
            } => !*optional_chain && !self.entities[*field].is_builtin(),
            _ => false,
        };

        if !writable {
            return Err(self.error(
                span,
                SemanticErrorKind::ReadOnlyAssignment(self.text(span).to_string()),
            ));
        }

        Ok(place)
    }

    /// Looks up the kind named in a `rescue` clause or an `eightysix`
    fn resolve_error_kind(&self, name: &Identifier) -> AnalysisResult<EntityId> {
        let id = self.lookup(name)?;

        match &self.entities[id].kind {
            EntityKind::Class {
                error_kind: Some(_),
                ..
            } => Ok(id),
            _ => Err(self.error(
                name.span,
                SemanticErrorKind::InvalidErrorKind(name.name.clone()),
            )),
        }
    }
}

/// The value a declaration without an initializer starts out with. Class
/// typed variables have none.
fn default_value(ty: &Type) -> Option<ir::Expression> {
    let literal = match &**ty {
        TypeKind::Primitive(_) if ty.is_int() => Literal::Integer(0),
        TypeKind::Primitive(_) if ty.is_float() => Literal::Float(0.0),
        TypeKind::Primitive(_) if ty.is_string() => Literal::String("\"\"".to_string()),
        TypeKind::Primitive(_) if ty.is_boolean() => Literal::Boolean(false),
        TypeKind::Optional(_) => {
            return Some(ir::Expression::new(ir::ExpressionKind::EmptyOptional, ty.clone()));
        }
        TypeKind::Array(_) => {
            return Some(ir::Expression::new(ir::ExpressionKind::EmptyArray, ty.clone()));
        }
        _ => return None,
    };

    Some(ir::Expression::literal(literal))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_the_type() {
        assert_eq!(
            default_value(&Type::int()).and_then(|e| e.as_literal().cloned()),
            Some(Literal::Integer(0))
        );
        assert_eq!(
            default_value(&Type::string()).and_then(|e| e.as_literal().cloned()),
            Some(Literal::String("\"\"".to_string()))
        );

        let optional = default_value(&Type::optional(Type::int())).unwrap();
        assert_eq!(optional.kind, ir::ExpressionKind::EmptyOptional);
        assert_eq!(optional.ty, Type::optional(Type::int()));

        assert!(default_value(&Type::any()).is_none());
    }
}

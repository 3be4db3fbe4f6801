use super::{
    AnalysisResult, Analyzer, OperandContext, SemanticError, SemanticErrorKind, TypeBoundary,
    TypeMismatch, TypeUsage,
};
use crate::{
    frontend::{
        Span,
        ast::{self, BinaryOperatorClass, BinaryOperatorKind, Identifier, UnaryOperatorKind},
    },
    middle::{
        entity::{EntityId, EntityKind, Intrinsic},
        ir::{Callee, Expression, ExpressionKind},
        ty::{Type, TypeKind},
    },
};

impl Analyzer<'_> {
    pub(super) fn analyze_expression(
        &mut self,
        expression: &ast::Expression,
    ) -> AnalysisResult<Expression> {
        let span = expression.span;

        match &expression.kind {
            ast::ExpressionKind::Literal(literal) => Ok(Expression::literal(literal.clone())),
            ast::ExpressionKind::EmptyOptional(base) => Ok(Expression::new(
                ExpressionKind::EmptyOptional,
                Type::optional(self.resolve_type(base)?),
            )),
            ast::ExpressionKind::EmptyArray(ty) => {
                let ty = self.resolve_type(ty)?;
                self.check_usage(&ty, |ty| ty.element_type().is_some(), TypeUsage::Array, span)?;

                Ok(Expression::new(ExpressionKind::EmptyArray, ty))
            }
            ast::ExpressionKind::Array(elements) => self.analyze_array(elements, span),
            ast::ExpressionKind::Identifier(name) => self.analyze_identifier(name),
            ast::ExpressionKind::Binary { operator, lhs, rhs } => {
                self.analyze_binary(operator.kind, lhs, rhs)
            }
            ast::ExpressionKind::Unary { operator, operand } => {
                self.analyze_unary(operator.kind, operand)
            }
            ast::ExpressionKind::Conditional {
                test,
                consequent,
                alternate,
            } => {
                let test_span = test.span;
                let alternate_span = alternate.span;

                let test = self.analyze_expression(test)?;
                self.check_usage(&test.ty, TypeKind::is_boolean, TypeUsage::Boolean, test_span)?;

                let consequent = self.analyze_expression(consequent)?;
                let alternate = self.analyze_expression(alternate)?;
                self.check_equivalent(
                    &consequent.ty,
                    &alternate.ty,
                    OperandContext::ConditionalBranches,
                    alternate_span,
                )?;

                let ty = consequent.ty.clone();
                Ok(Expression::new(
                    ExpressionKind::Conditional {
                        test: Box::new(test),
                        consequent: Box::new(consequent),
                        alternate: Box::new(alternate),
                    },
                    ty,
                ))
            }
            ast::ExpressionKind::Subscript { array, index } => {
                let array_span = array.span;
                let index_span = index.span;

                let array = self.analyze_expression(array)?;
                let Some(element) = array.ty.element_type().cloned() else {
                    return Err(self.invalid_operand(TypeUsage::Array, &array.ty, array_span));
                };

                let index = self.analyze_expression(index)?;
                self.check_usage(&index.ty, TypeKind::is_int, TypeUsage::Integer, index_span)?;

                Ok(Expression::new(
                    ExpressionKind::Subscript {
                        array: Box::new(array),
                        index: Box::new(index),
                    },
                    element,
                ))
            }
            ast::ExpressionKind::Member {
                object,
                field,
                optional_chain,
            } => {
                let object_span = object.span;
                let object = self.analyze_expression(object)?;
                self.analyze_member(object, object_span, field, *optional_chain)
            }
            ast::ExpressionKind::Call { callee, arguments } => {
                self.analyze_call(callee, arguments, span)
            }
            ast::ExpressionKind::New { class, arguments } => {
                let id = self.lookup(class)?;

                if !matches!(self.entities[id].kind, EntityKind::Class { .. }) {
                    return Err(self.error(
                        class.span,
                        SemanticErrorKind::InvalidTypeAnnotation(class.name.clone()),
                    ));
                }

                self.analyze_construction(id, arguments, span)
            }
        }
    }

    #[track_caller]
    fn invalid_operand(&self, expected: TypeUsage, actual: &Type, span: Span) -> SemanticError {
        self.error(
            span,
            TypeMismatch::InvalidOperand {
                expected,
                actual: actual.clone(),
            },
        )
    }

    /// Non-empty array literals take the type of their first element, and
    /// every other element must have the same type. `[]` has no type at all.
    fn analyze_array(
        &mut self,
        elements: &[ast::Expression],
        span: Span,
    ) -> AnalysisResult<Expression> {
        if elements.is_empty() {
            return Err(self.error(
                span,
                SemanticErrorKind::InvalidTypeAnnotation(self.text(span).to_string()),
            ));
        }

        let mut analyzed: Vec<Expression> = Vec::with_capacity(elements.len());

        for element in elements {
            let element_span = element.span;
            let element = self.analyze_expression(element)?;

            if let Some(first) = analyzed.first() {
                self.check_equivalent(
                    &first.ty,
                    &element.ty,
                    OperandContext::ArrayElements,
                    element_span,
                )?;
            }

            analyzed.push(element);
        }

        let ty = Type::array(analyzed[0].ty.clone());
        Ok(Expression::new(ExpressionKind::Array(analyzed), ty))
    }

    fn analyze_identifier(&mut self, name: &Identifier) -> AnalysisResult<Expression> {
        let id = self.lookup(name)?;

        match &self.entities[id].kind {
            EntityKind::Variable { ty, .. }
            | EntityKind::Function { ty: Some(ty), .. } => {
                Ok(Expression::new(ExpressionKind::Variable(id), ty.clone()))
            }
            EntityKind::Field { ty, .. } => {
                Ok(Expression::new(ExpressionKind::SelfField(id), ty.clone()))
            }
            EntityKind::Function { ty: None, .. } => Err(self.error(
                name.span,
                SemanticErrorKind::UndeclaredIdentifier(name.name.clone()),
            )),
            EntityKind::Class { .. } | EntityKind::TypeName(_) => Err(self.error(
                name.span,
                TypeMismatch::NotAValue(name.name.clone()),
            )),
        }
    }

    fn analyze_binary(
        &mut self,
        operator: BinaryOperatorKind,
        lhs: &ast::Expression,
        rhs: &ast::Expression,
    ) -> AnalysisResult<Expression> {
        let lhs_span = lhs.span;
        let rhs_span = rhs.span;
        let lhs = self.analyze_expression(lhs)?;
        let rhs = self.analyze_expression(rhs)?;

        let ty = match operator.class() {
            BinaryOperatorClass::Coalesce => {
                let Some(base) = lhs.ty.base_type().cloned() else {
                    return Err(self.invalid_operand(TypeUsage::Optional, &lhs.ty, lhs_span));
                };

                self.check_assignable(&rhs, &base, TypeBoundary::Coalesce, rhs_span)?;
                base
            }
            BinaryOperatorClass::Equality => {
                self.check_equivalent(&lhs.ty, &rhs.ty, OperandContext::BinaryOperator, rhs_span)?;
                Type::boolean()
            }
            class => {
                let (usage, supported) = match class {
                    BinaryOperatorClass::Arithmetic if operator == BinaryOperatorKind::Add => (
                        TypeUsage::NumericOrString,
                        lhs.ty.is_numeric() || lhs.ty.is_string(),
                    ),
                    _ => (
                        operand_usage(class),
                        lhs.ty
                            .as_primitive()
                            .is_some_and(|primitive| primitive.supports_binary_op(class)),
                    ),
                };

                if !supported {
                    return Err(self.invalid_operand(usage, &lhs.ty, lhs_span));
                }

                self.check_equivalent(&lhs.ty, &rhs.ty, OperandContext::BinaryOperator, rhs_span)?;

                match class {
                    BinaryOperatorClass::Comparison | BinaryOperatorClass::Logical => {
                        Type::boolean()
                    }
                    _ => lhs.ty.clone(),
                }
            }
        };

        Ok(Expression::new(
            ExpressionKind::Binary {
                operator,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            ty,
        ))
    }

    fn analyze_unary(
        &mut self,
        operator: UnaryOperatorKind,
        operand: &ast::Expression,
    ) -> AnalysisResult<Expression> {
        let span = operand.span;
        let operand = self.analyze_expression(operand)?;

        let ty = match operator {
            UnaryOperatorKind::Negate => {
                self.check_usage(&operand.ty, TypeKind::is_numeric, TypeUsage::Numeric, span)?;
                operand.ty.clone()
            }
            UnaryOperatorKind::Not => {
                self.check_usage(&operand.ty, TypeKind::is_boolean, TypeUsage::Boolean, span)?;
                Type::boolean()
            }
            UnaryOperatorKind::Length => {
                self.check_usage(
                    &operand.ty,
                    |ty| ty.element_type().is_some(),
                    TypeUsage::Array,
                    span,
                )?;
                Type::int()
            }
            UnaryOperatorKind::Random => match operand.ty.element_type() {
                Some(element) => element.clone(),
                None => return Err(self.invalid_operand(TypeUsage::Array, &operand.ty, span)),
            },
            UnaryOperatorKind::Wrap => {
                self.check_usage(&operand.ty, |ty| !ty.is_void(), TypeUsage::Value, span)?;
                Type::optional(operand.ty.clone())
            }
        };

        Ok(Expression::new(
            ExpressionKind::Unary {
                operator,
                operand: Box::new(operand),
            },
            ty,
        ))
    }

    /// Resolves `object.field` or `object?.field`. Optional chaining yields
    /// an optional of the field type, without wrapping a field that is
    /// already optional a second time.
    fn analyze_member(
        &mut self,
        object: Expression,
        object_span: Span,
        field: &Identifier,
        optional_chain: bool,
    ) -> AnalysisResult<Expression> {
        let (class, usage) = if optional_chain {
            (
                object.ty.base_type().and_then(|base| base.class_id()),
                TypeUsage::OptionalClass,
            )
        } else {
            (object.ty.class_id(), TypeUsage::Class)
        };

        let Some(class) = class else {
            return Err(self.invalid_operand(usage, &object.ty, object_span));
        };

        let member = self
            .find_member(class, &field.name)
            .filter(|member| matches!(self.entities[*member].kind, EntityKind::Field { .. }));

        let Some((member, field_type)) = member.and_then(|member| {
            self.entities[member]
                .value_type()
                .map(|ty| (member, ty.clone()))
        }) else {
            return Err(self.error(
                field.span,
                SemanticErrorKind::NoSuchMember {
                    member: field.name.clone(),
                    class: self.entities[class].name.clone(),
                    private: false,
                },
            ));
        };

        self.check_member_visible(class, field)?;

        let ty = if optional_chain && field_type.base_type().is_none() {
            Type::optional(field_type)
        } else {
            field_type
        };

        Ok(Expression::new(
            ExpressionKind::Member {
                object: Box::new(object),
                field: member,
                optional_chain,
            },
            ty,
        ))
    }

    fn analyze_call(
        &mut self,
        callee: &ast::Expression,
        arguments: &[ast::Expression],
        span: Span,
    ) -> AnalysisResult<Expression> {
        let callee_span = callee.span;

        let (callee, callee_type) = match &callee.kind {
            ast::ExpressionKind::Identifier(name) => {
                let id = self.lookup(name)?;

                match &self.entities[id].kind {
                    EntityKind::Class { .. } => {
                        return self.analyze_construction(id, arguments, span);
                    }
                    EntityKind::Function {
                        intrinsic: Some(intrinsic),
                        ..
                    } => {
                        let intrinsic = *intrinsic;
                        return self.analyze_intrinsic_call(id, intrinsic, arguments, span);
                    }
                    EntityKind::Function { ty: Some(ty), .. } => {
                        let callee = if self.is_method_of_enclosing_class(id) {
                            Callee::Method {
                                receiver: None,
                                method: id,
                            }
                        } else {
                            Callee::Function(id)
                        };

                        (callee, ty.clone())
                    }
                    _ => {
                        let value = self.analyze_identifier(name)?;
                        let ty = value.ty.clone();
                        (Callee::Value(Box::new(value)), ty)
                    }
                }
            }
            ast::ExpressionKind::Member {
                object,
                field,
                optional_chain: false,
            } => {
                let object_span = object.span;
                let object = self.analyze_expression(object)?;

                let method = object.ty.class_id().and_then(|class| {
                    self.find_member(class, &field.name)
                        .filter(|member| {
                            matches!(self.entities[*member].kind, EntityKind::Function { .. })
                        })
                        .map(|method| (class, method))
                });

                match method {
                    Some((class, method)) => {
                        self.check_member_visible(class, field)?;

                        let ty = self.entities[method]
                            .value_type()
                            .cloned()
                            .unwrap_or_else(Type::void);

                        let callee = Callee::Method {
                            receiver: Some(Box::new(object)),
                            method,
                        };

                        (callee, ty)
                    }
                    None => {
                        let value = self.analyze_member(object, object_span, field, false)?;
                        let ty = value.ty.clone();
                        (Callee::Value(Box::new(value)), ty)
                    }
                }
            }
            _ => {
                let value = self.analyze_expression(callee)?;
                let ty = value.ty.clone();
                (Callee::Value(Box::new(value)), ty)
            }
        };

        let TypeKind::Function {
            parameters,
            return_type,
        } = &*callee_type
        else {
            return Err(self.invalid_operand(TypeUsage::Callable, &callee_type, callee_span));
        };

        let arguments = self.analyze_arguments(arguments, parameters, TypeBoundary::Argument, span)?;

        Ok(Expression::new(
            ExpressionKind::Call { callee, arguments },
            return_type.clone(),
        ))
    }

    /// `serve` takes anything and `count` takes an array of any element
    /// type. The other intrinsics are checked like ordinary functions.
    fn analyze_intrinsic_call(
        &mut self,
        id: EntityId,
        intrinsic: Intrinsic,
        arguments: &[ast::Expression],
        span: Span,
    ) -> AnalysisResult<Expression> {
        let callee = Callee::Function(id);

        let (arguments, ty) = match intrinsic {
            _ if intrinsic.is_variadic() => {
                let arguments = arguments
                    .iter()
                    .map(|argument| self.analyze_expression(argument))
                    .collect::<AnalysisResult<Vec<_>>>()?;

                (arguments, Type::void())
            }
            Intrinsic::Count => {
                let [argument] = arguments else {
                    return Err(self.error(
                        span,
                        SemanticErrorKind::ArityMismatch {
                            expected: 1,
                            actual: arguments.len(),
                        },
                    ));
                };

                let argument_span = argument.span;
                let argument = self.analyze_expression(argument)?;
                self.check_usage(
                    &argument.ty,
                    |ty| ty.element_type().is_some(),
                    TypeUsage::Array,
                    argument_span,
                )?;

                (vec![argument], Type::int())
            }
            _ => {
                let ty = intrinsic.ty();
                let TypeKind::Function {
                    parameters,
                    return_type,
                } = &*ty
                else {
                    return Err(self.invalid_operand(TypeUsage::Callable, &ty, span));
                };

                let arguments =
                    self.analyze_arguments(arguments, parameters, TypeBoundary::Argument, span)?;

                (arguments, return_type.clone())
            }
        };

        Ok(Expression::new(ExpressionKind::Call { callee, arguments }, ty))
    }

    /// Constructor arguments line up with the class fields in declaration
    /// order
    fn analyze_construction(
        &mut self,
        class: EntityId,
        arguments: &[ast::Expression],
        span: Span,
    ) -> AnalysisResult<Expression> {
        let (fields, _) = self.class_members(class);
        let field_types = fields
            .iter()
            .filter_map(|field| self.entities[*field].value_type().cloned())
            .collect::<Vec<_>>();

        let arguments = self.analyze_arguments(
            arguments,
            &field_types,
            TypeBoundary::ConstructorArgument,
            span,
        )?;

        Ok(Expression::new(
            ExpressionKind::Construct { class, arguments },
            self.class_type(class),
        ))
    }

    fn analyze_arguments(
        &mut self,
        arguments: &[ast::Expression],
        parameters: &[Type],
        boundary: TypeBoundary,
        span: Span,
    ) -> AnalysisResult<Vec<Expression>> {
        if arguments.len() != parameters.len() {
            return Err(self.error(
                span,
                SemanticErrorKind::ArityMismatch {
                    expected: parameters.len(),
                    actual: arguments.len(),
                },
            ));
        }

        arguments
            .iter()
            .zip(parameters)
            .map(|(argument, parameter)| {
                let argument_span = argument.span;
                let argument = self.analyze_expression(argument)?;
                self.check_assignable(&argument, parameter, boundary, argument_span)?;

                Ok(argument)
            })
            .collect()
    }
}

/// What the left operand of a binary operator must be
fn operand_usage(class: BinaryOperatorClass) -> TypeUsage {
    match class {
        BinaryOperatorClass::Arithmetic => TypeUsage::Numeric,
        BinaryOperatorClass::Bitwise => TypeUsage::Integer,
        BinaryOperatorClass::Comparison => TypeUsage::NumericOrString,
        BinaryOperatorClass::Logical => TypeUsage::Boolean,
        BinaryOperatorClass::Equality | BinaryOperatorClass::Coalesce => TypeUsage::Value,
    }
}

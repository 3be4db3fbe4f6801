//! Sous Semantic Analyzer
//!
//! Analysis is a single walk over the AST. Every name is resolved through a
//! stack of scopes into an entity, every expression is given a type, and the
//! rules of the language are checked along the way:
//!
//!   1) declarations must be unique in their scope and names must be declared
//!      before they are used
//!   2) values may only flow into slots whose type they are assignable to
//!   3) `break`, `continue` and `return` may only appear where they make sense
//!
//! Analysis stops at the first violation. When it succeeds, the result is an
//! [`ir::Program`] in which every name has become an [`EntityId`] and every
//! expression carries its type, so nothing after this point reports errors.

mod error;
mod expression;
mod statement;

pub use error::{
    ControlFlowViolation, OperandContext, SemanticError, SemanticErrorKind, TypeBoundary,
    TypeMismatch, TypeUsage,
};

use tracing::debug;

use crate::{
    frontend::{
        Span, SourceFile,
        ast::{self, Identifier},
    },
    middle::{
        entity::{Entities, Entity, EntityId, EntityKind, builtin_entities},
        ir,
        scope::Scopes,
        ty::{Type, TypeKind},
    },
};

type AnalysisResult<T> = Result<T, SemanticError>;

/// Checks a parsed program and lowers it to the typed IR
pub fn analyze(source: &SourceFile, program: &ast::Program) -> Result<ir::Program, SemanticError> {
    let mut analyzer = Analyzer::new(source);

    let statements = analyzer.analyze_statements(&program.statements)?;

    debug!(
        statements = statements.len(),
        entities = analyzer.entities.len(),
        "analysis finished"
    );

    Ok(ir::Program {
        statements,
        entities: analyzer.entities,
    })
}

struct Analyzer<'source> {
    /// Used for error positions
    source: &'source SourceFile,
    entities: Entities,
    scopes: Scopes,
    /// The class whose fields are being resolved, used to reject fields whose
    /// type is the class itself
    declaring_class: Option<EntityId>,
}

impl<'source> Analyzer<'source> {
    fn new(source: &'source SourceFile) -> Self {
        let (entities, bindings) = builtin_entities();

        let root = bindings
            .iter()
            .map(|id| (entities[*id].name.clone(), *id))
            .collect::<Vec<_>>();

        Self {
            source,
            entities,
            scopes: Scopes::new(root),
            declaring_class: None,
        }
    }

    /// Builds the error for a rule violated at `span`. With the
    /// `error-backtrace` feature, the analyzer location that raised it is
    /// logged as well.
    #[track_caller]
    fn error(&self, span: Span, kind: impl Into<SemanticErrorKind>) -> SemanticError {
        let kind = kind.into();

        #[cfg(feature = "error-backtrace")]
        debug!(raised_at = %std::panic::Location::caller(), error = %kind, "semantic error");

        SemanticError {
            kind,
            position: self.source.position_of(span.start),
        }
    }

    fn text(&self, span: Span) -> &str {
        self.source.value_of_span(span)
    }

    /// Adds an entity to the table and binds its name in the innermost scope
    fn declare(&mut self, name: &Identifier, entity: Entity) -> AnalysisResult<EntityId> {
        let id = self.entities.push(entity);

        self.scopes
            .declare(&name.name, id)
            .map_err(|error| self.error(name.span, SemanticErrorKind::AlreadyDeclared(error.0)))?;

        Ok(id)
    }

    fn lookup(&self, name: &Identifier) -> AnalysisResult<EntityId> {
        self.scopes.lookup(&name.name).ok_or_else(|| {
            self.error(
                name.span,
                SemanticErrorKind::UndeclaredIdentifier(name.name.clone()),
            )
        })
    }

    fn class_type(&self, class: EntityId) -> Type {
        Type::class(class, &self.entities[class].name)
    }

    /// Resolves a type annotation
    fn resolve_type(&self, ty: &ast::Type) -> AnalysisResult<Type> {
        match &ty.kind {
            ast::TypeKind::Named(name) => self.resolve_type_name(name),
            ast::TypeKind::Array(element) => Ok(Type::array(self.resolve_type(element)?)),
            ast::TypeKind::Optional(base) => Ok(Type::optional(self.resolve_type(base)?)),
            ast::TypeKind::Function {
                parameters,
                return_type,
            } => {
                let parameters = parameters
                    .iter()
                    .map(|parameter| self.resolve_type(parameter))
                    .collect::<AnalysisResult<Vec<_>>>()?;

                Ok(Type::function(parameters, self.resolve_type(return_type)?))
            }
        }
    }

    fn resolve_type_name(&self, name: &Identifier) -> AnalysisResult<Type> {
        let id = self.lookup(name)?;

        match &self.entities[id].kind {
            EntityKind::TypeName(ty) => Ok(ty.clone()),
            EntityKind::Class { .. } if self.declaring_class == Some(id) => Err(self.error(
                name.span,
                SemanticErrorKind::RecursiveClass(name.name.clone()),
            )),
            EntityKind::Class { .. } => Ok(self.class_type(id)),
            _ => Err(self.error(
                name.span,
                SemanticErrorKind::InvalidTypeAnnotation(name.name.clone()),
            )),
        }
    }

    /// The resolved type of a function entity, which is always known once its
    /// signature has been analyzed
    fn function_type(&self, function: EntityId) -> Option<(&[Type], &Type)> {
        match self.entities[function].value_type().map(|ty| &**ty) {
            Some(TypeKind::Function {
                parameters,
                return_type,
            }) => Some((parameters, return_type)),
            _ => None,
        }
    }

    fn class_members(&self, class: EntityId) -> (&[EntityId], &[EntityId]) {
        match &self.entities[class].kind {
            EntityKind::Class {
                fields, methods, ..
            } => (fields.as_slice(), methods.as_slice()),
            _ => (&[], &[]),
        }
    }

    /// Finds a field or method of `class` by name
    fn find_member(&self, class: EntityId, name: &str) -> Option<EntityId> {
        let (fields, methods) = self.class_members(class);

        fields
            .iter()
            .chain(methods)
            .copied()
            .find(|member| self.entities[*member].name == name)
    }

    fn is_method_of_enclosing_class(&self, function: EntityId) -> bool {
        self.scopes
            .class()
            .is_some_and(|class| self.class_members(class).1.contains(&function))
    }

    /// Members whose name starts with an underscore are only visible inside
    /// their own class
    fn check_member_visible(&self, class: EntityId, member: &Identifier) -> AnalysisResult<()> {
        if member.name.starts_with('_') && self.scopes.class() != Some(class) {
            return Err(self.error(
                member.span,
                SemanticErrorKind::NoSuchMember {
                    member: member.name.clone(),
                    class: self.entities[class].name.clone(),
                    private: true,
                },
            ));
        }

        Ok(())
    }

    fn check_assignable(
        &self,
        expression: &ir::Expression,
        target: &Type,
        boundary: TypeBoundary,
        span: Span,
    ) -> AnalysisResult<()> {
        if expression.ty.assignable_to(target) {
            Ok(())
        } else {
            Err(self.error(
                span,
                TypeMismatch::NotAssignable {
                    expected: target.clone(),
                    actual: expression.ty.clone(),
                    boundary,
                },
            ))
        }
    }

    fn check_equivalent(
        &self,
        left: &Type,
        right: &Type,
        context: OperandContext,
        span: Span,
    ) -> AnalysisResult<()> {
        if left.equivalent(right) {
            Ok(())
        } else {
            Err(self.error(
                span,
                TypeMismatch::NotEquivalent {
                    left: left.clone(),
                    right: right.clone(),
                    context,
                },
            ))
        }
    }

    /// Checks that `ty` satisfies `predicate`, reporting `usage` otherwise
    fn check_usage(
        &self,
        ty: &Type,
        predicate: impl FnOnce(&TypeKind) -> bool,
        usage: TypeUsage,
        span: Span,
    ) -> AnalysisResult<()> {
        if predicate(&**ty) {
            Ok(())
        } else {
            Err(self.error(
                span,
                TypeMismatch::InvalidOperand {
                    expected: usage,
                    actual: ty.clone(),
                },
            ))
        }
    }
}

#[cfg(test)]
mod tests;

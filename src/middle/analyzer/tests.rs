use super::*;
use crate::frontend::{Position, parser::Parser};

fn analyze_source(source: &str) -> Result<ir::Program, SemanticError> {
    let file = SourceFile::from_memory(source);
    let program = Parser::parse_program(&file).unwrap();

    analyze(&file, &program)
}

fn accepts(source: &str) -> ir::Program {
    match analyze_source(source) {
        Ok(program) => program,
        Err(error) => panic!("expected `{source}` to be accepted, got {error}"),
    }
}

fn rejects(source: &str) -> SemanticError {
    match analyze_source(source) {
        Ok(_) => panic!("expected `{source}` to be rejected"),
        Err(error) => error,
    }
}

fn served_type(program: &ir::Program) -> Type {
    let Some(ir::Statement::Call(call)) = program.statements.last() else {
        panic!("expected a trailing call");
    };

    let ir::ExpressionKind::Call { arguments, .. } = &call.kind else {
        panic!("expected a call expression");
    };

    arguments[0].ty.clone()
}

#[test]
fn redeclaring_in_the_same_scope() {
    let error = rejects("ingredient x := 1; ingredient x := 1;");

    assert_eq!(error.kind, SemanticErrorKind::AlreadyDeclared("x".to_string()));
    assert_eq!(error.position, Position::new(1, 31));
    assert_eq!(error.to_string(), "1:31: identifier `x` already declared");
}

#[test]
fn shadowing_in_a_nested_scope() {
    accepts("ingredient x := 1; if (fresh) { ingredient x := 2.5; serve(x); }");
    accepts("ingredient x := 1; recipe f(ingredient x: string) { serve(x); }");
}

#[test]
fn names_must_be_declared_before_use() {
    let error = rejects("serve(y); ingredient y := 1;");
    assert_eq!(error.kind, SemanticErrorKind::UndeclaredIdentifier("y".to_string()));
    assert_eq!(error.position, Position::new(1, 7));

    let error = rejects("ingredient z := z + 1;");
    assert_eq!(error.kind, SemanticErrorKind::UndeclaredIdentifier("z".to_string()));
}

#[test]
fn conditional_takes_the_branch_type() {
    let program = accepts("serve(1<2 ? 8.0 : -5.22);");
    assert_eq!(served_type(&program), Type::float());

    let error = rejects("serve(1<2 ? 8.0 : 5);");
    assert!(matches!(
        error.kind,
        SemanticErrorKind::TypeMismatch(TypeMismatch::NotEquivalent {
            context: OperandContext::ConditionalBranches,
            ..
        })
    ));
}

#[test]
fn read_only_variables_cannot_be_assigned() {
    let error = rejects("ingredient x := 1 | const; x = 2;");
    assert_eq!(error.kind, SemanticErrorKind::ReadOnlyAssignment("x".to_string()));

    accepts("ingredient x := 1; x = 2;");

    let error = rejects("ingredient x := 1 | const; ++x;");
    assert_eq!(error.kind, SemanticErrorKind::ReadOnlyAssignment("x".to_string()));

    let error = rejects("for (i in 0..3) { i = 2; }");
    assert_eq!(error.kind, SemanticErrorKind::ReadOnlyAssignment("i".to_string()));

    let error = rejects("sin = cos;");
    assert_eq!(error.kind, SemanticErrorKind::ReadOnlyAssignment("sin".to_string()));
}

#[test]
fn functions_and_methods_cannot_be_assigned() {
    let error = rejects(
        "Dish S {
           ingredient x: int;
           recipe a(): int { return 1; }
           recipe b(): int { return 2; }
           recipe swap() { a = b; }
         }",
    );
    assert_eq!(error.kind, SemanticErrorKind::ReadOnlyAssignment("a".to_string()));

    let error = rejects("recipe f(): int { return 1; } recipe g(): int { return 2; } f = g;");
    assert_eq!(error.kind, SemanticErrorKind::ReadOnlyAssignment("f".to_string()));
}

#[test]
fn assignments_must_be_type_compatible() {
    let error = rejects("ingredient x := 1; x = \"one\";");

    assert_eq!(
        error.kind,
        SemanticErrorKind::TypeMismatch(TypeMismatch::NotAssignable {
            expected: Type::int(),
            actual: Type::string(),
            boundary: TypeBoundary::Assignment,
        })
    );

    accepts("ingredient a: any := 1; a = \"anything\";");
}

#[test]
fn optional_targets_are_not_unwrapped() {
    let error = rejects("ingredient x: int?; x = 3;");
    assert!(matches!(
        error.kind,
        SemanticErrorKind::TypeMismatch(TypeMismatch::NotAssignable { .. })
    ));

    accepts("ingredient x: int?; x = poached 3;");
}

#[test]
fn declarations_without_initializer_get_defaults() {
    let program = accepts("ingredient a: int, b: string?, c: [float];");

    let initializers = program
        .statements
        .iter()
        .map(|statement| match statement {
            ir::Statement::VariableDeclaration(declaration) => declaration
                .initializer
                .as_ref()
                .map(|initializer| initializer.kind.clone()),
            other => panic!("unexpected statement {other:?}"),
        })
        .collect::<Vec<_>>();

    assert_eq!(
        initializers,
        [
            Some(ir::ExpressionKind::Literal(ir::Literal::Integer(0))),
            Some(ir::ExpressionKind::EmptyOptional),
            Some(ir::ExpressionKind::EmptyArray),
        ]
    );
}

#[test]
fn tests_must_be_boolean() {
    let error = rejects("if (1) { }");
    assert_eq!(
        error.kind,
        SemanticErrorKind::TypeMismatch(TypeMismatch::InvalidOperand {
            expected: TypeUsage::Boolean,
            actual: Type::int(),
        })
    );

    rejects("while (\"yes\") { }");
}

#[test]
fn operator_operands() {
    accepts("serve(\"a\" + \"b\", 1 + 2, 1.5 * 2.0, 7 & 3, \"a\" < \"b\");");

    let error = rejects("serve(\"a\" - \"b\");");
    assert_eq!(
        error.kind,
        SemanticErrorKind::TypeMismatch(TypeMismatch::InvalidOperand {
            expected: TypeUsage::Numeric,
            actual: Type::string(),
        })
    );

    let error = rejects("serve(1 + 2.0);");
    assert!(matches!(
        error.kind,
        SemanticErrorKind::TypeMismatch(TypeMismatch::NotEquivalent { .. })
    ));

    let error = rejects("serve(1.5 << 2.0);");
    assert!(matches!(
        error.kind,
        SemanticErrorKind::TypeMismatch(TypeMismatch::InvalidOperand {
            expected: TypeUsage::Integer,
            ..
        })
    ));

    rejects("serve(1 && fresh);");
    accepts("serve([1, 2] == [3], fresh != stale);");
    rejects("serve(1 == 1.0);");
}

#[test]
fn arrays() {
    let program = accepts("ingredient a := [1, 2, 3]; serve(a[0]);");
    assert_eq!(served_type(&program), Type::int());

    let error = rejects("ingredient a := [1, \"two\"];");
    assert!(matches!(
        error.kind,
        SemanticErrorKind::TypeMismatch(TypeMismatch::NotEquivalent {
            context: OperandContext::ArrayElements,
            ..
        })
    ));

    let error = rejects("ingredient a := [];");
    assert_eq!(error.kind, SemanticErrorKind::InvalidTypeAnnotation("[]".to_string()));

    accepts("ingredient a := [int](); serve(#a, count(a), random a);");
    accepts("serve(count([fresh, stale]));");

    rejects("ingredient a := [1]; serve(a[1.0]);");
    rejects("ingredient n := 1; serve(n[0]);");
    rejects("serve(count(1));");
}

#[test]
fn optionals() {
    let program = accepts("ingredient x: int?; serve(x ?? 2);");
    assert_eq!(served_type(&program), Type::int());

    let error = rejects("ingredient y := 3; serve(y ?? 2);");
    assert_eq!(
        error.kind,
        SemanticErrorKind::TypeMismatch(TypeMismatch::InvalidOperand {
            expected: TypeUsage::Optional,
            actual: Type::int(),
        })
    );

    let error = rejects("ingredient x := raw int; serve(x ?? \"no\");");
    assert!(matches!(
        error.kind,
        SemanticErrorKind::TypeMismatch(TypeMismatch::NotAssignable {
            boundary: TypeBoundary::Coalesce,
            ..
        })
    ));
}

#[test]
fn optional_chaining_does_not_double_wrap() {
    let program = accepts(
        "Dish P { ingredient v: int; ingredient w: string?; }
         ingredient p := poached new P(1, raw string);
         serve(p?.v);",
    );
    assert_eq!(served_type(&program), Type::optional(Type::int()));

    let program = accepts(
        "Dish P { ingredient v: int; ingredient w: string?; }
         ingredient p := poached new P(1, raw string);
         serve(p?.w);",
    );
    assert_eq!(served_type(&program), Type::optional(Type::string()));

    rejects("Dish P { ingredient v: int; } ingredient p := new P(1); serve(p?.v);");
}

#[test]
fn control_flow_placement() {
    let error = rejects("break;");
    assert_eq!(
        error.kind,
        SemanticErrorKind::IllegalControlFlow(ControlFlowViolation::Break)
    );

    accepts("while (fresh) { if (fresh) { break; } continue; }");

    let error = rejects("while (fresh) { recipe f() { break; } }");
    assert_eq!(
        error.kind,
        SemanticErrorKind::IllegalControlFlow(ControlFlowViolation::Break)
    );

    let error = rejects("return;");
    assert_eq!(
        error.kind,
        SemanticErrorKind::IllegalControlFlow(ControlFlowViolation::ReturnOutsideFunction)
    );

    let error = rejects("recipe f(): int { return; }");
    assert_eq!(
        error.kind,
        SemanticErrorKind::IllegalControlFlow(ControlFlowViolation::MissingReturnValue)
    );

    let error = rejects("recipe f() { return 1; }");
    assert_eq!(
        error.kind,
        SemanticErrorKind::IllegalControlFlow(ControlFlowViolation::UnexpectedReturnValue)
    );

    let error = rejects("recipe f(): int { return \"no\"; }");
    assert!(matches!(
        error.kind,
        SemanticErrorKind::TypeMismatch(TypeMismatch::NotAssignable {
            boundary: TypeBoundary::Return,
            ..
        })
    ));
}

#[test]
fn functions_can_recurse() {
    accepts(
        "recipe fact(ingredient n: int): int {
           if (n <= 1) { return 1; }
           return n * fact(n - 1);
         }
         serve(fact(5));",
    );
}

#[test]
fn call_arity_and_arguments() {
    let error = rejects("recipe f(ingredient x: int) { } f(1, 2);");
    assert_eq!(
        error.kind,
        SemanticErrorKind::ArityMismatch {
            expected: 1,
            actual: 2
        }
    );

    let error = rejects("recipe f(ingredient x: int) { } f(1.0);");
    assert!(matches!(
        error.kind,
        SemanticErrorKind::TypeMismatch(TypeMismatch::NotAssignable {
            boundary: TypeBoundary::Argument,
            ..
        })
    ));

    let error = rejects("ingredient x := 1; x(2);");
    assert!(matches!(
        error.kind,
        SemanticErrorKind::TypeMismatch(TypeMismatch::InvalidOperand {
            expected: TypeUsage::Callable,
            ..
        })
    ));

    accepts("serve(); serve(1, \"two\", [3.0], fresh);");
    accepts("serve(hypot(3.0, 4.0), sin(π), bytes(\"abc\"), codepoints(\"π\"));");
    rejects("serve(sin(1));");
}

#[test]
fn function_values_are_checked_by_variance() {
    accepts(
        "recipe f(ingredient x: any): int { return 1; }
         ingredient g: (int) -> any := f;
         serve(g(3));",
    );

    let error = rejects(
        "recipe h(ingredient x: int): any { return 1; }
         ingredient k: (any) -> int := h;",
    );
    assert!(matches!(
        error.kind,
        SemanticErrorKind::TypeMismatch(TypeMismatch::NotAssignable {
            boundary: TypeBoundary::Declaration,
            ..
        })
    ));
}

#[test]
fn classes_and_members() {
    let program = accepts(
        "Dish S {
           ingredient x: int;
           recipe get(): int { return x; }
           recipe bump() { x = x + 1; twice(); }
           recipe twice(): int { return get() * 2; }
         }
         S s := new S(1);
         ingredient t := S(2);
         s.bump();
         serve(s.x, t.get());",
    );

    let ir::Statement::ClassDeclaration { class, methods } = &program.statements[0] else {
        panic!("expected a class declaration");
    };
    assert_eq!(methods.len(), 3);

    let EntityKind::Class { fields, .. } = &program.entities[*class].kind else {
        panic!("expected a class entity");
    };
    assert_eq!(fields.len(), 1);

    let error = rejects("Dish S { ingredient x: int; } S s := new S(1); serve(s.y);");
    assert_eq!(
        error.kind,
        SemanticErrorKind::NoSuchMember {
            member: "y".to_string(),
            class: "S".to_string(),
            private: false,
        }
    );

    let error = rejects("Dish S { ingredient x: int; } S s := new S(1, 2);");
    assert_eq!(
        error.kind,
        SemanticErrorKind::ArityMismatch {
            expected: 1,
            actual: 2
        }
    );

    let error = rejects("Dish S { ingredient x: int; } Dish T { ingredient x: int; } S s := new T(1);");
    assert!(matches!(
        error.kind,
        SemanticErrorKind::TypeMismatch(TypeMismatch::NotAssignable { .. })
    ));

    let error = rejects("ingredient q := 1; ingredient s := new q(1);");
    assert_eq!(error.kind, SemanticErrorKind::InvalidTypeAnnotation("q".to_string()));

    let error = rejects("ingredient x: serve;");
    assert_eq!(error.kind, SemanticErrorKind::InvalidTypeAnnotation("serve".to_string()));
}

#[test]
fn private_members_stay_inside_their_class() {
    accepts(
        "Dish S {
           ingredient _x: int;
           recipe peek(ingredient other: S): int { return other._x + _x; }
         }",
    );

    let error = rejects("Dish S { ingredient _x: int; } S s := new S(1); serve(s._x);");
    assert_eq!(
        error.kind,
        SemanticErrorKind::NoSuchMember {
            member: "_x".to_string(),
            class: "S".to_string(),
            private: true,
        }
    );
}

#[test]
fn classes_cannot_contain_themselves() {
    let error = rejects("Dish S { ingredient next: S?; }");
    assert_eq!(error.kind, SemanticErrorKind::RecursiveClass("S".to_string()));

    accepts("Dish S { ingredient x: int; recipe copy(): S { return new S(x); } }");
}

#[test]
fn class_names_are_not_values() {
    let error = rejects("Dish S { } serve(S);");
    assert_eq!(
        error.kind,
        SemanticErrorKind::TypeMismatch(TypeMismatch::NotAValue("S".to_string()))
    );
}

#[test]
fn loops() {
    accepts("for (ingredient i := 0; i < 10; ++i) { serve(i); }");
    accepts("for (x in [1.5, 2.5]) { serve(x * 2.0); }");

    let error = rejects("for (i in 0..2.5) { }");
    assert!(matches!(
        error.kind,
        SemanticErrorKind::TypeMismatch(TypeMismatch::InvalidOperand {
            expected: TypeUsage::Integer,
            ..
        })
    ));

    let error = rejects("for (x in 5) { }");
    assert!(matches!(
        error.kind,
        SemanticErrorKind::TypeMismatch(TypeMismatch::InvalidOperand {
            expected: TypeUsage::Array,
            ..
        })
    ));

    let error = rejects("for (ingredient i := 0; i < 10; ++i) { } serve(i);");
    assert_eq!(error.kind, SemanticErrorKind::UndeclaredIdentifier("i".to_string()));
}

#[test]
fn error_handling() {
    let program = accepts(
        "prep { eightysix(\"bad\", KeyError); }
         rescue (KeyError e) { serve(e.message); }
         cleanup { serve(1); }",
    );
    assert!(matches!(program.statements[0], ir::Statement::Try { .. }));

    let error = rejects("ingredient Oops := 1; eightysix(\"x\", Oops);");
    assert_eq!(error.kind, SemanticErrorKind::InvalidErrorKind("Oops".to_string()));

    let error = rejects("prep { } rescue (int e) { }");
    assert_eq!(error.kind, SemanticErrorKind::InvalidErrorKind("int".to_string()));

    let error = rejects("eightysix(404, ValueError);");
    assert_eq!(
        error.kind,
        SemanticErrorKind::TypeMismatch(TypeMismatch::InvalidOperand {
            expected: TypeUsage::String,
            actual: Type::int(),
        })
    );

    let error = rejects("prep { } rescue (ValueError e) { } serve(e);");
    assert_eq!(error.kind, SemanticErrorKind::UndeclaredIdentifier("e".to_string()));
}

use hashbrown::{HashMap, HashSet};
use itertools::Itertools;
use tracing::debug;

use crate::{
    backend::{CodegenOptions, targets::CodeGenerator},
    frontend::ast::{BinaryOperatorKind, UnaryOperatorKind},
    middle::{
        entity::{Entities, EntityId, EntityKind, ErrorKind, Intrinsic},
        ir::{
            self, Alternate, Block, Callee, Declaration, Expression, ExpressionKind,
            FunctionDeclaration, Literal, Rescue, Statement,
        },
    },
};

pub struct CodeGeneratorJavaScript;

impl CodeGenerator for CodeGeneratorJavaScript {
    fn generate(&self, program: &ir::Program, options: &CodegenOptions) -> String {
        let mut emitter = Emitter::new(&program.entities, options);
        emitter.block(&program.statements);

        debug!(
            lines = emitter.lines.len(),
            names = emitter.names.len(),
            "javascript generated"
        );

        // Error classes JavaScript lacks are declared up front
        emitter
            .error_kinds
            .iter()
            .map(|kind| format!("class {kind} extends Error {{}}"))
            .chain(emitter.lines)
            .map(|line| format!("{line}\n"))
            .collect()
    }
}

struct Emitter<'a> {
    entities: &'a Entities,
    indent: String,
    depth: usize,
    lines: Vec<String>,
    /// Display names handed out so far, `name_N` with one counter for all
    /// entities
    names: HashMap<EntityId, String>,
    next_suffix: usize,
    methods: HashSet<EntityId>,
    /// Referenced error classes, in order of first use
    error_kinds: Vec<ErrorKind>,
    /// Functions nested in a method become arrow functions so that `this`
    /// still refers to the instance
    in_method: bool,
}

impl<'a> Emitter<'a> {
    fn new(entities: &'a Entities, options: &CodegenOptions) -> Self {
        let methods = entities
            .iter()
            .filter_map(|entity| match &entity.kind {
                EntityKind::Class { methods, .. } => Some(methods),
                _ => None,
            })
            .flatten()
            .copied()
            .collect();

        Self {
            entities,
            indent: " ".repeat(options.indent_width),
            depth: 0,
            lines: Vec::new(),
            names: HashMap::new(),
            next_suffix: 1,
            methods,
            error_kinds: Vec::new(),
            in_method: false,
        }
    }

    fn emit(&mut self, line: impl AsRef<str>) {
        self.lines
            .push(format!("{}{}", self.indent.repeat(self.depth), line.as_ref()));
    }

    /// The display name of an entity. Built-ins keep their own name.
    fn name(&mut self, id: EntityId) -> String {
        let entity = &self.entities[id];

        if entity.is_builtin() {
            return entity.name.clone();
        }

        let next_suffix = &mut self.next_suffix;

        self.names
            .entry(id)
            .or_insert_with(|| {
                let name = format!("{}_{}", entity.name, next_suffix);
                *next_suffix += 1;
                name
            })
            .clone()
    }

    /// Notes that the generated code mentions the error class `class`
    fn use_error_kind(&mut self, class: EntityId) -> Option<ErrorKind> {
        let EntityKind::Class {
            error_kind: Some(kind),
            ..
        } = self.entities[class].kind
        else {
            return None;
        };

        if !kind.is_native_to_javascript() && !self.error_kinds.contains(&kind) {
            self.error_kinds.push(kind);
        }

        Some(kind)
    }

    fn block(&mut self, block: &[Statement]) {
        for statement in block {
            self.statement(statement);
        }
    }

    fn nested(&mut self, block: &[Statement]) {
        self.depth += 1;
        self.block(block);
        self.depth -= 1;
    }

    fn statement(&mut self, statement: &Statement) {
        match statement {
            Statement::VariableDeclaration(declaration) => {
                let declaration = self.declaration(declaration);
                self.emit(format!("let {declaration};"));
            }
            Statement::FunctionDeclaration(function) => self.function(function),
            Statement::ClassDeclaration { class, methods } => self.class(*class, methods),
            Statement::Assignment { .. } | Statement::Bump { .. } => {
                let update = self.update(statement);
                self.emit(format!("{update};"));
            }
            Statement::Call(call) => {
                let call = self.expression(call);
                self.emit(format!("{call};"));
            }
            Statement::Break => self.emit("break;"),
            Statement::Continue => self.emit("continue;"),
            Statement::Return(value) => {
                let value = self.expression(value);
                self.emit(format!("return {value};"));
            }
            Statement::ShortReturn => self.emit("return;"),
            Statement::If {
                test,
                consequent,
                alternate,
            } => self.if_statement("", test, consequent, alternate.as_ref()),
            Statement::While { test, body } => {
                let test = self.expression(test);
                self.emit(format!("while ({test}) {{"));
                self.nested(body);
                self.emit("}");
            }
            Statement::For {
                init,
                test,
                update,
                body,
            } => {
                let init = init
                    .iter()
                    .map(|declaration| self.declaration(declaration))
                    .join(", ");
                let init = if init.is_empty() {
                    init
                } else {
                    format!("let {init}")
                };
                let test = self.expression(test);
                let update = self.update(update);

                self.emit(format!("for ({init}; {test}; {update}) {{"));
                self.nested(body);
                self.emit("}");
            }
            Statement::ForRange {
                iterator,
                low,
                high,
                body,
            } => {
                let iterator = self.name(*iterator);
                let low = self.expression(low);
                let high = self.expression(high);

                self.emit(format!(
                    "for (let {iterator} = {low}; {iterator} < {high}; {iterator}++) {{"
                ));
                self.nested(body);
                self.emit("}");
            }
            Statement::ForEach {
                iterator,
                collection,
                body,
            } => {
                let iterator = self.name(*iterator);
                let collection = self.expression(collection);

                self.emit(format!("for (let {iterator} of {collection}) {{"));
                self.nested(body);
                self.emit("}");
            }
            Statement::Try {
                body,
                rescue,
                cleanup,
            } => self.try_statement(body, rescue.as_ref(), cleanup.as_ref()),
            Statement::Throw { kind, message } => {
                self.use_error_kind(*kind);
                let kind = self.name(*kind);
                let message = self.expression(message);

                self.emit(format!("throw new {kind}({message});"));
            }
        }
    }

    fn declaration(&mut self, declaration: &Declaration) -> String {
        let variable = self.name(declaration.variable);

        match &declaration.initializer {
            Some(initializer) => format!("{variable} = {}", self.expression(initializer)),
            None => variable,
        }
    }

    /// An assignment or bump without its semicolon, as used in a `for` header
    fn update(&mut self, statement: &Statement) -> String {
        match statement {
            Statement::Assignment { target, source } => {
                let target = self.expression(target);
                let source = self.expression(source);
                format!("{target} = {source}")
            }
            Statement::Bump { target, operator } => {
                format!("{}{operator}", self.expression(target))
            }
            other => unreachable!("expected an assignment or bump, found {other:?}"),
        }
    }

    fn if_statement(
        &mut self,
        prefix: &str,
        test: &Expression,
        consequent: &Block,
        alternate: Option<&Alternate>,
    ) {
        let test = self.expression(test);
        self.emit(format!("{prefix}if ({test}) {{"));
        self.nested(consequent);

        match alternate {
            Some(Alternate::If(statement)) => match &**statement {
                Statement::If {
                    test,
                    consequent,
                    alternate,
                } => self.if_statement("} else ", test, consequent, alternate.as_ref()),
                other => {
                    self.emit("} else {");
                    self.nested(std::slice::from_ref(other));
                    self.emit("}");
                }
            },
            Some(Alternate::Block(block)) => {
                self.emit("} else {");
                self.nested(block);
                self.emit("}");
            }
            None => self.emit("}"),
        }
    }

    fn try_statement(&mut self, body: &Block, rescue: Option<&Rescue>, cleanup: Option<&Block>) {
        self.emit("try {");
        self.nested(body);

        if let Some(rescue) = rescue {
            let binding = self.name(rescue.binding);
            self.emit(format!("}} catch ({binding}) {{"));
            self.depth += 1;

            // `Exception` rescues everything, other kinds only themselves
            if self.use_error_kind(rescue.kind) != Some(ErrorKind::Exception) {
                let kind = self.name(rescue.kind);
                self.emit(format!("if (!({binding} instanceof {kind})) throw {binding};"));
            }

            self.block(&rescue.body);
            self.depth -= 1;
        }

        if let Some(cleanup) = cleanup {
            self.emit("} finally {");
            self.nested(cleanup);
        } else if rescue.is_none() {
            self.emit("} finally {");
        }

        self.emit("}");
    }

    fn parameters(&mut self, parameters: &[EntityId]) -> String {
        parameters
            .iter()
            .map(|parameter| self.name(*parameter))
            .join(", ")
    }

    fn function(&mut self, function: &FunctionDeclaration) {
        let name = self.name(function.function);
        let parameters = self.parameters(&function.parameters);

        if self.in_method {
            self.emit(format!("let {name} = ({parameters}) => {{"));
            self.nested(&function.body);
            self.emit("};");
        } else {
            self.emit(format!("function {name}({parameters}) {{"));
            self.nested(&function.body);
            self.emit("}");
        }
    }

    /// A class gets a constructor taking every field in declaration order,
    /// followed by its methods
    fn class(&mut self, class: EntityId, methods: &[FunctionDeclaration]) {
        let name = self.name(class);
        let fields = match &self.entities[class].kind {
            EntityKind::Class { fields, .. } => fields.as_slice(),
            _ => &[],
        };
        let fields = fields
            .iter()
            .map(|field| self.name(*field))
            .collect::<Vec<_>>();

        self.emit(format!("class {name} {{"));
        self.depth += 1;

        self.emit(format!("constructor({}) {{", fields.join(", ")));
        self.depth += 1;
        for field in &fields {
            self.emit(format!("this[\"{field}\"] = {field};"));
        }
        self.depth -= 1;
        self.emit("}");

        let enclosing = std::mem::replace(&mut self.in_method, true);

        for method in methods {
            let name = self.name(method.function);
            let parameters = self.parameters(&method.parameters);

            self.emit(format!("{name}({parameters}) {{"));
            self.nested(&method.body);
            self.emit("}");
        }

        self.in_method = enclosing;
        self.depth -= 1;
        self.emit("}");
    }

    fn list(&mut self, expressions: &[Expression]) -> String {
        expressions
            .iter()
            .map(|expression| self.expression(expression))
            .join(", ")
    }

    fn expression(&mut self, expression: &Expression) -> String {
        match &expression.kind {
            ExpressionKind::Literal(literal) => render_literal(literal),
            ExpressionKind::EmptyOptional => "undefined".to_string(),
            ExpressionKind::EmptyArray => "[]".to_string(),
            ExpressionKind::Array(elements) => format!("[{}]", self.list(elements)),
            ExpressionKind::Variable(id) => self.value(*id),
            ExpressionKind::SelfField(field) => format!("this[\"{}\"]", self.name(*field)),
            ExpressionKind::Binary { operator, lhs, rhs } => {
                let lhs = self.expression(lhs);
                let rhs = self.expression(rhs);

                match operator {
                    BinaryOperatorKind::Divide if expression.ty.is_int() => {
                        format!("Math.trunc({lhs} / {rhs})")
                    }
                    BinaryOperatorKind::Equals => format!("({lhs} === {rhs})"),
                    BinaryOperatorKind::NotEquals => format!("({lhs} !== {rhs})"),
                    _ => format!("({lhs} {operator} {rhs})"),
                }
            }
            ExpressionKind::Unary { operator, operand } => {
                let operand = self.expression(operand);

                match operator {
                    // Parenthesized whole, since `-a ** b` is not valid JavaScript
                    UnaryOperatorKind::Negate => format!("(-({operand}))"),
                    UnaryOperatorKind::Not => format!("(!({operand}))"),
                    UnaryOperatorKind::Length => format!("{operand}.length"),
                    UnaryOperatorKind::Random => {
                        format!("((a=>a[~~(Math.random()*a.length)])({operand}))")
                    }
                    // Optionals are plain values or `undefined`
                    UnaryOperatorKind::Wrap => operand,
                }
            }
            ExpressionKind::Conditional {
                test,
                consequent,
                alternate,
            } => {
                let test = self.expression(test);
                let consequent = self.expression(consequent);
                let alternate = self.expression(alternate);

                format!("(({test}) ? ({consequent}) : ({alternate}))")
            }
            ExpressionKind::Subscript { array, index } => {
                let array = self.expression(array);
                let index = self.expression(index);

                format!("{array}[{index}]")
            }
            ExpressionKind::Member {
                object,
                field,
                optional_chain,
            } => {
                let object = self.expression(object);
                let field = self.name(*field);
                let access = if *optional_chain { "?." } else { "" };

                format!("{object}{access}[\"{field}\"]")
            }
            ExpressionKind::Call { callee, arguments } => self.call(callee, arguments),
            ExpressionKind::Construct { class, arguments } => {
                self.use_error_kind(*class);
                let class = self.name(*class);

                format!("new {class}({})", self.list(arguments))
            }
        }
    }

    /// A variable or function used as a value
    fn value(&mut self, id: EntityId) -> String {
        if let Some(intrinsic) = self.entities[id].intrinsic() {
            return intrinsic_value(intrinsic).to_string();
        }

        let name = self.name(id);

        if self.methods.contains(&id) {
            format!("this.{name}.bind(this)")
        } else {
            name
        }
    }

    fn call(&mut self, callee: &Callee, arguments: &[Expression]) -> String {
        match callee {
            Callee::Function(function) => {
                let arguments = self.list(arguments);

                match self.entities[*function].intrinsic() {
                    Some(intrinsic) => intrinsic_call(intrinsic, &arguments),
                    None => format!("{}({arguments})", self.name(*function)),
                }
            }
            Callee::Method { receiver, method } => {
                let receiver = match receiver {
                    Some(receiver) => self.expression(receiver),
                    None => "this".to_string(),
                };
                let method = self.name(*method);

                format!("{receiver}.{method}({})", self.list(arguments))
            }
            Callee::Value(value) => {
                let value = self.expression(value);

                format!("({value})({})", self.list(arguments))
            }
        }
    }
}

fn render_literal(literal: &Literal) -> String {
    match literal {
        Literal::Integer(value) if *value < 0 => format!("({value})"),
        Literal::Integer(value) => value.to_string(),
        Literal::Float(value) if value.is_sign_negative() => format!("({value:?})"),
        Literal::Float(value) => format!("{value:?}"),
        Literal::String(lexeme) => lexeme.clone(),
        Literal::Boolean(value) => value.to_string(),
    }
}

fn intrinsic_value(intrinsic: Intrinsic) -> &'static str {
    match intrinsic {
        Intrinsic::Serve => "console.log",
        Intrinsic::Sin => "Math.sin",
        Intrinsic::Cos => "Math.cos",
        Intrinsic::Exp => "Math.exp",
        Intrinsic::Ln => "Math.log",
        Intrinsic::Hypot => "Math.hypot",
        Intrinsic::Bytes => r#"(s=>[...Buffer.from(s, "utf8")])"#,
        Intrinsic::Codepoints => "(s=>[...s].map(c=>c.codePointAt(0)))",
        Intrinsic::Count => "(a=>a.length)",
        Intrinsic::Pi => "Math.PI",
    }
}

fn intrinsic_call(intrinsic: Intrinsic, arguments: &str) -> String {
    match intrinsic {
        Intrinsic::Bytes => format!(r#"[...Buffer.from({arguments}, "utf8")]"#),
        Intrinsic::Codepoints => format!("[...({arguments})].map(c=>c.codePointAt(0))"),
        Intrinsic::Count => format!("({arguments}).length"),
        _ => format!("{}({arguments})", intrinsic_value(intrinsic)),
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        frontend::{SourceFile, parser::Parser},
        middle::analyzer::analyze,
    };

    fn generate(source: &str) -> String {
        let file = SourceFile::from_memory(source);
        let program = Parser::parse_program(&file).unwrap();
        let program = analyze(&file, &program).unwrap();

        CodeGeneratorJavaScript.generate(&program, &CodegenOptions::default())
    }

    #[test]
    fn functions_keep_one_name() {
        let output = generate("recipe f(): boolean { return fresh; } f();");

        assert_eq!(
            output,
            indoc! {"
                function f_1() {
                    return true;
                }
                f_1();
            "}
        );
    }

    #[test]
    fn names_are_unique_across_scopes() {
        let output = generate(indoc! {"
            ingredient x := 3 * 7;
            if (x == 0) {
                ingredient x := 1;
                serve(x);
            } else if (x != 1) {
                serve(π);
            } else {
                ++x;
            }
        "});

        assert_eq!(
            output,
            indoc! {"
                let x_1 = (3 * 7);
                if ((x_1 === 0)) {
                    let x_2 = 1;
                    console.log(x_2);
                } else if ((x_1 !== 1)) {
                    console.log(Math.PI);
                } else {
                    x_1++;
                }
            "}
        );
    }

    #[test]
    fn loops() {
        let output = generate(indoc! {"
            for (j in [10, 20, 30]) { serve(j); }
            for (ingredient i := 0; i < 50; ++i) { continue; }
            for (k in 0..3) { break; }
            while (fresh) { break; }
        "});

        assert_eq!(
            output,
            indoc! {"
                for (let j_1 of [10, 20, 30]) {
                    console.log(j_1);
                }
                for (let i_2 = 0; (i_2 < 50); i_2++) {
                    continue;
                }
                for (let k_3 = 0; k_3 < 3; k_3++) {
                    break;
                }
                while (true) {
                    break;
                }
            "}
        );
    }

    #[test]
    fn classes_use_field_keys() {
        let output = generate(indoc! {"
            Dish S {
                ingredient x: int;
                recipe get(): int { return x; }
                recipe twice(): int { return get() * 2; }
            }
            ingredient s := new S(3);
            serve(s.x, s.twice());
        "});

        assert_eq!(
            output,
            indoc! {r#"
                class S_1 {
                    constructor(x_2) {
                        this["x_2"] = x_2;
                    }
                    get_3() {
                        return this["x_2"];
                    }
                    twice_4() {
                        return (this.get_3() * 2);
                    }
                }
                let s_5 = new S_1(3);
                console.log(s_5["x_2"], s_5.twice_4());
            "#}
        );
    }

    #[test]
    fn errors_declare_missing_classes() {
        let output = generate(indoc! {r#"
            prep {
                eightysix("no", ValueError);
            } rescue (ValueError e) {
                serve(e.message);
            } cleanup {
                serve("done");
            }
        "#});

        assert_eq!(
            output,
            indoc! {r#"
                class ValueError extends Error {}
                try {
                    throw new ValueError("no");
                } catch (e_1) {
                    if (!(e_1 instanceof ValueError)) throw e_1;
                    console.log(e_1["message"]);
                } finally {
                    console.log("done");
                }
            "#}
        );
    }

    #[test]
    fn integer_division_truncates() {
        let output = generate("ingredient a := 7; serve(a / 2, 7.0 / 2.0);");

        assert_eq!(
            output,
            "let a_1 = 7;\nconsole.log(Math.trunc(a_1 / 2), (7.0 / 2.0));\n"
        );
    }

    #[test]
    fn negated_base_of_power() {
        let output = generate("ingredient x := 3; serve((-x) ** 2, 2 ** -x, !fresh);");

        assert_eq!(
            output,
            "let x_1 = 3;\nconsole.log(((-(x_1)) ** 2), (2 ** (-(x_1))), (!(true)));\n"
        );
    }

    #[test]
    fn standard_library() {
        let output = generate(indoc! {r#"
            serve(sin(1.0), ln(2.0), hypot(3.0, 4.0));
            serve(bytes("hé"), codepoints("hé"), count([1, 2]), #[3]);
            ingredient g := cos;
        "#});

        assert_eq!(
            output,
            indoc! {r#"
                console.log(Math.sin(1.0), Math.log(2.0), Math.hypot(3.0, 4.0));
                console.log([...Buffer.from("hé", "utf8")], [...("hé")].map(c=>c.codePointAt(0)), ([1, 2]).length, [3].length);
                let g_1 = Math.cos;
            "#}
        );
    }

    #[test]
    fn optionals() {
        let output = generate(indoc! {"
            ingredient a: int?;
            ingredient b := poached 2;
            serve(a ?? 1, b ?? 3, random [1, 2]);
        "});

        assert_eq!(
            output,
            indoc! {"
                let a_1 = undefined;
                let b_2 = 2;
                console.log((a_1 ?? 1), (b_2 ?? 3), ((a=>a[~~(Math.random()*a.length)])([1, 2])));
            "}
        );
    }

    #[test]
    fn indent_width_is_configurable() {
        let file = SourceFile::from_memory("while (stale) { break; }");
        let program = Parser::parse_program(&file).unwrap();
        let program = analyze(&file, &program).unwrap();

        let output =
            CodeGeneratorJavaScript.generate(&program, &CodegenOptions { indent_width: 2 });

        assert_eq!(output, "while (false) {\n  break;\n}\n");
    }
}

use std::str::FromStr;

use tracing::debug;

use super::{
    SourceFile, Span, SyntaxError, SyntaxErrorKind,
    ast::{
        BinaryOperator, BinaryOperatorKind, Block, BumpKind, ClassDeclaration, Declarator,
        ElseBranch, Expression, ExpressionKind, FunctionDeclaration, Identifier, IfStatement,
        Literal, Parameter, Program, RescueClause, Statement, StatementKind, Type, TypeKind,
        UnaryOperator, UnaryOperatorKind, VariableDeclaration,
    },
    lexer::{Keyword, Lexer, Token, TokenKind},
};

type ParseResult<T> = Result<T, SyntaxError>;

#[derive(Debug)]
pub struct Parser<'source> {
    source: &'source SourceFile,
    tokens: Vec<Token>,
    cursor: usize,
}

impl<'source> Parser<'source> {
    pub fn parse_program(source: &'source SourceFile) -> ParseResult<Program> {
        let tokens = Lexer::new(source).tokenize()?;

        debug!(tokens = tokens.len(), origin = %source.origin, "lexed source");

        let mut parser = Self {
            source,
            tokens,
            cursor: 0,
        };

        let mut statements = Vec::new();

        while parser.peek().is_some() {
            statements.push(parser.parse_statement()?);
        }

        debug!(statements = statements.len(), "parsed program");

        Ok(Program { statements })
    }

    fn error_at(&self, span: Span, kind: SyntaxErrorKind) -> SyntaxError {
        SyntaxError {
            kind,
            position: self.source.position_of(span.start),
        }
    }

    fn unexpected(&self, token: Token, expecting: &str) -> SyntaxError {
        self.error_at(
            token.span,
            SyntaxErrorKind::UnexpectedToken {
                expected: expecting.to_string(),
                found: self.source.value_of_span(token.span).to_string(),
            },
        )
    }

    fn eof(&self, expecting: &str) -> SyntaxError {
        let end = self.source.contents.len();

        self.error_at(
            Span::new(end, end),
            SyntaxErrorKind::UnexpectedEof(expecting.to_string()),
        )
    }

    fn peek(&self) -> Option<Token> {
        self.peek_nth(0)
    }

    fn peek_nth(&self, n: usize) -> Option<Token> {
        self.tokens.get(self.cursor + n).copied()
    }

    fn peek_is(&self, kind: TokenKind) -> bool {
        self.peek().is_some_and(|t| t.kind == kind)
    }

    fn expect_peek(&self, expecting: &str) -> ParseResult<Token> {
        self.peek().ok_or_else(|| self.eof(expecting))
    }

    fn expect_next(&mut self, expecting: &str) -> ParseResult<Token> {
        let token = self.expect_peek(expecting)?;
        self.cursor += 1;
        Ok(token)
    }

    fn expect_next_to_be(&mut self, kind: TokenKind, expecting: &str) -> ParseResult<Token> {
        let token = self.expect_peek(expecting)?;

        if token.kind != kind {
            return Err(self.unexpected(token, expecting));
        }

        self.cursor += 1;
        Ok(token)
    }

    fn expect_keyword(&mut self, keyword: Keyword) -> ParseResult<Token> {
        self.expect_next_to_be(TokenKind::Keyword(keyword), &format!("`{keyword}`"))
    }

    /// Consumes the next token if it has the given kind
    fn eat(&mut self, kind: TokenKind) -> Option<Token> {
        if self.peek_is(kind) {
            self.cursor += 1;
            self.tokens.get(self.cursor - 1).copied()
        } else {
            None
        }
    }

    fn parse_identifier(&mut self) -> ParseResult<Identifier> {
        let token = self.expect_next_to_be(TokenKind::Identifier, "identifier")?;

        Ok(Identifier {
            span: token.span,
            name: self.source.value_of_span(token.span).to_string(),
        })
    }

    // "{" ( statement )* "}"
    fn parse_block(&mut self) -> ParseResult<Block> {
        let open_brace = self.expect_next_to_be(TokenKind::OpenBrace, "`{`")?;
        let mut statements = Vec::new();

        while self.expect_peek("statement or `}`")?.kind != TokenKind::CloseBrace {
            statements.push(self.parse_statement()?);
        }

        let close_brace = self.expect_next_to_be(TokenKind::CloseBrace, "`}`")?;

        Ok(Block {
            span: open_brace.span.to(close_brace.span),
            statements,
        })
    }

    fn parse_statement(&mut self) -> ParseResult<Statement> {
        let peeked = self.expect_peek("statement")?;

        match peeked.kind {
            TokenKind::Keyword(Keyword::Ingredient) => {
                let declaration = self.parse_variable_declaration()?;

                Ok(Statement {
                    span: declaration.span,
                    kind: StatementKind::VariableDeclaration(Box::new(declaration)),
                })
            }
            TokenKind::Keyword(Keyword::Recipe) => {
                let function = self.parse_function_declaration()?;

                Ok(Statement {
                    span: function.span,
                    kind: StatementKind::FunctionDeclaration(Box::new(function)),
                })
            }
            TokenKind::Keyword(Keyword::Dish) => self.parse_class_declaration(),
            TokenKind::Keyword(Keyword::If) => {
                let statement = self.parse_if_statement()?;

                Ok(Statement {
                    span: statement.span,
                    kind: StatementKind::If(Box::new(statement)),
                })
            }
            TokenKind::Keyword(Keyword::While) => {
                let while_keyword = self.expect_keyword(Keyword::While)?;
                let test = self.parse_parenthesized_expression()?;
                let body = self.parse_block()?;

                Ok(Statement {
                    span: while_keyword.span.to(body.span),
                    kind: StatementKind::While {
                        test: Box::new(test),
                        body,
                    },
                })
            }
            TokenKind::Keyword(Keyword::For) => self.parse_for_statement(),
            TokenKind::Keyword(Keyword::Prep) => self.parse_try_statement(),
            TokenKind::Keyword(Keyword::Eightysix) => {
                let keyword = self.expect_keyword(Keyword::Eightysix)?;
                self.expect_next_to_be(TokenKind::OpenParen, "`(`")?;
                let message = self.parse_expression()?;
                self.expect_next_to_be(TokenKind::Comma, "`,`")?;
                let kind = self.parse_identifier()?;
                self.expect_next_to_be(TokenKind::CloseParen, "`)`")?;
                let semicolon = self.expect_next_to_be(TokenKind::Semicolon, "`;`")?;

                Ok(Statement {
                    span: keyword.span.to(semicolon.span),
                    kind: StatementKind::Throw {
                        message: Box::new(message),
                        kind,
                    },
                })
            }
            TokenKind::Keyword(Keyword::Break) | TokenKind::Keyword(Keyword::Continue) => {
                let keyword = self.expect_next("`break` or `continue`")?;
                let semicolon = self.expect_next_to_be(TokenKind::Semicolon, "`;`")?;

                let kind = if keyword.kind == TokenKind::Keyword(Keyword::Break) {
                    StatementKind::Break
                } else {
                    StatementKind::Continue
                };

                Ok(Statement {
                    span: keyword.span.to(semicolon.span),
                    kind,
                })
            }
            TokenKind::Keyword(Keyword::Return) => {
                let return_keyword = self.expect_keyword(Keyword::Return)?;

                let expression = if self.peek_is(TokenKind::Semicolon) {
                    None
                } else {
                    Some(Box::new(self.parse_expression()?))
                };

                let semicolon = self.expect_next_to_be(TokenKind::Semicolon, "`;`")?;

                Ok(Statement {
                    span: return_keyword.span.to(semicolon.span),
                    kind: StatementKind::Return(expression),
                })
            }
            TokenKind::Increment | TokenKind::Decrement => {
                let mut bump = self.parse_bump()?;
                let semicolon = self.expect_next_to_be(TokenKind::Semicolon, "`;`")?;
                bump.span = bump.span.to(semicolon.span);

                Ok(bump)
            }
            // `S y := new S(1);`
            TokenKind::Identifier
                if self
                    .peek_nth(1)
                    .is_some_and(|t| t.kind == TokenKind::Identifier) =>
            {
                let ty = self.parse_identifier()?;
                let name = self.parse_identifier()?;
                self.expect_next_to_be(TokenKind::ColonEquals, "`:=`")?;
                let initializer = self.parse_expression()?;
                let semicolon = self.expect_next_to_be(TokenKind::Semicolon, "`;`")?;

                Ok(Statement {
                    span: ty.span.to(semicolon.span),
                    kind: StatementKind::TypedDeclaration {
                        ty,
                        name,
                        initializer: Box::new(initializer),
                    },
                })
            }
            _ => {
                let mut statement = self.parse_assignment_or_call()?;
                let semicolon = self.expect_next_to_be(TokenKind::Semicolon, "`;`")?;
                statement.span = statement.span.to(semicolon.span);

                Ok(statement)
            }
        }
    }

    /// `++x` or `--x` (without the trailing semicolon)
    fn parse_bump(&mut self) -> ParseResult<Statement> {
        let operator = self.expect_next("`++` or `--`")?;

        let kind = match operator.kind {
            TokenKind::Increment => BumpKind::Increment,
            TokenKind::Decrement => BumpKind::Decrement,
            _ => return Err(self.unexpected(operator, "`++` or `--`")),
        };

        let target = self.parse_postfix_expression()?;

        Ok(Statement {
            span: operator.span.to(target.span),
            kind: StatementKind::Bump {
                operator: kind,
                target: Box::new(target),
            },
        })
    }

    /// `target = source` or a bare call (without the trailing semicolon)
    fn parse_assignment_or_call(&mut self) -> ParseResult<Statement> {
        let expression = self.parse_postfix_expression()?;

        if self.eat(TokenKind::Equals).is_some() {
            let source = self.parse_expression()?;

            return Ok(Statement {
                span: expression.span.to(source.span),
                kind: StatementKind::Assignment {
                    target: Box::new(expression),
                    source: Box::new(source),
                },
            });
        }

        if !matches!(expression.kind, ExpressionKind::Call { .. }) {
            return Err(match self.peek() {
                Some(token) => self.unexpected(token, "`=` or a call"),
                None => self.eof("`=` or a call"),
            });
        }

        Ok(Statement {
            span: expression.span,
            kind: StatementKind::Call(Box::new(expression)),
        })
    }

    // "ingredient" declarator ( "," declarator )* ( "|" "const" )? ";"
    fn parse_variable_declaration(&mut self) -> ParseResult<VariableDeclaration> {
        let keyword = self.expect_keyword(Keyword::Ingredient)?;
        let mut declarators = vec![self.parse_declarator()?];

        while self.eat(TokenKind::Comma).is_some() {
            declarators.push(self.parse_declarator()?);
        }

        let is_const = self.at_const_marker();

        if is_const {
            self.cursor += 2;
        }

        let semicolon = self.expect_next_to_be(TokenKind::Semicolon, "`;`")?;

        Ok(VariableDeclaration {
            span: keyword.span.to(semicolon.span),
            declarators,
            is_const,
        })
    }

    // id ( ":" type )? ( ":=" expression )?
    fn parse_declarator(&mut self) -> ParseResult<Declarator> {
        let name = self.parse_identifier()?;
        let mut span = name.span;

        let ty = if self.eat(TokenKind::Colon).is_some() {
            let ty = self.parse_type()?;
            span = span.to(ty.span);
            Some(ty)
        } else {
            None
        };

        let initializer = if self.eat(TokenKind::ColonEquals).is_some() {
            let initializer = self.parse_expression()?;
            span = span.to(initializer.span);
            Some(initializer)
        } else {
            None
        };

        if ty.is_none() && initializer.is_none() {
            return Err(self.error_at(
                name.span,
                SyntaxErrorKind::Invalid(format!(
                    "declaration of `{}` needs a type or an initializer",
                    name.name
                )),
            ));
        }

        Ok(Declarator {
            span,
            name,
            ty,
            initializer,
        })
    }

    /// recipe name(ingredient param: ty) : return_type {}
    fn parse_function_declaration(&mut self) -> ParseResult<FunctionDeclaration> {
        let keyword = self.expect_keyword(Keyword::Recipe)?;
        let name = self.parse_identifier()?;

        self.expect_next_to_be(TokenKind::OpenParen, "`(`")?;

        let mut parameters = Vec::new();

        if !self.peek_is(TokenKind::CloseParen) {
            parameters.push(self.parse_parameter()?);

            while self.eat(TokenKind::Comma).is_some() {
                parameters.push(self.parse_parameter()?);
            }
        }

        self.expect_next_to_be(TokenKind::CloseParen, "`,` or `)`")?;

        let return_type = if self.eat(TokenKind::Colon).is_some() {
            Some(self.parse_type()?)
        } else {
            None
        };

        let body = self.parse_block()?;

        Ok(FunctionDeclaration {
            span: keyword.span.to(body.span),
            name,
            parameters,
            return_type,
            body,
        })
    }

    // "ingredient" id ":" type
    fn parse_parameter(&mut self) -> ParseResult<Parameter> {
        let keyword = self.expect_keyword(Keyword::Ingredient)?;
        let name = self.parse_identifier()?;
        self.expect_next_to_be(TokenKind::Colon, "`:`")?;
        let ty = self.parse_type()?;

        Ok(Parameter {
            span: keyword.span.to(ty.span),
            name,
            ty,
        })
    }

    // "Dish" id "{" ( "ingredient" id ":" type ";" )* function* "}"
    fn parse_class_declaration(&mut self) -> ParseResult<Statement> {
        let keyword = self.expect_keyword(Keyword::Dish)?;
        let name = self.parse_identifier()?;

        self.expect_next_to_be(TokenKind::OpenBrace, "`{`")?;

        let mut fields = Vec::new();

        while self.peek_is(TokenKind::Keyword(Keyword::Ingredient)) {
            fields.push(self.parse_parameter()?);
            self.expect_next_to_be(TokenKind::Semicolon, "`;`")?;
        }

        let mut methods = Vec::new();

        while self.peek_is(TokenKind::Keyword(Keyword::Recipe)) {
            methods.push(self.parse_function_declaration()?);
        }

        let close_brace = self.expect_next_to_be(TokenKind::CloseBrace, "method or `}`")?;
        let span = keyword.span.to(close_brace.span);

        Ok(Statement {
            span,
            kind: StatementKind::ClassDeclaration(Box::new(ClassDeclaration {
                span,
                name,
                fields,
                methods,
            })),
        })
    }

    // "if" "(" expression ")" block ( "else" ( block | if ) )?
    fn parse_if_statement(&mut self) -> ParseResult<IfStatement> {
        let keyword = self.expect_keyword(Keyword::If)?;
        let test = self.parse_parenthesized_expression()?;
        let consequent = self.parse_block()?;
        let mut span = keyword.span.to(consequent.span);

        let alternate = if self.eat(TokenKind::Keyword(Keyword::Else)).is_some() {
            if self.peek_is(TokenKind::Keyword(Keyword::If)) {
                let alternate = self.parse_if_statement()?;
                span = span.to(alternate.span);
                Some(ElseBranch::If(Box::new(alternate)))
            } else {
                let alternate = self.parse_block()?;
                span = span.to(alternate.span);
                Some(ElseBranch::Block(alternate))
            }
        } else {
            None
        };

        Ok(IfStatement {
            span,
            test,
            consequent,
            alternate,
        })
    }

    fn parse_for_statement(&mut self) -> ParseResult<Statement> {
        let keyword = self.expect_keyword(Keyword::For)?;
        self.expect_next_to_be(TokenKind::OpenParen, "`(`")?;

        // C-style loop
        if self.peek_is(TokenKind::Keyword(Keyword::Ingredient)) {
            let init = self.parse_variable_declaration()?;
            let test = self.parse_expression()?;
            self.expect_next_to_be(TokenKind::Semicolon, "`;`")?;

            let update = if matches!(
                self.peek().map(|t| t.kind),
                Some(TokenKind::Increment | TokenKind::Decrement)
            ) {
                self.parse_bump()?
            } else {
                self.parse_assignment_or_call()?
            };

            if !matches!(
                update.kind,
                StatementKind::Bump { .. } | StatementKind::Assignment { .. }
            ) {
                return Err(self.error_at(
                    update.span,
                    SyntaxErrorKind::Invalid("loop update must be an increment or assignment".into()),
                ));
            }

            self.expect_next_to_be(TokenKind::CloseParen, "`)`")?;
            let body = self.parse_block()?;

            return Ok(Statement {
                span: keyword.span.to(body.span),
                kind: StatementKind::For {
                    init: Box::new(init),
                    test: Box::new(test),
                    update: Box::new(update),
                    body,
                },
            });
        }

        let iterator = self.parse_identifier()?;
        self.expect_keyword(Keyword::In)?;
        let low_or_collection = self.parse_expression()?;

        let kind = if self.eat(TokenKind::DoubleDot).is_some() {
            let high = self.parse_expression()?;
            self.expect_next_to_be(TokenKind::CloseParen, "`)`")?;

            StatementKind::ForRange {
                iterator,
                low: Box::new(low_or_collection),
                high: Box::new(high),
                body: self.parse_block()?,
            }
        } else {
            self.expect_next_to_be(TokenKind::CloseParen, "`..` or `)`")?;

            StatementKind::ForEach {
                iterator,
                collection: Box::new(low_or_collection),
                body: self.parse_block()?,
            }
        };

        let end = match &kind {
            StatementKind::ForRange { body, .. } | StatementKind::ForEach { body, .. } => body.span,
            _ => unreachable!(),
        };

        Ok(Statement {
            span: keyword.span.to(end),
            kind,
        })
    }

    // "prep" block ( "rescue" "(" id id ")" block )? ( "cleanup" block )?
    fn parse_try_statement(&mut self) -> ParseResult<Statement> {
        let keyword = self.expect_keyword(Keyword::Prep)?;
        let body = self.parse_block()?;
        let mut span = keyword.span.to(body.span);

        let rescue = match self.eat(TokenKind::Keyword(Keyword::Rescue)) {
            Some(rescue_keyword) => {
                self.expect_next_to_be(TokenKind::OpenParen, "`(`")?;
                let kind = self.parse_identifier()?;
                let binding = self.parse_identifier()?;
                self.expect_next_to_be(TokenKind::CloseParen, "`)`")?;
                let body = self.parse_block()?;

                span = span.to(body.span);

                Some(Box::new(RescueClause {
                    span: rescue_keyword.span.to(body.span),
                    kind,
                    binding,
                    body,
                }))
            }
            None => None,
        };

        let cleanup = if self.eat(TokenKind::Keyword(Keyword::Cleanup)).is_some() {
            let block = self.parse_block()?;
            span = span.to(block.span);
            Some(block)
        } else {
            None
        };

        if rescue.is_none() && cleanup.is_none() {
            return Err(match self.peek() {
                Some(token) => self.unexpected(token, "`rescue` or `cleanup`"),
                None => self.eof("`rescue` or `cleanup`"),
            });
        }

        Ok(Statement {
            span,
            kind: StatementKind::Try {
                body,
                rescue,
                cleanup,
            },
        })
    }

    // type = ( "[" type "]" | "(" ( type ( "," type )* )? ")" "->" type | IDENTIFIER ) "?"*
    fn parse_type(&mut self) -> ParseResult<Type> {
        let start = self.expect_next("type")?;

        let mut ty = match start.kind {
            TokenKind::OpenBracket => {
                let element = self.parse_type()?;
                let close_bracket = self.expect_next_to_be(TokenKind::CloseBracket, "`]`")?;

                Type {
                    span: start.span.to(close_bracket.span),
                    kind: TypeKind::Array(Box::new(element)),
                }
            }
            TokenKind::OpenParen => {
                let mut parameters = Vec::new();

                if !self.peek_is(TokenKind::CloseParen) {
                    parameters.push(self.parse_type()?);

                    while self.eat(TokenKind::Comma).is_some() {
                        parameters.push(self.parse_type()?);
                    }
                }

                self.expect_next_to_be(TokenKind::CloseParen, "`,` or `)`")?;
                self.expect_next_to_be(TokenKind::Arrow, "`->`")?;
                let return_type = self.parse_type()?;

                Type {
                    span: start.span.to(return_type.span),
                    kind: TypeKind::Function {
                        parameters,
                        return_type: Box::new(return_type),
                    },
                }
            }
            TokenKind::Identifier => Type {
                span: start.span,
                kind: TypeKind::Named(Identifier {
                    span: start.span,
                    name: self.source.value_of_span(start.span).to_string(),
                }),
            },
            _ => return Err(self.unexpected(start, "type")),
        };

        while let Some(question) = self.eat(TokenKind::Question) {
            ty = Type {
                span: ty.span.to(question.span),
                kind: TypeKind::Optional(Box::new(ty)),
            };
        }

        Ok(ty)
    }

    fn parse_parenthesized_expression(&mut self) -> ParseResult<Expression> {
        self.expect_next_to_be(TokenKind::OpenParen, "`(`")?;
        let expression = self.parse_expression()?;
        self.expect_next_to_be(TokenKind::CloseParen, "`)`")?;

        Ok(expression)
    }

    /// expression     -> coalesce ( "?" coalesce ":" expression )?
    /// coalesce       -> logical_or ( "??" logical_or )*
    /// logical_or     -> logical_and ( "||" logical_and )*
    /// logical_and    -> bitwise_or ( "&&" bitwise_or )*
    /// bitwise_or     -> bitwise_xor ( "|" bitwise_xor )*
    /// bitwise_xor    -> bitwise_and ( "^" bitwise_and )*
    /// bitwise_and    -> comparison ( "&" comparison )*
    /// comparison     -> bit_shift ( ( "!=" | "==" | "<" | "<=" | ">" | ">=" ) bit_shift )?
    /// bit_shift      -> term ( ( "<<" | ">>" ) term )*
    /// term           -> factor ( ( "-" | "+" ) factor )*
    /// factor         -> power ( ( "/" | "*" | "%" ) power )*
    /// power          -> postfix ( "**" power )?
    ///                   | ( "-" | "!" | "#" | "random" | "poached" ) postfix
    /// postfix        -> primary ( "[" expression "]" | "." id | "?." id | "(" arguments ")" )*
    fn parse_expression(&mut self) -> ParseResult<Expression> {
        let test = self.parse_coalesce_expression()?;

        if self.eat(TokenKind::Question).is_none() {
            return Ok(test);
        }

        let consequent = self.parse_coalesce_expression()?;
        self.expect_next_to_be(TokenKind::Colon, "`:`")?;
        let alternate = self.parse_expression()?;

        Ok(Expression {
            span: test.span.to(alternate.span),
            kind: ExpressionKind::Conditional {
                test: Box::new(test),
                consequent: Box::new(consequent),
                alternate: Box::new(alternate),
            },
        })
    }

    /// Parses a left associative chain of binary operators
    fn parse_binary_chain(
        &mut self,
        operand: fn(&mut Self) -> ParseResult<Expression>,
        operator: fn(TokenKind) -> Option<BinaryOperatorKind>,
    ) -> ParseResult<Expression> {
        let mut expression = operand(self)?;

        while let Some((token, kind)) = self
            .peek()
            .and_then(|token| operator(token.kind).map(|kind| (token, kind)))
        {
            self.cursor += 1;
            let rhs = operand(self)?;

            expression = Expression {
                span: expression.span.to(rhs.span),
                kind: ExpressionKind::Binary {
                    operator: BinaryOperator {
                        span: token.span,
                        kind,
                    },
                    lhs: Box::new(expression),
                    rhs: Box::new(rhs),
                },
            };
        }

        Ok(expression)
    }

    fn parse_coalesce_expression(&mut self) -> ParseResult<Expression> {
        self.parse_binary_chain(Self::parse_logical_or_expression, |kind| {
            (kind == TokenKind::DoubleQuestion).then_some(BinaryOperatorKind::Coalesce)
        })
    }

    fn parse_logical_or_expression(&mut self) -> ParseResult<Expression> {
        self.parse_binary_chain(Self::parse_logical_and_expression, |kind| {
            (kind == TokenKind::LogicalOr).then_some(BinaryOperatorKind::LogicalOr)
        })
    }

    fn parse_logical_and_expression(&mut self) -> ParseResult<Expression> {
        self.parse_binary_chain(Self::parse_bitwise_or_expression, |kind| {
            (kind == TokenKind::LogicalAnd).then_some(BinaryOperatorKind::LogicalAnd)
        })
    }

    // A `|` followed by `const` closes a declaration instead
    fn parse_bitwise_or_expression(&mut self) -> ParseResult<Expression> {
        let mut expression = self.parse_bitwise_xor_expression()?;

        while let Some(token) = self
            .peek()
            .filter(|token| token.kind == TokenKind::BitwiseOr && !self.at_const_marker())
        {
            self.cursor += 1;
            let rhs = self.parse_bitwise_xor_expression()?;

            expression = Expression {
                span: expression.span.to(rhs.span),
                kind: ExpressionKind::Binary {
                    operator: BinaryOperator {
                        span: token.span,
                        kind: BinaryOperatorKind::BitwiseOr,
                    },
                    lhs: Box::new(expression),
                    rhs: Box::new(rhs),
                },
            };
        }

        Ok(expression)
    }

    fn at_const_marker(&self) -> bool {
        self.peek_is(TokenKind::BitwiseOr)
            && self
                .peek_nth(1)
                .is_some_and(|t| t.kind == TokenKind::Keyword(Keyword::Const))
    }

    fn parse_bitwise_xor_expression(&mut self) -> ParseResult<Expression> {
        self.parse_binary_chain(Self::parse_bitwise_and_expression, |kind| {
            (kind == TokenKind::BitwiseXor).then_some(BinaryOperatorKind::BitwiseXor)
        })
    }

    fn parse_bitwise_and_expression(&mut self) -> ParseResult<Expression> {
        self.parse_binary_chain(Self::parse_comparison_expression, |kind| {
            (kind == TokenKind::BitwiseAnd).then_some(BinaryOperatorKind::BitwiseAnd)
        })
    }

    // Comparisons don't chain: `a < b < c` is rejected
    fn parse_comparison_expression(&mut self) -> ParseResult<Expression> {
        let lhs = self.parse_bit_shift_expression()?;

        let Some(token) = self.peek().filter(|t| t.kind.is_comparison_operator()) else {
            return Ok(lhs);
        };

        self.cursor += 1;

        let kind = match token.kind {
            TokenKind::DoubleEquals => BinaryOperatorKind::Equals,
            TokenKind::NotEquals => BinaryOperatorKind::NotEquals,
            TokenKind::LessThan => BinaryOperatorKind::LessThan,
            TokenKind::LessThanOrEqualTo => BinaryOperatorKind::LessThanOrEqualTo,
            TokenKind::GreaterThan => BinaryOperatorKind::GreaterThan,
            TokenKind::GreaterThanOrEqualTo => BinaryOperatorKind::GreaterThanOrEqualTo,
            _ => unreachable!("checked by is_comparison_operator"),
        };

        let rhs = self.parse_bit_shift_expression()?;

        Ok(Expression {
            span: lhs.span.to(rhs.span),
            kind: ExpressionKind::Binary {
                operator: BinaryOperator {
                    span: token.span,
                    kind,
                },
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
        })
    }

    fn parse_bit_shift_expression(&mut self) -> ParseResult<Expression> {
        self.parse_binary_chain(Self::parse_term_expression, |kind| match kind {
            TokenKind::ShiftLeft => Some(BinaryOperatorKind::ShiftLeft),
            TokenKind::ShiftRight => Some(BinaryOperatorKind::ShiftRight),
            _ => None,
        })
    }

    fn parse_term_expression(&mut self) -> ParseResult<Expression> {
        self.parse_binary_chain(Self::parse_factor_expression, |kind| match kind {
            TokenKind::Plus => Some(BinaryOperatorKind::Add),
            TokenKind::Minus => Some(BinaryOperatorKind::Subtract),
            _ => None,
        })
    }

    fn parse_factor_expression(&mut self) -> ParseResult<Expression> {
        self.parse_binary_chain(Self::parse_power_expression, |kind| match kind {
            TokenKind::Asterisk => Some(BinaryOperatorKind::Multiply),
            TokenKind::Divide => Some(BinaryOperatorKind::Divide),
            TokenKind::Modulus => Some(BinaryOperatorKind::Modulus),
            _ => None,
        })
    }

    fn parse_power_expression(&mut self) -> ParseResult<Expression> {
        let peeked = self.expect_peek("expression")?;

        if peeked.kind.is_unary_operator() {
            self.cursor += 1;

            let kind = match peeked.kind {
                TokenKind::Minus => UnaryOperatorKind::Negate,
                TokenKind::Bang => UnaryOperatorKind::Not,
                TokenKind::Hash => UnaryOperatorKind::Length,
                TokenKind::Keyword(Keyword::Random) => UnaryOperatorKind::Random,
                TokenKind::Keyword(Keyword::Poached) => UnaryOperatorKind::Wrap,
                _ => unreachable!("checked by is_unary_operator"),
            };

            let operand = self.parse_postfix_expression()?;

            return Ok(Expression {
                span: peeked.span.to(operand.span),
                kind: ExpressionKind::Unary {
                    operator: UnaryOperator {
                        span: peeked.span,
                        kind,
                    },
                    operand: Box::new(operand),
                },
            });
        }

        let base = self.parse_postfix_expression()?;

        let Some(operator) = self.eat(TokenKind::DoubleAsterisk) else {
            return Ok(base);
        };

        // Right associative
        let exponent = self.parse_power_expression()?;

        Ok(Expression {
            span: base.span.to(exponent.span),
            kind: ExpressionKind::Binary {
                operator: BinaryOperator {
                    span: operator.span,
                    kind: BinaryOperatorKind::Power,
                },
                lhs: Box::new(base),
                rhs: Box::new(exponent),
            },
        })
    }

    fn parse_postfix_expression(&mut self) -> ParseResult<Expression> {
        let mut expression = self.parse_primary_expression()?;

        while let Some(token) = self.peek() {
            expression = match token.kind {
                TokenKind::OpenBracket => {
                    self.cursor += 1;
                    let index = self.parse_expression()?;
                    let close_bracket = self.expect_next_to_be(TokenKind::CloseBracket, "`]`")?;

                    Expression {
                        span: expression.span.to(close_bracket.span),
                        kind: ExpressionKind::Subscript {
                            array: Box::new(expression),
                            index: Box::new(index),
                        },
                    }
                }
                TokenKind::Dot | TokenKind::QuestionDot => {
                    self.cursor += 1;
                    let field = self.parse_identifier()?;

                    Expression {
                        span: expression.span.to(field.span),
                        kind: ExpressionKind::Member {
                            object: Box::new(expression),
                            field,
                            optional_chain: token.kind == TokenKind::QuestionDot,
                        },
                    }
                }
                TokenKind::OpenParen => {
                    let (arguments, span) = self.parse_arguments()?;

                    Expression {
                        span: expression.span.to(span),
                        kind: ExpressionKind::Call {
                            callee: Box::new(expression),
                            arguments,
                        },
                    }
                }
                _ => break,
            };
        }

        Ok(expression)
    }

    // "(" ( expression ( "," expression )* )? ")"
    fn parse_arguments(&mut self) -> ParseResult<(Vec<Expression>, Span)> {
        let open_paren = self.expect_next_to_be(TokenKind::OpenParen, "`(`")?;
        let mut arguments = Vec::new();

        if !self.peek_is(TokenKind::CloseParen) {
            arguments.push(self.parse_expression()?);

            while self.eat(TokenKind::Comma).is_some() {
                arguments.push(self.parse_expression()?);
            }
        }

        let close_paren = self.expect_next_to_be(TokenKind::CloseParen, "`,` or `)`")?;

        Ok((arguments, open_paren.span.to(close_paren.span)))
    }

    /// `[T]()`, tried before an array literal starting with the same bracket
    fn try_parse_empty_array(&mut self) -> Option<Expression> {
        let checkpoint = self.cursor;

        let parsed = (|| {
            let ty = self.parse_type().ok()?;

            if !matches!(ty.kind, TypeKind::Array(_)) {
                return None;
            }

            self.eat(TokenKind::OpenParen)?;
            let close_paren = self.eat(TokenKind::CloseParen)?;

            Some(Expression {
                span: ty.span.to(close_paren.span),
                kind: ExpressionKind::EmptyArray(ty),
            })
        })();

        if parsed.is_none() {
            self.cursor = checkpoint;
        }

        parsed
    }

    fn parse_number<T: FromStr>(&self, token: Token) -> ParseResult<T> {
        let lexeme = self.source.value_of_span(token.span);

        lexeme.parse().map_err(|_| {
            self.error_at(
                token.span,
                SyntaxErrorKind::MalformedNumber(lexeme.to_string()),
            )
        })
    }

    fn parse_primary_expression(&mut self) -> ParseResult<Expression> {
        let token = self.expect_peek("expression")?;

        let lexeme = self.source.value_of_span(token.span);

        let literal = match token.kind {
            TokenKind::IntegerLiteral => Some(Literal::Integer(self.parse_number(token)?)),
            TokenKind::FloatLiteral => Some(Literal::Float(self.parse_number(token)?)),
            TokenKind::StringLiteral => Some(Literal::String(lexeme.to_string())),
            TokenKind::BooleanLiteral => Some(Literal::Boolean(lexeme == "fresh")),
            _ => None,
        };

        if let Some(literal) = literal {
            self.cursor += 1;

            return Ok(Expression {
                span: token.span,
                kind: ExpressionKind::Literal(literal),
            });
        }

        match token.kind {
            TokenKind::Keyword(Keyword::Raw) => {
                self.cursor += 1;
                let ty = self.parse_type()?;

                Ok(Expression {
                    span: token.span.to(ty.span),
                    kind: ExpressionKind::EmptyOptional(ty),
                })
            }
            TokenKind::OpenBracket => {
                if let Some(empty_array) = self.try_parse_empty_array() {
                    return Ok(empty_array);
                }

                self.cursor += 1;
                let mut elements = Vec::new();

                if !self.peek_is(TokenKind::CloseBracket) {
                    elements.push(self.parse_expression()?);

                    while self.eat(TokenKind::Comma).is_some() {
                        elements.push(self.parse_expression()?);
                    }
                }

                let close_bracket = self.expect_next_to_be(TokenKind::CloseBracket, "`,` or `]`")?;

                Ok(Expression {
                    span: token.span.to(close_bracket.span),
                    kind: ExpressionKind::Array(elements),
                })
            }
            TokenKind::OpenParen => {
                self.cursor += 1;
                let mut expression = self.parse_expression()?;
                let close_paren = self.expect_next_to_be(TokenKind::CloseParen, "`)`")?;
                expression.span = token.span.to(close_paren.span);

                Ok(expression)
            }
            TokenKind::Keyword(Keyword::New) => {
                self.cursor += 1;
                let class = self.parse_identifier()?;
                let (arguments, span) = self.parse_arguments()?;

                Ok(Expression {
                    span: token.span.to(span),
                    kind: ExpressionKind::New { class, arguments },
                })
            }
            TokenKind::Identifier => {
                let identifier = self.parse_identifier()?;

                Ok(Expression {
                    span: identifier.span,
                    kind: ExpressionKind::Identifier(identifier),
                })
            }
            _ => Err(self.unexpected(token, "expression")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::Position;

    fn parse(source: &str) -> Program {
        Parser::parse_program(&SourceFile::from_memory(source)).unwrap()
    }

    fn parse_err(source: &str) -> SyntaxError {
        Parser::parse_program(&SourceFile::from_memory(source)).unwrap_err()
    }

    fn expression(source: &str) -> Expression {
        let program = parse(&format!("serve({source});"));

        let StatementKind::Call(call) = &program.statements[0].kind else {
            panic!("expected call statement");
        };
        let ExpressionKind::Call { arguments, .. } = &call.kind else {
            panic!("expected call expression");
        };

        arguments[0].clone()
    }

    fn binary_operator(expression: &Expression) -> BinaryOperatorKind {
        match &expression.kind {
            ExpressionKind::Binary { operator, .. } => operator.kind,
            other => panic!("expected binary expression, found {other:?}"),
        }
    }

    #[test]
    fn declarations_with_const_marker() {
        let program = parse("ingredient x := 1, y: int | const;");

        let StatementKind::VariableDeclaration(declaration) = &program.statements[0].kind else {
            panic!("expected declaration");
        };

        assert!(declaration.is_const);
        assert_eq!(declaration.declarators.len(), 2);
        assert_eq!(declaration.declarators[1].name.name, "y");
        assert!(declaration.declarators[1].initializer.is_none());
    }

    #[test]
    fn const_marker_after_initializer() {
        let program = parse("ingredient x := 1 | const; ingredient y := 1 | 2;");

        let StatementKind::VariableDeclaration(declaration) = &program.statements[0].kind else {
            panic!("expected declaration");
        };
        assert!(declaration.is_const);
        assert!(matches!(
            declaration.declarators[0].initializer.as_ref().map(|e| &e.kind),
            Some(ExpressionKind::Literal(_))
        ));

        let StatementKind::VariableDeclaration(declaration) = &program.statements[1].kind else {
            panic!("expected declaration");
        };
        assert!(!declaration.is_const);
        assert_eq!(
            declaration.declarators[0]
                .initializer
                .as_ref()
                .map(binary_operator),
            Some(BinaryOperatorKind::BitwiseOr)
        );
    }

    #[test]
    fn precedence_follows_grammar() {
        // (5 ** -x / -100 > -x) || stale
        let parsed = expression("5 ** -x / -100 > - x || stale");
        assert_eq!(binary_operator(&parsed), BinaryOperatorKind::LogicalOr);

        let ExpressionKind::Binary { lhs, .. } = &parsed.kind else {
            unreachable!()
        };
        assert_eq!(binary_operator(lhs), BinaryOperatorKind::GreaterThan);

        let ExpressionKind::Binary { lhs, .. } = &lhs.kind else {
            unreachable!()
        };
        assert_eq!(binary_operator(lhs), BinaryOperatorKind::Divide);
    }

    #[test]
    fn power_is_right_associative() {
        let parsed = expression("2 ** 3 ** 2");

        let ExpressionKind::Binary { rhs, .. } = &parsed.kind else {
            panic!("expected binary");
        };
        assert_eq!(binary_operator(rhs), BinaryOperatorKind::Power);
    }

    #[test]
    fn coalesce_is_left_associative_and_below_or() {
        let parsed = expression("a ?? b ?? c || d");

        let ExpressionKind::Binary { lhs, rhs, operator } = &parsed.kind else {
            panic!("expected binary");
        };
        assert_eq!(operator.kind, BinaryOperatorKind::Coalesce);
        assert_eq!(binary_operator(lhs), BinaryOperatorKind::Coalesce);
        assert_eq!(binary_operator(rhs), BinaryOperatorKind::LogicalOr);
    }

    #[test]
    fn empty_array_and_array_literal() {
        assert!(matches!(
            expression("[[int]]()").kind,
            ExpressionKind::EmptyArray(Type {
                kind: TypeKind::Array(_),
                ..
            })
        ));

        let ExpressionKind::Array(elements) = expression("[a, b]").kind else {
            panic!("expected array literal");
        };
        assert_eq!(elements.len(), 2);

        // A single identifier in brackets is still an array literal unless called
        assert!(matches!(expression("[a]").kind, ExpressionKind::Array(_)));
    }

    #[test]
    fn three_for_loop_forms() {
        let program = parse(
            "for (ingredient i := 0; i < 5; ++i) {} for (j in 1..3) {} for (k in xs) {}",
        );

        assert!(matches!(program.statements[0].kind, StatementKind::For { .. }));
        assert!(matches!(
            program.statements[1].kind,
            StatementKind::ForRange { .. }
        ));
        assert!(matches!(
            program.statements[2].kind,
            StatementKind::ForEach { .. }
        ));
    }

    #[test]
    fn classes_and_typed_declarations() {
        let program = parse(
            "Dish S { ingredient x: int; recipe get(): int { return x; } } S s := new S(3); s.x = 4;",
        );

        let StatementKind::ClassDeclaration(class) = &program.statements[0].kind else {
            panic!("expected class");
        };
        assert_eq!(class.fields.len(), 1);
        assert_eq!(class.methods.len(), 1);

        assert!(matches!(
            program.statements[1].kind,
            StatementKind::TypedDeclaration { .. }
        ));
        assert!(matches!(
            program.statements[2].kind,
            StatementKind::Assignment { .. }
        ));
    }

    #[test]
    fn else_if_chains() {
        let program = parse("if (a) {} else if (b) {} else {}");

        let StatementKind::If(statement) = &program.statements[0].kind else {
            panic!("expected if");
        };
        let Some(ElseBranch::If(nested)) = &statement.alternate else {
            panic!("expected else if");
        };
        assert!(matches!(nested.alternate, Some(ElseBranch::Block(_))));
    }

    #[test]
    fn try_needs_rescue_or_cleanup() {
        let program = parse("prep { } rescue (ValueError e) { } cleanup { }");
        assert!(matches!(program.statements[0].kind, StatementKind::Try { .. }));

        let error = parse_err("prep { } serve(1);");
        assert!(matches!(error.kind, SyntaxErrorKind::UnexpectedToken { .. }));
    }

    #[test]
    fn function_and_optional_types() {
        let program = parse("ingredient f: (int, float?) -> [string]?;");

        let StatementKind::VariableDeclaration(declaration) = &program.statements[0].kind else {
            panic!("expected declaration");
        };
        let Some(ty) = &declaration.declarators[0].ty else {
            panic!("expected a type");
        };
        // The suffix binds to the return type
        let TypeKind::Function {
            parameters,
            return_type,
        } = &ty.kind
        else {
            panic!("expected function type");
        };
        assert!(matches!(parameters[1].kind, TypeKind::Optional(_)));
        assert!(matches!(return_type.kind, TypeKind::Optional(_)));
    }

    #[test]
    fn bare_expression_is_not_a_statement() {
        let error = parse_err("x + 1;");

        assert_eq!(error.position, Position::new(1, 3));
    }

    #[test]
    fn comparisons_do_not_chain() {
        let error = parse_err("serve(1 < 2 < 3);");

        assert_eq!(
            error.kind,
            SyntaxErrorKind::UnexpectedToken {
                expected: "`,` or `)`".to_string(),
                found: "<".to_string()
            }
        );
    }

    #[test]
    fn literals_carry_values() {
        assert_eq!(
            expression("2.5e-3").kind,
            ExpressionKind::Literal(Literal::Float(0.0025))
        );
        assert_eq!(
            expression("stale").kind,
            ExpressionKind::Literal(Literal::Boolean(false))
        );

        let error = parse_err("serve(99999999999999999999);");
        assert_eq!(
            error.kind,
            SyntaxErrorKind::MalformedNumber("99999999999999999999".to_string())
        );
    }

    #[test]
    fn reports_end_of_file() {
        let error = parse_err("recipe f() {");

        assert!(matches!(error.kind, SyntaxErrorKind::UnexpectedEof(_)));
    }
}

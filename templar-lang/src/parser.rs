use crate::ast::*;
use crate::error::{LangError, Loc, Result};
use crate::lexer::{tokenize, SpannedToken, Token};

/// Parser for templar source
pub struct Parser<'a> {
    tokens: &'a [SpannedToken],
    pos: usize,
    /// Line of the most recently consumed non-layout token
    last_line: u32,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [SpannedToken]) -> Self {
        Self {
            tokens,
            pos: 0,
            last_line: 1,
        }
    }

    /// Peek at current token
    fn peek(&self) -> Option<&SpannedToken> {
        self.tokens.get(self.pos)
    }

    fn peek_token(&self) -> &Token {
        self.peek().map(|t| &t.token).unwrap_or(&Token::Eof)
    }

    fn peek_nth(&self, n: usize) -> &Token {
        self.tokens.get(self.pos + n).map(|t| &t.token).unwrap_or(&Token::Eof)
    }

    fn current_loc(&self) -> Loc {
        self.peek()
            .or_else(|| self.tokens.last())
            .map(|t| t.loc)
            .unwrap_or_default()
    }

    /// Advance to next token
    fn advance(&mut self) -> Option<&SpannedToken> {
        let token = self.tokens.get(self.pos);
        if let Some(t) = token {
            self.pos += 1;
            if !matches!(t.token, Token::Newline | Token::Indent | Token::Dedent | Token::Eof) {
                self.last_line = t.loc.line;
            }
        }
        token
    }

    /// Check if current token matches expected
    fn check(&self, expected: &Token) -> bool {
        self.peek()
            .map(|t| std::mem::discriminant(&t.token) == std::mem::discriminant(expected))
            .unwrap_or(false)
    }

    /// Consume token if it matches
    fn consume(&mut self, expected: &Token) -> bool {
        if self.check(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Expect a token, error if not found
    fn expect(&mut self, expected: Token, what: &str) -> Result<Loc> {
        if self.check(&expected) {
            let loc = self.current_loc();
            self.advance();
            Ok(loc)
        } else {
            Err(self.error(format!("expected {}", what)))
        }
    }

    fn error(&self, message: impl Into<String>) -> LangError {
        let message = message.into();
        let found = match self.peek_token() {
            Token::Newline => "end of line".to_string(),
            Token::Indent => "indent".to_string(),
            Token::Dedent => "dedent".to_string(),
            Token::Eof => "end of input".to_string(),
            other => format!("{:?}", other),
        };
        LangError::syntax(self.current_loc(), format!("{}, found {}", message, found))
    }

    fn expect_identifier(&mut self) -> Result<String> {
        match self.peek_token().clone() {
            Token::Identifier(name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.error("expected identifier")),
        }
    }

    /// Check if at end of input
    fn is_eof(&self) -> bool {
        matches!(self.peek_token(), Token::Eof)
    }

    /// Parse a whole module
    pub fn parse_module(&mut self) -> Result<Module> {
        let mut body = Vec::new();
        while !self.is_eof() {
            if self.consume(&Token::Newline) {
                continue;
            }
            body.push(self.parse_statement()?);
        }
        Ok(Module { body })
    }

    fn parse_statement(&mut self) -> Result<Stmt> {
        match self.peek_token() {
            Token::At => self.parse_decorated(),
            Token::Def => self.parse_function_def(Vec::new(), None),
            Token::Async => self.parse_function_def(Vec::new(), None),
            Token::Class => self.parse_class_def(Vec::new(), None),
            Token::If => self.parse_if(),
            Token::While => self.parse_while(),
            Token::For => self.parse_for(),
            Token::With => self.parse_with(),
            Token::Try => self.parse_try(),
            Token::Indent => Err(self.error("unexpected indent")),
            _ => {
                let stmt = self.parse_simple_statement()?;
                self.end_of_line()?;
                Ok(stmt)
            }
        }
    }

    fn end_of_line(&mut self) -> Result<()> {
        if self.consume(&Token::Newline) || self.is_eof() {
            Ok(())
        } else {
            Err(self.error("expected end of line"))
        }
    }

    fn parse_decorated(&mut self) -> Result<Stmt> {
        let first_line = self.current_loc().line;
        let mut decorators = Vec::new();
        while self.consume(&Token::At) {
            decorators.push(self.parse_expr()?);
            self.expect(Token::Newline, "newline after decorator")?;
        }
        match self.peek_token() {
            Token::Def | Token::Async => self.parse_function_def(decorators, Some(first_line)),
            Token::Class => self.parse_class_def(decorators, Some(first_line)),
            _ => Err(self.error("expected function or class definition after decorator")),
        }
    }

    fn parse_function_def(&mut self, decorators: Vec<Expr>, first_line: Option<u32>) -> Result<Stmt> {
        let loc = self.current_loc();
        let is_async = self.consume(&Token::Async);
        self.expect(Token::Def, "'def'")?;
        let name = self.expect_identifier()?;
        self.expect(Token::LParen, "'('")?;
        let params = self.parse_parameters(&Token::RParen, true)?;
        self.expect(Token::RParen, "')'")?;
        let returns = if self.consume(&Token::Arrow) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        let body = self.parse_block()?;
        let def = FunctionDef {
            name,
            is_async,
            decorators,
            params,
            returns,
            body,
            first_line: first_line.unwrap_or(loc.line),
            last_line: self.last_line,
        };
        Ok(Stmt::new(StmtKind::FunctionDef(Box::new(def)), loc))
    }

    fn parse_class_def(&mut self, decorators: Vec<Expr>, first_line: Option<u32>) -> Result<Stmt> {
        let loc = self.expect(Token::Class, "'class'")?;
        let name = self.expect_identifier()?;
        let mut bases = Vec::new();
        if self.consume(&Token::LParen) {
            while !self.check(&Token::RParen) {
                bases.push(self.parse_expr()?);
                if !self.consume(&Token::Comma) {
                    break;
                }
            }
            self.expect(Token::RParen, "')'")?;
        }
        let body = self.parse_block()?;
        let class = ClassDef {
            name,
            bases,
            decorators,
            body,
            first_line: first_line.unwrap_or(loc.line),
            last_line: self.last_line,
        };
        Ok(Stmt::new(StmtKind::ClassDef(Box::new(class)), loc))
    }

    /// Parse a parameter list up to (not including) `close`
    fn parse_parameters(&mut self, close: &Token, annotations: bool) -> Result<Parameters> {
        let mut params = Parameters::default();
        let mut keyword_only = false;
        let mut seen_default = false;

        while !self.check(close) {
            if self.consume(&Token::StarStar) {
                let name = self.expect_identifier()?;
                let annotation = self.parse_annotation(annotations)?;
                params.kwarg = Some(Param {
                    name,
                    annotation,
                    default: None,
                });
                self.consume(&Token::Comma);
                break;
            }

            if self.consume(&Token::Star) {
                if keyword_only {
                    return Err(self.error("duplicate '*' in parameter list"));
                }
                keyword_only = true;
                if let Token::Identifier(_) = self.peek_token() {
                    let name = self.expect_identifier()?;
                    let annotation = self.parse_annotation(annotations)?;
                    params.vararg = Some(Param {
                        name,
                        annotation,
                        default: None,
                    });
                }
            } else {
                let name = self.expect_identifier()?;
                let annotation = self.parse_annotation(annotations)?;
                let default = if self.consume(&Token::Eq) {
                    Some(self.parse_expr()?)
                } else {
                    None
                };
                if keyword_only {
                    params.kwonly.push(Param {
                        name,
                        annotation,
                        default,
                    });
                } else {
                    if default.is_some() {
                        seen_default = true;
                    } else if seen_default {
                        return Err(self.error("non-default argument follows default argument"));
                    }
                    params.positional.push(Param {
                        name,
                        annotation,
                        default,
                    });
                }
            }

            if !self.consume(&Token::Comma) {
                break;
            }
        }

        let mut seen = std::collections::HashSet::new();
        for name in params.names() {
            if !seen.insert(name) {
                return Err(LangError::syntax(
                    self.current_loc(),
                    format!("duplicate argument '{}' in function definition", name),
                ));
            }
        }
        Ok(params)
    }

    fn parse_annotation(&mut self, allowed: bool) -> Result<Option<Expr>> {
        if allowed && self.consume(&Token::Colon) {
            Ok(Some(self.parse_expr()?))
        } else {
            Ok(None)
        }
    }

    /// Parse `: NEWLINE INDENT stmt+ DEDENT` or `: simple_stmt`
    fn parse_block(&mut self) -> Result<Vec<Stmt>> {
        self.expect(Token::Colon, "':'")?;
        if !self.consume(&Token::Newline) {
            let stmt = self.parse_simple_statement()?;
            self.end_of_line()?;
            return Ok(vec![stmt]);
        }
        self.expect(Token::Indent, "an indented block")?;
        let mut body = Vec::new();
        while !self.check(&Token::Dedent) && !self.is_eof() {
            body.push(self.parse_statement()?);
        }
        self.consume(&Token::Dedent);
        Ok(body)
    }

    fn parse_if(&mut self) -> Result<Stmt> {
        let loc = self.current_loc();
        self.advance();
        let test = self.parse_expr()?;
        let body = self.parse_block()?;
        let orelse = match self.peek_token() {
            Token::Elif => vec![self.parse_if()?],
            Token::Else => {
                self.advance();
                self.parse_block()?
            }
            _ => Vec::new(),
        };
        Ok(Stmt::new(StmtKind::If { test, body, orelse }, loc))
    }

    fn parse_while(&mut self) -> Result<Stmt> {
        let loc = self.expect(Token::While, "'while'")?;
        let test = self.parse_expr()?;
        let body = self.parse_block()?;
        Ok(Stmt::new(StmtKind::While { test, body }, loc))
    }

    fn parse_for(&mut self) -> Result<Stmt> {
        let loc = self.expect(Token::For, "'for'")?;
        let target = self.parse_postfix()?;
        check_target(&target)?;
        self.expect(Token::In, "'in'")?;
        let iter = self.parse_expr()?;
        let body = self.parse_block()?;
        Ok(Stmt::new(StmtKind::For { target, iter, body }, loc))
    }

    fn parse_with(&mut self) -> Result<Stmt> {
        let loc = self.expect(Token::With, "'with'")?;
        let mut items = Vec::new();
        loop {
            let context = self.parse_expr()?;
            let target = if self.consume(&Token::As) {
                let target = self.parse_postfix()?;
                check_target(&target)?;
                Some(target)
            } else {
                None
            };
            items.push(WithItem { context, target });
            if !self.consume(&Token::Comma) {
                break;
            }
        }
        let body = self.parse_block()?;
        Ok(Stmt::new(StmtKind::With { items, body }, loc))
    }

    fn parse_try(&mut self) -> Result<Stmt> {
        let loc = self.expect(Token::Try, "'try'")?;
        let body = self.parse_block()?;
        let mut handlers = Vec::new();
        while self.consume(&Token::Except) {
            let typ = if self.check(&Token::Colon) {
                None
            } else {
                Some(self.parse_expr()?)
            };
            let name = if self.consume(&Token::As) {
                Some(self.expect_identifier()?)
            } else {
                None
            };
            let body = self.parse_block()?;
            handlers.push(ExceptHandler { typ, name, body });
        }
        if handlers.is_empty() {
            return Err(self.error("expected 'except' block"));
        }
        Ok(Stmt::new(StmtKind::Try { body, handlers }, loc))
    }

    fn parse_simple_statement(&mut self) -> Result<Stmt> {
        let loc = self.current_loc();
        let kind = match self.peek_token() {
            Token::Pass => {
                self.advance();
                StmtKind::Pass
            }
            Token::Break => {
                self.advance();
                StmtKind::Break
            }
            Token::Continue => {
                self.advance();
                StmtKind::Continue
            }
            Token::Return => {
                self.advance();
                if self.at_statement_end() {
                    StmtKind::Return(None)
                } else {
                    StmtKind::Return(Some(self.parse_expr()?))
                }
            }
            Token::Raise => {
                self.advance();
                if self.at_statement_end() {
                    StmtKind::Raise(None)
                } else {
                    StmtKind::Raise(Some(self.parse_expr()?))
                }
            }
            Token::Global | Token::Nonlocal => {
                let is_global = matches!(self.peek_token(), Token::Global);
                self.advance();
                let mut names = vec![self.expect_identifier()?];
                while self.consume(&Token::Comma) {
                    names.push(self.expect_identifier()?);
                }
                if is_global {
                    StmtKind::Global(names)
                } else {
                    StmtKind::Nonlocal(names)
                }
            }
            Token::Assert => {
                self.advance();
                let test = self.parse_expr()?;
                let msg = if self.consume(&Token::Comma) {
                    Some(self.parse_expr()?)
                } else {
                    None
                };
                StmtKind::Assert { test, msg }
            }
            _ => self.parse_expression_statement()?,
        };
        Ok(Stmt::new(kind, loc))
    }

    fn at_statement_end(&self) -> bool {
        matches!(self.peek_token(), Token::Newline | Token::Eof | Token::Dedent)
    }

    fn parse_expression_statement(&mut self) -> Result<StmtKind> {
        let first = self.parse_expr()?;

        let aug = match self.peek_token() {
            Token::PlusEq => Some(BinOp::Add),
            Token::MinusEq => Some(BinOp::Sub),
            Token::StarEq => Some(BinOp::Mul),
            Token::SlashEq => Some(BinOp::Div),
            _ => None,
        };
        if let Some(op) = aug {
            self.advance();
            check_target(&first)?;
            let value = self.parse_expr()?;
            return Ok(StmtKind::AugAssign {
                target: first,
                op,
                value,
            });
        }

        // Annotated assignment: the annotation is parsed and discarded
        if self.check(&Token::Colon) && first.as_name().is_some() {
            self.advance();
            self.parse_expr()?;
            if !self.consume(&Token::Eq) {
                return Ok(StmtKind::Pass);
            }
            let value = self.parse_expr()?;
            return Ok(StmtKind::Assign {
                targets: vec![first],
                value,
            });
        }

        if !self.check(&Token::Eq) {
            return Ok(StmtKind::Expr(first));
        }

        let mut exprs = vec![first];
        while self.consume(&Token::Eq) {
            exprs.push(self.parse_expr()?);
        }
        let value = exprs.pop().ok_or_else(|| self.error("expected expression"))?;
        for target in &exprs {
            check_target(target)?;
        }
        Ok(StmtKind::Assign { targets: exprs, value })
    }

    /// Parse an expression, including `lambda` and `yield`
    pub fn parse_expr(&mut self) -> Result<Expr> {
        match self.peek_token() {
            Token::Lambda => self.parse_lambda(),
            Token::Yield => self.parse_yield(),
            _ => self.parse_or(),
        }
    }

    fn parse_lambda(&mut self) -> Result<Expr> {
        let loc = self.expect(Token::Lambda, "'lambda'")?;
        let params = self.parse_parameters(&Token::Colon, false)?;
        self.expect(Token::Colon, "':'")?;
        let body = self.parse_expr()?;
        Ok(Expr::new(
            ExprKind::Lambda {
                params: Box::new(params),
                body: Box::new(body),
            },
            loc,
        ))
    }

    fn parse_yield(&mut self) -> Result<Expr> {
        let loc = self.expect(Token::Yield, "'yield'")?;
        if self.consume(&Token::From) {
            let value = self.parse_expr()?;
            return Ok(Expr::new(ExprKind::YieldFrom(Box::new(value)), loc));
        }
        let ends = matches!(
            self.peek_token(),
            Token::Newline | Token::Eof | Token::Dedent | Token::RParen | Token::RBracket | Token::RBrace
        );
        let value = if ends { None } else { Some(Box::new(self.parse_expr()?)) };
        Ok(Expr::new(ExprKind::Yield(value), loc))
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut left = self.parse_and()?;
        while self.check(&Token::Or) {
            let loc = self.current_loc();
            self.advance();
            let right = self.parse_and()?;
            left = Expr::new(
                ExprKind::BoolOp {
                    op: BoolOp::Or,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                loc,
            );
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut left = self.parse_not()?;
        while self.check(&Token::And) {
            let loc = self.current_loc();
            self.advance();
            let right = self.parse_not()?;
            left = Expr::new(
                ExprKind::BoolOp {
                    op: BoolOp::And,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                loc,
            );
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr> {
        if self.check(&Token::Not) {
            let loc = self.current_loc();
            self.advance();
            let operand = self.parse_not()?;
            return Ok(Expr::new(
                ExprKind::UnaryOp {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                },
                loc,
            ));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let left = self.parse_additive()?;
        let loc = self.current_loc();
        let op = match (self.peek_token(), self.peek_nth(1)) {
            (Token::EqEq, _) => CmpOp::Eq,
            (Token::NotEq, _) => CmpOp::NotEq,
            (Token::Lt, _) => CmpOp::Lt,
            (Token::Le, _) => CmpOp::Le,
            (Token::Gt, _) => CmpOp::Gt,
            (Token::Ge, _) => CmpOp::Ge,
            (Token::In, _) => CmpOp::In,
            (Token::Not, Token::In) => {
                self.advance();
                CmpOp::NotIn
            }
            (Token::Is, Token::Not) => {
                self.advance();
                CmpOp::IsNot
            }
            (Token::Is, _) => CmpOp::Is,
            _ => return Ok(left),
        };
        self.advance();
        let right = self.parse_additive()?;
        Ok(Expr::new(
            ExprKind::Compare {
                left: Box::new(left),
                op,
                right: Box::new(right),
            },
            loc,
        ))
    }

    fn parse_additive(&mut self) -> Result<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek_token() {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => return Ok(left),
            };
            let loc = self.current_loc();
            self.advance();
            let right = self.parse_multiplicative()?;
            left = binary(left, op, right, loc);
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek_token() {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                Token::SlashSlash => BinOp::FloorDiv,
                Token::Percent => BinOp::Mod,
                _ => return Ok(left),
            };
            let loc = self.current_loc();
            self.advance();
            let right = self.parse_unary()?;
            left = binary(left, op, right, loc);
        }
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        let op = match self.peek_token() {
            Token::Minus => UnaryOp::Neg,
            Token::Plus => UnaryOp::Pos,
            _ => return self.parse_power(),
        };
        let loc = self.current_loc();
        self.advance();
        let operand = self.parse_unary()?;
        Ok(Expr::new(
            ExprKind::UnaryOp {
                op,
                operand: Box::new(operand),
            },
            loc,
        ))
    }

    fn parse_power(&mut self) -> Result<Expr> {
        let base = self.parse_await()?;
        if self.check(&Token::StarStar) {
            let loc = self.current_loc();
            self.advance();
            let exponent = self.parse_unary()?;
            return Ok(binary(base, BinOp::Pow, exponent, loc));
        }
        Ok(base)
    }

    fn parse_await(&mut self) -> Result<Expr> {
        if self.check(&Token::Await) {
            let loc = self.current_loc();
            self.advance();
            let value = self.parse_postfix()?;
            return Ok(Expr::new(ExprKind::Await(Box::new(value)), loc));
        }
        self.parse_postfix()
    }

    /// Atom followed by calls, attribute accesses and subscripts
    fn parse_postfix(&mut self) -> Result<Expr> {
        let mut expr = self.parse_atom()?;
        loop {
            match self.peek_token() {
                Token::Dot => {
                    self.advance();
                    let attr = self.expect_identifier()?;
                    let loc = expr.loc;
                    expr = Expr::new(
                        ExprKind::Attribute {
                            value: Box::new(expr),
                            attr,
                        },
                        loc,
                    );
                }
                Token::LParen => {
                    self.advance();
                    let (args, keywords) = self.parse_call_arguments()?;
                    self.expect(Token::RParen, "')'")?;
                    let loc = expr.loc;
                    expr = Expr::new(
                        ExprKind::Call {
                            func: Box::new(expr),
                            args,
                            keywords,
                        },
                        loc,
                    );
                }
                Token::LBracket => {
                    self.advance();
                    let index = self.parse_expr()?;
                    self.expect(Token::RBracket, "']'")?;
                    let loc = expr.loc;
                    expr = Expr::new(
                        ExprKind::Subscript {
                            value: Box::new(expr),
                            index: Box::new(index),
                        },
                        loc,
                    );
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_call_arguments(&mut self) -> Result<(Vec<Expr>, Vec<Keyword>)> {
        let mut args = Vec::new();
        let mut keywords: Vec<Keyword> = Vec::new();
        while !self.check(&Token::RParen) {
            if let (Token::Identifier(name), Token::Eq) = (self.peek_token(), self.peek_nth(1)) {
                let name = name.clone();
                if keywords.iter().any(|k| k.name == name) {
                    return Err(self.error(format!("keyword argument repeated: {}", name)));
                }
                self.advance();
                self.advance();
                let value = self.parse_expr()?;
                keywords.push(Keyword { name, value });
            } else {
                if !keywords.is_empty() {
                    return Err(self.error("positional argument follows keyword argument"));
                }
                args.push(self.parse_expr()?);
            }
            if !self.consume(&Token::Comma) {
                break;
            }
        }
        Ok((args, keywords))
    }

    fn parse_atom(&mut self) -> Result<Expr> {
        let loc = self.current_loc();
        let token = self.peek_token().clone();
        let kind = match token {
            Token::Identifier(name) => {
                self.advance();
                ExprKind::Name(name)
            }
            Token::IntLiteral(value) => {
                self.advance();
                ExprKind::Constant(Constant::Int(value))
            }
            Token::FloatLiteral(value) => {
                self.advance();
                ExprKind::Constant(Constant::Float(value))
            }
            Token::StringLiteral(value) => {
                self.advance();
                let mut value = value;
                while let Token::StringLiteral(next) = self.peek_token() {
                    value.push_str(next);
                    self.advance();
                }
                ExprKind::Constant(Constant::Str(value))
            }
            Token::None => {
                self.advance();
                ExprKind::Constant(Constant::None)
            }
            Token::True => {
                self.advance();
                ExprKind::Constant(Constant::Bool(true))
            }
            Token::False => {
                self.advance();
                ExprKind::Constant(Constant::Bool(false))
            }
            Token::LParen => {
                self.advance();
                let mut inner = self.parse_expr()?;
                self.expect(Token::RParen, "')'")?;
                inner.loc = loc;
                return Ok(inner);
            }
            Token::LBracket => {
                self.advance();
                let mut items = Vec::new();
                while !self.check(&Token::RBracket) {
                    items.push(self.parse_expr()?);
                    if !self.consume(&Token::Comma) {
                        break;
                    }
                }
                self.expect(Token::RBracket, "']'")?;
                ExprKind::List(items)
            }
            Token::LBrace => {
                self.advance();
                let mut pairs = Vec::new();
                while !self.check(&Token::RBrace) {
                    let key = self.parse_expr()?;
                    self.expect(Token::Colon, "':'")?;
                    let value = self.parse_expr()?;
                    pairs.push((key, value));
                    if !self.consume(&Token::Comma) {
                        break;
                    }
                }
                self.expect(Token::RBrace, "'}'")?;
                ExprKind::Dict(pairs)
            }
            _ => return Err(self.error("expected expression")),
        };
        Ok(Expr::new(kind, loc))
    }
}

fn binary(left: Expr, op: BinOp, right: Expr, loc: Loc) -> Expr {
    Expr::new(
        ExprKind::BinOp {
            left: Box::new(left),
            op,
            right: Box::new(right),
        },
        loc,
    )
}

fn check_target(target: &Expr) -> Result<()> {
    match &target.kind {
        ExprKind::Name(_) | ExprKind::Attribute { .. } | ExprKind::Subscript { .. } => Ok(()),
        _ => Err(LangError::syntax(target.loc, "cannot assign to expression")),
    }
}

/// Tokenize and parse source text into a module
pub fn parse_source(source: &str) -> Result<Module> {
    let tokens = tokenize(source)?;
    let mut parser = Parser::new(&tokens);
    parser.parse_module()
}

//! Recursive descent parser for the config dialect

use crate::ast::*;
use crate::error::ParseError;
use crate::lexer::{tokenize, Span, Token};
use std::sync::Arc;

type Result<T> = std::result::Result<T, ParseError>;

/// Deepest nesting of expressions and blocks the parser accepts
pub const MAX_NESTING: usize = 200;

/// Parse a whole module
pub fn parse(source: &str) -> Result<Module> {
    let tokens = tokenize(source)?;
    Parser::new(tokens).parse_module()
}

/// Parse a single expression, such as a `--var` value or a REPL line
pub fn parse_expression(source: &str) -> Result<Expr> {
    let tokens = tokenize(source)?;
    let mut parser = Parser::new(tokens);
    let expr = parser.parse_expr_list()?;
    while matches!(parser.peek(), Token::Newline(_)) {
        parser.advance();
    }
    if *parser.peek() != Token::Eof {
        return Err(parser.unexpected("end of expression"));
    }
    Ok(expr)
}

pub struct Parser<'a> {
    tokens: Vec<(Token<'a>, Span)>,
    pos: usize,
    /// Depth of nested blocks (`def`, `if`, `for`)
    blocks: usize,
    /// Depth of the syntax tree being built, bounded by [`MAX_NESTING`]
    depth: usize,
    functions: usize,
    loops: usize,
}

impl<'a> Parser<'a> {
    /// `tokens` must end with `Eof`, as produced by [`tokenize`]
    pub fn new(tokens: Vec<(Token<'a>, Span)>) -> Self {
        Self {
            tokens,
            pos: 0,
            blocks: 0,
            depth: 0,
            functions: 0,
            loops: 0,
        }
    }

    fn peek(&self) -> &Token<'a> {
        &self.tokens[self.pos].0
    }

    fn peek_nth(&self, n: usize) -> &Token<'a> {
        let index = (self.pos + n).min(self.tokens.len() - 1);
        &self.tokens[index].0
    }

    fn offset(&self) -> usize {
        self.tokens[self.pos].1.start
    }

    fn advance(&mut self) -> Token<'a> {
        let token = self.tokens[self.pos].0.clone();
        if token != Token::Eof {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token<'a>) -> bool {
        if self.peek() == token {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token<'a>, expected: &str) -> Result<usize> {
        if self.peek() == token {
            let offset = self.offset();
            self.advance();
            Ok(offset)
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn expect_ident(&mut self, expected: &str) -> Result<String> {
        match self.peek() {
            Token::Ident(name) => {
                let name = name.to_string();
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected(expected)),
        }
    }

    fn expect_string(&mut self, expected: &str) -> Result<String> {
        match self.peek() {
            Token::String(value) => {
                let value = value.clone();
                self.advance();
                Ok(value)
            }
            _ => Err(self.unexpected(expected)),
        }
    }

    fn expect_newline(&mut self) -> Result<()> {
        if matches!(self.peek(), Token::Newline(_)) {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected("newline"))
        }
    }

    /// Go one level deeper. A failed parse is abandoned, so only the
    /// successful paths restore the depth.
    fn enter(&mut self) -> Result<()> {
        if self.depth >= MAX_NESTING {
            return Err(ParseError::MaxDepthExceeded {
                offset: self.offset(),
                max_depth: MAX_NESTING,
            });
        }
        self.depth += 1;
        Ok(())
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        ParseError::UnexpectedToken {
            offset: self.offset(),
            expected: expected.to_string(),
            found: self.peek().to_string(),
        }
    }

    fn starts_expression(&self) -> bool {
        matches!(
            self.peek(),
            Token::Ident(_)
                | Token::Int(_)
                | Token::Float(_)
                | Token::String(_)
                | Token::None
                | Token::True
                | Token::False
                | Token::LParen
                | Token::LBracket
                | Token::LBrace
                | Token::Minus
                | Token::Plus
                | Token::Not
                | Token::Lambda
        )
    }

    // Statements

    fn parse_module(mut self) -> Result<Module> {
        let mut body = Vec::new();
        while *self.peek() != Token::Eof {
            if matches!(self.peek(), Token::Newline(_)) {
                self.advance();
                continue;
            }
            body.extend(self.parse_statement()?);
        }
        Ok(Module { body })
    }

    fn parse_statement(&mut self) -> Result<Vec<Stmt>> {
        match self.peek() {
            Token::Def => Ok(vec![self.parse_def()?]),
            Token::If => Ok(vec![self.parse_if()?]),
            Token::For => Ok(vec![self.parse_for()?]),
            Token::Indent => Err(ParseError::syntax(self.offset(), "unexpected indent")),
            _ => self.parse_simple_statements(),
        }
    }

    fn parse_simple_statements(&mut self) -> Result<Vec<Stmt>> {
        let mut stmts = vec![self.parse_small_statement()?];
        while self.eat(&Token::Semicolon) {
            if matches!(self.peek(), Token::Newline(_)) {
                break;
            }
            stmts.push(self.parse_small_statement()?);
        }
        self.expect_newline()?;
        Ok(stmts)
    }

    fn at_statement_end(&self) -> bool {
        matches!(
            self.peek(),
            Token::Newline(_) | Token::Semicolon | Token::Eof
        )
    }

    fn parse_small_statement(&mut self) -> Result<Stmt> {
        let offset = self.offset();
        let kind = match self.peek() {
            Token::Return => {
                self.advance();
                if self.functions == 0 {
                    return Err(ParseError::syntax(offset, "return statement not within a function"));
                }
                if self.at_statement_end() {
                    StmtKind::Return(None)
                } else {
                    StmtKind::Return(Some(self.parse_expr_list()?))
                }
            }
            Token::Break | Token::Continue => {
                let token = self.advance();
                if self.loops == 0 {
                    return Err(ParseError::syntax(offset, format!("{} not in a loop", token)));
                }
                if token == Token::Break {
                    StmtKind::Break
                } else {
                    StmtKind::Continue
                }
            }
            Token::Pass => {
                self.advance();
                StmtKind::Pass
            }
            Token::Load => self.parse_load()?,
            _ => self.parse_expr_statement()?,
        };
        Ok(Stmt { kind, offset })
    }

    fn parse_load(&mut self) -> Result<StmtKind> {
        let offset = self.offset();
        self.advance();
        if self.blocks > 0 {
            return Err(ParseError::syntax(offset, "load statement not at top level"));
        }
        self.expect(&Token::LParen, "(")?;
        let module = self.expect_string("module name")?;

        let mut symbols = Vec::new();
        while self.eat(&Token::Comma) {
            match self.peek().clone() {
                Token::RParen => break,
                Token::String(name) => {
                    self.advance();
                    symbols.push((name.clone(), name));
                }
                Token::Ident(local) => {
                    self.advance();
                    self.expect(&Token::Assign, "=")?;
                    let name = self.expect_string("symbol name")?;
                    symbols.push((local.to_string(), name));
                }
                _ => return Err(self.unexpected("symbol name")),
            }
        }
        self.expect(&Token::RParen, ")")?;

        if symbols.is_empty() {
            return Err(ParseError::syntax(offset, "load statement must import at least 1 symbol"));
        }
        Ok(StmtKind::Load { module, symbols })
    }

    fn parse_expr_statement(&mut self) -> Result<StmtKind> {
        let expr = self.parse_expr_list()?;
        let op = match self.peek() {
            Token::Assign => {
                self.advance();
                check_target(&expr)?;
                let value = self.parse_expr_list()?;
                return Ok(StmtKind::Assign {
                    target: expr,
                    value,
                });
            }
            Token::PlusAssign => BinOp::Add,
            Token::MinusAssign => BinOp::Sub,
            Token::StarAssign => BinOp::Mul,
            Token::SlashAssign => BinOp::Div,
            Token::SlashSlashAssign => BinOp::FloorDiv,
            Token::PercentAssign => BinOp::Mod,
            _ => return Ok(StmtKind::Expr(expr)),
        };
        self.advance();
        if !matches!(expr.kind, ExprKind::Ident(_) | ExprKind::Index { .. }) {
            return Err(ParseError::syntax(expr.offset, "invalid augmented assignment target"));
        }
        let value = self.parse_expr_list()?;
        Ok(StmtKind::AugAssign {
            target: expr,
            op,
            value,
        })
    }

    fn parse_def(&mut self) -> Result<Stmt> {
        let offset = self.offset();
        self.advance();
        let name = self.expect_ident("function name")?;
        self.expect(&Token::LParen, "(")?;
        let params = self.parse_params(&Token::RParen)?;
        self.expect(&Token::RParen, ")")?;
        self.expect(&Token::Colon, ":")?;

        self.functions += 1;
        let loops = std::mem::replace(&mut self.loops, 0);
        let body = self.parse_suite();
        self.loops = loops;
        self.functions -= 1;

        let def = FunctionDef {
            name,
            params,
            body: body?,
            offset,
        };
        Ok(Stmt {
            kind: StmtKind::Def(Arc::new(def)),
            offset,
        })
    }

    fn parse_params(&mut self, end: &Token<'a>) -> Result<Vec<Param>> {
        let mut params: Vec<Param> = Vec::new();
        let mut seen_optional = false;
        let mut seen_args = false;

        while self.peek() != end {
            let offset = self.offset();
            if matches!(params.last(), Some(Param::Kwargs(_))) {
                return Err(ParseError::syntax(offset, "parameter after **kwargs"));
            }
            let param = match self.peek() {
                Token::StarStar => {
                    self.advance();
                    Param::Kwargs(self.expect_ident("parameter name")?)
                }
                Token::Star => {
                    self.advance();
                    if seen_args {
                        return Err(ParseError::syntax(offset, "multiple *args parameters"));
                    }
                    seen_args = true;
                    Param::Args(self.expect_ident("parameter name")?)
                }
                Token::Ident(_) => {
                    let name = self.expect_ident("parameter name")?;
                    if self.eat(&Token::Assign) {
                        seen_optional = true;
                        Param::Optional(name, self.parse_test()?)
                    } else if seen_optional && !seen_args {
                        return Err(ParseError::syntax(
                            offset,
                            "required parameter may not follow optional",
                        ));
                    } else {
                        Param::Required(name)
                    }
                }
                _ => return Err(self.unexpected("parameter")),
            };
            if params.iter().any(|p| p.name() == param.name()) {
                return Err(ParseError::syntax(
                    offset,
                    format!("duplicate parameter {}", param.name()),
                ));
            }
            params.push(param);
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        Ok(params)
    }

    fn parse_suite(&mut self) -> Result<Vec<Stmt>> {
        self.enter()?;
        self.blocks += 1;
        let body = self.parse_block()?;
        self.blocks -= 1;
        self.depth -= 1;
        Ok(body)
    }

    fn parse_block(&mut self) -> Result<Vec<Stmt>> {
        if !matches!(self.peek(), Token::Newline(_)) {
            return self.parse_simple_statements();
        }
        self.advance();
        self.expect(&Token::Indent, "indented block")?;
        let mut body = Vec::new();
        while !matches!(self.peek(), Token::Dedent | Token::Eof) {
            body.extend(self.parse_statement()?);
        }
        self.eat(&Token::Dedent);
        Ok(body)
    }

    fn parse_if(&mut self) -> Result<Stmt> {
        let offset = self.offset();
        // `if` or `elif`
        self.advance();
        let cond = self.parse_test()?;
        self.expect(&Token::Colon, ":")?;
        let then = self.parse_suite()?;
        let otherwise = match self.peek() {
            Token::Elif => {
                self.enter()?;
                let elif = self.parse_if()?;
                self.depth -= 1;
                vec![elif]
            }
            Token::Else => {
                self.advance();
                self.expect(&Token::Colon, ":")?;
                self.parse_suite()?
            }
            _ => Vec::new(),
        };
        Ok(Stmt {
            kind: StmtKind::If {
                cond,
                then,
                otherwise,
            },
            offset,
        })
    }

    fn parse_for(&mut self) -> Result<Stmt> {
        let offset = self.offset();
        self.advance();
        let target = self.parse_target_list()?;
        self.expect(&Token::In, "in")?;
        let iter = self.parse_expr_list()?;
        self.expect(&Token::Colon, ":")?;

        self.loops += 1;
        let body = self.parse_suite();
        self.loops -= 1;

        Ok(Stmt {
            kind: StmtKind::For {
                target,
                iter,
                body: body?,
            },
            offset,
        })
    }

    fn parse_target_list(&mut self) -> Result<Expr> {
        let offset = self.offset();
        let first = self.parse_postfix()?;
        if *self.peek() != Token::Comma {
            check_target(&first)?;
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat(&Token::Comma) {
            if *self.peek() == Token::In {
                break;
            }
            items.push(self.parse_postfix()?);
        }
        let target = Expr::new(ExprKind::Tuple(items), offset);
        check_target(&target)?;
        Ok(target)
    }

    // Expressions

    /// A comma-separated list of expressions; more than one makes a tuple
    fn parse_expr_list(&mut self) -> Result<Expr> {
        let offset = self.offset();
        let first = self.parse_test()?;
        if *self.peek() != Token::Comma {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat(&Token::Comma) {
            if !self.starts_expression() {
                break;
            }
            items.push(self.parse_test()?);
        }
        Ok(Expr::new(ExprKind::Tuple(items), offset))
    }

    fn parse_test(&mut self) -> Result<Expr> {
        self.enter()?;
        let expr = self.parse_conditional()?;
        self.depth -= 1;
        Ok(expr)
    }

    fn parse_conditional(&mut self) -> Result<Expr> {
        if *self.peek() == Token::Lambda {
            return self.parse_lambda();
        }
        let offset = self.offset();
        let expr = self.parse_or()?;
        if *self.peek() != Token::If {
            return Ok(expr);
        }
        self.advance();
        let cond = self.parse_or()?;
        self.expect(&Token::Else, "else")?;
        let otherwise = self.parse_test()?;
        Ok(Expr::new(
            ExprKind::Conditional {
                cond: Box::new(cond),
                then: Box::new(expr),
                otherwise: Box::new(otherwise),
            },
            offset,
        ))
    }

    fn parse_lambda(&mut self) -> Result<Expr> {
        let offset = self.offset();
        self.advance();
        let params = self.parse_params(&Token::Colon)?;
        self.expect(&Token::Colon, ":")?;

        self.functions += 1;
        let body = self.parse_test();
        self.functions -= 1;
        let body = body?;

        let def = FunctionDef {
            name: "lambda".to_string(),
            params,
            body: vec![Stmt {
                offset: body.offset,
                kind: StmtKind::Return(Some(body)),
            }],
            offset,
        };
        Ok(Expr::new(ExprKind::Lambda(Arc::new(def)), offset))
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let base = self.depth;
        let mut left = self.parse_and()?;
        while *self.peek() == Token::Or {
            self.enter()?;
            let offset = self.offset();
            self.advance();
            let right = self.parse_and()?;
            left = Expr::new(ExprKind::Or(Box::new(left), Box::new(right)), offset);
        }
        self.depth = base;
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let base = self.depth;
        let mut left = self.parse_not()?;
        while *self.peek() == Token::And {
            self.enter()?;
            let offset = self.offset();
            self.advance();
            let right = self.parse_not()?;
            left = Expr::new(ExprKind::And(Box::new(left), Box::new(right)), offset);
        }
        self.depth = base;
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr> {
        if *self.peek() != Token::Not {
            return self.parse_comparison();
        }
        let offset = self.offset();
        self.advance();
        self.enter()?;
        let operand = self.parse_not()?;
        self.depth -= 1;
        Ok(Expr::new(
            ExprKind::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            },
            offset,
        ))
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let left = self.parse_arith()?;
        let offset = self.offset();
        let op = match self.peek() {
            Token::Eq => BinOp::Eq,
            Token::NotEq => BinOp::NotEq,
            Token::Lt => BinOp::Lt,
            Token::Le => BinOp::Le,
            Token::Gt => BinOp::Gt,
            Token::Ge => BinOp::Ge,
            Token::In => BinOp::In,
            Token::Not if *self.peek_nth(1) == Token::In => {
                self.advance();
                BinOp::NotIn
            }
            _ => return Ok(left),
        };
        self.advance();
        let right = self.parse_arith()?;
        Ok(binary(op, left, right, offset))
    }

    fn parse_arith(&mut self) -> Result<Expr> {
        let base = self.depth;
        let mut left = self.parse_term()?;
        loop {
            let offset = self.offset();
            let op = match self.peek() {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => {
                    self.depth = base;
                    return Ok(left);
                }
            };
            self.enter()?;
            self.advance();
            let right = self.parse_term()?;
            left = binary(op, left, right, offset);
        }
    }

    fn parse_term(&mut self) -> Result<Expr> {
        let base = self.depth;
        let mut left = self.parse_unary()?;
        loop {
            let offset = self.offset();
            let op = match self.peek() {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                Token::SlashSlash => BinOp::FloorDiv,
                Token::Percent => BinOp::Mod,
                _ => {
                    self.depth = base;
                    return Ok(left);
                }
            };
            self.enter()?;
            self.advance();
            let right = self.parse_unary()?;
            left = binary(op, left, right, offset);
        }
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        let offset = self.offset();
        let op = match self.peek() {
            Token::Minus => UnaryOp::Neg,
            Token::Plus => UnaryOp::Pos,
            _ => return self.parse_postfix(),
        };
        self.advance();
        self.enter()?;
        let operand = self.parse_unary()?;
        self.depth -= 1;
        Ok(Expr::new(
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            offset,
        ))
    }

    fn parse_postfix(&mut self) -> Result<Expr> {
        let base = self.depth;
        let mut expr = self.parse_primary()?;
        loop {
            let offset = self.offset();
            if matches!(self.peek(), Token::Dot | Token::LParen | Token::LBracket) {
                self.enter()?;
            }
            expr = match self.peek() {
                Token::Dot => {
                    self.advance();
                    let name = self.expect_ident("field name")?;
                    Expr::new(
                        ExprKind::Attr {
                            target: Box::new(expr),
                            name,
                        },
                        offset,
                    )
                }
                Token::LParen => {
                    self.advance();
                    let args = self.parse_call_args()?;
                    self.expect(&Token::RParen, ")")?;
                    Expr::new(
                        ExprKind::Call {
                            func: Box::new(expr),
                            args,
                        },
                        offset,
                    )
                }
                Token::LBracket => {
                    self.advance();
                    self.parse_subscript(expr, offset)?
                }
                _ => {
                    self.depth = base;
                    return Ok(expr);
                }
            };
        }
    }

    fn parse_subscript(&mut self, target: Expr, offset: usize) -> Result<Expr> {
        let start = if *self.peek() == Token::Colon {
            None
        } else {
            Some(Box::new(self.parse_test()?))
        };

        if self.eat(&Token::RBracket) {
            return match start {
                Some(index) => Ok(Expr::new(
                    ExprKind::Index {
                        target: Box::new(target),
                        index,
                    },
                    offset,
                )),
                None => Err(ParseError::syntax(offset, "empty index")),
            };
        }

        self.expect(&Token::Colon, "':' or ']'")?;
        let stop = if matches!(self.peek(), Token::Colon | Token::RBracket) {
            None
        } else {
            Some(Box::new(self.parse_test()?))
        };
        let step = if self.eat(&Token::Colon) && *self.peek() != Token::RBracket {
            Some(Box::new(self.parse_test()?))
        } else {
            None
        };
        self.expect(&Token::RBracket, "]")?;

        Ok(Expr::new(
            ExprKind::Slice {
                target: Box::new(target),
                start,
                stop,
                step,
            },
            offset,
        ))
    }

    fn parse_call_args(&mut self) -> Result<Vec<Arg>> {
        let mut args = Vec::new();
        while *self.peek() != Token::RParen {
            let arg = match self.peek() {
                Token::Star => {
                    self.advance();
                    Arg::Star(self.parse_test()?)
                }
                Token::StarStar => {
                    self.advance();
                    Arg::StarStar(self.parse_test()?)
                }
                Token::Ident(name) if *self.peek_nth(1) == Token::Assign => {
                    let name = name.to_string();
                    self.advance();
                    self.advance();
                    Arg::Named(name, self.parse_test()?)
                }
                _ => Arg::Positional(self.parse_test()?),
            };
            args.push(arg);
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let offset = self.offset();
        let kind = match self.advance() {
            Token::None => ExprKind::None,
            Token::True => ExprKind::Bool(true),
            Token::False => ExprKind::Bool(false),
            Token::Int(n) => ExprKind::Int(n),
            Token::Float(n) => ExprKind::Float(n),
            Token::String(mut value) => {
                // Adjacent literals are concatenated.
                while let Token::String(next) = self.peek() {
                    value.push_str(next);
                    self.advance();
                }
                ExprKind::String(value.into())
            }
            Token::Ident(name) => ExprKind::Ident(name.to_string()),
            Token::LParen => return self.parse_parenthesized(offset),
            Token::LBracket => self.parse_list()?,
            Token::LBrace => self.parse_dict()?,
            other => {
                return Err(ParseError::UnexpectedToken {
                    offset,
                    expected: "expression".to_string(),
                    found: other.to_string(),
                })
            }
        };
        Ok(Expr::new(kind, offset))
    }

    fn parse_parenthesized(&mut self, offset: usize) -> Result<Expr> {
        if self.eat(&Token::RParen) {
            return Ok(Expr::new(ExprKind::Tuple(Vec::new()), offset));
        }
        let first = self.parse_test()?;
        if self.eat(&Token::RParen) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat(&Token::Comma) {
            if *self.peek() == Token::RParen {
                break;
            }
            items.push(self.parse_test()?);
        }
        self.expect(&Token::RParen, ")")?;
        Ok(Expr::new(ExprKind::Tuple(items), offset))
    }

    fn parse_list(&mut self) -> Result<ExprKind> {
        if self.eat(&Token::RBracket) {
            return Ok(ExprKind::List(Vec::new()));
        }
        let first = self.parse_test()?;
        if *self.peek() == Token::For {
            let clauses = self.parse_clauses()?;
            self.expect(&Token::RBracket, "]")?;
            return Ok(ExprKind::ListComp {
                element: Box::new(first),
                clauses,
            });
        }
        let mut items = vec![first];
        while self.eat(&Token::Comma) {
            if *self.peek() == Token::RBracket {
                break;
            }
            items.push(self.parse_test()?);
        }
        self.expect(&Token::RBracket, "]")?;
        Ok(ExprKind::List(items))
    }

    fn parse_dict(&mut self) -> Result<ExprKind> {
        if self.eat(&Token::RBrace) {
            return Ok(ExprKind::Dict(Vec::new()));
        }
        let key = self.parse_test()?;
        self.expect(&Token::Colon, ":")?;
        let value = self.parse_test()?;
        if *self.peek() == Token::For {
            let clauses = self.parse_clauses()?;
            self.expect(&Token::RBrace, "}")?;
            return Ok(ExprKind::DictComp {
                key: Box::new(key),
                value: Box::new(value),
                clauses,
            });
        }
        let mut entries = vec![(key, value)];
        while self.eat(&Token::Comma) {
            if *self.peek() == Token::RBrace {
                break;
            }
            let key = self.parse_test()?;
            self.expect(&Token::Colon, ":")?;
            let value = self.parse_test()?;
            entries.push((key, value));
        }
        self.expect(&Token::RBrace, "}")?;
        Ok(ExprKind::Dict(entries))
    }

    fn parse_clauses(&mut self) -> Result<Vec<Clause>> {
        let mut clauses = Vec::new();
        loop {
            match self.peek() {
                Token::For => {
                    self.advance();
                    let target = self.parse_target_list()?;
                    self.expect(&Token::In, "in")?;
                    let iter = self.parse_or()?;
                    clauses.push(Clause::For { target, iter });
                }
                Token::If => {
                    self.advance();
                    clauses.push(Clause::If(self.parse_or()?));
                }
                _ => return Ok(clauses),
            }
        }
    }
}

fn binary(op: BinOp, left: Expr, right: Expr, offset: usize) -> Expr {
    Expr::new(
        ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
        offset,
    )
}

fn check_target(expr: &Expr) -> Result<()> {
    match &expr.kind {
        ExprKind::Ident(_) | ExprKind::Index { .. } => Ok(()),
        ExprKind::Tuple(items) | ExprKind::List(items) if !items.is_empty() => {
            items.iter().try_for_each(check_target)
        }
        _ => Err(ParseError::syntax(expr.offset, "invalid assignment target")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse_ok(source: &str) -> Vec<Stmt> {
        parse(source).unwrap().body
    }

    fn expr(source: &str) -> ExprKind {
        parse_expression(source).unwrap().kind
    }

    #[test]
    fn test_precedence() {
        let kind = expr("1 + 2 * 3");
        match kind {
            ExprKind::Binary {
                op: BinOp::Add,
                right,
                ..
            } => assert!(matches!(right.kind, ExprKind::Binary { op: BinOp::Mul, .. })),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_not_in_and_conditional() {
        assert!(matches!(
            expr("a not in b"),
            ExprKind::Binary {
                op: BinOp::NotIn,
                ..
            }
        ));
        assert!(matches!(expr("a if c else b"), ExprKind::Conditional { .. }));
        assert!(matches!(
            expr("not a == b"),
            ExprKind::Unary {
                op: UnaryOp::Not,
                ..
            }
        ));
    }

    #[test]
    fn test_collections() {
        assert!(matches!(expr("()"), ExprKind::Tuple(ref items) if items.is_empty()));
        assert!(matches!(expr("(1)"), ExprKind::Int(1)));
        assert!(matches!(expr("(1,)"), ExprKind::Tuple(ref items) if items.len() == 1));
        assert!(matches!(expr("[1, 2,]"), ExprKind::List(ref items) if items.len() == 2));
        assert!(matches!(expr("{'a': 1}"), ExprKind::Dict(ref e) if e.len() == 1));
        assert!(matches!(
            expr("[x * 2 for x in xs if x]"),
            ExprKind::ListComp { ref clauses, .. } if clauses.len() == 2
        ));
        assert!(matches!(
            expr("{k: v for k, v in d.items()}"),
            ExprKind::DictComp { .. }
        ));
    }

    #[test]
    fn test_slices_and_calls() {
        assert!(matches!(expr("x[1:]"), ExprKind::Slice { stop: None, .. }));
        assert!(matches!(expr("x[::2]"), ExprKind::Slice { start: None, step: Some(_), .. }));
        match expr("f(1, key = 2, *rest, **kw)") {
            ExprKind::Call { args, .. } => {
                assert_eq!(args.len(), 4);
                assert!(matches!(args[1], Arg::Named(ref name, _) if name == "key"));
                assert!(matches!(args[2], Arg::Star(_)));
                assert!(matches!(args[3], Arg::StarStar(_)));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_adjacent_strings() {
        assert!(matches!(expr("'a' \"b\""), ExprKind::String(ref s) if s.as_ref() == "ab"));
    }

    #[test]
    fn test_def_and_blocks() {
        let body = parse_ok(
            "def f(a, b = 1, *args, **kwargs):\n    if a:\n        return b\n    elif args:\n        pass\n    else:\n        for x in args:\n            continue\n    return None\n",
        );
        assert_eq!(body.len(), 1);
        match &body[0].kind {
            StmtKind::Def(def) => {
                assert_eq!(def.name, "f");
                assert_eq!(def.params.len(), 4);
                assert_eq!(def.body.len(), 2);
                match &def.body[0].kind {
                    StmtKind::If { otherwise, .. } => {
                        assert!(matches!(otherwise[0].kind, StmtKind::If { .. }))
                    }
                    other => panic!("unexpected: {:?}", other),
                }
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_one_line_suites_and_semicolons() {
        let body = parse_ok("if x: y = 1; z = 2\ndef f(): return 1\n");
        assert_eq!(body.len(), 2);
        match &body[0].kind {
            StmtKind::If { then, .. } => assert_eq!(then.len(), 2),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_load() {
        let body = parse_ok("load(\"lib.cfg\", \"a\", b = \"c\")\n");
        assert_eq!(
            body[0].kind,
            StmtKind::Load {
                module: "lib.cfg".to_string(),
                symbols: vec![
                    ("a".to_string(), "a".to_string()),
                    ("b".to_string(), "c".to_string()),
                ],
            }
        );
    }

    #[test]
    fn test_assignments() {
        let body = parse_ok("a, b = 1, 2\nx[0] += 1\n[c, d] = e\n");
        assert!(matches!(body[0].kind, StmtKind::Assign { .. }));
        assert!(matches!(body[1].kind, StmtKind::AugAssign { op: BinOp::Add, .. }));
        assert!(matches!(body[2].kind, StmtKind::Assign { .. }));
    }

    #[test]
    fn test_lambda() {
        match expr("lambda x, y = 2: x + y") {
            ExprKind::Lambda(def) => {
                assert_eq!(def.params.len(), 2);
                assert!(matches!(def.body[0].kind, StmtKind::Return(Some(_))));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_syntax_errors() {
        let cases = [
            "return 1\n",
            "break\n",
            "def f():\n    load('x', 'y')\n",
            "load('x')\n",
            "1 = x\n",
            "f(x) += 1\n",
            "def f(a = 1, b): pass\n",
            "def f(a, a): pass\n",
            "x = (1, 2\n",
            "  x = 1\n",
            "x = 1 2\n",
        ];
        for source in cases {
            assert!(parse(source).is_err(), "expected an error for {:?}", source);
        }
    }

    /// Parse on a thread with the stack of a process main thread
    fn parse_deep(source: String) -> Result<Module> {
        std::thread::Builder::new()
            .stack_size(8 << 20)
            .spawn(move || parse(&source))
            .unwrap()
            .join()
            .unwrap()
    }

    #[test]
    fn test_nesting_limit() {
        let nested = |depth: usize| format!("x = {}1{}\n", "(".repeat(depth), ")".repeat(depth));
        assert!(parse_deep(nested(MAX_NESTING / 2)).is_ok());

        let err = parse_deep(nested(20_000)).unwrap_err();
        assert!(matches!(
            err,
            ParseError::MaxDepthExceeded {
                max_depth: MAX_NESTING,
                ..
            }
        ));
        assert_eq!(err.to_string(), "nesting exceeds 200 levels");

        let unary = format!("x = {}1\n", "-".repeat(20_000));
        assert!(parse_deep(unary).is_err());
        let negations = format!("x = {}True\n", "not ".repeat(20_000));
        assert!(parse_deep(negations).is_err());

        let chain = format!("x = 1{}\n", " + 1".repeat(20_000));
        assert!(parse_deep(chain).is_err());
        let attrs = format!("x = a{}\n", ".b".repeat(20_000));
        assert!(parse_deep(attrs).is_err());

        let mut blocks = String::new();
        for level in 0..MAX_NESTING + 1 {
            blocks.push_str(&" ".repeat(level));
            blocks.push_str("if True:\n");
        }
        blocks.push_str(&" ".repeat(MAX_NESTING + 1));
        blocks.push_str("pass\n");
        assert!(parse_deep(blocks).is_err());

        let elifs = format!("if x:\n    pass\n{}", "elif x:\n    pass\n".repeat(20_000));
        assert!(parse_deep(elifs).is_err());

        assert!(parse_deep(format!("x = 1{}\n", " + 1".repeat(50))).is_ok());
    }

    #[test]
    fn test_error_offsets() {
        let err = parse("x = 1\ny = )\n").unwrap_err();
        assert_eq!(err.offset(), 10);
        assert!(err.to_string().contains("expected expression"));
    }
}

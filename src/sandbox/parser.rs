use std::rc::Rc;

use crate::error::EvalError;

use super::ast::{
    ArrayItem, AssignOp, BinaryOp, DeclKind, Expr, FunctionBody, FunctionDef, LogicalOp,
    MemberProp, ObjectProp, Param, Pattern, PatternItem, PatternProp, PropKey, Stmt,
    TemplatePart, UnaryOp,
};
use super::lexer::{Lexer, LexerState, Spanned, TemplateChunk, Token};

/// Nesting allowed when the caller does not pass its own limit.
pub const DEFAULT_MAX_NESTING: usize = 128;

const UNSUPPORTED_KEYWORDS: [&str; 11] = [
    "class", "new", "async", "await", "yield", "import", "export", "try", "throw", "switch",
    "delete",
];

/// Recursive-descent parser for the sandboxed JavaScript/JSX subset.
///
/// JSX is lowered while parsing: `<Tag a={1}>x</Tag>` becomes
/// `Runtime.createElement(Tag, { a: 1 }, "x")`, so the interpreter only ever
/// sees plain calls against the injected runtime binding.
pub struct Parser {
    lexer: Lexer,
    peeked: Option<Spanned>,
    runtime: String,
    depth: usize,
    max_depth: usize,
}

type Checkpoint = (LexerState, Option<Spanned>);

impl Parser {
    #[must_use]
    pub fn new(source: &str, runtime: &str) -> Self {
        Self::from_lexer(Lexer::new(source), runtime)
    }

    fn from_lexer(lexer: Lexer, runtime: &str) -> Self {
        Self {
            lexer,
            peeked: None,
            runtime: runtime.to_owned(),
            depth: 0,
            max_depth: DEFAULT_MAX_NESTING,
        }
    }

    /// Bounds how deeply statements, expressions, patterns and JSX may nest.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn parse_program(mut self) -> Result<Vec<Stmt>, EvalError> {
        let mut body = Vec::new();
        while !self.at_eof()? {
            body.push(self.statement()?);
        }
        Ok(body)
    }

    /// Parses a standalone expression, used for template interpolations.
    fn parse_standalone_expression(mut self) -> Result<Expr, EvalError> {
        let expr = self.expression()?;
        if !self.at_eof()? {
            let next = self.next()?;
            return Err(error_at(&next, "unexpected token after expression"));
        }
        Ok(expr)
    }

    // ---------------------------------------------------------------------
    // Token plumbing
    // ---------------------------------------------------------------------

    fn peek(&mut self) -> Result<&Spanned, EvalError> {
        if self.peeked.is_none() {
            self.peeked = Some(self.lexer.next_token()?);
        }
        self.peeked
            .as_ref()
            .ok_or_else(|| self.lexer.error("unexpected end of input"))
    }

    fn next(&mut self) -> Result<Spanned, EvalError> {
        match self.peeked.take() {
            Some(spanned) => Ok(spanned),
            None => self.lexer.next_token(),
        }
    }

    fn checkpoint(&self) -> Checkpoint {
        (self.lexer.state(), self.peeked.clone())
    }

    fn restore(&mut self, checkpoint: Checkpoint) {
        self.lexer.restore(checkpoint.0);
        self.peeked = checkpoint.1;
    }

    fn at_eof(&mut self) -> Result<bool, EvalError> {
        Ok(self.peek()?.token == Token::Eof)
    }

    fn is_punct(&mut self, punct: &str) -> Result<bool, EvalError> {
        Ok(matches!(&self.peek()?.token, Token::Punct(p) if *p == punct))
    }

    fn is_keyword(&mut self, keyword: &str) -> Result<bool, EvalError> {
        Ok(matches!(&self.peek()?.token, Token::Ident(name) if name == keyword))
    }

    fn eat_punct(&mut self, punct: &str) -> Result<bool, EvalError> {
        if self.is_punct(punct)? {
            self.next()?;
            return Ok(true);
        }
        Ok(false)
    }

    fn eat_keyword(&mut self, keyword: &str) -> Result<bool, EvalError> {
        if self.is_keyword(keyword)? {
            self.next()?;
            return Ok(true);
        }
        Ok(false)
    }

    fn expect_punct(&mut self, punct: &str) -> Result<(), EvalError> {
        let next = self.next()?;
        match &next.token {
            Token::Punct(p) if *p == punct => Ok(()),
            other => Err(error_at(
                &next,
                format!("expected `{punct}` but found {}", describe(other)),
            )),
        }
    }

    fn expect_ident(&mut self) -> Result<String, EvalError> {
        let next = self.next()?;
        match next.token {
            Token::Ident(name) => Ok(name),
            ref other => Err(error_at(
                &next,
                format!("expected identifier but found {}", describe(other)),
            )),
        }
    }

    fn consume_semicolon(&mut self) -> Result<(), EvalError> {
        self.eat_punct(";")?;
        Ok(())
    }

    /// The lexer must not hold a lookahead token while JSX is scanned raw.
    fn ensure_raw_mode(&self) -> Result<(), EvalError> {
        if self.peeked.is_some() {
            return Err(self.lexer.error("internal: JSX scanned with pending lookahead"));
        }
        Ok(())
    }

    fn too_deep(&self) -> EvalError {
        self.lexer
            .error(format!("source nests deeper than {} levels", self.max_depth))
    }

    /// Runs `parse` one nesting level down.
    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, EvalError>,
    ) -> Result<T, EvalError> {
        if self.depth >= self.max_depth {
            return Err(self.too_deep());
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    /// Each link of a left-associative chain (`a + b + c`, `a.b.c`) deepens
    /// the tree by one level.
    fn chain_link(&self, links: &mut usize) -> Result<(), EvalError> {
        *links += 1;
        if self.depth + *links > self.max_depth {
            return Err(self.too_deep());
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Statements
    // ---------------------------------------------------------------------

    fn statement(&mut self) -> Result<Stmt, EvalError> {
        self.nested(Self::statement_inner)
    }

    fn statement_inner(&mut self) -> Result<Stmt, EvalError> {
        let token = self.peek()?.clone();
        match &token.token {
            Token::Punct("{") => {
                self.next()?;
                Ok(Stmt::Block(self.block_body()?))
            }
            Token::Punct(";") => {
                self.next()?;
                Ok(Stmt::Empty)
            }
            Token::Ident(word) => match word.as_str() {
                "var" | "let" | "const" => {
                    let stmt = self.declaration()?;
                    self.consume_semicolon()?;
                    Ok(stmt)
                }
                "function" => {
                    self.next()?;
                    let def = self.function_rest(true)?;
                    Ok(Stmt::Function(Rc::new(def)))
                }
                "return" => {
                    self.next()?;
                    let next = self.peek()?;
                    let ends = next.newline_before
                        || matches!(next.token, Token::Eof | Token::Punct(";") | Token::Punct("}"));
                    let value = if ends { None } else { Some(self.expression()?) };
                    self.consume_semicolon()?;
                    Ok(Stmt::Return(value))
                }
                "if" => self.if_statement(),
                "for" => self.for_statement(),
                "while" => {
                    self.next()?;
                    self.expect_punct("(")?;
                    let test = self.expression()?;
                    self.expect_punct(")")?;
                    let body = Box::new(self.statement()?);
                    Ok(Stmt::While { test, body })
                }
                "break" => {
                    self.next()?;
                    self.consume_semicolon()?;
                    Ok(Stmt::Break)
                }
                "continue" => {
                    self.next()?;
                    self.consume_semicolon()?;
                    Ok(Stmt::Continue)
                }
                keyword if UNSUPPORTED_KEYWORDS.contains(&keyword) => Err(error_at(
                    &token,
                    format!("`{keyword}` is not supported in chart components"),
                )),
                _ => self.expression_statement(),
            },
            _ => self.expression_statement(),
        }
    }

    fn expression_statement(&mut self) -> Result<Stmt, EvalError> {
        let expr = self.expression()?;
        let next = self.peek()?;
        let terminated = next.newline_before
            || matches!(next.token, Token::Eof | Token::Punct(";") | Token::Punct("}"));
        if !terminated {
            let next = next.clone();
            return Err(error_at(
                &next,
                format!("unexpected {} after expression", describe(&next.token)),
            ));
        }
        self.consume_semicolon()?;
        Ok(Stmt::Expr(expr))
    }

    fn block_body(&mut self) -> Result<Vec<Stmt>, EvalError> {
        let mut body = Vec::new();
        loop {
            if self.eat_punct("}")? {
                return Ok(body);
            }
            if self.at_eof()? {
                return Err(self.lexer.error("unterminated block, expected `}`"));
            }
            body.push(self.statement()?);
        }
    }

    fn decl_kind(&mut self) -> Result<DeclKind, EvalError> {
        let word = self.expect_ident()?;
        Ok(match word.as_str() {
            "var" => DeclKind::Var,
            "let" => DeclKind::Let,
            _ => DeclKind::Const,
        })
    }

    fn declaration(&mut self) -> Result<Stmt, EvalError> {
        let kind = self.decl_kind()?;
        let mut decls = Vec::new();
        loop {
            let pattern = self.binding_pattern()?;
            let init = if self.eat_punct("=")? {
                Some(self.assignment()?)
            } else {
                None
            };
            if init.is_none() && kind == DeclKind::Const {
                return Err(self.lexer.error("missing initializer in const declaration"));
            }
            decls.push((pattern, init));
            if !self.eat_punct(",")? {
                break;
            }
        }
        Ok(Stmt::Decl { kind, decls })
    }

    fn if_statement(&mut self) -> Result<Stmt, EvalError> {
        self.next()?;
        self.expect_punct("(")?;
        let test = self.expression()?;
        self.expect_punct(")")?;
        let consequent = Box::new(self.statement()?);
        let alternate = if self.eat_keyword("else")? {
            Some(Box::new(self.statement()?))
        } else {
            None
        };
        Ok(Stmt::If {
            test,
            consequent,
            alternate,
        })
    }

    fn for_statement(&mut self) -> Result<Stmt, EvalError> {
        self.next()?;
        self.expect_punct("(")?;

        if self.is_keyword("var")? || self.is_keyword("let")? || self.is_keyword("const")? {
            let checkpoint = self.checkpoint();
            let kind = self.decl_kind()?;
            let pattern = self.binding_pattern()?;
            if self.eat_keyword("of")? {
                let iterable = self.assignment()?;
                self.expect_punct(")")?;
                let body = Box::new(self.statement()?);
                return Ok(Stmt::ForOf {
                    kind,
                    pattern,
                    iterable,
                    body,
                });
            }
            if self.is_keyword("in")? {
                return Err(self.lexer.error("`for...in` is not supported, use `for...of`"));
            }
            self.restore(checkpoint);
        }

        let init = if self.eat_punct(";")? {
            None
        } else {
            let init = if self.is_keyword("var")? || self.is_keyword("let")? || self.is_keyword("const")?
            {
                self.declaration()?
            } else {
                Stmt::Expr(self.expression()?)
            };
            self.expect_punct(";")?;
            Some(Box::new(init))
        };
        let test = if self.is_punct(";")? {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect_punct(";")?;
        let update = if self.is_punct(")")? {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect_punct(")")?;
        let body = Box::new(self.statement()?);
        Ok(Stmt::For {
            init,
            test,
            update,
            body,
        })
    }

    // ---------------------------------------------------------------------
    // Patterns and functions
    // ---------------------------------------------------------------------

    fn binding_pattern(&mut self) -> Result<Pattern, EvalError> {
        self.nested(Self::binding_pattern_inner)
    }

    fn binding_pattern_inner(&mut self) -> Result<Pattern, EvalError> {
        if self.eat_punct("{")? {
            let mut props = Vec::new();
            let mut rest = None;
            loop {
                if self.eat_punct("}")? {
                    break;
                }
                if self.eat_punct("...")? {
                    rest = Some(self.expect_ident()?);
                    self.eat_punct(",")?;
                    continue;
                }
                let key = self.property_name()?;
                let value = if self.eat_punct(":")? {
                    self.binding_pattern()?
                } else {
                    Pattern::Ident(key.clone())
                };
                let default = if self.eat_punct("=")? {
                    Some(self.assignment()?)
                } else {
                    None
                };
                props.push(PatternProp {
                    key,
                    value,
                    default,
                });
                if !self.eat_punct(",")? {
                    self.expect_punct("}")?;
                    break;
                }
            }
            return Ok(Pattern::Object { props, rest });
        }

        if self.eat_punct("[")? {
            let mut items = Vec::new();
            let mut rest = None;
            loop {
                if self.eat_punct("]")? {
                    break;
                }
                if self.eat_punct(",")? {
                    items.push(None);
                    continue;
                }
                if self.eat_punct("...")? {
                    rest = Some(self.expect_ident()?);
                    self.expect_punct("]")?;
                    break;
                }
                let value = self.binding_pattern()?;
                let default = if self.eat_punct("=")? {
                    Some(self.assignment()?)
                } else {
                    None
                };
                items.push(Some(PatternItem { value, default }));
                if !self.eat_punct(",")? {
                    self.expect_punct("]")?;
                    break;
                }
            }
            return Ok(Pattern::Array { items, rest });
        }

        Ok(Pattern::Ident(self.expect_ident()?))
    }

    fn params(&mut self) -> Result<Vec<Param>, EvalError> {
        self.expect_punct("(")?;
        let mut params = Vec::new();
        loop {
            if self.eat_punct(")")? {
                return Ok(params);
            }
            let rest = self.eat_punct("...")?;
            let pattern = self.binding_pattern()?;
            let default = if self.eat_punct("=")? {
                Some(self.assignment()?)
            } else {
                None
            };
            params.push(Param {
                pattern,
                default,
                rest,
            });
            if !self.eat_punct(",")? {
                self.expect_punct(")")?;
                return Ok(params);
            }
        }
    }

    /// Parses what follows the `function` keyword.
    fn function_rest(&mut self, require_name: bool) -> Result<FunctionDef, EvalError> {
        let name = if matches!(self.peek()?.token, Token::Ident(_)) {
            Some(self.expect_ident()?)
        } else if require_name {
            return Err(self.lexer.error("function declarations need a name"));
        } else {
            None
        };
        let params = self.params()?;
        self.expect_punct("{")?;
        let body = FunctionBody::Block(self.block_body()?);
        Ok(FunctionDef { name, params, body })
    }

    fn arrow_body(&mut self, params: Vec<Param>) -> Result<Expr, EvalError> {
        self.expect_punct("=>")?;
        let body = if self.eat_punct("{")? {
            FunctionBody::Block(self.block_body()?)
        } else {
            FunctionBody::Expr(self.assignment()?)
        };
        Ok(Expr::Function(Rc::new(FunctionDef {
            name: None,
            params,
            body,
        })))
    }

    /// Looks past a parenthesized group to see whether `=>` follows.
    fn is_arrow_ahead(&mut self) -> Result<bool, EvalError> {
        let checkpoint = self.checkpoint();
        let result = self.scan_arrow_params();
        self.restore(checkpoint);
        Ok(result.unwrap_or(false))
    }

    fn scan_arrow_params(&mut self) -> Result<bool, EvalError> {
        self.expect_punct("(")?;
        let mut depth = 1usize;
        while depth > 0 {
            match self.next()?.token {
                Token::Punct("(" | "[" | "{") => depth += 1,
                Token::Punct(")" | "]" | "}") => depth -= 1,
                Token::Punct("<") | Token::Eof => return Ok(false),
                _ => {}
            }
        }
        self.is_punct("=>")
    }

    // ---------------------------------------------------------------------
    // Expressions
    // ---------------------------------------------------------------------

    fn expression(&mut self) -> Result<Expr, EvalError> {
        let first = self.assignment()?;
        if !self.is_punct(",")? {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_punct(",")? {
            items.push(self.assignment()?);
        }
        Ok(Expr::Sequence(items))
    }

    fn assignment(&mut self) -> Result<Expr, EvalError> {
        self.nested(Self::assignment_inner)
    }

    fn assignment_inner(&mut self) -> Result<Expr, EvalError> {
        let token = self.peek()?.clone();
        if let Token::Ident(name) = &token.token {
            if name == "async" {
                return Err(error_at(&token, "`async` functions are not supported"));
            }
            if !is_reserved(name) {
                let checkpoint = self.checkpoint();
                self.next()?;
                if self.is_punct("=>")? {
                    let params = vec![Param {
                        pattern: Pattern::Ident(name.clone()),
                        default: None,
                        rest: false,
                    }];
                    return self.arrow_body(params);
                }
                self.restore(checkpoint);
            }
        }
        if token.token == Token::Punct("(") && self.is_arrow_ahead()? {
            let params = self.params()?;
            return self.arrow_body(params);
        }

        let target = self.conditional()?;
        let op = match &self.peek()?.token {
            Token::Punct("=") => AssignOp::Assign,
            Token::Punct("+=") => AssignOp::Arith(BinaryOp::Add),
            Token::Punct("-=") => AssignOp::Arith(BinaryOp::Sub),
            Token::Punct("*=") => AssignOp::Arith(BinaryOp::Mul),
            Token::Punct("/=") => AssignOp::Arith(BinaryOp::Div),
            Token::Punct("%=") => AssignOp::Arith(BinaryOp::Rem),
            Token::Punct("**=") => AssignOp::Arith(BinaryOp::Pow),
            Token::Punct("&&=") => AssignOp::Logical(LogicalOp::And),
            Token::Punct("||=") => AssignOp::Logical(LogicalOp::Or),
            Token::Punct("??=") => AssignOp::Logical(LogicalOp::Nullish),
            _ => return Ok(target),
        };
        let op_token = self.next()?;
        if !matches!(target, Expr::Ident(_) | Expr::Member { .. }) {
            return Err(error_at(&op_token, "invalid assignment target"));
        }
        let value = self.assignment()?;
        Ok(Expr::Assign {
            op,
            target: Box::new(target),
            value: Box::new(value),
        })
    }

    fn conditional(&mut self) -> Result<Expr, EvalError> {
        let test = self.logical_or()?;
        if !self.eat_punct("?")? {
            return Ok(test);
        }
        let consequent = self.assignment()?;
        self.expect_punct(":")?;
        let alternate = self.assignment()?;
        Ok(Expr::Conditional {
            test: Box::new(test),
            consequent: Box::new(consequent),
            alternate: Box::new(alternate),
        })
    }

    fn logical_or(&mut self) -> Result<Expr, EvalError> {
        let mut left = self.logical_and()?;
        let mut links = 0;
        loop {
            let op = if self.eat_punct("||")? {
                LogicalOp::Or
            } else if self.eat_punct("??")? {
                LogicalOp::Nullish
            } else {
                return Ok(left);
            };
            self.chain_link(&mut links)?;
            let right = self.logical_and()?;
            left = Expr::Logical {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn logical_and(&mut self) -> Result<Expr, EvalError> {
        let mut left = self.equality()?;
        let mut links = 0;
        while self.eat_punct("&&")? {
            self.chain_link(&mut links)?;
            let right = self.equality()?;
            left = Expr::Logical {
                op: LogicalOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn binary_level(
        &mut self,
        ops: &[(&str, BinaryOp)],
        next: fn(&mut Self) -> Result<Expr, EvalError>,
    ) -> Result<Expr, EvalError> {
        let mut left = next(self)?;
        let mut links = 0;
        'outer: loop {
            for (punct, op) in ops {
                if self.eat_punct(punct)? {
                    self.chain_link(&mut links)?;
                    let right = next(self)?;
                    left = Expr::Binary {
                        op: *op,
                        left: Box::new(left),
                        right: Box::new(right),
                    };
                    continue 'outer;
                }
            }
            return Ok(left);
        }
    }

    fn equality(&mut self) -> Result<Expr, EvalError> {
        self.binary_level(
            &[
                ("===", BinaryOp::StrictEq),
                ("!==", BinaryOp::StrictNotEq),
                ("==", BinaryOp::Eq),
                ("!=", BinaryOp::NotEq),
            ],
            Self::relational,
        )
    }

    fn relational(&mut self) -> Result<Expr, EvalError> {
        self.binary_level(
            &[
                ("<=", BinaryOp::LtEq),
                (">=", BinaryOp::GtEq),
                ("<", BinaryOp::Lt),
                (">", BinaryOp::Gt),
            ],
            Self::additive,
        )
    }

    fn additive(&mut self) -> Result<Expr, EvalError> {
        self.binary_level(
            &[("+", BinaryOp::Add), ("-", BinaryOp::Sub)],
            Self::multiplicative,
        )
    }

    fn multiplicative(&mut self) -> Result<Expr, EvalError> {
        self.binary_level(
            &[
                ("*", BinaryOp::Mul),
                ("/", BinaryOp::Div),
                ("%", BinaryOp::Rem),
            ],
            Self::exponent,
        )
    }

    fn exponent(&mut self) -> Result<Expr, EvalError> {
        let base = self.unary()?;
        if self.eat_punct("**")? {
            let power = self.nested(Self::exponent)?;
            return Ok(Expr::Binary {
                op: BinaryOp::Pow,
                left: Box::new(base),
                right: Box::new(power),
            });
        }
        Ok(base)
    }

    fn unary(&mut self) -> Result<Expr, EvalError> {
        let token = self.peek()?.clone();
        let op = match &token.token {
            Token::Punct("!") => Some(UnaryOp::Not),
            Token::Punct("-") => Some(UnaryOp::Neg),
            Token::Punct("+") => Some(UnaryOp::Plus),
            Token::Ident(word) if word == "typeof" => Some(UnaryOp::TypeOf),
            Token::Ident(word) if word == "void" => {
                self.next()?;
                self.nested(Self::unary)?;
                return Ok(Expr::Undefined);
            }
            Token::Punct(p @ ("++" | "--")) => {
                let increment = *p == "++";
                self.next()?;
                let target = self.nested(Self::unary)?;
                if !matches!(target, Expr::Ident(_) | Expr::Member { .. }) {
                    return Err(error_at(&token, "invalid update target"));
                }
                return Ok(Expr::Update {
                    increment,
                    prefix: true,
                    target: Box::new(target),
                });
            }
            _ => None,
        };
        if let Some(op) = op {
            self.next()?;
            let expr = self.nested(Self::unary)?;
            return Ok(Expr::Unary {
                op,
                expr: Box::new(expr),
            });
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, EvalError> {
        let expr = self.call_member()?;
        let next = self.peek()?;
        if next.newline_before {
            return Ok(expr);
        }
        let increment = match next.token {
            Token::Punct("++") => true,
            Token::Punct("--") => false,
            _ => return Ok(expr),
        };
        let token = self.next()?;
        if !matches!(expr, Expr::Ident(_) | Expr::Member { .. }) {
            return Err(error_at(&token, "invalid update target"));
        }
        Ok(Expr::Update {
            increment,
            prefix: false,
            target: Box::new(expr),
        })
    }

    fn call_member(&mut self) -> Result<Expr, EvalError> {
        let mut expr = self.primary()?;
        let mut links = 0;
        loop {
            if matches!(self.peek()?.token, Token::Punct("." | "?." | "[" | "(")) {
                self.chain_link(&mut links)?;
            }
            if self.eat_punct(".")? {
                let name = self.property_name()?;
                expr = Expr::Member {
                    object: Box::new(expr),
                    property: MemberProp::Static(name),
                    optional: false,
                };
            } else if self.eat_punct("?.")? {
                if self.is_punct("(")? {
                    let args = self.arguments()?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                        optional: true,
                    };
                } else if self.eat_punct("[")? {
                    let property = self.expression()?;
                    self.expect_punct("]")?;
                    expr = Expr::Member {
                        object: Box::new(expr),
                        property: MemberProp::Computed(Box::new(property)),
                        optional: true,
                    };
                } else {
                    let name = self.property_name()?;
                    expr = Expr::Member {
                        object: Box::new(expr),
                        property: MemberProp::Static(name),
                        optional: true,
                    };
                }
            } else if self.eat_punct("[")? {
                let property = self.expression()?;
                self.expect_punct("]")?;
                expr = Expr::Member {
                    object: Box::new(expr),
                    property: MemberProp::Computed(Box::new(property)),
                    optional: false,
                };
            } else if self.is_punct("(")? {
                let args = self.arguments()?;
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                    optional: false,
                };
            } else {
                return Ok(expr);
            }
        }
    }

    fn arguments(&mut self) -> Result<Vec<ArrayItem>, EvalError> {
        self.expect_punct("(")?;
        let mut args = Vec::new();
        loop {
            if self.eat_punct(")")? {
                return Ok(args);
            }
            if self.eat_punct("...")? {
                args.push(ArrayItem::Spread(self.assignment()?));
            } else {
                args.push(ArrayItem::Item(self.assignment()?));
            }
            if !self.eat_punct(",")? {
                self.expect_punct(")")?;
                return Ok(args);
            }
        }
    }

    /// Property names after `.` and object keys; keywords are allowed.
    fn property_name(&mut self) -> Result<String, EvalError> {
        let next = self.next()?;
        match next.token {
            Token::Ident(name) | Token::Str(name) => Ok(name),
            Token::Number(value) => Ok(super::value::number_to_string(value)),
            ref other => Err(error_at(
                &next,
                format!("expected property name but found {}", describe(other)),
            )),
        }
    }

    fn primary(&mut self) -> Result<Expr, EvalError> {
        let token = self.next()?;
        match token.token {
            Token::Number(value) => Ok(Expr::Number(value)),
            Token::Str(value) => Ok(Expr::Str(value)),
            Token::Template(chunks) => self.template(chunks),
            Token::Ident(ref name) => match name.as_str() {
                "true" => Ok(Expr::Bool(true)),
                "false" => Ok(Expr::Bool(false)),
                "null" => Ok(Expr::Null),
                "undefined" => Ok(Expr::Undefined),
                "function" => Ok(Expr::Function(Rc::new(self.function_rest(false)?))),
                "this" => Err(error_at(&token, "`this` is not supported in chart components")),
                keyword if UNSUPPORTED_KEYWORDS.contains(&keyword) => Err(error_at(
                    &token,
                    format!("`{keyword}` is not supported in chart components"),
                )),
                _ => Ok(Expr::Ident(name.clone())),
            },
            Token::Punct("(") => {
                let expr = self.expression()?;
                self.expect_punct(")")?;
                Ok(expr)
            }
            Token::Punct("[") => self.array_literal(),
            Token::Punct("{") => self.object_literal(),
            Token::Punct("<") => self.jsx_element_after_lt(),
            ref other => Err(error_at(
                &token,
                format!("unexpected {}", describe(other)),
            )),
        }
    }

    fn template(&mut self, chunks: Vec<TemplateChunk>) -> Result<Expr, EvalError> {
        let mut parts = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            match chunk {
                TemplateChunk::Text(text) => parts.push(TemplatePart::Text(text)),
                TemplateChunk::Expr {
                    source,
                    line,
                    column,
                } => {
                    let mut parser =
                        Parser::from_lexer(Lexer::with_origin(&source, line, column), &self.runtime)
                            .with_max_depth(self.max_depth);
                    parser.depth = self.depth;
                    parts.push(TemplatePart::Expr(parser.parse_standalone_expression()?));
                }
            }
        }
        Ok(Expr::Template(parts))
    }

    fn array_literal(&mut self) -> Result<Expr, EvalError> {
        let mut items = Vec::new();
        loop {
            if self.eat_punct("]")? {
                return Ok(Expr::Array(items));
            }
            if self.eat_punct(",")? {
                items.push(ArrayItem::Hole);
                continue;
            }
            if self.eat_punct("...")? {
                items.push(ArrayItem::Spread(self.assignment()?));
            } else {
                items.push(ArrayItem::Item(self.assignment()?));
            }
            if !self.eat_punct(",")? {
                self.expect_punct("]")?;
                return Ok(Expr::Array(items));
            }
        }
    }

    fn object_literal(&mut self) -> Result<Expr, EvalError> {
        let mut props = Vec::new();
        loop {
            if self.eat_punct("}")? {
                return Ok(Expr::Object(props));
            }
            if self.eat_punct("...")? {
                props.push(ObjectProp::Spread(self.assignment()?));
            } else {
                let key = if self.eat_punct("[")? {
                    let key = self.assignment()?;
                    self.expect_punct("]")?;
                    PropKey::Computed(key)
                } else {
                    PropKey::Static(self.property_name()?)
                };

                if self.eat_punct(":")? {
                    props.push(ObjectProp::KeyValue(key, self.assignment()?));
                } else if self.is_punct("(")? {
                    let params = self.params()?;
                    self.expect_punct("{")?;
                    let body = FunctionBody::Block(self.block_body()?);
                    let name = match &key {
                        PropKey::Static(name) => Some(name.clone()),
                        PropKey::Computed(_) => None,
                    };
                    props.push(ObjectProp::KeyValue(
                        key,
                        Expr::Function(Rc::new(FunctionDef { name, params, body })),
                    ));
                } else {
                    let PropKey::Static(name) = key else {
                        return Err(self.lexer.error("computed keys need a value"));
                    };
                    props.push(ObjectProp::KeyValue(
                        PropKey::Static(name.clone()),
                        Expr::Ident(name),
                    ));
                }
            }
            if !self.eat_punct(",")? {
                self.expect_punct("}")?;
                return Ok(Expr::Object(props));
            }
        }
    }

    // ---------------------------------------------------------------------
    // JSX
    // ---------------------------------------------------------------------

    fn runtime_member(&self, name: &str) -> Expr {
        Expr::member(Expr::Ident(self.runtime.clone()), name)
    }

    fn jsx_tag_name(&mut self) -> Result<Option<Vec<String>>, EvalError> {
        self.ensure_raw_mode()?;
        let Some(first) = self.lexer.jsx_name()? else {
            return Ok(None);
        };
        let mut parts = vec![first];
        while self.lexer.eat_char('.')? {
            let part = self
                .lexer
                .jsx_name()?
                .ok_or_else(|| self.lexer.error("expected name after `.` in JSX tag"))?;
            parts.push(part);
        }
        Ok(Some(parts))
    }

    fn jsx_element_after_lt(&mut self) -> Result<Expr, EvalError> {
        self.nested(Self::jsx_element_inner)
    }

    fn jsx_element_inner(&mut self) -> Result<Expr, EvalError> {
        let name = self.jsx_tag_name()?;
        let tag = match &name {
            None => self.runtime_member("Fragment"),
            Some(parts) if parts.len() == 1 && starts_lowercase(&parts[0]) => {
                Expr::Str(parts[0].clone())
            }
            Some(parts) => parts
                .iter()
                .skip(1)
                .fold(Expr::Ident(parts[0].clone()), |object, part| {
                    Expr::member(object, part)
                }),
        };

        let mut props = Vec::new();
        let self_closing = loop {
            self.ensure_raw_mode()?;
            if let Some(attribute) = self.lexer.jsx_name()? {
                let value = if self.lexer.eat_char('=')? {
                    self.jsx_attribute_value()?
                } else {
                    Expr::Bool(true)
                };
                props.push(ObjectProp::KeyValue(PropKey::Static(attribute), value));
            } else if self.lexer.eat_char('{')? {
                self.expect_punct("...")?;
                let spread = self.assignment()?;
                self.expect_punct("}")?;
                props.push(ObjectProp::Spread(spread));
            } else if self.lexer.eat_char('/')? {
                if !self.lexer.eat_char('>')? {
                    return Err(self.lexer.error("expected `>` after `/` in JSX tag"));
                }
                break true;
            } else if self.lexer.eat_char('>')? {
                break false;
            } else {
                return Err(self.lexer.error("malformed JSX tag"));
            }
        };

        let mut args = vec![
            tag,
            if props.is_empty() {
                Expr::Null
            } else {
                Expr::Object(props)
            },
        ];
        if !self_closing {
            for child in self.jsx_children(name.as_deref())? {
                args.push(child);
            }
        }

        Ok(Expr::Call {
            callee: Box::new(self.runtime_member("createElement")),
            args: args.into_iter().map(ArrayItem::Item).collect(),
            optional: false,
        })
    }

    fn jsx_attribute_value(&mut self) -> Result<Expr, EvalError> {
        self.ensure_raw_mode()?;
        if let Some(text) = self.lexer.jsx_attribute_string()? {
            return Ok(Expr::Str(decode_entities(&text)));
        }
        if self.lexer.eat_char('{')? {
            let value = self.assignment()?;
            self.expect_punct("}")?;
            return Ok(value);
        }
        if self.lexer.eat_char('<')? {
            return self.jsx_element_after_lt();
        }
        Err(self.lexer.error("expected JSX attribute value"))
    }

    fn jsx_children(&mut self, open_name: Option<&[String]>) -> Result<Vec<Expr>, EvalError> {
        let mut children = Vec::new();
        loop {
            self.ensure_raw_mode()?;
            let text = self.lexer.jsx_text();
            if let Some(normalized) = normalize_jsx_text(&text) {
                children.push(Expr::Str(normalized));
            }

            if self.lexer.eat_raw_char('{') {
                if self.eat_punct("}")? {
                    continue;
                }
                let expr = self.expression()?;
                self.expect_punct("}")?;
                children.push(expr);
            } else if self.lexer.eat_raw_char('<') {
                if self.lexer.eat_char('/')? {
                    let close_name = self.jsx_tag_name()?;
                    if !self.lexer.eat_char('>')? {
                        return Err(self.lexer.error("expected `>` in JSX closing tag"));
                    }
                    if close_name.as_deref() != open_name {
                        return Err(self.lexer.error(format!(
                            "expected corresponding JSX closing tag for <{}>",
                            open_name.map(|parts| parts.join(".")).unwrap_or_default()
                        )));
                    }
                    return Ok(children);
                }
                children.push(self.jsx_element_after_lt()?);
            } else {
                return Err(self.lexer.error(format!(
                    "unterminated JSX element <{}>",
                    open_name.map(|parts| parts.join(".")).unwrap_or_default()
                )));
            }
        }
    }
}

/// Collapses JSX child text the way the JSX transform does: lines are
/// trimmed, blank lines vanish, remaining lines join with single spaces.
fn normalize_jsx_text(text: &str) -> Option<String> {
    if !text.contains('\n') {
        return if text.is_empty() {
            None
        } else {
            Some(decode_entities(text))
        };
    }
    let lines: Vec<&str> = text.split('\n').collect();
    let last = lines.len() - 1;
    let mut out = String::new();
    for (index, line) in lines.iter().enumerate() {
        let mut trimmed = *line;
        if index != 0 {
            trimmed = trimmed.trim_start();
        }
        if index != last {
            trimmed = trimmed.trim_end();
        }
        if trimmed.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(trimmed);
    }
    if out.is_empty() {
        None
    } else {
        Some(decode_entities(&out))
    }
}

fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_owned();
    }
    text.replace("&nbsp;", "\u{a0}")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn starts_lowercase(name: &str) -> bool {
    name.chars().next().is_some_and(|ch| ch.is_lowercase())
}

fn is_reserved(name: &str) -> bool {
    matches!(
        name,
        "true" | "false" | "null" | "undefined" | "function" | "typeof" | "void" | "this"
    ) || UNSUPPORTED_KEYWORDS.contains(&name)
}

fn describe(token: &Token) -> String {
    match token {
        Token::Ident(name) => format!("`{name}`"),
        Token::Number(value) => format!("number {value}"),
        Token::Str(_) => "string".to_owned(),
        Token::Template(_) => "template literal".to_owned(),
        Token::Punct(punct) => format!("`{punct}`"),
        Token::Eof => "end of input".to_owned(),
    }
}

fn error_at(token: &Spanned, message: impl Into<String>) -> EvalError {
    EvalError::Syntax {
        line: token.line,
        column: token.column,
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Vec<Stmt> {
        Parser::new(source, "React")
            .parse_program()
            .expect("program parses")
    }

    fn create_element(args: Vec<Expr>) -> Expr {
        Expr::Call {
            callee: Box::new(Expr::member(Expr::Ident("React".to_owned()), "createElement")),
            args: args.into_iter().map(ArrayItem::Item).collect(),
            optional: false,
        }
    }

    #[test]
    fn lowers_jsx_to_create_element_calls() {
        let program = parse("<Recharts.Line dataKey=\"v\" dot />;");
        let expected = create_element(vec![
            Expr::member(Expr::Ident("Recharts".to_owned()), "Line"),
            Expr::Object(vec![
                ObjectProp::KeyValue(
                    PropKey::Static("dataKey".to_owned()),
                    Expr::Str("v".to_owned()),
                ),
                ObjectProp::KeyValue(PropKey::Static("dot".to_owned()), Expr::Bool(true)),
            ]),
        ]);
        assert_eq!(program, vec![Stmt::Expr(expected)]);
    }

    #[test]
    fn jsx_children_keep_text_and_expressions() {
        let program = parse("<h3>\n  Vendas de {mes}\n</h3>");
        let expected = create_element(vec![
            Expr::Str("h3".to_owned()),
            Expr::Null,
            Expr::Str("Vendas de ".to_owned()),
            Expr::Ident("mes".to_owned()),
        ]);
        assert_eq!(program, vec![Stmt::Expr(expected)]);
    }

    #[test]
    fn fragments_use_runtime_fragment() {
        let program = parse("<><p/>{/* nada */}</>");
        let Stmt::Expr(Expr::Call { args, .. }) = &program[0] else {
            panic!("expected call");
        };
        assert_eq!(
            args[0],
            ArrayItem::Item(Expr::member(Expr::Ident("React".to_owned()), "Fragment"))
        );
        assert_eq!(args.len(), 3);
    }

    #[test]
    fn mismatched_closing_tag_is_a_syntax_error() {
        let err = Parser::new("<div></span>", "React")
            .parse_program()
            .expect_err("mismatch");
        assert!(matches!(err, EvalError::Syntax { .. }));
    }

    #[test]
    fn distinguishes_arrows_from_parenthesized_expressions() {
        let program = parse("const f = (a, { b }) => a + b; const g = (1 + 2) * 3;");
        let Stmt::Decl { decls, .. } = &program[0] else {
            panic!("expected decl");
        };
        assert!(matches!(decls[0].1, Some(Expr::Function(_))));
        let Stmt::Decl { decls, .. } = &program[1] else {
            panic!("expected decl");
        };
        assert!(matches!(
            decls[0].1,
            Some(Expr::Binary {
                op: BinaryOp::Mul,
                ..
            })
        ));
    }

    #[test]
    fn parenthesized_jsx_return_parses() {
        let program = parse("function C() {\n  return (\n    <div className=\"x\">\n      <span>oi</span>\n    </div>\n  );\n}");
        assert!(matches!(program[0], Stmt::Function(_)));
    }

    #[test]
    fn rejects_unsupported_keywords() {
        let err = Parser::new("const x = new Date();", "React")
            .parse_program()
            .expect_err("new unsupported");
        let EvalError::Syntax { message, .. } = err else {
            panic!("expected syntax error");
        };
        assert!(message.contains("`new`"));
    }

    fn nesting_error(source: &str) -> String {
        let err = Parser::new(source, "React")
            .parse_program()
            .expect_err("nesting limit");
        let EvalError::Syntax { message, .. } = err else {
            panic!("expected syntax error, got {err:?}");
        };
        message
    }

    #[test]
    fn deeply_nested_source_is_a_syntax_error() {
        let parens = format!("{}1{}", "(".repeat(5_000), ")".repeat(5_000));
        assert!(nesting_error(&parens).contains("nests deeper than 128"));

        let unary = format!("{}x", "!".repeat(20_000));
        assert!(nesting_error(&unary).contains("nests deeper"));

        let jsx = format!("{}{}", "<g>".repeat(5_000), "</g>".repeat(5_000));
        assert!(nesting_error(&jsx).contains("nests deeper"));

        let blocks = format!("{}{}", "{".repeat(20_000), "}".repeat(20_000));
        assert!(nesting_error(&blocks).contains("nests deeper"));
    }

    #[test]
    fn long_operator_chains_count_toward_nesting() {
        let chain = vec!["1"; 5_000].join(" + ");
        assert!(nesting_error(&chain).contains("nests deeper"));
        let members = format!("a{}", ".b".repeat(5_000));
        assert!(nesting_error(&members).contains("nests deeper"));

        let short = vec!["1"; 40].join(" + ");
        assert_eq!(parse(&short).len(), 1);
    }

    #[test]
    fn nesting_limit_is_configurable() {
        let source = format!("{}1{}", "[".repeat(20), "]".repeat(20));
        assert_eq!(parse(&source).len(), 1);
        let err = Parser::new(&source, "React")
            .with_max_depth(10)
            .parse_program()
            .expect_err("limited");
        assert!(matches!(err, EvalError::Syntax { .. }));
    }

    #[test]
    fn for_of_and_classic_for_parse() {
        let program = parse("for (const x of xs) { t += x; } for (let i = 0; i < 3; i++) {}");
        assert!(matches!(program[0], Stmt::ForOf { .. }));
        assert!(matches!(program[1], Stmt::For { .. }));
    }
}

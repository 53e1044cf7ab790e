//! Recursive-descent parser producing [`Stmt`] trees.

use std::rc::Rc;

use super::ast::{
    AssignOp, BinaryOp, DeclKind, Expr, FnBody, ForHead, FunctionDef, Item, LogicalOp, Param,
    Pattern, PatternElem, Prop, PropKey, Stmt, SwitchCase, TemplatePart, UnaryOp,
};
use super::lexer::{tokenize, TemplateChunk, Tok, Token};
use super::{ScriptFault, MAX_NESTING};

type PResult<T> = Result<T, ScriptFault>;

const NESTING_MESSAGE: &str = "Source is nested too deeply";

const RESERVED: &[&str] = &[
    "break", "case", "catch", "class", "const", "continue", "debugger", "default", "delete", "do",
    "else", "enum", "export", "extends", "false", "finally", "for", "function", "if", "import",
    "in", "instanceof", "let", "new", "null", "return", "super", "switch", "this", "throw",
    "true", "try", "typeof", "var", "void", "while", "with", "yield", "await", "async",
];

/// Parses a whole program.
pub fn parse_program(source: &str) -> PResult<Vec<Stmt>> {
    let mut parser = Parser::new(tokenize(source)?);
    let mut body = Vec::new();
    while !parser.at_eof() {
        body.push(parser.statement()?);
    }
    Ok(body)
}

/// Parses a single expression, rejecting trailing input.
#[cfg(test)]
pub fn parse_expression(source: &str) -> PResult<Expr> {
    let mut parser = Parser::new(tokenize(source)?);
    let expr = parser.expression()?;
    if !parser.at_eof() {
        return Err(parser.unexpected());
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// Open nesting levels; bounded by [`MAX_NESTING`] so the parser and
    /// the evaluator never recurse deeper than their stack allows.
    depth: usize,
}

impl Parser {
    const fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    fn enter(&mut self) -> PResult<()> {
        if self.depth >= MAX_NESTING {
            return Err(ScriptFault::syntax(NESTING_MESSAGE));
        }
        self.depth += 1;
        Ok(())
    }

    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> PResult<T>) -> PResult<T> {
        self.enter()?;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    // ------------------------------------------------------------------
    // Token helpers
    // ------------------------------------------------------------------

    fn token(&self, offset: usize) -> &Token {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx]
    }

    fn peek(&self) -> &Tok {
        &self.token(0).tok
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek(), Tok::Eof)
    }

    fn advance(&mut self) -> Tok {
        let tok = self.token(0).tok.clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn is_punct(&self, punct: &str) -> bool {
        matches!(self.peek(), Tok::Punct(p) if *p == punct)
    }

    fn is_punct_at(&self, offset: usize, punct: &str) -> bool {
        matches!(&self.token(offset).tok, Tok::Punct(p) if *p == punct)
    }

    fn eat_punct(&mut self, punct: &str) -> bool {
        if self.is_punct(punct) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, punct: &str) -> PResult<()> {
        if self.eat_punct(punct) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn is_word(&self, word: &str) -> bool {
        matches!(self.peek(), Tok::Ident(w) if w == word)
    }

    fn eat_word(&mut self, word: &str) -> bool {
        if self.is_word(word) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn unexpected(&self) -> ScriptFault {
        let message = match self.peek() {
            Tok::Eof => "Unexpected end of input".to_string(),
            Tok::Punct(p) => format!("Unexpected token '{p}'"),
            Tok::Ident(w) if RESERVED.contains(&w.as_str()) => format!("Unexpected token '{w}'"),
            Tok::Ident(w) => format!("Unexpected identifier '{w}'"),
            Tok::Num(_) => "Unexpected number".to_string(),
            Tok::Str(_) => "Unexpected string".to_string(),
            Tok::Template(_) => "Unexpected template string".to_string(),
        };
        ScriptFault::syntax(message)
    }

    fn binding_name(&mut self) -> PResult<String> {
        match self.peek() {
            Tok::Ident(name) if !RESERVED.contains(&name.as_str()) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected()),
        }
    }

    fn property_name(&mut self) -> PResult<String> {
        match self.peek() {
            Tok::Ident(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected()),
        }
    }

    fn consume_semicolon(&mut self) -> PResult<()> {
        if self.eat_punct(";") || self.is_punct("}") || self.at_eof() || self.token(0).nl_before {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn statement(&mut self) -> PResult<Stmt> {
        self.nested(Self::statement_unchecked)
    }

    fn statement_unchecked(&mut self) -> PResult<Stmt> {
        if self.is_punct("{") {
            return Ok(Stmt::Block(self.block()?));
        }
        if self.eat_punct(";") {
            return Ok(Stmt::Empty);
        }
        let Tok::Ident(word) = self.peek() else {
            return self.expression_statement();
        };
        match word.as_str() {
            "var" | "let" | "const" => {
                let stmt = self.declaration()?;
                self.consume_semicolon()?;
                Ok(stmt)
            }
            "function" if !self.is_punct_at(1, "(") => {
                self.advance();
                let name = self.binding_name()?;
                Ok(Stmt::Function(self.function_rest(Some(name))?))
            }
            "if" => {
                self.advance();
                self.expect_punct("(")?;
                let test = self.expression()?;
                self.expect_punct(")")?;
                let then = Box::new(self.statement()?);
                let otherwise = if self.eat_word("else") {
                    Some(Box::new(self.statement()?))
                } else {
                    None
                };
                Ok(Stmt::If(test, then, otherwise))
            }
            "while" => {
                self.advance();
                self.expect_punct("(")?;
                let test = self.expression()?;
                self.expect_punct(")")?;
                Ok(Stmt::While(test, Box::new(self.statement()?)))
            }
            "do" => {
                self.advance();
                let body = Box::new(self.statement()?);
                if !self.eat_word("while") {
                    return Err(self.unexpected());
                }
                self.expect_punct("(")?;
                let test = self.expression()?;
                self.expect_punct(")")?;
                self.eat_punct(";");
                Ok(Stmt::DoWhile(body, test))
            }
            "for" => self.for_statement(),
            "switch" => self.switch_statement(),
            "return" => {
                self.advance();
                let value = if self.is_punct(";")
                    || self.is_punct("}")
                    || self.at_eof()
                    || self.token(0).nl_before
                {
                    None
                } else {
                    Some(self.expression()?)
                };
                self.consume_semicolon()?;
                Ok(Stmt::Return(value))
            }
            "break" | "continue" => {
                let is_break = word == "break";
                self.advance();
                self.consume_semicolon()?;
                Ok(if is_break { Stmt::Break } else { Stmt::Continue })
            }
            "throw" => {
                self.advance();
                if self.token(0).nl_before {
                    return Err(ScriptFault::syntax("Illegal newline after throw"));
                }
                let value = self.expression()?;
                self.consume_semicolon()?;
                Ok(Stmt::Throw(value))
            }
            "try" => self.try_statement(),
            _ => self.expression_statement(),
        }
    }

    fn expression_statement(&mut self) -> PResult<Stmt> {
        let expr = self.expression()?;
        self.consume_semicolon()?;
        Ok(Stmt::Expr(expr))
    }

    fn block(&mut self) -> PResult<Vec<Stmt>> {
        self.expect_punct("{")?;
        let mut body = Vec::new();
        while !self.eat_punct("}") {
            if self.at_eof() {
                return Err(self.unexpected());
            }
            body.push(self.statement()?);
        }
        Ok(body)
    }

    fn decl_kind(&mut self) -> Option<DeclKind> {
        let kind = match self.peek() {
            Tok::Ident(w) if w == "var" => DeclKind::Var,
            Tok::Ident(w) if w == "let" => DeclKind::Let,
            Tok::Ident(w) if w == "const" => DeclKind::Const,
            _ => return None,
        };
        self.advance();
        Some(kind)
    }

    fn declaration(&mut self) -> PResult<Stmt> {
        let kind = self.decl_kind().ok_or_else(|| self.unexpected())?;
        let first = self.binding_pattern()?;
        self.declarators(kind, first)
    }

    fn declarators(&mut self, kind: DeclKind, first: Pattern) -> PResult<Stmt> {
        let mut decls = Vec::new();
        let mut pattern = first;
        loop {
            let init = if self.eat_punct("=") {
                Some(self.assignment()?)
            } else {
                if kind == DeclKind::Const {
                    return Err(ScriptFault::syntax("Missing initializer in const declaration"));
                }
                if !matches!(pattern, Pattern::Ident(_)) {
                    return Err(ScriptFault::syntax(
                        "Missing initializer in destructuring declaration",
                    ));
                }
                None
            };
            decls.push((pattern, init));
            if !self.eat_punct(",") {
                break;
            }
            pattern = self.binding_pattern()?;
        }
        Ok(Stmt::Decl(kind, decls))
    }

    fn for_statement(&mut self) -> PResult<Stmt> {
        self.advance();
        self.expect_punct("(")?;

        let mut init = None;
        if let Some(kind) = self.decl_kind() {
            let pattern = self.binding_pattern()?;
            if let Some(of) = self.for_each_keyword() {
                return self.for_each_rest(of, ForHead::Decl(kind, pattern));
            }
            init = Some(Box::new(self.declarators(kind, pattern)?));
        } else if !self.is_punct(";") {
            let start = self.pos;
            if let Ok(target) = self.call_member() {
                if let Some(of) = self.for_each_keyword() {
                    if !is_assignable(&target) {
                        return Err(ScriptFault::syntax(
                            "Invalid left-hand side in for-loop",
                        ));
                    }
                    return self.for_each_rest(of, ForHead::Target(target));
                }
            }
            self.pos = start;
            init = Some(Box::new(Stmt::Expr(self.expression()?)));
        }

        self.expect_punct(";")?;
        let test = if self.is_punct(";") {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect_punct(";")?;
        let update = if self.is_punct(")") {
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

    /// Consumes `of` or `in`; returns `true` for `of`.
    fn for_each_keyword(&mut self) -> Option<bool> {
        if self.eat_word("of") {
            Some(true)
        } else if self.eat_word("in") {
            Some(false)
        } else {
            None
        }
    }

    fn for_each_rest(&mut self, of: bool, head: ForHead) -> PResult<Stmt> {
        let iterable = if of {
            self.assignment()?
        } else {
            self.expression()?
        };
        self.expect_punct(")")?;
        let body = Box::new(self.statement()?);
        Ok(if of {
            Stmt::ForOf(head, iterable, body)
        } else {
            Stmt::ForIn(head, iterable, body)
        })
    }

    fn switch_statement(&mut self) -> PResult<Stmt> {
        self.advance();
        self.expect_punct("(")?;
        let discriminant = self.expression()?;
        self.expect_punct(")")?;
        self.expect_punct("{")?;
        let mut cases = Vec::new();
        let mut seen_default = false;
        while !self.eat_punct("}") {
            let test = if self.eat_word("case") {
                Some(self.expression()?)
            } else if self.eat_word("default") {
                if seen_default {
                    return Err(ScriptFault::syntax(
                        "More than one default clause in switch statement",
                    ));
                }
                seen_default = true;
                None
            } else {
                return Err(self.unexpected());
            };
            self.expect_punct(":")?;
            let mut body = Vec::new();
            while !self.is_word("case") && !self.is_word("default") && !self.is_punct("}") {
                if self.at_eof() {
                    return Err(self.unexpected());
                }
                body.push(self.statement()?);
            }
            cases.push(SwitchCase { test, body });
        }
        Ok(Stmt::Switch(discriminant, cases))
    }

    fn try_statement(&mut self) -> PResult<Stmt> {
        self.advance();
        let block = self.block()?;
        let mut param = None;
        let mut handler = None;
        if self.eat_word("catch") {
            if self.eat_punct("(") {
                param = Some(self.binding_pattern()?);
                self.expect_punct(")")?;
            }
            handler = Some(self.block()?);
        }
        let finalizer = if self.eat_word("finally") {
            Some(self.block()?)
        } else {
            None
        };
        if handler.is_none() && finalizer.is_none() {
            return Err(ScriptFault::syntax("Missing catch or finally after try"));
        }
        Ok(Stmt::Try {
            block,
            param,
            handler,
            finalizer,
        })
    }

    // ------------------------------------------------------------------
    // Patterns and functions
    // ------------------------------------------------------------------

    fn binding_pattern(&mut self) -> PResult<Pattern> {
        self.nested(Self::binding_pattern_unchecked)
    }

    fn binding_pattern_unchecked(&mut self) -> PResult<Pattern> {
        if self.eat_punct("[") {
            let mut elements = Vec::new();
            let mut rest = None;
            while !self.eat_punct("]") {
                if self.eat_punct(",") {
                    elements.push(None);
                    continue;
                }
                if self.eat_punct("...") {
                    rest = Some(Box::new(self.binding_pattern()?));
                    self.expect_punct("]")?;
                    break;
                }
                elements.push(Some(self.pattern_elem()?));
                if !self.is_punct("]") {
                    self.expect_punct(",")?;
                }
            }
            return Ok(Pattern::Array { elements, rest });
        }
        if self.eat_punct("{") {
            let mut props = Vec::new();
            let mut rest = None;
            while !self.eat_punct("}") {
                if self.eat_punct("...") {
                    rest = Some(self.binding_name()?);
                    self.expect_punct("}")?;
                    break;
                }
                let key = match self.peek().clone() {
                    Tok::Ident(name) | Tok::Str(name) => name,
                    Tok::Num(n) => super::value::number_to_string(n),
                    _ => return Err(self.unexpected()),
                };
                self.advance();
                let elem = if self.eat_punct(":") {
                    self.pattern_elem()?
                } else {
                    if RESERVED.contains(&key.as_str()) {
                        return Err(ScriptFault::syntax(format!("Unexpected token '{key}'")));
                    }
                    let default = if self.eat_punct("=") {
                        Some(self.assignment()?)
                    } else {
                        None
                    };
                    PatternElem {
                        pattern: Pattern::Ident(key.clone()),
                        default,
                    }
                };
                props.push((key, elem));
                if !self.is_punct("}") {
                    self.expect_punct(",")?;
                }
            }
            return Ok(Pattern::Object { props, rest });
        }
        Ok(Pattern::Ident(self.binding_name()?))
    }

    fn pattern_elem(&mut self) -> PResult<PatternElem> {
        let pattern = self.binding_pattern()?;
        let default = if self.eat_punct("=") {
            Some(self.assignment()?)
        } else {
            None
        };
        Ok(PatternElem { pattern, default })
    }

    fn params(&mut self) -> PResult<Vec<Param>> {
        self.expect_punct("(")?;
        let mut params = Vec::new();
        while !self.eat_punct(")") {
            let rest = self.eat_punct("...");
            let pattern = self.binding_pattern()?;
            let default = if !rest && self.eat_punct("=") {
                Some(self.assignment()?)
            } else {
                None
            };
            params.push(Param {
                pattern,
                default,
                rest,
            });
            if rest {
                self.expect_punct(")")?;
                break;
            }
            if !self.is_punct(")") {
                self.expect_punct(",")?;
            }
        }
        Ok(params)
    }

    /// Parses the parameter list and body following `function name`.
    fn function_rest(&mut self, name: Option<String>) -> PResult<Rc<FunctionDef>> {
        let params = self.params()?;
        let body = self.block()?;
        Ok(Rc::new(FunctionDef {
            name,
            params,
            body: FnBody::Block(body),
            is_arrow: false,
        }))
    }

    /// Returns `true` if the tokens at the cursor start an arrow function.
    fn at_arrow(&self) -> bool {
        match self.peek() {
            Tok::Ident(name) if !RESERVED.contains(&name.as_str()) => {
                self.is_punct_at(1, "=>") && !self.token(1).nl_before
            }
            Tok::Punct("(") => {
                let mut depth = 0usize;
                let mut offset = 0;
                loop {
                    match &self.token(offset).tok {
                        Tok::Eof => return false,
                        Tok::Punct("(" | "[" | "{") => depth += 1,
                        Tok::Punct(")" | "]" | "}") => {
                            depth -= 1;
                            if depth == 0 {
                                return self.is_punct_at(offset + 1, "=>")
                                    && !self.token(offset + 1).nl_before;
                            }
                        }
                        _ => {}
                    }
                    offset += 1;
                }
            }
            _ => false,
        }
    }

    fn arrow_function(&mut self) -> PResult<Expr> {
        let params = if self.is_punct("(") {
            self.params()?
        } else {
            vec![Param {
                pattern: Pattern::Ident(self.binding_name()?),
                default: None,
                rest: false,
            }]
        };
        self.expect_punct("=>")?;
        let body = if self.is_punct("{") {
            FnBody::Block(self.block()?)
        } else {
            FnBody::Expr(Box::new(self.assignment()?))
        };
        Ok(Expr::Function(Rc::new(FunctionDef {
            name: None,
            params,
            body,
            is_arrow: true,
        })))
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn expression(&mut self) -> PResult<Expr> {
        let first = self.assignment()?;
        if !self.is_punct(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_punct(",") {
            items.push(self.assignment()?);
        }
        Ok(Expr::Sequence(items))
    }

    fn assignment(&mut self) -> PResult<Expr> {
        self.nested(Self::assignment_unchecked)
    }

    fn assignment_unchecked(&mut self) -> PResult<Expr> {
        if self.at_arrow() {
            return self.arrow_function();
        }
        let target = self.conditional()?;
        let op = match self.peek() {
            Tok::Punct("=") => AssignOp::Assign,
            Tok::Punct("+=") => AssignOp::Compound(BinaryOp::Add),
            Tok::Punct("-=") => AssignOp::Compound(BinaryOp::Sub),
            Tok::Punct("*=") => AssignOp::Compound(BinaryOp::Mul),
            Tok::Punct("/=") => AssignOp::Compound(BinaryOp::Div),
            Tok::Punct("%=") => AssignOp::Compound(BinaryOp::Rem),
            Tok::Punct("**=") => AssignOp::Compound(BinaryOp::Pow),
            _ => return Ok(target),
        };
        self.advance();
        if op == AssignOp::Assign && matches!(target, Expr::Array(_) | Expr::Object(_)) {
            let pattern = expr_to_pattern(&target)
                .ok_or_else(|| ScriptFault::syntax("Invalid destructuring assignment target"))?;
            let value = self.assignment()?;
            return Ok(Expr::AssignPattern(pattern, Box::new(value)));
        }
        if !is_assignable(&target) {
            return Err(ScriptFault::syntax("Invalid left-hand side in assignment"));
        }
        let value = self.assignment()?;
        Ok(Expr::Assign {
            op,
            target: Box::new(target),
            value: Box::new(value),
        })
    }

    fn conditional(&mut self) -> PResult<Expr> {
        let test = self.binary(0)?;
        if !self.eat_punct("?") {
            return Ok(test);
        }
        let then = self.assignment()?;
        self.expect_punct(":")?;
        let otherwise = self.assignment()?;
        Ok(Expr::Conditional(
            Box::new(test),
            Box::new(then),
            Box::new(otherwise),
        ))
    }

    fn binary_op(&self) -> Option<(u8, Result<BinaryOp, LogicalOp>)> {
        let op = match self.peek() {
            Tok::Punct(p) => match *p {
                "||" => (1, Err(LogicalOp::Or)),
                "??" => (1, Err(LogicalOp::Nullish)),
                "&&" => (2, Err(LogicalOp::And)),
                "==" => (6, Ok(BinaryOp::Eq)),
                "!=" => (6, Ok(BinaryOp::NotEq)),
                "===" => (6, Ok(BinaryOp::StrictEq)),
                "!==" => (6, Ok(BinaryOp::StrictNotEq)),
                "<" => (7, Ok(BinaryOp::Lt)),
                ">" => (7, Ok(BinaryOp::Gt)),
                "<=" => (7, Ok(BinaryOp::Le)),
                ">=" => (7, Ok(BinaryOp::Ge)),
                "+" => (9, Ok(BinaryOp::Add)),
                "-" => (9, Ok(BinaryOp::Sub)),
                "*" => (10, Ok(BinaryOp::Mul)),
                "/" => (10, Ok(BinaryOp::Div)),
                "%" => (10, Ok(BinaryOp::Rem)),
                "**" => (11, Ok(BinaryOp::Pow)),
                _ => return None,
            },
            Tok::Ident(w) if w == "in" => (7, Ok(BinaryOp::In)),
            Tok::Ident(w) if w == "instanceof" => (7, Ok(BinaryOp::InstanceOf)),
            _ => return None,
        };
        Some(op)
    }

    fn binary(&mut self, min_prec: u8) -> PResult<Expr> {
        let mut left = self.unary()?;
        let mut folds = 0;
        while let Some((prec, op)) = self.binary_op() {
            if prec < min_prec {
                break;
            }
            self.advance();
            // Each fold deepens the tree by one level.
            self.enter()?;
            folds += 1;
            // `**` is right-associative.
            let next = if op == Ok(BinaryOp::Pow) { prec } else { prec + 1 };
            let right = self.binary(next)?;
            left = match op {
                Ok(op) => Expr::Binary(op, Box::new(left), Box::new(right)),
                Err(op) => Expr::Logical(op, Box::new(left), Box::new(right)),
            };
        }
        self.depth -= folds;
        Ok(left)
    }

    fn unary(&mut self) -> PResult<Expr> {
        let op = match self.peek() {
            Tok::Punct("!") => Some(UnaryOp::Not),
            Tok::Punct("-") => Some(UnaryOp::Neg),
            Tok::Punct("+") => Some(UnaryOp::Plus),
            Tok::Ident(w) if w == "typeof" => Some(UnaryOp::Typeof),
            Tok::Ident(w) if w == "void" => Some(UnaryOp::Void),
            Tok::Ident(w) if w == "delete" => Some(UnaryOp::Delete),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let operand = self.nested(Self::unary)?;
            return Ok(Expr::Unary(op, Box::new(operand)));
        }
        if self.is_punct("++") || self.is_punct("--") {
            let increment = self.is_punct("++");
            self.advance();
            let target = self.nested(Self::unary)?;
            if !is_assignable(&target) {
                return Err(ScriptFault::syntax(
                    "Invalid left-hand side expression in prefix operation",
                ));
            }
            return Ok(Expr::Update {
                increment,
                prefix: true,
                target: Box::new(target),
            });
        }
        let expr = self.call_member()?;
        if (self.is_punct("++") || self.is_punct("--")) && !self.token(0).nl_before {
            let increment = self.is_punct("++");
            self.advance();
            if !is_assignable(&expr) {
                return Err(ScriptFault::syntax(
                    "Invalid left-hand side expression in postfix operation",
                ));
            }
            return Ok(Expr::Update {
                increment,
                prefix: false,
                target: Box::new(expr),
            });
        }
        Ok(expr)
    }

    fn arguments(&mut self) -> PResult<Vec<Item>> {
        self.expect_punct("(")?;
        let mut args = Vec::new();
        while !self.eat_punct(")") {
            if self.eat_punct("...") {
                args.push(Item::Spread(self.assignment()?));
            } else {
                args.push(Item::Expr(self.assignment()?));
            }
            if !self.is_punct(")") {
                self.expect_punct(",")?;
            }
        }
        Ok(args)
    }

    fn call_member(&mut self) -> PResult<Expr> {
        let mut expr = if self.is_word("new") {
            self.new_expression()?
        } else {
            self.primary()?
        };
        let mut chained = false;
        let mut links = 0;
        loop {
            if self.is_punct(".") || self.is_punct("?.") || self.is_punct("[") || self.is_punct("(") {
                self.enter()?;
                links += 1;
            }
            if self.eat_punct(".") {
                let property = self.property_name()?;
                expr = Expr::Member {
                    object: Box::new(expr),
                    property,
                    optional: false,
                };
            } else if self.eat_punct("?.") {
                chained = true;
                expr = if self.is_punct("(") {
                    Expr::Call {
                        callee: Box::new(expr),
                        args: self.arguments()?,
                        optional: true,
                    }
                } else if self.eat_punct("[") {
                    let index = self.expression()?;
                    self.expect_punct("]")?;
                    Expr::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                        optional: true,
                    }
                } else {
                    Expr::Member {
                        object: Box::new(expr),
                        property: self.property_name()?,
                        optional: true,
                    }
                };
            } else if self.eat_punct("[") {
                let index = self.expression()?;
                self.expect_punct("]")?;
                expr = Expr::Index {
                    object: Box::new(expr),
                    index: Box::new(index),
                    optional: false,
                };
            } else if self.is_punct("(") {
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args: self.arguments()?,
                    optional: false,
                };
            } else {
                break;
            }
        }
        self.depth -= links;
        Ok(if chained {
            Expr::OptionalChain(Box::new(expr))
        } else {
            expr
        })
    }

    fn new_expression(&mut self) -> PResult<Expr> {
        self.advance();
        let mut callee = if self.is_word("new") {
            self.nested(Self::new_expression)?
        } else {
            self.primary()?
        };
        let mut links = 0;
        loop {
            if self.is_punct(".") || self.is_punct("[") {
                self.enter()?;
                links += 1;
            }
            if self.eat_punct(".") {
                callee = Expr::Member {
                    object: Box::new(callee),
                    property: self.property_name()?,
                    optional: false,
                };
            } else if self.eat_punct("[") {
                let index = self.expression()?;
                self.expect_punct("]")?;
                callee = Expr::Index {
                    object: Box::new(callee),
                    index: Box::new(index),
                    optional: false,
                };
            } else {
                break;
            }
        }
        self.depth -= links;
        let args = if self.is_punct("(") {
            self.arguments()?
        } else {
            Vec::new()
        };
        Ok(Expr::New {
            callee: Box::new(callee),
            args,
        })
    }

    fn primary(&mut self) -> PResult<Expr> {
        match self.peek().clone() {
            Tok::Num(n) => {
                self.advance();
                Ok(Expr::Num(n))
            }
            Tok::Str(s) => {
                self.advance();
                Ok(Expr::Str(s))
            }
            Tok::Template(chunks) => {
                self.advance();
                let mut parts = Vec::with_capacity(chunks.len());
                for chunk in chunks {
                    parts.push(match chunk {
                        TemplateChunk::Text(text) => TemplatePart::Text(text),
                        TemplateChunk::Expr(source) => TemplatePart::Expr(self.embedded_expression(&source)?),
                    });
                }
                Ok(Expr::Template(parts))
            }
            Tok::Ident(word) => match word.as_str() {
                "true" | "false" => {
                    self.advance();
                    Ok(Expr::Bool(word == "true"))
                }
                "null" => {
                    self.advance();
                    Ok(Expr::Null)
                }
                "this" => {
                    self.advance();
                    Ok(Expr::This)
                }
                "function" => {
                    self.advance();
                    let name = if self.is_punct("(") {
                        None
                    } else {
                        Some(self.binding_name()?)
                    };
                    Ok(Expr::Function(self.function_rest(name)?))
                }
                _ => Ok(Expr::Ident(self.binding_name()?)),
            },
            Tok::Punct("(") => {
                self.advance();
                let expr = self.expression()?;
                self.expect_punct(")")?;
                Ok(expr)
            }
            Tok::Punct("[") => {
                self.advance();
                let mut items = Vec::new();
                while !self.eat_punct("]") {
                    if self.eat_punct(",") {
                        items.push(None);
                        continue;
                    }
                    let item = if self.eat_punct("...") {
                        Item::Spread(self.assignment()?)
                    } else {
                        Item::Expr(self.assignment()?)
                    };
                    items.push(Some(item));
                    if !self.is_punct("]") {
                        self.expect_punct(",")?;
                    }
                }
                Ok(Expr::Array(items))
            }
            Tok::Punct("{") => {
                self.advance();
                self.object_literal()
            }
            _ => Err(self.unexpected()),
        }
    }

    /// Parses a `${...}` template expression at the current depth.
    fn embedded_expression(&self, source: &str) -> PResult<Expr> {
        let mut inner = Self::new(tokenize(source)?);
        inner.depth = self.depth;
        let expr = inner.expression()?;
        if !inner.at_eof() {
            return Err(inner.unexpected());
        }
        Ok(expr)
    }

    fn object_literal(&mut self) -> PResult<Expr> {
        let mut props = Vec::new();
        while !self.eat_punct("}") {
            if self.eat_punct("...") {
                props.push(Prop::Spread(self.assignment()?));
            } else {
                let (key, shorthand) = match self.peek().clone() {
                    Tok::Ident(name) => {
                        self.advance();
                        (PropKey::Static(name.clone()), Some(name))
                    }
                    Tok::Str(name) => {
                        self.advance();
                        (PropKey::Static(name), None)
                    }
                    Tok::Num(n) => {
                        self.advance();
                        (PropKey::Static(super::value::number_to_string(n)), None)
                    }
                    Tok::Punct("[") => {
                        self.advance();
                        let key = self.assignment()?;
                        self.expect_punct("]")?;
                        (PropKey::Computed(key), None)
                    }
                    _ => return Err(self.unexpected()),
                };
                let value = if self.eat_punct(":") {
                    self.assignment()?
                } else if self.is_punct("(") {
                    let name = match &key {
                        PropKey::Static(name) => Some(name.clone()),
                        PropKey::Computed(_) => None,
                    };
                    Expr::Function(self.function_rest(name)?)
                } else {
                    match shorthand {
                        Some(name) if !RESERVED.contains(&name.as_str()) => Expr::Ident(name),
                        _ => return Err(self.unexpected()),
                    }
                };
                props.push(Prop::Value(key, value));
            }
            if !self.is_punct("}") {
                self.expect_punct(",")?;
            }
        }
        Ok(Expr::Object(props))
    }
}

fn is_assignable(expr: &Expr) -> bool {
    matches!(
        expr,
        Expr::Ident(_) | Expr::Member { optional: false, .. } | Expr::Index { optional: false, .. }
    )
}

fn expr_to_pattern(expr: &Expr) -> Option<Pattern> {
    match expr {
        Expr::Ident(name) => Some(Pattern::Ident(name.clone())),
        Expr::Array(items) => {
            let mut elements = Vec::new();
            let mut rest = None;
            for (i, item) in items.iter().enumerate() {
                match item {
                    None => elements.push(None),
                    Some(Item::Expr(expr)) => elements.push(Some(expr_to_elem(expr)?)),
                    Some(Item::Spread(expr)) if i + 1 == items.len() => {
                        rest = Some(Box::new(expr_to_pattern(expr)?));
                    }
                    Some(Item::Spread(_)) => return None,
                }
            }
            Some(Pattern::Array { elements, rest })
        }
        Expr::Object(props) => {
            let mut out = Vec::new();
            let mut rest = None;
            for (i, prop) in props.iter().enumerate() {
                match prop {
                    Prop::Value(PropKey::Static(key), value) => {
                        out.push((key.clone(), expr_to_elem(value)?));
                    }
                    Prop::Spread(Expr::Ident(name)) if i + 1 == props.len() => {
                        rest = Some(name.clone());
                    }
                    _ => return None,
                }
            }
            Some(Pattern::Object { props: out, rest })
        }
        _ => None,
    }
}

fn expr_to_elem(expr: &Expr) -> Option<PatternElem> {
    match expr {
        Expr::Assign {
            op: AssignOp::Assign,
            target,
            value,
        } => Some(PatternElem {
            pattern: expr_to_pattern(target)?,
            default: Some((**value).clone()),
        }),
        _ => Some(PatternElem {
            pattern: expr_to_pattern(expr)?,
            default: None,
        }),
    }
}

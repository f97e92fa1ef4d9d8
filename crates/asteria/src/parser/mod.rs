//! Recursive-descent statement parser with Pratt/precedence-climbing
//! expression parsing.
//!
//! Two-layer design: statements
//! are parsed by direct recursive descent (one function per grammar
//! production), while expressions use an operator-precedence table so
//! adding or reordering operators never means touching the statement
//! grammar.

use std::rc::Rc;

use crate::{
    ast::{BindingPattern, Block, CatchClause, Expr, FunctionExpr, Literal, Param, Stmt, SubscriptKind, SwitchArm, UnaryOp, VarBinding, WrapOp, Xpnode},
    error::{CompileError, CompileStatus, SourceLoc},
    lexer::{token::Keyword, Punct, RecursionGuard, Token, TokenKind, TokenStream},
    options::CompileOptions,
    value::Rstr,
};
use crate::ast::BinaryOp;

pub struct Parser<'a> {
    stream: TokenStream,
    options: &'a CompileOptions,
    depth: std::cell::Cell<u32>,
}

type PResult<T> = Result<T, CompileError>;

impl<'a> Parser<'a> {
    pub fn parse_program(source: &str, file: &Rstr, options: &'a CompileOptions) -> PResult<Block> {
        let mut stream = TokenStream::default();
        stream.reload(source, file, options)?;
        let mut parser = Self { stream, options, depth: std::cell::Cell::new(0) };
        let mut block = Vec::new();
        while !parser.stream.is_empty() {
            block.push(parser.statement()?);
        }
        Ok(block)
    }

    fn guard(&self, loc: &SourceLoc, status: CompileStatus) -> PResult<RecursionGuard<'_>> {
        RecursionGuard::enter(&self.depth, loc, status)
    }

    fn peek(&self) -> Option<&Token> {
        self.stream.peek()
    }

    fn peek_loc(&self) -> SourceLoc {
        self.stream.peek().map_or_else(|| SourceLoc::new(Rc::from("<eof>"), 0, 0), |t| t.loc.clone())
    }

    fn shift(&mut self) -> Option<Token> {
        self.stream.shift()
    }

    fn expect_punct(&mut self, p: Punct, status: CompileStatus) -> PResult<SourceLoc> {
        match self.peek() {
            Some(Token { kind: TokenKind::Punct(k), .. }) if *k == p => {
                Ok(self.shift().expect("just peeked").loc)
            }
            _ => Err(CompileError::new(status, self.peek_loc())),
        }
    }

    fn eat_punct(&mut self, p: Punct) -> bool {
        match self.peek() {
            Some(Token { kind: TokenKind::Punct(k), .. }) if *k == p => {
                self.shift();
                true
            }
            _ => false,
        }
    }

    fn eat_keyword(&mut self, kw: Keyword) -> bool {
        match self.peek() {
            Some(Token { kind: TokenKind::Keyword(k), .. }) if *k == kw => {
                self.shift();
                true
            }
            _ => false,
        }
    }

    fn peek_keyword(&self, kw: Keyword) -> bool {
        matches!(self.peek(), Some(Token { kind: TokenKind::Keyword(k), .. }) if *k == kw)
    }

    fn peek_punct(&self, p: Punct) -> bool {
        matches!(self.peek(), Some(Token { kind: TokenKind::Punct(k), .. }) if *k == p)
    }

    fn identifier(&mut self) -> PResult<(Rstr, SourceLoc)> {
        match self.peek() {
            Some(Token { kind: TokenKind::Identifier(_), .. }) => {
                let tok = self.shift().expect("just peeked");
                let TokenKind::Identifier(name) = tok.kind else { unreachable!() };
                Ok((name, tok.loc))
            }
            _ => Err(CompileError::new(CompileStatus::IdentifierExpected, self.peek_loc())),
        }
    }

    /// Like [`Self::identifier`], but for a name that is about to be bound
    /// (a variable, parameter, function, catch clause, or `for each`
    /// binding): names beginning with `__` are reserved for the engine's own
    /// bindings (`__this`, `__varg`) and cannot be declared by a script.
    fn declarable_identifier(&mut self) -> PResult<(Rstr, SourceLoc)> {
        let (name, loc) = self.identifier()?;
        if name.starts_with("__") {
            return Err(CompileError::new(CompileStatus::ReservedIdentifierNotDeclarable, loc));
        }
        Ok((name, loc))
    }

    // ---- statements --------------------------------------------------

    fn block(&mut self) -> PResult<Block> {
        let loc = self.peek_loc();
        let _g = self.guard(&loc, CompileStatus::StatementNestingTooDeep)?;
        self.expect_punct(Punct::LBrace, CompileStatus::OpenBraceExpected)?;
        let mut stmts = Vec::new();
        while !self.peek_punct(Punct::RBrace) {
            if self.stream.is_empty() {
                return Err(CompileError::new(CompileStatus::ClosedBraceExpected, self.peek_loc()));
            }
            stmts.push(self.statement()?);
        }
        self.expect_punct(Punct::RBrace, CompileStatus::ClosedBraceExpected)?;
        Ok(stmts)
    }

    fn statement(&mut self) -> PResult<Stmt> {
        let loc = self.peek_loc();
        let _g = self.guard(&loc, CompileStatus::StatementNestingTooDeep)?;

        if self.peek_punct(Punct::LBrace) {
            return Ok(Stmt::Block(self.block()?));
        }
        if self.eat_keyword(Keyword::Var) {
            return self.var_decl(false);
        }
        if self.eat_keyword(Keyword::Const) {
            return self.var_decl(true);
        }
        if self.eat_keyword(Keyword::Func) {
            return self.func_decl(loc);
        }
        if self.eat_keyword(Keyword::If) {
            return self.if_stmt(loc);
        }
        if self.eat_keyword(Keyword::Switch) {
            return self.switch_stmt(loc);
        }
        if self.eat_keyword(Keyword::While) {
            return self.while_stmt(loc);
        }
        if self.eat_keyword(Keyword::Do) {
            return self.do_while_stmt(loc);
        }
        if self.eat_keyword(Keyword::For) {
            return self.for_stmt(loc);
        }
        if self.eat_keyword(Keyword::Try) {
            return self.try_stmt(loc);
        }
        if self.eat_keyword(Keyword::Defer) {
            let body = self.block()?;
            return Ok(Stmt::Defer { body, loc });
        }
        if self.eat_keyword(Keyword::Break) {
            self.expect_punct(Punct::Semicolon, CompileStatus::SemicolonExpected)?;
            return Ok(Stmt::Break { loc });
        }
        if self.eat_keyword(Keyword::Continue) {
            self.expect_punct(Punct::Semicolon, CompileStatus::SemicolonExpected)?;
            return Ok(Stmt::Continue { loc });
        }
        if self.eat_keyword(Keyword::Return) {
            let value = if self.eat_punct(Punct::Semicolon) { None } else {
                let e = self.expr()?;
                self.expect_punct(Punct::Semicolon, CompileStatus::SemicolonExpected)?;
                Some(e)
            };
            return Ok(Stmt::Return { value, loc });
        }
        if self.eat_keyword(Keyword::Throw) {
            let value = self.expr()?;
            self.expect_punct(Punct::Semicolon, CompileStatus::SemicolonExpected)?;
            return Ok(Stmt::Throw { value, loc });
        }
        if self.eat_keyword(Keyword::Assert) {
            let condition = self.expr()?;
            let message = if self.eat_punct(Punct::Colon) { Some(self.expr()?) } else { None };
            self.expect_punct(Punct::Semicolon, CompileStatus::SemicolonExpected)?;
            return Ok(Stmt::Assert { condition, message, loc });
        }

        let e = self.expr()?;
        self.expect_punct(Punct::Semicolon, CompileStatus::SemicolonExpected)?;
        Ok(Stmt::Expr(e))
    }

    fn binding_pattern(&mut self) -> PResult<BindingPattern> {
        if self.eat_punct(Punct::LBracket) {
            let mut elems = Vec::new();
            while !self.peek_punct(Punct::RBracket) {
                elems.push(self.binding_pattern()?);
                if !self.eat_punct(Punct::Comma) {
                    break;
                }
            }
            self.expect_punct(Punct::RBracket, CompileStatus::ClosedBracketExpected)?;
            Ok(BindingPattern::Array(elems))
        } else if self.eat_punct(Punct::LBrace) {
            let mut fields = Vec::new();
            while !self.peek_punct(Punct::RBrace) {
                let (name, _) = self.declarable_identifier()?;
                fields.push((name.clone(), BindingPattern::Simple(name)));
                if !self.eat_punct(Punct::Comma) {
                    break;
                }
            }
            self.expect_punct(Punct::RBrace, CompileStatus::ClosedBraceExpected)?;
            Ok(BindingPattern::Object(fields))
        } else {
            let (name, _) = self.declarable_identifier()?;
            Ok(BindingPattern::Simple(name))
        }
    }

    fn var_decl(&mut self, immutable: bool) -> PResult<Stmt> {
        let mut bindings = Vec::new();
        loop {
            let loc = self.peek_loc();
            let pattern = self.binding_pattern()?;
            let init = if self.eat_punct(Punct::Assign) { Some(self.expr()?) } else { None };
            bindings.push(VarBinding { pattern, init, loc });
            if !self.eat_punct(Punct::Comma) {
                break;
            }
        }
        self.expect_punct(Punct::Semicolon, CompileStatus::SemicolonExpected)?;
        Ok(Stmt::VarDecl { immutable, bindings })
    }

    /// Parses a parameter list. `...` is a bare punctuator with no name of
    /// its own: a variadic function always collects its trailing arguments
    /// into the fixed name `__varg`.
    fn param_list(&mut self) -> PResult<(Vec<Param>, bool)> {
        self.expect_punct(Punct::LParen, CompileStatus::OpenParenthesisExpected)?;
        let mut params = Vec::new();
        let mut variadic = false;
        while !self.peek_punct(Punct::RParen) {
            if self.eat_punct(Punct::Ellipsis) {
                variadic = true;
                break;
            }
            let (name, loc) = self.declarable_identifier()?;
            params.push(Param { name, loc });
            if !self.eat_punct(Punct::Comma) {
                break;
            }
        }
        if variadic && self.peek_punct(Punct::Comma) {
            return Err(CompileError::new(CompileStatus::VariadicParameterNotLast, self.peek_loc()));
        }
        self.expect_punct(Punct::RParen, CompileStatus::ClosedParenthesisExpected)?;
        Ok((params, variadic))
    }

    fn func_decl(&mut self, loc: SourceLoc) -> PResult<Stmt> {
        let (name, _) = self.declarable_identifier()?;
        let (params, variadic) = self.param_list()?;
        let body = self.block()?;
        Ok(Stmt::FuncDecl { func: FunctionExpr { name, params, variadic, body, loc } })
    }

    fn if_stmt(&mut self, loc: SourceLoc) -> PResult<Stmt> {
        self.expect_punct(Punct::LParen, CompileStatus::OpenParenthesisExpected)?;
        let condition = self.expr()?;
        self.expect_punct(Punct::RParen, CompileStatus::ClosedParenthesisExpected)?;
        let then_branch = self.block()?;
        let else_branch = if self.eat_keyword(Keyword::Else) {
            Some(if self.peek_keyword(Keyword::If) {
                self.shift();
                let inner_loc = self.peek_loc();
                vec![self.if_stmt(inner_loc)?]
            } else {
                self.block()?
            })
        } else {
            None
        };
        Ok(Stmt::If { condition, then_branch, else_branch, loc })
    }

    fn switch_stmt(&mut self, loc: SourceLoc) -> PResult<Stmt> {
        self.expect_punct(Punct::LParen, CompileStatus::OpenParenthesisExpected)?;
        let subject = self.expr()?;
        self.expect_punct(Punct::RParen, CompileStatus::ClosedParenthesisExpected)?;
        self.expect_punct(Punct::LBrace, CompileStatus::OpenBraceExpected)?;
        let mut arms = Vec::new();
        while !self.peek_punct(Punct::RBrace) {
            let label = if self.eat_keyword(Keyword::Case) {
                let e = self.expr()?;
                self.expect_punct(Punct::Colon, CompileStatus::ColonExpected)?;
                Some(e)
            } else if self.eat_keyword(Keyword::Default) {
                self.expect_punct(Punct::Colon, CompileStatus::ColonExpected)?;
                None
            } else {
                return Err(CompileError::new(CompileStatus::StatementExpected, self.peek_loc()));
            };
            let mut body = Vec::new();
            while !self.peek_punct(Punct::RBrace) && !self.peek_keyword(Keyword::Case) && !self.peek_keyword(Keyword::Default) {
                body.push(self.statement()?);
            }
            arms.push(SwitchArm { label, body });
        }
        self.expect_punct(Punct::RBrace, CompileStatus::ClosedBraceExpected)?;
        Ok(Stmt::Switch { subject, arms, loc })
    }

    fn while_stmt(&mut self, loc: SourceLoc) -> PResult<Stmt> {
        self.expect_punct(Punct::LParen, CompileStatus::OpenParenthesisExpected)?;
        let condition = self.expr()?;
        self.expect_punct(Punct::RParen, CompileStatus::ClosedParenthesisExpected)?;
        let body = self.block()?;
        Ok(Stmt::While { condition, body, loc })
    }

    fn do_while_stmt(&mut self, loc: SourceLoc) -> PResult<Stmt> {
        let body = self.block()?;
        if !self.eat_keyword(Keyword::While) {
            return Err(CompileError::new(CompileStatus::KeywordWhileExpected, self.peek_loc()));
        }
        self.expect_punct(Punct::LParen, CompileStatus::OpenParenthesisExpected)?;
        let condition = self.expr()?;
        self.expect_punct(Punct::RParen, CompileStatus::ClosedParenthesisExpected)?;
        self.expect_punct(Punct::Semicolon, CompileStatus::SemicolonExpected)?;
        Ok(Stmt::DoWhile { body, condition, loc })
    }

    fn for_stmt(&mut self, loc: SourceLoc) -> PResult<Stmt> {
        self.expect_punct(Punct::LParen, CompileStatus::OpenParenthesisExpected)?;
        if self.eat_keyword(Keyword::Each) {
            let key_name = {
                let (first, _) = self.declarable_identifier()?;
                if self.eat_punct(Punct::Comma) {
                    let (value, _) = self.declarable_identifier()?;
                    Some((Some(first), value))
                } else {
                    Some((None, first))
                }
            };
            let (key_name, value_name) = key_name.expect("always Some above");
            let (marker, marker_loc) = self.identifier()?;
            if &*marker != "in" {
                return Err(CompileError::new(CompileStatus::IdentifierExpected, marker_loc));
            }
            let range = self.expr()?;
            self.expect_punct(Punct::RParen, CompileStatus::ClosedParenthesisExpected)?;
            let body = self.block()?;
            return Ok(Stmt::ForEach { key_name, value_name, range, body, loc });
        }
        let init = if self.eat_punct(Punct::Semicolon) {
            None
        } else if self.eat_keyword(Keyword::Var) {
            Some(self.var_decl(false)?)
        } else {
            let e = self.expr()?;
            self.expect_punct(Punct::Semicolon, CompileStatus::SemicolonExpected)?;
            Some(Stmt::Expr(e))
        };
        let condition = if self.peek_punct(Punct::Semicolon) { None } else { Some(self.expr()?) };
        self.expect_punct(Punct::Semicolon, CompileStatus::SemicolonExpected)?;
        let step = if self.peek_punct(Punct::RParen) { None } else { Some(self.expr()?) };
        self.expect_punct(Punct::RParen, CompileStatus::ClosedParenthesisExpected)?;
        let body = self.block()?;
        Ok(Stmt::For { init: Box::new(init), condition, step, body, loc })
    }

    fn try_stmt(&mut self, loc: SourceLoc) -> PResult<Stmt> {
        let body = self.block()?;
        if !self.eat_keyword(Keyword::Catch) {
            return Err(CompileError::new(CompileStatus::KeywordCatchExpected, self.peek_loc()));
        }
        self.expect_punct(Punct::LParen, CompileStatus::OpenParenthesisExpected)?;
        let (name, _) = self.declarable_identifier()?;
        self.expect_punct(Punct::RParen, CompileStatus::ClosedParenthesisExpected)?;
        let catch_body = self.block()?;
        Ok(Stmt::Try { body, catch: CatchClause { name, body: catch_body }, loc })
    }

    // ---- expressions ---------------------------------------------------

    fn expr(&mut self) -> PResult<Expr> {
        let loc = self.peek_loc();
        let _g = self.guard(&loc, CompileStatus::ExpressionNestingTooDeep)?;
        self.assignment_expr()
    }

    fn assignment_expr(&mut self) -> PResult<Expr> {
        let lhs = self.conditional_expr()?;
        if let Some(Token { kind: TokenKind::Punct(p), .. }) = self.peek() {
            if let Some(op) = BinaryOp::from_punct(*p) {
                if op.is_assignment() {
                    let loc = self.shift().expect("just peeked").loc;
                    let rhs = self.assignment_expr()?;
                    let mut out = lhs;
                    out.extend(rhs);
                    out.push(Xpnode::Binary(op, loc));
                    return Ok(out);
                }
            }
        }
        Ok(lhs)
    }

    fn conditional_expr(&mut self) -> PResult<Expr> {
        let cond = self.binary_expr(0)?;
        if self.peek_punct(Punct::Question) {
            let loc = self.shift().expect("just peeked").loc;
            let then_branch = self.assignment_expr()?;
            self.expect_punct(Punct::Colon, CompileStatus::ColonExpected)?;
            let else_branch = self.assignment_expr()?;
            let mut out = cond;
            out.push(Xpnode::Conditional {
                then_branch: then_branch.into_boxed_slice(),
                else_branch: else_branch.into_boxed_slice(),
                loc,
            });
            return Ok(out);
        }
        Ok(cond)
    }

    fn precedence(op: BinaryOp) -> u8 {
        match op {
            BinaryOp::Coalesce => 1,
            BinaryOp::LogicOr => 2,
            BinaryOp::LogicAnd => 3,
            BinaryOp::BitOr => 4,
            BinaryOp::BitXor => 5,
            BinaryOp::BitAnd => 6,
            BinaryOp::Eq | BinaryOp::Ne => 7,
            BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge | BinaryOp::Cmp3 => 8,
            BinaryOp::Shl | BinaryOp::Shr => 9,
            BinaryOp::Add | BinaryOp::Sub => 10,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => 11,
            _ => 0,
        }
    }

    fn peek_binary_op(&self) -> Option<(BinaryOp, SourceLoc)> {
        match self.peek() {
            Some(Token { kind: TokenKind::Punct(p), loc }) => {
                let op = BinaryOp::from_punct(*p)?;
                if op.is_assignment() {
                    return None;
                }
                Some((op, loc.clone()))
            }
            Some(Token { kind: TokenKind::Keyword(Keyword::And), loc }) => Some((BinaryOp::LogicAnd, loc.clone())),
            Some(Token { kind: TokenKind::Keyword(Keyword::Or), loc }) => Some((BinaryOp::LogicOr, loc.clone())),
            _ => None,
        }
    }

    fn binary_expr(&mut self, min_prec: u8) -> PResult<Expr> {
        let mut lhs = self.unary_expr()?;
        while let Some((op, loc)) = self.peek_binary_op() {
            let prec = Self::precedence(op);
            if prec == 0 || prec < min_prec {
                break;
            }
            self.shift();
            let rhs = self.binary_expr(prec + 1)?;
            lhs.extend(rhs);
            lhs.push(Xpnode::Binary(op, loc));
        }
        Ok(lhs)
    }

    fn unary_expr(&mut self) -> PResult<Expr> {
        let loc = self.peek_loc();
        let unary_op = match self.peek() {
            Some(Token { kind: TokenKind::Punct(Punct::Sub), .. }) => Some(UnaryOp::Neg),
            Some(Token { kind: TokenKind::Punct(Punct::Add), .. }) => Some(UnaryOp::Pos),
            Some(Token { kind: TokenKind::Punct(Punct::BitNot), .. }) => Some(UnaryOp::BitNot),
            Some(Token { kind: TokenKind::Keyword(Keyword::Not), .. }) => Some(UnaryOp::Not),
            Some(Token { kind: TokenKind::Punct(Punct::Inc), .. }) => Some(UnaryOp::PreInc),
            Some(Token { kind: TokenKind::Punct(Punct::Dec), .. }) => Some(UnaryOp::PreDec),
            Some(Token { kind: TokenKind::Keyword(Keyword::Lengthof), .. }) => Some(UnaryOp::Lengthof),
            Some(Token { kind: TokenKind::Keyword(Keyword::Typeof), .. }) => Some(UnaryOp::Typeof),
            Some(Token { kind: TokenKind::Keyword(Keyword::Unset), .. }) => Some(UnaryOp::Unset),
            _ => None,
        };
        if let Some(op) = unary_op {
            self.shift();
            let mut operand = self.unary_expr()?;
            operand.push(Xpnode::Unary(op, loc));
            return Ok(operand);
        }
        self.postfix_expr()
    }

    fn postfix_expr(&mut self) -> PResult<Expr> {
        let mut expr = self.primary_expr()?;
        loop {
            let loc = self.peek_loc();
            if self.eat_punct(Punct::LParen) {
                let mut arg_count = 0;
                while !self.peek_punct(Punct::RParen) {
                    let arg = self.assignment_expr()?;
                    expr.extend(arg);
                    arg_count += 1;
                    if !self.eat_punct(Punct::Comma) {
                        break;
                    }
                }
                self.expect_punct(Punct::RParen, CompileStatus::ClosedParenthesisExpected)?;
                expr.push(Xpnode::FunctionCall { arg_count, loc });
            } else if self.eat_punct(Punct::Dot) {
                let (name, _) = self.identifier()?;
                expr.push(Xpnode::Subscript(SubscriptKind::Key(name), loc));
            } else if self.eat_punct(Punct::LBracket) {
                let index = self.expr()?;
                expr.extend(index);
                self.expect_punct(Punct::RBracket, CompileStatus::ClosedBracketExpected)?;
                expr.push(Xpnode::Subscript(SubscriptKind::Index, loc));
            } else if self.eat_punct(Punct::ArrayHead) {
                expr.push(Xpnode::Subscript(SubscriptKind::Head, loc));
            } else if self.eat_punct(Punct::ArrayTail) {
                expr.push(Xpnode::Subscript(SubscriptKind::Tail, loc));
            } else if self.eat_punct(Punct::ArrayRandom) {
                expr.push(Xpnode::Subscript(SubscriptKind::Random(0), loc));
            } else if self.eat_punct(Punct::Inc) {
                expr.push(Xpnode::Unary(UnaryOp::PostInc, loc));
            } else if self.eat_punct(Punct::Dec) {
                expr.push(Xpnode::Unary(UnaryOp::PostDec, loc));
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn primary_expr(&mut self) -> PResult<Expr> {
        let loc = self.peek_loc();
        match self.peek().map(|t| &t.kind) {
            Some(TokenKind::Integer(_)) => {
                let TokenKind::Integer(v) = self.shift().expect("just peeked").kind else { unreachable!() };
                Ok(vec![Xpnode::Literal(Literal::Integer(v))])
            }
            Some(TokenKind::Real(_)) => {
                let TokenKind::Real(v) = self.shift().expect("just peeked").kind else { unreachable!() };
                Ok(vec![Xpnode::Literal(Literal::Real(v))])
            }
            Some(TokenKind::String(_)) => {
                let TokenKind::String(v) = self.shift().expect("just peeked").kind else { unreachable!() };
                Ok(vec![Xpnode::Literal(Literal::String(v))])
            }
            Some(TokenKind::Keyword(Keyword::Null)) => {
                self.shift();
                Ok(vec![Xpnode::Literal(Literal::Null)])
            }
            Some(TokenKind::Keyword(Keyword::True)) => {
                self.shift();
                Ok(vec![Xpnode::Literal(Literal::Boolean(true))])
            }
            Some(TokenKind::Keyword(Keyword::False)) => {
                self.shift();
                Ok(vec![Xpnode::Literal(Literal::Boolean(false))])
            }
            Some(TokenKind::Keyword(Keyword::Func)) => {
                self.shift();
                self.closure_expr(loc)
            }
            Some(TokenKind::Keyword(Keyword::Catch)) => {
                self.shift();
                self.expect_punct(Punct::LParen, CompileStatus::OpenParenthesisExpected)?;
                let inner = self.expr()?;
                self.expect_punct(Punct::RParen, CompileStatus::ClosedParenthesisExpected)?;
                Ok(vec![Xpnode::Catch(inner.into_boxed_slice())])
            }
            Some(TokenKind::Identifier(name)) => match &**name {
                "this" => {
                    self.shift();
                    Ok(vec![Xpnode::Named(Rc::from("__this"), loc)])
                }
                "__fma" => self.fma_expr(loc),
                "__addm" => self.wrap_binary_expr(WrapOp::AddWrap, loc),
                "__subm" => self.wrap_binary_expr(WrapOp::SubWrap, loc),
                "__mulm" => self.wrap_binary_expr(WrapOp::MulWrap, loc),
                "__adds" => self.wrap_binary_expr(WrapOp::AddSat, loc),
                "__subs" => self.wrap_binary_expr(WrapOp::SubSat, loc),
                "__muls" => self.wrap_binary_expr(WrapOp::MulSat, loc),
                "__vcall" => self.vcall_expr(loc),
                _ => {
                    let (name, loc) = self.identifier()?;
                    Ok(vec![Xpnode::Named(name, loc)])
                }
            },
            Some(TokenKind::Punct(Punct::LParen)) => {
                self.shift();
                let e = self.expr()?;
                self.expect_punct(Punct::RParen, CompileStatus::ClosedParenthesisExpected)?;
                Ok(e)
            }
            Some(TokenKind::Punct(Punct::LBracket)) => self.array_literal(),
            Some(TokenKind::Punct(Punct::LBrace)) => self.object_literal(),
            Some(TokenKind::Punct(Punct::Ellipsis)) => {
                self.shift();
                let inner = self.unary_expr()?;
                Ok(vec![Xpnode::Spread(inner.into_boxed_slice())])
            }
            _ => Err(CompileError::new(CompileStatus::ExpressionExpected, loc)),
        }
    }

    /// `__fma(a, b, c)`: a fixed-arity primary expression, not a call through
    /// a named function, so its comma-separated arguments are parsed
    /// directly rather than via [`Self::postfix_expr`]'s argument list.
    fn fma_expr(&mut self, loc: SourceLoc) -> PResult<Expr> {
        self.shift();
        self.expect_punct(Punct::LParen, CompileStatus::OpenParenthesisExpected)?;
        let mut out = self.assignment_expr()?;
        self.expect_punct(Punct::Comma, CompileStatus::CommaExpected)?;
        out.extend(self.assignment_expr()?);
        self.expect_punct(Punct::Comma, CompileStatus::CommaExpected)?;
        out.extend(self.assignment_expr()?);
        self.expect_punct(Punct::RParen, CompileStatus::ClosedParenthesisExpected)?;
        out.push(Xpnode::Fma(loc));
        Ok(out)
    }

    /// `__addm`/`__subm`/`__mulm`/`__adds`/`__subs`/`__muls`: wrapping or
    /// saturating two-argument arithmetic.
    fn wrap_binary_expr(&mut self, op: WrapOp, loc: SourceLoc) -> PResult<Expr> {
        self.shift();
        self.expect_punct(Punct::LParen, CompileStatus::OpenParenthesisExpected)?;
        let mut out = self.assignment_expr()?;
        self.expect_punct(Punct::Comma, CompileStatus::CommaExpected)?;
        out.extend(self.assignment_expr()?);
        self.expect_punct(Punct::RParen, CompileStatus::ClosedParenthesisExpected)?;
        out.push(Xpnode::WrapBinary(op, loc));
        Ok(out)
    }

    /// `__vcall(target, args)`: calls `target` with the array `args` as its
    /// argument list.
    fn vcall_expr(&mut self, loc: SourceLoc) -> PResult<Expr> {
        self.shift();
        self.expect_punct(Punct::LParen, CompileStatus::OpenParenthesisExpected)?;
        let mut out = self.assignment_expr()?;
        self.expect_punct(Punct::Comma, CompileStatus::CommaExpected)?;
        out.extend(self.assignment_expr()?);
        self.expect_punct(Punct::RParen, CompileStatus::ClosedParenthesisExpected)?;
        out.push(Xpnode::VariadicCall(loc));
        Ok(out)
    }

    fn closure_expr(&mut self, loc: SourceLoc) -> PResult<Expr> {
        let (params, variadic) = self.param_list()?;
        let body = self.block()?;
        let func = FunctionExpr { name: Rc::from("<closure>"), params, variadic, body, loc };
        Ok(vec![Xpnode::Closure(Box::new(func))])
    }

    fn array_literal(&mut self) -> PResult<Expr> {
        self.expect_punct(Punct::LBracket, CompileStatus::OpenBracketExpected)?;
        let mut out = Vec::new();
        let mut len = 0;
        while !self.peek_punct(Punct::RBracket) {
            let elem = self.assignment_expr()?;
            out.extend(elem);
            len += 1;
            if !self.eat_punct(Punct::Comma) {
                break;
            }
        }
        self.expect_punct(Punct::RBracket, CompileStatus::ClosedBracketExpected)?;
        out.push(Xpnode::ArrayLiteral { len });
        Ok(out)
    }

    fn object_literal(&mut self) -> PResult<Expr> {
        self.expect_punct(Punct::LBrace, CompileStatus::OpenBraceExpected)?;
        let mut out = Vec::new();
        let mut keys = Vec::new();
        while !self.peek_punct(Punct::RBrace) {
            let (key, _) = match self.peek() {
                Some(Token { kind: TokenKind::String(_), .. }) => {
                    let TokenKind::String(s) = self.shift().expect("just peeked").kind else { unreachable!() };
                    (s, ())
                }
                _ => {
                    let (name, _) = self.identifier()?;
                    (name, ())
                }
            };
            self.expect_punct(Punct::Colon, CompileStatus::ColonExpected)?;
            let value = self.assignment_expr()?;
            out.extend(value);
            keys.push(key);
            if !self.eat_punct(Punct::Comma) {
                break;
            }
        }
        self.expect_punct(Punct::RBrace, CompileStatus::ClosedBraceExpected)?;
        out.push(Xpnode::ObjectLiteral { keys: keys.into_boxed_slice() });
        Ok(out)
    }
}


use lockbox_domain::{Error, Result};

use crate::ast::{CompOp, Expr, ProductOp, SumOp};
use crate::lexer::Token;

/// Recursive-descent parser matching the grammar's precedence chain:
/// comparison/logical (left-assoc, one level) > sum > product > unary neg >
/// function call / atom.
pub struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, pos: 0 }
    }

    pub fn parse(mut self) -> Result<Expr> {
        let expr = self.parse_comp()?;
        if self.pos != self.tokens.len() {
            return Err(Error::FieldExpr(format!(
                "unexpected trailing tokens at position {}",
                self.pos
            )));
        }
        Ok(expr)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&Token> {
        let t = self.tokens.get(self.pos);
        self.pos += 1;
        t
    }

    fn parse_comp(&mut self) -> Result<Expr> {
        let mut left = self.parse_sum()?;
        loop {
            let op = match self.peek() {
                Some(Token::Gt) => CompOp::Gt,
                Some(Token::Ge) => CompOp::Ge,
                Some(Token::Lt) => CompOp::Lt,
                Some(Token::Le) => CompOp::Le,
                Some(Token::EqEq) => CompOp::Eq,
                Some(Token::Ne) => CompOp::Ne,
                Some(Token::OrOr) => CompOp::Or,
                Some(Token::AndAnd) => CompOp::And,
                _ => break,
            };
            self.advance();
            let right = self.parse_sum()?;
            left = Expr::Comp(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn parse_sum(&mut self) -> Result<Expr> {
        let mut left = self.parse_product()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => SumOp::Add,
                Some(Token::Minus) => SumOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_product()?;
            left = Expr::Sum(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn parse_product(&mut self) -> Result<Expr> {
        let mut left = self.parse_factor()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => ProductOp::Mul,
                Some(Token::Slash) => ProductOp::Div,
                Some(Token::Percent) => ProductOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_factor()?;
            left = Expr::Product(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn parse_factor(&mut self) -> Result<Expr> {
        if matches!(self.peek(), Some(Token::Minus)) {
            self.advance();
            let inner = self.parse_factor()?;
            return Ok(Expr::Neg(Box::new(inner)));
        }
        self.parse_molecule()
    }

    fn parse_molecule(&mut self) -> Result<Expr> {
        if let Some(Token::Name(name)) = self.peek().cloned() {
            if matches!(self.tokens.get(self.pos + 1), Some(Token::LParen)) {
                self.advance(); // name
                self.advance(); // (
                let mut args = Vec::new();
                if !matches!(self.peek(), Some(Token::RParen)) {
                    args.push(self.parse_comp()?);
                    while matches!(self.peek(), Some(Token::Comma)) {
                        self.advance();
                        args.push(self.parse_comp()?);
                    }
                }
                match self.advance() {
                    Some(Token::RParen) => {}
                    other => return Err(Error::FieldExpr(format!("expected ')', got {other:?}"))),
                }
                return Ok(Expr::Call(name, args));
            }
        }
        self.parse_atom()
    }

    fn parse_atom(&mut self) -> Result<Expr> {
        match self.advance() {
            Some(Token::Number(n)) => Ok(Expr::Number(*n)),
            Some(Token::String(s)) => Ok(Expr::Str(s.clone())),
            Some(Token::Dollar) => match self.advance() {
                Some(Token::Name(name)) => Ok(Expr::Variable(name.clone())),
                other => Err(Error::FieldExpr(format!("expected variable name after '$', got {other:?}"))),
            },
            other => Err(Error::FieldExpr(format!("unexpected token {other:?}"))),
        }
    }
}

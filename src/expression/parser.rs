use regex::Regex;

use super::ast::{BinaryOp, Expr, Field, Function, Pattern};
use super::lexer::{tokenize, Token, TokenKind};
use super::types::{Type, Value};
use crate::core::error::SyntaxError;

/// Parse and type-check rule text, requiring a boolean result
pub fn parse(input: &str) -> Result<Expr, SyntaxError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(SyntaxError::Empty);
    }

    let mut parser = Parser { tokens, pos: 0 };
    let (expr, ty) = parser.parse_or()?;

    if let Some(token) = parser.peek() {
        return Err(SyntaxError::UnexpectedToken {
            pos: token.pos,
            found: token.kind.describe(),
            expected: "end of expression",
        });
    }

    if ty != Type::Bool {
        return Err(SyntaxError::NotBoolean(ty));
    }

    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

type Typed = (Expr, Type);

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.peek().map(|token| &token.kind)
    }

    fn peek_second(&self) -> Option<&TokenKind> {
        self.tokens.get(self.pos + 1).map(|token| &token.kind)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, kind: TokenKind, expected: &'static str) -> Result<(), SyntaxError> {
        match self.advance() {
            Some(token) if token.kind == kind => Ok(()),
            Some(token) => Err(SyntaxError::UnexpectedToken {
                pos: token.pos,
                found: token.kind.describe(),
                expected,
            }),
            None => Err(SyntaxError::UnexpectedEnd { expected }),
        }
    }

    fn binary(op: BinaryOp, left: Typed, right: Typed) -> Result<Typed, SyntaxError> {
        let ty = op
            .result_type(left.1, right.1)
            .ok_or(SyntaxError::OperandMismatch {
                op: op.symbol(),
                left: left.1,
                right: right.1,
            })?;

        Ok((
            Expr::Binary {
                op,
                left: Box::new(left.0),
                right: Box::new(right.0),
            },
            ty,
        ))
    }

    fn parse_or(&mut self) -> Result<Typed, SyntaxError> {
        let mut left = self.parse_and()?;
        while matches!(self.peek_kind(), Some(TokenKind::Or)) {
            self.advance();
            let right = self.parse_and()?;
            left = Self::binary(BinaryOp::Or, left, right)?;
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Typed, SyntaxError> {
        let mut left = self.parse_comparison()?;
        while matches!(self.peek_kind(), Some(TokenKind::And)) {
            self.advance();
            let right = self.parse_comparison()?;
            left = Self::binary(BinaryOp::And, left, right)?;
        }
        Ok(left)
    }

    fn comparison_op(&self) -> Option<(BinaryOp, usize)> {
        let op = match self.peek_kind()? {
            TokenKind::Eq => BinaryOp::Eq,
            TokenKind::Ne => BinaryOp::Ne,
            TokenKind::Lt => BinaryOp::Lt,
            TokenKind::Le => BinaryOp::Le,
            TokenKind::Gt => BinaryOp::Gt,
            TokenKind::Ge => BinaryOp::Ge,
            TokenKind::Not => match self.peek_second() {
                Some(TokenKind::Ident(word)) if word == "in" => return Some((BinaryOp::NotIn, 2)),
                _ => return None,
            },
            TokenKind::Ident(word) => match word.as_str() {
                "in" => BinaryOp::In,
                "contains" => BinaryOp::Contains,
                "startsWith" => BinaryOp::StartsWith,
                "endsWith" => BinaryOp::EndsWith,
                _ => return None,
            },
            _ => return None,
        };
        Some((op, 1))
    }

    fn parse_comparison(&mut self) -> Result<Typed, SyntaxError> {
        let left = self.parse_additive()?;

        if matches!(self.peek_kind(), Some(TokenKind::Ident(word)) if word == "matches") {
            self.advance();
            return self.parse_matches(left);
        }

        let Some((op, width)) = self.comparison_op() else {
            return Ok(left);
        };
        self.pos += width;

        let right = self.parse_additive()?;
        Self::binary(op, left, right)
    }

    fn parse_matches(&mut self, subject: Typed) -> Result<Typed, SyntaxError> {
        let (pattern, pattern_ty) = self.parse_additive()?;

        if subject.1 != Type::String || pattern_ty != Type::String {
            return Err(SyntaxError::OperandMismatch {
                op: "matches",
                left: subject.1,
                right: pattern_ty,
            });
        }

        let pattern = match pattern {
            Expr::Literal(Value::String(text)) => {
                let regex = Regex::new(&text).map_err(|e| SyntaxError::InvalidRegex {
                    pattern: text.clone(),
                    reason: e.to_string(),
                })?;
                Pattern::Static(regex)
            }
            other => Pattern::Dynamic(Box::new(other)),
        };

        Ok((
            Expr::Matches {
                subject: Box::new(subject.0),
                pattern,
            },
            Type::Bool,
        ))
    }

    fn parse_additive(&mut self) -> Result<Typed, SyntaxError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Plus) => BinaryOp::Add,
                Some(TokenKind::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Self::binary(op, left, right)?;
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Typed, SyntaxError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Star) => BinaryOp::Mul,
                Some(TokenKind::Slash) => BinaryOp::Div,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Self::binary(op, left, right)?;
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Typed, SyntaxError> {
        match self.peek_kind() {
            Some(TokenKind::Not) => {
                self.advance();
                let (operand, ty) = self.parse_unary()?;
                if ty != Type::Bool {
                    return Err(SyntaxError::UnaryMismatch { op: "!", operand: ty });
                }
                Ok((Expr::Not(Box::new(operand)), Type::Bool))
            }
            Some(TokenKind::Minus) => {
                self.advance();
                let (operand, ty) = self.parse_unary()?;
                if ty != Type::Number {
                    return Err(SyntaxError::UnaryMismatch { op: "-", operand: ty });
                }
                match operand {
                    Expr::Literal(Value::Number(n)) => {
                        Ok((Expr::Literal(Value::Number(-n)), Type::Number))
                    }
                    other => Ok((Expr::Negate(Box::new(other)), Type::Number)),
                }
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<Typed, SyntaxError> {
        let Some(token) = self.advance() else {
            return Err(SyntaxError::UnexpectedEnd { expected: "operand" });
        };

        match token.kind {
            TokenKind::Number(n) => Ok((Expr::Literal(Value::Number(n)), Type::Number)),
            TokenKind::Str(s) => Ok((Expr::Literal(Value::String(s)), Type::String)),
            TokenKind::LParen => {
                let inner = self.parse_or()?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(inner)
            }
            TokenKind::LBracket => self.parse_list(),
            TokenKind::Ident(name) => match name.as_str() {
                "true" => Ok((Expr::Literal(Value::Bool(true)), Type::Bool)),
                "false" => Ok((Expr::Literal(Value::Bool(false)), Type::Bool)),
                _ if matches!(self.peek_kind(), Some(TokenKind::LParen)) => {
                    self.advance();
                    self.parse_call(&name)
                }
                _ => {
                    let field = Field::from_name(&name)
                        .ok_or(SyntaxError::UnknownIdentifier(name.clone()))?;
                    Ok((Expr::Field(field), field.ty()))
                }
            },
            other => Err(SyntaxError::UnexpectedToken {
                pos: token.pos,
                found: other.describe(),
                expected: "operand",
            }),
        }
    }

    fn parse_list(&mut self) -> Result<Typed, SyntaxError> {
        let mut items = Vec::new();

        loop {
            if matches!(self.peek_kind(), Some(TokenKind::RBracket)) {
                self.advance();
                break;
            }

            let (item, ty) = self.parse_or()?;
            if ty == Type::List {
                return Err(SyntaxError::OperandMismatch {
                    op: "[]",
                    left: Type::List,
                    right: ty,
                });
            }
            items.push(item);

            match self.advance() {
                Some(Token { kind: TokenKind::Comma, .. }) => continue,
                Some(Token { kind: TokenKind::RBracket, .. }) => break,
                Some(token) => {
                    return Err(SyntaxError::UnexpectedToken {
                        pos: token.pos,
                        found: token.kind.describe(),
                        expected: "',' or ']'",
                    })
                }
                None => return Err(SyntaxError::UnexpectedEnd { expected: "']'" }),
            }
        }

        Ok((Expr::List(items), Type::List))
    }

    fn parse_call(&mut self, name: &str) -> Result<Typed, SyntaxError> {
        let function =
            Function::from_name(name).ok_or(SyntaxError::UnknownFunction(name.to_string()))?;

        let mut args: Vec<Typed> = Vec::new();
        if matches!(self.peek_kind(), Some(TokenKind::RParen)) {
            self.advance();
        } else {
            loop {
                args.push(self.parse_or()?);
                match self.advance() {
                    Some(Token { kind: TokenKind::Comma, .. }) => continue,
                    Some(Token { kind: TokenKind::RParen, .. }) => break,
                    Some(token) => {
                        return Err(SyntaxError::UnexpectedToken {
                            pos: token.pos,
                            found: token.kind.describe(),
                            expected: "',' or ')'",
                        })
                    }
                    None => return Err(SyntaxError::UnexpectedEnd { expected: "')'" }),
                }
            }
        }

        check_call(function, &args)?;

        Ok((
            Expr::Call(function, args.into_iter().map(|(expr, _)| expr).collect()),
            function.return_type(),
        ))
    }
}

fn check_call(function: Function, args: &[Typed]) -> Result<(), SyntaxError> {
    let arity = |expected: &'static str, ok: bool| {
        if ok {
            Ok(())
        } else {
            Err(SyntaxError::Arity {
                function: function.name(),
                expected,
                found: args.len(),
            })
        }
    };
    let all_strings = || {
        for (_, ty) in args {
            if *ty != Type::String {
                return Err(SyntaxError::ArgumentType {
                    function: function.name(),
                    expected: Type::String,
                    found: *ty,
                });
            }
        }
        Ok(())
    };

    match function {
        Function::IsUnregistered | Function::FreeSpaceGb => arity("0", args.is_empty()),
        Function::HasTag | Function::Lower => {
            arity("1", args.len() == 1)?;
            all_strings()
        }
        Function::HasAllTags | Function::HasAnyTag => {
            arity("at least 1", !args.is_empty())?;
            all_strings()
        }
        Function::Len => {
            arity("1", args.len() == 1)?;
            match args[0].1 {
                Type::String | Type::List => Ok(()),
                found => Err(SyntaxError::ArgumentType {
                    function: function.name(),
                    expected: Type::List,
                    found,
                }),
            }
        }
    }
}

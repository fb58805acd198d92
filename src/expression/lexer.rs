use crate::core::error::SyntaxError;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    Number(f64),
    Str(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Or,
    And,
    Not,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
}

impl TokenKind {
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Ident(name) => format!("identifier {:?}", name),
            TokenKind::Number(n) => format!("number {}", n),
            TokenKind::Str(s) => format!("string {:?}", s),
            TokenKind::LParen => "'('".to_string(),
            TokenKind::RParen => "')'".to_string(),
            TokenKind::LBracket => "'['".to_string(),
            TokenKind::RBracket => "']'".to_string(),
            TokenKind::Comma => "','".to_string(),
            TokenKind::Or => "'||'".to_string(),
            TokenKind::And => "'&&'".to_string(),
            TokenKind::Not => "'!'".to_string(),
            TokenKind::Eq => "'=='".to_string(),
            TokenKind::Ne => "'!='".to_string(),
            TokenKind::Lt => "'<'".to_string(),
            TokenKind::Le => "'<='".to_string(),
            TokenKind::Gt => "'>'".to_string(),
            TokenKind::Ge => "'>='".to_string(),
            TokenKind::Plus => "'+'".to_string(),
            TokenKind::Minus => "'-'".to_string(),
            TokenKind::Star => "'*'".to_string(),
            TokenKind::Slash => "'/'".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte offset of the token in the rule text
    pub pos: usize,
}

/// Split rule text into tokens
pub fn tokenize(input: &str) -> Result<Vec<Token>, SyntaxError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(pos, ch)) = chars.peek() {
        if ch.is_whitespace() {
            chars.next();
            continue;
        }

        // two character operators first
        let mut two = |next: char, kind: TokenKind| -> Option<Token> {
            let mut lookahead = chars.clone();
            lookahead.next();
            match lookahead.peek() {
                Some(&(_, c)) if c == next => {
                    chars.next();
                    chars.next();
                    Some(Token { kind, pos })
                }
                _ => None,
            }
        };

        let double = match ch {
            '|' => two('|', TokenKind::Or),
            '&' => two('&', TokenKind::And),
            '=' => two('=', TokenKind::Eq),
            '!' => two('=', TokenKind::Ne),
            '<' => two('=', TokenKind::Le),
            '>' => two('=', TokenKind::Ge),
            _ => None,
        };
        if let Some(token) = double {
            tokens.push(token);
            continue;
        }

        let single = match ch {
            '(' => Some(TokenKind::LParen),
            ')' => Some(TokenKind::RParen),
            '[' => Some(TokenKind::LBracket),
            ']' => Some(TokenKind::RBracket),
            ',' => Some(TokenKind::Comma),
            '!' => Some(TokenKind::Not),
            '<' => Some(TokenKind::Lt),
            '>' => Some(TokenKind::Gt),
            '+' => Some(TokenKind::Plus),
            '-' => Some(TokenKind::Minus),
            '*' => Some(TokenKind::Star),
            '/' => Some(TokenKind::Slash),
            _ => None,
        };
        if let Some(kind) = single {
            chars.next();
            tokens.push(Token { kind, pos });
            continue;
        }

        if ch == '"' || ch == '\'' {
            chars.next();
            let mut value = String::new();
            let mut closed = false;
            while let Some((_, c)) = chars.next() {
                match c {
                    '\\' => match chars.next() {
                        Some((_, 'n')) => value.push('\n'),
                        Some((_, 't')) => value.push('\t'),
                        Some((_, escaped)) => value.push(escaped),
                        None => break,
                    },
                    c if c == ch => {
                        closed = true;
                        break;
                    }
                    c => value.push(c),
                }
            }
            if !closed {
                return Err(SyntaxError::UnterminatedString { pos });
            }
            tokens.push(Token {
                kind: TokenKind::Str(value),
                pos,
            });
            continue;
        }

        if ch.is_ascii_digit() {
            let mut text = String::new();
            while let Some(&(_, c)) = chars.peek() {
                if c.is_ascii_digit() || c == '.' || c == '_' {
                    if c != '_' {
                        text.push(c);
                    }
                    chars.next();
                } else {
                    break;
                }
            }
            let number = text
                .parse::<f64>()
                .map_err(|_| SyntaxError::InvalidNumber { pos, text: text.clone() })?;
            tokens.push(Token {
                kind: TokenKind::Number(number),
                pos,
            });
            continue;
        }

        if ch.is_alphabetic() || ch == '_' {
            let mut ident = String::new();
            while let Some(&(_, c)) = chars.peek() {
                if c.is_alphanumeric() || c == '_' {
                    ident.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            let kind = match ident.as_str() {
                "or" => TokenKind::Or,
                "and" => TokenKind::And,
                "not" => TokenKind::Not,
                _ => TokenKind::Ident(ident),
            };
            tokens.push(Token { kind, pos });
            continue;
        }

        return Err(SyntaxError::UnexpectedChar { pos, ch });
    }

    Ok(tokens)
}

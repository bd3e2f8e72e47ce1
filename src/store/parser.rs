//! Parser for the rule store source format.
//!
//! The format is a small Prolog-like text encoding:
//!
//! ```text
//! % comment to end of line
//! :- section(cadences).
//! :- declare(cadence, 3).
//! :- weights(tension, 0.6).
//! cadence(dominant, tonic, authentic).
//! resolves(X, Y) :- cadence(X, Y, _Kind).
//! ```
//!
//! Atoms are lowercase-initial identifiers, variables are uppercase- or
//! underscore-initial, lists use `[a, b, c]`. Every item ends with `.`.
//! Floats are only valid inside `weights` directives. All errors carry the
//! 1-based line and column where the offending token starts.

use crate::error::LoadError;
use crate::term::Term;

/// A parsed top-level item.
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    /// `:- declare(name, arity).`
    Declare {
        name: String,
        arity: usize,
        line: usize,
    },
    /// `:- weights(key, value).`
    Weights { key: String, value: f64, line: usize },
    /// `:- section(name).`
    Section { name: String, line: usize },
    /// A fact or rule.
    Clause {
        head: Term,
        body: Vec<Term>,
        line: usize,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Atom(String),
    Var(String),
    Int(i64),
    Float(f64),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Turnstile,
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    line: usize,
    column: usize,
}

impl Token {
    fn describe(&self) -> String {
        match &self.kind {
            TokenKind::Atom(s) => format!("atom '{s}'"),
            TokenKind::Var(s) => format!("variable '{s}'"),
            TokenKind::Int(v) => format!("integer {v}"),
            TokenKind::Float(v) => format!("float {v}"),
            TokenKind::LParen => "'('".to_string(),
            TokenKind::RParen => "')'".to_string(),
            TokenKind::LBracket => "'['".to_string(),
            TokenKind::RBracket => "']'".to_string(),
            TokenKind::Comma => "','".to_string(),
            TokenKind::Dot => "'.'".to_string(),
            TokenKind::Turnstile => "':-'".to_string(),
        }
    }
}

struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src: src.as_bytes(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.pos += 1;
        if c == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_ascii_whitespace() => {
                    self.bump();
                }
                Some(b'%') => {
                    while let Some(c) = self.peek() {
                        if c == b'\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                _ => break,
            }
        }
    }

    fn tokenize(mut self) -> Result<Vec<Token>, LoadError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia();
            let (line, column) = (self.line, self.column);
            let Some(c) = self.peek() else {
                break;
            };
            let kind = match c {
                b'(' => {
                    self.bump();
                    TokenKind::LParen
                }
                b')' => {
                    self.bump();
                    TokenKind::RParen
                }
                b'[' => {
                    self.bump();
                    TokenKind::LBracket
                }
                b']' => {
                    self.bump();
                    TokenKind::RBracket
                }
                b',' => {
                    self.bump();
                    TokenKind::Comma
                }
                b'.' => {
                    self.bump();
                    TokenKind::Dot
                }
                b':' => {
                    self.bump();
                    if self.peek() == Some(b'-') {
                        self.bump();
                        TokenKind::Turnstile
                    } else {
                        return Err(LoadError::new("expected '-' after ':'", line, column));
                    }
                }
                b'-' | b'0'..=b'9' => self.lex_number(line, column)?,
                b'a'..=b'z' => {
                    let word = self.lex_word();
                    TokenKind::Atom(word)
                }
                b'A'..=b'Z' | b'_' => {
                    let word = self.lex_word();
                    TokenKind::Var(word)
                }
                other => {
                    return Err(LoadError::new(
                        format!("unexpected character '{}'", other as char),
                        line,
                        column,
                    ));
                }
            };
            tokens.push(Token { kind, line, column });
        }
        Ok(tokens)
    }

    fn lex_word(&mut self) -> String {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == b'_' {
                self.bump();
            } else {
                break;
            }
        }
        String::from_utf8_lossy(&self.src[start..self.pos]).into_owned()
    }

    fn lex_number(&mut self, line: usize, column: usize) -> Result<TokenKind, LoadError> {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.bump();
            if !matches!(self.peek(), Some(b'0'..=b'9')) {
                return Err(LoadError::new("expected digit after '-'", line, column));
            }
        }
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.bump();
        }
        // Disambiguate a decimal point from the end-of-item dot: only consume
        // the '.' when a digit follows it.
        let mut is_float = false;
        if self.peek() == Some(b'.') && matches!(self.src.get(self.pos + 1), Some(b'0'..=b'9')) {
            is_float = true;
            self.bump();
            while matches!(self.peek(), Some(b'0'..=b'9')) {
                self.bump();
            }
        }
        let text = String::from_utf8_lossy(&self.src[start..self.pos]).into_owned();
        if is_float {
            text.parse::<f64>()
                .map(TokenKind::Float)
                .map_err(|_| LoadError::new(format!("invalid float '{text}'"), line, column))
        } else {
            text.parse::<i64>()
                .map(TokenKind::Int)
                .map_err(|_| LoadError::new(format!("integer '{text}' out of range"), line, column))
        }
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    end_line: usize,
    end_column: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn err_here(&self, reason: impl Into<String>) -> LoadError {
        match self.peek() {
            Some(t) => LoadError::new(reason, t.line, t.column),
            None => LoadError::new(reason, self.end_line, self.end_column),
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<Token, LoadError> {
        match self.peek() {
            Some(t) if t.kind == *kind => Ok(self.bump().unwrap_or_else(|| unreachable!())),
            Some(t) => Err(LoadError::new(
                format!("expected {what}, found {}", t.describe()),
                t.line,
                t.column,
            )),
            None => Err(LoadError::new(
                format!("expected {what}, found end of input"),
                self.end_line,
                self.end_column,
            )),
        }
    }

    fn parse_items(&mut self) -> Result<Vec<Item>, LoadError> {
        let mut items = Vec::new();
        while self.peek().is_some() {
            items.push(self.parse_item()?);
        }
        Ok(items)
    }

    fn parse_item(&mut self) -> Result<Item, LoadError> {
        if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::Turnstile)) {
            let turnstile = self.bump().ok_or_else(|| self.err_here("expected ':-'"))?;
            let item = self.parse_directive(turnstile.line)?;
            self.expect(&TokenKind::Dot, "'.'")?;
            return Ok(item);
        }

        let head_token_line = self.peek().map_or(self.end_line, |t| t.line);
        let head = self.parse_term()?;
        let mut body = Vec::new();
        if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::Turnstile)) {
            self.bump();
            loop {
                body.push(self.parse_term()?);
                if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::Comma)) {
                    self.bump();
                } else {
                    break;
                }
            }
        }
        self.expect(&TokenKind::Dot, "'.'")?;
        Ok(Item::Clause {
            head,
            body,
            line: head_token_line,
        })
    }

    fn parse_directive(&mut self, line: usize) -> Result<Item, LoadError> {
        let name_tok = self
            .bump()
            .ok_or_else(|| self.err_here("expected directive name"))?;
        let TokenKind::Atom(name) = &name_tok.kind else {
            return Err(LoadError::new(
                format!("expected directive name, found {}", name_tok.describe()),
                name_tok.line,
                name_tok.column,
            ));
        };
        match name.as_str() {
            "declare" => {
                self.expect(&TokenKind::LParen, "'('")?;
                let pred = self.parse_atom_arg("predicate name")?;
                self.expect(&TokenKind::Comma, "','")?;
                let arity_tok = self
                    .bump()
                    .ok_or_else(|| self.err_here("expected arity"))?;
                let TokenKind::Int(arity) = arity_tok.kind else {
                    return Err(LoadError::new(
                        format!("expected arity integer, found {}", arity_tok.describe()),
                        arity_tok.line,
                        arity_tok.column,
                    ));
                };
                if arity < 0 || arity > 32 {
                    return Err(LoadError::new(
                        format!("arity {arity} out of range 0..=32"),
                        arity_tok.line,
                        arity_tok.column,
                    ));
                }
                self.expect(&TokenKind::RParen, "')'")?;
                Ok(Item::Declare {
                    name: pred,
                    #[allow(clippy::cast_sign_loss)]
                    arity: arity as usize,
                    line,
                })
            }
            "weights" => {
                self.expect(&TokenKind::LParen, "'('")?;
                let key = self.parse_atom_arg("weight key")?;
                self.expect(&TokenKind::Comma, "','")?;
                let value_tok = self
                    .bump()
                    .ok_or_else(|| self.err_here("expected weight value"))?;
                let value = match value_tok.kind {
                    TokenKind::Float(v) => v,
                    #[allow(clippy::cast_precision_loss)]
                    TokenKind::Int(v) => v as f64,
                    _ => {
                        return Err(LoadError::new(
                            format!("expected weight value, found {}", value_tok.describe()),
                            value_tok.line,
                            value_tok.column,
                        ));
                    }
                };
                if !(0.0..=1.0).contains(&value) {
                    return Err(LoadError::new(
                        format!("weight {value} out of range [0, 1]"),
                        value_tok.line,
                        value_tok.column,
                    ));
                }
                self.expect(&TokenKind::RParen, "')'")?;
                Ok(Item::Weights { key, value, line })
            }
            "section" => {
                self.expect(&TokenKind::LParen, "'('")?;
                let section = self.parse_atom_arg("section name")?;
                self.expect(&TokenKind::RParen, "')'")?;
                Ok(Item::Section {
                    name: section,
                    line,
                })
            }
            other => Err(LoadError::new(
                format!("unknown directive '{other}'"),
                name_tok.line,
                name_tok.column,
            )),
        }
    }

    fn parse_atom_arg(&mut self, what: &str) -> Result<String, LoadError> {
        let tok = self
            .bump()
            .ok_or_else(|| self.err_here(format!("expected {what}")))?;
        match tok.kind {
            TokenKind::Atom(s) => Ok(s),
            _ => Err(LoadError::new(
                format!("expected {what}, found {}", tok.describe()),
                tok.line,
                tok.column,
            )),
        }
    }

    fn parse_term(&mut self) -> Result<Term, LoadError> {
        let tok = self.bump().ok_or_else(|| self.err_here("expected term"))?;
        match tok.kind {
            TokenKind::Atom(name) => {
                if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::LParen)) {
                    self.bump();
                    let mut args = Vec::new();
                    loop {
                        args.push(self.parse_term()?);
                        match self.peek().map(|t| &t.kind) {
                            Some(TokenKind::Comma) => {
                                self.bump();
                            }
                            Some(TokenKind::RParen) => {
                                self.bump();
                                break;
                            }
                            _ => return Err(self.err_here("expected ',' or ')' in argument list")),
                        }
                    }
                    Ok(Term::Compound(name, args))
                } else {
                    Ok(Term::Atom(name))
                }
            }
            TokenKind::Var(name) => Ok(Term::Var(name)),
            TokenKind::Int(value) => Ok(Term::Int(value)),
            TokenKind::Float(value) => Err(LoadError::new(
                format!("float {value} is only allowed in weights directives"),
                tok.line,
                tok.column,
            )),
            TokenKind::LBracket => {
                let mut items = Vec::new();
                if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::RBracket)) {
                    self.bump();
                    return Ok(Term::List(items));
                }
                loop {
                    items.push(self.parse_term()?);
                    match self.peek().map(|t| &t.kind) {
                        Some(TokenKind::Comma) => {
                            self.bump();
                        }
                        Some(TokenKind::RBracket) => {
                            self.bump();
                            break;
                        }
                        _ => return Err(self.err_here("expected ',' or ']' in list")),
                    }
                }
                Ok(Term::List(items))
            }
            other => Err(LoadError::new(
                format!(
                    "expected term, found {}",
                    Token {
                        kind: other,
                        line: tok.line,
                        column: tok.column
                    }
                    .describe()
                ),
                tok.line,
                tok.column,
            )),
        }
    }
}

/// Parses a rule store source into top-level items.
pub fn parse_source(source: &str) -> Result<Vec<Item>, LoadError> {
    let end_line = source.lines().count().max(1);
    let end_column = source.lines().last().map_or(1, |l| l.len() + 1);
    let tokens = Lexer::new(source).tokenize()?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        end_line,
        end_column,
    };
    parser.parse_items()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_declarations_facts_and_rules() {
        let src = r"
            % core chord data
            :- declare(chord_tones, 2).
            :- declare(has_third, 1).
            chord_tones(c_major, [c, e, g]).
            has_third(X) :- chord_tones(X, [_R, _T, _F]).
        ";
        let items = parse_source(src).unwrap();
        assert_eq!(items.len(), 4);
        let Item::Clause { head, body, .. } = &items[2] else {
            panic!("expected fact");
        };
        assert_eq!(
            head.to_string(),
            "chord_tones(c_major, [c, e, g])"
        );
        assert!(body.is_empty());
        let Item::Clause { body, .. } = &items[3] else {
            panic!("expected rule");
        };
        assert_eq!(body.len(), 1);
    }

    #[test]
    fn parses_weights_and_sections() {
        let src = ":- section(scoring).\n:- weights(tension, 0.6).\n:- weights(voice_leading, 0.4).";
        let items = parse_source(src).unwrap();
        assert_eq!(
            items[1],
            Item::Weights {
                key: "tension".to_string(),
                value: 0.6,
                line: 2
            }
        );
    }

    #[test]
    fn reports_line_and_column_for_bad_syntax() {
        let err = parse_source("chord_tones(c_major, ).").unwrap_err();
        assert_eq!(err.line, 1);
        assert_eq!(err.column, 22);
        assert!(err.reason.contains("expected term"));
    }

    #[test]
    fn missing_dot_is_an_error() {
        let err = parse_source(":- declare(m, 1)").unwrap_err();
        assert!(err.reason.contains("'.'"));
    }

    #[test]
    fn float_outside_weights_is_rejected() {
        let err = parse_source(":- declare(t, 1).\nt(0.5).").unwrap_err();
        assert_eq!(err.line, 2);
        assert!(err.reason.contains("weights"));
    }

    #[test]
    fn negative_integers_and_empty_lists() {
        let src = ":- declare(offset, 2).\noffset(down, -3).\noffset(none, 0).\n:- declare(empty, 1).\nempty([]).";
        let items = parse_source(src).unwrap();
        let Item::Clause { head, .. } = &items[1] else {
            panic!("expected fact");
        };
        assert_eq!(head.to_string(), "offset(down, -3)");
        let Item::Clause { head, .. } = &items[4] else {
            panic!("expected fact");
        };
        assert_eq!(head.to_string(), "empty([])");
    }

    #[test]
    fn unknown_directive_is_rejected() {
        let err = parse_source(":- import(foo).").unwrap_err();
        assert!(err.reason.contains("unknown directive"));
    }

    #[test]
    fn weight_out_of_range_is_rejected() {
        let err = parse_source(":- weights(tension, 1.5).").unwrap_err();
        assert!(err.reason.contains("out of range"));
    }
}

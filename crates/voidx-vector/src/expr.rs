//! Parser and evaluator for the boolean filter subset the store emits:
//! `==`, `!=`, `like`, `in [..]`, `&&`, `||`, parentheses and the literals
//! `true` / `false`.

use voidx_core::{Error, Result};

use crate::rows::{FieldValue, Row};

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Const(bool),
    Eq { field: String, value: Literal },
    Ne { field: String, value: Literal },
    Like { field: String, pattern: String },
    In { field: String, values: Vec<Literal> },
    And(Vec<Expr>),
    Or(Vec<Expr>),
}

impl Expr {
    pub fn eval(&self, row: &Row) -> bool {
        match self {
            Expr::Const(b) => *b,
            Expr::Eq { field, value } => literal_eq(row.get(field), value) == Some(true),
            // null never satisfies a comparison
            Expr::Ne { field, value } => literal_eq(row.get(field), value) == Some(false),
            Expr::Like { field, pattern } => match row.get(field) {
                Some(FieldValue::Text(s)) => like_match(s, pattern),
                _ => false,
            },
            Expr::In { field, values } => {
                values.iter().any(|v| literal_eq(row.get(field), v) == Some(true))
            }
            Expr::And(parts) => parts.iter().all(|p| p.eval(row)),
            Expr::Or(parts) => parts.iter().any(|p| p.eval(row)),
        }
    }
}

/// `None` when the column is missing or null.
fn literal_eq(value: Option<&FieldValue>, lit: &Literal) -> Option<bool> {
    let value = value?;
    let eq = match (value, lit) {
        (FieldValue::Null, _) => return None,
        (FieldValue::Int64(a), Literal::Int(b)) => a == b,
        (FieldValue::Int64(a), Literal::Float(b)) => (*a as f64) == *b,
        (FieldValue::Text(a), Literal::Str(b)) => a == b,
        _ => false,
    };
    Some(eq)
}

/// SQL-style wildcard match: `%` is any run, `_` one character.
pub fn like_match(text: &str, pattern: &str) -> bool {
    let t: Vec<char> = text.chars().collect();
    let p: Vec<char> = pattern.chars().collect();
    let (mut ti, mut pi) = (0usize, 0usize);
    let mut backtrack: Option<(usize, usize)> = None;
    while ti < t.len() {
        if pi < p.len() && (p[pi] == '_' || (p[pi] != '%' && p[pi] == t[ti])) {
            ti += 1;
            pi += 1;
        } else if pi < p.len() && p[pi] == '%' {
            backtrack = Some((pi, ti));
            pi += 1;
        } else if let Some((bp, bt)) = backtrack {
            pi = bp + 1;
            ti = bt + 1;
            backtrack = Some((bp, bt + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|&c| c == '%')
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    EqEq,
    NotEq,
    AndAnd,
    OrOr,
    Like,
    In,
    True,
    False,
}

fn lex(src: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = src.chars().collect();
    let mut out = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' | ')' | '[' | ']' | ',' => {
                out.push(match c {
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    '[' => Token::LBracket,
                    ']' => Token::RBracket,
                    _ => Token::Comma,
                });
                i += 1;
            }
            '=' | '!' | '&' | '|' => {
                let token = match (c, chars.get(i + 1)) {
                    ('=', Some('=')) => Token::EqEq,
                    ('!', Some('=')) => Token::NotEq,
                    ('&', Some('&')) => Token::AndAnd,
                    ('|', Some('|')) => Token::OrOr,
                    _ => return Err(parse_error(src, &format!("unexpected character '{c}'"))),
                };
                out.push(token);
                i += 2;
            }
            '"' | '\'' => {
                let quote = c;
                let mut s = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err(parse_error(src, "unterminated string literal")),
                        Some('\\') => {
                            let escaped = chars
                                .get(i + 1)
                                .ok_or_else(|| parse_error(src, "dangling escape"))?;
                            s.push(*escaped);
                            i += 2;
                        }
                        Some(&ch) if ch == quote => {
                            i += 1;
                            break;
                        }
                        Some(&ch) => {
                            s.push(ch);
                            i += 1;
                        }
                    }
                }
                out.push(Token::Str(s));
            }
            c if c.is_ascii_digit()
                || (c == '-' && chars.get(i + 1).is_some_and(|d| d.is_ascii_digit())) =>
            {
                let start = i;
                i += 1;
                let mut is_float = false;
                while let Some(&d) = chars.get(i) {
                    if d.is_ascii_digit() {
                        i += 1;
                    } else if d == '.' || d == 'e' || d == 'E' {
                        is_float = true;
                        i += 1;
                        if matches!(chars.get(i), Some('+') | Some('-')) && (d == 'e' || d == 'E') {
                            i += 1;
                        }
                    } else {
                        break;
                    }
                }
                let text: String = chars[start..i].iter().collect();
                if is_float {
                    let v = text
                        .parse::<f64>()
                        .map_err(|_| parse_error(src, &format!("bad number '{text}'")))?;
                    out.push(Token::Float(v));
                } else {
                    let v = text
                        .parse::<i64>()
                        .map_err(|_| parse_error(src, &format!("bad integer '{text}'")))?;
                    out.push(Token::Int(v));
                }
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while chars.get(i).is_some_and(|d| d.is_alphanumeric() || *d == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                out.push(match word.as_str() {
                    "like" | "LIKE" => Token::Like,
                    "in" | "IN" => Token::In,
                    "true" | "TRUE" => Token::True,
                    "false" | "FALSE" => Token::False,
                    _ => Token::Ident(word),
                });
            }
            other => return Err(parse_error(src, &format!("unexpected character '{other}'"))),
        }
    }
    Ok(out)
}

fn parse_error(src: &str, msg: &str) -> Error {
    Error::invalid_arg(format!("invalid filter expression `{src}`: {msg}"))
}

struct Parser<'a> {
    src: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn expect(&mut self, want: Token) -> Result<()> {
        match self.next() {
            Some(t) if t == want => Ok(()),
            other => Err(parse_error(self.src, &format!("expected {want:?}, found {other:?}"))),
        }
    }

    fn or_expr(&mut self) -> Result<Expr> {
        let mut parts = vec![self.and_expr()?];
        while self.peek() == Some(&Token::OrOr) {
            self.pos += 1;
            parts.push(self.and_expr()?);
        }
        Ok(if parts.len() == 1 { parts.remove(0) } else { Expr::Or(parts) })
    }

    fn and_expr(&mut self) -> Result<Expr> {
        let mut parts = vec![self.primary()?];
        while self.peek() == Some(&Token::AndAnd) {
            self.pos += 1;
            parts.push(self.primary()?);
        }
        Ok(if parts.len() == 1 { parts.remove(0) } else { Expr::And(parts) })
    }

    fn primary(&mut self) -> Result<Expr> {
        match self.next() {
            Some(Token::LParen) => {
                let inner = self.or_expr()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::True) => Ok(Expr::Const(true)),
            Some(Token::False) => Ok(Expr::Const(false)),
            Some(Token::Ident(field)) => match self.next() {
                Some(Token::EqEq) => Ok(Expr::Eq { field, value: self.literal()? }),
                Some(Token::NotEq) => Ok(Expr::Ne { field, value: self.literal()? }),
                Some(Token::Like) => match self.next() {
                    Some(Token::Str(pattern)) => Ok(Expr::Like { field, pattern }),
                    other => {
                        let msg = format!("like expects a string, found {other:?}");
                        Err(parse_error(self.src, &msg))
                    }
                },
                Some(Token::In) => {
                    self.expect(Token::LBracket)?;
                    let mut values = Vec::new();
                    if self.peek() == Some(&Token::RBracket) {
                        self.pos += 1;
                        return Ok(Expr::In { field, values });
                    }
                    loop {
                        values.push(self.literal()?);
                        match self.next() {
                            Some(Token::Comma) => continue,
                            Some(Token::RBracket) => break,
                            other => {
                                let msg = format!("expected ',' or ']', found {other:?}");
                                return Err(parse_error(self.src, &msg));
                            }
                        }
                    }
                    Ok(Expr::In { field, values })
                }
                other => {
                    let msg = format!("expected operator after '{field}', found {other:?}");
                    Err(parse_error(self.src, &msg))
                }
            },
            other => Err(parse_error(self.src, &format!("unexpected token {other:?}"))),
        }
    }

    fn literal(&mut self) -> Result<Literal> {
        match self.next() {
            Some(Token::Int(v)) => Ok(Literal::Int(v)),
            Some(Token::Float(v)) => Ok(Literal::Float(v)),
            Some(Token::Str(s)) => Ok(Literal::Str(s)),
            Some(Token::True) => Ok(Literal::Bool(true)),
            Some(Token::False) => Ok(Literal::Bool(false)),
            other => Err(parse_error(self.src, &format!("expected a literal, found {other:?}"))),
        }
    }
}

/// Parses a filter. An empty or blank string means "match everything".
pub fn parse(src: &str) -> Result<Expr> {
    let tokens = lex(src)?;
    if tokens.is_empty() {
        return Ok(Expr::Const(true));
    }
    let mut parser = Parser { src, tokens, pos: 0 };
    let expr = parser.or_expr()?;
    if parser.pos < parser.tokens.len() {
        return Err(parse_error(src, "trailing tokens"));
    }
    Ok(expr)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, FieldValue)]) -> Row {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn parses_nested_groups() {
        let e = parse(r#"( a == 1 && ( b like "x%" || c in ["p", "q"] ) )"#).unwrap();
        let r = row(&[
            ("a", FieldValue::Int64(1)),
            ("b", FieldValue::Text("y".into())),
            ("c", FieldValue::Text("q".into())),
        ]);
        assert!(e.eval(&r));
        let r = row(&[("a", FieldValue::Int64(2)), ("c", FieldValue::Text("q".into()))]);
        assert!(!e.eval(&r));
    }

    #[test]
    fn string_escapes_round_trip() {
        let e = parse(r#"t == "say \"hi\" \\ ok""#).unwrap();
        let expected = Literal::Str(r#"say "hi" \ ok"#.into());
        assert_eq!(e, Expr::Eq { field: "t".into(), value: expected });
    }

    #[test]
    fn like_wildcards() {
        assert!(like_match("document", "doc%"));
        assert!(like_match("document", "%ume%"));
        assert!(like_match("abc", "a_c"));
        assert!(!like_match("abcd", "a_c"));
        assert!(like_match("", "%"));
        assert!(!like_match("abc", "%d"));
    }

    #[test]
    fn null_never_matches() {
        let r = row(&[("creator_id", FieldValue::Null)]);
        assert!(!parse("creator_id == 1").unwrap().eval(&r));
        assert!(!parse("creator_id != 1").unwrap().eval(&r));
        assert!(!parse("missing in [1]").unwrap().eval(&r));
    }

    #[test]
    fn constants_and_negative_numbers() {
        assert_eq!(parse("true").unwrap(), Expr::Const(true));
        assert_eq!(parse("  ").unwrap(), Expr::Const(true));
        let e = parse("x == -3").unwrap();
        assert!(e.eval(&row(&[("x", FieldValue::Int64(-3))])));
        assert!(parse("x == ").is_err());
        assert!(parse("x == 1 y").is_err());
    }
}

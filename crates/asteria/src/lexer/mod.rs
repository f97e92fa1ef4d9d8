//! The token stream.
//!
//! [`TokenStream::reload`] lets a single `TokenStream` be reused across
//! several top-level compiles rather than
//! allocating a fresh one per call. [`RecursionGuard`] is the nesting-depth
//! sentry the parser threads through recursive-descent calls; it is housed
//! here because both the lexer (nested string interpolation, if ever added)
//! and the parser need the same bound.

pub mod token;

use std::rc::Rc;

use crate::{
    error::{CompileError, CompileStatus, SourceLoc},
    options::CompileOptions,
    value::Rstr,
};

pub use token::{Keyword, Punct, Token, TokenKind};

/// Maximum recursive-descent depth before the parser gives up
/// nesting-depth guard. Chosen generously above any hand-written script's
/// plausible nesting while still bounding the native call stack.
pub const MAX_RECURSION_DEPTH: u32 = 512;

/// RAII nesting-depth counter. `enter` returns `Err` once the configured
/// limit is exceeded; dropping a [`RecursionGuard`] decrements the shared
/// counter automatically so a bail-out via `?` can never leave it stuck.
pub struct RecursionGuard<'a> {
    depth: &'a std::cell::Cell<u32>,
}

impl<'a> RecursionGuard<'a> {
    pub fn enter(depth: &'a std::cell::Cell<u32>, loc: &SourceLoc, status: CompileStatus) -> Result<Self, CompileError> {
        let next = depth.get() + 1;
        if next > MAX_RECURSION_DEPTH {
            return Err(CompileError::new(status, loc.clone()));
        }
        depth.set(next);
        Ok(Self { depth })
    }
}

impl Drop for RecursionGuard<'_> {
    fn drop(&mut self) {
        self.depth.set(self.depth.get() - 1);
    }
}

/// A lexed, peekable stream of [`Token`]s.
#[derive(Debug, Default)]
pub struct TokenStream {
    tokens: std::collections::VecDeque<Token>,
}

impl TokenStream {
    /// Tokenizes `source`, replacing whatever this stream previously held.
    pub fn reload(&mut self, source: &str, file: &Rstr, options: &CompileOptions) -> Result<(), CompileError> {
        self.tokens = tokenize(source, file, options)?;
        Ok(())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    #[must_use]
    pub fn peek(&self) -> Option<&Token> {
        self.tokens.front()
    }

    #[must_use]
    pub fn peek_nth(&self, n: usize) -> Option<&Token> {
        self.tokens.get(n)
    }

    pub fn shift(&mut self) -> Option<Token> {
        self.tokens.pop_front()
    }
}

struct Cursor<'s> {
    source: &'s str,
    bytes: &'s [u8],
    pos: usize,
    line: u32,
    column: u32,
    file: Rstr,
}

impl<'s> Cursor<'s> {
    fn loc(&self) -> SourceLoc {
        SourceLoc::new(self.file.clone(), self.line, self.column)
    }

    fn peek_byte(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_byte_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek_byte()?;
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(b)
    }

    fn starts_with(&self, s: &str) -> bool {
        self.source[self.pos..].starts_with(s)
    }

    fn advance_by(&mut self, n: usize) {
        for _ in 0..n {
            self.bump();
        }
    }
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_ident_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn tokenize(source: &str, file: &Rstr, options: &CompileOptions) -> Result<std::collections::VecDeque<Token>, CompileError> {
    let mut cursor = Cursor { source, bytes: source.as_bytes(), pos: 0, line: 1, column: 1, file: file.clone() };
    let mut out = std::collections::VecDeque::new();

    loop {
        skip_trivia(&mut cursor);
        let Some(b) = cursor.peek_byte() else { break };
        let loc = cursor.loc();

        if is_ident_start(b) {
            let start = cursor.pos;
            while cursor.peek_byte().is_some_and(is_ident_continue) {
                cursor.bump();
            }
            let text = &cursor.source[start..cursor.pos];
            let keyword = if options.keywords_as_identifiers { None } else { Keyword::from_str(text) };
            let kind = match keyword {
                Some(kw) => TokenKind::Keyword(kw),
                None => TokenKind::Identifier(Rc::from(text)),
            };
            out.push_back(Token { kind, loc });
            continue;
        }

        if b.is_ascii_digit() {
            out.push_back(lex_number(&mut cursor, options, loc)?);
            continue;
        }

        if b == b'"' || (b == b'\'' && options.escapable_single_quotes) {
            out.push_back(lex_string(&mut cursor, b, loc)?);
            continue;
        }

        out.push_back(lex_punct(&mut cursor, loc)?);
    }

    Ok(out)
}

fn skip_trivia(cursor: &mut Cursor<'_>) {
    loop {
        match cursor.peek_byte() {
            Some(b) if b.is_ascii_whitespace() => {
                cursor.bump();
            }
            Some(b'/') if cursor.peek_byte_at(1) == Some(b'/') => {
                while cursor.peek_byte().is_some_and(|b| b != b'\n') {
                    cursor.bump();
                }
            }
            Some(b'/') if cursor.peek_byte_at(1) == Some(b'*') => {
                cursor.advance_by(2);
                while !cursor.starts_with("*/") && cursor.peek_byte().is_some() {
                    cursor.bump();
                }
                cursor.advance_by(2);
            }
            _ => return,
        }
    }
}

fn lex_number(cursor: &mut Cursor<'_>, options: &CompileOptions, loc: SourceLoc) -> Result<Token, CompileError> {
    let start = cursor.pos;
    let mut is_real = false;

    if cursor.peek_byte() == Some(b'0') && matches!(cursor.peek_byte_at(1), Some(b'x' | b'X')) {
        cursor.advance_by(2);
        while cursor.peek_byte().is_some_and(|b| b.is_ascii_hexdigit() || b == b'_') {
            cursor.bump();
        }
        let text: String = cursor.source[start + 2..cursor.pos].chars().filter(|c| *c != '_').collect();
        let value = i64::from_str_radix(&text, 16).map_err(|_| CompileError::new(CompileStatus::IntegerOverflow, loc.clone()))?;
        return Ok(Token { kind: TokenKind::Integer(value), loc });
    }

    while cursor.peek_byte().is_some_and(|b| b.is_ascii_digit() || b == b'_') {
        cursor.bump();
    }
    if cursor.peek_byte() == Some(b'.') && cursor.peek_byte_at(1).is_some_and(|b| b.is_ascii_digit()) {
        is_real = true;
        cursor.bump();
        while cursor.peek_byte().is_some_and(|b| b.is_ascii_digit() || b == b'_') {
            cursor.bump();
        }
    }
    if matches!(cursor.peek_byte(), Some(b'e' | b'E')) {
        is_real = true;
        cursor.bump();
        if matches!(cursor.peek_byte(), Some(b'+' | b'-')) {
            cursor.bump();
        }
        while cursor.peek_byte().is_some_and(|b| b.is_ascii_digit()) {
            cursor.bump();
        }
    }

    let text: String = cursor.source[start..cursor.pos].chars().filter(|c| *c != '_').collect();
    if is_real || options.integers_as_reals {
        let value: f64 = text.parse().map_err(|_| CompileError::new(CompileStatus::InvalidIntegerOrRealLiteral, loc.clone()))?;
        Ok(Token { kind: TokenKind::Real(value), loc })
    } else {
        let value: i64 = text.parse().map_err(|_| CompileError::new(CompileStatus::IntegerOverflow, loc.clone()))?;
        Ok(Token { kind: TokenKind::Integer(value), loc })
    }
}

fn lex_string(cursor: &mut Cursor<'_>, quote: u8, loc: SourceLoc) -> Result<Token, CompileError> {
    cursor.bump();
    let mut text = String::new();
    loop {
        match cursor.peek_byte() {
            None => return Err(CompileError::new(CompileStatus::UnterminatedStringLiteral, loc)),
            Some(b) if b == quote => {
                cursor.bump();
                break;
            }
            Some(b'\\') => {
                cursor.bump();
                let esc_loc = cursor.loc();
                match cursor.bump() {
                    Some(b'n') => text.push('\n'),
                    Some(b't') => text.push('\t'),
                    Some(b'r') => text.push('\r'),
                    Some(b'0') => text.push('\0'),
                    Some(b'\\') => text.push('\\'),
                    Some(b'"') => text.push('"'),
                    Some(b'\'') => text.push('\''),
                    Some(b'u') => {
                        if cursor.peek_byte() != Some(b'{') {
                            return Err(CompileError::new(CompileStatus::InvalidEscapeSequence, esc_loc));
                        }
                        cursor.bump();
                        let digit_start = cursor.pos;
                        while cursor.peek_byte().is_some_and(|b| b != b'}') {
                            cursor.bump();
                        }
                        let digits = &cursor.source[digit_start..cursor.pos];
                        cursor.bump();
                        let code = u32::from_str_radix(digits, 16)
                            .ok()
                            .and_then(char::from_u32)
                            .ok_or_else(|| CompileError::new(CompileStatus::InvalidEscapeSequence, esc_loc.clone()))?;
                        text.push(code);
                    }
                    _ => return Err(CompileError::new(CompileStatus::InvalidEscapeSequence, esc_loc)),
                }
            }
            Some(_) => {
                let start = cursor.pos;
                let ch = cursor.source[start..].chars().next().expect("non-empty");
                cursor.advance_by(ch.len_utf8());
                text.push(ch);
            }
        }
    }
    Ok(Token { kind: TokenKind::String(Rc::from(text.as_str())), loc })
}

macro_rules! punct {
    ($cursor:expr, $loc:expr, $( $lit:literal => $variant:expr ),+ $(,)?) => {{
        $(
            if $cursor.starts_with($lit) {
                $cursor.advance_by($lit.len());
                return Ok(Token { kind: TokenKind::Punct($variant), loc: $loc });
            }
        )+
        return Err(CompileError::new(CompileStatus::UnrecognizedToken, $loc));
    }};
}

fn lex_punct(cursor: &mut Cursor<'_>, loc: SourceLoc) -> Result<Token, CompileError> {
    use Punct::{
        Add, AddAssign, AndAssign, Arrow, ArrayHead, ArrayRandom, ArrayTail, At, BitAnd, BitNot, BitOr, BitXor, Coalesce,
        CoalesceAssign, Colon, Comma, Dec, Div, DivAssign, Dot, Ellipsis, Eq, Ge, Gt, Inc, LBrace, LBracket, LParen, Le, Lt,
        Mod, ModAssign, Mul, MulAssign, Ne, OrAssign, Question, RBrace, RBracket, RParen, Range, Semicolon, Shl, ShlAssign,
        Shr, ShrAssign, Spaceship, Sub, SubAssign, XorAssign,
    };
    punct!(cursor, loc,
        "[^]" => ArrayHead,
        "[$]" => ArrayTail,
        "[?]" => ArrayRandom,
        "<=>" => Spaceship,
        "..." => Ellipsis,
        "??=" => CoalesceAssign,
        "??" => Coalesce,
        ".." => Range,
        "->" => Arrow,
        "++" => Inc,
        "--" => Dec,
        "+=" => AddAssign,
        "-=" => SubAssign,
        "*=" => MulAssign,
        "/=" => DivAssign,
        "%=" => ModAssign,
        "&=" => AndAssign,
        "|=" => OrAssign,
        "^=" => XorAssign,
        "<<=" => ShlAssign,
        ">>=" => ShrAssign,
        "==" => Eq,
        "!=" => Ne,
        "<=" => Le,
        ">=" => Ge,
        "<<" => Shl,
        ">>" => Shr,
        "+" => Add,
        "-" => Sub,
        "*" => Mul,
        "/" => Div,
        "%" => Mod,
        "=" => crate::lexer::token::Punct::Assign,
        "<" => Lt,
        ">" => Gt,
        "&" => BitAnd,
        "|" => BitOr,
        "^" => BitXor,
        "~" => BitNot,
        "(" => LParen,
        ")" => RParen,
        "{" => LBrace,
        "}" => RBrace,
        "[" => LBracket,
        "]" => RBracket,
        "," => Comma,
        ";" => Semicolon,
        ":" => Colon,
        "?" => Question,
        "." => Dot,
        "@" => At,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(src: &str) -> Vec<TokenKind> {
        let mut stream = TokenStream::default();
        stream.reload(src, &Rc::from("test"), &CompileOptions::default()).unwrap();
        let mut out = Vec::new();
        while let Some(t) = stream.shift() {
            out.push(t.kind);
        }
        out
    }

    #[test]
    fn lexes_keywords_and_identifiers() {
        let kinds = toks("var x = func;");
        assert!(matches!(kinds[0], TokenKind::Keyword(Keyword::Var)));
        assert!(matches!(&kinds[1], TokenKind::Identifier(s) if &**s == "x"));
        assert!(matches!(kinds[2], TokenKind::Punct(Punct::Assign)));
        assert!(matches!(kinds[3], TokenKind::Keyword(Keyword::Func)));
    }

    #[test]
    fn lexes_multichar_punctuators_longest_match_first() {
        let kinds = toks("a ??= b .. c ... d <=> e");
        assert!(kinds.iter().any(|k| matches!(k, TokenKind::Punct(Punct::CoalesceAssign))));
        assert!(kinds.iter().any(|k| matches!(k, TokenKind::Punct(Punct::Range))));
        assert!(kinds.iter().any(|k| matches!(k, TokenKind::Punct(Punct::Ellipsis))));
        assert!(kinds.iter().any(|k| matches!(k, TokenKind::Punct(Punct::Spaceship))));
    }

    #[test]
    fn lexes_string_escapes() {
        let kinds = toks(r#""a\nb\u{1F600}""#);
        let TokenKind::String(s) = &kinds[0] else { panic!("expected string") };
        assert!(s.contains('\n'));
        assert!(s.contains('\u{1F600}'));
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let mut stream = TokenStream::default();
        let err = stream.reload("\"abc", &Rc::from("test"), &CompileOptions::default()).unwrap_err();
        assert!(matches!(err.status, CompileStatus::UnterminatedStringLiteral));
    }

    #[test]
    fn skips_line_and_block_comments() {
        let kinds = toks("1 // comment\n/* block */ 2");
        assert!(matches!(kinds[0], TokenKind::Integer(1)));
        assert!(matches!(kinds[1], TokenKind::Integer(2)));
    }
}

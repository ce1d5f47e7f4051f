//! Byte-scanning lexer: one `Lexer::new(source).tokenize()` pass producing a
//! finite token sequence.

use crate::error::LexError;
use crate::token::{RegexFlag, Span, TemplatePart, Token, TokenKind};

pub struct Lexer<'a> {
    source: &'a str,
    bytes: &'a [u8],
    position: usize,
    line: u32,
    line_start: usize,
    /// Whether the previous significant token permits a following `/` to be
    /// read as a regex literal rather than the division operator
    ///.
    regex_allowed: bool,
    /// One entry per currently-open `${…}` interpolation region, counting
    /// unmatched `{` seen since entering it. A `}` at depth 0 closes the
    /// interpolation and resumes scanning template text instead of acting
    /// as a brace token.
    template_depths: Vec<u32>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            position: 0,
            line: 1,
            line_start: 0,
            regex_allowed: true,
            template_depths: Vec::new(),
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let is_eof = matches!(token.kind, TokenKind::Eof);
            tokens.push(token);
            if is_eof {
                break;
            }
        }
        Ok(tokens)
    }

    fn peek_byte(&self) -> Option<u8> {
        self.bytes.get(self.position).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.position + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let rest = &self.source[self.position..];
        let c = rest.chars().next()?;
        self.position += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.line_start = self.position;
        }
        Some(c)
    }

    fn column(&self, offset: usize) -> u32 {
        (offset - self.line_start) as u32 + 1
    }

    fn span(&self, start: usize, start_line: u32, start_col: u32) -> Span {
        Span::new(start, self.position, start_line, start_col)
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<(), LexError> {
        loop {
            match self.peek_byte() {
                Some(b' ') | Some(b'\t') | Some(b'\r') | Some(b'\n') => {
                    self.advance();
                }
                Some(b'/') if self.peek_at(1) == Some(b'/') => {
                    while let Some(c) = self.peek_byte() {
                        if c == b'\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                Some(b'/') if self.peek_at(1) == Some(b'*') => {
                    let start = self.position;
                    let start_line = self.line;
                    let start_col = self.column(start);
                    self.advance();
                    self.advance();
                    let mut closed = false;
                    while self.position < self.bytes.len() {
                        if self.peek_byte() == Some(b'*') && self.peek_at(1) == Some(b'/') {
                            self.advance();
                            self.advance();
                            closed = true;
                            break;
                        }
                        self.advance();
                    }
                    if !closed {
                        return Err(LexError::new(
                            "unterminated block comment",
                            self.span(start, start_line, start_col),
                        ));
                    }
                }
                _ => break,
            }
        }
        Ok(())
    }

    fn next_token(&mut self) -> Result<Token, LexError> {
        self.skip_whitespace_and_comments()?;

        let start = self.position;
        let start_line = self.line;
        let start_col = self.column(start);

        let Some(c) = self.peek_byte() else {
            return Ok(Token::new(TokenKind::Eof, "", self.span(start, start_line, start_col)));
        };

        let (kind, lexeme) = if c == b'}' && matches!(self.template_depths.last(), Some(&0)) {
            self.template_depths.pop();
            self.advance(); // the closing `}` of a `${…}` region
            let result = self.read_template_fragment(start, start_line, start_col, false)?;
            self.reopen_template_interpolation(&result.0);
            result
        } else {
            match c {
                b'0'..=b'9' => self.read_number(start)?,
                b'"' | b'\'' => self.read_string(c, start, start_line, start_col)?,
                b'`' => {
                    let result = self.read_template(start, start_line, start_col)?;
                    self.reopen_template_interpolation(&result.0);
                    result
                }
                b'/' if self.regex_allowed => self.read_regex(start, start_line, start_col)?,
                _ if c.is_ascii_alphabetic() || c == b'_' || c == b'$' => self.read_identifier(start),
                _ => self.read_operator(start, start_line, start_col)?,
            }
        };

        self.regex_allowed = token_allows_regex_after(&kind);
        Ok(Token::new(kind, lexeme, self.span(start, start_line, start_col)))
    }

    fn read_number(&mut self, start: usize) -> Result<(TokenKind, String), LexError> {
        while matches!(self.peek_byte(), Some(b'0'..=b'9')) {
            self.advance();
        }
        if self.peek_byte() == Some(b'.') && matches!(self.peek_at(1), Some(b'0'..=b'9')) {
            self.advance();
            while matches!(self.peek_byte(), Some(b'0'..=b'9')) {
                self.advance();
            }
        }
        let text = &self.source[start..self.position];
        let value: f64 = text.parse().expect("lexer only admits valid number syntax");
        Ok((TokenKind::Number(value), text.to_string()))
    }

    fn read_escape(&mut self, start: usize, start_line: u32, start_col: u32) -> Result<char, LexError> {
        match self.advance() {
            Some('n') => Ok('\n'),
            Some('t') => Ok('\t'),
            Some('r') => Ok('\r'),
            Some('0') => Ok('\0'),
            Some('\\') => Ok('\\'),
            Some('\'') => Ok('\''),
            Some('"') => Ok('"'),
            Some('x') => {
                let hex = self.take_hex_digits(2, start, start_line, start_col)?;
                Ok(char::from_u32(hex).unwrap_or('\u{FFFD}'))
            }
            Some('u') => {
                let hex = self.take_hex_digits(4, start, start_line, start_col)?;
                Ok(char::from_u32(hex).unwrap_or('\u{FFFD}'))
            }
            Some(other) => Ok(other),
            None => Err(LexError::new("unterminated escape sequence", self.span(start, start_line, start_col))),
        }
    }

    fn take_hex_digits(&mut self, count: usize, start: usize, start_line: u32, start_col: u32) -> Result<u32, LexError> {
        let mut value = 0u32;
        for _ in 0..count {
            let c = self.advance().ok_or_else(|| {
                LexError::new("incomplete escape sequence", self.span(start, start_line, start_col))
            })?;
            let digit = c.to_digit(16).ok_or_else(|| {
                LexError::new("invalid hex digit in escape sequence", self.span(start, start_line, start_col))
            })?;
            value = value * 16 + digit;
        }
        Ok(value)
    }

    fn read_string(
        &mut self,
        quote: u8,
        start: usize,
        start_line: u32,
        start_col: u32,
    ) -> Result<(TokenKind, String), LexError> {
        self.advance();
        let mut value = String::new();
        loop {
            match self.peek_byte() {
                None => {
                    return Err(LexError::new("unterminated string literal", self.span(start, start_line, start_col)))
                }
                Some(b'\n') => {
                    return Err(LexError::new(
                        "string literal spans an unescaped newline",
                        self.span(start, start_line, start_col),
                    ))
                }
                Some(b'\\') => {
                    self.advance();
                    value.push(self.read_escape(start, start_line, start_col)?);
                }
                Some(c) if c == quote => {
                    self.advance();
                    break;
                }
                _ => {
                    value.push(self.advance().expect("peeked byte exists"));
                }
            }
        }
        let lexeme = self.source[start..self.position].to_string();
        Ok((TokenKind::String(value), lexeme))
    }

    /// Scans one template fragment starting right after an opening backtick
    /// or a `}`. Alternates with the parser re-entering expression mode for
    /// `${…}` regions, tracking brace depth to find the matching `}`
    ///.
    fn read_template(&mut self, start: usize, start_line: u32, start_col: u32) -> Result<(TokenKind, String), LexError> {
        self.advance(); // opening backtick
        self.read_template_fragment(start, start_line, start_col, true)
    }

    /// Continues a template after the lexer is told (by the parser, which
    /// tracks brace depth across the embedded expression) that a `}` closes
    /// an interpolation region.
    pub fn read_template_continuation(&mut self) -> Result<(TokenKind, Span), LexError> {
        let start = self.position;
        let start_line = self.line;
        let start_col = self.column(start);
        self.advance(); // the closing `}`
        let (kind, _lexeme) = self.read_template_fragment(start, start_line, start_col, false)?;
        Ok((kind, self.span(start, start_line, start_col)))
    }

    fn read_template_fragment(
        &mut self,
        start: usize,
        start_line: u32,
        start_col: u32,
        is_head: bool,
    ) -> Result<(TokenKind, String), LexError> {
        let mut text = String::new();
        loop {
            match self.peek_byte() {
                None => {
                    return Err(LexError::new("unterminated template literal", self.span(start, start_line, start_col)))
                }
                Some(b'`') => {
                    self.advance();
                    let part = if is_head { TemplatePart::Full } else { TemplatePart::Tail };
                    let lexeme = self.source[start..self.position].to_string();
                    return Ok((TokenKind::Template { text, part }, lexeme));
                }
                Some(b'$') if self.peek_at(1) == Some(b'{') => {
                    self.advance();
                    self.advance();
                    let part = if is_head { TemplatePart::Head } else { TemplatePart::Middle };
                    let lexeme = self.source[start..self.position].to_string();
                    return Ok((TokenKind::Template { text, part }, lexeme));
                }
                Some(b'\\') => {
                    self.advance();
                    text.push(self.read_escape(start, start_line, start_col)?);
                }
                _ => {
                    text.push(self.advance().expect("peeked byte exists"));
                }
            }
        }
    }

    fn read_regex(&mut self, start: usize, start_line: u32, start_col: u32) -> Result<(TokenKind, String), LexError> {
        self.advance(); // opening /
        let mut pattern = String::new();
        let mut in_class = false;
        loop {
            match self.peek_byte() {
                None | Some(b'\n') => {
                    return Err(LexError::new("unterminated regex literal", self.span(start, start_line, start_col)))
                }
                Some(b'\\') => {
                    pattern.push(self.advance().expect("peeked"));
                    if let Some(c) = self.advance() {
                        pattern.push(c);
                    }
                }
                Some(b'[') => {
                    in_class = true;
                    pattern.push(self.advance().expect("peeked"));
                }
                Some(b']') if in_class => {
                    in_class = false;
                    pattern.push(self.advance().expect("peeked"));
                }
                Some(b'/') if !in_class => {
                    self.advance();
                    break;
                }
                _ => pattern.push(self.advance().expect("peeked")),
            }
        }
        let mut flags = Vec::new();
        while let Some(c) = self.peek_byte() {
            match c {
                b'g' => flags.push(RegexFlag::Global),
                b'i' => flags.push(RegexFlag::IgnoreCase),
                b'm' => flags.push(RegexFlag::Multiline),
                _ => break,
            }
            self.advance();
        }
        let lexeme = self.source[start..self.position].to_string();
        Ok((TokenKind::Regex { pattern, flags }, lexeme))
    }

    fn read_identifier(&mut self, start: usize) -> (TokenKind, String) {
        while let Some(c) = self.peek_byte() {
            if c.is_ascii_alphanumeric() || c == b'_' || c == b'$' {
                self.advance();
            } else {
                break;
            }
        }
        let word = self.source[start..self.position].to_string();
        let kind = match word.as_str() {
            // Alternative word-forms map to existing operator kinds rather
            // than introducing new token variants.
            "is" => TokenKind::EqEq,
            "and" => TokenKind::AndAnd,
            "or" => TokenKind::OrOr,
            _ => crate::token::lookup_keyword(&word).unwrap_or_else(|| TokenKind::Identifier(word.clone())),
        };
        (kind, word)
    }

    /// After a template fragment ending in `Head` or `Middle`, a new
    /// `${…}` interpolation region has just opened; push a fresh brace
    /// depth counter so ordinary `{`/`}` within that expression (e.g. an
    /// object literal) don't get mistaken for the region's closing brace
    ///.
    fn reopen_template_interpolation(&mut self, kind: &TokenKind) {
        if let TokenKind::Template { part, .. } = kind {
            if matches!(part, TemplatePart::Head | TemplatePart::Middle) {
                self.template_depths.push(0);
            }
        }
    }

    fn read_operator(&mut self, start: usize, start_line: u32, start_col: u32) -> Result<(TokenKind, String), LexError> {
        use TokenKind::*;
        let c = self.advance().expect("checked by caller");
        let kind = match c {
            '(' => LParen,
            ')' => RParen,
            '{' => {
                if let Some(depth) = self.template_depths.last_mut() {
                    *depth += 1;
                }
                LBrace
            }
            '}' => {
                if let Some(depth) = self.template_depths.last_mut() {
                    *depth = depth.saturating_sub(1);
                }
                RBrace
            }
            '[' => LBracket,
            ']' => RBracket,
            ',' => Comma,
            ';' => Semicolon,
            ':' => Colon,
            '?' => QuestionMark,
            '~' => Tilde,
            '.' => Dot,
            '+' => {
                if self.peek_byte() == Some(b'+') {
                    self.advance();
                    PlusPlus
                } else if self.peek_byte() == Some(b'=') {
                    self.advance();
                    PlusAssign
                } else {
                    Plus
                }
            }
            '-' => {
                if self.peek_byte() == Some(b'-') {
                    self.advance();
                    MinusMinus
                } else if self.peek_byte() == Some(b'=') {
                    self.advance();
                    MinusAssign
                } else {
                    Minus
                }
            }
            '*' => {
                if self.peek_byte() == Some(b'=') {
                    self.advance();
                    StarAssign
                } else {
                    Star
                }
            }
            '/' => {
                if self.peek_byte() == Some(b'=') {
                    self.advance();
                    SlashAssign
                } else {
                    Slash
                }
            }
            '%' => Percent,
            '=' => {
                if self.peek_byte() == Some(b'=') && self.peek_at(1) == Some(b'=') {
                    self.advance();
                    self.advance();
                    EqEqEq
                } else if self.peek_byte() == Some(b'=') {
                    self.advance();
                    EqEq
                } else if self.peek_byte() == Some(b'>') {
                    self.advance();
                    Arrow
                } else {
                    Assign
                }
            }
            '!' => {
                if self.peek_byte() == Some(b'=') && self.peek_at(1) == Some(b'=') {
                    self.advance();
                    self.advance();
                    NotEqEq
                } else if self.peek_byte() == Some(b'=') {
                    self.advance();
                    NotEq
                } else {
                    Bang
                }
            }
            '<' => {
                if self.peek_byte() == Some(b'<') {
                    self.advance();
                    Shl
                } else if self.peek_byte() == Some(b'=') {
                    self.advance();
                    LtEq
                } else {
                    Lt
                }
            }
            '>' => {
                if self.peek_byte() == Some(b'>') && self.peek_at(1) == Some(b'>') {
                    self.advance();
                    self.advance();
                    UShr
                } else if self.peek_byte() == Some(b'>') {
                    self.advance();
                    Shr
                } else if self.peek_byte() == Some(b'=') {
                    self.advance();
                    GtEq
                } else {
                    Gt
                }
            }
            '&' => {
                if self.peek_byte() == Some(b'&') {
                    self.advance();
                    AndAnd
                } else {
                    Amp
                }
            }
            '|' => {
                if self.peek_byte() == Some(b'|') {
                    self.advance();
                    OrOr
                } else if self.peek_byte() == Some(b'>') {
                    self.advance();
                    Pipeline
                } else {
                    Pipe
                }
            }
            '^' => Caret,
            other => {
                return Err(LexError::new(
                    format!("unexpected character '{}'", other),
                    self.span(start, start_line, start_col),
                ))
            }
        };
        Ok((kind, self.source[start..self.position].to_string()))
    }
}

/// After these token kinds, a following `/` must be division, not a regex
/// literal start.
fn token_allows_regex_after(kind: &TokenKind) -> bool {
    !matches!(
        kind,
        TokenKind::Number(_)
            | TokenKind::String(_)
            | TokenKind::Identifier(_)
            | TokenKind::True
            | TokenKind::False
            | TokenKind::Null
            | TokenKind::This
            | TokenKind::RParen
            | TokenKind::RBracket
            | TokenKind::RBrace
            | TokenKind::PlusPlus
            | TokenKind::MinusMinus
    )
}

pub fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
    Lexer::new(source).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn tokenizes_numbers() {
        assert_eq!(kinds("42 3.14"), vec![TokenKind::Number(42.0), TokenKind::Number(3.14), TokenKind::Eof]);
    }

    #[test]
    fn tokenizes_keywords_and_identifiers() {
        assert_eq!(
            kinds("let x = foo"),
            vec![
                TokenKind::Let,
                TokenKind::Identifier("x".into()),
                TokenKind::Assign,
                TokenKind::Identifier("foo".into()),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn is_and_or_are_aliases() {
        assert_eq!(kinds("a is b"), vec![TokenKind::Identifier("a".into()), TokenKind::EqEq, TokenKind::Identifier("b".into()), TokenKind::Eof]);
        assert_eq!(kinds("a and b"), vec![TokenKind::Identifier("a".into()), TokenKind::AndAnd, TokenKind::Identifier("b".into()), TokenKind::Eof]);
        assert_eq!(kinds("a or b"), vec![TokenKind::Identifier("a".into()), TokenKind::OrOr, TokenKind::Identifier("b".into()), TokenKind::Eof]);
    }

    #[test]
    fn tokenizes_string_escapes() {
        let toks = tokenize(r#""a\nb""#).unwrap();
        assert_eq!(toks[0].kind, TokenKind::String("a\nb".to_string()));
    }

    #[test]
    fn unescaped_newline_in_string_is_lex_error() {
        assert!(tokenize("\"abc\ndef\"").is_err());
    }

    #[test]
    fn tokenizes_multi_char_operators() {
        assert_eq!(kinds("=== !== >>> |>"), vec![TokenKind::EqEqEq, TokenKind::NotEqEq, TokenKind::UShr, TokenKind::Pipeline, TokenKind::Eof]);
    }

    #[test]
    fn tokenizes_template_with_no_expressions() {
        let toks = tokenize("`hello`").unwrap();
        assert_eq!(toks[0].kind, TokenKind::Template { text: "hello".to_string(), part: TemplatePart::Full });
    }

    #[test]
    fn tokenizes_template_head_and_lexer_can_continue_after_expr() {
        let mut lexer = Lexer::new("`a${1}b`");
        let head = lexer.next_token().unwrap();
        assert_eq!(head.kind, TokenKind::Template { text: "a".to_string(), part: TemplatePart::Head });
        let one = lexer.next_token().unwrap();
        assert_eq!(one.kind, TokenKind::Number(1.0));
        let (tail_kind, _) = lexer.read_template_continuation().unwrap();
        assert_eq!(tail_kind, TokenKind::Template { text: "b".to_string(), part: TemplatePart::Tail });
    }

    #[test]
    fn slash_after_number_is_division() {
        assert_eq!(kinds("6 / 2"), vec![TokenKind::Number(6.0), TokenKind::Slash, TokenKind::Number(2.0), TokenKind::Eof]);
    }

    #[test]
    fn slash_at_statement_start_is_regex() {
        let toks = tokenize("/abc/gi").unwrap();
        assert_eq!(
            toks[0].kind,
            TokenKind::Regex { pattern: "abc".to_string(), flags: vec![RegexFlag::Global, RegexFlag::IgnoreCase] }
        );
    }

    #[test]
    fn skips_line_and_block_comments() {
        assert_eq!(kinds("1 // comment\n+ /* block */ 2"), vec![TokenKind::Number(1.0), TokenKind::Plus, TokenKind::Number(2.0), TokenKind::Eof]);
    }

    #[test]
    fn tracks_line_and_column() {
        let toks = tokenize("a\nb").unwrap();
        assert_eq!(toks[0].span.line, 1);
        assert_eq!(toks[1].span.line, 2);
        assert_eq!(toks[1].span.column, 1);
    }

    #[test]
    fn empty_source_yields_only_eof() {
        assert_eq!(kinds(""), vec![TokenKind::Eof]);
    }

    #[test]
    fn unterminated_string_is_lex_error() {
        assert!(tokenize("\"abc").is_err());
    }
}

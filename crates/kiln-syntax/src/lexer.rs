//! Lexer for the Kiln source dialect, built on logos.

use crate::error::SyntaxError;
use crate::span::Span;
use crate::token::Token;
use logos::Logos;

/// Converts source text into tokens with line/column spans.
pub struct Lexer<'a> {
    source: &'a str,
    line_starts: Vec<usize>,
}

impl<'a> Lexer<'a> {
    /// Create a lexer over `source`
    pub fn new(source: &'a str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(source.match_indices('\n').map(|(i, _)| i + 1));
        Self {
            source,
            line_starts,
        }
    }

    fn span_for(&self, start: usize, end: usize) -> Span {
        let line = match self.line_starts.binary_search(&start) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        let column = start - self.line_starts[line] + 1;
        Span::new(start, end, line as u32 + 1, column as u32)
    }

    /// Tokenize the whole input. The result always ends with [`Token::Eof`].
    pub fn tokenize(self) -> Result<Vec<(Token, Span)>, SyntaxError> {
        let mut tokens = Vec::new();
        let mut lex = Token::lexer(self.source);
        while let Some(result) = lex.next() {
            let range = lex.span();
            let span = self.span_for(range.start, range.end);
            match result {
                Ok(token) => tokens.push((token, span)),
                Err(()) => {
                    return Err(SyntaxError::UnexpectedCharacter {
                        text: lex.slice().to_string(),
                        span,
                    })
                }
            }
        }
        let end = self.source.len();
        tokens.push((Token::Eof, self.span_for(end, end)));
        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        Lexer::new(source)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|(t, _)| t)
            .collect()
    }

    #[test]
    fn test_keywords_and_punctuation() {
        assert_eq!(
            kinds("let x = [a, ...b];"),
            vec![
                Token::Let,
                Token::Identifier("x".into()),
                Token::Equal,
                Token::LeftBracket,
                Token::Identifier("a".into()),
                Token::Comma,
                Token::DotDotDot,
                Token::Identifier("b".into()),
                Token::RightBracket,
                Token::Semicolon,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_comments_are_skipped() {
        assert_eq!(
            kinds("1 // one\n/* two */ 2"),
            vec![Token::Number(1.0), Token::Number(2.0), Token::Eof]
        );
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            kinds(r#"'a\'b' "c\nd""#),
            vec![
                Token::String("a'b".into()),
                Token::String("c\nd".into()),
                Token::Eof
            ]
        );
    }

    #[test]
    fn test_span_line_and_column() {
        let tokens = Lexer::new("a\n  b").tokenize().unwrap();
        assert_eq!(tokens[1].1.line, 2);
        assert_eq!(tokens[1].1.column, 3);
    }
}

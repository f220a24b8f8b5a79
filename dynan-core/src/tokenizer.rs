//! # Tokenizadores Embutidos
//!
//! Responsáveis por dividir o texto bruto em tokens. Cada token preserva sua posição
//! original (offsets em bytes) no texto que o analisador recebeu.
//!
//! ## Esquemas de Tokenização
//!
//! - **Standard**: Segmentação de palavras Unicode (UAX #29). Pontuação isolada é
//!   descartada; `bar_123` e `don't` ficam inteiros.
//! - **Whitespace**: Divide apenas em espaços em branco. Pontuação vira token.
//! - **Letter**: Sequências máximas de letras.
//! - **Keyword**: O texto inteiro é um único token.
//! - **Pattern**: Cada casamento de uma expressão regular é um token.
//!
//! ## Exemplo de Uso
//!
//! ```rust
//! use dynan_core::tokenizer::{tokenize_with_mode, TokenizerMode};
//!
//! let text = "foo  !    bar_123 .";
//!
//! // Standard: "foo", "bar_123"
//! let tokens = tokenize_with_mode(text, TokenizerMode::Standard);
//! assert_eq!(tokens.len(), 2);
//!
//! // Whitespace: "foo", "!", "bar_123", "."
//! let tokens = tokenize_with_mode(text, TokenizerMode::Whitespace);
//! assert_eq!(tokens.len(), 4);
//! ```

use regex::Regex;
use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

use crate::error::{AnalysisError, Result};

/// Tipo léxico de palavras alfanuméricas do tokenizador standard.
pub const ALPHANUM: &str = "<ALPHANUM>";
/// Tipo léxico de números puros do tokenizador standard.
pub const NUM: &str = "<NUM>";
/// Tipo léxico dos demais tokenizadores.
pub const WORD: &str = "word";

/// Um token extraído do texto original.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Token {
    /// O texto do token (ex: "foo", "bar_123", "!").
    pub text: String,
    /// Índice de byte inicial no texto original (inclusive).
    pub start: usize,
    /// Índice de byte final no texto original (exclusivo).
    pub end: usize,
    /// Distância para o token anterior. Filtros que removem tokens acumulam aqui.
    pub position_increment: u32,
    /// Tipo léxico (`<ALPHANUM>`, `<NUM>`, `word`).
    pub kind: &'static str,
}

impl Token {
    pub fn new(text: impl Into<String>, start: usize, end: usize, kind: &'static str) -> Self {
        Self {
            text: text.into(),
            start,
            end,
            position_increment: 1,
            kind,
        }
    }
}

/// Estratégias de tokenização disponíveis (forma serializável, usada na configuração).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TokenizerMode {
    #[default]
    Standard,
    Whitespace,
    Letter,
    Keyword,
    /// Requer um padrão regex (ver [`Tokenizer::from_mode`]).
    Pattern,
}

/// Um tokenizador pronto para uso.
#[derive(Debug, Clone)]
pub enum Tokenizer {
    Standard,
    Whitespace,
    Letter,
    Keyword,
    Pattern(Regex),
}

impl Tokenizer {
    /// Constrói o tokenizador de `mode`. `Pattern` exige `pattern`.
    pub fn from_mode(mode: TokenizerMode, pattern: Option<&str>) -> Result<Self> {
        Ok(match mode {
            TokenizerMode::Standard => Tokenizer::Standard,
            TokenizerMode::Whitespace => Tokenizer::Whitespace,
            TokenizerMode::Letter => Tokenizer::Letter,
            TokenizerMode::Keyword => Tokenizer::Keyword,
            TokenizerMode::Pattern => {
                let pattern = pattern.ok_or_else(|| {
                    AnalysisError::Config("pattern tokenizer requires a `pattern`".to_string())
                })?;
                Self::pattern(pattern)?
            }
        })
    }

    pub fn pattern(pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern)
            .map_err(|e| AnalysisError::Config(format!("invalid tokenizer pattern: {e}")))?;
        Ok(Tokenizer::Pattern(regex))
    }

    pub fn mode(&self) -> TokenizerMode {
        match self {
            Tokenizer::Standard => TokenizerMode::Standard,
            Tokenizer::Whitespace => TokenizerMode::Whitespace,
            Tokenizer::Letter => TokenizerMode::Letter,
            Tokenizer::Keyword => TokenizerMode::Keyword,
            Tokenizer::Pattern(_) => TokenizerMode::Pattern,
        }
    }

    pub fn tokenize(&self, text: &str) -> Vec<Token> {
        match self {
            Tokenizer::Pattern(regex) => tokenize_pattern(text, regex),
            other => tokenize_with_mode(text, other.mode()),
        }
    }
}

/// Tokeniza um texto com o modo especificado. `Pattern` sem regex não produz tokens.
pub fn tokenize_with_mode(text: &str, mode: TokenizerMode) -> Vec<Token> {
    match mode {
        TokenizerMode::Standard => tokenize_standard(text),
        TokenizerMode::Whitespace => tokenize_whitespace(text),
        TokenizerMode::Letter => tokenize_letter(text),
        TokenizerMode::Keyword => tokenize_keyword(text),
        TokenizerMode::Pattern => Vec::new(),
    }
}

fn tokenize_standard(text: &str) -> Vec<Token> {
    text.unicode_word_indices()
        .map(|(start, word)| {
            let kind = if word.chars().all(char::is_numeric) {
                NUM
            } else {
                ALPHANUM
            };
            Token::new(word, start, start + word.len(), kind)
        })
        .collect()
}

/// Tokens como sequências máximas de caracteres que satisfazem `keep`.
fn tokenize_runs(text: &str, keep: impl Fn(char) -> bool) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut current_start: Option<usize> = None;

    for (byte_pos, ch) in text.char_indices() {
        match (keep(ch), current_start) {
            (true, None) => current_start = Some(byte_pos),
            (false, Some(start)) => {
                tokens.push(Token::new(&text[start..byte_pos], start, byte_pos, WORD));
                current_start = None;
            }
            _ => {}
        }
    }
    if let Some(start) = current_start {
        tokens.push(Token::new(&text[start..], start, text.len(), WORD));
    }
    tokens
}

fn tokenize_whitespace(text: &str) -> Vec<Token> {
    tokenize_runs(text, |c| !c.is_whitespace())
}

fn tokenize_letter(text: &str) -> Vec<Token> {
    tokenize_runs(text, char::is_alphabetic)
}

fn tokenize_keyword(text: &str) -> Vec<Token> {
    if text.is_empty() {
        return Vec::new();
    }
    vec![Token::new(text, 0, text.len(), WORD)]
}

fn tokenize_pattern(text: &str, regex: &Regex) -> Vec<Token> {
    regex
        .find_iter(text)
        .filter(|m| !m.as_str().is_empty())
        .map(|m| Token::new(m.as_str(), m.start(), m.end(), WORD))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(tokens: &[Token]) -> Vec<&str> {
        tokens.iter().map(|t| t.text.as_str()).collect()
    }

    const SAMPLE: &str = "foo  !    bar_123 .  FOO <> BAR !";

    #[test]
    fn test_tokenize_standard_offsets() {
        let tokens = tokenize_with_mode(SAMPLE, TokenizerMode::Standard);
        assert_eq!(texts(&tokens), vec!["foo", "bar_123", "FOO", "BAR"]);
        let offsets: Vec<(usize, usize)> = tokens.iter().map(|t| (t.start, t.end)).collect();
        assert_eq!(offsets, vec![(0, 3), (10, 17), (21, 24), (28, 31)]);
        assert!(tokens.iter().all(|t| t.kind == ALPHANUM));
    }

    #[test]
    fn test_tokenize_standard_numbers() {
        let tokens = tokenize_with_mode("ano 2024", TokenizerMode::Standard);
        assert_eq!(tokens[1].kind, NUM);
    }

    #[test]
    fn test_tokenize_whitespace_keeps_punctuation() {
        let tokens = tokenize_with_mode(SAMPLE, TokenizerMode::Whitespace);
        assert_eq!(
            texts(&tokens),
            vec!["foo", "!", "bar_123", ".", "FOO", "<>", "BAR", "!"]
        );
        assert_eq!((tokens[5].start, tokens[5].end), (25, 27));
        assert_eq!((tokens[7].start, tokens[7].end), (32, 33));
    }

    #[test]
    fn test_tokenize_letter() {
        let tokens = tokenize_with_mode("ação1x", TokenizerMode::Letter);
        assert_eq!(texts(&tokens), vec!["ação", "x"]);
        assert_eq!(tokens[1].start, "ação1".len());
    }

    #[test]
    fn test_tokenize_keyword() {
        assert_eq!(texts(&tokenize_with_mode("a b", TokenizerMode::Keyword)), vec!["a b"]);
        assert!(tokenize_with_mode("", TokenizerMode::Keyword).is_empty());
    }

    #[test]
    fn test_tokenize_pattern() {
        let tokenizer = Tokenizer::pattern(r"[A-Z]+").unwrap();
        let tokens = tokenizer.tokenize(SAMPLE);
        assert_eq!(texts(&tokens), vec!["FOO", "BAR"]);
    }

    #[test]
    fn test_pattern_mode_requires_pattern() {
        assert!(Tokenizer::from_mode(TokenizerMode::Pattern, None).is_err());
        assert!(Tokenizer::from_mode(TokenizerMode::Pattern, Some("(")).is_err());
    }
}

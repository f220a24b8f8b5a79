//! # Filtros de Tokens
//!
//! Transformações aplicadas em cadeia depois do tokenizador:
//!
//! ```text
//! Tokenizer → Possessive → Lowercase → Stop → MinimalStem
//! ```
//!
//! Filtros que removem tokens somam o incremento de posição dos removidos no próximo
//! token mantido, para que buscas por frase continuem vendo o buraco.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::tokenizer::Token;

/// Stop words do inglês (mesmo conjunto clássico usado por engines de busca).
pub static ENGLISH_STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in", "into",
        "is", "it", "no", "not", "of", "on", "or", "such", "that", "the", "their", "then",
        "there", "these", "they", "this", "to", "was", "will", "with",
    ]
    .into_iter()
    .collect()
});

/// Um filtro sobre a sequência de tokens de um texto.
pub trait TokenFilter: Send + Sync {
    fn filter(&self, tokens: Vec<Token>) -> Vec<Token>;

    fn name(&self) -> &'static str;
}

/// Filtros disponíveis por nome na configuração.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    Lowercase,
    EnglishStop,
    EnglishPossessive,
    EnglishMinimalStem,
}

impl FilterMode {
    pub fn build(self) -> Box<dyn TokenFilter> {
        match self {
            FilterMode::Lowercase => Box::new(LowercaseFilter),
            FilterMode::EnglishStop => Box::new(StopFilter::english()),
            FilterMode::EnglishPossessive => Box::new(EnglishPossessiveFilter),
            FilterMode::EnglishMinimalStem => Box::new(EnglishMinimalStemFilter),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LowercaseFilter;

impl TokenFilter for LowercaseFilter {
    fn filter(&self, mut tokens: Vec<Token>) -> Vec<Token> {
        for token in &mut tokens {
            if token.text.chars().any(char::is_uppercase) {
                token.text = token.text.to_lowercase();
            }
        }
        tokens
    }

    fn name(&self) -> &'static str {
        "lowercase"
    }
}

/// Remove tokens presentes no conjunto. Compara o texto exato (aplique depois do
/// lowercase).
#[derive(Debug, Clone, Default)]
pub struct StopFilter {
    words: HashSet<String>,
}

impl StopFilter {
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            words: words.into_iter().map(Into::into).collect(),
        }
    }

    pub fn english() -> Self {
        Self::new(ENGLISH_STOP_WORDS.iter().copied())
    }

    pub fn is_stop_word(&self, word: &str) -> bool {
        self.words.contains(word)
    }
}

impl TokenFilter for StopFilter {
    fn filter(&self, tokens: Vec<Token>) -> Vec<Token> {
        let mut kept = Vec::with_capacity(tokens.len());
        let mut skipped = 0u32;
        for mut token in tokens {
            if self.is_stop_word(&token.text) {
                skipped = skipped.saturating_add(token.position_increment);
                continue;
            }
            token.position_increment = token.position_increment.saturating_add(skipped);
            skipped = 0;
            kept.push(token);
        }
        kept
    }

    fn name(&self) -> &'static str {
        "stop"
    }
}

/// Remove o `'s` final (apóstrofo ASCII, tipográfico ou de largura total).
#[derive(Debug, Clone, Copy, Default)]
pub struct EnglishPossessiveFilter;

const APOSTROPHES: [char; 3] = ['\'', '\u{2019}', '\u{FF07}'];

impl TokenFilter for EnglishPossessiveFilter {
    fn filter(&self, mut tokens: Vec<Token>) -> Vec<Token> {
        for token in &mut tokens {
            let text = &token.text;
            let Some(stem) = text.strip_suffix(['s', 'S']) else {
                continue;
            };
            if let Some(stem) = stem.strip_suffix(APOSTROPHES) {
                let len = stem.len();
                token.text.truncate(len);
            }
        }
        tokens
    }

    fn name(&self) -> &'static str {
        "english_possessive"
    }
}

/// Stemmer mínimo de plurais do inglês.
///
/// - `ies` → `y` (exceto `aies`, `eies`)
/// - `es` → `e` (exceto `aes`, `ees`, `oes`, `ies`)
/// - `s` → `` (exceto `us`, `ss`)
///
/// Palavras com menos de 3 caracteres não mudam.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnglishMinimalStemFilter;

impl EnglishMinimalStemFilter {
    pub fn stem(word: &str) -> String {
        let chars: Vec<char> = word.chars().collect();
        let len = chars.len();
        if len < 3 || chars[len - 1] != 's' {
            return word.to_string();
        }
        match chars[len - 2] {
            'u' | 's' => word.to_string(),
            'e' => {
                let before = chars[len - 3];
                if len > 3 && before == 'i' && !matches!(chars[len - 4], 'a' | 'e') {
                    let mut stem: String = chars[..len - 3].iter().collect();
                    stem.push('y');
                    return stem;
                }
                if matches!(before, 'i' | 'a' | 'o' | 'e') {
                    return word.to_string();
                }
                chars[..len - 1].iter().collect()
            }
            _ => chars[..len - 1].iter().collect(),
        }
    }
}

impl TokenFilter for EnglishMinimalStemFilter {
    fn filter(&self, mut tokens: Vec<Token>) -> Vec<Token> {
        for token in &mut tokens {
            token.text = Self::stem(&token.text);
        }
        tokens
    }

    fn name(&self) -> &'static str {
        "english_minimal_stem"
    }
}

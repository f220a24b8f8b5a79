//! # Contratos de Análise
//!
//! - [`TokenStream`]: o protocolo de ciclo de vida de um fluxo de tokens
//!   (`reset` → `advance`* → `end` → `close`). O token atual vive no bag de atributos
//!   ([`AttributeSource`]) do stream.
//! - [`Analyzer`]: um produtor de tokens; dado um campo e uma fonte, abre um stream.
//! - [`AnalyzerProvider`]: busca de analisadores por nome lógico.
//!
//! ## Exemplo
//!
//! ```rust
//! use dynan_core::analysis::{drain_tokens, Analyzer};
//! use dynan_core::analyzers::ChainAnalyzer;
//!
//! let analyzer = ChainAnalyzer::whitespace();
//! let mut stream = analyzer.token_stream_for_text("body", "foo  bar").unwrap();
//! let tokens = drain_tokens(stream.as_mut()).unwrap();
//! assert_eq!(tokens[1].term, "bar");
//! assert_eq!(tokens[1].start, 5);
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::attributes::{
    AttributeSource, CharTermAttribute, OffsetAttribute, PositionIncrementAttribute,
    TypeAttribute,
};
use crate::error::Result;
use crate::source::{CharSource, StringSource};

/// Um fluxo de tokens com ciclo de vida explícito.
///
/// Consumidores chamam `reset()` antes do primeiro `advance()`, e `end()` seguido de
/// `close()` depois do último. `advance()` devolve `false` quando não há mais tokens.
pub trait TokenStream: Send {
    fn attributes(&self) -> &AttributeSource;
    fn attributes_mut(&mut self) -> &mut AttributeSource;
    fn reset(&mut self) -> Result<()>;
    fn advance(&mut self) -> Result<bool>;
    /// Fixa o estado final (offset final, incremento residual).
    fn end(&mut self) -> Result<()>;
    fn close(&mut self) -> Result<()>;
}

impl<T: TokenStream + ?Sized> TokenStream for Box<T> {
    fn attributes(&self) -> &AttributeSource {
        (**self).attributes()
    }

    fn attributes_mut(&mut self) -> &mut AttributeSource {
        (**self).attributes_mut()
    }

    fn reset(&mut self) -> Result<()> {
        (**self).reset()
    }

    fn advance(&mut self) -> Result<bool> {
        (**self).advance()
    }

    fn end(&mut self) -> Result<()> {
        (**self).end()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

/// Um produtor de tokens (colaborador externo do multiplexador).
pub trait Analyzer: Send + Sync {
    fn name(&self) -> &str;

    /// Abre um stream sobre `source`. O stream passa a ser dono da fonte e a fecha
    /// no seu `close()`.
    fn token_stream(&self, field: &str, source: Box<dyn CharSource>)
        -> Result<Box<dyn TokenStream>>;

    fn token_stream_for_text(&self, field: &str, text: &str) -> Result<Box<dyn TokenStream>> {
        self.token_stream(field, Box::new(StringSource::new(text)))
    }
}

/// Busca de analisadores por nome. `None` significa "não encontrado": quem chama decide
/// que isso é erro de configuração.
pub trait AnalyzerProvider: Send + Sync {
    fn analyzer(&self, name: &str) -> Option<Arc<dyn Analyzer>>;
}

impl AnalyzerProvider for HashMap<String, Arc<dyn Analyzer>> {
    fn analyzer(&self, name: &str) -> Option<Arc<dyn Analyzer>> {
        self.get(name).cloned()
    }
}

/// Um token materializado, lido do bag de atributos de um stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzedToken {
    pub term: String,
    pub start: usize,
    pub end: usize,
    pub position_increment: u32,
    /// Posição absoluta (soma dos incrementos; o primeiro token com incremento 1 fica em 0).
    pub position: u32,
    pub kind: String,
}

impl AnalyzedToken {
    /// Lê o token atual. Atributos ausentes assumem seus valores padrão.
    pub fn from_attributes(attrs: &AttributeSource, position: u32) -> Self {
        let offset = attrs.get::<OffsetAttribute>().copied().unwrap_or_default();
        Self {
            term: attrs
                .get::<CharTermAttribute>()
                .map(|t| t.as_str().to_string())
                .unwrap_or_default(),
            start: offset.start_offset(),
            end: offset.end_offset(),
            position_increment: attrs
                .get::<PositionIncrementAttribute>()
                .map(|p| p.position_increment())
                .unwrap_or(1),
            position,
            kind: attrs
                .get::<TypeAttribute>()
                .map(|t| t.token_type().to_string())
                .unwrap_or_else(|| "word".to_string()),
        }
    }
}

/// Percorre o ciclo de vida completo de `stream`, entregando cada token a `visit`.
///
/// O stream é fechado mesmo quando `reset`, `advance` ou `end` falham; nesse caso o
/// primeiro erro é o devolvido.
pub fn visit_tokens(
    stream: &mut dyn TokenStream,
    mut visit: impl FnMut(AnalyzedToken),
) -> Result<()> {
    let consumed = consume(stream, &mut visit);
    let closed = stream.close();
    consumed.and(closed)
}

fn consume(
    stream: &mut dyn TokenStream,
    visit: &mut impl FnMut(AnalyzedToken),
) -> Result<()> {
    stream.reset()?;
    let mut position: Option<u32> = None;
    while stream.advance()? {
        let increment = stream
            .attributes()
            .get::<PositionIncrementAttribute>()
            .map(|p| p.position_increment())
            .unwrap_or(1);
        let next = match position {
            Some(p) => p.saturating_add(increment),
            None => increment.saturating_sub(1),
        };
        position = Some(next);
        visit(AnalyzedToken::from_attributes(stream.attributes(), next));
    }
    stream.end()
}

/// Como [`visit_tokens`], coletando todos os tokens.
pub fn drain_tokens(stream: &mut dyn TokenStream) -> Result<Vec<AnalyzedToken>> {
    let mut tokens = Vec::new();
    visit_tokens(stream, |token| tokens.push(token))?;
    Ok(tokens)
}

//! # Analisadores Embutidos
//!
//! Um [`ChainAnalyzer`] é um tokenizador seguido de uma cadeia de filtros. O stream que
//! ele abre lê a fonte inteira no `reset()`, tokeniza e entrega os tokens pelo bag de
//! atributos.
//!
//! | Nome | Tokenizador | Filtros |
//! |------|-------------|---------|
//! | `standard` | standard | lowercase |
//! | `english` | standard | possessive, lowercase, stop, minimal stem |
//! | `whitespace` | whitespace | - |
//! | `simple` | letter | lowercase |
//! | `keyword` | keyword | - |
//!
//! O [`AnalyzerRegistry`] guarda analisadores por nome e é o provider usado pelo
//! resolvedor de tags.

use std::collections::BTreeMap;
use std::io::Read;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::analysis::{Analyzer, AnalyzerProvider, TokenStream};
use crate::attributes::{
    AttributeSource, CharTermAttribute, OffsetAttribute, PositionIncrementAttribute,
    TypeAttribute,
};
use crate::error::{AnalysisError, Result};
use crate::filters::{
    EnglishMinimalStemFilter, EnglishPossessiveFilter, FilterMode, LowercaseFilter,
    StopFilter, TokenFilter,
};
use crate::source::CharSource;
use crate::tokenizer::{Token, Tokenizer, TokenizerMode};

/// Descrição serializável de um analisador (usada na configuração do servidor).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AnalyzerSpec {
    pub tokenizer: TokenizerMode,
    /// Regex do tokenizador `pattern`.
    pub pattern: Option<String>,
    pub filters: Vec<FilterMode>,
}

struct Chain {
    tokenizer: Tokenizer,
    filters: Vec<Arc<dyn TokenFilter>>,
}

impl Chain {
    fn run(&self, text: &str) -> Vec<Token> {
        let tokens = self.tokenizer.tokenize(text);
        self.filters
            .iter()
            .fold(tokens, |tokens, filter| filter.filter(tokens))
    }
}

/// Tokenizador + filtros.
#[derive(Clone)]
pub struct ChainAnalyzer {
    name: String,
    chain: Arc<Chain>,
}

impl ChainAnalyzer {
    pub fn new(
        name: impl Into<String>,
        tokenizer: Tokenizer,
        filters: Vec<Arc<dyn TokenFilter>>,
    ) -> Self {
        Self {
            name: name.into(),
            chain: Arc::new(Chain { tokenizer, filters }),
        }
    }

    /// O mesmo analisador sob outro nome.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn standard() -> Self {
        Self::new("standard", Tokenizer::Standard, vec![Arc::new(LowercaseFilter)])
    }

    pub fn english() -> Self {
        Self::new(
            "english",
            Tokenizer::Standard,
            vec![
                Arc::new(EnglishPossessiveFilter),
                Arc::new(LowercaseFilter),
                Arc::new(StopFilter::english()),
                Arc::new(EnglishMinimalStemFilter),
            ],
        )
    }

    pub fn whitespace() -> Self {
        Self::new("whitespace", Tokenizer::Whitespace, Vec::new())
    }

    pub fn simple() -> Self {
        Self::new("simple", Tokenizer::Letter, vec![Arc::new(LowercaseFilter)])
    }

    pub fn keyword() -> Self {
        Self::new("keyword", Tokenizer::Keyword, Vec::new())
    }

    pub fn pattern(name: impl Into<String>, pattern: &str) -> Result<Self> {
        Ok(Self::new(name, Tokenizer::pattern(pattern)?, Vec::new()))
    }

    pub fn from_spec(name: impl Into<String>, spec: &AnalyzerSpec) -> Result<Self> {
        let tokenizer = Tokenizer::from_mode(spec.tokenizer, spec.pattern.as_deref())?;
        let filters = spec
            .filters
            .iter()
            .map(|mode| Arc::from(mode.build()))
            .collect();
        Ok(Self::new(name, tokenizer, filters))
    }

    /// Tokens de `text` sem passar pelo ciclo de vida de stream.
    pub fn analyze_text(&self, text: &str) -> Vec<Token> {
        self.chain.run(text)
    }
}

impl Analyzer for ChainAnalyzer {
    fn name(&self) -> &str {
        &self.name
    }

    fn token_stream(
        &self,
        _field: &str,
        source: Box<dyn CharSource>,
    ) -> Result<Box<dyn TokenStream>> {
        Ok(Box::new(ChainTokenStream::new(Arc::clone(&self.chain), source)))
    }
}

/// Stream de um [`ChainAnalyzer`].
///
/// A fonte é lida e fechada no primeiro `reset()`; resets seguintes repetem os mesmos
/// tokens. Sem fonte, o stream é vazio.
pub struct ChainTokenStream {
    attrs: AttributeSource,
    chain: Arc<Chain>,
    source: Option<Box<dyn CharSource>>,
    tokens: Vec<Token>,
    next: usize,
    final_offset: usize,
}

impl ChainTokenStream {
    fn new(chain: Arc<Chain>, source: Box<dyn CharSource>) -> Self {
        let mut attrs = AttributeSource::new();
        attrs.add_attribute::<CharTermAttribute>();
        attrs.add_attribute::<OffsetAttribute>();
        attrs.add_attribute::<PositionIncrementAttribute>();
        attrs.add_attribute::<TypeAttribute>();
        Self {
            attrs,
            chain,
            source: Some(source),
            tokens: Vec::new(),
            next: 0,
            final_offset: 0,
        }
    }
}

impl TokenStream for ChainTokenStream {
    fn attributes(&self) -> &AttributeSource {
        &self.attrs
    }

    fn attributes_mut(&mut self) -> &mut AttributeSource {
        &mut self.attrs
    }

    fn reset(&mut self) -> Result<()> {
        if let Some(mut source) = self.source.take() {
            let mut text = String::new();
            source.read_to_string(&mut text)?;
            source.close()?;
            self.tokens = self.chain.run(&text);
            self.final_offset = text.len();
        }
        self.next = 0;
        Ok(())
    }

    fn advance(&mut self) -> Result<bool> {
        self.attrs.clear_attributes();
        let Some(token) = self.tokens.get(self.next) else {
            return Ok(false);
        };
        self.next += 1;
        self.attrs.add_attribute::<CharTermAttribute>().set(&token.text);
        self.attrs
            .add_attribute::<OffsetAttribute>()
            .set_offset(token.start, token.end);
        self.attrs
            .add_attribute::<PositionIncrementAttribute>()
            .set_position_increment(token.position_increment);
        self.attrs.add_attribute::<TypeAttribute>().set_type(token.kind);
        Ok(true)
    }

    fn end(&mut self) -> Result<()> {
        self.attrs.clear_attributes();
        let offset = self.final_offset;
        self.attrs.add_attribute::<OffsetAttribute>().set_offset(offset, offset);
        self.attrs
            .add_attribute::<PositionIncrementAttribute>()
            .set_position_increment(0);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut source) = self.source.take() {
            source.close()?;
        }
        self.tokens.clear();
        self.next = 0;
        Ok(())
    }
}

/// Registro de analisadores por nome.
#[derive(Clone, Default)]
pub struct AnalyzerRegistry {
    analyzers: BTreeMap<String, Arc<dyn Analyzer>>,
}

impl AnalyzerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registro com `standard`, `english`, `whitespace`, `simple` e `keyword`.
    pub fn with_builtins() -> Self {
        let analyzers = [
            ChainAnalyzer::standard(),
            ChainAnalyzer::english(),
            ChainAnalyzer::whitespace(),
            ChainAnalyzer::simple(),
            ChainAnalyzer::keyword(),
        ]
        .into_iter()
        .map(|a| (a.name().to_string(), Arc::new(a) as Arc<dyn Analyzer>))
        .collect();
        Self { analyzers }
    }

    /// Registra `analyzer` sob `name`. Nomes repetidos são erro de configuração.
    pub fn register(&mut self, name: impl Into<String>, analyzer: Arc<dyn Analyzer>) -> Result<()> {
        let name = name.into();
        if self.analyzers.contains_key(&name) {
            return Err(AnalysisError::Config(format!(
                "analyzer already registered: {name}"
            )));
        }
        debug!(name = %name, "analyzer registered");
        self.analyzers.insert(name, analyzer);
        Ok(())
    }

    pub fn register_spec(&mut self, name: &str, spec: &AnalyzerSpec) -> Result<()> {
        let analyzer = ChainAnalyzer::from_spec(name, spec)?;
        self.register(name, Arc::new(analyzer))
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Analyzer>> {
        self.analyzers.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.analyzers.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.analyzers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.analyzers.is_empty()
    }
}

impl AnalyzerProvider for AnalyzerRegistry {
    fn analyzer(&self, name: &str) -> Option<Arc<dyn Analyzer>> {
        self.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::drain_tokens;
    use crate::source::{ReaderSource, StringSource};
    use crate::tokenizer::{ALPHANUM, WORD};
    use std::io::{self, Cursor};

    fn terms(analyzer: &ChainAnalyzer, text: &str) -> Vec<String> {
        let mut stream = analyzer.token_stream_for_text("body", text).unwrap();
        drain_tokens(stream.as_mut())
            .unwrap()
            .into_iter()
            .map(|t| t.term)
            .collect()
    }

    #[test]
    fn test_builtin_analyzers() {
        let text = "The Cats' toys, John's BOXES";
        assert_eq!(
            terms(&ChainAnalyzer::standard(), text),
            vec!["the", "cats", "toys", "john's", "boxes"]
        );
        assert_eq!(
            terms(&ChainAnalyzer::english(), text),
            vec!["cat", "toy", "john", "boxe"]
        );
        assert_eq!(
            terms(&ChainAnalyzer::whitespace(), text),
            vec!["The", "Cats'", "toys,", "John's", "BOXES"]
        );
        assert_eq!(
            terms(&ChainAnalyzer::simple(), text),
            vec!["the", "cats", "toys", "john", "s", "boxes"]
        );
        assert_eq!(terms(&ChainAnalyzer::keyword(), text), vec![text]);
    }

    #[test]
    fn test_stream_attributes() {
        let analyzer = ChainAnalyzer::standard();
        let mut stream = analyzer.token_stream_for_text("body", "Foo 42").unwrap();
        let tokens = drain_tokens(stream.as_mut()).unwrap();
        assert_eq!(tokens[0].kind, ALPHANUM);
        assert_eq!(tokens[1].kind, "<NUM>");
        assert_eq!((tokens[1].start, tokens[1].end), (4, 6));
        assert_eq!(tokens[1].position, 1);

        let mut stream = ChainAnalyzer::whitespace()
            .token_stream_for_text("body", "a")
            .unwrap();
        assert_eq!(drain_tokens(stream.as_mut()).unwrap()[0].kind, WORD);
    }

    #[test]
    fn test_stop_words_leave_position_holes() {
        let analyzer = ChainAnalyzer::english();
        let mut stream = analyzer.token_stream_for_text("body", "the quick fox").unwrap();
        let tokens = drain_tokens(stream.as_mut()).unwrap();
        assert_eq!(tokens[0].term, "quick");
        assert_eq!(tokens[0].position, 1);
        assert_eq!(tokens[1].position, 2);
    }

    #[test]
    fn test_reset_repeats_tokens() {
        let analyzer = ChainAnalyzer::whitespace();
        let mut stream = analyzer.token_stream_for_text("body", "a b").unwrap();
        let first = drain_tokens(stream.as_mut()).unwrap();
        assert!(first.len() == 2);
        stream.reset().unwrap();
        let mut count = 0;
        while stream.advance().unwrap() {
            count += 1;
        }
        assert_eq!(count, 0, "close releases the tokens");

        let mut stream = analyzer.token_stream_for_text("body", "a b").unwrap();
        stream.reset().unwrap();
        while stream.advance().unwrap() {}
        stream.reset().unwrap();
        assert!(stream.advance().unwrap());
    }

    #[test]
    fn test_end_sets_final_offset() {
        let analyzer = ChainAnalyzer::whitespace();
        let mut stream = analyzer.token_stream_for_text("body", "ab cd  ").unwrap();
        stream.reset().unwrap();
        while stream.advance().unwrap() {}
        stream.end().unwrap();
        let offset = stream.attributes().get::<OffsetAttribute>().copied().unwrap();
        assert_eq!((offset.start_offset(), offset.end_offset()), (7, 7));
    }

    #[test]
    fn test_read_failure_propagates() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::Other, "boom"))
            }
        }
        impl CharSource for Broken {}

        let mut stream = ChainAnalyzer::whitespace()
            .token_stream("body", Box::new(Broken))
            .unwrap();
        assert!(matches!(stream.reset(), Err(AnalysisError::Io(_))));
    }

    #[test]
    fn test_reader_source() {
        let analyzer = ChainAnalyzer::simple();
        let source = ReaderSource::new(Cursor::new(b"Hello World".to_vec()));
        let mut stream = analyzer.token_stream("body", Box::new(source)).unwrap();
        let tokens = drain_tokens(stream.as_mut()).unwrap();
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[1].term, "world");
    }

    #[test]
    fn test_pattern_and_spec() {
        let analyzer = ChainAnalyzer::pattern("digits", r"\d+").unwrap();
        assert_eq!(terms(&analyzer, "a1 b22 c333"), vec!["1", "22", "333"]);
        assert!(ChainAnalyzer::pattern("bad", "(").is_err());

        let spec = AnalyzerSpec {
            tokenizer: TokenizerMode::Whitespace,
            pattern: None,
            filters: vec![FilterMode::Lowercase, FilterMode::EnglishMinimalStem],
        };
        let analyzer = ChainAnalyzer::from_spec("custom", &spec).unwrap();
        assert_eq!(analyzer.name(), "custom");
        assert_eq!(terms(&analyzer, "Dogs RUN"), vec!["dog", "run"]);
    }

    #[test]
    fn test_registry() {
        let mut registry = AnalyzerRegistry::with_builtins();
        assert_eq!(
            registry.names(),
            vec!["english", "keyword", "simple", "standard", "whitespace"]
        );
        assert!(registry.analyzer("english").is_some());
        assert!(registry.analyzer("nope").is_none());

        let duplicate = registry.register("english", Arc::new(ChainAnalyzer::english()));
        assert!(matches!(duplicate, Err(AnalysisError::Config(_))));

        let spec = AnalyzerSpec {
            tokenizer: TokenizerMode::Letter,
            ..AnalyzerSpec::default()
        };
        registry.register_spec("letters", &spec).unwrap();
        assert_eq!(registry.len(), 6);
        assert_eq!(registry.get("letters").unwrap().name(), "letters");
    }

    #[test]
    fn test_source_is_closed_after_reading() {
        let source = StringSource::new("a b");
        let mut stream = ChainAnalyzer::whitespace()
            .token_stream("body", Box::new(source))
            .unwrap();
        stream.reset().unwrap();
        stream.close().unwrap();
        stream.close().unwrap();
    }
}

//! # Duplicação de Fontes
//!
//! Cada analisador selecionado precisa ler **a mesma entrada** de forma independente.
//! Uma [`CharSource`] só pode ser lida uma vez, então um [`SourceCloner`] toma posse da
//! fonte original, remove a tag inicial (ver [`crate::tag`]) e passa a entregar quantas
//! cópias independentes do resto forem pedidas.
//!
//! ## Estratégias
//!
//! | Estratégia | Formas | Custo |
//! |------------|--------|-------|
//! | [`SharedTextCloner`] | `string` (e derivadas) | zero-copy sobre `Arc<str>` |
//! | [`CharArrayCloner`] | `char-array` | zero-copy sobre `Arc<[char]>` |
//! | [`BufferingCloner`] | `generic` | uma leitura completa + uma cópia |
//!
//! ## Resolução
//!
//! O [`ClonerRegistry`] associa formas a fábricas de estratégia. A busca começa pela forma
//! exata da fonte e sobe pelos ancestrais até `generic`, que está sempre registrada em
//! [`ClonerRegistry::with_defaults`]. O registro é montado uma vez na inicialização e depois
//! só é lido (compartilhe via `Arc`).
//!
//! ```rust
//! use dynan_core::cloner::ClonerRegistry;
//! use dynan_core::source::StringSource;
//! use std::io::Read;
//!
//! let registry = ClonerRegistry::with_defaults().unwrap();
//! let mut cloner = registry
//!     .cloner_for(Box::new(StringSource::new("[std]foo bar")), Some("["))
//!     .unwrap();
//! assert_eq!(cloner.extracted_tag(), Some("std"));
//!
//! let mut copia = String::new();
//! cloner.next_copy().read_to_string(&mut copia).unwrap();
//! assert_eq!(copia, "foo bar");
//! ```

use std::collections::HashMap;
use std::io::Read;
use std::ops::Range;
use std::sync::Arc;

use tracing::debug;

use crate::error::{AnalysisError, Result};
use crate::source::{
    BackingBuffer, CharArraySource, CharSource, SourceShape, StringSource,
};
use crate::tag::{strip_tag, strip_tag_chars};

/// Capacidade inicial padrão do buffer da estratégia genérica (64 KiB).
pub const DEFAULT_INITIAL_CAPACITY: usize = 64 * 1024;
/// Tamanho padrão de cada leitura da estratégia genérica (16 KiB).
pub const DEFAULT_READ_CHUNK_SIZE: usize = 16 * 1024;

/// Estratégia que entrega cópias independentes do conteúdo de uma fonte.
pub trait SourceCloner: Send {
    /// Toma posse de `source` (que pode ser fechada aqui) e remove a tag, se houver
    /// `expected_delimiter`.
    fn init(&mut self, source: Box<dyn CharSource>, expected_delimiter: Option<&str>)
        -> Result<()>;

    /// Uma nova cópia do conteúdo sem a tag.
    ///
    /// A primeira chamada pode devolver a própria fonte original, se ela não foi consumida
    /// em `init`. As seguintes sempre devolvem cópias novas.
    fn next_copy(&mut self) -> Box<dyn CharSource>;

    fn extracted_tag(&self) -> Option<&str>;

    /// Libera o conteúdo retido.
    fn release(&mut self) {}
}

/// Fábrica de estratégias, registrada por forma no [`ClonerRegistry`].
pub trait ClonerFactory: Send + Sync {
    fn create(&self) -> Box<dyn SourceCloner>;

    /// Verificação feita no momento do registro. Estratégias especializadas inspecionam
    /// `probe`, uma fonte da forma registrada, e confirmam que ela expõe o buffer esperado.
    fn validate(&self, _shape: SourceShape, _probe: Option<&dyn CharSource>) -> Result<()> {
        Ok(())
    }
}

/// Construtor de uma fonte de exemplo, usada só para validar um binding.
pub type SourceProbe = fn() -> Box<dyn CharSource>;

/// Buffer exposto pela fonte de exemplo de um binding especializado.
fn probe_buffer(
    strategy: &str,
    shape: SourceShape,
    probe: Option<&dyn CharSource>,
) -> Result<BackingBuffer> {
    let probe = probe.ok_or_else(|| {
        AnalysisError::Config(format!(
            "{strategy} cloner bound to {shape:?} without a probe source"
        ))
    })?;
    if probe.shape() != shape {
        return Err(AnalysisError::Config(format!(
            "{strategy} cloner bound to {shape:?} with a probe of shape {:?}",
            probe.shape()
        )));
    }
    probe
        .as_duplicatable()
        .and_then(|d| d.backing_buffer())
        .ok_or_else(|| {
            AnalysisError::Config(format!(
                "{strategy} cloner cannot serve {shape:?}: source does not expose its buffer"
            ))
        })
}

/// Buffer de uma fonte recebida em tempo de requisição.
fn request_buffer(source: &dyn CharSource) -> Result<BackingBuffer> {
    let shape = source.shape();
    let duplicatable = source.as_duplicatable().ok_or_else(|| {
        AnalysisError::Duplication(format!(
            "source of shape {shape:?} does not expose its backing buffer"
        ))
    })?;
    duplicatable.backing_buffer().ok_or_else(|| {
        AnalysisError::Duplication(format!(
            "source of shape {shape:?} was left in the middle of a character"
        ))
    })
}

// =====================================================================
// SharedTextCloner
// =====================================================================

/// Estratégia zero-copy para fontes que expõem um `Arc<str>`.
#[derive(Default)]
pub struct SharedTextCloner {
    original: Option<Box<dyn CharSource>>,
    text: Option<Arc<str>>,
    range: Range<usize>,
    tag: Option<String>,
}

impl SharedTextCloner {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SourceCloner for SharedTextCloner {
    fn init(
        &mut self,
        source: Box<dyn CharSource>,
        expected_delimiter: Option<&str>,
    ) -> Result<()> {
        let shape = source.shape();
        let buffer = request_buffer(&*source)?;
        let BackingBuffer::Text { text, range } = buffer else {
            return Err(AnalysisError::Duplication(format!(
                "source of shape {shape:?} exposes a char buffer, expected text"
            )));
        };

        self.tag = None;
        self.range = range.clone();
        match expected_delimiter {
            Some(delimiter) => {
                let split = strip_tag(&text[range.clone()], delimiter);
                self.tag = split.tag.map(str::to_string);
                self.range = range.start + split.rest_offset..range.end;
                // A original ainda aponta para a tag: as cópias partem do resto
                self.original = None;
            }
            None => self.original = Some(source),
        }
        self.text = Some(text);
        Ok(())
    }

    fn next_copy(&mut self) -> Box<dyn CharSource> {
        if let Some(original) = self.original.take() {
            return original;
        }
        let text = self.text.clone().unwrap_or_else(|| Arc::from(""));
        Box::new(StringSource::from_shared(text, self.range.clone()))
    }

    fn extracted_tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    fn release(&mut self) {
        self.original = None;
        self.text = None;
    }
}

/// Fábrica de [`SharedTextCloner`].
pub struct SharedTextClonerFactory;

impl ClonerFactory for SharedTextClonerFactory {
    fn create(&self) -> Box<dyn SourceCloner> {
        Box::new(SharedTextCloner::new())
    }

    fn validate(&self, shape: SourceShape, probe: Option<&dyn CharSource>) -> Result<()> {
        match probe_buffer("shared text", shape, probe)? {
            BackingBuffer::Text { .. } => Ok(()),
            BackingBuffer::Chars { .. } => Err(AnalysisError::Config(format!(
                "shared text cloner cannot serve {shape:?}: source exposes a char buffer"
            ))),
        }
    }
}

// =====================================================================
// CharArrayCloner
// =====================================================================

/// Estratégia zero-copy para fontes que expõem um `Arc<[char]>`.
#[derive(Default)]
pub struct CharArrayCloner {
    original: Option<Box<dyn CharSource>>,
    chars: Option<Arc<[char]>>,
    range: Range<usize>,
    tag: Option<String>,
}

impl CharArrayCloner {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SourceCloner for CharArrayCloner {
    fn init(
        &mut self,
        source: Box<dyn CharSource>,
        expected_delimiter: Option<&str>,
    ) -> Result<()> {
        let shape = source.shape();
        let buffer = request_buffer(&*source)?;
        let BackingBuffer::Chars { chars, range } = buffer else {
            return Err(AnalysisError::Duplication(format!(
                "source of shape {shape:?} exposes text, expected a char buffer"
            )));
        };

        self.tag = None;
        self.range = range.clone();
        match expected_delimiter {
            Some(delimiter) => {
                let split = strip_tag_chars(&chars[range.clone()], delimiter);
                self.tag = split.tag;
                self.range = range.start + split.rest_offset..range.end;
                self.original = None;
            }
            None => self.original = Some(source),
        }
        self.chars = Some(chars);
        Ok(())
    }

    fn next_copy(&mut self) -> Box<dyn CharSource> {
        if let Some(original) = self.original.take() {
            return original;
        }
        let chars = self.chars.clone().unwrap_or_else(|| Arc::from(Vec::<char>::new()));
        Box::new(CharArraySource::from_shared(chars, self.range.clone()))
    }

    fn extracted_tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    fn release(&mut self) {
        self.original = None;
        self.chars = None;
    }
}

/// Fábrica de [`CharArrayCloner`].
pub struct CharArrayClonerFactory;

impl ClonerFactory for CharArrayClonerFactory {
    fn create(&self) -> Box<dyn SourceCloner> {
        Box::new(CharArrayCloner::new())
    }

    fn validate(&self, shape: SourceShape, probe: Option<&dyn CharSource>) -> Result<()> {
        match probe_buffer("char array", shape, probe)? {
            BackingBuffer::Chars { .. } => Ok(()),
            BackingBuffer::Text { .. } => Err(AnalysisError::Config(format!(
                "char array cloner cannot serve {shape:?}: source exposes text"
            ))),
        }
    }
}

// =====================================================================
// BufferingCloner
// =====================================================================

/// Estratégia universal: drena a fonte para um buffer em memória.
///
/// Nunca depende da estrutura interna da fonte, mas custa uma leitura completa e uma
/// cópia antecipada do conteúdo.
pub struct BufferingCloner {
    initial_capacity: usize,
    read_chunk_size: usize,
    content: Option<Arc<str>>,
    range: Range<usize>,
    tag: Option<String>,
}

impl BufferingCloner {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_INITIAL_CAPACITY, DEFAULT_READ_CHUNK_SIZE)
    }

    pub fn with_capacity(initial_capacity: usize, read_chunk_size: usize) -> Self {
        Self {
            initial_capacity,
            read_chunk_size: read_chunk_size.max(1),
            content: None,
            range: 0..0,
            tag: None,
        }
    }
}

impl Default for BufferingCloner {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceCloner for BufferingCloner {
    fn init(
        &mut self,
        mut source: Box<dyn CharSource>,
        expected_delimiter: Option<&str>,
    ) -> Result<()> {
        self.content = None;
        self.tag = None;

        let mut bytes = Vec::with_capacity(self.initial_capacity);
        let mut chunk = vec![0u8; self.read_chunk_size];
        loop {
            match source.read(&mut chunk) {
                Ok(0) => break,
                Ok(read) => bytes.extend_from_slice(&chunk[..read]),
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        source.close()?;

        let text = String::from_utf8(bytes)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let content: Arc<str> = Arc::from(text);

        self.range = 0..content.len();
        if let Some(delimiter) = expected_delimiter {
            let split = strip_tag(&content, delimiter);
            self.tag = split.tag.map(str::to_string);
            self.range = split.rest_offset..content.len();
        }
        self.content = Some(content);
        Ok(())
    }

    fn next_copy(&mut self) -> Box<dyn CharSource> {
        let content = self.content.clone().unwrap_or_else(|| Arc::from(""));
        Box::new(StringSource::from_shared(content, self.range.clone()))
    }

    fn extracted_tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    fn release(&mut self) {
        self.content = None;
    }
}

/// Fábrica de [`BufferingCloner`] com capacidade e tamanho de leitura configuráveis.
#[derive(Debug, Clone, Copy)]
pub struct BufferingClonerFactory {
    pub initial_capacity: usize,
    pub read_chunk_size: usize,
}

impl Default for BufferingClonerFactory {
    fn default() -> Self {
        Self {
            initial_capacity: DEFAULT_INITIAL_CAPACITY,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
        }
    }
}

impl ClonerFactory for BufferingClonerFactory {
    fn create(&self) -> Box<dyn SourceCloner> {
        Box::new(BufferingCloner::with_capacity(
            self.initial_capacity,
            self.read_chunk_size,
        ))
    }
}

// =====================================================================
// ClonerRegistry
// =====================================================================

fn string_probe() -> Box<dyn CharSource> {
    Box::new(StringSource::new(""))
}

fn char_array_probe() -> Box<dyn CharSource> {
    Box::new(CharArraySource::new(Vec::<char>::new()))
}

/// Tabela forma → estratégia. Escrita apenas durante a montagem.
#[derive(Default)]
pub struct ClonerRegistry {
    bindings: HashMap<&'static str, Arc<dyn ClonerFactory>>,
}

impl ClonerRegistry {
    /// Registro vazio (sem fallback). Prefira [`ClonerRegistry::with_defaults`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Registro com o fallback genérico e as estratégias zero-copy embutidas.
    pub fn with_defaults() -> Result<Self> {
        Self::with_buffering(BufferingClonerFactory::default())
    }

    /// Como [`with_defaults`](Self::with_defaults), com parâmetros próprios para o fallback.
    pub fn with_buffering(buffering: BufferingClonerFactory) -> Result<Self> {
        let mut registry = Self::new();
        registry.bind(SourceShape::GENERIC, Arc::new(buffering))?;
        registry.bind_probed(
            SourceShape::STRING,
            Arc::new(SharedTextClonerFactory),
            string_probe,
        )?;
        registry.bind_probed(
            SourceShape::CHAR_ARRAY,
            Arc::new(CharArrayClonerFactory),
            char_array_probe,
        )?;
        Ok(registry)
    }

    /// Associa `shape` a uma fábrica que não depende da estrutura da fonte.
    /// Registrar a mesma forma duas vezes é erro fatal.
    pub fn bind(&mut self, shape: SourceShape, factory: Arc<dyn ClonerFactory>) -> Result<()> {
        self.bind_checked(shape, factory, None)
    }

    /// Associa `shape` a uma estratégia especializada, validada contra uma fonte criada
    /// por `probe`.
    pub fn bind_probed(
        &mut self,
        shape: SourceShape,
        factory: Arc<dyn ClonerFactory>,
        probe: SourceProbe,
    ) -> Result<()> {
        let source = probe();
        self.bind_checked(shape, factory, Some(&*source))
    }

    fn bind_checked(
        &mut self,
        shape: SourceShape,
        factory: Arc<dyn ClonerFactory>,
        probe: Option<&dyn CharSource>,
    ) -> Result<()> {
        if self.bindings.contains_key(shape.name()) {
            return Err(AnalysisError::DuplicateBinding(shape.name()));
        }
        factory.validate(shape, probe)?;
        debug!(shape = shape.name(), "cloner bound");
        self.bindings.insert(shape.name(), factory);
        Ok(())
    }

    pub fn is_bound(&self, shape: SourceShape) -> bool {
        self.bindings.contains_key(shape.name())
    }

    /// Fábrica para a forma mais específica registrada na ancestralidade de `shape`.
    pub fn resolve(&self, shape: SourceShape) -> Result<(SourceShape, Arc<dyn ClonerFactory>)> {
        shape
            .ancestry()
            .find_map(|s| self.bindings.get(s.name()).map(|f| (s, Arc::clone(f))))
            .ok_or_else(|| {
                AnalysisError::Config(format!(
                    "no cloner bound for {shape:?} nor any of its ancestors"
                ))
            })
    }

    /// Escolhe, cria e inicializa a estratégia para `source`.
    ///
    /// Uma falha de inicialização aborta a requisição; não há recuo para a estratégia
    /// genérica.
    pub fn cloner_for(
        &self,
        source: Box<dyn CharSource>,
        expected_delimiter: Option<&str>,
    ) -> Result<Box<dyn SourceCloner>> {
        let (bound, factory) = self.resolve(source.shape())?;
        debug!(
            source = source.shape().name(),
            strategy = bound.name(),
            "cloner resolved"
        );
        let mut cloner = factory.create();
        cloner.init(source, expected_delimiter)?;
        Ok(cloner)
    }
}

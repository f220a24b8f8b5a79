//! # Analisador Dinâmico
//!
//! Ponto de entrada por requisição: a tag no início do texto escolhe quais analisadores
//! processam o conteúdo, e as saídas deles são concatenadas por um
//! [`PositionedTokenStreams`].
//!
//! ```text
//!  "[std]foo bar"
//!        │
//!        ▼
//!  ┌──────────────┐   tag = "std"   ┌────────────────┐
//!  │ SourceCloner │ ──────────────▶ │ tag → [std, ws]│
//!  └──────┬───────┘                 └────────┬───────┘
//!         │ next_copy() × N                  │
//!         ▼                                  ▼
//!   std.token_stream(copy)    ws.token_stream(copy)
//!         └──────────────┬──────────────────┘
//!                        ▼
//!              PositionedTokenStreams (gap)
//! ```
//!
//! Sem tag, ou com uma tag desconhecida, vale a lista padrão de analisadores.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::analysis::{Analyzer, TokenStream};
use crate::attributes::AttributeSource;
use crate::cloner::{ClonerRegistry, SourceCloner};
use crate::error::{AnalysisError, Result};
use crate::positioned::PositionedTokenStreams;
use crate::source::CharSource;
use crate::tag::normalize_delimiter;

/// Como a tag de uma requisição foi resolvida.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    /// Tag extraída do texto, se havia uma.
    pub tag: Option<String>,
    /// `true` quando a tag existe no mapeamento (senão valeu a lista padrão).
    pub matched: bool,
    /// Nomes dos analisadores aplicados, em ordem.
    pub analyzers: Vec<String>,
}

/// Configuração imutável compartilhada entre o analisador e seus componentes.
struct Routing {
    delimiter: String,
    gap: i64,
    default_analyzers: Vec<Arc<dyn Analyzer>>,
    tag_analyzers: HashMap<String, Vec<Arc<dyn Analyzer>>>,
    cloners: Arc<ClonerRegistry>,
}

impl Routing {
    fn select(&self, tag: Option<&str>) -> (&[Arc<dyn Analyzer>], bool) {
        match tag.and_then(|t| self.tag_analyzers.get(t)) {
            Some(analyzers) => (analyzers.as_slice(), true),
            None => (self.default_analyzers.as_slice(), false),
        }
    }
}

/// Multiplexa analisadores escolhidos pela tag inicial do texto.
#[derive(Clone)]
pub struct DynamicAnalyzer {
    routing: Arc<Routing>,
}

impl DynamicAnalyzer {
    /// Cria o analisador.
    ///
    /// `delimiter` é normalizado para terminar em `[`; `gap` negativo vira 0.
    /// `default_analyzers` não pode ser vazia.
    pub fn new(
        delimiter: &str,
        gap: i64,
        default_analyzers: Vec<Arc<dyn Analyzer>>,
        tag_analyzers: HashMap<String, Vec<Arc<dyn Analyzer>>>,
        cloners: Arc<ClonerRegistry>,
    ) -> Result<Self> {
        if default_analyzers.is_empty() {
            return Err(AnalysisError::Config(
                "dynamic analyzer must have at least one default analyzer".to_string(),
            ));
        }
        Ok(Self {
            routing: Arc::new(Routing {
                delimiter: normalize_delimiter(delimiter).into_owned(),
                gap: gap.max(0),
                default_analyzers,
                tag_analyzers,
                cloners,
            }),
        })
    }

    pub fn delimiter(&self) -> &str {
        &self.routing.delimiter
    }

    pub fn gap(&self) -> i64 {
        self.routing.gap
    }

    pub fn default_analyzer_names(&self) -> Vec<String> {
        names(&self.routing.default_analyzers)
    }

    /// Mapeamento tag → nomes dos analisadores, em ordem de tag.
    pub fn tag_analyzer_names(&self) -> BTreeMap<String, Vec<String>> {
        self.routing
            .tag_analyzers
            .iter()
            .map(|(tag, analyzers)| (tag.clone(), names(analyzers)))
            .collect()
    }

    /// Um multiplexador novo para `field`, ainda sem fonte.
    pub fn create_components(&self, field: &str) -> TokenStreamComponents {
        TokenStreamComponents {
            field: field.to_string(),
            routing: Arc::clone(&self.routing),
            sink: PositionedTokenStreams::new(self.routing.gap),
            cloner: None,
            resolution: None,
        }
    }
}

fn names(analyzers: &[Arc<dyn Analyzer>]) -> Vec<String> {
    analyzers.iter().map(|a| a.name().to_string()).collect()
}

impl Analyzer for DynamicAnalyzer {
    fn name(&self) -> &str {
        "dynamic"
    }

    fn token_stream(
        &self,
        field: &str,
        source: Box<dyn CharSource>,
    ) -> Result<Box<dyn TokenStream>> {
        let mut components = self.create_components(field);
        components.set_source(source)?;
        Ok(Box::new(components))
    }
}

/// O multiplexador de uma requisição e o passo de setup que o alimenta.
///
/// Ciclo: [`set_source`](Self::set_source) → `reset` → `advance`* → `end` → `close`.
/// `set_source` pode ser chamado de novo para reaproveitar os componentes com outro texto.
pub struct TokenStreamComponents {
    field: String,
    routing: Arc<Routing>,
    sink: PositionedTokenStreams,
    cloner: Option<Box<dyn SourceCloner>>,
    resolution: Option<Resolution>,
}

impl TokenStreamComponents {
    /// Extrai a tag, escolhe os analisadores e instala um sub-stream por analisador,
    /// cada um sobre sua própria cópia do conteúdo.
    ///
    /// O grafo da fonte anterior é fechado antes; se a montagem falhar, os componentes
    /// ficam vazios.
    pub fn set_source(&mut self, source: Box<dyn CharSource>) -> Result<()> {
        self.discard_graph();

        let routing = Arc::clone(&self.routing);
        let mut cloner = routing
            .cloners
            .cloner_for(source, Some(&routing.delimiter))?;
        let tag = cloner.extracted_tag().map(str::to_string);
        let (analyzers, matched) = routing.select(tag.as_deref());

        let mut streams: Vec<Option<Box<dyn TokenStream>>> = Vec::with_capacity(analyzers.len());
        for analyzer in analyzers {
            match analyzer.token_stream(&self.field, cloner.next_copy()) {
                Ok(stream) => streams.push(Some(stream)),
                Err(err) => {
                    for stream in streams.iter_mut().flatten() {
                        if let Err(close_err) = stream.close() {
                            warn!(
                                field = %self.field,
                                error = %close_err,
                                "sub-stream close failed"
                            );
                        }
                    }
                    cloner.release();
                    return Err(err);
                }
            }
        }
        self.sink.set_token_streams(streams);

        let resolution = Resolution {
            tag,
            matched,
            analyzers: names(analyzers),
        };
        debug!(
            field = %self.field,
            tag = ?resolution.tag,
            matched = resolution.matched,
            analyzers = ?resolution.analyzers,
            "tag resolved"
        );
        self.resolution = Some(resolution);
        self.cloner = Some(cloner);
        Ok(())
    }

    /// Resolução da última fonte instalada.
    pub fn resolution(&self) -> Option<&Resolution> {
        self.resolution.as_ref()
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn multiplexer(&self) -> &PositionedTokenStreams {
        &self.sink
    }

    /// Fecha os sub-streams instalados e esvazia o multiplexador.
    fn discard_graph(&mut self) {
        if let Err(err) = self.sink.close() {
            warn!(field = %self.field, error = %err, "previous stream graph failed to close");
        }
        self.sink.set_token_streams(Vec::new());
        self.release_cloner();
        self.resolution = None;
    }

    fn release_cloner(&mut self) {
        if let Some(mut cloner) = self.cloner.take() {
            cloner.release();
        }
    }
}

impl TokenStream for TokenStreamComponents {
    fn attributes(&self) -> &AttributeSource {
        self.sink.attributes()
    }

    fn attributes_mut(&mut self) -> &mut AttributeSource {
        self.sink.attributes_mut()
    }

    fn reset(&mut self) -> Result<()> {
        self.sink.reset()
    }

    fn advance(&mut self) -> Result<bool> {
        self.sink.advance()
    }

    fn end(&mut self) -> Result<()> {
        self.sink.end()
    }

    fn close(&mut self) -> Result<()> {
        let closed = self.sink.close();
        self.release_cloner();
        closed
    }
}

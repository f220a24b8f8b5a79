//! # Pipeline de Análise: Orquestrador com Eventos Observáveis
//!
//! O pipeline coordena a análise dinâmica de um texto (resolução da tag, duplicação da
//! fonte, sub-streams, fusão de posições) e emite eventos em cada passo via um canal
//! Rust (`mpsc`), permitindo que o servidor WebSocket transmita o progresso em tempo
//! real para o cliente.

use std::sync::mpsc;
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::analysis::{visit_tokens, AnalyzedToken, AnalyzerProvider};
use crate::analyzers::AnalyzerRegistry;
use crate::cloner::ClonerRegistry;
use crate::dynamic::Resolution;
use crate::error::Result;
use crate::resolver::{DynamicAnalyzerConfig, LazyDynamicAnalyzer};
use crate::source::StringSource;

/// Campo usado quando o chamador não informa um.
pub const DEFAULT_FIELD: &str = "body";

/// Eventos emitidos pelo pipeline durante o processamento.
///
/// Permitem que a UI acompanhe a análise passo a passo.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum AnalysisEvent {
    /// **Passo 1**: Tag extraída e analisadores escolhidos.
    TagResolved {
        tag: Option<String>,
        matched: bool,
        analyzers: Vec<String>,
    },
    /// **Passo 2 (Loop)**: Um token do stream fundido.
    Token {
        index: usize,
        token: AnalyzedToken,
    },
    /// **Conclusão**: Todos os tokens e estatísticas de tempo.
    Done {
        tokens: Vec<AnalyzedToken>,
        total_tokens: usize,
        processing_ms: u64,
    },
    /// **Falha**: Erro de configuração ou da requisição.
    Error {
        message: String,
    },
}

/// Resultado de uma análise síncrona.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisOutcome {
    pub tokens: Vec<AnalyzedToken>,
    pub resolution: Resolution,
    pub processing_ms: u64,
}

/// O pipeline de análise dinâmica.
///
/// # Modos de Uso
/// - **Sync**: [`analyze`](Self::analyze) para scripts e chamadas diretas.
/// - **Streaming**: [`analyze_streaming`](Self::analyze_streaming) para UIs reativas.
/// - **Lote**: [`analyze_batch`](Self::analyze_batch) processa vários textos em paralelo.
pub struct AnalysisPipeline {
    analyzer: LazyDynamicAnalyzer,
}

impl AnalysisPipeline {
    pub fn new(
        config: DynamicAnalyzerConfig,
        provider: Arc<dyn AnalyzerProvider>,
        cloners: Arc<ClonerRegistry>,
    ) -> Result<Self> {
        Ok(Self {
            analyzer: LazyDynamicAnalyzer::new(config, provider, cloners)?,
        })
    }

    /// Pipeline sobre os analisadores embutidos e as estratégias de duplicação padrão.
    pub fn with_builtins(config: DynamicAnalyzerConfig) -> Result<Self> {
        Self::new(
            config,
            Arc::new(AnalyzerRegistry::with_builtins()),
            Arc::new(ClonerRegistry::with_defaults()?),
        )
    }

    pub fn analyzer(&self) -> &LazyDynamicAnalyzer {
        &self.analyzer
    }

    /// Processa o texto de forma síncrona e retorna o resultado final.
    pub fn analyze(&self, field: &str, text: &str) -> Result<AnalysisOutcome> {
        self.run(field, text, None)
    }

    /// Executa a análise enviando eventos de progresso em tempo real.
    ///
    /// # Fluxo de Eventos
    /// 1. `TagResolved`: tag e analisadores escolhidos.
    /// 2. `Token` (Loop): cada token do stream fundido, em ordem.
    /// 3. `Done`: resultado consolidado.
    ///
    /// Qualquer falha encerra o fluxo com um único `Error`.
    pub fn analyze_streaming(&self, field: &str, text: &str, tx: mpsc::Sender<AnalysisEvent>) {
        if let Err(err) = self.run(field, text, Some(&tx)) {
            let _ = tx.send(AnalysisEvent::Error {
                message: err.to_string(),
            });
        }
    }

    /// Analisa vários textos em paralelo. Cada texto tem seu próprio grafo de streams.
    pub fn analyze_batch(&self, field: &str, texts: &[String]) -> Vec<Result<AnalysisOutcome>> {
        texts
            .par_iter()
            .map(|text| self.analyze(field, text))
            .collect()
    }

    fn run(
        &self,
        field: &str,
        text: &str,
        tx: Option<&mpsc::Sender<AnalysisEvent>>,
    ) -> Result<AnalysisOutcome> {
        let start = Instant::now();
        let analyzer = self.analyzer.get_or_build()?;

        // === Passo 1: Tag e duplicação da fonte ===
        let mut components = analyzer.create_components(field);
        components.set_source(Box::new(StringSource::new(text)))?;
        let resolution = components.resolution().cloned().unwrap_or_default();
        if let Some(tx) = tx {
            let _ = tx.send(AnalysisEvent::TagResolved {
                tag: resolution.tag.clone(),
                matched: resolution.matched,
                analyzers: resolution.analyzers.clone(),
            });
        }

        // === Passo 2: Consumo do stream fundido ===
        let mut tokens = Vec::new();
        visit_tokens(&mut components, |token| {
            if let Some(tx) = tx {
                let _ = tx.send(AnalysisEvent::Token {
                    index: tokens.len(),
                    token: token.clone(),
                });
            }
            tokens.push(token);
        })?;

        let processing_ms = start.elapsed().as_millis() as u64;
        debug!(
            field,
            tokens = tokens.len(),
            processing_ms,
            "analysis finished"
        );
        if let Some(tx) = tx {
            let _ = tx.send(AnalysisEvent::Done {
                tokens: tokens.clone(),
                total_tokens: tokens.len(),
                processing_ms,
            });
        }
        Ok(AnalysisOutcome {
            tokens,
            resolution,
            processing_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AnalysisError;

    fn pipeline() -> AnalysisPipeline {
        let config = DynamicAnalyzerConfig::new(["english", "whitespace"])
            .include("kw", ["keyword"])
            .exclude("en", ["whitespace"]);
        AnalysisPipeline::with_builtins(config).unwrap()
    }

    #[test]
    fn test_pipeline_basic() {
        let outcome = pipeline().analyze(DEFAULT_FIELD, "[en]The Cats").unwrap();
        assert_eq!(outcome.resolution.tag.as_deref(), Some("en"));
        assert!(outcome.resolution.matched);
        assert_eq!(outcome.resolution.analyzers, vec!["english"]);
        assert_eq!(outcome.tokens.len(), 1);
        assert_eq!(outcome.tokens[0].term, "cat");
        assert_eq!((outcome.tokens[0].start, outcome.tokens[0].end), (4, 8));
    }

    #[test]
    fn test_pipeline_merges_defaults() {
        let outcome = pipeline().analyze(DEFAULT_FIELD, "Dogs bark").unwrap();
        let terms: Vec<&str> = outcome.tokens.iter().map(|t| t.term.as_str()).collect();
        assert_eq!(terms, vec!["dog", "bark", "Dogs", "bark"]);
        assert_eq!(outcome.tokens[2].position_increment, 1001);
        assert_eq!(outcome.tokens[2].position, 1002);
        assert!(outcome.resolution.tag.is_none());
    }

    #[test]
    fn test_pipeline_empty() {
        let outcome = pipeline().analyze(DEFAULT_FIELD, "").unwrap();
        assert!(outcome.tokens.is_empty());
        assert_eq!(outcome.resolution.analyzers, vec!["english", "whitespace"]);
    }

    #[test]
    fn test_pipeline_events_streaming() {
        let pipeline = pipeline();
        let (tx, rx) = mpsc::channel();
        pipeline.analyze_streaming(DEFAULT_FIELD, "[kw]Foo bar", tx);

        let events: Vec<AnalysisEvent> = rx.try_iter().collect();
        assert!(
            matches!(&events[0], AnalysisEvent::TagResolved { matched: true, .. }),
            "Primeiro evento deve ser TagResolved"
        );
        let token_events = events
            .iter()
            .filter(|e| matches!(e, AnalysisEvent::Token { .. }))
            .count();
        // english (foo, bar) + whitespace (Foo, bar) + keyword ("Foo bar")
        assert_eq!(token_events, 5);
        match events.last().unwrap() {
            AnalysisEvent::Done { total_tokens, .. } => assert_eq!(*total_tokens, 5),
            other => panic!("Último evento deve ser Done, veio {other:?}"),
        }
    }

    #[test]
    fn test_streaming_reports_configuration_error() {
        let config = DynamicAnalyzerConfig::new(["missing"]);
        let pipeline = AnalysisPipeline::with_builtins(config).unwrap();
        assert!(matches!(
            pipeline.analyze(DEFAULT_FIELD, "x"),
            Err(AnalysisError::UnknownAnalyzer(_))
        ));

        let (tx, rx) = mpsc::channel();
        pipeline.analyze_streaming(DEFAULT_FIELD, "x", tx);
        let events: Vec<AnalysisEvent> = rx.try_iter().collect();
        assert_eq!(events.len(), 1);
        match &events[0] {
            AnalysisEvent::Error { message } => assert!(message.contains("missing")),
            other => panic!("esperado Error, veio {other:?}"),
        }
    }

    #[test]
    fn test_batch_matches_sequential() {
        let pipeline = pipeline();
        let texts: Vec<String> = (0..32)
            .map(|i| format!("[en]item {i} of the batch"))
            .collect();
        let results = pipeline.analyze_batch(DEFAULT_FIELD, &texts);
        assert_eq!(results.len(), texts.len());
        for (text, result) in texts.iter().zip(results) {
            let expected = pipeline.analyze(DEFAULT_FIELD, text).unwrap();
            assert_eq!(result.unwrap().tokens, expected.tokens);
        }
    }

    #[test]
    fn test_event_serialization_shape() {
        let event = AnalysisEvent::Error {
            message: "boom".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "Error");
        assert_eq!(json["data"]["message"], "boom");
    }
}

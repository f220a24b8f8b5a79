//! # Resolução de Tags
//!
//! Compõe, a partir de uma lista base e dos mapas de inclusão/exclusão por tag, a lista
//! final de analisadores de cada tag, e constrói o [`DynamicAnalyzer`] sob demanda.
//!
//! ## Regras de Composição
//!
//! ```text
//! base = [a, b]
//! include: x → [c]         exclude: x → [a]        exclude: y → [b]
//!
//! x → [b, c]     (base ∪ include, depois − exclude)
//! y → [a]        (só exclusão: parte da base)
//! z → ausente    (sem entrada: quem consulta usa a base)
//! ```
//!
//! Uma tag só com exclusão que não remove nada da base também fica ausente.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::analysis::{Analyzer, AnalyzerProvider};
use crate::cloner::ClonerRegistry;
use crate::dynamic::DynamicAnalyzer;
use crate::error::{AnalysisError, Result};

pub const DEFAULT_DELIMITER: &str = "[";
pub const DEFAULT_GAP: i64 = 1000;

fn default_delimiter() -> String {
    DEFAULT_DELIMITER.to_string()
}

fn default_gap() -> i64 {
    DEFAULT_GAP
}

/// Configuração de um analisador dinâmico por nomes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicAnalyzerConfig {
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
    /// Negativo é tratado como 0.
    #[serde(default = "default_gap")]
    pub gap: i64,
    pub base_analyzers: Vec<String>,
    #[serde(default)]
    pub include: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub exclude: BTreeMap<String, Vec<String>>,
}

impl DynamicAnalyzerConfig {
    pub fn new<I, S>(base_analyzers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            delimiter: default_delimiter(),
            gap: DEFAULT_GAP,
            base_analyzers: base_analyzers.into_iter().map(Into::into).collect(),
            include: BTreeMap::new(),
            exclude: BTreeMap::new(),
        }
    }

    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    pub fn with_gap(mut self, gap: i64) -> Self {
        self.gap = gap;
        self
    }

    pub fn include<I, S>(mut self, tag: impl Into<String>, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include
            .insert(tag.into(), names.into_iter().map(Into::into).collect());
        self
    }

    pub fn exclude<I, S>(mut self, tag: impl Into<String>, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude
            .insert(tag.into(), names.into_iter().map(Into::into).collect());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_analyzers.is_empty() {
            return Err(AnalysisError::Config(
                "dynamic analyzer must have a non-empty `base_analyzers` list".to_string(),
            ));
        }
        Ok(())
    }

    /// Mapa tag → nomes, já composto.
    pub fn composed_tags(&self) -> BTreeMap<String, Vec<String>> {
        compose_tag_analyzers(&self.base_analyzers, &self.include, &self.exclude)
    }
}

/// Inserção ordenada sem duplicatas.
fn push_unique(names: &mut Vec<String>, name: &str) {
    if !names.iter().any(|n| n == name) {
        names.push(name.to_string());
    }
}

/// Compõe a lista de nomes de cada tag com entrada em `include` ou `exclude`.
pub fn compose_tag_analyzers(
    base: &[String],
    include: &BTreeMap<String, Vec<String>>,
    exclude: &BTreeMap<String, Vec<String>>,
) -> BTreeMap<String, Vec<String>> {
    let unique_base = || {
        let mut names = Vec::with_capacity(base.len());
        for name in base {
            push_unique(&mut names, name);
        }
        names
    };

    let mut composed = BTreeMap::new();
    for (tag, extra) in include {
        let mut names = unique_base();
        for name in extra {
            push_unique(&mut names, name);
        }
        composed.insert(tag.clone(), names);
    }

    for (tag, removed) in exclude {
        match composed.get_mut(tag) {
            Some(names) => names.retain(|n| !removed.contains(n)),
            None => {
                let mut names = unique_base();
                let before = names.len();
                names.retain(|n| !removed.contains(n));
                if names.len() != before {
                    composed.insert(tag.clone(), names);
                }
            }
        }
    }
    composed
}

fn lookup(provider: &dyn AnalyzerProvider, name: &str) -> Result<Arc<dyn Analyzer>> {
    provider
        .analyzer(name)
        .ok_or_else(|| AnalysisError::UnknownAnalyzer(name.to_string()))
}

/// Constrói o analisador dinâmico de `config`, resolvendo todos os nomes.
pub fn build_dynamic_analyzer(
    config: &DynamicAnalyzerConfig,
    provider: &dyn AnalyzerProvider,
    cloners: Arc<ClonerRegistry>,
) -> Result<DynamicAnalyzer> {
    config.validate()?;
    let defaults = config
        .base_analyzers
        .iter()
        .map(|name| lookup(provider, name))
        .collect::<Result<Vec<_>>>()?;

    let mut tag_analyzers = HashMap::new();
    for (tag, names) in config.composed_tags() {
        let analyzers = names
            .iter()
            .map(|name| lookup(provider, name))
            .collect::<Result<Vec<_>>>()?;
        tag_analyzers.insert(tag, analyzers);
    }

    DynamicAnalyzer::new(&config.delimiter, config.gap, defaults, tag_analyzers, cloners)
}

/// Analisador dinâmico construído no primeiro uso.
///
/// Sob concorrência a construção roda uma única vez e todos veem o mesmo
/// `Arc<DynamicAnalyzer>`. Uma falha não fica em cache: a próxima chamada tenta de novo.
pub struct LazyDynamicAnalyzer {
    config: DynamicAnalyzerConfig,
    provider: Arc<dyn AnalyzerProvider>,
    cloners: Arc<ClonerRegistry>,
    cell: OnceCell<Arc<DynamicAnalyzer>>,
}

impl LazyDynamicAnalyzer {
    /// Valida a configuração agora; a resolução dos nomes fica para o primeiro uso.
    pub fn new(
        config: DynamicAnalyzerConfig,
        provider: Arc<dyn AnalyzerProvider>,
        cloners: Arc<ClonerRegistry>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            provider,
            cloners,
            cell: OnceCell::new(),
        })
    }

    pub fn config(&self) -> &DynamicAnalyzerConfig {
        &self.config
    }

    pub fn get_or_build(&self) -> Result<Arc<DynamicAnalyzer>> {
        self.cell
            .get_or_try_init(|| {
                debug!(base = ?self.config.base_analyzers, "building dynamic analyzer");
                let analyzer = build_dynamic_analyzer(
                    &self.config,
                    self.provider.as_ref(),
                    Arc::clone(&self.cloners),
                )?;
                info!(
                    tags = analyzer.tag_analyzer_names().len(),
                    gap = analyzer.gap(),
                    "dynamic analyzer ready"
                );
                Ok(Arc::new(analyzer))
            })
            .cloned()
    }

    /// O analisador, se já foi construído.
    pub fn get(&self) -> Option<Arc<DynamicAnalyzer>> {
        self.cell.get().cloned()
    }
}

//! # dynan-core: Análise Dinâmica com Múltiplos Analisadores
//!
//! Este crate multiplexa vários analisadores (produtores de tokens) sobre um mesmo texto.
//! Uma tag no início do texto escolhe quais analisadores rodam; as saídas deles são
//! concatenadas num único stream com posições corrigidas.
//!
//! ## Arquitetura do Sistema
//!
//! 1.  **Entrada**: Uma fonte de caracteres ([`source`]), ex: `"[std]foo bar"`.
//! 2.  **Duplicação** ([`cloner`]): A tag é extraída ([`tag`]) e o restante do conteúdo
//!     é servido em quantas cópias independentes forem necessárias.
//! 3.  **Resolução** ([`resolver`]): A tag vira uma lista de analisadores (base ∪ include
//!     − exclude). Sem tag, ou tag desconhecida, vale a lista base.
//! 4.  **Sub-streams** ([`analyzers`]): Cada analisador tokeniza sua cópia
//!     ([`tokenizer`], [`filters`]).
//! 5.  **Fusão** ([`positioned`]): Os sub-streams são concatenados em ordem, com um gap de
//!     posições entre eles.
//! 6.  **Saída**: Um [`TokenStream`] cujo token atual vive num bag de atributos
//!     ([`attributes`]).
//!
//! ## Exemplo de Uso
//!
//! ```rust
//! use dynan_core::{AnalysisPipeline, DynamicAnalyzerConfig};
//!
//! // 1. Lista base + analisadores extras para a tag "std"
//! let config = DynamicAnalyzerConfig::new(["english"]).include("std", ["standard"]);
//! let pipeline = AnalysisPipeline::with_builtins(config).unwrap();
//!
//! // 2. Sem tag: apenas o analisador inglês
//! let outcome = pipeline.analyze("body", "The cats").unwrap();
//! assert_eq!(outcome.tokens.len(), 1);
//!
//! // 3. Com a tag: inglês e standard, separados pelo gap (1000)
//! let outcome = pipeline.analyze("body", "[std]The cats").unwrap();
//! assert_eq!(outcome.tokens.len(), 3);
//! assert_eq!(outcome.tokens[1].position_increment, 1001);
//! ```
//!
//! ## Módulos Principais
//!
//! - [`pipeline`]: Orquestrador com eventos observáveis.
//! - [`dynamic`]: O analisador dinâmico e seus componentes por requisição.
//! - [`positioned`]: A fusão de posições.
//! - [`cloner`]: Estratégias de duplicação da fonte.

pub mod analysis;
pub mod analyzers;
pub mod attributes;
pub mod cloner;
pub mod dynamic;
pub mod error;
pub mod filters;
pub mod pipeline;
pub mod positioned;
pub mod resolver;
pub mod source;
pub mod tag;
pub mod tokenizer;

pub use analysis::{drain_tokens, AnalyzedToken, Analyzer, AnalyzerProvider, TokenStream};
pub use analyzers::{AnalyzerRegistry, AnalyzerSpec, ChainAnalyzer};
pub use cloner::ClonerRegistry;
pub use dynamic::{DynamicAnalyzer, Resolution, TokenStreamComponents};
pub use error::{AnalysisError, Result};
pub use pipeline::{AnalysisEvent, AnalysisOutcome, AnalysisPipeline};
pub use resolver::{compose_tag_analyzers, DynamicAnalyzerConfig, LazyDynamicAnalyzer};
pub use tokenizer::{Token, TokenizerMode};

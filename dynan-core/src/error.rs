//! Tipos de erro do `dynan-core`.

use thiserror::Error;

/// Erro de topo para todas as operações de análise.
///
/// As variantes seguem a política de propagação do sistema:
/// - **Configuração** (`Config`, `UnknownAnalyzer`, `DuplicateBinding`): fatais, surgem
///   na construção e nunca são repetidas automaticamente.
/// - **Por requisição** (`Duplication`, `Io`): abortam apenas o grafo de streams daquela
///   requisição, sem tocar nos registros compartilhados.
/// - **Fiação** (`MissingAttribute`): erro de programação; nunca deve ocorrer com a ordem
///   de setup correta.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Configuração inválida (lista base vazia, regex inválida, binding inválido...).
    #[error("configuration error: {0}")]
    Config(String),

    /// Um nome de analisador não pôde ser resolvido pelo provider.
    #[error("no analyzer found for name: {0}")]
    UnknownAnalyzer(String),

    /// Uma forma de fonte foi associada a duas estratégias de duplicação.
    #[error("duplicate cloner binding for source shape: {0}")]
    DuplicateBinding(&'static str),

    /// A fonte não tem a estrutura esperada pela estratégia especializada.
    #[error("duplication error: {0}")]
    Duplication(String),

    /// Falha de leitura ao drenar a fonte original.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Restauração de snapshot num bag sem o tipo de atributo exigido.
    #[error("attribute not registered in target source: {0}")]
    MissingAttribute(&'static str),
}

/// Result para operações de análise.
pub type Result<T> = std::result::Result<T, AnalysisError>;

//! Configuração do servidor.
//!
//! `defaults/dynan.default.toml` é embutido no binário. Por cima dele entram, nesta
//! ordem, um `dynan.toml` opcional e variáveis de ambiente `DYNAN__SECAO__CHAVE`
//! (ex: `DYNAN__SERVER__PORT=8080`).

use std::collections::BTreeMap;
use std::path::Path;

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File, FileFormat, ValueKind};
use dynan_core::cloner::BufferingClonerFactory;
use dynan_core::{AnalyzerSpec, DynamicAnalyzerConfig};
use serde::Deserialize;

const DEFAULT_TOML: &str = include_str!("../defaults/dynan.default.toml");

/// Configuração completa do servidor.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub server: ServerConfig,
    pub cloner: ClonerConfig,
    pub analysis: DynamicAnalyzerConfig,
    /// Analisadores extras, registrados ao lado dos embutidos.
    #[serde(default)]
    pub analyzers: BTreeMap<String, AnalyzerSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Pausa entre eventos enviados pelo WebSocket (animação passo a passo).
    pub ws_event_delay_ms: u64,
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Parâmetros da estratégia genérica de duplicação.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ClonerConfig {
    pub initial_capacity: usize,
    pub read_chunk_size: usize,
}

impl From<ClonerConfig> for BufferingClonerFactory {
    fn from(config: ClonerConfig) -> Self {
        BufferingClonerFactory {
            initial_capacity: config.initial_capacity,
            read_chunk_size: config.read_chunk_size,
        }
    }
}

/// Empilha fontes de configuração sobre os padrões embutidos.
#[derive(Debug, Clone)]
pub struct Loader {
    builder: ConfigBuilder<DefaultState>,
}

impl Loader {
    pub fn new() -> Self {
        let builder = Config::builder().add_source(File::from_str(DEFAULT_TOML, FileFormat::Toml));
        Self { builder }
    }

    /// Arquivo opcional (ignorado se não existir).
    pub fn with_optional_file(mut self, path: impl AsRef<Path>) -> Self {
        let source = File::from(path.as_ref())
            .format(FileFormat::Toml)
            .required(false);
        self.builder = self.builder.add_source(source);
        self
    }

    /// Variáveis de ambiente `DYNAN__*`.
    pub fn with_env(mut self) -> Self {
        self.builder = self
            .builder
            .add_source(Environment::with_prefix("DYNAN").separator("__"));
        self
    }

    pub fn set_override<I>(mut self, key: &str, value: I) -> Result<Self, ConfigError>
    where
        I: Into<ValueKind>,
    {
        self.builder = self.builder.set_override(key, value)?;
        Ok(self)
    }

    pub fn build(self) -> Result<ServerSettings, ConfigError> {
        self.builder.build()?.try_deserialize()
    }
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}

pub fn load_defaults() -> Result<ServerSettings, ConfigError> {
    Loader::new().build()
}

//! Engine configuration.
//!
//! Layered with the `config` crate: built-in defaults, then an optional
//! file (any format `config` understands), then `OPTIMIST__*` environment
//! variables.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use optimist_core::Domain;
use optimist_core::keys::{DEFAULT_IGNORED_PARAMS, DEFAULT_PAGINATION_PARAMS};
use serde::{Deserialize, Serialize};

/// Prefix of the environment variables read by [`EngineConfig::load`].
pub const ENV_PREFIX: &str = "OPTIMIST";

/// Configuracion del engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Tiempo en ms que una entry `fresh` se considera valida (None: nunca expira).
    pub stale_time_ms: Option<u64>,
    /// Overrides de stale time por dominio.
    pub domain_stale_time_ms: HashMap<String, u64>,
    /// Mostrar la data previa del mismo dominio/kind mientras se carga una key nueva.
    pub keep_previous_data: bool,
    /// Refetch en background de las queries activas invalidadas tras un commit.
    pub background_refetch: bool,
    /// Rechazar mutaciones sobre entidades sin ninguna entry en cache.
    pub strict_consistency: bool,
    /// Parametros de key que son paginacion y no filtros.
    pub pagination_params: Vec<String>,
    /// Parametros de key que no son campos del record (orden, busqueda).
    pub ignored_params: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stale_time_ms: Some(60_000),
            domain_stale_time_ms: HashMap::new(),
            keep_previous_data: false,
            background_refetch: true,
            strict_consistency: false,
            pagination_params: DEFAULT_PAGINATION_PARAMS
                .iter()
                .map(|p| p.to_string())
                .collect(),
            ignored_params: DEFAULT_IGNORED_PARAMS
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }
}

impl EngineConfig {
    /// Loads the configuration from defaults, an optional file and the
    /// environment (`OPTIMIST__STALE_TIME_MS=5000`, ...).
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_prefix(path, ENV_PREFIX)
    }

    pub(crate) fn load_with_prefix(path: Option<&Path>, prefix: &str) -> Result<Self, ConfigError> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        builder
            .add_source(
                Environment::with_prefix(prefix)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Returns the staleness policy for a domain.
    pub fn stale_time_for(&self, domain: &Domain) -> Option<Duration> {
        self.domain_stale_time_ms
            .get(domain.as_str())
            .copied()
            .or(self.stale_time_ms)
            .map(Duration::from_millis)
    }

    /// Builder-style override of the default stale time.
    pub fn with_stale_time(mut self, stale_time: Option<Duration>) -> Self {
        self.stale_time_ms = stale_time.map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Key params that never act as filters: pagination plus the
    /// ignored params, deduplicated.
    pub fn non_filter_params(&self) -> Vec<String> {
        let mut params = self.pagination_params.clone();
        for param in &self.ignored_params {
            if !params.contains(param) {
                params.push(param.clone());
            }
        }
        params
    }

    /// Builder-style toggle of background refetch.
    pub fn with_background_refetch(mut self, enabled: bool) -> Self {
        self.background_refetch = enabled;
        self
    }

    /// Builder-style toggle of strict consistency.
    pub fn with_strict_consistency(mut self, enabled: bool) -> Self {
        self.strict_consistency = enabled;
        self
    }
}

//! Test helpers para optimist-engine.

#![allow(dead_code, unused_imports)]

pub mod fixtures;
pub mod remote;

use std::sync::Arc;

use optimist_engine::{EngineConfig, OptimistEngine, RecordingSink, default_graph};
use optimist_remote::RemoteService;

pub use fixtures::*;
pub use remote::FailingRemote;

/// Inicializa tracing para los tests (RUST_LOG=optimist_engine=debug).
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Config de tests: sin refetch en background para que los asserts sean deterministas.
pub fn test_config() -> EngineConfig {
    EngineConfig::default().with_background_refetch(false)
}

/// Crea un engine con el grafo por defecto y un sink que graba eventos.
pub fn engine_with(
    config: EngineConfig,
    remote: Arc<dyn RemoteService>,
) -> (OptimistEngine, Arc<RecordingSink>) {
    init_tracing();
    let sink = Arc::new(RecordingSink::new());
    let engine = OptimistEngine::with_telemetry(config, remote, default_graph(), sink.clone());
    (engine, sink)
}

pub fn engine(remote: Arc<dyn RemoteService>) -> (OptimistEngine, Arc<RecordingSink>) {
    engine_with(test_config(), remote)
}

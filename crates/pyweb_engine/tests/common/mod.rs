use pyweb_engine::{Engine, EngineConfig, ScriptOrigin};

/// Brings the shared singleton up (idempotent) and hands it back.
pub fn engine() -> &'static Engine {
    Engine::initialize(EngineConfig::default()).expect("engine initialization");
    Engine::handle().expect("engine handle")
}

pub fn origin(url: &str) -> ScriptOrigin {
    ScriptOrigin::parse(url)
}

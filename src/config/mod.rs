//! Configuration loading and validation

pub mod orchestrator_config;

pub use orchestrator_config::{
    AssemblySettings, ClientSettings, EncodingSettings, EngineSettings, LoggingSettings,
    MapperSettings, OrchestratorConfig, RunSettings,
};

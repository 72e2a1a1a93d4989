use std::sync::Arc;

use colops_proto::sse;
use colops_registry::{Registry, RegistryError};

pub const PLUGIN_IDENTIFIER: &str = "Column Operations - Qlik";
pub const PLUGIN_VERSION: &str = "v1.1.0";

/// Answers `GetCapabilities` from the current catalogue.
pub struct CapabilityResponder {
    registry: Arc<Registry>,
    allow_script: bool,
}

impl CapabilityResponder {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            allow_script: true,
        }
    }

    pub fn capabilities(&self) -> Result<sse::Capabilities, RegistryError> {
        let functions = self.registry.describe()?;
        tracing::debug!(functions = functions.len(), "reporting capabilities");
        Ok(sse::Capabilities {
            allow_script: self.allow_script,
            functions: functions.iter().map(sse::FunctionDefinition::from).collect(),
            plugin_identifier: PLUGIN_IDENTIFIER.to_string(),
            plugin_version: PLUGIN_VERSION.to_string(),
        })
    }
}

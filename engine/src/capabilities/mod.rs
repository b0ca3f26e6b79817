//! Capability Registry
//!
//! Maps capability names to handlers, validates every input against the
//! handler's declared schema, and fails closed: an unknown name or an invalid
//! input is answered with a structured error and no handler runs.
//!
//! A registry is built per run by the caller. [`CapabilityRegistry::standard`]
//! wires the built-in capabilities to their collaborators.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use sdk::capability::{
    Capability, CapabilityContext, CapabilityDescriptor, CapabilityError,
};
use sdk::errors::EngineError;
use sdk::types::CapabilityOutput;

pub mod contacts;
pub mod persist;
pub mod pitch;
pub mod research;
pub mod scoring;
pub mod terminate;

pub use contacts::{ContactFinder, ContactFindings, FindContactsCapability};
pub use persist::{NoopStore, OpportunityRecord, OpportunityStore, PersistCapability};
pub use pitch::{GeneratePitchCapability, LlmPitchWriter, PitchBrief, PitchDraft, PitchWriter};
pub use research::{CompanyFindings, CompanyResearcher, ResearchCapability};
pub use scoring::{OpportunityScore, OpportunityScorer, PolicyScorer, ScoreCapability};
pub use terminate::TerminateCapability;

/// Collaborators backing the built-in capabilities
pub struct Collaborators {
    pub researchers: Vec<Arc<dyn CompanyResearcher>>,
    pub finders: Vec<Arc<dyn ContactFinder>>,
    pub scorer: Arc<dyn OpportunityScorer>,
    pub pitch_writer: Arc<dyn PitchWriter>,
    pub store: Arc<dyn OpportunityStore>,
}

#[derive(Default)]
pub struct CapabilityRegistry {
    /// Registration order, used for descriptors
    order: Vec<String>,
    capabilities: HashMap<String, Arc<dyn Capability>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the six built-in capabilities
    pub fn standard(collaborators: Collaborators) -> Result<Self, EngineError> {
        let Collaborators {
            researchers,
            finders,
            scorer,
            pitch_writer,
            store,
        } = collaborators;

        let mut registry = Self::new();
        registry.register(Arc::new(ResearchCapability::new(researchers)))?;
        registry.register(Arc::new(FindContactsCapability::new(
            finders,
            Arc::clone(&scorer),
        )))?;
        registry.register(Arc::new(ScoreCapability::new(Arc::clone(&scorer))))?;
        registry.register(Arc::new(GeneratePitchCapability::new(
            pitch_writer,
            Arc::clone(&scorer),
        )))?;
        registry.register(Arc::new(PersistCapability::new(store, scorer)))?;
        registry.register(Arc::new(TerminateCapability))?;
        Ok(registry)
    }

    /// Add a capability; names are unique
    pub fn register(&mut self, capability: Arc<dyn Capability>) -> Result<(), EngineError> {
        let name = capability.name().to_string();
        if self.capabilities.contains_key(&name) {
            return Err(EngineError::DuplicateCapability(name));
        }
        debug!("Registered capability '{}'", name);
        self.order.push(name.clone());
        self.capabilities.insert(name, capability);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.capabilities.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Descriptors of every capability, in registration order
    pub fn descriptors(&self) -> Vec<CapabilityDescriptor> {
        self.order
            .iter()
            .filter_map(|n| self.capabilities.get(n))
            .map(|c| c.descriptor())
            .collect()
    }

    /// Descriptors restricted to `names`, in registration order
    pub fn descriptors_for(&self, names: &[&str]) -> Vec<CapabilityDescriptor> {
        self.order
            .iter()
            .filter(|n| names.contains(&n.as_str()))
            .filter_map(|n| self.capabilities.get(n))
            .map(|c| c.descriptor())
            .collect()
    }

    /// Validate `arguments` and run the handler
    pub async fn invoke(
        &self,
        name: &str,
        arguments: Value,
        ctx: &CapabilityContext,
    ) -> Result<CapabilityOutput, CapabilityError> {
        let capability = self.capabilities.get(name).ok_or_else(|| {
            warn!("Unknown capability requested: {}", name);
            CapabilityError::Unknown {
                name: name.to_string(),
                available: self.order.join(", "),
            }
        })?;

        let input = capability
            .input_schema()
            .validate(arguments)
            .map_err(|source| CapabilityError::InvalidInput {
                name: name.to_string(),
                source,
            })?;

        debug!("Invoking capability '{}'", name);
        capability.invoke(input, ctx).await
    }
}

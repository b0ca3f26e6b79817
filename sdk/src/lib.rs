//! Scout SDK
//!
//! Shared library providing the contract between the Scout engine and the
//! adapters that feed it: evidence, entity profiles, fused records, the
//! capability trait, and error types.

/// Capability trait and dispatch types
pub mod capability;

/// Typed company and contact profiles
pub mod entity;

/// Error types and handling
pub mod errors;

/// Evidence records and entity identity
pub mod evidence;

/// Fused entity records
pub mod record;

/// Capability input schemas
pub mod schema;

/// Capability input/output types
pub mod types;

// Re-export commonly used types
pub use capability::{Capability, CapabilityContext, CapabilityDescriptor, CapabilityError};
pub use entity::{CompanyProfile, ContactProfile, FundingInfo, Headquarters, Seniority};
pub use errors::{EngineError, ScoutErrorExt};
pub use evidence::{EntityKey, EntityKind, Evidence, FieldMap};
pub use record::{Attributed, FusedField, FusedRecord};
pub use schema::{FieldKind, InputSchema, SchemaError};
pub use types::{CapabilityInput, CapabilityOutput, ParamError};

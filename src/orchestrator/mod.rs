//! Request orchestration.
//!
//! Bounded admission in front of a cache-aside flow that fetches artifacts,
//! enhances them on the worker pool and stores the results.

mod admission;
mod collaborators;
mod request;
mod service;
mod ttl;

pub use admission::{AdmissionClosed, AdmissionConfig, AdmissionController, AdmissionPermit};
pub use collaborators::{
    AcquisitionError, Artifact, ArtifactProvider, DurableStore, InMemoryDurableStore, StoreError,
};
pub use request::{
    EnhancedResult, FallbackReason, RequestError, RequestIdentity, RequestOptions,
    RequestOutcome, RequestPhase, ServedFrom, DEFAULT_VARIANT, KEY_PREFIX,
};
pub use service::{Orchestrator, OrchestratorConfig, OrchestratorStats};
pub use ttl::TtlPolicy;

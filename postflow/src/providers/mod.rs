//! Provider candidates and the fallback router.

mod candidate;
mod router;

pub use candidate::{AspectRatio, Capability, CapabilityTable, GenerationSpec, ProviderCandidate};
pub use router::{FallbackRouter, GenerationJob, RouteOptions, DEFAULT_PROVIDER_TIMEOUT};

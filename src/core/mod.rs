pub mod relay;

// Re-export commonly used types for convenience
pub use relay::{
    EgressHandle, EgressScheduler, GenerationTracker, KeepalivePolicy, RelayError, RelayResult,
    Session, SessionSettings, SessionSummary,
};

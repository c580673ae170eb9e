//! # AgentLens Core
//!
//! The canonical event model, per-session hash chain, and replay builder
//! for AgentLens. No I/O — everything here is pure data and algorithms
//! over data a caller already has in hand.
//!
//! ## Quick Start
//!
//! ```rust
//! use agentlens_core::event::{EventType, Severity, OrderedObject};
//! use agentlens_core::hash::HashInput;
//!
//! let payload = OrderedObject::new();
//! let metadata = OrderedObject::new();
//! let now = chrono::Utc::now();
//! let hash = HashInput {
//!     id: "01ARZ3NDEKTSV4RRFFQ69G5FAV",
//!     timestamp: &now,
//!     session_id: "sess_1",
//!     agent_id: "agent_1",
//!     event_type: EventType::SessionStarted,
//!     severity: Severity::Info,
//!     payload: &payload,
//!     metadata: &metadata,
//!     prev_hash: None,
//! }.compute_hash();
//! assert_eq!(hash.len(), 64);
//! ```

pub mod event;
pub mod hash;
pub mod ids;
pub mod replay;
pub mod report;
pub mod retention;
pub mod session;

pub use event::{Event, EventType, IngestEventInput, OrderedObject, Severity};
pub use hash::{verify_chain, verify_chain_batch, ChainVerification, HashInput, HASH_VERSION};
pub use replay::{build as build_replay, ReplayOptions, ReplayState};
pub use session::{Agent, Session, SessionStatus};

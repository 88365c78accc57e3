//! Arena pool for Ludos.
//!
//! An arena is a reusable game space (a map, a world region) that hosts
//! one session at a time. The pool owns every arena, hands them out to
//! new sessions, and puts them back into rotation after the world
//! collaborator has reset them.
//!
//! # Key types
//!
//! - [`ArenaPool`]: allocation, release, and the asynchronous reset loop
//! - [`ArenaBackend`]: the trait the host implements to reset a map
//! - [`Arena`] / [`ArenaStatus`]: what an arena is and where it stands
//! - [`PoolConfig`]: reset retry policy
//!
//! # Arena lifecycle
//!
//! ```text
//!          acquire()          occupy()            release()
//! Free ──────────────→ Reserved ──────→ InUse ──────────────→ DirtyPendingReset
//!  ↑                      │                                     │      │
//!  │                      └──────────── release() ──────────────┘      │
//!  └──────────────────── reset succeeded ───────────────────────┘      │
//!                                                        retries exhausted
//!                                                                      ▼
//!                                             Unavailable ──retry_reset()──→ DirtyPendingReset
//! ```

mod arena;
mod backend;
mod config;
mod error;
mod pool;

pub use arena::{Arena, ArenaStatus};
pub use backend::{ArenaBackend, NoopBackend};
pub use config::PoolConfig;
pub use error::ArenaError;
pub use pool::ArenaPool;

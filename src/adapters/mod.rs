//! Store adapters.
//!
//! - [`redis`] - Redis with the RedisJSON module
//!
//! The in-process store lives in [`crate::store::memory`].

pub mod redis;

//! Detection engines
//!
//! Each engine is a periodic task over the shared book store. Scans are
//! synchronous and bounded; detected opportunities are pushed to the
//! emitter over a bounded channel and never block the scan loop.

pub mod cross;
pub mod tri;

pub use cross::CrossEngine;
pub use tri::TriEngine;

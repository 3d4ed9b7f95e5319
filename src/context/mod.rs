//! Consistency Context
//!
//! A [`ConsistencyWindow`] records, per database key, when the current unit of
//! work last wrote. While `now - last_write < proxy_delay`, reads against that
//! key are kept on the primary.
//!
//! Each unit of work owns its window; nothing here is shared between
//! requests, so no locking is involved.

pub mod ambient;
mod clock;
mod window;

pub use clock::{Clock, ManualClock, SystemClock};
pub use window::ConsistencyWindow;

//! Context Propagation
//!
//! Carries a [`ConsistencyWindow`](crate::context::ConsistencyWindow) from one
//! request to the client's next one through a cookie, so a follow-up request
//! served by any process stays on the primary until replicas have caught up.
//! No server-side state is kept.
//!
//! Malformed or forged tokens degrade to an empty window, never an error.

mod hooks;
mod layer;
mod token;

pub use hooks::{ContextPropagator, CookieOptions, PropagationOptions, COOKIE_BUFFER, COOKIE_NAME};
pub use layer::propagate_context;
pub use token::{TokenCodec, TokenError};

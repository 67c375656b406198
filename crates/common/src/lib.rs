//! Wire types shared by the Storm coordinator and its probing agents.
//!
//! Everything here crosses the HTTP boundary as camelCase JSON; the
//! coordinator additionally persists some of these types verbatim.

pub mod api;
pub mod types;

pub use api::*;
pub use types::*;

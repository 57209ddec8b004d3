//! Tracklog Params - Named, typed parameters over the bus
//!
//! A [`ParametersRegistry`] holds parameters in-process and serves them as
//! request/response services under a namespace. A [`ParametersClient`]
//! reaches a registry through any [`Services`](tracklog_core::Services)
//! implementation. Both implement [`ParametersInterface`].
//!
//! Values are opaque bytes tagged with a `msgs.`-prefixed type name; a
//! parameter keeps its declared type for its whole life.

mod client;
mod error;
mod interface;
mod registry;
mod types;

pub use client::{ParametersClient, DEFAULT_TIMEOUT};
pub use error::{ParameterError, Result};
pub use interface::ParametersInterface;
pub use registry::ParametersRegistry;
pub use types::{add_msgs_prefix, strip_msgs_prefix, ParameterDeclaration, ParameterValue, MSGS_PREFIX};

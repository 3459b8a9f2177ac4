//! Script-driven DOM sessions.
//!
//! A [`Session`] runs page scripts against a synthetic document on a single
//! execution thread, collects the mutations they report, runs script
//! elements they insert, and exposes the live document through `/0/...`
//! paths. [`ControlServer`] drives sessions over the line-oriented control
//! protocol.

pub mod bridge;
pub mod config;
pub mod control;
pub mod coordinator;
pub mod error;
mod events;
pub mod host;
pub mod mutation;
pub mod path;
mod session;
pub mod tracker;
pub mod transpile;

pub use bridge::{
    NetFuture, NetRequest, NetResponse, NetworkProvider, NoStyles, Providers, StyleProvider,
    normalize_uri,
};
pub use config::{SeedDocument, SessionConfig};
pub use control::ControlServer;
pub use coordinator::{Coordinator, EngineFactory};
pub use error::SessionError;
pub use host::{HOST_OBJECT, HostCapabilities, build_host_bindings, build_host_namespace};
pub use mutation::{MUTATION_CAPACITY, Mutation, MutationCollector, MutationKind};
pub use path::{BODY_EXPRESSION, DocPath, Segment};
pub use session::Session;

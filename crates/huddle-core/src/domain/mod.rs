//! Domain definitions
//!
//! A domain is a handler tree (supervisors over specialists over tools)
//! described in a TOML file and frozen into a [`HandlerRegistry`] at startup.
//!
//! [`HandlerRegistry`]: crate::orchestration::HandlerRegistry

pub mod builder;
pub mod definition;
pub mod loader;

pub use builder::{Domain, DomainBuilder};
pub use definition::{
    DomainDefinition, DomainInfo, EndpointConfig, ParameterDef, SpecialistDef, SupervisorDef,
};
pub use loader::DomainLoader;

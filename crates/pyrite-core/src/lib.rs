//! Core data types for the Pyrite dependency manager.
//!
//! This crate defines the fundamental types of the resolution engine:
//! versions, version constraints, environment markers, dependencies,
//! candidate packages, target environments, and lockfiles.
//!
//! This crate is intentionally free of async code and network I/O.

pub mod constraint;
pub mod dependency;
pub mod environment;
pub mod lockfile;
pub mod marker;
pub mod package;
pub mod version;

pub use constraint::Constraint;
pub use dependency::{canonicalize_name, Dependency, DependencySource};
pub use environment::{Environment, MarkerEnvironment, OsFamily};
pub use marker::Marker;
pub use package::{Package, PackageFile, PackageId};
pub use version::Version;

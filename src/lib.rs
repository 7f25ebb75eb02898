// SPDX-License-Identifier: MPL-2.0

//! PubGrub version solving algorithm.
//!
//! Version solving consists in efficiently finding a set of packages and
//! versions that satisfy all the constraints of a given project's
//! dependencies. In addition, when that is not possible, we should try to
//! provide a very human-readable and clear explanation as to why that
//! failed.
//!
//! # Package identifiers and versions
//!
//! Packages are identified by any type implementing the [Package] trait,
//! which is automatic for types already implementing
//! [Clone] + [Eq] + [Hash](std::hash::Hash) + [Debug](std::fmt::Debug) +
//! [Display](std::fmt::Display), so things like [String] work out of the
//! box. Versions are semantic versions ([semver::Version]), and constraints
//! on them are [VersionSet]s: everything, nothing, one exact version, or a
//! half-open interval. A package can also be required at an opaque
//! source-control revision or as an unversioned local binding
//! ([Requirement]).
//!
//! # Basic example
//!
//! Let's imagine that we are building a user interface with a menu
//! containing dropdowns, and that our direct dependency is `menu`:
//!
//! ```
//! use version_solver::{resolve, OfflineContainerProvider, Requirement, Version, VersionSet};
//!
//! let caret = |major| Requirement::Versions(VersionSet::up_to_next_major(Version::new(major, 0, 0)));
//!
//! let mut provider = OfflineContainerProvider::<&str>::new();
//! provider.add_unversioned_dependencies("root", [("menu", caret(1))]);
//! provider.add_dependencies("menu", Version::new(1, 0, 0), [("dropdown", caret(2))]);
//! provider.add_dependencies("dropdown", Version::new(2, 3, 0), []);
//!
//! let solution = resolve(provider, "root").unwrap();
//! assert_eq!(solution.len(), 2);
//! ```
//!
//! # Container providers
//!
//! The [OfflineContainerProvider] used above holds everything in memory.
//! On a real scenario fetching a package container may involve reading the
//! file system or doing network requests, so you can implement
//! [ContainerProvider] for your own type; the solver caches every container
//! and can prefetch containers in the background
//! ([Solver::with_prefetching]).
//!
//! # Solution and error reporting
//!
//! When everything goes well, the solver finds and returns one
//! [BoundVersion] per transitively reachable package. But sometimes there
//! is no solution because dependencies are incompatible. In such cases
//! [Solver::solve] returns [SolverError::Unresolvable] carrying the
//! terminal [Incompatibility], a custom binary DAG containing the full
//! chain of reasons. [DefaultStringReporter] walks that chain into a
//! numbered, human-readable report:
//!
//! ```txt
//! Because dropdown >=2.0.0, <3.0.0 depends on icons >=2.0.0, <3.0.0 and
//! root depends on icons >=1.0.0, <2.0.0, dropdown >=2.0.0, <3.0.0 is forbidden.
//! And because menu >=1.0.0, <2.0.0 depends on dropdown >=2.0.0, <3.0.0,
//! version solving failed.
//! ```

#![warn(missing_docs)]

mod error;
mod internal;
mod package;
mod provider;
mod report;
mod solver;
mod term;
mod type_aliases;
mod version_set;

pub use semver::Version;

pub use crate::error::{ProviderError, SolverError};
pub use crate::internal::incompatibility::{Cause, Incompatibility};
pub use crate::internal::partial_solution::{Assignment, AssignmentKind};
pub use crate::package::Package;
pub use crate::provider::{
    ContainerProvider, OfflineContainer, OfflineContainerProvider, PackageContainer,
};
pub use crate::report::{DefaultStringReporter, Reporter};
pub use crate::solver::{
    resolve, Solver, SolverDelegate, TraceKind, TraceLocation, TraceStep, TraceValue,
};
pub use crate::term::{SetRelation, Term};
pub use crate::type_aliases::{DependencyConstraints, Map, Resolution, Set};
pub use crate::version_set::{BoundVersion, Requirement, VersionSet};

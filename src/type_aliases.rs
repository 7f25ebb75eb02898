// SPDX-License-Identifier: MPL-2.0

//! Publicly exported type aliases.

use crate::version_set::{BoundVersion, Requirement};

/// Map implementation used by the library.
pub type Map<K, V> = rustc_hash::FxHashMap<K, V>;

/// Set implementation used by the library.
pub type Set<V> = rustc_hash::FxHashSet<V>;

/// The direct dependencies of one package version: each entry names the
/// dependency and the requirement placed on it.
pub type DependencyConstraints<P> = Vec<(P, Requirement)>;

/// Concrete bindings picked by the library during [solve](crate::Solver::solve),
/// one per transitively reachable package, root excluded.
pub type Resolution<P> = Vec<(P, BoundVersion)>;

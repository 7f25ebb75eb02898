// SPDX-License-Identifier: MPL-2.0

//! PubGrub version solving algorithm.
//!
//! Version solving consists in efficiently finding one version per package
//! satisfying all the constraints of a given project's dependencies. In
//! addition, when that is not possible, PubGrub tries to provide a very
//! human-readable and clear explanation as to why that failed. Below is an
//! example of explanation present in the introductory blog post about
//! PubGrub:
//!
//! ```txt
//! Because dropdown >=2.0.0 depends on icons >=2.0.0 and
//!   root depends on icons <2.0.0, dropdown >=2.0.0 is forbidden.
//!
//! And because menu >=1.1.0 depends on dropdown >=2.0.0,
//!   menu >=1.1.0 is forbidden.
//! ```
//!
//! The algorithm is generic over the package identifier: any type
//! implementing [Clone] + [Eq] + [Hash](std::hash::Hash) +
//! [Debug](std::fmt::Debug) + [Display](std::fmt::Display) works. Available
//! versions and dependencies are supplied through a [ContainerProvider].

use std::sync::Arc;

use log::{debug, info};
use semver::Version;

use crate::error::SolverError;
use crate::internal::core::State;
use crate::internal::incompatibility::{Cause, Incompatibility};
use crate::internal::partial_solution::Assignment;
use crate::provider::{default_concurrency, ContainerCache, ContainerProvider, PackageContainer};
use crate::term::Term;
use crate::version_set::{next_major, BoundVersion, Requirement, VersionSet};
use crate::{Package, Resolution};

/// Finds, for a root package, one binding per transitively reachable
/// package satisfying all dependency constraints, with no pre-seeded pins
/// and the default configuration.
#[cold]
pub fn resolve<DP: ContainerProvider>(
    provider: DP,
    root: DP::P,
) -> Result<Resolution<DP::P>, SolverError<DP::P>> {
    Solver::new(provider).solve(root, &[])
}

/// The PubGrub solver.
///
/// Holds the container cache and configuration; [Solver::solve] runs the
/// algorithm for one root package.
pub struct Solver<DP: ContainerProvider> {
    cache: Arc<ContainerCache<DP>>,
    delegate: Option<Box<dyn SolverDelegate<P = DP::P>>>,
    prefetch: bool,
    skip_update: bool,
}

impl<DP: ContainerProvider> Solver<DP> {
    /// A solver over the given provider, with prefetching disabled.
    pub fn new(provider: DP) -> Self {
        Self {
            cache: Arc::new(ContainerCache::new(provider, default_concurrency())),
            delegate: None,
            prefetch: false,
            skip_update: false,
        }
    }

    /// Receive a trace of every solver step.
    pub fn with_delegate(mut self, delegate: Box<dyn SolverDelegate<P = DP::P>>) -> Self {
        self.delegate = Some(delegate);
        self
    }

    /// Fetch containers in the background ahead of their first use.
    /// Prefetching is an optimization with no semantic effect.
    pub fn with_prefetching(mut self, enabled: bool) -> Self {
        self.prefetch = enabled;
        self
    }

    /// Use at most `concurrency` background threads for prefetching.
    pub fn with_prefetch_concurrency(mut self, concurrency: usize) -> Self {
        if let Some(cache) = Arc::get_mut(&mut self.cache) {
            cache.set_concurrency(concurrency);
        }
        self
    }

    /// Pass `skip_update` to the provider on every fetch, allowing it to
    /// serve local copies without consulting their origin.
    pub fn with_skip_update(mut self, skip_update: bool) -> Self {
        self.skip_update = skip_update;
        self
    }

    /// Solve the dependencies of `root`.
    ///
    /// The root package is bound to a sentinel version that is never
    /// reported; its dependencies are the unversioned dependencies of its
    /// container. `pins` is the pre-seeded constraint list of a previous
    /// resolution: the current algorithm only uses it as a prefetch hint.
    ///
    /// On success the returned bindings cover every transitively reachable
    /// package, root excluded, in decision order.
    pub fn solve(
        &self,
        root: DP::P,
        pins: &[(DP::P, Requirement)],
    ) -> Result<Resolution<DP::P>, SolverError<DP::P>> {
        let delegate = self.delegate.as_deref();
        let mut state = State::new(root.clone());

        if self.prefetch && !pins.is_empty() {
            ContainerCache::prefetch(
                &self.cache,
                pins.iter().map(|(package, _)| package.clone()).collect(),
                self.skip_update,
            );
        }

        let root_container = self.cache.get(&root, self.skip_update)?;
        let root_version = Version::new(1, 0, 0);
        let dependencies = root_container.unversioned_dependencies()?;
        if self.prefetch {
            ContainerCache::prefetch(
                &self.cache,
                dependencies
                    .iter()
                    .map(|(package, _)| package.clone())
                    .collect(),
                self.skip_update,
            );
        }
        for (dependency, requirement) in dependencies {
            let incompatibility = Incompatibility::new(
                vec![
                    Term::exact(root.clone(), root_version.clone()),
                    Term::negative(dependency, requirement),
                ],
                Cause::Root,
                &root,
            );
            state.add_incompatibility(
                Arc::new(incompatibility),
                TraceLocation::TopLevel,
                delegate,
            );
        }
        state
            .partial_solution
            .decide(root.clone(), BoundVersion::Version(root_version));
        self.trace_decision(&state, TraceLocation::TopLevel);

        let mut next = root.clone();
        loop {
            info!("unit propagation: {}", next);
            state.unit_propagation(next, delegate)?;
            debug!(
                "partial solution after unit propagation:\n{}",
                state.partial_solution
            );
            match self.make_decision(&mut state)? {
                Some(package) => next = package,
                None => break,
            }
        }

        Ok(state
            .partial_solution
            .decisions()
            .filter(|(package, _)| *package != &root)
            .map(|(package, binding)| (package.clone(), binding.clone()))
            .collect())
    }

    /// Choose the next package and binding to append to the partial
    /// solution, or `None` when every required package is decided.
    ///
    /// The first undecided package in discovery order is taken, at the
    /// highest version its accumulated constraint allows. The dependencies
    /// of that version are added to the database before the decision, so
    /// that a dependency already known to conflict suppresses the decision
    /// and lets propagation reject the version instead.
    fn make_decision(
        &self,
        state: &mut State<DP::P>,
    ) -> Result<Option<DP::P>, SolverError<DP::P>> {
        let delegate = self.delegate.as_deref();
        let Some(term) = state.partial_solution.undecided().next().cloned() else {
            return Ok(None);
        };
        let package = term.package.clone();
        let set = match &term.requirement {
            Requirement::Versions(set) => set.clone(),
            // Opaque fixed bindings are decided as-is; their dependencies
            // are out of scope here.
            Requirement::Revision(revision) => {
                info!("decision: {} at revision {}", package, revision);
                state
                    .partial_solution
                    .decide(package.clone(), BoundVersion::Revision(revision.clone()));
                self.trace_decision(state, TraceLocation::DecisionMaking);
                return Ok(Some(package));
            }
            Requirement::Unversioned => {
                info!("decision: {} unversioned", package);
                state
                    .partial_solution
                    .decide(package.clone(), BoundVersion::Unversioned);
                self.trace_decision(state, TraceLocation::DecisionMaking);
                return Ok(Some(package));
            }
        };

        let container = self.cache.get(&package, self.skip_update)?;
        let filter = |v: &Version| set.contains(v);
        let Some(version) = container.versions(&filter).next() else {
            info!("no versions of {} satisfy {}", package, set);
            let incompatibility = Incompatibility::no_available_version(term.clone(), &state.root);
            state.add_incompatibility(
                Arc::new(incompatibility),
                TraceLocation::DecisionMaking,
                delegate,
            );
            // Propagation now rejects the requirement.
            return Ok(Some(package));
        };

        let dependencies = container.dependencies(&version)?;
        if self.prefetch {
            ContainerCache::prefetch(
                &self.cache,
                dependencies
                    .iter()
                    .map(|(package, _)| package.clone())
                    .collect(),
                self.skip_update,
            );
        }
        // The dependency constrains the whole compatible series of the
        // chosen version, not just the version itself.
        let dependant =
            Requirement::Versions(VersionSet::range(version.clone(), next_major(&version)));
        let mut new_incompatibilities = Vec::new();
        for (dependency, requirement) in dependencies {
            if let Some(incompatibility) = Incompatibility::from_dependency(
                package.clone(),
                dependant.clone(),
                (dependency, requirement),
                &state.root,
            ) {
                let incompatibility = Arc::new(incompatibility);
                state.add_incompatibility(
                    incompatibility.clone(),
                    TraceLocation::DecisionMaking,
                    delegate,
                );
                new_incompatibilities.push(incompatibility);
            }
        }

        let conflicting = new_incompatibilities.iter().any(|incompatibility| {
            incompatibility
                .iter()
                .all(|t| t.package == package || state.partial_solution.satisfies(t))
        });
        if conflicting {
            info!(
                "not deciding {} {} because its dependencies conflict",
                package, version
            );
        } else {
            info!("decision: {} {}", package, version);
            state
                .partial_solution
                .decide(package.clone(), BoundVersion::Version(version));
            self.trace_decision(state, TraceLocation::DecisionMaking);
        }
        Ok(Some(package))
    }

    fn trace_decision(&self, state: &State<DP::P>, location: TraceLocation) {
        if let Some(delegate) = self.delegate.as_deref() {
            let assignment = state
                .partial_solution
                .assignments()
                .last()
                .expect("a decision was just appended");
            delegate.trace(TraceStep::General {
                value: TraceValue::Term(&assignment.term),
                kind: TraceKind::Decision,
                location,
                cause: None,
                decision_level: state.partial_solution.decision_level(),
            });
        }
    }
}

/// Receives a stream of [TraceStep]s describing the progress of a solve.
pub trait SolverDelegate {
    /// The package identifier of the traced solver.
    type P: Package;

    /// Called once per solver step, in order.
    fn trace(&self, step: TraceStep<'_, Self::P>);
}

/// One step of the solve, as reported to a [SolverDelegate].
#[derive(Debug)]
pub enum TraceStep<'a, P: Package> {
    /// An incompatibility, decision, or derivation was recorded.
    General {
        /// The recorded value.
        value: TraceValue<'a, P>,
        /// What kind of step this is.
        kind: TraceKind,
        /// Where in the algorithm the step happened.
        location: TraceLocation,
        /// A short label of the cause, for incompatibilities and
        /// derivations.
        cause: Option<String>,
        /// The decision level at the time of the step.
        decision_level: usize,
    },
    /// One iteration of conflict resolution.
    ConflictResolution {
        /// The incompatibility being resolved.
        incompatibility: &'a Incompatibility<P>,
        /// Its most recently satisfied term.
        term: &'a Term<P>,
        /// The assignment satisfying that term.
        satisfier: &'a Assignment<P>,
    },
}

/// The value recorded by a general trace step.
#[derive(Debug)]
pub enum TraceValue<'a, P: Package> {
    /// An incompatibility added to the database.
    Incompatibility(&'a Incompatibility<P>),
    /// A decision or derivation term.
    Term(&'a Term<P>),
}

/// The kind of a general trace step.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum TraceKind {
    /// An incompatibility was added to the database.
    Incompatibility,
    /// A binding was decided.
    Decision,
    /// A term was derived by unit propagation.
    Derivation,
}

/// Where in the algorithm a trace step happened.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum TraceLocation {
    /// Bootstrap of the root package.
    TopLevel,
    /// Unit propagation.
    UnitPropagation,
    /// Decision making.
    DecisionMaking,
    /// Conflict resolution.
    ConflictResolution,
}

// SPDX-License-Identifier: MPL-2.0

//! Core state of the solver: the incompatibility database, unit
//! propagation, and conflict resolution with backjumping.

use std::hash::BuildHasherDefault;
use std::sync::Arc;

use log::{debug, info};
use rustc_hash::FxHasher;

use crate::error::SolverError;
use crate::internal::incompatibility::{Cause, Incompatibility, Relation};
use crate::internal::partial_solution::PartialSolution;
use crate::solver::{SolverDelegate, TraceKind, TraceLocation, TraceStep, TraceValue};
use crate::term::Term;
use crate::{Map, Package};

type FnvIndexSet<T> = indexmap::IndexSet<T, BuildHasherDefault<FxHasher>>;

/// Current state of the solve: every incompatibility known so far, indexed
/// by the packages of its terms, and the evolving partial solution.
pub(crate) struct State<P: Package> {
    pub(crate) root: P,
    /// All incompatibilities, in registration order, under each of their
    /// terms' packages.
    incompatibilities: Map<P, Vec<Arc<Incompatibility<P>>>>,
    pub(crate) partial_solution: PartialSolution<P>,
}

impl<P: Package> State<P> {
    pub(crate) fn new(root: P) -> Self {
        Self {
            root,
            incompatibilities: Map::default(),
            partial_solution: PartialSolution::new(),
        }
    }

    /// Insert an incompatibility under each of its terms' packages.
    /// A structurally equal incompatibility is only kept once.
    pub(crate) fn add_incompatibility(
        &mut self,
        incompatibility: Arc<Incompatibility<P>>,
        location: TraceLocation,
        delegate: Option<&dyn SolverDelegate<P = P>>,
    ) {
        let duplicate = incompatibility.iter().next().is_some_and(|term| {
            self.incompatibilities
                .get(&term.package)
                .is_some_and(|known| known.iter().any(|i| **i == *incompatibility))
        });
        if duplicate {
            return;
        }
        debug!("add incompatibility: {}", incompatibility);
        if let Some(delegate) = delegate {
            delegate.trace(TraceStep::General {
                value: TraceValue::Incompatibility(&incompatibility),
                kind: TraceKind::Incompatibility,
                location,
                cause: Some(cause_label(&incompatibility.cause)),
                decision_level: self.partial_solution.decision_level(),
            });
        }
        for term in incompatibility.iter() {
            self.incompatibilities
                .entry(term.package.clone())
                .or_default()
                .push(incompatibility.clone());
        }
    }

    /// Run unit propagation from the given package until a fixpoint.
    ///
    /// A FIFO queue of packages to revisit is maintained, deduplicated. The
    /// incompatibilities of each popped package are visited newest first;
    /// an almost-satisfied one forces the inverse of its unsatisfied term,
    /// a satisfied one is a conflict handed to [State::resolve_conflict].
    pub(crate) fn unit_propagation(
        &mut self,
        package: P,
        delegate: Option<&dyn SolverDelegate<P = P>>,
    ) -> Result<(), SolverError<P>> {
        let mut changed: FnvIndexSet<P> = FnvIndexSet::default();
        changed.insert(package);
        while let Some(package) = changed.shift_remove_index(0) {
            let incompatibilities = self
                .incompatibilities
                .get(&package)
                .cloned()
                .unwrap_or_default();
            for incompatibility in incompatibilities.iter().rev() {
                let relation = incompatibility.relation(|term| self.partial_solution.relation(term));
                match relation {
                    Relation::Satisfied => {
                        let root_cause = self.resolve_conflict(incompatibility.clone(), delegate)?;
                        // The root cause must propagate, forcing a new
                        // derivation on its single unsatisfied term.
                        let Relation::AlmostSatisfied(unsatisfied) =
                            root_cause.relation(|term| self.partial_solution.relation(term))
                        else {
                            unreachable!(
                                "conflict resolution did not leave {} almost satisfied",
                                root_cause
                            )
                        };
                        let term = root_cause.get(&unsatisfied).unwrap().inverse();
                        self.trace_derivation(&term, &root_cause, delegate);
                        self.partial_solution.derive(term, root_cause);
                        changed.clear();
                        changed.insert(unsatisfied);
                        break;
                    }
                    Relation::AlmostSatisfied(unsatisfied) => {
                        let term = incompatibility.get(&unsatisfied).unwrap().inverse();
                        self.trace_derivation(&term, incompatibility, delegate);
                        self.partial_solution
                            .derive(term, incompatibility.clone());
                        changed.insert(unsatisfied);
                    }
                    Relation::Contradicted | Relation::Inconclusive => {}
                }
            }
        }
        Ok(())
    }

    /// Conflict resolution: walk satisfiers backwards, building the prior
    /// cause of the conflict, until an incompatibility is found that would
    /// have propagated at an earlier decision level; backjump there.
    fn resolve_conflict(
        &mut self,
        conflict: Arc<Incompatibility<P>>,
        delegate: Option<&dyn SolverDelegate<P = P>>,
    ) -> Result<Arc<Incompatibility<P>>, SolverError<P>> {
        info!("conflict: {}", conflict);
        let mut incompatibility = conflict;
        let mut created_new = false;
        loop {
            if incompatibility.is_failure(&self.root) {
                return Err(SolverError::Unresolvable(incompatibility));
            }

            // The most recently satisfied term of the incompatibility.
            let mut most_recent: Option<(usize, &Term<P>)> = None;
            for term in incompatibility.iter() {
                let (index, _) = self.partial_solution.satisfier(term);
                if most_recent.map_or(true, |(most_recent_index, _)| index > most_recent_index) {
                    most_recent = Some((index, term));
                }
            }
            let (satisfier_index, most_recent_term) =
                most_recent.expect("a non-failure incompatibility has terms");
            let most_recent_term = most_recent_term.clone();
            let satisfier = self.partial_solution.assignments()[satisfier_index].clone();

            // The maximum decision level at which the incompatibility minus
            // its most recent term is satisfied.
            let mut previous_level = 0;
            for term in incompatibility.iter() {
                if term.package == most_recent_term.package {
                    continue;
                }
                let (_, other_satisfier) = self.partial_solution.satisfier(term);
                previous_level = previous_level.max(other_satisfier.decision_level);
            }
            // The part of the satisfier's own term that the conflicting
            // term does not cover: when the satisfier only partially
            // satisfies the term, its residual joins the prior cause.
            let difference = satisfier.term.difference(&most_recent_term);
            if let Some(difference) = &difference {
                let (_, difference_satisfier) =
                    self.partial_solution.satisfier(&difference.inverse());
                previous_level = previous_level.max(difference_satisfier.decision_level);
            }

            if previous_level < satisfier.decision_level || satisfier.is_decision() {
                self.partial_solution.backtrack(previous_level);
                if created_new {
                    self.add_incompatibility(
                        incompatibility.clone(),
                        TraceLocation::ConflictResolution,
                        delegate,
                    );
                }
                return Ok(incompatibility);
            }

            // Build the prior cause: replace the most recent term by the
            // remaining terms of the incompatibility that satisfied it.
            let prior = satisfier
                .cause()
                .expect("a non-decision satisfier has a cause")
                .clone();
            if let Some(delegate) = delegate {
                delegate.trace(TraceStep::ConflictResolution {
                    incompatibility: &incompatibility,
                    term: &most_recent_term,
                    satisfier: &satisfier,
                });
            }
            let mut terms: Vec<Term<P>> = incompatibility
                .iter()
                .filter(|term| term.package != most_recent_term.package)
                .cloned()
                .collect();
            terms.extend(
                prior
                    .iter()
                    .filter(|term| term.package != satisfier.term.package)
                    .cloned(),
            );
            if let Some(difference) = difference {
                terms.push(difference.inverse());
            }
            incompatibility = Arc::new(Incompatibility::new(
                terms,
                Cause::Conflict {
                    conflict: incompatibility.clone(),
                    other: prior,
                },
                &self.root,
            ));
            created_new = true;
            debug!("prior cause: {}", incompatibility);
        }
    }

    fn trace_derivation(
        &self,
        term: &Term<P>,
        cause: &Arc<Incompatibility<P>>,
        delegate: Option<&dyn SolverDelegate<P = P>>,
    ) {
        debug!("derived: {}", term);
        if let Some(delegate) = delegate {
            delegate.trace(TraceStep::General {
                value: TraceValue::Term(term),
                kind: TraceKind::Derivation,
                location: TraceLocation::UnitPropagation,
                cause: Some(cause_label(&cause.cause)),
                decision_level: self.partial_solution.decision_level(),
            });
        }
    }
}

/// Short human-readable label of an incompatibility cause, for traces.
fn cause_label<P: Package>(cause: &Cause<P>) -> String {
    match cause {
        Cause::Root => "root".to_string(),
        Cause::Dependency(package) => format!("dependency of {}", package),
        Cause::Conflict { .. } => "conflict resolution".to_string(),
        Cause::NoAvailableVersion => "no available version".to_string(),
    }
}

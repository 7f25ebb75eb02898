// SPDX-License-Identifier: MPL-2.0

//! The partial solution is the chronological list of all package
//! assignments, with per-package summaries regrouping the accumulated
//! constraints.

use std::fmt::{self, Display};
use std::hash::BuildHasherDefault;
use std::sync::Arc;

use log::debug;
use rustc_hash::FxHasher;

use crate::internal::incompatibility::Incompatibility;
use crate::term::{SetRelation, Term};
use crate::version_set::{BoundVersion, Requirement, VersionSet};
use crate::{Map, Package};

type FnvIndexMap<K, V> = indexmap::IndexMap<K, V, BuildHasherDefault<FxHasher>>;

/// One step appended to the partial solution: either a decision or a
/// derivation.
#[derive(Debug, Clone)]
pub struct Assignment<P: Package> {
    /// The term assigned to the package.
    pub term: Term<P>,
    /// The decision level the assignment was made at.
    pub decision_level: usize,
    /// Whether the assignment is a decision or a derivation.
    pub kind: AssignmentKind<P>,
}

/// Whether an assignment was chosen or inferred.
#[derive(Debug, Clone)]
pub enum AssignmentKind<P: Package> {
    /// A chosen binding for the package, opening a new decision level. The
    /// assignment term is the corresponding positive exact (or opaque) term.
    Decision,
    /// A term forced by unit propagation of the given incompatibility.
    Derivation {
        /// The incompatibility that propagated the term.
        cause: Arc<Incompatibility<P>>,
    },
}

impl<P: Package> Assignment<P> {
    /// Whether this assignment is a decision.
    pub fn is_decision(&self) -> bool {
        matches!(self.kind, AssignmentKind::Decision)
    }

    /// The propagating incompatibility of a derivation.
    pub fn cause(&self) -> Option<&Arc<Incompatibility<P>>> {
        match &self.kind {
            AssignmentKind::Decision => None,
            AssignmentKind::Derivation { cause } => Some(cause),
        }
    }
}

/// The partial solution contains all package assignments,
/// historically ordered and regrouped by package.
///
/// For every package at most one of the two summaries is kept: `positive`
/// holds the intersection of all positive assignments (minus any negative
/// ones), `negative` holds the accumulated negative constraint of packages
/// that nothing requires yet. As soon as a positive assignment arrives, the
/// negative summary is absorbed into it.
pub struct PartialSolution<P: Package> {
    /// All assignments, in chronological order.
    assignments: Vec<Assignment<P>>,
    /// The chosen binding of every decided package, in decision order.
    decisions: FnvIndexMap<P, BoundVersion>,
    /// Accumulated constraint of packages some selected version requires.
    /// Insertion order drives decision making, so it must be deterministic.
    positive: FnvIndexMap<P, Term<P>>,
    /// Accumulated constraint of packages only mentioned negatively so far.
    negative: Map<P, Term<P>>,
}

/// An always-false positive term, recording that the accumulated
/// constraints on a package cannot be met by any version.
fn empty_positive<P: Package>(package: P) -> Term<P> {
    Term::positive(package, Requirement::Versions(VersionSet::Empty))
}

/// The binding a decision term stands for. Decisions are made on exact
/// versions or opaque fixed requirements only; a range here is a solver bug.
fn decision_binding<P: Package>(term: &Term<P>) -> BoundVersion {
    match &term.requirement {
        Requirement::Versions(VersionSet::Exact(v)) => BoundVersion::Version(v.clone()),
        Requirement::Revision(r) => BoundVersion::Revision(r.clone()),
        Requirement::Unversioned => BoundVersion::Unversioned,
        requirement => unreachable!("decision on a non-exact requirement: {}", requirement),
    }
}

impl<P: Package> PartialSolution<P> {
    /// Initialize an empty partial solution.
    pub(crate) fn new() -> Self {
        Self {
            assignments: Vec::new(),
            decisions: FnvIndexMap::default(),
            positive: FnvIndexMap::default(),
            negative: Map::default(),
        }
    }

    /// The current decision level. Root is decided at level 0.
    pub fn decision_level(&self) -> usize {
        self.decisions.len().saturating_sub(1)
    }

    /// All assignments, in chronological order.
    pub fn assignments(&self) -> &[Assignment<P>] {
        &self.assignments
    }

    /// The bindings decided so far, in decision order.
    pub fn decisions(&self) -> impl Iterator<Item = (&P, &BoundVersion)> {
        self.decisions.iter()
    }

    /// The decided binding of a package, if any.
    pub fn decision(&self, package: &P) -> Option<&BoundVersion> {
        self.decisions.get(package)
    }

    /// Append a derivation forced by `cause` at the current decision level.
    pub(crate) fn derive(&mut self, term: Term<P>, cause: Arc<Incompatibility<P>>) {
        self.assignments.push(Assignment {
            term: term.clone(),
            decision_level: self.decision_level(),
            kind: AssignmentKind::Derivation { cause },
        });
        self.register(term);
    }

    /// Append a decision, opening a new decision level.
    pub(crate) fn decide(&mut self, package: P, binding: BoundVersion) {
        debug_assert!(
            self.decision(&package).is_none(),
            "{} already has a decision",
            package
        );
        if cfg!(debug_assertions) {
            // The chosen version must be allowed by the accumulated
            // constraint on the package.
            if let (BoundVersion::Version(v), Some(term)) = (&binding, self.positive.get(&package))
            {
                if let Requirement::Versions(set) = &term.requirement {
                    debug_assert!(
                        set.contains(v),
                        "{}: {} was expected to be contained in {}",
                        package,
                        v,
                        set,
                    );
                }
            }
        }
        let term = match &binding {
            BoundVersion::Version(v) => Term::exact(package.clone(), v.clone()),
            BoundVersion::Revision(r) => {
                Term::positive(package.clone(), Requirement::Revision(r.clone()))
            }
            BoundVersion::Unversioned => Term::positive(package.clone(), Requirement::Unversioned),
        };
        self.decisions.insert(package, binding);
        self.assignments.push(Assignment {
            term: term.clone(),
            decision_level: self.decisions.len() - 1,
            kind: AssignmentKind::Decision,
        });
        self.register(term);
    }

    /// Fold a new assignment term into the per-package summaries.
    fn register(&mut self, term: Term<P>) {
        let package = term.package.clone();
        if let Some(existing) = self.positive.get(&package) {
            let folded = existing
                .intersect(&term)
                .unwrap_or_else(|| empty_positive(package.clone()));
            self.positive.insert(package, folded);
            return;
        }
        let folded = match self.negative.get(&package) {
            Some(negative) => term
                .intersect(negative)
                .unwrap_or_else(|| empty_positive(package.clone())),
            None => term,
        };
        if folded.positive {
            self.negative.remove(&package);
            self.positive.insert(package, folded);
        } else {
            self.negative.insert(package, folded);
        }
    }

    /// How the accumulated constraints on `term.package` compare to `term`.
    /// A package without any assignment is inconclusive.
    pub(crate) fn relation(&self, term: &Term<P>) -> SetRelation {
        if let Some(positive) = self.positive.get(&term.package) {
            positive.relation(term)
        } else if let Some(negative) = self.negative.get(&term.package) {
            negative.relation(term)
        } else {
            SetRelation::Overlap
        }
    }

    /// Whether the accumulated constraints imply `term`.
    pub(crate) fn satisfies(&self, term: &Term<P>) -> bool {
        self.relation(term) == SetRelation::Subset
    }

    /// The earliest assignment such that the accumulated constraints on
    /// `term.package` up to and including it imply `term`.
    ///
    /// A satisfier must exist when this is called; its absence is a bug in
    /// conflict resolution.
    pub(crate) fn satisfier(&self, term: &Term<P>) -> (usize, &Assignment<P>) {
        let mut accumulated: Option<Term<P>> = None;
        for (index, assignment) in self.assignments.iter().enumerate() {
            if assignment.term.package != term.package {
                continue;
            }
            let folded = match &accumulated {
                None => assignment.term.clone(),
                Some(acc) => acc
                    .intersect(&assignment.term)
                    .unwrap_or_else(|| empty_positive(term.package.clone())),
            };
            if folded.satisfies(term) {
                return (index, assignment);
            }
            accumulated = Some(folded);
        }
        unreachable!("no satisfier found for {}", term)
    }

    /// Backtrack the partial solution to a given decision level, dropping
    /// every assignment above it and rebuilding the summaries by replay.
    pub(crate) fn backtrack(&mut self, decision_level: usize) {
        debug!("backtracking to decision level {}", decision_level);
        while self
            .assignments
            .last()
            .is_some_and(|a| a.decision_level > decision_level)
        {
            self.assignments.pop();
        }
        self.decisions.clear();
        self.positive.clear();
        self.negative.clear();
        let assignments = std::mem::take(&mut self.assignments);
        for assignment in &assignments {
            if assignment.is_decision() {
                self.decisions.insert(
                    assignment.term.package.clone(),
                    decision_binding(&assignment.term),
                );
            }
            self.register(assignment.term.clone());
        }
        self.assignments = assignments;
    }

    /// The packages some selected version requires but that have no
    /// decision yet, with their accumulated constraint, in the order the
    /// solver first learned about them.
    pub(crate) fn undecided(&self) -> impl Iterator<Item = &Term<P>> {
        self.positive
            .values()
            .filter(|term| !self.decisions.contains_key(&term.package))
    }
}

impl<P: Package> Display for PartialSolution<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "decision level {}:", self.decision_level())?;
        for assignment in &self.assignments {
            writeln!(
                f,
                "  [{}] {} ({})",
                assignment.decision_level,
                assignment.term,
                if assignment.is_decision() {
                    "decision"
                } else {
                    "derivation"
                },
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::internal::incompatibility::Cause;
    use crate::version_set::tests::version;

    fn caret(major: u64, minor: u64, patch: u64) -> Requirement {
        Requirement::Versions(VersionSet::up_to_next_major(version(major, minor, patch)))
    }

    fn some_cause() -> Arc<Incompatibility<&'static str>> {
        Arc::new(Incompatibility::new(
            vec![Term::positive("a", caret(1, 0, 0))],
            Cause::NoAvailableVersion,
            &"root",
        ))
    }

    #[test]
    fn negative_is_absorbed_by_the_first_positive() {
        let mut solution = PartialSolution::new();
        solution.derive(
            Term::negative(
                "a",
                Requirement::Versions(VersionSet::range(version(1, 5, 0), version(2, 0, 0))),
            ),
            some_cause(),
        );
        // Only a negative summary so far.
        assert_eq!(
            solution.relation(&Term::positive("a", caret(1, 5, 0))),
            SetRelation::Disjoint
        );
        solution.derive(Term::positive("a", caret(1, 0, 0)), some_cause());
        // The negative was folded into the positive: [1.0.0, 2.0.0) minus
        // [1.5.0, 2.0.0) leaves [1.0.0, 1.5.0).
        assert!(solution.satisfies(&Term::positive(
            "a",
            Requirement::Versions(VersionSet::range(version(1, 0, 0), version(1, 5, 0)))
        )));
        assert_eq!(solution.undecided().count(), 1);
    }

    #[test]
    fn decision_levels_follow_decision_count() {
        let mut solution: PartialSolution<&str> = PartialSolution::new();
        solution.decide("root", BoundVersion::Version(version(1, 0, 0)));
        assert_eq!(solution.decision_level(), 0);
        solution.derive(Term::positive("a", caret(1, 0, 0)), some_cause());
        solution.decide("a", BoundVersion::Version(version(1, 2, 0)));
        assert_eq!(solution.decision_level(), 1);
        assert_eq!(solution.undecided().count(), 0);
        assert_eq!(
            solution.decision(&"a"),
            Some(&BoundVersion::Version(version(1, 2, 0)))
        );
    }

    #[test]
    fn satisfier_is_the_earliest_implying_assignment() {
        let mut solution = PartialSolution::new();
        solution.derive(Term::positive("a", caret(1, 0, 0)), some_cause());
        solution.derive(
            Term::positive(
                "a",
                Requirement::Versions(VersionSet::range(version(1, 2, 0), version(3, 0, 0))),
            ),
            some_cause(),
        );
        solution.derive(Term::positive("b", caret(2, 0, 0)), some_cause());

        // The first assignment alone implies a loose requirement.
        let (index, _) = solution.satisfier(&Term::positive(
            "a",
            Requirement::Versions(VersionSet::range(version(0, 1, 0), version(2, 0, 0))),
        ));
        assert_eq!(index, 0);
        // The tight requirement needs the accumulated intersection.
        let (index, _) = solution.satisfier(&Term::positive(
            "a",
            Requirement::Versions(VersionSet::range(version(1, 2, 0), version(2, 0, 0))),
        ));
        assert_eq!(index, 1);
    }

    #[test]
    fn backtrack_rebuilds_summaries_by_replay() {
        let mut solution = PartialSolution::new();
        solution.decide("root", BoundVersion::Version(version(1, 0, 0)));
        solution.derive(Term::positive("a", caret(1, 0, 0)), some_cause());
        solution.decide("a", BoundVersion::Version(version(1, 0, 0)));
        solution.derive(Term::positive("b", caret(1, 0, 0)), some_cause());
        solution.decide("b", BoundVersion::Version(version(1, 0, 0)));

        solution.backtrack(0);

        assert!(solution
            .assignments()
            .iter()
            .all(|a| a.decision_level == 0));
        assert_eq!(solution.decision_level(), 0);
        assert!(solution.decision(&"root").is_some());
        assert_eq!(solution.decision(&"a"), None);
        assert_eq!(solution.decision(&"b"), None);
        // `a` is constrained again (derived at level 0), `b` is gone.
        assert_eq!(
            solution.undecided().map(|t| t.package).collect::<Vec<_>>(),
            vec!["a"]
        );
        assert_eq!(
            solution.relation(&Term::positive("b", caret(1, 0, 0))),
            SetRelation::Overlap
        );
    }

    #[test]
    fn opaque_bindings_are_decided_as_is() {
        let mut solution = PartialSolution::new();
        solution.decide("root", BoundVersion::Version(version(1, 0, 0)));
        solution.derive(
            Term::positive("tools", Requirement::Revision("main".to_string())),
            some_cause(),
        );
        solution.decide("tools", BoundVersion::Revision("main".to_string()));
        assert_eq!(solution.decision_level(), 1);
        assert!(solution.satisfies(&Term::positive(
            "tools",
            Requirement::Revision("main".to_string())
        )));
    }
}

// SPDX-License-Identifier: MPL-2.0

//! An incompatibility is a set of terms for different packages
//! that should never be satisfied all together.

use std::fmt::{self, Display};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::term::{SetRelation, Term};
use crate::version_set::Requirement;
use crate::{Map, Package};

/// An incompatibility is a set of terms for different packages
/// that should never be satisfied all together.
///
/// An incompatibility usually originates from a package dependency. For
/// example, if package A at version 1 depends on package B at version 2, you
/// can never have both terms `A = 1` and `not B = 2` satisfied at the same
/// time in a partial solution: that would mean we selected A at version 1
/// but not B at version 2, contradicting the dependency. Therefore the set
/// `{ A = 1, not B = 2 }` is an incompatibility.
///
/// Incompatibilities can also be derived from two other incompatibilities
/// during conflict resolution; the [Cause] of each derived incompatibility
/// keeps both parents, so the terminal incompatibility of a failed solve
/// carries the whole derivation graph for error reporting.
#[derive(Debug, Clone)]
pub struct Incompatibility<P: Package> {
    /// Normalized terms: one per package, ordered by package name.
    terms: Vec<Term<P>>,
    /// The reason for the incompatibility.
    pub cause: Cause<P>,
}

/// The reason for an incompatibility.
///
/// Causes form a directed acyclic graph whose internal nodes are
/// [Cause::Conflict] and whose leaves are the external reasons.
#[derive(Debug, Clone)]
pub enum Cause<P: Package> {
    /// Initial incompatibility binding a root dependency.
    Root,
    /// Incompatibility coming from the dependencies of the given package.
    Dependency(P),
    /// Derived from two incompatibilities during conflict resolution.
    Conflict {
        /// The incompatibility that was in conflict with the partial
        /// solution.
        conflict: Arc<Incompatibility<P>>,
        /// The cause of the satisfier of the conflicting term.
        other: Arc<Incompatibility<P>>,
    },
    /// There is no version satisfying the term's requirement.
    NoAvailableVersion,
}

/// How the terms of an incompatibility compare to a set of assignments,
/// typically the partial solution.
#[derive(Debug, Eq, PartialEq)]
pub(crate) enum Relation<P: Package> {
    /// Every term is satisfied: the incompatibility is violated.
    Satisfied,
    /// At least one term is contradicted, the incompatibility cannot fire.
    Contradicted,
    /// All terms but one are satisfied; propagation can derive the inverse
    /// of the remaining term, on this package.
    AlmostSatisfied(P),
    /// Anything else.
    Inconclusive,
}

impl<P: Package> Incompatibility<P> {
    /// Build an incompatibility from a list of terms, normalizing them.
    ///
    /// Terms are grouped by package and folded into a single term per
    /// package; the folded terms are then ordered by package name so that
    /// iteration order never depends on hashing. When the cause is a
    /// conflict and more than one term remains, positive terms on the root
    /// package are dropped: root is always selected, so they contribute no
    /// constraint.
    pub(crate) fn new(terms: Vec<Term<P>>, cause: Cause<P>, root: &P) -> Self {
        let drop_root_terms = matches!(cause, Cause::Conflict { .. }) && terms.len() > 1;
        let mut grouped: Map<P, Term<P>> = Map::default();
        let mut packages: Vec<P> = Vec::new();
        for term in terms {
            if drop_root_terms && term.positive && &term.package == root {
                continue;
            }
            match grouped.entry(term.package.clone()) {
                std::collections::hash_map::Entry::Occupied(mut occupied) => {
                    let folded = occupied
                        .get()
                        .intersect(&term)
                        .expect("two terms of one incompatibility cancelled each other out");
                    occupied.insert(folded);
                }
                std::collections::hash_map::Entry::Vacant(vacant) => {
                    packages.push(term.package.clone());
                    vacant.insert(term);
                }
            }
        }
        packages.sort_by_key(|p| p.to_string());
        let terms = packages
            .into_iter()
            .map(|p| grouped.remove(&p).unwrap())
            .collect();
        Self { terms, cause }
    }

    /// The dependency incompatibility `{ package @ versions, not dep @ requirement }`.
    ///
    /// A package depending on itself folds into a single term forbidding
    /// the versions that violate their own requirement, or into nothing
    /// when the requirement is always met.
    pub(crate) fn from_dependency(
        package: P,
        versions: Requirement,
        dep: (P, Requirement),
        root: &P,
    ) -> Option<Self> {
        let (dep_package, dep_requirement) = dep;
        let depender = Term::positive(package.clone(), versions);
        let dependency = Term::negative(dep_package.clone(), dep_requirement);
        if package == dep_package {
            let violating = depender.intersect(&dependency)?;
            return Some(Self::new(
                vec![violating],
                Cause::Dependency(package),
                root,
            ));
        }
        Some(Self::new(
            vec![depender, dependency],
            Cause::Dependency(package),
            root,
        ))
    }

    /// Remember that no version satisfies the given term.
    pub(crate) fn no_available_version(term: Term<P>, root: &P) -> Self {
        Self::new(vec![term], Cause::NoAvailableVersion, root)
    }

    /// Iterate over the normalized terms.
    pub fn iter(&self) -> impl Iterator<Item = &Term<P>> {
        self.terms.iter()
    }

    /// The number of terms.
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    /// Whether the incompatibility has no term left.
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Get the term related to a given package (if it exists).
    pub fn get(&self, package: &P) -> Option<&Term<P>> {
        self.terms.iter().find(|term| &term.package == package)
    }

    /// Whether this incompatibility marks the end of the algorithm: it is
    /// empty, or its only term is a positive one on the root package.
    pub(crate) fn is_failure(&self, root: &P) -> bool {
        match self.terms.as_slice() {
            [] => true,
            [term] => term.positive && &term.package == root,
            _ => false,
        }
    }

    /// Compare the incompatibility to a set of assignments, given the
    /// relation of each term with those assignments.
    pub(crate) fn relation(
        &self,
        mut relation_of: impl FnMut(&Term<P>) -> SetRelation,
    ) -> Relation<P> {
        let mut relation = Relation::Satisfied;
        for term in &self.terms {
            match relation_of(term) {
                SetRelation::Subset => {}
                SetRelation::Disjoint => return Relation::Contradicted,
                SetRelation::Overlap => {
                    if relation == Relation::Satisfied {
                        relation = Relation::AlmostSatisfied(term.package.clone());
                    } else {
                        return Relation::Inconclusive;
                    }
                }
            }
        }
        relation
    }

    /// Retrieve the parent causes of a derived incompatibility.
    pub fn causes(&self) -> Option<(&Arc<Incompatibility<P>>, &Arc<Incompatibility<P>>)> {
        match &self.cause {
            Cause::Conflict { conflict, other } => Some((conflict, other)),
            _ => None,
        }
    }
}

/// Equality and hashing are structural over the terms: two derivations of
/// the same terms are the same incompatibility for database deduplication,
/// regardless of where in the cause graph they sit.
impl<P: Package> PartialEq for Incompatibility<P> {
    fn eq(&self, other: &Self) -> bool {
        self.terms == other.terms
    }
}

impl<P: Package> Eq for Incompatibility<P> {}

impl<P: Package> Hash for Incompatibility<P> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.terms.hash(state);
    }
}

impl<P: Package> Display for Incompatibility<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.terms.as_slice() {
            [] => write!(f, "version solving failed"),
            [term] if term.positive => {
                write!(f, "{} {} is forbidden", term.package, term.requirement)
            }
            [term] => write!(f, "{} {} is mandatory", term.package, term.requirement),
            [lhs, rhs]
                if lhs.positive != rhs.positive
                    && matches!(self.cause, Cause::Dependency(_) | Cause::Root) =>
            {
                let (depender, dependency) = if lhs.positive { (lhs, rhs) } else { (rhs, lhs) };
                write!(
                    f,
                    "{} {} depends on {} {}",
                    depender.package,
                    depender.requirement,
                    dependency.package,
                    dependency.requirement
                )
            }
            terms => {
                let mut terms = terms.iter();
                // At least two terms in this arm.
                write!(f, "{}", terms.next().unwrap())?;
                for term in terms {
                    write!(f, ", {}", term)?;
                }
                write!(f, " are incompatible")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version_set::tests::version;
    use crate::version_set::VersionSet;

    fn caret(major: u64, minor: u64, patch: u64) -> Requirement {
        Requirement::Versions(VersionSet::up_to_next_major(version(major, minor, patch)))
    }

    #[test]
    fn terms_of_one_package_are_folded() {
        let root = "root";
        let incompat = Incompatibility::new(
            vec![
                Term::positive("a", caret(1, 0, 0)),
                Term::positive(
                    "a",
                    Requirement::Versions(VersionSet::range(version(1, 5, 0), version(3, 0, 0))),
                ),
                Term::negative("b", caret(1, 0, 0)),
            ],
            Cause::Dependency("a"),
            &root,
        );
        assert_eq!(incompat.len(), 2);
        assert_eq!(
            incompat.get(&"a").unwrap().requirement,
            Requirement::Versions(VersionSet::range(version(1, 5, 0), version(2, 0, 0)))
        );
    }

    #[test]
    fn terms_are_ordered_by_package_name() {
        let root = "root";
        let incompat = Incompatibility::new(
            vec![
                Term::positive("zlib", caret(1, 0, 0)),
                Term::negative("abc", caret(1, 0, 0)),
                Term::negative("mid", caret(1, 0, 0)),
            ],
            Cause::NoAvailableVersion,
            &root,
        );
        let packages: Vec<_> = incompat.iter().map(|t| t.package).collect();
        assert_eq!(packages, vec!["abc", "mid", "zlib"]);
    }

    #[test]
    fn conflict_cause_drops_positive_root_term() {
        let root = "root";
        let leaf = Arc::new(Incompatibility::new(
            vec![Term::positive("a", caret(1, 0, 0))],
            Cause::NoAvailableVersion,
            &root,
        ));
        let conflict = Incompatibility::new(
            vec![
                Term::positive("root", Requirement::exact(version(1, 0, 0))),
                Term::positive("a", caret(1, 0, 0)),
            ],
            Cause::Conflict {
                conflict: leaf.clone(),
                other: leaf.clone(),
            },
            &root,
        );
        assert_eq!(conflict.len(), 1);
        assert_eq!(conflict.get(&"root"), None);

        // Outside conflict resolution the root term is constraint-bearing.
        let external = Incompatibility::new(
            vec![
                Term::positive("root", Requirement::exact(version(1, 0, 0))),
                Term::negative("a", caret(1, 0, 0)),
            ],
            Cause::Root,
            &root,
        );
        assert!(external.get(&"root").is_some());
    }

    #[test]
    fn dependency_display() {
        let root = "root";
        let incompat = Incompatibility::from_dependency(
            "a",
            Requirement::Versions(VersionSet::range(version(1, 0, 0), version(2, 0, 0))),
            ("b", caret(2, 0, 0)),
            &root,
        )
        .unwrap();
        assert_eq!(
            incompat.to_string(),
            "a >=1.0.0, <2.0.0 depends on b >=2.0.0, <3.0.0"
        );
    }

    #[test]
    fn self_dependency_folds_or_vanishes() {
        let root = "root";
        // A version series satisfying its own requirement adds no constraint.
        assert!(Incompatibility::from_dependency(
            "a",
            caret(1, 0, 0),
            ("a", caret(1, 0, 0)),
            &root,
        )
        .is_none());
        // One violating its own requirement forbids the violating versions.
        let incompat = Incompatibility::from_dependency(
            "a",
            Requirement::Versions(VersionSet::range(version(1, 0, 0), version(2, 0, 0))),
            ("a", Requirement::exact(version(3, 0, 0))),
            &root,
        )
        .unwrap();
        assert_eq!(incompat.len(), 1);
        let term = incompat.iter().next().unwrap();
        assert!(term.positive);
        assert_eq!(
            term.requirement,
            Requirement::Versions(VersionSet::range(version(1, 0, 0), version(2, 0, 0)))
        );
    }

    #[test]
    fn equality_ignores_the_cause_graph() {
        let root = "root";
        let by_dependency =
            Incompatibility::from_dependency("a", caret(1, 0, 0), ("b", caret(1, 0, 0)), &root)
                .unwrap();
        let by_hand = Incompatibility::new(
            vec![
                Term::positive("a", caret(1, 0, 0)),
                Term::negative("b", caret(1, 0, 0)),
            ],
            Cause::NoAvailableVersion,
            &root,
        );
        assert_eq!(by_dependency, by_hand);
    }
}

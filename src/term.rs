// SPDX-License-Identifier: MPL-2.0

//! A term is the fundamental unit of operation of the PubGrub algorithm.
//! It is a positive or negative expression regarding a requirement on one
//! package.

use std::fmt::{self, Display};

use semver::Version;

use crate::version_set::{Requirement, VersionSet};
use crate::Package;

/// A positive or negative expression regarding a requirement on one package.
///
/// A positive term means "some version of `package` matching `requirement`
/// is selected". A negative term means "no version of `package` matching
/// `requirement` is selected"; in particular it is true when the package is
/// not selected at all.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Term<P: Package> {
    /// The package the expression is about.
    pub package: P,
    /// The requirement the expression ranges over.
    pub requirement: Requirement,
    /// The polarity of the expression.
    pub positive: bool,
}

/// Describe a relation between a term and another expression on the same
/// package, typically the accumulated assignments of the partial solution.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SetRelation {
    /// The two expressions cannot both be true.
    Disjoint,
    /// The two expressions can each be true without implying the other.
    Overlap,
    /// Whenever `self` is true, the other expression is true.
    Subset,
}

impl<P: Package> Term<P> {
    /// Construct a positive term.
    pub fn positive(package: P, requirement: Requirement) -> Self {
        Self {
            package,
            requirement,
            positive: true,
        }
    }

    /// Construct a negative term.
    pub fn negative(package: P, requirement: Requirement) -> Self {
        Self {
            package,
            requirement,
            positive: false,
        }
    }

    /// A positive term selecting exactly one version.
    pub fn exact(package: P, version: Version) -> Self {
        Self::positive(package, Requirement::exact(version))
    }

    /// The same expression with the opposite polarity.
    pub fn inverse(&self) -> Self {
        Self {
            package: self.package.clone(),
            requirement: self.requirement.clone(),
            positive: !self.positive,
        }
    }

    /// Whether this term being true forces `other` to be true.
    pub fn satisfies(&self, other: &Self) -> bool {
        self.package == other.package && self.relation(other) == SetRelation::Subset
    }

    /// Compute the intersection of two terms on the same package.
    ///
    /// The intersection is positive if at least one of the two terms is
    /// positive, and `None` when the result is empty or the requirements
    /// cannot be combined algebraically.
    pub fn intersect(&self, other: &Self) -> Option<Self> {
        assert_eq!(
            self.package, other.package,
            "attempting an intersection between different packages"
        );
        let (lhs, rhs) = match (&self.requirement, &other.requirement) {
            (Requirement::Versions(lhs), Requirement::Versions(rhs)) => (lhs, rhs),
            _ => {
                // Opaque requirements only combine with themselves.
                return (self.positive && other.positive && self.requirement == other.requirement)
                    .then(|| self.clone());
            }
        };
        let (set, positive) = match (self.positive, other.positive) {
            (true, true) => (lhs.intersection(rhs), true),
            (false, false) => (negative_union(lhs, rhs), false),
            (true, false) => (lhs.intersection_with_inverse(rhs), true),
            (false, true) => (rhs.intersection_with_inverse(lhs), true),
        };
        if set.is_empty() {
            return None;
        }
        Some(Self {
            package: self.package.clone(),
            requirement: Requirement::Versions(set),
            positive,
        })
    }

    /// The versions of this term that `other` does not allow,
    /// i.e. the intersection with the inverse of `other`.
    pub fn difference(&self, other: &Self) -> Option<Self> {
        self.intersect(&other.inverse())
    }

    /// Compute the relation of this term with another expression on the
    /// same package.
    ///
    /// Terms on distinct packages have no relation; calling this across
    /// packages is a bug in the solver.
    pub fn relation(&self, other: &Self) -> SetRelation {
        assert_eq!(
            self.package, other.package,
            "attempting a relation between different packages"
        );
        let lhs = &self.requirement;
        let rhs = &other.requirement;
        match (self.positive, other.positive) {
            (true, true) => {
                if requirement_subset(lhs, rhs) {
                    SetRelation::Subset
                } else if requirement_intersects(lhs, rhs) {
                    SetRelation::Overlap
                } else {
                    SetRelation::Disjoint
                }
            }
            (true, false) => {
                if !requirement_intersects(lhs, rhs) {
                    SetRelation::Subset
                } else if requirement_subset(lhs, rhs) {
                    SetRelation::Disjoint
                } else {
                    SetRelation::Overlap
                }
            }
            (false, true) => {
                if requirement_subset(rhs, lhs) {
                    SetRelation::Disjoint
                } else {
                    SetRelation::Overlap
                }
            }
            (false, false) => {
                if requirement_subset(rhs, lhs) {
                    SetRelation::Subset
                } else {
                    SetRelation::Overlap
                }
            }
        }
    }
}

/// Set inclusion lifted to requirements: opaque requirements are singleton
/// sets equal only to themselves.
fn requirement_subset(lhs: &Requirement, rhs: &Requirement) -> bool {
    match (lhs, rhs) {
        (Requirement::Versions(lhs), Requirement::Versions(rhs)) => lhs.is_subset_of(rhs),
        _ => lhs == rhs,
    }
}

/// Set overlap lifted to requirements.
fn requirement_intersects(lhs: &Requirement, rhs: &Requirement) -> bool {
    match (lhs, rhs) {
        (Requirement::Versions(lhs), Requirement::Versions(rhs)) => lhs.intersects(rhs),
        _ => lhs == rhs,
    }
}

/// The union of two negated sets, as stored in a negative term.
///
/// Two intervals widen to the spanning interval `[min(lo), max(hi))`, a
/// superset of the true union: the negative term then excludes more than
/// either input did, which is the conservative direction for negatives.
fn negative_union(lhs: &VersionSet, rhs: &VersionSet) -> VersionSet {
    if let (
        VersionSet::Range { lower, upper },
        VersionSet::Range {
            lower: other_lower,
            upper: other_upper,
        },
    ) = (lhs, rhs)
    {
        VersionSet::range(
            lower.clone().min(other_lower.clone()),
            upper.clone().max(other_upper.clone()),
        )
    } else {
        lhs.intersection(rhs)
    }
}

impl<P: Package> Display for Term<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.positive {
            write!(f, "{} {}", self.package, self.requirement)
        } else {
            write!(f, "not {} {}", self.package, self.requirement)
        }
    }
}

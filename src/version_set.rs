// SPDX-License-Identifier: MPL-2.0

//! Sets of semantic versions, and the requirements that carry them.
//!
//! A [VersionSet] is one of four shapes: every version, no version, exactly
//! one version, or a half-open interval `[lower, upper)`. All solver algebra
//! (term intersection, unit propagation, conflict resolution) reduces to the
//! operations defined here.
//!
//! Sets are kept canonical: an interval with `lower >= upper` is constructed
//! as [VersionSet::Empty], and an interval never silently becomes
//! [VersionSet::Exact], so structural equality is set equality.

use std::fmt::{self, Display};

use semver::Version;

/// A set of versions.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum VersionSet {
    /// Every version.
    Any,
    /// No version.
    Empty,
    /// Exactly one version.
    Exact(Version),
    /// The half-open interval `[lower, upper)`.
    Range {
        /// Included lower bound.
        lower: Version,
        /// Excluded upper bound, strictly greater than `lower`.
        upper: Version,
    },
}

/// The lowest version of the whole ordering, used as the implicit lower
/// bound of [VersionSet::Any].
pub(crate) fn lowest_version() -> Version {
    Version::new(0, 0, 0)
}

/// The first version of the next major series, `(v.major + 1).0.0`.
pub(crate) fn next_major(v: &Version) -> Version {
    Version::new(v.major + 1, 0, 0)
}

impl VersionSet {
    /// The interval `[lower, upper)`, or [VersionSet::Empty] when the bounds
    /// describe no version.
    pub fn range(lower: Version, upper: Version) -> Self {
        if lower < upper {
            Self::Range { lower, upper }
        } else {
            Self::Empty
        }
    }

    /// The caret interval `[v, (v.major + 1).0.0)`.
    pub fn up_to_next_major(v: Version) -> Self {
        let upper = next_major(&v);
        Self::range(v, upper)
    }

    /// Whether the version is part of this set.
    pub fn contains(&self, v: &Version) -> bool {
        match self {
            Self::Any => true,
            Self::Empty => false,
            Self::Exact(exact) => exact == v,
            Self::Range { lower, upper } => lower <= v && v < upper,
        }
    }

    /// The set of all versions that are in both sets.
    pub fn intersection(&self, other: &Self) -> Self {
        match (self, other) {
            (Self::Any, _) => other.clone(),
            (_, Self::Any) => self.clone(),
            (Self::Empty, _) | (_, Self::Empty) => Self::Empty,
            (Self::Exact(v), _) => {
                if other.contains(v) {
                    self.clone()
                } else {
                    Self::Empty
                }
            }
            (_, Self::Exact(v)) => {
                if self.contains(v) {
                    other.clone()
                } else {
                    Self::Empty
                }
            }
            (
                Self::Range { lower, upper },
                Self::Range {
                    lower: other_lower,
                    upper: other_upper,
                },
            ) => Self::range(
                lower.clone().max(other_lower.clone()),
                upper.clone().min(other_upper.clone()),
            ),
        }
    }

    /// The versions of `self` that are not in `other`, kept to a single
    /// shape.
    ///
    /// The true residual of two overlapping intervals can be two disjoint
    /// intervals. Only one is kept: the left residual `[self.lower,
    /// other.lower)` when `other` starts strictly inside `self`, otherwise
    /// the right residual `[other.upper, self.upper)`. Likewise, removing a
    /// single exact version from a surrounding interval (or from the full
    /// set) is not representable here and leaves the set unchanged.
    pub fn intersection_with_inverse(&self, other: &Self) -> Self {
        match (self, other) {
            (_, Self::Any) => Self::Empty,
            (_, Self::Empty) => self.clone(),
            (Self::Empty, _) => Self::Empty,
            (Self::Exact(v), _) => {
                if other.contains(v) {
                    Self::Empty
                } else {
                    self.clone()
                }
            }
            (Self::Any, Self::Exact(_)) => Self::Any,
            (
                Self::Any,
                Self::Range {
                    lower: other_lower, ..
                },
            ) => {
                if *other_lower > lowest_version() {
                    Self::range(lowest_version(), other_lower.clone())
                } else {
                    Self::Any
                }
            }
            (Self::Range { .. }, Self::Exact(_)) => self.clone(),
            (
                Self::Range { lower, upper },
                Self::Range {
                    lower: other_lower,
                    upper: other_upper,
                },
            ) => {
                if other_upper <= lower || other_lower >= upper {
                    // No overlap, nothing is removed.
                    self.clone()
                } else if other_lower > lower {
                    Self::range(lower.clone(), other_lower.clone())
                } else {
                    Self::range(other_upper.clone(), upper.clone())
                }
            }
        }
    }

    /// Whether the set contains no version.
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Whether every version of `self` is also in `other`.
    pub fn is_subset_of(&self, other: &Self) -> bool {
        self == &self.intersection(other)
    }

    /// Whether the sets have at least one version in common.
    pub fn intersects(&self, other: &Self) -> bool {
        !self.intersection(other).is_empty()
    }
}

impl Display for VersionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "*"),
            Self::Empty => write!(f, "∅"),
            Self::Exact(v) => write!(f, "{}", v),
            Self::Range { lower, upper } => write!(f, ">={}, <{}", lower, upper),
        }
    }
}

/// The constraint a package places on one of its dependencies.
///
/// Set algebra is only defined between [Requirement::Versions] variants.
/// Revision and unversioned requirements are opaque fixed bindings: equal
/// requirements behave like identical sets, anything else like disjoint
/// sets, and their intersection is "not possible".
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Requirement {
    /// A set of acceptable versions.
    Versions(VersionSet),
    /// A fixed source-control revision.
    Revision(String),
    /// A local or otherwise unversioned binding.
    Unversioned,
}

impl Requirement {
    /// A requirement accepting exactly one version.
    pub fn exact(v: Version) -> Self {
        Self::Versions(VersionSet::Exact(v))
    }

    /// The common part of two requirements, or `None` when their
    /// combination is not possible algebraically.
    pub(crate) fn intersection(&self, other: &Self) -> Option<Self> {
        match (self, other) {
            (Self::Versions(lhs), Self::Versions(rhs)) => {
                Some(Self::Versions(lhs.intersection(rhs)))
            }
            _ if self == other => Some(self.clone()),
            _ => None,
        }
    }
}

impl Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Versions(set) => write!(f, "{}", set),
            Self::Revision(r) => write!(f, "revision {}", r),
            Self::Unversioned => write!(f, "unversioned"),
        }
    }
}

/// The binding a solution assigns to one package.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BoundVersion {
    /// A concrete version.
    Version(Version),
    /// A fixed source-control revision.
    Revision(String),
    /// An unversioned binding.
    Unversioned,
}

impl Display for BoundVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Version(v) => write!(f, "{}", v),
            Self::Revision(r) => write!(f, "revision {}", r),
            Self::Unversioned => write!(f, "unversioned"),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use proptest::prelude::*;

    use super::*;

    pub(crate) fn version(major: u64, minor: u64, patch: u64) -> Version {
        Version::new(major, minor, patch)
    }

    fn range(lo: (u64, u64, u64), hi: (u64, u64, u64)) -> VersionSet {
        VersionSet::range(version(lo.0, lo.1, lo.2), version(hi.0, hi.1, hi.2))
    }

    /// Versions drawn from a small grid so that generated sets frequently
    /// interact.
    pub(crate) fn version_strategy() -> impl Strategy<Value = Version> {
        (0u64..5, 0u64..3, 0u64..3)
            .prop_map(|(major, minor, patch)| Version::new(major, minor, patch))
    }

    pub(crate) fn strategy() -> impl Strategy<Value = VersionSet> {
        prop_oneof![
            Just(VersionSet::Any),
            Just(VersionSet::Empty),
            version_strategy().prop_map(VersionSet::Exact),
            (version_strategy(), version_strategy())
                .prop_map(|(a, b)| VersionSet::range(a.clone().min(b.clone()), a.max(b))),
        ]
    }

    #[test]
    fn degenerate_range_is_empty() {
        assert_eq!(range((1, 0, 0), (1, 0, 0)), VersionSet::Empty);
        assert_eq!(range((2, 0, 0), (1, 0, 0)), VersionSet::Empty);
    }

    #[test]
    fn exact_intersection() {
        let exact = VersionSet::Exact(version(1, 2, 0));
        assert_eq!(
            exact.intersection(&range((1, 0, 0), (2, 0, 0))),
            exact.clone()
        );
        assert_eq!(
            exact.intersection(&range((2, 0, 0), (3, 0, 0))),
            VersionSet::Empty
        );
        assert_eq!(range((1, 0, 0), (2, 0, 0)).intersection(&exact), exact);
    }

    #[test]
    fn range_intersection_is_interval_overlap() {
        assert_eq!(
            range((1, 0, 0), (3, 0, 0)).intersection(&range((2, 0, 0), (4, 0, 0))),
            range((2, 0, 0), (3, 0, 0))
        );
        assert_eq!(
            range((1, 0, 0), (2, 0, 0)).intersection(&range((2, 0, 0), (3, 0, 0))),
            VersionSet::Empty
        );
    }

    #[test]
    fn up_to_next_major_is_caret() {
        assert_eq!(
            VersionSet::up_to_next_major(version(1, 2, 3)),
            range((1, 2, 3), (2, 0, 0))
        );
        assert_eq!(
            VersionSet::up_to_next_major(version(0, 1, 0)),
            range((0, 1, 0), (1, 0, 0))
        );
    }

    /// The two-interval residual keeps only one interval: the left one when
    /// the removed interval starts strictly inside, the right one when the
    /// lower endpoints match.
    #[test]
    fn inverse_intersection_keeps_one_interval() {
        let wide = range((1, 0, 0), (4, 0, 0));
        assert_eq!(
            wide.intersection_with_inverse(&range((2, 0, 0), (3, 0, 0))),
            range((1, 0, 0), (2, 0, 0))
        );
        assert_eq!(
            wide.intersection_with_inverse(&range((1, 0, 0), (3, 0, 0))),
            range((3, 0, 0), (4, 0, 0))
        );
        assert_eq!(
            wide.intersection_with_inverse(&range((3, 0, 0), (4, 0, 0))),
            range((1, 0, 0), (3, 0, 0))
        );
        assert_eq!(
            wide.intersection_with_inverse(&range((0, 1, 0), (5, 0, 0))),
            VersionSet::Empty
        );
        assert_eq!(
            wide.intersection_with_inverse(&range((4, 0, 0), (5, 0, 0))),
            wide
        );
    }

    /// Removing a single version from an interval is not representable and
    /// leaves the interval unchanged.
    #[test]
    fn inverse_intersection_cannot_puncture_intervals() {
        let wide = range((1, 0, 0), (2, 0, 0));
        assert_eq!(
            wide.intersection_with_inverse(&VersionSet::Exact(version(1, 1, 0))),
            wide
        );
        assert_eq!(
            VersionSet::Any.intersection_with_inverse(&VersionSet::Exact(version(1, 1, 0))),
            VersionSet::Any
        );
        assert_eq!(
            VersionSet::Exact(version(1, 1, 0))
                .intersection_with_inverse(&range((1, 0, 0), (2, 0, 0))),
            VersionSet::Empty
        );
    }

    #[test]
    fn any_minus_range_keeps_left_residual() {
        assert_eq!(
            VersionSet::Any.intersection_with_inverse(&range((1, 0, 0), (2, 0, 0))),
            range((0, 0, 0), (1, 0, 0))
        );
        assert_eq!(
            VersionSet::Any.intersection_with_inverse(&range((0, 0, 0), (2, 0, 0))),
            VersionSet::Any
        );
    }

    #[test]
    fn requirement_algebra_is_versions_only() {
        let versions = Requirement::Versions(range((1, 0, 0), (2, 0, 0)));
        let revision = Requirement::Revision("main".to_string());
        assert_eq!(versions.intersection(&versions), Some(versions.clone()));
        assert_eq!(revision.intersection(&revision), Some(revision.clone()));
        assert_eq!(versions.intersection(&revision), None);
        assert_eq!(
            revision.intersection(&Requirement::Revision("dev".to_string())),
            None
        );
        assert_eq!(revision.intersection(&Requirement::Unversioned), None);
    }

    proptest! {
        #[test]
        fn intersection_commutes(a in strategy(), b in strategy()) {
            prop_assert_eq!(a.intersection(&b), b.intersection(&a));
        }

        #[test]
        fn intersection_is_a_lower_bound(a in strategy(), b in strategy(), v in version_strategy()) {
            let both = a.intersection(&b);
            prop_assert_eq!(both.contains(&v), a.contains(&v) && b.contains(&v));
        }

        #[test]
        fn inverse_intersection_never_grows(a in strategy(), b in strategy(), v in version_strategy()) {
            // The kept interval may drop versions of the true residual but
            // never contains a version outside of `a`.
            let residual = a.intersection_with_inverse(&b);
            if residual.contains(&v) {
                prop_assert!(a.contains(&v));
            }
        }
    }
}

// SPDX-License-Identifier: MPL-2.0

//! This bench monitors the performance of backtracking and term
//! intersection.
//!
//! Dependencies are constructed in a way that all versions need to be
//! tested before the solve can conclude.

use criterion::*;
use version_solver::{OfflineContainerProvider, Requirement, Solver, Version, VersionSet};

/// A chain of packages where every version of a package requires an exact
/// version of the next one, and the last package does not exist: each
/// version of the chain head has to be tried and backtracked off.
fn backtracking_chain(c: &mut Criterion, package_count: u64, version_count: u64) {
    let mut provider = OfflineContainerProvider::new();
    provider.add_unversioned_dependencies(0u64, [(1u64, Requirement::Versions(VersionSet::Any))]);
    for package in 1..package_count {
        for version in 1..version_count {
            provider.add_dependencies(
                package,
                Version::new(version, 0, 0),
                [(
                    package + 1,
                    Requirement::Versions(VersionSet::Exact(Version::new(version, 0, 0))),
                )],
            );
        }
    }

    let solver = Solver::new(provider);
    c.bench_function("backtracking_chain", |b| {
        b.iter(|| {
            let _ = solver.solve(0u64, &[]);
        })
    });
}

/// A wide registry without conflicts, dominated by propagation and
/// container bookkeeping rather than backtracking.
fn resolve_wide_tree(c: &mut Criterion, width: u64, versions: u64) {
    let mut provider = OfflineContainerProvider::new();
    let caret = |v: Version| Requirement::Versions(VersionSet::up_to_next_major(v));
    provider.add_unversioned_dependencies(
        0u64,
        (1..=width).map(|package| (package, caret(Version::new(1, 0, 0)))),
    );
    for package in 1..=width {
        for minor in 0..versions {
            provider.add_dependencies(package, Version::new(1, minor, 0), []);
        }
    }

    let solver = Solver::new(provider);
    c.bench_function("resolve_wide_tree", |b| {
        b.iter(|| {
            solver.solve(0u64, &[]).unwrap();
        })
    });
}

fn bench_group(c: &mut Criterion) {
    backtracking_chain(c, 10, 10);
    resolve_wide_tree(c, 50, 5);
}

criterion_group!(benches, bench_group);
criterion_main!(benches);

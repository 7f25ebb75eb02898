// SPDX-License-Identifier: MPL-2.0

//! Errors surfaced by the solver.

use std::error::Error;
use std::fmt::{self, Display};
use std::sync::Arc;

use thiserror::Error;

use crate::internal::incompatibility::Incompatibility;
use crate::Package;

/// Errors returned by [solve](crate::Solver::solve).
///
/// Invariant violations inside the algorithm (mismatched packages in a term
/// relation, a missing satisfier, a range in a final binding) are solver
/// bugs and panic instead of being reported here.
#[derive(Error, Debug)]
pub enum SolverError<P: Package> {
    /// There is no assignment satisfying all dependency constraints.
    ///
    /// The terminal incompatibility carries the whole derivation graph;
    /// [DefaultStringReporter](crate::DefaultStringReporter) turns it into a
    /// human-readable explanation.
    #[error("version solving failed: {0}")]
    Unresolvable(Arc<Incompatibility<P>>),

    /// The container provider failed; the solve was aborted.
    #[error("failed to fetch a package container")]
    Provider(#[from] ProviderError),
}

/// An error produced by a [ContainerProvider](crate::ContainerProvider) or a
/// [PackageContainer](crate::PackageContainer), propagated unchanged.
///
/// The underlying error is shared so that one failed prefetch can be
/// reported to every waiter.
#[derive(Debug, Clone)]
pub struct ProviderError {
    inner: Arc<dyn Error + Send + Sync + 'static>,
}

impl ProviderError {
    /// Wrap a collaborator error.
    pub fn new<E: Error + Send + Sync + 'static>(error: E) -> Self {
        Self {
            inner: Arc::new(error),
        }
    }

    /// A provider error carrying only a message.
    pub fn message(message: impl Into<String>) -> Self {
        Self::new(MessageError(message.into()))
    }
}

impl Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl Error for ProviderError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&*self.inner as &(dyn Error + 'static))
    }
}

#[derive(Error, Debug)]
#[error("{0}")]
struct MessageError(String);

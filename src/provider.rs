// SPDX-License-Identifier: MPL-2.0

//! Access to package containers: the provider traits, the container cache
//! with background prefetching, and an in-memory provider.

use std::collections::BTreeMap;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

use semver::Version;

use crate::error::ProviderError;
use crate::version_set::Requirement;
use crate::{DependencyConstraints, Map, Package};

/// The dependency information of one package, at every fetched version.
///
/// Containers are immutable snapshots; the solver never observes a container
/// change during a solve.
pub trait PackageContainer: Send + Sync {
    /// How the container names its package.
    type P: Package;

    /// The package this container holds the versions of.
    fn identifier(&self) -> &Self::P;

    /// The available versions accepted by the filter, highest first.
    fn versions<'a>(
        &'a self,
        filter: &'a dyn Fn(&Version) -> bool,
    ) -> Box<dyn Iterator<Item = Version> + 'a>;

    /// The direct dependencies of the given version.
    fn dependencies(
        &self,
        version: &Version,
    ) -> Result<DependencyConstraints<Self::P>, ProviderError>;

    /// The direct dependencies of an unversioned container; only the root
    /// package is queried this way.
    fn unversioned_dependencies(&self) -> Result<DependencyConstraints<Self::P>, ProviderError>;
}

/// Trait that allows the algorithm to retrieve the container of each
/// package it discovers. An implementor needs to be supplied to
/// [Solver](crate::Solver).
///
/// Fetching may be slow (network, disk); the solver caches every container
/// and can prefetch the containers it expects to need in the background, so
/// implementations only see one `get_container` call per package.
pub trait ContainerProvider: Send + Sync + 'static {
    /// How this provider stores the name of the packages.
    type P: Package + Send + Sync + 'static;

    /// The container type produced for each package.
    type Container: PackageContainer<P = Self::P> + 'static;

    /// Fetch the container of a package. With `skip_update`, a previously
    /// fetched local copy may be returned without consulting its origin.
    fn get_container(
        &self,
        package: &Self::P,
        skip_update: bool,
    ) -> Result<Self::Container, ProviderError>;
}

/// The fetch state of one package in the cache.
enum Fetch<C> {
    /// A fetch is running on some thread; wait on the condition variable.
    InFlight,
    Done(Arc<C>),
    Failed(ProviderError),
}

/// Container cache shared between the solver and the prefetch workers.
///
/// All access goes through one mutex; a request for a package either
/// returns the cached result, awaits the signalled completion of an
/// in-flight prefetch, or performs the fetch synchronously. Results are
/// only ever read after the lock-acquired handoff, so the observable
/// behaviour of the solver does not depend on prefetch completion order.
pub(crate) struct ContainerCache<DP: ContainerProvider> {
    provider: DP,
    containers: Mutex<Map<DP::P, Fetch<DP::Container>>>,
    fetched: Condvar,
    concurrency: usize,
}

impl<DP: ContainerProvider> ContainerCache<DP> {
    pub(crate) fn new(provider: DP, concurrency: usize) -> Self {
        Self {
            provider,
            containers: Mutex::new(Map::default()),
            fetched: Condvar::new(),
            concurrency: concurrency.max(1),
        }
    }

    pub(crate) fn set_concurrency(&mut self, concurrency: usize) {
        self.concurrency = concurrency.max(1);
    }

    /// The container of a package, fetching it synchronously if no
    /// prefetch has it already, blocking on one that does.
    pub(crate) fn get(
        &self,
        package: &DP::P,
        skip_update: bool,
    ) -> Result<Arc<DP::Container>, ProviderError> {
        let mut containers = self.containers.lock().unwrap();
        loop {
            match containers.get(package) {
                Some(Fetch::Done(container)) => return Ok(container.clone()),
                Some(Fetch::Failed(error)) => return Err(error.clone()),
                Some(Fetch::InFlight) => containers = self.fetched.wait(containers).unwrap(),
                None => break,
            }
        }
        // Claim the slot, then fetch without holding the lock.
        containers.insert(package.clone(), Fetch::InFlight);
        drop(containers);
        let result = self.provider.get_container(package, skip_update);
        self.store(package.clone(), result)
    }

    fn store(
        &self,
        package: DP::P,
        result: Result<DP::Container, ProviderError>,
    ) -> Result<Arc<DP::Container>, ProviderError> {
        let mut containers = self.containers.lock().unwrap();
        let outcome = match result {
            Ok(container) => {
                let container = Arc::new(container);
                containers.insert(package, Fetch::Done(container.clone()));
                Ok(container)
            }
            Err(error) => {
                containers.insert(package, Fetch::Failed(error.clone()));
                Err(error)
            }
        };
        drop(containers);
        self.fetched.notify_all();
        outcome
    }

    /// Start fetching the given packages in the background. Packages
    /// already cached or in flight are skipped.
    pub(crate) fn prefetch(cache: &Arc<Self>, packages: Vec<DP::P>, skip_update: bool) {
        let mut containers = cache.containers.lock().unwrap();
        let mut pending = Vec::new();
        for package in packages {
            if !containers.contains_key(&package) {
                containers.insert(package.clone(), Fetch::InFlight);
                pending.push(package);
            }
        }
        drop(containers);
        if pending.is_empty() {
            return;
        }
        let workers = cache.concurrency.min(pending.len());
        let queue = Arc::new(Mutex::new(pending));
        for worker in 0..workers {
            let cache = Arc::clone(cache);
            let queue = Arc::clone(&queue);
            thread::Builder::new()
                .name(format!("version-solver-prefetch-{}", worker))
                .spawn(move || loop {
                    let Some(package) = queue.lock().unwrap().pop() else {
                        break;
                    };
                    let result = cache.provider.get_container(&package, skip_update);
                    let _ = cache.store(package, result);
                })
                .expect("failed to spawn a prefetch thread");
        }
    }
}

/// The number of prefetch worker threads used when none is configured.
pub(crate) fn default_concurrency() -> usize {
    thread::available_parallelism().map(|p| p.get()).unwrap_or(4)
}

/// A basic implementation of [ContainerProvider] holding all dependency
/// information in memory.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(
        transparent,
        bound(serialize = "P: serde::Serialize", deserialize = "P: serde::Deserialize<'de>")
    )
)]
pub struct OfflineContainerProvider<P: Package> {
    packages: Map<P, OfflinePackage<P>>,
}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(bound(serialize = "P: serde::Serialize", deserialize = "P: serde::Deserialize<'de>"))
)]
struct OfflinePackage<P: Package> {
    versions: BTreeMap<Version, DependencyConstraints<P>>,
    unversioned_dependencies: DependencyConstraints<P>,
}

impl<P: Package> Default for OfflinePackage<P> {
    fn default() -> Self {
        Self {
            versions: BTreeMap::new(),
            unversioned_dependencies: Vec::new(),
        }
    }
}

impl<P: Package> OfflineContainerProvider<P> {
    /// Creates an empty provider with no package information.
    pub fn new() -> Self {
        Self {
            packages: Map::default(),
        }
    }

    /// Registers a version of a package and its dependencies. Subsequent
    /// calls for the same package and version replace the dependencies.
    pub fn add_dependencies<I: IntoIterator<Item = (P, Requirement)>>(
        &mut self,
        package: P,
        version: Version,
        dependencies: I,
    ) {
        *self
            .packages
            .entry(package)
            .or_default()
            .versions
            .entry(version)
            .or_default() = dependencies.into_iter().collect();
    }

    /// Registers the unversioned dependencies of a package; this is how the
    /// root package declares its direct dependencies.
    pub fn add_unversioned_dependencies<I: IntoIterator<Item = (P, Requirement)>>(
        &mut self,
        package: P,
        dependencies: I,
    ) {
        self.packages
            .entry(package)
            .or_default()
            .unversioned_dependencies = dependencies.into_iter().collect();
    }

    /// Lists the packages that have been saved.
    pub fn packages(&self) -> impl Iterator<Item = &P> {
        self.packages.keys()
    }

    /// Lists the known versions of a package, in ascending order. Returns
    /// [None] if no information is available for the package.
    pub fn versions(&self, package: &P) -> Option<impl Iterator<Item = &Version>> {
        self.packages.get(package).map(|p| p.versions.keys())
    }
}

/// An immutable snapshot of one package's dependency information.
#[derive(Debug, Clone)]
pub struct OfflineContainer<P: Package> {
    identifier: P,
    package: OfflinePackage<P>,
}

impl<P: Package + Send + Sync> PackageContainer for OfflineContainer<P> {
    type P = P;

    fn identifier(&self) -> &P {
        &self.identifier
    }

    fn versions<'a>(
        &'a self,
        filter: &'a dyn Fn(&Version) -> bool,
    ) -> Box<dyn Iterator<Item = Version> + 'a> {
        Box::new(
            self.package
                .versions
                .keys()
                .rev()
                .filter(move |v| filter(v))
                .cloned(),
        )
    }

    fn dependencies(&self, version: &Version) -> Result<DependencyConstraints<P>, ProviderError> {
        self.package.versions.get(version).cloned().ok_or_else(|| {
            ProviderError::message(format!(
                "dependencies of {} {} could not be determined",
                self.identifier, version
            ))
        })
    }

    fn unversioned_dependencies(&self) -> Result<DependencyConstraints<P>, ProviderError> {
        Ok(self.package.unversioned_dependencies.clone())
    }
}

impl<P: Package + Send + Sync + 'static> ContainerProvider for OfflineContainerProvider<P> {
    type P = P;
    type Container = OfflineContainer<P>;

    /// An unknown package yields an empty container: the solver then learns
    /// that no version is available, which is an ordinary conflict rather
    /// than a provider failure.
    fn get_container(
        &self,
        package: &P,
        _skip_update: bool,
    ) -> Result<OfflineContainer<P>, ProviderError> {
        Ok(OfflineContainer {
            identifier: package.clone(),
            package: self.packages.get(package).cloned().unwrap_or_default(),
        })
    }
}

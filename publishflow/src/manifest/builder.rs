//! Manifest construction with dependency ordering.

use super::{DataSourceType, PublisherRegistry};
use crate::context::RunContext;
use crate::core::DataSourceInstance;
use crate::errors::{CycleDetectedError, ManifestError, PublishError};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// Data source types of one run, in processing order.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    entries: Vec<DataSourceType>,
}

impl Manifest {
    /// Groups `instances` by type and orders the types by dependency.
    ///
    /// Every type name is checked against `registry` before anything else
    /// happens. Each type's `initialize` hook runs once, when the type is
    /// first seen. Types are sorted by name, then topologically: a type is
    /// never placed before a type it depends on. Dependencies on types with
    /// no configured instance do not affect the order.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::UnknownPublisher`] for an unregistered type,
    /// [`ManifestError::Cycle`] when types depend on each other, or the error
    /// returned by an `initialize` hook.
    pub async fn build(
        ctx: &RunContext,
        registry: &PublisherRegistry,
        instances: Vec<DataSourceInstance>,
    ) -> Result<Self, PublishError> {
        if let Some(instance) = instances.iter().find(|i| !registry.contains(&i.type_name)) {
            return Err(ManifestError::UnknownPublisher {
                type_name: instance.type_name.clone(),
                instance: instance.name.clone(),
            }
            .into());
        }

        let mut grouped: BTreeMap<String, DataSourceType> = BTreeMap::new();
        for instance in instances {
            if !grouped.contains_key(&instance.type_name) {
                let publisher = registry.get(&instance.type_name).ok_or_else(|| {
                    ManifestError::UnknownPublisher {
                        type_name: instance.type_name.clone(),
                        instance: instance.name.clone(),
                    }
                })?;
                debug!(type_name = %instance.type_name, "Initializing data source type");
                publisher.initialize(ctx).await?;
                grouped.insert(instance.type_name.clone(), DataSourceType::new(publisher));
            }
            if let Some(entry) = grouped.get_mut(&instance.type_name) {
                entry.push_instance(Arc::new(instance));
            }
        }

        let order = topological_order(&grouped).map_err(ManifestError::from)?;
        let entries: Vec<DataSourceType> = order
            .iter()
            .filter_map(|name| grouped.remove(name))
            .collect();
        debug!(order = ?order, "Manifest built");

        Ok(Self { entries })
    }

    /// Builds a manifest from entries that are already in processing order.
    #[must_use]
    pub fn from_entries(entries: Vec<DataSourceType>) -> Self {
        Self { entries }
    }

    /// Returns the entries in processing order.
    #[must_use]
    pub fn entries(&self) -> &[DataSourceType] {
        &self.entries
    }

    /// Returns the number of types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no type is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the processing slot of a type.
    #[must_use]
    pub fn position(&self, type_name: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.name() == type_name)
    }

    /// Returns the type names in processing order.
    #[must_use]
    pub fn type_names(&self) -> Vec<&str> {
        self.entries.iter().map(DataSourceType::name).collect()
    }
}

/// Orders type names so that dependencies come first.
///
/// `types` iterates in name order, which is the tie-break.
fn topological_order(
    types: &BTreeMap<String, DataSourceType>,
) -> Result<Vec<String>, CycleDetectedError> {
    detect_cycles(types)?;

    fn visit(
        node: &str,
        types: &BTreeMap<String, DataSourceType>,
        visited: &mut HashSet<String>,
        result: &mut Vec<String>,
    ) {
        if !visited.insert(node.to_string()) {
            return;
        }
        if let Some(entry) = types.get(node) {
            for dep in entry.dependencies() {
                if types.contains_key(dep) {
                    visit(dep, types, visited, result);
                }
            }
        }
        result.push(node.to_string());
    }

    let mut result = Vec::with_capacity(types.len());
    let mut visited = HashSet::new();
    for name in types.keys() {
        visit(name, types, &mut visited, &mut result);
    }
    Ok(result)
}

fn detect_cycles(types: &BTreeMap<String, DataSourceType>) -> Result<(), CycleDetectedError> {
    let mut visited = HashSet::new();
    let mut rec_stack = HashSet::new();
    let mut path = Vec::new();

    for name in types.keys() {
        if !visited.contains(name) {
            if let Some(cycle) = dfs_cycle(types, name, &mut visited, &mut rec_stack, &mut path) {
                return Err(CycleDetectedError::new(cycle));
            }
        }
    }
    Ok(())
}

fn dfs_cycle(
    types: &BTreeMap<String, DataSourceType>,
    node: &str,
    visited: &mut HashSet<String>,
    rec_stack: &mut HashSet<String>,
    path: &mut Vec<String>,
) -> Option<Vec<String>> {
    visited.insert(node.to_string());
    rec_stack.insert(node.to_string());
    path.push(node.to_string());

    if let Some(entry) = types.get(node) {
        for dep in entry.dependencies().iter().filter(|d| types.contains_key(*d)) {
            if !visited.contains(dep) {
                if let Some(cycle) = dfs_cycle(types, dep, visited, rec_stack, path) {
                    return Some(cycle);
                }
            } else if rec_stack.contains(dep) {
                let start = path.iter().position(|n| n == dep).unwrap_or(0);
                let mut cycle: Vec<String> = path[start..].to_vec();
                cycle.push(dep.clone());
                return Some(cycle);
            }
        }
    }

    path.pop();
    rec_stack.remove(node);
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PublishConfig;
    use crate::testing::{InMemoryRemoteSystem, InMemoryRowStore, RecordingPublisher};
    use pretty_assertions::assert_eq;

    fn context() -> RunContext {
        RunContext::new(
            PublishConfig::default(),
            Arc::new(InMemoryRowStore::new()),
            Arc::new(InMemoryRemoteSystem::new("1.0")),
        )
    }

    fn instance(name: &str, type_name: &str) -> DataSourceInstance {
        DataSourceInstance::new(name, type_name)
    }

    #[tokio::test]
    async fn test_groups_instances_by_type_in_name_order() {
        let registry = PublisherRegistry::new()
            .with_publisher(Arc::new(RecordingPublisher::new("Zeta")))
            .with_publisher(Arc::new(RecordingPublisher::new("Alpha")));

        let manifest = Manifest::build(
            &context(),
            &registry,
            vec![instance("z1", "Zeta"), instance("a1", "Alpha"), instance("z2", "Zeta")],
        )
        .await
        .unwrap();

        assert_eq!(manifest.type_names(), vec!["Alpha", "Zeta"]);
        assert_eq!(manifest.entries()[1].instances().len(), 2);
    }

    #[tokio::test]
    async fn test_dependencies_come_first() {
        let registry = PublisherRegistry::new()
            .with_publisher(Arc::new(RecordingPublisher::new("Attendance").with_dependency("Event").with_dependency("Party")))
            .with_publisher(Arc::new(RecordingPublisher::new("Event").with_dependency("Venue")))
            .with_publisher(Arc::new(RecordingPublisher::new("Membership").with_dependency("Party")))
            .with_publisher(Arc::new(RecordingPublisher::new("Party")))
            .with_publisher(Arc::new(RecordingPublisher::new("Venue")));

        let manifest = Manifest::build(
            &context(),
            &registry,
            vec![
                instance("a", "Attendance"),
                instance("m", "Membership"),
                instance("e", "Event"),
                instance("v", "Venue"),
                instance("p", "Party"),
            ],
        )
        .await
        .unwrap();

        for entry in manifest.entries() {
            let own = manifest.position(entry.name()).unwrap();
            for dep in entry.dependencies() {
                assert!(manifest.position(dep).unwrap() < own, "{dep} must precede {}", entry.name());
            }
        }
        assert_eq!(
            manifest.type_names(),
            vec!["Venue", "Event", "Party", "Attendance", "Membership"]
        );
    }

    #[tokio::test]
    async fn test_missing_dependency_type_is_ignored() {
        let registry = PublisherRegistry::new()
            .with_publisher(Arc::new(RecordingPublisher::new("Membership").with_dependency("Party")));

        let manifest = Manifest::build(&context(), &registry, vec![instance("m", "Membership")])
            .await
            .unwrap();
        assert_eq!(manifest.type_names(), vec!["Membership"]);
    }

    #[tokio::test]
    async fn test_unknown_type_fails_before_initialization() {
        let known = Arc::new(RecordingPublisher::new("Party"));
        let registry = PublisherRegistry::new().with_publisher(known.clone());

        let err = Manifest::build(
            &context(),
            &registry,
            vec![instance("p", "Party"), instance("x", "Mystery")],
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            PublishError::Manifest(ManifestError::UnknownPublisher { ref type_name, .. }) if type_name == "Mystery"
        ));
        assert_eq!(known.init_calls(), 0);
    }

    #[tokio::test]
    async fn test_initialize_runs_once_per_type() {
        let party = Arc::new(RecordingPublisher::new("Party"));
        let registry = PublisherRegistry::new().with_publisher(party.clone());

        Manifest::build(
            &context(),
            &registry,
            vec![instance("p1", "Party"), instance("p2", "Party"), instance("p3", "Party")],
        )
        .await
        .unwrap();

        assert_eq!(party.init_calls(), 1);
    }

    #[tokio::test]
    async fn test_type_cycle_fails_fast() {
        let registry = PublisherRegistry::new()
            .with_publisher(Arc::new(RecordingPublisher::new("A").with_dependency("B")))
            .with_publisher(Arc::new(RecordingPublisher::new("B").with_dependency("C")))
            .with_publisher(Arc::new(RecordingPublisher::new("C").with_dependency("A")));

        let err = Manifest::build(
            &context(),
            &registry,
            vec![instance("a", "A"), instance("b", "B"), instance("c", "C")],
        )
        .await
        .unwrap_err();

        match err {
            PublishError::Manifest(ManifestError::Cycle(cycle)) => {
                assert_eq!(cycle.cycle_path, vec!["A", "B", "C", "A"]);
            }
            other => panic!("expected cycle error, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_self_dependency_is_a_cycle() {
        let registry = PublisherRegistry::new()
            .with_publisher(Arc::new(RecordingPublisher::new("Party").with_dependency("Party")));

        let err = Manifest::build(&context(), &registry, vec![instance("p", "Party")])
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::Manifest(ManifestError::Cycle(_))));
    }
}

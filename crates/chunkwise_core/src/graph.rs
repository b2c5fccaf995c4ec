use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use dashmap::DashSet;
use hashbrown::HashMap;
use petgraph::{algo::tarjan_scc, graphmap::DiGraphMap};
use tokio::sync::Semaphore;
use tracing::instrument;

use crate::{
    BuildError, BuildResult, Cache, Dependency, JobContext, Module, ModuleById, ModuleId,
    ModuleStatus, NormalizedInputOptions, PluginDriver, ResolvedDependency, Resolver,
    ResolvingModuleJob, TransformPipeline,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPoint {
    pub name: String,
    pub id: ModuleId,
}

/// The module graph plus what is needed to (re)build it.
///
/// Modules live in a table keyed by id and refer to each other only by id, so
/// cycles are ordinary edges.
#[derive(Debug)]
pub struct Graph {
    pub options: Arc<NormalizedInputOptions>,
    pub module_by_id: ModuleById,
    /// In input order.
    pub entries: Vec<EntryPoint>,
    plugin_driver: Arc<PluginDriver>,
    pipeline: Arc<TransformPipeline>,
    cache: Arc<dyn Cache>,
}

type ResolvedIds = HashMap<Option<ModuleId>, HashMap<String, ModuleId>>;

impl Graph {
    pub fn new(
        options: Arc<NormalizedInputOptions>,
        plugin_driver: Arc<PluginDriver>,
        pipeline: Arc<TransformPipeline>,
        cache: Arc<dyn Cache>,
    ) -> Self {
        Self {
            options,
            module_by_id: Default::default(),
            entries: Default::default(),
            plugin_driver,
            pipeline,
            cache,
        }
    }

    pub fn add_module(&mut self, module: Module) {
        self.module_by_id.insert(module.id.clone(), module);
    }

    pub fn add_entry(&mut self, name: impl Into<String>, id: ModuleId) {
        if let Some(module) = self.module_by_id.get_mut(&id) {
            module.is_entry = true;
        }
        self.entries.push(EntryPoint {
            name: name.into(),
            id,
        });
    }

    pub fn module(&self, id: &ModuleId) -> Option<&Module> {
        self.module_by_id.get(id)
    }

    /// Module ids in ascending order.
    pub fn sorted_module_ids(&self) -> Vec<&ModuleId> {
        let mut ids = self.module_by_id.keys().collect::<Vec<_>>();
        ids.sort();
        ids
    }

    /// Strongly connected components over static edges that form a cycle,
    /// members and components sorted.
    pub fn cycles(&self) -> Vec<Vec<ModuleId>> {
        let mut graph = DiGraphMap::<&ModuleId, ()>::new();
        for id in self.sorted_module_ids() {
            graph.add_node(id);
        }
        for id in self.sorted_module_ids() {
            for dep in self.module_by_id[id].static_dependency_ids() {
                if self.module_by_id.contains_key(dep) {
                    graph.add_edge(id, dep, ());
                }
            }
        }

        let mut cycles = tarjan_scc(&graph)
            .into_iter()
            .filter(|component| {
                component.len() > 1 || graph.contains_edge(component[0], component[0])
            })
            .map(|component| {
                let mut members = component.into_iter().cloned().collect::<Vec<_>>();
                members.sort();
                members
            })
            .collect::<Vec<_>>();
        cycles.sort();
        cycles
    }

    #[instrument(skip_all)]
    pub async fn build(&mut self) -> BuildResult<()> {
        self.module_by_id.clear();
        self.entries.clear();
        self.validate_input()?;

        let mut resolved_ids_for_all_module = self.build_graph().await?;
        self.resolve_entries(
            resolved_ids_for_all_module
                .remove(&None)
                .unwrap_or_default(),
        )?;
        self.link(resolved_ids_for_all_module);
        self.check_cycles()?;

        tracing::debug!(
            "built graph with {} modules from {} entries",
            self.module_by_id.len(),
            self.entries.len()
        );
        Ok(())
    }

    fn validate_input(&self) -> BuildResult<()> {
        if self.options.input.is_empty() {
            return Err(BuildError::InvalidOptions("no entry points".to_string()));
        }
        let mut names = hashbrown::HashSet::new();
        for item in &self.options.input {
            if !names.insert(item.name.as_str()) {
                return Err(BuildError::InvalidOptions(format!(
                    "duplicate entry name {:?}",
                    item.name
                )));
            }
        }
        Ok(())
    }

    async fn build_graph(&mut self) -> BuildResult<ResolvedIds> {
        let active_task_count: Arc<AtomicUsize> = Arc::new(AtomicUsize::new(0));

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<Msg>();
        let semaphore = Arc::new(Semaphore::new(self.options.max_concurrency.max(1)));

        let context = JobContext {
            options: self.options.clone(),
            resolver: Arc::new(Resolver::new(
                self.options.root.clone(),
                self.options.resolve.clone(),
            )),
            plugin_driver: self.plugin_driver.clone(),
            pipeline: self.pipeline.clone(),
            cache: self.cache.clone(),
            active_task_count: active_task_count.clone(),
            visited_module_ids: Arc::new(DashSet::new()),
            semaphore: semaphore.clone(),
        };

        let mut resolved_ids_for_all_module: ResolvedIds = HashMap::new();
        let mut errors = vec![];

        self.options.input.iter().for_each(|item| {
            let task = ResolvingModuleJob::new(
                context.clone(),
                Dependency {
                    importer: None,
                    specifier: item.import.clone(),
                },
                tx.clone(),
            );

            tokio::task::spawn(async move { task.run().await });
        });

        while active_task_count.load(Ordering::SeqCst) != 0 {
            match rx.recv().await {
                Some(job) => match job {
                    Msg::TaskFinished(module) => {
                        active_task_count.fetch_sub(1, Ordering::SeqCst);
                        self.add_module(*module);
                    }
                    Msg::TaskCanceled => {
                        active_task_count.fetch_sub(1, Ordering::SeqCst);
                    }
                    Msg::DependencyReference(importer, specifier, resolved_id) => {
                        resolved_ids_for_all_module
                            .entry(importer)
                            .or_default()
                            .insert(specifier, resolved_id);
                    }
                    Msg::TaskErrorEncountered(err) => {
                        active_task_count.fetch_sub(1, Ordering::SeqCst);
                        if self.options.fail_fast {
                            // Jobs waiting for a permit, and every job forked
                            // from here on, give up.
                            semaphore.close();
                            return Err(err);
                        }
                        tracing::trace!("collected error {}", err);
                        errors.push(err);
                    }
                },
                None => {
                    tracing::trace!("All sender is dropped");
                    break;
                }
            }
        }

        if !errors.is_empty() {
            return Err(BuildError::from_errors(errors));
        }
        Ok(resolved_ids_for_all_module)
    }

    fn resolve_entries(&mut self, resolved_entries: HashMap<String, ModuleId>) -> BuildResult<()> {
        let mut name_by_id: HashMap<ModuleId, String> = HashMap::new();
        let options = self.options.clone();
        for item in &options.input {
            let Some(id) = resolved_entries.get(&item.import) else {
                continue;
            };
            if let Some(previous) = name_by_id.insert(id.clone(), item.name.clone()) {
                return Err(BuildError::InvalidOptions(format!(
                    "entries {:?} and {:?} both resolve to {}",
                    previous, item.name, id
                )));
            }
            self.add_entry(item.name.clone(), id.clone());
        }
        Ok(())
    }

    fn link(&mut self, mut resolved_ids_for_all_module: ResolvedIds) {
        let entry_ids = self
            .entries
            .iter()
            .map(|entry| entry.id.clone())
            .collect::<hashbrown::HashSet<_>>();

        self.module_by_id.values_mut().for_each(|module| {
            let resolved_ids = resolved_ids_for_all_module
                .remove(&Some(module.id.clone()))
                .unwrap_or_default();
            module.dependencies = module
                .declared_dependencies
                .iter()
                .filter_map(|dep| {
                    resolved_ids
                        .get(&dep.specifier)
                        .map(|id| ResolvedDependency {
                            specifier: dep.specifier.clone(),
                            id: id.clone(),
                            kind: dep.kind,
                            imported: dep.imported.clone(),
                        })
                })
                .collect();
            module.is_entry = entry_ids.contains(&module.id);
            module.status = ModuleStatus::Linked;
            tracing::trace!("{} {:?}", module.id, module.status);
        });
    }

    fn check_cycles(&self) -> BuildResult<()> {
        let cycles = self.cycles();
        if self.options.strict_cycles && !cycles.is_empty() {
            return Err(BuildError::from_errors(
                cycles
                    .into_iter()
                    .map(|cycle| BuildError::CycleViolation { cycle })
                    .collect(),
            ));
        }
        for cycle in cycles {
            tracing::warn!("{}", BuildError::CycleViolation { cycle });
        }
        Ok(())
    }
}

#[derive(Debug)]
pub enum Msg {
    DependencyReference(Option<ModuleId>, String, ModuleId),
    TaskFinished(Box<Module>),
    TaskCanceled,
    TaskErrorEncountered(BuildError),
}

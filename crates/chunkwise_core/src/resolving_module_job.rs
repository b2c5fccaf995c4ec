use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use dashmap::DashSet;
use tokio::sync::{mpsc::UnboundedSender, Semaphore};

use crate::{
    load, resolve, BuildError, BuildResult, Cache, ContentHash, LoadArgs, Module, ModuleId,
    ModuleStatus, Msg, NormalizedInputOptions, PluginDriver, ResolveArgs, Resolver,
    TransformError, TransformOutput, TransformPipeline,
};

#[derive(Debug, Hash, PartialEq, Eq, Clone)]
pub struct Dependency {
    /// Id of the importer module, `None` for entries.
    pub importer: Option<ModuleId>,
    pub specifier: String,
}

/// Everything a job shares with its siblings.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub options: Arc<NormalizedInputOptions>,
    pub resolver: Arc<Resolver>,
    pub plugin_driver: Arc<PluginDriver>,
    pub pipeline: Arc<TransformPipeline>,
    pub cache: Arc<dyn Cache>,
    pub(crate) active_task_count: Arc<AtomicUsize>,
    pub(crate) visited_module_ids: Arc<DashSet<ModuleId>>,
    pub(crate) semaphore: Arc<Semaphore>,
}

pub struct ResolvingModuleJob {
    context: JobContext,
    dependency: Dependency,
    tx: UnboundedSender<Msg>,
}

impl ResolvingModuleJob {
    pub fn new(context: JobContext, dependency: Dependency, tx: UnboundedSender<Msg>) -> Self {
        context.active_task_count.fetch_add(1, Ordering::SeqCst);

        Self {
            context,
            dependency,
            tx,
        }
    }

    pub async fn run(self) {
        match self.resolve_module().await {
            Ok(Some(module)) => self.send(Msg::TaskFinished(Box::new(module))),
            Ok(None) => self.send(Msg::TaskCanceled),
            Err(err) => self.send(Msg::TaskErrorEncountered(err)),
        }
    }

    pub fn send(&self, msg: Msg) {
        if let Err(err) = self.tx.send(msg) {
            tracing::trace!("fail to send msg {:?}", err)
        }
    }

    async fn resolve_module(&self) -> BuildResult<Option<Module>> {
        let Ok(_permit) = self.context.semaphore.acquire().await else {
            return Ok(None);
        };

        let id = resolve(
            ResolveArgs {
                importer: self.dependency.importer.as_ref(),
                specifier: &self.dependency.specifier,
            },
            &self.context.plugin_driver,
            &self.context.resolver,
        )
        .await?;

        tracing::trace!("resolved id {:?}", id);

        self.send(Msg::DependencyReference(
            self.dependency.importer.clone(),
            self.dependency.specifier.clone(),
            id.clone(),
        ));

        if !self.context.visited_module_ids.insert(id.clone()) {
            return Ok(None);
        }
        tracing::trace!("{} {:?}", id, ModuleStatus::Discovered);

        let raw_source = self.load_source(&id).await?;

        let chain = self.context.pipeline.applicable(&id, &raw_source);
        let identities = chain
            .iter()
            .map(|transform| transform.identity())
            .collect::<Vec<_>>();
        let content_hash =
            ContentHash::of_module(&raw_source, identities.iter().map(String::as_str));

        let cache = self.context.cache.clone();
        let key = content_hash.clone();
        let cached = match tokio::task::spawn_blocking(move || cache.get(&key))
            .await
            .map_err(anyhow::Error::from)
            .and_then(|cached| cached)
        {
            Ok(cached) => cached,
            Err(err) => {
                tracing::warn!("cache read failed for {}, recomputing: {:#}", id, err);
                None
            }
        };
        let output = match cached {
            Some(output) => {
                tracing::trace!("cache hit {} {:?}", id, content_hash);
                output
            }
            None => {
                let output = self.context.pipeline.run(&id, &raw_source, &chain)?;
                self.store(&content_hash, &output).await?;
                output
            }
        };
        tracing::trace!("{} {:?}", id, ModuleStatus::Transformed);

        tracing::trace!("{} {:?}", id, ModuleStatus::ResolvingDependencies);
        output.dependencies.iter().for_each(|dep| {
            self.fork(Dependency {
                importer: Some(id.clone()),
                specifier: dep.specifier.clone(),
            });
        });

        let module = Module {
            id,
            is_entry: self.dependency.importer.is_none(),
            status: ModuleStatus::Transformed,
            raw_source: raw_source.into(),
            code: output.code.into(),
            declared_dependencies: output.dependencies,
            dependencies: vec![],
            exports: output.exports,
            content_hash,
        };

        tracing::trace!("transformed module {:?}", module);

        Ok(Some(module))
    }

    async fn load_source(&self, id: &ModuleId) -> BuildResult<String> {
        let loading = load(LoadArgs { id }, &self.context.plugin_driver);
        match self.context.options.load_timeout {
            Some(limit) => tokio::time::timeout(limit, loading).await.map_err(|_| {
                TransformError {
                    module_id: id.clone(),
                    transform_name: "load".to_string(),
                    message: format!("timed out after {:?}", limit),
                }
            })?,
            None => loading.await,
        }
    }

    async fn store(&self, hash: &ContentHash, output: &TransformOutput) -> BuildResult<()> {
        let cache = self.context.cache.clone();
        let key = hash.clone();
        let entry = output.clone();
        let stored = tokio::task::spawn_blocking(move || cache.put(&key, &entry))
            .await
            .map_err(anyhow::Error::from)
            .and_then(|stored| stored);
        if let Err(err) = stored {
            if self.context.options.require_cache_writes {
                return Err(BuildError::CacheWrite {
                    hash: hash.clone(),
                    message: format!("{:#}", err),
                });
            }
            tracing::warn!("cache write failed for {:?}: {:#}", hash, err);
        }
        Ok(())
    }

    fn fork(&self, dep: Dependency) {
        let task = ResolvingModuleJob::new(self.context.clone(), dep, self.tx.clone());

        tokio::task::spawn(async move {
            task.run().await;
        });
    }
}

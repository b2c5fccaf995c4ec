use std::sync::Arc;

pub use chunkwise_core::{
    log, Asset, BuildError, BuildResult, BundleOutput, Cache, DiskCache, FnTransform, Graph,
    InputItem, LoadArgs, Manifest, ManifestChunk, MemoryCache, ModuleId, NormalizedInputOptions,
    NormalizedOutputOptions, Plugin, PluginLoadHookOutput, PluginResolveHookOutput, ResolveArgs,
    ResolveOptions, ScanTransform, Transform, TransformArgs, TransformOutput,
};
use chunkwise_core::{Bundle, PluginDriver, TransformPipeline};

pub struct Chunkwise {
    options: Arc<NormalizedInputOptions>,
    plugins: Vec<Arc<dyn Plugin>>,
    pipeline: TransformPipeline,
    cache: Arc<dyn Cache>,
    graph: Option<Graph>,
}

impl Chunkwise {
    /// Registers a plugin. The next build starts from a fresh graph.
    pub fn with_plugin(mut self, plugin: impl Plugin + 'static) -> Self {
        self.plugins.push(Arc::new(plugin));
        self.graph = None;
        self
    }

    /// Appends a transform; transforms run in registration order.
    pub fn with_transform(mut self, transform: impl Transform + 'static) -> Self {
        self.pipeline.push(Arc::new(transform));
        self.graph = None;
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = cache;
        self.graph = None;
        self
    }

    /// (Re)builds the module graph. Unchanged modules are served from the cache.
    pub async fn build(&mut self) -> BuildResult<&Graph> {
        let graph = self.graph.get_or_insert_with(|| {
            Graph::new(
                self.options.clone(),
                Arc::new(PluginDriver::new(self.plugins.clone())),
                Arc::new(self.pipeline.clone()),
                self.cache.clone(),
            )
        });
        graph.build().await?;

        tracing::trace!("graph {:#?}", graph);
        Ok(graph)
    }

    pub async fn generate(
        &mut self,
        output_options: &NormalizedOutputOptions,
    ) -> BuildResult<BundleOutput> {
        let graph = self.build().await?;
        Bundle::new(output_options, graph).generate()
    }

    pub async fn write(
        &mut self,
        output_options: &NormalizedOutputOptions,
    ) -> BuildResult<BundleOutput> {
        let graph = self.build().await?;
        Bundle::new(output_options, graph).write()
    }

    /// The graph of the last build, if any.
    pub fn graph(&self) -> Option<&Graph> {
        self.graph.as_ref()
    }
}

pub fn chunkwise(options: NormalizedInputOptions) -> Chunkwise {
    Chunkwise {
        options: Arc::new(options),
        plugins: vec![],
        pipeline: Default::default(),
        cache: Arc::new(MemoryCache::new()),
        graph: None,
    }
}

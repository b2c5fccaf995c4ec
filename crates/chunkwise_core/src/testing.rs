use std::{path::Path, sync::Arc};

use sugar_path::SugarPath;
use tempfile::TempDir;

use crate::{
    ContentHash, Graph, MemoryCache, Module, ModuleId, ModuleStatus, NormalizedInputOptions,
    ResolvedDependency, ScanTransform, TransformPipeline,
};

pub(crate) const ROOT: &str = "/project";

pub(crate) fn write_files(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for (path, content) in files {
        let path = dir.path().join(path);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }
    dir
}

/// `/project/<path>`
pub(crate) fn id(path: &str) -> ModuleId {
    ModuleId::new(format!("{}/{}", ROOT, path))
}

/// Builds an in-memory graph from scanned sources, without touching disk.
pub(crate) struct TestGraph {
    graph: Graph,
}

impl TestGraph {
    pub(crate) fn new() -> Self {
        Self::with_options(NormalizedInputOptions::default())
    }

    pub(crate) fn with_options(options: NormalizedInputOptions) -> Self {
        Self {
            graph: Graph::new(
                Arc::new(NormalizedInputOptions {
                    root: ROOT.into(),
                    ..options
                }),
                Default::default(),
                Default::default(),
                Arc::new(MemoryCache::new()),
            ),
        }
    }

    pub(crate) fn module(mut self, path: &str, code: &str) -> Self {
        let module_id = id(path);
        let pipeline = TransformPipeline::new(vec![Arc::new(ScanTransform)]);
        let chain = pipeline.applicable(&module_id, code);
        let output = pipeline.run(&module_id, code, &chain).unwrap();
        let base = Path::new(module_id.as_str()).parent().unwrap().to_path_buf();
        let dependencies = output
            .dependencies
            .iter()
            .map(|dep| ResolvedDependency {
                specifier: dep.specifier.clone(),
                id: ModuleId::new(base.join(&dep.specifier).resolve().to_string_lossy().as_ref()),
                kind: dep.kind,
                imported: dep.imported.clone(),
            })
            .collect();
        self.graph.add_module(Module {
            id: module_id,
            is_entry: false,
            status: ModuleStatus::Linked,
            raw_source: code.into(),
            code: output.code.into(),
            declared_dependencies: output.dependencies,
            dependencies,
            exports: output.exports,
            content_hash: ContentHash::of_bytes(code.as_bytes()),
        });
        self
    }

    pub(crate) fn entry(mut self, name: &str, path: &str) -> Self {
        self.graph.add_entry(name, id(path));
        self
    }

    pub(crate) fn build(self) -> Graph {
        self.graph
    }
}

use tracing::instrument;

use crate::{shake_module, Graph, Module, ModuleId, UsageAnalysis};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChunkKind {
    Entry,
    /// Rooted at the target of a dynamic import.
    Async,
    /// Modules reachable from two or more roots.
    Shared,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Position in the chunk graph's output order.
    pub id: usize,
    pub name: String,
    pub kind: ChunkKind,
    /// Dependencies before dependents.
    pub module_ids: Vec<ModuleId>,
    /// Names of chunks that must be loaded before this one.
    pub imports: Vec<String>,
    /// Names of chunks this one loads on demand.
    pub dynamic_imports: Vec<String>,
}

impl Chunk {
    pub fn new(id: usize, name: impl Into<String>, kind: ChunkKind) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            module_ids: Default::default(),
            imports: Default::default(),
            dynamic_imports: Default::default(),
        }
    }

    pub fn is_entry(&self) -> bool {
        matches!(self.kind, ChunkKind::Entry)
    }

    pub fn is_async(&self) -> bool {
        matches!(self.kind, ChunkKind::Async)
    }

    pub fn ordered_modules<'a>(&self, graph: &'a Graph) -> Vec<&'a Module> {
        self.module_ids
            .iter()
            .filter_map(|id| graph.module(id))
            .collect()
    }

    /// Each module's (tree-shaken) code, newline terminated, in chunk order.
    #[instrument(skip_all, fields(chunk = %self.name))]
    pub fn render(&self, graph: &Graph, analysis: &UsageAnalysis) -> String {
        let mut code = String::new();
        for module in self.ordered_modules(graph) {
            let shaken = shake_module(module, analysis);
            code.push_str(&shaken);
            if !shaken.is_empty() && !shaken.ends_with('\n') {
                code.push('\n');
            }
        }
        code
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analyze_usage,
        testing::{id, TestGraph},
    };

    #[test]
    fn renders_modules_in_order_with_newlines() {
        let graph = TestGraph::new()
            .module("main.js", "import { a } from \"./a.js\";\nconsole.log(a)")
            .module("a.js", "export const a = 1;\nexport const b = 2;\n")
            .entry("main", "main.js")
            .build();
        let mut chunk = Chunk::new(0, "main", ChunkKind::Entry);
        chunk.module_ids = vec![id("a.js"), id("main.js")];

        let analysis = analyze_usage(&graph);
        assert_eq!(
            chunk.render(&graph, &analysis),
            "export const a = 1;\nimport { a } from \"./a.js\";\nconsole.log(a)\n"
        );
        assert_eq!(
            chunk.render(&graph, &UsageAnalysis::keep_everything(&graph)),
            "export const a = 1;\nexport const b = 2;\nimport { a } from \"./a.js\";\nconsole.log(a)\n"
        );
    }
}

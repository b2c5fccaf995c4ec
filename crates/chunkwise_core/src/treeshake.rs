use std::{
    borrow::Cow,
    collections::{BTreeSet, VecDeque},
    ops::Range,
};

use hashbrown::{HashMap, HashSet};
use tracing::instrument;

use crate::{DependencyKind, Exports, Graph, ImportedNames, Module, ModuleId, ReExportNames};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Request {
    All,
    Name(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Demand {
    All,
    Names(BTreeSet<String>),
}

/// Exported bindings reachable from the entries.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UsageAnalysis {
    live_exports: HashMap<ModuleId, BTreeSet<String>>,
    /// Modules whose whole export surface is live, including the dynamic ones.
    fully_live: HashSet<ModuleId>,
}

impl UsageAnalysis {
    pub fn live_exports(&self, id: &ModuleId) -> Option<&BTreeSet<String>> {
        self.live_exports.get(id)
    }

    pub fn is_fully_live(&self, id: &ModuleId) -> bool {
        self.fully_live.contains(id)
    }

    pub fn is_live(&self, id: &ModuleId, name: &str) -> bool {
        self.is_fully_live(id)
            || self
                .live_exports
                .get(id)
                .map_or(false, |names| names.contains(name))
    }

    /// Treats every export of every module as live.
    pub fn keep_everything(graph: &Graph) -> Self {
        Self {
            live_exports: Default::default(),
            fully_live: graph.module_by_id.keys().cloned().collect(),
        }
    }
}

/// Mark phase. Entries are consumed by the outside world, so their whole
/// export surface seeds the propagation.
#[instrument(skip_all)]
pub fn analyze_usage(graph: &Graph) -> UsageAnalysis {
    let mut queue: VecDeque<(ModuleId, Request)> = VecDeque::new();

    for entry in &graph.entries {
        queue.push_back((entry.id.clone(), Request::All));
    }
    for id in graph.sorted_module_ids() {
        let module = &graph.module_by_id[id];
        if let Some(export_set) = module.exports.as_static() {
            queue.extend(
                export_set
                    .used_locally
                    .iter()
                    .map(|name| (id.clone(), Request::Name(name.clone()))),
            );
        }
        for dep in &module.dependencies {
            if module.exports.is_dynamic() || dep.kind == DependencyKind::Dynamic {
                queue.push_back((dep.id.clone(), Request::All));
                continue;
            }
            match &dep.imported {
                ImportedNames::Named(names) => queue.extend(
                    names
                        .iter()
                        .map(|name| (dep.id.clone(), Request::Name(name.clone()))),
                ),
                ImportedNames::Namespace => queue.push_back((dep.id.clone(), Request::All)),
                ImportedNames::SideEffect => {}
            }
        }
    }

    let mut demand_by_id: HashMap<ModuleId, Demand> = HashMap::new();
    while let Some((id, request)) = queue.pop_front() {
        let Some(module) = graph.module(&id) else {
            continue;
        };
        let demand = demand_by_id
            .entry(id.clone())
            .or_insert_with(|| Demand::Names(Default::default()));

        let export_set = match &module.exports {
            Exports::Dynamic => {
                *demand = Demand::All;
                continue;
            }
            Exports::Static(set) => set,
        };

        match (&mut *demand, request) {
            (Demand::All, _) => {}
            (demand, Request::All) => {
                *demand = Demand::All;
                for re_export in &export_set.re_exports {
                    let Some(target) = module.dependency_by_specifier(&re_export.specifier) else {
                        continue;
                    };
                    match &re_export.names {
                        ReExportNames::All => queue.push_back((target.id.clone(), Request::All)),
                        ReExportNames::Named(pairs) => queue.extend(
                            pairs
                                .iter()
                                .map(|(imported, _)| (target.id.clone(), request_for(imported))),
                        ),
                    }
                }
            }
            (Demand::Names(names), Request::Name(name)) => {
                if !names.insert(name.clone()) {
                    continue;
                }
                if let Some(binding) = export_set.local(&name) {
                    queue.extend(
                        binding
                            .references
                            .iter()
                            .map(|referenced| (id.clone(), Request::Name(referenced.clone()))),
                    );
                    continue;
                }
                let named = export_set.re_exports.iter().find_map(|re_export| {
                    let ReExportNames::Named(pairs) = &re_export.names else {
                        return None;
                    };
                    pairs
                        .iter()
                        .find(|(_, exported)| *exported == name)
                        .map(|(imported, _)| (&re_export.specifier, imported))
                });
                match named {
                    Some((specifier, imported)) => {
                        if let Some(target) = module.dependency_by_specifier(specifier) {
                            queue.push_back((target.id.clone(), request_for(imported)));
                        }
                    }
                    // `export *` never forwards the default export.
                    None if name != "default" => {
                        for re_export in &export_set.re_exports {
                            if re_export.names != ReExportNames::All {
                                continue;
                            }
                            if let Some(target) = module.dependency_by_specifier(&re_export.specifier)
                            {
                                queue.push_back((target.id.clone(), Request::Name(name.clone())));
                            }
                        }
                    }
                    None => {}
                }
            }
        }
    }

    let mut analysis = UsageAnalysis::default();
    for (id, module) in &graph.module_by_id {
        let Some(export_names) = module.export_names() else {
            analysis.fully_live.insert(id.clone());
            continue;
        };
        let live = match demand_by_id.remove(id) {
            Some(Demand::All) => {
                analysis.fully_live.insert(id.clone());
                export_names.into_iter().collect()
            }
            Some(Demand::Names(names)) => names
                .into_iter()
                .filter(|name| export_names.contains(name))
                .collect(),
            None => BTreeSet::new(),
        };
        analysis.live_exports.insert(id.clone(), live);
    }
    tracing::debug!("{} modules fully live", analysis.fully_live.len());
    analysis
}

fn request_for(imported: &str) -> Request {
    if imported == "*" {
        Request::All
    } else {
        Request::Name(imported.to_string())
    }
}

/// Sweep phase: the module's code without the definitions of dead exports.
pub fn shake_module<'a>(module: &'a Module, analysis: &UsageAnalysis) -> Cow<'a, str> {
    if analysis.is_fully_live(&module.id) {
        return Cow::Borrowed(&module.code);
    }
    let Some(export_set) = module.exports.as_static() else {
        return Cow::Borrowed(&module.code);
    };

    let mut dead = export_set
        .bindings
        .iter()
        .filter(|binding| !analysis.is_live(&module.id, &binding.name))
        .filter_map(|binding| binding.span.clone())
        .collect::<Vec<Range<usize>>>();
    if dead.is_empty() {
        return Cow::Borrowed(&module.code);
    }
    dead.sort_by_key(|span| span.start);
    tracing::trace!("drop {} bindings from {}", dead.len(), module.id);

    let code: &str = &module.code;
    let mut shaken = String::with_capacity(code.len());
    let mut cursor = 0;
    for span in dead {
        if span.start > cursor {
            shaken.push_str(&code[cursor..span.start]);
        }
        cursor = cursor.max(span.end);
    }
    shaken.push_str(&code[cursor..]);
    Cow::Owned(shaken)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{id, TestGraph};

    fn live(analysis: &UsageAnalysis, path: &str) -> Vec<String> {
        analysis
            .live_exports(&id(path))
            .map(|names| names.iter().cloned().collect())
            .unwrap_or_default()
    }

    #[test]
    fn unused_exports_are_dropped() {
        let graph = TestGraph::new()
            .module("main.js", "import { a } from \"./x.js\";\nconsole.log(a);\n")
            .module(
                "x.js",
                "export const a = 1;\nexport function b() {\n  return 2;\n}\n",
            )
            .entry("main", "main.js")
            .build();

        let analysis = analyze_usage(&graph);
        assert_eq!(live(&analysis, "x.js"), vec!["a"]);
        assert!(analysis.is_fully_live(&id("main.js")));

        let x = graph.module(&id("x.js")).unwrap();
        assert_eq!(shake_module(x, &analysis), "export const a = 1;\n");
    }

    #[test]
    fn entry_exports_are_all_live() {
        let graph = TestGraph::new()
            .module("lib.js", "export const a = 1;\nexport const b = 2;\n")
            .entry("lib", "lib.js")
            .build();

        let analysis = analyze_usage(&graph);
        assert_eq!(live(&analysis, "lib.js"), vec!["a", "b"]);
        let lib = graph.module(&id("lib.js")).unwrap();
        assert!(matches!(shake_module(lib, &analysis), Cow::Borrowed(_)));
    }

    #[test]
    fn dynamic_export_importers_keep_everything() {
        let graph = TestGraph::new()
            .module("main.js", "import \"./legacy.js\";\n")
            .module(
                "legacy.js",
                "import { a } from \"./x.js\";\nmodule.exports = { a };\n",
            )
            .module("x.js", "export const a = 1;\nexport const b = 2;\n")
            .entry("main", "main.js")
            .build();

        let analysis = analyze_usage(&graph);
        assert!(analysis.is_fully_live(&id("legacy.js")));
        assert!(analysis.is_live(&id("x.js"), "a"));
        assert!(analysis.is_live(&id("x.js"), "b"));
        let x = graph.module(&id("x.js")).unwrap();
        assert_eq!(shake_module(x, &analysis), &*x.code);
    }

    #[test]
    fn named_re_exports_follow_the_imported_name() {
        let graph = TestGraph::new()
            .module("main.js", "import { shown } from \"./barrel.js\";\n")
            .module("barrel.js", "export { inner as shown } from \"./inner.js\";\n")
            .module("inner.js", "export const inner = 1;\nexport const other = 2;\n")
            .entry("main", "main.js")
            .build();

        let analysis = analyze_usage(&graph);
        assert_eq!(live(&analysis, "barrel.js"), vec!["shown"]);
        assert_eq!(live(&analysis, "inner.js"), vec!["inner"]);
    }

    #[test]
    fn star_re_exports_forward_requested_names() {
        let graph = TestGraph::new()
            .module("main.js", "import { a } from \"./barrel.js\";\n")
            .module("barrel.js", "export * from \"./one.js\";\nexport * from \"./two.js\";\n")
            .module("one.js", "export const a = 1;\nexport const b = 1;\n")
            .module("two.js", "export const c = 1;\nexport default 1;\n")
            .entry("main", "main.js")
            .build();

        let analysis = analyze_usage(&graph);
        assert_eq!(live(&analysis, "one.js"), vec!["a"]);
        assert!(live(&analysis, "two.js").is_empty());
    }

    #[test]
    fn live_star_re_export_keeps_its_target() {
        let graph = TestGraph::new()
            .module("main.js", "import * as all from \"./barrel.js\";\n")
            .module("barrel.js", "export * from \"./one.js\";\n")
            .module("one.js", "export const a = 1;\nexport const b = 1;\n")
            .entry("main", "main.js")
            .build();

        let analysis = analyze_usage(&graph);
        assert!(analysis.is_fully_live(&id("barrel.js")));
        assert_eq!(live(&analysis, "one.js"), vec!["a", "b"]);
    }

    #[test]
    fn dynamic_imports_keep_the_whole_target() {
        let graph = TestGraph::new()
            .module("main.js", "export const go = () => import(\"./lazy.js\");\n")
            .module("lazy.js", "export const a = 1;\nexport const b = 2;\n")
            .entry("main", "main.js")
            .build();

        let analysis = analyze_usage(&graph);
        assert!(analysis.is_fully_live(&id("lazy.js")));
    }

    #[test]
    fn side_effect_imports_keep_no_exports() {
        let graph = TestGraph::new()
            .module("main.js", "import \"./setup.js\";\n")
            .module("setup.js", "window.ready = true;\nexport const unused = 1;\n")
            .entry("main", "main.js")
            .build();

        let analysis = analyze_usage(&graph);
        let setup = graph.module(&id("setup.js")).unwrap();
        assert_eq!(shake_module(setup, &analysis), "window.ready = true;\n");
    }

    #[test]
    fn exports_used_by_live_code_in_their_module_stay() {
        let graph = TestGraph::new()
            .module("main.js", "import { b } from \"./x.js\";\nconsole.log(b);\n")
            .module(
                "x.js",
                "export const a = 1;\nexport const b = a + 1;\nexport const c = 3;\n",
            )
            .entry("main", "main.js")
            .build();

        let analysis = analyze_usage(&graph);
        assert_eq!(live(&analysis, "x.js"), vec!["a", "b"]);
        let x = graph.module(&id("x.js")).unwrap();
        assert_eq!(
            shake_module(x, &analysis),
            "export const a = 1;\nexport const b = a + 1;\n"
        );
    }

    #[test]
    fn exports_used_by_unexported_code_stay() {
        let graph = TestGraph::new()
            .module("main.js", "import \"./x.js\";\n")
            .module(
                "x.js",
                "export const a = 1;\nexport const b = 2;\nwindow.value = a;\n",
            )
            .entry("main", "main.js")
            .build();

        let analysis = analyze_usage(&graph);
        assert_eq!(live(&analysis, "x.js"), vec!["a"]);
        let x = graph.module(&id("x.js")).unwrap();
        assert_eq!(
            shake_module(x, &analysis),
            "export const a = 1;\nwindow.value = a;\n"
        );
    }
}

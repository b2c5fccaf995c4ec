use std::collections::{BTreeMap, BTreeSet, VecDeque};

use hashbrown::{HashMap, HashSet};
use petgraph::{algo::tarjan_scc, graphmap::DiGraphMap};
use tracing::instrument;

use crate::{
    uri_to_chunk_name, BuildError, BuildResult, Chunk, ChunkGraph, ChunkKind, DependencyKind,
    Graph, ModuleId,
};

#[derive(Debug)]
struct Root<'a> {
    name: String,
    module_id: &'a ModuleId,
    kind: ChunkKind,
}

/// Partitions the module graph into entry, async and shared chunks.
///
/// Every entry and every dynamic-import target roots a chunk. A module lands
/// in the chunk of the single root that reaches it over static edges, or in
/// the shared chunk keyed by the exact set of roots when several do.
#[instrument(skip_all)]
pub fn split_chunks(graph: &Graph) -> BuildResult<ChunkGraph> {
    let roots = collect_roots(graph);
    let root_by_module = roots
        .iter()
        .map(|root| (root.module_id, root.name.as_str()))
        .collect::<HashMap<_, _>>();

    // Module -> names of the roots reaching it without crossing another root.
    let mut reach: HashMap<&ModuleId, BTreeSet<&str>> = HashMap::new();
    for root in &roots {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([root.module_id]);
        while let Some(id) = queue.pop_front() {
            if !visited.insert(id) {
                continue;
            }
            reach.entry(id).or_default().insert(root.name.as_str());
            let Some(module) = graph.module(id) else {
                continue;
            };
            module
                .static_dependency_ids()
                .filter(|dep| graph.module(dep).is_some())
                .filter(|dep| !root_by_module.contains_key(dep))
                .for_each(|dep| queue.push_back(dep));
        }
    }

    let mut members_by_root: HashMap<&str, Vec<&ModuleId>> = HashMap::new();
    let mut shared: BTreeMap<String, Vec<&ModuleId>> = BTreeMap::new();
    for id in graph.sorted_module_ids() {
        let Some(reached_by) = reach.get(id) else {
            return Err(BuildError::ChunkSplitInvariant { module: id.clone() });
        };
        match reached_by.iter().next() {
            Some(&root) if reached_by.len() == 1 => {
                members_by_root.entry(root).or_default().push(id);
            }
            _ => {
                let name = shared_chunk_name(reached_by);
                shared.entry(name).or_default().push(id);
            }
        }
    }

    let mut groups: Vec<(String, ChunkKind, Vec<&ModuleId>)> = vec![];
    for kind in [ChunkKind::Entry, ChunkKind::Async] {
        let mut of_kind = roots
            .iter()
            .filter(|root| root.kind == kind)
            .collect::<Vec<_>>();
        if kind == ChunkKind::Async {
            of_kind.sort_by(|a, b| a.name.cmp(&b.name));
        }
        for root in of_kind {
            let members = members_by_root.remove(root.name.as_str()).unwrap_or_default();
            groups.push((root.name.clone(), kind, members));
        }
    }
    for (name, members) in shared {
        groups.push((name, ChunkKind::Shared, members));
    }

    let mut chunk_index_by_module: HashMap<&ModuleId, usize> = HashMap::new();
    for (index, (_, _, members)) in groups.iter().enumerate() {
        for id in members {
            chunk_index_by_module.insert(*id, index);
        }
    }
    if let Some(unassigned) = graph
        .sorted_module_ids()
        .into_iter()
        .find(|id| !chunk_index_by_module.contains_key(id))
    {
        return Err(BuildError::ChunkSplitInvariant {
            module: unassigned.clone(),
        });
    }

    let names = groups
        .iter()
        .map(|(name, _, _)| name.clone())
        .collect::<Vec<_>>();
    let chunks = groups
        .into_iter()
        .enumerate()
        .map(|(index, (name, kind, members))| {
            let mut chunk = Chunk::new(index, name, kind);
            let mut imports = BTreeSet::new();
            let mut dynamic_imports = BTreeSet::new();
            for id in &members {
                for dep in &graph.module_by_id[*id].dependencies {
                    let Some(target) = chunk_index_by_module.get(&dep.id).copied() else {
                        continue;
                    };
                    if target == index {
                        continue;
                    }
                    match dep.kind {
                        DependencyKind::Static => imports.insert(target),
                        DependencyKind::Dynamic => dynamic_imports.insert(target),
                    };
                }
            }
            chunk.module_ids = order_modules(graph, &members);
            chunk.imports = imports.into_iter().map(|i| names[i].clone()).collect();
            chunk.dynamic_imports = dynamic_imports
                .into_iter()
                .map(|i| names[i].clone())
                .collect();
            chunk
        })
        .collect::<Vec<_>>();

    tracing::debug!(
        "split {} modules into {} chunks",
        graph.module_by_id.len(),
        chunks.len()
    );
    Ok(ChunkGraph::new(chunks))
}

/// Entries in input order, then the dynamic-import targets that only a
/// dynamic edge reaches, in id order.
///
/// A dynamic target that some entry or other dynamic target reaches over
/// static edges is loaded with that module anyway, so reach sets place it.
/// Targets that only reach each other statically (a cycle behind a dynamic
/// edge) get a root for the smallest id.
fn collect_roots(graph: &Graph) -> Vec<Root<'_>> {
    let mut roots = graph
        .entries
        .iter()
        .filter_map(|entry| {
            let (module_id, _) = graph.module_by_id.get_key_value(&entry.id)?;
            Some(Root {
                name: entry.name.clone(),
                module_id,
                kind: ChunkKind::Entry,
            })
        })
        .collect::<Vec<_>>();

    let entry_ids = roots.iter().map(|root| root.module_id).collect::<HashSet<_>>();
    let dynamic_targets = graph
        .module_by_id
        .values()
        .flat_map(|module| &module.dependencies)
        .filter(|dep| dep.kind == DependencyKind::Dynamic)
        .filter_map(|dep| graph.module_by_id.get_key_value(&dep.id).map(|(id, _)| id))
        .filter(|id| !entry_ids.contains(id))
        .collect::<BTreeSet<_>>();

    let mut statically_reached = HashSet::new();
    for &source in entry_ids.iter().chain(dynamic_targets.iter()) {
        statically_reached.extend(
            static_closure(graph, source)
                .into_iter()
                .filter(|id| *id != source),
        );
    }

    let mut async_roots = dynamic_targets
        .iter()
        .copied()
        .filter(|id| !statically_reached.contains(id))
        .collect::<Vec<_>>();
    let mut covered = HashSet::new();
    for &root in entry_ids.iter().chain(async_roots.iter()) {
        covered.insert(root);
        covered.extend(static_closure(graph, root));
    }
    for &target in &dynamic_targets {
        if covered.insert(target) {
            async_roots.push(target);
            covered.extend(static_closure(graph, target));
        }
    }
    async_roots.sort();

    let mut used_names = roots
        .iter()
        .map(|root| root.name.clone())
        .collect::<HashSet<_>>();
    for module_id in async_roots {
        let base = uri_to_chunk_name(&graph.options.root, module_id.as_str());
        let mut name = base.clone();
        let mut suffix = 0;
        while used_names.contains(&name) {
            suffix += 1;
            name = format!("{}~{}", base, suffix);
        }
        used_names.insert(name.clone());
        roots.push(Root {
            name,
            module_id,
            kind: ChunkKind::Async,
        });
    }
    roots
}

/// Modules reachable from `start` over one or more static edges.
fn static_closure<'a>(graph: &'a Graph, start: &'a ModuleId) -> HashSet<&'a ModuleId> {
    let mut reached = HashSet::new();
    let mut queue = VecDeque::from([start]);
    while let Some(id) = queue.pop_front() {
        let Some(module) = graph.module(id) else {
            continue;
        };
        for dep in module.static_dependency_ids() {
            if graph.module(dep).is_some() && reached.insert(dep) {
                queue.push_back(dep);
            }
        }
    }
    reached
}

fn shared_chunk_name(roots: &BTreeSet<&str>) -> String {
    let mut name = "shared".to_string();
    for root in roots {
        name.push('~');
        name.push_str(root);
    }
    name
}

/// Dependencies before dependents. Members of a cycle are emitted together in
/// ascending id order; ties between independent modules go to the smallest id.
fn order_modules(graph: &Graph, members: &[&ModuleId]) -> Vec<ModuleId> {
    let member_set = members.iter().copied().collect::<HashSet<_>>();
    let mut restricted = DiGraphMap::<&ModuleId, ()>::new();
    for id in members {
        restricted.add_node(*id);
    }
    for id in members {
        for dep in graph.module_by_id[*id].static_dependency_ids() {
            if member_set.contains(dep) {
                restricted.add_edge(*id, dep, ());
            }
        }
    }

    let components = tarjan_scc(&restricted)
        .into_iter()
        .map(|mut component| {
            component.sort();
            component
        })
        .collect::<Vec<_>>();
    let component_of = components
        .iter()
        .enumerate()
        .flat_map(|(index, component)| component.iter().map(move |id| (*id, index)))
        .collect::<HashMap<_, _>>();

    // component -> components depending on it
    let mut dependents: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); components.len()];
    let mut pending = vec![0usize; components.len()];
    for (from, to, _) in restricted.all_edges() {
        let (from, to) = (component_of[from], component_of[to]);
        if from != to && dependents[to].insert(from) {
            pending[from] += 1;
        }
    }

    let mut ready = (0..components.len())
        .filter(|index| pending[*index] == 0)
        .map(|index| (components[index][0], index))
        .collect::<BTreeSet<_>>();
    let mut ordered = Vec::with_capacity(members.len());
    while let Some((first, index)) = ready.iter().next().copied() {
        ready.remove(&(first, index));
        ordered.extend(components[index].iter().map(|id| (*id).clone()));
        for dependent in &dependents[index] {
            pending[*dependent] -= 1;
            if pending[*dependent] == 0 {
                ready.insert((components[*dependent][0], *dependent));
            }
        }
    }
    ordered
}

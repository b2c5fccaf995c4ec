use std::{borrow::Borrow, fmt, ops::Range, sync::Arc};

use hashbrown::HashSet;
use serde::{Deserialize, Serialize};

use crate::{ContentHash, ModuleById};

/// Canonical identifier of a module, usually its absolute resolved path.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleId(Arc<str>);

impl ModuleId {
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ModuleId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ModuleId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ModuleId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ModuleId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DependencyKind {
    /// Loaded eagerly together with the importer.
    Static,
    /// Loaded on demand; crossing this edge starts an async chunk.
    Dynamic,
}

/// Which bindings of the imported module the importer refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImportedNames {
    Named(Vec<String>),
    /// `import * as ns` or any other use of the whole namespace.
    Namespace,
    /// Imported for its side effects only.
    SideEffect,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredDependency {
    pub specifier: String,
    pub kind: DependencyKind,
    pub imported: ImportedNames,
}

impl DeclaredDependency {
    pub fn new(specifier: impl Into<String>, kind: DependencyKind, imported: ImportedNames) -> Self {
        Self {
            specifier: specifier.into(),
            kind,
            imported,
        }
    }

    pub fn named<I, S>(specifier: impl Into<String>, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            specifier,
            DependencyKind::Static,
            ImportedNames::Named(names.into_iter().map(Into::into).collect()),
        )
    }

    pub fn dynamic(specifier: impl Into<String>) -> Self {
        Self::new(specifier, DependencyKind::Dynamic, ImportedNames::Namespace)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDependency {
    pub specifier: String,
    pub id: ModuleId,
    pub kind: DependencyKind,
    pub imported: ImportedNames,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedBinding {
    pub name: String,
    /// Byte range of the binding's top-level definition in the transformed
    /// code. Bindings without a span are never swept.
    pub span: Option<Range<usize>>,
    /// Other exported names of the same module the definition refers to.
    /// They are live whenever this binding is.
    #[serde(default)]
    pub references: Vec<String>,
}

impl ExportedBinding {
    pub fn new(name: impl Into<String>, span: Option<Range<usize>>) -> Self {
        Self {
            name: name.into(),
            span,
            references: vec![],
        }
    }

    pub fn with_references<I, S>(mut self, references: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.references = references.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReExportNames {
    /// `export { imported as exported } from "..."`
    Named(Vec<(String, String)>),
    /// `export * from "..."`
    All,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReExport {
    pub specifier: String,
    pub names: ReExportNames,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportSet {
    pub bindings: Vec<ExportedBinding>,
    pub re_exports: Vec<ReExport>,
    /// Exported names used by code outside every binding span. That code is
    /// never swept, so these bindings always stay.
    #[serde(default)]
    pub used_locally: Vec<String>,
}

impl ExportSet {
    pub fn local(&self, name: &str) -> Option<&ExportedBinding> {
        self.bindings.iter().find(|binding| binding.name == name)
    }

    /// Every name this module exports without consulting `export *` targets.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bindings
            .iter()
            .map(|binding| binding.name.as_str())
            .chain(self.re_exports.iter().flat_map(|re_export| match &re_export.names {
                ReExportNames::Named(pairs) => pairs
                    .iter()
                    .map(|(_, exported)| exported.as_str())
                    .collect::<Vec<_>>(),
                ReExportNames::All => Vec::new(),
            }))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Exports {
    Static(ExportSet),
    /// The export shape is only known at runtime.
    Dynamic,
}

impl Default for Exports {
    fn default() -> Self {
        Exports::Static(ExportSet::default())
    }
}

impl Exports {
    pub fn is_dynamic(&self) -> bool {
        matches!(self, Exports::Dynamic)
    }

    pub fn as_static(&self) -> Option<&ExportSet> {
        match self {
            Exports::Static(set) => Some(set),
            Exports::Dynamic => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleStatus {
    Discovered,
    ResolvingDependencies,
    Transformed,
    Linked,
}

pub struct Module {
    pub id: ModuleId,
    pub is_entry: bool,
    pub status: ModuleStatus,
    pub raw_source: Arc<str>,
    pub code: Arc<str>,
    pub declared_dependencies: Vec<DeclaredDependency>,
    /// Filled in once every declared specifier has been resolved.
    pub dependencies: Vec<ResolvedDependency>,
    pub exports: Exports,
    pub content_hash: ContentHash,
}

impl Module {
    pub fn depended_modules<'a>(&self, module_by_id: &'a ModuleById) -> Vec<&'a Module> {
        self.dependencies
            .iter()
            .filter(|dep| dep.kind == DependencyKind::Static)
            .filter_map(|dep| module_by_id.get(&dep.id))
            .collect()
    }

    pub fn dynamic_depended_modules<'a>(&self, module_by_id: &'a ModuleById) -> Vec<&'a Module> {
        self.dependencies
            .iter()
            .filter(|dep| dep.kind == DependencyKind::Dynamic)
            .filter_map(|dep| module_by_id.get(&dep.id))
            .collect()
    }

    pub fn static_dependency_ids(&self) -> impl Iterator<Item = &ModuleId> {
        self.dependencies
            .iter()
            .filter(|dep| dep.kind == DependencyKind::Static)
            .map(|dep| &dep.id)
    }

    pub fn dependency_by_specifier(&self, specifier: &str) -> Option<&ResolvedDependency> {
        self.dependencies.iter().find(|dep| dep.specifier == specifier)
    }

    /// Names of all exported bindings, or `None` for the dynamic sentinel.
    pub fn export_names(&self) -> Option<HashSet<String>> {
        self.exports
            .as_static()
            .map(|set| set.names().map(ToOwned::to_owned).collect())
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("id", &self.id)
            .field("is_entry", &self.is_entry)
            .field("status", &self.status)
            .field("code", &"...")
            .field("dependencies", &self.dependencies)
            .field("exports", &self.exports)
            .field("content_hash", &self.content_hash)
            .finish()
    }
}

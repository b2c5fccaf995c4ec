use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
    DeclaredDependency, DependencyKind, ExportSet, Exports, ImportedNames, ModuleId, TransformError,
};

pub struct TransformArgs<'a> {
    pub id: &'a ModuleId,
    pub code: String,
    /// Declared so far by earlier transforms in the chain.
    pub dependencies: Vec<DeclaredDependency>,
    pub exports: Exports,
}

impl TransformArgs<'_> {
    /// Output that changes nothing.
    pub fn pass_through(self) -> TransformOutput {
        TransformOutput {
            code: self.code,
            dependencies: self.dependencies,
            exports: self.exports,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformOutput {
    pub code: String,
    pub dependencies: Vec<DeclaredDependency>,
    pub exports: Exports,
}

/// A pure source-to-source step. Implementations must not depend on global
/// state: the same input under the same `identity` always yields the same
/// output, which is what makes cached outputs reusable.
pub trait Transform: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Token mixed into module content hashes. Change it whenever the
    /// transform's behaviour or configuration changes.
    fn identity(&self) -> String;

    fn matches(&self, id: &ModuleId, source: &str) -> bool;

    fn transform(&self, args: TransformArgs<'_>) -> anyhow::Result<TransformOutput>;
}

type MatchFn = dyn Fn(&ModuleId, &str) -> bool + Send + Sync;
type TransformFn = dyn Fn(TransformArgs<'_>) -> anyhow::Result<TransformOutput> + Send + Sync;

/// A transform assembled from a predicate, a function and an identity token.
pub struct FnTransform {
    name: String,
    identity: String,
    predicate: Box<MatchFn>,
    func: Box<TransformFn>,
}

impl FnTransform {
    pub fn new(
        name: impl Into<String>,
        identity: impl Into<String>,
        predicate: impl Fn(&ModuleId, &str) -> bool + Send + Sync + 'static,
        func: impl Fn(TransformArgs<'_>) -> anyhow::Result<TransformOutput> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            identity: identity.into(),
            predicate: Box::new(predicate),
            func: Box::new(func),
        }
    }
}

impl fmt::Debug for FnTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTransform")
            .field("name", &self.name)
            .field("identity", &self.identity)
            .finish()
    }
}

impl Transform for FnTransform {
    fn name(&self) -> &str {
        &self.name
    }

    fn identity(&self) -> String {
        self.identity.clone()
    }

    fn matches(&self, id: &ModuleId, source: &str) -> bool {
        (self.predicate)(id, source)
    }

    fn transform(&self, args: TransformArgs<'_>) -> anyhow::Result<TransformOutput> {
        (self.func)(args)
    }
}

/// Transforms in registration order. Assembled once by the caller and shared
/// by every graph job.
#[derive(Debug, Default, Clone)]
pub struct TransformPipeline {
    transforms: Vec<Arc<dyn Transform>>,
}

impl TransformPipeline {
    pub fn new(transforms: Vec<Arc<dyn Transform>>) -> Self {
        Self { transforms }
    }

    pub fn push(&mut self, transform: Arc<dyn Transform>) {
        self.transforms.push(transform);
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    /// The ordered subsequence whose predicates accept the raw source.
    pub fn applicable(&self, id: &ModuleId, source: &str) -> Vec<Arc<dyn Transform>> {
        self.transforms
            .iter()
            .filter(|transform| transform.matches(id, source))
            .cloned()
            .collect()
    }

    /// Feeds the raw source through `chain`, each step seeing the previous
    /// step's output.
    pub fn run(
        &self,
        id: &ModuleId,
        raw_source: &str,
        chain: &[Arc<dyn Transform>],
    ) -> Result<TransformOutput, TransformError> {
        let mut output = TransformOutput {
            code: raw_source.to_string(),
            dependencies: vec![],
            exports: Exports::default(),
        };
        for transform in chain {
            tracing::trace!("transform {} with {}", id, transform.name());
            output = transform
                .transform(TransformArgs {
                    id,
                    code: output.code,
                    dependencies: output.dependencies,
                    exports: output.exports,
                })
                .map_err(|err| TransformError {
                    module_id: id.clone(),
                    transform_name: transform.name().to_string(),
                    message: format!("{:#}", err),
                })?;
        }
        output.dependencies = normalize_dependencies(output.dependencies, &output.exports);
        validate_spans(id, &output)?;
        Ok(output)
    }
}

/// Unique by specifier in first-seen order. Duplicates are merged: static
/// wins over dynamic and imported names are unioned. Re-exported specifiers
/// become dependencies if no transform declared them.
fn normalize_dependencies(
    dependencies: Vec<DeclaredDependency>,
    exports: &Exports,
) -> Vec<DeclaredDependency> {
    let re_exported = exports
        .as_static()
        .map(|set| set.re_exports.as_slice())
        .unwrap_or_default()
        .iter()
        .map(|re_export| {
            DeclaredDependency::new(
                re_export.specifier.clone(),
                DependencyKind::Static,
                ImportedNames::SideEffect,
            )
        });

    let mut normalized: Vec<DeclaredDependency> = vec![];
    for dep in dependencies.into_iter().chain(re_exported) {
        match normalized
            .iter_mut()
            .find(|existing| existing.specifier == dep.specifier)
        {
            Some(existing) => {
                if dep.kind == DependencyKind::Static {
                    existing.kind = DependencyKind::Static;
                }
                existing.imported = merge_imported(&existing.imported, &dep.imported);
            }
            None => normalized.push(dep),
        }
    }
    normalized
}

fn merge_imported(left: &ImportedNames, right: &ImportedNames) -> ImportedNames {
    match (left, right) {
        (ImportedNames::Namespace, _) | (_, ImportedNames::Namespace) => ImportedNames::Namespace,
        (ImportedNames::Named(left), ImportedNames::Named(right)) => {
            let mut names = left.clone();
            for name in right {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
            ImportedNames::Named(names)
        }
        (ImportedNames::Named(names), ImportedNames::SideEffect)
        | (ImportedNames::SideEffect, ImportedNames::Named(names)) => ImportedNames::Named(names.clone()),
        (ImportedNames::SideEffect, ImportedNames::SideEffect) => ImportedNames::SideEffect,
    }
}

fn validate_spans(id: &ModuleId, output: &TransformOutput) -> Result<(), TransformError> {
    let Some(ExportSet { bindings, .. }) = output.exports.as_static() else {
        return Ok(());
    };
    for binding in bindings {
        let Some(span) = &binding.span else {
            continue;
        };
        let valid = span.start <= span.end
            && span.end <= output.code.len()
            && output.code.is_char_boundary(span.start)
            && output.code.is_char_boundary(span.end);
        if !valid {
            return Err(TransformError {
                module_id: id.clone(),
                transform_name: "validate".to_string(),
                message: format!("span {:?} of binding {:?} is outside the code", span, binding.name),
            });
        }
    }
    Ok(())
}

use std::{
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
};

use sugar_path::SugarPath;

use crate::{ModuleId, ResolutionError, ResolveFailure, ResolveOptions};

/// Maps `(specifier, importer)` to a canonical module id.
///
/// Resolution only reads the filesystem, so the same inputs against the same
/// filesystem snapshot always produce the same answer.
#[derive(Debug, Clone)]
pub struct Resolver {
    root: PathBuf,
    options: ResolveOptions,
}

impl Resolver {
    pub fn new(root: impl Into<PathBuf>, options: ResolveOptions) -> Self {
        Self {
            root: root.into(),
            options,
        }
    }

    pub fn resolve(&self, specifier: &str, importer: Option<&ModuleId>) -> Result<ModuleId, ResolutionError> {
        self.resolve_path(specifier, importer)
            .map(|path| ModuleId::new(path.to_string_lossy().as_ref()))
            .map_err(|reason| ResolutionError {
                specifier: specifier.to_string(),
                importer: importer.cloned(),
                reason,
            })
    }

    fn resolve_path(&self, specifier: &str, importer: Option<&ModuleId>) -> Result<PathBuf, ResolveFailure> {
        if let Some(aliased) = self.resolve_alias(specifier) {
            tracing::trace!("resolved {:?} through alias: {:?}", specifier, aliased);
            return aliased;
        }

        let base_dir = match importer {
            Some(importer) => Path::new(importer.as_str())
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| self.root.clone()),
            None => self.root.clone(),
        };

        // Entry specifiers are always paths relative to the root.
        if importer.is_none() || is_path_like(specifier) {
            let path = base_dir.join(specifier).resolve();
            return self
                .resolve_as_file_or_directory(&path)
                .ok_or(ResolveFailure::NotFound);
        }

        self.resolve_package(specifier, &base_dir)
    }

    fn resolve_alias(&self, specifier: &str) -> Option<Result<PathBuf, ResolveFailure>> {
        let matched = self
            .options
            .alias
            .iter()
            .filter(|(prefix, _)| alias_matches(prefix, specifier))
            .collect::<Vec<_>>();
        let longest = matched.iter().map(|(prefix, _)| prefix.len()).max()?;

        let mut resolved = matched
            .into_iter()
            .filter(|(prefix, _)| prefix.len() == longest)
            .filter_map(|(prefix, target)| {
                let rest = specifier[prefix.len()..].trim_start_matches('/');
                let target = self.root.join(target);
                let path = if rest.is_empty() { target } else { target.join(rest) };
                self.resolve_as_file_or_directory(&path.resolve())
            })
            .collect::<Vec<_>>();
        resolved.sort();
        resolved.dedup();

        Some(match resolved.len() {
            0 => Err(ResolveFailure::NotFound),
            1 => Ok(resolved.remove(0)),
            _ => Err(ResolveFailure::Ambiguous(resolved)),
        })
    }

    fn resolve_as_file_or_directory(&self, path: &Path) -> Option<PathBuf> {
        self.resolve_as_file(path).or_else(|| {
            if path.is_dir() {
                self.resolve_as_directory(path)
            } else {
                None
            }
        })
    }

    fn resolve_as_file(&self, path: &Path) -> Option<PathBuf> {
        if path.is_file() {
            return Some(path.to_path_buf());
        }
        self.options.extensions.iter().find_map(|ext| {
            let mut with_ext = OsString::from(path.as_os_str());
            with_ext.push(ext);
            let candidate = PathBuf::from(with_ext);
            candidate.is_file().then_some(candidate)
        })
    }

    fn resolve_as_directory(&self, dir: &Path) -> Option<PathBuf> {
        let marker = dir.join(&self.options.package_marker);
        if marker.is_file() {
            if let Some(main) = self.read_main_field(&marker) {
                if let Some(resolved) = self.resolve_as_file(&dir.join(main).resolve()) {
                    return Some(resolved);
                }
            }
        }
        self.resolve_as_file(&dir.join(&self.options.index_file))
    }

    fn read_main_field(&self, marker: &Path) -> Option<String> {
        let content = fs::read_to_string(marker).ok()?;
        let descriptor = match serde_json::from_str::<serde_json::Value>(&content) {
            Ok(descriptor) => descriptor,
            Err(err) => {
                tracing::debug!("ignoring malformed package descriptor {:?}: {}", marker, err);
                return None;
            }
        };
        self.options
            .main_fields
            .iter()
            .find_map(|field| descriptor.get(field)?.as_str().map(ToOwned::to_owned))
    }

    fn resolve_package(&self, specifier: &str, base_dir: &Path) -> Result<PathBuf, ResolveFailure> {
        let (name, subpath) = split_package_specifier(specifier);

        let mut dir = Some(base_dir);
        while let Some(current) = dir {
            let package_root = current.join(&self.options.modules_directory).join(name);
            if package_root.join(&self.options.package_marker).is_file() {
                let resolved = match subpath {
                    Some(subpath) => self.resolve_as_file_or_directory(&package_root.join(subpath).resolve()),
                    None => self.resolve_as_directory(&package_root),
                };
                return resolved.ok_or(ResolveFailure::NotFound);
            }
            dir = current.parent();
        }

        Err(ResolveFailure::NotFound)
    }
}

fn is_path_like(specifier: &str) -> bool {
    specifier == "."
        || specifier == ".."
        || specifier.starts_with("./")
        || specifier.starts_with("../")
        || Path::new(specifier).is_absolute()
}

fn alias_matches(prefix: &str, specifier: &str) -> bool {
    match specifier.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/') || prefix.ends_with('/'),
        None => false,
    }
}

/// `@scope/pkg/sub` -> (`@scope/pkg`, Some(`sub`)), `pkg` -> (`pkg`, None)
fn split_package_specifier(specifier: &str) -> (&str, Option<&str>) {
    let segments = if specifier.starts_with('@') { 2 } else { 1 };
    let mut split_at = None;
    let mut seen = 0;
    for (index, ch) in specifier.char_indices() {
        if ch == '/' {
            seen += 1;
            if seen == segments {
                split_at = Some(index);
                break;
            }
        }
    }
    match split_at {
        Some(index) => (&specifier[..index], Some(&specifier[index + 1..])),
        None => (specifier, None),
    }
}

use std::{path::PathBuf, time::Duration};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputItem {
    /// Logical chunk name.
    pub name: String,
    /// Specifier of the entry module, resolved against `root`.
    pub import: String,
}

impl InputItem {
    pub fn new(name: impl Into<String>, import: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            import: import.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolveOptions {
    /// Prefix -> target directory. The longest matching prefix wins.
    pub alias: Vec<(String, PathBuf)>,
    /// Tried in order after the exact path.
    pub extensions: Vec<String>,
    /// File marking a package root.
    pub package_marker: String,
    pub modules_directory: String,
    /// Fields of the package descriptor naming the package entry.
    pub main_fields: Vec<String>,
    /// File stem used when a specifier points at a directory.
    pub index_file: String,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            alias: vec![],
            extensions: vec![".js".to_string(), ".mjs".to_string(), ".json".to_string()],
            package_marker: "package.json".to_string(),
            modules_directory: "node_modules".to_string(),
            main_fields: vec!["main".to_string()],
            index_file: "index".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NormalizedInputOptions {
    pub input: Vec<InputItem>,
    pub root: PathBuf,
    pub resolve: ResolveOptions,
    /// Upper bound on modules loaded and transformed at once.
    pub max_concurrency: usize,
    /// Stop at the first resolution or transform error.
    pub fail_fast: bool,
    /// Report circular imports as errors instead of warnings.
    pub strict_cycles: bool,
    pub load_timeout: Option<Duration>,
    pub treeshake: bool,
    /// Fail the build when a cache entry cannot be stored.
    pub require_cache_writes: bool,
}

impl Default for NormalizedInputOptions {
    fn default() -> Self {
        Self {
            input: vec![],
            root: std::env::current_dir().unwrap_or_default(),
            resolve: Default::default(),
            max_concurrency: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            fail_fast: false,
            strict_cycles: false,
            load_timeout: None,
            treeshake: true,
            require_cache_writes: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NormalizedOutputOptions {
    pub dir: PathBuf,
    /// Template for entry chunks; `{name}` and `{hash}` are substituted.
    pub entry_file_names: String,
    /// Template for async and shared chunks.
    pub chunk_file_names: String,
    pub hash_length: usize,
    pub manifest_file_name: String,
}

impl Default for NormalizedOutputOptions {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("dist"),
            entry_file_names: "{name}-{hash}.js".to_string(),
            chunk_file_names: "{name}-{hash}.js".to_string(),
            hash_length: 8,
            manifest_file_name: "manifest.json".to_string(),
        }
    }
}

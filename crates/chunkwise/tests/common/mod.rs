use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use chunkwise::{chunkwise, BundleOutput, InputItem, NormalizedInputOptions, NormalizedOutputOptions, ScanTransform};
use serde::Deserialize;
use sugar_path::SugarPath;

/// `fixture.json` beside each fixture's sources.
#[derive(Debug, Deserialize)]
pub struct FixtureConfig {
    /// Entry name -> specifier relative to the fixture.
    pub input: Vec<(String, String)>,
    /// Expected chunk name -> module paths relative to the fixture, in order.
    pub chunks: BTreeMap<String, Vec<String>>,
    /// Text that must not survive in any emitted chunk.
    #[serde(default)]
    pub dropped: Vec<String>,
    #[serde(default = "default_treeshake")]
    pub treeshake: bool,
}

fn default_treeshake() -> bool {
    true
}

impl FixtureConfig {
    pub fn from_fixture(dir: &Path) -> Self {
        let content = std::fs::read_to_string(dir.join("fixture.json"))
            .unwrap_or_else(|_| panic!("missing fixture.json in {}", dir.display()));
        serde_json::from_str(&content)
            .unwrap_or_else(|err| panic!("invalid fixture.json in {}: {}", dir.display(), err))
    }
}

pub fn relative_modules(output: &BundleOutput, root: &Path) -> BTreeMap<String, Vec<String>> {
    output
        .assets
        .iter()
        .map(|asset| {
            let modules = asset
                .module_ids
                .iter()
                .map(|id| {
                    Path::new(id.as_str())
                        .relative(root)
                        .to_string_lossy()
                        .replace('\\', "/")
                })
                .collect();
            (asset.name.clone(), modules)
        })
        .collect()
}

pub async fn test_fixture(path: &Path) -> BundleOutput {
    let root: PathBuf = path.resolve();
    let config = FixtureConfig::from_fixture(&root);

    let mut compiler = chunkwise(NormalizedInputOptions {
        input: config
            .input
            .iter()
            .map(|(name, import)| InputItem::new(name, import))
            .collect(),
        root: root.clone(),
        treeshake: config.treeshake,
        ..Default::default()
    })
    .with_transform(ScanTransform::new());

    let out_dir = tempfile::TempDir::new().unwrap();
    let output = compiler
        .write(&NormalizedOutputOptions {
            dir: out_dir.path().to_path_buf(),
            ..Default::default()
        })
        .await
        .unwrap_or_else(|err| panic!("fixture {} failed: {}", root.display(), err));

    assert_eq!(
        relative_modules(&output, &root),
        config.chunks,
        "chunk assignment differs in fixture {}",
        root.display()
    );

    for asset in &output.assets {
        let written = std::fs::read(out_dir.path().join(&asset.file_name)).unwrap();
        assert_eq!(written, asset.bytes, "{} was not written", asset.file_name);
        for text in &config.dropped {
            assert!(
                !asset.code().contains(text.as_str()),
                "{:?} survived in chunk {} of fixture {}",
                text,
                asset.name,
                root.display()
            );
        }
    }
    assert!(out_dir.path().join("manifest.json").exists());

    output
}

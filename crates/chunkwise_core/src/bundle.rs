use std::{fs, io};

use hashbrown::HashMap;
use rayon::prelude::*;
use tracing::instrument;

use crate::{
    analyze_usage, split_chunks, Asset, BuildError, BuildResult, BundleOutput, Chunk,
    ContentHash, Graph, Manifest, NormalizedOutputOptions, UsageAnalysis,
};

#[derive(Debug)]
pub struct Bundle<'a> {
    pub options: &'a NormalizedOutputOptions,
    pub graph: &'a Graph,
}

impl<'a> Bundle<'a> {
    pub fn new(options: &'a NormalizedOutputOptions, graph: &'a Graph) -> Self {
        Self { options, graph }
    }

    #[instrument(skip_all)]
    pub fn generate(&self) -> BuildResult<BundleOutput> {
        let analysis = if self.graph.options.treeshake {
            analyze_usage(self.graph)
        } else {
            UsageAnalysis::keep_everything(self.graph)
        };
        let chunk_graph = split_chunks(self.graph)?;
        let chunks = chunk_graph.into_chunks();

        let rendered = chunks
            .par_iter()
            .map(|chunk| {
                let code = chunk.render(self.graph, &analysis);
                let hash = ContentHash::of_bytes(code.as_bytes());
                (code, hash)
            })
            .collect::<Vec<_>>();

        let mut file_by_name: HashMap<&str, String> = HashMap::new();
        let mut chunk_by_file: HashMap<String, &str> = HashMap::new();
        for (chunk, (_, hash)) in chunks.iter().zip(&rendered) {
            let file_name = self.file_name(chunk, hash);
            if chunk_by_file.insert(file_name.clone(), &chunk.name).is_some() {
                return Err(BuildError::FileNameConflict { file_name });
            }
            file_by_name.insert(&chunk.name, file_name);
        }

        let files_of = |names: &[String]| {
            names
                .iter()
                .filter_map(|name| file_by_name.get(name.as_str()).cloned())
                .collect::<Vec<_>>()
        };
        let assets = chunks
            .iter()
            .zip(rendered)
            .map(|(chunk, (code, content_hash))| Asset {
                name: chunk.name.clone(),
                file_name: file_by_name[chunk.name.as_str()].clone(),
                bytes: code.into_bytes(),
                content_hash,
                is_entry: chunk.is_entry(),
                is_async: chunk.is_async(),
                module_ids: chunk.module_ids.clone(),
                imports: files_of(&chunk.imports),
                dynamic_imports: files_of(&chunk.dynamic_imports),
            })
            .collect::<Vec<_>>();

        tracing::debug!("generated {} assets", assets.len());
        let manifest = Manifest::from_assets(&assets);
        Ok(BundleOutput { assets, manifest })
    }

    /// Generates, then writes every asset and the manifest under `dir`.
    #[instrument(skip_all)]
    pub fn write(&self) -> BuildResult<BundleOutput> {
        let output = self.generate()?;
        let dir = &self.options.dir;
        fs::create_dir_all(dir)?;
        for asset in &output.assets {
            let path = dir.join(&asset.file_name);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, &asset.bytes)?;
            tracing::trace!("wrote {}", path.display());
        }
        let manifest = serde_json::to_string_pretty(&output.manifest).map_err(io::Error::from)?;
        fs::write(dir.join(&self.options.manifest_file_name), manifest)?;
        Ok(output)
    }

    fn file_name(&self, chunk: &Chunk, hash: &ContentHash) -> String {
        let template = if chunk.is_entry() {
            &self.options.entry_file_names
        } else {
            &self.options.chunk_file_names
        };
        template
            .replace("{name}", &chunk.name)
            .replace("{hash}", hash.short(self.options.hash_length))
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::{
        testing::{id, TestGraph},
        NormalizedInputOptions,
    };

    fn app_admin(util: &str) -> Graph {
        TestGraph::new()
            .module("main.js", "import { util } from \"./util.js\";\nutil();\n")
            .module("admin.js", "import { util } from \"./util.js\";\nutil(\"admin\");\n")
            .module("util.js", util)
            .entry("app", "main.js")
            .entry("admin", "admin.js")
            .build()
    }

    #[test]
    fn emits_entry_and_shared_chunks() {
        let graph = app_admin("export function util() {}\nexport const unused = 1;\n");
        let options = NormalizedOutputOptions::default();
        let output = Bundle::new(&options, &graph).generate().unwrap();

        let names = output
            .assets
            .iter()
            .map(|asset| asset.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["app", "admin", "shared~admin~app"]);

        let shared = output.asset_by_name("shared~admin~app").unwrap();
        assert_eq!(shared.code(), "export function util() {}\n");
        assert_eq!(
            shared.file_name,
            format!("shared~admin~app-{}.js", shared.content_hash.short(8))
        );
        assert_eq!(shared.module_ids, vec![id("util.js")]);

        let app = output.asset_by_name("app").unwrap();
        assert!(app.is_entry);
        assert_eq!(app.imports, vec![shared.file_name.clone()]);
        assert_eq!(
            output.manifest.file_of("app"),
            Some(app.file_name.as_str())
        );
        assert_eq!(output.manifest.chunks["app"].imports, vec![shared.file_name.clone()]);
    }

    #[test]
    fn output_is_deterministic() {
        let options = NormalizedOutputOptions::default();
        let first = Bundle::new(&options, &app_admin("export const util = 1;\n"))
            .generate()
            .unwrap();
        let second = Bundle::new(&options, &app_admin("export const util = 1;\n"))
            .generate()
            .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn one_byte_changes_only_containing_chunks() {
        let options = NormalizedOutputOptions::default();
        let before = Bundle::new(&options, &app_admin("export const util = 1;\n"))
            .generate()
            .unwrap();
        let after = Bundle::new(&options, &app_admin("export const util = 2;\n"))
            .generate()
            .unwrap();

        let hash_of = |output: &BundleOutput, name: &str| {
            output.asset_by_name(name).unwrap().content_hash.clone()
        };
        assert_eq!(hash_of(&before, "app"), hash_of(&after, "app"));
        assert_eq!(hash_of(&before, "admin"), hash_of(&after, "admin"));
        assert_ne!(
            hash_of(&before, "shared~admin~app"),
            hash_of(&after, "shared~admin~app")
        );
    }

    #[test]
    fn colliding_file_names_are_rejected() {
        let options = NormalizedOutputOptions {
            entry_file_names: "bundle.js".to_string(),
            ..Default::default()
        };
        let graph = app_admin("export const util = 1;\n");
        match Bundle::new(&options, &graph).generate() {
            Err(BuildError::FileNameConflict { file_name }) => assert_eq!(file_name, "bundle.js"),
            other => panic!("unexpected result {:?}", other.map(|output| output.assets.len())),
        }
    }

    #[test]
    fn treeshake_can_be_disabled() {
        let graph = TestGraph::with_options(NormalizedInputOptions {
            treeshake: false,
            ..Default::default()
        })
        .module("main.js", "import { a } from \"./x.js\";\n")
        .module("x.js", "export const a = 1;\nexport const b = 2;\n")
        .entry("main", "main.js")
        .build();
        let options = NormalizedOutputOptions::default();
        let output = Bundle::new(&options, &graph).generate().unwrap();
        assert_eq!(
            output.assets[0].code(),
            "export const a = 1;\nexport const b = 2;\nimport { a } from \"./x.js\";\n"
        );
    }

    #[test]
    fn writes_assets_and_manifest() {
        let dir = TempDir::new().unwrap();
        let options = NormalizedOutputOptions {
            dir: dir.path().join("dist"),
            chunk_file_names: "chunks/{name}.{hash}.js".to_string(),
            ..Default::default()
        };
        let graph = app_admin("export const util = 1;\n");
        let output = Bundle::new(&options, &graph).write().unwrap();

        for asset in &output.assets {
            let written = fs::read(options.dir.join(&asset.file_name)).unwrap();
            assert_eq!(written, asset.bytes);
        }
        assert!(output.assets[2].file_name.starts_with("chunks/shared~admin~app."));

        let manifest: Manifest = serde_json::from_str(
            &fs::read_to_string(options.dir.join("manifest.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(manifest, output.manifest);
    }
}

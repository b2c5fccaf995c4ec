use std::{borrow::Cow, collections::BTreeMap};

use serde::{Deserialize, Serialize};

use crate::{ContentHash, ModuleId};

/// One emitted file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    /// Logical chunk name.
    pub name: String,
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub content_hash: ContentHash,
    pub is_entry: bool,
    pub is_async: bool,
    pub module_ids: Vec<ModuleId>,
    /// File names of chunks to load first.
    pub imports: Vec<String>,
    /// File names of chunks loaded on demand.
    pub dynamic_imports: Vec<String>,
}

impl Asset {
    pub fn code(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestChunk {
    pub file: String,
    pub modules: Vec<ModuleId>,
    pub is_entry: bool,
    pub is_async: bool,
    pub imports: Vec<String>,
    pub dynamic_imports: Vec<String>,
}

/// Chunk name -> emitted file, for whatever serves the assets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub chunks: BTreeMap<String, ManifestChunk>,
}

impl Manifest {
    pub fn from_assets(assets: &[Asset]) -> Self {
        Self {
            chunks: assets
                .iter()
                .map(|asset| {
                    (
                        asset.name.clone(),
                        ManifestChunk {
                            file: asset.file_name.clone(),
                            modules: asset.module_ids.clone(),
                            is_entry: asset.is_entry,
                            is_async: asset.is_async,
                            imports: asset.imports.clone(),
                            dynamic_imports: asset.dynamic_imports.clone(),
                        },
                    )
                })
                .collect(),
        }
    }

    pub fn file_of(&self, chunk_name: &str) -> Option<&str> {
        self.chunks.get(chunk_name).map(|chunk| chunk.file.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleOutput {
    /// In chunk order.
    pub assets: Vec<Asset>,
    pub manifest: Manifest,
}

impl BundleOutput {
    pub fn asset_by_name(&self, name: &str) -> Option<&Asset> {
        self.assets.iter().find(|asset| asset.name == name)
    }
}

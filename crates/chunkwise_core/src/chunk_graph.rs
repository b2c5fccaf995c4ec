use hashbrown::HashMap;

use crate::{Chunk, ModuleId};

/// Chunks in output order plus the module -> chunk assignment.
#[derive(Debug, Default)]
pub struct ChunkGraph {
    chunks: Vec<Chunk>,
    chunk_by_module: HashMap<ModuleId, usize>,
}

impl ChunkGraph {
    pub fn new(chunks: Vec<Chunk>) -> Self {
        let chunk_by_module = chunks
            .iter()
            .flat_map(|chunk| chunk.module_ids.iter().map(|id| (id.clone(), chunk.id)))
            .collect();
        Self {
            chunks,
            chunk_by_module,
        }
    }

    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.iter()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn chunk_by_id(&self, id: usize) -> Option<&Chunk> {
        self.chunks.get(id)
    }

    pub fn chunk_by_name(&self, name: &str) -> Option<&Chunk> {
        self.chunks.iter().find(|chunk| chunk.name == name)
    }

    pub fn chunk_of_module(&self, id: &ModuleId) -> Option<&Chunk> {
        self.chunk_by_module
            .get(id)
            .and_then(|index| self.chunks.get(*index))
    }

    pub fn into_chunks(self) -> Vec<Chunk> {
        self.chunks
    }
}

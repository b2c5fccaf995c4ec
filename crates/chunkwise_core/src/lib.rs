mod options;
pub use options::*;
mod error;
pub use error::*;
mod module;
pub use module::*;
mod cache;
pub use cache::*;
mod resolver;
pub use resolver::*;
mod plugin;
pub use plugin::*;
mod graph;
pub use graph::*;
mod resolving_module_job;
pub use resolving_module_job::*;
mod treeshake;
pub use treeshake::*;
mod chunk;
pub use chunk::*;
mod chunk_graph;
pub use chunk_graph::*;
mod chunk_spliter;
pub use chunk_spliter::*;
mod bundle;
pub use bundle::*;
mod output;
pub use output::*;
mod utils;
pub use utils::*;
#[cfg(test)]
pub(crate) mod testing;

pub type ModuleById = hashbrown::HashMap<ModuleId, Module>;

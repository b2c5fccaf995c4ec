use std::fmt::Debug;

use async_trait::async_trait;

mod args;
pub use args::*;
mod plugin_driver;
pub use plugin_driver::*;
mod transform;
pub use transform::*;
mod scan_transform;
pub use scan_transform::*;

pub type PluginResolveHookOutput = anyhow::Result<Option<String>>;
pub type PluginLoadHookOutput = anyhow::Result<Option<String>>;

/// Build hooks. Every hook defaults to "not handled".
#[async_trait]
pub trait Plugin: Debug + Send + Sync {
    fn name(&self) -> &str;

    /// Returns a module id for the specifier, bypassing the built-in resolver.
    async fn resolve(&self, _args: ResolveArgs<'_>) -> PluginResolveHookOutput {
        Ok(None)
    }

    /// Returns the raw source for an id, bypassing the filesystem.
    async fn load(&self, _args: LoadArgs<'_>) -> PluginLoadHookOutput {
        Ok(None)
    }
}

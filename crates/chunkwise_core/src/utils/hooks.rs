use std::{io, sync::Arc};

use crate::{
    BuildError, BuildResult, LoadArgs, ModuleId, PluginDriver, ResolveArgs, Resolver,
};

/// Plugins first, then the built-in resolver on the blocking pool.
pub async fn resolve(
    args: ResolveArgs<'_>,
    plugin_driver: &PluginDriver,
    resolver: &Arc<Resolver>,
) -> BuildResult<ModuleId> {
    if let Some(output) = plugin_driver.resolve(args.clone()).await? {
        return Ok(output.into());
    }

    tracing::trace!(
        "resolve importer:{:?},specifier:{:?}",
        args.importer,
        args.specifier
    );
    let resolver = resolver.clone();
    let specifier = args.specifier.to_string();
    let importer = args.importer.cloned();
    let resolved =
        tokio::task::spawn_blocking(move || resolver.resolve(&specifier, importer.as_ref()))
            .await
            .map_err(io::Error::from)?;
    Ok(resolved?)
}

/// Plugins first, then the filesystem.
pub async fn load(args: LoadArgs<'_>, plugin_driver: &PluginDriver) -> BuildResult<String> {
    if let Some(output) = plugin_driver.load(args.clone()).await? {
        return Ok(output);
    }

    tokio::fs::read_to_string(args.id.as_str())
        .await
        .map_err(|err| BuildError::Load {
            id: args.id.clone(),
            message: err.to_string(),
        })
}

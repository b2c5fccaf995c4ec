use std::sync::Arc;

use tracing::instrument;

use crate::{BuildError, LoadArgs, Plugin, ResolveArgs};

#[derive(Debug, Default)]
pub struct PluginDriver {
    pub plugins: Vec<Arc<dyn Plugin>>,
}

impl PluginDriver {
    pub fn new(plugins: Vec<Arc<dyn Plugin>>) -> Self {
        Self { plugins }
    }

    #[instrument(skip_all, fields(specifier = args.specifier))]
    pub async fn resolve(&self, args: ResolveArgs<'_>) -> Result<Option<String>, BuildError> {
        for plugin in &self.plugins {
            let output = plugin
                .resolve(args.clone())
                .await
                .map_err(|err| plugin_error(plugin.as_ref(), err))?;
            if output.is_some() {
                return Ok(output);
            }
        }
        Ok(None)
    }

    #[instrument(skip_all, fields(id = %args.id))]
    pub async fn load(&self, args: LoadArgs<'_>) -> Result<Option<String>, BuildError> {
        for plugin in &self.plugins {
            let output = plugin
                .load(args.clone())
                .await
                .map_err(|err| plugin_error(plugin.as_ref(), err))?;
            if output.is_some() {
                return Ok(output);
            }
        }
        Ok(None)
    }
}

fn plugin_error(plugin: &dyn Plugin, err: anyhow::Error) -> BuildError {
    BuildError::Plugin {
        plugin: plugin.name().to_string(),
        message: format!("{:#}", err),
    }
}

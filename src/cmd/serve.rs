use crate::cmd::config::plugin::PluginConfig;
use crate::error::XylemError;
use crate::volume::VolumePlugin;
use tracing::info;

pub async fn serve(config: PluginConfig) -> Result<(), XylemError> {
    config.logger.init()?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        "starting volume plugin with config: {:#?}", config
    );
    VolumePlugin::new(config).run().await?;
    info!("volume plugin exited");
    Ok(())
}

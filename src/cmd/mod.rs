mod catalog;
mod play;

pub use catalog::{cmd_info, cmd_list};
pub use play::{cmd_play, PlayOptions};

use anyhow::Result;
use vodplay::{CatalogClient, PlayerConfig};

fn catalog_client(config: &PlayerConfig) -> Result<CatalogClient> {
    Ok(CatalogClient::new(
        &config.catalog.base_url,
        config.catalog.token.clone(),
        std::time::Duration::from_secs(config.catalog.timeout_secs),
    )?)
}

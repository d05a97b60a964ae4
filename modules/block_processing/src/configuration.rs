use anyhow::Result;
use config::Config;
use stakenode_common::ChainParams;

#[derive(Clone, Debug, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BlockProcessingConfig {
    #[serde(flatten)]
    pub chain: ChainParams,
    pub queue_capacity: usize,
    pub broadcast_fresh_blocks: bool,
}

impl Default for BlockProcessingConfig {
    fn default() -> Self {
        Self {
            chain: ChainParams::default(),
            queue_capacity: 16,
            broadcast_fresh_blocks: true,
        }
    }
}

impl BlockProcessingConfig {
    pub fn try_load(config: &Config) -> Result<Self> {
        let full_config = Config::builder()
            .add_source(config::File::from_str(
                include_str!("../config.default.toml"),
                config::FileFormat::Toml,
            ))
            .add_source(config.clone())
            .build()?;
        Ok(full_config.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_defaults_match_default_impl() {
        let loaded = BlockProcessingConfig::try_load(&Config::default()).unwrap();
        let default = BlockProcessingConfig::default();
        assert_eq!(loaded.queue_capacity, default.queue_capacity);
        assert_eq!(loaded.broadcast_fresh_blocks, default.broadcast_fresh_blocks);
        assert_eq!(loaded.chain, default.chain);
    }

    #[test]
    fn broadcast_can_be_disabled() {
        let overrides = Config::builder()
            .set_override("broadcast-fresh-blocks", false)
            .unwrap()
            .build()
            .unwrap();
        let config = BlockProcessingConfig::try_load(&overrides).unwrap();
        assert!(!config.broadcast_fresh_blocks);
    }
}

use std::time::Duration;

use anyhow::Result;
use config::Config;
use stakenode_common::ChainParams;

#[derive(Clone, Debug, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PeerVerifierConfig {
    #[serde(flatten)]
    pub chain: ChainParams,
    pub n_ary: usize,
    pub page_size: u64,
    pub common_blocks_timeout_ms: u64,
    pub get_blocks_timeout_ms: u64,
    pub verified_cache_size: usize,
    pub strict_slot_schedule: bool,
}

impl Default for PeerVerifierConfig {
    fn default() -> Self {
        Self {
            chain: ChainParams::default(),
            n_ary: 8,
            page_size: 400,
            common_blocks_timeout_ms: 5000,
            get_blocks_timeout_ms: 30000,
            verified_cache_size: 10000,
            strict_slot_schedule: true,
        }
    }
}

impl PeerVerifierConfig {
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

    pub fn common_blocks_timeout(&self) -> Duration {
        Duration::from_millis(self.common_blocks_timeout_ms)
    }

    pub fn get_blocks_timeout(&self) -> Duration {
        Duration::from_millis(self.get_blocks_timeout_ms)
    }
}

use anyhow::Result;
use config::Config;
use serde::Deserialize;

/// Network-wide constants every integrity decision depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ChainParams {
    /// Delegates forging in each round, and therefore the round length in blocks
    pub active_delegates: u64,

    /// Slot length in seconds
    pub block_time: u64,
}

impl Default for ChainParams {
    fn default() -> Self {
        Self {
            active_delegates: 51,
            block_time: 8,
        }
    }
}

impl ChainParams {
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
    fn defaults_match_embedded_file() {
        let params = ChainParams::try_load(&Config::default()).unwrap();
        assert_eq!(params, ChainParams::default());
    }

    #[test]
    fn caller_config_overrides_defaults() {
        let config = Config::builder().set_override("active-delegates", 5).unwrap().build().unwrap();
        let params = ChainParams::try_load(&config).unwrap();
        assert_eq!(params.active_delegates, 5);
        assert_eq!(params.block_time, 8);
    }
}

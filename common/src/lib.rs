// Stakenode common library - main library exports

pub mod capped_set;
pub mod configuration;
pub mod crypto;
pub mod hash;
pub mod ports;
pub mod rounds;
pub mod types;

// Flattened re-exports
pub use self::capped_set::CappedSet;
pub use self::configuration::ChainParams;
pub use self::hash::{BlockId, Hash, PublicKey, Signature, TxId};
pub use self::types::*;

use std::collections::HashMap;
use std::sync::Arc;

use stakenode_common::{
    crypto::verify_header, ports::DelegateLookup, BlockHeader, ChainParams, PublicKey,
};
use tokio::time::Instant;
use tracing::debug;

use crate::deadline::call_local;
use crate::verify_error::PeerVerifyError;
use crate::VerifiedCache;

/// Checks that a peer's block was signed by a delegate allowed to forge
/// it. Active sets are fetched once per round for the lifetime of one
/// verification.
pub(crate) struct BlockAuthenticator {
    params: ChainParams,
    strict_slot_schedule: bool,
    delegates: Arc<dyn DelegateLookup>,
    verified: VerifiedCache,
    deadline: Instant,
    active_sets: HashMap<u64, Vec<PublicKey>>,
}

impl BlockAuthenticator {
    pub fn new(
        params: ChainParams,
        strict_slot_schedule: bool,
        delegates: Arc<dyn DelegateLookup>,
        verified: VerifiedCache,
        deadline: Instant,
    ) -> Self {
        Self {
            params,
            strict_slot_schedule,
            delegates,
            verified,
            deadline,
            active_sets: HashMap::new(),
        }
    }

    pub async fn authenticate(&mut self, header: &BlockHeader) -> Result<(), PeerVerifyError> {
        if self.verified.lock().await.contains(&header.id) {
            debug!(
                "Accepting block at height {}, already verified before",
                header.height
            );
            return Ok(());
        }

        verify_header(header).map_err(|source| PeerVerifyError::Crypto {
            height: header.height,
            source,
        })?;
        self.check_generator(header).await?;

        debug!(
            "Verified block at height {}, signed by {}",
            header.height, header.generator_public_key
        );
        self.verified.lock().await.insert(header.id);
        Ok(())
    }

    async fn check_generator(&mut self, header: &BlockHeader) -> Result<(), PeerVerifyError> {
        let height = header.height;
        let generator = header.generator_public_key;
        let params = self.params;
        let strict = self.strict_slot_schedule;
        let active_set = self.active_set(height).await?;

        if strict {
            let scheduled = params
                .scheduled_delegate(active_set, header.timestamp)
                .copied()
                .ok_or(PeerVerifyError::NoActiveDelegates { height })?;
            if scheduled != generator {
                return Err(PeerVerifyError::WrongSlotDelegate {
                    height,
                    generator,
                    scheduled,
                });
            }
        } else if !active_set.contains(&generator) {
            return Err(PeerVerifyError::NotActiveDelegate { height, generator });
        }
        Ok(())
    }

    async fn active_set(&mut self, height: u64) -> Result<&[PublicKey], PeerVerifyError> {
        let round = self.params.round_info(height);
        if !self.active_sets.contains_key(&round.round) {
            let lookup = self.delegates.get_active_delegates(round.round_height);
            let set = call_local(self.deadline, lookup).await?;
            if set.is_empty() {
                return Err(PeerVerifyError::NoActiveDelegates { height });
            }
            self.active_sets.insert(round.round, set);
        }
        Ok(self.active_sets.get(&round.round).map(Vec::as_slice).unwrap_or_default())
    }
}

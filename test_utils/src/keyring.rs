use ed25519_dalek::SigningKey;
use stakenode_common::PublicKey;

/// Fixed set of delegate keys. Key `i` is derived from the seed `[i + 1; 32]`.
#[derive(Clone)]
pub struct Keyring {
    keys: Vec<SigningKey>,
}

impl Keyring {
    pub fn new(size: usize) -> Self {
        let keys = (0..size.max(1)).map(|i| SigningKey::from_bytes(&[i as u8 + 1; 32])).collect();
        Self { keys }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn key(&self, index: usize) -> &SigningKey {
        &self.keys[index % self.keys.len()]
    }

    /// Key scheduled for `slot` when the active set is `public_keys()`
    pub fn key_for_slot(&self, slot: u64) -> &SigningKey {
        self.key((slot % self.keys.len() as u64) as usize)
    }

    pub fn public_keys(&self) -> Vec<PublicKey> {
        self.keys.iter().map(|k| PublicKey::new(k.verifying_key().to_bytes())).collect()
    }
}

//! Local node identity.
//!
//! An Ed25519 key derived from a 32-byte seed. The seed lives in a file
//! holding its hex encoding, created with a fresh random seed on first start.

use std::{fs, path::Path};

use anyhow::{Context, Result};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::RngCore;

use crate::crypto::{hash::Hash, signer::RecordSigner};

/// Length of the identity seed in bytes.
pub const SEED_LEN: usize = 32;

pub struct NodeIdentity {
    signing_key: SigningKey,
}

impl NodeIdentity {
    pub fn from_seed(seed: [u8; SEED_LEN]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&seed),
        }
    }

    /// Creates an identity from a fresh random seed.
    pub fn generate() -> Self {
        let mut seed = [0u8; SEED_LEN];
        rand::rngs::OsRng.fill_bytes(&mut seed);
        Self::from_seed(seed)
    }

    /// Loads the seed at `path`, or generates and writes one if the file is missing.
    pub fn load_or_generate<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read identity {}", path.display()))?;
            let bytes = hex::decode(text.trim()).context("Identity file is not valid hex")?;
            let seed: [u8; SEED_LEN] = bytes.try_into().map_err(|bytes: Vec<u8>| {
                anyhow::anyhow!("Identity seed must be {SEED_LEN} bytes, got {}", bytes.len())
            })?;
            return Ok(Self::from_seed(seed));
        }

        let identity = Self::generate();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(path, hex::encode(identity.signing_key.to_bytes()))
            .with_context(|| format!("Failed to write identity {}", path.display()))?;
        Ok(identity)
    }

    pub fn public_key(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// Checks a producer signature over `current_hash` against `public_key`.
    pub fn verify(public_key: &[u8; 32], current_hash: &Hash, signature: &[u8]) -> bool {
        let Ok(key) = VerifyingKey::from_bytes(public_key) else {
            return false;
        };
        let Ok(signature) = Signature::from_slice(signature) else {
            return false;
        };
        key.verify(current_hash, &signature).is_ok()
    }
}

impl RecordSigner for NodeIdentity {
    fn sign(&self, current_hash: &Hash) -> Vec<u8> {
        self.signing_key.sign(current_hash).to_bytes().to_vec()
    }
}

impl std::fmt::Debug for NodeIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeIdentity")
            .field("public_key", &hex::encode(self.public_key()))
            .finish()
    }
}

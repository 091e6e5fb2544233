use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::hash::Partitioning;

/// Parameters fixed when a database is initialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Hash size in bits; a positive multiple of 8.
    pub hash_bits: u32,
    /// Largest Hamming distance a lookup can report.
    pub max_error: u32,
    /// Expected number of stored hashes. Informational; kept with the database.
    pub num_hashes: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            hash_bits: 64,
            max_error: 5,
            num_hashes: 100,
        }
    }
}

impl EngineConfig {
    pub fn new(hash_bits: u32, max_error: u32, num_hashes: u64) -> Self {
        Self {
            hash_bits,
            max_error,
            num_hashes,
        }
    }

    pub fn with_hash_bits(mut self, hash_bits: u32) -> Self {
        self.hash_bits = hash_bits;
        self
    }

    pub fn with_max_error(mut self, max_error: u32) -> Self {
        self.max_error = max_error;
        self
    }

    pub fn with_num_hashes(mut self, num_hashes: u64) -> Self {
        self.num_hashes = num_hashes;
        self
    }

    /// Hash size in bytes.
    pub fn hash_bytes(&self) -> usize {
        (self.hash_bits / 8) as usize
    }

    pub fn partitioning(&self) -> Partitioning {
        Partitioning::new(self.hash_bits, self.max_error)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.hash_bits == 0 || self.hash_bits % 8 != 0 {
            return Err(EngineError::InvalidConfig(format!(
                "hash_bits must be a positive multiple of 8, got {}",
                self.hash_bits
            )));
        }
        if self.hash_bits > u16::MAX as u32 {
            return Err(EngineError::InvalidConfig(format!(
                "hash_bits must not exceed {}, got {}",
                u16::MAX,
                self.hash_bits
            )));
        }
        if self.max_error == 0 || self.max_error >= self.hash_bits {
            return Err(EngineError::InvalidConfig(format!(
                "max_error must be between 1 and {}, got {}",
                self.hash_bits - 1,
                self.max_error
            )));
        }
        if !self.partitioning().covers(self.max_error) {
            return Err(EngineError::InvalidConfig(format!(
                "max_error {} is too large for {}-bit hashes",
                self.max_error, self.hash_bits
            )));
        }
        Ok(())
    }
}

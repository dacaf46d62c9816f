//! Ring geometry configuration.
//!
//! A [`RingConfig`] names the two immutable parameters of a ring: the size of
//! each slot and how many slots exist. It can be built in code, deserialized
//! with serde, or read from the environment:
//!
//! ```text
//! BLOCKRING_BLOCK_SIZE=1024  bytes per slot   (default 4096)
//! BLOCKRING_NUM_BLOCKS=100   number of slots  (default 64)
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ring::RingError;

/// Environment variable holding the slot size in bytes.
pub const BLOCK_SIZE_VAR: &str = "BLOCKRING_BLOCK_SIZE";

/// Environment variable holding the slot count.
pub const NUM_BLOCKS_VAR: &str = "BLOCKRING_NUM_BLOCKS";

const DEFAULT_BLOCK_SIZE_BYTES: usize = 4096;
const DEFAULT_NUM_BLOCKS: usize = 64;

/// Errors loading a [`RingConfig`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// An environment variable is set but is not an unsigned integer.
    #[error("invalid value `{value}` for {var}")]
    Invalid { var: &'static str, value: String },
    /// The values parsed but describe an unusable ring.
    #[error("invalid ring geometry: {0}")]
    Ring(#[from] RingError),
}

/// Geometry of a ring buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RingConfig {
    /// Size of every slot in bytes.
    pub block_size_bytes: usize,
    /// Number of slots in the ring.
    pub num_blocks: usize,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            block_size_bytes: DEFAULT_BLOCK_SIZE_BYTES,
            num_blocks: DEFAULT_NUM_BLOCKS,
        }
    }
}

impl RingConfig {
    #[must_use]
    pub const fn new(block_size_bytes: usize, num_blocks: usize) -> Self {
        Self {
            block_size_bytes,
            num_blocks,
        }
    }

    /// Checks the geometry and returns the total storage size in bytes.
    ///
    /// # Errors
    ///
    /// Returns [`RingError::ZeroBlockSize`], [`RingError::ZeroBlocks`] or
    /// [`RingError::CapacityOverflow`].
    pub const fn validate(&self) -> Result<usize, RingError> {
        if self.block_size_bytes == 0 {
            return Err(RingError::ZeroBlockSize);
        }
        if self.num_blocks == 0 {
            return Err(RingError::ZeroBlocks);
        }
        match self.block_size_bytes.checked_mul(self.num_blocks) {
            Some(total) => Ok(total),
            None => Err(RingError::CapacityOverflow {
                block_size_bytes: self.block_size_bytes,
                num_blocks: self.num_blocks,
            }),
        }
    }

    /// Reads the configuration from [`BLOCK_SIZE_VAR`] and [`NUM_BLOCKS_VAR`].
    ///
    /// Unset variables fall back to the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for unparsable values and
    /// [`ConfigError::Ring`] if the resulting geometry is rejected.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            block_size_bytes: parse_var(&lookup, BLOCK_SIZE_VAR)?
                .unwrap_or(defaults.block_size_bytes),
            num_blocks: parse_var(&lookup, NUM_BLOCKS_VAR)?.unwrap_or(defaults.num_blocks),
        };
        config.validate()?;
        Ok(config)
    }
}

fn parse_var(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<usize>, ConfigError> {
    lookup(var)
        .map(|value| {
            value
                .trim()
                .parse::<usize>()
                .map_err(|_| ConfigError::Invalid { var, value })
        })
        .transpose()
}

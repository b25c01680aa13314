//! Heap configuration - arena geometry from TOML or environment

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::allocator::WORD_BYTES;
use crate::error::HeapError;

/// Arena size and embedder reservation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeapConfig {
    /// Total arena size in bytes
    #[serde(default = "default_arena_bytes")]
    pub arena_bytes: usize,

    /// Bytes at the arena base kept for the embedder, before the bitmap
    #[serde(default)]
    pub reserved_bytes: usize,
}

fn default_arena_bytes() -> usize {
    1024 * 1024 // 1MB
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self {
            arena_bytes: default_arena_bytes(),
            reserved_bytes: 0,
        }
    }
}

impl HeapConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, HeapError> {
        let content = fs::read_to_string(path)
            .map_err(|e| HeapError::Config(format!("Failed to read config: {}", e)))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse(content: &str) -> Result<Self, HeapError> {
        toml::from_str(content)
            .map_err(|e| HeapError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Defaults overridden by `MSGC_ARENA_BYTES` / `MSGC_RESERVED_BYTES`
    pub fn from_env() -> Result<Self, HeapError> {
        let mut config = Self::default();

        if let Ok(value) = std::env::var("MSGC_ARENA_BYTES") {
            config.arena_bytes = parse_bytes("MSGC_ARENA_BYTES", &value)?;
        }
        if let Ok(value) = std::env::var("MSGC_RESERVED_BYTES") {
            config.reserved_bytes = parse_bytes("MSGC_RESERVED_BYTES", &value)?;
        }

        Ok(config)
    }

    /// Check the geometry before any memory is allocated
    pub fn validate(&self) -> Result<(), HeapError> {
        if self.arena_bytes == 0 || self.arena_bytes % WORD_BYTES != 0 {
            return Err(HeapError::InvalidArenaSize { bytes: self.arena_bytes });
        }
        if self.reserved_bytes % WORD_BYTES != 0 || self.reserved_bytes >= self.arena_bytes {
            return Err(HeapError::InvalidHeapStart { offset: self.reserved_bytes as isize });
        }
        Ok(())
    }
}

fn parse_bytes(name: &str, value: &str) -> Result<usize, HeapError> {
    value
        .trim()
        .parse()
        .map_err(|e| HeapError::Config(format!("{}: invalid byte count '{}': {}", name, value, e)))
}

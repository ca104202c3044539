use super::{ChainStore, StoredBlock};
use crate::blockchain::Block;
use crate::config::ChainConfig;
use crate::error::StoreError;

/// Volatile store; used by tests and throwaway nodes.
#[derive(Debug, Default)]
pub struct MemoryStore {
    config: Option<ChainConfig>,
    blocks: Vec<StoredBlock>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChainStore for MemoryStore {
    fn load(&self) -> Result<Option<(ChainConfig, Vec<Block>)>, StoreError> {
        let Some(config) = self.config else {
            return Ok(None);
        };
        let blocks = self
            .blocks
            .iter()
            .cloned()
            .map(StoredBlock::into_block)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Some((config, blocks)))
    }

    fn write_config(&mut self, config: &ChainConfig) -> Result<(), StoreError> {
        self.config = Some(*config);
        Ok(())
    }

    fn append_block(&mut self, block: &Block) -> Result<(), StoreError> {
        self.blocks.push(StoredBlock::from_block(block));
        Ok(())
    }
}

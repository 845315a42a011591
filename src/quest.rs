use thiserror::Error;

use crate::common::SECTOR_SIZE;

pub const QUEST_DATA_LEN: usize = 0x10_0000;
pub const QUEST_DATA_SECTORS: u32 = (QUEST_DATA_LEN / SECTOR_SIZE) as u32;

const QUEST_MAGIC: &[u8; 3] = b"DXL";
const MIN_VERSION: u8 = 1;
const MAX_VERSION: u8 = 4;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QuestError {
    #[error("quest data must be 1 MiB, got {0} bytes")]
    Length(usize),
    #[error("quest data does not start with DXL")]
    Magic,
    #[error("unsupported quest data version {0}")]
    Version(u8),
}

/// A validated 1 MiB quest image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestData(Vec<u8>);

impl QuestData {
    pub fn new(bytes: Vec<u8>) -> Result<Self, QuestError> {
        if bytes.len() != QUEST_DATA_LEN {
            return Err(QuestError::Length(bytes.len()));
        }
        if &bytes[..3] != QUEST_MAGIC {
            return Err(QuestError::Magic);
        }
        if !(MIN_VERSION..=MAX_VERSION).contains(&bytes[3]) {
            return Err(QuestError::Version(bytes[3]));
        }
        Ok(Self(bytes))
    }

    pub fn version(&self) -> u8 {
        self.0[3]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

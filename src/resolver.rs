use std::ops::Range;

use tracing::debug;

use crate::common::Lba;
use crate::error::CrownError;
use crate::partition::PartitionRange;
use crate::quest::QUEST_DATA_SECTORS;

/// First sector the crown may ever occupy; sector 0 holds the MBR.
pub const RESERVED_START_LBA: Lba = 1;

/// Picks the crown sector: the last sector of the gap in front of the first
/// partition.
pub fn resolve_crown_lba(range: &PartitionRange, total_sectors: u32) -> Result<Lba, CrownError> {
    let start_lba = range.start_lba();
    if start_lba > total_sectors {
        return Err(CrownError::Malformed("partition starting past end of device"));
    }

    let available = start_lba.saturating_sub(RESERVED_START_LBA);
    if available < 1 {
        return Err(CrownError::NoSpace {
            limit: start_lba,
            needed: 1,
            available,
        });
    }

    let lba = start_lba - 1;
    debug!(lba, start_lba, "resolved crown sector");
    Ok(lba)
}

/// Sectors of the quest data area, which sits directly in front of the crown.
pub fn quest_region(crown_lba: Lba) -> Result<Range<Lba>, CrownError> {
    let available = crown_lba.saturating_sub(RESERVED_START_LBA);
    if available < QUEST_DATA_SECTORS {
        return Err(CrownError::NoSpace {
            limit: crown_lba,
            needed: QUEST_DATA_SECTORS,
            available,
        });
    }
    Ok(crown_lba - QUEST_DATA_SECTORS..crown_lba)
}

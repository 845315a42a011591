use std::ops::Range;

use tracing::{debug, trace};

use crate::common::{Lba, Sector, SECTOR_SIZE};
use crate::device::BlockDevice;
use crate::error::CrownError;
use crate::mbr_format::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PartitionEntry {
    pub boot_flag: u8,
    pub partition_type: u8,
    pub start_lba: u32,
    pub sector_count: u32,
}

impl PartitionEntry {
    pub fn new(partition_type: u8, start_lba: u32, sector_count: u32) -> Self {
        Self {
            boot_flag: 0,
            partition_type,
            start_lba,
            sector_count,
        }
    }

    /// Decodes one 16-byte table entry. CHS fields are ignored.
    pub fn parse(raw: &[u8]) -> Self {
        let le32 = |off: usize| u32::from_le_bytes([raw[off], raw[off + 1], raw[off + 2], raw[off + 3]]);
        Self {
            boot_flag: raw[ENTRY_BOOT_FLAG],
            partition_type: raw[ENTRY_TYPE],
            start_lba: le32(ENTRY_START_LBA),
            sector_count: le32(ENTRY_SECTOR_COUNT),
        }
    }

    pub fn encode(&self, raw: &mut [u8]) {
        raw[..PARTITION_ENTRY_SIZE].fill(0);
        raw[ENTRY_BOOT_FLAG] = self.boot_flag;
        raw[ENTRY_TYPE] = self.partition_type;
        raw[ENTRY_START_LBA..ENTRY_START_LBA + 4].copy_from_slice(&self.start_lba.to_le_bytes());
        raw[ENTRY_SECTOR_COUNT..ENTRY_SECTOR_COUNT + 4].copy_from_slice(&self.sector_count.to_le_bytes());
    }

    pub fn is_used(&self) -> bool {
        self.partition_type != PARTITION_TYPE_EMPTY
    }

    pub fn range(&self) -> Result<PartitionRange, CrownError> {
        if self.start_lba == MBR_LBA {
            return Err(CrownError::Malformed("partition entry overlapping the MBR"));
        }
        if self.sector_count == 0 {
            return Err(CrownError::Malformed("partition entry of zero length"));
        }
        let next_lba = self
            .start_lba
            .checked_add(self.sector_count)
            .ok_or(CrownError::Malformed("partition entry overflowing 32-bit LBA"))?;
        Ok(PartitionRange {
            start_lba: self.start_lba,
            next_lba,
        })
    }
}

/// Half-open `[start_lba, next_lba)` sector range of a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionRange {
    start_lba: Lba,
    next_lba: Lba,
}

impl PartitionRange {
    pub fn new(start_lba: Lba, next_lba: Lba) -> Option<Self> {
        (next_lba >= start_lba).then_some(Self { start_lba, next_lba })
    }

    pub fn start_lba(&self) -> Lba {
        self.start_lba
    }

    pub fn next_lba(&self) -> Lba {
        self.next_lba
    }

    pub fn contains(&self, lba: Lba) -> bool {
        self.start_lba <= lba && lba < self.next_lba
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionTable {
    entries: [PartitionEntry; PARTITION_ENTRY_COUNT],
}

impl PartitionTable {
    /// Decodes the four entries of an MBR sector. The `0x55AA` signature is
    /// not checked; cards that were never bootable frequently lack it.
    pub fn parse(mbr: &Sector) -> Self {
        let mut entries = [PartitionEntry::default(); PARTITION_ENTRY_COUNT];
        for (i, entry) in entries.iter_mut().enumerate() {
            let off = PARTITION_TABLE_OFFSET + i * PARTITION_ENTRY_SIZE;
            *entry = PartitionEntry::parse(&mbr[off..off + PARTITION_ENTRY_SIZE]);
        }
        Self { entries }
    }

    pub fn is_gpt_protective(&self) -> bool {
        self.entries
            .iter()
            .any(|e| e.partition_type == PARTITION_TYPE_GPT_PROTECTIVE)
    }

    fn first_used(&self) -> Option<&PartitionEntry> {
        self.entries.iter().find(|e| e.is_used())
    }

    /// The first used entry in table order.
    pub fn first_partition(&self) -> Result<PartitionRange, CrownError> {
        self.first_used().ok_or(CrownError::NoFirstPart)?.range()
    }

    // Malformed entries other than the first claim nothing.
    fn used_ranges(&self) -> impl Iterator<Item = PartitionRange> + '_ {
        self.entries
            .iter()
            .filter(|e| e.is_used())
            .filter_map(|e| e.range().ok())
    }

    /// Whether any used entry covers `lba`.
    pub fn claims(&self, lba: Lba) -> bool {
        self.used_ranges().any(|r| r.contains(lba))
    }

    /// Whether any used entry overlaps `range`.
    pub fn claims_range(&self, range: Range<Lba>) -> bool {
        self.used_ranges()
            .any(|r| r.start_lba < range.end && range.start < r.next_lba)
    }

    fn check_bounds(&self, total_sectors: u32) -> Result<(), CrownError> {
        if let Some(entry) = self.first_used() {
            if entry.range()?.next_lba > total_sectors {
                return Err(CrownError::Malformed("partition extending past end of device"));
            }
        }
        Ok(())
    }
}

pub fn is_gpt_header(sector: &Sector) -> bool {
    &sector[..GPT_SIGNATURE.len()] == GPT_SIGNATURE
}

/// Reads and classifies the partition table of `dev`.
pub fn scan_partition_table<D: BlockDevice + ?Sized>(dev: &mut D) -> Result<PartitionTable, CrownError> {
    let mut sector = [0u8; SECTOR_SIZE];
    dev.read_sector(MBR_LBA, &mut sector)
        .map_err(CrownError::reg_read("MBR"))?;

    let table = PartitionTable::parse(&sector);
    if table.is_gpt_protective() {
        debug!("protective MBR entry found");
        return Err(CrownError::IsGpt);
    }

    let total_sectors = dev.total_sectors();
    if total_sectors > GPT_HEADER_LBA {
        dev.read_sector(GPT_HEADER_LBA, &mut sector)
            .map_err(CrownError::reg_read("GPT header sector"))?;
        if is_gpt_header(&sector) {
            debug!("GPT header found in sector {}", GPT_HEADER_LBA);
            return Err(CrownError::IsGpt);
        }
    }

    table.check_bounds(total_sectors)?;
    trace!(?table, "scanned partition table");
    Ok(table)
}

/// Range of the first primary partition of `dev`.
pub fn scan_first_partition<D: BlockDevice + ?Sized>(dev: &mut D) -> Result<PartitionRange, CrownError> {
    scan_partition_table(dev)?.first_partition()
}

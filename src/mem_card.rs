use std::collections::BTreeMap;
use std::io;

use crate::common::{Lba, Sector, SECTOR_SIZE};
use crate::device::{BlockDevice, CardRegisters};
use crate::mbr_format::{BOOT_SIGNATURE, BOOT_SIGNATURE_OFFSET, PARTITION_ENTRY_SIZE, PARTITION_TABLE_OFFSET};
use crate::partition::PartitionEntry;
use crate::registers::{Cid, Csd, Ssr};

/// In-memory card. Sectors that were never written read back as zeros, so a
/// multi-gigabyte card costs only the sectors actually touched.
pub struct MemCard {
    pub sectors: BTreeMap<Lba, Sector>,
    pub total_sectors: u32,
    pub cid: Cid,
    pub csd: Csd,
    pub ssr: Ssr,
    /// LBAs passed to `write_sector`, in call order.
    pub writes: Vec<Lba>,
    pub fail_init: bool,
    pub fail_registers: bool,
    pub fail_reads: bool,
    pub fail_writes: bool,
}

fn injected(what: &str) -> io::Error {
    io::Error::new(io::ErrorKind::Other, format!("injected {what} failure"))
}

impl MemCard {
    pub fn new(total_sectors: u32, cid: Cid, csd: Csd, ssr: Ssr) -> Self {
        Self {
            sectors: BTreeMap::new(),
            total_sectors,
            cid,
            csd,
            ssr,
            writes: Vec::new(),
            fail_init: false,
            fail_registers: false,
            fail_reads: false,
            fail_writes: false,
        }
    }

    /// Lays down an MBR in sector 0 holding `entries` in table order.
    pub fn with_mbr(mut self, entries: &[PartitionEntry]) -> Self {
        let mut mbr = [0u8; SECTOR_SIZE];
        for (i, entry) in entries.iter().take(4).enumerate() {
            let off = PARTITION_TABLE_OFFSET + i * PARTITION_ENTRY_SIZE;
            entry.encode(&mut mbr[off..off + PARTITION_ENTRY_SIZE]);
        }
        mbr[BOOT_SIGNATURE_OFFSET..BOOT_SIGNATURE_OFFSET + 2].copy_from_slice(&BOOT_SIGNATURE);
        self.sectors.insert(0, mbr);
        self
    }

    pub fn sector(&self, lba: Lba) -> Sector {
        self.sectors.get(&lba).copied().unwrap_or([0u8; SECTOR_SIZE])
    }

    pub fn set_sector(&mut self, lba: Lba, data: Sector) {
        self.sectors.insert(lba, data);
    }

    fn check_range(&self, lba: Lba) -> io::Result<()> {
        if lba >= self.total_sectors {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("LBA {lba} beyond end of card ({} sectors)", self.total_sectors),
            ));
        }
        Ok(())
    }
}

impl BlockDevice for MemCard {
    fn read_sector(&mut self, lba: Lba, buf: &mut Sector) -> io::Result<()> {
        if self.fail_reads {
            return Err(injected("read"));
        }
        self.check_range(lba)?;
        *buf = self.sector(lba);
        Ok(())
    }

    fn write_sector(&mut self, lba: Lba, data: &Sector) -> io::Result<()> {
        if self.fail_writes {
            return Err(injected("write"));
        }
        self.check_range(lba)?;
        self.sectors.insert(lba, *data);
        self.writes.push(lba);
        Ok(())
    }

    fn total_sectors(&self) -> u32 {
        self.total_sectors
    }
}

impl CardRegisters for MemCard {
    fn init(&mut self) -> io::Result<()> {
        if self.fail_init {
            return Err(injected("init"));
        }
        Ok(())
    }

    fn read_cid(&mut self) -> io::Result<Cid> {
        if self.fail_registers {
            return Err(injected("CID"));
        }
        Ok(self.cid)
    }

    fn read_csd(&mut self) -> io::Result<Csd> {
        if self.fail_registers {
            return Err(injected("CSD"));
        }
        Ok(self.csd)
    }

    fn read_ssr(&mut self) -> io::Result<Ssr> {
        if self.fail_registers {
            return Err(injected("SSR"));
        }
        Ok(self.ssr)
    }
}

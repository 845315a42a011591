use std::ops::Range;

use tracing::{debug, info};

use crate::common::{Lba, SECTOR_SIZE};
use crate::device::Card;
use crate::error::{CrownError, Status};
use crate::partition::{scan_partition_table, PartitionTable};
use crate::quest::{QuestData, QUEST_DATA_LEN, QUEST_DATA_SECTORS};
use crate::registers::{Cid, Csd, Ssr};
use crate::resolver::{quest_region, resolve_crown_lba};
use crate::security_sector::{generate_security_sector, validate_security_sector};

/// Drives the crown operations against one card.
///
/// Every operation re-reads the partition table: a crown LBA is only good for
/// the run that computed it.
pub struct CodeCrown<C: Card> {
    card: C,
}

impl<C: Card> CodeCrown<C> {
    pub fn new(card: C) -> Self {
        Self { card }
    }

    pub fn into_inner(self) -> C {
        self.card
    }

    fn init(&mut self) -> Result<(), CrownError> {
        self.card.init().map_err(CrownError::CardInit)
    }

    fn read_registers(&mut self) -> Result<(Cid, Csd, Ssr), CrownError> {
        let cid = self.card.read_cid().map_err(CrownError::reg_read("CID"))?;
        let csd = self.card.read_csd().map_err(CrownError::reg_read("CSD"))?;
        let ssr = self.card.read_ssr().map_err(CrownError::reg_read("SSR"))?;
        debug!(%cid, %csd, %ssr, "read card registers");
        Ok((cid, csd, ssr))
    }

    fn scan(&mut self) -> Result<(PartitionTable, Lba), CrownError> {
        let table = scan_partition_table(&mut self.card)?;
        let first = table.first_partition()?;
        let lba = resolve_crown_lba(&first, self.card.total_sectors())?;
        // Table order says nothing about disk order; another entry may sit in the gap.
        if table.claims(lba) {
            return Err(CrownError::NoSpace {
                limit: first.start_lba(),
                needed: 1,
                available: 0,
            });
        }
        Ok((table, lba))
    }

    /// Finds the crown sector without touching the card's contents.
    pub fn locate(&mut self) -> Result<Lba, CrownError> {
        Ok(self.scan()?.1)
    }

    /// Sectors of the quest data area, refused when any partition reaches into them.
    pub fn locate_quest_region(&mut self) -> Result<Range<Lba>, CrownError> {
        let (table, crown_lba) = self.scan()?;
        let region = quest_region(crown_lba)?;
        if table.claims_range(region.clone()) {
            return Err(CrownError::NoSpace {
                limit: crown_lba,
                needed: QUEST_DATA_SECTORS,
                available: 0,
            });
        }
        Ok(region)
    }

    /// Writes the security sector and returns where it went.
    pub fn create(&mut self) -> Result<Lba, CrownError> {
        self.init()?;
        let lba = self.locate()?;
        let (cid, csd, ssr) = self.read_registers()?;
        let sector = generate_security_sector(&cid, &csd, &ssr)?;
        self.card
            .write_sector(lba, &sector)
            .map_err(|source| CrownError::Eio { lba, source })?;
        info!(lba, "wrote crown sector");
        Ok(lba)
    }

    pub fn verify(&mut self) -> Result<bool, CrownError> {
        self.init()?;
        let lba = self.locate()?;
        let (cid, csd, ssr) = self.read_registers()?;
        let mut sector = [0u8; SECTOR_SIZE];
        self.card
            .read_sector(lba, &mut sector)
            .map_err(CrownError::reg_read("crown sector"))?;
        validate_security_sector(&sector, &cid, &csd, &ssr)
    }

    /// Raw contents of the quest data area, unvalidated.
    pub fn read_quest_data(&mut self) -> Result<Vec<u8>, CrownError> {
        self.init()?;
        let region = self.locate_quest_region()?;
        let mut data = Vec::with_capacity(QUEST_DATA_LEN);
        let mut sector = [0u8; SECTOR_SIZE];
        for lba in region {
            self.card
                .read_sector(lba, &mut sector)
                .map_err(CrownError::reg_read("quest data"))?;
            data.extend_from_slice(&sector);
        }
        Ok(data)
    }

    pub fn write_quest_data(&mut self, quest: &QuestData) -> Result<(), CrownError> {
        self.init()?;
        let region = self.locate_quest_region()?;
        let mut sector = [0u8; SECTOR_SIZE];
        for (lba, chunk) in region.zip(quest.as_bytes().chunks_exact(SECTOR_SIZE)) {
            sector.copy_from_slice(chunk);
            self.card
                .write_sector(lba, &sector)
                .map_err(|source| CrownError::Eio { lba, source })?;
        }
        info!(version = quest.version(), "wrote quest data");
        Ok(())
    }
}

/// Locates the crown sector on `card` and writes the card's security sector
/// there, reporting the outcome as a single status code.
pub fn resolve_and_write_crown<C: Card>(card: C) -> Status {
    let result = CodeCrown::new(card).create();
    if let Err(err) = &result {
        debug!(error = %err, "crown run failed");
    }
    Status::from(&result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::SSR_LEN;
    use crate::mem_card::MemCard;
    use crate::partition::PartitionEntry;
    use pretty_assertions::assert_eq;

    fn card(entries: &[PartitionEntry]) -> MemCard {
        let cid = Cid::from_hex("035344534333324780123456780156ff").unwrap();
        let csd = Csd::from_hex("002600325f5983c8addbcfffd24040a5").unwrap();
        let ssr = Ssr([0x11; SSR_LEN]);
        MemCard::new(1_000_000, cid, csd, ssr).with_mbr(entries)
    }

    #[test]
    fn test_create_writes_one_sector() {
        let mut card = card(&[PartitionEntry::new(0x0C, 2048, 500_000)]);
        assert_eq!(resolve_and_write_crown(&mut card), Status::Ok);
        assert_eq!(card.writes, vec![2047]);
        let expected = generate_security_sector(&card.cid, &card.csd, &card.ssr).unwrap();
        assert_eq!(card.sector(2047), expected);
    }

    #[test]
    fn test_each_failure_leaves_card_untouched() {
        let cases: Vec<(Box<dyn Fn(&mut MemCard)>, Status)> = vec![
            (Box::new(|c: &mut MemCard| c.fail_init = true), Status::CardInit),
            (Box::new(|c: &mut MemCard| c.fail_reads = true), Status::RegReadError),
            (Box::new(|c: &mut MemCard| c.fail_registers = true), Status::RegReadError),
            (Box::new(|c: &mut MemCard| c.csd.0[0] = 0x80), Status::CsdVer),
            (Box::new(|c: &mut MemCard| *c = card(&[])), Status::NoFirstPart),
            (Box::new(|c: &mut MemCard| *c = card(&[PartitionEntry::new(0xEE, 1, 999_999)])), Status::IsGpt),
            (Box::new(|c: &mut MemCard| *c = card(&[PartitionEntry::new(0x0C, 1, 1000)])), Status::NoSpace),
        ];
        for (setup, status) in cases {
            let mut card = card(&[PartitionEntry::new(0x0C, 2048, 500_000)]);
            setup(&mut card);
            assert_eq!(resolve_and_write_crown(&mut card), status);
            assert!(card.writes.is_empty(), "{status}");
        }
    }

    #[test]
    fn test_write_failure_is_eio() {
        let mut card = card(&[PartitionEntry::new(0x0C, 2048, 500_000)]);
        card.fail_writes = true;
        assert_eq!(resolve_and_write_crown(&mut card), Status::Eio);
    }

    #[test]
    fn test_gap_claimed_by_other_entry() {
        let mut card = card(&[
            PartitionEntry::new(0x0C, 2048, 500_000),
            PartitionEntry::new(0x83, 1024, 1024),
        ]);
        assert_eq!(resolve_and_write_crown(&mut card), Status::NoSpace);
    }

    #[test]
    fn test_quest_region_claimed_by_other_entry() {
        let mut card = card(&[
            PartitionEntry::new(0x0C, 8192, 500_000),
            PartitionEntry::new(0x83, 7000, 100),
        ]);
        let mut raw = vec![0u8; QUEST_DATA_LEN];
        raw[..4].copy_from_slice(b"DXL\x01");
        let quest = QuestData::new(raw).unwrap();

        let result = CodeCrown::new(&mut card).write_quest_data(&quest);
        assert!(matches!(result, Err(CrownError::NoSpace { limit: 8191, .. })));
        let result = CodeCrown::new(&mut card).read_quest_data();
        assert!(matches!(result, Err(CrownError::NoSpace { .. })));
        assert!(card.writes.is_empty());

        // The crown sector itself is still free.
        assert_eq!(CodeCrown::new(&mut card).locate().unwrap(), 8191);
    }

    #[test]
    fn test_locate_is_idempotent() {
        let mut crown = CodeCrown::new(card(&[PartitionEntry::new(0x0C, 8192, 500_000)]));
        assert_eq!(crown.locate().unwrap(), 8191);
        assert_eq!(crown.locate().unwrap(), 8191);
        assert!(crown.into_inner().writes.is_empty());
    }

    #[test]
    fn test_verify() {
        let mut card = card(&[PartitionEntry::new(0x0C, 2048, 500_000)]);
        assert!(!CodeCrown::new(&mut card).verify().unwrap());
        CodeCrown::new(&mut card).create().unwrap();
        assert!(CodeCrown::new(&mut card).verify().unwrap());

        // A crown copied onto a different card does not verify.
        card.cid.0[9] ^= 0x40;
        assert!(!CodeCrown::new(&mut card).verify().unwrap());
    }

    #[test]
    fn test_quest_data_round_trip() {
        let mut card = card(&[PartitionEntry::new(0x0C, 8192, 500_000)]);
        let mut raw = vec![0u8; QUEST_DATA_LEN];
        raw[..4].copy_from_slice(b"DXL\x02");
        raw[QUEST_DATA_LEN - 1] = 0x7E;
        let quest = QuestData::new(raw.clone()).unwrap();

        CodeCrown::new(&mut card).write_quest_data(&quest).unwrap();
        assert_eq!(card.writes.len(), QUEST_DATA_SECTORS as usize);
        assert_eq!(card.writes.first(), Some(&(8191 - QUEST_DATA_SECTORS)));
        assert_eq!(card.writes.last(), Some(&8190));

        let dumped = CodeCrown::new(&mut card).read_quest_data().unwrap();
        assert!(dumped == raw);
    }

    #[test]
    fn test_quest_data_needs_room() {
        let mut card = card(&[PartitionEntry::new(0x0C, 2048, 500_000)]);
        let result = CodeCrown::new(&mut card).read_quest_data();
        assert!(matches!(result, Err(CrownError::NoSpace { .. })));
    }
}

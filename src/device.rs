use std::io;

use crate::common::{Lba, Sector};
use crate::registers::{Cid, Csd, Ssr};

/// Sector-granular access to the card's storage.
pub trait BlockDevice {
    /// Read exactly one sector at `lba` into `buf`.
    fn read_sector(&mut self, lba: Lba, buf: &mut Sector) -> io::Result<()>;
    /// Write exactly one sector from `data` to `lba`.
    fn write_sector(&mut self, lba: Lba, data: &Sector) -> io::Result<()>;
    /// Number of addressable 512-byte sectors.
    fn total_sectors(&self) -> u32;
}

/// Access to the card's identification registers.
pub trait CardRegisters {
    fn init(&mut self) -> io::Result<()>;
    fn read_cid(&mut self) -> io::Result<Cid>;
    fn read_csd(&mut self) -> io::Result<Csd>;
    fn read_ssr(&mut self) -> io::Result<Ssr>;
}

/// A card exposes both its storage and its registers.
pub trait Card: BlockDevice + CardRegisters {}

impl<T: BlockDevice + CardRegisters> Card for T {}

impl<T: BlockDevice + ?Sized> BlockDevice for &mut T {
    fn read_sector(&mut self, lba: Lba, buf: &mut Sector) -> io::Result<()> {
        (**self).read_sector(lba, buf)
    }

    fn write_sector(&mut self, lba: Lba, data: &Sector) -> io::Result<()> {
        (**self).write_sector(lba, data)
    }

    fn total_sectors(&self) -> u32 {
        (**self).total_sectors()
    }
}

impl<T: CardRegisters + ?Sized> CardRegisters for &mut T {
    fn init(&mut self) -> io::Result<()> {
        (**self).init()
    }

    fn read_cid(&mut self) -> io::Result<Cid> {
        (**self).read_cid()
    }

    fn read_csd(&mut self) -> io::Result<Csd> {
        (**self).read_csd()
    }

    fn read_ssr(&mut self) -> io::Result<Ssr> {
        (**self).read_ssr()
    }
}

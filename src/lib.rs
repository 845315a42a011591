pub mod common;
pub mod crc;
pub mod crown;
pub mod device;
pub mod error;
pub mod host_disk;
pub mod mbr_format;
#[cfg(any(test, feature = "test-util"))]
pub mod mem_card;
pub mod partition;
pub mod quest;
pub mod registers;
pub mod resolver;
pub mod security_sector;

pub use common::{Lba, Sector, SECTOR_SIZE};
pub use crown::{resolve_and_write_crown, CodeCrown};
pub use device::{BlockDevice, Card, CardRegisters};
pub use error::{CrownError, Status};
pub use registers::{Cid, Csd, Ssr};

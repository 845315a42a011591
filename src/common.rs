pub const SECTOR_SIZE: usize = 512;

pub const CID_LEN: usize = 16;
pub const CSD_LEN: usize = 16;
pub const SSR_LEN: usize = 64;

pub type Lba = u32;
pub type Sector = [u8; SECTOR_SIZE];

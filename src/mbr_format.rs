pub const MBR_LBA: u32 = 0;
pub const GPT_HEADER_LBA: u32 = 1;

pub const PARTITION_TABLE_OFFSET: usize = 0x1BE;
pub const PARTITION_ENTRY_SIZE: usize = 16;
pub const PARTITION_ENTRY_COUNT: usize = 4;

// Offsets inside one partition entry.
pub const ENTRY_BOOT_FLAG: usize = 0;
pub const ENTRY_TYPE: usize = 4;
pub const ENTRY_START_LBA: usize = 8;
pub const ENTRY_SECTOR_COUNT: usize = 12;

pub const BOOT_SIGNATURE_OFFSET: usize = 0x1FE;
pub const BOOT_SIGNATURE: [u8; 2] = [0x55, 0xAA];

pub const PARTITION_TYPE_EMPTY: u8 = 0x00;
pub const PARTITION_TYPE_GPT_PROTECTIVE: u8 = 0xEE;

pub const GPT_SIGNATURE: &[u8; 8] = b"EFI PART";

use std::fmt;

use hex::FromHexError;

use crate::common::{CID_LEN, CSD_LEN, SSR_LEN};
use crate::crc::crc7;
use crate::error::CrownError;

fn parse_hex<const N: usize>(s: &str) -> Result<[u8; N], FromHexError> {
    let digits: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    let mut buf = [0u8; N];
    hex::decode_to_slice(digits, &mut buf)?;
    Ok(buf)
}

// Reorders a 16-byte R2 register the way the crown algorithm consumes it:
// freshly computed CRC7 first, then bytes 14..=0. Some readers report a bogus
// CRC byte, so the card's own byte 15 is never trusted.
fn algorithm_order(raw: &[u8; 16]) -> [u8; 16] {
    let mut out = [0u8; 16];
    out[0] = crc7::value(&raw[..15]);
    for i in 1..16 {
        out[i] = raw[15 - i];
    }
    out
}

// Registers are stored in transmit order, data[0] holds bits 127..120.
/// Card Identification register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cid(pub [u8; CID_LEN]);

impl Cid {
    pub fn from_hex(s: &str) -> Result<Self, FromHexError> {
        parse_hex(s).map(Cid)
    }

    pub fn manufacturer_id(&self) -> u8 {
        self.0[0]
    }

    pub fn oem_id(&self) -> String {
        String::from_utf8_lossy(&self.0[1..3]).into_owned()
    }

    pub fn product_name(&self) -> String {
        String::from_utf8_lossy(&self.0[3..8]).into_owned()
    }

    /// Product revision as (major, minor).
    pub fn product_revision(&self) -> (u8, u8) {
        (self.0[8] >> 4, self.0[8] & 0x0F)
    }

    pub fn serial_number(&self) -> u32 {
        u32::from_be_bytes([self.0[9], self.0[10], self.0[11], self.0[12]])
    }

    /// Manufacturing date as (year, month).
    pub fn manufacturing_date(&self) -> (u16, u8) {
        let year = (((self.0[13] & 0x0F) << 4) | (self.0[14] >> 4)) as u16 + 2000;
        (year, self.0[14] & 0x0F)
    }

    pub fn algorithm_order(&self) -> [u8; CID_LEN] {
        algorithm_order(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsdVersion {
    /// CSD 1.0, standard capacity cards.
    V1,
    /// CSD 2.0, high and extended capacity cards.
    V2,
}

/// Card-Specific Data register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Csd(pub [u8; CSD_LEN]);

impl Csd {
    pub fn from_hex(s: &str) -> Result<Self, FromHexError> {
        parse_hex(s).map(Csd)
    }

    /// Raw CSD_STRUCTURE field, bits 127..126.
    pub fn structure(&self) -> u8 {
        self.0[0] >> 6
    }

    pub fn version(&self) -> Result<CsdVersion, CrownError> {
        match self.structure() {
            0 => Ok(CsdVersion::V1),
            1 => Ok(CsdVersion::V2),
            other => Err(CrownError::CsdVer(other)),
        }
    }

    /// READ_BL_LEN, log2 of the maximum read block length.
    pub fn read_block_length(&self) -> u8 {
        self.0[5] & 0x0F
    }

    /// Card capacity in 512-byte blocks.
    pub fn capacity_blocks(&self) -> Result<u64, CrownError> {
        match self.version()? {
            CsdVersion::V1 => {
                let c_size = (((self.0[6] & 0x03) as u64) << 10)
                    | ((self.0[7] as u64) << 2)
                    | ((self.0[8] >> 6) as u64);
                let c_size_mult = ((self.0[9] & 0x03) << 1) | (self.0[10] >> 7);
                let bytes = (c_size + 1) << (c_size_mult as u32 + 2 + self.read_block_length() as u32);
                Ok(bytes / 512)
            }
            CsdVersion::V2 => {
                let c_size = (((self.0[7] & 0x3F) as u64) << 16)
                    | ((self.0[8] as u64) << 8)
                    | self.0[9] as u64;
                Ok((c_size + 1) * 1024)
            }
        }
    }

    pub fn algorithm_order(&self) -> [u8; CSD_LEN] {
        algorithm_order(&self.0)
    }
}

/// SD Status register (ACMD13).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ssr(pub [u8; SSR_LEN]);

impl Ssr {
    pub fn from_hex(s: &str) -> Result<Self, FromHexError> {
        parse_hex(s).map(Ssr)
    }

    /// DAT_BUS_WIDTH in data lines (1 or 4); 0 when the field is reserved.
    pub fn bus_width(&self) -> u8 {
        match self.0[0] >> 6 {
            0 => 1,
            2 => 4,
            _ => 0,
        }
    }

    pub fn card_type(&self) -> u16 {
        u16::from_be_bytes([self.0[2], self.0[3]])
    }

    pub fn speed_class(&self) -> u8 {
        self.0[8]
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Display for Csd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Display for Ssr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

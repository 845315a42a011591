pub mod crc7 {
    // SD command/register CRC: polynomial x^7 + x^3 + 1, MSB-first, init 0.
    const POLY: u8 = 0x09;

    #[inline]
    fn update_byte(mut crc: u8, mut b: u8) -> u8 {
        for _ in 0..8 {
            crc <<= 1;
            if ((b & 0x80) ^ (crc & 0x80)) != 0 {
                crc ^= POLY;
            }
            b <<= 1;
        }
        crc
    }

    // Returns the CRC in the form it is transmitted: CRC in bits 7..1, end bit set.
    #[inline]
    pub fn value(data: &[u8]) -> u8 {
        let mut crc = 0u8;
        for &b in data {
            crc = update_byte(crc, b);
        }
        (crc << 1) | 1
    }
}

pub mod crc32c {
    // Reflected polynomial for CRC32C (Castagnoli).
    // init = 0xFFFF_FFFF, process LSB-first, xorout = 0xFFFF_FFFF.
    const POLY_REFLECTED: u32 = 0x82F6_3B78;

    #[inline]
    fn update_byte(mut crc: u32, b: u8) -> u32 {
        crc ^= b as u32;
        for _ in 0..8 {
            let mask = (crc & 1).wrapping_neg() & POLY_REFLECTED;
            crc = (crc >> 1) ^ mask;
        }
        crc
    }

    #[inline]
    pub fn value(data: &[u8]) -> u32 {
        extend(0, data)
    }

    // Extend a prior CRC with more bytes (i.e., crc(data0 || data1)).
    #[inline]
    pub fn extend(initial_crc: u32, data: &[u8]) -> u32 {
        let mut crc = initial_crc ^ 0xFFFF_FFFF;
        for &b in data {
            crc = update_byte(crc, b);
        }
        crc ^ 0xFFFF_FFFF
    }
}

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use crate::common::{Sector, SECTOR_SIZE};
use crate::crc::crc32c;
use crate::error::CrownError;
use crate::registers::{Cid, Csd, Ssr};

const MAGIC: &[u8; 16] = b"BGSASTNHOD01A02I";
pub const PAYLOAD_LEN: usize = MAGIC.len() + 3;

fn ssr_sum(ssr: &Ssr) -> u16 {
    ssr.0[2..14]
        .iter()
        .fold(0u16, |acc, &b| acc.wrapping_add(b as u16))
}

// 19 bytes at offset cid'[0]: MAGIC ^ cid', then low(ssr_sum) ^ cid'[0],
// high(ssr_sum) ^ csd'[0] and cid'[0] ^ csd'[0].
fn payload(cid: &Cid, csd: &Csd, ssr: &Ssr) -> (usize, [u8; PAYLOAD_LEN]) {
    let cid = cid.algorithm_order();
    let csd = csd.algorithm_order();
    let sum = ssr_sum(ssr);

    let mut out = [0u8; PAYLOAD_LEN];
    for (i, (m, c)) in MAGIC.iter().zip(cid.iter()).enumerate() {
        out[i] = m ^ c;
    }
    out[0x10] = (sum as u8) ^ cid[0];
    out[0x11] = ((sum >> 8) as u8) ^ csd[0];
    out[0x12] = cid[0] ^ csd[0];
    (cid[0] as usize, out)
}

fn filler_seed(cid: &Cid, csd: &Csd, ssr: &Ssr) -> u64 {
    let forward = crc32c::extend(crc32c::extend(crc32c::value(&cid.0), &csd.0), &ssr.0);
    let backward = crc32c::extend(crc32c::extend(crc32c::value(&ssr.0), &csd.0), &cid.0);
    (u64::from(forward) << 32) | u64::from(backward)
}

/// Builds the crown sector for a card.
///
/// Fails with `CsdVer` before producing anything when the CSD structure is not
/// one this crate knows how to read.
pub fn generate_security_sector(cid: &Cid, csd: &Csd, ssr: &Ssr) -> Result<Sector, CrownError> {
    csd.version()?;

    let mut sector = [0u8; SECTOR_SIZE];
    StdRng::seed_from_u64(filler_seed(cid, csd, ssr)).fill_bytes(&mut sector);

    let (offset, payload) = payload(cid, csd, ssr);
    sector[offset..offset + PAYLOAD_LEN].copy_from_slice(&payload);
    Ok(sector)
}

/// Checks the payload of a crown sector against a card's registers. Filler
/// bytes are not compared, so sectors written by other tools still verify.
pub fn validate_security_sector(sector: &Sector, cid: &Cid, csd: &Csd, ssr: &Ssr) -> Result<bool, CrownError> {
    csd.version()?;
    let (offset, payload) = payload(cid, csd, ssr);
    Ok(sector[offset..offset + PAYLOAD_LEN] == payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::SSR_LEN;
    use pretty_assertions::assert_eq;

    fn fixtures() -> (Cid, Csd, Ssr) {
        let cid = Cid::from_hex("035344534333324780123456780156ff").unwrap();
        let csd = Csd::from_hex("400e00325b59000076b27f800a404000").unwrap();
        let mut ssr = [0u8; SSR_LEN];
        for (i, b) in ssr.iter_mut().enumerate() {
            *b = (i as u8).wrapping_mul(37).wrapping_add(11);
        }
        (cid, csd, Ssr(ssr))
    }

    #[test]
    fn test_deterministic() {
        let (cid, csd, ssr) = fixtures();
        let a = generate_security_sector(&cid, &csd, &ssr).unwrap();
        let b = generate_security_sector(&cid, &csd, &ssr).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_payload_layout() {
        let (cid, csd, ssr) = fixtures();
        let sector = generate_security_sector(&cid, &csd, &ssr).unwrap();
        let cid_o = cid.algorithm_order();
        let csd_o = csd.algorithm_order();
        let off = cid_o[0] as usize;

        assert_eq!(sector[off] ^ cid_o[0], b'B');
        assert_eq!(sector[off + 15] ^ cid_o[15], b'I');
        let sum = ssr_sum(&ssr);
        assert_eq!(sector[off + 0x10], sum as u8 ^ cid_o[0]);
        assert_eq!(sector[off + 0x11], (sum >> 8) as u8 ^ csd_o[0]);
        assert_eq!(sector[off + 0x12], cid_o[0] ^ csd_o[0]);
    }

    #[test]
    fn test_ssr_sum_covers_bytes_2_to_13() {
        let mut raw = [0xFFu8; SSR_LEN];
        raw[2..14].fill(1);
        assert_eq!(ssr_sum(&Ssr(raw)), 12);
        assert_eq!(ssr_sum(&Ssr([0xFF; SSR_LEN])), 12 * 0xFF);
    }

    #[test]
    fn test_every_input_bit_matters() {
        let (cid, csd, ssr) = fixtures();
        let base = generate_security_sector(&cid, &csd, &ssr).unwrap();

        for byte in 0..16 {
            for bit in 0..8 {
                let mut flipped = cid;
                flipped.0[byte] ^= 1 << bit;
                let out = generate_security_sector(&flipped, &csd, &ssr).unwrap();
                assert_ne!(out, base, "CID byte {byte} bit {bit}");
            }
        }
        for byte in 0..16 {
            for bit in 0..8 {
                let mut flipped = csd;
                flipped.0[byte] ^= 1 << bit;
                match generate_security_sector(&cid, &flipped, &ssr) {
                    Ok(out) => assert_ne!(out, base, "CSD byte {byte} bit {bit}"),
                    Err(err) => assert!(matches!(err, CrownError::CsdVer(_))),
                }
            }
        }
        for byte in 0..SSR_LEN {
            for bit in 0..8 {
                let mut flipped = ssr;
                flipped.0[byte] ^= 1 << bit;
                let out = generate_security_sector(&cid, &csd, &flipped).unwrap();
                assert_ne!(out, base, "SSR byte {byte} bit {bit}");
            }
        }
    }

    #[test]
    fn test_unknown_csd_structure() {
        let (cid, mut csd, ssr) = fixtures();
        csd.0[0] = 0x80 | (csd.0[0] & 0x3F);
        assert!(matches!(
            generate_security_sector(&cid, &csd, &ssr),
            Err(CrownError::CsdVer(2))
        ));
        csd.0[0] |= 0xC0;
        assert!(matches!(
            validate_security_sector(&[0; SECTOR_SIZE], &cid, &csd, &ssr),
            Err(CrownError::CsdVer(3))
        ));
    }

    #[test]
    fn test_validate() {
        let (cid, csd, ssr) = fixtures();
        let mut sector = generate_security_sector(&cid, &csd, &ssr).unwrap();
        assert!(validate_security_sector(&sector, &cid, &csd, &ssr).unwrap());

        let off = cid.algorithm_order()[0] as usize;
        // Filler is not part of the check.
        let outside = if off >= PAYLOAD_LEN { 0 } else { SECTOR_SIZE - 1 };
        sector[outside] ^= 0xFF;
        assert!(validate_security_sector(&sector, &cid, &csd, &ssr).unwrap());

        sector[off + 0x12] ^= 0x01;
        assert!(!validate_security_sector(&sector, &cid, &csd, &ssr).unwrap());
    }

    #[test]
    fn test_validate_rejects_other_card() {
        let (cid, csd, ssr) = fixtures();
        let sector = generate_security_sector(&cid, &csd, &ssr).unwrap();
        let mut other = cid;
        other.0[12] ^= 0x01;
        assert!(!validate_security_sector(&sector, &other, &csd, &ssr).unwrap());
    }
}

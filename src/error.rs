use std::fmt;
use std::io;

use thiserror::Error;

use crate::common::Lba;

/// Outcome of a crown run. The numeric values are stable and double as
/// process exit codes.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok = 0,
    RegReadError = 1,
    IsGpt = 2,
    NoFirstPart = 3,
    NoSpace = 4,
    Eio = 5,
    CsdVer = 6,
    CardInit = 7,
}

impl Status {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::RegReadError => "REG_READ_ERROR",
            Status::IsGpt => "IS_GPT",
            Status::NoFirstPart => "NO_FIRST_PART",
            Status::NoSpace => "NO_SPACE",
            Status::Eio => "EIO",
            Status::CsdVer => "CSD_VER",
            Status::CardInit => "CARD_INIT",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl<T> From<&Result<T, CrownError>> for Status {
    fn from(result: &Result<T, CrownError>) -> Self {
        match result {
            Ok(_) => Status::Ok,
            Err(err) => err.status(),
        }
    }
}

#[derive(Debug, Error)]
pub enum CrownError {
    #[error("card failed to initialize")]
    CardInit(#[source] io::Error),

    #[error("failed to read {what}")]
    RegRead {
        what: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("malformed {0}")]
    Malformed(&'static str),

    #[error("device uses a GPT partition table")]
    IsGpt,

    #[error("MBR does not contain a primary partition")]
    NoFirstPart,

    #[error("need {needed} free sectors before LBA {limit}, found {available}")]
    NoSpace {
        limit: Lba,
        needed: u32,
        available: u32,
    },

    #[error("unrecognized CSD structure version {0}")]
    CsdVer(u8),

    #[error("failed to write sector {lba}")]
    Eio {
        lba: Lba,
        #[source]
        source: io::Error,
    },
}

impl CrownError {
    pub fn status(&self) -> Status {
        match self {
            CrownError::CardInit(_) => Status::CardInit,
            CrownError::RegRead { .. } | CrownError::Malformed(_) => Status::RegReadError,
            CrownError::IsGpt => Status::IsGpt,
            CrownError::NoFirstPart => Status::NoFirstPart,
            CrownError::NoSpace { .. } => Status::NoSpace,
            CrownError::CsdVer(_) => Status::CsdVer,
            CrownError::Eio { .. } => Status::Eio,
        }
    }

    pub(crate) fn reg_read(what: &'static str) -> impl FnOnce(io::Error) -> CrownError {
        move |source| CrownError::RegRead { what, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_are_stable() {
        let all = [
            Status::Ok,
            Status::RegReadError,
            Status::IsGpt,
            Status::NoFirstPart,
            Status::NoSpace,
            Status::Eio,
            Status::CsdVer,
            Status::CardInit,
        ];
        for (i, status) in all.iter().enumerate() {
            assert_eq!(status.code() as usize, i);
        }
        assert_eq!(Status::NoFirstPart.to_string(), "NO_FIRST_PART");
    }

    #[test]
    fn test_each_error_maps_to_one_status() {
        let other = || io::Error::new(io::ErrorKind::Other, "boom");
        assert_eq!(CrownError::CardInit(other()).status(), Status::CardInit);
        assert_eq!(CrownError::reg_read("CID")(other()).status(), Status::RegReadError);
        assert_eq!(CrownError::Malformed("MBR").status(), Status::RegReadError);
        assert_eq!(CrownError::IsGpt.status(), Status::IsGpt);
        assert_eq!(CrownError::NoFirstPart.status(), Status::NoFirstPart);
        let no_space = CrownError::NoSpace {
            limit: 1,
            needed: 1,
            available: 0,
        };
        assert_eq!(no_space.status(), Status::NoSpace);
        assert_eq!(CrownError::CsdVer(2).status(), Status::CsdVer);
        let eio = CrownError::Eio {
            lba: 7,
            source: other(),
        };
        assert_eq!(eio.status(), Status::Eio);
    }

    #[test]
    fn test_status_from_result() {
        let ok: Result<u32, CrownError> = Ok(3);
        let err: Result<u32, CrownError> = Err(CrownError::IsGpt);
        assert_eq!(Status::from(&ok), Status::Ok);
        assert_eq!(Status::from(&err), Status::IsGpt);
    }
}

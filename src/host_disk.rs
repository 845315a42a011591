use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use crate::common::{Lba, Sector, SECTOR_SIZE};
use crate::device::{BlockDevice, CardRegisters};
use crate::registers::{Cid, Csd, Ssr};

pub struct HostDisk {
    file: File,
    path: PathBuf,
    total_sectors: u32,
}

impl HostDisk {
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;
        // Block device nodes report a zero length in their metadata; seeking
        // to the end works for both nodes and image files.
        let len = file.seek(SeekFrom::End(0))?;
        let total_sectors = u32::try_from(len / SECTOR_SIZE as u64).unwrap_or(u32::MAX);
        debug!(path = %path.display(), total_sectors, "opened disk");
        Ok(Self {
            file,
            path,
            total_sectors,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn seek_sector(&mut self, lba: Lba) -> io::Result<()> {
        if lba >= self.total_sectors {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("LBA {lba} beyond end of {}", self.path.display()),
            ));
        }
        self.file.seek(SeekFrom::Start(lba as u64 * SECTOR_SIZE as u64))?;
        Ok(())
    }
}

impl BlockDevice for HostDisk {
    fn read_sector(&mut self, lba: Lba, buf: &mut Sector) -> io::Result<()> {
        self.seek_sector(lba)?;
        self.file.read_exact(buf)
    }

    fn write_sector(&mut self, lba: Lba, data: &Sector) -> io::Result<()> {
        self.seek_sector(lba)?;
        self.file.write_all(data)?;
        // Writeback errors only surface through a sync.
        self.file.sync_data()
    }

    fn total_sectors(&self) -> u32 {
        self.total_sectors
    }
}

/// Where a host card's registers come from.
#[derive(Debug, Clone)]
pub enum RegisterSource {
    /// `<sysfs>/block/<name>/device`, holding `cid`, `csd` and `ssr` as hex.
    Sysfs(PathBuf),
    Fixed { cid: Cid, csd: Csd, ssr: Ssr },
}

impl RegisterSource {
    /// The sysfs device directory for a `/dev/<name>` node.
    pub fn sysfs_for(sysfs_root: &Path, device: &Path) -> io::Result<Self> {
        let name = device.file_name().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} does not name a device", device.display()),
            )
        })?;
        Ok(RegisterSource::Sysfs(
            sysfs_root.join("block").join(name).join("device"),
        ))
    }
}

fn read_sysfs_attr(dir: &Path, attr: &str) -> io::Result<String> {
    let path = dir.join(attr);
    let value = fs::read_to_string(&path)?;
    trace!(path = %path.display(), value = value.trim_end(), "read sysfs attribute");
    Ok(value)
}

fn invalid_hex(attr: &str, err: hex::FromHexError) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, format!("{attr}: {err}"))
}

/// A card reached through the host's block layer.
pub struct HostCard {
    disk: HostDisk,
    registers: RegisterSource,
}

impl HostCard {
    pub fn new(disk: HostDisk, registers: RegisterSource) -> Self {
        Self { disk, registers }
    }

    pub fn disk(&self) -> &HostDisk {
        &self.disk
    }
}

impl BlockDevice for HostCard {
    fn read_sector(&mut self, lba: Lba, buf: &mut Sector) -> io::Result<()> {
        self.disk.read_sector(lba, buf)
    }

    fn write_sector(&mut self, lba: Lba, data: &Sector) -> io::Result<()> {
        self.disk.write_sector(lba, data)
    }

    fn total_sectors(&self) -> u32 {
        self.disk.total_sectors()
    }
}

impl CardRegisters for HostCard {
    // The host kernel already brought the card up; all that is left to check
    // is that the registers can be reached.
    fn init(&mut self) -> io::Result<()> {
        if self.disk.total_sectors() == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "device has no sectors"));
        }
        match &self.registers {
            RegisterSource::Sysfs(dir) if !dir.is_dir() => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no sysfs device directory at {}", dir.display()),
            )),
            _ => Ok(()),
        }
    }

    fn read_cid(&mut self) -> io::Result<Cid> {
        match &self.registers {
            RegisterSource::Sysfs(dir) => {
                Cid::from_hex(&read_sysfs_attr(dir, "cid")?).map_err(|e| invalid_hex("cid", e))
            }
            RegisterSource::Fixed { cid, .. } => Ok(*cid),
        }
    }

    fn read_csd(&mut self) -> io::Result<Csd> {
        match &self.registers {
            RegisterSource::Sysfs(dir) => {
                Csd::from_hex(&read_sysfs_attr(dir, "csd")?).map_err(|e| invalid_hex("csd", e))
            }
            RegisterSource::Fixed { csd, .. } => Ok(*csd),
        }
    }

    fn read_ssr(&mut self) -> io::Result<Ssr> {
        match &self.registers {
            RegisterSource::Sysfs(dir) => {
                Ssr::from_hex(&read_sysfs_attr(dir, "ssr")?).map_err(|e| invalid_hex("ssr", e))
            }
            RegisterSource::Fixed { ssr, .. } => Ok(*ssr),
        }
    }
}

/// Block devices that look like SD cards: native MMC hosts, and USB mass
/// storage (card readers).
pub fn list_card_devices(sysfs_root: &Path) -> io::Result<Vec<PathBuf>> {
    let mut devices = Vec::new();
    for entry in fs::read_dir(sysfs_root.join("block"))? {
        let dev = entry?.path();
        let uevent = match fs::read_to_string(dev.join("device").join("uevent")) {
            Ok(uevent) => uevent,
            Err(_) => continue,
        };
        let is_card = uevent.lines().any(|line| match line {
            "DRIVER=mmcblk" => true,
            "DRIVER=sd" => fs::canonicalize(&dev)
                .map(|real| real.to_string_lossy().contains("/usb"))
                .unwrap_or(false),
            _ => false,
        });
        if is_card {
            if let Some(name) = dev.file_name() {
                devices.push(Path::new("/dev").join(name));
            }
        }
    }
    devices.sort();
    Ok(devices)
}

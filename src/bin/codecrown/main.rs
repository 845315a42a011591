mod logging;

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::Parser;
use codecrown::host_disk::{list_card_devices, HostCard, HostDisk, RegisterSource};
use codecrown::quest::QuestData;
use codecrown::{BlockDevice, CardRegisters, Cid, CodeCrown, CrownError, Csd, Ssr};

use crate::logging::{setup_logging, LevelFilter};

// Exit code for "ran fine, but the card or file is not what was asked for".
const EXIT_INVALID: u8 = 2;

#[derive(clap::Parser)]
#[clap(name = "codecrown", about = "Code Crown SD card tool", version)]
struct Cli {
    /// Card identification register value, as hex
    #[clap(long, short = 'i', global = true, env = "CODECROWN_CID")]
    cid: Option<String>,
    /// Card specific data register value, as hex
    #[clap(long, short = 's', global = true, env = "CODECROWN_CSD")]
    csd: Option<String>,
    /// SD status register value, as hex
    #[clap(long, short = 'r', global = true, env = "CODECROWN_SSR")]
    ssr: Option<String>,
    /// Root of the sysfs mount used to find cards and read their registers
    #[clap(long, global = true, env = "CODECROWN_SYSFS_ROOT", default_value = "/sys")]
    sysfs_root: PathBuf,
    /// Log level; falls back to RUST_LOG when not given
    #[clap(long, global = true, value_enum)]
    log_level: Option<LevelFilter>,

    #[clap(subcommand)]
    subcommand: Subcommand,
}

#[derive(clap::Subcommand)]
enum Subcommand {
    /// List available cards
    List,
    /// Show the card's registers and where its crown sector lives
    Info { device: PathBuf },
    /// Create a Code Crown with a valid security sector
    Create { device: PathBuf },
    /// Verify the Code Crown security sector
    Verify { device: PathBuf },
    /// Dump quest data from a Code Crown to a file
    Dump {
        device: PathBuf,
        #[clap(default_value = "quest.bin")]
        output: PathBuf,
    },
    /// Install a quest file onto a Code Crown
    Load { device: PathBuf, input: PathBuf },
}

impl Cli {
    fn register_source(&self, device: &Path) -> Result<RegisterSource> {
        match (&self.cid, &self.csd, &self.ssr) {
            (None, None, None) => Ok(RegisterSource::sysfs_for(&self.sysfs_root, device)?),
            (Some(cid), Some(csd), Some(ssr)) => Ok(RegisterSource::Fixed {
                cid: Cid::from_hex(cid).context("CID is not a valid hex string")?,
                csd: Csd::from_hex(csd).context("CSD is not a valid hex string")?,
                ssr: Ssr::from_hex(ssr).context("SSR is not a valid hex string")?,
            }),
            _ => bail!("CID, CSD and SSR must all be given when any of them is"),
        }
    }

    fn open_card(&self, device: &Path) -> Result<HostCard> {
        let disk = HostDisk::open(device).with_context(|| format!("failed to open {}", device.display()))?;
        Ok(HostCard::new(disk, self.register_source(device)?))
    }
}

fn crown_failure(err: CrownError) -> ExitCode {
    eprintln!("{}: {err}", err.status());
    ExitCode::from(err.status().code())
}

fn run(cli: &Cli) -> Result<ExitCode> {
    match &cli.subcommand {
        Subcommand::List => {
            for device in list_card_devices(&cli.sysfs_root).context("failed to scan sysfs")? {
                println!("{}", device.display());
            }
        }
        Subcommand::Info { device } => {
            let mut card = cli.open_card(device)?;
            card.init().context("card failed to initialize")?;
            let cid = card.read_cid().context("failed to read CID")?;
            let csd = card.read_csd().context("failed to read CSD")?;
            let ssr = card.read_ssr().context("failed to read SSR")?;
            let (year, month) = cid.manufacturing_date();
            let (major, minor) = cid.product_revision();
            println!("CID:           {cid}");
            println!("  manufacturer {:#04x}, OEM {:?}", cid.manufacturer_id(), cid.oem_id());
            println!("  product      {:?} rev {major}.{minor}", cid.product_name());
            println!("  serial       {:#010x}", cid.serial_number());
            println!("  made         {year}-{month:02}");
            println!("CSD:           {csd}");
            match csd.capacity_blocks() {
                Ok(blocks) => println!("  {:?}, {blocks} blocks", csd.version()?),
                Err(err) => println!("  {err}"),
            }
            println!("SSR:           {ssr}");
            println!("  bus width {}, speed class {}", ssr.bus_width(), ssr.speed_class());
            println!("Device:        {}, {} sectors", card.disk().path().display(), card.total_sectors());
            match CodeCrown::new(&mut card).locate() {
                Ok(lba) => println!("Crown LBA:     {lba}"),
                Err(err) => println!("Crown LBA:     none ({}: {err})", err.status()),
            }
        }
        Subcommand::Create { device } => {
            let card = cli.open_card(device)?;
            match CodeCrown::new(card).create() {
                Ok(lba) => println!("Wrote crown sector at LBA {lba}."),
                Err(err) => return Ok(crown_failure(err)),
            }
        }
        Subcommand::Verify { device } => {
            let card = cli.open_card(device)?;
            match CodeCrown::new(card).verify() {
                Ok(true) => println!("Code Crown is valid."),
                Ok(false) => {
                    println!("Code Crown is not valid.");
                    return Ok(ExitCode::from(EXIT_INVALID));
                }
                Err(err) => return Ok(crown_failure(err)),
            }
        }
        Subcommand::Dump { device, output } => {
            let card = cli.open_card(device)?;
            let data = match CodeCrown::new(card).read_quest_data() {
                Ok(data) => data,
                Err(err) => return Ok(crown_failure(err)),
            };
            let quest = match QuestData::new(data) {
                Ok(quest) => quest,
                Err(err) => {
                    eprintln!("Card does not contain valid quest data: {err}");
                    return Ok(ExitCode::from(EXIT_INVALID));
                }
            };
            fs::write(output, quest.as_bytes())
                .with_context(|| format!("failed to write {}", output.display()))?;
        }
        Subcommand::Load { device, input } => {
            let data = fs::read(input).with_context(|| format!("failed to read {}", input.display()))?;
            let quest = match QuestData::new(data) {
                Ok(quest) => quest,
                Err(err) => {
                    eprintln!("File does not contain valid quest data: {err}");
                    return Ok(ExitCode::from(EXIT_INVALID));
                }
            };
            let card = cli.open_card(device)?;
            if let Err(err) = CodeCrown::new(card).write_quest_data(&quest) {
                return Ok(crown_failure(err));
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.log_level);

    match run(&cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

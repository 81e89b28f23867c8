use std::env;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use zosfs::{logger, parse_size, FormatOptions, ZosFilesystem, DEFAULT_DISK_SIZE};

const USAGE: &str = "Usage: mkfs.zosfs <image> [size] [-c cluster_size] [-v|-vv]";

struct Args {
    image: PathBuf,
    disk_size: u64,
    cluster_size: Option<u32>,
    verbosity: usize,
}

fn parse_args() -> Result<Args> {
    let mut image = None;
    let mut disk_size = None;
    let mut cluster_size = None;
    let mut verbosity = 0;

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-v" => verbosity += 1,
            "-vv" => verbosity += 2,
            "-c" => {
                let value = args.next().context(USAGE)?;
                let bytes = value
                    .parse::<u32>()
                    .with_context(|| format!("invalid cluster size {:?}", value))?;
                cluster_size = Some(bytes);
            }
            _ if image.is_none() => image = Some(PathBuf::from(arg)),
            _ if disk_size.is_none() => {
                disk_size = Some(
                    parse_size(&arg).with_context(|| format!("invalid disk size {:?}", arg))?,
                )
            }
            _ => return Err(anyhow!(USAGE)),
        }
    }

    Ok(Args {
        image: image.context(USAGE)?,
        disk_size: disk_size.unwrap_or(DEFAULT_DISK_SIZE),
        cluster_size,
        verbosity,
    })
}

fn main() -> Result<()> {
    let args = parse_args()?;
    logger::init(logger::level_from_verbosity(args.verbosity))
        .context("could not install logger")?;

    let mut options = FormatOptions::with_size(args.disk_size);
    if let Some(cluster_size) = args.cluster_size {
        options = options.cluster_size(cluster_size);
    }

    let fs = ZosFilesystem::format(&args.image, &options)
        .with_context(|| format!("could not format {:?}", args.image))?;
    let sb = fs.superblock();

    println!(
        "mkfs.zosfs: {:?} formatted: {} clusters of {} bytes, {} inodes, max file size {} bytes.",
        args.image,
        sb.cluster_count,
        sb.cluster_size,
        sb.inode_count,
        fs.max_storable_size()
    );

    Ok(())
}

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{anyhow, Context, Result};
use colored::*;
use zosfs::fsck::fsck;
use zosfs::{logger, FsConfig, ZosFilesystem};

fn main() -> Result<ExitCode> {
    let mut image = None;
    let mut verbosity = 0;
    for arg in env::args().skip(1) {
        match arg.as_str() {
            "-v" => verbosity += 1,
            "-vv" => verbosity += 2,
            _ if image.is_none() => image = Some(PathBuf::from(arg)),
            _ => return Err(anyhow!("Usage: fsck.zosfs <image> [-v|-vv]")),
        }
    }
    let image = image.context("Usage: fsck.zosfs <image> [-v|-vv]")?;
    logger::init(logger::level_from_verbosity(verbosity)).context("could not install logger")?;

    // Read-only pass; nothing is written, so no need to sync.
    let config = FsConfig {
        durable_writes: false,
    };
    let fs = ZosFilesystem::open(&image, &config)
        .with_context(|| format!("could not open {:?}", image))?;
    let rep = fsck::run_fsck(&fs).with_context(|| format!("could not read {:?}", image))?;
    let stats = fs.statfs().context("could not compute usage")?;

    println!("\n{}", " ZOSFS FILESYSTEM CHECK ".on_blue().bold());
    println!("{}", "──────────────────────────────────────────".blue());

    println!("\n{}", "Usage".bold().underline());
    println!(
        "  clusters {}/{} used, inodes {}/{} used, {} directories",
        stats.used_clusters, stats.total_clusters, stats.used_inodes, stats.inode_count, stats.directories
    );

    section("Clusters", rep.clusters_ok);
    section("Inodes", rep.inodes_ok);
    section("Directories", rep.dirs_ok);

    println!("\n{}", "Problems found".bold().underline());
    if rep.errors.is_empty() {
        println!("  {} None", "✓".green());
    } else {
        for err in &rep.errors {
            println!("  {} {}", "•".red(), err.red());
        }
    }

    println!("\n{}", "Summary".bold().underline());
    if rep.is_clean() {
        println!("{} Filesystem is clean.\n", "✓ OK".green().bold());
        Ok(ExitCode::SUCCESS)
    } else {
        println!(
            "{} {} problem(s).\n",
            "✗ fsck finished with errors:".red().bold(),
            rep.errors.len().to_string().yellow()
        );
        Ok(ExitCode::from(1))
    }
}

fn section(title: &str, ok: bool) {
    println!("\n{}", title.bold().underline());
    if ok {
        println!("  {} {} OK", "✓".green(), title);
    } else {
        println!("  {} Errors in {}", "✗".red(), title.to_lowercase());
    }
}

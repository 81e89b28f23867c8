// src/config.rs
use crate::disk::{ZOSFS_CLUSTER_SIZE, ZOSFS_DESCRIPTION};
use crate::error::{FsError, Result};

/// Default image size when none is given.
pub const DEFAULT_DISK_SIZE: u64 = 600 * 1024 * 1024;

/// Parameters fixed at format time.
#[derive(Debug, Clone)]
pub struct FormatOptions {
    pub disk_size: u64,
    pub cluster_size: u32,
    pub description: String,
    /// `sync_data` after every write instead of a plain flush.
    pub durable_writes: bool,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            disk_size: DEFAULT_DISK_SIZE,
            cluster_size: ZOSFS_CLUSTER_SIZE,
            description: ZOSFS_DESCRIPTION.to_string(),
            durable_writes: true,
        }
    }
}

impl FormatOptions {
    pub fn with_size(disk_size: u64) -> Self {
        Self {
            disk_size,
            ..Self::default()
        }
    }

    pub fn cluster_size(mut self, cluster_size: u32) -> Self {
        self.cluster_size = cluster_size;
        self
    }

    pub fn durable_writes(mut self, durable: bool) -> Self {
        self.durable_writes = durable;
        self
    }

    pub fn session_config(&self) -> FsConfig {
        FsConfig {
            durable_writes: self.durable_writes,
        }
    }
}

/// Options for opening an already formatted image.
#[derive(Debug, Clone, Copy)]
pub struct FsConfig {
    pub durable_writes: bool,
}

impl Default for FsConfig {
    fn default() -> Self {
        Self {
            durable_writes: true,
        }
    }
}

/// Parses sizes such as `600MB`, `1gb`, `512KB`, `4096B`.
/// A bare number is taken as megabytes.
pub fn parse_size(input: &str) -> Result<u64> {
    let trimmed = input.trim();
    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (digits, unit) = trimmed.split_at(split);

    let value: u64 = digits
        .parse()
        .map_err(|_| FsError::InvalidArgument(format!("bad size {:?}", input)))?;

    let multiplier: u64 = match unit.trim().to_ascii_uppercase().as_str() {
        "" | "M" | "MB" => 1024 * 1024,
        "B" => 1,
        "K" | "KB" => 1024,
        "G" | "GB" => 1024 * 1024 * 1024,
        other => {
            return Err(FsError::InvalidArgument(format!("unknown size unit {:?}", other)));
        }
    };

    value
        .checked_mul(multiplier)
        .ok_or_else(|| FsError::InvalidArgument(format!("size {:?} overflows", input)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_with_units() {
        assert_eq!(parse_size("600MB").unwrap(), 600 * 1024 * 1024);
        assert_eq!(parse_size("1gb").unwrap(), 1024 * 1024 * 1024);
        assert_eq!(parse_size("512KB").unwrap(), 512 * 1024);
        assert_eq!(parse_size("4096B").unwrap(), 4096);
        assert_eq!(parse_size(" 10 ").unwrap(), 10 * 1024 * 1024);
    }

    #[test]
    fn garbage_sizes_are_rejected() {
        for bad in ["", "MB", "12XB", "-1MB", "99999999999999999999GB"] {
            assert!(
                matches!(parse_size(bad), Err(FsError::InvalidArgument(_))),
                "{bad:?} accepted"
            );
        }
    }

    #[test]
    fn defaults() {
        let opts = FormatOptions::default();
        assert_eq!(opts.cluster_size, 4096);
        assert_eq!(opts.disk_size, DEFAULT_DISK_SIZE);
        assert!(opts.session_config().durable_writes);
    }
}

// src/error.rs
use std::fmt;
use std::io;

use libc::{EBUSY, EEXIST, EFBIG, EINVAL, EIO, EISDIR, ENAMETOOLONG, ENOENT, ENOSPC, ENOTDIR, ENOTEMPTY};
use thiserror::Error;

use crate::disk::ZOSFS_NAME_LEN;

/// Kind of node an operation expected to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    File,
    Directory,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::File => write!(f, "file"),
            NodeKind::Directory => write!(f, "directory"),
        }
    }
}

#[derive(Debug, Error)]
pub enum FsError {
    #[error("entry not found")]
    NotFound,
    #[error("no space left on the filesystem")]
    NoSpace,
    #[error("id {0} out of range")]
    InvalidId(u32),
    #[error("backing store I/O failure: {0}")]
    Io(#[from] io::Error),
    #[error("expected a {0}")]
    TypeMismatch(NodeKind),
    #[error("entry already exists")]
    AlreadyExists,
    #[error("directory not empty")]
    NotEmpty,
    #[error("invalid name {0:?}")]
    InvalidName(String),
    #[error("file too large")]
    FileTooLarge,
    #[error("backing file is not a formatted filesystem")]
    NotFormatted,
    #[error("invalid layout: {0}")]
    InvalidLayout(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("directory is in use")]
    Busy,
}

impl FsError {
    pub fn as_errno(&self) -> i32 {
        match self {
            FsError::NotFound => ENOENT,
            FsError::NoSpace => ENOSPC,
            FsError::InvalidId(_) => EINVAL,
            FsError::Io(_) => EIO,
            FsError::TypeMismatch(NodeKind::Directory) => ENOTDIR,
            FsError::TypeMismatch(NodeKind::File) => EISDIR,
            FsError::AlreadyExists => EEXIST,
            FsError::NotEmpty => ENOTEMPTY,
            FsError::InvalidName(name) if name.len() >= ZOSFS_NAME_LEN => ENAMETOOLONG,
            FsError::InvalidName(_) => EINVAL,
            FsError::FileTooLarge => EFBIG,
            FsError::NotFormatted | FsError::InvalidLayout(_) => EIO,
            FsError::InvalidArgument(_) => EINVAL,
            FsError::Busy => EBUSY,
        }
    }
}

pub type Result<T> = std::result::Result<T, FsError>;

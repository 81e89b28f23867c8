// src/path.rs
//
// Slash separated paths. "." stays put, ".." follows the inode's parent
// field, anything else is a directory lookup. The inode id is the ground
// truth; the display path only mirrors it for the prompt.

use log::trace;

use crate::disk::ROOT_INODE_ID;
use crate::error::{FsError, Result};
use crate::fs::ZosFilesystem;

impl ZosFilesystem {
    /// Inode id named by `path`. Empty means the current directory, a
    /// leading '/' starts at the root.
    pub fn resolve_path(&self, path: &str) -> Result<u32> {
        if path.is_empty() {
            return Ok(self.current_inode);
        }

        let mut current = if path.starts_with('/') {
            ROOT_INODE_ID
        } else {
            self.current_inode
        };

        for token in path.split('/').filter(|t| !t.is_empty()) {
            current = match token {
                "." => current,
                ".." => self.read_inode(current)?.parent,
                name => self.find_in_dir(current, name)?,
            };
        }

        trace!("resolve {:?} -> {}", path, current);
        Ok(current)
    }

    /// Resolves everything but the last component, which need not exist.
    pub fn split_path(&self, path: &str) -> Result<(u32, String)> {
        let trimmed = path.trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(FsError::InvalidName(path.to_string()));
        }

        let (parent, name) = match trimmed.rfind('/') {
            Some(pos) => {
                let prefix = &trimmed[..pos];
                let parent = if prefix.is_empty() {
                    ROOT_INODE_ID
                } else {
                    self.resolve_path(prefix)?
                };
                (parent, &trimmed[pos + 1..])
            }
            None => (self.current_inode, trimmed),
        };

        self.read_directory_inode(parent)?;
        Ok((parent, name.to_string()))
    }

    /// `cd`: moves the session into the directory named by `path`.
    pub fn change_dir(&mut self, path: &str) -> Result<()> {
        let target = self.resolve_path(path)?;
        self.read_directory_inode(target)?;
        self.current_path = join_display_path(&self.current_path, path);
        self.current_inode = target;
        trace!("cd {:?} -> inode {} ({})", path, target, self.current_path);
        Ok(())
    }

    pub fn current_dir(&self) -> u32 {
        self.current_inode
    }

    pub fn current_path(&self) -> &str {
        &self.current_path
    }

    /// Rebuilds the absolute path of a directory by walking parent links
    /// and looking its name up in each parent.
    pub fn describe_path(&self, id: u32) -> Result<String> {
        let mut names = Vec::new();
        let mut node = id;
        for _ in 0..self.superblock.inode_count {
            if node == ROOT_INODE_ID {
                break;
            }
            let parent = self.read_inode(node)?.parent;
            let name = self
                .dir_slots(parent)?
                .into_iter()
                .find(|slot| slot.inode == node)
                .map(|slot| slot.name_str())
                .ok_or(FsError::NotFound)?;
            names.push(name);
            node = parent;
        }
        names.reverse();
        Ok(format!("/{}", names.join("/")))
    }
}

/// Applies `input` to the display path `base` textually.
pub fn join_display_path(base: &str, input: &str) -> String {
    let mut parts: Vec<&str> = if input.starts_with('/') {
        Vec::new()
    } else {
        base.split('/').filter(|p| !p.is_empty()).collect()
    };

    for token in input.split('/').filter(|t| !t.is_empty()) {
        match token {
            "." => {}
            ".." => {
                parts.pop();
            }
            name => parts.push(name),
        }
    }
    format!("/{}", parts.join("/"))
}

// src/fsck/mod.rs
//
// Offline consistency checker. `fsck::run_fsck` only talks to a
// `FsckBackend`, so it runs the same way over a real image or a mock.

pub mod fsck;
pub mod fsck_backend;
pub mod fsck_types;

#[cfg(test)]
pub mod mock;

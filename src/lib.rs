//! dotkeep: back up and restore dotfiles as optionally encrypted tarballs.
//!
//! This crate provides the collection, archiving, encryption and restore
//! pipeline behind the `dk` command-line tool.

pub mod archive;
pub mod backup;
pub mod category;
pub mod collect;
pub mod config;
mod constants;
pub mod crypto;
pub mod error;
pub mod exclude;
pub mod extract;
pub mod metadata;
pub mod restore;
pub mod safety;
pub mod safety_backup;

pub use error::{Error, Result};

#![warn(clippy::pedantic)]
//! # Palimpsest
//!
//! Undo and redo for a layered bitmap editor, by replaying command logs rather than storing a copy of the
//! image for every step.

pub mod bitmap;
pub mod commands;
pub mod config;
pub mod history;
pub mod id;
pub mod io;
pub mod layers;
pub mod manager;
pub mod undo_redo;
pub mod viewport;
pub mod worker;

pub use bitmap::{Bitmap, Rgba8};
pub use commands::{Command, ContentCommand, LayerCommand};
pub use config::HistoryConfig;
pub use id::LayerID;
pub use manager::CommandManager;
pub use undo_redo::UndoRedoManager;

//! # Scripts
//!
//! A session described in TOML: a canvas size and a list of steps, each painting, restructuring, or
//! undoing and redoing. Layers are referred to by name, the topmost match wins. Steps that take an optional
//! `layer` act on the active layer when it is left out.
//!
//! ```toml
//! width = 64
//! height = 64
//!
//! [[steps]]
//! op = "fill"
//! color = { r = 255, g = 255, b = 255, a = 255 }
//!
//! [[steps]]
//! op = "undo"
//! times = 1
//! ```

use std::sync::Arc;

use anyhow::Context;
use palimpsest_core::{
    commands::paint,
    manager::Availability,
    undo_redo::{Frontend, Outcome},
    viewport::{SharedView, ViewTransform},
    CommandManager, ContentCommand, HistoryConfig, LayerID, UndoRedoManager,
};

fn one() -> usize {
    1
}

#[derive(serde::Deserialize, Debug)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    Fill {
        layer: Option<String>,
        #[serde(flatten)]
        command: paint::Fill,
    },
    FillRect {
        layer: Option<String>,
        #[serde(flatten)]
        command: paint::FillRect,
    },
    Line {
        layer: Option<String>,
        #[serde(flatten)]
        command: paint::Line,
    },
    /// Added above the active layer, and made active.
    AddLayer { name: String },
    RemoveLayer { layer: Option<String> },
    /// The two layers' stacking order decides which goes on top, not the order given here.
    Merge { layers: [String; 2] },
    Select { layer: String },
    Undo {
        #[serde(default = "one")]
        times: usize,
    },
    Redo {
        #[serde(default = "one")]
        times: usize,
    },
    /// Compact a layer's history to disk now, rather than waiting for it to grow.
    Spill { layer: Option<String> },
}

#[derive(serde::Deserialize, Debug, Default)]
pub struct Script {
    /// Overrides the configured canvas size.
    pub width: Option<u32>,
    pub height: Option<u32>,
    #[serde(default)]
    pub steps: Vec<Step>,
}
impl Script {
    /// # Errors
    /// If the file can't be read or isn't a valid script.
    pub fn read(path: &std::path::Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }
    /// Run every step in a fresh document, stopping at the first failure.
    /// # Errors
    /// If the document can't be set up, or any step fails. The error names the step.
    pub fn run(&self, mut config: HistoryConfig) -> anyhow::Result<Report> {
        if let Some(width) = self.width {
            config.width = width;
        }
        if let Some(height) = self.height {
            config.height = height;
        }
        let session = Session::new(config)?;
        for (number, step) in self.steps.iter().enumerate() {
            session
                .step(step)
                .with_context(|| format!("step {} ({step:?})", number + 1))?;
        }
        Ok(session.report())
    }
}

/// Logs what a UI would be told to show.
struct LogFrontend;
impl Frontend for LogFrontend {
    fn show_busy(&self) {
        log::debug!("Busy...");
    }
    fn dismiss_busy(&self) {
        log::debug!("...done");
    }
    fn reset_tool(&self) {
        log::trace!("Tool reset");
    }
    fn refresh_layers(&self) {
        log::trace!("Layers changed");
    }
    fn refresh_surface(&self) {
        log::trace!("Surface changed");
    }
}

pub struct Session {
    undo_redo: UndoRedoManager,
}
impl Session {
    /// # Errors
    /// If the document can't be created with this config.
    pub fn new(config: HistoryConfig) -> anyhow::Result<Self> {
        let commands = Arc::new(CommandManager::new(config)?);
        let view: SharedView = Arc::new(parking_lot::RwLock::new(ViewTransform::default()));
        Ok(Self {
            undo_redo: UndoRedoManager::new(commands, Arc::new(LogFrontend), view),
        })
    }
    fn commands(&self) -> &CommandManager {
        self.undo_redo.commands()
    }
    /// The topmost layer with this name, or the active layer for `None`.
    fn resolve(&self, name: Option<&str>) -> anyhow::Result<LayerID> {
        let Some(name) = name else {
            return Ok(self.commands().active_layer());
        };
        let commands = self.commands();
        commands
            .layer_ids()
            .into_iter()
            .rev()
            .find(|id| {
                commands
                    .layer(*id)
                    .is_some_and(|layer| layer.lock().name == name)
            })
            .ok_or_else(|| anyhow::anyhow!("no layer named {name:?}"))
    }
    fn paint(&self, layer: Option<&str>, command: Arc<dyn ContentCommand>) -> anyhow::Result<()> {
        let id = self.resolve(layer)?;
        let stamp = self.commands().commit(id, command)?;
        log::trace!("Committed to {id} at {stamp:?}");
        Ok(())
    }
    /// # Errors
    /// If a named layer doesn't exist, or the underlying operation fails.
    pub fn step(&self, step: &Step) -> anyhow::Result<()> {
        let commands = self.commands();
        match step {
            Step::Fill { layer, command } => self.paint(layer.as_deref(), Arc::new(*command))?,
            Step::FillRect { layer, command } => self.paint(layer.as_deref(), Arc::new(*command))?,
            Step::Line { layer, command } => self.paint(layer.as_deref(), Arc::new(*command))?,
            Step::AddLayer { name } => {
                let id = commands.add_layer(name.clone());
                log::debug!("Added {name:?} as {id}");
            }
            Step::RemoveLayer { layer } => commands.remove_layer(self.resolve(layer.as_deref())?)?,
            Step::Merge { layers: [a, b] } => {
                let (a, b) = (self.resolve(Some(a))?, self.resolve(Some(b))?);
                let merged = commands.merge_layers(a, b)?;
                log::debug!("Merged {a} and {b} into {merged}");
            }
            Step::Select { layer } => commands.set_active_layer(self.resolve(Some(layer))?)?,
            Step::Undo { times } => {
                for _ in 0..*times {
                    if self.undo_redo.perform_undo()?.is_noop() {
                        log::info!("Nothing left to undo");
                        break;
                    }
                }
            }
            Step::Redo { times } => {
                for _ in 0..*times {
                    let outcome = self.undo_redo.perform_redo()?;
                    if let Outcome::NoOp = outcome {
                        log::info!("Nothing left to redo");
                        break;
                    }
                }
            }
            Step::Spill { layer } => commands.spill_layer(self.resolve(layer.as_deref())?)?,
        }
        Ok(())
    }
    #[must_use]
    pub fn report(&self) -> Report {
        let commands = self.commands();
        let active = commands.active_layer();
        let layers = commands
            .layer_ids()
            .into_iter()
            .filter_map(|id| {
                let handle = commands.layer(id)?;
                let layer = handle.lock();
                Some(LayerReport {
                    id,
                    name: layer.name.clone(),
                    active: id == active,
                    executed: layer.history().executed().len(),
                    undone: layer.history().undone().len(),
                    digest: layer.bitmap().digest().to_hex().to_string(),
                })
            })
            .collect();
        Report {
            layers,
            flattened: commands.flatten().digest().to_hex().to_string(),
            availability: commands.availability(),
            dirty: self.undo_redo.is_dirty(),
        }
    }
}

#[derive(Debug)]
pub struct LayerReport {
    pub id: LayerID,
    pub name: String,
    pub active: bool,
    pub executed: usize,
    pub undone: usize,
    /// Hex blake3 of the layer's pixels.
    pub digest: String,
}

/// The state of a document after a script.
#[derive(Debug)]
pub struct Report {
    /// Bottom first.
    pub layers: Vec<LayerReport>,
    pub flattened: String,
    pub availability: Availability,
    /// Whether an undo or redo changed the document.
    pub dirty: bool,
}
impl std::fmt::Display for Report {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Top layer first, as a layer panel would show them.
        for layer in self.layers.iter().rev() {
            writeln!(
                f,
                "{} {} {:?}: {} executed, {} undone, {}",
                if layer.active { '*' } else { ' ' },
                layer.id,
                layer.name,
                layer.executed,
                layer.undone,
                &layer.digest[..16],
            )?;
        }
        writeln!(f, "flattened {}", &self.flattened[..16])?;
        write!(
            f,
            "undo {}, redo {}{}",
            if self.availability.undo { "available" } else { "unavailable" },
            if self.availability.redo { "available" } else { "unavailable" },
            if self.dirty { ", modified" } else { "" },
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn config(dir: &tempfile::TempDir) -> HistoryConfig {
        HistoryConfig {
            spill_dir: Some(dir.path().to_owned()),
            ..Default::default()
        }
    }

    const PAINT_THEN_UNDO: &str = r#"
width = 8
height = 8

[[steps]]
op = "fill"
color = { r = 255, g = 0, b = 0, a = 255 }

[[steps]]
op = "add_layer"
name = "Ink"

[[steps]]
op = "line"
from = [0, 0]
to = [7, 7]
width = 1
color = { r = 0, g = 0, b = 0, a = 255 }

[[steps]]
op = "undo"

[[steps]]
op = "undo"
times = 2
"#;

    #[test]
    fn parse() {
        let script: Script = toml::from_str(PAINT_THEN_UNDO).unwrap();
        assert_eq!(script.width, Some(8));
        assert_eq!(script.steps.len(), 5);
        assert!(matches!(
            &script.steps[2],
            Step::Line { layer: None, command } if command.to == (7, 7)
        ));
        assert!(matches!(script.steps[3], Step::Undo { times: 1 }));
        assert!(matches!(script.steps[4], Step::Undo { times: 2 }));
    }
    #[test]
    fn unknown_op() {
        assert!(toml::from_str::<Script>("[[steps]]\nop = \"explode\"\n").is_err());
        assert!(toml::from_str::<Script>("[[steps]]\nname = \"no op\"\n").is_err());
    }
    #[test]
    fn undo_through_structure() {
        let dir = tempfile::tempdir().unwrap();
        let script: Script = toml::from_str(PAINT_THEN_UNDO).unwrap();
        let report = script.run(config(&dir)).unwrap();

        // The line, then the new layer, then the fill were undone.
        assert_eq!(report.layers.len(), 1);
        let background = &report.layers[0];
        assert_eq!(background.name, "Background");
        assert!(background.active);
        assert_eq!(background.executed, 1);
        assert_eq!(background.undone, 1);
        assert_eq!(report.availability, Availability { undo: false, redo: true });
        assert!(report.dirty);

        let blank = palimpsest_core::Bitmap::new(8, 8).unwrap().digest().to_hex().to_string();
        assert_eq!(background.digest, blank);
        assert_eq!(report.flattened, blank);
    }
    #[test]
    fn names_and_merge() {
        let dir = tempfile::tempdir().unwrap();
        let script: Script = toml::from_str(
            r#"
width = 4
height = 4
[[steps]]
op = "add_layer"
name = "Ink"
[[steps]]
op = "fill_rect"
layer = "Background"
x = 0
y = 0
width = 2
height = 2
color = { r = 0, g = 0, b = 255, a = 255 }
[[steps]]
op = "merge"
layers = ["Background", "Ink"]
"#,
        )
        .unwrap();
        let report = script.run(config(&dir)).unwrap();
        assert_eq!(report.layers.len(), 1);
        // Takes the lower layer's name.
        assert_eq!(report.layers[0].name, "Background");
        assert_eq!(report.layers[0].digest, report.flattened);
        assert!(!report.dirty);
    }
    #[test]
    fn missing_layer_names_step() {
        let dir = tempfile::tempdir().unwrap();
        let script: Script =
            toml::from_str("[[steps]]\nop = \"undo\"\n[[steps]]\nop = \"select\"\nlayer = \"Nope\"\n")
                .unwrap();
        let error = script.run(config(&dir)).unwrap_err();
        assert!(format!("{error:#}").starts_with("step 2"));
    }
}

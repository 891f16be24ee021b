use palimpsest_core::HistoryConfig;

const DOCUMENTATION: &str = r"# Palimpsest settings. You may edit this file, but be aware that formatting and comments will not
# be preserved. Any key left out takes its default value.

# width, height: canvas size of new documents, in pixels.
# spill_dir: where history snapshots are written when a layer's history grows too large.
#   Defaults to a directory in the user's cache.
# [spill]
# max_commands: compact a layer's history once it holds more than this many commands.
# max_bytes: ...or once those commands hold more than this many bytes.
# retry_after: after a failed write, wait this many commands before trying again.

";

#[must_use]
pub fn preferences_dir() -> Option<std::path::PathBuf> {
    let mut base_dir = dirs::preference_dir()?;
    base_dir.push(env!("CARGO_PKG_NAME"));
    Some(base_dir)
}

#[derive(serde::Serialize, serde::Deserialize, Default, Debug)]
#[serde(default)]
pub struct Settings {
    pub history: HistoryConfig,
    #[serde(skip)]
    failed_to_load: bool,
}
impl Settings {
    pub const FILENAME: &'static str = "settings.toml";
    /// Settings from the user's preferences.
    /// (Or defaulted, if unavailable for some reason)
    #[must_use]
    pub fn load() -> Self {
        match preferences_dir() {
            None => Self::no_path(),
            Some(mut dir) => {
                dir.push(Self::FILENAME);
                Self::load_or_default(&dir)
            }
        }
    }
    #[must_use]
    pub fn no_path() -> Self {
        log::warn!("Settings weren't available, defaulting.");
        Self {
            failed_to_load: true,
            ..Default::default()
        }
    }
    #[must_use]
    pub fn load_or_default(path: &std::path::Path) -> Self {
        let settings: anyhow::Result<Self> = try_block::try_block! {
            let string = std::fs::read_to_string(path)?;
            let settings : Self = toml::from_str(&string)?;
            Ok(settings)
        };

        match settings {
            Ok(settings) => settings,
            Err(e) => {
                log::debug!("Reading {path:?}: {e:#}");
                Self::no_path()
            }
        }
    }
    /// Return true if loading user's settings failed. This can be useful for
    /// displaying a warning.
    #[must_use]
    pub fn did_fail_to_load(&self) -> bool {
        self.failed_to_load
    }
    /// Write to the user's preferences.
    /// # Errors
    /// If there is no preferences dir, or it can't be written.
    pub fn save(&self) -> anyhow::Result<()> {
        let mut preferences =
            preferences_dir().ok_or_else(|| anyhow::anyhow!("No preferences dir found"))?;
        // Explicity do *not* create recursively. If not found, the user probably has a good reason.
        // Ignore errors (could already exist). Any real errors will be emitted by file access below.
        let _ = std::fs::DirBuilder::new().create(&preferences);

        preferences.push(Self::FILENAME);
        self.save_to(&preferences)
    }
    /// # Errors
    /// If serialization or writing fails.
    pub fn save_to(&self, path: &std::path::Path) -> anyhow::Result<()> {
        let string = DOCUMENTATION.to_owned() + &toml::ser::to_string_pretty(self)?;
        std::fs::write(path, string)?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    #[test]
    fn partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "[history]\nwidth = 32\n[history.spill]\nmax_commands = 5\n").unwrap();
        let settings = Settings::load_or_default(&path);
        assert!(!settings.did_fail_to_load());
        assert_eq!(settings.history.width, 32);
        assert_eq!(settings.history.height, HistoryConfig::default().height);
        assert_eq!(settings.history.spill.max_commands, 5);
        assert_eq!(settings.history.spill.retry_after, 16);
    }
    #[test]
    fn malformed_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "[history\nwidth = ").unwrap();
        let settings = Settings::load_or_default(&path);
        assert!(settings.did_fail_to_load());
        assert_eq!(settings.history, HistoryConfig::default());
    }
    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        let mut settings = Settings::default();
        settings.history.height = 99;
        settings.history.spill_dir = Some(dir.path().join("spill"));
        settings.save_to(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("# Palimpsest settings"));
        let loaded = Settings::load_or_default(&path);
        assert!(!loaded.did_fail_to_load());
        assert_eq!(loaded.history, settings.history);
    }
}

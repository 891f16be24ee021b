#![warn(clippy::pedantic)]
//! Runs history scripts headlessly, printing the resulting layers and their digests.
//!
//! Args are a simple list of script paths. See [`script`] for the format.

pub mod script;
pub mod settings;

use anyhow::Result as AnyResult;

fn main() -> AnyResult<()> {
    let has_term = std::io::IsTerminal::is_terminal(&std::io::stdin());
    // Log to a terminal, if available. Else, log to "log.out" in the working directory.
    if has_term {
        env_logger::builder()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        let _ = simple_logging::log_to_file("log.out", log::LevelFilter::Debug);
    }

    let settings = settings::Settings::load();
    // Leave a documented default behind for the user to edit, but never clobber a file we merely failed to parse.
    let missing = settings::preferences_dir()
        .is_some_and(|dir| !dir.join(settings::Settings::FILENAME).exists());
    if settings.did_fail_to_load() && missing {
        if let Err(e) = settings.save() {
            log::warn!("Failed to save default settings:\n{e:?}");
        }
    }

    let all_succeeded = {
        use rayon::iter::{IntoParallelIterator, ParallelIterator};
        // Paths are OSStrings, let the system handle character encoding restrictions.
        let paths: Vec<std::path::PathBuf> = std::env::args_os().skip(1).map(Into::into).collect();
        if paths.is_empty() {
            log::warn!("No scripts given. Usage: palimpsest <script.toml>...");
        }
        let had_failure = std::sync::atomic::AtomicBool::new(false);
        paths.into_par_iter().for_each(|path| {
            let result = script::Script::read(&path)
                .and_then(|script| script.run(settings.history.clone()));
            match result {
                Err(e) => {
                    log::error!("{path:?} failed: {e:#}");
                    // We don't care when it's stored, so long as it gets there eventually.
                    had_failure.store(true, std::sync::atomic::Ordering::Relaxed);
                }
                Ok(report) => println!("{}:\n{report}\n", path.display()),
            }
        });
        !had_failure.into_inner()
    };

    if all_succeeded {
        Ok(())
    } else {
        Err(anyhow::anyhow!("one or more scripts failed"))
    }
}

//! Command implementations.

pub mod chapters;
pub mod doctor;
pub mod generate;
pub mod init;
pub mod knowledge;
pub mod status;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use storyloom_config::AppConfig;
use storyloom_core::EventBus;
use storyloom_pipeline::{open_project, Pipeline, ProjectState};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

/// Everything a command needs: config, project root, and the event sink.
pub struct Session {
    pub config: AppConfig,
    pub project: PathBuf,
    pub events: Arc<EventBus>,
}

impl Session {
    pub fn open_project(&self) -> Result<ProjectState, storyloom_core::Error> {
        open_project(&self.config, &self.project)
    }

    pub fn pipeline(&self) -> Result<Pipeline, storyloom_core::Error> {
        Pipeline::from_config(&self.config, self.events.clone())
    }

    pub fn words(&self, words: Option<u32>) -> u32 {
        words.unwrap_or(self.config.generation.words_per_chapter)
    }
}

pub fn load_config(path: Option<&Path>) -> Result<AppConfig, storyloom_config::ConfigError> {
    match path {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    }
}

/// Print every pipeline event until the bus is dropped.
pub fn spawn_printer(events: &EventBus) -> JoinHandle<()> {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => println!("  {}", event.line()),
                Err(RecvError::Lagged(missed)) => println!("  ({missed} progress lines skipped)"),
                Err(RecvError::Closed) => break,
            }
        }
    })
}

/// First `max` characters of `text` on one line.
pub fn preview(text: &str, max: usize) -> String {
    let flat: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max {
        flat
    } else {
        let cut: String = flat.chars().take(max).collect();
        format!("{cut}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_flattens_and_cuts() {
        assert_eq!(preview("a\n\nb  c", 10), "a b c");
        assert_eq!(preview("英雄走过桥", 2), "英雄…");
    }

    #[tokio::test]
    async fn printer_stops_when_bus_dropped() {
        let bus = EventBus::default();
        let handle = spawn_printer(&bus);
        bus.notice("hello");
        drop(bus);
        handle.await.unwrap();
    }
}

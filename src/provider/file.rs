//! File provider.
//!
//! Reads one [`Configuration`] from a TOML or JSON file (chosen by
//! extension) and, when watching, emits it again every time the file
//! changes. The parent directory is watched so editors that replace the
//! file by rename are picked up.

use async_trait::async_trait;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

use crate::config::{ConfigMessage, Configuration, FileProviderConfig};
use crate::provider::{Provider, ProviderError};

pub const FILE_PROVIDER_NAME: &str = "file";

#[derive(Debug, Clone)]
pub struct FileProvider {
    name: String,
    path: PathBuf,
    watch: bool,
}

impl FileProvider {
    pub fn new(config: &FileProviderConfig) -> Self {
        Self {
            name: FILE_PROVIDER_NAME.to_string(),
            path: config.path.clone(),
            watch: config.watch,
        }
    }

    /// Read and parse the file.
    pub fn load(&self) -> Result<Configuration, ProviderError> {
        let content = std::fs::read_to_string(&self.path).map_err(|source| ProviderError::Io {
            path: self.path.clone(),
            source,
        })?;
        parse_configuration(&self.path, &content)
    }

    fn is_target(&self, event: &Event) -> bool {
        (event.kind.is_modify() || event.kind.is_create())
            && event
                .paths
                .iter()
                .any(|p| p.file_name() == self.path.file_name())
    }

    fn watch_dir(&self) -> &Path {
        match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        }
    }

    async fn emit(&self, tx: &mpsc::Sender<ConfigMessage>, configuration: Configuration) -> Result<(), ProviderError> {
        tx.send(ConfigMessage::new(self.name.as_str(), configuration))
            .await
            .map_err(|_| ProviderError::ChannelClosed)
    }
}

/// Parse a configuration file body; `.json` files are JSON, anything else TOML.
pub fn parse_configuration(path: &Path, content: &str) -> Result<Configuration, ProviderError> {
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let parsed = if is_json {
        serde_json::from_str(content).map_err(|e| e.to_string())
    } else {
        toml::from_str(content).map_err(|e| e.to_string())
    };
    parsed.map_err(|message| ProviderError::Parse {
        path: path.to_path_buf(),
        message,
    })
}

#[async_trait]
impl Provider for FileProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn provide(
        &self,
        tx: mpsc::Sender<ConfigMessage>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ProviderError> {
        let initial = self.load()?;
        tracing::info!(provider = %self.name, path = %self.path.display(), "Loaded configuration file");
        self.emit(&tx, initial).await?;

        if !self.watch {
            return Ok(());
        }

        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let _ = events_tx.send(res);
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;
        watcher.watch(self.watch_dir(), RecursiveMode::NonRecursive)?;
        tracing::info!(provider = %self.name, path = %self.path.display(), "Watching configuration file");

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::debug!(provider = %self.name, "File provider stopping");
                    return Ok(());
                }
                event = events_rx.recv() => match event {
                    None => return Ok(()),
                    Some(Ok(event)) if self.is_target(&event) => match self.load() {
                        Ok(configuration) => {
                            tracing::info!(provider = %self.name, "Configuration file changed");
                            self.emit(&tx, configuration).await?;
                        }
                        Err(e) => {
                            tracing::error!(provider = %self.name, error = %e, "Failed to reload configuration file, keeping previous");
                        }
                    },
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::error!(provider = %self.name, error = %e, "Watch error");
                    }
                },
            }
        }
    }
}

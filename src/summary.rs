use crate::error::{Error, Result};
use burn::config::Config;
use burn::train::logger::{FileLogger, Logger};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub const GRAPH_NAME: &str = "graph.json";

/// Writes step-indexed scalar summaries for external visualization.
///
/// Each tag gets its own `<tag>.log` file in the log directory, one
/// `<step>,<value>` line per call to [`SummaryWriter::add_scalar`].
/// A writer starts every tag file afresh, so the files only hold the current run.
/// Lines reach the disk once the writer is closed or dropped.
pub struct SummaryWriter {
    directory: PathBuf,
    loggers: HashMap<String, FileLogger>,
}

impl SummaryWriter {
    pub fn create(directory: &Path) -> Result<Self> {
        std::fs::create_dir_all(directory).map_err(|e| Error::io(directory, e))?;
        Ok(Self {
            directory: directory.to_path_buf(),
            loggers: HashMap::new(),
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn file_path(&self, tag: &str) -> PathBuf {
        let name = tag.replace(' ', "_");
        self.directory.join(format!("{name}.log"))
    }

    /// Stores the description of the model next to the scalars.
    pub fn add_graph(&self, graph: &impl Config) -> Result<()> {
        let path = self.directory.join(GRAPH_NAME);
        graph.save(&path).map_err(|e| Error::io(path, e))
    }

    pub fn add_scalar(&mut self, tag: &str, value: f64, step: usize) -> Result<()> {
        let logger = match self.loggers.get_mut(tag) {
            Some(logger) => logger,
            None => {
                let path = self.file_path(tag);
                match std::fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => return Err(Error::io(path, e)),
                }
                self.loggers
                    .entry(tag.to_string())
                    .or_insert(FileLogger::new(path))
            }
        };
        logger.log(format!("{step},{value}"));
        Ok(())
    }

    /// Flushes and closes every tag file.
    pub fn close(self) {
        drop(self.loggers);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ConvNetConfig;

    #[test]
    fn scalars_are_written_per_tag() {
        let dir = temp_dir::TempDir::new().unwrap();
        let logs = dir.path().join("logs");
        let mut summary = SummaryWriter::create(&logs).unwrap();
        summary.add_scalar("loss", 2.5, 128).unwrap();
        summary.add_scalar("accuracy", 0.25, 128).unwrap();
        summary.add_scalar("loss", 1.5, 256).unwrap();
        summary.close();

        let loss = std::fs::read_to_string(logs.join("loss.log")).unwrap();
        assert_eq!(loss, "128,2.5\n256,1.5\n");
        let accuracy = std::fs::read_to_string(logs.join("accuracy.log")).unwrap();
        assert_eq!(accuracy, "128,0.25\n");
    }

    #[test]
    fn a_new_writer_replaces_previous_scalars() {
        let dir = temp_dir::TempDir::new().unwrap();
        for value in [1.0, 2.0] {
            let mut summary = SummaryWriter::create(dir.path()).unwrap();
            summary.add_scalar("loss", value, 8).unwrap();
            summary.add_scalar("loss", value, 16).unwrap();
            summary.close();
        }

        let loss = std::fs::read_to_string(dir.path().join("loss.log")).unwrap();
        assert_eq!(loss, "8,2\n16,2\n");
    }

    #[test]
    fn graph_is_the_model_config() {
        let dir = temp_dir::TempDir::new().unwrap();
        let summary = SummaryWriter::create(dir.path()).unwrap();
        let config = ConvNetConfig::new().with_keep_prob(0.5);
        summary.add_graph(&config).unwrap();

        let loaded = ConvNetConfig::load(dir.path().join(GRAPH_NAME)).unwrap();
        assert_eq!(loaded.keep_prob, 0.5);
    }
}

use crate::backend::RecorderTy;
use crate::error::{Error, Result};
use crate::model::{ConvNet, ConvNetConfig, ModelConfigExt};
use crate::training::TrainingConfig;
use burn::prelude::*;
use burn::record::FileRecorder;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

pub const MANIFEST_NAME: &str = "saved_model.json";
pub const MODEL_CONFIG_NAME: &str = "model_config.json";
pub const TRAINING_CONFIG_NAME: &str = "training_config.json";
pub const VARIABLES_DIR: &str = "variables";
pub const MODEL_NAME: &str = "model";

/// Tag under which the trained model is exported.
pub const EVALUATING_TAG: &str = "EVALUATING";

/// Describes the content of an export directory.
/// Paths are relative to that directory.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SavedModelManifest {
    pub tags: Vec<String>,
    pub model_config: PathBuf,
    pub training_config: PathBuf,
    pub variables: PathBuf,
}

/// Removes a previous export, an absent directory is not an error.
pub fn remove_saved_model(export_dir: &Path) {
    match std::fs::remove_dir_all(export_dir) {
        Ok(()) => info!("Removed previous model directory {export_dir:?}"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {export_dir:?}: {e}"),
    }
}

/// Writes a model, its configs and its parameters into an export directory.
pub struct SavedModelBuilder {
    export_dir: PathBuf,
    manifest: Option<SavedModelManifest>,
}

impl SavedModelBuilder {
    /// Fails when `export_dir` already exists and is not empty, or cannot be listed.
    pub fn new(export_dir: &Path) -> Result<Self> {
        let occupied = match std::fs::read_dir(export_dir) {
            Ok(mut entries) => entries.next().is_some(),
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => return Err(Error::io(export_dir, e)),
        };
        if occupied {
            return Err(Error::ExportDirExists(export_dir.to_path_buf()));
        }
        Ok(Self {
            export_dir: export_dir.to_path_buf(),
            manifest: None,
        })
    }

    pub fn export_dir(&self) -> &Path {
        &self.export_dir
    }

    /// Records the model description and its current parameter values under `tags`.
    pub fn add_model_and_variables<B: Backend>(
        &mut self,
        model: &ConvNet<B>,
        model_config: &ConvNetConfig,
        training_config: &TrainingConfig,
        tags: &[&str],
    ) -> Result<()> {
        let variables_dir = self.export_dir.join(VARIABLES_DIR);
        std::fs::create_dir_all(&variables_dir).map_err(|e| Error::io(&variables_dir, e))?;

        let path = self.export_dir.join(MODEL_CONFIG_NAME);
        model_config.save(&path).map_err(|e| Error::io(path, e))?;
        let path = self.export_dir.join(TRAINING_CONFIG_NAME);
        training_config.save(&path).map_err(|e| Error::io(path, e))?;

        let path = variables_dir.join(MODEL_NAME);
        let file_ext = <RecorderTy as FileRecorder<B>>::file_extension();
        info!("Saving model to {:?}", path.with_extension(file_ext));
        model
            .clone()
            .save_file(path, &RecorderTy::new())?; // ext added automatically

        self.manifest = Some(SavedModelManifest {
            tags: tags.iter().map(|tag| tag.to_string()).collect(),
            model_config: MODEL_CONFIG_NAME.into(),
            training_config: TRAINING_CONFIG_NAME.into(),
            variables: Path::new(VARIABLES_DIR)
                .join(MODEL_NAME)
                .with_extension(file_ext),
        });
        Ok(())
    }

    /// Writes the manifest and syncs it to disk.
    pub fn save(self) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.export_dir).map_err(|e| Error::io(&self.export_dir, e))?;
        let manifest = self.manifest.unwrap_or_else(|| SavedModelManifest {
            tags: Vec::new(),
            model_config: MODEL_CONFIG_NAME.into(),
            training_config: TRAINING_CONFIG_NAME.into(),
            variables: PathBuf::new(),
        });

        let path = self.export_dir.join(MANIFEST_NAME);
        let json = serde_json::to_vec_pretty(&manifest)?;
        let mut file = File::create(&path).map_err(|e| Error::io(&path, e))?;
        file.write_all(&json).map_err(|e| Error::io(&path, e))?;
        file.sync_all().map_err(|e| Error::io(&path, e))?;

        info!("Saved model tagged {:?} into {:?}", manifest.tags, self.export_dir);
        Ok(self.export_dir)
    }
}

/// Reads back an export written by [`SavedModelBuilder`].
pub fn load_saved_model<B: Backend>(
    export_dir: &Path,
    device: &B::Device,
) -> Result<(SavedModelManifest, ConvNetConfig, ConvNet<B>)> {
    let path = export_dir.join(MANIFEST_NAME);
    let json = std::fs::read(&path).map_err(|e| Error::io(&path, e))?;
    let manifest: SavedModelManifest = serde_json::from_slice(&json)?;

    let model_config = ConvNetConfig::load(export_dir.join(&manifest.model_config))?;
    let model = ModelConfigExt::<B>::init(&model_config, device).load_file(
        export_dir.join(&manifest.variables),
        &RecorderTy::new(),
        device,
    )?;
    Ok((manifest, model_config, model))
}

use std::{
    collections::BTreeSet,
    fmt,
    path::{Path, PathBuf},
};

use burn::{
    module::Module,
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder},
};
use burn_import::pytorch::{LoadArgs, PyTorchFileRecorder};
use tracing::{debug, info};

use crate::{
    download,
    error::Result,
    model::mae::{MaskedAutoencoderViT, MaskedAutoencoderViTRecord},
};

/// Pixel-target MAE ViT-Large, trained with a 0.75 mask ratio, for visualization.
pub const DEFAULT_CHECKPOINT_PATH: &str = "resources/mae_visualize_vit_large.pth";
pub const DEFAULT_CHECKPOINT_URL: &str =
    "https://dl.fbaipublicfiles.com/mae/visualize/mae_visualize_vit_large.pth";

/// Entry of the PyTorch checkpoint holding the state dict.
pub const STATE_DICT_KEY: &str = "model";


/// Downloads the checkpoint to `path` unless it is already there.
pub fn ensure_checkpoint(path: impl AsRef<Path>, url: &str) -> Result<PathBuf> {
    download::ensure_file(path, url)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointFormat {
    /// Pickled PyTorch state dict (`.pth`, `.pt`).
    PyTorch,
    /// Burn named message pack record (`.mpk`).
    Burn,
}

impl CheckpointFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("mpk") => CheckpointFormat::Burn,
            _ => CheckpointFormat::PyTorch,
        }
    }
}


/// Parameter names that did not line up during a permissive load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Expected by the model, absent from the checkpoint.
    pub missing_keys: Vec<String>,
    /// Present in the checkpoint, unknown to the model.
    pub unexpected_keys: Vec<String>,
}

impl LoadReport {
    pub fn compare<E, F>(expected: E, found: F) -> Self
    where
        E: IntoIterator<Item = String>,
        F: IntoIterator<Item = String>,
    {
        let expected: BTreeSet<String> = expected.into_iter().collect();
        let found: BTreeSet<String> = found.into_iter().collect();

        Self {
            missing_keys: expected.difference(&found).cloned().collect(),
            unexpected_keys: found.difference(&expected).cloned().collect(),
        }
    }

    pub fn is_exact(&self) -> bool {
        self.missing_keys.is_empty() && self.unexpected_keys.is_empty()
    }

    pub fn log(&self) {
        if self.is_exact() {
            info!("checkpoint matches the model exactly");
            return;
        }

        info!(
            missing = self.missing_keys.len(),
            unexpected = self.unexpected_keys.len(),
            "checkpoint loaded non-strictly",
        );
        for key in &self.missing_keys {
            debug!(key, "missing from checkpoint");
        }
        for key in &self.unexpected_keys {
            debug!(key, "ignored checkpoint entry");
        }
    }
}

impl fmt::Display for LoadReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "missing_keys={:?}, unexpected_keys={:?}",
            self.missing_keys, self.unexpected_keys
        )
    }
}


/// Tensor names stored under [`STATE_DICT_KEY`] in a PyTorch checkpoint.
pub fn checkpoint_keys(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let infos = candle_core::pickle::read_pth_tensor_info(path, false, Some(STATE_DICT_KEY))?;
    Ok(infos.into_iter().map(|info| info.name).collect())
}

/// Loads `path` into `model`, tolerating name mismatches.
///
/// PyTorch checkpoints are compared against the model's parameter names first;
/// entries the model does not know are skipped by the recorder. Burn records are
/// produced from this model and load exactly.
pub fn load_weights<B: Backend>(
    model: MaskedAutoencoderViT<B>,
    path: &Path,
    device: &B::Device,
) -> Result<(MaskedAutoencoderViT<B>, LoadReport)> {
    match CheckpointFormat::from_path(path) {
        CheckpointFormat::PyTorch => {
            let report = LoadReport::compare(model.parameter_names(), checkpoint_keys(path)?);
            report.log();

            let args = LoadArgs::new(path.to_path_buf()).with_top_level_key(STATE_DICT_KEY);
            let record: MaskedAutoencoderViTRecord<B> =
                PyTorchFileRecorder::<FullPrecisionSettings>::default().load(args, device)?;

            Ok((model.load_record(record), report))
        }
        CheckpointFormat::Burn => {
            let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
            let model = model.load_file(path.to_path_buf(), &recorder, device)?;

            Ok((model, LoadReport::default()))
        }
    }
}

/// Writes `model` as a burn record next to `path` (extension replaced by `.mpk`).
pub fn save_burn_record<B: Backend>(
    model: MaskedAutoencoderViT<B>,
    path: impl AsRef<Path>,
) -> Result<PathBuf> {
    let output = path.as_ref().with_extension("mpk");
    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    model.save_file(output.clone(), &recorder)?;

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(keys: &[&str]) -> Vec<String> {
        keys.iter().map(|key| key.to_string()).collect()
    }

    #[test]
    fn report_splits_missing_and_unexpected() {
        let report = LoadReport::compare(
            names(&["norm.weight", "norm.bias", "cls_token"]),
            names(&["cls_token", "norm.bias", "head.weight"]),
        );

        assert_eq!(report.missing_keys, names(&["norm.weight"]));
        assert_eq!(report.unexpected_keys, names(&["head.weight"]));
        assert!(!report.is_exact());
    }

    #[test]
    fn identical_names_are_exact() {
        let keys = names(&["pos_embed", "mask_token"]);
        let report = LoadReport::compare(keys.clone(), keys.into_iter().rev());

        assert!(report.is_exact());
        assert_eq!(report.to_string(), "missing_keys=[], unexpected_keys=[]");
    }

    #[test]
    fn format_follows_extension() {
        assert_eq!(
            CheckpointFormat::from_path(Path::new("resources/mae.pth")),
            CheckpointFormat::PyTorch
        );
        assert_eq!(
            CheckpointFormat::from_path(Path::new("resources/mae.mpk")),
            CheckpointFormat::Burn
        );
    }

    #[test]
    fn lists_state_dict_entries_of_a_pytorch_file() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("tests/fixtures/mae_tiny_extra_key.pth");
        let keys = checkpoint_keys(&path).unwrap();

        // one-block encoder and decoder plus the extra head
        assert_eq!(keys.len(), 4 + 2 + 12 + 2 + 2 + 12 + 2 + 2 + 1);
        assert!(keys.contains(&"head.weight".to_string()));
        assert!(keys.contains(&"decoder_pos_embed".to_string()));
    }

    #[cfg(feature = "backend_ndarray")]
    #[test]
    fn burn_record_round_trips_through_load_weights() {
        use crate::model::mae::MaskedAutoencoderConfig;

        type TestBackend = burn::backend::NdArray<f32>;

        let device = Default::default();
        let config = MaskedAutoencoderConfig::from_dims(32, 8, 32, 1, 4, 16, 1, 2);
        let model = config.init::<TestBackend>(&device);
        let expected = model.parameter_names();

        let dir = tempfile::tempdir().unwrap();
        let record = save_burn_record(model, dir.path().join("tiny.pth")).unwrap();
        assert!(record.exists());

        let (loaded, report) =
            load_weights(config.init::<TestBackend>(&device), &record, &device).unwrap();

        assert!(report.is_exact());
        assert_eq!(loaded.parameter_names(), expected);
    }
}

use std::fs;
use std::path::PathBuf;

use burn::module::{Module, ModuleVisitor, ParamId};
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use burn::tensor::Tensor;
use burn::tensor::backend::Backend;

use crate::error::{Error, Result};
use crate::model::Generator;

/// Full precision so a restored generator reproduces the saved one exactly.
pub type CheckpointRecorder = NamedMpkFileRecorder<FullPrecisionSettings>;

const PREFIX: &str = "checkpoint-";
const EXTENSION: &str = "mpk";

/// Which checkpoint to restore.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CheckpointTag {
    Latest,
    /// `checkpoint-13` or just `13`
    Named(String),
}

impl From<Option<String>> for CheckpointTag {
    fn from(name: Option<String>) -> Self {
        name.map_or(Self::Latest, Self::Named)
    }
}

/// Shapes of every float parameter, in visiting order.
#[derive(Default)]
struct ParamShapes(Vec<Vec<usize>>);

impl<B: Backend> ModuleVisitor<B> for ParamShapes {
    fn visit_float<const D: usize>(&mut self, _id: ParamId, tensor: &Tensor<B, D>) {
        self.0.push(tensor.dims().to_vec());
    }
}

fn param_shapes<B: Backend, M: Module<B>>(module: &M) -> Vec<Vec<usize>> {
    let mut shapes = ParamShapes::default();
    module.visit(&mut shapes);
    shapes.0
}

/// Outcome of a restore: the parameter shapes the architecture declares and the
/// ones the checkpoint provided. Loading keeps the record's ids, so the two are
/// matched by position.
#[derive(Clone, Debug)]
pub struct RestoreStatus {
    pub path: PathBuf,
    pub expected: Vec<Vec<usize>>,
    pub restored: Vec<Vec<usize>>,
}

impl RestoreStatus {
    /// Parameters restored with the declared shape.
    pub fn matching(&self) -> usize {
        self.expected
            .iter()
            .zip(&self.restored)
            .filter(|(expected, restored)| expected == restored)
            .count()
    }

    pub fn assert_all_loaded(&self) -> Result<()> {
        let matching = self.matching();
        if matching != self.expected.len() || self.restored.len() != self.expected.len() {
            if let Some((i, (expected, restored))) = self
                .expected
                .iter()
                .zip(&self.restored)
                .enumerate()
                .find(|(_, (expected, restored))| expected != restored)
            {
                tracing::error!(
                    "parameter {i}: expected shape {expected:?}, restored {restored:?}"
                );
            }
            return Err(Error::CheckpointIncomplete {
                path: self.path.clone(),
                expected: self.expected.len(),
                actual: matching,
            });
        }
        Ok(())
    }
}

/// Directory of generator checkpoints named `checkpoint-<step>.mpk`.
pub struct CheckpointStore {
    dir: PathBuf,
    recorder: CheckpointRecorder,
}

impl CheckpointStore {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self {
            dir: dir.into(),
            recorder: CheckpointRecorder::new(),
        }
    }

    fn path_of(&self, name: &str) -> PathBuf {
        let stem = if name.starts_with(PREFIX) {
            name.to_string()
        } else {
            format!("{PREFIX}{name}")
        };
        self.dir.join(stem).with_extension(EXTENSION)
    }

    /// Persists the generator parameters. The file only appears under its final
    /// name once it is completely written.
    pub fn save<B: Backend>(&self, generator: &Generator<B>, step: usize) -> Result<PathBuf> {
        let staging = self.dir.join(".staging");
        fs::create_dir_all(&staging)?;

        let name = format!("{PREFIX}{step}");
        generator
            .clone()
            .save_file(staging.join(&name), &self.recorder)?;

        let path = self.path_of(&name);
        let staged = staging.join(path.file_name().unwrap_or_default());
        fs::rename(&staged, &path)?;
        tracing::info!("saved checkpoint {}", path.display());

        Ok(path)
    }

    /// Checkpoint with the highest step, if any.
    pub fn latest(&self) -> Result<Option<PathBuf>> {
        if !self.dir.is_dir() {
            return Ok(None);
        }

        let mut latest: Option<(usize, PathBuf)> = None;
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let step = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.strip_prefix(PREFIX))
                .and_then(|s| s.parse::<usize>().ok());
            let Some(step) = step else {
                continue;
            };
            if latest.as_ref().is_none_or(|(best, _)| step > *best) {
                latest = Some((step, path));
            }
        }

        Ok(latest.map(|(_, path)| path))
    }

    /// Loads generator parameters into `generator`, which must already have the
    /// architecture the checkpoint was saved from.
    pub fn restore<B: Backend>(
        &self,
        generator: Generator<B>,
        tag: &CheckpointTag,
        device: &B::Device,
    ) -> Result<(Generator<B>, RestoreStatus)> {
        let path = match tag {
            CheckpointTag::Latest => self
                .latest()?
                .ok_or_else(|| Error::MissingAsset(self.dir.join(format!("{PREFIX}*"))))?,
            CheckpointTag::Named(name) => self.path_of(name),
        };
        if !path.is_file() {
            return Err(Error::MissingAsset(path));
        }
        tracing::info!("loading checkpoint at {}", path.display());

        let expected = param_shapes(&generator);
        let generator = generator.load_file(path.clone(), &self.recorder, device)?;
        let status = RestoreStatus {
            path,
            expected,
            restored: param_shapes(&generator),
        };

        Ok((generator, status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{LatentSampler, SphereTemplate};
    use crate::model::GeneratorConfig;
    use burn::backend::NdArray;

    type B = NdArray<f32>;

    fn scratch_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("pointcloud-gan-{name}-{}", std::process::id()))
    }

    #[test]
    fn restored_generator_reproduces_output() {
        let device = Default::default();
        let dir = scratch_dir("roundtrip");
        let store = CheckpointStore::new(&dir);
        let config = GeneratorConfig::new(8, 2).with_k(4);

        let saved = config.init::<B>(&device).unwrap();
        let path = store.save(&saved, 3).unwrap();
        assert_eq!(path, dir.join("checkpoint-3.mpk"));

        let fresh = config.init::<B>(&device).unwrap();
        let (restored, status) = store.restore(fresh, &CheckpointTag::Latest, &device).unwrap();
        status.assert_all_loaded().unwrap();

        let spheres = SphereTemplate::fibonacci(8)
            .to_tensor::<B>(&device)
            .unsqueeze::<3>()
            .repeat_dim(0, 2);
        let latent = LatentSampler::new(5).sample::<B>(2, 2, &device);
        let expected = saved.generate(spheres.clone(), latent.clone()).unwrap();
        let actual = restored.generate(spheres, latent).unwrap();
        fs::remove_dir_all(&dir).ok();

        actual.into_data().assert_eq(&expected.into_data(), true);
    }

    #[test]
    fn latest_picks_highest_step() {
        let device = Default::default();
        let dir = scratch_dir("latest");
        let store = CheckpointStore::new(&dir);
        let generator = GeneratorConfig::new(8, 2)
            .with_k(4)
            .init::<B>(&device)
            .unwrap();

        for step in [2, 10, 9] {
            store.save(&generator, step).unwrap();
        }
        let latest = store.latest().unwrap();
        let named = store.path_of("9");
        fs::remove_dir_all(&dir).ok();

        assert_eq!(latest, Some(dir.join("checkpoint-10.mpk")));
        assert_eq!(named, dir.join("checkpoint-9.mpk"));
    }

    #[test]
    fn other_architecture_is_incomplete() {
        let device = Default::default();
        let dir = scratch_dir("mismatch");
        let store = CheckpointStore::new(&dir);

        let saved = GeneratorConfig::new(8, 2)
            .with_k(4)
            .init::<B>(&device)
            .unwrap();
        store.save(&saved, 1).unwrap();

        let other = GeneratorConfig::new(8, 6)
            .with_k(4)
            .init::<B>(&device)
            .unwrap();
        let restored = store.restore(other, &CheckpointTag::Named("checkpoint-1".into()), &device);
        fs::remove_dir_all(&dir).ok();

        let (_, status) = restored.unwrap();
        assert!(matches!(
            status.assert_all_loaded(),
            Err(Error::CheckpointIncomplete { .. })
        ));
    }

    #[test]
    fn same_parameter_count_with_other_shapes_is_incomplete() {
        let device = Default::default();
        let dir = scratch_dir("reshaped");
        let store = CheckpointStore::new(&dir);
        let small = |embed: usize, stage1: usize| {
            GeneratorConfig::new(8, 2)
                .with_k(4)
                .with_d_feature_embed(embed)
                .with_d_stage1(stage1)
                .with_d_stage2(16)
                .with_d_global(32)
                .init::<B>(&device)
                .unwrap()
        };

        let saved = small(20, 5);
        let other = small(15, 10);
        assert_eq!(saved.num_params(), other.num_params());
        store.save(&saved, 1).unwrap();

        let restored = store.restore(other, &CheckpointTag::Latest, &device);
        fs::remove_dir_all(&dir).ok();

        let (_, status) = restored.unwrap();
        assert!(status.matching() < status.expected.len());
        assert!(matches!(
            status.assert_all_loaded(),
            Err(Error::CheckpointIncomplete { .. })
        ));
    }

    #[test]
    fn restoring_without_checkpoints_fails() {
        let device = Default::default();
        let store = CheckpointStore::new(scratch_dir("empty"));
        let generator = GeneratorConfig::new(8, 2)
            .with_k(4)
            .init::<B>(&device)
            .unwrap();

        assert!(matches!(
            store.restore(generator, &CheckpointTag::Latest, &device),
            Err(Error::MissingAsset(_))
        ));
    }
}

mod latent;
mod mesh;
mod preprocess;
mod sphere;

use std::fs;
use std::path::{Path, PathBuf};

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::prelude::Backend;
use burn::tensor::{Tensor, TensorData};
use rand::SeedableRng;
use rand::rngs::StdRng;

pub use latent::LatentSampler;
use mesh::{is_mesh_file, load_mesh};
use preprocess::{normalize_unit_sphere, sample_surface};
pub use sphere::SphereTemplate;

use crate::error::{Error, Result};

/// One normalized cloud sampled from a mesh, `num_points * 3` coordinates.
#[derive(Clone, Debug)]
pub struct PointCloudItem {
    pub points: Vec<f32>,
}

/// Real clouds, kept in memory for the whole run.
pub struct PointCloudDataset {
    pub items: Vec<PointCloudItem>,
}

impl Dataset<PointCloudItem> for PointCloudDataset {
    fn get(&self, index: usize) -> Option<PointCloudItem> {
        self.items.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

impl PointCloudDataset {
    /// Loads every `.off` / `.stl` mesh of a directory and samples each of them
    /// `samples_per_mesh` times.
    pub fn from_dir<P: AsRef<Path>>(
        dir: P,
        num_points: usize,
        samples_per_mesh: usize,
        seed: u64,
    ) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(Error::MissingAsset(dir.to_path_buf()));
        }
        tracing::info!("Loading meshes from: {}", dir.display());

        let mut paths = fs::read_dir(dir)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<std::io::Result<Vec<PathBuf>>>()?;
        paths.retain(|path| is_mesh_file(path));
        paths.sort();
        if paths.is_empty() {
            return Err(Error::EmptyDataset(dir.to_path_buf()));
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let mut items = Vec::with_capacity(paths.len() * samples_per_mesh);
        for path in &paths {
            tracing::debug!("Processing: {}", path.display());
            let mesh = load_mesh(path)?;
            for _ in 0..samples_per_mesh {
                let points = sample_surface(&mesh, num_points, path, &mut rng)?;
                items.push(PointCloudItem {
                    points: normalize_unit_sphere(points)?,
                });
            }
        }

        tracing::info!(
            "Loaded {} point clouds from {} meshes",
            items.len(),
            paths.len()
        );
        Ok(Self { items })
    }
}

#[derive(Clone, Debug)]
pub struct PointCloudBatch<B: Backend> {
    /// `[B, N, 3]`
    pub points: Tensor<B, 3>,
}

/// Stacks items into a `[B, N, 3]` tensor.
#[derive(Clone)]
pub struct PointCloudBatcher {
    num_points: usize,
}

impl PointCloudBatcher {
    pub fn new(num_points: usize) -> Self {
        Self { num_points }
    }
}

impl<B: Backend> Batcher<B, PointCloudItem, PointCloudBatch<B>> for PointCloudBatcher {
    fn batch(&self, items: Vec<PointCloudItem>, device: &B::Device) -> PointCloudBatch<B> {
        let shape = [items.len(), self.num_points, 3];
        let values = items
            .into_iter()
            .flat_map(|item| item.points)
            .collect::<Vec<f32>>();

        PointCloudBatch {
            points: Tensor::from_data(TensorData::new(values, shape), device),
        }
    }
}

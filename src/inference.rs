use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use burn::prelude::*;

use crate::checkpoint::{CheckpointStore, CheckpointTag};
use crate::data::{LatentSampler, SphereTemplate};
use crate::error::{Error, Result};
use crate::training::{TrainingConfig, checkpoint_dir, cloud_points};

/// Latent vectors to generate from.
pub enum LatentSource {
    /// One cloud per explicit latent vector.
    Explicit(Vec<f32>),
    /// `count` standard-normal latent vectors.
    Sampled { count: usize, seed: u64 },
}

/// Restores a trained generator and writes every generated cloud as
/// `generated-<i>.vtk` and `generated-<i>.xyz` in the artifact directory.
pub fn infer<B: Backend>(
    artifact_dir: &Path,
    sphere_path: &Path,
    checkpoint: &CheckpointTag,
    latent: LatentSource,
    device: B::Device,
) -> Result<Vec<PathBuf>> {
    if let LatentSource::Sampled { count: 0, .. } = latent {
        return Err(Error::InvalidConfig("at least one cloud must be generated".into()));
    }
    let config = TrainingConfig::load(artifact_dir.join("config.json"))?;
    let sphere = SphereTemplate::load_xyz(sphere_path, config.num_points())?;

    let store = CheckpointStore::new(checkpoint_dir(artifact_dir));
    let (generator, status) =
        store.restore(config.generator.init::<B>(&device)?, checkpoint, &device)?;
    status.assert_all_loaded()?;

    let latent_dim = generator.latent_dim();
    let latent = match latent {
        LatentSource::Explicit(values) => {
            if values.is_empty() || values.len() % latent_dim != 0 {
                return Err(Error::shape(
                    "latent parameters",
                    &[latent_dim],
                    &[values.len()],
                ));
            }
            let count = values.len() / latent_dim;
            Tensor::from_data(TensorData::new(values, [count, latent_dim]), &device)
        }
        LatentSource::Sampled { count, seed } => {
            LatentSampler::new(seed).sample::<B>(count, latent_dim, &device)
        }
    };
    let count = latent.dims()[0];

    let spheres = sphere.to_tensor::<B>(&device).unsqueeze::<3>().repeat_dim(0, count);
    let clouds = generator.generate(spheres, latent)?;

    let output_dir = artifact_dir.join("generated");
    fs::create_dir_all(&output_dir)?;
    let mut written = Vec::with_capacity(count);
    for i in 0..count {
        let cloud = clouds
            .clone()
            .narrow(0, i, 1)
            .reshape([config.num_points(), 3]);
        let points = cloud_points(cloud)?;

        let path = output_dir.join(format!("generated-{i}.vtk"));
        write_vtk_legacy(&points, &path)?;
        write_xyz(&points, &path.with_extension("xyz"))?;
        tracing::info!("wrote {}", path.display());
        written.push(path);
    }

    Ok(written)
}

pub fn write_vtk_legacy(points: &[[f32; 3]], path: &Path) -> std::io::Result<()> {
    let mut w = BufWriter::new(File::create(path)?);

    // --- VTK header ---
    writeln!(w, "# vtk DataFile Version 3.0")?;
    writeln!(w, "Generated point cloud")?;
    writeln!(w, "ASCII")?;
    writeln!(w, "DATASET UNSTRUCTURED_GRID")?;

    // --- Points ---
    writeln!(w, "POINTS {} float", points.len())?;
    for &[x, y, z] in points {
        writeln!(w, "{x} {y} {z}")?;
    }

    // --- Cells (one vertex per cell) ---
    writeln!(w, "CELLS {} {}", points.len(), points.len() * 2)?;
    for i in 0..points.len() {
        writeln!(w, "1 {i}")?; // 1 = number of indices, i = vertex id
    }

    // --- Cell types (all are VTK_VERTEX = 1) ---
    writeln!(w, "CELL_TYPES {}", points.len())?;
    for _ in 0..points.len() {
        writeln!(w, "1")?;
    }

    w.flush()
}

fn write_xyz(points: &[[f32; 3]], path: &Path) -> std::io::Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    for &[x, y, z] in points {
        writeln!(w, "{x} {y} {z}")?;
    }
    w.flush()
}

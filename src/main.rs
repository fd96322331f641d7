#![recursion_limit = "131"]
mod checkpoint;
mod data;
mod error;
mod inference;
mod model;
mod training;

use std::path::PathBuf;

use burn::backend::{Autodiff, Wgpu};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::checkpoint::CheckpointTag;
use crate::data::SphereTemplate;
use crate::inference::LatentSource;
use crate::model::{DiscriminatorConfig, GeneratorConfig};
use crate::training::TrainingConfig;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train the generator and discriminator on a directory of meshes.
    Train {
        /// Directory holding `.off` / `.stl` meshes.
        #[arg(long, default_value = "blueno_dataset")]
        dataset: PathBuf,
        /// Template sphere, one `x y z` point per line.
        #[arg(long)]
        sphere: PathBuf,
        #[arg(long, default_value = "artifacts")]
        artifacts: PathBuf,
        #[arg(long, default_value_t = 10)]
        epochs: usize,
        #[arg(long, default_value_t = 32)]
        batch_size: usize,
        #[arg(long, default_value_t = 2.0e-4)]
        lr_g: f64,
        #[arg(long, default_value_t = 1.0e-4)]
        lr_d: f64,
        #[arg(long, default_value_t = 0.1)]
        per_point_loss_weight: f64,
        #[arg(long, default_value_t = 1024)]
        num_points: usize,
        #[arg(long, default_value_t = 50)]
        latent_dim: usize,
        /// Neighbours per point in the graph attention blocks.
        #[arg(long, default_value_t = 20)]
        k: usize,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        #[arg(long, default_value_t = 1)]
        samples_per_mesh: usize,
        /// Epochs between checkpoints.
        #[arg(long, default_value_t = 1)]
        checkpoint_interval: usize,
        /// Batches between snapshots of a generated cloud, 0 disables them.
        #[arg(long, default_value_t = 50)]
        snapshot_interval: usize,
    },
    /// Generate point clouds from a trained generator
    Generate {
        #[arg(long, default_value = "artifacts")]
        artifacts: PathBuf,
        #[arg(long)]
        sphere: PathBuf,
        /// Checkpoint name or step, the latest one when omitted.
        #[arg(long)]
        checkpoint: Option<String>,
        /// Number of clouds sampled from random latent vectors.
        #[arg(long, default_value_t = 1)]
        count: usize,
        #[arg(long, default_value_t = 0)]
        seed: u64,
        /// Explicit latent parameters, concatenated; overrides `--count`.
        #[arg(short, long, num_args = 1.., allow_negative_numbers = true)]
        latent: Vec<f32>,
    },
    /// Write a Fibonacci sphere template.
    Sphere {
        #[arg(long, default_value_t = 1024)]
        num_points: usize,
        #[arg(long)]
        output: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    type MyBackend = Wgpu<f32, i32>;
    type MyAutodiffBackend = Autodiff<MyBackend>;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("pointcloud_gan=info")),
        )
        .init();

    let cli = Cli::parse();
    let device = burn::backend::wgpu::WgpuDevice::default();

    match cli.command {
        Commands::Train {
            dataset,
            sphere,
            artifacts,
            epochs,
            batch_size,
            lr_g,
            lr_d,
            per_point_loss_weight,
            num_points,
            latent_dim,
            k,
            seed,
            samples_per_mesh,
            checkpoint_interval,
            snapshot_interval,
        } => {
            let config = TrainingConfig::new(
                GeneratorConfig::new(num_points, latent_dim).with_k(k),
                DiscriminatorConfig::new(num_points),
            )
            .with_num_epochs(epochs)
            .with_batch_size(batch_size)
            .with_learning_rate_g(lr_g)
            .with_learning_rate_d(lr_d)
            .with_per_point_loss_weight(per_point_loss_weight)
            .with_seed(seed)
            .with_samples_per_mesh(samples_per_mesh)
            .with_checkpoint_interval(checkpoint_interval)
            .with_snapshot_interval(snapshot_interval);

            let start = std::time::Instant::now();
            let history = training::train::<MyAutodiffBackend>(
                &artifacts, &dataset, &sphere, config, device,
            )?;
            tracing::info!(
                "training finished in {:?} after {} batches",
                start.elapsed(),
                history.generator.len()
            );
        }
        Commands::Generate {
            artifacts,
            sphere,
            checkpoint,
            count,
            seed,
            latent,
        } => {
            let source = if latent.is_empty() {
                LatentSource::Sampled { count, seed }
            } else {
                LatentSource::Explicit(latent)
            };
            let written = inference::infer::<MyBackend>(
                &artifacts,
                &sphere,
                &CheckpointTag::from(checkpoint),
                source,
                device,
            )?;
            tracing::info!("generated {} point clouds", written.len());
        }
        Commands::Sphere { num_points, output } => {
            SphereTemplate::fibonacci(num_points).write_xyz(&output)?;
            tracing::info!("wrote {num_points} sphere points to {}", output.display());
        }
    }

    Ok(())
}

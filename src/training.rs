use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use burn::data::dataloader::DataLoaderBuilder;
use burn::module::Module;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::ElementConversion;
use burn::tensor::backend::AutodiffBackend;

use crate::checkpoint::CheckpointStore;
use crate::data::{
    LatentSampler, PointCloudBatch, PointCloudBatcher, PointCloudDataset, SphereTemplate,
};
use crate::error::{self, Error, ensure_finite};
use crate::inference::write_vtk_legacy;
use crate::model::{
    Discriminator, DiscriminatorConfig, Generator, GeneratorConfig, discriminator_loss,
    generator_loss,
};

#[derive(Config)]
pub struct TrainingConfig {
    pub generator: GeneratorConfig,
    pub discriminator: DiscriminatorConfig,
    #[config(default = "AdamConfig::new().with_beta_1(0.5)")]
    pub optimizer_g: AdamConfig,
    #[config(default = "AdamConfig::new().with_beta_1(0.5)")]
    pub optimizer_d: AdamConfig,
    #[config(default = 10)]
    pub num_epochs: usize,
    #[config(default = 32)]
    pub batch_size: usize,
    #[config(default = 4)]
    pub num_workers: usize,
    #[config(default = 42)]
    pub seed: u64,
    #[config(default = 2.0e-4)]
    pub learning_rate_g: f64,
    #[config(default = 1.0e-4)]
    pub learning_rate_d: f64,
    #[config(default = 0.1)]
    pub per_point_loss_weight: f64,
    /// How many point clouds are sampled from every mesh.
    #[config(default = 1)]
    pub samples_per_mesh: usize,
    /// Epochs between generator checkpoints.
    #[config(default = 1)]
    pub checkpoint_interval: usize,
    /// Batches between generated-cloud snapshots, 0 disables them.
    #[config(default = 50)]
    pub snapshot_interval: usize,
}

impl TrainingConfig {
    pub fn num_points(&self) -> usize {
        self.generator.num_points
    }

    pub fn validate(&self) -> error::Result<()> {
        self.generator.validate()?;
        if self.discriminator.num_points != self.generator.num_points {
            return Err(Error::InvalidConfig(format!(
                "generator produces {} points but the discriminator expects {}",
                self.generator.num_points, self.discriminator.num_points
            )));
        }
        if self.batch_size == 0 || self.samples_per_mesh == 0 || self.checkpoint_interval == 0 {
            return Err(Error::InvalidConfig(
                "batch_size, samples_per_mesh and checkpoint_interval must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Where the training loop currently is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrainingPhase {
    Idle,
    BuildingBatch,
    TrainingDiscriminatorStep,
    TrainingGeneratorStep,
    Checkpointing,
    Done,
}

/// Loss of every trained batch, in order.
#[derive(Clone, Debug, Default)]
pub struct LossHistory {
    pub discriminator: Vec<f32>,
    pub generator: Vec<f32>,
}

impl LossHistory {
    pub fn save(&self, path: &Path) -> error::Result<()> {
        let value = serde_json::json!({
            "discriminator": self.discriminator,
            "generator": self.generator,
        });
        serde_json::to_writer_pretty(BufWriter::new(File::create(path)?), &value)
            .map_err(std::io::Error::from)?;
        Ok(())
    }
}

pub struct StepOutput<B: Backend> {
    pub d_loss: f32,
    pub g_loss: f32,
    /// Clouds the discriminator was trained against. `[B, N, 3]`
    pub generated: Tensor<B, 3>,
}

/// Alternates least-squares updates of the discriminator and the generator.
pub struct GanTrainer<B, OD, OG>
where
    B: AutodiffBackend,
    OD: Optimizer<Discriminator<B>, B>,
    OG: Optimizer<Generator<B>, B>,
{
    pub generator: Generator<B>,
    pub discriminator: Discriminator<B>,
    optimizer_d: OD,
    optimizer_g: OG,
    config: TrainingConfig,
    /// [N, 3]
    sphere: Tensor<B, 2>,
    sampler: LatentSampler,
    phase: TrainingPhase,
    history: LossHistory,
}

impl<B, OD, OG> GanTrainer<B, OD, OG>
where
    B: AutodiffBackend,
    OD: Optimizer<Discriminator<B>, B>,
    OG: Optimizer<Generator<B>, B>,
{
    pub fn new(
        config: TrainingConfig,
        generator: Generator<B>,
        discriminator: Discriminator<B>,
        optimizer_d: OD,
        optimizer_g: OG,
        sphere: &SphereTemplate,
        device: &B::Device,
    ) -> error::Result<Self> {
        config.validate()?;
        if sphere.len() != config.num_points() {
            return Err(Error::shape(
                "sphere template",
                &[config.num_points(), 3],
                &[sphere.len(), 3],
            ));
        }

        Ok(Self {
            generator,
            discriminator,
            optimizer_d,
            optimizer_g,
            sampler: LatentSampler::new(config.seed),
            sphere: sphere.to_tensor(device),
            config,
            phase: TrainingPhase::Idle,
            history: LossHistory::default(),
        })
    }

    pub fn phase(&self) -> TrainingPhase {
        self.phase
    }

    pub fn history(&self) -> &LossHistory {
        &self.history
    }

    /// The sphere template repeated for every cloud of the batch. `[B, N, 3]`
    fn spheres(&self, batch_size: usize) -> Tensor<B, 3> {
        self.sphere.clone().unsqueeze::<3>().repeat_dim(0, batch_size)
    }

    fn noise(&mut self, batch_size: usize) -> Tensor<B, 2> {
        let device = self.sphere.device();
        self.sampler
            .sample(batch_size, self.config.generator.latent_dim, &device)
    }

    /// One discriminator update on a real batch and a freshly generated one.
    /// The generator is only evaluated, its parameters are left untouched.
    pub fn discriminator_step(&mut self, real: Tensor<B, 3>) -> error::Result<(f32, Tensor<B, 3>)> {
        self.phase = TrainingPhase::BuildingBatch;
        let batch_size = real.dims()[0];
        let noise = self.noise(batch_size);
        let fake = self
            .generator
            .generate(self.spheres(batch_size), noise)?
            .detach();

        self.phase = TrainingPhase::TrainingDiscriminatorStep;
        let real_scores = self.discriminator.score(real)?;
        let fake_scores = self.discriminator.score(fake.clone())?;
        let loss = discriminator_loss(
            &real_scores,
            &fake_scores,
            self.config.per_point_loss_weight,
        );
        let value = ensure_finite("discriminator loss", loss.clone().into_scalar().elem())?;

        let grads = GradientsParams::from_grads(loss.backward(), &self.discriminator);
        self.discriminator = self.optimizer_d.step(
            self.config.learning_rate_d,
            self.discriminator.clone(),
            grads,
        );

        Ok((value, fake))
    }

    /// One generator update against a frozen copy of the discriminator.
    pub fn generator_step(&mut self, batch_size: usize) -> error::Result<f32> {
        self.phase = TrainingPhase::TrainingGeneratorStep;
        let noise = self.noise(batch_size);
        let fake = self.generator.generate(self.spheres(batch_size), noise)?;

        let critic = self.discriminator.clone().no_grad();
        let loss = generator_loss(&critic.score(fake)?, self.config.per_point_loss_weight);
        let value = ensure_finite("generator loss", loss.clone().into_scalar().elem())?;

        let grads = GradientsParams::from_grads(loss.backward(), &self.generator);
        self.generator =
            self.optimizer_g
                .step(self.config.learning_rate_g, self.generator.clone(), grads);

        Ok(value)
    }

    /// Trains the discriminator then the generator on one batch of real clouds.
    ///
    /// real: [B, N, 3]
    pub fn train_batch(&mut self, real: Tensor<B, 3>) -> error::Result<StepOutput<B>> {
        let batch_size = real.dims()[0];
        let (d_loss, generated) = self.discriminator_step(real)?;
        let g_loss = self.generator_step(batch_size)?;

        self.history.discriminator.push(d_loss);
        self.history.generator.push(g_loss);

        Ok(StepOutput {
            d_loss,
            g_loss,
            generated,
        })
    }

    /// Runs every epoch. `batches` is called once per epoch for a fresh pass over
    /// the dataset; incomplete batches are skipped.
    pub fn fit<F, I>(
        &mut self,
        mut batches: F,
        checkpoints: &CheckpointStore,
        artifact_dir: &Path,
    ) -> error::Result<()>
    where
        F: FnMut() -> I,
        I: IntoIterator<Item = PointCloudBatch<B>>,
    {
        let snapshot_dir = artifact_dir.join("snapshots");
        if self.config.snapshot_interval > 0 {
            std::fs::create_dir_all(&snapshot_dir)?;
        }

        for epoch in 1..=self.config.num_epochs {
            tracing::info!("================ Epoch: {epoch}/{}", self.config.num_epochs);

            for (batch_num, batch) in batches().into_iter().enumerate() {
                self.phase = TrainingPhase::BuildingBatch;
                let batch_size = batch.points.dims()[0];
                if batch_size != self.config.batch_size {
                    tracing::debug!("skipping incomplete batch of {batch_size} clouds");
                    continue;
                }

                let output = self.train_batch(batch.points)?;
                tracing::info!(
                    "epoch {epoch} batch {batch_num}: d_loss {:.5} g_loss {:.5}",
                    output.d_loss,
                    output.g_loss
                );

                if self.config.snapshot_interval > 0
                    && batch_num % self.config.snapshot_interval == 0
                {
                    let path = snapshot_dir.join(format!("epoch-{epoch}-batch-{batch_num}.vtk"));
                    write_vtk_legacy(&first_cloud(output.generated)?, &path)?;
                }
            }

            self.history.save(&artifact_dir.join("losses.json"))?;
            if epoch % self.config.checkpoint_interval == 0 {
                self.phase = TrainingPhase::Checkpointing;
                checkpoints.save(&self.generator, epoch)?;
            }
        }

        self.phase = TrainingPhase::Done;
        Ok(())
    }
}

/// First cloud of a batch as points. [B, N, 3] -> N x [x, y, z]
pub(crate) fn first_cloud<B: Backend>(clouds: Tensor<B, 3>) -> error::Result<Vec<[f32; 3]>> {
    let [_, num_points, _] = clouds.dims();
    cloud_points(clouds.narrow(0, 0, 1).reshape([num_points, 3]))
}

/// [N, 3] -> N x [x, y, z]
pub(crate) fn cloud_points<B: Backend>(cloud: Tensor<B, 2>) -> error::Result<Vec<[f32; 3]>> {
    let values = cloud
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| Error::InvalidConfig(format!("cannot read point cloud: {e:?}")))?;

    Ok(values.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect())
}

/// Creates the artifact directory. A directory that already holds a run is
/// left alone and rejected.
fn create_artifact_dir(artifact_dir: &Path) -> error::Result<()> {
    if artifact_dir.join("config.json").exists() {
        return Err(Error::InvalidConfig(format!(
            "{} already holds a training run, pick another --artifacts directory",
            artifact_dir.display()
        )));
    }
    std::fs::create_dir_all(artifact_dir)?;
    Ok(())
}

pub fn train<B: AutodiffBackend>(
    artifact_dir: &Path,
    dataset_dir: &Path,
    sphere_path: &Path,
    config: TrainingConfig,
    device: B::Device,
) -> error::Result<LossHistory> {
    config.validate()?;
    let sphere = SphereTemplate::load_xyz(sphere_path, config.num_points())?;
    let dataset = PointCloudDataset::from_dir(
        dataset_dir,
        config.num_points(),
        config.samples_per_mesh,
        config.seed,
    )?;

    create_artifact_dir(artifact_dir)?;
    config.save(artifact_dir.join("config.json"))?;

    B::seed(config.seed);

    let dataloader = DataLoaderBuilder::new(PointCloudBatcher::new(config.num_points()))
        .batch_size(config.batch_size)
        .shuffle(config.seed)
        .num_workers(config.num_workers)
        .build(dataset);

    let generator = config.generator.init::<B>(&device)?;
    let discriminator = config.discriminator.init::<B>(&device)?;
    tracing::info!(
        "generator: {} parameters, discriminator: {} parameters",
        generator.num_params(),
        discriminator.num_params()
    );

    let checkpoints = CheckpointStore::new(checkpoint_dir(artifact_dir));
    let mut trainer = GanTrainer::new(
        config.clone(),
        generator,
        discriminator,
        config.optimizer_d.init::<B, Discriminator<B>>(),
        config.optimizer_g.init::<B, Generator<B>>(),
        &sphere,
        &device,
    )?;
    trainer.fit(|| dataloader.iter(), &checkpoints, artifact_dir)?;
    tracing::debug!("trainer reached {:?}", trainer.phase());

    Ok(trainer.history().clone())
}

pub fn checkpoint_dir(artifact_dir: &Path) -> PathBuf {
    artifact_dir.join("training_checkpoints")
}

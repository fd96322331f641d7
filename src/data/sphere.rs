use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};

use crate::error::{Error, Result};

/// Fixed point set the generator deforms. Loaded once, never mutated.
#[derive(Clone, Debug, PartialEq)]
pub struct SphereTemplate {
    points: Vec<[f32; 3]>,
}

impl SphereTemplate {
    /// Uniformly spread points on the unit sphere (golden-angle spiral).
    pub fn fibonacci(num_points: usize) -> Self {
        let golden_ratio = (1.0 + 5.0_f64.sqrt()) / 2.0;
        let denominator = (num_points.max(2) - 1) as f64;

        let points = (0..num_points)
            .map(|i| {
                let theta = 2.0 * std::f64::consts::PI * (i as f64) / golden_ratio;
                let phi = (1.0 - 2.0 * (i as f64) / denominator).clamp(-1.0, 1.0).acos();
                [
                    (phi.sin() * theta.cos()) as f32,
                    (phi.sin() * theta.sin()) as f32,
                    phi.cos() as f32,
                ]
            })
            .collect();

        Self { points }
    }

    /// Reads an `.xyz` file: one `x y z` vertex per line, extra columns ignored.
    pub fn load_xyz(path: &Path, num_points: usize) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::MissingAsset(path.to_path_buf()));
        }
        let template = Self::parse_xyz(BufReader::new(File::open(path)?), path)?;
        if template.len() != num_points {
            return Err(Error::shape("sphere template", &[num_points, 3], &[template.len(), 3]));
        }
        tracing::debug!("loaded {} sphere points from {}", num_points, path.display());

        Ok(template)
    }

    pub fn parse_xyz<R: BufRead>(reader: R, path: &Path) -> Result<Self> {
        let mut points = Vec::new();
        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let values = line
                .split(|c: char| c.is_whitespace() || c == ',')
                .filter(|token| !token.is_empty())
                .take(3)
                .map(str::parse::<f32>)
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| Error::Parse {
                    path: path.to_path_buf(),
                    line: i + 1,
                    message: e.to_string(),
                })?;
            let [x, y, z] = values[..] else {
                return Err(Error::Parse {
                    path: path.to_path_buf(),
                    line: i + 1,
                    message: "expected 3 coordinates".into(),
                });
            };
            points.push([x, y, z]);
        }

        Ok(Self { points })
    }

    pub fn write_xyz(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut w = BufWriter::new(File::create(path)?);
        for [x, y, z] in &self.points {
            writeln!(w, "{x} {y} {z}")?;
        }
        w.flush()?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// -> [N, 3]
    pub fn to_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 2> {
        let flat = self.points.iter().flatten().copied().collect::<Vec<f32>>();
        Tensor::from_data(TensorData::new(flat, [self.points.len(), 3]), device)
    }
}

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use image::{ImageBuffer, Rgb, RgbImage};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::error::RayError;
use crate::tensor::Tensor;

/// Radiance accumulator: three same-shape channels plus the number of
/// samples they average. Mergeable across independent runs.
pub struct Film {
    pub channels: [Tensor<f64>; 3],
    pub samples: i64,
}

impl Film {
    pub fn new(shape: &[usize]) -> Film {
        Film {
            channels: [
                Tensor::new(shape),
                Tensor::new(shape),
                Tensor::new(shape),
            ],
            samples: 0,
        }
    }

    pub fn shape(&self) -> &[usize] {
        self.channels[0].shape()
    }

    pub fn pixel_count(&self) -> usize {
        self.channels[0].len()
    }

    /// Weighted merge: each channel becomes the sample-count-weighted mean
    /// of the two films; the sample counters add up.
    pub fn merge(&mut self, other: &Film) -> Result<(), RayError> {
        if self.shape() != other.shape() {
            return Err(RayError::FilmShapeMismatch(
                self.shape().to_vec(),
                other.shape().to_vec(),
            ));
        }

        let total = self.samples + other.samples;
        if total == 0 {
            return Ok(());
        }

        let own = self.samples as f64;
        let theirs = other.samples as f64;
        for ch in 0..3 {
            for (value, added) in self.channels[ch]
                .data
                .iter_mut()
                .zip(other.channels[ch].data.iter())
            {
                *value = (*value * own + *added * theirs) / (own + theirs);
            }
        }
        self.samples = total;
        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<(), RayError> {
        let mut writer = BufWriter::new(File::create(path)?);
        writer.write_i64::<LittleEndian>(self.samples)?;
        writer.write_i32::<LittleEndian>(self.shape().len() as i32)?;
        for &dim in self.shape() {
            writer.write_i32::<LittleEndian>(dim as i32)?;
        }
        for channel in &self.channels {
            for &value in &channel.data {
                writer.write_f64::<LittleEndian>(value)?;
            }
        }
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Film, RayError> {
        let mut reader = BufReader::new(File::open(path)?);
        let samples = reader.read_i64::<LittleEndian>()?;
        if samples < 0 {
            return Err(RayError::FilmFormat("negative sample count".into()));
        }

        let rank = reader.read_i32::<LittleEndian>()?;
        if !(1..=16).contains(&rank) {
            return Err(RayError::FilmFormat(format!("implausible rank {}", rank)));
        }
        let mut shape = Vec::with_capacity(rank as usize);
        for _ in 0..rank {
            let dim = reader.read_i32::<LittleEndian>()?;
            if dim <= 0 {
                return Err(RayError::FilmFormat(format!("implausible extent {}", dim)));
            }
            shape.push(dim as usize);
        }

        let mut film = Film::new(&shape);
        film.samples = samples;
        for channel in &mut film.channels {
            for value in channel.data.iter_mut() {
                *value = reader.read_f64::<LittleEndian>()?;
            }
        }
        Ok(film)
    }

    /// The film's first two axes as an 8-bit image; remaining axes are
    /// sliced at zero.
    pub fn to_image(&self) -> Result<RgbImage, RayError> {
        let shape = self.shape();
        if shape.len() < 2 {
            return Err(RayError::FilmFormat(
                "film needs at least two axes to form an image".into(),
            ));
        }
        let (width, height) = (shape[0], shape[1]);

        let mut index = vec![0usize; shape.len()];
        let mut out: RgbImage = ImageBuffer::new(width as u32, height as u32);
        for x in 0..width {
            for y in 0..height {
                index[0] = x;
                index[1] = y;
                let px = Rgb([
                    quantize(self.channels[0].get(&index)),
                    quantize(self.channels[1].get(&index)),
                    quantize(self.channels[2].get(&index)),
                ]);
                out.put_pixel(x as u32, y as u32, px);
            }
        }
        Ok(out)
    }

    pub fn save_png(&self, path: &Path) -> Result<(), RayError> {
        self.to_image()?.save(path)?;
        Ok(())
    }
}

fn quantize(value: f64) -> u8 {
    (value * 255.0).min(255.0).max(0.0) as u8
}

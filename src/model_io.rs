use byteorder::{LittleEndian, ReadBytesExt};
use nalgebra::{DMatrix, DVector};
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use crate::error::RayError;
use crate::math;
use crate::shapes::Shape;

/// Loads an STL file (binary or ASCII) into triangle shapes, applying the
/// placement `scale * R * v + position` with `R = [x_dir | y_dir | z_dir]`
/// and `y_dir = normalize(z_dir x x_dir)`. Degenerate facets are skipped.
pub fn load_stl(
    path: &Path,
    position: &DVector<f64>,
    x_dir: &DVector<f64>,
    z_dir: &DVector<f64>,
    scale: f64,
) -> Result<Vec<Shape>, RayError> {
    let mut x_dir = x_dir.clone();
    let mut z_dir = z_dir.clone();
    math::normalize(&mut x_dir);
    math::normalize(&mut z_dir);
    let mut y_dir = math::cross3_alloc(&z_dir, &x_dir);
    math::normalize(&mut y_dir);
    if x_dir.norm() == 0.0 || z_dir.norm() == 0.0 || y_dir.norm() == 0.0 {
        return Err(RayError::ModelFormat {
            path: path.to_path_buf(),
            reason: "placement axes must be nonzero and independent".into(),
        });
    }

    let mut rotation = DMatrix::zeros(3, 3);
    for i in 0..3 {
        rotation[(i, 0)] = x_dir[i];
        rotation[(i, 1)] = y_dir[i];
        rotation[(i, 2)] = z_dir[i];
    }

    let mut file = File::open(path)?;
    let mut head = [0_u8; 5];
    let n = file.read(&mut head)?;
    let ascii = n == 5 && &head == b"solid";

    let vertices = if ascii {
        read_ascii(path)?
    } else {
        read_binary(path)?
    };

    let mut shapes = Vec::with_capacity(vertices.len() / 3);
    for triple in vertices.chunks_exact(3) {
        let p1 = place(&triple[0], &rotation, position, scale);
        let p2 = place(&triple[1], &rotation, position, scale);
        let p3 = place(&triple[2], &rotation, position, scale);
        if let Ok(triangle) = Shape::triangle(p1, p2, p3) {
            shapes.push(triangle);
        }
    }
    Ok(shapes)
}

fn place(
    vertex: &DVector<f64>,
    rotation: &DMatrix<f64>,
    position: &DVector<f64>,
    scale: f64,
) -> DVector<f64> {
    let mut out = rotation * vertex;
    out.scale_mut(scale);
    out += position;
    out
}

fn read_ascii(path: &Path) -> Result<Vec<DVector<f64>>, RayError> {
    let reader = BufReader::new(File::open(path)?);
    let mut vertices = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if !line.starts_with("vertex") {
            continue;
        }
        let coords: Vec<f64> = line
            .split_whitespace()
            .skip(1)
            .map(str::parse)
            .collect::<Result<_, _>>()
            .map_err(|_| RayError::ModelFormat {
                path: path.to_path_buf(),
                reason: format!("unparsable vertex line {:?}", line),
            })?;
        if coords.len() != 3 {
            return Err(RayError::ModelFormat {
                path: path.to_path_buf(),
                reason: format!("vertex line with {} coordinates", coords.len()),
            });
        }
        vertices.push(DVector::from_row_slice(&coords));
    }
    if vertices.len() % 3 != 0 {
        return Err(RayError::ModelFormat {
            path: path.to_path_buf(),
            reason: "vertex count is not a multiple of three".into(),
        });
    }
    Ok(vertices)
}

/// 80-byte header, little-endian u32 facet count, then 50-byte records:
/// normal (3 x f32), vertices (9 x f32), attribute (u16).
fn read_binary(path: &Path) -> Result<Vec<DVector<f64>>, RayError> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut header = [0_u8; 80];
    reader.read_exact(&mut header)?;
    let count = reader.read_u32::<LittleEndian>()?;

    let mut vertices = Vec::with_capacity(count as usize * 3);
    for _ in 0..count {
        // facet normal is re-derived from the winding; skip it
        for _ in 0..3 {
            reader.read_f32::<LittleEndian>()?;
        }
        for _ in 0..3 {
            let x = reader.read_f32::<LittleEndian>()? as f64;
            let y = reader.read_f32::<LittleEndian>()? as f64;
            let z = reader.read_f32::<LittleEndian>()? as f64;
            vertices.push(DVector::from_row_slice(&[x, y, z]));
        }
        reader.read_u16::<LittleEndian>()?;
    }
    Ok(vertices)
}

use nalgebra::{DMatrix, DVector, Vector3};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use crate::bvh::{Object, ObjectTree};
use crate::camera::{Camera, Camera3D, CameraNDim};
use crate::error::RayError;
use crate::material::{ColorFn, EmissionKind, Material, RefractiveIndex};
use crate::math::EPS;
use crate::model_io;
use crate::ray::Ray;
use crate::shapes::{EngravingFn, EngravingHit, Shape, Surface};

/// Built once from a scene document; read-only while rendering.
pub struct Scene {
    pub tree: ObjectTree,
    pub cameras: Vec<Camera>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SceneDoc {
    #[serde(default)]
    pub materials: Vec<MaterialDoc>,
    #[serde(default)]
    pub objects: Vec<ObjectDoc>,
    #[serde(default)]
    pub cameras: Vec<CameraDoc>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MaterialDoc {
    pub id: String,
    pub color: [f64; 3],
    #[serde(default)]
    pub radiate: bool,
    #[serde(default)]
    pub radiation_type: String,
    #[serde(default)]
    pub reflectivity: f64,
    #[serde(default)]
    pub refractivity: f64,
    #[serde(default)]
    pub refractive_index: Option<IndexDoc>,
    #[serde(default = "one")]
    pub diffuse_loss: f64,
    #[serde(default = "one")]
    pub reflect_loss: f64,
    #[serde(default = "one")]
    pub refract_loss: f64,
    #[serde(default)]
    pub color_func: Option<String>,
}

fn one() -> f64 {
    1.0
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum IndexDoc {
    Constant(f64),
    Cauchy([f64; 3]),
}

/// Geometry record; the `shape` tag enumerates the supported kinds.
#[derive(Debug, Deserialize)]
#[serde(tag = "shape")]
pub enum ObjectDoc {
    #[serde(rename = "cuboid")]
    Cuboid {
        material_id: String,
        #[serde(default)]
        position: Option<Vec<f64>>,
        #[serde(default)]
        size: Option<Vec<f64>>,
        #[serde(default)]
        pmin: Option<Vec<f64>>,
        #[serde(default)]
        pmax: Option<Vec<f64>>,
        #[serde(default)]
        engraving_func: Option<String>,
    },
    #[serde(rename = "sphere")]
    Sphere {
        material_id: String,
        position: Vec<f64>,
        r: f64,
        #[serde(default)]
        engraving_func: Option<String>,
    },
    #[serde(rename = "triangle")]
    Triangle {
        material_id: String,
        p1: Vec<f64>,
        p2: Vec<f64>,
        p3: Vec<f64>,
    },
    #[serde(rename = "plane")]
    Plane {
        material_id: String,
        a: Vec<f64>,
        b: f64,
    },
    #[serde(rename = "quadratic equation")]
    Quadratic {
        material_id: String,
        a: Vec<f64>,
        b: Vec<f64>,
        c: f64,
    },
    #[serde(rename = "stl")]
    Stl {
        material_id: String,
        file: String,
        position: Vec<f64>,
        x_dir: Vec<f64>,
        z_dir: Vec<f64>,
        #[serde(default = "one")]
        scale: f64,
    },
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CameraDoc {
    pub position: Vec<f64>,
    #[serde(default)]
    pub direction: Option<Vec<f64>>,
    #[serde(default)]
    pub look_at: Option<Vec<f64>>,
    #[serde(default)]
    pub up: Option<Vec<f64>>,
    #[serde(default)]
    pub width: Option<usize>,
    #[serde(default)]
    pub height: Option<usize>,
    #[serde(default)]
    pub fov: Option<f64>,
    #[serde(default)]
    pub ortho: bool,
    /// N-dimensional form: basis vectors with per-axis widths and fovs.
    #[serde(default)]
    pub basis: Option<Vec<Vec<f64>>>,
    #[serde(default)]
    pub widths: Option<Vec<usize>>,
    #[serde(default)]
    pub fovs: Option<Vec<f64>>,
}

impl Scene {
    pub fn from_script_file(path: &Path) -> Result<Scene, RayError> {
        let reader = BufReader::new(File::open(path)?);
        let doc: SceneDoc = serde_json::from_reader(reader)?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Scene::from_doc(&doc, base_dir)
    }

    pub fn from_doc(doc: &SceneDoc, base_dir: &Path) -> Result<Scene, RayError> {
        let materials = parse_materials(&doc.materials)?;

        let mut objects = Vec::new();
        for object in &doc.objects {
            // unknown material ids drop the object
            let material = match materials.get(object.material_id()) {
                Some(material) => Arc::clone(material),
                None => continue,
            };
            for shape in parse_shape(object, base_dir)? {
                objects.push(Object {
                    shape,
                    material: Arc::clone(&material),
                });
            }
        }

        let mut cameras = Vec::new();
        for camera in &doc.cameras {
            cameras.push(parse_camera(camera)?);
        }

        Ok(Scene {
            tree: ObjectTree::build(objects),
            cameras,
        })
    }
}

impl ObjectDoc {
    fn material_id(&self) -> &str {
        match self {
            ObjectDoc::Cuboid { material_id, .. }
            | ObjectDoc::Sphere { material_id, .. }
            | ObjectDoc::Triangle { material_id, .. }
            | ObjectDoc::Plane { material_id, .. }
            | ObjectDoc::Quadratic { material_id, .. }
            | ObjectDoc::Stl { material_id, .. } => material_id,
        }
    }
}

fn parse_materials(
    docs: &[MaterialDoc],
) -> Result<HashMap<String, Arc<Material>>, RayError> {
    let mut materials = HashMap::new();
    for doc in docs {
        if doc.reflectivity < 0.0
            || doc.refractivity < 0.0
            || doc.reflectivity + doc.refractivity > 1.0
        {
            return Err(RayError::scene(format!(
                "material {}: reflectivity + refractivity must stay within [0, 1]",
                doc.id
            )));
        }

        let mut material = Material::new(Vector3::new(doc.color[0], doc.color[1], doc.color[2]));
        material.emissive = doc.radiate;
        material.emission = match doc.radiation_type.as_str() {
            "" => EmissionKind::Omni,
            "directional light source" => EmissionKind::Directional,
            other => {
                return Err(RayError::scene(format!(
                    "material {}: unknown radiation type {:?}",
                    doc.id, other
                )))
            }
        };
        material.reflectivity = doc.reflectivity;
        material.refractivity = doc.refractivity;
        material.refractive_index = match doc.refractive_index {
            None => RefractiveIndex::Constant(1.0),
            Some(IndexDoc::Constant(n)) => RefractiveIndex::Constant(n),
            Some(IndexDoc::Cauchy([a, b, c])) => RefractiveIndex::Cauchy { a, b, c },
        };
        material.diffuse_loss = doc.diffuse_loss;
        material.reflect_loss = doc.reflect_loss;
        material.refract_loss = doc.refract_loss;
        material.color_fn = doc.color_func.as_deref().and_then(color_func);

        if materials
            .insert(doc.id.clone(), Arc::new(material))
            .is_some()
        {
            return Err(RayError::scene(format!("duplicate material id {}", doc.id)));
        }
    }
    Ok(materials)
}

fn vec_from(values: &[f64]) -> DVector<f64> {
    DVector::from_row_slice(values)
}

fn parse_shape(doc: &ObjectDoc, base_dir: &Path) -> Result<Vec<Shape>, RayError> {
    match doc {
        ObjectDoc::Cuboid {
            position,
            size,
            pmin,
            pmax,
            engraving_func,
            ..
        } => {
            let shape = match (position, size, pmin, pmax) {
                (Some(position), Some(size), _, _) => {
                    let position = vec_from(position);
                    let half = vec_from(size) * 0.5;
                    Shape::cuboid(&position - &half, &position + &half)?
                }
                (_, _, Some(pmin), Some(pmax)) => {
                    Shape::cuboid(vec_from(pmin), vec_from(pmax))?
                }
                _ => {
                    return Err(RayError::scene(
                        "cuboid needs position+size or pmin+pmax",
                    ))
                }
            };
            Ok(vec![attach_engraving(shape, engraving_func)])
        }
        ObjectDoc::Sphere {
            position,
            r,
            engraving_func,
            ..
        } => {
            let shape = Shape::sphere(vec_from(position), *r)?;
            Ok(vec![attach_engraving(shape, engraving_func)])
        }
        ObjectDoc::Triangle { p1, p2, p3, .. } => Ok(vec![Shape::triangle(
            vec_from(p1),
            vec_from(p2),
            vec_from(p3),
        )?]),
        ObjectDoc::Plane { a, b, .. } => Ok(vec![Shape::plane(vec_from(a), *b)?]),
        ObjectDoc::Quadratic { a, b, c, .. } => {
            let n = b.len();
            if a.len() != n * n {
                return Err(RayError::scene(
                    "quadratic surface matrix does not match its vector",
                ));
            }
            Ok(vec![Shape::quadric(
                DMatrix::from_row_slice(n, n, a),
                vec_from(b),
                *c,
            )?])
        }
        ObjectDoc::Stl {
            file,
            position,
            x_dir,
            z_dir,
            scale,
            ..
        } => model_io::load_stl(
            &base_dir.join(file),
            &vec_from(position),
            &vec_from(x_dir),
            &vec_from(z_dir),
            *scale,
        ),
    }
}

fn attach_engraving(shape: Shape, name: &Option<String>) -> Shape {
    match name.as_deref().and_then(engraving_func) {
        Some(f) => shape.with_engraving(f),
        None => shape,
    }
}

fn parse_camera(doc: &CameraDoc) -> Result<Camera, RayError> {
    if let Some(basis) = &doc.basis {
        let widths = doc
            .widths
            .clone()
            .ok_or_else(|| RayError::scene("n-dimensional camera needs widths"))?;
        let fovs = doc
            .fovs
            .clone()
            .ok_or_else(|| RayError::scene("n-dimensional camera needs fovs"))?;
        let basis = basis.iter().map(|v| vec_from(v)).collect();
        return Ok(Camera::NDim(CameraNDim::new(
            vec_from(&doc.position),
            basis,
            widths,
            fovs,
        )?));
    }

    let width = doc.width.unwrap_or(800);
    let height = doc.height.unwrap_or(800);
    let fov = doc.fov.unwrap_or(60.0);
    let up = doc
        .up
        .clone()
        .unwrap_or_else(|| vec![0.0, 0.0, 1.0]);

    let direction = match (&doc.direction, &doc.look_at) {
        (Some(direction), _) => vec_from(direction),
        (None, Some(look_at)) => vec_from(look_at) - vec_from(&doc.position),
        (None, None) => {
            return Err(RayError::scene("camera needs direction or look_at"))
        }
    };

    let mut camera = Camera3D::new(
        vec_from(&doc.position),
        direction,
        vec_from(&up),
        width,
        height,
        fov,
    )?;
    camera.ortho = doc.ortho;
    Ok(Camera::ThreeD(camera))
}

/// Named color functions a scene document can reference.
pub fn color_func(name: &str) -> Option<ColorFn> {
    match name {
        "axis_tint" => Some(axis_tint),
        _ => None,
    }
}

/// Tints a surface by the axis its normal is aligned with.
fn axis_tint(_ray: &Ray, normal: &DVector<f64>) -> Vector3<f64> {
    for (axis, tint) in [
        Vector3::new(1.0, 0.5, 0.5),
        Vector3::new(0.5, 1.0, 0.5),
        Vector3::new(0.5, 0.5, 1.0),
        Vector3::new(0.5, 1.0, 1.0),
    ]
    .into_iter()
    .enumerate()
    {
        if axis < normal.len() && (normal[axis].abs() - 1.0).abs() < EPS {
            return tint;
        }
    }
    Vector3::new(1.0, 1.0, 1.0)
}

/// Named engraving predicates a scene document can reference.
pub fn engraving_func(name: &str) -> Option<EngravingFn> {
    match name {
        "sphere_spiral" => Some(sphere_spiral),
        _ => None,
    }
}

/// Spiral bands over a sphere: hits where the band pattern is positive
/// enough are carved away.
fn sphere_spiral(hit: &EngravingHit<'_>) -> bool {
    let (center, radius) = match &hit.shape.surface {
        Surface::Sphere { center, radius } => (center, *radius),
        _ => return false,
    };

    let x = (hit.ray_start[0] + hit.distance * hit.ray_dir[0] - center[0]) / radius;
    let y = (hit.ray_start[1] + hit.distance * hit.ray_dir[1] - center[1]) / radius;
    let z = (hit.ray_start[2] + hit.distance * hit.ray_dir[2] - center[2]) / radius;

    let mut azimuth = y.atan2(x);
    if azimuth < 0.0 {
        azimuth += 2.0 * std::f64::consts::PI;
    }
    let polar = z.clamp(-1.0, 1.0).acos();

    (polar * 5.0 + azimuth * 3.0).sin() > 0.3
}

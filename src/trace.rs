use indicatif::ProgressBar;
use nalgebra::Vector3;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use rayon::prelude::*;

use crate::bvh::ObjectTree;
use crate::camera::Camera;
use crate::debug::{should_flag, DebugSink, TraceRecord};
use crate::error::RayError;
use crate::film::Film;
use crate::pools::{RayPool, VecPool};
use crate::ray::Ray;
use crate::scene::Scene;
use crate::tensor::unravel;

pub struct RenderParams {
    pub samples: usize,
    pub max_level: usize,
    pub camera: usize,
    pub seed: u64,
    pub debug_trace: bool,
    pub progress: bool,
}

impl Default for RenderParams {
    fn default() -> Self {
        RenderParams {
            samples: 64,
            max_level: 6,
            camera: 0,
            seed: 0,
            debug_trace: false,
            progress: true,
        }
    }
}

/// Evolves one ray through surface events until it escapes, is absorbed by
/// an emitter, or runs out of depth. Returns the final throughput; escaped
/// and depth-capped paths are black.
pub fn trace_ray(
    tree: &ObjectTree,
    ray: &mut Ray,
    max_level: usize,
    rng: &mut SmallRng,
    scratch: &mut VecPool,
    sink: &DebugSink,
) -> Vector3<f64> {
    let mut level = 0;
    loop {
        if level > max_level {
            ray.throughput.fill(0.0);
            return ray.throughput;
        }

        let (distance, object) = tree.nearest_hit(&ray.origin, &ray.direction, scratch);
        let object = match object {
            Some(object) => object,
            None => {
                if ray.debug && sink.enabled() {
                    sink.record(TraceRecord {
                        start: ray.origin.iter().copied().collect(),
                        end: ray.origin.iter().copied().collect(),
                        direction: ray.direction.iter().copied().collect(),
                        color: [ray.throughput.x, ray.throughput.y, ray.throughput.z],
                        level,
                        hit_object: "MISS".into(),
                        distance: f64::MAX,
                    });
                }
                ray.throughput.fill(0.0);
                return ray.throughput;
            }
        };

        let start: Vec<f64> = if ray.debug && sink.enabled() {
            ray.origin.iter().copied().collect()
        } else {
            Vec::new()
        };

        // move to the hit point; the t > EPS contract keeps the next
        // intersection off this surface
        ray.origin.axpy(distance, &ray.direction, 1.0);

        let mut normal = scratch.take();
        object.shape.normal_at(&ray.origin, &mut normal);
        if normal.dot(&ray.direction) > 0.0 {
            normal.neg_mut();
        }

        let terminated = object.material.propagate(ray, &normal, rng, scratch);
        scratch.give(normal);

        if ray.debug && sink.enabled() {
            sink.record(TraceRecord {
                start,
                end: ray.origin.iter().copied().collect(),
                direction: ray.direction.iter().copied().collect(),
                color: [ray.throughput.x, ray.throughput.y, ray.throughput.z],
                level,
                hit_object: object.shape.name().into(),
                distance,
            });
        }

        if terminated {
            return ray.throughput;
        }
        level += 1;
    }
}

/// Mean radiance of `samples` paths through one pixel. Non-finite sample
/// throughput is clamped to black before it can infect the mean.
#[allow(clippy::too_many_arguments)]
pub fn trace_pixel(
    camera: &Camera,
    tree: &ObjectTree,
    index: &[usize],
    params: &RenderParams,
    rng: &mut SmallRng,
    rays: &mut RayPool,
    scratch: &mut VecPool,
    sink: &DebugSink,
) -> Vector3<f64> {
    let mut color = Vector3::zeros();
    for sample in 0..params.samples {
        let mut ray = rays.take();
        ray.debug = params.debug_trace && should_flag(index, sample);
        camera.generate_ray(&mut ray, index, rng);

        let radiance = trace_ray(tree, &mut ray, params.max_level, rng, scratch, sink);
        rays.give(ray);

        if radiance.iter().all(|v| v.is_finite()) {
            color += radiance;
        }
    }
    color / params.samples as f64
}

struct ChannelPtr(*mut f64);
unsafe impl Send for ChannelPtr {}
unsafe impl Sync for ChannelPtr {}

/// Renders the scene into the film: every film cell is one task, claimed
/// by one worker which owns that pixel's whole sampling loop, so the
/// channel stores below are disjoint and unlocked.
pub fn render(
    scene: &Scene,
    film: &mut Film,
    params: &RenderParams,
    sink: &DebugSink,
) -> Result<(), RayError> {
    let camera = scene
        .cameras
        .get(params.camera)
        .ok_or_else(|| RayError::scene(format!("scene has no camera {}", params.camera)))?;

    let shape = camera.film_shape();
    if film.shape() != shape.as_slice() {
        return Err(RayError::FilmShapeMismatch(
            film.shape().to_vec(),
            shape.clone(),
        ));
    }

    let dim = camera.dim();
    let total = film.pixel_count();
    let channels = [
        ChannelPtr(film.channels[0].data.as_mut_ptr()),
        ChannelPtr(film.channels[1].data.as_mut_ptr()),
        ChannelPtr(film.channels[2].data.as_mut_ptr()),
    ];

    let bar = if params.progress {
        ProgressBar::new(total as u64)
    } else {
        ProgressBar::hidden()
    };

    (0..total)
        .into_par_iter()
        .for_each_init(
            || (RayPool::new(dim), VecPool::new(dim)),
            |(rays, scratch), idx| {
                let index = unravel(idx, &shape);
                // per-pixel seed keeps results independent of worker count
                let mut rng = SmallRng::seed_from_u64(
                    params
                        .seed
                        .wrapping_add((idx as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)),
                );

                let color = trace_pixel(
                    camera, &scene.tree, &index, params, &mut rng, rays, scratch, sink,
                );
                unsafe {
                    *channels[0].0.add(idx) = color.x;
                    *channels[1].0.add(idx) = color.y;
                    *channels[2].0.add(idx) = color.z;
                }
                bar.inc(1);
            },
        );

    bar.finish();
    film.samples = params.samples as i64;
    Ok(())
}

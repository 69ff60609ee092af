use nalgebra::DVector;
use std::sync::Arc;

use crate::material::Material;
use crate::pools::VecPool;
use crate::shapes::{slab_intersect, Shape};

/// A rendered primitive: exclusive ownership of its shape, shared
/// ownership of its material.
pub struct Object {
    pub shape: Shape,
    pub material: Arc<Material>,
}

struct Node {
    pmin: DVector<f64>,
    pmax: DVector<f64>,
    object: Option<usize>,
    children: [Option<usize>; 2],
}

/// Binary bounding-volume hierarchy over the scene objects. Nodes live in
/// an arena and refer to children by index; there are no back edges.
pub struct ObjectTree {
    objects: Vec<Object>,
    nodes: Vec<Node>,
    root: Option<usize>,
}

struct LeafSeed {
    object: usize,
    pmin: DVector<f64>,
    pmax: DVector<f64>,
    centroid: DVector<f64>,
}

impl ObjectTree {
    pub fn build(objects: Vec<Object>) -> ObjectTree {
        let mut tree = ObjectTree {
            objects,
            nodes: Vec::new(),
            root: None,
        };
        if tree.objects.is_empty() {
            return tree;
        }

        let mut seeds: Vec<LeafSeed> = tree
            .objects
            .iter()
            .enumerate()
            .map(|(i, obj)| {
                let (pmin, pmax) = obj.shape.bounding_box();
                let centroid = (&pmin + &pmax) * 0.5;
                LeafSeed {
                    object: i,
                    pmin,
                    pmax,
                    centroid,
                }
            })
            .collect();

        let root = tree.build_range(&mut seeds);
        tree.root = Some(root);
        tree
    }

    fn build_range(&mut self, seeds: &mut [LeafSeed]) -> usize {
        if seeds.len() == 1 {
            let seed = &seeds[0];
            self.nodes.push(Node {
                pmin: seed.pmin.clone(),
                pmax: seed.pmax.clone(),
                object: Some(seed.object),
                children: [None, None],
            });
            return self.nodes.len() - 1;
        }

        let dim = seeds[0].pmin.len();
        let mut pmin = seeds[0].pmin.clone();
        let mut pmax = seeds[0].pmax.clone();
        for seed in seeds[1..].iter() {
            for i in 0..dim {
                pmin[i] = pmin[i].min(seed.pmin[i]);
                pmax[i] = pmax[i].max(seed.pmax[i]);
            }
        }

        let axis = split_axis(seeds, &pmin, &pmax);
        seeds.sort_by(|a, b| {
            a.centroid[axis]
                .partial_cmp(&b.centroid[axis])
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    a.pmin[axis]
                        .partial_cmp(&b.pmin[axis])
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| {
                    a.pmax[axis]
                        .partial_cmp(&b.pmax[axis])
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
        });

        let mid = (seeds.len() - 1) / 2;
        let (left_seeds, right_seeds) = seeds.split_at_mut(mid + 1);
        let left = self.build_range(left_seeds);
        let right = self.build_range(right_seeds);

        self.nodes.push(Node {
            pmin,
            pmax,
            object: None,
            children: [Some(left), Some(right)],
        });
        self.nodes.len() - 1
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn objects(&self) -> &[Object] {
        &self.objects
    }

    /// Bounding box of the whole scene, when it is non-empty.
    pub fn root_box(&self) -> Option<(DVector<f64>, DVector<f64>)> {
        self.root
            .map(|root| (self.nodes[root].pmin.clone(), self.nodes[root].pmax.clone()))
    }

    /// Nearest valid hit: `(distance, object)` with distance > EPS, or
    /// `(f64::MAX, None)` when nothing is hit.
    pub fn nearest_hit(
        &self,
        ray_start: &DVector<f64>,
        ray_dir: &DVector<f64>,
        scratch: &mut VecPool,
    ) -> (f64, Option<&Object>) {
        match self.root {
            Some(root) => self.hit_node(root, ray_start, ray_dir, scratch),
            None => (f64::MAX, None),
        }
    }

    fn hit_node(
        &self,
        node_idx: usize,
        ray_start: &DVector<f64>,
        ray_dir: &DVector<f64>,
        scratch: &mut VecPool,
    ) -> (f64, Option<&Object>) {
        let node = &self.nodes[node_idx];

        if let Some(object_idx) = node.object {
            let object = &self.objects[object_idx];
            let distance = object.shape.intersect(ray_start, ray_dir, scratch);
            if distance == f64::MAX {
                return (f64::MAX, None);
            }
            return (distance, Some(object));
        }

        if slab_intersect(&node.pmin, &node.pmax, ray_start, ray_dir) >= f64::MAX {
            return (f64::MAX, None);
        }

        let mut best = (f64::MAX, None);
        for child in node.children.into_iter().flatten() {
            let candidate = self.hit_node(child, ray_start, ray_dir, scratch);
            if candidate.0 < best.0 {
                best = candidate;
            }
        }
        best
    }

    #[cfg(test)]
    fn check_invariants(&self) {
        for node in &self.nodes {
            if let Some(object_idx) = node.object {
                let (pmin, pmax) = self.objects[object_idx].shape.bounding_box();
                for i in 0..pmin.len() {
                    assert!(node.pmin[i] <= pmin[i] + 1e-12);
                    assert!(node.pmax[i] >= pmax[i] - 1e-12);
                }
            } else {
                for child in node.children.into_iter().flatten() {
                    let child = &self.nodes[child];
                    for i in 0..node.pmin.len() {
                        assert!(node.pmin[i] <= child.pmin[i]);
                        assert!(node.pmax[i] >= child.pmax[i]);
                    }
                }
            }
        }
    }
}

/// Axis with the largest centroid variance, normalized by the group's
/// extent on that axis. Collapsed axes are skipped.
fn split_axis(seeds: &[LeafSeed], pmin: &DVector<f64>, pmax: &DVector<f64>) -> usize {
    let dim = pmin.len();
    let n = seeds.len() as f64;
    let mut best_axis = 0;
    let mut best_score = -1.0;

    for axis in 0..dim {
        let size = pmax[axis] - pmin[axis];
        if size <= 0.0 {
            continue;
        }
        let mean: f64 = seeds.iter().map(|s| s.centroid[axis]).sum::<f64>() / n;
        let variance: f64 = seeds
            .iter()
            .map(|s| {
                let d = s.centroid[axis] - mean;
                d * d
            })
            .sum::<f64>()
            / n;
        let score = variance / size;
        if score > best_score {
            best_score = score;
            best_axis = axis;
        }
    }
    best_axis
}

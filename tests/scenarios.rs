//! Cross-component scenarios exercised end-to-end through [`Tree`], the
//! one entry point a scene author actually calls — unlike the unit tests
//! beside each component, which build a single primitive or a single
//! `Bvh`/`WideBvh` in isolation.

use glam::{vec3, Vec3};
use rand::{distributions::Uniform, prelude::Distribution, rngs::SmallRng, SeedableRng};
use rt_accel::primitive::{MaterialId, Primitive, Quad, Sphere, Triangle, TriangleMesh};
use rt_accel::ray::Ray;
use rt_accel::stats::Stats;
use rt_accel::tree::{BuildOptions, Tree, TreeVariant};
use std::sync::Arc;

const VARIANTS: [TreeVariant; 3] = [TreeVariant::Binary, TreeVariant::Quad, TreeVariant::Oct];

fn box_triangles() -> Vec<Primitive> {
    // Axis-aligned unit box centered on the origin, two triangles per face.
    let p = [
        vec3(-1.0, -1.0, -1.0),
        vec3(1.0, -1.0, -1.0),
        vec3(1.0, 1.0, -1.0),
        vec3(-1.0, 1.0, -1.0),
        vec3(-1.0, -1.0, 1.0),
        vec3(1.0, -1.0, 1.0),
        vec3(1.0, 1.0, 1.0),
        vec3(-1.0, 1.0, 1.0),
    ];
    let faces: [[usize; 4]; 6] = [
        [0, 1, 2, 3], // -Z
        [5, 4, 7, 6], // +Z
        [4, 0, 3, 7], // -X
        [1, 5, 6, 2], // +X
        [4, 5, 1, 0], // -Y
        [3, 2, 6, 7], // +Y
    ];
    let positions: Vec<Vec3> = p.to_vec();
    let mut indices = Vec::new();
    for face in faces {
        indices.extend([face[0] as u32, face[1] as u32, face[2] as u32]);
        indices.extend([face[0] as u32, face[2] as u32, face[3] as u32]);
    }
    let mesh = Arc::new(TriangleMesh::new(indices, positions, None, None, None, MaterialId(0), false));
    let tri_count = mesh.indices.len() / 3;
    (0..tri_count as u32)
        .map(|i| Primitive::Triangle(Triangle::new(mesh.clone(), i)))
        .collect()
}

#[test]
fn sphere_scene_nearest_matches_brute_force() {
    let mut rng = SmallRng::seed_from_u64(7);
    let dist = Uniform::from(-10.0f32..10.0);
    let mut primitives: Vec<Primitive> = (0..1000)
        .map(|_| {
            let center = vec3(dist.sample(&mut rng), dist.sample(&mut rng), dist.sample(&mut rng));
            Primitive::Sphere(Sphere::new(center, 1.0, MaterialId(0)))
        })
        .collect();
    // Guarantees the ray below hits something, regardless of how the random
    // scatter happens to land for this seed.
    primitives.push(Primitive::Sphere(Sphere::new(Vec3::ZERO, 1.0, MaterialId(0))));

    let ray = Ray::new(vec3(-100.0, 0.0, 0.0), vec3(1.0, 0.0, 0.0), 0.0, f32::INFINITY);

    for variant in VARIANTS {
        let mut scene = primitives.clone();
        let options = BuildOptions { variant, ..BuildOptions::default() };
        let tree = Tree::build(&mut scene, &options).unwrap();
        let stats = Stats::default();

        let tree_hit = tree.query_nearest(&ray, &scene, &stats);
        let brute = scene
            .iter()
            .filter_map(|p| p.intersect(&ray, f32::INFINITY))
            .min_by(|a, b| a.t.total_cmp(&b.t));

        match (&tree_hit, &brute) {
            (Some(a), Some(b)) => assert!(
                (a.t - b.t).abs() < 1e-3,
                "variant {variant:?}: tree t={} brute t={}",
                a.t,
                b.t
            ),
            (None, None) => panic!("expected a hit, found none for variant {variant:?}"),
            _ => panic!("variant {variant:?} disagrees with brute force on hit/no-hit"),
        }
    }
}

#[test]
fn shadow_ray_stops_short_of_near_wall() {
    for variant in VARIANTS {
        let mut scene = box_triangles();
        let options = BuildOptions { variant, ..BuildOptions::default() };
        let tree = Tree::build(&mut scene, &options).unwrap();
        let stats = Stats::default();

        // The near wall sits at z = -1; a ray from outside stops just short
        // of it and must not report an occluder yet.
        let ray = Ray::new(vec3(0.0, 0.0, -5.0), vec3(0.0, 0.0, 1.0), 0.0, 3.9);
        assert!(
            !tree.query_any(&ray, &scene, &stats),
            "variant {variant:?} found a blocker before the near wall"
        );
    }
}

#[test]
fn empty_scene_tree_never_hits() {
    for variant in VARIANTS {
        let mut scene: Vec<Primitive> = Vec::new();
        let options = BuildOptions { variant, ..BuildOptions::default() };
        let tree = Tree::build(&mut scene, &options).unwrap();
        let stats = Stats::default();
        let ray = Ray::new(Vec3::ZERO, vec3(0.0, 0.0, 1.0), 0.0, f32::INFINITY);

        assert!(tree.query_nearest(&ray, &scene, &stats).is_none());
        assert!(!tree.query_any(&ray, &scene, &stats));
    }
}

#[test]
fn coplanar_quads_k_nearest_returns_four_distinct() {
    for variant in VARIANTS {
        let mut scene: Vec<Primitive> = (0..8)
            .map(|i| {
                Primitive::Quad(Quad::new(
                    vec3(0.0, 0.0, i as f32),
                    vec3(2.0, 0.0, 0.0),
                    vec3(0.0, 2.0, 0.0),
                    MaterialId(i as u32),
                ))
            })
            .collect();
        let options = BuildOptions { variant, ..BuildOptions::default() };
        let tree = Tree::build(&mut scene, &options).unwrap();
        let stats = Stats::default();
        let ray = Ray::new(vec3(0.0, 0.0, -5.0), vec3(0.0, 0.0, 1.0), 0.0, f32::INFINITY);

        let nearest = tree.query_nearest(&ray, &scene, &stats).unwrap();
        assert!((nearest.t - 5.0).abs() < 1e-4, "variant {variant:?}: t={}", nearest.t);

        let hits = tree.query_k_nearest(&ray, &scene, 4, |_| true, &stats);
        assert_eq!(hits.len(), 4, "variant {variant:?}: expected 4 hits, got {}", hits.len());

        let mut indices: Vec<u32> = hits.iter().map(|h| h.primitive_index).collect();
        indices.sort_unstable();
        indices.dedup();
        assert_eq!(indices.len(), 4, "variant {variant:?}: duplicate primitive indices in k-nearest result");

        let mut ts: Vec<f32> = hits.iter().map(|h| h.t).collect();
        ts.sort_by(|a, b| a.total_cmp(b));
        for (i, t) in ts.iter().enumerate() {
            assert!((t - (5.0 + i as f32)).abs() < 1e-4, "variant {variant:?}: ts={ts:?}");
        }
    }
}

/// Regression coverage for a pack holding more than one lane-occupant along
/// the same ray: every wide-tree leaf here is a single `TrianglePack` with
/// several triangles stacked behind each other, so `query_k_nearest` only
/// returns the correct set if the pack yields every in-bound lane rather
/// than just its nearest one.
#[test]
fn stacked_triangles_k_nearest_no_duplicates() {
    let positions = vec![
        vec3(-1.0, -1.0, 1.0),
        vec3(1.0, -1.0, 1.0),
        vec3(0.0, 1.0, 1.0),
        vec3(-1.0, -1.0, 2.0),
        vec3(1.0, -1.0, 2.0),
        vec3(0.0, 1.0, 2.0),
        vec3(-1.0, -1.0, 3.0),
        vec3(1.0, -1.0, 3.0),
        vec3(0.0, 1.0, 3.0),
        vec3(-1.0, -1.0, 4.0),
        vec3(1.0, -1.0, 4.0),
        vec3(0.0, 1.0, 4.0),
    ];
    let indices: Vec<u32> = (0..12).collect();
    let mesh = Arc::new(TriangleMesh::new(indices, positions, None, None, None, MaterialId(0), false));

    for variant in [TreeVariant::Quad, TreeVariant::Oct] {
        let mut scene: Vec<Primitive> = (0..4u32)
            .map(|i| Primitive::Triangle(Triangle::new(mesh.clone(), i)))
            .collect();
        let options = BuildOptions { variant, ..BuildOptions::default() };
        let tree = Tree::build(&mut scene, &options).unwrap();
        let stats = Stats::default();
        let ray = Ray::new(Vec3::ZERO, vec3(0.0, 0.0, 1.0), 0.0, f32::INFINITY);

        let hits = tree.query_k_nearest(&ray, &scene, 4, |_| true, &stats);
        assert_eq!(hits.len(), 4, "variant {variant:?}: expected 4 hits, got {}", hits.len());

        let mut indices: Vec<u32> = hits.iter().map(|h| h.primitive_index).collect();
        indices.sort_unstable();
        indices.dedup();
        assert_eq!(indices.len(), 4, "variant {variant:?}: duplicate primitive indices in k-nearest result");

        let mut ts: Vec<f32> = hits.iter().map(|h| h.t).collect();
        ts.sort_by(|a, b| a.total_cmp(b));
        for (i, t) in ts.iter().enumerate() {
            assert!((t - (i as f32 + 1.0)).abs() < 1e-4, "ts={ts:?}");
        }
    }
}

use weft_core::{BufferError, LifetimeClass};
use weft_kernels::math::perlin;
use weft_kernels::mesh::{deform_along_normals_task, displace_vertices_task};
use weft_kernels::{DeformingMesh, Vec3, Wave};
use weft_test_utils::{seeded_f32, strict_scheduler};

fn grid(n: usize) -> Vec<Vec3> {
    let raw = seeded_f32(31, n * 3);
    raw.chunks_exact(3)
        .map(|c| Vec3::new(c[0] * 4.0, c[1] * 4.0, c[2] * 4.0))
        .collect()
}

fn reference_step(vertices: &mut [Vec3], normals: &mut [Vec3], wave: Wave) {
    for (v, n) in vertices.iter_mut().zip(normals.iter_mut()) {
        let noise = perlin(v.z, v.y * v.x) * wave.strength * 2.0;
        *v = *v - *n * (wave.sin_time * wave.strength) + *n * noise;
        *n = *n + Vec3::ONE * (wave.cos_time * noise);
    }
}

#[test]
fn deforming_mesh_matches_serial_reference() {
    let scheduler = strict_scheduler(4);
    let vertices = grid(500);
    let normals: Vec<Vec3> = vertices.iter().map(|v| v.normalized()).collect();
    let mut mesh = DeformingMesh::new(scheduler.registry(), &vertices, &normals, 0.4)
        .unwrap()
        .with_batch_width(37);

    let times = [0.0, 0.5, 1.25, 3.0];
    for &t in &times {
        mesh.deform(&scheduler, t).unwrap();
    }
    mesh.complete().unwrap();

    let (mut v, mut n) = (vertices.clone(), normals.clone());
    for &t in &times {
        reference_step(&mut v, &mut n, Wave::at(t, 0.4));
    }
    assert_eq!(mesh.vertices().unwrap(), v);
    assert_eq!(mesh.normals().unwrap(), n);
}

#[test]
fn displacement_shifts_along_the_diagonal() {
    let scheduler = strict_scheduler(2);
    let input = grid(200);
    let buf = scheduler
        .registry()
        .create_from_slice(&input, LifetimeClass::Persistent)
        .unwrap();
    let wave = Wave::at(1.0, 0.25);
    scheduler
        .schedule(displace_vertices_task(&buf, wave).unwrap(), 64, &[])
        .unwrap()
        .complete()
        .unwrap();

    for (got, p) in buf.to_vec().unwrap().iter().zip(&input) {
        let offset = perlin(p.z, p.y) * wave.strength - wave.sin_time * wave.strength;
        let d = *got - *p;
        assert!((d.x - offset).abs() < 1e-5);
        assert!((d.y - d.x).abs() < 1e-5 && (d.z - d.x).abs() < 1e-5);
    }
}

#[test]
fn vertex_and_normal_lengths_must_agree() {
    let scheduler = strict_scheduler(1);
    let err = DeformingMesh::new(scheduler.registry(), &grid(8), &grid(7), 0.1)
        .err()
        .unwrap();
    assert!(matches!(err, BufferError::LengthMismatch { .. }));
}

#[test]
fn deformation_holds_both_buffers_until_complete() {
    let scheduler = strict_scheduler(2);
    let registry = scheduler.registry();
    let vertices = registry.create_from_slice(&grid(64), LifetimeClass::Persistent).unwrap();
    let normals = registry.create_from_slice(&grid(64), LifetimeClass::Persistent).unwrap();
    let gate = weft_test_utils::fixtures::Gate::new();
    let hold = scheduler.schedule(gate.task("hold"), 1, &[]).unwrap();
    let task = deform_along_normals_task(&vertices, &normals, Wave::at(0.3, 1.0)).unwrap();
    let handle = scheduler.schedule(task, 16, &[hold]).unwrap();
    assert_eq!(vertices.in_flight().writers, 1);
    assert_eq!(normals.in_flight().writers, 1);
    assert!(normals.to_vec().is_err());
    gate.open();
    handle.complete().unwrap();
    assert!(normals.in_flight().is_idle());
}

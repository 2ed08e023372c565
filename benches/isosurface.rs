use criterion::{Criterion, criterion_group, criterion_main};
use isolevel::config::FieldConfig;
use isolevel_field::VoxelCoords;
use isolevel_isosurface::LocalMarchingCubes;
use isolevel_thread::RayonThreadPool;

fn sphere_extractor() -> (LocalMarchingCubes, isolevel_field::ImageData) {
    let image = FieldConfig {
        dimensions: [65; 3],
        sphere_center: [32.0; 3],
        sphere_radius: 20.0,
        ..FieldConfig::default()
    }
    .create_image()
    .unwrap();

    let mut extractor = LocalMarchingCubes::new();
    extractor.set_input_image(&image);
    extractor.set_number_of_chunks([4; 3]);
    (extractor, image)
}

pub fn extract_all_chunks(c: &mut Criterion) {
    let (mut extractor, image) = sphere_extractor();
    let thread_pool = RayonThreadPool::with_available_parallelism().unwrap();

    c.bench_function("extract_all_chunks", |b| {
        b.iter(|| {
            extractor.set_all_modified();
            extractor.update(&image, &thread_pool).unwrap()
        });
    });
}

pub fn extract_single_modified_chunk(c: &mut Criterion) {
    let (mut extractor, image) = sphere_extractor();
    let thread_pool = RayonThreadPool::with_available_parallelism().unwrap();
    extractor.update(&image, &thread_pool).unwrap();
    let coords = VoxelCoords::new(12, 32, 32);

    c.bench_function("extract_single_modified_chunk", |b| {
        b.iter(|| {
            extractor.set_modified(&coords);
            extractor.update(&image, &thread_pool).unwrap()
        });
    });
}

criterion_group!(benches, extract_all_chunks, extract_single_modified_chunk);
criterion_main!(benches);

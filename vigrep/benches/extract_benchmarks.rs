use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::fs;
use std::io::Cursor;
use tempfile::tempdir;
use vigrep::container::Ident;
use vigrep::fixtures::{label_heap, section_bytes, vi_with_text, zlib_payload, ContainerBuilder};
use vigrep::heap::{decode_heap, decode_section};
use vigrep::search::{extract_from_reader, ExtractOptions};
use vigrep::{scan, ScanConfig, ScanMetrics};

fn create_texts(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| format!("Control {} label: Initialize hardware channel {}", i, i))
        .collect()
}

fn create_vi(texts: &[String]) -> Vec<u8> {
    let texts: Vec<&str> = texts.iter().map(|t| t.as_str()).collect();
    vi_with_text(&texts, &texts)
}

fn bench_heap_decoding(c: &mut Criterion) {
    let texts = create_texts(500);
    let texts: Vec<&[u8]> = texts.iter().map(|t| t.as_bytes()).collect();
    let heap = label_heap(&texts);
    let section = section_bytes(&zlib_payload(&heap));

    let mut group = c.benchmark_group("Heap Decoding");
    group.bench_function("raw_heap", |b| {
        b.iter(|| black_box(decode_heap(black_box(&heap)).unwrap()));
    });
    group.bench_function("zlib_section", |b| {
        b.iter(|| black_box(decode_section(Ident(*b"BDHb"), black_box(&section)).unwrap()));
    });
    group.finish();
}

fn bench_extraction(c: &mut Criterion) {
    let options = ExtractOptions::default();
    let mut group = c.benchmark_group("Extraction");
    for count in [10, 100, 1000] {
        let bytes = create_vi(&create_texts(count));
        group.bench_function(format!("texts_{}", count), |b| {
            b.iter(|| {
                let extraction = extract_from_reader(
                    Cursor::new(black_box(&bytes)),
                    "bench",
                    &options,
                    &ScanMetrics::new(),
                )
                .unwrap();
                black_box(extraction)
            });
        });
    }
    group.finish();
}

fn bench_skipped_blocks(c: &mut Criterion) {
    // Large unselected blocks must not slow extraction down
    let heap = zlib_payload(&label_heap(&[b"Initialize"]));
    let options = ExtractOptions::default();
    let mut group = c.benchmark_group("Skipped Blocks");
    for size in [1 << 10, 1 << 20] {
        let bytes = ContainerBuilder::new()
            .block("LVSR", vec![(0, vec![0; size])])
            .block("FPHb", vec![(0, heap.clone())])
            .block("ICON", vec![(0, vec![0; size])])
            .build();
        group.bench_function(format!("padding_{}", size), |b| {
            b.iter(|| {
                black_box(
                    extract_from_reader(Cursor::new(&bytes), "bench", &options, &ScanMetrics::new())
                        .unwrap(),
                )
            });
        });
    }
    group.finish();
}

fn bench_file_scaling(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let bytes = create_vi(&create_texts(50));
    let mut group = c.benchmark_group("File Scaling");
    let mut created = 0;
    for count in [1, 10, 100] {
        while created < count {
            fs::write(dir.path().join(format!("vi_{}.vi", created)), &bytes).unwrap();
            created += 1;
        }
        let config = ScanConfig::new("hardware channel 42", dir.path());
        group.bench_function(format!("files_{}", count), |b| {
            b.iter(|| black_box(scan(&config).unwrap()));
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_heap_decoding,
    bench_extraction,
    bench_skipped_blocks,
    bench_file_scaling
);
criterion_main!(benches);

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use factored_segmenter::model::{Model, SegmenterOptions};
use factored_segmenter::Segmenter;

fn plain_segmenter() -> Segmenter {
    Segmenter::new(Model {
        options: SegmenterOptions::default(),
        oracle: None,
        known_lemmas: Default::default(),
        shortlist: Vec::new(),
        factor_spec: Default::default(),
    })
}

fn bench_encode(c: &mut Criterion) {
    let segmenter = plain_segmenter();
    let mut group = c.benchmark_group("encode");

    for size in &[10, 100, 1000] {
        let text = "Hello world ".repeat(*size);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| segmenter.encode_line(black_box(&text), &[]).unwrap());
        });
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let segmenter = plain_segmenter();
    let text = "Hello world ".repeat(1000);
    let encoded = segmenter.encode_line(&text, &[]).unwrap();

    c.bench_function("decode_1000_words", |b| {
        b.iter(|| {
            segmenter
                .decode_line(black_box(&encoded.wire_tokens), &encoded.package, &encoded.alignment)
                .unwrap()
        });
    });
}

fn bench_train(c: &mut Criterion) {
    use factored_segmenter::model::TrainerOptions;
    use factored_segmenter::trainer;

    let corpus: Vec<String> = (0..200)
        .map(|i| format!("This is training sentence number {i} with some repeated content words."))
        .collect();
    let options = SegmenterOptions::default();
    let mut trainer_options = TrainerOptions::default();
    trainer_options.vocab_size = 256;

    c.bench_function("train_200_line_corpus", |b| {
        b.iter(|| trainer::train(black_box(&corpus), &options, &trainer_options).unwrap());
    });
}

fn bench_encode_batch(c: &mut Criterion) {
    let segmenter = plain_segmenter();
    let mut group = c.benchmark_group("encode_batch");

    for batch_size in &[1, 10, 100] {
        let lines: Vec<String> = (0..*batch_size)
            .map(|i| format!("This is test string number {i} with some content"))
            .collect();

        group.bench_with_input(BenchmarkId::from_parameter(batch_size), batch_size, |b, _| {
            b.iter(|| segmenter.encode_lines(black_box(&lines)));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode, bench_train, bench_encode_batch);
criterion_main!(benches);

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use sift_index::{Bm25Params, LexicalIndex, tokenize};
use std::hint::black_box;

fn generate_corpus(docs: usize) -> Vec<String> {
    let latin = "The central bank raised interest rates to curb inflation in 2008. ";
    let cjk = "雷曼兄弟破产引发全球金融危机，投资者重新评估风险。";
    (0..docs)
        .map(|i| {
            if i % 2 == 0 {
                latin.repeat(8 + i % 5)
            } else {
                cjk.repeat(4 + i % 7)
            }
        })
        .collect()
}

fn tokenization(c: &mut Criterion) {
    let mut group = c.benchmark_group("tokenize");
    let corpus = generate_corpus(2);
    for (label, text) in ["latin", "cjk"].iter().zip(&corpus) {
        group.throughput(Throughput::Bytes(text.len() as u64));
        group.bench_with_input(BenchmarkId::new(*label, text.len()), text, |b, text| {
            b.iter(|| tokenize(black_box(text)));
        });
    }
    group.finish();
}

fn index_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("index_build");
    for docs in [100, 1_000] {
        let corpus = generate_corpus(docs);
        group.bench_with_input(BenchmarkId::from_parameter(docs), &corpus, |b, corpus| {
            b.iter(|| LexicalIndex::build(black_box(corpus), Bm25Params::default()));
        });
    }
    group.finish();
}

fn search(c: &mut Criterion) {
    let mut group = c.benchmark_group("search");
    for docs in [100, 1_000] {
        let index = LexicalIndex::build(&generate_corpus(docs), Bm25Params::default());
        group.bench_with_input(BenchmarkId::new("query", docs), &index, |b, index| {
            b.iter(|| index.search(black_box("interest rates inflation"), 10, 0.0));
        });
        group.bench_with_input(BenchmarkId::new("keywords", docs), &index, |b, index| {
            b.iter(|| index.search_keywords(black_box(&["雷曼", "投资", "风险"]), 10, 0.0));
        });
    }
    group.finish();
}

criterion_group!(benches, tokenization, index_build, search);
criterion_main!(benches);

//! Fingerprint-path benchmarks.
//!
//! The SimHash latency contract is p95 ≤ 5 ms for prompts up to ~8 KB; this
//! bench keeps the whole CPU-side pipeline honest:
//! - SimHash generation at several prompt sizes
//! - Prompt masking throughput
//! - Full fingerprint derivation (canonical + mask + SimHash + hashes)

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use ai_cache_proxy::canonical::PromptMasker;
use ai_cache_proxy::fingerprint::{simhash, Fingerprinter};
use ai_cache_proxy::types::request::{ChatCompletionRequest, Message};

fn prompt_of_size(target_bytes: usize) -> String {
    let sentence = "Summarize the incident report for service checkout-api covering the \
                    2024-03-17 outage at 10.40.2.17 and mail the digest to oncall@example.com. ";
    let mut prompt = String::with_capacity(target_bytes + sentence.len());
    while prompt.len() < target_bytes {
        prompt.push_str(sentence);
    }
    prompt
}

fn bench_simhash(c: &mut Criterion) {
    let mut group = c.benchmark_group("simhash");
    for size in [512usize, 2048, 8192] {
        let prompt = prompt_of_size(size);
        group.throughput(Throughput::Bytes(prompt.len() as u64));
        group.bench_function(format!("generate_{}b", size), |b| {
            b.iter(|| simhash::generate(black_box(&prompt)))
        });
    }
    group.finish();
}

fn bench_masking(c: &mut Criterion) {
    let masker = PromptMasker::new();
    let prompt = prompt_of_size(8192);
    let mut group = c.benchmark_group("masking");
    group.throughput(Throughput::Bytes(prompt.len() as u64));
    group.bench_function("mask_8kb", |b| b.iter(|| masker.mask(black_box(&prompt))));
    group.finish();
}

fn bench_full_fingerprint(c: &mut Criterion) {
    let fingerprinter = Fingerprinter::new();
    let request = ChatCompletionRequest::new(
        "gpt-4",
        vec![
            Message::system("You are a terse operations assistant."),
            Message::user(prompt_of_size(8192)),
        ],
    );
    c.bench_function("fingerprint_8kb_request", |b| {
        b.iter(|| fingerprinter.fingerprint(black_box(&request)).unwrap())
    });
}

criterion_group!(benches, bench_simhash, bench_masking, bench_full_fingerprint);
criterion_main!(benches);

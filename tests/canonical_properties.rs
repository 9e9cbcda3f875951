//! Property-style checks over canonicalization, masking and fingerprints,
//! exercised through the public fingerprint pipeline.

use ai_cache_proxy::canonical::PromptMasker;
use ai_cache_proxy::fingerprint::{simhash, Fingerprinter};
use ai_cache_proxy::types::request::ChatCompletionRequest;
use serde_json::json;

fn fingerprint_of(raw: serde_json::Value) -> ai_cache_proxy::fingerprint::Fingerprint {
    let request: ChatCompletionRequest = serde_json::from_value(raw).unwrap();
    Fingerprinter::new().fingerprint(&request).unwrap()
}

/// Canonical idempotence: canonicalizing the canonical form changes
/// nothing, and key order never matters.
#[test]
fn canonical_idempotence_and_key_order() {
    let variants = [
        json!({
            "model": "gpt-4",
            "messages": [{"role": "user", "content": "What is 2+2?"}],
            "max_tokens": 64,
            "temperature": 0.5
        }),
        json!({
            "temperature": 0.5,
            "max_tokens": 64,
            "messages": [{"role": "user", "content": "What is 2+2?"}],
            "model": "gpt-4"
        }),
    ];
    let keys: Vec<String> = variants
        .into_iter()
        .map(|v| fingerprint_of(v).exact_key)
        .collect();
    assert_eq!(keys[0], keys[1]);

    // Round-trip the canonical JSON and re-canonicalize.
    let fp = fingerprint_of(json!({
        "model": "gpt-4",
        "messages": [{"role": "user", "content": "  spaced   out  "}],
        "temperature": 0.5
    }));
    let reparsed: ChatCompletionRequest = serde_json::from_str(&fp.canonical_json).unwrap();
    let fp2 = Fingerprinter::new().fingerprint(&reparsed).unwrap();
    assert_eq!(fp.exact_key, fp2.exact_key);
    assert_eq!(fp.canonical_json, fp2.canonical_json);
}

/// Hash stability: spelling out a documented default does not change the
/// exact key.
#[test]
fn default_values_do_not_change_key() {
    let bare = fingerprint_of(json!({
        "model": "gpt-4",
        "messages": [{"role": "user", "content": "What is 2+2?"}]
    }));
    let spelled = fingerprint_of(json!({
        "model": "gpt-4",
        "messages": [{"role": "user", "content": "What is 2+2?"}],
        "temperature": 1.0,
        "top_p": 1.0,
        "n": 1,
        "stream": false,
        "presence_penalty": 0.0,
        "frequency_penalty": 0.0
    }));
    assert_eq!(bare.exact_key, spelled.exact_key);

    // A non-default value does change it.
    let tweaked = fingerprint_of(json!({
        "model": "gpt-4",
        "messages": [{"role": "user", "content": "What is 2+2?"}],
        "temperature": 0.2
    }));
    assert_ne!(bare.exact_key, tweaked.exact_key);
}

/// Masking is deterministic and idempotent across a small corpus.
#[test]
fn masking_is_deterministic_and_idempotent() {
    let masker = PromptMasker::new();
    let corpus = [
        "Fetch https://api.example.com/v2/users/42 and email results to ops@example.com",
        "Deploy build 7f3a9c2e1b4d5a6f7f3a9c2e1b4d5a6f by 2025-01-15, server 192.168.0.7",
        "Refactor `fn compute_totals` in /src/billing/invoice.rs, budget 1500.75",
        "Call 555-867-5309 about order 123456 placed on 3/14/2024",
        "No sensitive content here at all",
    ];
    for text in corpus {
        let once = masker.mask(text);
        let again = masker.mask(text);
        assert_eq!(once.masked, again.masked, "deterministic for {:?}", text);
        assert_eq!(once.raw_digest, again.raw_digest);

        let twice = masker.mask(&once.masked);
        assert_eq!(twice.masked, once.masked, "idempotent for {:?}", text);
    }
}

/// SimHash locality across a corpus: single-word substitutions stay within
/// a small Hamming radius for the overwhelming majority of prompts.
#[test]
fn simhash_locality_over_corpus() {
    let templates: Vec<String> = (0..40)
        .map(|i| {
            format!(
                "Summarize ticket {} for the weekly report covering root cause impact \
                 and remediation steps then propose three concrete follow up actions \
                 the team should schedule for the next sprint planning meeting",
                i
            )
        })
        .collect();

    let mut within = 0usize;
    for template in &templates {
        let original = simhash::generate(template);
        let words: Vec<&str> = template.split_whitespace().collect();
        let mut mutated = words.clone();
        let mid = words.len() / 2;
        mutated[mid] = "overhauled";
        let edited = simhash::generate(&mutated.join(" "));
        if simhash::hamming(original, edited) <= 16 {
            within += 1;
        }
    }
    // ≥95% of the corpus stays within the radius.
    assert!(within * 100 >= templates.len() * 95, "{}/{}", within, templates.len());
}

/// The embedding input is the raw prompt and the SimHash input is the
/// masked prompt, never swapped. Distinct URLs collapse structurally but
/// stay distinct in the raw text.
#[test]
fn masked_and_raw_inputs_never_swap() {
    let a = fingerprint_of(json!({
        "model": "gpt-4",
        "messages": [{"role": "user", "content": "Summarize https://x.test/a"}]
    }));
    let b = fingerprint_of(json!({
        "model": "gpt-4",
        "messages": [{"role": "user", "content": "Summarize https://x.test/b"}]
    }));

    assert_eq!(a.masked_prompt, "user: Summarize {URL}");
    assert_eq!(a.masked_prompt, b.masked_prompt);
    assert_eq!(a.simhash, b.simhash);

    assert_ne!(a.prompt_text, b.prompt_text);
    assert_ne!(a.raw_digest, b.raw_digest);
    assert_ne!(a.exact_key, b.exact_key);
}

/// PII flag follows the raw text, not the masked text.
#[test]
fn pii_flag_from_raw_text() {
    let with_pii = fingerprint_of(json!({
        "model": "gpt-4",
        "messages": [{"role": "user", "content": "Email alice@example.com the contract"}]
    }));
    assert!(with_pii.pii_present);
    assert!(with_pii.masked_prompt.contains("{EMAIL}"));

    let clean = fingerprint_of(json!({
        "model": "gpt-4",
        "messages": [{"role": "user", "content": "Summarize the contract terms"}]
    }));
    assert!(!clean.pii_present);
}

/// Whitespace and float formatting collapse to one canonical form.
#[test]
fn normalization_collapses_equivalent_requests() {
    let a = fingerprint_of(json!({
        "model": "gpt-4",
        "messages": [{"role": "user", "content": "What  is \t 2+2?"}],
        "temperature": 0.70
    }));
    let b = fingerprint_of(json!({
        "model": "gpt-4",
        "messages": [{"role": "user", "content": " What is 2+2? "}],
        "temperature": 0.7
    }));
    assert_eq!(a.exact_key, b.exact_key);
}

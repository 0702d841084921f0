#![no_main]

use std::time::Duration;

use chrono::Local;
use libfuzzer_sys::fuzz_target;
use presence_probe::latency::{parse_sent_at, LatencyEvaluator};
use presence_probe::protocol::MemberInfo;
use presence_probe::quotes::QuoteCorpus;
use presence_probe::LagReporting;
use uuid::Uuid;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    // Whisper payloads and corpus files both come from outside.
    let _ = parse_sent_at(text);
    let me = MemberInfo {
        id: Uuid::nil(),
        name: "fuzz".into(),
    };
    let evaluator = LatencyEvaluator::new("fuzz", Duration::from_secs(5), LagReporting::Room);
    let _ = evaluator.classify(Some(me.id), &me, text, &Local::now());

    let corpus = QuoteCorpus::parse(text);
    assert!(corpus.records().iter().all(|r| !r.is_empty()));
});

//! Property tests for the streaming path.
//!
//! - Streaming equivalence: arguments rebuilt from any fragmentation equal a
//!   single parse of the concatenated text.
//! - SSE framing: any chunking of a transcript decodes to the same events.
//! - Uniqueness: concurrent allocators never hand out the same index.

use proptest::prelude::*;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tool_relay::adapters::{InMemoryExecutionStore, SseDecoder};
use tool_relay::application::{AllocationPolicy, ExecutionLedger, IndexAllocator};
use tool_relay::domain::execution::ExecutionRecord;
use tool_relay::domain::foundation::{ExecutionId, InvocationId};
use tool_relay::domain::invocation::ToolArguments;
use tool_relay::domain::stream::{
    BufferOutput, CompletedToolCall, InvocationBuffer, RawStreamEvent, StreamEventParser,
};

// =============================================================================
// Strategies
// =============================================================================

fn json_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| json!(n)),
        "\\PC{0,12}".prop_map(Value::String),
    ];
    leaf.prop_recursive(3, 32, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::hash_map("[a-z_]{1,8}", inner, 0..6)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

/// Splits `text` at the given points, nudged forward to char boundaries.
fn split_at_points(text: &str, points: &[prop::sample::Index]) -> Vec<String> {
    let mut cuts: Vec<usize> = points
        .iter()
        .map(|p| {
            let mut at = p.index(text.len() + 1);
            while !text.is_char_boundary(at) {
                at += 1;
            }
            at
        })
        .collect();
    cuts.push(0);
    cuts.push(text.len());
    cuts.sort_unstable();
    cuts.dedup();
    cuts.windows(2).map(|w| text[w[0]..w[1]].to_string()).collect()
}

/// Feeds one tool block through parser and buffer.
fn rebuild(fragments: &[String]) -> CompletedToolCall {
    let mut parser = StreamEventParser::new();
    let mut buffer = InvocationBuffer::new();
    let mut events = vec![RawStreamEvent::tool_start(3, "toolu_p", "search")];
    events.extend(fragments.iter().map(|f| RawStreamEvent::json_delta(3, f.as_str())));
    events.push(RawStreamEvent::stop(3));

    let mut completed = None;
    for raw in events {
        let event = parser.parse(raw).unwrap().unwrap();
        if let Some(BufferOutput::ToolCall(call)) = buffer.apply(&event) {
            completed = Some(call);
        }
    }
    completed.expect("block stop completes the call")
}

// =============================================================================
// Streaming equivalence
// =============================================================================

proptest! {
    #[test]
    fn fragmented_json_matches_single_parse(
        value in json_value(),
        points in prop::collection::vec(any::<prop::sample::Index>(), 0..10),
    ) {
        let text = serde_json::to_string(&value).unwrap();
        let fragments = split_at_points(&text, &points);

        let call = rebuild(&fragments);

        prop_assert_eq!(&call.raw_arguments, &text);
        prop_assert_eq!(call.arguments, ToolArguments::from_fragment(&text));
        prop_assert!(!call.degraded);
    }

    #[test]
    fn fragmented_garbage_matches_single_parse(
        text in "\\PC{0,40}",
        points in prop::collection::vec(any::<prop::sample::Index>(), 0..10),
    ) {
        let fragments = split_at_points(&text, &points);

        let call = rebuild(&fragments);
        let whole = ToolArguments::from_fragment(&text);

        prop_assert_eq!(call.degraded, whole.is_degraded());
        prop_assert_eq!(call.arguments, whole);
    }
}

// =============================================================================
// SSE framing
// =============================================================================

fn transcript(fragments: &[String]) -> String {
    let mut events = vec![
        json!({"type": "message_start", "message": {"id": "msg_1"}}),
        json!({"type": "content_block_start", "index": 0, "content_block": {"type": "tool_use", "id": "toolu_s", "name": "search", "input": {}}}),
    ];
    for fragment in fragments {
        events.push(json!({"type": "content_block_delta", "index": 0, "delta": {"type": "input_json_delta", "partial_json": fragment}}));
    }
    events.push(json!({"type": "content_block_stop", "index": 0}));
    events.push(json!({"type": "message_delta", "delta": {"stop_reason": "tool_use"}}));

    events
        .iter()
        .map(|e| format!("event: {}\r\ndata: {}\r\n\r\n", e["type"].as_str().unwrap(), e))
        .collect()
}

proptest! {
    #[test]
    fn any_chunking_decodes_the_same_events(
        value in json_value(),
        fragment_points in prop::collection::vec(any::<prop::sample::Index>(), 0..4),
        chunk_points in prop::collection::vec(any::<prop::sample::Index>(), 0..16),
    ) {
        let fragments = split_at_points(&serde_json::to_string(&value).unwrap(), &fragment_points);
        let bytes = transcript(&fragments).into_bytes();

        let mut whole = SseDecoder::new();
        let mut expected = whole.push(&bytes);
        expected.extend(whole.finish());

        let mut cuts: Vec<usize> = chunk_points.iter().map(|p| p.index(bytes.len() + 1)).collect();
        cuts.extend([0, bytes.len()]);
        cuts.sort_unstable();
        cuts.dedup();
        let mut chunked = SseDecoder::new();
        let mut actual = Vec::new();
        for w in cuts.windows(2) {
            actual.extend(chunked.push(&bytes[w[0]..w[1]]));
        }
        actual.extend(chunked.finish());

        prop_assert_eq!(actual.len(), fragments.len() + 4);
        prop_assert_eq!(actual, expected);
    }
}

// =============================================================================
// Uniqueness
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn concurrent_allocators_hand_out_distinct_indices(
        allocators in 1usize..6,
        per_allocator in 1usize..16,
        squatted in prop::collection::hash_set(0u64..40, 0..20),
    ) {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(4)
            .enable_all()
            .build()
            .unwrap();

        let indices = runtime.block_on(async {
            let ledger = Arc::new(ExecutionLedger::new(
                Arc::new(InMemoryExecutionStore::new()),
                Duration::from_secs(600),
                Duration::from_secs(30),
            ));
            let record = ExecutionRecord::new(ExecutionId::new(), Duration::from_secs(60), ledger.ttl());
            ledger.begin(&record).await.unwrap();
            let id = record.execution_id;
            for index in &squatted {
                ledger.claim_slot(id, *index, "squatter").await.unwrap();
            }

            let mut handles = Vec::new();
            for _ in 0..allocators {
                let allocator = IndexAllocator::new(ledger.clone(), AllocationPolicy::default());
                handles.push(tokio::spawn(async move {
                    let mut mine = Vec::new();
                    for _ in 0..per_allocator {
                        let owner = InvocationId::generate();
                        mine.push(allocator.allocate(id, &owner).await.unwrap().index);
                    }
                    mine
                }));
            }
            let mut all = Vec::new();
            for handle in handles {
                all.extend(handle.await.unwrap());
            }
            all
        });

        let distinct: HashSet<u64> = indices.iter().copied().collect();
        prop_assert_eq!(distinct.len(), allocators * per_allocator);
        prop_assert!(distinct.is_disjoint(&squatted));
    }
}

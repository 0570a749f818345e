//! SSE bytes in, build actions out.

use forge_stream::{ActionKind, ParseOutput, SseDecoder, SseEvent, StreamSession};

fn sse_body(deltas: &[&str]) -> Vec<u8> {
    let mut body = String::new();
    for delta in deltas {
        let payload = serde_json::json!({
            "id": "chatcmpl-1",
            "choices": [{ "index": 0, "delta": { "content": delta } }]
        });
        body.push_str(&format!("data: {}\n\n", payload));
    }
    body.push_str("data: [DONE]\n\n");
    body.into_bytes()
}

fn run(body: &[u8], byte_chunk: usize) -> ParseOutput {
    let mut decoder = SseDecoder::new();
    let mut session = StreamSession::begin("integration");
    let mut out = ParseOutput::default();

    for bytes in body.chunks(byte_chunk) {
        for event in decoder.push(bytes) {
            if let SseEvent::Delta(text) = event {
                out.extend(session.push(&text));
            }
        }
    }
    for event in decoder.finish() {
        if let SseEvent::Delta(text) = event {
            out.extend(session.push(&text));
        }
    }
    out.extend(session.finish());
    out
}

#[test]
fn test_actions_survive_transport_chunking() {
    let body = sse_body(&[
        "Building it now. <arti",
        "fact id=\"counter\" title=\"Counter\"><action type=\"file\" pa",
        "th=\"package.json\">{ \"name\": \"counter\" }</act",
        "ion><action type=\"shell\">npm install</action><action type=\"shell\">npm run dev",
        "</action></artifact> Done ✓",
    ]);

    let reference = run(&body, body.len());
    for chunk in [1, 3, 7, 64] {
        assert_eq!(run(&body, chunk), reference, "byte chunk size {}", chunk);
    }

    let commands: Vec<_> = reference
        .actions()
        .filter_map(|a| match &a.kind {
            ActionKind::Shell { command } => Some(command.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(commands, vec!["npm install", "npm run dev"]);
    assert_eq!(reference.actions().count(), 3);
    assert_eq!(reference.text(), "Building it now.  Done ✓");
}

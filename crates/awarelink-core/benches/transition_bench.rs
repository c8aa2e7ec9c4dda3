//! Criterion benchmarks for the link state machine.
//!
//! Every platform callback goes through [`LinkState::apply`] on the runtime
//! task, so a transition must stay far below the callback rate of the
//! discovery transport.
//!
//! Run with:
//! ```bash
//! cargo bench --package awarelink-core --bench transition_bench
//! ```

use awarelink_core::{
    AttachmentId, HandshakeMessage, LinkCommand, LinkEvent, LinkState, NetworkId, PeerHandle,
    SessionId,
};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

// ── Fixtures ──────────────────────────────────────────────────────────────────

const SESSION: SessionId = SessionId(1);

fn publishing() -> LinkState {
    let state = LinkState::default()
        .apply(LinkEvent::Attached(AttachmentId(1)))
        .state;
    let state = state
        .execute(LinkCommand::Advertise)
        .expect("advertise must succeed")
        .state;
    state.apply(LinkEvent::PublishStarted(SESSION)).state
}

fn connected_publisher() -> LinkState {
    let peer = PeerHandle::new(SESSION, 2);
    let t = publishing().apply(LinkEvent::MessageReceived(
        peer,
        HandshakeMessage::InitConnect.encode(),
    ));
    let attempt = t.state.attempt().expect("attempt in flight").id;
    t.state
        .apply(LinkEvent::ListenerOpened { attempt, port: 54321 })
        .state
        .apply(LinkEvent::NetworkAvailable(NetworkId(1)))
        .state
}

// ── Benchmarks ────────────────────────────────────────────────────────────────

fn bench_init_connect(c: &mut Criterion) {
    let state = publishing();
    let peer = PeerHandle::new(SESSION, 2);
    let bytes = HandshakeMessage::InitConnect.encode();
    c.bench_function("apply_init_connect", |b| {
        b.iter(|| state.apply(black_box(LinkEvent::MessageReceived(peer, bytes.clone()))))
    });
}

fn bench_payload_forward(c: &mut Criterion) {
    let state = connected_publisher();
    let peer = PeerHandle::new(SESSION, 2);
    let bytes = HandshakeMessage::Payload("x".repeat(64)).encode();
    c.bench_function("apply_payload_connected", |b| {
        b.iter(|| state.apply(black_box(LinkEvent::MessageReceived(peer, bytes.clone()))))
    });
}

fn bench_disconnect(c: &mut Criterion) {
    let state = connected_publisher();
    c.bench_function("execute_disconnect_connected", |b| {
        b.iter(|| state.execute(black_box(LinkCommand::Disconnect)))
    });
}

fn bench_decode(c: &mut Criterion) {
    let bytes = b"COMPLETE_CONNECT".to_vec();
    c.bench_function("decode_complete_connect", |b| {
        b.iter(|| HandshakeMessage::decode(black_box(&bytes)))
    });
}

criterion_group!(
    benches,
    bench_init_connect,
    bench_payload_forward,
    bench_disconnect,
    bench_decode
);
criterion_main!(benches);

use edge_telemetry::{new_request_ids, record_command_dispatched};

#[test]
fn request_ids_are_distinct() {
    let a = new_request_ids();
    let b = new_request_ids();
    assert_ne!(a.request_id, b.request_id);
    assert_ne!(a.trace_id, b.trace_id);
}

#[test]
fn metrics_counters_accumulate() {
    let before = edge_telemetry::metrics().snapshot().commands_dispatched;
    record_command_dispatched();
    record_command_dispatched();
    let after = edge_telemetry::metrics().snapshot().commands_dispatched;
    assert_eq!(after, before + 2);
}

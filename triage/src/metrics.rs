use std::sync::LazyLock;

use prometheus::{register_int_counter, Encoder, IntCounter, TextEncoder};

pub static CHAT_REQUESTS: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!("triage_chat_requests_total", "Chat turns handled")
        .expect("metric can be registered")
});

pub static CHAT_NO_RESPONSE: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!("triage_chat_no_response_total", "Chat turns that produced no answer")
        .expect("metric can be registered")
});

pub static CLASSIFIER_FALLBACKS: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!(
        "triage_classifier_fallbacks_total",
        "Classifications that fell back to the Other category"
    )
    .expect("metric can be registered")
});

pub static RETRIEVAL_CALLS: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!("triage_retrieval_calls_total", "Knowledge base searches")
        .expect("metric can be registered")
});

pub static ESCALATIONS: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!("triage_escalations_total", "Escalation tickets generated")
        .expect("metric can be registered")
});

/// Prometheus text exposition of the default registry.
pub fn render() -> (Vec<u8>, String) {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
    }
    (buffer, encoder.format_type().to_string())
}

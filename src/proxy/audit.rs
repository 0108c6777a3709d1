//! Audit logging for gate decisions and forwarded calls.
//!
//! Structured fields only. Secrets, credentials and bodies never appear here.

use tracing::{info, warn};

/// Log a request admitted by the gate.
pub fn log_admitted(client: &str, method: &str, path: &str, count: u32) {
    info!(
        target: "hook_gate::audit",
        client = client,
        method = method,
        path = path,
        window_count = count,
        decision = "allow",
        "proxy request admitted"
    );
}

/// Log a request rejected by the gate.
pub fn log_rejected(client: &str, method: &str, path: &str, status: u16, reason: &str) {
    info!(
        target: "hook_gate::audit",
        client = client,
        method = method,
        path = path,
        status = status,
        decision = "deny",
        reason = reason,
        "proxy request rejected"
    );
}

/// Log the outcome of an upstream call.
pub fn log_forwarded(request_id: &str, method: &str, status: u16, elapsed_ms: u128) {
    info!(
        target: "hook_gate::audit",
        request_id = request_id,
        method = method,
        status = status,
        elapsed_ms = elapsed_ms as u64,
        "upstream response"
    );
}

/// Log an admitted request whose upstream call failed.
pub fn log_forward_failed(request_id: &str, method: &str, status: u16, reason: &str, elapsed_ms: u128) {
    warn!(
        target: "hook_gate::audit",
        request_id = request_id,
        method = method,
        status = status,
        reason = reason,
        elapsed_ms = elapsed_ms as u64,
        "upstream call failed"
    );
}

//! Fuzz target for request and reply payload parsing.

#![no_main]

use appproxy_socket::{Reply, Request};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(request) = serde_json::from_slice::<Request>(data) {
        let _ = request.method();
    }
    if let Ok(reply) = serde_json::from_slice::<Reply>(data) {
        let _ = reply.into_result();
    }
});

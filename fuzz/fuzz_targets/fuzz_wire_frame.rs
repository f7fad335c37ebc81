//! Fuzz target for the frame decoder.
//!
//! Feeds arbitrary bytes to the codec in arbitrary chunk sizes and checks
//! that decoding never panics.

#![no_main]

use appproxy_socket::WireCodec;
use arbitrary::Arbitrary;
use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use tokio_util::codec::Decoder;

#[derive(Arbitrary, Debug)]
struct Input {
    chunk: u8,
    data: Vec<u8>,
}

fuzz_target!(|input: Input| {
    let mut codec = WireCodec::with_max_payload(64 * 1024);
    let mut buf = BytesMut::new();
    let chunk = usize::from(input.chunk.max(1));

    for piece in input.data.chunks(chunk) {
        buf.extend_from_slice(piece);
        loop {
            match codec.decode(&mut buf) {
                Ok(Some(frame)) => {
                    let _ = frame.to_request();
                    let _ = frame.to_reply(frame.method);
                }
                Ok(None) => break,
                Err(_) => return,
            }
        }
    }
});

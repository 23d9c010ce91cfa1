#![no_main]
#[macro_use]
extern crate libfuzzer_sys;
extern crate tls13_engine;

use tls13_engine::internal::msgs::{Codec, HandshakeMessagePayload, Reader};

fuzz_target!(|data: &[u8]| {
    let mut rdr = Reader::init(data);
    if let Ok(msg) = HandshakeMessagePayload::read(&mut rdr) {
        // whatever parses must re-encode to a stable, reparseable form
        let enc = msg.get_encoding();
        let reparsed = HandshakeMessagePayload::read_bytes(&enc).unwrap();
        assert_eq!(reparsed.get_encoding(), enc);
    }
});

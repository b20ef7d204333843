#![no_main]
use libfuzzer_sys::fuzz_target;
use nc3_format::{Header, ReadOptions};

fuzz_target!(|data: &[u8]| {
    let len = data.len() as u64;
    let _ = Header::parse(data, len, &ReadOptions::new());
    if let Ok(mut h) = Header::parse(data, len, &ReadOptions::new().allow_truncated(true)) {
        // whatever parses must serialize to the size it claims
        let expected = nc3_format::header_writer::size_header(&h);
        let bytes = nc3_format::header_writer::serialize(&mut h);
        assert_eq!(bytes.len() as u64, expected);
    }
});

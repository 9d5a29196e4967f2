#![no_main]

use conga_routing::{parse_tag, TAG_LEN};
use libfuzzer_sys::fuzz_target;

// Arbitrary bytes must either fail to parse or decode to a tag whose encoding matches
// the consumed prefix (a zero feedback port drops the metric field).
fuzz_target!(|data: &[u8]| {
    let Ok((rest, tag)) = parse_tag(data) else {
        assert!(data.len() < TAG_LEN);
        return;
    };
    assert_eq!(rest.len(), data.len() - TAG_LEN);
    let encoded = tag.to_bytes();
    assert_eq!(&encoded[..12], &data[..12]);
    if tag.feedback.is_some() {
        assert_eq!(&encoded[12..], &data[12..TAG_LEN]);
    }
});

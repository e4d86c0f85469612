#![no_main]

use ledger_sync::sync::{decode_ledger, decode_ledger_lenient, encode_ledger};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    let lenient = decode_ledger_lenient(text);
    match decode_ledger(text) {
        Ok(issues) => {
            assert!(lenient.skipped.is_empty());
            assert_eq!(issues, lenient.issues);
            // Anything that decodes must re-encode and decode to the same issues.
            if let Ok(encoded) = encode_ledger(&issues) {
                let again = decode_ledger(&encoded).expect("re-encoded ledger decodes");
                assert_eq!(again, issues);
            }
        }
        Err(_) => assert!(!lenient.skipped.is_empty()),
    }
});

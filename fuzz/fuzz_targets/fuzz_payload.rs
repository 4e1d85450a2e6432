#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        // Neither decoder may panic; accepted symbol payloads must re-parse
        // from their own serialization.
        let _ = flitstat_payload::parse_file_score(s);
        if let Ok((symbol, score)) = flitstat_payload::parse_symbol_score(s) {
            let text = flitstat_payload::format_symbol_score(&symbol, score);
            let (again, score_again) = flitstat_payload::parse_symbol_score(&text)
                .expect("serialized payload must parse");
            assert_eq!(again, symbol);
            assert_eq!(score_again.to_bits(), score.to_bits());
        }
    }
});

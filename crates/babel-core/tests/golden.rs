mod common;

use babel_core::{parse_result, try_parse_result, ResultValue};

fn check_sample(name: &str) {
    let raw = common::read_file(&format!("tests/samples/{}.txt", name));
    let expected: serde_json::Value =
        serde_json::from_str(&common::read_file(&format!("tests/samples/{}.json", name)))
            .expect("sample JSON");
    assert_eq!(parse_result(&raw).to_json(), expected, "sample {}", name);
}

#[test]
fn test_table_with_hline() {
    check_sample("table_with_hline");
}

#[test]
fn test_hash_gist() {
    check_sample("hash_gist");
}

#[test]
fn test_delimiters_in_strings() {
    check_sample("delimiters_in_strings");
}

#[test]
fn test_itemized_rows() {
    check_sample("itemized_rows");
}

#[test]
fn test_scalars() {
    check_sample("scalars");
}

#[test]
fn test_malformed_passes_through() {
    let raw = common::read_file("tests/samples/malformed.txt");
    assert!(try_parse_result(&raw).is_err());
    check_sample("malformed");
}

#[test]
fn test_literal_form_is_stable() {
    for name in ["table_with_hline", "delimiters_in_strings", "itemized_rows"] {
        let raw = common::read_file(&format!("tests/samples/{}.txt", name));
        let value = parse_result(&raw);
        let reparsed: ResultValue = parse_result(&value.to_literal());
        assert_eq!(reparsed, value, "sample {}", name);
    }
}

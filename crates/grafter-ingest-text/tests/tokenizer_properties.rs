use grafter_ingest_text::{JsonlTokenizer, TsvTokenizer};
use grafter_model::{PropValue, Tokenizer, VertexId};
use proptest::prelude::*;

fn word() -> impl Strategy<Value = String> {
    proptest::string::string_regex("[a-z][a-z0-9_]{0,8}").unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn tokenizers_never_panic(line in "\\PC{0,60}") {
        let _ = TsvTokenizer.tokenize(&line);
        let _ = JsonlTokenizer.tokenize(&line);
    }

    #[test]
    fn tsv_and_jsonl_agree_on_ids(name in word(), label in word(), n in any::<i64>()) {
        let tsv = TsvTokenizer
            .tokenize(&format!("V\t{name}\t{label}\tn={n}"))
            .unwrap();
        let json = JsonlTokenizer
            .tokenize(&format!(r#"{{"id":"{name}","label":"{label}","props":{{"n":{n}}}}}"#))
            .unwrap();
        prop_assert_eq!(&tsv, &json);
        prop_assert_eq!(&tsv.vertices[0].id, &VertexId::labeled(name.as_str(), label.as_str()));
        prop_assert_eq!(&tsv.vertices[0].props["n"], &PropValue::Long(n));
    }
}

//! Example: Anonymizing detected spans
//!
//! Shows operator precedence (request override, configured default,
//! request `DEFAULT`, fallback) and the reported output offsets.
//!
//! Run with: cargo run -p estpii-anonymizer --example anonymize_text

use estpii_anonymizer::{AnonymizationConfig, AnonymizerEngine, Operator, OperatorSetting};
use estpii_core::{EntityType, RecognitionResult, Span};
use std::collections::{BTreeMap, HashMap};

fn main() -> estpii_core::Result<()> {
    let text = "Minu nimi on Jaan Tamm, isikukood 38001085718, ja ma elan Tallinnas.";
    let result = RecognitionResult::try_from_spans(vec![
        Span::new(13, 22, EntityType::PERSON, 0.99),
        Span::new(34, 45, EntityType::EE_PERSONAL_CODE, 1.0),
        Span::new(58, 67, EntityType::LOCATION, 0.95),
    ])?;

    let config = AnonymizationConfig {
        default_operators: BTreeMap::from([
            ("PERSON".to_string(), OperatorSetting::Replacement("[ISIK]".to_string())),
            ("LOCATION".to_string(), OperatorSetting::Replacement("[ASUKOHT]".to_string())),
        ]),
        ..Default::default()
    };
    config.validate()?;
    let engine = AnonymizerEngine::new(&config);

    let requests: Vec<(&str, HashMap<String, Operator>)> = vec![
        ("configured defaults", HashMap::new()),
        (
            "mask personal code",
            HashMap::from([(
                "EE_PERSONAL_CODE".to_string(),
                Operator::Mask {
                    masking_char: "*".to_string(),
                    chars_to_mask: 7,
                    from_end: true,
                },
            )]),
        ),
        (
            "hash everything else",
            HashMap::from([("DEFAULT".to_string(), Operator::Hash { hash_type: Default::default() })]),
        ),
    ];

    println!("Original: {}\n", text);
    for (description, overrides) in requests {
        let anonymized = engine.anonymize(text, &result, &overrides)?;
        println!("{}:\n  {}", description, anonymized.text);
        for item in &anonymized.items {
            println!(
                "  {:<17} [{}, {}) -> [{}, {}) via {}",
                item.entity_type, item.start, item.end, item.output_start, item.output_end, item.operator
            );
        }
        println!();
    }

    Ok(())
}

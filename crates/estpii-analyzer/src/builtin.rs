//! Built-in pattern recognizers for Estonian and common identifiers

use crate::config::{PatternSpec, RecognizerSpec, RecognizerSpecKind};
use crate::pattern::InvalidMatchPolicy;
use crate::validators::Validator;
use estpii_core::EntityType;

fn pattern_spec(
    name: &str,
    entity: EntityType,
    patterns: &[(&str, &str, f32)],
    validator: Option<Validator>,
    on_invalid: InvalidMatchPolicy,
    context: &[&str],
) -> RecognizerSpec {
    RecognizerSpec {
        name: name.to_string(),
        supported_entity: entity,
        kind: RecognizerSpecKind::Pattern {
            patterns: patterns
                .iter()
                .map(|(name, regex, score)| PatternSpec {
                    name: name.to_string(),
                    regex: regex.to_string(),
                    score: *score,
                })
                .collect(),
            validator,
            on_invalid,
        },
        supported_language: None,
        supported_languages: Vec::new(),
        context: context.iter().map(|w| w.to_string()).collect(),
    }
}

/// Specs of the built-in recognizers, in registration order
///
/// Languages are left empty so they register for every supported language.
pub fn builtin_specs() -> Vec<RecognizerSpec> {
    vec![
        pattern_spec(
            "EePersonalCodeRecognizer",
            EntityType::EE_PERSONAL_CODE,
            &[(
                "isikukood",
                r"\b[1-8][0-9]{2}(?:0[1-9]|1[0-2])(?:0[1-9]|[12][0-9]|3[01])[0-9]{4}\b",
                0.5,
            )],
            Some(Validator::EePersonalCode),
            InvalidMatchPolicy::Downgrade { score: 0.1 },
            &["isikukood", "isikukoodiga", "ik"],
        ),
        pattern_spec(
            "EePhoneRecognizer",
            EntityType::PHONE_NUMBER,
            &[(
                "ee_phone",
                r"(?:\+372[ -]?|\b)(?:5[0-9]{2,3}|[3467][0-9]{2})[ -]?[0-9]{4}\b",
                0.5,
            )],
            None,
            InvalidMatchPolicy::Reject,
            &["tel", "telefon", "mobiil", "helista"],
        ),
        pattern_spec(
            "EeVehiclePlateRecognizer",
            EntityType::EE_VEHICLE_PLATE,
            &[("ee_plate", r"\b[0-9]{3} ?[A-Z]{3}\b", 0.4)],
            None,
            InvalidMatchPolicy::Reject,
            &["numbrimärk", "auto", "sõiduk", "registreerimisnumber"],
        ),
        pattern_spec(
            "EmailRecognizer",
            EntityType::EMAIL_ADDRESS,
            &[(
                "email",
                r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b",
                1.0,
            )],
            None,
            InvalidMatchPolicy::Reject,
            &[],
        ),
        pattern_spec(
            "IbanRecognizer",
            EntityType::IBAN_CODE,
            &[(
                "iban",
                r"\b[A-Z]{2}[0-9]{2}(?: ?[A-Z0-9]{4}){3,7}(?: ?[A-Z0-9]{1,3})?\b",
                0.5,
            )],
            Some(Validator::Iban),
            InvalidMatchPolicy::Reject,
            &["iban", "konto", "arveldusarve"],
        ),
        pattern_spec(
            "CreditCardRecognizer",
            EntityType::CREDIT_CARD,
            &[("card", r"\b(?:[0-9][ -]?){12,18}[0-9]\b", 0.3)],
            Some(Validator::Luhn),
            InvalidMatchPolicy::Reject,
            &["kaart", "krediitkaart", "card"],
        ),
        pattern_spec(
            "IpRecognizer",
            EntityType::IP_ADDRESS,
            &[("ipv4", r"\b(?:[0-9]{1,3}\.){3}[0-9]{1,3}\b", 0.6)],
            Some(Validator::IpAddress),
            InvalidMatchPolicy::Reject,
            &["ip"],
        ),
        pattern_spec(
            "UrlRecognizer",
            EntityType::URL,
            &[(
                "url",
                r#"\b(?:https?://|www\.)[^\s<>"']*[^\s<>"'.,;:!?)\]]"#,
                0.5,
            )],
            None,
            InvalidMatchPolicy::Reject,
            &[],
        ),
    ]
}

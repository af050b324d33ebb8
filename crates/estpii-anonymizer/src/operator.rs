//! Anonymization operator definitions

use estpii_core::{EntityType, Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};

/// Transform applied to a detected span
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    /// Replace with a fixed value
    Replace {
        /// Replacement text; `<ENTITY_TYPE>` when absent
        #[serde(default, skip_serializing_if = "Option::is_none")]
        new_value: Option<String>,
    },

    /// Overwrite characters with a masking character
    Mask {
        /// Single masking character
        #[serde(default = "default_masking_char")]
        masking_char: String,

        /// Number of characters to mask
        #[serde(default = "default_chars_to_mask")]
        chars_to_mask: usize,

        /// Mask the trailing characters instead of the leading ones
        #[serde(default = "default_from_end")]
        from_end: bool,
    },

    /// Remove the span
    Redact,

    /// Replace with a hex digest of the original
    Hash {
        #[serde(default)]
        hash_type: HashType,
    },

    /// Leave the text unchanged
    Keep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HashType {
    #[default]
    Sha256,
    Sha512,
}

fn default_masking_char() -> String {
    "*".to_string()
}

fn default_chars_to_mask() -> usize {
    4
}

fn default_from_end() -> bool {
    true
}

impl Operator {
    /// Replace with an explicit value
    pub fn replace(new_value: impl Into<String>) -> Self {
        Self::Replace {
            new_value: Some(new_value.into()),
        }
    }

    /// Operator name as reported in anonymization items
    pub fn name(&self) -> &'static str {
        match self {
            Self::Replace { .. } => "replace",
            Self::Mask { .. } => "mask",
            Self::Redact => "redact",
            Self::Hash { .. } => "hash",
            Self::Keep => "keep",
        }
    }

    /// Check the operator parameters
    pub fn validate(&self) -> Result<()> {
        if let Self::Mask { masking_char, .. } = self {
            single_char(masking_char)?;
        }
        Ok(())
    }

    /// Compute the replacement for `original`
    pub fn apply(&self, original: &str, entity_type: &EntityType) -> Result<String> {
        match self {
            Self::Replace { new_value } => Ok(new_value
                .clone()
                .unwrap_or_else(|| format!("<{}>", entity_type))),

            Self::Mask {
                masking_char,
                chars_to_mask,
                from_end,
            } => {
                let mask = single_char(masking_char)?;
                Ok(mask_chars(original, mask, *chars_to_mask, *from_end))
            }

            Self::Redact => Ok(String::new()),

            Self::Hash { hash_type } => {
                if original.is_empty() {
                    return Err(Error::operator("cannot hash an empty value"));
                }
                Ok(match hash_type {
                    HashType::Sha256 => format!("{:x}", Sha256::digest(original.as_bytes())),
                    HashType::Sha512 => format!("{:x}", Sha512::digest(original.as_bytes())),
                })
            }

            Self::Keep => Ok(original.to_string()),
        }
    }
}

impl Default for Operator {
    fn default() -> Self {
        Self::Replace { new_value: None }
    }
}

fn single_char(value: &str) -> Result<char> {
    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(Error::operator(format!(
            "masking_char must be a single character, got '{}'",
            value
        ))),
    }
}

fn mask_chars(original: &str, mask: char, count: usize, from_end: bool) -> String {
    let len = original.chars().count();
    let count = count.min(len);
    let (mask_from, mask_to) = if from_end {
        (len - count, len)
    } else {
        (0, count)
    };

    original
        .chars()
        .enumerate()
        .map(|(i, c)| if (mask_from..mask_to).contains(&i) { mask } else { c })
        .collect()
}

/// Operator given either as a bare replacement string or a full definition
///
/// Configuration files commonly map entity types straight to a replacement
/// value (`PERSON: "[ISIK]"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OperatorSetting {
    Replacement(String),
    Operator(Operator),
}

impl OperatorSetting {
    /// Resolve into an operator
    pub fn to_operator(&self) -> Operator {
        match self {
            Self::Replacement(value) => Operator::replace(value.clone()),
            Self::Operator(operator) => operator.clone(),
        }
    }
}

impl From<Operator> for OperatorSetting {
    fn from(operator: Operator) -> Self {
        Self::Operator(operator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replace_operator() {
        let json = r#"{"type": "replace", "new_value": "[ISIK]"}"#;
        let op: Operator = serde_json::from_str(json).unwrap();

        assert_eq!(op.apply("Jaan Tamm", &EntityType::PERSON).unwrap(), "[ISIK]");
        assert_eq!(op.name(), "replace");
    }

    #[test]
    fn test_replace_without_value_uses_type() {
        let op: Operator = serde_json::from_str(r#"{"type": "replace"}"#).unwrap();
        assert_eq!(
            op.apply("Tallinn", &EntityType::LOCATION).unwrap(),
            "<LOCATION>"
        );
    }

    #[test]
    fn test_mask_defaults() {
        let op: Operator = serde_json::from_str(r#"{"type": "mask"}"#).unwrap();
        assert_eq!(
            op.apply("+372 5123 4567", &EntityType::PHONE_NUMBER).unwrap(),
            "+372 5123 ****"
        );
    }

    #[test]
    fn test_mask_from_start_and_overlong() {
        let op = Operator::Mask {
            masking_char: "#".to_string(),
            chars_to_mask: 3,
            from_end: false,
        };
        assert_eq!(op.apply("Õie", &EntityType::PERSON).unwrap(), "###");

        let op = Operator::Mask {
            masking_char: "x".to_string(),
            chars_to_mask: 50,
            from_end: true,
        };
        assert_eq!(op.apply("Tamm", &EntityType::PERSON).unwrap(), "xxxx");
    }

    #[test]
    fn test_invalid_masking_char() {
        let op = Operator::Mask {
            masking_char: "**".to_string(),
            chars_to_mask: 2,
            from_end: true,
        };
        assert!(op.validate().is_err());
        assert!(matches!(
            op.apply("Tamm", &EntityType::PERSON),
            Err(Error::Operator(_))
        ));
    }

    #[test]
    fn test_redact_and_keep() {
        assert_eq!(Operator::Redact.apply("x", &EntityType::URL).unwrap(), "");
        assert_eq!(Operator::Keep.apply("Tartu", &EntityType::LOCATION).unwrap(), "Tartu");
    }

    #[test]
    fn test_hash() {
        let sha256: Operator = serde_json::from_str(r#"{"type": "hash"}"#).unwrap();
        let digest = sha256.apply("38001085718", &EntityType::EE_PERSONAL_CODE).unwrap();
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));

        let sha512: Operator =
            serde_json::from_str(r#"{"type": "hash", "hash_type": "sha512"}"#).unwrap();
        assert_eq!(sha512.apply("a", &EntityType::PERSON).unwrap().len(), 128);

        assert!(sha256.apply("", &EntityType::PERSON).is_err());
    }

    #[test]
    fn test_unknown_type_rejected() {
        assert!(serde_json::from_str::<Operator>(r#"{"type": "encrypt"}"#).is_err());
    }

    #[test]
    fn test_setting_forms() {
        let yaml = "PERSON: \"[ISIK]\"\nEMAIL_ADDRESS:\n  type: mask\n  chars_to_mask: 6\n";
        let settings: std::collections::BTreeMap<String, OperatorSetting> =
            serde_yaml::from_str(yaml).unwrap();

        assert_eq!(settings["PERSON"].to_operator(), Operator::replace("[ISIK]"));
        assert_eq!(settings["EMAIL_ADDRESS"].to_operator().name(), "mask");
    }
}

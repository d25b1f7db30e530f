use std::collections::{BTreeMap, HashMap};

use crate::core::config::ValidatorKey;

/// Deployed resources carry a `<prefix>-` naming convention; vault, channel,
/// and instance-group filters all match against this form.
pub fn full_prefix(prefix: &str) -> String {
    format!("{}-", prefix)
}

/// Last `/`-separated segment of a provider resource path.
pub fn last_segment(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Secret names follow the fixed `polkadot-<group>-<slot>-<field>` template.
pub fn secret_name(group: &str, slot: &str, field: &str) -> String {
    format!("polkadot-{}-{}-{}", group, slot, field)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedSecret {
    pub name: String,
    pub value: String,
}

/// Expected vault entries for a set of configured validator keys: every slot
/// uploads its `type`, `seed`, and `key` fields under the `keys` group.
pub fn expected_validator_secrets(keys: &BTreeMap<String, ValidatorKey>) -> Vec<ExpectedSecret> {
    let mut expected = Vec::with_capacity(keys.len() * 3);
    for (slot, key) in keys {
        expected.push(ExpectedSecret {
            name: secret_name("keys", slot, "type"),
            value: key.key_type.clone(),
        });
        expected.push(ExpectedSecret {
            name: secret_name("keys", slot, "seed"),
            value: key.seed.clone(),
        });
        expected.push(ExpectedSecret {
            name: secret_name("keys", slot, "key"),
            value: key.key.clone(),
        });
    }
    expected
}

/// Exact-match check of fetched secrets against the expected set. Every
/// missing name and every mismatched value is reported; any problem fails
/// the overall check.
pub fn verify_secrets(
    actual: &HashMap<String, String>,
    expected: &[ExpectedSecret],
) -> Result<(), Vec<String>> {
    let mut problems = Vec::new();
    for entry in expected {
        match actual.get(&entry.name) {
            None => problems.push(format!("secret {} is missing", entry.name)),
            Some(value) if value != &entry.value => {
                problems.push(format!("secret {} does not match the expected value", entry.name))
            }
            Some(_) => {}
        }
    }
    if problems.is_empty() {
        Ok(())
    } else {
        Err(problems)
    }
}

//! PT-014: BLAKE3 hashing for entity ids, plan fingerprints and code fallbacks.

use crate::core::types::{EntityType, Plan};
use crate::store::Scope;

/// Hash a string. Returns `"blake3:{hex}"`.
pub fn hash_string(s: &str) -> String {
    format!("blake3:{}", blake3::hash(s.as_bytes()).to_hex())
}

/// Compute a composite hash from multiple components.
pub fn composite_hash(components: &[&str]) -> String {
    let mut hasher = blake3::Hasher::new();
    for c in components {
        hasher.update(c.as_bytes());
        hasher.update(b"\0");
    }
    format!("blake3:{}", hasher.finalize().to_hex())
}

/// Stable id for an entity: `{kind}-{16 hex}` over kind, scope and name.
pub fn entity_id(kind: EntityType, scope: &Scope, name: &str) -> String {
    let kind_s = kind.to_string();
    let hash = composite_hash(&[
        &kind_s,
        scope.project.as_deref().unwrap_or(""),
        scope.parent.as_deref().unwrap_or(""),
        name,
    ]);
    let hex = hash.strip_prefix("blake3:").unwrap_or(&hash);
    format!("{}-{}", kind_s, &hex[..16])
}

/// Fingerprint of a plan's commit-relevant content.
///
/// Covers type, name, parent index and resolved params of every step, so a
/// rename or a changed frame range yields a new fingerprint while re-fetched
/// entities do not.
pub fn plan_fingerprint(plan: &Plan) -> String {
    let mut hasher = blake3::Hasher::new();
    for step in plan.iter() {
        hasher.update(step.kind.to_string().as_bytes());
        hasher.update(b"\0");
        hasher.update(step.name.as_bytes());
        hasher.update(b"\0");
        if let Some(p) = step.parent {
            hasher.update(&(p as u64).to_le_bytes());
        }
        hasher.update(b"\0");
        let params = serde_json::to_string(&step.params).unwrap_or_default();
        hasher.update(params.as_bytes());
        hasher.update(b"\n");
    }
    format!("blake3:{}", hasher.finalize().to_hex())
}

/// `count` uppercase letters drawn from the digest of `seed`.
pub fn digest_letters(seed: &str, count: usize) -> String {
    let mut out = String::with_capacity(count);
    let mut round = 0u32;
    while out.len() < count {
        let mut hasher = blake3::Hasher::new();
        hasher.update(seed.as_bytes());
        hasher.update(&round.to_le_bytes());
        for byte in hasher.finalize().as_bytes() {
            if out.len() == count {
                break;
            }
            out.push(char::from(b'A' + byte % 26));
        }
        round += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{PlanStep, StepParams, StepRole};

    #[test]
    fn test_pt014_hash_string() {
        let h1 = hash_string("hello");
        let h2 = hash_string("hello");
        let h3 = hash_string("world");
        assert_eq!(h1, h2);
        assert_ne!(h1, h3);
        assert_eq!(h1.len(), 7 + 64);
    }

    #[test]
    fn test_pt014_composite_separator() {
        assert_ne!(composite_hash(&["ab", "c"]), composite_hash(&["a", "bc"]));
    }

    #[test]
    fn test_pt014_entity_id_shape() {
        let id = entity_id(EntityType::AssetType, &Scope::global(), "Character");
        assert!(id.starts_with("asset_type-"));
        assert_eq!(id.len(), "asset_type-".len() + 16);
        assert_eq!(
            id,
            entity_id(EntityType::AssetType, &Scope::global(), "Character")
        );
    }

    #[test]
    fn test_pt014_entity_id_scoped() {
        let a = Scope {
            project: Some("project-a".into()),
            parent: None,
        };
        let b = Scope {
            project: Some("project-b".into()),
            parent: None,
        };
        assert_ne!(
            entity_id(EntityType::Sequence, &a, "SQ10"),
            entity_id(EntityType::Sequence, &b, "SQ10")
        );
    }

    fn plan_with(name: &str) -> Plan {
        Plan {
            steps: vec![PlanStep {
                kind: EntityType::Project,
                name: name.to_string(),
                role: StepRole::Context,
                parent: None,
                params: StepParams {
                    name: name.to_string(),
                    ..StepParams::default()
                },
                fetched_data: None,
                created_entity: None,
            }],
        }
    }

    #[test]
    fn test_pt014_plan_fingerprint() {
        let a = plan_with("Feature");
        let b = plan_with("Feature");
        let c = plan_with("Sequel");
        assert_eq!(plan_fingerprint(&a), plan_fingerprint(&b));
        assert_ne!(plan_fingerprint(&a), plan_fingerprint(&c));
        assert!(plan_fingerprint(&Plan::new()).starts_with("blake3:"));
    }

    #[test]
    fn test_pt014_digest_letters() {
        let l = digest_letters("Feature", 40);
        assert_eq!(l.len(), 40);
        assert!(l.chars().all(|c| c.is_ascii_uppercase()));
        assert_eq!(l, digest_letters("Feature", 40));
        assert_eq!(&digest_letters("Feature", 3), &l[..3]);
    }
}

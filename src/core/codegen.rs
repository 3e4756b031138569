//! PT-002: Code generation - names to short remote-facing codes.
//!
//! Every generator is pure and total. Malformed input degrades to a
//! placeholder plus a warning instead of an error. The `derive_*` forms hand the
//! warning back to the caller (so it can reach a [`LogSink`](super::sink::LogSink));
//! the `generate_*` forms report it through `tracing`.

use crate::ledger::hasher::digest_letters;
use regex::RegexBuilder;

/// Project code length for names shorter than [`LONG_NAME_THRESHOLD`] characters.
pub const SHORT_CODE_LEN: usize = 3;

/// Project code length for longer names.
pub const LONG_CODE_LEN: usize = 5;

pub const LONG_NAME_THRESHOLD: usize = 10;

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "the", "of", "in", "on", "at", "to", "for", "with", "by", "from", "or",
];

/// A generated code and the warning raised while producing it, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generated {
    pub code: String,
    pub warning: Option<String>,
}

impl Generated {
    fn clean(code: String) -> Self {
        Self {
            code,
            warning: None,
        }
    }

    fn warned(code: String, warning: String) -> Self {
        Self {
            code,
            warning: Some(warning),
        }
    }

    /// Take the code, emitting the warning through `tracing`.
    pub fn into_code(self) -> String {
        if let Some(w) = &self.warning {
            tracing::warn!("{}", w);
        }
        self.code
    }
}

// ============================================================================
// Project codes
// ============================================================================

/// Uppercase acronym code for a project name (3 or 5 characters).
pub fn derive_project_code(name: &str) -> Generated {
    let target = if name.chars().count() < LONG_NAME_THRESHOLD {
        SHORT_CODE_LEN
    } else {
        LONG_CODE_LEN
    };

    if name.trim().is_empty() {
        return Generated::warned(
            pad("PRJ".to_string(), target),
            "blank project name, using placeholder code".to_string(),
        );
    }

    let sanitized: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace())
        .collect();
    let words: Vec<&str> = sanitized.split_whitespace().collect();
    if words.is_empty() {
        let code = digest_letters(name, target);
        return Generated::warned(
            code.clone(),
            format!(
                "project name '{}' has no alphanumeric characters, using code {}",
                name, code
            ),
        );
    }

    let significant: Vec<&str> = words
        .iter()
        .copied()
        .filter(|w| !STOP_WORDS.contains(&w.to_ascii_lowercase().as_str()))
        .collect();
    let words = if significant.is_empty() {
        words
    } else {
        significant
    };

    let letters = if words.len() >= target {
        words
            .iter()
            .take(target)
            .filter_map(|w| w.chars().next())
            .collect()
    } else {
        round_robin(&words, target)
    };
    Generated::clean(pad(letters, target).to_ascii_uppercase())
}

pub fn generate_project_code(name: &str) -> String {
    derive_project_code(name).into_code()
}

/// Hand out letters one word at a time until `target` are allocated, then
/// concatenate each word's share in word order.
fn round_robin(words: &[&str], target: usize) -> String {
    let chars: Vec<Vec<char>> = words.iter().map(|w| w.chars().collect()).collect();
    let mut taken = vec![0usize; chars.len()];
    let mut allocated = 0;
    'passes: loop {
        let mut progressed = false;
        for (i, word) in chars.iter().enumerate() {
            if allocated == target {
                break 'passes;
            }
            if taken[i] < word.len() {
                taken[i] += 1;
                allocated += 1;
                progressed = true;
            }
        }
        if !progressed {
            break;
        }
    }
    chars
        .iter()
        .zip(&taken)
        .flat_map(|(word, &n)| word.iter().take(n))
        .collect()
}

fn pad(mut code: String, target: usize) -> String {
    while code.chars().count() < target {
        code.push('X');
    }
    code
}

// ============================================================================
// Incremental codes (episodes, sequences)
// ============================================================================

/// `{prefix}{NN}` one past the highest existing number, offset by how many
/// codes with this prefix are already planned in the current pass.
pub fn derive_incremental_code(prefix: &str, existing: &[String], planned_count: u32) -> Generated {
    let pattern = RegexBuilder::new(&format!(r"^{}(\d+)", regex::escape(prefix)))
        .case_insensitive(true)
        .build();
    let max = match pattern {
        Ok(re) => existing
            .iter()
            .filter_map(|code| re.captures(code))
            .filter_map(|caps| caps.get(1)?.as_str().parse::<u64>().ok())
            .max()
            .unwrap_or(0),
        Err(e) => {
            return Generated::warned(
                format!("{}{:02}", prefix, 1 + u64::from(planned_count)),
                format!("cannot scan existing '{}' codes: {}", prefix, e),
            )
        }
    };
    match max.checked_add(1 + u64::from(planned_count)) {
        Some(next) => Generated::clean(format!("{}{:02}", prefix, next)),
        None => Generated::warned(
            format!("{}xx", prefix),
            format!("'{}' code numbers exhausted (highest is {}), using placeholder", prefix, max),
        ),
    }
}

pub fn generate_incremental_code(prefix: &str, existing: &[String], planned_count: u32) -> String {
    derive_incremental_code(prefix, existing, planned_count).into_code()
}

// ============================================================================
// Shot and asset codes
// ============================================================================

/// `{sequence_code}_sh{NN}`, lower-cased.
pub fn derive_shot_code(sequence_code: &str, shot_number: u32) -> Generated {
    let mut warnings = Vec::new();
    let seq = if sequence_code.trim().is_empty() {
        warnings.push("shot has no sequence code, using seqxx".to_string());
        "seqxx"
    } else {
        sequence_code.trim()
    };
    let n = if shot_number == 0 {
        warnings.push("shot number 0 treated as 1".to_string());
        1
    } else {
        shot_number
    };
    let code = format!("{}_sh{:02}", seq, n).to_lowercase();
    if warnings.is_empty() {
        Generated::clean(code)
    } else {
        Generated::warned(code, warnings.join("; "))
    }
}

pub fn generate_shot_code(sequence_code: &str, shot_number: u32) -> String {
    derive_shot_code(sequence_code, shot_number).into_code()
}

/// `{slug(type)}_{slug(name)}`.
pub fn derive_asset_code(asset_type_name: &str, asset_name: &str) -> Generated {
    let mut warnings = Vec::new();
    let mut t = slugify(asset_type_name);
    if t.is_empty() {
        warnings.push(format!("asset '{}' has no asset type name", asset_name));
        t = "asset".to_string();
    }
    let mut n = slugify(asset_name);
    if n.is_empty() {
        warnings.push("blank asset name, using 'untitled'".to_string());
        n = "untitled".to_string();
    }
    let code = format!("{}_{}", t, n);
    if warnings.is_empty() {
        Generated::clean(code)
    } else {
        Generated::warned(code, warnings.join("; "))
    }
}

pub fn generate_asset_code(asset_type_name: &str, asset_name: &str) -> String {
    derive_asset_code(asset_type_name, asset_name).into_code()
}

/// Lowercase snake_case: non-alphanumerics become `_`, runs collapse, ends trimmed.
pub fn slugify(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    out.trim_matches('_').to_string()
}

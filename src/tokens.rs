//! Token estimation for chunk budgets.
//!
//! Chunk sizing uses a cheap heuristic of one unit per three characters,
//! applied line by line as text is emitted. It approximates the service's
//! pricing unit and is not exact. Exact BPE counts via tiktoken-rs are
//! available for reporting.

use std::sync::OnceLock;
use tiktoken_rs::CoreBPE;

/// Characters per estimated unit.
pub const CHARS_PER_UNIT: usize = 3;

/// Default per-chunk ceiling in units.
pub const DEFAULT_MAX_TOKENS: usize = 4 * 1024;

/// Estimate the units consumed by one emitted line.
///
/// # Examples
///
/// ```
/// use redpen::tokens::estimate_units;
///
/// assert_eq!(estimate_units("L1\tHello"), 2);
/// assert_eq!(estimate_units("ab"), 0);
/// ```
pub fn estimate_units(line: &str) -> usize {
    line.chars().count() / CHARS_PER_UNIT
}

/// Running total of estimated units against a ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetMeter {
    total: usize,
    ceiling: usize,
}

impl BudgetMeter {
    /// Create an empty meter with the given ceiling.
    pub fn new(ceiling: usize) -> Self {
        Self { total: 0, ceiling }
    }

    /// Add units, returning the new total.
    pub fn accumulate(&mut self, units: usize) -> usize {
        self.total = self.total.saturating_add(units);
        self.total
    }

    /// Estimate `line` and add it to the total.
    pub fn charge(&mut self, line: &str) -> usize {
        self.accumulate(estimate_units(line))
    }

    /// Whether the running total has gone past the ceiling.
    pub fn exceeded(&self) -> bool {
        exceeded(self.total, self.ceiling)
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }
}

/// Whether `total` has gone past `ceiling`. Reaching it exactly is allowed.
pub fn exceeded(total: usize, ceiling: usize) -> bool {
    total > ceiling
}

/// Token encoding used for exact counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    /// cl100k_base: GPT-4, GPT-3.5-turbo
    #[default]
    Cl100kBase,
    /// o200k_base: GPT-4o family
    O200kBase,
}

impl std::fmt::Display for Encoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Encoding::Cl100kBase => write!(f, "cl100k_base"),
            Encoding::O200kBase => write!(f, "o200k_base"),
        }
    }
}

impl std::str::FromStr for Encoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cl100k" | "cl100k_base" => Ok(Encoding::Cl100kBase),
            "o200k" | "o200k_base" => Ok(Encoding::O200kBase),
            _ => Err(format!("unknown encoding: {}", s)),
        }
    }
}

impl Encoding {
    /// Encoding used by a model family.
    pub fn for_model(model: &str) -> Self {
        let name = model.rsplit('/').next().unwrap_or(model);
        if name.starts_with("gpt-4o") || name.starts_with("o1") || name.starts_with("o3") {
            Encoding::O200kBase
        } else {
            Encoding::Cl100kBase
        }
    }
}

static CL100K: OnceLock<Option<CoreBPE>> = OnceLock::new();
static O200K: OnceLock<Option<CoreBPE>> = OnceLock::new();

fn get_tokenizer(encoding: Encoding) -> Option<&'static CoreBPE> {
    match encoding {
        Encoding::Cl100kBase => CL100K
            .get_or_init(|| tiktoken_rs::cl100k_base().ok())
            .as_ref(),
        Encoding::O200kBase => O200K
            .get_or_init(|| tiktoken_rs::o200k_base().ok())
            .as_ref(),
    }
}

/// Count BPE tokens, falling back to the unit heuristic when the
/// tokenizer cannot be loaded.
pub fn count_tokens_with_encoding(text: &str, encoding: Encoding) -> usize {
    match get_tokenizer(encoding) {
        Some(bpe) => bpe.encode_ordinary(text).len(),
        None => estimate_units(text),
    }
}

/// Count BPE tokens with the default encoding.
pub fn count_tokens(text: &str) -> usize {
    count_tokens_with_encoding(text, Encoding::default())
}

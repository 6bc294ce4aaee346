//! Context-window accounting and tiered truncation of tool results.
//!
//! Every processed result is charged against a running token estimate; as
//! usage crosses the configured thresholds, the share of context a single
//! result may occupy shrinks. Head and tail of truncated output are kept so
//! both the command echo and the trailing error survive.

use std::collections::HashMap;

use tracing::debug;

use crate::config::BudgetConfig;
use crate::executor::ToolResult;

/// Stats are halved once a tool's call count passes this, so the running
/// average tracks recent behavior instead of the whole session.
const STATS_RESCALE_CALLS: u64 = 64;

/// Remaining-call estimates are advisory; never claim more than this.
const MAX_REMAINING_CALLS: usize = 50;

/// Assumed per-call cost for tools with no recorded history. Shell output is
/// typically short; file reads dominate.
fn default_call_tokens(tool_id: &str) -> usize {
    match tool_id {
        "read_file" => 2_000,
        "bash" => 1_500,
        _ => 1_000,
    }
}

/// Fraction of the total context held back for the model's own reply.
const RESERVE_PERCENT: f64 = 0.10;

/// Rough token count: four characters per token.
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// How aggressively results are shortened at the current usage level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TruncationTier {
    Normal,
    Moderate,
    Aggressive,
    Critical,
}

impl TruncationTier {
    /// Multiplier applied to the per-result context share.
    #[must_use]
    fn share_factor(self) -> f64 {
        match self {
            Self::Normal => 1.0,
            Self::Moderate => 0.5,
            Self::Aggressive => 0.25,
            Self::Critical => 0.1,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Moderate => "moderate",
            Self::Aggressive => "aggressive",
            Self::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct ToolUsageStats {
    calls: u64,
    total_tokens: u64,
}

impl ToolUsageStats {
    fn record(&mut self, tokens: usize) {
        self.calls += 1;
        self.total_tokens += tokens as u64;
        if self.calls > STATS_RESCALE_CALLS {
            self.calls /= 2;
            self.total_tokens /= 2;
        }
    }

    fn average(&self) -> Option<usize> {
        if self.calls == 0 {
            return None;
        }
        Some(usize::try_from(self.total_tokens / self.calls).unwrap_or(usize::MAX))
    }
}

/// Running context-budget state for one session.
#[derive(Debug)]
pub struct ResultBudgetManager {
    config: BudgetConfig,
    used_tokens: usize,
    per_tool: HashMap<String, ToolUsageStats>,
}

impl ResultBudgetManager {
    #[must_use]
    pub fn new(config: BudgetConfig) -> Self {
        Self {
            config,
            used_tokens: 0,
            per_tool: HashMap::new(),
        }
    }

    /// Tokens still usable for tool results, after the reserve held back for
    /// the model's reply.
    #[must_use]
    pub fn remaining_tokens(&self) -> usize {
        let reserve = fraction_of(self.config.total_context_tokens, RESERVE_PERCENT);
        self.config
            .total_context_tokens
            .saturating_sub(reserve)
            .saturating_sub(self.used_tokens)
    }

    /// Fraction of the total context consumed so far.
    #[must_use]
    pub fn usage_fraction(&self) -> f64 {
        if self.config.total_context_tokens == 0 {
            return 1.0;
        }
        self.used_tokens as f64 / self.config.total_context_tokens as f64
    }

    #[must_use]
    pub fn tier(&self) -> TruncationTier {
        let usage = self.usage_fraction();
        if usage >= self.config.critical_threshold {
            TruncationTier::Critical
        } else if usage >= self.config.aggressive_threshold {
            TruncationTier::Aggressive
        } else if usage >= self.config.moderate_threshold {
            TruncationTier::Moderate
        } else {
            TruncationTier::Normal
        }
    }

    /// Largest result size allowed right now, never below the configured
    /// floor so a tightening budget cannot shrink results into uselessness.
    #[must_use]
    pub fn max_result_tokens(&self) -> usize {
        let share = self.config.max_context_percent * self.tier().share_factor();
        let allowed = fraction_of(self.remaining_tokens(), share);
        allowed.max(self.config.min_token_floor)
    }

    /// Charge a result against the budget and shorten it if it exceeds the
    /// current allowance. Results flagged non-truncatable pass through
    /// unmodified but are still charged in full.
    pub fn process(
        &mut self,
        tool_id: &str,
        mut result: ToolResult,
        truncatable: bool,
        guidance: Option<&str>,
    ) -> ToolResult {
        let Some(content) = result.content.take() else {
            self.charge(tool_id, result.error.as_deref().unwrap_or(""));
            return result;
        };

        let tokens = estimate_tokens(&content);
        let max_tokens = self.max_result_tokens();
        let content = if !truncatable || result.non_truncatable || tokens <= max_tokens {
            content
        } else {
            let tier = self.tier();
            debug!(
                tool = tool_id,
                tokens,
                max_tokens,
                ?tier,
                "truncating oversized tool result"
            );
            truncate_middle(&content, max_tokens, tier, guidance)
        };

        self.charge(tool_id, &content);
        result.content = Some(content);
        result
    }

    /// Advisory estimate of how many more calls of this tool fit in the
    /// remaining budget. The tool's own recorded average wins; without
    /// history its static default applies, never another tool's average.
    #[must_use]
    pub fn estimate_remaining_calls(&self, tool_id: &str) -> usize {
        let per_call = self
            .per_tool
            .get(tool_id)
            .and_then(ToolUsageStats::average)
            .unwrap_or_else(|| default_call_tokens(tool_id))
            .max(1);
        (self.remaining_tokens() / per_call).min(MAX_REMAINING_CALLS)
    }

    fn charge(&mut self, tool_id: &str, content: &str) {
        let tokens = estimate_tokens(content);
        self.used_tokens = self.used_tokens.saturating_add(tokens);
        self.per_tool
            .entry(tool_id.to_string())
            .or_default()
            .record(tokens);
    }
}

/// Keep the head and tail of oversized output, replacing the middle with a
/// banner that reports how much was dropped and how to narrow the call.
fn truncate_middle(
    content: &str,
    max_tokens: usize,
    tier: TruncationTier,
    guidance: Option<&str>,
) -> String {
    let total_tokens = estimate_tokens(content);
    let mut banner = format!(
        "\n\n[output truncated ({}): {} of {total_tokens} tokens omitted]",
        tier.label(),
        total_tokens.saturating_sub(max_tokens)
    );
    banner.push('\n');
    banner.push_str(guidance.unwrap_or("narrow the request to reduce output"));
    if tier == TruncationTier::Critical {
        banner.push_str("\ncontext nearly exhausted: stop requesting large outputs");
    }
    banner.push_str("\n\n");

    let budget_bytes = max_tokens * 4;
    let keep = budget_bytes.saturating_sub(banner.len());
    if keep == 0 {
        // Banner alone blows the budget; fall back to a bare marker.
        let head = floor_char_boundary(content, budget_bytes.saturating_sub(32));
        return format!("{}\n[output truncated]", &content[..head]);
    }

    let head_end = floor_char_boundary(content, keep / 2);
    let tail_start = ceil_char_boundary(content, content.len() - keep / 2);
    format!("{}{banner}{}", &content[..head_end], &content[tail_start..])
}

fn floor_char_boundary(s: &str, mut index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    while !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn ceil_char_boundary(s: &str, mut index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    while !s.is_char_boundary(index) {
        index += 1;
    }
    index
}

fn fraction_of(value: usize, fraction: f64) -> usize {
    let scaled = value as f64 * fraction;
    if scaled <= 0.0 {
        0
    } else {
        scaled as usize
    }
}

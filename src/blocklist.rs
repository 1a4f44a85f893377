/// Why a market was excluded by the blocklist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    Category,
    Keyword,
}

impl std::fmt::Display for BlockReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockReason::Category => write!(f, "category"),
            BlockReason::Keyword => write!(f, "keyword"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockResult {
    Allowed,
    Blocked {
        reason: BlockReason,
        /// The blocklist entry that matched, as configured.
        matched_value: String,
    },
}

impl BlockResult {
    pub fn is_blocked(&self) -> bool {
        matches!(self, BlockResult::Blocked { .. })
    }
}

/// Case-insensitive blocklist check. Categories match exactly, keywords match as
/// substrings of the question. Categories are checked before keywords.
pub fn is_market_blocked(
    question: &str,
    category: &str,
    blocklist_categories: &[String],
    blocklist_keywords: &[String],
) -> BlockResult {
    let category_lower = category.to_lowercase();
    if let Some(blocked) = blocklist_categories
        .iter()
        .find(|c| c.to_lowercase() == category_lower)
    {
        return BlockResult::Blocked {
            reason: BlockReason::Category,
            matched_value: blocked.clone(),
        };
    }

    let question_lower = question.to_lowercase();
    if let Some(keyword) = blocklist_keywords
        .iter()
        .find(|k| question_lower.contains(&k.to_lowercase()))
    {
        return BlockResult::Blocked {
            reason: BlockReason::Keyword,
            matched_value: keyword.clone(),
        };
    }

    BlockResult::Allowed
}

//! Blocking policy resolution for matched bot patterns.

use crate::patterns::{BotPattern, PropertySettings};

/// Decide whether a matched bot pattern should be blocked under the given
/// settings.
///
/// Precedence, most specific first:
/// 1. an allow rule naming the pattern,
/// 2. an allow rule naming its category, subcategory or type group,
/// 3. a block rule naming the pattern,
/// 4. a block rule naming one of its groups,
/// 5. the global AI-model-trainer switch,
/// 6. allow.
pub fn should_block(pattern: &BotPattern, settings: &PropertySettings) -> bool {
    let pattern_scope = format!("pattern:{}", pattern.pattern);
    let category_scope = format!("category:{}", pattern.category);
    let subcategory_scope = format!("subcategory:{}:{}", pattern.category, pattern.subcategory);
    let type_scope = format!(
        "type:{}:{}:{}",
        pattern.category, pattern.subcategory, pattern.agent_type
    );

    if settings.custom_allows.contains(&pattern_scope) {
        return false;
    }
    if settings.custom_allows.contains(&category_scope)
        || settings.custom_allows.contains(&subcategory_scope)
        || settings.custom_allows.contains(&type_scope)
    {
        return false;
    }

    if settings.custom_blocks.contains(&pattern_scope) {
        return true;
    }
    if settings.custom_blocks.contains(&category_scope)
        || settings.custom_blocks.contains(&subcategory_scope)
        || settings.custom_blocks.contains(&type_scope)
    {
        return true;
    }

    if settings.block_ai_model_trainers && pattern.is_ai_model_trainer {
        return true;
    }

    false
}

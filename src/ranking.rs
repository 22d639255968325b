use crate::config::RankingSettings;
use crate::learning;
use crate::models::{LearningProfile, RankedSuggestion, Suggestion};

/// Coach strengths and the suggestion keywords that play to them.
pub const STRENGTH_KEYWORDS: &[(&str, &[&str])] = &[
    ("nutrition", &["nutrition", "diet", "meal", "meals", "recipe", "recipes"]),
    (
        "strength_training",
        &["strength", "hiit", "training", "workout", "workouts"],
    ),
    ("coaching", &["coaching", "mentoring", "1:1", "accountability"]),
    (
        "community",
        &["community", "group", "challenge", "challenges", "referral", "referrals"],
    ),
    ("content_creation", &["content", "video", "videos", "reels", "blog"]),
];

/// Quarterly objectives and the suggestion keywords that advance them.
pub const OBJECTIVE_KEYWORDS: &[(&str, &[&str])] = &[
    ("capture_leads", &["lead", "leads", "capture", "landing", "funnel"]),
    (
        "sell_packs",
        &["pack", "packs", "sale", "sales", "offer", "upsell", "pricing"],
    ),
    (
        "retain_clients",
        &["retention", "loyalty", "referral", "referrals", "reactivation"],
    ),
    (
        "grow_audience",
        &["followers", "reach", "social", "instagram", "audience"],
    ),
];

/// Reorders suggestions by learned preference plus strength and objective
/// fit. Every input suggestion is returned exactly once; equal scores keep
/// their input order.
pub fn rank_suggestions(
    suggestions: &[Suggestion],
    profile: &LearningProfile,
    strengths: &[String],
    objectives: &[String],
    settings: &RankingSettings,
) -> Vec<RankedSuggestion> {
    let mut ranked: Vec<RankedSuggestion> = suggestions
        .iter()
        .map(|suggestion| {
            let text = format!("{} {}", suggestion.title, suggestion.description);
            let words = learning::tokenize(&text);
            let derived_type = learning::derive_type(&suggestion.title, &suggestion.description);
            let learning_weight = learning_weight(derived_type, profile, settings);
            let matched_strengths = keyword_matches(&words, strengths, STRENGTH_KEYWORDS);
            let matched_objectives = keyword_matches(&words, objectives, OBJECTIVE_KEYWORDS);

            let score = learning_weight
                + settings.strength_weight * matched_strengths.len() as f64
                + settings.objective_weight * matched_objectives.len() as f64;

            RankedSuggestion {
                suggestion: suggestion.clone(),
                derived_type: derived_type.to_string(),
                score: if score.is_finite() { score } else { 0.0 },
                learning_weight,
                matched_strengths,
                matched_objectives,
            }
        })
        .collect();

    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
    ranked
}

/// Confidence-scaled net acceptance for a type, in [-1, 1]. Types without
/// accept or reject feedback are neutral.
pub fn learning_weight(
    derived_type: &str,
    profile: &LearningProfile,
    settings: &RankingSettings,
) -> f64 {
    let Some(entry) = profile.breakdown_for(derived_type) else {
        return 0.0;
    };
    let decisive = entry.accepted + entry.rejected;
    if decisive == 0 || settings.confidence_cap <= 0.0 {
        return 0.0;
    }
    let confidence = (entry.total() as f64 / settings.confidence_cap).min(1.0);
    let net = entry.accepted as f64 - entry.rejected as f64;
    confidence * net / decisive as f64
}

fn keyword_matches(
    words: &[String],
    declared: &[String],
    table: &[(&str, &[&str])],
) -> Vec<String> {
    declared
        .iter()
        .filter(|key| {
            table
                .iter()
                .find(|(name, _)| *name == key.as_str())
                .is_some_and(|(_, keywords)| {
                    keywords.iter().any(|keyword| learning::has_keyword(words, keyword))
                })
        })
        .cloned()
        .collect()
}

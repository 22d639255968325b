use std::collections::HashMap;

use crate::config::LearningSettings;
use crate::models::{
    FeedbackAction, FeedbackEvent, LearningProfile, ReasonCount, TypeBreakdown, TypeCount,
};

pub const GENERAL_TYPE: &str = "general";
pub const UNSPECIFIED_REASON: &str = "unspecified";

/// Suggestion categories and the keywords that identify them. Earlier rows
/// win, so narrower categories sit above broader ones. Keywords match whole
/// words; multi-word keywords match as a phrase.
pub const DERIVED_TYPES: &[(&str, &[&str])] = &[
    ("retargeting", &["retargeting", "remarketing", "retarget"]),
    ("email", &["email", "emails", "newsletter", "nurturing", "inbox"]),
    (
        "referral",
        &["referral", "referrals", "referido", "testimonial", "testimonials", "review", "reviews"],
    ),
    (
        "events",
        &["event", "events", "challenge", "workshop", "workshops", "webinar", "webinars"],
    ),
    ("funnel", &["funnel", "landing", "checkout", "conversion", "conversions"]),
    (
        "pricing",
        &["pack", "packs", "offer", "offers", "discount", "pricing", "promo"],
    ),
    ("social", &["instagram", "social", "reels", "tiktok", "stories"]),
    (
        "content",
        &["content", "blog", "video", "videos", "post", "posts", "lead magnet"],
    ),
    ("ads", &["ads", "budget", "roas", "paid", "campaign", "campaigns"]),
];

/// Lowercased alphanumeric words of `text`.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Whether `keyword` appears in `words` as a whole word, or as a run of
/// consecutive words when it has several.
pub fn has_keyword(words: &[String], keyword: &str) -> bool {
    let needle = tokenize(keyword);
    !needle.is_empty() && words.windows(needle.len()).any(|window| window == needle.as_slice())
}

pub fn derive_type(title: &str, description: &str) -> &'static str {
    let words = tokenize(&format!("{title} {description}"));
    DERIVED_TYPES
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|keyword| has_keyword(&words, keyword)))
        .map(|(derived_type, _)| *derived_type)
        .unwrap_or(GENERAL_TYPE)
}

pub fn event_type(event: &FeedbackEvent) -> &'static str {
    derive_type(&event.context.title, &event.context.description)
}

/// Rule-based improvement hints. Each rule is evaluated against a built
/// profile, in the order listed in [`ImprovementRule::ALL`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImprovementRule {
    SparseFeedback,
    LowAcceptance,
    TypeRejection,
    CommonRejectionReason,
    StrongAlignment,
}

impl ImprovementRule {
    pub const ALL: [ImprovementRule; 5] = [
        ImprovementRule::SparseFeedback,
        ImprovementRule::LowAcceptance,
        ImprovementRule::TypeRejection,
        ImprovementRule::CommonRejectionReason,
        ImprovementRule::StrongAlignment,
    ];

    pub fn evaluate(&self, profile: &LearningProfile, settings: &LearningSettings) -> Vec<String> {
        match self {
            ImprovementRule::SparseFeedback => {
                if profile.total_feedback < settings.sparse_feedback_minimum {
                    vec![format!(
                        "Only {} feedback events recorded. Rate at least {} suggestions \
                         so recommendations can adapt.",
                        profile.total_feedback, settings.sparse_feedback_minimum
                    )]
                } else {
                    Vec::new()
                }
            }
            ImprovementRule::LowAcceptance => {
                if profile.total_feedback > 0
                    && profile.acceptance_rate < settings.low_acceptance_threshold
                {
                    vec![format!(
                        "Acceptance is low ({:.0}%). More feedback is needed to learn \
                         your preferences.",
                        profile.acceptance_rate
                    )]
                } else {
                    Vec::new()
                }
            }
            ImprovementRule::TypeRejection => profile
                .type_breakdown
                .iter()
                .filter(|entry| entry.rejection_rate > settings.type_rejection_threshold)
                .map(|entry| {
                    format!(
                        "Suggestions of type \"{}\" are rejected {:.0}% of the time; \
                         they will be ranked lower.",
                        entry.derived_type, entry.rejection_rate
                    )
                })
                .collect(),
            ImprovementRule::CommonRejectionReason => profile
                .common_rejection_reasons
                .first()
                .filter(|reason| reason.reason != UNSPECIFIED_REASON)
                .map(|reason| {
                    vec![format!(
                        "Most common rejection reason: \"{}\" ({} times).",
                        reason.reason, reason.count
                    )]
                })
                .unwrap_or_default(),
            ImprovementRule::StrongAlignment => {
                if profile.acceptance_rate > settings.strong_acceptance_threshold {
                    vec![format!(
                        "Suggestions match your preferences well ({:.0}% accepted). \
                         Keep rating them to stay accurate.",
                        profile.acceptance_rate
                    )]
                } else {
                    Vec::new()
                }
            }
        }
    }
}

/// Aggregates the full ledger into a profile. Pure: the same ledger always
/// yields an identical profile.
pub fn build_learning_profile(
    events: &[FeedbackEvent],
    settings: &LearningSettings,
) -> LearningProfile {
    let total = events.len();
    let mut breakdown: Vec<TypeBreakdown> = Vec::new();
    let mut type_index: HashMap<&'static str, usize> = HashMap::new();
    let mut reasons: Vec<ReasonCount> = Vec::new();
    let mut reason_index: HashMap<String, usize> = HashMap::new();

    for event in events {
        let derived_type = event_type(event);
        let slot = *type_index.entry(derived_type).or_insert_with(|| {
            breakdown.push(TypeBreakdown {
                derived_type: derived_type.to_string(),
                accepted: 0,
                rejected: 0,
                applied: 0,
                acceptance_rate: 0.0,
                rejection_rate: 0.0,
            });
            breakdown.len() - 1
        });
        let entry = &mut breakdown[slot];

        match event.action {
            FeedbackAction::Accept => entry.accepted += 1,
            FeedbackAction::Apply => entry.applied += 1,
            FeedbackAction::Reject => {
                entry.rejected += 1;
                let reason = event
                    .reason
                    .as_deref()
                    .filter(|reason| !reason.trim().is_empty())
                    .unwrap_or(UNSPECIFIED_REASON)
                    .to_string();
                let index = *reason_index.entry(reason.clone()).or_insert_with(|| {
                    reasons.push(ReasonCount { reason, count: 0 });
                    reasons.len() - 1
                });
                reasons[index].count += 1;
            }
        }
    }

    for entry in breakdown.iter_mut() {
        let type_total = entry.total();
        entry.acceptance_rate = percentage(entry.accepted, type_total);
        entry.rejection_rate = percentage(entry.rejected, type_total);
    }

    let accepted: usize = breakdown.iter().map(|entry| entry.accepted).sum();
    let rejected: usize = breakdown.iter().map(|entry| entry.rejected).sum();

    reasons.sort_by(|a, b| b.count.cmp(&a.count));

    let mut profile = LearningProfile {
        acceptance_rate: percentage(accepted, total),
        rejection_rate: percentage(rejected, total),
        total_feedback: total,
        top_accepted_types: top_types(&breakdown, accepted, settings.top_types_limit, |entry| {
            entry.accepted
        }),
        top_rejected_types: top_types(&breakdown, rejected, settings.top_types_limit, |entry| {
            entry.rejected
        }),
        common_rejection_reasons: reasons,
        type_breakdown: breakdown,
        improvement_suggestions: Vec::new(),
    };

    profile.improvement_suggestions = ImprovementRule::ALL
        .iter()
        .flat_map(|rule| rule.evaluate(&profile, settings))
        .collect();
    profile
}

fn top_types<F>(
    breakdown: &[TypeBreakdown],
    action_total: usize,
    limit: usize,
    count_of: F,
) -> Vec<TypeCount>
where
    F: Fn(&TypeBreakdown) -> usize,
{
    let mut counts: Vec<TypeCount> = breakdown
        .iter()
        .filter(|entry| count_of(entry) > 0)
        .map(|entry| {
            let count = count_of(entry);
            TypeCount {
                derived_type: entry.derived_type.clone(),
                count,
                percentage: percentage(count, action_total),
            }
        })
        .collect();
    counts.sort_by(|a, b| b.count.cmp(&a.count));
    counts.truncate(limit);
    counts
}

fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

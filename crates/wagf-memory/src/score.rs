//! Scoring and slot-allocation helpers shared by the ranked engines

use std::collections::HashSet;

use wagf_core::{BoosterMap, MemoryItem, MemorySource};

/// First matching booster wins; keys are `tag_key:tag_value` over the
/// item's source, emotion and kind tags.
pub(crate) fn boost_for(item: &MemoryItem, boosters: Option<&BoosterMap>) -> f64 {
    let Some(boosters) = boosters else {
        return 0.0;
    };
    for (key, boost) in boosters {
        let Some((tag_key, tag_value)) = key.split_once(':') else {
            continue;
        };
        let matched = match tag_key {
            "source" => item.source.as_str() == tag_value,
            "emotion" => item.emotion.as_str() == tag_value,
            "kind" => {
                matches!(
                    (tag_value, item.kind),
                    ("event", wagf_core::MemoryKind::Event)
                        | ("reasoning", wagf_core::MemoryKind::Reasoning)
                        | ("reflection", wagf_core::MemoryKind::Reflection)
                        | ("resolution", wagf_core::MemoryKind::Resolution)
                        | ("message", wagf_core::MemoryKind::Message)
                )
            }
            _ => false,
        };
        if matched {
            return *boost;
        }
    }
    0.0
}

/// Sort best-first: score, then recency, then stable insertion order.
pub(crate) fn rank(scored: &mut Vec<(f64, MemoryItem)>) {
    scored.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(b.1.timestamp.cmp(&a.1.timestamp))
    });
}

/// Best-first contents, identical content deduped, at most `k`.
pub(crate) fn take_deduped(ranked: &[(f64, MemoryItem)], k: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for (_, item) in ranked {
        if out.len() >= k {
            break;
        }
        if seen.insert(item.content.clone()) {
            out.push(item.content.clone());
        }
    }
    out
}

/// Stratified selection: per-source quotas first (capped so their sum never
/// exceeds `total_k`), then unused slots cascade to the best remaining items
/// regardless of source.
pub(crate) fn stratify(
    ranked: &[(f64, MemoryItem)],
    allocation: &[(MemorySource, usize)],
    total_k: usize,
) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::new();
    let mut budget = total_k;

    for (source, slots) in allocation {
        let quota = (*slots).min(budget);
        let mut taken = 0;
        for (_, item) in ranked.iter().filter(|(_, i)| i.source == *source) {
            if taken >= quota {
                break;
            }
            if seen.insert(item.content.clone()) {
                out.push(item.content.clone());
                taken += 1;
            }
        }
        budget -= taken;
    }

    // cascade whatever is left to the highest-scoring remainder
    for (_, item) in ranked {
        if budget == 0 {
            break;
        }
        if seen.insert(item.content.clone()) {
            out.push(item.content.clone());
            budget -= 1;
        }
    }

    out
}

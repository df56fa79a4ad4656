//! Deterministic candidate scoring. Given a semantic target, decides which
//! nodes compete (fuzzy target matching) and how trustworthy each of their
//! selector candidates is, blending provenance, uniqueness, visibility, a
//! dynamic-value penalty and the learned history boost. A coarse spatial
//! heuristic handles visual hints; hybrid ranking merges both signals.

use ferret_common::fuzzy::{matches_target, normalize};
use ferret_common::model::{
    BoundingBox, Candidate, CandidateKind, Node, Provenance, RankedCandidate, Snapshot,
};

use crate::history::HistoryStore;

// Provenance base weights. The ordering is load-bearing: scoring must stay
// monotone in generation priority (data attribute >= id >= name >= text),
// counting the extra bonus a #-prefixed id expression earns.
const W_DATA_ATTR: f32 = 0.50;
const W_ID: f32 = 0.35;
const W_ARIA_LABEL: f32 = 0.35;
const W_ROLE: f32 = 0.28;
const W_NAME: f32 = 0.25;
const W_PLACEHOLDER: f32 = 0.25;
const W_TEXT_ANCHOR: f32 = 0.18;

// A #id selector survives relayouts that break positional paths, so it
// outranks an attribute-form selector for the same id.
const ID_EXPRESSION_BONUS: f32 = 0.15;
const UNIQUE_BONUS: f32 = 0.30;
const VISIBILITY_BONUS: f32 = 0.12;
const DYNAMIC_PENALTY: f32 = 0.35;

// Spatial heuristic awards. Coarse by design: a fallback signal for visual
// hints, not a vision pipeline.
const REGION_SCORE: f32 = 0.8;
const TAG_SCORE: f32 = 0.7;

// Hybrid blend between DOM-derived and spatial scores.
const DOM_WEIGHT: f32 = 0.6;
const VISUAL_WEIGHT: f32 = 0.4;

pub const DEFAULT_TOP_K: usize = 3;

fn provenance_weight(provenance: Provenance) -> f32 {
    match provenance {
        Provenance::DataAttr => W_DATA_ATTR,
        Provenance::Id => W_ID,
        Provenance::AriaLabel => W_ARIA_LABEL,
        Provenance::Role => W_ROLE,
        Provenance::Name => W_NAME,
        Provenance::Placeholder => W_PLACEHOLDER,
        Provenance::TextAnchor => W_TEXT_ANCHOR,
    }
}

/// Confidence in `[0, 1]` that this candidate addresses this node robustly.
/// Pure aside from the history boost read.
pub fn score(
    candidate: &Candidate,
    node: &Node,
    snapshot: &Snapshot,
    history: &HistoryStore,
) -> f32 {
    let mut value = provenance_weight(candidate.provenance);
    if candidate.kind == CandidateKind::Css && candidate.expression.starts_with('#') {
        value += ID_EXPRESSION_BONUS;
    }
    if snapshot.match_count(&candidate.expression) == 1 {
        value += UNIQUE_BONUS;
    }
    if node.visible {
        value += VISIBILITY_BONUS;
    }
    if candidate.looks_dynamic {
        value -= DYNAMIC_PENALTY;
    }
    value += history.boost(&node.node_id, &candidate.expression);
    value.clamp(0.0, 1.0)
}

/// DOM-side ranking: one row per node that matches the target, carrying the
/// node's best-scoring candidate. Sorted descending, capped at `k`. One row
/// per node is enough: candidate assembly re-expands the ranked node's full
/// candidate list before execution, so sibling candidates are never lost.
pub fn rank(
    snapshot: &Snapshot,
    target: &str,
    history: &HistoryStore,
    k: usize,
) -> Vec<RankedCandidate> {
    let mut rows: Vec<RankedCandidate> = snapshot
        .nodes
        .iter()
        .filter(|node| matches_target(node, target))
        .filter_map(|node| {
            node.candidates
                .iter()
                .map(|c| (c, score(c, node, snapshot, history)))
                .max_by(|a, b| a.1.total_cmp(&b.1))
                .map(|(best, best_score)| RankedCandidate {
                    node_id: node.node_id.clone(),
                    kind: best.kind,
                    expression: best.expression.clone(),
                    score: best_score,
                    visual_score: 0.0,
                })
        })
        .collect();
    sort_rows(&mut rows);
    rows.truncate(k);
    rows
}

/// Spatial heuristic for visual hints. Awards a fixed score to nodes whose
/// box sits in the described screen region or whose tag matches a hinted
/// element type.
pub fn visual_rank(snapshot: &Snapshot, hint: &str) -> Vec<RankedCandidate> {
    let hint = normalize(hint);
    if hint.is_empty() {
        return Vec::new();
    }
    let mut rows: Vec<RankedCandidate> = snapshot
        .nodes
        .iter()
        .filter_map(|node| {
            let mut visual = 0.0f32;
            if region_matches(&hint, &node.bounding_box) {
                visual = REGION_SCORE;
            }
            if tag_matches(&hint, &node.tag) {
                visual = visual.max(TAG_SCORE);
            }
            if visual <= 0.0 {
                return None;
            }
            let best = node.candidates_by_confidence().first().map(|c| (**c).clone());
            let (kind, expression) = match best {
                Some(c) => (c.kind, c.expression),
                None => (ferret_common::model::CandidateKind::Xpath, node.xpath.clone()),
            };
            Some(RankedCandidate {
                node_id: node.node_id.clone(),
                kind,
                expression,
                score: 0.0,
                visual_score: visual,
            })
        })
        .collect();
    rows.sort_by(|a, b| {
        b.visual_score
            .total_cmp(&a.visual_score)
            .then_with(|| a.node_id.cmp(&b.node_id))
    });
    rows
}

/// Merge DOM and spatial rankings by node identity: 60% DOM, 40% spatial,
/// a missing side contributing zero. Descending, top `k`.
pub fn hybrid_rank(
    dom: &[RankedCandidate],
    visual: &[RankedCandidate],
    k: usize,
) -> Vec<RankedCandidate> {
    use std::collections::BTreeMap;

    struct Merged {
        kind: ferret_common::model::CandidateKind,
        expression: String,
        dom: f32,
        visual: f32,
    }

    let mut merged: BTreeMap<&str, Merged> = BTreeMap::new();
    for row in dom {
        merged
            .entry(row.node_id.as_str())
            .and_modify(|m| m.dom = m.dom.max(row.score))
            .or_insert(Merged {
                kind: row.kind,
                expression: row.expression.clone(),
                dom: row.score,
                visual: 0.0,
            });
    }
    for row in visual {
        merged
            .entry(row.node_id.as_str())
            .and_modify(|m| m.visual = m.visual.max(row.visual_score))
            .or_insert(Merged {
                kind: row.kind,
                expression: row.expression.clone(),
                dom: 0.0,
                visual: row.visual_score,
            });
    }

    let mut rows: Vec<RankedCandidate> = merged
        .into_iter()
        .map(|(node_id, m)| RankedCandidate {
            node_id: node_id.to_string(),
            kind: m.kind,
            expression: m.expression,
            score: DOM_WEIGHT * m.dom + VISUAL_WEIGHT * m.visual,
            visual_score: m.visual,
        })
        .collect();
    sort_rows(&mut rows);
    rows.truncate(k);
    rows
}

fn sort_rows(rows: &mut [RankedCandidate]) {
    rows.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.expression.cmp(&b.expression))
    });
}

fn region_matches(hint: &str, rect: &BoundingBox) -> bool {
    let mut constrained = false;
    let mut hit = true;
    if hint.contains("top") {
        constrained = true;
        hit &= rect.y < 200.0;
    }
    if hint.contains("bottom") {
        constrained = true;
        hit &= rect.y > 500.0;
    }
    if hint.contains("left") {
        constrained = true;
        hit &= rect.x < 400.0;
    }
    if hint.contains("right") {
        constrained = true;
        hit &= rect.x > 800.0;
    }
    constrained && hit
}

fn tag_matches(hint: &str, tag: &str) -> bool {
    hint.split_whitespace().any(|word| {
        word == tag || (word == "link" && tag == "a") || (word == "field" && tag == "input")
    })
}

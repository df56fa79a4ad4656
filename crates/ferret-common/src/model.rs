use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Pixel rectangle of an element at capture time, viewport-relative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn area(&self) -> f32 {
        self.width * self.height
    }
}

/// How a candidate expression addresses an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateKind {
    Css,
    Xpath,
}

/// Which extraction strategy produced a candidate.
///
/// Ordering is the generation priority: strategies earlier in the list
/// produce more trustworthy expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    DataAttr,
    Id,
    AriaLabel,
    Name,
    Placeholder,
    Role,
    TextAnchor,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::DataAttr => "data_attr",
            Provenance::Id => "id",
            Provenance::AriaLabel => "aria_label",
            Provenance::Name => "name",
            Provenance::Placeholder => "placeholder",
            Provenance::Role => "role",
            Provenance::TextAnchor => "text_anchor",
        }
    }
}

/// One way to address a node. Pure derived data, owned by the node that
/// produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub kind: CandidateKind,
    pub expression: String,
    pub provenance: Provenance,
    /// Fixed confidence assigned by the extractor strategy, before scoring.
    pub base_score: f32,
    #[serde(default)]
    pub looks_dynamic: bool,
}

/// One DOM element captured in a snapshot.
///
/// Created fresh on every extraction, never mutated, discarded at the next
/// extraction. `node_id` is stable for the same element on an unchanged
/// page but carries no guarantee across re-layouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub node_id: String,
    pub tag: String,
    /// Visible text, truncated at capture time.
    #[serde(default)]
    pub text: String,
    #[serde(default, deserialize_with = "deserialize_nullable_string_map")]
    pub attributes: HashMap<String, String>,
    #[serde(default)]
    pub aria_label: Option<String>,
    /// Positional path from the document root, usable as a last-resort
    /// address when every attribute-derived candidate fails.
    pub xpath: String,
    #[serde(default)]
    pub css_path: String,
    #[serde(default)]
    pub bounding_box: BoundingBox,
    #[serde(default)]
    pub visible: bool,
    #[serde(default)]
    pub semantic_label: Option<String>,
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

impl Node {
    /// Label-like fields considered for target matching, in check order.
    pub fn label_fields(&self) -> impl Iterator<Item = &str> {
        self.semantic_label
            .as_deref()
            .into_iter()
            .chain(self.aria_label.as_deref())
            .chain(std::iter::once(self.text.as_str()))
            .filter(|s| !s.is_empty())
    }

    /// Text the keyword-overlap check runs against.
    pub fn haystack(&self) -> String {
        let mut hay = self.text.clone();
        if let Some(aria) = &self.aria_label {
            if !hay.is_empty() {
                hay.push(' ');
            }
            hay.push_str(aria);
        }
        hay
    }

    /// The node's own candidates ordered by their extractor confidence,
    /// highest first.
    pub fn candidates_by_confidence(&self) -> Vec<&Candidate> {
        let mut out: Vec<&Candidate> = self.candidates.iter().collect();
        out.sort_by(|a, b| b.base_score.total_cmp(&a.base_score));
        out
    }
}

/// A point-in-time capture of the visible, interactive portion of a page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub url: String,
    #[serde(default)]
    pub title: String,
    /// Short structural digest over the sorted node ids; equal digests
    /// before and after an action mean the action observably did nothing.
    #[serde(default)]
    pub fingerprint: String,
    #[serde(default)]
    pub captured_at: u64,
    pub nodes: Vec<Node>,
}

impl Snapshot {
    pub fn find_node(&self, node_id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.node_id == node_id)
    }

    /// Number of nodes a candidate expression resolves to in this snapshot,
    /// judged by expression equality across per-node candidate lists.
    pub fn match_count(&self, expression: &str) -> usize {
        self.nodes
            .iter()
            .filter(|n| n.candidates.iter().any(|c| c.expression == expression))
            .count()
    }
}

/// Semantic action kinds the executor understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Navigate,
    Click,
    Type,
    Scroll,
    Wait,
    Extract,
    Done,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Navigate => "navigate",
            Action::Click => "click",
            Action::Type => "type",
            Action::Scroll => "scroll",
            Action::Wait => "wait",
            Action::Extract => "extract",
            Action::Done => "done",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Post-condition checked after an otherwise successful attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Validator {
    /// An element still resolves: the given selector, or the acted-on
    /// candidate when none is supplied.
    Present {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        selector: Option<String>,
    },
    /// The acted-on element's value equals the given string.
    ValueEquals { value: String },
    /// The page URL contains the given substring.
    UrlContains { value: String },
    /// The page body text contains the given substring.
    TextContains { value: String },
}

/// One requested semantic action, as proposed by the oracle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub step_id: String,
    pub action: Action,
    /// Semantic description of the element, or a URL for `navigate`.
    #[serde(default)]
    pub target: String,
    /// Text to type, or a scroll direction word.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expect: Option<Validator>,
    /// Coarse spatial/type description ("top right", "button").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visual_hint: Option<String>,
    /// Node identity resolved in an earlier cycle, if the oracle pinned one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_node: Option<String>,
}

impl Step {
    pub fn new(step_id: impl Into<String>, action: Action, target: impl Into<String>) -> Self {
        Step {
            step_id: step_id.into(),
            action,
            target: target.into(),
            value: None,
            expect: None,
            visual_hint: None,
            resolved_node: None,
        }
    }
}

/// Outcome of attempting a step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub step_id: String,
    pub ok: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used_candidate: Option<String>,
    pub elapsed_ms: u64,
    /// Set when the action reported success but the page structure
    /// fingerprint did not change.
    #[serde(default)]
    pub no_op: bool,
    /// Screenshot path or similar failure artifact.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

impl ExecutionResult {
    pub fn success(step_id: impl Into<String>, message: impl Into<String>) -> Self {
        ExecutionResult {
            step_id: step_id.into(),
            ok: true,
            message: message.into(),
            used_candidate: None,
            elapsed_ms: 0,
            no_op: false,
            diagnostic: None,
        }
    }

    pub fn failure(step_id: impl Into<String>, message: impl Into<String>) -> Self {
        ExecutionResult {
            ok: false,
            ..ExecutionResult::success(step_id, message)
        }
    }
}

/// Scorer output row: one candidate expression with its combined ranking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub node_id: String,
    pub kind: CandidateKind,
    pub expression: String,
    pub score: f32,
    #[serde(default)]
    pub visual_score: f32,
}

/// Heuristic for auto-generated selector fragments: long digit runs and
/// UUID-shaped prefixes signal values that will not survive a reload.
pub fn looks_dynamic(expression: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"\d{3,}|[0-9a-f]{8}-[0-9a-f]{4}").unwrap_or_else(|_| Regex::new("$^").unwrap())
    });
    re.is_match(expression)
}

/// FNV-1a digest over the sorted node ids, 8 hex chars. The page script
/// computes the identical digest so Rust- and page-side fingerprints are
/// interchangeable.
pub fn structure_fingerprint<'a>(ids: impl Iterator<Item = &'a str>) -> String {
    let mut sorted: Vec<&str> = ids.collect();
    sorted.sort_unstable();
    let mut hash: u32 = 0x811c9dc5;
    for id in sorted {
        for byte in id.as_bytes() {
            hash ^= u32::from(*byte);
            hash = hash.wrapping_mul(0x0100_0193);
        }
    }
    format!("{hash:08x}")
}

/// Scanner attribute maps carry explicit nulls for absent attributes;
/// drop them instead of failing the decode.
fn deserialize_nullable_string_map<'de, D>(
    deserializer: D,
) -> Result<HashMap<String, String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let map: HashMap<String, Option<String>> = HashMap::deserialize(deserializer)?;
    Ok(map
        .into_iter()
        .filter_map(|(k, v)| v.map(|val| (k, val)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_candidate(expr: &str, prov: Provenance, base: f32) -> Candidate {
        Candidate {
            kind: CandidateKind::Css,
            expression: expr.to_string(),
            provenance: prov,
            base_score: base,
            looks_dynamic: false,
        }
    }

    fn make_node(id: &str, tag: &str, text: &str) -> Node {
        Node {
            node_id: id.to_string(),
            tag: tag.to_string(),
            text: text.to_string(),
            attributes: HashMap::new(),
            aria_label: None,
            xpath: format!("/html/body/{tag}[1]"),
            css_path: format!("body > {tag}"),
            bounding_box: BoundingBox {
                x: 10.0,
                y: 10.0,
                width: 100.0,
                height: 30.0,
            },
            visible: true,
            semantic_label: None,
            candidates: Vec::new(),
        }
    }

    // ==== dynamic heuristic ====

    #[test]
    fn long_digit_runs_look_dynamic() {
        assert!(looks_dynamic("#item-48213"));
        assert!(looks_dynamic("#a1b2c3d4-e5f6-button"));
        assert!(!looks_dynamic("#submit-btn"));
        assert!(!looks_dynamic("#nav2"));
    }

    // ==== fingerprint ====

    #[test]
    fn fingerprint_is_order_independent() {
        let a = structure_fingerprint(["n1", "n2", "n3"].into_iter());
        let b = structure_fingerprint(["n3", "n1", "n2"].into_iter());
        assert_eq!(a, b);
        assert_eq!(a.len(), 8);
    }

    #[test]
    fn fingerprint_changes_with_content() {
        let a = structure_fingerprint(["n1", "n2"].into_iter());
        let b = structure_fingerprint(["n1", "n4"].into_iter());
        assert_ne!(a, b);
    }

    // ==== node helpers ====

    #[test]
    fn candidates_sort_by_confidence() {
        let mut node = make_node("n1", "button", "Submit");
        node.candidates = vec![
            make_candidate("//button[1]", Provenance::TextAnchor, 0.6),
            make_candidate("[data-testid=\"go\"]", Provenance::DataAttr, 0.95),
            make_candidate("#go", Provenance::Id, 0.9),
        ];
        let ordered = node.candidates_by_confidence();
        assert_eq!(ordered[0].expression, "[data-testid=\"go\"]");
        assert_eq!(ordered[2].expression, "//button[1]");
    }

    #[test]
    fn match_count_sees_shared_expressions() {
        let mut a = make_node("n1", "button", "Go");
        let mut b = make_node("n2", "button", "Stop");
        a.candidates = vec![make_candidate(".btn", Provenance::Role, 0.7)];
        b.candidates = vec![make_candidate(".btn", Provenance::Role, 0.7)];
        let snap = Snapshot {
            url: "https://example.com".into(),
            title: String::new(),
            fingerprint: String::new(),
            captured_at: 0,
            nodes: vec![a, b],
        };
        assert_eq!(snap.match_count(".btn"), 2);
        assert_eq!(snap.match_count("#missing"), 0);
    }

    // ==== serde shapes ====

    #[test]
    fn step_round_trips_with_tagged_validator() {
        let raw = r#"{
            "step_id": "s1",
            "action": "type",
            "target": "search box",
            "value": "rust crates",
            "expect": {"type": "value_equals", "value": "rust crates"}
        }"#;
        let step: Step = serde_json::from_str(raw).unwrap();
        assert_eq!(step.action, Action::Type);
        assert_eq!(
            step.expect,
            Some(Validator::ValueEquals {
                value: "rust crates".into()
            })
        );
        let back = serde_json::to_string(&step).unwrap();
        assert!(back.contains("\"value_equals\""));
    }

    #[test]
    fn node_attributes_drop_nulls() {
        let raw = r#"{
            "node_id": "abc123def456",
            "tag": "input",
            "text": "",
            "attributes": {"name": "q", "placeholder": null},
            "xpath": "/html/body/input[1]"
        }"#;
        let node: Node = serde_json::from_str(raw).unwrap();
        assert_eq!(node.attributes.get("name").map(String::as_str), Some("q"));
        assert!(!node.attributes.contains_key("placeholder"));
    }
}

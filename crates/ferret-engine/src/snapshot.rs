//! Host side of the snapshot extractor: drives the page script and decodes
//! its envelope into the shared model, plus the bounded projection handed
//! to the oracle.

use ferret_common::model::Snapshot;
use ferret_common::protocol::{ScanError, decode_snapshot};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::backend::{Driver, DriverError};

/// Tags never worth showing the oracle even if the page script ever
/// captured one.
const NOISE_TAGS: &[&str] = &["script", "style", "meta", "link", "noscript"];

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("driver error: {0}")]
    Driver(#[from] DriverError),

    #[error(transparent)]
    Scan(#[from] ScanError),
}

/// Capture the visible, interactive portion of the current page. The hot
/// path: runs once per control-loop cycle.
pub async fn capture(driver: &mut dyn Driver) -> Result<Snapshot, SnapshotError> {
    capture_with(driver, false).await
}

/// Slower full-page variant that ignores the viewport filter. Meant for
/// offline inspection, not the loop.
pub async fn capture_full(driver: &mut dyn Driver) -> Result<Snapshot, SnapshotError> {
    capture_with(driver, true).await
}

async fn capture_with(driver: &mut dyn Driver, full: bool) -> Result<Snapshot, SnapshotError> {
    let script = format!("window.Ferret.snapshot({{full: {full}}})");
    let raw = driver.eval(&script).await?;
    let (snapshot, warnings) = decode_snapshot(raw)?;
    for warning in &warnings {
        warn!("scan warning: {warning}");
    }
    debug!(
        "captured {} nodes from {} ({})",
        snapshot.nodes.len(),
        snapshot.url,
        snapshot.fingerprint
    );
    Ok(snapshot)
}

/// Fresh structural digest without building a full snapshot. Used for
/// before/after no-op checks around page-mutating actions.
pub async fn page_fingerprint(driver: &mut dyn Driver) -> Result<String, DriverError> {
    let raw = driver.eval(ferret_scanner::FINGERPRINT_JS).await?;
    Ok(raw.as_str().unwrap_or_default().to_string())
}

/// Compact node projection for oracle prompts: identity plus the fields a
/// planner needs to refer to an element, nothing else.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleNode {
    pub node_id: String,
    pub tag: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aria_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    pub visible: bool,
}

/// Bounded oracle view of a snapshot: noise tags filtered, truncated to
/// `budget` nodes, visible nodes first.
pub fn oracle_view(snapshot: &Snapshot, budget: usize) -> Vec<OracleNode> {
    let mut nodes: Vec<&ferret_common::model::Node> = snapshot
        .nodes
        .iter()
        .filter(|n| !NOISE_TAGS.contains(&n.tag.as_str()))
        .collect();
    nodes.sort_by_key(|n| !n.visible);
    nodes
        .into_iter()
        .take(budget)
        .map(|n| OracleNode {
            node_id: n.node_id.clone(),
            tag: n.tag.clone(),
            text: n.text.clone(),
            aria_label: n.aria_label.clone(),
            selector: n
                .candidates_by_confidence()
                .first()
                .map(|c| c.expression.clone()),
            visible: n.visible,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferret_common::model::{BoundingBox, Node};

    fn make_node(id: &str, tag: &str, text: &str, visible: bool) -> Node {
        Node {
            node_id: id.into(),
            tag: tag.into(),
            text: text.into(),
            attributes: Default::default(),
            aria_label: None,
            xpath: format!("/html/body/{tag}[1]"),
            css_path: String::new(),
            bounding_box: BoundingBox::default(),
            visible,
            semantic_label: None,
            candidates: Vec::new(),
        }
    }

    fn make_snapshot(nodes: Vec<Node>) -> Snapshot {
        Snapshot {
            url: "https://example.com".into(),
            title: String::new(),
            fingerprint: "00000000".into(),
            captured_at: 0,
            nodes,
        }
    }

    #[test]
    fn oracle_view_is_bounded() {
        let nodes = (0..60)
            .map(|i| make_node(&format!("n{i}"), "button", "Go", true))
            .collect();
        let view = oracle_view(&make_snapshot(nodes), 40);
        assert_eq!(view.len(), 40);
    }

    #[test]
    fn oracle_view_filters_noise_and_prefers_visible() {
        let snap = make_snapshot(vec![
            make_node("n1", "script", "var x", true),
            make_node("n2", "button", "Hidden", false),
            make_node("n3", "button", "Shown", true),
        ]);
        let view = oracle_view(&snap, 10);
        assert_eq!(view.len(), 2);
        assert_eq!(view[0].node_id, "n3");
        assert_eq!(view[1].node_id, "n2");
    }
}

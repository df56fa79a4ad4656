//! Self-healing action execution. Takes one semantic step plus the current
//! snapshot, assembles an ordered candidate list, and walks it with a
//! native attempt and a scripted fallback per candidate. Every attempt is
//! recorded to the history store; validation failures count as attempt
//! failures and move on to the next candidate instead of aborting.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ferret_common::model::{
    Action, CandidateKind, ExecutionResult, RankedCandidate, Snapshot, Step, Validator,
};
use tracing::{debug, warn};

use crate::backend::{Driver, DriverError};
use crate::history::HistoryStore;
use crate::scorer;
use crate::snapshot;

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Bound for one native click/fill attempt.
    pub action_timeout: Duration,
    /// Bound for a full page transition.
    pub navigate_timeout: Duration,
    /// Fixed pause for `wait` steps.
    pub wait_pause: Duration,
    /// Candidate list size after dedup. Trying more does not pay for the
    /// added latency.
    pub candidate_cap: usize,
    /// Window scroll magnitude in pixels; sign follows direction.
    pub scroll_amount: i64,
    /// Flash an outline on the element before acting on it.
    pub highlight: bool,
    /// Where failure screenshots land; `None` disables them.
    pub diagnostics_dir: Option<PathBuf>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        ExecutorConfig {
            action_timeout: Duration::from_secs(2),
            navigate_timeout: Duration::from_secs(30),
            wait_pause: Duration::from_secs(1),
            candidate_cap: 3,
            scroll_amount: 500,
            highlight: false,
            diagnostics_dir: Some(std::env::temp_dir()),
        }
    }
}

/// One entry of the ordered attempt list. Attempts without a node identity
/// (an external hint nothing in the snapshot owns) skip history recording.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedCandidate {
    pub node_id: Option<String>,
    pub kind: CandidateKind,
    pub expression: String,
}

/// Per-candidate outcome driving the attempt loop explicitly.
enum Attempt {
    Ok(String),
    Retry(String),
    Fatal(String),
}

pub struct Executor {
    config: ExecutorConfig,
    history: Arc<HistoryStore>,
}

impl Executor {
    pub fn new(config: ExecutorConfig, history: Arc<HistoryStore>) -> Self {
        Executor { config, history }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Execute one step against the current page. Never fails outright:
    /// every outcome, including driver loss, folds into the result.
    pub async fn run(
        &self,
        driver: &mut dyn Driver,
        step: &Step,
        snap: &Snapshot,
    ) -> ExecutionResult {
        self.run_with_hint(driver, step, snap, None).await
    }

    /// Variant taking an externally supplied selector hint, slotted into
    /// the candidate order after resolved-node candidates.
    pub async fn run_with_hint(
        &self,
        driver: &mut dyn Driver,
        step: &Step,
        snap: &Snapshot,
        hint: Option<&str>,
    ) -> ExecutionResult {
        let started = Instant::now();
        let mut result = match step.action {
            Action::Done => ExecutionResult::success(
                &step.step_id,
                step.value.clone().unwrap_or_else(|| "goal reached".into()),
            ),
            Action::Navigate => self.run_navigate(driver, step).await,
            Action::Scroll => self.run_scroll(driver, step).await,
            Action::Wait => self.run_wait(driver, step).await,
            Action::Click | Action::Type | Action::Extract => {
                self.run_targeted(driver, step, snap, hint).await
            }
        };
        result.elapsed_ms = started.elapsed().as_millis() as u64;
        result
    }

    async fn run_navigate(&self, driver: &mut dyn Driver, step: &Step) -> ExecutionResult {
        let url = step.target.trim();
        match tokio::time::timeout(self.config.navigate_timeout, driver.navigate(url)).await {
            Ok(Ok(nav)) => {
                if let Some(validator) = &step.expect {
                    let passed = self
                        .validate(driver, None, validator)
                        .await
                        .unwrap_or(false);
                    if !passed {
                        return ExecutionResult::failure(
                            &step.step_id,
                            format!("Navigated to {} but validation failed", nav.url),
                        );
                    }
                }
                ExecutionResult::success(&step.step_id, format!("Navigated to {}", nav.url))
            }
            Ok(Err(e)) => ExecutionResult::failure(
                &step.step_id,
                format!("Navigation to {url} failed: {e}"),
            ),
            Err(_) => ExecutionResult::failure(
                &step.step_id,
                format!(
                    "Navigation to {url} timed out after {:?}",
                    self.config.navigate_timeout
                ),
            ),
        }
    }

    async fn run_scroll(&self, driver: &mut dyn Driver, step: &Step) -> ExecutionResult {
        let direction = step
            .value
            .as_deref()
            .unwrap_or(&step.target)
            .trim()
            .to_lowercase();
        let amount = if direction == "up" {
            -self.config.scroll_amount
        } else {
            self.config.scroll_amount
        };
        let script = format!("window.scrollBy(0, {amount}); true");
        match driver.eval(&script).await {
            Ok(_) => ExecutionResult::success(
                &step.step_id,
                format!("Scrolled {}", if amount < 0 { "up" } else { "down" }),
            ),
            Err(e) => ExecutionResult::failure(&step.step_id, format!("Scroll failed: {e}")),
        }
    }

    async fn run_wait(&self, driver: &mut dyn Driver, step: &Step) -> ExecutionResult {
        tokio::time::sleep(self.config.wait_pause).await;
        if let Some(validator) = &step.expect {
            let passed = self
                .validate(driver, None, validator)
                .await
                .unwrap_or(false);
            if !passed {
                return ExecutionResult::failure(
                    &step.step_id,
                    "Waited but validation failed".to_string(),
                );
            }
        }
        ExecutionResult::success(
            &step.step_id,
            format!("Waited {}ms", self.config.wait_pause.as_millis()),
        )
    }

    async fn run_targeted(
        &self,
        driver: &mut dyn Driver,
        step: &Step,
        snap: &Snapshot,
        hint: Option<&str>,
    ) -> ExecutionResult {
        let dom = scorer::rank(snap, &step.target, &self.history, self.config.candidate_cap);
        let ranked = match &step.visual_hint {
            Some(visual) => scorer::hybrid_rank(
                &dom,
                &scorer::visual_rank(snap, visual),
                self.config.candidate_cap,
            ),
            None => dom,
        };
        let planned = assemble(step, snap, &ranked, hint, self.config.candidate_cap);
        if planned.is_empty() {
            let diagnostic = self.save_failure_screenshot(driver, &step.step_id).await;
            let mut result = ExecutionResult::failure(
                &step.step_id,
                format!("No candidates found for target '{}'", step.target),
            );
            result.diagnostic = diagnostic;
            return result;
        }

        // Structure digest before page-mutating actions; unchanged after a
        // "successful" attempt means the click went nowhere.
        let fp_before = if matches!(step.action, Action::Click | Action::Type) {
            snapshot::page_fingerprint(driver)
                .await
                .ok()
                .filter(|fp| !fp.is_empty())
        } else {
            None
        };

        let mut last_error = String::from("no attempt made");
        for cand in &planned {
            if self.config.highlight {
                let _ = driver.eval(&highlight_js(&cand.expression)).await;
            }
            let attempt = match step.action {
                Action::Click => self.attempt_click(driver, cand, step).await,
                Action::Type => self.attempt_type(driver, cand, step).await,
                Action::Extract => self.attempt_extract(driver, cand, step).await,
                _ => Attempt::Fatal("unreachable action in targeted path".into()),
            };
            match attempt {
                Attempt::Ok(message) => {
                    let validated = match &step.expect {
                        Some(validator) => self
                            .validate(driver, Some(&cand.expression), validator)
                            .await
                            .unwrap_or(false),
                        None => true,
                    };
                    if !validated {
                        self.record(cand, false).await;
                        last_error =
                            format!("validation failed after acting on {}", cand.expression);
                        debug!("{last_error}");
                        continue;
                    }
                    self.record(cand, true).await;

                    let mut message = message;
                    let mut no_op = false;
                    if let Some(before) = &fp_before {
                        if let Ok(after) = snapshot::page_fingerprint(driver).await {
                            if !after.is_empty() && after == *before {
                                no_op = true;
                                message.push_str(" [warning: page structure unchanged]");
                            }
                        }
                    }
                    return ExecutionResult {
                        step_id: step.step_id.clone(),
                        ok: true,
                        message,
                        used_candidate: Some(cand.expression.clone()),
                        elapsed_ms: 0,
                        no_op,
                        diagnostic: None,
                    };
                }
                Attempt::Retry(reason) => {
                    self.record(cand, false).await;
                    warn!("candidate {} failed: {reason}", cand.expression);
                    last_error = reason;
                }
                Attempt::Fatal(reason) => {
                    self.record(cand, false).await;
                    last_error = reason;
                    break;
                }
            }
        }

        let diagnostic = self.save_failure_screenshot(driver, &step.step_id).await;
        let mut result = ExecutionResult::failure(
            &step.step_id,
            format!("All {} candidates failed: {last_error}", planned.len()),
        );
        result.diagnostic = diagnostic;
        result
    }

    async fn attempt_click(
        &self,
        driver: &mut dyn Driver,
        cand: &PlannedCandidate,
        step: &Step,
    ) -> Attempt {
        match tokio::time::timeout(self.config.action_timeout, driver.click(&cand.expression))
            .await
        {
            Ok(Ok(())) => return Attempt::Ok(format!("Clicked: {}", step.target)),
            Ok(Err(e)) if e.is_fatal() => return Attempt::Fatal(e.to_string()),
            Ok(Err(e)) => debug!("native click on {} failed: {e}", cand.expression),
            Err(_) => debug!("native click on {} timed out", cand.expression),
        }
        match driver.eval(&click_js(&cand.expression)).await {
            Ok(v) if v.as_bool() == Some(true) => {
                Attempt::Ok(format!("Clicked (JS): {}", step.target))
            }
            Ok(_) => Attempt::Retry(format!(
                "script click found no element for {}",
                cand.expression
            )),
            Err(e) if e.is_fatal() => Attempt::Fatal(e.to_string()),
            Err(e) => Attempt::Retry(format!("script click failed: {e}")),
        }
    }

    async fn attempt_type(
        &self,
        driver: &mut dyn Driver,
        cand: &PlannedCandidate,
        step: &Step,
    ) -> Attempt {
        let value = step.value.as_deref().unwrap_or("");
        let mut typed = false;
        match tokio::time::timeout(
            self.config.action_timeout,
            driver.fill(&cand.expression, value),
        )
        .await
        {
            Ok(Ok(())) => typed = true,
            Ok(Err(e)) if e.is_fatal() => return Attempt::Fatal(e.to_string()),
            Ok(Err(e)) => debug!("native fill on {} failed: {e}", cand.expression),
            Err(_) => debug!("native fill on {} timed out", cand.expression),
        }
        if !typed {
            // Scripted assignment must dispatch input/change: frameworks
            // ignore raw value mutation without synthetic events.
            match driver.eval(&set_value_js(&cand.expression, value)).await {
                Ok(v) if v.as_bool() == Some(true) => typed = true,
                Ok(_) => {
                    return Attempt::Retry(format!(
                        "script fill found no element for {}",
                        cand.expression
                    ));
                }
                Err(e) if e.is_fatal() => return Attempt::Fatal(e.to_string()),
                Err(e) => return Attempt::Retry(format!("script fill failed: {e}")),
            }
        }

        let mut message = format!("Typed '{value}' into: {}", step.target);
        if search_like(&step.target) && self.submit_enter(driver, &cand.expression).await {
            message.push_str(" + Pressed Enter");
        }
        Attempt::Ok(message)
    }

    /// Search-style fields expect a submit keypress after the text lands.
    async fn submit_enter(&self, driver: &mut dyn Driver, expression: &str) -> bool {
        match driver.press(expression, "Enter").await {
            Ok(()) => true,
            Err(e) => {
                debug!("native Enter on {expression} failed: {e}");
                matches!(
                    driver.eval(&enter_js(expression)).await,
                    Ok(v) if v.as_bool() == Some(true)
                )
            }
        }
    }

    async fn attempt_extract(
        &self,
        driver: &mut dyn Driver,
        cand: &PlannedCandidate,
        step: &Step,
    ) -> Attempt {
        match driver.eval(&extract_js(&cand.expression)).await {
            Ok(serde_json::Value::String(text)) => {
                let mut text = text;
                if let Some((cut, _)) = text.char_indices().nth(300) {
                    text.truncate(cut);
                }
                Attempt::Ok(format!("Extracted from {}: {text}", step.target))
            }
            Ok(_) => Attempt::Retry(format!("no element to extract at {}", cand.expression)),
            Err(e) if e.is_fatal() => Attempt::Fatal(e.to_string()),
            Err(e) => Attempt::Retry(format!("extract failed: {e}")),
        }
    }

    async fn validate(
        &self,
        driver: &mut dyn Driver,
        acted_on: Option<&str>,
        validator: &Validator,
    ) -> Result<bool, DriverError> {
        match validator {
            Validator::Present { selector } => {
                let target = selector.as_deref().or(acted_on);
                match target {
                    None => Ok(false),
                    Some(sel) => {
                        let v = driver.eval(&exists_js(sel)).await?;
                        Ok(v.as_bool() == Some(true))
                    }
                }
            }
            Validator::ValueEquals { value } => match acted_on {
                None => Ok(false),
                Some(sel) => {
                    let v = driver.eval(&value_js(sel)).await?;
                    Ok(v.as_str() == Some(value.as_str()))
                }
            },
            Validator::UrlContains { value } => {
                let url = driver.current_url().await?;
                Ok(url.to_lowercase().contains(&value.to_lowercase()))
            }
            Validator::TextContains { value } => {
                let v = driver.eval(BODY_TEXT_JS).await?;
                Ok(v.as_str()
                    .unwrap_or("")
                    .to_lowercase()
                    .contains(&value.to_lowercase()))
            }
        }
    }

    async fn record(&self, cand: &PlannedCandidate, ok: bool) {
        let Some(node_id) = &cand.node_id else {
            return;
        };
        if let Err(e) = self.history.record(node_id, &cand.expression, ok).await {
            debug!("history record failed: {e}");
        }
    }

    async fn save_failure_screenshot(
        &self,
        driver: &mut dyn Driver,
        step_id: &str,
    ) -> Option<String> {
        let dir = self.config.diagnostics_dir.clone()?;
        let png = driver.screenshot().await.ok()?;
        let path = dir.join(format!("fail_{}.png", sanitize_id(step_id)));
        tokio::fs::create_dir_all(&dir).await.ok()?;
        tokio::fs::write(&path, &png).await.ok()?;
        Some(path.display().to_string())
    }
}

/// Build the ordered attempt list for a targeted step. Priority: the
/// step's resolved node (own candidates plus structural backup), an
/// external hint, the scorer's top rows, then an aggressive text and
/// attribute scan. Deduplicated preserving first occurrence, capped.
pub fn assemble(
    step: &Step,
    snap: &Snapshot,
    ranked: &[RankedCandidate],
    hint: Option<&str>,
    cap: usize,
) -> Vec<PlannedCandidate> {
    let mut out: Vec<PlannedCandidate> = Vec::new();

    if let Some(node_id) = &step.resolved_node {
        if let Some(node) = snap.find_node(node_id) {
            for cand in node.candidates_by_confidence() {
                out.push(PlannedCandidate {
                    node_id: Some(node.node_id.clone()),
                    kind: cand.kind,
                    expression: cand.expression.clone(),
                });
            }
            out.push(PlannedCandidate {
                node_id: Some(node.node_id.clone()),
                kind: CandidateKind::Xpath,
                expression: node.xpath.clone(),
            });
        }
    }

    if let Some(hint) = hint {
        out.push(PlannedCandidate {
            node_id: find_owner(snap, hint),
            kind: kind_of(hint),
            expression: hint.to_string(),
        });
    }

    for row in ranked {
        out.push(PlannedCandidate {
            node_id: Some(row.node_id.clone()),
            kind: row.kind,
            expression: row.expression.clone(),
        });
    }

    let needle = step.target.trim().to_lowercase();
    if !needle.is_empty() {
        for node in &snap.nodes {
            let hit = node.text.to_lowercase().contains(&needle)
                || node
                    .attributes
                    .values()
                    .any(|v| v.to_lowercase().contains(&needle));
            if !hit {
                continue;
            }
            let (kind, expression) = match node.candidates_by_confidence().first() {
                Some(best) => (best.kind, best.expression.clone()),
                None => (CandidateKind::Xpath, node.xpath.clone()),
            };
            out.push(PlannedCandidate {
                node_id: Some(node.node_id.clone()),
                kind,
                expression,
            });
        }
    }

    dedupe_capped(out, cap)
}

fn dedupe_capped(planned: Vec<PlannedCandidate>, cap: usize) -> Vec<PlannedCandidate> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for cand in planned {
        if seen.insert(cand.expression.clone()) {
            out.push(cand);
            if out.len() == cap {
                break;
            }
        }
    }
    out
}

fn find_owner(snap: &Snapshot, expression: &str) -> Option<String> {
    snap.nodes
        .iter()
        .find(|n| n.candidates.iter().any(|c| c.expression == expression))
        .map(|n| n.node_id.clone())
}

fn kind_of(expression: &str) -> CandidateKind {
    if expression.starts_with('/') || expression.starts_with('(') {
        CandidateKind::Xpath
    } else {
        CandidateKind::Css
    }
}

fn search_like(target: &str) -> bool {
    let t = target.to_lowercase();
    t.contains("search") || t.contains("query")
}

fn sanitize_id(step_id: &str) -> String {
    step_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

const BODY_TEXT_JS: &str = "(document.body ? document.body.innerText : '')";

/// Shared prelude resolving a CSS or XPath expression to `el`.
fn resolver_prelude(expression: &str) -> String {
    let quoted = serde_json::to_string(expression).unwrap_or_else(|_| "\"\"".into());
    format!(
        "var sel = {quoted}; var el; \
         if (sel.charAt(0) === '/' || sel.charAt(0) === '(') {{ \
           el = document.evaluate(sel, document, null, \
             XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue; \
         }} else {{ el = document.querySelector(sel); }}"
    )
}

fn click_js(expression: &str) -> String {
    format!(
        "(function() {{ {} if (!el) return false; el.click(); return true; }})()",
        resolver_prelude(expression)
    )
}

fn set_value_js(expression: &str, value: &str) -> String {
    let quoted_value = serde_json::to_string(value).unwrap_or_else(|_| "\"\"".into());
    format!(
        "(function() {{ {} if (!el) return false; \
         if (el.focus) el.focus(); el.value = {quoted_value}; \
         el.dispatchEvent(new Event('input', {{bubbles: true}})); \
         el.dispatchEvent(new Event('change', {{bubbles: true}})); \
         return true; }})()",
        resolver_prelude(expression)
    )
}

fn enter_js(expression: &str) -> String {
    format!(
        "(function() {{ {} if (!el) return false; \
         ['keydown', 'keypress', 'keyup'].forEach(function(kind) {{ \
           el.dispatchEvent(new KeyboardEvent(kind, \
             {{key: 'Enter', code: 'Enter', bubbles: true}})); \
         }}); return true; }})()",
        resolver_prelude(expression)
    )
}

fn extract_js(expression: &str) -> String {
    format!(
        "(function() {{ {} if (!el) return null; \
         return (el.innerText || el.textContent || '').trim().slice(0, 500); }})()",
        resolver_prelude(expression)
    )
}

fn exists_js(expression: &str) -> String {
    format!(
        "(function() {{ {} return !!el; }})()",
        resolver_prelude(expression)
    )
}

fn value_js(expression: &str) -> String {
    format!(
        "(function() {{ {} if (!el) return null; \
         return el.value !== undefined ? String(el.value) : \
           (el.textContent || '').trim(); }})()",
        resolver_prelude(expression)
    )
}

fn highlight_js(expression: &str) -> String {
    let quoted = serde_json::to_string(expression).unwrap_or_else(|_| "\"\"".into());
    format!("window.Ferret && window.Ferret.highlight ? window.Ferret.highlight({quoted}) : null")
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferret_common::model::{BoundingBox, Candidate, Node, Provenance};
    use std::collections::HashMap;

    fn make_candidate(expr: &str, prov: Provenance, base: f32) -> Candidate {
        Candidate {
            kind: kind_of(expr),
            expression: expr.to_string(),
            provenance: prov,
            base_score: base,
            looks_dynamic: false,
        }
    }

    fn make_node(id: &str, text: &str, candidates: Vec<Candidate>) -> Node {
        Node {
            node_id: id.to_string(),
            tag: "button".into(),
            text: text.into(),
            attributes: HashMap::new(),
            aria_label: None,
            xpath: format!("/html/body/button[@x='{id}']"),
            css_path: String::new(),
            bounding_box: BoundingBox::default(),
            visible: true,
            semantic_label: None,
            candidates,
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

    fn ranked_row(node_id: &str, expr: &str, score: f32) -> RankedCandidate {
        RankedCandidate {
            node_id: node_id.into(),
            kind: kind_of(expr),
            expression: expr.into(),
            score,
            visual_score: 0.0,
        }
    }

    // ==== candidate assembly ====

    #[test]
    fn resolved_node_candidates_come_first() {
        let node = make_node(
            "n1",
            "Submit",
            vec![
                make_candidate("//button[1]", Provenance::TextAnchor, 0.6),
                make_candidate("#submit", Provenance::Id, 0.9),
            ],
        );
        let snap = make_snapshot(vec![node]);
        let mut step = Step::new("s1", Action::Click, "submit");
        step.resolved_node = Some("n1".into());

        let planned = assemble(&step, &snap, &[], None, 5);
        assert_eq!(planned[0].expression, "#submit");
        assert_eq!(planned[1].expression, "//button[1]");
        // Structural backup from the node itself comes after its own
        // candidates.
        assert_eq!(planned[2].expression, "/html/body/button[@x='n1']");
    }

    #[test]
    fn hint_slots_between_resolved_and_ranked() {
        let node = make_node(
            "n1",
            "Submit",
            vec![make_candidate("#submit", Provenance::Id, 0.9)],
        );
        let snap = make_snapshot(vec![node]);
        let step = Step::new("s1", Action::Click, "nothing matches this");
        let ranked = vec![ranked_row("n1", "#submit", 0.7)];

        let planned = assemble(&step, &snap, &ranked, Some(".hint"), 5);
        assert_eq!(planned[0].expression, ".hint");
        assert_eq!(planned[0].node_id, None);
        assert_eq!(planned[1].expression, "#submit");
    }

    #[test]
    fn assembly_dedupes_and_caps_at_three() {
        let node = make_node(
            "n1",
            "Submit order",
            vec![make_candidate("#submit", Provenance::Id, 0.9)],
        );
        let snap = make_snapshot(vec![node]);
        let mut step = Step::new("s1", Action::Click, "submit");
        step.resolved_node = Some("n1".into());
        // Ranked repeats the same expression the resolved node already
        // contributed; the aggressive scan repeats it again.
        let ranked = vec![
            ranked_row("n1", "#submit", 0.9),
            ranked_row("n1", "/html/body/button[@x='n1']", 0.5),
            ranked_row("n1", ".extra-a", 0.4),
            ranked_row("n1", ".extra-b", 0.3),
        ];

        let planned = assemble(&step, &snap, &ranked, None, 3);
        assert_eq!(planned.len(), 3);
        assert_eq!(planned[0].expression, "#submit");
        assert_eq!(planned[1].expression, "/html/body/button[@x='n1']");
        assert_eq!(planned[2].expression, ".extra-a");
        let unique: std::collections::HashSet<_> =
            planned.iter().map(|p| p.expression.clone()).collect();
        assert_eq!(unique.len(), planned.len());
    }

    #[test]
    fn aggressive_scan_finds_text_and_attribute_hits() {
        let mut by_attr = make_node("n2", "unrelated", Vec::new());
        by_attr
            .attributes
            .insert("title".into(), "Checkout now".into());
        let by_text = make_node("n1", "Proceed to checkout", Vec::new());
        let snap = make_snapshot(vec![by_text, by_attr]);
        let step = Step::new("s1", Action::Click, "checkout");

        let planned = assemble(&step, &snap, &[], None, 5);
        assert_eq!(planned.len(), 2);
        assert!(planned.iter().all(|p| p.node_id.is_some()));
        assert!(planned[0].expression.contains("n1"));
    }

    #[test]
    fn external_hint_owned_by_snapshot_keeps_identity() {
        let node = make_node(
            "n1",
            "Submit",
            vec![make_candidate("#submit", Provenance::Id, 0.9)],
        );
        let snap = make_snapshot(vec![node]);
        let step = Step::new("s1", Action::Click, "zzz");
        let planned = assemble(&step, &snap, &[], Some("#submit"), 3);
        assert_eq!(planned[0].node_id.as_deref(), Some("n1"));
    }

    // ==== helpers ====

    #[test]
    fn expression_kind_detection() {
        assert_eq!(kind_of("//button[1]"), CandidateKind::Xpath);
        assert_eq!(kind_of("(//a)[2]"), CandidateKind::Xpath);
        assert_eq!(kind_of("#go"), CandidateKind::Css);
    }

    #[test]
    fn search_targets_get_enter() {
        assert!(search_like("the search box"));
        assert!(search_like("Query input"));
        assert!(!search_like("password field"));
    }

    #[test]
    fn step_ids_are_sanitized_for_filenames() {
        assert_eq!(sanitize_id("s1"), "s1");
        assert_eq!(sanitize_id("../etc/passwd"), "___etc_passwd");
    }

    #[test]
    fn scripts_embed_expressions_safely() {
        let js = click_js("button[data-label=\"Say \\\"hi\\\"\"]");
        assert!(js.contains("querySelector"));
        assert!(!js.contains("Say \"hi\""), "quotes must stay escaped");
        let js = set_value_js("#q", "he said \"go\"");
        assert!(js.contains("\\\"go\\\""));
    }
}

use serde::{Deserialize, Serialize};

use crate::model::{Node, Snapshot, structure_fingerprint};

/// Envelope returned by every page-script entry point.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScanEnvelope {
    Ok {
        #[serde(flatten)]
        data: Box<ScanPayload>,
        #[serde(default)]
        warnings: Vec<String>,
    },
    Error {
        code: String,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        hint: Option<String>,
    },
}

impl ScanEnvelope {
    /// Unwrap the envelope, surfacing script-side failures as `ScanError`.
    pub fn into_payload(self) -> Result<(ScanPayload, Vec<String>), ScanError> {
        match self {
            ScanEnvelope::Ok { data, warnings } => Ok((*data, warnings)),
            ScanEnvelope::Error {
                code,
                message,
                hint,
            } => Err(ScanError::Script {
                code,
                message,
                hint,
            }),
        }
    }
}

/// Successful scan body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanPayload {
    pub page: PageInfo,
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub stats: ScanStats,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageInfo {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub viewport: ViewportInfo,
    /// Structural digest computed page-side; recomputed host-side when absent.
    #[serde(default)]
    pub fingerprint: String,
    /// Page-side capture time, unix millis.
    #[serde(default)]
    pub captured_at: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ViewportInfo {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ScanStats {
    /// Elements walked before filtering.
    pub total: usize,
    /// Elements retained in the snapshot.
    pub retained: usize,
    pub duration_ms: f64,
}

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("scan failed [{code}]: {message}")]
    Script {
        code: String,
        message: String,
        hint: Option<String>,
    },
    #[error("malformed scan payload: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Decode a raw page-script return value into a `Snapshot`.
pub fn decode_snapshot(raw: serde_json::Value) -> Result<(Snapshot, Vec<String>), ScanError> {
    let envelope: ScanEnvelope = serde_json::from_value(raw)?;
    let (payload, warnings) = envelope.into_payload()?;
    let fingerprint = if payload.page.fingerprint.is_empty() {
        structure_fingerprint(payload.nodes.iter().map(|n| n.node_id.as_str()))
    } else {
        payload.page.fingerprint.clone()
    };
    let snapshot = Snapshot {
        url: payload.page.url,
        title: payload.page.title,
        fingerprint,
        captured_at: payload.page.captured_at,
        nodes: payload.nodes,
    };
    Ok((snapshot, warnings))
}

#[cfg(test)]
mod tests {
    use super::*;

    const OK_RAW: &str = r##"{
        "status": "ok",
        "page": {
            "url": "https://example.com/login",
            "title": "Login",
            "viewport": {"width": 1280, "height": 720},
            "fingerprint": "9f2a11bc"
        },
        "nodes": [
            {
                "node_id": "a1b2c3d4e5f6",
                "tag": "button",
                "text": "Sign in",
                "attributes": {"id": "signin", "class": null},
                "aria_label": null,
                "xpath": "/html/body/form[1]/button[1]",
                "css_path": "form > button",
                "bounding_box": {"x": 40, "y": 200, "width": 120, "height": 36},
                "visible": true,
                "candidates": [
                    {
                        "kind": "css",
                        "expression": "#signin",
                        "provenance": "id",
                        "base_score": 0.9,
                        "looks_dynamic": false
                    }
                ]
            }
        ],
        "stats": {"total": 58, "retained": 1, "duration_ms": 12.5},
        "warnings": ["shadow root skipped"]
    }"##;

    #[test]
    fn decodes_ok_envelope() {
        let raw: serde_json::Value = serde_json::from_str(OK_RAW).unwrap();
        let (snapshot, warnings) = decode_snapshot(raw).unwrap();
        assert_eq!(snapshot.url, "https://example.com/login");
        assert_eq!(snapshot.fingerprint, "9f2a11bc");
        assert_eq!(snapshot.nodes.len(), 1);
        assert_eq!(snapshot.nodes[0].candidates[0].expression, "#signin");
        assert_eq!(warnings, vec!["shadow root skipped"]);
    }

    #[test]
    fn missing_fingerprint_is_recomputed() {
        let mut raw: serde_json::Value = serde_json::from_str(OK_RAW).unwrap();
        raw["page"]["fingerprint"] = serde_json::Value::String(String::new());
        let (snapshot, _) = decode_snapshot(raw).unwrap();
        assert_eq!(
            snapshot.fingerprint,
            structure_fingerprint(std::iter::once("a1b2c3d4e5f6"))
        );
    }

    #[test]
    fn error_envelope_surfaces_as_scan_error() {
        let raw = serde_json::json!({
            "status": "error",
            "code": "no_document",
            "message": "document.body is null",
            "hint": "page may still be loading"
        });
        let err = decode_snapshot(raw).unwrap_err();
        match err {
            ScanError::Script { code, .. } => assert_eq!(code, "no_document"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn junk_payload_is_a_decode_error() {
        let raw = serde_json::json!({"status": "ok", "nodes": "nope"});
        assert!(matches!(
            decode_snapshot(raw),
            Err(ScanError::Decode(_))
        ));
    }
}

/// The page-side snapshot script. Injected into browser contexts by
/// drivers; exposes `window.Ferret` with `snapshot`, `fingerprint` and
/// `highlight` entry points.
pub const SCANNER_JS: &str = include_str!("scanner.js");

/// Expression evaluating to a fresh structural fingerprint, for cheap
/// before/after no-op checks without a full snapshot.
pub const FINGERPRINT_JS: &str = "window.Ferret.fingerprint()";

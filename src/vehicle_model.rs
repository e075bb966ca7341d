//! Vehicle-model canonicalisation.
//!
//! Telemetry reports the chassis/body string exactly as it was typed into the
//! fleet registry, so the same model shows up under several spellings. Every
//! per-model grouping goes through [`canonicalize_model`] first.

use std::collections::HashMap;
use std::sync::LazyLock;

/// Raw registry spelling → canonical model. Exact matches only; trailing
/// whitespace is part of the key because the registry stores it that way.
static MODEL_ALIASES: &[(&str, &str)] = &[
    ("IVECO/MASCA ", "IVECO"),
    ("IVECO/MASCA GRAN VIA U", "IVECO"),
    ("VW 17230 APACHE VIP-SC", "VW 17230"),
    ("VW 17230 APACHE VIP-SC ", "VW 17230"),
    ("VW 22.260 CAIO INDUSCAR APACHE U", "VW 22260"),
    ("MB OF 1721 L59 E6 MPOLO TORINO U", "MB 1721"),
    ("MB OF 1721 MPOLO TORINO U", "MB 1721"),
    ("ELETRA INDUSCAR MILLENNIUM", "INDUSCAR"),
    ("Induscar", "INDUSCAR"),
];

static ALIAS_MAP: LazyLock<HashMap<&'static str, &'static str>> =
    LazyLock::new(|| MODEL_ALIASES.iter().copied().collect());

/// Maps a raw model string to its canonical name, or returns it unchanged
/// when it has no alias. Canonical names are never alias keys, so the
/// function is idempotent.
pub fn canonicalize_model(raw: &str) -> String {
    ALIAS_MAP.get(raw).copied().unwrap_or(raw).to_string()
}

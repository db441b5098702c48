use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Version string reported when nothing could be inferred
pub const UNKNOWN_VERSION: &str = "unknown";

/// One detection method's contribution to a [`DialectJudgment`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    pub method: String,
    pub contribution: u8,
}

/// Result of version/dialect detection over an extraction snapshot.
///
/// Always re-derivable from the snapshot alone. `evidence` lists only the methods
/// that actually moved the verdict, in the order they were applied; findings that
/// did not move it land in `details`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialectJudgment {
    pub version: String,
    pub confidence: u8,
    pub is_modern_dialect: bool,
    pub evidence: Vec<Evidence>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub details: IndexMap<String, String>,
}

impl DialectJudgment {
    /// Degraded result: unknown version, zero confidence, one warning
    pub fn unknown(warning: impl Into<String>) -> Self {
        Self {
            version: UNKNOWN_VERSION.to_string(),
            confidence: 0,
            is_modern_dialect: false,
            evidence: Vec::new(),
            warnings: vec![warning.into()],
            details: IndexMap::new(),
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.version == UNKNOWN_VERSION && self.confidence == 0
    }

    /// Names of the methods that contributed, in application order
    pub fn methods(&self) -> Vec<&str> {
        self.evidence.iter().map(|e| e.method.as_str()).collect()
    }

    /// Human-readable banner used before a build and by `modbuilder detect`
    pub fn banner(&self) -> String {
        let mut lines = vec![
            "=".repeat(60),
            "    GAME VERSION ANALYSIS".to_string(),
            "=".repeat(60),
            format!("Detected version: {}", self.version),
            format!("Confidence: {}%", self.confidence),
            format!(
                "File format: {}",
                if self.is_modern_dialect { "binary (modern)" } else { "text (legacy)" }
            ),
        ];

        if !self.evidence.is_empty() {
            lines.push(format!("Methods used: {}", self.methods().join(", ")));
        }

        if !self.warnings.is_empty() {
            lines.push("Warnings:".to_string());
            for warning in &self.warnings {
                lines.push(format!("  - {}", warning));
            }
        }

        lines.push("=".repeat(60));
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_judgment() {
        let judgment = DialectJudgment::unknown("GameData folder not found");
        assert!(judgment.is_unknown());
        assert!(!judgment.is_modern_dialect);
        assert_eq!(judgment.warnings, vec!["GameData folder not found".to_string()]);
    }

    #[test]
    fn test_banner_lists_methods_and_warnings() {
        let mut judgment = DialectJudgment::unknown("mixed formats");
        judgment.version = "1.8.1+".to_string();
        judgment.confidence = 95;
        judgment.is_modern_dialect = true;
        judgment.evidence.push(Evidence {
            method: "binary_files_detected".to_string(),
            contribution: 95,
        });

        let banner = judgment.banner();
        assert!(banner.contains("Detected version: 1.8.1+"));
        assert!(banner.contains("Confidence: 95%"));
        assert!(banner.contains("binary_files_detected"));
        assert!(banner.contains("  - mixed formats"));
    }
}

//! Declarative drawing rules, loaded once per pipeline run.

use crate::error::{Result, SketchError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

const BUILTIN_STYLE: &str = include_str!("../assets/default_style.json");

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementShape {
    #[default]
    Box,
    Line,
}

/// Drawing rule for one feature type.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureRule {
    pub style: ElementShape,
    pub fill_color: String,
    pub stroke_color: String,
    /// Render records of this type inside their parent's group instead of
    /// opening a group of their own.
    pub collapse_to_parent: bool,
    /// Per-type row thickness; falls back to `format.bar_height`.
    pub bar_height: Option<f64>,
}

impl Default for FeatureRule {
    fn default() -> Self {
        Self {
            style: ElementShape::Box,
            fill_color: "#c8c8c8".to_string(),
            stroke_color: "#4d4d4d".to_string(),
            collapse_to_parent: false,
            bar_height: None,
        }
    }
}

/// Global layout/drawing parameters, the `format` table of a style file.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatRules {
    pub margins: f64,
    pub bar_height: f64,
    pub bar_vspace: f64,
    pub track_vspace: f64,
    pub ruler_space: f64,
    pub block_hpad: f64,
    pub background_color: String,
    pub show_block_captions: bool,
    pub show_track_captions: bool,
}

impl Default for FormatRules {
    fn default() -> Self {
        Self {
            margins: 10.0,
            bar_height: 15.0,
            bar_vspace: 10.0,
            track_vspace: 20.0,
            ruler_space: 20.0,
            block_hpad: 2.0,
            background_color: "#ffffff".to_string(),
            show_block_captions: true,
            show_track_captions: true,
        }
    }
}

/// Rule table consulted by diagram building and layout.
///
/// Loaded once, read-only afterwards. A feature type without a rule is a
/// configuration error at lookup time, never a silent default.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Style {
    pub format: FormatRules,
    #[serde(default)]
    features: HashMap<String, FeatureRule>,
}

impl Style {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            SketchError::Style(format!("cannot read style file '{}': {e}", path.display()))
        })?;
        serde_json::from_str(&text).map_err(|e| {
            SketchError::Style(format!("invalid style file '{}': {e}", path.display()))
        })
    }

    /// The rule table bundled with the crate.
    pub fn builtin() -> Self {
        serde_json::from_str(BUILTIN_STYLE).expect("bundled style table is valid JSON")
    }

    pub fn feature_rule(&self, kind: &str) -> Result<&FeatureRule> {
        self.features.get(kind).ok_or_else(|| {
            SketchError::Style(format!("no style rule for feature type '{kind}'"))
        })
    }

    pub fn has_rule(&self, kind: &str) -> bool {
        self.features.contains_key(kind)
    }

    pub fn set_rule(&mut self, kind: &str, rule: FeatureRule) {
        self.features.insert(kind.to_string(), rule);
    }

    /// Row thickness for one feature type.
    pub fn bar_height_for(&self, kind: &str) -> Result<f64> {
        let rule = self.feature_rule(kind)?;
        Ok(rule.bar_height.unwrap_or(self.format.bar_height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_style_has_common_types() {
        let style = Style::builtin();
        for kind in ["gene", "mRNA", "exon", "CDS", "intron"] {
            assert!(style.has_rule(kind), "missing builtin rule for {kind}");
        }
        assert!(style.feature_rule("exon").unwrap().collapse_to_parent);
        assert!(!style.feature_rule("gene").unwrap().collapse_to_parent);
    }

    #[test]
    fn test_missing_rule_is_an_error() {
        let style = Style::builtin();
        match style.feature_rule("no_such_type") {
            Err(SketchError::Style(msg)) => assert!(msg.contains("no_such_type")),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_parse_requires_format_table() {
        let err = serde_json::from_str::<Style>(r#"{ "features": {} }"#);
        assert!(err.is_err());

        let style: Style = serde_json::from_str(r#"{ "format": {} }"#).unwrap();
        assert_eq!(style.format.bar_height, 15.0);
    }

    #[test]
    fn test_bar_height_override() {
        let mut style = Style::builtin();
        style.set_rule(
            "gene",
            FeatureRule {
                bar_height: Some(7.0),
                ..FeatureRule::default()
            },
        );
        assert_eq!(style.bar_height_for("gene").unwrap(), 7.0);
        assert_eq!(
            style.bar_height_for("mRNA").unwrap(),
            style.format.bar_height
        );
    }
}

//! Heuristic label → architecture layer grouping.
//!
//! Rules are ordered `substring → layer` pairs matched case-insensitively
//! against a normalized label (separators removed). First match wins.

use std::fmt;
use std::str::FromStr;

pub const OTHER_LAYER: &str = "Other";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerRule {
    pub pattern: String,
    pub layer: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerRules {
    rules: Vec<LayerRule>,
}

fn normalize(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(c, '_' | '-' | ' ' | '.'))
        .flat_map(char::to_lowercase)
        .collect()
}

impl LayerRules {
    pub fn new(rules: Vec<LayerRule>) -> Self {
        let rules = rules
            .into_iter()
            .map(|r| LayerRule { pattern: normalize(&r.pattern), layer: r.layer })
            .filter(|r| !r.pattern.is_empty())
            .collect();
        Self { rules }
    }

    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn classify(&self, label: &str) -> &str {
        let normalized = normalize(label);
        self.rules
            .iter()
            .find(|r| normalized.contains(&r.pattern))
            .map(|r| r.layer.as_str())
            .unwrap_or(OTHER_LAYER)
    }

    /// Layers in the order they first appear in the rules, `Other` last.
    pub fn layer_order(&self) -> Vec<&str> {
        let mut order: Vec<&str> = Vec::new();
        for rule in &self.rules {
            if rule.layer != OTHER_LAYER && !order.contains(&rule.layer.as_str()) {
                order.push(&rule.layer);
            }
        }
        order.push(OTHER_LAYER);
        order
    }
}

impl Default for LayerRules {
    fn default() -> Self {
        const DEFAULT_RULES: &[(&str, &str)] = &[
            ("business", "Business"),
            ("application", "Application"),
            ("dataobject", "Application"),
            ("technology", "Technology"),
            ("systemsoftware", "Technology"),
            ("device", "Technology"),
            ("node", "Technology"),
            ("artifact", "Technology"),
            ("capability", "Strategy"),
            ("valuestream", "Strategy"),
            ("courseofaction", "Strategy"),
            ("resource", "Strategy"),
            ("stakeholder", "Motivation"),
            ("driver", "Motivation"),
            ("goal", "Motivation"),
            ("outcome", "Motivation"),
            ("principle", "Motivation"),
            ("requirement", "Motivation"),
            ("constraint", "Motivation"),
            ("workpackage", "Implementation & Migration"),
            ("deliverable", "Implementation & Migration"),
            ("plateau", "Implementation & Migration"),
        ];
        Self::new(
            DEFAULT_RULES
                .iter()
                .map(|(pattern, layer)| LayerRule {
                    pattern: pattern.to_string(),
                    layer: layer.to_string(),
                })
                .collect(),
        )
    }
}

impl FromStr for LayerRules {
    type Err = String;

    /// Parses `pattern=Layer;pattern=Layer`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut rules = Vec::new();
        for entry in s.split(';').map(str::trim).filter(|e| !e.is_empty()) {
            let (pattern, layer) = entry
                .split_once('=')
                .ok_or_else(|| format!("expected pattern=Layer, got '{}'", entry))?;
            let (pattern, layer) = (pattern.trim(), layer.trim());
            if pattern.is_empty() || layer.is_empty() {
                return Err(format!("empty pattern or layer in '{}'", entry));
            }
            rules.push(LayerRule { pattern: pattern.to_string(), layer: layer.to_string() });
        }
        Ok(Self::new(rules))
    }
}

impl fmt::Display for LayerRules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self
            .rules
            .iter()
            .map(|r| format!("{}={}", r.pattern, r.layer))
            .collect();
        f.write_str(&rendered.join(";"))
    }
}

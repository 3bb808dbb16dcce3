//! Schema summarization.
//!
//! Turns loosely-typed introspection payloads into a compact, deterministic
//! text that is embedded in the translation prompt. The summarizer never
//! fails: unknown shapes degrade to empty sections rendered as
//! `(none found)`, so the prompt layout is stable.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::layers::{LayerRules, OTHER_LAYER};

pub const NONE_FOUND: &str = "(none found)";

/// Maximum number of "other" indexes listed.
pub const OTHER_INDEX_SAMPLE: usize = 25;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaSummary {
    pub text: String,
    /// Sorted node labels found in the schema.
    pub labels: Vec<String>,
    /// Sorted relationship type names found in the schema.
    pub relationship_types: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SchemaSummarizer {
    layers: LayerRules,
}

impl Default for SchemaSummarizer {
    fn default() -> Self {
        Self::new(LayerRules::default())
    }
}

impl SchemaSummarizer {
    pub fn new(layers: LayerRules) -> Self {
        Self { layers }
    }

    /// `raw_schema` is a label/relationship-type mapping (e.g. the output of
    /// `apoc.meta.schema`) in any supported wrapping; `raw_indexes` is a set
    /// of index records (e.g. `SHOW INDEXES`).
    pub fn summarize(&self, raw_schema: &Value, raw_indexes: &Value) -> SchemaSummary {
        let schema = unwrap_mapping(raw_schema);

        let mut nodes: BTreeMap<String, &Map<String, Value>> = BTreeMap::new();
        let mut relationships: BTreeMap<String, &Map<String, Value>> = BTreeMap::new();
        for (name, entry) in &schema {
            let Some(entry) = entry.as_object() else { continue };
            match entry.get("type").and_then(Value::as_str) {
                Some("node") => {
                    nodes.insert(name.clone(), entry);
                }
                Some("relationship") => {
                    relationships.insert(name.clone(), entry);
                }
                _ => {}
            }
        }

        let mut text = String::new();
        self.render_nodes(&mut text, &nodes);
        render_relationship_types(&mut text, &relationships);
        render_indexes(&mut text, &unwrap_records(raw_indexes));

        SchemaSummary {
            text,
            labels: nodes.keys().cloned().collect(),
            relationship_types: relationships.keys().cloned().collect(),
        }
    }

    fn render_nodes(&self, out: &mut String, nodes: &BTreeMap<String, &Map<String, Value>>) {
        out.push_str("NODE LABELS\n");
        if nodes.is_empty() {
            push_line(out, 1, NONE_FOUND);
            return;
        }

        let mut grouped: BTreeMap<&str, Vec<(&String, &Map<String, Value>)>> = BTreeMap::new();
        for (label, entry) in nodes {
            grouped.entry(self.layers.classify(label)).or_default().push((label, entry));
        }

        for layer in self.layers.layer_order() {
            let Some(members) = grouped.get(layer) else { continue };
            if layer == OTHER_LAYER {
                push_line(out, 0, "Other:");
            } else {
                push_line(out, 0, &format!("{} layer:", layer));
            }
            for (label, entry) in members {
                render_node(out, label, entry);
            }
        }
    }
}

fn render_node(out: &mut String, label: &str, entry: &Map<String, Value>) {
    push_line(out, 1, &format!("(:{}){}", label, count_suffix(entry.get("count"))));

    let mut properties: Vec<String> = entry
        .get("properties")
        .and_then(Value::as_object)
        .map(|props| props.iter().map(|(name, meta)| render_property(name, meta)).collect())
        .unwrap_or_default();
    properties.sort();
    if properties.is_empty() {
        push_line(out, 2, &format!("properties: {}", NONE_FOUND));
    } else {
        push_line(out, 2, &format!("properties: {}", properties.join("; ")));
    }

    let mut fan_out: Vec<String> = Vec::new();
    if let Some(rels) = entry.get("relationships").and_then(Value::as_object) {
        for (rel_type, meta) in rels {
            fan_out.extend(render_fan_out(label, rel_type, meta));
        }
    }
    fan_out.sort();
    fan_out.dedup();
    if fan_out.is_empty() {
        push_line(out, 2, &format!("relationships: {}", NONE_FOUND));
    } else {
        push_line(out, 2, "relationships:");
        for line in &fan_out {
            push_line(out, 3, line);
        }
    }
}

fn render_property(name: &str, meta: &Value) -> String {
    let kind = meta
        .get("type")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| infer_type(meta));
    let mut flags = Vec::new();
    if meta.get("indexed").and_then(Value::as_bool).unwrap_or(false) {
        flags.push("indexed");
    }
    if meta.get("unique").and_then(Value::as_bool).unwrap_or(false) {
        flags.push("unique");
    }
    if flags.is_empty() {
        format!("{}: {}", name, kind)
    } else {
        format!("{}: {} [{}]", name, kind, flags.join(", "))
    }
}

/// Best guess for a property description that carries a sample value rather
/// than a declared type.
fn infer_type(meta: &Value) -> String {
    let sample = meta.get("sample").or_else(|| meta.get("value")).unwrap_or(meta);
    match sample {
        Value::String(_) => "STRING",
        Value::Bool(_) => "BOOLEAN",
        Value::Number(n) if n.is_i64() || n.is_u64() => "INTEGER",
        Value::Number(_) => "FLOAT",
        Value::Array(_) => "LIST",
        _ => "ANY",
    }
    .to_string()
}

fn render_fan_out(label: &str, rel_type: &str, meta: &Value) -> Vec<String> {
    let direction = meta.get("direction").and_then(Value::as_str).unwrap_or("");
    let count = count_suffix(meta.get("count"));
    let count = if count.is_empty() { String::new() } else { format!(" ({})", count.trim_start()) };

    let mut others: Vec<&str> = meta
        .get("labels")
        .and_then(Value::as_array)
        .map(|labels| labels.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    others.sort_unstable();
    others.dedup();

    let endpoint = |other: Option<&str>| match other {
        Some(o) => format!("(:{})", o),
        None => "()".to_string(),
    };
    let render = |other: Option<&str>| {
        let (from, to) = (format!("(:{})", label), endpoint(other));
        match direction.to_ascii_lowercase().as_str() {
            "out" => format!("{}-[:{}]->{}{}", from, rel_type, to, count),
            "in" => format!("{}<-[:{}]-{}{}", from, rel_type, to, count),
            _ => format!("{}-[:{}]-{}{}", from, rel_type, to, count),
        }
    };

    if others.is_empty() {
        vec![render(None)]
    } else {
        others.into_iter().map(|o| render(Some(o))).collect()
    }
}

fn render_relationship_types(out: &mut String, relationships: &BTreeMap<String, &Map<String, Value>>) {
    out.push_str("RELATIONSHIP TYPES\n");
    if relationships.is_empty() {
        push_line(out, 1, NONE_FOUND);
        return;
    }
    for (name, entry) in relationships {
        push_line(out, 1, &format!("[:{}]{}", name, count_suffix(entry.get("count"))));
    }
}

fn render_indexes(out: &mut String, records: &[Map<String, Value>]) {
    let mut vector = Vec::new();
    let mut fulltext = Vec::new();
    let mut other = Vec::new();

    for record in records {
        let kind = record
            .get("type")
            .or_else(|| record.get("indexType"))
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_ascii_uppercase();
        if kind.contains("VECTOR") {
            vector.push(render_index(record, None));
        } else if kind.contains("FULLTEXT") {
            fulltext.push(render_index(record, None));
        } else {
            other.push(render_index(record, Some(&kind)));
        }
    }
    vector.sort();
    fulltext.sort();
    other.sort();

    out.push_str("INDEXES\n");
    render_index_bucket(out, "Vector indexes:", &vector);
    render_index_bucket(out, "Full-text indexes:", &fulltext);

    let total_other = other.len();
    other.truncate(OTHER_INDEX_SAMPLE);
    render_index_bucket(out, &format!("Other indexes (up to {}):", OTHER_INDEX_SAMPLE), &other);
    if total_other > OTHER_INDEX_SAMPLE {
        push_line(out, 1, &format!("... {} more omitted", total_other - OTHER_INDEX_SAMPLE));
    }
}

fn render_index(record: &Map<String, Value>, kind: Option<&str>) -> String {
    let strings = |key: &str| -> Vec<&str> {
        record
            .get(key)
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    };
    let name = record.get("name").and_then(Value::as_str).unwrap_or("<unnamed>");
    let labels = strings("labelsOrTypes").join("|");
    let properties = strings("properties").join(", ");

    let mut line = name.to_string();
    if let Some(kind) = kind.filter(|k| !k.is_empty()) {
        line.push_str(&format!(" [{}]", kind));
    }
    if !labels.is_empty() {
        line.push_str(&format!(" ON :{}({})", labels, properties));
    }
    line
}

fn render_index_bucket(out: &mut String, title: &str, lines: &[String]) {
    push_line(out, 0, title);
    if lines.is_empty() {
        push_line(out, 1, NONE_FOUND);
    }
    for line in lines {
        push_line(out, 1, line);
    }
}

fn count_suffix(count: Option<&Value>) -> String {
    match count.and_then(Value::as_f64) {
        Some(n) => format!(" count≈{}", n.round() as i64),
        None => String::new(),
    }
}

fn push_line(out: &mut String, indent: usize, text: &str) {
    for _ in 0..indent {
        out.push_str("  ");
    }
    out.push_str(text);
    out.push('\n');
}

/// Rows of a results-table shape (`columns` plus `rows` or `data`), keyed by
/// column name. Positional rows and `{ "row": [...] }` wrappers are both
/// accepted.
fn table_records(obj: &Map<String, Value>) -> Option<Vec<Map<String, Value>>> {
    let columns: Vec<&str> = obj.get("columns")?.as_array()?.iter().filter_map(Value::as_str).collect();
    let rows = obj.get("rows").or_else(|| obj.get("data"))?.as_array()?;

    let zip = |cells: &Vec<Value>| -> Map<String, Value> {
        columns
            .iter()
            .zip(cells.iter())
            .map(|(c, v)| (c.to_string(), v.clone()))
            .collect()
    };

    Some(
        rows.iter()
            .filter_map(|row| match row {
                Value::Array(cells) => Some(zip(cells)),
                Value::Object(obj) => match obj.get("row") {
                    Some(Value::Array(cells)) => Some(zip(cells)),
                    _ => Some(obj.clone()),
                },
                _ => None,
            })
            .collect(),
    )
}

/// The label/relationship mapping inside any supported wrapping.
fn unwrap_mapping(raw: &Value) -> Map<String, Value> {
    match raw {
        Value::Object(obj) => {
            if let Some(records) = table_records(obj) {
                return records
                    .into_iter()
                    .next()
                    .map(|record| unwrap_mapping(&Value::Object(record)))
                    .unwrap_or_default();
            }
            if obj.len() == 1 {
                if let Some(inner) = obj.get("value") {
                    return unwrap_mapping(inner);
                }
            }
            obj.clone()
        }
        Value::Array(items) => items.first().map(unwrap_mapping).unwrap_or_default(),
        _ => Map::new(),
    }
}

fn is_index_record(record: &Map<String, Value>) -> bool {
    record.contains_key("name") || record.contains_key("type")
}

/// A list of flat records inside any supported wrapping.
fn unwrap_records(raw: &Value) -> Vec<Map<String, Value>> {
    match raw {
        Value::Object(obj) => {
            if let Some(records) = table_records(obj) {
                return records.into_iter().filter(is_index_record).collect();
            }
            if obj.len() == 1 {
                if let Some(inner) = obj.get("value") {
                    return unwrap_records(inner);
                }
            }
            if is_index_record(obj) {
                vec![obj.clone()]
            } else {
                Vec::new()
            }
        }
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_object)
            .filter(|record| is_index_record(record))
            .cloned()
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn sample_schema() -> Value {
        json!({
            "BusinessActor": {
                "type": "node",
                "count": 12,
                "properties": {
                    "name": { "type": "STRING", "indexed": true, "unique": true },
                    "description": { "type": "STRING", "indexed": false, "unique": false }
                },
                "relationships": {
                    "ASSIGNED_TO": { "direction": "out", "labels": ["BusinessRole"], "count": 4 },
                    "SERVES": { "direction": "in", "labels": ["ApplicationService"], "count": 7 }
                }
            },
            "ApplicationService": {
                "type": "node",
                "count": 30,
                "properties": { "name": { "type": "STRING" } },
                "relationships": {
                    "SERVES": { "direction": "out", "labels": ["BusinessActor"], "count": 7 }
                }
            },
            "Chunk": { "type": "node", "count": 400, "properties": {} },
            "ASSIGNED_TO": { "type": "relationship", "count": 4, "properties": {} },
            "SERVES": { "type": "relationship", "count": 7, "properties": {} }
        })
    }

    fn sample_indexes() -> Value {
        json!([
            { "name": "chunkVectorIndex", "type": "VECTOR", "labelsOrTypes": ["Chunk"], "properties": ["embedding"] },
            { "name": "nameFulltext", "type": "FULLTEXT", "labelsOrTypes": ["BusinessActor", "ApplicationService"], "properties": ["name"] },
            { "name": "actor_name", "type": "RANGE", "labelsOrTypes": ["BusinessActor"], "properties": ["name"] },
            { "name": "token_lookup", "type": "LOOKUP", "labelsOrTypes": null, "properties": null }
        ])
    }

    #[test]
    fn test_summary_sections_and_fan_out() {
        let summary = SchemaSummarizer::default().summarize(&sample_schema(), &sample_indexes());
        let text = &summary.text;

        assert!(text.contains("Business layer:"));
        assert!(text.contains("Application layer:"));
        assert!(text.contains("(:BusinessActor) count≈12"));
        assert!(text.contains("name: STRING [indexed, unique]"));
        assert!(text.contains("(:BusinessActor)-[:ASSIGNED_TO]->(:BusinessRole) (count≈4)"));
        assert!(text.contains("(:BusinessActor)<-[:SERVES]-(:ApplicationService) (count≈7)"));
        assert!(text.contains("[:SERVES] count≈7"));
        assert!(text.contains("chunkVectorIndex ON :Chunk(embedding)"));
        assert!(text.contains("nameFulltext ON :BusinessActor|ApplicationService(name)"));
        assert!(text.contains("actor_name [RANGE] ON :BusinessActor(name)"));
        assert!(text.contains("token_lookup [LOOKUP]"));

        assert_eq!(summary.labels, vec!["ApplicationService", "BusinessActor", "Chunk"]);
        assert_eq!(summary.relationship_types, vec!["ASSIGNED_TO", "SERVES"]);
    }

    #[test]
    fn test_properties_sorted_and_layers_ordered() {
        let text = SchemaSummarizer::default().summarize(&sample_schema(), &json!([])).text;

        let description = text.find("description: STRING").unwrap();
        let name = text.find("name: STRING [indexed").unwrap();
        assert!(description < name);

        let business = text.find("Business layer:").unwrap();
        let application = text.find("Application layer:").unwrap();
        let other = text.find("Other:").unwrap();
        assert!(business < application && application < other);
    }

    #[test]
    fn test_unknown_direction_renders_undirected() {
        let schema = json!({
            "Goal": {
                "type": "node",
                "relationships": { "REALIZES": { "labels": ["Outcome"] } }
            }
        });
        let text = SchemaSummarizer::default().summarize(&schema, &Value::Null).text;
        assert!(text.contains("(:Goal)-[:REALIZES]-(:Outcome)"));
    }

    #[test]
    fn test_unwraps_results_table_shape() {
        let table = json!({ "columns": ["value"], "rows": [[sample_schema()]] });
        let direct = SchemaSummarizer::default().summarize(&sample_schema(), &Value::Null);
        let wrapped = SchemaSummarizer::default().summarize(&table, &Value::Null);
        assert_eq!(direct, wrapped);
    }

    #[test]
    fn test_unwraps_record_array_shape() {
        let records = json!([{ "value": sample_schema() }]);
        let direct = SchemaSummarizer::default().summarize(&sample_schema(), &Value::Null);
        let wrapped = SchemaSummarizer::default().summarize(&records, &Value::Null);
        assert_eq!(direct, wrapped);
    }

    #[test]
    fn test_index_table_shape() {
        let table = json!({
            "columns": ["name", "type", "labelsOrTypes", "properties"],
            "data": [{ "row": ["chunkVectorIndex", "VECTOR", ["Chunk"], ["embedding"]] }]
        });
        let text = SchemaSummarizer::default().summarize(&Value::Null, &table).text;
        assert!(text.contains("Vector indexes:\n  chunkVectorIndex ON :Chunk(embedding)"));
    }

    #[test]
    fn test_malformed_input_renders_placeholders() {
        let summarizer = SchemaSummarizer::default();
        for raw in [Value::Null, json!([]), json!(42), json!("schema"), json!({ "columns": 3 })] {
            let summary = summarizer.summarize(&raw, &raw);
            assert!(summary.text.starts_with("NODE LABELS\n  (none found)\n"));
            assert!(summary.text.contains("RELATIONSHIP TYPES\n  (none found)\n"));
            assert!(summary.text.contains("Vector indexes:\n  (none found)\n"));
            assert!(summary.text.contains("Full-text indexes:\n  (none found)\n"));
            assert!(summary.text.contains("indexes (up to 25):\n  (none found)"), "{}", summary.text);
            assert!(!summary.text.contains("<unnamed>"));
            assert!(summary.labels.is_empty());
        }
    }

    #[test]
    fn test_other_indexes_are_capped() {
        let indexes: Vec<Value> = (0..40)
            .map(|i| json!({ "name": format!("idx_{:02}", i), "type": "RANGE" }))
            .collect();
        let text = SchemaSummarizer::default().summarize(&Value::Null, &Value::Array(indexes)).text;
        assert!(text.contains("idx_24"));
        assert!(!text.contains("idx_25"));
        assert!(text.contains("... 15 more omitted"));
    }

    fn shuffled_schema(order: &[usize]) -> Value {
        let base = sample_schema();
        let entries: Vec<(String, Value)> = base
            .as_object()
            .unwrap()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let mut map = Map::new();
        for &i in order {
            let (name, mut entry) = entries[i].clone();
            // Reverse inner maps too, so property and relationship order varies.
            for key in ["properties", "relationships"] {
                if let Some(inner) = entry.get(key).and_then(Value::as_object).cloned() {
                    let reversed: Map<String, Value> = inner.into_iter().rev().collect();
                    entry[key] = Value::Object(reversed);
                }
            }
            map.insert(name, entry);
        }
        Value::Object(map)
    }

    proptest! {
        #[test]
        fn prop_summary_is_order_independent(
            order in Just((0..5usize).collect::<Vec<_>>()).prop_shuffle(),
            index_order in Just((0..4usize).collect::<Vec<_>>()).prop_shuffle(),
        ) {
            let summarizer = SchemaSummarizer::default();
            let canonical = summarizer.summarize(&sample_schema(), &sample_indexes());

            let indexes = sample_indexes();
            let indexes = Value::Array(index_order.iter().map(|&i| indexes[i].clone()).collect());
            let permuted = summarizer.summarize(&shuffled_schema(&order), &indexes);

            prop_assert_eq!(canonical.text, permuted.text);
        }
    }
}

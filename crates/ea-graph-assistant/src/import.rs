//! Graph import from uploaded model files.
//!
//! A [`GraphTranspiler`] turns an uploaded file into elements and
//! relationships; [`GraphImporter`] validates them and merges them into the
//! active datastore through the write path.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{AssistantError, AssistantResult};
use crate::graph_session::{ConnectionManager, GraphSession, Params, Row};

const MAX_FILE_NAME_BYTES: usize = 255;
const ALLOWED_EXTENSIONS: [&str; 2] = ["xml", "json"];
/// Rows per UNWIND statement.
const IMPORT_CHUNK: usize = 500;

const ELEMENT_CONSTRAINT: &str =
    "CREATE CONSTRAINT element_identifier IF NOT EXISTS FOR (e:Element) REQUIRE e.identifier IS UNIQUE";
const IMPORT_SUMMARY: &str = "MATCH (e:Element) WITH count(e) AS totalElements \
     OPTIONAL MATCH (:Element)-[r]->(:Element) \
     RETURN totalElements, count(r) AS totalRelationships";

/// Accepts only a bare `.xml` / `.json` file name made of `[A-Za-z0-9._-]`.
pub fn sanitize_file_name(raw: &str) -> AssistantResult<String> {
    let reject = |reason: &str| Err(AssistantError::InvalidInput(format!("file name {}", reason)));

    let name = raw.trim();
    if name.is_empty() {
        return reject("must not be empty");
    }
    if name.len() > MAX_FILE_NAME_BYTES {
        return reject("is too long");
    }
    if name.contains('/') || name.contains('\\') || name.contains("..") {
        return reject("must not contain path components");
    }
    if name.starts_with('.') {
        return reject("must not start with a dot");
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')) {
        return reject("contains unsupported characters");
    }
    match file_extension(name) {
        Some(ext) if ALLOWED_EXTENSIONS.contains(&ext.as_str()) => Ok(name.to_string()),
        _ => reject("must end in .xml or .json"),
    }
}

fn file_extension(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

/// True for names usable as a label or relationship type without quoting.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ImportedElement {
    pub identifier: String,
    /// Element type, used as the node label.
    #[serde(rename = "type")]
    pub element_type: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ImportedRelationship {
    #[serde(default)]
    pub identifier: Option<String>,
    #[serde(rename = "type")]
    pub relationship_type: String,
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl ImportedRelationship {
    fn merge_key(&self) -> String {
        self.identifier.clone().unwrap_or_else(|| {
            format!("{}-{}-{}", self.source, self.relationship_type, self.target)
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ImportedGraph {
    #[serde(default)]
    pub elements: Vec<ImportedElement>,
    #[serde(default)]
    pub relationships: Vec<ImportedRelationship>,
}

impl ImportedGraph {
    /// Unique element identifiers, identifier-safe types, and relationships
    /// that only reference known elements.
    pub fn validate(&self) -> AssistantResult<()> {
        let mut seen = HashSet::new();
        for element in &self.elements {
            if element.identifier.is_empty() {
                return Err(AssistantError::InvalidInput("element without identifier".to_string()));
            }
            if !seen.insert(element.identifier.as_str()) {
                return Err(AssistantError::InvalidInput(format!(
                    "duplicate element identifier '{}'",
                    element.identifier
                )));
            }
            if !is_valid_identifier(&element.element_type) {
                return Err(AssistantError::InvalidInput(format!(
                    "element type '{}' is not a valid label",
                    element.element_type
                )));
            }
        }

        for relationship in &self.relationships {
            if !is_valid_identifier(&relationship.relationship_type) {
                return Err(AssistantError::InvalidInput(format!(
                    "relationship type '{}' is not a valid identifier",
                    relationship.relationship_type
                )));
            }
            for endpoint in [&relationship.source, &relationship.target] {
                if !seen.contains(endpoint.as_str()) {
                    return Err(AssistantError::InvalidInput(format!(
                        "relationship {} references unknown element '{}'",
                        relationship.merge_key(),
                        endpoint
                    )));
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
pub trait GraphTranspiler: Send + Sync {
    /// Lower-case file extensions this transpiler understands.
    fn extensions(&self) -> &[&'static str];

    async fn transpile(&self, path: &Path) -> AssistantResult<ImportedGraph>;
}

/// Reads `{ "elements": [...], "relationships": [...] }` documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonGraphTranspiler;

#[async_trait]
impl GraphTranspiler for JsonGraphTranspiler {
    fn extensions(&self) -> &[&'static str] {
        &["json"]
    }

    async fn transpile(&self, path: &Path) -> AssistantResult<ImportedGraph> {
        let text = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AssistantError::InvalidInput(format!("{} was not uploaded", path.display()))
            } else {
                AssistantError::Backend(format!("failed to read {}: {}", path.display(), e))
            }
        })?;
        serde_json::from_str(&text)
            .map_err(|e| AssistantError::InvalidInput(format!("malformed graph document: {}", e)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub total_elements: u64,
    pub total_relationships: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportOutcome {
    pub elements_imported: u64,
    pub relationships_imported: u64,
    pub summary: ImportSummary,
}

pub struct GraphImporter {
    manager: Arc<ConnectionManager>,
    transpilers: Vec<Arc<dyn GraphTranspiler>>,
    upload_dir: PathBuf,
}

impl GraphImporter {
    pub fn new(manager: Arc<ConnectionManager>, upload_dir: impl Into<PathBuf>) -> Self {
        Self {
            manager,
            transpilers: vec![Arc::new(JsonGraphTranspiler)],
            upload_dir: upload_dir.into(),
        }
    }

    pub fn with_transpiler(mut self, transpiler: Arc<dyn GraphTranspiler>) -> Self {
        self.transpilers.push(transpiler);
        self
    }

    /// Imports an uploaded file into whichever target is currently active.
    pub async fn import(&self, file_name: &str) -> AssistantResult<ImportOutcome> {
        let file_name = sanitize_file_name(file_name)?;
        let extension = file_extension(&file_name).unwrap_or_default();
        let transpiler = self
            .transpilers
            .iter()
            .find(|t| t.extensions().contains(&extension.as_str()))
            .ok_or_else(|| {
                AssistantError::InvalidInput(format!("no importer is configured for .{} files", extension))
            })?;

        let graph = transpiler.transpile(&self.upload_dir.join(&file_name)).await?;
        graph.validate()?;

        // One session for the whole import; a concurrent switch makes the
        // remaining writes fail instead of landing on the other target.
        let session = self.manager.current_session()?;
        info!(
            "Importing {} ({} elements, {} relationships) into {}",
            file_name,
            graph.elements.len(),
            graph.relationships.len(),
            session.target()
        );

        session.write(ELEMENT_CONSTRAINT, &Params::new()).await?;
        let elements_imported = merge_elements(session.as_ref(), &graph.elements).await?;
        let relationships_imported = merge_relationships(session.as_ref(), &graph.relationships).await?;
        let summary = import_summary(session.as_ref()).await?;

        info!(
            "Imported {} elements and {} relationships from {}",
            elements_imported, relationships_imported, file_name
        );
        Ok(ImportOutcome { elements_imported, relationships_imported, summary })
    }
}

async fn merge_elements(session: &dyn GraphSession, elements: &[ImportedElement]) -> AssistantResult<u64> {
    let mut by_label: BTreeMap<&str, Vec<Value>> = BTreeMap::new();
    for element in elements {
        let mut properties = element.properties.clone();
        if let Some(name) = &element.name {
            properties.insert("name".to_string(), Value::String(name.clone()));
        }
        let mut row = Map::new();
        row.insert("identifier".to_string(), Value::String(element.identifier.clone()));
        row.insert("properties".to_string(), Value::Object(properties));
        by_label.entry(element.element_type.as_str()).or_default().push(Value::Object(row));
    }

    let mut imported = 0;
    for (label, rows) in by_label {
        let query = format!(
            "UNWIND $rows AS row MERGE (e:Element {{identifier: row.identifier}}) \
             SET e += row.properties, e:`{}` RETURN count(e) AS imported",
            label
        );
        imported += write_chunked(session, &query, rows).await?;
        debug!("Merged :{} elements", label);
    }
    Ok(imported)
}

async fn merge_relationships(
    session: &dyn GraphSession,
    relationships: &[ImportedRelationship],
) -> AssistantResult<u64> {
    let mut by_type: BTreeMap<&str, Vec<Value>> = BTreeMap::new();
    for relationship in relationships {
        let mut row = Map::new();
        row.insert("identifier".to_string(), Value::String(relationship.merge_key()));
        row.insert("source".to_string(), Value::String(relationship.source.clone()));
        row.insert("target".to_string(), Value::String(relationship.target.clone()));
        row.insert("properties".to_string(), Value::Object(relationship.properties.clone()));
        by_type
            .entry(relationship.relationship_type.as_str())
            .or_default()
            .push(Value::Object(row));
    }

    let mut imported = 0;
    for (rel_type, rows) in by_type {
        let query = format!(
            "UNWIND $rows AS row \
             MATCH (s:Element {{identifier: row.source}}) \
             MATCH (t:Element {{identifier: row.target}}) \
             MERGE (s)-[r:`{}` {{identifier: row.identifier}}]->(t) \
             SET r += row.properties RETURN count(r) AS imported",
            rel_type
        );
        imported += write_chunked(session, &query, rows).await?;
        debug!("Merged [:{}] relationships", rel_type);
    }
    Ok(imported)
}

async fn write_chunked(session: &dyn GraphSession, query: &str, rows: Vec<Value>) -> AssistantResult<u64> {
    let mut imported = 0;
    for chunk in rows.chunks(IMPORT_CHUNK) {
        let mut params = Params::new();
        params.insert("rows".to_string(), Value::Array(chunk.to_vec()));
        let result = session.write(query, &params).await?;
        imported += count_column(&result, "imported")?;
    }
    Ok(imported)
}

async fn import_summary(session: &dyn GraphSession) -> AssistantResult<ImportSummary> {
    let rows = session.read(IMPORT_SUMMARY, &Params::new()).await?;
    Ok(ImportSummary {
        total_elements: count_column(&rows, "totalElements")?,
        total_relationships: count_column(&rows, "totalRelationships")?,
    })
}

fn count_column(rows: &[Row], column: &str) -> AssistantResult<u64> {
    rows.first()
        .and_then(|row| row.get(column))
        .and_then(Value::as_u64)
        .ok_or_else(|| AssistantError::Protocol(format!("expected a '{}' count in the result", column)))
}

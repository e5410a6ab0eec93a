//! The authoring project record handed to the importer.
//!
//! Loading the project file and resolving its paths is the caller's job: every
//! path here is expected to be absolute and already checked for existence.

use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct Project {
    /// Target package file.
    pub filename: PathBuf,
    pub deck: DeckInfo,
    pub model: Model,
    #[serde(default)]
    pub data: Vec<DataFile>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeckInfo {
    pub identifier: i64,
    pub name: String,
}

/// A note type with its fields and templates, in declaration order.
#[derive(Debug, Clone, Deserialize)]
pub struct Model {
    /// Stable note type id; callers keep it constant across rebuilds.
    pub identifier: i64,
    pub name: String,
    /// `normal` or `cloze`.
    pub kind: String,
    pub style: Style,
    #[serde(default)]
    pub templates: Vec<Template>,
    #[serde(default)]
    pub fields: Vec<Field>,
    /// Extra entries for the note type's extension map.
    #[serde(default)]
    pub other: Map<String, Value>,
}

impl Model {
    /// Ordinal of the first field marked as the sort field, or 0.
    pub fn sort_field_idx(&self) -> u32 {
        self.fields
            .iter()
            .position(|f| f.index)
            .and_then(|idx| u32::try_from(idx).ok())
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Style {
    pub css: PathBuf,
    pub latex: Latex,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Latex {
    pub prefix: PathBuf,
    pub postfix: PathBuf,
}

/// A card template; `qfmt` and `afmt` point at already rendered HTML.
#[derive(Debug, Clone, Deserialize)]
pub struct Template {
    pub name: String,
    pub qfmt: PathBuf,
    pub afmt: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Field {
    pub name: String,
    /// Source template of the field content, used by deck population.
    #[serde(default)]
    pub template: PathBuf,
    /// `text` or `markdown`.
    pub format: String,
    #[serde(default)]
    pub index: bool,
    #[serde(default)]
    pub rtl: bool,
    #[serde(default)]
    pub font: Font,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Font {
    pub name: String,
    pub size: u32,
}

impl Default for Font {
    fn default() -> Self {
        Self {
            name: "Arial".to_string(),
            size: 20,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataFile {
    pub filename: PathBuf,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn project_json() -> Value {
        json!({
            "filename": "/tmp/out/basic.apkg",
            "deck": { "identifier": 1700000000001i64, "name": "Vocabulary" },
            "model": {
                "identifier": 1700000000002i64,
                "name": "Basic",
                "kind": "normal",
                "style": {
                    "css": "/tmp/p/style.css",
                    "latex": { "prefix": "/tmp/p/pre.tex", "postfix": "/tmp/p/post.tex" }
                },
                "templates": [
                    { "name": "Card 1", "qfmt": "/tmp/p/q.html", "afmt": "/tmp/p/a.html" }
                ],
                "fields": [
                    { "name": "Front", "format": "text" },
                    { "name": "Back", "format": "markdown", "index": true, "rtl": true,
                      "font": { "name": "Noto Naskh", "size": 28 } }
                ]
            },
            "data": [ { "filename": "/tmp/p/words.md", "tags": ["lesson-1"] } ]
        })
    }

    #[test]
    fn deserializes_with_defaults() {
        let project: Project = serde_json::from_value(project_json()).unwrap();
        let front = &project.model.fields[0];
        assert_eq!(front.font.name, "Arial");
        assert_eq!(front.font.size, 20);
        assert!(!front.rtl);
        assert!(project.model.other.is_empty());
        assert_eq!(project.data[0].tags, vec!["lesson-1"]);
    }

    #[test]
    fn sort_field_is_first_indexed_field() {
        let mut project: Project = serde_json::from_value(project_json()).unwrap();
        assert_eq!(project.model.sort_field_idx(), 1);
        project.model.fields[1].index = false;
        assert_eq!(project.model.sort_field_idx(), 0);
    }
}

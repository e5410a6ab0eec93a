//! Compiles declarative flashcard projects into Anki `.apkg` packages.
//!
//! A package is a zip archive holding the collection database
//! (`collection.anki2`) and the media database (`collection.media.db2`).
//! [`Package`] unpacks or creates one, [`Package::import_project`] upserts the
//! project's note type, fields and templates, and [`Package::close`] repacks
//! it. Rebuilding the same project into an existing package updates rows in
//! place instead of duplicating them.
//!
//! ```rust,no_run
//! use flashcard_pkg::{Project, compile};
//!
//! # fn run(project: Project) -> Result<(), flashcard_pkg::Error> {
//! compile(&project)?;
//! # Ok(())
//! # }
//! ```

pub mod apkg_schema;
mod error;
mod importer;
pub mod notetype_config;
mod package;
pub mod project;
pub mod store;

pub use error::{DatabaseError, Error, JsonError};
pub use notetype_config::{FieldConfig, FieldFormat, ModelKind, NotetypeConfig, TemplateConfig};
pub use package::{Package, compile, compile_to};
pub use project::{DataFile, DeckInfo, Field, Font, Latex, Model, Project, Style, Template};

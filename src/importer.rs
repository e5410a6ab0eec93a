use log::{debug, info};
use prost::Message;
use rusqlite::{Transaction, params};
use sha1::{Digest, Sha1};
use std::fs;
use std::path::Path;

use crate::Error;
use crate::apkg_schema::{
    COLLECTION_ID, FIELD_ROWS, MEDIA_FOLDER, MEDIA_UPSERT, META_DIR_MOD, NOTETYPE_UPSERT,
    OrdinalRows, TEMPLATE_ROWS, Timestamp,
};
use crate::error::{asset_error, database_error};
use crate::notetype_config::{FieldConfig, NotetypeConfig, TemplateConfig};
use crate::project::{Model, Project};
use crate::store::{Database, Store};

/// A row of `templates` or `fields`, encoded and ready to write.
struct EncodedRow {
    name: String,
    config: Vec<u8>,
}

/// Every blob of a note type. Nothing is written until all of them encode.
struct EncodedModel {
    notetype: Vec<u8>,
    templates: Vec<EncodedRow>,
    fields: Vec<EncodedRow>,
}

fn read_asset(path: &Path) -> Result<String, Error> {
    let bytes = fs::read(path).map_err(asset_error(path))?;
    String::from_utf8(bytes).map_err(|source| Error::InvalidAsset {
        path: path.to_path_buf(),
        source,
    })
}

fn encode_model(model: &Model) -> Result<EncodedModel, Error> {
    let css = read_asset(&model.style.css)?;
    let latex_pre = read_asset(&model.style.latex.prefix)?;
    let latex_post = read_asset(&model.style.latex.postfix)?;

    let notetype = NotetypeConfig::new(
        &model.kind,
        model.sort_field_idx(),
        css,
        latex_pre,
        latex_post,
        &model.other,
    )?
    .encode_to_vec();

    let templates = model
        .templates
        .iter()
        .map(|tpl| -> Result<EncodedRow, Error> {
            let config = TemplateConfig::new(read_asset(&tpl.qfmt)?, read_asset(&tpl.afmt)?);
            Ok(EncodedRow {
                name: tpl.name.clone(),
                config: config.encode_to_vec(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let fields = model
        .fields
        .iter()
        .map(|fld| -> Result<EncodedRow, Error> {
            let config = FieldConfig::new(
                &fld.format,
                fld.rtl,
                fld.font.name.clone(),
                fld.font.size,
                fld.description.clone(),
            )?;
            Ok(EncodedRow {
                name: fld.name.clone(),
                config: config.encode_to_vec(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(EncodedModel {
        notetype,
        templates,
        fields,
    })
}

/// Rewrites the `(ntid, ord)` rows of one note type to exactly `encoded`.
///
/// Rows past the new length are pruned and the rest are staged before any
/// upsert, so a name may move to another ordinal. Rows that keep their
/// ordinal are updated in place.
fn write_rows<F>(
    transaction: &Transaction,
    rows: &OrdinalRows,
    ntid: i64,
    encoded: &[EncodedRow],
    mut upsert: F,
) -> Result<(), Error>
where
    F: FnMut(&mut rusqlite::Statement<'_>, i64, &EncodedRow) -> rusqlite::Result<usize>,
{
    let pruned = transaction
        .execute(rows.prune, params![ntid, encoded.len() as i64])
        .map_err(database_error)?;
    transaction
        .execute(rows.stage, params![ntid])
        .map_err(database_error)?;

    let mut stmt = transaction.prepare(rows.upsert).map_err(database_error)?;
    for (ord, row) in encoded.iter().enumerate() {
        upsert(&mut stmt, ord as i64, row).map_err(database_error)?;
    }
    debug!("Wrote {} {}, pruned {}", encoded.len(), rows.table.name, pruned);
    Ok(())
}

fn write_model(
    transaction: &Transaction,
    model: &Model,
    encoded: &EncodedModel,
    now: Timestamp,
) -> Result<(), Error> {
    let ntid = model.identifier;

    transaction
        .execute(
            NOTETYPE_UPSERT.sql,
            params![ntid, model.name, now.secs, encoded.notetype],
        )
        .map_err(database_error)?;
    debug!("Upserted note type {} ({})", model.name, ntid);

    write_rows(transaction, &TEMPLATE_ROWS, ntid, &encoded.templates, |stmt, ord, row| {
        stmt.execute(params![ntid, ord, row.name, now.secs, row.config])
    })?;
    write_rows(transaction, &FIELD_ROWS, ntid, &encoded.fields, |stmt, ord, row| {
        stmt.execute(params![ntid, ord, row.name, row.config])
    })?;

    transaction
        .execute(
            "UPDATE col SET mod = ?1 WHERE id = ?2",
            params![now.millis, COLLECTION_ID],
        )
        .map_err(database_error)?;
    Ok(())
}

/// Writes the project's note type, templates and fields into an open store.
///
/// All assets are read and encoded first; the rows are then written in a
/// single collection transaction, so a failure leaves no partial note type.
pub(crate) fn import_project(store: &mut Store, project: &Project, now: Timestamp) -> Result<(), Error> {
    let model = &project.model;
    let encoded = encode_model(model)?;

    store.transaction(Database::Collection, |transaction| {
        write_model(transaction, model, &encoded, now)
    })?;
    info!(
        "Imported note type {} with {} templates and {} fields",
        model.name,
        encoded.templates.len(),
        encoded.fields.len()
    );

    // Notes and cards are not generated from data files yet.
    for data in &project.data {
        debug!("Skipping data file {}", data.filename.display());
    }
    Ok(())
}

/// Copies `source` into the package media folder and records it in the media
/// index. Returns the stored file name.
pub(crate) fn import_media(
    store: &Store,
    scratch: &Path,
    source: &Path,
    now: Timestamp,
) -> Result<String, Error> {
    let data = fs::read(source).map_err(asset_error(source))?;
    let fname = source
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| Error::MissingAsset {
            path: source.to_path_buf(),
            source: std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "media path has no UTF-8 file name",
            ),
        })?;

    let folder = scratch.join(MEDIA_FOLDER);
    fs::create_dir_all(&folder)?;
    fs::write(folder.join(fname), &data)?;

    let csum = format!("{:x}", Sha1::digest(&data));
    store.execute(
        Database::Media,
        MEDIA_UPSERT.sql,
        params![fname, csum, now.secs],
    )?;
    store.execute(Database::Media, META_DIR_MOD, params![now.millis])?;
    debug!("Added media file {} ({})", fname, csum);
    Ok(fname.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::{Field, Font, Latex, Style, Template};
    use serde_json::Map;
    use std::path::PathBuf;

    fn model_in(dir: &Path) -> Model {
        let write = |name: &str, body: &str| -> PathBuf {
            let path = dir.join(name);
            fs::write(&path, body).unwrap();
            path
        };
        Model {
            identifier: 42,
            name: "Basic".into(),
            kind: "normal".into(),
            style: Style {
                css: write("style.css", ".card { font-size: 20px; }"),
                latex: Latex {
                    prefix: write("pre.tex", "\\documentclass{article}"),
                    postfix: write("post.tex", "\\end{document}"),
                },
            },
            templates: vec![Template {
                name: "Card 1".into(),
                qfmt: write("q.html", "{{Front}}"),
                afmt: write("a.html", "{{FrontSide}}<hr id=answer>{{Back}}"),
            }],
            fields: vec![Field {
                name: "Front".into(),
                template: PathBuf::new(),
                format: "text".into(),
                index: false,
                rtl: false,
                font: Font::default(),
                description: String::new(),
            }],
            other: Map::new(),
        }
    }

    #[test]
    fn encodes_every_blob() {
        let dir = tempfile::tempdir().unwrap();
        let model = model_in(dir.path());
        let encoded = encode_model(&model).unwrap();

        let notetype = NotetypeConfig::decode(encoded.notetype.as_slice()).unwrap();
        assert_eq!(notetype.css, ".card { font-size: 20px; }");
        assert_eq!(notetype.latex_post, "\\end{document}");

        let template = TemplateConfig::decode(encoded.templates[0].config.as_slice()).unwrap();
        assert_eq!(template.q_format, "{{Front}}");
        assert_eq!(encoded.fields[0].name, "Front");
    }

    #[test]
    fn missing_template_source_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut model = model_in(dir.path());
        model.templates[0].afmt = dir.path().join("gone.html");
        let err = encode_model(&model).err().unwrap();
        assert!(matches!(err, Error::MissingAsset { path, .. } if path.ends_with("gone.html")));
    }

    #[test]
    fn non_utf8_asset_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let model = model_in(dir.path());
        fs::write(&model.style.css, [0xff, 0xfe, 0x00]).unwrap();
        assert!(matches!(encode_model(&model), Err(Error::InvalidAsset { .. })));
    }

    #[test]
    fn unsupported_kind_fails_before_encoding_fields() {
        let dir = tempfile::tempdir().unwrap();
        let mut model = model_in(dir.path());
        model.kind = "image".into();
        assert!(matches!(encode_model(&model), Err(Error::UnsupportedModelKind(_))));
    }
}

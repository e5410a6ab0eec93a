//! Protobuf config blobs stored in the `config` column of `notetypes`,
//! `fields` and `templates`.
//!
//! Tags follow the client's `notetypes.proto` (`Notetype.Config`,
//! `Notetype.Field.Config`, `Notetype.Template.Config`). The messages are
//! encoded by hand instead of derived so that scalar and string fields are
//! written even when they hold their default value.

use prost::bytes::{Buf, BufMut};
use prost::encoding::{self, DecodeContext, WireType};
use prost::{DecodeError, Message};
use serde_json::{Map, Value, json};
use std::str::FromStr;

use crate::Error;
use crate::error::json_error;

const OTHER_TAG: u32 = 255;

/// Note type kind, with the client's numeric enum values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(i32)]
pub enum ModelKind {
    #[default]
    Normal = 0,
    Cloze = 1,
}

impl FromStr for ModelKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(Self::Normal),
            "cloze" => Ok(Self::Cloze),
            other => Err(Error::UnsupportedModelKind(other.to_string())),
        }
    }
}

impl TryFrom<i32> for ModelKind {
    type Error = DecodeError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Normal),
            1 => Ok(Self::Cloze),
            _ => Err(DecodeError::new("invalid note type kind")),
        }
    }
}

/// Authoring format of a field's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldFormat {
    Text,
    Markdown,
}

impl FromStr for FieldFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "markdown" => Ok(Self::Markdown),
            other => Err(Error::UnsupportedFieldFormat(other.to_string())),
        }
    }
}

/// `Notetype.Config`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NotetypeConfig {
    pub kind: ModelKind,
    pub sort_field_idx: u32,
    pub css: String,
    pub target_deck_id_unused: i64,
    pub latex_pre: String,
    pub latex_post: String,
    pub latex_svg: bool,
    pub other: Vec<u8>,
}

impl NotetypeConfig {
    /// Builds the config for a note type, merging `extra` into the default
    /// extension map.
    pub fn new(
        kind: &str,
        sort_field_idx: u32,
        css: String,
        latex_pre: String,
        latex_post: String,
        extra: &Map<String, Value>,
    ) -> Result<Self, Error> {
        let mut other = json!({ "vers": [], "tags": [] });
        if let Value::Object(map) = &mut other {
            map.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        Ok(Self {
            kind: kind.parse()?,
            sort_field_idx,
            css,
            target_deck_id_unused: 0,
            latex_pre,
            latex_post,
            latex_svg: false,
            other: serde_json::to_vec(&other).map_err(json_error)?,
        })
    }
}

impl Message for NotetypeConfig {
    fn encode_raw(&self, buf: &mut impl BufMut) {
        encoding::int32::encode(1, &(self.kind as i32), buf);
        encoding::uint32::encode(2, &self.sort_field_idx, buf);
        encoding::string::encode(3, &self.css, buf);
        encoding::int64::encode(4, &self.target_deck_id_unused, buf);
        encoding::string::encode(5, &self.latex_pre, buf);
        encoding::string::encode(6, &self.latex_post, buf);
        encoding::bool::encode(7, &self.latex_svg, buf);
        encoding::bytes::encode(OTHER_TAG, &self.other, buf);
    }

    fn merge_field(
        &mut self,
        tag: u32,
        wire_type: WireType,
        buf: &mut impl Buf,
        ctx: DecodeContext,
    ) -> Result<(), DecodeError> {
        match tag {
            1 => {
                let mut kind = 0;
                encoding::int32::merge(wire_type, &mut kind, buf, ctx)?;
                self.kind = ModelKind::try_from(kind)?;
                Ok(())
            }
            2 => encoding::uint32::merge(wire_type, &mut self.sort_field_idx, buf, ctx),
            3 => encoding::string::merge(wire_type, &mut self.css, buf, ctx),
            4 => encoding::int64::merge(wire_type, &mut self.target_deck_id_unused, buf, ctx),
            5 => encoding::string::merge(wire_type, &mut self.latex_pre, buf, ctx),
            6 => encoding::string::merge(wire_type, &mut self.latex_post, buf, ctx),
            7 => encoding::bool::merge(wire_type, &mut self.latex_svg, buf, ctx),
            OTHER_TAG => encoding::bytes::merge(wire_type, &mut self.other, buf, ctx),
            _ => encoding::skip_field(wire_type, tag, buf, ctx),
        }
    }

    fn encoded_len(&self) -> usize {
        encoding::int32::encoded_len(1, &(self.kind as i32))
            + encoding::uint32::encoded_len(2, &self.sort_field_idx)
            + encoding::string::encoded_len(3, &self.css)
            + encoding::int64::encoded_len(4, &self.target_deck_id_unused)
            + encoding::string::encoded_len(5, &self.latex_pre)
            + encoding::string::encoded_len(6, &self.latex_post)
            + encoding::bool::encoded_len(7, &self.latex_svg)
            + encoding::bytes::encoded_len(OTHER_TAG, &self.other)
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

/// `Notetype.Field.Config`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FieldConfig {
    pub sticky: bool,
    pub rtl: bool,
    pub font_name: String,
    pub font_size: u32,
    pub description: String,
    pub plain_text: bool,
    pub collapsed: bool,
    pub exclude_from_search: bool,
    pub prevent_deletion: bool,
    pub other: Vec<u8>,
}

impl FieldConfig {
    pub fn new(
        format: &str,
        rtl: bool,
        font_name: String,
        font_size: u32,
        description: String,
    ) -> Result<Self, Error> {
        let format: FieldFormat = format.parse()?;
        Ok(Self {
            sticky: false,
            rtl,
            font_name,
            font_size,
            description,
            plain_text: format == FieldFormat::Text,
            collapsed: true,
            exclude_from_search: false,
            prevent_deletion: false,
            other: serde_json::to_vec(&json!({ "media": [] })).map_err(json_error)?,
        })
    }
}

impl Message for FieldConfig {
    fn encode_raw(&self, buf: &mut impl BufMut) {
        encoding::bool::encode(1, &self.sticky, buf);
        encoding::bool::encode(2, &self.rtl, buf);
        encoding::string::encode(3, &self.font_name, buf);
        encoding::uint32::encode(4, &self.font_size, buf);
        encoding::string::encode(5, &self.description, buf);
        encoding::bool::encode(6, &self.plain_text, buf);
        encoding::bool::encode(7, &self.collapsed, buf);
        encoding::bool::encode(8, &self.exclude_from_search, buf);
        encoding::bool::encode(11, &self.prevent_deletion, buf);
        encoding::bytes::encode(OTHER_TAG, &self.other, buf);
    }

    fn merge_field(
        &mut self,
        tag: u32,
        wire_type: WireType,
        buf: &mut impl Buf,
        ctx: DecodeContext,
    ) -> Result<(), DecodeError> {
        match tag {
            1 => encoding::bool::merge(wire_type, &mut self.sticky, buf, ctx),
            2 => encoding::bool::merge(wire_type, &mut self.rtl, buf, ctx),
            3 => encoding::string::merge(wire_type, &mut self.font_name, buf, ctx),
            4 => encoding::uint32::merge(wire_type, &mut self.font_size, buf, ctx),
            5 => encoding::string::merge(wire_type, &mut self.description, buf, ctx),
            6 => encoding::bool::merge(wire_type, &mut self.plain_text, buf, ctx),
            7 => encoding::bool::merge(wire_type, &mut self.collapsed, buf, ctx),
            8 => encoding::bool::merge(wire_type, &mut self.exclude_from_search, buf, ctx),
            11 => encoding::bool::merge(wire_type, &mut self.prevent_deletion, buf, ctx),
            OTHER_TAG => encoding::bytes::merge(wire_type, &mut self.other, buf, ctx),
            _ => encoding::skip_field(wire_type, tag, buf, ctx),
        }
    }

    fn encoded_len(&self) -> usize {
        encoding::bool::encoded_len(1, &self.sticky)
            + encoding::bool::encoded_len(2, &self.rtl)
            + encoding::string::encoded_len(3, &self.font_name)
            + encoding::uint32::encoded_len(4, &self.font_size)
            + encoding::string::encoded_len(5, &self.description)
            + encoding::bool::encoded_len(6, &self.plain_text)
            + encoding::bool::encoded_len(7, &self.collapsed)
            + encoding::bool::encoded_len(8, &self.exclude_from_search)
            + encoding::bool::encoded_len(11, &self.prevent_deletion)
            + encoding::bytes::encoded_len(OTHER_TAG, &self.other)
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

/// `Notetype.Template.Config`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TemplateConfig {
    pub q_format: String,
    pub a_format: String,
    pub q_format_browser: String,
    pub a_format_browser: String,
    pub target_deck_id: i64,
    pub browser_font_name: String,
    pub browser_font_size: u32,
    pub other: Vec<u8>,
}

impl TemplateConfig {
    pub fn new(q_format: String, a_format: String) -> Self {
        Self {
            q_format,
            a_format,
            ..Self::default()
        }
    }
}

impl Message for TemplateConfig {
    fn encode_raw(&self, buf: &mut impl BufMut) {
        encoding::string::encode(1, &self.q_format, buf);
        encoding::string::encode(2, &self.a_format, buf);
        encoding::string::encode(3, &self.q_format_browser, buf);
        encoding::string::encode(4, &self.a_format_browser, buf);
        encoding::int64::encode(5, &self.target_deck_id, buf);
        encoding::string::encode(6, &self.browser_font_name, buf);
        encoding::uint32::encode(7, &self.browser_font_size, buf);
        encoding::bytes::encode(OTHER_TAG, &self.other, buf);
    }

    fn merge_field(
        &mut self,
        tag: u32,
        wire_type: WireType,
        buf: &mut impl Buf,
        ctx: DecodeContext,
    ) -> Result<(), DecodeError> {
        match tag {
            1 => encoding::string::merge(wire_type, &mut self.q_format, buf, ctx),
            2 => encoding::string::merge(wire_type, &mut self.a_format, buf, ctx),
            3 => encoding::string::merge(wire_type, &mut self.q_format_browser, buf, ctx),
            4 => encoding::string::merge(wire_type, &mut self.a_format_browser, buf, ctx),
            5 => encoding::int64::merge(wire_type, &mut self.target_deck_id, buf, ctx),
            6 => encoding::string::merge(wire_type, &mut self.browser_font_name, buf, ctx),
            7 => encoding::uint32::merge(wire_type, &mut self.browser_font_size, buf, ctx),
            OTHER_TAG => encoding::bytes::merge(wire_type, &mut self.other, buf, ctx),
            _ => encoding::skip_field(wire_type, tag, buf, ctx),
        }
    }

    fn encoded_len(&self) -> usize {
        encoding::string::encoded_len(1, &self.q_format)
            + encoding::string::encoded_len(2, &self.a_format)
            + encoding::string::encoded_len(3, &self.q_format_browser)
            + encoding::string::encoded_len(4, &self.a_format_browser)
            + encoding::int64::encoded_len(5, &self.target_deck_id)
            + encoding::string::encoded_len(6, &self.browser_font_name)
            + encoding::uint32::encoded_len(7, &self.browser_font_size)
            + encoding::bytes::encoded_len(OTHER_TAG, &self.other)
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_strings_map_to_client_tags() {
        assert_eq!("normal".parse::<ModelKind>().unwrap() as i32, 0);
        assert_eq!("cloze".parse::<ModelKind>().unwrap() as i32, 1);
        assert!(matches!(
            "image-occlusion".parse::<ModelKind>(),
            Err(Error::UnsupportedModelKind(kind)) if kind == "image-occlusion"
        ));
    }

    #[test]
    fn unknown_field_format_is_rejected() {
        let err = FieldConfig::new("html", false, "Arial".into(), 20, String::new()).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFieldFormat(f) if f == "html"));
    }

    #[test]
    fn defaults_are_written_explicitly() {
        let config = TemplateConfig::default();
        let blob = config.encode_to_vec();
        // q_format: tag 1, length-delimited, empty
        assert_eq!(&blob[..2], &[0x0a, 0x00]);
        // q_format_browser..browser_font_size, then other at tag 255
        assert_eq!(blob.len(), 2 * 7 + 3);
    }

    #[test]
    fn notetype_kind_is_first_field() {
        let config =
            NotetypeConfig::new("cloze", 0, String::new(), String::new(), String::new(), &Map::new()).unwrap();
        let blob = config.encode_to_vec();
        assert_eq!(&blob[..2], &[0x08, 0x01]);
        assert_eq!(blob.len(), config.encoded_len());
    }

    #[test]
    fn notetype_extension_map_merges_extra_keys() {
        let mut extra = Map::new();
        extra.insert("originalStockKind".into(), json!(1));
        let config = NotetypeConfig::new(
            "normal",
            1,
            ".card {}".into(),
            "\\begin{document}".into(),
            "\\end{document}".into(),
            &extra,
        )
        .unwrap();
        let other: Value = serde_json::from_slice(&config.other).unwrap();
        assert_eq!(other, json!({ "vers": [], "tags": [], "originalStockKind": 1 }));

        let decoded = NotetypeConfig::decode(config.encode_to_vec().as_slice()).unwrap();
        assert_eq!(decoded, config);
    }

    #[test]
    fn field_config_decodes_back() {
        let config = FieldConfig::new("markdown", true, "Noto Sans".into(), 22, "front side".into()).unwrap();
        assert!(!config.plain_text);
        assert!(config.collapsed);
        let decoded = FieldConfig::decode(config.encode_to_vec().as_slice()).unwrap();
        assert_eq!(decoded, config);
        assert_eq!(decoded.other, br#"{"media":[]}"#);
    }

    #[test]
    fn invalid_kind_tag_fails_to_decode() {
        let blob = [0x08, 0x07];
        assert!(NotetypeConfig::decode(&blob[..]).is_err());
    }
}

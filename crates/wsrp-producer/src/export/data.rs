//! Export data types and their self-describing byte form.
//!
//! Every encoded value starts with a header: the type tag, the type's
//! version and an id. The id [`INLINE_ID`] means the payload follows;
//! any other id is a key into an [`ExportPersistenceManager`] and nothing
//! follows.
//!
//! [`ExportPersistenceManager`]: crate::export::ExportPersistenceManager

use crate::error::ExportError;
use crate::export::codec::{ExportReader, ExportWriter};

/// Id marking data encoded by value.
pub const INLINE_ID: &str = "inline";

/// Type tags understood by this producer.
pub const KNOWN_TYPES: &[&str] = &[ExportContext::TYPE, ExportPortletData::TYPE];

pub trait ExportData: Sized {
    const TYPE: &'static str;
    const VERSION: f64;

    fn encode_payload(&self, writer: &mut ExportWriter) -> Result<(), ExportError>;
    fn decode_payload(reader: &mut ExportReader<'_>) -> Result<Self, ExportError>;
}

/// Header of an encoded value.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportHeader {
    pub type_tag: String,
    pub version: f64,
    pub id: String,
}

impl ExportHeader {
    pub fn is_inline(&self) -> bool {
        self.id == INLINE_ID
    }
}

/// Either the data itself or the persistence key it is stored under.
#[derive(Debug, Clone, PartialEq)]
pub enum Encoded<T> {
    Inline(T),
    Reference(String),
}

pub fn encode_inline<T: ExportData>(data: &T) -> Result<Vec<u8>, ExportError> {
    let mut writer = ExportWriter::new();
    write_header::<T>(&mut writer, INLINE_ID)?;
    data.encode_payload(&mut writer)?;
    Ok(writer.finish())
}

pub fn encode_reference<T: ExportData>(id: &str) -> Result<Vec<u8>, ExportError> {
    if id == INLINE_ID {
        return Err(ExportError::Malformed(format!("'{INLINE_ID}' cannot be used as a persistence key")));
    }
    let mut writer = ExportWriter::new();
    write_header::<T>(&mut writer, id)?;
    Ok(writer.finish())
}

fn write_header<T: ExportData>(writer: &mut ExportWriter, id: &str) -> Result<(), ExportError> {
    writer.write_utf(T::TYPE)?;
    writer.write_f64(T::VERSION);
    writer.write_utf(id)
}

/// Read only the header, without checking it against any type.
pub fn read_header(bytes: &[u8]) -> Result<(ExportHeader, ExportReader<'_>), ExportError> {
    let mut reader = ExportReader::new(bytes);
    let type_tag = reader.read_utf()?;
    let version = reader.read_f64()?;
    let id = reader.read_utf()?;
    Ok((ExportHeader { type_tag, version, id }, reader))
}

/// Decode `bytes` as a `T`, checking its type tag and version.
pub fn decode<T: ExportData>(bytes: &[u8]) -> Result<Encoded<T>, ExportError> {
    let (header, mut reader) = read_header(bytes)?;

    if !KNOWN_TYPES.contains(&header.type_tag.as_str()) {
        return Err(ExportError::UnknownType(header.type_tag));
    }
    if header.type_tag != T::TYPE {
        return Err(ExportError::UnexpectedType {
            expected: T::TYPE.to_string(),
            found: header.type_tag,
        });
    }
    if header.version != T::VERSION {
        return Err(ExportError::VersionMismatch {
            type_tag: header.type_tag,
            expected: T::VERSION,
            found: header.version,
        });
    }

    if !header.is_inline() {
        return Ok(Encoded::Reference(header.id));
    }
    let data = T::decode_payload(&mut reader)?;
    if !reader.is_empty() {
        return Err(ExportError::Malformed(format!("trailing bytes after '{}' payload", T::TYPE)));
    }
    Ok(Encoded::Inline(data))
}

// ─────────────────────────────────────────────────────────────────────────────
// Export context
// ─────────────────────────────────────────────────────────────────────────────

/// Producer-side record of one exportPortlets call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportContext {
    /// Milliseconds since the epoch.
    pub export_time: i64,
    pub export_by_value: bool,
    pub termination_time: Option<i64>,
    pub portlet_handles: Vec<String>,
    /// Persistence key when the context is held by reference. Not encoded.
    pub reference_id: Option<String>,
}

impl ExportContext {
    pub fn new(export_time: i64, export_by_value: bool) -> Self {
        Self {
            export_time,
            export_by_value,
            termination_time: None,
            portlet_handles: Vec::new(),
            reference_id: None,
        }
    }

    pub fn is_expired_at(&self, now: i64) -> bool {
        self.termination_time.is_some_and(|t| t <= now)
    }
}

impl ExportData for ExportContext {
    const TYPE: &'static str = "EC";
    const VERSION: f64 = 1.0;

    fn encode_payload(&self, writer: &mut ExportWriter) -> Result<(), ExportError> {
        writer.write_i64(self.export_time);
        writer.write_bool(self.export_by_value);
        writer.write_i64(self.termination_time.unwrap_or(-1));
        writer.write_i64(self.portlet_handles.len() as i64);
        for handle in &self.portlet_handles {
            writer.write_utf(handle)?;
        }
        Ok(())
    }

    fn decode_payload(reader: &mut ExportReader<'_>) -> Result<Self, ExportError> {
        let export_time = reader.read_i64()?;
        let export_by_value = reader.read_bool()?;
        let termination_time = Some(reader.read_i64()?).filter(|t| *t >= 0);
        let count = reader.read_i64()?;
        if count < 0 {
            return Err(ExportError::Malformed(format!("negative portlet count {count}")));
        }
        let mut portlet_handles = Vec::new();
        for _ in 0..count {
            portlet_handles.push(reader.read_utf()?);
        }
        Ok(Self {
            export_time,
            export_by_value,
            termination_time,
            portlet_handles,
            reference_id: None,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Portlet data
// ─────────────────────────────────────────────────────────────────────────────

/// Exported state of a single portlet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportPortletData {
    pub portlet_handle: String,
    pub state: Vec<u8>,
}

impl ExportPortletData {
    pub fn new(portlet_handle: impl Into<String>, state: Vec<u8>) -> Self {
        Self {
            portlet_handle: portlet_handle.into(),
            state,
        }
    }
}

impl ExportData for ExportPortletData {
    const TYPE: &'static str = "PD";
    const VERSION: f64 = 1.0;

    fn encode_payload(&self, writer: &mut ExportWriter) -> Result<(), ExportError> {
        writer.write_utf(&self.portlet_handle)?;
        writer.write_bytes(&self.state)
    }

    fn decode_payload(reader: &mut ExportReader<'_>) -> Result<Self, ExportError> {
        Ok(Self {
            portlet_handle: reader.read_utf()?,
            state: reader.read_bytes()?,
        })
    }
}

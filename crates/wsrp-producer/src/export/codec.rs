//! Big-endian primitive encoding for export payloads.
//!
//! Strings are a `u16` byte length followed by UTF-8, doubles and longs are
//! 8 byte IEEE 754 / two's complement values, all big-endian.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::ExportError;

#[derive(Debug, Default)]
pub struct ExportWriter {
    buf: BytesMut,
}

impl ExportWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_utf(&mut self, value: &str) -> Result<(), ExportError> {
        let len = u16::try_from(value.len())
            .map_err(|_| ExportError::Malformed(format!("string of {} bytes is too long", value.len())))?;
        self.buf.put_u16(len);
        self.buf.put_slice(value.as_bytes());
        Ok(())
    }

    pub fn write_f64(&mut self, value: f64) {
        self.buf.put_f64(value);
    }

    pub fn write_i64(&mut self, value: i64) {
        self.buf.put_i64(value);
    }

    pub fn write_bool(&mut self, value: bool) {
        self.buf.put_u8(u8::from(value));
    }

    /// `u32` length followed by the raw bytes.
    pub fn write_bytes(&mut self, value: &[u8]) -> Result<(), ExportError> {
        let len = u32::try_from(value.len())
            .map_err(|_| ExportError::Malformed(format!("payload of {} bytes is too long", value.len())))?;
        self.buf.put_u32(len);
        self.buf.put_slice(value);
        Ok(())
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf.to_vec()
    }
}

#[derive(Debug)]
pub struct ExportReader<'a> {
    buf: &'a [u8],
}

impl<'a> ExportReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn need(&self, n: usize, what: &str) -> Result<(), ExportError> {
        if self.buf.remaining() < n {
            return Err(ExportError::Malformed(format!(
                "truncated {what}: need {n} bytes, {} left",
                self.buf.remaining()
            )));
        }
        Ok(())
    }

    pub fn read_utf(&mut self) -> Result<String, ExportError> {
        self.need(2, "string length")?;
        let len = self.buf.get_u16() as usize;
        self.need(len, "string")?;
        let (raw, rest) = self.buf.split_at(len);
        let value = std::str::from_utf8(raw)
            .map_err(|e| ExportError::Malformed(format!("invalid UTF-8: {e}")))?
            .to_string();
        self.buf = rest;
        Ok(value)
    }

    pub fn read_f64(&mut self) -> Result<f64, ExportError> {
        self.need(8, "double")?;
        Ok(self.buf.get_f64())
    }

    pub fn read_i64(&mut self) -> Result<i64, ExportError> {
        self.need(8, "long")?;
        Ok(self.buf.get_i64())
    }

    pub fn read_bool(&mut self) -> Result<bool, ExportError> {
        self.need(1, "boolean")?;
        Ok(self.buf.get_u8() != 0)
    }

    pub fn read_bytes(&mut self) -> Result<Vec<u8>, ExportError> {
        self.need(4, "payload length")?;
        let len = self.buf.get_u32() as usize;
        self.need(len, "payload")?;
        let (raw, rest) = self.buf.split_at(len);
        self.buf = rest;
        Ok(raw.to_vec())
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

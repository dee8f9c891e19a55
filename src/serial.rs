// Copyright 2022 Oxide Computer Company

//! Shared helpers for the text serialization format described in the
//! distilled spec's §6: one token/line at a time, with `"__NULL__"` standing
//! in for an absent optional reference (a control-flow node, here).

use crate::control_flow::ObjectCatalog;
use crate::error::SerializationError;

pub const NULL_SENTINEL: &str = "__NULL__";

/// A match unit's value type (`ActionEntry` for direct tables, `IndirectIndex`
/// for indirect/indirect-WS) must know how to read and write its own slice of
/// the per-entry serialized line(s), the same way the source this was
/// distilled from gives each value type its own `serialize_`/`deserialize_`.
pub trait EntryValue: Clone + std::fmt::Debug + Send + Sync {
    fn serialize(&self, out: &mut String);

    fn deserialize(
        reader: &mut LineReader<'_>,
        catalog: &dyn ObjectCatalog,
    ) -> Result<Self, SerializationError>
    where
        Self: Sized;
}

/// A cursor over the lines of a serialized table, mirroring the way the
/// source this was distilled from reads tokens off an `istream` one at a
/// time during `deserialize_`.
pub struct LineReader<'a> {
    lines: std::str::Lines<'a>,
}

impl<'a> LineReader<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            lines: text.lines(),
        }
    }

    pub fn next_line(&mut self) -> Result<&'a str, SerializationError> {
        self.lines.next().ok_or(SerializationError::UnexpectedEof)
    }

    pub fn next_token(&mut self) -> Result<String, SerializationError> {
        Ok(self.next_line()?.trim().to_string())
    }

    pub fn next_optional_node_name(
        &mut self,
    ) -> Result<Option<String>, SerializationError> {
        let tok = self.next_token()?;
        if tok == NULL_SENTINEL {
            Ok(None)
        } else {
            Ok(Some(tok))
        }
    }

    pub fn next_u32(&mut self) -> Result<u32, SerializationError> {
        self.next_token()?
            .parse()
            .map_err(|_| SerializationError::Malformed("expected u32".into()))
    }

    pub fn next_bool(&mut self) -> Result<bool, SerializationError> {
        match self.next_token()?.as_str() {
            "1" | "true" => Ok(true),
            "0" | "false" => Ok(false),
            other => Err(SerializationError::Malformed(format!(
                "expected bool, found '{other}'"
            ))),
        }
    }
}

pub fn hex_encode(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{:02x}", b));
    }
    s
}

pub fn hex_decode(s: &str) -> Result<Vec<u8>, SerializationError> {
    if s.len() % 2 != 0 {
        return Err(SerializationError::Malformed(
            "odd-length hex string".into(),
        ));
    }
    (0..s.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&s[i..i + 2], 16)
                .map_err(|_| SerializationError::Malformed("invalid hex byte".into()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_roundtrip() {
        let data = vec![0u8, 1, 254, 255, 0x42];
        assert_eq!(hex_decode(&hex_encode(&data)).unwrap(), data);
    }

    #[test]
    fn line_reader_optional_node() {
        let mut r = LineReader::new("foo\n__NULL__\n");
        assert_eq!(r.next_optional_node_name().unwrap(), Some("foo".into()));
        assert_eq!(r.next_optional_node_name().unwrap(), None);
    }
}

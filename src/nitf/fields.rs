//! Fixed-width field cursor over header bytes.
//!
//! Every NITF header field is a fixed number of ASCII bytes (BCS-A/BCS-N),
//! blank-padded. Numeric fields are right-justified and may be blank when
//! optional.

use super::NitfError;
use std::str::FromStr;

pub(crate) struct FieldReader<'a> {
    data: &'a [u8],
    pos: usize,
    base: u64,
}

impl<'a> FieldReader<'a> {
    /// `base` is the file offset of `data[0]`, used in error messages.
    pub fn new(data: &'a [u8], base: u64) -> Self {
        Self { data, pos: 0, base }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn bytes(&mut self, len: usize, field: &'static str) -> Result<&'a [u8], NitfError> {
        let end = self.pos + len;
        if end > self.data.len() {
            return Err(NitfError::Truncated {
                field,
                offset: self.base + self.pos as u64,
            });
        }
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub fn skip(&mut self, len: usize, field: &'static str) -> Result<(), NitfError> {
        self.bytes(len, field).map(|_| ())
    }

    /// Read a text field with trailing blanks removed.
    pub fn text(&mut self, len: usize, field: &'static str) -> Result<String, NitfError> {
        let raw = self.bytes(len, field)?;
        // ECS-A allows the upper half of Latin-1; map bytes straight to chars.
        let s: String = raw.iter().map(|&b| b as char).collect();
        Ok(s.trim_end().to_string())
    }

    /// Read a numeric field. Surrounding blanks are ignored.
    pub fn number<T: FromStr>(&mut self, len: usize, field: &'static str) -> Result<T, NitfError> {
        let value = self.text(len, field)?;
        value.trim().parse().map_err(|_| NitfError::InvalidField {
            field,
            value: value.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_consecutive_fields() {
        let mut r = FieldReader::new(b"NITF02.10  0042XY", 0);
        assert_eq!(r.text(4, "FHDR").unwrap(), "NITF");
        assert_eq!(r.text(5, "FVER").unwrap(), "02.10");
        assert_eq!(r.number::<u32>(6, "N").unwrap(), 42);
        assert_eq!(r.position(), 15);
        assert_eq!(r.bytes(2, "XY").unwrap(), b"XY");
    }

    #[test]
    fn trailing_blanks_trimmed() {
        let mut r = FieldReader::new(b"MONO    ", 0);
        assert_eq!(r.text(8, "IREP").unwrap(), "MONO");
    }

    #[test]
    fn truncated_reports_absolute_offset() {
        let mut r = FieldReader::new(b"abc", 100);
        r.skip(2, "A").unwrap();
        match r.bytes(5, "B") {
            Err(NitfError::Truncated { field, offset }) => {
                assert_eq!(field, "B");
                assert_eq!(offset, 102);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn invalid_number() {
        let mut r = FieldReader::new(b"12a4", 0);
        assert!(matches!(
            r.number::<u32>(4, "NROWS"),
            Err(NitfError::InvalidField { field: "NROWS", .. })
        ));
    }

    #[test]
    fn latin1_bytes_map_to_chars() {
        let mut r = FieldReader::new(&[b'C', b'a', b'f', 0xE9], 0);
        assert_eq!(r.text(4, "FTITLE").unwrap(), "Café");
    }
}

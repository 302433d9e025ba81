//! Minimal NITF 2.1 / NSIF 1.0 / NITF 2.0 reader.
//!
//! Reads the file header and every image subheader, and decodes image
//! segment pixel data into [`image::DynamicImage`]s. Graphic, text, data
//! extension and reserved extension segments are not interpreted.
//!
//! ## Layout
//!
//! ```text
//! file header (HL bytes)
//! image segment 1: subheader (LISH bytes) + pixel data (LI bytes)
//! image segment 2: ...
//! graphics / text / DES / RES segments
//! ```
//!
//! | Feature | Support |
//! |---|---|
//! | Versions | NITF 02.10, NSIF 01.00, NITF 02.00 |
//! | `IC` | `NC` (uncompressed), `C3` (single-block JPEG), `C8` (JPEG 2000) |
//! | `IMODE` | `B`, `P`, `R`, `S` |
//! | `NBPP` | 8, 16 (`PVTYPE` `INT`) |
//! | Bands | R/G/B tagged, single band + 3 LUTs, otherwise first band grey |

mod decode;
mod fields;
mod subheader;

pub use decode::decode_segment;
pub use subheader::{BandInfo, ImageSubheader};

use fields::FieldReader;
use std::fmt;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Enough bytes to reach `NUMI` in any supported header version.
const HEADER_PREFIX_LEN: usize = 1024;

#[derive(Error, Debug)]
pub enum NitfError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("not a NITF/NSIF file")]
    NotNitf,
    #[error("unsupported NITF version {0:?}")]
    UnsupportedVersion(String),
    #[error("header truncated reading {field} at offset {offset}")]
    Truncated { field: &'static str, offset: u64 },
    #[error("invalid {field} value {value:?}")]
    InvalidField { field: &'static str, value: String },
    #[error("{} has no image segments", .0.display())]
    NoImageSegments(PathBuf),
    #[error("unsupported image segment: {0}")]
    Unsupported(String),
    #[error("decode failed: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NitfVersion {
    Nitf21,
    Nsif10,
    Nitf20,
}

impl fmt::Display for NitfVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NitfVersion::Nitf21 => f.write_str("NITF 2.1"),
            NitfVersion::Nsif10 => f.write_str("NSIF 1.0"),
            NitfVersion::Nitf20 => f.write_str("NITF 2.0"),
        }
    }
}

/// File header plus all image subheaders.
#[derive(Debug, Clone, PartialEq)]
pub struct NitfHeader {
    pub version: NitfVersion,
    pub title: String,
    pub originator: String,
    pub file_length: u64,
    pub header_length: u64,
    pub images: Vec<ImageSubheader>,
}

/// Whether `bytes` start with a supported NITF/NSIF signature.
pub fn is_nitf(bytes: &[u8]) -> bool {
    parse_version(bytes).is_ok()
}

fn parse_version(bytes: &[u8]) -> Result<NitfVersion, NitfError> {
    if bytes.len() < 9 {
        return Err(NitfError::NotNitf);
    }
    match (&bytes[0..4], &bytes[4..9]) {
        (b"NITF", b"02.10") => Ok(NitfVersion::Nitf21),
        (b"NSIF", b"01.00") => Ok(NitfVersion::Nsif10),
        (b"NITF", b"02.00") => Ok(NitfVersion::Nitf20),
        (b"NITF", other) | (b"NSIF", other) => Err(NitfError::UnsupportedVersion(
            String::from_utf8_lossy(other).into_owned(),
        )),
        _ => Err(NitfError::NotNitf),
    }
}

/// Skip the security fields that follow a classification byte.
pub(crate) fn skip_security(r: &mut FieldReader<'_>, version: NitfVersion) -> Result<(), NitfError> {
    match version {
        NitfVersion::Nitf21 | NitfVersion::Nsif10 => {
            // CLSY CODE CTLH REL DCTP DCDT DCXM DG DGDT CLTX CATP CAUT CRSN SRDT CTLN
            r.skip(166, "security")
        }
        NitfVersion::Nitf20 => {
            r.skip(40, "SCODE")?;
            r.skip(40, "SCTLH")?;
            r.skip(40, "SREL")?;
            r.skip(20, "SCAUT")?;
            r.skip(20, "SCTLN")?;
            let downgrade = r.text(6, "SDWNG")?;
            if downgrade == "999998" {
                r.skip(40, "SDEVT")?;
            }
            Ok(())
        }
    }
}

struct FileHeaderFields {
    version: NitfVersion,
    title: String,
    originator: String,
    file_length: u64,
    header_length: u64,
    /// (subheader length, data length) per image segment.
    image_lengths: Vec<(u64, u64)>,
}

fn parse_file_header(bytes: &[u8], with_lengths: bool) -> Result<FileHeaderFields, NitfError> {
    let version = parse_version(bytes)?;
    let mut r = FieldReader::new(bytes, 0);
    r.skip(9, "FHDR")?;
    r.skip(2, "CLEVEL")?;
    r.skip(4, "STYPE")?;
    r.skip(10, "OSTAID")?;
    r.skip(14, "FDT")?;
    let title = r.text(80, "FTITLE")?;
    r.skip(1, "FSCLAS")?;
    skip_security(&mut r, version)?;
    r.skip(5, "FSCOP")?;
    r.skip(5, "FSCPYS")?;
    r.skip(1, "ENCRYP")?;
    let originator = match version {
        NitfVersion::Nitf20 => r.text(27, "ONAME")?,
        _ => {
            r.skip(3, "FBKGC")?;
            r.text(24, "ONAME")?
        }
    };
    r.skip(18, "OPHONE")?;
    let file_length = r.number(12, "FL")?;
    let header_length = r.number(6, "HL")?;
    let mut image_lengths = Vec::new();
    if with_lengths {
        let numi: usize = r.number(3, "NUMI")?;
        for _ in 0..numi {
            let lish = r.number(6, "LISH")?;
            let li = r.number(10, "LI")?;
            image_lengths.push((lish, li));
        }
    }
    Ok(FileHeaderFields {
        version,
        title,
        originator,
        file_length,
        header_length,
        image_lengths,
    })
}

fn read_at(file: &mut File, offset: u64, len: u64) -> Result<Vec<u8>, NitfError> {
    file.seek(SeekFrom::Start(offset))?;
    let mut buf = Vec::new();
    file.take(len).read_to_end(&mut buf)?;
    Ok(buf)
}

/// Read the file header and all image subheaders without touching pixel data.
pub fn read_header(path: &Path) -> Result<NitfHeader, NitfError> {
    let mut file = File::open(path)?;
    let prefix = read_at(&mut file, 0, HEADER_PREFIX_LEN as u64)?;
    let header_length = parse_file_header(&prefix, false)?.header_length;
    // A long segment table can push the header past the prefix.
    let header = if header_length as usize > prefix.len() {
        read_at(&mut file, 0, header_length)?
    } else {
        prefix
    };
    let fields = parse_file_header(&header, true)?;

    let mut offset = fields.header_length;
    let mut images = Vec::with_capacity(fields.image_lengths.len());
    for (lish, li) in &fields.image_lengths {
        let bytes = read_at(&mut file, offset, *lish)?;
        let mut sub = subheader::parse_image_subheader(&bytes, offset, fields.version)?;
        sub.data_offset = offset + lish;
        sub.data_length = *li;
        images.push(sub);
        offset += lish + li;
    }

    Ok(NitfHeader {
        version: fields.version,
        title: fields.title,
        originator: fields.originator,
        file_length: fields.file_length,
        header_length: fields.header_length,
        images,
    })
}

/// Parse headers from an in-memory file.
pub fn parse_header(bytes: &[u8]) -> Result<NitfHeader, NitfError> {
    let fields = parse_file_header(bytes, true)?;
    if (fields.header_length as usize) > bytes.len() {
        return Err(NitfError::Truncated {
            field: "file header",
            offset: bytes.len() as u64,
        });
    }
    let mut offset = fields.header_length;
    let mut images = Vec::with_capacity(fields.image_lengths.len());
    for (lish, li) in &fields.image_lengths {
        let start = offset as usize;
        let end = start.saturating_add(*lish as usize).min(bytes.len());
        let mut sub =
            subheader::parse_image_subheader(&bytes[start.min(end)..end], offset, fields.version)?;
        sub.data_offset = offset + lish;
        sub.data_length = *li;
        images.push(sub);
        offset += lish + li;
    }
    Ok(NitfHeader {
        version: fields.version,
        title: fields.title,
        originator: fields.originator,
        file_length: fields.file_length,
        header_length: fields.header_length,
        images,
    })
}

/// Pixel bytes of one image segment within an in-memory file.
pub fn segment_data<'a>(bytes: &'a [u8], image: &ImageSubheader) -> Result<&'a [u8], NitfError> {
    let start = image.data_offset as usize;
    let end = start.saturating_add(image.data_length as usize);
    bytes.get(start..end).ok_or(NitfError::Truncated {
        field: "image data",
        offset: image.data_offset,
    })
}

//! Image subheader parsing.
//!
//! Only the fields up to `NBPP` are interpreted; they are enough to locate
//! and decode the pixel data. Display/attachment levels, location and the
//! extended subheader (TREs) are ignored.

use super::fields::FieldReader;
use super::{NitfError, NitfVersion, skip_security};

/// One band of an image segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BandInfo {
    /// `IREPBAND`: `R`, `G`, `B`, `M`, `LU`, ... (trimmed, may be empty)
    pub representation: String,
    /// `ISUBCAT`, trimmed.
    pub subcategory: String,
    /// Look-up tables, `NLUTS` entries of `NELUT` bytes each.
    pub luts: Vec<Vec<u8>>,
}

/// Parsed image subheader plus where its pixel data lives in the file.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageSubheader {
    pub image_id: String,
    pub title: String,
    pub source: String,
    pub rows: u32,
    pub cols: u32,
    /// `PVTYPE`: `INT`, `SI`, `R`, `C`, `B`.
    pub pixel_value_type: String,
    /// `IREP`: `MONO`, `RGB`, `RGB/LUT`, `MULTI`, ...
    pub irep: String,
    pub icat: String,
    /// Actual bits per pixel.
    pub abpp: u8,
    /// `L` or `R` justification of `abpp` bits inside `nbpp`.
    pub pjust: char,
    pub comments: Vec<String>,
    /// Compression code: `NC`, `NM`, `C3`, `C8`, ...
    pub compression: String,
    pub compression_rate: Option<String>,
    pub bands: Vec<BandInfo>,
    /// Interleave mode: `B`, `P`, `R` or `S`.
    pub imode: char,
    pub blocks_per_row: u32,
    pub blocks_per_col: u32,
    /// Pixels per block horizontally; 0 means the full width.
    pub pixels_per_block_h: u32,
    /// Pixels per block vertically; 0 means the full height.
    pub pixels_per_block_v: u32,
    /// Stored bits per pixel per band.
    pub nbpp: u8,
    /// File offset of the first pixel byte.
    pub data_offset: u64,
    pub data_length: u64,
}

impl ImageSubheader {
    pub fn block_width(&self) -> u32 {
        if self.pixels_per_block_h == 0 {
            self.cols
        } else {
            self.pixels_per_block_h
        }
    }

    pub fn block_height(&self) -> u32 {
        if self.pixels_per_block_v == 0 {
            self.rows
        } else {
            self.pixels_per_block_v
        }
    }

    pub fn is_compressed(&self) -> bool {
        !matches!(self.compression.as_str(), "NC" | "NM")
    }
}

/// Parse an image subheader. `base` is its file offset; data offset and
/// length are filled in by the caller.
pub(crate) fn parse_image_subheader(
    data: &[u8],
    base: u64,
    version: NitfVersion,
) -> Result<ImageSubheader, NitfError> {
    let mut r = FieldReader::new(data, base);

    let im = r.text(2, "IM")?;
    if im != "IM" {
        return Err(NitfError::InvalidField {
            field: "IM",
            value: im,
        });
    }
    let image_id = r.text(10, "IID1")?;
    r.skip(14, "IDATIM")?;
    r.skip(17, "TGTID")?;
    let title = r.text(80, "IID2")?;
    r.skip(1, "ISCLAS")?;
    skip_security(&mut r, version)?;
    r.skip(1, "ENCRYP")?;
    let source = r.text(42, "ISORCE")?;
    let rows = r.number(8, "NROWS")?;
    let cols = r.number(8, "NCOLS")?;
    let pixel_value_type = r.text(3, "PVTYPE")?;
    let irep = r.text(8, "IREP")?;
    let icat = r.text(8, "ICAT")?;
    let abpp = r.number(2, "ABPP")?;
    let pjust = r.text(1, "PJUST")?.chars().next().unwrap_or('R');

    let icords = r.bytes(1, "ICORDS")?[0];
    let has_igeolo = match version {
        NitfVersion::Nitf20 => icords != b'N' && icords != b' ',
        _ => icords != b' ',
    };
    if has_igeolo {
        r.skip(60, "IGEOLO")?;
    }

    let nicom: usize = r.number(1, "NICOM")?;
    let comments = (0..nicom)
        .map(|_| r.text(80, "ICOM"))
        .collect::<Result<Vec<_>, _>>()?;

    let compression = r.text(2, "IC")?;
    let compression_rate = if matches!(compression.as_str(), "NC" | "NM") {
        None
    } else {
        Some(r.text(4, "COMRAT")?)
    };

    let mut nbands: usize = r.number(1, "NBANDS")?;
    if nbands == 0 {
        nbands = r.number(5, "XBANDS")?;
    }
    let mut bands = Vec::with_capacity(nbands);
    for _ in 0..nbands {
        let representation = r.text(2, "IREPBAND")?.trim().to_string();
        let subcategory = r.text(6, "ISUBCAT")?.trim().to_string();
        r.skip(1, "IFC")?;
        r.skip(3, "IMFLT")?;
        let nluts: usize = r.number(1, "NLUTS")?;
        let mut luts = Vec::with_capacity(nluts);
        if nluts > 0 {
            let nelut: usize = r.number(5, "NELUT")?;
            for _ in 0..nluts {
                luts.push(r.bytes(nelut, "LUTD")?.to_vec());
            }
        }
        bands.push(BandInfo {
            representation,
            subcategory,
            luts,
        });
    }

    r.skip(1, "ISYNC")?;
    let imode = r.text(1, "IMODE")?.chars().next().unwrap_or('B');
    let blocks_per_row = r.number(4, "NBPR")?;
    let blocks_per_col = r.number(4, "NBPC")?;
    let pixels_per_block_h = r.number(4, "NPPBH")?;
    let pixels_per_block_v = r.number(4, "NPPBV")?;
    let nbpp = r.number(2, "NBPP")?;

    Ok(ImageSubheader {
        image_id,
        title,
        source,
        rows,
        cols,
        pixel_value_type,
        irep,
        icat,
        abpp,
        pjust,
        comments,
        compression,
        compression_rate,
        bands,
        imode,
        blocks_per_row,
        blocks_per_col,
        pixels_per_block_h,
        pixels_per_block_v,
        nbpp,
        data_offset: 0,
        data_length: 0,
    })
}

//! Shared test utilities: synthetic NITF files built in memory.
//!
//! [`NitfBuilder`] writes a valid NITF 2.1 (or NSIF 1.0 / NITF 2.0) file
//! header followed by one image segment per [`SegmentSpec`]. Pixel values
//! follow fixed patterns so decoders can be checked pixel by pixel.
//!
//! # Usage
//!
//! ```ignore
//! use crate::test_helpers::*;
//!
//! let bytes = NitfBuilder::new()
//!     .title("pass 3")
//!     .segment(SegmentSpec::rgb8(40, 30).imode('P'))
//!     .segment(SegmentSpec::mono16(10, 10, 11))
//!     .build();
//! ```

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::path::Path;

// =========================================================================
// Field encoding
// =========================================================================

fn put_text(buf: &mut Vec<u8>, value: &str, len: usize) {
    let mut field: Vec<u8> = value.bytes().take(len).collect();
    field.resize(len, b' ');
    buf.extend_from_slice(&field);
}

fn put_num(buf: &mut Vec<u8>, value: u64, len: usize) {
    let s = format!("{value:0len$}");
    assert_eq!(s.len(), len, "{value} does not fit in {len} digits");
    buf.extend_from_slice(s.as_bytes());
}

/// Classification-dependent security block (166 blanks for every version).
fn put_security(buf: &mut Vec<u8>) {
    put_text(buf, "", 166);
}

// =========================================================================
// Image segments
// =========================================================================

#[derive(Debug, Clone, Copy)]
enum Pattern {
    /// `(x + y * w) % 256`
    Mono8,
    /// [`SegmentSpec::rgb8_pixel`]
    Rgb8,
    /// Evenly spaced from 0 to the full `abpp` range across all pixels.
    Mono16,
    /// Index `(x + y * w) % 256` into R = v, G = 255 - v, B = v / 2 tables.
    Lut8,
}

#[derive(Debug, Clone)]
struct BandSpec {
    tag: String,
    luts: Vec<Vec<u8>>,
}

/// One image segment to be written by [`NitfBuilder`].
#[derive(Debug, Clone)]
pub struct SegmentSpec {
    cols: u32,
    rows: u32,
    irep: String,
    nbpp: u8,
    abpp: u8,
    pjust: char,
    imode: char,
    bands: Vec<BandSpec>,
    compression: String,
    comments: Vec<String>,
    block: Option<(u32, u32)>,
    full_extent: bool,
    pattern: Pattern,
    data: Option<Vec<u8>>,
}

impl SegmentSpec {
    fn base(cols: u32, rows: u32, irep: &str, nbpp: u8, tags: &[&str], pattern: Pattern) -> Self {
        Self {
            cols,
            rows,
            irep: irep.to_string(),
            nbpp,
            abpp: nbpp,
            pjust: 'R',
            imode: 'B',
            bands: tags
                .iter()
                .map(|t| BandSpec {
                    tag: t.to_string(),
                    luts: Vec::new(),
                })
                .collect(),
            compression: "NC".to_string(),
            comments: Vec::new(),
            block: None,
            full_extent: false,
            pattern,
            data: None,
        }
    }

    pub fn mono8(cols: u32, rows: u32) -> Self {
        Self::base(cols, rows, "MONO", 8, &["M"], Pattern::Mono8)
    }

    pub fn rgb8(cols: u32, rows: u32) -> Self {
        Self::base(cols, rows, "RGB", 8, &["R", "G", "B"], Pattern::Rgb8)
    }

    /// 16-bit monochrome with `abpp` significant bits.
    pub fn mono16(cols: u32, rows: u32, abpp: u8) -> Self {
        let mut spec = Self::base(cols, rows, "MONO", 16, &["M"], Pattern::Mono16);
        spec.abpp = abpp;
        spec
    }

    pub fn lut8(cols: u32, rows: u32) -> Self {
        let mut spec = Self::base(cols, rows, "RGB/LUT", 8, &["LU"], Pattern::Lut8);
        spec.bands[0].luts = vec![
            (0..=255u8).collect(),
            (0..=255u8).map(|v| 255 - v).collect(),
            (0..=255u8).map(|v| v / 2).collect(),
        ];
        spec
    }

    /// Compressed RGB segment carrying `data` verbatim as a single block.
    pub fn compressed(code: &str, cols: u32, rows: u32, data: Vec<u8>) -> Self {
        let mut spec = Self::rgb8(cols, rows);
        spec.compression = code.to_string();
        spec.data = Some(data);
        spec
    }

    /// Pixel value written by [`SegmentSpec::rgb8`] at `(x, y)`.
    pub fn rgb8_pixel(x: u32, y: u32) -> Rgb<u8> {
        Rgb([
            (x * 10 % 256) as u8,
            (y * 20 % 256) as u8,
            ((x + y) * 5 % 256) as u8,
        ])
    }

    pub fn imode(mut self, mode: char) -> Self {
        self.imode = mode;
        self
    }

    /// Relabel bands without changing the stored sample order.
    pub fn band_tags(mut self, tags: &[&str]) -> Self {
        for (band, tag) in self.bands.iter_mut().zip(tags) {
            band.tag = tag.to_string();
        }
        self
    }

    pub fn blocks(mut self, width: u32, height: u32) -> Self {
        self.block = Some((width, height));
        self
    }

    /// Single block written with `NPPBH`/`NPPBV` of 0.
    pub fn full_extent_blocks(mut self) -> Self {
        self.full_extent = true;
        self
    }

    pub fn left_justified(mut self) -> Self {
        self.pjust = 'L';
        self
    }

    pub fn comment(mut self, text: &str) -> Self {
        self.comments.push(text.to_string());
        self
    }

    /// Replace the generated pixel data.
    pub fn with_data(mut self, data: Vec<u8>) -> Self {
        self.data = Some(data);
        self
    }

    fn block_layout(&self) -> (u32, u32, u32, u32) {
        match self.block {
            Some((bw, bh)) => (
                bw,
                bh,
                self.cols.div_ceil(bw),
                self.rows.div_ceil(bh),
            ),
            None => (self.cols, self.rows, 1, 1),
        }
    }

    fn sample(&self, band: usize, x: u32, y: u32) -> u32 {
        let index = x + y * self.cols;
        match self.pattern {
            Pattern::Mono8 | Pattern::Lut8 => index % 256,
            Pattern::Rgb8 => Self::rgb8_pixel(x, y)[band] as u32,
            Pattern::Mono16 => {
                let max = (1u64 << self.abpp) - 1;
                let last = (self.cols as u64 * self.rows as u64).max(2) - 1;
                (max * index as u64 / last) as u32
            }
        }
    }

    fn push_sample(&self, out: &mut Vec<u8>, band: usize, x: u32, y: u32) {
        let value = if x < self.cols && y < self.rows {
            let v = self.sample(band, x, y);
            if self.pjust == 'L' {
                v << (self.nbpp - self.abpp)
            } else {
                v
            }
        } else {
            0
        };
        if self.nbpp == 8 {
            out.push(value as u8);
        } else {
            out.extend_from_slice(&(value as u16).to_be_bytes());
        }
    }

    /// Pixel data laid out per `IMODE` and blocking, padding with zeros.
    pub fn pixel_bytes(&self) -> Vec<u8> {
        if let Some(data) = &self.data {
            return data.clone();
        }
        let (bw, bh, nbpr, nbpc) = self.block_layout();
        let nbands = self.bands.len();
        let mut out = Vec::new();
        let origin = |block: u32| ((block % nbpr) * bw, (block / nbpr) * bh);
        let blocks = nbpr * nbpc;
        match self.imode {
            'S' => {
                for band in 0..nbands {
                    for block in 0..blocks {
                        let (x0, y0) = origin(block);
                        for y in 0..bh {
                            for x in 0..bw {
                                self.push_sample(&mut out, band, x0 + x, y0 + y);
                            }
                        }
                    }
                }
            }
            'P' => {
                for block in 0..blocks {
                    let (x0, y0) = origin(block);
                    for y in 0..bh {
                        for x in 0..bw {
                            for band in 0..nbands {
                                self.push_sample(&mut out, band, x0 + x, y0 + y);
                            }
                        }
                    }
                }
            }
            'R' => {
                for block in 0..blocks {
                    let (x0, y0) = origin(block);
                    for y in 0..bh {
                        for band in 0..nbands {
                            for x in 0..bw {
                                self.push_sample(&mut out, band, x0 + x, y0 + y);
                            }
                        }
                    }
                }
            }
            _ => {
                for block in 0..blocks {
                    let (x0, y0) = origin(block);
                    for band in 0..nbands {
                        for y in 0..bh {
                            for x in 0..bw {
                                self.push_sample(&mut out, band, x0 + x, y0 + y);
                            }
                        }
                    }
                }
            }
        }
        out
    }

    /// Image subheader bytes through `IXSHDL`.
    pub fn subheader_bytes(&self) -> Vec<u8> {
        let mut b = Vec::new();
        put_text(&mut b, "IM", 2);
        put_text(&mut b, "SYNTH", 10);
        put_text(&mut b, "20240101120000", 14);
        put_text(&mut b, "", 17);
        put_text(&mut b, "synthetic segment", 80);
        put_text(&mut b, "U", 1);
        put_security(&mut b);
        put_text(&mut b, "0", 1);
        put_text(&mut b, "test builder", 42);
        put_num(&mut b, self.rows as u64, 8);
        put_num(&mut b, self.cols as u64, 8);
        put_text(&mut b, "INT", 3);
        put_text(&mut b, &self.irep, 8);
        put_text(&mut b, "VIS", 8);
        put_num(&mut b, self.abpp as u64, 2);
        put_text(&mut b, &self.pjust.to_string(), 1);
        put_text(&mut b, " ", 1);
        put_num(&mut b, self.comments.len() as u64, 1);
        for comment in &self.comments {
            put_text(&mut b, comment, 80);
        }
        put_text(&mut b, &self.compression, 2);
        if !matches!(self.compression.as_str(), "NC" | "NM") {
            put_text(&mut b, "00.0", 4);
        }
        put_num(&mut b, self.bands.len() as u64, 1);
        for band in &self.bands {
            put_text(&mut b, &band.tag, 2);
            put_text(&mut b, "", 6);
            put_text(&mut b, "N", 1);
            put_text(&mut b, "", 3);
            put_num(&mut b, band.luts.len() as u64, 1);
            if let Some(first) = band.luts.first() {
                put_num(&mut b, first.len() as u64, 5);
                for table in &band.luts {
                    b.extend_from_slice(table);
                }
            }
        }
        put_num(&mut b, 0, 1);
        put_text(&mut b, &self.imode.to_string(), 1);
        let (bw, bh, nbpr, nbpc) = self.block_layout();
        put_num(&mut b, nbpr as u64, 4);
        put_num(&mut b, nbpc as u64, 4);
        if self.full_extent {
            put_num(&mut b, 0, 4);
            put_num(&mut b, 0, 4);
        } else {
            put_num(&mut b, bw as u64, 4);
            put_num(&mut b, bh as u64, 4);
        }
        put_num(&mut b, self.nbpp as u64, 2);
        put_num(&mut b, 1, 3); // IDLVL
        put_num(&mut b, 0, 3); // IALVL
        put_num(&mut b, 0, 10); // ILOC
        put_text(&mut b, "1.0", 4);
        put_num(&mut b, 0, 5); // UDIDL
        put_num(&mut b, 0, 5); // IXSHDL
        b
    }
}

// =========================================================================
// Files
// =========================================================================

#[derive(Debug, Clone, Copy)]
enum Flavor {
    Nitf21,
    Nsif10,
    Nitf20,
}

/// Builds complete NITF files with correct `FL`, `HL` and segment lengths.
#[derive(Debug, Clone)]
pub struct NitfBuilder {
    flavor: Flavor,
    title: String,
    segments: Vec<SegmentSpec>,
}

impl Default for NitfBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl NitfBuilder {
    pub fn new() -> Self {
        Self {
            flavor: Flavor::Nitf21,
            title: "synthetic".to_string(),
            segments: Vec::new(),
        }
    }

    pub fn title(mut self, title: &str) -> Self {
        self.title = title.to_string();
        self
    }

    pub fn nsif(mut self) -> Self {
        self.flavor = Flavor::Nsif10;
        self
    }

    pub fn nitf20(mut self) -> Self {
        self.flavor = Flavor::Nitf20;
        self
    }

    pub fn segment(mut self, spec: SegmentSpec) -> Self {
        self.segments.push(spec);
        self
    }

    fn header(&self, lengths: &[(u64, u64)], file_length: u64, header_length: u64) -> Vec<u8> {
        let mut b = Vec::new();
        let signature = match self.flavor {
            Flavor::Nitf21 => "NITF02.10",
            Flavor::Nsif10 => "NSIF01.00",
            Flavor::Nitf20 => "NITF02.00",
        };
        put_text(&mut b, signature, 9);
        put_text(&mut b, "03", 2);
        put_text(&mut b, "BF01", 4);
        put_text(&mut b, "TESTSTA", 10);
        put_text(&mut b, "20240101120000", 14);
        put_text(&mut b, &self.title, 80);
        put_text(&mut b, "U", 1);
        put_security(&mut b);
        put_num(&mut b, 0, 5);
        put_num(&mut b, 0, 5);
        put_text(&mut b, "0", 1);
        match self.flavor {
            Flavor::Nitf20 => put_text(&mut b, "builder", 27),
            _ => {
                b.extend_from_slice(&[0, 0, 0]);
                put_text(&mut b, "builder", 24);
            }
        }
        put_text(&mut b, "", 18);
        put_num(&mut b, file_length, 12);
        put_num(&mut b, header_length, 6);
        put_num(&mut b, lengths.len() as u64, 3);
        for (lish, li) in lengths {
            put_num(&mut b, *lish, 6);
            put_num(&mut b, *li, 10);
        }
        for _ in 0..5 {
            put_num(&mut b, 0, 3); // NUMS NUMX NUMT NUMDES NUMRES
        }
        put_num(&mut b, 0, 5); // UDHDL
        put_num(&mut b, 0, 5); // XHDL
        b
    }

    pub fn build(&self) -> Vec<u8> {
        let segments: Vec<(Vec<u8>, Vec<u8>)> = self
            .segments
            .iter()
            .map(|s| (s.subheader_bytes(), s.pixel_bytes()))
            .collect();
        let lengths: Vec<(u64, u64)> = segments
            .iter()
            .map(|(sub, data)| (sub.len() as u64, data.len() as u64))
            .collect();
        let header_length = self.header(&lengths, 0, 0).len() as u64;
        let body: u64 = lengths.iter().map(|(a, b)| a + b).sum();
        let mut out = self.header(&lengths, header_length + body, header_length);
        for (sub, data) in segments {
            out.extend(sub);
            out.extend(data);
        }
        out
    }

    pub fn write(&self, path: &Path) {
        std::fs::write(path, self.build()).unwrap();
    }
}

/// Small RGB JPEG with a gradient, for `C3` segments and non-NITF inputs.
pub fn encode_test_jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 7 % 256) as u8, (y * 11 % 256) as u8, 128])
    });
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut buf, ImageFormat::Jpeg)
        .unwrap();
    buf.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_length_matches_layout() {
        let bytes = NitfBuilder::new().build();
        // 2.1 header with no segments
        assert_eq!(bytes.len(), 388);
        assert_eq!(&bytes[354..360], b"000388");
    }

    #[test]
    fn blocked_data_is_padded() {
        let spec = SegmentSpec::mono8(7, 5).blocks(4, 4);
        assert_eq!(spec.pixel_bytes().len(), 2 * 2 * 16);
    }
}

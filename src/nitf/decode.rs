//! Image segment pixel decoding.
//!
//! Uncompressed segments are de-blocked and de-interleaved here. `C3`
//! segments are handed to the `image` crate's JPEG decoder and `C8`
//! segments to the JPEG 2000 codec.
//!
//! The output keeps the closest natural pixel model: one band becomes
//! `Luma8`/`Luma16`, R/G/B tagged bands become `Rgb8`/`Rgb16`, and a single
//! band with three look-up tables becomes `Rgb8`.

use super::{ImageSubheader, NitfError};
use crate::imaging::jp2;
use image::{DynamicImage, GrayImage, ImageBuffer, ImageFormat, Luma, Rgb, RgbImage};

/// Decode one image segment's pixel data.
pub fn decode_segment(image: &ImageSubheader, data: &[u8]) -> Result<DynamicImage, NitfError> {
    if image.rows == 0 || image.cols == 0 {
        return Err(NitfError::Unsupported("empty image".into()));
    }
    match image.compression.as_str() {
        "NC" => decode_uncompressed(image, data),
        "C3" => {
            if image.blocks_per_row * image.blocks_per_col != 1 {
                return Err(NitfError::Unsupported("multi-block JPEG".into()));
            }
            image::load_from_memory_with_format(data, ImageFormat::Jpeg)
                .map_err(|e| NitfError::Decode(e.to_string()))
        }
        "C8" => jp2::decode(data).map_err(NitfError::Decode),
        other => Err(NitfError::Unsupported(format!("compression {other}"))),
    }
}

/// How the selected bands map onto the output image.
enum BandLayout {
    Grey(usize),
    Rgb([usize; 3]),
    Lut,
}

fn band_layout(image: &ImageSubheader) -> BandLayout {
    let find = |tag: &str| image.bands.iter().position(|b| b.representation == tag);
    if let (Some(r), Some(g), Some(b)) = (find("R"), find("G"), find("B")) {
        return BandLayout::Rgb([r, g, b]);
    }
    if image.bands.len() == 1 && image.bands[0].luts.len() == 3 {
        return BandLayout::Lut;
    }
    BandLayout::Grey(0)
}

/// Sample reader over de-blocked, de-interleaved pixel data.
struct Sampler<'a> {
    data: &'a [u8],
    bytes_per_sample: usize,
    bands: usize,
    block_w: usize,
    block_h: usize,
    blocks_per_row: usize,
    blocks_total: usize,
    imode: char,
    shift: u32,
    mask: u32,
}

impl Sampler<'_> {
    fn offset(&self, band: usize, row: usize, col: usize) -> usize {
        let block = (row / self.block_h) * self.blocks_per_row + col / self.block_w;
        let (y, x) = (row % self.block_h, col % self.block_w);
        let ppb = self.block_w * self.block_h;
        let pixel = match self.imode {
            'S' => band * self.blocks_total * ppb + block * ppb + y * self.block_w + x,
            'P' => block * ppb * self.bands + (y * self.block_w + x) * self.bands + band,
            'R' => block * ppb * self.bands + (y * self.bands + band) * self.block_w + x,
            // 'B' and single-band data
            _ => (block * self.bands + band) * ppb + y * self.block_w + x,
        };
        pixel * self.bytes_per_sample
    }

    fn sample(&self, band: usize, row: usize, col: usize) -> u32 {
        let o = self.offset(band, row, col);
        let raw = if self.bytes_per_sample == 1 {
            self.data[o] as u32
        } else {
            u16::from_be_bytes([self.data[o], self.data[o + 1]]) as u32
        };
        (raw >> self.shift) & self.mask
    }
}

fn decode_uncompressed(image: &ImageSubheader, data: &[u8]) -> Result<DynamicImage, NitfError> {
    if image.pixel_value_type != "INT" {
        return Err(NitfError::Unsupported(format!(
            "pixel type {}",
            image.pixel_value_type
        )));
    }
    let nbpp = image.nbpp as u32;
    if nbpp != 8 && nbpp != 16 {
        return Err(NitfError::Unsupported(format!("{nbpp} bits per pixel")));
    }
    if image.bands.is_empty() {
        return Err(NitfError::Unsupported("no bands".into()));
    }
    let abpp = match image.abpp as u32 {
        0 => nbpp,
        a => a.min(nbpp),
    };
    let block_w = image.block_width() as usize;
    let block_h = image.block_height() as usize;
    let blocks_per_row = image.blocks_per_row.max(1) as usize;
    let blocks_total = blocks_per_row * image.blocks_per_col.max(1) as usize;
    let bytes_per_sample = (nbpp / 8) as usize;
    let needed = blocks_total * block_w * block_h * image.bands.len() * bytes_per_sample;
    if data.len() < needed {
        return Err(NitfError::Truncated {
            field: "image data",
            offset: image.data_offset + data.len() as u64,
        });
    }
    let cols = image.cols as usize;
    let rows = image.rows as usize;
    if block_w * blocks_per_row < cols || block_h * (blocks_total / blocks_per_row) < rows {
        return Err(NitfError::InvalidField {
            field: "NBPR",
            value: format!("{}x{} blocks too small", blocks_per_row, blocks_total / blocks_per_row),
        });
    }

    let sampler = Sampler {
        data,
        bytes_per_sample,
        bands: image.bands.len(),
        block_w,
        block_h,
        blocks_per_row,
        blocks_total,
        imode: image.imode,
        shift: if image.pjust == 'L' { nbpp - abpp } else { 0 },
        mask: (1u32 << abpp) - 1,
    };
    let max_in = sampler.mask;
    let (w, h) = (image.cols, image.rows);

    let out: DynamicImage = match (band_layout(image), nbpp) {
        (BandLayout::Lut, 8) => {
            let luts = &image.bands[0].luts;
            RgbImage::from_fn(w, h, |x, y| {
                let v = sampler.sample(0, y as usize, x as usize) as usize;
                Rgb([lut(&luts[0], v), lut(&luts[1], v), lut(&luts[2], v)])
            })
            .into()
        }
        (BandLayout::Lut, _) => {
            return Err(NitfError::Unsupported("16-bit look-up tables".into()));
        }
        (BandLayout::Rgb(idx), 8) => RgbImage::from_fn(w, h, |x, y| {
            let s = |b: usize| to_u8(sampler.sample(idx[b], y as usize, x as usize), max_in);
            Rgb([s(0), s(1), s(2)])
        })
        .into(),
        (BandLayout::Rgb(idx), _) => {
            ImageBuffer::<Rgb<u16>, Vec<u16>>::from_fn(w, h, |x, y| {
                let s = |b: usize| to_u16(sampler.sample(idx[b], y as usize, x as usize), max_in);
                Rgb([s(0), s(1), s(2)])
            })
            .into()
        }
        (BandLayout::Grey(band), 8) => GrayImage::from_fn(w, h, |x, y| {
            Luma([to_u8(sampler.sample(band, y as usize, x as usize), max_in)])
        })
        .into(),
        (BandLayout::Grey(band), _) => ImageBuffer::<Luma<u16>, Vec<u16>>::from_fn(w, h, |x, y| {
            Luma([to_u16(sampler.sample(band, y as usize, x as usize), max_in)])
        })
        .into(),
    };
    Ok(out)
}

fn lut(table: &[u8], index: usize) -> u8 {
    table
        .get(index)
        .or_else(|| table.last())
        .copied()
        .unwrap_or(0)
}

fn to_u8(v: u32, max_in: u32) -> u8 {
    if max_in == 255 {
        v as u8
    } else {
        ((v * 255 + max_in / 2) / max_in) as u8
    }
}

fn to_u16(v: u32, max_in: u32) -> u16 {
    if max_in == 65535 {
        v as u16
    } else {
        ((v as u64 * 65535 + max_in as u64 / 2) / max_in as u64) as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::Jpeg2000Params;
    use crate::nitf::{parse_header, segment_data};
    use crate::test_helpers::{NitfBuilder, SegmentSpec};

    fn decode_only(spec: SegmentSpec) -> Result<DynamicImage, NitfError> {
        let bytes = NitfBuilder::new().segment(spec).build();
        let header = parse_header(&bytes).unwrap();
        let image = &header.images[0];
        decode_segment(image, segment_data(&bytes, image).unwrap())
    }

    #[test]
    fn mono8_single_block() {
        let img = decode_only(SegmentSpec::mono8(5, 3)).unwrap();
        let grey = img.as_luma8().unwrap();
        assert_eq!(grey.dimensions(), (5, 3));
        // mono8 pattern: value = (x + y * w) % 256
        assert_eq!(grey.get_pixel(4, 2)[0], 14);
    }

    #[test]
    fn rgb_pixel_interleaved_matches_band_sequential() {
        let p = decode_only(SegmentSpec::rgb8(6, 4).imode('P')).unwrap();
        let b = decode_only(SegmentSpec::rgb8(6, 4).imode('B')).unwrap();
        let r = decode_only(SegmentSpec::rgb8(6, 4).imode('R')).unwrap();
        let s = decode_only(SegmentSpec::rgb8(6, 4).imode('S')).unwrap();
        assert_eq!(p.as_rgb8().unwrap(), b.as_rgb8().unwrap());
        assert_eq!(p.as_rgb8().unwrap(), r.as_rgb8().unwrap());
        assert_eq!(p.as_rgb8().unwrap(), s.as_rgb8().unwrap());
        assert_eq!(p.as_rgb8().unwrap().get_pixel(2, 1), &SegmentSpec::rgb8_pixel(2, 1));
    }

    #[test]
    fn bands_reordered_by_tag() {
        let img = decode_only(SegmentSpec::rgb8(3, 3).band_tags(&["B", "G", "R"])).unwrap();
        let expected = SegmentSpec::rgb8_pixel(1, 2);
        let px = img.as_rgb8().unwrap().get_pixel(1, 2);
        // Stored order is (r, g, b) but tagged B, G, R
        assert_eq!(px.0, [expected[2], expected[1], expected[0]]);
    }

    #[test]
    fn multi_block_with_padding() {
        let img = decode_only(SegmentSpec::mono8(7, 5).blocks(4, 4)).unwrap();
        let reference = decode_only(SegmentSpec::mono8(7, 5)).unwrap();
        assert_eq!(img.as_luma8().unwrap(), reference.as_luma8().unwrap());
    }

    #[test]
    fn mono16_normalized_by_abpp() {
        let img = decode_only(SegmentSpec::mono16(4, 1, 11)).unwrap();
        let grey = img.as_luma16().unwrap();
        // mono16 writes 0, 1/3, 2/3, full of the 11-bit range
        assert_eq!(grey.get_pixel(0, 0)[0], 0);
        assert_eq!(grey.get_pixel(3, 0)[0], 65535);
    }

    #[test]
    fn left_justified_samples_are_shifted() {
        let right = decode_only(SegmentSpec::mono16(4, 1, 11)).unwrap();
        let left = decode_only(SegmentSpec::mono16(4, 1, 11).left_justified()).unwrap();
        assert_eq!(right.as_luma16().unwrap(), left.as_luma16().unwrap());
    }

    #[test]
    fn lut_expands_to_rgb() {
        let img = decode_only(SegmentSpec::lut8(2, 2)).unwrap();
        let rgb = img.as_rgb8().unwrap();
        // lut8 tables: R = v, G = 255 - v, B = v / 2; pixel (1,0) has index 1
        assert_eq!(rgb.get_pixel(1, 0).0, [1, 254, 0]);
    }

    #[test]
    fn truncated_data_is_error() {
        let spec = SegmentSpec::mono8(4, 4).with_data(vec![0; 5]);
        assert!(matches!(
            decode_only(spec),
            Err(NitfError::Truncated { .. })
        ));
    }

    #[test]
    fn unsupported_compression() {
        let spec = SegmentSpec::compressed("M4", 4, 4, vec![0; 16]);
        assert!(matches!(decode_only(spec), Err(NitfError::Unsupported(_))));
    }

    #[test]
    fn jpeg_segment_decodes() {
        let jpeg = crate::test_helpers::encode_test_jpeg(24, 16);
        let img = decode_only(SegmentSpec::compressed("C3", 24, 16, jpeg)).unwrap();
        assert_eq!((img.width(), img.height()), (24, 16));
    }

    #[test]
    fn broken_jpeg_segment_fails() {
        let spec = SegmentSpec::compressed("C3", 24, 16, b"\xFF\xD8garbage".to_vec());
        assert!(matches!(decode_only(spec), Err(NitfError::Decode(_))));
    }

    #[test]
    fn jpeg2000_segment_decodes() {
        let rgb = RgbImage::from_fn(20, 12, |x, y| Rgb([x as u8 * 10, y as u8 * 20, 90]));
        let codestream = jp2::encode(
            &DynamicImage::ImageRgb8(rgb),
            &Jpeg2000Params::new(1.0),
            jp2::Container::Codestream,
        )
        .unwrap();
        let img = decode_only(SegmentSpec::compressed("C8", 20, 12, codestream)).unwrap();
        assert_eq!((img.width(), img.height()), (20, 12));
    }
}

//! In-memory JPEG 2000 encode/decode through OpenJPEG (`openjpeg-sys`).
//!
//! OpenJPEG only speaks streams, so both directions run over a small
//! memory-backed stream whose callbacks read from or write into a Rust
//! buffer. Codec, stream and image handles are wrapped in guards that
//! release them on every exit path.
//!
//! | Direction | Supported |
//! |---|---|
//! | Encode | Luma8/16, Rgb8/16 (alpha dropped), JP2 file or raw J2K codestream |
//! | Decode | JP2 or J2K, 1–4 components, precision up to 16 bits |

use super::params::Jpeg2000Params;
use image::{DynamicImage, GrayImage, ImageBuffer, Luma, Rgb, RgbImage};
use openjpeg_sys as opj;
use std::ffi::{CStr, c_char, c_void};
use std::ptr;

const STREAM_CHUNK: usize = 1 << 20;
const MAX_RESOLUTIONS: i32 = 6;
/// Compression ratio used at quality 0.0.
const MAX_COMPRESSION_RATIO: f32 = 100.0;

/// Output container for encoded data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    /// JP2 file format (boxes around the codestream).
    Jp2,
    /// Bare J2K codestream, as embedded in NITF `C8` segments.
    Codestream,
}

// ============================================================================
// Handle guards
// ============================================================================

struct Codec(*mut opj::opj_codec_t);

impl Drop for Codec {
    fn drop(&mut self) {
        unsafe { opj::opj_destroy_codec(self.0) }
    }
}

struct Stream(*mut opj::opj_stream_t);

impl Drop for Stream {
    fn drop(&mut self) {
        unsafe { opj::opj_stream_destroy(self.0) }
    }
}

struct Image(*mut opj::opj_image_t);

impl Drop for Image {
    fn drop(&mut self) {
        if !self.0.is_null() {
            unsafe { opj::opj_image_destroy(self.0) }
        }
    }
}

unsafe extern "C" fn log_message(msg: *const c_char, _client: *mut c_void) {
    if msg.is_null() {
        return;
    }
    let text = unsafe { CStr::from_ptr(msg) }.to_string_lossy();
    log::debug!("openjpeg: {}", text.trim_end());
}

fn install_handlers(codec: &Codec) {
    unsafe {
        opj::opj_set_error_handler(codec.0, Some(log_message), ptr::null_mut());
        opj::opj_set_warning_handler(codec.0, Some(log_message), ptr::null_mut());
    }
}

// ============================================================================
// Memory streams
// ============================================================================

/// Growable output buffer with a cursor (OpenJPEG seeks back to patch box lengths).
struct WriteBuffer {
    data: Vec<u8>,
    pos: usize,
}

struct ReadBuffer<'a> {
    data: &'a [u8],
    pos: usize,
}

unsafe extern "C" fn write_cb(
    buffer: *mut c_void,
    nb_bytes: opj::OPJ_SIZE_T,
    user: *mut c_void,
) -> opj::OPJ_SIZE_T {
    let out = unsafe { &mut *(user as *mut WriteBuffer) };
    let len = nb_bytes as usize;
    let src = unsafe { std::slice::from_raw_parts(buffer as *const u8, len) };
    let end = out.pos + len;
    if out.data.len() < end {
        out.data.resize(end, 0);
    }
    out.data[out.pos..end].copy_from_slice(src);
    out.pos = end;
    nb_bytes
}

unsafe extern "C" fn write_skip_cb(nb_bytes: opj::OPJ_OFF_T, user: *mut c_void) -> opj::OPJ_OFF_T {
    let out = unsafe { &mut *(user as *mut WriteBuffer) };
    let target = out.pos as i64 + nb_bytes as i64;
    if target < 0 {
        return -1;
    }
    out.pos = target as usize;
    if out.data.len() < out.pos {
        out.data.resize(out.pos, 0);
    }
    nb_bytes
}

unsafe extern "C" fn write_seek_cb(pos: opj::OPJ_OFF_T, user: *mut c_void) -> opj::OPJ_BOOL {
    let out = unsafe { &mut *(user as *mut WriteBuffer) };
    if pos < 0 {
        return 0;
    }
    out.pos = pos as usize;
    if out.data.len() < out.pos {
        out.data.resize(out.pos, 0);
    }
    1
}

unsafe extern "C" fn read_cb(
    buffer: *mut c_void,
    nb_bytes: opj::OPJ_SIZE_T,
    user: *mut c_void,
) -> opj::OPJ_SIZE_T {
    let input = unsafe { &mut *(user as *mut ReadBuffer<'_>) };
    let remaining = input.data.len().saturating_sub(input.pos);
    if remaining == 0 {
        // End of stream is signalled with (OPJ_SIZE_T)-1.
        return opj::OPJ_SIZE_T::MAX;
    }
    let n = remaining.min(nb_bytes as usize);
    unsafe {
        ptr::copy_nonoverlapping(input.data.as_ptr().add(input.pos), buffer as *mut u8, n);
    }
    input.pos += n;
    n as opj::OPJ_SIZE_T
}

unsafe extern "C" fn read_skip_cb(nb_bytes: opj::OPJ_OFF_T, user: *mut c_void) -> opj::OPJ_OFF_T {
    let input = unsafe { &mut *(user as *mut ReadBuffer<'_>) };
    let target = (input.pos as i64 + nb_bytes as i64).clamp(0, input.data.len() as i64);
    let skipped = target - input.pos as i64;
    input.pos = target as usize;
    skipped as opj::OPJ_OFF_T
}

unsafe extern "C" fn read_seek_cb(pos: opj::OPJ_OFF_T, user: *mut c_void) -> opj::OPJ_BOOL {
    let input = unsafe { &mut *(user as *mut ReadBuffer<'_>) };
    if pos < 0 || pos as usize > input.data.len() {
        return 0;
    }
    input.pos = pos as usize;
    1
}

fn write_stream(buffer: &mut WriteBuffer) -> Result<Stream, String> {
    let raw = unsafe { opj::opj_stream_create(STREAM_CHUNK as _, 0) };
    if raw.is_null() {
        return Err("could not create output stream".into());
    }
    let stream = Stream(raw);
    unsafe {
        opj::opj_stream_set_write_function(stream.0, Some(write_cb));
        opj::opj_stream_set_skip_function(stream.0, Some(write_skip_cb));
        opj::opj_stream_set_seek_function(stream.0, Some(write_seek_cb));
        opj::opj_stream_set_user_data(stream.0, buffer as *mut WriteBuffer as *mut c_void, None);
    }
    Ok(stream)
}

fn read_stream(buffer: &mut ReadBuffer<'_>) -> Result<Stream, String> {
    let raw = unsafe { opj::opj_stream_create(STREAM_CHUNK as _, 1) };
    if raw.is_null() {
        return Err("could not create input stream".into());
    }
    let stream = Stream(raw);
    let len = buffer.data.len() as u64;
    unsafe {
        opj::opj_stream_set_read_function(stream.0, Some(read_cb));
        opj::opj_stream_set_skip_function(stream.0, Some(read_skip_cb));
        opj::opj_stream_set_seek_function(stream.0, Some(read_seek_cb));
        opj::opj_stream_set_user_data(stream.0, buffer as *mut ReadBuffer<'_> as *mut c_void, None);
        opj::opj_stream_set_user_data_length(stream.0, len as _);
    }
    Ok(stream)
}

// ============================================================================
// Encode
// ============================================================================

/// Planar component samples ready for OpenJPEG.
struct Planes {
    width: u32,
    height: u32,
    precision: u32,
    components: Vec<Vec<i32>>,
}

fn to_planes(img: &DynamicImage) -> Planes {
    let (width, height) = (img.width(), img.height());
    let (precision, components) = match img {
        DynamicImage::ImageLuma8(_) | DynamicImage::ImageLumaA8(_) => {
            let grey = img.to_luma8();
            (8, vec![grey.pixels().map(|p| p[0] as i32).collect()])
        }
        DynamicImage::ImageLuma16(_) | DynamicImage::ImageLumaA16(_) => {
            let grey = img.to_luma16();
            (16, vec![grey.pixels().map(|p| p[0] as i32).collect()])
        }
        DynamicImage::ImageRgb16(_) | DynamicImage::ImageRgba16(_) => {
            let rgb = img.to_rgb16();
            (16, split_rgb(rgb.pixels().map(|p| p.0.map(|v| v as i32))))
        }
        // Rgb8, Rgba8 (alpha dropped) and float images
        _ => {
            let rgb = img.to_rgb8();
            (8, split_rgb(rgb.pixels().map(|p| p.0.map(|v| v as i32))))
        }
    };
    Planes {
        width,
        height,
        precision,
        components,
    }
}

fn split_rgb(pixels: impl Iterator<Item = [i32; 3]>) -> Vec<Vec<i32>> {
    let mut planes = vec![Vec::new(), Vec::new(), Vec::new()];
    for px in pixels {
        for (plane, v) in planes.iter_mut().zip(px) {
            plane.push(v);
        }
    }
    planes
}

/// Largest resolution count the image can carry: 2^(n-1) <= min(w, h).
fn resolutions(width: u32, height: u32) -> i32 {
    let short = width.min(height);
    let mut n = 1;
    while n < MAX_RESOLUTIONS && (1u32 << n) <= short {
        n += 1;
    }
    n
}

/// Map quality 0.0..=1.0 to a compression ratio (0 means lossless).
fn compression_ratio(params: &Jpeg2000Params) -> f32 {
    if params.lossless {
        0.0
    } else {
        1.0 + (1.0 - params.quality) * (MAX_COMPRESSION_RATIO - 1.0)
    }
}

/// Encode `img` as JPEG 2000.
pub fn encode(
    img: &DynamicImage,
    params: &Jpeg2000Params,
    container: Container,
) -> Result<Vec<u8>, String> {
    let planes = to_planes(img);
    let ncomps = planes.components.len() as u32;
    if planes.width == 0 || planes.height == 0 {
        return Err("empty image".into());
    }

    let mut cparams: Vec<opj::opj_image_cmptparm_t> = (0..ncomps)
        .map(|_| {
            let mut c: opj::opj_image_cmptparm_t = unsafe { std::mem::zeroed() };
            c.dx = 1;
            c.dy = 1;
            c.w = planes.width;
            c.h = planes.height;
            c.prec = planes.precision;
            c.sgnd = 0;
            c
        })
        .collect();
    let color_space = if ncomps == 3 {
        opj::COLOR_SPACE::OPJ_CLRSPC_SRGB
    } else {
        opj::COLOR_SPACE::OPJ_CLRSPC_GRAY
    };

    let image = Image(unsafe { opj::opj_image_create(ncomps, cparams.as_mut_ptr(), color_space) });
    if image.0.is_null() {
        return Err("could not allocate image".into());
    }
    unsafe {
        let raw = &mut *image.0;
        raw.x0 = 0;
        raw.y0 = 0;
        raw.x1 = planes.width;
        raw.y1 = planes.height;
        for (i, samples) in planes.components.iter().enumerate() {
            let comp = &mut *raw.comps.add(i);
            ptr::copy_nonoverlapping(samples.as_ptr(), comp.data, samples.len());
        }
    }

    let mut eparams: opj::opj_cparameters_t = unsafe { std::mem::zeroed() };
    unsafe { opj::opj_set_default_encoder_parameters(&mut eparams) };
    eparams.tcp_numlayers = 1;
    eparams.tcp_rates[0] = compression_ratio(params);
    eparams.cp_disto_alloc = 1;
    eparams.irreversible = if params.lossless { 0 } else { 1 };
    eparams.numresolution = resolutions(planes.width, planes.height);
    eparams.tcp_mct = if ncomps == 3 { 1 } else { 0 };

    let format = match container {
        Container::Jp2 => opj::CODEC_FORMAT::OPJ_CODEC_JP2,
        Container::Codestream => opj::CODEC_FORMAT::OPJ_CODEC_J2K,
    };
    let raw_codec = unsafe { opj::opj_create_compress(format) };
    if raw_codec.is_null() {
        return Err("could not create encoder".into());
    }
    let codec = Codec(raw_codec);
    install_handlers(&codec);

    if unsafe { opj::opj_setup_encoder(codec.0, &mut eparams, image.0) } == 0 {
        return Err("encoder setup failed".into());
    }

    let mut buffer = WriteBuffer {
        data: Vec::new(),
        pos: 0,
    };
    {
        let stream = write_stream(&mut buffer)?;
        unsafe {
            if opj::opj_start_compress(codec.0, image.0, stream.0) == 0 {
                return Err("start_compress failed".into());
            }
            if opj::opj_encode(codec.0, stream.0) == 0 {
                return Err("encode failed".into());
            }
            if opj::opj_end_compress(codec.0, stream.0) == 0 {
                return Err("end_compress failed".into());
            }
        }
        // Stream flushes into `buffer` when dropped here.
    }
    Ok(buffer.data)
}

// ============================================================================
// Decode
// ============================================================================

fn is_jp2_file(bytes: &[u8]) -> bool {
    bytes.len() >= 12 && &bytes[4..8] == b"jP  "
}

/// Decode a JP2 file or J2K codestream.
pub fn decode(bytes: &[u8]) -> Result<DynamicImage, String> {
    let format = if is_jp2_file(bytes) {
        opj::CODEC_FORMAT::OPJ_CODEC_JP2
    } else if bytes.starts_with(&[0xFF, 0x4F, 0xFF, 0x51]) {
        opj::CODEC_FORMAT::OPJ_CODEC_J2K
    } else {
        return Err("not a JPEG 2000 stream".into());
    };

    let raw_codec = unsafe { opj::opj_create_decompress(format) };
    if raw_codec.is_null() {
        return Err("could not create decoder".into());
    }
    let codec = Codec(raw_codec);
    install_handlers(&codec);

    let mut dparams: opj::opj_dparameters_t = unsafe { std::mem::zeroed() };
    unsafe { opj::opj_set_default_decoder_parameters(&mut dparams) };
    if unsafe { opj::opj_setup_decoder(codec.0, &mut dparams) } == 0 {
        return Err("decoder setup failed".into());
    }

    let mut input = ReadBuffer {
        data: bytes,
        pos: 0,
    };
    let stream = read_stream(&mut input)?;
    let mut image = Image(ptr::null_mut());
    unsafe {
        if opj::opj_read_header(stream.0, codec.0, &mut image.0) == 0 || image.0.is_null() {
            return Err("could not read header".into());
        }
        if opj::opj_decode(codec.0, stream.0, image.0) == 0 {
            return Err("decode failed".into());
        }
        if opj::opj_end_decompress(codec.0, stream.0) == 0 {
            return Err("end_decompress failed".into());
        }
    }
    let result = unsafe { image_from_opj(&*image.0) };
    drop(stream);
    result
}

/// Copy decoded components into an `image` buffer.
///
/// # Safety
/// `raw` must be a fully decoded image whose component data pointers are valid.
unsafe fn image_from_opj(raw: &opj::opj_image_t) -> Result<DynamicImage, String> {
    if raw.numcomps == 0 || raw.comps.is_null() {
        return Err("image has no components".into());
    }
    let comps = unsafe { std::slice::from_raw_parts(raw.comps, raw.numcomps as usize) };
    let (w, h, prec) = (comps[0].w, comps[0].h, comps[0].prec);
    let used = if comps.len() >= 3 { 3 } else { 1 };
    for c in &comps[..used] {
        if c.w != w || c.h != h || c.data.is_null() || c.prec != prec {
            return Err("subsampled or mixed-precision components are not supported".into());
        }
    }
    if prec == 0 || prec > 16 {
        return Err(format!("unsupported precision {prec}"));
    }
    let n = (w as usize) * (h as usize);
    let planes: Vec<&[i32]> = comps[..used]
        .iter()
        .map(|c| unsafe { std::slice::from_raw_parts(c.data, n) })
        .collect();
    let offsets: Vec<i32> = comps[..used]
        .iter()
        .map(|c| if c.sgnd != 0 { 1 << (prec - 1) } else { 0 })
        .collect();
    let max = (1i32 << prec) - 1;
    let sample = |c: usize, i: usize| (planes[c][i] + offsets[c]).clamp(0, max) as u32;
    let idx = |x: u32, y: u32| y as usize * w as usize + x as usize;

    let img = if prec <= 8 {
        let scale = |v: u32| ((v * 255 + max as u32 / 2) / max as u32) as u8;
        if used == 3 {
            DynamicImage::ImageRgb8(RgbImage::from_fn(w, h, |x, y| {
                let i = idx(x, y);
                Rgb([scale(sample(0, i)), scale(sample(1, i)), scale(sample(2, i))])
            }))
        } else {
            DynamicImage::ImageLuma8(GrayImage::from_fn(w, h, |x, y| {
                Luma([scale(sample(0, idx(x, y)))])
            }))
        }
    } else {
        let shift = 16 - prec;
        let widen = |v: u32| (v << shift) as u16;
        if used == 3 {
            DynamicImage::ImageRgb16(ImageBuffer::from_fn(w, h, |x, y| {
                let i = idx(x, y);
                Rgb([widen(sample(0, i)), widen(sample(1, i)), widen(sample(2, i))])
            }))
        } else {
            DynamicImage::ImageLuma16(ImageBuffer::from_fn(w, h, |x, y| {
                Luma([widen(sample(0, idx(x, y)))])
            }))
        }
    };
    Ok(img)
}

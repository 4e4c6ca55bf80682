// 画像XObjectのデコード（ピクセルバッファ化）と、エンコード結果からのストリーム再構築

use std::io::Read;

use flate2::read::ZlibDecoder;
use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use lopdf::{Dictionary, Document, Object, Stream, dictionary};

use crate::error::RecompressError;
use crate::raster::encoder::{EncodedOutput, OutputCodec};
use crate::raster::{CanonicalImage, PixelFormat, RawImageBuffer};

/// 画像XObjectのメタデータ
#[derive(Debug, Clone)]
pub struct ImageMeta {
    pub width: u32,
    pub height: u32,
    pub bits_per_component: u8,
    /// 正規化済み色空間名 (DeviceGray / DeviceRGB / DeviceCMYK / その他はそのまま)
    pub color_space: String,
    pub filters: Vec<String>,
    pub image_mask: bool,
}

impl ImageMeta {
    /// 1ピクセルあたりの成分数。未知の色空間は `None`。
    pub fn components(&self) -> Option<u32> {
        match self.color_space.as_str() {
            "DeviceGray" => Some(1),
            "DeviceRGB" => Some(3),
            "DeviceCMYK" => Some(4),
            _ => None,
        }
    }

    pub fn bits_per_pixel(&self) -> u32 {
        self.components().unwrap_or(1) * self.bits_per_component as u32
    }
}

/// ストリーム辞書の `/Filter` をフィルタ名の列として返す。
pub fn filter_chain(dict: &Dictionary) -> Vec<String> {
    match dict.get(b"Filter") {
        Ok(Object::Name(name)) => vec![String::from_utf8_lossy(name).into_owned()],
        Ok(Object::Array(arr)) => arr
            .iter()
            .filter_map(|obj| obj.as_name().ok())
            .map(|name| String::from_utf8_lossy(name).into_owned())
            .collect(),
        _ => Vec::new(),
    }
}

/// 画像XObjectのストリームから画像メタデータを読み取る。
pub fn read_image_meta(doc: &Document, stream: &Stream) -> crate::error::Result<ImageMeta> {
    let dict = &stream.dict;

    let width = dict_get_u32(dict, b"Width")?;
    let height = dict_get_u32(dict, b"Height")?;
    let image_mask = matches!(dict.get(b"ImageMask"), Ok(Object::Boolean(true)));
    // BitsPerComponent: missing keyの場合のみデフォルト8、型エラーは伝播
    let bits_per_component = match dict.get(b"BitsPerComponent") {
        Ok(_) => {
            let bpc = dict_get_u32(dict, b"BitsPerComponent")?;
            u8::try_from(bpc).map_err(|_| {
                RecompressError::unsupported_format(format!("BitsPerComponent {bpc}"))
            })?
        }
        Err(_) if image_mask => 1,
        Err(_) => 8,
    };

    let color_space = match dict.get(b"ColorSpace") {
        Ok(obj) => color_space_name(doc, obj),
        Err(_) if image_mask => "DeviceGray".to_string(),
        Err(_) => "DeviceRGB".to_string(),
    };

    Ok(ImageMeta {
        width,
        height,
        bits_per_component,
        color_space,
        filters: filter_chain(dict),
        image_mask,
    })
}

/// 色空間オブジェクトを名前に正規化する。ICCBasedは `/N` から推定する。
fn color_space_name(doc: &Document, obj: &Object) -> String {
    let resolved = match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        other => other,
    };

    match resolved {
        Object::Name(name) => String::from_utf8_lossy(name).into_owned(),
        Object::Array(arr) => {
            let family = arr
                .first()
                .and_then(|o| o.as_name().ok())
                .map(|n| String::from_utf8_lossy(n).into_owned())
                .unwrap_or_default();
            if family != "ICCBased" {
                return family;
            }
            let n = arr
                .get(1)
                .and_then(|o| o.as_reference().ok())
                .and_then(|id| doc.get_object(id).ok())
                .and_then(|o| o.as_stream().ok())
                .and_then(|s| s.dict.get(b"N").ok())
                .and_then(|n| n.as_i64().ok());
            match n {
                Some(1) => "DeviceGray".to_string(),
                Some(3) => "DeviceRGB".to_string(),
                Some(4) => "DeviceCMYK".to_string(),
                _ => family,
            }
        }
        _ => "DeviceRGB".to_string(),
    }
}

/// 辞書からu32値を取得するヘルパー（負の値はエラー）
fn dict_get_u32(dict: &Dictionary, key: &[u8]) -> crate::error::Result<u32> {
    match dict.get(key) {
        Ok(Object::Integer(i)) => u32::try_from(*i).map_err(|_| {
            RecompressError::backend(format!(
                "Value out of u32 range for {:?}: {}",
                String::from_utf8_lossy(key),
                i
            ))
        }),
        Ok(Object::Real(f)) if *f >= 0.0 && *f <= u32::MAX as f32 => Ok(*f as u32),
        Ok(other) => Err(RecompressError::backend(format!(
            "Expected integer for {:?}, got {:?}",
            String::from_utf8_lossy(key),
            other
        ))),
        Err(_) => Err(RecompressError::backend(format!(
            "Missing required key: {:?}",
            String::from_utf8_lossy(key),
        ))),
    }
}

/// 画像XObjectのストリームデータをデコードしてDynamicImage(Luma8/Rgb8)に変換する。
///
/// 対応フィルタ:
/// - DCTDecode (JPEG, チェーン末尾のみ)
/// - FlateDecode (PNG predictor対応)
/// - 非圧縮 (raw pixels)
pub fn decode_image_stream(
    stream: &Stream,
    meta: &ImageMeta,
) -> crate::error::Result<DynamicImage> {
    if meta.image_mask {
        return Err(RecompressError::unsupported_format(
            "stencil image mask has no colour data",
        ));
    }
    if meta.width == 0 || meta.height == 0 {
        return Err(RecompressError::unsupported_format(format!(
            "empty image geometry {}x{}",
            meta.width, meta.height
        )));
    }

    let mut data = stream.content.clone();

    for (i, filter) in meta.filters.iter().enumerate() {
        match filter.as_str() {
            "FlateDecode" | "Fl" => {
                data = inflate(&data)?;
                if let Some(params) = decode_parms(&stream.dict, i) {
                    data = apply_predictor(data, &params, meta)?;
                }
            }
            "DCTDecode" | "DCT" if i + 1 == meta.filters.len() => {
                let img = image::load_from_memory_with_format(&data, ImageFormat::Jpeg)
                    .map_err(|e| RecompressError::backend(format!("JPEG decode error: {e}")))?;
                return Ok(match img {
                    DynamicImage::ImageLuma8(_) => img,
                    other => DynamicImage::ImageRgb8(other.to_rgb8()),
                });
            }
            other => {
                return Err(RecompressError::unsupported_format(format!(
                    "cannot decode image filter {other}"
                )));
            }
        }
    }

    decode_raw(&data, meta)
}

/// FlateDecode (zlib) の展開
fn inflate(data: &[u8]) -> crate::error::Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| RecompressError::backend(format!("FlateDecode error: {e}")))?;
    Ok(decompressed)
}

#[derive(Debug, Clone, Copy)]
struct PredictorParams {
    predictor: i64,
    colors: usize,
    bits_per_component: usize,
    columns: usize,
}

/// i番目のフィルタに対応する `/DecodeParms` を取り出す。
fn decode_parms(dict: &Dictionary, index: usize) -> Option<PredictorParams> {
    let parms = match dict.get(b"DecodeParms").ok()? {
        Object::Dictionary(d) => d,
        Object::Array(arr) => arr.get(index)?.as_dict().ok()?,
        _ => return None,
    };
    let get = |key: &[u8], default: i64| {
        parms
            .get(key)
            .ok()
            .and_then(|o| o.as_i64().ok())
            .unwrap_or(default)
    };
    let predictor = get(b"Predictor", 1);
    if predictor <= 1 {
        return None;
    }
    Some(PredictorParams {
        predictor,
        colors: get(b"Colors", 1).max(1) as usize,
        bits_per_component: get(b"BitsPerComponent", 8).max(1) as usize,
        columns: get(b"Columns", 1).max(1) as usize,
    })
}

/// PNG predictor (10-15) を逆変換する。TIFF predictor 2 は未対応。
fn apply_predictor(
    data: Vec<u8>,
    params: &PredictorParams,
    meta: &ImageMeta,
) -> crate::error::Result<Vec<u8>> {
    if params.predictor < 10 {
        return Err(RecompressError::unsupported_format(format!(
            "predictor {} on image {}x{}",
            params.predictor, meta.width, meta.height
        )));
    }

    let bpp = (params.colors * params.bits_per_component).div_ceil(8).max(1);
    let row_len = (params.colors * params.bits_per_component * params.columns).div_ceil(8);
    let mut out = Vec::with_capacity(data.len());
    let mut prev = vec![0u8; row_len];

    for chunk in data.chunks(row_len + 1) {
        if chunk.len() < row_len + 1 {
            break;
        }
        let filter_type = chunk[0];
        let mut row = chunk[1..].to_vec();
        unfilter_row(filter_type, &mut row, &prev, bpp);
        out.extend_from_slice(&row);
        prev = row;
    }

    Ok(out)
}

fn unfilter_row(filter_type: u8, row: &mut [u8], prev: &[u8], bpp: usize) {
    let len = row.len();
    match filter_type {
        1 => {
            for i in bpp..len {
                row[i] = row[i].wrapping_add(row[i - bpp]);
            }
        }
        2 => {
            for i in 0..len {
                row[i] = row[i].wrapping_add(prev[i]);
            }
        }
        3 => {
            for i in 0..len {
                let a = if i >= bpp { row[i - bpp] as u16 } else { 0 };
                let b = prev[i] as u16;
                row[i] = row[i].wrapping_add(((a + b) / 2) as u8);
            }
        }
        4 => {
            for i in 0..len {
                let a = if i >= bpp { row[i - bpp] } else { 0 };
                let b = prev[i];
                let c = if i >= bpp { prev[i - bpp] } else { 0 };
                row[i] = row[i].wrapping_add(paeth(a, b, c));
            }
        }
        _ => {}
    }
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let (a, b, c) = (a as i16, b as i16, c as i16);
    let p = a + b - c;
    let pa = (p - a).abs();
    let pb = (p - b).abs();
    let pc = (p - c).abs();
    if pa <= pb && pa <= pc {
        a as u8
    } else if pb <= pc {
        b as u8
    } else {
        c as u8
    }
}

/// Raw pixelデータからDynamicImageを構築
fn decode_raw(data: &[u8], meta: &ImageMeta) -> crate::error::Result<DynamicImage> {
    let w = meta.width;
    let h = meta.height;
    let pixels = w as usize * h as usize;

    let too_short = |expected: usize| {
        RecompressError::backend(format!(
            "{} data too short: expected {}, got {}",
            meta.color_space,
            expected,
            data.len()
        ))
    };

    match (meta.color_space.as_str(), meta.bits_per_component) {
        ("DeviceRGB", 8) => {
            let expected = pixels * 3;
            let raw = data.get(..expected).ok_or_else(|| too_short(expected))?;
            RgbImage::from_raw(w, h, raw.to_vec())
                .map(DynamicImage::ImageRgb8)
                .ok_or_else(|| RecompressError::backend("Failed to create RGB image"))
        }
        ("DeviceGray", 8) => {
            let expected = pixels;
            let raw = data.get(..expected).ok_or_else(|| too_short(expected))?;
            GrayImage::from_raw(w, h, raw.to_vec())
                .map(DynamicImage::ImageLuma8)
                .ok_or_else(|| RecompressError::backend("Failed to create Gray image"))
        }
        ("DeviceGray", 1) => {
            let row_bytes = (w as usize).div_ceil(8);
            let expected = row_bytes * h as usize;
            let raw = data.get(..expected).ok_or_else(|| too_short(expected))?;
            let gray = GrayImage::from_fn(w, h, |x, y| {
                let byte = raw[y as usize * row_bytes + x as usize / 8];
                let bit = (byte >> (7 - (x % 8))) & 1;
                image::Luma([if bit == 1 { 255 } else { 0 }])
            });
            Ok(DynamicImage::ImageLuma8(gray))
        }
        ("DeviceCMYK", 8) => {
            let expected = pixels * 4;
            let raw = data.get(..expected).ok_or_else(|| too_short(expected))?;
            let rgb: Vec<u8> = raw
                .chunks_exact(4)
                .flat_map(|px| {
                    let k = 255 - px[3] as u32;
                    [
                        ((255 - px[0] as u32) * k / 255) as u8,
                        ((255 - px[1] as u32) * k / 255) as u8,
                        ((255 - px[2] as u32) * k / 255) as u8,
                    ]
                })
                .collect();
            RgbImage::from_raw(w, h, rgb)
                .map(DynamicImage::ImageRgb8)
                .ok_or_else(|| RecompressError::backend("Failed to create RGB image from CMYK"))
        }
        (cs, bpc) => Err(RecompressError::unsupported_format(format!(
            "color space / BPC combination: {cs} / {bpc}"
        ))),
    }
}

/// `/SMask` をデコードして画像サイズのアルファプレーンとして返す。
pub fn decode_smask(
    doc: &Document,
    stream: &Stream,
    width: u32,
    height: u32,
) -> crate::error::Result<Option<GrayImage>> {
    let smask = match stream.dict.get(b"SMask") {
        Ok(Object::Reference(id)) => doc.get_object(*id)?.as_stream()?,
        Ok(Object::Stream(s)) => s,
        _ => return Ok(None),
    };

    let mut meta = read_image_meta(doc, smask)?;
    meta.color_space = "DeviceGray".to_string();
    let alpha = decode_image_stream(smask, &meta)?.to_luma8();

    if alpha.dimensions() == (width, height) {
        Ok(Some(alpha))
    } else {
        Ok(Some(image::imageops::resize(
            &alpha,
            width,
            height,
            image::imageops::FilterType::Triangle,
        )))
    }
}

/// 4バイト境界に揃えた行バイト数
pub fn aligned_stride(row_bytes: usize) -> usize {
    row_bytes.div_ceil(4) * 4
}

/// デコード済み画像をパディング付きのGray8/BGR24バッファに詰める。
pub fn to_direct_buffer(img: &DynamicImage) -> RawImageBuffer {
    match img {
        DynamicImage::ImageLuma8(gray) => {
            let (w, h) = gray.dimensions();
            let stride = aligned_stride(w as usize);
            let mut data = vec![0u8; stride * h as usize];
            for (y, row) in gray.as_raw().chunks_exact(w as usize).enumerate() {
                data[y * stride..y * stride + w as usize].copy_from_slice(row);
            }
            RawImageBuffer {
                data,
                width: w,
                height: h,
                stride,
                format: PixelFormat::Gray8,
                source_filter: None,
            }
        }
        other => {
            let rgb = other.to_rgb8();
            let (w, h) = rgb.dimensions();
            let stride = aligned_stride(w as usize * 3);
            let mut data = vec![0u8; stride * h as usize];
            for (y, row) in rgb.as_raw().chunks_exact(w as usize * 3).enumerate() {
                let dst = &mut data[y * stride..y * stride + w as usize * 3];
                for (d, s) in dst.chunks_exact_mut(3).zip(row.chunks_exact(3)) {
                    d.copy_from_slice(&[s[2], s[1], s[0]]);
                }
            }
            RawImageBuffer {
                data,
                width: w,
                height: h,
                stride,
                format: PixelFormat::Bgr24,
                source_filter: None,
            }
        }
    }
}

/// 画像とアルファプレーンを合成してBGRA32バッファを作る。
pub fn to_rendered_buffer(img: &DynamicImage, alpha: Option<&GrayImage>) -> RawImageBuffer {
    let rgb = img.to_rgb8();
    let (w, h) = rgb.dimensions();
    let mut data = Vec::with_capacity(w as usize * h as usize * 4);
    for (i, px) in rgb.as_raw().chunks_exact(3).enumerate() {
        let a = alpha.map_or(255, |m| m.as_raw()[i]);
        data.extend_from_slice(&[px[2], px[1], px[0], a]);
    }
    RawImageBuffer::packed(data, w, h, PixelFormat::Bgra32)
}

/// zlibで圧縮
pub fn flate_encode(data: &[u8]) -> crate::error::Result<Vec<u8>> {
    use flate2::Compression;
    use flate2::write::ZlibEncoder;
    use std::io::Write;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| RecompressError::backend(format!("Flate encode error: {e}")))?;
    encoder
        .finish()
        .map_err(|e| RecompressError::backend(format!("Flate encode error: {e}")))
}

/// 置換用の画像ストリームと、必要ならSMaskストリームを組み立てる。
///
/// - Lossy: JPEGデータをそのまま `DCTDecode` で格納
/// - Lossless: PNGを展開し、色成分を `FlateDecode`、アルファを別SMaskに分離
pub fn build_image_streams(
    encoded: &EncodedOutput,
) -> crate::error::Result<(Stream, Option<Stream>)> {
    match encoded.codec {
        OutputCodec::Lossy => {
            let color_space = if encoded.grayscale {
                "DeviceGray"
            } else {
                "DeviceRGB"
            };
            let dict = image_dict(encoded.width, encoded.height, color_space, "DCTDecode");
            Ok((Stream::new(dict, encoded.data.clone()), None))
        }
        OutputCodec::Lossless => {
            let decoded = image::load_from_memory_with_format(&encoded.data, ImageFormat::Png)?;
            let (color, color_space) = if decoded.color().has_color() {
                (decoded.to_rgb8().into_raw(), "DeviceRGB")
            } else {
                (decoded.to_luma8().into_raw(), "DeviceGray")
            };
            let dict = image_dict(encoded.width, encoded.height, color_space, "FlateDecode");
            let stream = Stream::new(dict, flate_encode(&color)?);

            let smask = if decoded.color().has_alpha() {
                let alpha: Vec<u8> = decoded
                    .to_rgba8()
                    .as_raw()
                    .chunks_exact(4)
                    .map(|px| px[3])
                    .collect();
                let dict = image_dict(encoded.width, encoded.height, "DeviceGray", "FlateDecode");
                Some(Stream::new(dict, flate_encode(&alpha)?))
            } else {
                None
            };
            Ok((stream, smask))
        }
    }
}

/// CanonicalImage からFlate画像ストリーム（透明ならSMask付き）を作る。
pub fn canonical_to_streams(img: &CanonicalImage) -> crate::error::Result<(Stream, Option<Stream>)> {
    let raw = img.pixels().as_raw();
    let rgb: Vec<u8> = raw
        .chunks_exact(4)
        .flat_map(|px| [px[0], px[1], px[2]])
        .collect();
    let dict = image_dict(img.width(), img.height(), "DeviceRGB", "FlateDecode");
    let stream = Stream::new(dict, flate_encode(&rgb)?);

    let smask = if img.has_transparency() {
        let alpha: Vec<u8> = raw.chunks_exact(4).map(|px| px[3]).collect();
        let dict = image_dict(img.width(), img.height(), "DeviceGray", "FlateDecode");
        Some(Stream::new(dict, flate_encode(&alpha)?))
    } else {
        None
    };
    Ok((stream, smask))
}

fn image_dict(width: u32, height: u32, color_space: &str, filter: &str) -> Dictionary {
    dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => width as i64,
        "Height" => height as i64,
        "ColorSpace" => color_space,
        "BitsPerComponent" => 8,
        "Filter" => filter,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(color_space: &str, bpc: u8, w: u32, h: u32) -> ImageMeta {
        ImageMeta {
            width: w,
            height: h,
            bits_per_component: bpc,
            color_space: color_space.to_string(),
            filters: Vec::new(),
            image_mask: false,
        }
    }

    #[test]
    fn test_filter_chain_array() {
        let dict = dictionary! {
            "Filter" => vec![Object::Name(b"FlateDecode".to_vec()), Object::Name(b"DCTDecode".to_vec())],
        };
        assert_eq!(filter_chain(&dict), vec!["FlateDecode", "DCTDecode"]);
        assert!(filter_chain(&Dictionary::new()).is_empty());
    }

    #[test]
    fn test_decode_raw_one_bit_gray() {
        // 0b1010_0000 -> white, black, white, black
        let img = decode_raw(&[0b1010_0000], &meta("DeviceGray", 1, 4, 1)).unwrap();
        let gray = img.to_luma8();
        assert_eq!(gray.as_raw(), &vec![255, 0, 255, 0]);
    }

    #[test]
    fn test_decode_raw_cmyk_to_rgb() {
        let img = decode_raw(&[0, 0, 0, 0, 255, 0, 0, 0], &meta("DeviceCMYK", 8, 2, 1)).unwrap();
        let rgb = img.to_rgb8();
        assert_eq!(rgb.as_raw(), &vec![255, 255, 255, 0, 255, 255]);
    }

    #[test]
    fn test_png_up_predictor() {
        let params = PredictorParams {
            predictor: 12,
            colors: 1,
            bits_per_component: 8,
            columns: 3,
        };
        // Row 0: None [1,2,3]; row 1: Up [1,1,1] -> [2,3,4]
        let data = vec![0, 1, 2, 3, 2, 1, 1, 1];
        let out = apply_predictor(data, &params, &meta("DeviceGray", 8, 3, 2)).unwrap();
        assert_eq!(out, vec![1, 2, 3, 2, 3, 4]);
    }

    #[test]
    fn test_direct_buffer_pads_rows_to_four_bytes() {
        let rgb = RgbImage::from_raw(3, 2, (0..18).collect()).unwrap();
        let buf = to_direct_buffer(&DynamicImage::ImageRgb8(rgb));
        assert_eq!(buf.format, PixelFormat::Bgr24);
        assert_eq!(buf.stride, 12);
        assert_eq!(buf.data.len(), 24);
        // second row, first pixel: RGB (9,10,11) stored as BGR
        assert_eq!(&buf.data[12..15], &[11, 10, 9]);
    }
}

// Test PDF builders shared by the integration tests.
//
// All test PDFs are generated with lopdf at test time (no committed fixtures).

#![allow(dead_code)]

use std::io::Write;
use std::path::Path;

use flate2::Compression;
use flate2::write::ZlibEncoder;
use lopdf::{Document, Object, Stream, dictionary};

/// How the test image is stored in the PDF.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Storage {
    /// FlateDecode DeviceRGB.
    Flate,
    /// FlateDecode DeviceRGB with a FlateDecode soft mask whose left half
    /// is transparent.
    FlateWithSmask,
    /// DCTDecode DeviceRGB.
    Dct,
    /// Arbitrary bytes tagged with the given filter.
    Opaque(&'static str),
    /// No filter; raw pixels zero-padded to at least 2000 bytes.
    Unfiltered,
}

#[derive(Debug, Clone, Copy)]
pub struct TestImage {
    pub width: u32,
    pub height: u32,
    pub storage: Storage,
    /// Displayed width and height in points.
    pub display: (f64, f64),
}

impl TestImage {
    pub fn new(width: u32, height: u32, storage: Storage) -> Self {
        TestImage {
            width,
            height,
            storage,
            display: (300.0, 300.0),
        }
    }

    pub fn displayed(mut self, w: f64, h: f64) -> Self {
        self.display = (w, h);
        self
    }
}

/// Deterministic pseudo-random bytes; does not compress.
pub fn noise(len: usize, seed: u32) -> Vec<u8> {
    let mut state = seed.wrapping_mul(2_654_435_761).wrapping_add(1);
    (0..len)
        .map(|_| {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            (state >> 16) as u8
        })
        .collect()
}

pub fn zlib(data: &[u8]) -> Vec<u8> {
    let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
    enc.write_all(data).expect("zlib write");
    enc.finish().expect("zlib finish")
}

pub fn jpeg(width: u32, height: u32, seed: u32) -> Vec<u8> {
    let rgb = image::RgbImage::from_raw(width, height, noise((width * height * 3) as usize, seed))
        .expect("buffer size");
    let mut out = Vec::new();
    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, 95)
        .encode_image(&rgb)
        .expect("jpeg encode");
    out
}

fn image_stream(doc: &mut Document, img: &TestImage, seed: u32) -> Stream {
    let pixels = noise((img.width * img.height * 3) as usize, seed);
    let mut dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => Object::Integer(img.width as i64),
        "Height" => Object::Integer(img.height as i64),
        "ColorSpace" => "DeviceRGB",
        "BitsPerComponent" => Object::Integer(8),
    };

    let content = match img.storage {
        Storage::Flate => {
            dict.set("Filter", "FlateDecode");
            zlib(&pixels)
        }
        Storage::FlateWithSmask => {
            dict.set("Filter", "FlateDecode");
            let alpha: Vec<u8> = (0..img.height)
                .flat_map(|_| (0..img.width).map(move |x| if x < img.width / 2 { 0 } else { 255 }))
                .collect();
            let smask = Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => Object::Integer(img.width as i64),
                    "Height" => Object::Integer(img.height as i64),
                    "ColorSpace" => "DeviceGray",
                    "BitsPerComponent" => Object::Integer(8),
                    "Filter" => "FlateDecode",
                },
                zlib(&alpha),
            );
            let smask_id = doc.add_object(smask);
            dict.set("SMask", Object::Reference(smask_id));
            zlib(&pixels)
        }
        Storage::Dct => {
            dict.set("Filter", "DCTDecode");
            jpeg(img.width, img.height, seed)
        }
        Storage::Opaque(filter) => {
            dict.set("Filter", filter);
            noise(4000, seed)
        }
        Storage::Unfiltered => {
            let mut raw = pixels;
            raw.resize(raw.len().max(2000), 0);
            raw
        }
    };

    Stream::new(dict, content).with_compression(false)
}

/// Build a PDF of 612x792 pages, each drawing its images with `cm` + `Do`.
pub fn build_pdf(path: &Path, pages: &[Vec<TestImage>]) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids: Vec<Object> = Vec::new();
    let mut seed = 1;

    for images in pages {
        let mut xobjects = lopdf::Dictionary::new();
        let mut content = String::new();
        for (i, img) in images.iter().enumerate() {
            let stream = image_stream(&mut doc, img, seed);
            seed += 1;
            let id = doc.add_object(stream);
            let name = format!("Im{}", i + 1);
            xobjects.set(name.as_str(), Object::Reference(id));
            content.push_str(&format!(
                "q {} 0 0 {} 50 {} cm /{name} Do Q\n",
                img.display.0,
                img.display.1,
                50 + i * 10
            ));
        }

        let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(612),
                Object::Integer(792),
            ],
            "Contents" => content_id,
            "Resources" => dictionary! { "XObject" => xobjects },
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => Object::Integer(count),
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    doc.save(path).expect("failed to save test PDF");
}

/// The `Im1` image stream on `page` of the PDF at `path`.
pub fn first_image_stream(path: &Path, page: u32) -> Stream {
    let doc = Document::load(path).expect("load output");
    let page_id = doc.get_pages()[&page];
    let (resources, _) = doc.get_page_resources(page_id).expect("resources");
    let xobjects = resources
        .expect("inline resources")
        .get(b"XObject")
        .and_then(Object::as_dict)
        .expect("XObject dict");
    let id = xobjects
        .get(b"Im1")
        .and_then(Object::as_reference)
        .expect("Im1 reference");
    doc.get_object(id)
        .and_then(Object::as_stream)
        .expect("image stream")
        .clone()
}

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::Path;

use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use tracing::{debug, warn};

use crate::backend::DocumentBackend;
use crate::compositor::PlacementMatrix;
use crate::decision::{ExtractionMode, ImageMetadata};
use crate::error::RecompressError;
use crate::pdf::content_stream::{POINTS_PER_INCH, extract_xobject_placements, placement_content};
use crate::pdf::image_xobject::{self, ImageMeta};
use crate::raster::encoder::EncodedOutput;
use crate::raster::{CanonicalImage, RawImageBuffer};

/// 画像XObjectへの参照。
///
/// 等価性・ハッシュはオブジェクトIDのみで判定する（同じ画像を複数ページで
/// 共有している場合も同一とみなす）。
#[derive(Debug, Clone)]
pub struct ImageObjectRef {
    /// 最初に見つかったページ(1-indexed)。新規作成オブジェクトは0。
    pub page: u32,
    /// リソース辞書上の名前 (e.g. "Im1")
    pub name: String,
    pub id: ObjectId,
}

impl PartialEq for ImageObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ImageObjectRef {}

impl Hash for ImageObjectRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for ImageObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}/{} ({} {} R)", self.page, self.name, self.id.0, self.id.1)
    }
}

/// lopdf上に実装したドキュメントバックエンド。
pub struct LopdfBackend {
    doc: Document,
    placements: HashMap<ObjectId, PlacementMatrix>,
    wrapped_pages: HashSet<ObjectId>,
}

impl LopdfBackend {
    /// PDFファイルを開く。
    pub fn open(path: impl AsRef<Path>) -> crate::error::Result<Self> {
        let doc = Document::load(path)?;
        Ok(Self::from_document(doc))
    }

    pub fn from_document(doc: Document) -> Self {
        Self {
            doc,
            placements: HashMap::new(),
            wrapped_pages: HashSet::new(),
        }
    }

    /// 内部のlopdf Documentへの参照を返す。
    pub fn document(&self) -> &Document {
        &self.doc
    }

    /// 保存前の最適化を行い、バイト列として書き出す。
    pub fn save_to_bytes(&mut self) -> crate::error::Result<Vec<u8>> {
        crate::pdf::optimizer::optimize(&mut self.doc);
        let mut buf = Vec::new();
        self.doc
            .save_to(&mut buf)
            .map_err(|e| RecompressError::backend(format!("save PDF: {e}")))?;
        Ok(buf)
    }

    /// ページ番号(1-indexed)からObjectIdを取得する。
    fn page_id(&self, page: u32) -> crate::error::Result<ObjectId> {
        self.doc
            .get_pages()
            .get(&page)
            .copied()
            .ok_or_else(|| RecompressError::backend(format!("page {page} not found")))
    }

    fn image_stream(&self, image: &ImageObjectRef) -> crate::error::Result<&Stream> {
        Ok(self.doc.get_object(image.id)?.as_stream()?)
    }

    fn image_meta(&self, image: &ImageObjectRef) -> crate::error::Result<ImageMeta> {
        image_xobject::read_image_meta(&self.doc, self.image_stream(image)?)
    }

    /// 指定ページ辞書からMediaBoxを取得する（Parent経由の継承も考慮）。
    fn media_box(&self, dict: &Dictionary) -> crate::error::Result<Object> {
        if let Ok(obj) = dict.get(b"MediaBox") {
            return Ok(obj.clone());
        }

        if let Ok(Object::Reference(parent_id)) = dict.get(b"Parent") {
            let parent_dict = self.doc.get_dictionary(*parent_id)?;
            return self.media_box(parent_dict);
        }

        Err(RecompressError::backend("MediaBox not found"))
    }

    /// リソース辞書のXObjectエントリからSubtype=Imageの間接参照を列挙する。
    fn collect_image_xobjects(
        &self,
        dict: &Dictionary,
        out: &mut Vec<(String, ObjectId)>,
    ) -> crate::error::Result<()> {
        let xobject_dict = match dict.get(b"XObject") {
            Ok(Object::Dictionary(d)) => d,
            Ok(Object::Reference(id)) => self.doc.get_object(*id)?.as_dict()?,
            _ => return Ok(()),
        };

        for (name_bytes, value) in xobject_dict.iter() {
            // 直接埋め込みのストリームはIDを持たないため置換できない
            let Object::Reference(id) = value else {
                continue;
            };
            let Ok(stream) = self.doc.get_object(*id).and_then(Object::as_stream) else {
                continue;
            };
            if let Ok(subtype) = stream.dict.get(b"Subtype").and_then(Object::as_name)
                && subtype == b"Image"
            {
                out.push((String::from_utf8_lossy(name_bytes).into_owned(), *id));
            }
        }

        Ok(())
    }

    /// ページの描画位置から画像の解像度(DPI)を求める。配置が見つからなければ72。
    fn placement_dpi(&self, image: &ImageObjectRef, meta: &ImageMeta) -> (f64, f64) {
        let fallback = (POINTS_PER_INCH, POINTS_PER_INCH);
        if image.page == 0 {
            return fallback;
        }

        let content = match self
            .page_id(image.page)
            .and_then(|id| Ok(self.doc.get_page_content(id)?))
        {
            Ok(c) => c,
            Err(e) => {
                warn!(object = %image, error = %e, "cannot read page content, assuming 72 dpi");
                return fallback;
            }
        };

        let placements = match extract_xobject_placements(&content) {
            Ok(p) => p,
            Err(e) => {
                warn!(object = %image, error = %e, "cannot parse page content, assuming 72 dpi");
                return fallback;
            }
        };

        placements
            .iter()
            .find(|p| p.name == image.name)
            .and_then(|p| Some((p.horizontal_dpi(meta.width)?, p.vertical_dpi(meta.height)?)))
            .unwrap_or(fallback)
    }

    /// ページに独自の `/Resources` を持たせ、`/XObject` に名前を登録する。
    fn add_xobject_resource(
        &mut self,
        page_id: ObjectId,
        name: &str,
        xobject_id: ObjectId,
    ) -> crate::error::Result<()> {
        let resources = match self.doc.get_dictionary(page_id)?.get(b"Resources") {
            Ok(obj) => obj.clone(),
            Err(_) => {
                // 親から継承しているリソースを複製してページに直接持たせる
                let (_, inherited_ids) = self.doc.get_page_resources(page_id)?;
                let inherited = match inherited_ids.first() {
                    Some(id) => self.doc.get_dictionary(*id)?.clone(),
                    None => Dictionary::new(),
                };
                let obj = Object::Dictionary(inherited);
                self.doc
                    .get_dictionary_mut(page_id)?
                    .set("Resources", obj.clone());
                obj
            }
        };

        let res_dict = match &resources {
            Object::Reference(id) => self.doc.get_dictionary(*id)?.clone(),
            Object::Dictionary(d) => d.clone(),
            other => {
                return Err(RecompressError::backend(format!(
                    "unexpected /Resources object: {other:?}"
                )));
            }
        };

        if let Ok(Object::Reference(xo_id)) = res_dict.get(b"XObject") {
            self.doc
                .get_dictionary_mut(*xo_id)?
                .set(name, Object::Reference(xobject_id));
            return Ok(());
        }

        let mut xobjects = match res_dict.get(b"XObject") {
            Ok(Object::Dictionary(d)) => d.clone(),
            _ => Dictionary::new(),
        };
        xobjects.set(name, Object::Reference(xobject_id));

        match resources {
            Object::Reference(res_id) => {
                self.doc
                    .get_dictionary_mut(res_id)?
                    .set("XObject", Object::Dictionary(xobjects));
            }
            _ => {
                let page = self.doc.get_dictionary_mut(page_id)?;
                page.get_mut(b"Resources")?
                    .as_dict_mut()?
                    .set("XObject", Object::Dictionary(xobjects));
            }
        }
        Ok(())
    }

    /// ページの `/Contents` 末尾にストリームを追加する。
    ///
    /// 初回は既存コンテンツを `q` / `Q` で囲み、グラフィックス状態を分離する。
    fn append_page_content(&mut self, page_id: ObjectId, content: Vec<u8>) -> crate::error::Result<()> {
        let existing = self.doc.get_dictionary(page_id)?.get(b"Contents").ok().cloned();
        let mut contents: Vec<Object> = match existing {
            Some(Object::Reference(id)) => vec![Object::Reference(id)],
            Some(Object::Array(arr)) => arr,
            _ => Vec::new(),
        };

        if !contents.is_empty() && self.wrapped_pages.insert(page_id) {
            let open = self.doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
            let close = self.doc.add_object(Stream::new(Dictionary::new(), b"\nQ\n".to_vec()));
            contents.insert(0, Object::Reference(open));
            contents.push(Object::Reference(close));
        }

        let added = self.doc.add_object(Stream::new(Dictionary::new(), content));
        contents.push(Object::Reference(added));

        self.doc
            .get_dictionary_mut(page_id)?
            .set("Contents", Object::Array(contents));
        Ok(())
    }
}

impl DocumentBackend for LopdfBackend {
    type ImageRef = ImageObjectRef;

    fn page_count(&self) -> u32 {
        self.doc.get_pages().len() as u32
    }

    /// MediaBoxからページ寸法(width_pts, height_pts)を返す。
    fn page_size(&self, page: u32) -> crate::error::Result<(f64, f64)> {
        let page_dict = self.doc.get_dictionary(self.page_id(page)?)?;
        let media_box = self.media_box(page_dict)?;
        let media_box = media_box.as_array()?;
        if media_box.len() < 4 {
            return Err(RecompressError::backend("Invalid MediaBox"));
        }

        let coords = media_box[..4]
            .iter()
            .map(|obj| match obj {
                Object::Integer(i) => Ok(*i as f64),
                Object::Real(f) => Ok(*f as f64),
                _ => Err(RecompressError::backend("Invalid MediaBox value")),
            })
            .collect::<crate::error::Result<Vec<f64>>>()?;

        let width = (coords[2] - coords[0]).abs();
        let height = (coords[3] - coords[1]).abs();
        if width <= 0.0 || height <= 0.0 {
            return Err(RecompressError::backend(
                "Invalid MediaBox: non-positive page dimensions",
            ));
        }
        Ok((width, height))
    }

    fn image_objects(&self, page: u32) -> crate::error::Result<Vec<ImageObjectRef>> {
        let page_id = self.page_id(page)?;
        let (resource_dict, resource_ids) = self.doc.get_page_resources(page_id)?;

        let mut found = Vec::new();
        if let Some(dict) = resource_dict {
            self.collect_image_xobjects(dict, &mut found)?;
        }
        for res_id in resource_ids {
            let dict = self.doc.get_dictionary(res_id)?;
            self.collect_image_xobjects(dict, &mut found)?;
        }

        let mut seen = HashSet::new();
        Ok(found
            .into_iter()
            .filter(|(_, id)| seen.insert(*id))
            .map(|(name, id)| ImageObjectRef { page, name, id })
            .collect())
    }

    fn raw_pixel_buffer(
        &self,
        image: &ImageObjectRef,
        mode: ExtractionMode,
    ) -> crate::error::Result<RawImageBuffer> {
        let stream = self.image_stream(image)?;
        let meta = image_xobject::read_image_meta(&self.doc, stream)?;
        let decoded = image_xobject::decode_image_stream(stream, &meta)?;
        let filter = meta.filters.first().cloned();

        let buffer = match mode {
            ExtractionMode::Direct => image_xobject::to_direct_buffer(&decoded),
            ExtractionMode::Rendered => {
                let alpha =
                    image_xobject::decode_smask(&self.doc, stream, decoded.width(), decoded.height())?;
                image_xobject::to_rendered_buffer(&decoded, alpha.as_ref())
            }
        };
        Ok(buffer.with_source_filter(filter))
    }

    fn source_filters(&self, image: &ImageObjectRef) -> crate::error::Result<Vec<String>> {
        Ok(image_xobject::filter_chain(&self.image_stream(image)?.dict))
    }

    fn image_metadata(&self, image: &ImageObjectRef) -> crate::error::Result<ImageMetadata> {
        let meta = self.image_meta(image)?;
        let (horizontal_dpi, vertical_dpi) = self.placement_dpi(image, &meta);
        Ok(ImageMetadata {
            width: meta.width,
            height: meta.height,
            horizontal_dpi,
            vertical_dpi,
            bits_per_pixel: meta.bits_per_pixel(),
            color_space: meta.color_space,
        })
    }

    fn raw_data_len(&self, image: &ImageObjectRef) -> crate::error::Result<usize> {
        Ok(self.image_stream(image)?.content.len())
    }

    /// 画像ストリームを置換する。
    ///
    /// 新しいSMaskがなければ既存の `/SMask` を引き継ぐ。古いSMaskが不要に
    /// なった場合は保存時の孤立オブジェクト除去で消える。
    fn replace_image_data(
        &mut self,
        image: &ImageObjectRef,
        encoded: &EncodedOutput,
    ) -> crate::error::Result<()> {
        let old_smask = self.image_stream(image)?.dict.get(b"SMask").ok().cloned();
        let (mut stream, smask) = image_xobject::build_image_streams(encoded)?;

        match (smask, old_smask) {
            (Some(smask), _) => {
                let smask_id = self.doc.add_object(Object::Stream(smask));
                stream.dict.set("SMask", Object::Reference(smask_id));
            }
            (None, Some(old)) => stream.dict.set("SMask", old),
            (None, None) => {}
        }

        debug!(
            object = %image,
            codec = encoded.codec.name(),
            bytes = stream.content.len(),
            "replacing image stream"
        );
        self.doc.objects.insert(image.id, Object::Stream(stream));
        Ok(())
    }

    fn create_image_object(&mut self, image: &CanonicalImage) -> crate::error::Result<ImageObjectRef> {
        let (mut stream, smask) = image_xobject::canonical_to_streams(image)?;
        if let Some(smask) = smask {
            let smask_id = self.doc.add_object(Object::Stream(smask));
            stream.dict.set("SMask", Object::Reference(smask_id));
        }
        let id = self.doc.add_object(Object::Stream(stream));
        Ok(ImageObjectRef {
            page: 0,
            name: format!("Stamp{}", id.0),
            id,
        })
    }

    fn set_object_placement(
        &mut self,
        image: &ImageObjectRef,
        matrix: &PlacementMatrix,
    ) -> crate::error::Result<()> {
        self.placements.insert(image.id, *matrix);
        Ok(())
    }

    fn insert_object_on_page(&mut self, page: u32, image: &ImageObjectRef) -> crate::error::Result<()> {
        let matrix = *self.placements.get(&image.id).ok_or_else(|| {
            RecompressError::backend(format!("no placement set for {image}"))
        })?;
        let page_id = self.page_id(page)?;

        self.add_xobject_resource(page_id, &image.name, image.id)?;
        let content = placement_content(&image.name, &matrix)?;
        self.append_page_content(page_id, content)
    }

    fn save(&mut self, path: &Path) -> crate::error::Result<()> {
        let bytes = self.save_to_bytes()?;
        std::fs::write(path, bytes)?;
        Ok(())
    }
}

// 保存前の最適化: 未圧縮ストリームのFlateDecode圧縮、孤立オブジェクト除去

use std::io::Write;

use flate2::Compression;
use flate2::write::ZlibEncoder;
use lopdf::{Document, Object, ObjectId};

/// ドキュメント内の未圧縮ストリームにFlateDecode圧縮を適用する。
///
/// 既にフィルターが設定されているストリームはスキップする（二重圧縮防止）。
pub fn compress_streams(doc: &mut Document) {
    let ids: Vec<ObjectId> = doc.objects.keys().copied().collect();

    for id in ids {
        let Some(Object::Stream(stream)) = doc.objects.get_mut(&id) else {
            continue;
        };
        if stream.dict.get(b"Filter").is_ok() {
            continue;
        }

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        if encoder.write_all(&stream.content).is_err() {
            continue;
        }
        let Ok(compressed) = encoder.finish() else {
            continue;
        };

        stream.dict.set("Filter", "FlateDecode");
        stream.set_content(compressed);
    }
}

/// 孤立オブジェクト（置換で不要になった旧SMask等）を除去する。
pub fn delete_unused_objects(doc: &mut Document) -> usize {
    doc.prune_objects().len()
}

/// PDF最適化の全パスを順序通りに実行する。
pub fn optimize(doc: &mut Document) {
    compress_streams(doc);
    let pruned = delete_unused_objects(doc);
    tracing::debug!(pruned, "removed unreferenced objects");
}

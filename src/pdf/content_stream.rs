use lopdf::Object;
use lopdf::content::{Content, Operation};

use crate::compositor::PlacementMatrix;
use crate::error::RecompressError;

/// PDF user-space units per inch.
pub const POINTS_PER_INCH: f64 = 72.0;

/// 6要素アフィン変換行列 [a, b, c, d, e, f]
/// PDF仕様: [ a b 0 ]
///          [ c d 0 ]
///          [ e f 1 ]
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Matrix {
    /// 単位行列を返す。
    pub fn identity() -> Self {
        Self {
            a: 1.0,
            b: 0.0,
            c: 0.0,
            d: 1.0,
            e: 0.0,
            f: 0.0,
        }
    }

    /// self * other (行列の右乗算)
    pub fn multiply(&self, other: &Matrix) -> Matrix {
        Matrix {
            a: self.a * other.a + self.b * other.c,
            b: self.a * other.b + self.b * other.d,
            c: self.c * other.a + self.d * other.c,
            d: self.c * other.b + self.d * other.d,
            e: self.e * other.a + self.f * other.c + other.e,
            f: self.e * other.b + self.f * other.d + other.f,
        }
    }
}

/// 画像XObjectの配置情報。
#[derive(Debug, Clone)]
pub struct ImagePlacement {
    /// XObjectの名前 (e.g. "Im1")
    pub name: String,
    /// 描画時のCTM
    pub ctm: Matrix,
}

impl ImagePlacement {
    /// 単位正方形の辺を変換した長さ（ポイント）。回転・傾斜にも対応する。
    pub fn display_size(&self) -> (f64, f64) {
        let m = &self.ctm;
        ((m.a * m.a + m.b * m.b).sqrt(), (m.c * m.c + m.d * m.d).sqrt())
    }

    /// 画像のピクセル幅と配置幅から水平解像度(DPI)を求める。
    ///
    /// 配置幅がゼロの場合は `None`。
    pub fn horizontal_dpi(&self, pixel_width: u32) -> Option<f64> {
        let (w, _) = self.display_size();
        (w > 0.0).then(|| pixel_width as f64 / (w / POINTS_PER_INCH))
    }

    pub fn vertical_dpi(&self, pixel_height: u32) -> Option<f64> {
        let (_, h) = self.display_size();
        (h > 0.0).then(|| pixel_height as f64 / (h / POINTS_PER_INCH))
    }
}

/// コンテンツストリームを解析し、全XObjectの配置情報を抽出する。
///
/// CTMスタック(q/Q)を追跡し、cmオペレータでCTMを更新する。
/// DoオペレータでXObject名とその時点のCTMを記録する。
pub fn extract_xobject_placements(
    content_bytes: &[u8],
) -> crate::error::Result<Vec<ImagePlacement>> {
    // 空バイト列の場合、lopdfのパーサがエラーを返す可能性があるため特別扱い
    if content_bytes.is_empty() {
        return Ok(Vec::new());
    }

    let content = Content::decode(content_bytes)
        .map_err(|e| RecompressError::backend(format!("content stream: {e}")))?;

    let mut ctm_stack: Vec<Matrix> = vec![Matrix::identity()];
    let mut placements: Vec<ImagePlacement> = Vec::new();

    for op in &content.operations {
        match op.operator.as_str() {
            "q" => {
                let current = ctm_stack.last().cloned().unwrap_or_else(Matrix::identity);
                ctm_stack.push(current);
            }
            "Q" => {
                if ctm_stack.len() > 1 {
                    ctm_stack.pop();
                }
            }
            "cm" => {
                if op.operands.len() == 6 {
                    let vals: Vec<f64> = op
                        .operands
                        .iter()
                        .map(operand_to_f64)
                        .collect::<crate::error::Result<Vec<_>>>()?;
                    let cm_matrix = Matrix {
                        a: vals[0],
                        b: vals[1],
                        c: vals[2],
                        d: vals[3],
                        e: vals[4],
                        f: vals[5],
                    };
                    if let Some(current) = ctm_stack.last_mut() {
                        *current = cm_matrix.multiply(current);
                    }
                }
            }
            "Do" => {
                if let Some(operand) = op.operands.first() {
                    let name_bytes = operand
                        .as_name()
                        .map_err(|e| RecompressError::backend(format!("Do operand: {e}")))?;
                    placements.push(ImagePlacement {
                        name: String::from_utf8_lossy(name_bytes).into_owned(),
                        ctm: ctm_stack.last().cloned().unwrap_or_else(Matrix::identity),
                    });
                }
            }
            _ => {}
        }
    }

    Ok(placements)
}

/// `q a b c d e f cm /Name Do Q` を生成する。
pub fn placement_content(name: &str, matrix: &PlacementMatrix) -> crate::error::Result<Vec<u8>> {
    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                matrix
                    .to_array()
                    .iter()
                    .map(|v| Object::Real(*v as f32))
                    .collect(),
            ),
            Operation::new("Do", vec![Object::Name(name.as_bytes().to_vec())]),
            Operation::new("Q", vec![]),
        ],
    };
    content
        .encode()
        .map_err(|e| RecompressError::backend(format!("encode content stream: {e}")))
}

/// lopdfのObjectから数値をf64として取得する。
fn operand_to_f64(obj: &Object) -> crate::error::Result<f64> {
    match obj {
        Object::Integer(i) => Ok(*i as f64),
        Object::Real(r) => Ok(*r as f64),
        _ => Err(RecompressError::backend(format!(
            "expected numeric operand, got {:?}",
            obj
        ))),
    }
}

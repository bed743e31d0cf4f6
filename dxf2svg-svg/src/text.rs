use dxf2svg_core::document::Geometry;
use dxf2svg_core::geometry::Point2;
use dxf2svg_engine::denormalise::{ResolvedEntity, Transform};

use crate::glyph::{GlyphError, GlyphOutliner, GlyphRequest};
use crate::options::SvgOptions;

/// 多行文字的放置点（绘图坐标，未翻转）。
///
/// 先累加各层变换的平移量，再减去参考宽度的四分之一和文字高度。
/// 变换中的缩放与旋转不参与计算。
pub fn text_anchor(
    insert: Point2,
    reference_width: f64,
    height: f64,
    transforms: &[Transform],
) -> Point2 {
    let (x, y) = transforms
        .iter()
        .fold((insert.x(), insert.y()), |(x, y), t| (x + t.x, y + t.y));
    Point2::new(x - reference_width / 4.0, y - height)
}

/// 为 MTEXT 生成文字轮廓片段。非 MTEXT、空文本或无可见字形时返回 `None`。
pub fn text_fragment(
    item: &ResolvedEntity,
    options: &SvgOptions,
    outliner: &dyn GlyphOutliner,
) -> Result<Option<String>, GlyphError> {
    let Geometry::MText(mtext) = &item.entity.geometry else {
        return Ok(None);
    };
    if mtext.content.is_empty() {
        return Ok(None);
    }

    let anchor = text_anchor(
        mtext.insert,
        mtext.reference_width.unwrap_or(0.0),
        mtext.height,
        &item.transforms,
    )
    .flip_y();
    let request = GlyphRequest {
        x: anchor.x(),
        y: anchor.y(),
        font_size: mtext.height,
        attributes: vec![
            ("fill".to_string(), options.text_fill.clone()),
            ("stroke".to_string(), options.text_stroke.clone()),
        ],
    };

    let fragment = outliner.path(&mtext.content, &request)?;
    Ok((!fragment.is_empty()).then_some(fragment))
}

use dxf2svg_core::geometry::Bounds2D;

use crate::path::format_number;

const SVG_NAMESPACE: &str = "http://www.w3.org/2000/svg";
const XLINK_NAMESPACE: &str = "http://www.w3.org/1999/xlink";

/// `viewBox` 属性：`minX -maxY width height`。Y 原点取反以匹配翻转后的内容。
///
/// 空边界框输出全零视口。
pub fn view_box(bounds: &Bounds2D) -> String {
    let bounds = if bounds.is_empty() {
        Bounds2D::zero()
    } else {
        *bounds
    };
    format!(
        "{} {} {} {}",
        format_number(bounds.min().x()),
        format_number(-bounds.max().y()),
        format_number(bounds.width()),
        format_number(bounds.height())
    )
}

/// 拼装根元素并按顺序写入全部片段（未格式化）。
pub fn assemble(bounds: &Bounds2D, fragments: &[String]) -> String {
    let mut markup = format!(
        r#"<?xml version="1.0"?><svg xmlns="{SVG_NAMESPACE}" xmlns:xlink="{XLINK_NAMESPACE}" version="1.1" preserveAspectRatio="xMinYMin meet" viewBox="{}" width="100%" height="100%">"#,
        view_box(bounds)
    );
    for fragment in fragments {
        markup.push_str(fragment);
    }
    markup.push_str("</svg>");
    markup
}

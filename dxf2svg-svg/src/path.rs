use std::fmt::Write as _;

use dxf2svg_core::color::Rgb;
use dxf2svg_core::geometry::Point2;

use crate::options::SvgOptions;

const BLACK_HEX: &str = "#000000";
const WHITE_HEX: &str = "#ffffff";

/// 最短往返形式输出数值（`10`、`-5`、`0.5`），负零输出为 `0`。
pub fn format_number(value: f64) -> String {
    if value == 0.0 {
        "0".to_string()
    } else {
        format!("{value}")
    }
}

/// 几何线条的描边色。统一黑色时直接使用黑色；否则纯白替换为黑色，避免白底上不可见。
pub fn stroke_color(color: Rgb, options: &SvgOptions) -> String {
    if options.paint_all_black {
        return BLACK_HEX.to_string();
    }
    let hex = color.to_hex();
    if hex == WHITE_HEX {
        BLACK_HEX.to_string()
    } else {
        hex
    }
}

/// 折线的 `d` 属性：首点 `M`，其余 `L`，不闭合。
pub fn path_data(points: &[Point2]) -> String {
    let mut data = String::new();
    for (index, point) in points.iter().enumerate() {
        let command = if index == 0 { 'M' } else { 'L' };
        let _ = write!(
            data,
            "{command}{},{}",
            format_number(point.x()),
            format_number(point.y())
        );
    }
    data
}

/// 生成仅描边的 `<path>` 片段。`polyline` 须已完成 Y 轴翻转。
pub fn path_fragment(color: Rgb, polyline: &[Point2], options: &SvgOptions) -> String {
    format!(
        r#"<path fill="none" stroke="{}" stroke-width="{}" d="{}"/>"#,
        stroke_color(color, options),
        options.stroke_width.attribute_value(),
        path_data(polyline)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::StrokeWidth;

    fn colored() -> SvgOptions {
        SvgOptions {
            paint_all_black: false,
            ..SvgOptions::default()
        }
    }

    #[test]
    fn flipped_polyline_renders_move_then_line() {
        let flipped: Vec<Point2> = [Point2::new(0.0, 0.0), Point2::new(10.0, 5.0)]
            .into_iter()
            .map(Point2::flip_y)
            .collect();
        assert_eq!(path_data(&flipped), "M0,0L10,-5");
    }

    #[test]
    fn empty_polyline_has_empty_data() {
        let fragment = path_fragment(Rgb::BLACK, &[], &SvgOptions::default());
        assert_eq!(
            fragment,
            r##"<path fill="none" stroke="#000000" stroke-width="0.3%" d=""/>"##
        );
    }

    #[test]
    fn numbers_use_shortest_form() {
        assert_eq!(format_number(10.0), "10");
        assert_eq!(format_number(-5.0), "-5");
        assert_eq!(format_number(0.5), "0.5");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(1.25e-3), "0.00125");
    }

    #[test]
    fn white_becomes_black_only_when_colored() {
        assert_eq!(stroke_color(Rgb::WHITE, &colored()), "#000000");
        assert_eq!(stroke_color(Rgb::new(255, 0, 0), &colored()), "#ff0000");
        assert_eq!(stroke_color(Rgb::WHITE, &SvgOptions::default()), "#000000");
        assert_eq!(
            stroke_color(Rgb::new(255, 0, 0), &SvgOptions::default()),
            "#000000"
        );
    }

    #[test]
    fn absolute_stroke_width_fragment() {
        let options = SvgOptions {
            paint_all_black: false,
            stroke_width: StrokeWidth::Absolute(10.0),
            ..SvgOptions::default()
        };
        let fragment = path_fragment(
            Rgb::new(0, 0, 255),
            &[Point2::new(1.0, -2.0), Point2::new(3.5, -4.0)],
            &options,
        );
        assert_eq!(
            fragment,
            r##"<path fill="none" stroke="#0000ff" stroke-width="10" d="M1,-2L3.5,-4"/>"##
        );
    }
}

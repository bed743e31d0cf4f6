use crate::path::format_number;

/// 线宽：相对视口的百分比，或绝对用户单位。
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StrokeWidth {
    Percent(f64),
    Absolute(f64),
}

impl StrokeWidth {
    pub const DEFAULT_PERCENT: f64 = 0.3;
    pub const DEFAULT_ABSOLUTE: f64 = 10.0;

    /// `stroke-width` 属性值，例如 `0.3%` 或 `10`。
    pub fn attribute_value(&self) -> String {
        match self {
            StrokeWidth::Percent(value) => format!("{}%", format_number(*value)),
            StrokeWidth::Absolute(value) => format_number(*value),
        }
    }
}

impl Default for StrokeWidth {
    fn default() -> Self {
        StrokeWidth::Percent(Self::DEFAULT_PERCENT)
    }
}

/// 输出样式配置，在渲染入口显式传入。
#[derive(Debug, Clone, PartialEq)]
pub struct SvgOptions {
    /// 所有几何线条统一绘制为黑色（适合打印的单色输出）。
    pub paint_all_black: bool,
    pub stroke_width: StrokeWidth,
    /// 文字轮廓的填充色与描边色，与几何线条区分开。
    pub text_fill: String,
    pub text_stroke: String,
}

impl Default for SvgOptions {
    fn default() -> Self {
        Self {
            paint_all_black: true,
            stroke_width: StrokeWidth::default(),
            text_fill: "red".to_string(),
            text_stroke: "black".to_string(),
        }
    }
}

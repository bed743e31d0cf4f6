use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use fontdb::{Database, Family, Query, Stretch, Style, Weight};
use quick_xml::escape::escape;
use rusttype::{Font, OutlineBuilder, Scale, point as rt_point};
use thiserror::Error;
use tracing::debug;

use crate::path::format_number;

#[derive(Debug, Error)]
pub enum GlyphError {
    #[error("读取字体文件 {path:?} 失败: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("无效的字体数据: {0}")]
    InvalidFont(String),
    #[error("系统中未找到字体: {0}")]
    FontNotFound(String),
    #[error("无效的字号: {0}")]
    InvalidFontSize(f64),
}

/// 文字轮廓请求：基线起点（SVG 坐标，Y 轴向下）、字号与附加到 `<path>` 上的属性。
#[derive(Debug, Clone, PartialEq)]
pub struct GlyphRequest {
    pub x: f64,
    pub y: f64,
    pub font_size: f64,
    pub attributes: Vec<(String, String)>,
}

/// 字符串到轮廓路径片段的转换器，启动时加载一次后只读共享。
///
/// 返回完整的 `<path .../>` 片段；没有可见字形时返回空字符串。
pub trait GlyphOutliner: Send + Sync {
    fn path(&self, text: &str, request: &GlyphRequest) -> Result<String, GlyphError>;
}

/// 未加载字体时使用，不输出任何文字。
#[derive(Debug, Default, Clone, Copy)]
pub struct NullOutliner;

impl GlyphOutliner for NullOutliner {
    fn path(&self, _text: &str, _request: &GlyphRequest) -> Result<String, GlyphError> {
        Ok(String::new())
    }
}

/// 基于 rusttype 的 TrueType/OpenType 轮廓生成。
pub struct FontOutliner {
    font: Font<'static>,
}

impl std::fmt::Debug for FontOutliner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontOutliner")
            .field("glyph_count", &self.font.glyph_count())
            .finish()
    }
}

impl FontOutliner {
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, GlyphError> {
        Font::try_from_vec(bytes)
            .map(|font| Self { font })
            .ok_or_else(|| GlyphError::InvalidFont("无法解析字体数据".to_string()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, GlyphError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|source| GlyphError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let outliner = Self::from_bytes(bytes)?;
        debug!(path = %path.display(), "已加载字体文件");
        Ok(outliner)
    }

    /// 通过 fontdb 在系统字体中查找。`family` 为空时使用无衬线字体。
    pub fn from_system(family: Option<&str>) -> Result<Self, GlyphError> {
        let mut db = Database::new();
        db.load_system_fonts();

        let requested = family.map(str::trim).unwrap_or_default();
        let families = match requested {
            "" | "Sans" => vec![Family::SansSerif],
            "Serif" => vec![Family::Serif],
            "Monospace" => vec![Family::Monospace],
            other => vec![Family::Name(other)],
        };
        let query = Query {
            families: &families,
            weight: Weight::NORMAL,
            stretch: Stretch::Normal,
            style: Style::Normal,
        };

        let not_found = || GlyphError::FontNotFound(requested.to_string());
        let id = db.query(&query).ok_or_else(not_found)?;
        let face = db.face(id).ok_or_else(not_found)?;
        match &face.source {
            fontdb::Source::File(path) | fontdb::Source::SharedFile(path, _) => {
                Self::from_file(path)
            }
            fontdb::Source::Binary(bytes) => Self::from_bytes(bytes.as_ref().as_ref().to_vec()),
        }
    }
}

impl GlyphOutliner for FontOutliner {
    fn path(&self, text: &str, request: &GlyphRequest) -> Result<String, GlyphError> {
        if !request.font_size.is_finite() || request.font_size <= 0.0 {
            return Err(GlyphError::InvalidFontSize(request.font_size));
        }
        let scale = Scale::uniform(request.font_size as f32);
        let metrics = self.font.v_metrics(scale);
        let line_advance = metrics.ascent - metrics.descent + metrics.line_gap;

        let mut builder = PathDataBuilder::default();
        for (line_index, line) in text.lines().enumerate() {
            let baseline = request.y as f32 + line_advance * line_index as f32;
            for glyph in self.font.layout(line, scale, rt_point(request.x as f32, baseline)) {
                glyph.build_outline(&mut builder);
            }
        }

        if builder.data.is_empty() {
            return Ok(String::new());
        }
        Ok(path_element(&request.attributes, &builder.data))
    }
}

/// 以请求属性包裹路径数据，属性顺序保持不变，属性值按 XML 规则转义。
pub fn path_element(attributes: &[(String, String)], data: &str) -> String {
    let mut element = String::from("<path");
    for (name, value) in attributes {
        let _ = write!(element, r#" {name}="{}""#, escape(value.as_str()));
    }
    let _ = write!(element, r#" d="{data}"/>"#);
    element
}

#[derive(Debug, Default)]
struct PathDataBuilder {
    data: String,
}

impl PathDataBuilder {
    fn push(&mut self, command: char, coords: &[f32]) {
        self.data.push(command);
        for (index, value) in coords.iter().enumerate() {
            if index > 0 {
                self.data.push(' ');
            }
            // 字形坐标保留两位小数
            let rounded = (f64::from(*value) * 100.0).round() / 100.0;
            self.data.push_str(&format_number(rounded));
        }
    }
}

impl OutlineBuilder for PathDataBuilder {
    fn move_to(&mut self, x: f32, y: f32) {
        self.push('M', &[x, y]);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        self.push('L', &[x, y]);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        self.push('Q', &[x1, y1, x, y]);
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        self.push('C', &[x1, y1, x2, y2, x, y]);
    }

    fn close(&mut self) {
        self.data.push('Z');
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> GlyphRequest {
        GlyphRequest {
            x: 1.0,
            y: -2.0,
            font_size: 4.0,
            attributes: vec![
                ("fill".to_string(), "red".to_string()),
                ("stroke".to_string(), "black".to_string()),
            ],
        }
    }

    #[test]
    fn null_outliner_emits_nothing() {
        assert_eq!(NullOutliner.path("text", &request()).unwrap(), "");
    }

    #[test]
    fn path_element_keeps_attribute_order() {
        assert_eq!(
            path_element(&request().attributes, "M0 0L1 1Z"),
            r#"<path fill="red" stroke="black" d="M0 0L1 1Z"/>"#
        );
    }

    #[test]
    fn path_element_escapes_attribute_values() {
        let attributes = vec![("fill".to_string(), r#"a"b<c&d"#.to_string())];
        assert_eq!(
            path_element(&attributes, "M0 0"),
            r#"<path fill="a&quot;b&lt;c&amp;d" d="M0 0"/>"#
        );
    }

    #[test]
    fn builder_rounds_to_two_decimals() {
        let mut builder = PathDataBuilder::default();
        builder.move_to(1.004, -2.5);
        builder.quad_to(3.0, 4.126, 5.0, 6.0);
        builder.close();
        assert_eq!(builder.data, "M1 -2.5Q3 4.13 5 6Z");
    }

    #[test]
    fn invalid_font_bytes_are_rejected() {
        let err = FontOutliner::from_bytes(vec![0, 1, 2, 3]).unwrap_err();
        assert!(matches!(err, GlyphError::InvalidFont(_)));
    }

    #[test]
    fn missing_font_file_reports_path() {
        let err = FontOutliner::from_file("/nonexistent/font.ttf").unwrap_err();
        match err {
            GlyphError::Io { path, .. } => assert!(path.ends_with("font.ttf")),
            other => panic!("unexpected error: {other}"),
        }
    }
}

pub mod color;
pub mod document;
pub mod glyph;
pub mod options;
pub mod path;
pub mod pretty;
pub mod text;

use dxf2svg_core::color::ColorTable;
use dxf2svg_core::document::Document;
use dxf2svg_core::geometry::{Bounds2D, Point2};
use dxf2svg_engine::denormalise::{ResolvedEntity, denormalise};
use dxf2svg_engine::errors::EngineError;
use dxf2svg_engine::tessellate::{TessellationOptions, tessellate};
use thiserror::Error;
use tracing::{debug, warn};

use crate::color::{ColorResolution, resolve_color};
use crate::document::assemble;
use crate::glyph::{GlyphError, GlyphOutliner};
use crate::options::SvgOptions;
use crate::path::path_fragment;
use crate::pretty::pretty_xml;
use crate::text::text_fragment;

#[derive(Debug, Error)]
pub enum SvgError {
    #[error("no layer table for layer: {layer}")]
    MissingLayer { layer: String },
    #[error("tessellation failed: {0}")]
    Tessellation(#[from] EngineError),
    #[error("glyph outlining failed: {0}")]
    Glyph(#[from] GlyphError),
    #[error("failed to format SVG markup: {0}")]
    Markup(#[from] quick_xml::Error),
    #[error("formatted SVG is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}

/// 渲染过程中的非致命问题。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// 颜色索引在颜色表中不存在，已按黑色绘制。
    InvalidColorIndex { index: i16 },
}

/// 一个实体与其离散折线（绘图坐标）的绑定。
#[derive(Debug, Clone)]
pub struct DrawItem {
    pub entity: ResolvedEntity,
    pub polyline: Vec<Point2>,
}

#[derive(Debug, Clone)]
pub struct SvgDocument {
    pub markup: String,
    pub diagnostics: Vec<Diagnostic>,
}

/// DXF 文档到 SVG 的转换入口。颜色表与字形轮廓由调用方提供并只读共享。
pub struct SvgRenderer<'a> {
    options: SvgOptions,
    tessellation: TessellationOptions,
    colors: &'a dyn ColorTable,
    outliner: &'a dyn GlyphOutliner,
}

impl<'a> SvgRenderer<'a> {
    pub fn new(
        options: SvgOptions,
        colors: &'a dyn ColorTable,
        outliner: &'a dyn GlyphOutliner,
    ) -> Self {
        Self {
            options,
            tessellation: TessellationOptions::default(),
            colors,
            outliner,
        }
    }

    pub fn with_tessellation(mut self, tessellation: TessellationOptions) -> Self {
        self.tessellation = tessellation;
        self
    }

    /// 展开并离散整张图纸，保持实体顺序。
    pub fn draw_items(&self, document: &Document) -> Result<Vec<DrawItem>, SvgError> {
        denormalise(document)
            .into_iter()
            .map(|entity| {
                let polyline = tessellate(&entity, &self.tessellation)?;
                Ok(DrawItem { entity, polyline })
            })
            .collect()
    }

    pub fn render(&self, document: &Document) -> Result<SvgDocument, SvgError> {
        let items = self.draw_items(document)?;
        self.render_items(document, &items)
    }

    /// 按顺序输出全部几何路径，再输出全部文字轮廓。图层缺失时整体失败，不产生部分结果。
    pub fn render_items(
        &self,
        document: &Document,
        items: &[DrawItem],
    ) -> Result<SvgDocument, SvgError> {
        let bounds = Bounds2D::from_points(
            items
                .iter()
                .flat_map(|item| item.polyline.iter().copied()),
        );
        if bounds.is_empty() {
            warn!("图纸没有任何几何点，使用全零视口");
        }

        let mut diagnostics = Vec::new();
        let mut fragments = Vec::with_capacity(items.len());
        for item in items {
            let entity = &item.entity.entity;
            let layer = document
                .layer(&entity.layer)
                .ok_or_else(|| SvgError::MissingLayer {
                    layer: entity.layer.clone(),
                })?;
            let resolution = resolve_color(entity, layer, self.colors);
            if let ColorResolution::Fallback { index } = resolution {
                warn!(index, layer = %entity.layer, "颜色索引无效，使用黑色");
                diagnostics.push(Diagnostic::InvalidColorIndex { index });
            }
            let flipped: Vec<Point2> = item.polyline.iter().map(|p| p.flip_y()).collect();
            fragments.push(path_fragment(resolution.rgb(), &flipped, &self.options));
        }
        let geometry_count = fragments.len();

        for item in items {
            if let Some(fragment) = text_fragment(&item.entity, &self.options, self.outliner)? {
                fragments.push(fragment);
            }
        }
        debug!(
            geometry = geometry_count,
            text = fragments.len() - geometry_count,
            diagnostics = diagnostics.len(),
            "SVG 片段生成完成"
        );

        let markup = pretty_xml(&assemble(&bounds, &fragments))?;
        Ok(SvgDocument {
            markup,
            diagnostics,
        })
    }
}

#[cfg(test)]
mod tests {
    use dxf2svg_core::color::{AciColorTable, Rgb};
    use dxf2svg_core::document::{Entity, Geometry, Layer, Line};

    use super::*;
    use crate::glyph::{GlyphRequest, NullOutliner, path_element};

    struct TagOutliner;

    impl GlyphOutliner for TagOutliner {
        fn path(&self, text: &str, _request: &GlyphRequest) -> Result<String, GlyphError> {
            Ok(format!("<path id=\"{text}\" d=\"M0,0\"/>"))
        }
    }

    /// 与字体轮廓一样经由 `path_element` 输出属性。
    struct SquareOutliner;

    impl GlyphOutliner for SquareOutliner {
        fn path(&self, _text: &str, request: &GlyphRequest) -> Result<String, GlyphError> {
            Ok(path_element(&request.attributes, "M0 0L1 0L1 1Z"))
        }
    }

    struct FailingOutliner;

    impl GlyphOutliner for FailingOutliner {
        fn path(&self, _text: &str, request: &GlyphRequest) -> Result<String, GlyphError> {
            Err(GlyphError::InvalidFontSize(request.font_size))
        }
    }

    /// 只认识 1（红）与 7（白）的颜色表。
    struct SmallTable;

    impl ColorTable for SmallTable {
        fn lookup(&self, index: i16) -> Option<Rgb> {
            match index {
                1 => Some(Rgb::new(255, 0, 0)),
                7 => Some(Rgb::WHITE),
                _ => None,
            }
        }
    }

    fn colored() -> SvgOptions {
        SvgOptions {
            paint_all_black: false,
            ..SvgOptions::default()
        }
    }

    fn line(layer: &str, start: (f64, f64), end: (f64, f64)) -> Entity {
        Entity::new(
            layer,
            Geometry::Line(Line {
                start: Point2::new(start.0, start.1),
                end: Point2::new(end.0, end.1),
            }),
        )
    }

    fn strokes(markup: &str) -> Vec<&str> {
        markup
            .split("stroke=\"")
            .skip(1)
            .filter_map(|rest| rest.split('"').next())
            .collect()
    }

    #[test]
    fn geometry_precedes_text_in_entity_order() {
        let mut doc = Document::new();
        doc.add_layer(Layer::with_color("0", 1));
        doc.add_mtext(Point2::new(0.0, 0.0), "first", 1.0, None, "0");
        doc.add_entity(line("0", (0.0, 0.0), (1.0, 0.0)));
        doc.add_mtext(Point2::new(0.0, 0.0), "second", 1.0, None, "0");

        let renderer = SvgRenderer::new(colored(), &SmallTable, &TagOutliner);
        let svg = renderer.render(&doc).unwrap();
        let first_text = svg.markup.find("id=\"first\"").unwrap();
        let second_text = svg.markup.find("id=\"second\"").unwrap();
        let line_path = svg.markup.find("d=\"M0,0L1,0\"").unwrap();
        assert!(line_path < first_text);
        assert!(first_text < second_text);
        assert_eq!(svg.markup.matches("fill=\"none\"").count(), 3);
    }

    #[test]
    fn invalid_color_index_is_reported_once_and_drawn_black() {
        let mut doc = Document::new();
        doc.add_layer(Layer::with_color("0", 1));
        doc.add_entity(line("0", (0.0, 0.0), (1.0, 1.0)).with_color(42));
        doc.add_entity(line("0", (0.0, 0.0), (2.0, 2.0)));

        let renderer = SvgRenderer::new(colored(), &SmallTable, &NullOutliner);
        let svg = renderer.render(&doc).unwrap();
        assert_eq!(
            svg.diagnostics,
            vec![Diagnostic::InvalidColorIndex { index: 42 }]
        );
        assert_eq!(strokes(&svg.markup), vec!["#000000", "#ff0000"]);
    }

    #[test]
    fn white_layer_is_drawn_black_in_both_modes() {
        let mut doc = Document::new();
        doc.add_layer(Layer::with_color("0", 7));
        doc.add_entity(line("0", (0.0, 0.0), (1.0, 1.0)));

        let colors = AciColorTable::new();
        for options in [colored(), SvgOptions::default()] {
            let renderer = SvgRenderer::new(options, &colors, &NullOutliner);
            let svg = renderer.render(&doc).unwrap();
            assert_eq!(strokes(&svg.markup), vec!["#000000"]);
            assert!(svg.diagnostics.is_empty());
        }
    }

    #[test]
    fn missing_layer_fails_the_whole_conversion() {
        let mut doc = Document::new();
        doc.add_layer(Layer::with_color("0", 1));
        doc.add_entity(line("0", (0.0, 0.0), (1.0, 1.0)));
        doc.add_entity(line("GHOST", (0.0, 0.0), (1.0, 1.0)));

        let colors = AciColorTable::new();
        let renderer = SvgRenderer::new(SvgOptions::default(), &colors, &NullOutliner);
        match renderer.render(&doc) {
            Err(SvgError::MissingLayer { layer }) => assert_eq!(layer, "GHOST"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn view_box_comes_from_flipped_bounds() {
        let mut doc = Document::new();
        doc.add_layer(Layer::new("0"));
        doc.add_entity(line("0", (0.0, -30.0), (100.0, 20.0)));

        let colors = AciColorTable::new();
        let renderer = SvgRenderer::new(SvgOptions::default(), &colors, &NullOutliner);
        let svg = renderer.render(&doc).unwrap();
        assert!(svg.markup.contains("viewBox=\"0 -20 100 50\""));
        assert!(svg.markup.contains("d=\"M0,30L100,-20\""));
    }

    #[test]
    fn empty_document_is_well_formed() {
        let colors = AciColorTable::new();
        let renderer = SvgRenderer::new(SvgOptions::default(), &colors, &NullOutliner);
        let svg = renderer.render(&Document::new()).unwrap();
        assert!(svg.markup.contains("viewBox=\"0 0 0 0\""));
        assert!(svg.markup.starts_with("<?xml version=\"1.0\"?>"));
        assert!(svg.markup.trim_end().ends_with("</svg>"));
        assert!(!svg.markup.contains("<path"));
    }

    #[test]
    fn text_styling_with_markup_characters_stays_well_formed() {
        let mut doc = Document::new();
        doc.add_layer(Layer::new("0"));
        doc.add_mtext(Point2::new(0.0, 0.0), "text", 1.0, None, "0");

        let options = SvgOptions {
            text_fill: r##"url("#grad")"##.to_string(),
            text_stroke: "<none>".to_string(),
            ..SvgOptions::default()
        };
        let colors = AciColorTable::new();
        let renderer = SvgRenderer::new(options, &colors, &SquareOutliner);
        let svg = renderer.render(&doc).expect("特殊字符应被转义");
        assert!(svg
            .markup
            .contains(r#"fill="url(&quot;#grad&quot;)" stroke="&lt;none&gt;""#));
    }

    #[test]
    fn glyph_failures_propagate() {
        let mut doc = Document::new();
        doc.add_layer(Layer::new("0"));
        doc.add_mtext(Point2::new(0.0, 0.0), "text", 0.0, None, "0");

        let colors = AciColorTable::new();
        let renderer = SvgRenderer::new(SvgOptions::default(), &colors, &FailingOutliner);
        assert!(matches!(
            renderer.render(&doc),
            Err(SvgError::Glyph(GlyphError::InvalidFontSize(_)))
        ));
    }

    #[test]
    fn draw_items_pair_each_entity_with_its_polyline() {
        let mut doc = Document::new();
        doc.add_layer(Layer::new("0"));
        doc.add_entity(line("0", (0.0, 0.0), (1.0, 0.0)));
        doc.add_mtext(Point2::new(0.0, 0.0), "t", 1.0, None, "0");
        doc.add_circle(Point2::new(0.0, 0.0), 1.0, "0");

        let colors = AciColorTable::new();
        let renderer = SvgRenderer::new(SvgOptions::default(), &colors, &NullOutliner)
            .with_tessellation(TessellationOptions {
                arc_segments: 8,
                spline_segments: 8,
            });
        let items = renderer.draw_items(&doc).unwrap();
        let shape: Vec<(&str, usize)> = items
            .iter()
            .map(|item| (item.entity.kind(), item.polyline.len()))
            .collect();
        assert_eq!(shape, vec![("LINE", 2), ("MTEXT", 0), ("CIRCLE", 9)]);
    }
}

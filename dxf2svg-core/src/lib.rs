pub mod geometry {
    use glam::DVec2;
    use serde::{Deserialize, Serialize};

    /// 二维点，内部以 `glam::DVec2` 表示，绘图坐标系为 Y 轴向上。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Point2(pub DVec2);

    impl Point2 {
        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self(DVec2::new(x, y))
        }

        #[inline]
        pub fn from_vec(vec: DVec2) -> Self {
            Self(vec)
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }

        #[inline]
        pub fn translate(self, offset: Vector2) -> Self {
            Self(self.0 + offset.0)
        }

        /// 绕原点旋转（弧度，逆时针为正）。
        #[inline]
        pub fn rotate(self, angle: f64) -> Self {
            let (sin, cos) = angle.sin_cos();
            Self::new(
                self.x() * cos - self.y() * sin,
                self.x() * sin + self.y() * cos,
            )
        }

        /// 以原点为中心按轴向缩放。
        #[inline]
        pub fn scale(self, sx: f64, sy: f64) -> Self {
            Self::new(self.x() * sx, self.y() * sy)
        }

        /// 垂直翻转（Y 取反），用于转换到 SVG 的 Y 轴向下坐标系。
        #[inline]
        pub fn flip_y(self) -> Self {
            Self::new(self.x(), -self.y())
        }

        #[inline]
        pub fn vector_to(self, other: Point2) -> Vector2 {
            Vector2(other.0 - self.0)
        }

        #[inline]
        pub fn distance(self, other: Point2) -> f64 {
            self.0.distance(other.0)
        }

        #[inline]
        pub fn as_vec2(self) -> DVec2 {
            self.0
        }
    }

    impl From<DVec2> for Point2 {
        fn from(value: DVec2) -> Self {
            Self::from_vec(value)
        }
    }

    /// 二维向量。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Vector2(pub DVec2);

    impl Vector2 {
        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self(DVec2::new(x, y))
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }
    }

    impl From<DVec2> for Vector2 {
        fn from(value: DVec2) -> Self {
            Self(value)
        }
    }

    /// 轴对齐边界框，用于累积整张图纸的范围并推导 SVG 视口。
    ///
    /// 新建的边界框为空（min 为 +∞，max 为 −∞），读取宽高前应先检查 [`Bounds2D::is_empty`]。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Bounds2D {
        min: Point2,
        max: Point2,
    }

    impl Bounds2D {
        #[inline]
        pub fn new(min: Point2, max: Point2) -> Self {
            Self { min, max }
        }

        #[inline]
        pub fn empty() -> Self {
            Self {
                min: Point2::new(f64::INFINITY, f64::INFINITY),
                max: Point2::new(f64::NEG_INFINITY, f64::NEG_INFINITY),
            }
        }

        /// 全零边界框，作为空图纸的视口哨兵值。
        #[inline]
        pub fn zero() -> Self {
            Self {
                min: Point2::new(0.0, 0.0),
                max: Point2::new(0.0, 0.0),
            }
        }

        pub fn from_points<I>(points: I) -> Self
        where
            I: IntoIterator<Item = Point2>,
        {
            let mut bounds = Self::empty();
            for point in points {
                bounds.include_point(point);
            }
            bounds
        }

        #[inline]
        pub fn is_empty(&self) -> bool {
            self.min.x() > self.max.x() || self.min.y() > self.max.y()
        }

        #[inline]
        pub fn min(&self) -> Point2 {
            self.min
        }

        #[inline]
        pub fn max(&self) -> Point2 {
            self.max
        }

        #[inline]
        pub fn width(&self) -> f64 {
            debug_assert!(!self.is_empty());
            self.max.x() - self.min.x()
        }

        #[inline]
        pub fn height(&self) -> f64 {
            debug_assert!(!self.is_empty());
            self.max.y() - self.min.y()
        }

        pub fn include_point(&mut self, point: Point2) {
            if self.is_empty() {
                self.min = point;
                self.max = point;
                return;
            }
            let min_vec = self.min.as_vec2().min(point.as_vec2());
            let max_vec = self.max.as_vec2().max(point.as_vec2());
            self.min = Point2::from_vec(min_vec);
            self.max = Point2::from_vec(max_vec);
        }
    }

    impl Default for Bounds2D {
        fn default() -> Self {
            Self::empty()
        }
    }

}

pub mod color {
    use std::sync::OnceLock;

    use serde::{Deserialize, Serialize};

    /// 8 位三通道颜色。通道顺序与颜色表存储顺序一致（第 0 通道为红）。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct Rgb([u8; 3]);

    impl Rgb {
        pub const BLACK: Rgb = Rgb([0, 0, 0]);
        pub const WHITE: Rgb = Rgb([255, 255, 255]);

        #[inline]
        pub const fn new(r: u8, g: u8, b: u8) -> Self {
            Self([r, g, b])
        }

        /// 组合为 24 位整数：第 0 通道位于最高字节，第 2 通道位于最低字节。
        #[inline]
        pub fn to_u24(self) -> u32 {
            let [c0, c1, c2] = self.0;
            u32::from(c2) | (u32::from(c1) << 8) | (u32::from(c0) << 16)
        }

        /// 六位小写十六进制颜色，带 `#` 前缀。
        pub fn to_hex(self) -> String {
            format!("#{:06x}", self.to_u24())
        }
    }

    /// 颜色索引到 RGB 的查找表。索引无对应条目时返回 `None`，由调用方决定回退策略。
    pub trait ColorTable: Send + Sync {
        fn lookup(&self, index: i16) -> Option<Rgb>;
    }

    /// AutoCAD 标准颜色索引（ACI）调色板，覆盖 0..=255。
    ///
    /// 1-9 为固定色；10-249 按 24 个色相（每 15°）排列，每个色相依次为
    /// 255/165/127/76/38 五档亮度的纯色与半饱和色；250-255 为灰阶。
    #[derive(Debug, Clone, Copy, Default)]
    pub struct AciColorTable;

    impl AciColorTable {
        pub fn new() -> Self {
            Self
        }

        fn palette() -> &'static [Rgb; 256] {
            static PALETTE: OnceLock<[Rgb; 256]> = OnceLock::new();
            PALETTE.get_or_init(|| {
                let mut palette = [Rgb::BLACK; 256];
                for (index, slot) in palette.iter_mut().enumerate() {
                    *slot = aci_entry(index);
                }
                palette
            })
        }
    }

    impl ColorTable for AciColorTable {
        fn lookup(&self, index: i16) -> Option<Rgb> {
            let index = usize::try_from(index).ok()?;
            Self::palette().get(index).copied()
        }
    }

    const FIXED: [Rgb; 10] = [
        Rgb::new(0, 0, 0),
        Rgb::new(255, 0, 0),
        Rgb::new(255, 255, 0),
        Rgb::new(0, 255, 0),
        Rgb::new(0, 255, 255),
        Rgb::new(0, 0, 255),
        Rgb::new(255, 0, 255),
        Rgb::new(255, 255, 255),
        Rgb::new(65, 65, 65),
        Rgb::new(128, 128, 128),
    ];

    const GRAYS: [u8; 6] = [51, 80, 105, 130, 190, 255];
    const VALUES: [f64; 5] = [255.0, 165.0, 127.0, 76.0, 38.0];

    fn aci_entry(index: usize) -> Rgb {
        match index {
            0..=9 => FIXED[index],
            10..=249 => {
                let offset = index - 10;
                let hue = (offset / 10) as f64 * 15.0;
                let shade = offset % 10;
                let max = VALUES[shade / 2];
                let min = if shade % 2 == 1 { max / 2.0 } else { 0.0 };
                let [r, g, b] = hue_channels(hue, max, min);
                Rgb::new(r.floor() as u8, g.floor() as u8, b.floor() as u8)
            }
            _ => {
                let gray = GRAYS[(index - 250).min(GRAYS.len() - 1)];
                Rgb::new(gray, gray, gray)
            }
        }
    }

    fn hue_channels(hue: f64, max: f64, min: f64) -> [f64; 3] {
        let position = hue / 60.0;
        let sector = position.floor();
        let fraction = position - sector;
        let rise = min + (max - min) * fraction;
        let fall = max - (max - min) * fraction;
        match sector as u32 % 6 {
            0 => [max, rise, min],
            1 => [fall, max, min],
            2 => [min, max, rise],
            3 => [min, fall, max],
            4 => [rise, min, max],
            _ => [max, min, fall],
        }
    }

}

pub mod document {
    use std::collections::HashMap;

    use serde::{Deserialize, Serialize};

    use crate::geometry::{Point2, Vector2};

    /// 默认图层颜色（ACI 7，白/黑）。
    pub const DEFAULT_LAYER_COLOR: i16 = 7;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Layer {
        pub name: String,
        pub color_number: i16,
        pub is_visible: bool,
    }

    impl Layer {
        #[inline]
        pub fn new(name: impl Into<String>) -> Self {
            Self::with_color(name, DEFAULT_LAYER_COLOR)
        }

        #[inline]
        pub fn with_color(name: impl Into<String>, color_number: i16) -> Self {
            Self {
                name: name.into(),
                color_number,
                is_visible: true,
            }
        }
    }

    /// 一个绘图实体：公共属性（图层、颜色覆盖）加上几何数据。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Entity {
        pub layer: String,
        /// 实体自身的颜色索引（DXF 组码 62）。`None` 表示随层。
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub color_number: Option<i16>,
        pub geometry: Geometry,
    }

    impl Entity {
        #[inline]
        pub fn new(layer: impl Into<String>, geometry: Geometry) -> Self {
            Self {
                layer: layer.into(),
                color_number: None,
                geometry,
            }
        }

        #[inline]
        pub fn with_color(mut self, color_number: i16) -> Self {
            self.color_number = Some(color_number);
            self
        }

        #[inline]
        pub fn kind(&self) -> &'static str {
            self.geometry.kind()
        }

        /// 是否为多行文字块（MTEXT）。
        #[inline]
        pub fn is_text_block(&self) -> bool {
            matches!(self.geometry, Geometry::MText(_))
        }

        /// 平移实体的全部几何坐标，块展开时用于扣除块基点。
        pub fn translate(&mut self, offset: Vector2) {
            self.geometry.translate(offset);
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(tag = "kind", rename_all = "snake_case")]
    pub enum Geometry {
        Line(Line),
        Circle(Circle),
        Arc(Arc),
        Ellipse(Ellipse),
        Polyline(Polyline),
        Spline(Spline),
        Text(Text),
        MText(MText),
        Insert(Insert),
    }

    impl Geometry {
        pub fn kind(&self) -> &'static str {
            match self {
                Geometry::Line(_) => "LINE",
                Geometry::Circle(_) => "CIRCLE",
                Geometry::Arc(_) => "ARC",
                Geometry::Ellipse(_) => "ELLIPSE",
                Geometry::Polyline(_) => "POLYLINE",
                Geometry::Spline(_) => "SPLINE",
                Geometry::Text(_) => "TEXT",
                Geometry::MText(_) => "MTEXT",
                Geometry::Insert(_) => "INSERT",
            }
        }

        pub fn translate(&mut self, offset: Vector2) {
            match self {
                Geometry::Line(line) => {
                    line.start = line.start.translate(offset);
                    line.end = line.end.translate(offset);
                }
                Geometry::Circle(circle) => circle.center = circle.center.translate(offset),
                Geometry::Arc(arc) => arc.center = arc.center.translate(offset),
                Geometry::Ellipse(ellipse) => ellipse.center = ellipse.center.translate(offset),
                Geometry::Polyline(polyline) => {
                    for vertex in &mut polyline.vertices {
                        vertex.position = vertex.position.translate(offset);
                    }
                }
                Geometry::Spline(spline) => {
                    for point in spline
                        .control_points
                        .iter_mut()
                        .chain(spline.fit_points.iter_mut())
                    {
                        *point = point.translate(offset);
                    }
                }
                Geometry::Text(text) => text.insert = text.insert.translate(offset),
                Geometry::MText(mtext) => mtext.insert = mtext.insert.translate(offset),
                Geometry::Insert(insert) => insert.insert = insert.insert.translate(offset),
            }
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Line {
        pub start: Point2,
        pub end: Point2,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Circle {
        pub center: Point2,
        pub radius: f64,
    }

    /// 圆弧实体，角度以弧度形式储存，遵循数学正方向。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Arc {
        pub center: Point2,
        pub radius: f64,
        pub start_angle: f64,
        pub end_angle: f64,
    }

    /// 椭圆实体，记录主轴向量与参数范围（单位为弧度）。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Ellipse {
        pub center: Point2,
        pub major_axis: Vector2,
        pub ratio: f64,
        pub start_parameter: f64,
        pub end_parameter: f64,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Polyline {
        pub vertices: Vec<PolylineVertex>,
        pub is_closed: bool,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct PolylineVertex {
        pub position: Point2,
        pub bulge: f64,
    }

    impl PolylineVertex {
        #[inline]
        pub fn new(position: Point2) -> Self {
            Self {
                position,
                bulge: 0.0,
            }
        }

        #[inline]
        pub fn with_bulge(position: Point2, bulge: f64) -> Self {
            Self { position, bulge }
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Spline {
        pub degree: i32,
        pub is_closed: bool,
        pub control_points: Vec<Point2>,
        pub fit_points: Vec<Point2>,
        pub knot_values: Vec<f64>,
        pub weights: Vec<f64>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Text {
        pub insert: Point2,
        pub content: String,
        pub height: f64,
        pub rotation: f64,
    }

    /// 多行文字。`reference_width` 为参考矩形宽度（组码 41），缺省视为 0。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct MText {
        pub insert: Point2,
        pub content: String,
        pub height: f64,
        pub reference_width: Option<f64>,
        pub attachment_point: i16,
        pub style: Option<String>,
    }

    /// 块参照（INSERT），支持按行列阵列插入。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Insert {
        pub block: String,
        pub insert: Point2,
        pub scale: Vector2,
        /// 旋转角，弧度。
        pub rotation: f64,
        pub column_count: u32,
        pub row_count: u32,
        pub column_spacing: f64,
        pub row_spacing: f64,
    }

    impl Insert {
        pub fn new(block: impl Into<String>, insert: Point2) -> Self {
            Self {
                block: block.into(),
                insert,
                scale: Vector2::new(1.0, 1.0),
                rotation: 0.0,
                column_count: 1,
                row_count: 1,
                column_spacing: 0.0,
                row_spacing: 0.0,
            }
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct BlockDefinition {
        pub name: String,
        pub base_point: Point2,
        pub entities: Vec<Entity>,
    }

    impl BlockDefinition {
        pub fn new(name: impl Into<String>, base_point: Point2) -> Self {
            Self {
                name: name.into(),
                base_point,
                entities: Vec::new(),
            }
        }
    }

    /// 解析后的图纸：图层表、块定义与模型空间实体（保持文件中的顺序）。
    ///
    /// 添加实体不会自动创建图层；引用未声明图层的实体在渲染时视为损坏文档。
    #[derive(Debug, Default, Clone, Serialize, Deserialize)]
    pub struct Document {
        layers: HashMap<String, Layer>,
        entities: Vec<Entity>,
        blocks: HashMap<String, BlockDefinition>,
    }

    impl Document {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn add_layer(&mut self, layer: Layer) {
            self.layers.insert(layer.name.clone(), layer);
        }

        #[inline]
        pub fn layer(&self, name: &str) -> Option<&Layer> {
            self.layers.get(name)
        }

        pub fn add_entity(&mut self, entity: Entity) {
            self.entities.push(entity);
        }

        pub fn add_line(&mut self, start: Point2, end: Point2, layer: impl Into<String>) {
            self.add_entity(Entity::new(layer, Geometry::Line(Line { start, end })));
        }

        pub fn add_circle(&mut self, center: Point2, radius: f64, layer: impl Into<String>) {
            self.add_entity(Entity::new(layer, Geometry::Circle(Circle { center, radius })));
        }

        pub fn add_mtext(
            &mut self,
            insert: Point2,
            content: impl Into<String>,
            height: f64,
            reference_width: Option<f64>,
            layer: impl Into<String>,
        ) {
            self.add_entity(Entity::new(
                layer,
                Geometry::MText(MText {
                    insert,
                    content: content.into(),
                    height,
                    reference_width,
                    attachment_point: 1,
                    style: None,
                }),
            ));
        }

        pub fn add_insert(&mut self, insert: Insert, layer: impl Into<String>) {
            self.add_entity(Entity::new(layer, Geometry::Insert(insert)));
        }

        #[inline]
        pub fn entities(&self) -> impl Iterator<Item = &Entity> {
            self.entities.iter()
        }

        #[inline]
        pub fn entity_count(&self) -> usize {
            self.entities.len()
        }

        pub fn add_block_definition(&mut self, definition: BlockDefinition) {
            self.blocks.insert(definition.name.clone(), definition);
        }

        #[inline]
        pub fn block(&self, name: &str) -> Option<&BlockDefinition> {
            self.blocks.get(name)
        }
    }

}

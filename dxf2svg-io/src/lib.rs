use std::fs;
use std::path::Path;

use dxf2svg_core::{
    document::{
        Arc, BlockDefinition, Circle, Document, Ellipse, Entity, Geometry, Insert, Layer, Line,
        MText, Polyline, PolylineVertex, Spline, Text,
    },
    geometry::{Point2, Vector2},
};
use thiserror::Error;
use tracing::debug;

/// DXF 中表示“随层”的颜色索引。
const COLOR_BY_LAYER: i16 = 256;

#[derive(Debug, Error)]
pub enum IoError {
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),
    #[error("failed to read file {path:?}: {source}")]
    ReadError {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid document structure: {0}")]
    InvalidDocument(String),
}

pub trait DocumentLoader {
    fn load(&self, path: &Path) -> Result<Document, IoError>;
}

/// ASCII DXF 读取入口。
#[derive(Debug, Default, Clone, Copy)]
pub struct DxfFacade;

impl DxfFacade {
    pub fn new() -> Self {
        Self
    }

    /// 直接解析内存中的 DXF 文本。
    pub fn parse_str(&self, source: &str) -> Result<Document, IoError> {
        DxfParser::new(source).parse().map_err(IoError::from)
    }
}

impl DocumentLoader for DxfFacade {
    fn load(&self, path: &Path) -> Result<Document, IoError> {
        let data = fs::read_to_string(path).map_err(|source| IoError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let document = self.parse_str(&data)?;
        debug!(
            path = %path.display(),
            entities = document.entity_count(),
            "DXF 解析完成"
        );
        Ok(document)
    }
}

#[derive(Debug)]
enum DxfError {
    Unsupported { feature: String },
    Invalid { message: String },
}

impl DxfError {
    fn unsupported(feature: impl Into<String>) -> Self {
        Self::Unsupported {
            feature: feature.into(),
        }
    }

    fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}

impl From<DxfError> for IoError {
    fn from(err: DxfError) -> Self {
        match err {
            DxfError::Unsupported { feature } => IoError::UnsupportedFeature(feature),
            DxfError::Invalid { message } => IoError::InvalidDocument(message),
        }
    }
}

/// 所有实体共享的公共组码：图层（8）与颜色（62）。
#[derive(Debug, Default)]
struct EntityHeader {
    layer: Option<String>,
    color_number: Option<i16>,
}

impl EntityHeader {
    /// 尝试消费公共组码，返回是否已处理。
    fn accept(&mut self, code: i32, value: &str, kind: &str) -> Result<bool, DxfError> {
        match code {
            8 => {
                self.layer = Some(value.trim().to_string());
                Ok(true)
            }
            62 => {
                let color = parse_i16(value, &format!("{kind} 颜色（组码 62）"))?;
                self.color_number = (color != COLOR_BY_LAYER).then_some(color);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn into_entity(self, geometry: Geometry) -> Entity {
        Entity {
            layer: self.layer.unwrap_or_else(|| "0".to_string()),
            color_number: self.color_number,
            geometry,
        }
    }
}

struct DxfParser<'a> {
    reader: DxfReader<'a>,
}

impl<'a> DxfParser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            reader: DxfReader::new(source),
        }
    }

    fn parse(mut self) -> Result<Document, DxfError> {
        let mut document = Document::new();
        while let Some((code, value)) = self.reader.next_pair()? {
            if code == 999 {
                continue;
            }
            if code != 0 {
                return Err(DxfError::invalid(format!(
                    "意外的组码 {code}（期望 0 表示 SECTION/EOF）"
                )));
            }
            match value.as_str() {
                "SECTION" => {
                    let (name_code, name) = self
                        .reader
                        .next_pair()?
                        .ok_or_else(|| DxfError::invalid("SECTION 缺少名称（组码 2）"))?;
                    if name_code != 2 {
                        return Err(DxfError::invalid(format!(
                            "SECTION 名称使用了组码 {name_code}（期望 2）"
                        )));
                    }
                    match name.trim() {
                        "TABLES" => self.parse_tables(&mut document)?,
                        "BLOCKS" => self.parse_blocks(&mut document)?,
                        "ENTITIES" => self.parse_entities(&mut document)?,
                        _ => self.skip_section()?,
                    }
                }
                "EOF" => break,
                unexpected => {
                    return Err(DxfError::invalid(format!(
                        "意外的标记 {unexpected}，期望 SECTION 或 EOF"
                    )));
                }
            }
        }
        Ok(document)
    }

    fn skip_section(&mut self) -> Result<(), DxfError> {
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) if value == "ENDSEC" => break,
                Some(_) => continue,
                None => {
                    return Err(DxfError::invalid("SECTION 未找到 ENDSEC 终止标记"));
                }
            }
        }
        Ok(())
    }

    fn parse_tables(&mut self, document: &mut Document) -> Result<(), DxfError> {
        loop {
            let (code, value) = match self.reader.next_pair()? {
                Some(pair) => pair,
                None => return Err(DxfError::invalid("TABLES 段提前结束")),
            };
            if code != 0 {
                // TABLE 头部的组码由 skip_entity_body 统一跳过，这里只会遇到残留字段
                continue;
            }
            match value.as_str() {
                "ENDSEC" => break,
                "LAYER" => {
                    let layer = self.parse_layer_record()?;
                    document.add_layer(layer);
                }
                _ => self.skip_entity_body()?,
            }
        }
        Ok(())
    }

    fn parse_layer_record(&mut self) -> Result<Layer, DxfError> {
        let mut name: Option<String> = None;
        let mut color: i16 = dxf2svg_core::document::DEFAULT_LAYER_COLOR;
        let mut is_visible = true;
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((code, value)) => match code {
                    2 => name = Some(value.trim().to_string()),
                    62 => {
                        let raw = parse_i16(&value, "LAYER 颜色（组码 62）")?;
                        // 负值表示图层关闭，颜色取绝对值
                        is_visible = raw >= 0;
                        color = raw.saturating_abs();
                    }
                    _ => {}
                },
                None => return Err(DxfError::invalid("LAYER 记录未正确结束")),
            }
        }

        let name = name.ok_or_else(|| DxfError::invalid("LAYER 记录缺少名称（组码 2）"))?;
        Ok(Layer {
            name,
            color_number: color,
            is_visible,
        })
    }

    fn parse_entities(&mut self, document: &mut Document) -> Result<(), DxfError> {
        loop {
            let (code, value) = match self.reader.next_pair()? {
                Some(pair) => pair,
                None => return Err(DxfError::invalid("ENTITIES 段提前结束")),
            };
            if code != 0 {
                return Err(DxfError::invalid(format!(
                    "ENTITIES 段遇到组码 {code}（期望 0 表示实体起始）"
                )));
            }

            match value.as_str() {
                "ENDSEC" => break,
                kind => {
                    if let Some(entity) = self.parse_entity_or_skip(kind)? {
                        document.add_entity(entity);
                    }
                }
            }
        }
        Ok(())
    }

    fn parse_blocks(&mut self, document: &mut Document) -> Result<(), DxfError> {
        loop {
            let (code, value) = match self.reader.next_pair()? {
                Some(pair) => pair,
                None => return Err(DxfError::invalid("BLOCKS 段提前结束")),
            };
            if code != 0 {
                return Err(DxfError::invalid(format!(
                    "BLOCKS 段遇到组码 {code}（期望 0 表示实体起始）"
                )));
            }

            match value.as_str() {
                "ENDSEC" => break,
                "BLOCK" => {
                    let definition = self.parse_block_definition()?;
                    document.add_block_definition(definition);
                }
                _ => {
                    // 未预期的条目（例如嵌套记录），直接跳过
                    self.skip_entity_body()?;
                }
            }
        }
        Ok(())
    }

    fn parse_block_definition(&mut self) -> Result<BlockDefinition, DxfError> {
        let mut name: Option<String> = None;
        let mut base_x: f64 = 0.0;
        let mut base_y: f64 = 0.0;
        let mut entities: Vec<Entity> = Vec::new();

        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => match value.as_str() {
                    "ENDBLK" => {
                        self.skip_entity_body()?;
                        break;
                    }
                    kind => {
                        if let Some(entity) = self.parse_entity_or_skip(kind)? {
                            entities.push(entity);
                        }
                    }
                },
                Some((code, value)) => match code {
                    2 => name = Some(value.trim().to_string()),
                    10 => base_x = parse_f64(&value, "BLOCK 基点 X")?,
                    20 => base_y = parse_f64(&value, "BLOCK 基点 Y")?,
                    _ => {}
                },
                None => {
                    return Err(DxfError::invalid("BLOCK 定义未找到 ENDBLK 终止标记"));
                }
            }
        }

        let name = name.ok_or_else(|| DxfError::invalid("BLOCK 缺少名称（组码 2）"))?;
        Ok(BlockDefinition {
            name,
            base_point: Point2::new(base_x, base_y),
            entities,
        })
    }

    /// 解析一个实体；不支持的类型跳过并返回 `None`。
    fn parse_entity_or_skip(&mut self, kind: &str) -> Result<Option<Entity>, DxfError> {
        match self.parse_entity(kind) {
            Ok(entity) => Ok(entity),
            Err(DxfError::Unsupported { feature }) => {
                debug!(kind, feature = %feature, "跳过暂不支持的实体");
                self.skip_entity_body()?;
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    fn parse_entity(&mut self, kind: &str) -> Result<Option<Entity>, DxfError> {
        match kind {
            "LINE" => self.parse_line().map(Some),
            "CIRCLE" => self.parse_circle().map(Some),
            "ARC" => self.parse_arc().map(Some),
            "ELLIPSE" => self.parse_ellipse().map(Some),
            "LWPOLYLINE" => self.parse_lwpolyline().map(Some),
            "POLYLINE" => self.parse_polyline_entity(),
            "SPLINE" => self.parse_spline().map(Some),
            "TEXT" => self.parse_text().map(Some),
            "MTEXT" => self.parse_mtext().map(Some),
            "INSERT" => self.parse_insert().map(Some),
            "SEQEND" | "ATTRIB" | "VERTEX" => {
                // 孤立的序列记录，不构成独立实体
                self.skip_entity_body()?;
                Ok(None)
            }
            other => Err(DxfError::unsupported(format!("暂不支持的实体类型 {other}"))),
        }
    }

    fn parse_line(&mut self) -> Result<Entity, DxfError> {
        let mut header = EntityHeader::default();
        let mut start_x = None;
        let mut start_y = None;
        let mut end_x = None;
        let mut end_y = None;
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((code, value)) => {
                    if header.accept(code, &value, "LINE")? {
                        continue;
                    }
                    match code {
                        10 => assign_coord(&mut start_x, &value, "LINE 起点 X（组码 10）")?,
                        20 => assign_coord(&mut start_y, &value, "LINE 起点 Y（组码 20）")?,
                        11 => assign_coord(&mut end_x, &value, "LINE 终点 X（组码 11）")?,
                        21 => assign_coord(&mut end_y, &value, "LINE 终点 Y（组码 21）")?,
                        _ => {} // Z 坐标及其余字段忽略
                    }
                }
                None => return Err(DxfError::invalid("LINE 未正确结束")),
            }
        }

        let sx = start_x.ok_or_else(|| DxfError::invalid("LINE 缺少起点 X（组码 10）"))?;
        let sy = start_y.ok_or_else(|| DxfError::invalid("LINE 缺少起点 Y（组码 20）"))?;
        let ex = end_x.ok_or_else(|| DxfError::invalid("LINE 缺少终点 X（组码 11）"))?;
        let ey = end_y.ok_or_else(|| DxfError::invalid("LINE 缺少终点 Y（组码 21）"))?;

        Ok(header.into_entity(Geometry::Line(Line {
            start: Point2::new(sx, sy),
            end: Point2::new(ex, ey),
        })))
    }

    fn parse_circle(&mut self) -> Result<Entity, DxfError> {
        let mut header = EntityHeader::default();
        let mut center_x = None;
        let mut center_y = None;
        let mut radius = None;
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((code, value)) => {
                    if header.accept(code, &value, "CIRCLE")? {
                        continue;
                    }
                    match code {
                        10 => assign_coord(&mut center_x, &value, "CIRCLE 圆心 X（组码 10）")?,
                        20 => assign_coord(&mut center_y, &value, "CIRCLE 圆心 Y（组码 20）")?,
                        40 => assign_coord(&mut radius, &value, "CIRCLE 半径（组码 40）")?,
                        _ => {}
                    }
                }
                None => return Err(DxfError::invalid("CIRCLE 未正确结束")),
            }
        }

        let cx = center_x.ok_or_else(|| DxfError::invalid("CIRCLE 缺少圆心 X（组码 10）"))?;
        let cy = center_y.ok_or_else(|| DxfError::invalid("CIRCLE 缺少圆心 Y（组码 20）"))?;
        let radius = radius.ok_or_else(|| DxfError::invalid("CIRCLE 缺少半径（组码 40）"))?;

        Ok(header.into_entity(Geometry::Circle(Circle {
            center: Point2::new(cx, cy),
            radius,
        })))
    }

    fn parse_arc(&mut self) -> Result<Entity, DxfError> {
        let mut header = EntityHeader::default();
        let mut center_x = None;
        let mut center_y = None;
        let mut radius = None;
        let mut start_angle = None;
        let mut end_angle = None;
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((code, value)) => {
                    if header.accept(code, &value, "ARC")? {
                        continue;
                    }
                    match code {
                        10 => assign_coord(&mut center_x, &value, "ARC 圆心 X（组码 10）")?,
                        20 => assign_coord(&mut center_y, &value, "ARC 圆心 Y（组码 20）")?,
                        40 => assign_coord(&mut radius, &value, "ARC 半径（组码 40）")?,
                        50 => assign_coord(&mut start_angle, &value, "ARC 起始角（组码 50）")?,
                        51 => assign_coord(&mut end_angle, &value, "ARC 终止角（组码 51）")?,
                        _ => {}
                    }
                }
                None => return Err(DxfError::invalid("ARC 未正确结束")),
            }
        }

        let cx = center_x.ok_or_else(|| DxfError::invalid("ARC 缺少圆心 X（组码 10）"))?;
        let cy = center_y.ok_or_else(|| DxfError::invalid("ARC 缺少圆心 Y（组码 20）"))?;
        let radius = radius.ok_or_else(|| DxfError::invalid("ARC 缺少半径（组码 40）"))?;
        let start_angle =
            start_angle.ok_or_else(|| DxfError::invalid("ARC 缺少起始角（组码 50）"))?;
        let end_angle = end_angle.ok_or_else(|| DxfError::invalid("ARC 缺少终止角（组码 51）"))?;

        Ok(header.into_entity(Geometry::Arc(Arc {
            center: Point2::new(cx, cy),
            radius,
            start_angle: start_angle.to_radians(),
            end_angle: end_angle.to_radians(),
        })))
    }

    fn parse_ellipse(&mut self) -> Result<Entity, DxfError> {
        let mut header = EntityHeader::default();
        let mut center_x = None;
        let mut center_y = None;
        let mut major_x = None;
        let mut major_y = None;
        let mut ratio = None;
        let mut start_parameter = 0.0;
        let mut end_parameter = std::f64::consts::TAU;
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((code, value)) => {
                    if header.accept(code, &value, "ELLIPSE")? {
                        continue;
                    }
                    match code {
                        10 => assign_coord(&mut center_x, &value, "ELLIPSE 中心 X（组码 10）")?,
                        20 => assign_coord(&mut center_y, &value, "ELLIPSE 中心 Y（组码 20）")?,
                        11 => assign_coord(&mut major_x, &value, "ELLIPSE 主轴 X（组码 11）")?,
                        21 => assign_coord(&mut major_y, &value, "ELLIPSE 主轴 Y（组码 21）")?,
                        40 => assign_coord(&mut ratio, &value, "ELLIPSE 轴比（组码 40）")?,
                        41 => start_parameter = parse_f64(&value, "ELLIPSE 起始参数")?,
                        42 => end_parameter = parse_f64(&value, "ELLIPSE 终止参数")?,
                        _ => {}
                    }
                }
                None => return Err(DxfError::invalid("ELLIPSE 未正确结束")),
            }
        }

        let cx = center_x.ok_or_else(|| DxfError::invalid("ELLIPSE 缺少中心 X（组码 10）"))?;
        let cy = center_y.ok_or_else(|| DxfError::invalid("ELLIPSE 缺少中心 Y（组码 20）"))?;
        let mx = major_x.ok_or_else(|| DxfError::invalid("ELLIPSE 缺少主轴 X（组码 11）"))?;
        let my = major_y.ok_or_else(|| DxfError::invalid("ELLIPSE 缺少主轴 Y（组码 21）"))?;
        let ratio = ratio.ok_or_else(|| DxfError::invalid("ELLIPSE 缺少轴比（组码 40）"))?;

        Ok(header.into_entity(Geometry::Ellipse(Ellipse {
            center: Point2::new(cx, cy),
            major_axis: Vector2::new(mx, my),
            ratio,
            start_parameter,
            end_parameter,
        })))
    }

    fn parse_lwpolyline(&mut self) -> Result<Entity, DxfError> {
        let mut header = EntityHeader::default();
        let mut is_closed = false;
        let mut vertices: Vec<PolylineVertex> = Vec::new();
        let mut pending = PendingPoint::default();
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((code, value)) => {
                    if header.accept(code, &value, "LWPOLYLINE")? {
                        continue;
                    }
                    match code {
                        70 => {
                            let flag = parse_i32(&value, "LWPOLYLINE 标志")?;
                            is_closed = flag & 0x01 == 0x01;
                        }
                        10 => {
                            let x = parse_f64(&value, "LWPOLYLINE 顶点 X")?;
                            if let Some(point) = pending.push_x(x, "LWPOLYLINE")? {
                                vertices.push(PolylineVertex::new(point));
                            }
                        }
                        20 => {
                            let y = parse_f64(&value, "LWPOLYLINE 顶点 Y")?;
                            if let Some(point) = pending.push_y(y, "LWPOLYLINE")? {
                                vertices.push(PolylineVertex::new(point));
                            }
                        }
                        42 => {
                            let bulge = parse_f64(&value, "LWPOLYLINE 顶点 bulge")?;
                            match vertices.last_mut() {
                                Some(vertex) => vertex.bulge = bulge,
                                None => {
                                    return Err(DxfError::invalid(
                                        "LWPOLYLINE 在定义首个顶点前遇到 bulge（组码 42）",
                                    ));
                                }
                            }
                        }
                        _ => {}
                    }
                }
                None => return Err(DxfError::invalid("LWPOLYLINE 未正确结束")),
            }
        }

        pending.finish("LWPOLYLINE")?;
        if vertices.is_empty() {
            return Err(DxfError::invalid("LWPOLYLINE 未解析到任何顶点"));
        }

        Ok(header.into_entity(Geometry::Polyline(Polyline {
            vertices,
            is_closed,
        })))
    }

    /// 旧式 POLYLINE：由 VERTEX 序列与 SEQEND 组成。网格类多段线不参与二维输出，返回 `None`。
    fn parse_polyline_entity(&mut self) -> Result<Option<Entity>, DxfError> {
        let mut header = EntityHeader::default();
        let mut flags: i32 = 0;
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((code, value)) => {
                    if header.accept(code, &value, "POLYLINE")? {
                        continue;
                    }
                    if code == 70 {
                        flags = parse_i32(&value, "POLYLINE 标志")?;
                    }
                }
                None => return Err(DxfError::invalid("POLYLINE 未正确结束")),
            }
        }

        let mut vertices: Vec<PolylineVertex> = Vec::new();
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => match value.as_str() {
                    "VERTEX" => {
                        if let Some(vertex) = self.parse_vertex()? {
                            vertices.push(vertex);
                        }
                    }
                    "SEQEND" => {
                        self.skip_entity_body()?;
                        break;
                    }
                    _ => {
                        // 缺少 SEQEND 的非规范文件
                        self.reader.put_back((0, value));
                        break;
                    }
                },
                Some((code, value)) => {
                    return Err(DxfError::invalid(format!(
                        "POLYLINE 顶点序列出现意外组码 {code} 值 {value}"
                    )));
                }
                None => return Err(DxfError::invalid("POLYLINE 缺少 SEQEND")),
            }
        }

        if flags & (0x10 | 0x40) != 0 {
            debug!(flags, "跳过网格类 POLYLINE");
            return Ok(None);
        }
        if vertices.is_empty() {
            return Err(DxfError::invalid("POLYLINE 未解析到任何顶点"));
        }

        Ok(Some(header.into_entity(Geometry::Polyline(Polyline {
            vertices,
            is_closed: flags & 0x01 == 0x01,
        }))))
    }

    fn parse_vertex(&mut self) -> Result<Option<PolylineVertex>, DxfError> {
        let mut x = None;
        let mut y = None;
        let mut bulge = 0.0;
        let mut flags: i32 = 0;
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((code, value)) => match code {
                    10 => assign_coord(&mut x, &value, "VERTEX X（组码 10）")?,
                    20 => assign_coord(&mut y, &value, "VERTEX Y（组码 20）")?,
                    42 => bulge = parse_f64(&value, "VERTEX bulge")?,
                    70 => flags = parse_i32(&value, "VERTEX 标志")?,
                    _ => {}
                },
                None => return Err(DxfError::invalid("VERTEX 未正确结束")),
            }
        }

        // 样条拟合控制点（标志 16）不属于可见顶点
        if flags & 0x10 != 0 {
            return Ok(None);
        }
        let x = x.ok_or_else(|| DxfError::invalid("VERTEX 缺少 X（组码 10）"))?;
        let y = y.ok_or_else(|| DxfError::invalid("VERTEX 缺少 Y（组码 20）"))?;
        Ok(Some(PolylineVertex::with_bulge(Point2::new(x, y), bulge)))
    }

    fn parse_spline(&mut self) -> Result<Entity, DxfError> {
        let mut header = EntityHeader::default();
        let mut degree: i32 = 3;
        let mut is_closed = false;
        let mut control_points: Vec<Point2> = Vec::new();
        let mut fit_points: Vec<Point2> = Vec::new();
        let mut knot_values: Vec<f64> = Vec::new();
        let mut weights: Vec<f64> = Vec::new();
        let mut pending_control = PendingPoint::default();
        let mut pending_fit = PendingPoint::default();
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((code, value)) => {
                    if header.accept(code, &value, "SPLINE")? {
                        continue;
                    }
                    match code {
                        70 => {
                            let flag = parse_i32(&value, "SPLINE 标志")?;
                            is_closed = flag & 0x01 == 0x01;
                        }
                        71 => degree = parse_i32(&value, "SPLINE 阶数")?,
                        40 => knot_values.push(parse_f64(&value, "SPLINE 节点值")?),
                        41 => weights.push(parse_f64(&value, "SPLINE 权重")?),
                        10 => {
                            let x = parse_f64(&value, "SPLINE 控制点 X")?;
                            if let Some(point) = pending_control.push_x(x, "SPLINE 控制点")? {
                                control_points.push(point);
                            }
                        }
                        20 => {
                            let y = parse_f64(&value, "SPLINE 控制点 Y")?;
                            if let Some(point) = pending_control.push_y(y, "SPLINE 控制点")? {
                                control_points.push(point);
                            }
                        }
                        11 => {
                            let x = parse_f64(&value, "SPLINE 拟合点 X")?;
                            if let Some(point) = pending_fit.push_x(x, "SPLINE 拟合点")? {
                                fit_points.push(point);
                            }
                        }
                        21 => {
                            let y = parse_f64(&value, "SPLINE 拟合点 Y")?;
                            if let Some(point) = pending_fit.push_y(y, "SPLINE 拟合点")? {
                                fit_points.push(point);
                            }
                        }
                        _ => {}
                    }
                }
                None => return Err(DxfError::invalid("SPLINE 未正确结束")),
            }
        }

        pending_control.finish("SPLINE 控制点")?;
        pending_fit.finish("SPLINE 拟合点")?;
        if control_points.is_empty() && fit_points.is_empty() {
            return Err(DxfError::invalid("SPLINE 缺少控制点与拟合点"));
        }

        Ok(header.into_entity(Geometry::Spline(Spline {
            degree,
            is_closed,
            control_points,
            fit_points,
            knot_values,
            weights,
        })))
    }

    fn parse_text(&mut self) -> Result<Entity, DxfError> {
        let mut header = EntityHeader::default();
        let mut insert_x = None;
        let mut insert_y = None;
        let mut height = None;
        let mut rotation_deg: f64 = 0.0;
        let mut content = String::new();
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((code, value)) => {
                    if header.accept(code, &value, "TEXT")? {
                        continue;
                    }
                    match code {
                        10 => assign_coord(&mut insert_x, &value, "TEXT 插入点 X（组码 10）")?,
                        20 => assign_coord(&mut insert_y, &value, "TEXT 插入点 Y（组码 20）")?,
                        40 => assign_coord(&mut height, &value, "TEXT 高度（组码 40）")?,
                        50 => rotation_deg = parse_f64(&value, "TEXT 旋转角")?,
                        1 => content = value,
                        _ => {}
                    }
                }
                None => return Err(DxfError::invalid("TEXT 未正确结束")),
            }
        }

        let ix = insert_x.ok_or_else(|| DxfError::invalid("TEXT 缺少插入点 X（组码 10）"))?;
        let iy = insert_y.ok_or_else(|| DxfError::invalid("TEXT 缺少插入点 Y（组码 20）"))?;
        let height = height.ok_or_else(|| DxfError::invalid("TEXT 缺少文本高度（组码 40）"))?;

        Ok(header.into_entity(Geometry::Text(Text {
            insert: Point2::new(ix, iy),
            content,
            height,
            rotation: rotation_deg.to_radians(),
        })))
    }

    fn parse_mtext(&mut self) -> Result<Entity, DxfError> {
        let mut header = EntityHeader::default();
        let mut insert_x = None;
        let mut insert_y = None;
        let mut height = None;
        let mut reference_width: Option<f64> = None;
        let mut attachment_point: i16 = 1;
        let mut style: Option<String> = None;
        let mut fragments: Vec<String> = Vec::new();

        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((code, value)) => {
                    if header.accept(code, &value, "MTEXT")? {
                        continue;
                    }
                    match code {
                        10 => assign_coord(&mut insert_x, &value, "MTEXT 插入点 X（组码 10）")?,
                        20 => assign_coord(&mut insert_y, &value, "MTEXT 插入点 Y（组码 20）")?,
                        40 => assign_coord(&mut height, &value, "MTEXT 文本高度（组码 40）")?,
                        41 => {
                            let width = parse_f64(&value, "MTEXT 参考宽度")?;
                            reference_width = if width.abs() < f64::EPSILON {
                                None
                            } else {
                                Some(width)
                            };
                        }
                        71 => {
                            attachment_point = parse_i16(&value, "MTEXT 附着点 (组码 71)")?;
                        }
                        7 => style = Some(value.trim().to_string()),
                        // 组码 3 为超长文本的前置分段，1 为最后一段
                        1 | 3 => fragments.push(value),
                        _ => {}
                    }
                }
                None => return Err(DxfError::invalid("MTEXT 未正确结束")),
            }
        }

        let ix = insert_x.ok_or_else(|| DxfError::invalid("MTEXT 缺少插入点 X（组码 10）"))?;
        let iy = insert_y.ok_or_else(|| DxfError::invalid("MTEXT 缺少插入点 Y（组码 20）"))?;
        let height = height.ok_or_else(|| DxfError::invalid("MTEXT 缺少文本高度（组码 40）"))?;

        let content = fragments
            .into_iter()
            .map(|frag| decode_mtext_content(&frag))
            .collect::<String>();

        Ok(header.into_entity(Geometry::MText(MText {
            insert: Point2::new(ix, iy),
            content,
            height,
            reference_width,
            attachment_point,
            style,
        })))
    }

    fn parse_insert(&mut self) -> Result<Entity, DxfError> {
        let mut header = EntityHeader::default();
        let mut name = None;
        let mut insert_x = None;
        let mut insert_y = None;
        let mut scale_x: Option<f64> = None;
        let mut scale_y: Option<f64> = None;
        let mut rotation_deg: f64 = 0.0;
        let mut column_count: i32 = 1;
        let mut row_count: i32 = 1;
        let mut column_spacing: f64 = 0.0;
        let mut row_spacing: f64 = 0.0;

        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((code, value)) => {
                    if header.accept(code, &value, "INSERT")? {
                        continue;
                    }
                    match code {
                        2 => {
                            if name.is_some() {
                                return Err(DxfError::invalid("INSERT 遇到重复的块名（组码 2）"));
                            }
                            name = Some(value.trim().to_string());
                        }
                        10 => assign_coord(&mut insert_x, &value, "INSERT 插入点 X（组码 10）")?,
                        20 => assign_coord(&mut insert_y, &value, "INSERT 插入点 Y（组码 20）")?,
                        41 => scale_x = Some(parse_f64(&value, "INSERT 缩放 X")?),
                        42 => scale_y = Some(parse_f64(&value, "INSERT 缩放 Y")?),
                        50 => rotation_deg = parse_f64(&value, "INSERT 旋转角")?,
                        70 => column_count = parse_i32(&value, "INSERT 列数")?,
                        71 => row_count = parse_i32(&value, "INSERT 行数")?,
                        44 => column_spacing = parse_f64(&value, "INSERT 列间距")?,
                        45 => row_spacing = parse_f64(&value, "INSERT 行间距")?,
                        _ => {}
                    }
                }
                None => return Err(DxfError::invalid("INSERT 未正确结束")),
            }
        }

        let name = name.ok_or_else(|| DxfError::invalid("INSERT 缺少块名（组码 2）"))?;
        let ix = insert_x.ok_or_else(|| DxfError::invalid("INSERT 缺少插入点 X（组码 10）"))?;
        let iy = insert_y.ok_or_else(|| DxfError::invalid("INSERT 缺少插入点 Y（组码 20）"))?;
        let sx = scale_x.unwrap_or(1.0);
        let sy = scale_y.unwrap_or_else(|| scale_x.unwrap_or(1.0));

        // 属性（ATTRIB）不参与几何输出，连同 SEQEND 一并跳过
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => match value.as_str() {
                    "ATTRIB" => self.skip_entity_body()?,
                    "SEQEND" => {
                        self.skip_entity_body()?;
                        break;
                    }
                    _ => {
                        self.reader.put_back((0, value));
                        break;
                    }
                },
                Some((code, value)) => {
                    return Err(DxfError::invalid(format!(
                        "INSERT 属性段出现意外组码 {code} 值 {value}"
                    )));
                }
                None => break,
            }
        }

        Ok(header.into_entity(Geometry::Insert(Insert {
            block: name,
            insert: Point2::new(ix, iy),
            scale: Vector2::new(sx, sy),
            rotation: rotation_deg.to_radians(),
            column_count: u32::try_from(column_count.max(1)).unwrap_or(1),
            row_count: u32::try_from(row_count.max(1)).unwrap_or(1),
            column_spacing,
            row_spacing,
        })))
    }

    fn skip_entity_body(&mut self) -> Result<(), DxfError> {
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some(_) => continue,
                None => break,
            }
        }
        Ok(())
    }
}

/// 组码 10/20 成对出现的顶点坐标累积器。
#[derive(Debug, Default)]
struct PendingPoint {
    x: Option<f64>,
    y: Option<f64>,
}

impl PendingPoint {
    fn push_x(&mut self, x: f64, context: &str) -> Result<Option<Point2>, DxfError> {
        if let Some(y) = self.y.take() {
            return Ok(Some(Point2::new(x, y)));
        }
        if self.x.replace(x).is_some() {
            return Err(DxfError::invalid(format!("{context} 顶点缺少对应的 Y")));
        }
        Ok(None)
    }

    fn push_y(&mut self, y: f64, context: &str) -> Result<Option<Point2>, DxfError> {
        if let Some(x) = self.x.take() {
            return Ok(Some(Point2::new(x, y)));
        }
        if self.y.replace(y).is_some() {
            return Err(DxfError::invalid(format!("{context} 顶点缺少对应的 X")));
        }
        Ok(None)
    }

    fn finish(&self, context: &str) -> Result<(), DxfError> {
        if self.x.is_some() || self.y.is_some() {
            return Err(DxfError::invalid(format!(
                "{context} 顶点坐标应成对出现，检测到不完整的顶点"
            )));
        }
        Ok(())
    }
}

struct DxfReader<'a> {
    lines: std::str::Lines<'a>,
    buffer: Option<(i32, String)>,
    line_number: usize,
}

impl<'a> DxfReader<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            lines: source.lines(),
            buffer: None,
            line_number: 0,
        }
    }

    fn next_pair(&mut self) -> Result<Option<(i32, String)>, DxfError> {
        if let Some(pair) = self.buffer.take() {
            return Ok(Some(pair));
        }

        let code_line = loop {
            match self.lines.next() {
                Some(line) => {
                    self.line_number += 1;
                    // 容忍文件末尾的空行
                    if !line.trim().is_empty() {
                        break line;
                    }
                }
                None => return Ok(None),
            }
        };

        let value_line = match self.lines.next() {
            Some(line) => {
                self.line_number += 1;
                line
            }
            None => {
                return Err(DxfError::invalid(format!(
                    "文件在第 {} 行结束，缺少与组码对应的值行",
                    self.line_number
                )));
            }
        };

        let code = code_line.trim().parse::<i32>().map_err(|_| {
            DxfError::invalid(format!(
                "第 {} 行的组码 \"{}\" 无法解析为整数",
                self.line_number - 1,
                code_line.trim()
            ))
        })?;
        let value = if code == 0 {
            value_line.trim().to_string()
        } else {
            value_line.trim_end_matches('\r').to_string()
        };
        Ok(Some((code, value)))
    }

    fn put_back(&mut self, pair: (i32, String)) {
        debug_assert!(self.buffer.is_none(), "尝试多次回退 DXF pair");
        self.buffer = Some(pair);
    }
}

fn assign_coord(slot: &mut Option<f64>, raw: &str, context: &str) -> Result<(), DxfError> {
    if slot.is_some() {
        return Err(DxfError::invalid(format!("{context} 出现重复值")));
    }
    *slot = Some(parse_f64(raw, context)?);
    Ok(())
}

fn parse_f64(raw: &str, context: &str) -> Result<f64, DxfError> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| DxfError::invalid(format!("{context} 解析失败（值：\"{raw}\"）")))
}

fn parse_i32(raw: &str, context: &str) -> Result<i32, DxfError> {
    raw.trim()
        .parse::<i32>()
        .map_err(|_| DxfError::invalid(format!("{context} 解析失败（值：\"{raw}\"）")))
}

fn parse_i16(raw: &str, context: &str) -> Result<i16, DxfError> {
    let value = parse_i32(raw, context)?;
    i16::try_from(value)
        .map_err(|_| DxfError::invalid(format!("{context} 超出 i16 范围（值：{value}）")))
}

fn decode_mtext_content(raw: &str) -> String {
    let mut result = String::new();
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.next() {
                Some('P') | Some('p') => result.push('\n'),
                Some('~') => result.push(' '),
                Some('\\') => result.push('\\'),
                Some(other) => {
                    result.push('\\');
                    result.push(other);
                }
                None => result.push('\\'),
            }
        } else {
            result.push(ch);
        }
    }
    result
}

use dxf2svg_core::color::{ColorTable, Rgb};
use dxf2svg_core::document::{Entity, Layer};

/// 颜色解析结果。`Fallback` 表示索引在颜色表中不存在，按黑色绘制。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorResolution {
    Found { index: i16, rgb: Rgb },
    Fallback { index: i16 },
}

impl ColorResolution {
    #[inline]
    pub fn rgb(&self) -> Rgb {
        match self {
            ColorResolution::Found { rgb, .. } => *rgb,
            ColorResolution::Fallback { .. } => Rgb::BLACK,
        }
    }

    #[inline]
    pub fn index(&self) -> i16 {
        match self {
            ColorResolution::Found { index, .. } | ColorResolution::Fallback { index } => *index,
        }
    }
}

/// 实体颜色优先，其次图层颜色。查表失败不报错，由调用方记录诊断。
pub fn resolve_color(entity: &Entity, layer: &Layer, table: &dyn ColorTable) -> ColorResolution {
    let index = entity.color_number.unwrap_or(layer.color_number);
    match table.lookup(index) {
        Some(rgb) => ColorResolution::Found { index, rgb },
        None => ColorResolution::Fallback { index },
    }
}

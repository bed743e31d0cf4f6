use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// 指定配置文件路径的环境变量。
pub const CONFIG_ENV: &str = "DXF2SVG_CONFIG";

/// 应用配置的根结构。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub text: TextConfig,
    #[serde(default)]
    pub tessellation: TessellationConfig,
}

impl AppConfig {
    /// 从显式路径加载配置。
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// 自动发现配置文件：优先读取环境变量 `DXF2SVG_CONFIG`，否则寻找 `./config/default.toml`。
    /// 若文件缺失，则返回默认配置。
    pub fn discover() -> Result<Self, ConfigError> {
        if let Some(path) = env::var_os(CONFIG_ENV) {
            return Self::from_file(PathBuf::from(path));
        }

        let default_path = env::current_dir()
            .map(|dir| dir.join("config").join("default.toml"))
            .map_err(|source| ConfigError::Context {
                message: "获取当前工作目录失败".to_string(),
                source,
            })?;

        if default_path.exists() {
            Self::from_file(default_path)
        } else {
            Ok(Self::default())
        }
    }
}

/// 日志配置，支持设置默认等级。
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrokeWidthMode {
    #[default]
    Percent,
    Absolute,
}

/// 输出样式。`stroke_width_value` 缺省时按模式取 0.3（百分比）或 10（绝对值）。
#[derive(Debug, Clone, Deserialize)]
pub struct RenderConfig {
    #[serde(default = "RenderConfig::default_paint_all_black")]
    pub paint_all_black: bool,
    #[serde(default)]
    pub stroke_width_mode: StrokeWidthMode,
    #[serde(default)]
    pub stroke_width_value: Option<f64>,
    #[serde(default = "RenderConfig::default_text_fill")]
    pub text_fill: String,
    #[serde(default = "RenderConfig::default_text_stroke")]
    pub text_stroke: String,
}

impl RenderConfig {
    fn default_paint_all_black() -> bool {
        true
    }

    fn default_text_fill() -> String {
        "red".to_string()
    }

    fn default_text_stroke() -> String {
        "black".to_string()
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            paint_all_black: Self::default_paint_all_black(),
            stroke_width_mode: StrokeWidthMode::default(),
            stroke_width_value: None,
            text_fill: Self::default_text_fill(),
            text_stroke: Self::default_text_stroke(),
        }
    }
}

/// 文字轮廓所用字体：显式字体文件优先，其次按字族查找系统字体。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TextConfig {
    #[serde(default)]
    pub font_path: Option<PathBuf>,
    #[serde(default)]
    pub font_family: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TessellationConfig {
    #[serde(default = "TessellationConfig::default_arc_segments")]
    pub arc_segments: usize,
    #[serde(default = "TessellationConfig::default_spline_segments")]
    pub spline_segments: usize,
}

impl TessellationConfig {
    fn default_arc_segments() -> usize {
        72
    }

    fn default_spline_segments() -> usize {
        64
    }
}

impl Default for TessellationConfig {
    fn default() -> Self {
        Self {
            arc_segments: Self::default_arc_segments(),
            spline_segments: Self::default_spline_segments(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件 {path:?} 失败: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("解析配置文件 {path:?} 失败: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{message}")]
    Context {
        message: String,
        #[source]
        source: std::io::Error,
    },
}

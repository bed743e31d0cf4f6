use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use dxf2svg_config::{AppConfig, ConfigError, RenderConfig, StrokeWidthMode, TessellationConfig};
use dxf2svg_core::color::AciColorTable;
use dxf2svg_engine::tessellate::TessellationOptions;
use dxf2svg_io::{DocumentLoader, DxfFacade, IoError};
use dxf2svg_svg::glyph::{FontOutliner, GlyphOutliner, NullOutliner};
use dxf2svg_svg::options::{StrokeWidth, SvgOptions};
use dxf2svg_svg::{SvgError, SvgRenderer};
use thiserror::Error;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

const USAGE: &str = "用法：dxf2svg <input.dxf> [-o <output.svg>] [--config <file>] [--font <ttf>]";

#[derive(Debug, Default, PartialEq)]
struct CliArgs {
    input: PathBuf,
    output: Option<PathBuf>,
    config: Option<PathBuf>,
    font: Option<PathBuf>,
}

#[derive(Debug, Error)]
enum AppError {
    #[error("加载 DXF 失败: {0}")]
    Load(#[from] IoError),
    #[error("生成 SVG 失败: {0}")]
    Render(#[from] SvgError),
    #[error("写入 {path:?} 失败: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("写入标准输出失败: {0}")]
    Stdout(#[source] std::io::Error),
}

fn main() {
    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{message}");
            eprintln!("{USAGE}");
            std::process::exit(1);
        }
    };

    let config = load_configuration(args.config.clone());
    init_logging(&config);
    info!(input = %args.input.display(), "启动 dxf2svg");

    let outliner = load_outliner(args.font.as_deref(), &config);
    if let Err(err) = run(&args, &config, outliner.as_ref()) {
        error!(error = %err, "转换失败");
        std::process::exit(1);
    }
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<CliArgs, String> {
    let mut args = args.into_iter();
    let mut input: Option<PathBuf> = None;
    let mut parsed = CliArgs::default();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-o" | "--output" => {
                let path = args.next().ok_or("`-o` 需要提供输出文件路径")?;
                parsed.output = Some(PathBuf::from(path));
            }
            "--config" => {
                let path = args.next().ok_or("`--config` 需要提供配置文件路径")?;
                parsed.config = Some(PathBuf::from(path));
            }
            "--font" => {
                let path = args.next().ok_or("`--font` 需要提供字体文件路径")?;
                parsed.font = Some(PathBuf::from(path));
            }
            other if other.starts_with('-') => return Err(format!("未知参数：{other}")),
            other => {
                if input.replace(PathBuf::from(other)).is_some() {
                    return Err("只能指定一个输入文件".to_string());
                }
            }
        }
    }

    parsed.input = input.ok_or("缺少输入 DXF 文件")?;
    Ok(parsed)
}

fn load_configuration(override_path: Option<PathBuf>) -> AppConfig {
    match override_path {
        Some(path) => AppConfig::from_file(&path).unwrap_or_else(|err| {
            warn!(path = %path.display(), error = %err, "加载指定配置失败，使用默认配置");
            AppConfig::default()
        }),
        None => match AppConfig::discover() {
            Ok(cfg) => cfg,
            Err(err) => {
                match &err {
                    ConfigError::Io { path, .. } | ConfigError::Parse { path, .. } => {
                        warn!(path = %path.display(), error = %err, "加载默认配置失败，使用内建默认值");
                    }
                    ConfigError::Context { .. } => {
                        warn!(error = %err, "加载默认配置失败，使用内建默认值");
                    }
                }
                AppConfig::default()
            }
        },
    }
}

fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_new(config.logging.level.clone()).unwrap_or_else(|_| EnvFilter::new("info"));
    // SVG 可能写入标准输出，日志统一走标准错误
    let subscriber = fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if subscriber.try_init().is_err() {
        // 已初始化，忽略
    }
}

/// 字体只在启动时加载一次：命令行参数优先，其次配置文件，最后查找系统字体。
fn load_outliner(font_override: Option<&Path>, config: &AppConfig) -> Box<dyn GlyphOutliner> {
    let explicit = font_override.or(config.text.font_path.as_deref());
    let loaded = match explicit {
        Some(path) => FontOutliner::from_file(path),
        None => FontOutliner::from_system(config.text.font_family.as_deref()),
    };
    match loaded {
        Ok(outliner) => Box::new(outliner),
        Err(err) => {
            warn!(error = %err, "无法加载字体，文字将不会输出");
            Box::new(NullOutliner)
        }
    }
}

fn svg_options(render: &RenderConfig) -> SvgOptions {
    let stroke_width = match render.stroke_width_mode {
        StrokeWidthMode::Percent => StrokeWidth::Percent(
            render
                .stroke_width_value
                .unwrap_or(StrokeWidth::DEFAULT_PERCENT),
        ),
        StrokeWidthMode::Absolute => StrokeWidth::Absolute(
            render
                .stroke_width_value
                .unwrap_or(StrokeWidth::DEFAULT_ABSOLUTE),
        ),
    };
    SvgOptions {
        paint_all_black: render.paint_all_black,
        stroke_width,
        text_fill: render.text_fill.clone(),
        text_stroke: render.text_stroke.clone(),
    }
}

fn tessellation_options(config: &TessellationConfig) -> TessellationOptions {
    TessellationOptions {
        arc_segments: config.arc_segments,
        spline_segments: config.spline_segments,
    }
}

fn convert(
    input: &Path,
    config: &AppConfig,
    outliner: &dyn GlyphOutliner,
) -> Result<String, AppError> {
    let document = DxfFacade::new().load(input)?;
    let colors = AciColorTable::new();
    let renderer = SvgRenderer::new(svg_options(&config.render), &colors, outliner)
        .with_tessellation(tessellation_options(&config.tessellation));
    let svg = renderer.render(&document)?;
    if !svg.diagnostics.is_empty() {
        warn!(count = svg.diagnostics.len(), "转换过程中出现可恢复问题");
    }
    Ok(svg.markup)
}

fn run(args: &CliArgs, config: &AppConfig, outliner: &dyn GlyphOutliner) -> Result<(), AppError> {
    let markup = convert(&args.input, config, outliner)?;
    match &args.output {
        Some(path) => {
            fs::write(path, &markup).map_err(|source| AppError::Write {
                path: path.clone(),
                source,
            })?;
            info!(output = %path.display(), bytes = markup.len(), "SVG 已写入");
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout
                .write_all(markup.as_bytes())
                .and_then(|()| stdout.write_all(b"\n"))
                .map_err(AppError::Stdout)?;
        }
    }
    Ok(())
}

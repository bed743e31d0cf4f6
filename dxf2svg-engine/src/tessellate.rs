use std::f64::consts::TAU;

use dxf2svg_core::document::{Arc, Circle, Ellipse, Geometry, Polyline, Spline};
use dxf2svg_core::geometry::Point2;

use crate::denormalise::ResolvedEntity;
use crate::errors::EngineError;

const DEFAULT_ARC_SEGMENTS: usize = 72;
const DEFAULT_SPLINE_SEGMENTS: usize = 64;
const MIN_ARC_SEGMENTS: usize = 3;

/// 曲线离散精度。`arc_segments` 为整圆的分段数，圆弧按扫角比例分配。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TessellationOptions {
    pub arc_segments: usize,
    pub spline_segments: usize,
}

impl Default for TessellationOptions {
    fn default() -> Self {
        Self {
            arc_segments: DEFAULT_ARC_SEGMENTS,
            spline_segments: DEFAULT_SPLINE_SEGMENTS,
        }
    }
}

impl TessellationOptions {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.arc_segments < MIN_ARC_SEGMENTS {
            return Err(EngineError::InvalidOptions(format!(
                "arc_segments 至少为 {MIN_ARC_SEGMENTS}（当前 {}）",
                self.arc_segments
            )));
        }
        if self.spline_segments == 0 {
            return Err(EngineError::InvalidOptions(
                "spline_segments 必须大于 0".to_string(),
            ));
        }
        Ok(())
    }

    fn segments_for(&self, sweep: f64) -> usize {
        let ratio = sweep.abs() / TAU;
        ((self.arc_segments as f64) * ratio).ceil().max(1.0) as usize
    }
}

/// 将展开后的实体离散为折线（绘图坐标，Y 轴向上），并按顺序应用其累积变换。
///
/// 文字类实体不产生几何，返回空折线。
pub fn tessellate(
    resolved: &ResolvedEntity,
    options: &TessellationOptions,
) -> Result<Vec<Point2>, EngineError> {
    options.validate()?;
    let mut points = match &resolved.entity.geometry {
        Geometry::Line(line) => vec![line.start, line.end],
        Geometry::Circle(circle) => circle_points(circle, options),
        Geometry::Arc(arc) => arc_points(arc, options),
        Geometry::Ellipse(ellipse) => ellipse_points(ellipse, options),
        Geometry::Polyline(polyline) => polyline_points(polyline, options),
        Geometry::Spline(spline) => spline_points(spline, options)?,
        Geometry::Text(_) | Geometry::MText(_) | Geometry::Insert(_) => Vec::new(),
    };

    for transform in &resolved.transforms {
        for point in &mut points {
            *point = transform.apply(*point);
        }
    }
    Ok(points)
}

fn sample_circle(
    center: Point2,
    radius: f64,
    start: f64,
    sweep: f64,
    segments: usize,
) -> impl Iterator<Item = Point2> {
    (0..=segments).map(move |step| {
        let angle = start + sweep * step as f64 / segments as f64;
        let (sin, cos) = angle.sin_cos();
        Point2::new(center.x() + radius * cos, center.y() + radius * sin)
    })
}

/// 逆时针扫角，落在 (0, 2π] 内；起止角重合视为整圆。
fn ccw_sweep(start: f64, end: f64) -> f64 {
    let sweep = (end - start).rem_euclid(TAU);
    if sweep <= f64::EPSILON { TAU } else { sweep }
}

fn circle_points(circle: &Circle, options: &TessellationOptions) -> Vec<Point2> {
    let segments = options.arc_segments;
    let mut points: Vec<Point2> = sample_circle(circle.center, circle.radius, 0.0, TAU, segments)
        .take(segments)
        .collect();
    // 末点与首点精确重合
    if let Some(first) = points.first().copied() {
        points.push(first);
    }
    points
}

fn arc_points(arc: &Arc, options: &TessellationOptions) -> Vec<Point2> {
    let sweep = ccw_sweep(arc.start_angle, arc.end_angle);
    let segments = options.segments_for(sweep);
    sample_circle(arc.center, arc.radius, arc.start_angle, sweep, segments).collect()
}

fn ellipse_points(ellipse: &Ellipse, options: &TessellationOptions) -> Vec<Point2> {
    let major = ellipse.major_axis;
    let minor = (-major.y() * ellipse.ratio, major.x() * ellipse.ratio);
    let sweep = ccw_sweep(ellipse.start_parameter, ellipse.end_parameter);
    let segments = options.segments_for(sweep);
    (0..=segments)
        .map(|step| {
            let t = ellipse.start_parameter + sweep * step as f64 / segments as f64;
            let (sin, cos) = t.sin_cos();
            Point2::new(
                ellipse.center.x() + major.x() * cos + minor.0 * sin,
                ellipse.center.y() + major.y() * cos + minor.1 * sin,
            )
        })
        .collect()
}

fn polyline_points(polyline: &Polyline, options: &TessellationOptions) -> Vec<Point2> {
    let vertices = &polyline.vertices;
    let mut points = Vec::with_capacity(vertices.len() + 1);
    for (index, vertex) in vertices.iter().enumerate() {
        points.push(vertex.position);
        let next = match vertices.get(index + 1) {
            Some(next) => next,
            None if polyline.is_closed && vertices.len() > 1 => &vertices[0],
            None => break,
        };
        if vertex.bulge.abs() > f64::EPSILON {
            bulge_interior(vertex.position, next.position, vertex.bulge, options, &mut points);
        }
    }
    if polyline.is_closed && vertices.len() > 1 {
        points.push(vertices[0].position);
    }
    points
}

/// bulge = tan(θ/4)，正值为逆时针。仅写入两端点之间的内部采样点。
fn bulge_interior(
    start: Point2,
    end: Point2,
    bulge: f64,
    options: &TessellationOptions,
    out: &mut Vec<Point2>,
) {
    let chord = start.distance(end);
    if chord <= f64::EPSILON {
        return;
    }
    let theta = 4.0 * bulge.atan();
    let chord_vec = start.vector_to(end);
    let normal = (-chord_vec.y() / chord, chord_vec.x() / chord);
    let offset = chord / (2.0 * (theta / 2.0).tan());
    let center = Point2::new(
        (start.x() + end.x()) / 2.0 + normal.0 * offset,
        (start.y() + end.y()) / 2.0 + normal.1 * offset,
    );
    let radius = center.distance(start);
    let start_angle = (start.y() - center.y()).atan2(start.x() - center.x());
    let segments = options.segments_for(theta);
    out.extend(
        sample_circle(center, radius, start_angle, theta, segments)
            .skip(1)
            .take(segments.saturating_sub(1)),
    );
}

fn spline_points(spline: &Spline, options: &TessellationOptions) -> Result<Vec<Point2>, EngineError> {
    let mut points = if spline.control_points.len() >= 2 {
        evaluate_bspline(spline, options.spline_segments)?
    } else if !spline.fit_points.is_empty() {
        spline.fit_points.clone()
    } else {
        spline.control_points.clone()
    };

    if spline.is_closed {
        if let (Some(first), Some(last)) = (points.first().copied(), points.last().copied()) {
            if first.distance(last) > f64::EPSILON {
                points.push(first);
            }
        }
    }
    Ok(points)
}

/// 以 de Boor 算法按参数等分采样（有理样条在齐次坐标下求值）。
fn evaluate_bspline(spline: &Spline, segments: usize) -> Result<Vec<Point2>, EngineError> {
    let controls = &spline.control_points;
    let count = controls.len();
    let degree = usize::try_from(spline.degree.max(1))
        .unwrap_or(1)
        .min(count - 1);

    let knots = if spline.knot_values.len() == count + degree + 1 {
        spline.knot_values.clone()
    } else {
        clamped_uniform_knots(count, degree)
    };
    if knots.windows(2).any(|pair| pair[1] < pair[0]) {
        return Err(EngineError::InvalidSpline {
            reason: "节点向量不是非递减序列".to_string(),
        });
    }

    let weights: Vec<f64> = if spline.weights.len() == count {
        spline.weights.clone()
    } else {
        vec![1.0; count]
    };
    if weights.iter().any(|w| *w <= 0.0) {
        return Err(EngineError::InvalidSpline {
            reason: "权重必须为正数".to_string(),
        });
    }

    let domain_start = knots[degree];
    let domain_end = knots[count];
    if domain_end - domain_start <= f64::EPSILON {
        return Err(EngineError::InvalidSpline {
            reason: "参数定义域为空".to_string(),
        });
    }

    let points = (0..=segments)
        .map(|step| {
            let t = domain_start + (domain_end - domain_start) * step as f64 / segments as f64;
            de_boor(controls, &weights, &knots, degree, t)
        })
        .collect();
    Ok(points)
}

fn clamped_uniform_knots(count: usize, degree: usize) -> Vec<f64> {
    let interior = count - degree;
    let mut knots = Vec::with_capacity(count + degree + 1);
    knots.extend(std::iter::repeat(0.0).take(degree + 1));
    knots.extend((1..interior).map(|k| k as f64));
    knots.extend(std::iter::repeat(interior as f64).take(degree + 1));
    knots
}

fn de_boor(controls: &[Point2], weights: &[f64], knots: &[f64], degree: usize, t: f64) -> Point2 {
    let count = controls.len();
    let mut span = degree;
    for k in degree..count {
        if knots[k] <= t && knots[k] < knots[k + 1] {
            span = k;
        }
    }

    let mut d: Vec<[f64; 3]> = (0..=degree)
        .map(|j| {
            let index = j + span - degree;
            let w = weights[index];
            [controls[index].x() * w, controls[index].y() * w, w]
        })
        .collect();

    for r in 1..=degree {
        for j in (r..=degree).rev() {
            let i = j + span - degree;
            let denom = knots[i + degree + 1 - r] - knots[i];
            let alpha = if denom.abs() <= f64::EPSILON {
                0.0
            } else {
                (t - knots[i]) / denom
            };
            for c in 0..3 {
                d[j][c] = (1.0 - alpha) * d[j - 1][c] + alpha * d[j][c];
            }
        }
    }

    let [x, y, w] = d[degree];
    Point2::new(x / w, y / w)
}

use dxf2svg_core::document::{Document, Entity, Geometry, Insert};
use dxf2svg_core::geometry::{Point2, Vector2};
use tracing::{debug, warn};

/// 块参照允许的最大嵌套深度。
pub const MAX_INSERT_DEPTH: usize = 32;

/// ACI 0：随块颜色。
const COLOR_BY_BLOCK: i16 = 0;

/// 一次块插入带来的变换：先缩放，再旋转（弧度），最后平移到插入点。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub x: f64,
    pub y: f64,
    pub x_scale: f64,
    pub y_scale: f64,
    pub rotation: f64,
}

impl Transform {
    pub fn translation(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            x_scale: 1.0,
            y_scale: 1.0,
            rotation: 0.0,
        }
    }

    #[inline]
    pub fn apply(&self, point: Point2) -> Point2 {
        let scaled = point.scale(self.x_scale, self.y_scale).rotate(self.rotation);
        Point2::new(scaled.x() + self.x, scaled.y() + self.y)
    }
}

/// 展开后的实体：几何保持在所属块的局部坐标中，`transforms` 按应用顺序排列（最内层插入在前）。
#[derive(Debug, Clone)]
pub struct ResolvedEntity {
    pub entity: Entity,
    pub transforms: Vec<Transform>,
}

impl ResolvedEntity {
    pub fn new(entity: Entity) -> Self {
        Self {
            entity,
            transforms: Vec::new(),
        }
    }

    #[inline]
    pub fn kind(&self) -> &'static str {
        self.entity.kind()
    }
}

/// 将文档展开为扁平、有序的实体序列，块参照被替换为块内实体。
///
/// 找不到块定义、引用正在展开的块或嵌套过深的 INSERT 会记录警告并跳过，不会中断整体展开。
pub fn denormalise(document: &Document) -> Vec<ResolvedEntity> {
    let mut resolved = Vec::new();
    let mut stack = Vec::new();
    let mut active = Vec::new();
    for entity in document.entities() {
        expand(document, entity, &mut stack, &mut active, &mut resolved);
    }
    debug!(
        source = document.entity_count(),
        resolved = resolved.len(),
        "实体展开完成"
    );
    resolved
}

fn expand<'a>(
    document: &'a Document,
    entity: &Entity,
    stack: &mut Vec<Transform>,
    active: &mut Vec<&'a str>,
    out: &mut Vec<ResolvedEntity>,
) {
    let insert = match &entity.geometry {
        Geometry::Insert(insert) => insert,
        _ => {
            out.push(ResolvedEntity {
                entity: entity.clone(),
                transforms: stack.iter().rev().copied().collect(),
            });
            return;
        }
    };

    if active.contains(&insert.block.as_str()) {
        warn!(block = %insert.block, depth = stack.len(), "块参照引用自身，已跳过");
        return;
    }
    if stack.len() >= MAX_INSERT_DEPTH {
        warn!(block = %insert.block, depth = stack.len(), "块参照嵌套过深，已跳过");
        return;
    }
    let Some(block) = document.block(&insert.block) else {
        warn!(block = %insert.block, layer = %entity.layer, "未找到块定义，已跳过");
        return;
    };

    let offset = Vector2::new(-block.base_point.x(), -block.base_point.y());
    active.push(block.name.as_str());
    for transform in array_transforms(insert) {
        stack.push(transform);
        for child in &block.entities {
            let mut child = child.clone();
            child.translate(offset);
            child.layer = entity.layer.clone();
            if matches!(child.color_number, None | Some(COLOR_BY_BLOCK)) {
                child.color_number = entity.color_number;
            }
            expand(document, &child, stack, active, out);
        }
        stack.pop();
    }
    active.pop();
}

/// 按行列阵列展开 INSERT，行优先。阵列偏移不随插入角度旋转。
fn array_transforms(insert: &Insert) -> impl Iterator<Item = Transform> + '_ {
    let rows = insert.row_count.max(1);
    let columns = insert.column_count.max(1);
    (0..rows).flat_map(move |row| {
        (0..columns).map(move |column| Transform {
            x: insert.insert.x() + f64::from(column) * insert.column_spacing,
            y: insert.insert.y() + f64::from(row) * insert.row_spacing,
            x_scale: insert.scale.x(),
            y_scale: insert.scale.y(),
            rotation: insert.rotation,
        })
    })
}

#[cfg(test)]
mod tests {
    use dxf2svg_core::document::{BlockDefinition, Line};

    use super::*;

    fn line_entity(layer: &str, start: (f64, f64), end: (f64, f64)) -> Entity {
        Entity::new(
            layer,
            Geometry::Line(Line {
                start: Point2::new(start.0, start.1),
                end: Point2::new(end.0, end.1),
            }),
        )
    }

    fn line_start(resolved: &ResolvedEntity) -> Point2 {
        match &resolved.entity.geometry {
            Geometry::Line(line) => line.start,
            other => panic!("expected line, got {}", other.kind()),
        }
    }

    #[test]
    fn plain_entities_pass_through_in_order() {
        let mut doc = Document::new();
        doc.add_line(Point2::new(0.0, 0.0), Point2::new(1.0, 0.0), "A");
        doc.add_circle(Point2::new(0.0, 0.0), 1.0, "B");
        doc.add_mtext(Point2::new(0.0, 0.0), "x", 1.0, None, "C");

        let resolved = denormalise(&doc);
        let kinds: Vec<&str> = resolved.iter().map(ResolvedEntity::kind).collect();
        assert_eq!(kinds, vec!["LINE", "CIRCLE", "MTEXT"]);
        assert!(resolved.iter().all(|r| r.transforms.is_empty()));
    }

    #[test]
    fn insert_shifts_by_base_point_and_takes_insert_layer() {
        let mut doc = Document::new();
        let mut block = BlockDefinition::new("DOOR", Point2::new(1.0, 1.0));
        block.entities.push(line_entity("0", (1.0, 1.0), (2.0, 1.0)));
        block
            .entities
            .push(line_entity("0", (3.0, 3.0), (4.0, 4.0)).with_color(5));
        doc.add_block_definition(block);

        let mut insert = Insert::new("DOOR", Point2::new(10.0, 20.0));
        insert.scale = Vector2::new(2.0, 3.0);
        doc.add_entity(Entity::new("DOORS", Geometry::Insert(insert)).with_color(1));

        let resolved = denormalise(&doc);
        assert_eq!(resolved.len(), 2);
        assert_eq!(line_start(&resolved[0]), Point2::new(0.0, 0.0));
        assert_eq!(line_start(&resolved[1]), Point2::new(2.0, 2.0));
        assert!(resolved.iter().all(|r| r.entity.layer == "DOORS"));
        assert_eq!(resolved[0].entity.color_number, Some(1), "随块颜色继承 INSERT");
        assert_eq!(resolved[1].entity.color_number, Some(5));
        assert_eq!(
            resolved[0].transforms,
            vec![Transform {
                x: 10.0,
                y: 20.0,
                x_scale: 2.0,
                y_scale: 3.0,
                rotation: 0.0,
            }]
        );
    }

    #[test]
    fn nested_inserts_list_innermost_transform_first() {
        let mut doc = Document::new();
        let mut inner = BlockDefinition::new("INNER", Point2::new(0.0, 0.0));
        inner.entities.push(line_entity("0", (0.0, 0.0), (1.0, 0.0)));
        doc.add_block_definition(inner);

        let mut outer = BlockDefinition::new("OUTER", Point2::new(0.0, 0.0));
        outer.entities.push(Entity::new(
            "0",
            Geometry::Insert(Insert::new("INNER", Point2::new(5.0, 0.0))),
        ));
        doc.add_block_definition(outer);

        doc.add_insert(Insert::new("OUTER", Point2::new(100.0, 50.0)), "TOP");

        let resolved = denormalise(&doc);
        assert_eq!(resolved.len(), 1);
        let transforms = &resolved[0].transforms;
        assert_eq!(transforms.len(), 2);
        assert_eq!((transforms[0].x, transforms[0].y), (5.0, 0.0));
        assert_eq!((transforms[1].x, transforms[1].y), (100.0, 50.0));
        assert_eq!(resolved[0].entity.layer, "TOP");
    }

    #[test]
    fn array_insert_yields_one_copy_per_cell() {
        let mut doc = Document::new();
        let mut block = BlockDefinition::new("CELL", Point2::new(0.0, 0.0));
        block.entities.push(line_entity("0", (0.0, 0.0), (1.0, 1.0)));
        doc.add_block_definition(block);

        let mut insert = Insert::new("CELL", Point2::new(0.0, 0.0));
        insert.column_count = 3;
        insert.row_count = 2;
        insert.column_spacing = 10.0;
        insert.row_spacing = 5.0;
        doc.add_insert(insert, "GRID");

        let offsets: Vec<(f64, f64)> = denormalise(&doc)
            .iter()
            .map(|r| (r.transforms[0].x, r.transforms[0].y))
            .collect();
        assert_eq!(
            offsets,
            vec![
                (0.0, 0.0),
                (10.0, 0.0),
                (20.0, 0.0),
                (0.0, 5.0),
                (10.0, 5.0),
                (20.0, 5.0),
            ]
        );
    }

    #[test]
    fn missing_and_self_referencing_blocks_are_skipped() {
        let mut doc = Document::new();
        let mut looped = BlockDefinition::new("LOOP", Point2::new(0.0, 0.0));
        looped.entities.push(line_entity("0", (0.0, 0.0), (1.0, 0.0)));
        looped.entities.push(Entity::new(
            "0",
            Geometry::Insert(Insert::new("LOOP", Point2::new(1.0, 0.0))),
        ));
        looped.entities.push(Entity::new(
            "0",
            Geometry::Insert(Insert::new("LOOP", Point2::new(0.0, 1.0))),
        ));
        doc.add_block_definition(looped);

        doc.add_insert(Insert::new("NOPE", Point2::new(0.0, 0.0)), "0");
        doc.add_insert(Insert::new("LOOP", Point2::new(0.0, 0.0)), "0");

        let resolved = denormalise(&doc);
        assert_eq!(resolved.len(), 1, "自引用的 INSERT 应被跳过");
        assert_eq!(resolved[0].transforms.len(), 1);
    }

    #[test]
    fn mutually_recursive_blocks_stop_at_the_cycle() {
        let mut doc = Document::new();
        let mut ping = BlockDefinition::new("PING", Point2::new(0.0, 0.0));
        ping.entities.push(line_entity("0", (0.0, 0.0), (1.0, 0.0)));
        ping.entities.push(Entity::new(
            "0",
            Geometry::Insert(Insert::new("PONG", Point2::new(1.0, 0.0))),
        ));
        doc.add_block_definition(ping);

        let mut pong = BlockDefinition::new("PONG", Point2::new(0.0, 0.0));
        pong.entities.push(line_entity("0", (0.0, 0.0), (0.0, 1.0)));
        pong.entities.push(Entity::new(
            "0",
            Geometry::Insert(Insert::new("PING", Point2::new(0.0, 1.0))),
        ));
        doc.add_block_definition(pong);

        // 同一块在兄弟分支中可重复使用
        doc.add_insert(Insert::new("PING", Point2::new(0.0, 0.0)), "0");
        doc.add_insert(Insert::new("PONG", Point2::new(5.0, 0.0)), "0");

        let depths: Vec<usize> = denormalise(&doc)
            .iter()
            .map(|r| r.transforms.len())
            .collect();
        assert_eq!(depths, vec![1, 2, 1, 2]);
    }

    #[test]
    fn transform_applies_scale_then_rotation_then_translation() {
        let transform = Transform {
            x: 10.0,
            y: 0.0,
            x_scale: 2.0,
            y_scale: 1.0,
            rotation: std::f64::consts::FRAC_PI_2,
        };
        let point = transform.apply(Point2::new(1.0, 0.0));
        assert!((point.x() - 10.0).abs() < 1e-9);
        assert!((point.y() - 2.0).abs() < 1e-9);
        assert_eq!(
            Transform::translation(3.0, 4.0).apply(Point2::new(1.0, 1.0)),
            Point2::new(4.0, 5.0)
        );
    }
}

use std::fmt;

use cadscan_core::document::{Document, Entity};
use cadscan_core::geometry::{Bounds2D, GeometryError, Point2, normalize};

/// 小于该值的最小坐标按 0 处理。
pub const ORIGIN_SNAP: f64 = 1e-10;

/// 图纸范围：左下角与右上角。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extents {
    pub lower_left: Point2,
    pub upper_right: Point2,
}

impl fmt::Display for Extents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}) - ({}, {})",
            self.lower_left.x(),
            self.lower_left.y(),
            self.upper_right.x(),
            self.upper_right.y()
        )
    }
}

/// 统计 LINE 端点、LWPOLYLINE 顶点与 POINT 位置的范围，其余实体不参与。
/// 没有任何参与统计的实体时返回 `None`。
pub fn drawing_extents(document: &Document) -> Result<Option<Extents>, GeometryError> {
    let mut bounds = Bounds2D::empty();
    for (_, entity) in document.entities() {
        match entity {
            Entity::Point(point) => bounds.include_point(point.location.xy()),
            Entity::Line(line) => {
                bounds.include_point(line.start.xy());
                bounds.include_point(line.end.xy());
            }
            Entity::LwPolyline(polyline) => {
                for vertex in &polyline.vertices {
                    bounds.include_point(normalize(&vertex.raw())?.xy());
                }
            }
            _ => {}
        }
    }

    if bounds.is_empty() {
        return Ok(None);
    }

    let min = bounds.min();
    let snap = |value: f64| if value < ORIGIN_SNAP { 0.0 } else { value };
    Ok(Some(Extents {
        lower_left: Point2::new(snap(min.x()), snap(min.y())),
        upper_right: bounds.max(),
    }))
}

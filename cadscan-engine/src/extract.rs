use cadscan_core::document::{Dimension, Document, Entity, EntityId};
use cadscan_core::geometry::{
    BoundingBox, GeometryError, Point3, RawCoordinate, arc_length, control_polygon_length,
    distance, normalize, polygon_area, polyline_length,
};
use cadscan_core::records::{
    ArcRecord, ExtractionResult, LINEAR_DIMENSION_TYPE, LineRecord, LinearDimensionRecord,
    PolylineRecord, SplineRecord, TextRecord,
};
use tracing::{debug, warn};

use crate::dimension::{extension_points, representative_point, resolve_measurement};
use crate::errors::ExtractError;

/// 单次提取的计数。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractionStats {
    pub visited: usize,
    pub included: usize,
    /// 不参与本轮提取的实体（标注与未识别类型）。
    pub ignored: usize,
    /// 处理失败而被跳过的实体。
    pub skipped: usize,
}

/// 在查询框内按实体类型提取记录。只读取文档，不做修改。
pub struct Extractor<'a> {
    document: &'a Document,
    bbox: BoundingBox,
}

impl<'a> Extractor<'a> {
    pub fn new(document: &'a Document, bbox: BoundingBox) -> Self {
        Self { document, bbox }
    }

    #[inline]
    pub fn bbox(&self) -> BoundingBox {
        self.bbox
    }

    pub fn extract(&self) -> ExtractionResult {
        self.extract_with_stats().0
    }

    pub fn extract_with_stats(&self) -> (ExtractionResult, ExtractionStats) {
        let mut result = ExtractionResult::new();
        let mut stats = ExtractionStats::default();

        for (id, entity) in self.document.entities() {
            stats.visited += 1;
            match self.collect(entity, &mut result) {
                Ok(Collected::Included) => stats.included += 1,
                Ok(Collected::Outside) => {}
                Ok(Collected::Ignored) => stats.ignored += 1,
                Err(err) => {
                    stats.skipped += 1;
                    warn!(
                        entity = id.get(),
                        kind = entity.kind_name(),
                        error = %err,
                        "跳过无法处理的实体"
                    );
                }
            }
        }

        debug!(
            bbox = %self.bbox,
            visited = stats.visited,
            included = stats.included,
            skipped = stats.skipped,
            "查询框提取完成"
        );
        (result, stats)
    }

    fn collect(
        &self,
        entity: &Entity,
        result: &mut ExtractionResult,
    ) -> Result<Collected, ExtractError> {
        let included = match entity {
            Entity::Point(point) => {
                let location = normalize(&RawCoordinate::from(point.location))?;
                let inside = self.inside(location)?;
                if inside {
                    result.points.push(location);
                }
                inside
            }
            Entity::Line(line) => {
                let start = normalize(&RawCoordinate::from(line.start))?;
                let end = normalize(&RawCoordinate::from(line.end))?;
                let inside = self.inside(start)? || self.inside(end)?;
                if inside {
                    result.lines.push(LineRecord {
                        start,
                        end,
                        length: distance(start, end),
                    });
                }
                inside
            }
            Entity::LwPolyline(polyline) => {
                let points = polyline
                    .vertices
                    .iter()
                    .map(|vertex| normalize(&vertex.raw()))
                    .collect::<Result<Vec<_>, _>>()?;
                let inside = self.any_inside(&points)?;
                if inside {
                    result.lwpolylines.push(PolylineRecord {
                        area: polyline.is_closed.then(|| polygon_area(&points)),
                        length: polyline_length(&points),
                        is_closed: polyline.is_closed,
                        points,
                    });
                }
                inside
            }
            Entity::Spline(spline) => {
                let points = spline
                    .control_points
                    .iter()
                    .map(|point| normalize(&RawCoordinate::from(*point)))
                    .collect::<Result<Vec<_>, _>>()?;
                let inside = self.any_inside(&points)?;
                if inside {
                    result.splines.push(SplineRecord {
                        length: control_polygon_length(&points),
                        points,
                    });
                }
                inside
            }
            Entity::Arc(arc) => {
                let center = normalize(&RawCoordinate::from(arc.center))?;
                // 只看圆心，不考虑弧段本身是否穿过查询框
                let inside = self.inside(center)?;
                if inside {
                    result.arcs.push(ArcRecord {
                        center,
                        radius: arc.radius,
                        start_angle: arc.start_angle,
                        end_angle: arc.end_angle,
                        length: arc_length(arc.radius, arc.start_angle, arc.end_angle),
                    });
                }
                inside
            }
            Entity::Text(text) => {
                let location = normalize(&RawCoordinate::from(text.insert))?;
                let inside = self.inside(location)?;
                if inside {
                    result.texts.push(TextRecord {
                        text: text.content.clone(),
                        location,
                        height: text.height,
                    });
                }
                inside
            }
            Entity::MText(mtext) => {
                let location = normalize(&RawCoordinate::from(mtext.insert))?;
                let inside = self.inside(location)?;
                if inside {
                    result.mtexts.push(TextRecord {
                        text: mtext.content.clone(),
                        location,
                        height: mtext.height,
                    });
                }
                inside
            }
            // 标注由窗口搜索单独收集
            Entity::Dimension(_) | Entity::Other(_) => return Ok(Collected::Ignored),
        };

        Ok(if included {
            Collected::Included
        } else {
            Collected::Outside
        })
    }

    #[inline]
    fn inside(&self, point: Point3) -> Result<bool, GeometryError> {
        self.bbox.contains_coordinate(&point.to_array())
    }

    fn any_inside(&self, points: &[Point3]) -> Result<bool, GeometryError> {
        for point in points {
            if self.inside(*point)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

enum Collected {
    Included,
    Outside,
    Ignored,
}

/// 只扫描 DIMENSION 实体，收集代表点落在查询框内的线性标注。
/// 缺少定义点的标注记录一条警告后跳过。
pub fn extract_linear_dimensions(
    document: &Document,
    bbox: BoundingBox,
) -> Vec<LinearDimensionRecord> {
    let mut records = Vec::new();
    for (id, dimension) in document.dimensions() {
        match linear_dimension_record(document, id, dimension, bbox) {
            Ok(Some(record)) => records.push(record),
            Ok(None) => {}
            Err(err) => warn!(entity = id.get(), error = %err, "跳过缺少属性的标注"),
        }
    }
    records
}

fn linear_dimension_record(
    document: &Document,
    id: EntityId,
    dimension: &Dimension,
    bbox: BoundingBox,
) -> Result<Option<LinearDimensionRecord>, ExtractError> {
    let Some((x, y)) = representative_point(dimension)? else {
        return Ok(None);
    };
    if !bbox.contains_xy(x, y) {
        return Ok(None);
    }

    let (start, end) = extension_points(dimension)?;
    let line = dimension
        .definition_point
        .ok_or(ExtractError::AnnotationAttributeMissing {
            attribute: "defpoint",
        })?;
    let (measurement, raw_text) = resolve_measurement(document, dimension)?;
    debug!(entity = id.get(), %measurement, "命中线性标注");

    Ok(Some(LinearDimensionRecord {
        kind: LINEAR_DIMENSION_TYPE.to_string(),
        text: measurement.to_string(),
        measurement,
        raw_text,
        start_point: start.into(),
        end_point: end.into(),
        dimension_line_position: line.into(),
    }))
}

//! 线性标注的比例、测量值与代表点。

use cadscan_core::document::{Dimension, Document};
use cadscan_core::geometry::{Point3, distance};
use cadscan_core::records::Measurement;

use crate::errors::ExtractError;

/// 标注文字中表示“使用实测值”的占位符。
pub const MEASUREMENT_PLACEHOLDER: &str = "<>";

/// 标注的线性比例：实体覆盖 → 标注样式 → 1.0。
pub fn resolve_scale(document: &Document, dimension: &Dimension) -> f64 {
    if let Some(scale) = dimension.linear_scale {
        return scale;
    }
    document
        .dimension_style(&dimension.style_name)
        .and_then(|style| style.linear_scale)
        .unwrap_or(1.0)
}

/// 返回标注值以及原始标注文字。
///
/// 显式文字（非空且不是 `<>`）优先：能解析成有限数字时给出数值，否则原样作为文本。
/// 没有可用文字时，取两个尺寸界线原点的距离乘以比例后取整（银行家舍入）。
pub fn resolve_measurement(
    document: &Document,
    dimension: &Dimension,
) -> Result<(Measurement, Option<String>), ExtractError> {
    let raw_text = dimension.text.clone();
    if let Some(text) = explicit_text(dimension) {
        let measurement = match text.parse::<f64>() {
            Ok(value) if value.is_finite() => Measurement::Number(value),
            _ => Measurement::Text(text.to_string()),
        };
        return Ok((measurement, raw_text));
    }

    let (first, second) = extension_points(dimension)?;
    let scale = resolve_scale(document, dimension);
    let value = (distance(first, second) * scale).round_ties_even();
    Ok((Measurement::Number(value), raw_text))
}

/// 判定查询框时使用的代表点，非线性标注返回 `None`。
///
/// 两个尺寸界线原点在 X 方向拉开得更远时，取尺寸线位置的 X 与两点 Y 的向下取整中点；
/// 否则（含相等）取尺寸线位置的 Y 与两点 X 的向下取整中点。
pub fn representative_point(dimension: &Dimension) -> Result<Option<(f64, f64)>, ExtractError> {
    if !dimension.kind.is_linear() {
        return Ok(None);
    }
    let (first, second) = extension_points(dimension)?;
    let line = dimension
        .definition_point
        .ok_or(ExtractError::AnnotationAttributeMissing {
            attribute: "defpoint",
        })?;

    let dx = (first.x() - second.x()).abs();
    let dy = (first.y() - second.y()).abs();
    let point = if dx > dy {
        (line.x(), floor_midpoint(first.y(), second.y()))
    } else {
        (floor_midpoint(first.x(), second.x()), line.y())
    };
    Ok(Some(point))
}

/// 第一、第二尺寸界线原点（组码 13 / 14）。
pub(crate) fn extension_points(dimension: &Dimension) -> Result<(Point3, Point3), ExtractError> {
    let first = dimension
        .first_point
        .ok_or(ExtractError::AnnotationAttributeMissing {
            attribute: "defpoint2",
        })?;
    let second = dimension
        .second_point
        .ok_or(ExtractError::AnnotationAttributeMissing {
            attribute: "defpoint3",
        })?;
    Ok((first, second))
}

fn explicit_text(dimension: &Dimension) -> Option<&str> {
    let text = dimension.text.as_deref()?.trim();
    if text.is_empty() || text == MEASUREMENT_PLACEHOLDER {
        None
    } else {
        Some(text)
    }
}

#[inline]
fn floor_midpoint(a: f64, b: f64) -> f64 {
    ((a + b) / 2.0).floor()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadscan_core::document::{DimStyle, DimensionKind};

    fn horizontal() -> Dimension {
        Dimension::linear(
            Point3::new(50.0, 30.0, 0.0),
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(100.0, 5.0, 0.0),
        )
    }

    fn document_with_style(name: &str, scale: Option<f64>) -> Document {
        let mut document = Document::new();
        document.add_dimension_style(DimStyle {
            name: name.to_string(),
            linear_scale: scale,
        });
        document
    }

    #[test]
    fn entity_scale_overrides_style() {
        let document = document_with_style("Standard", Some(5.0));
        let mut dimension = horizontal();
        dimension.linear_scale = Some(2.0);
        assert_eq!(resolve_scale(&document, &dimension), 2.0);
    }

    #[test]
    fn style_scale_used_without_entity_override() {
        let document = document_with_style("Standard", Some(5.0));
        assert_eq!(resolve_scale(&document, &horizontal()), 5.0);
    }

    #[test]
    fn scale_defaults_to_one() {
        assert_eq!(resolve_scale(&Document::new(), &horizontal()), 1.0);
        // 样式存在但没有 DIMLFAC
        let document = document_with_style("Standard", None);
        assert_eq!(resolve_scale(&document, &horizontal()), 1.0);
    }

    #[test]
    fn numeric_text_is_parsed() {
        let mut dimension = horizontal();
        dimension.text = Some(" 1500 ".to_string());
        let (measurement, raw) = resolve_measurement(&Document::new(), &dimension).unwrap();
        assert_eq!(measurement, Measurement::Number(1500.0));
        assert_eq!(raw.as_deref(), Some(" 1500 "));
    }

    #[test]
    fn non_numeric_text_passes_through() {
        let mut dimension = horizontal();
        dimension.text = Some("R20".to_string());
        let (measurement, _) = resolve_measurement(&Document::new(), &dimension).unwrap();
        assert_eq!(measurement, Measurement::Text("R20".to_string()));
    }

    #[test]
    fn non_finite_text_stays_text() {
        for raw in ["inf", "NaN", "-Infinity"] {
            let mut dimension = horizontal();
            dimension.text = Some(raw.to_string());
            let (measurement, _) = resolve_measurement(&Document::new(), &dimension).unwrap();
            assert_eq!(measurement, Measurement::Text(raw.to_string()));
        }
    }

    #[test]
    fn explicit_text_is_not_scaled() {
        let document = document_with_style("Standard", Some(5.0));
        let mut dimension = horizontal();
        dimension.text = Some("12".to_string());
        let (measurement, _) = resolve_measurement(&document, &dimension).unwrap();
        assert_eq!(measurement, Measurement::Number(12.0));
    }

    #[test]
    fn placeholder_falls_back_to_scaled_distance() {
        let document = document_with_style("Standard", Some(2.0));
        let mut dimension = Dimension::linear(
            Point3::new(0.0, 10.0, 0.0),
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(3.0, 4.0, 0.0),
        );
        dimension.text = Some("<>".to_string());
        let (measurement, raw) = resolve_measurement(&document, &dimension).unwrap();
        assert_eq!(measurement, Measurement::Number(10.0));
        assert_eq!(raw.as_deref(), Some("<>"));
    }

    #[test]
    fn computed_measurement_rounds_half_to_even() {
        let mut dimension = Dimension::linear(
            Point3::new(0.0, 10.0, 0.0),
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(2.5, 0.0, 0.0),
        );
        let (measurement, raw) = resolve_measurement(&Document::new(), &dimension).unwrap();
        assert_eq!(measurement, Measurement::Number(2.0));
        assert!(raw.is_none());

        dimension.second_point = Some(Point3::new(3.5, 0.0, 0.0));
        let (measurement, _) = resolve_measurement(&Document::new(), &dimension).unwrap();
        assert_eq!(measurement, Measurement::Number(4.0));
    }

    #[test]
    fn missing_extension_point_is_reported() {
        let mut dimension = horizontal();
        dimension.second_point = None;
        let err = resolve_measurement(&Document::new(), &dimension).unwrap_err();
        assert!(matches!(
            err,
            ExtractError::AnnotationAttributeMissing {
                attribute: "defpoint3"
            }
        ));
    }

    #[test]
    fn x_spread_uses_dimension_line_x() {
        // dx = 100 > dy = 5
        let point = representative_point(&horizontal()).unwrap();
        assert_eq!(point, Some((50.0, 2.0)));
    }

    #[test]
    fn y_spread_and_ties_use_dimension_line_y() {
        let vertical = Dimension::linear(
            Point3::new(-20.0, 40.0, 0.0),
            Point3::new(3.0, 0.0, 0.0),
            Point3::new(0.0, 80.0, 0.0),
        );
        assert_eq!(representative_point(&vertical).unwrap(), Some((1.0, 40.0)));

        let tie = Dimension::linear(
            Point3::new(7.0, 9.0, 0.0),
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(5.0, 5.0, 0.0),
        );
        assert_eq!(representative_point(&tie).unwrap(), Some((2.0, 9.0)));
    }

    #[test]
    fn midpoint_floors_negative_values() {
        let dimension = Dimension::linear(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(-3.0, 0.0, 0.0),
            Point3::new(0.0, 10.0, 0.0),
        );
        assert_eq!(representative_point(&dimension).unwrap(), Some((-2.0, 0.0)));
    }

    #[test]
    fn non_linear_dimensions_have_no_representative_point() {
        let mut dimension = horizontal();
        dimension.kind = DimensionKind::Radius;
        assert_eq!(representative_point(&dimension).unwrap(), None);

        dimension.kind = DimensionKind::Aligned;
        assert!(representative_point(&dimension).unwrap().is_some());
    }
}

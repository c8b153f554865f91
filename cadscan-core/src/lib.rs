pub mod geometry {
    use std::fmt;

    use glam::{DVec2, DVec3};
    use serde::{Deserialize, Serialize};
    use thiserror::Error;

    #[derive(Debug, Clone, PartialEq, Eq, Error)]
    pub enum GeometryError {
        #[error("不支持的坐标形式：需要三维向量或至少 3 个分量的元组，实际只有 {len} 个分量")]
        UnsupportedCoordinateShape { len: usize },
        #[error("包围盒判定要求坐标恰好包含 3 个分量，实际为 {len} 个")]
        MalformedBoundingBoxCoordinate { len: usize },
    }

    /// 二维点，内部以 `glam::DVec2` 表示，仅用于范围统计。
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
        pub fn as_vec2(self) -> DVec2 {
            self.0
        }
    }

    /// 三维点。所有提取记录中的坐标都统一成该类型，序列化为 `[x, y, z]`。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Point3(pub DVec3);

    impl Point3 {
        #[inline]
        pub fn new(x: f64, y: f64, z: f64) -> Self {
            Self(DVec3::new(x, y, z))
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
        pub fn z(self) -> f64 {
            self.0.z
        }

        #[inline]
        pub fn as_vec3(self) -> DVec3 {
            self.0
        }

        #[inline]
        pub fn to_array(self) -> [f64; 3] {
            self.0.to_array()
        }

        #[inline]
        pub fn xy(self) -> Point2 {
            Point2::new(self.0.x, self.0.y)
        }
    }

    impl From<DVec3> for Point3 {
        fn from(value: DVec3) -> Self {
            Self(value)
        }
    }

    impl From<[f64; 3]> for Point3 {
        fn from(value: [f64; 3]) -> Self {
            Self(DVec3::from_array(value))
        }
    }

    /// 读取层暴露出来的原始坐标：要么是三维向量，要么是分量数不定的元组
    /// （例如 LWPOLYLINE 顶点的 `(x, y, start_width, end_width, bulge)`）。
    #[derive(Debug, Clone, PartialEq)]
    pub enum RawCoordinate {
        Vector(Point3),
        Tuple(Vec<f64>),
    }

    impl From<Point3> for RawCoordinate {
        fn from(value: Point3) -> Self {
            Self::Vector(value)
        }
    }

    /// 将原始坐标规整为三分量坐标。元组只保留前三个分量。
    pub fn normalize(raw: &RawCoordinate) -> Result<Point3, GeometryError> {
        match raw {
            RawCoordinate::Vector(point) => Ok(*point),
            RawCoordinate::Tuple(values) => match values.as_slice() {
                [x, y, z, ..] => Ok(Point3::new(*x, *y, *z)),
                other => Err(GeometryError::UnsupportedCoordinateShape { len: other.len() }),
            },
        }
    }

    #[inline]
    pub fn distance(a: Point3, b: Point3) -> f64 {
        a.0.distance(b.0)
    }

    /// 鞋带公式求多边形面积，仅使用 XY 投影。少于 3 个点时面积为 0。
    pub fn polygon_area(points: &[Point3]) -> f64 {
        if points.len() < 3 {
            return 0.0;
        }
        let doubled: f64 = points
            .iter()
            .zip(points.iter().cycle().skip(1))
            .map(|(a, b)| a.x() * b.y() - b.x() * a.y())
            .sum();
        doubled.abs() / 2.0
    }

    /// 相邻顶点距离之和。首尾坐标完全相同时再补一段闭合段（长度为 0），
    /// 与多段线自身的闭合标志无关。
    pub fn polyline_length(points: &[Point3]) -> f64 {
        let mut length = control_polygon_length(points);
        if let (Some(first), Some(last)) = (points.first(), points.last()) {
            if first == last {
                length += distance(*last, *first);
            }
        }
        length
    }

    /// 折线（控制多边形）长度，不做闭合处理。样条长度以此近似。
    pub fn control_polygon_length(points: &[Point3]) -> f64 {
        points
            .windows(2)
            .map(|pair| distance(pair[0], pair[1]))
            .sum()
    }

    /// 圆弧长度，角度单位为度，不对跨越 0° 的情况做归一化。
    #[inline]
    pub fn arc_length(radius: f64, start_angle_deg: f64, end_angle_deg: f64) -> f64 {
        radius * (end_angle_deg - start_angle_deg).abs().to_radians()
    }

    /// 查询用矩形窗口。`xmin <= xmax`、`ymin <= ymax` 由调用方保证。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct BoundingBox {
        pub xmin: f64,
        pub ymin: f64,
        pub xmax: f64,
        pub ymax: f64,
    }

    impl BoundingBox {
        #[inline]
        pub fn new(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Self {
            Self {
                xmin,
                ymin,
                xmax,
                ymax,
            }
        }

        /// 闭区间判定，忽略 Z。
        #[inline]
        pub fn contains_xy(&self, x: f64, y: f64) -> bool {
            self.xmin <= x && x <= self.xmax && self.ymin <= y && y <= self.ymax
        }

        #[inline]
        pub fn contains(&self, point: Point3) -> bool {
            self.contains_xy(point.x(), point.y())
        }

        pub fn contains_coordinate(&self, coordinate: &[f64]) -> Result<bool, GeometryError> {
            match coordinate {
                [x, y, _z] => Ok(self.contains_xy(*x, *y)),
                other => Err(GeometryError::MalformedBoundingBoxCoordinate { len: other.len() }),
            }
        }

        #[inline]
        pub fn height(&self) -> f64 {
            self.ymax - self.ymin
        }

        #[inline]
        pub fn shifted_y(&self, dy: f64) -> Self {
            Self::new(self.xmin, self.ymin + dy, self.xmax, self.ymax + dy)
        }
    }

    impl fmt::Display for BoundingBox {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(
                f,
                "({}, {}, {}, {})",
                self.xmin, self.ymin, self.xmax, self.ymax
            )
        }
    }

    /// 轴对齐边界框，用于统计图纸范围。
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

}

pub mod document {
    use std::collections::HashMap;

    use serde::{Deserialize, Serialize};

    use crate::geometry::{Point3, RawCoordinate};

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct EntityId(u64);

    impl EntityId {
        #[inline]
        pub fn new(raw: u64) -> Self {
            Self(raw)
        }

        /// 提供原始数值，便于日志输出。
        #[inline]
        pub fn get(self) -> u64 {
            self.0
        }
    }

    /// 模型空间中的实体。未识别的 DXF 类型保留为 `Other`，由调用方自行跳过。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub enum Entity {
        Point(Point),
        Line(Line),
        LwPolyline(LwPolyline),
        Spline(Spline),
        Arc(Arc),
        Text(Text),
        MText(MText),
        Dimension(Dimension),
        Other(OtherEntity),
    }

    impl Entity {
        #[inline]
        pub fn layer_name(&self) -> &str {
            match self {
                Entity::Point(point) => &point.layer,
                Entity::Line(line) => &line.layer,
                Entity::LwPolyline(polyline) => &polyline.layer,
                Entity::Spline(spline) => &spline.layer,
                Entity::Arc(arc) => &arc.layer,
                Entity::Text(text) => &text.layer,
                Entity::MText(mtext) => &mtext.layer,
                Entity::Dimension(dimension) => &dimension.layer,
                Entity::Other(other) => &other.layer,
            }
        }

        /// DXF 类型名，例如 `LWPOLYLINE`。
        pub fn kind_name(&self) -> &str {
            match self {
                Entity::Point(_) => "POINT",
                Entity::Line(_) => "LINE",
                Entity::LwPolyline(_) => "LWPOLYLINE",
                Entity::Spline(_) => "SPLINE",
                Entity::Arc(_) => "ARC",
                Entity::Text(_) => "TEXT",
                Entity::MText(_) => "MTEXT",
                Entity::Dimension(_) => "DIMENSION",
                Entity::Other(other) => &other.kind,
            }
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Point {
        pub location: Point3,
        pub layer: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Line {
        pub start: Point3,
        pub end: Point3,
        pub layer: String,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct LwPolylineVertex {
        pub x: f64,
        pub y: f64,
        pub start_width: f64,
        pub end_width: f64,
        pub bulge: f64,
    }

    impl LwPolylineVertex {
        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self {
                x,
                y,
                start_width: 0.0,
                end_width: 0.0,
                bulge: 0.0,
            }
        }

        /// 以 `(x, y, start_width, end_width, bulge)` 元组形式暴露顶点。
        pub fn raw(&self) -> RawCoordinate {
            RawCoordinate::Tuple(vec![
                self.x,
                self.y,
                self.start_width,
                self.end_width,
                self.bulge,
            ])
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct LwPolyline {
        pub vertices: Vec<LwPolylineVertex>,
        pub is_closed: bool,
        pub elevation: f64,
        pub layer: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Spline {
        pub degree: i32,
        pub is_closed: bool,
        pub control_points: Vec<Point3>,
        pub fit_points: Vec<Point3>,
        pub layer: String,
    }

    /// 圆弧，角度保持 DXF 原始的“度”。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Arc {
        pub center: Point3,
        pub radius: f64,
        pub start_angle: f64,
        pub end_angle: f64,
        pub layer: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Text {
        pub insert: Point3,
        pub content: String,
        pub height: f64,
        pub rotation: f64,
        pub layer: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct MText {
        pub insert: Point3,
        pub content: String,
        pub height: f64,
        pub style: Option<String>,
        pub layer: String,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub enum DimensionKind {
        /// 组码 70 低位为 0：旋转/水平/竖直线性标注。
        Linear,
        Aligned,
        Angular,
        Diameter,
        Radius,
        Angular3Point,
        Ordinate,
        Unknown(i16),
    }

    impl DimensionKind {
        pub fn from_flags(flags: i16) -> Self {
            match flags & 0x0F {
                0 => DimensionKind::Linear,
                1 => DimensionKind::Aligned,
                2 => DimensionKind::Angular,
                3 => DimensionKind::Diameter,
                4 => DimensionKind::Radius,
                5 => DimensionKind::Angular3Point,
                6 => DimensionKind::Ordinate,
                other => DimensionKind::Unknown(other),
            }
        }

        #[inline]
        pub fn is_linear(self) -> bool {
            matches!(self, DimensionKind::Linear | DimensionKind::Aligned)
        }
    }

    /// DIMENSION 实体。定义点可能缺失，缺失时由提取层跳过该标注。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Dimension {
        pub kind: DimensionKind,
        /// 组码 10：尺寸线位置。
        pub definition_point: Option<Point3>,
        /// 组码 13：第一条尺寸界线原点。
        pub first_point: Option<Point3>,
        /// 组码 14：第二条尺寸界线原点。
        pub second_point: Option<Point3>,
        /// 组码 1 的原始文本，保留 `<>` 等占位符。
        pub text: Option<String>,
        pub style_name: String,
        /// 实体级 DIMLFAC 覆盖（XDATA `ACAD` / `DSTYLE`，组码 144）。
        pub linear_scale: Option<f64>,
        pub layer: String,
    }

    impl Dimension {
        /// 构造仅含基本字段的线性标注，便于测试与程序化生成。
        pub fn linear(definition_point: Point3, first_point: Point3, second_point: Point3) -> Self {
            Self {
                kind: DimensionKind::Linear,
                definition_point: Some(definition_point),
                first_point: Some(first_point),
                second_point: Some(second_point),
                text: None,
                style_name: "Standard".to_string(),
                linear_scale: None,
                layer: "0".to_string(),
            }
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct OtherEntity {
        pub kind: String,
        pub layer: String,
    }

    /// DIMSTYLE 表记录。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct DimStyle {
        pub name: String,
        pub linear_scale: Option<f64>,
    }

    #[derive(Debug, Default, Clone, Serialize, Deserialize)]
    pub struct Document {
        entities: Vec<(EntityId, Entity)>,
        next_entity_id: u64,
        dimension_styles: HashMap<String, DimStyle>,
        #[serde(default)]
        skipped_entities: usize,
    }

    impl Document {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn add_entity(&mut self, entity: Entity) -> EntityId {
            let id = self.next_id();
            self.entities.push((id, entity));
            id
        }

        #[inline]
        pub fn entities(&self) -> impl Iterator<Item = &(EntityId, Entity)> {
            self.entities.iter()
        }

        pub fn entity(&self, id: EntityId) -> Option<&Entity> {
            self.entities
                .iter()
                .find(|(entity_id, _)| *entity_id == id)
                .map(|(_, entity)| entity)
        }

        /// 只遍历 DIMENSION 实体。
        pub fn dimensions(&self) -> impl Iterator<Item = (EntityId, &Dimension)> {
            self.entities.iter().filter_map(|(id, entity)| match entity {
                Entity::Dimension(dimension) => Some((*id, dimension)),
                _ => None,
            })
        }

        /// 样式名按 DXF 惯例大小写不敏感。
        pub fn add_dimension_style(&mut self, style: DimStyle) {
            self.dimension_styles
                .insert(style.name.to_ascii_uppercase(), style);
        }

        pub fn dimension_style(&self, name: &str) -> Option<&DimStyle> {
            self.dimension_styles.get(&name.to_ascii_uppercase())
        }

        pub fn dimension_styles(&self) -> impl Iterator<Item = &DimStyle> {
            self.dimension_styles.values()
        }

        /// 读取时因字段缺失或格式错误而被丢弃的实体数量。
        #[inline]
        pub fn skipped_entities(&self) -> usize {
            self.skipped_entities
        }

        pub fn note_skipped_entity(&mut self) {
            self.skipped_entities += 1;
        }

        #[inline]
        fn next_id(&mut self) -> EntityId {
            let id = self.next_entity_id;
            self.next_entity_id += 1;
            EntityId(id)
        }
    }

}

pub mod records {
    use std::fmt;

    use serde::{Deserialize, Serialize};

    use crate::geometry::Point3;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct LineRecord {
        pub start: Point3,
        pub end: Point3,
        pub length: f64,
    }

    /// `area` 仅在多段线闭合时给出，否则序列化为 `null`。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct PolylineRecord {
        pub points: Vec<Point3>,
        pub is_closed: bool,
        pub area: Option<f64>,
        pub length: f64,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct SplineRecord {
        pub points: Vec<Point3>,
        pub length: f64,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct ArcRecord {
        pub center: Point3,
        pub radius: f64,
        pub start_angle: f64,
        pub end_angle: f64,
        pub length: f64,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct TextRecord {
        pub text: String,
        pub location: Point3,
        pub height: f64,
    }

    /// 标注值：可解析为数字时为数值，否则原样保留标注文字。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(untagged)]
    pub enum Measurement {
        Number(f64),
        Text(String),
    }

    impl fmt::Display for Measurement {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                Measurement::Number(value) => write!(f, "{value}"),
                Measurement::Text(text) => f.write_str(text),
            }
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Xyz {
        pub x: f64,
        pub y: f64,
        pub z: f64,
    }

    impl From<Point3> for Xyz {
        fn from(point: Point3) -> Self {
            Self {
                x: point.x(),
                y: point.y(),
                z: point.z(),
            }
        }
    }

    pub const LINEAR_DIMENSION_TYPE: &str = "Linear Dimension";

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct LinearDimensionRecord {
        #[serde(rename = "type")]
        pub kind: String,
        pub text: String,
        pub measurement: Measurement,
        pub raw_text: Option<String>,
        pub start_point: Xyz,
        pub end_point: Xyz,
        pub dimension_line_position: Xyz,
    }

    /// 一次提取调用的完整结果。字段顺序即输出 JSON 的键顺序。
    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    pub struct ExtractionResult {
        pub points: Vec<Point3>,
        pub lines: Vec<LineRecord>,
        pub lwpolylines: Vec<PolylineRecord>,
        pub splines: Vec<SplineRecord>,
        pub arcs: Vec<ArcRecord>,
        pub texts: Vec<TextRecord>,
        pub mtexts: Vec<TextRecord>,
        /// 仅在移动窗口搜索命中后出现。
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub linear_dimensions: Option<Vec<LinearDimensionRecord>>,
    }

    impl ExtractionResult {
        pub fn new() -> Self {
            Self::default()
        }

        /// 所有类别的记录总数。
        pub fn record_count(&self) -> usize {
            self.points.len()
                + self.lines.len()
                + self.lwpolylines.len()
                + self.splines.len()
                + self.arcs.len()
                + self.texts.len()
                + self.mtexts.len()
                + self.linear_dimensions.as_ref().map_or(0, Vec::len)
        }
    }

}

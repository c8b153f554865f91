pub mod code_page;
pub mod json;

use std::fs;
use std::path::{Path, PathBuf};

use cadscan_core::{
    document::{
        Arc, DimStyle, Dimension, DimensionKind, Document, Entity, Line, LwPolyline,
        LwPolylineVertex, MText, OtherEntity, Point, Spline, Text,
    },
    geometry::Point3,
};
use thiserror::Error;
use tracing::{debug, warn};

pub use json::{JsonResultWriter, ResultSaver};

#[derive(Debug, Error)]
pub enum IoError {
    #[error("file {path:?} does not exist")]
    NotFound { path: PathBuf },
    #[error("failed to read file {path:?}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write file {path:?}: {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid document structure: {0}")]
    InvalidDocument(String),
    #[error("failed to serialize result: {source}")]
    Serialization {
        #[source]
        source: serde_json::Error,
    },
}

pub trait DocumentLoader {
    fn load(&self, path: &Path) -> Result<Document, IoError>;
}

pub struct DxfFacade;

impl DxfFacade {
    pub fn new() -> Self {
        Self
    }

    /// 直接解析内存中的 DXF 文本。
    pub fn parse_str(&self, source: &str) -> Result<Document, IoError> {
        DxfParser::new(source).parse().map_err(|err| match err {
            DxfError::Invalid { message } | DxfError::Malformed { message } => {
                IoError::InvalidDocument(message)
            }
        })
    }
}

impl Default for DxfFacade {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentLoader for DxfFacade {
    fn load(&self, path: &Path) -> Result<Document, IoError> {
        if !path.is_file() {
            return Err(IoError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let bytes = fs::read(path).map_err(|source| IoError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let source = code_page::decode_source(&bytes);
        let document = self.parse_str(&source)?;
        debug!(
            path = %path.display(),
            entities = document.entities().count(),
            skipped = document.skipped_entities(),
            "DXF 读取完成"
        );
        Ok(document)
    }
}

#[derive(Debug)]
enum DxfError {
    /// 文件结构损坏，整个读取失败。
    Invalid { message: String },
    /// 单个实体/表记录的字段缺失或格式错误，只丢弃该对象。
    Malformed { message: String },
}

impl DxfError {
    fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }
}

struct DxfParser<'a> {
    reader: DxfReader<'a>,
    /// 当前实体带有组码 67 = 1，位于图纸空间。
    paper_space: bool,
}

impl<'a> DxfParser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            reader: DxfReader::new(source),
            paper_space: false,
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
            match value.trim() {
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
                        "ENTITIES" => self.parse_entities(&mut document)?,
                        "TABLES" => self.parse_tables(&mut document)?,
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
                Some((0, value)) if value.trim() == "ENDSEC" => break,
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
                // TABLE 头部字段以及其它表记录的内容
                continue;
            }
            match value.trim() {
                "ENDSEC" => break,
                "DIMSTYLE" => match self.parse_dimstyle() {
                    Ok(style) => document.add_dimension_style(style),
                    Err(DxfError::Malformed { message }) => {
                        warn!(%message, "跳过无法解析的 DIMSTYLE 记录");
                        self.skip_entity_body()?;
                    }
                    Err(err) => return Err(err),
                },
                _ => {}
            }
        }
        Ok(())
    }

    fn parse_dimstyle(&mut self) -> Result<DimStyle, DxfError> {
        let mut name: Option<String> = None;
        let mut linear_scale: Option<f64> = None;
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value))?;
                    break;
                }
                Some((code, value)) => match code {
                    2 => name = Some(value.trim().to_string()),
                    144 => linear_scale = Some(parse_f64(&value, "DIMSTYLE 线性比例 DIMLFAC（组码 144）")?),
                    _ => {}
                },
                None => return Err(DxfError::invalid("DIMSTYLE 未正确结束")),
            }
        }
        let name = name.ok_or_else(|| DxfError::malformed("DIMSTYLE 缺少名称（组码 2）"))?;
        Ok(DimStyle { name, linear_scale })
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

            let kind = value.trim();
            if kind == "ENDSEC" {
                break;
            }
            self.paper_space = false;
            match self.parse_entity(kind) {
                Ok(_) if self.paper_space => {
                    // 只提取模型空间
                    debug!(kind, "忽略图纸空间实体");
                }
                Ok(entity) => {
                    document.add_entity(entity);
                }
                Err(DxfError::Malformed { message }) => {
                    warn!(kind, %message, "跳过无法解析的实体");
                    self.skip_entity_body()?;
                    document.note_skipped_entity();
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    fn parse_entity(&mut self, kind: &str) -> Result<Entity, DxfError> {
        match kind {
            "POINT" => self.parse_point(),
            "LINE" => self.parse_line(),
            "LWPOLYLINE" => self.parse_lwpolyline(),
            "SPLINE" => self.parse_spline(),
            "ARC" => self.parse_arc(),
            "TEXT" => self.parse_text(),
            "MTEXT" => self.parse_mtext(),
            "DIMENSION" => self.parse_dimension(),
            other => self.parse_other(other),
        }
    }

    fn parse_point(&mut self) -> Result<Entity, DxfError> {
        let mut layer = None;
        let mut location = PointSlots::default();
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value))?;
                    break;
                }
                Some((code, value)) => match code {
                    8 => layer = Some(value.trim().to_string()),
                    67 => self.paper_space = is_paper_space(&value)?,
                    10 => assign_coord(&mut location.x, &value, "POINT 位置 X（组码 10）")?,
                    20 => assign_coord(&mut location.y, &value, "POINT 位置 Y（组码 20）")?,
                    30 => assign_coord(&mut location.z, &value, "POINT 位置 Z（组码 30）")?,
                    _ => {}
                },
                None => return Err(DxfError::invalid("POINT 未正确结束")),
            }
        }

        Ok(Entity::Point(Point {
            location: location.require("POINT 位置（组码 10/20）")?,
            layer: layer.unwrap_or_else(|| "0".to_string()),
        }))
    }

    fn parse_line(&mut self) -> Result<Entity, DxfError> {
        let mut layer = None;
        let mut start = PointSlots::default();
        let mut end = PointSlots::default();
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value))?;
                    break;
                }
                Some((code, value)) => match code {
                    8 => layer = Some(value.trim().to_string()),
                    67 => self.paper_space = is_paper_space(&value)?,
                    10 => assign_coord(&mut start.x, &value, "LINE 起点 X（组码 10）")?,
                    20 => assign_coord(&mut start.y, &value, "LINE 起点 Y（组码 20）")?,
                    30 => assign_coord(&mut start.z, &value, "LINE 起点 Z（组码 30）")?,
                    11 => assign_coord(&mut end.x, &value, "LINE 终点 X（组码 11）")?,
                    21 => assign_coord(&mut end.y, &value, "LINE 终点 Y（组码 21）")?,
                    31 => assign_coord(&mut end.z, &value, "LINE 终点 Z（组码 31）")?,
                    _ => {}
                },
                None => return Err(DxfError::invalid("LINE 未正确结束")),
            }
        }

        Ok(Entity::Line(Line {
            start: start.require("LINE 起点（组码 10/20）")?,
            end: end.require("LINE 终点（组码 11/21）")?,
            layer: layer.unwrap_or_else(|| "0".to_string()),
        }))
    }

    fn parse_arc(&mut self) -> Result<Entity, DxfError> {
        let mut layer = None;
        let mut center = PointSlots::default();
        let mut radius = None;
        let mut start_angle = None;
        let mut end_angle = None;
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value))?;
                    break;
                }
                Some((code, value)) => match code {
                    8 => layer = Some(value.trim().to_string()),
                    67 => self.paper_space = is_paper_space(&value)?,
                    10 => assign_coord(&mut center.x, &value, "ARC 圆心 X（组码 10）")?,
                    20 => assign_coord(&mut center.y, &value, "ARC 圆心 Y（组码 20）")?,
                    30 => assign_coord(&mut center.z, &value, "ARC 圆心 Z（组码 30）")?,
                    40 => assign_coord(&mut radius, &value, "ARC 半径（组码 40）")?,
                    50 => assign_coord(&mut start_angle, &value, "ARC 起始角（组码 50）")?,
                    51 => assign_coord(&mut end_angle, &value, "ARC 终止角（组码 51）")?,
                    _ => {}
                },
                None => return Err(DxfError::invalid("ARC 未正确结束")),
            }
        }

        let center = center.require("ARC 圆心（组码 10/20）")?;
        let radius = radius.ok_or_else(|| DxfError::malformed("ARC 缺少半径（组码 40）"))?;
        let start_angle =
            start_angle.ok_or_else(|| DxfError::malformed("ARC 缺少起始角（组码 50）"))?;
        let end_angle =
            end_angle.ok_or_else(|| DxfError::malformed("ARC 缺少终止角（组码 51）"))?;

        Ok(Entity::Arc(Arc {
            center,
            radius,
            start_angle,
            end_angle,
            layer: layer.unwrap_or_else(|| "0".to_string()),
        }))
    }

    fn parse_lwpolyline(&mut self) -> Result<Entity, DxfError> {
        let mut layer = None;
        let mut is_closed = false;
        let mut elevation = 0.0;
        let mut vertices: Vec<LwPolylineVertex> = Vec::new();
        let mut pending_x: Option<f64> = None;
        let mut pending_y: Option<f64> = None;
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value))?;
                    break;
                }
                Some((code, value)) => match code {
                    8 => layer = Some(value.trim().to_string()),
                    67 => self.paper_space = is_paper_space(&value)?,
                    70 => {
                        let flag = parse_i32(&value, "LWPOLYLINE 标志（组码 70）")?;
                        is_closed = flag & 0x01 == 0x01;
                    }
                    38 => elevation = parse_f64(&value, "LWPOLYLINE 标高（组码 38）")?,
                    10 => {
                        let x = parse_f64(&value, "LWPOLYLINE 顶点 X")?;
                        if let Some(y) = pending_y.take() {
                            vertices.push(LwPolylineVertex::new(x, y));
                        } else if pending_x.replace(x).is_some() {
                            return Err(DxfError::malformed(
                                "LWPOLYLINE 顶点缺少对应的 Y（组码 20）",
                            ));
                        }
                    }
                    20 => {
                        let y = parse_f64(&value, "LWPOLYLINE 顶点 Y")?;
                        if let Some(x) = pending_x.take() {
                            vertices.push(LwPolylineVertex::new(x, y));
                        } else if pending_y.replace(y).is_some() {
                            return Err(DxfError::malformed(
                                "LWPOLYLINE 顶点缺少对应的 X（组码 10）",
                            ));
                        }
                    }
                    40 | 41 | 42 => {
                        let field = parse_f64(&value, "LWPOLYLINE 顶点宽度/bulge")?;
                        let vertex = vertices.last_mut().ok_or_else(|| {
                            DxfError::malformed(format!(
                                "LWPOLYLINE 在定义首个顶点前遇到组码 {code}"
                            ))
                        })?;
                        match code {
                            40 => vertex.start_width = field,
                            41 => vertex.end_width = field,
                            _ => vertex.bulge = field,
                        }
                    }
                    _ => {}
                },
                None => return Err(DxfError::invalid("LWPOLYLINE 未正确结束")),
            }
        }

        if pending_x.is_some() || pending_y.is_some() {
            return Err(DxfError::malformed(
                "LWPOLYLINE 顶点坐标成对出现（组码 10/20），检测到不完整的顶点",
            ));
        }

        if vertices.is_empty() {
            return Err(DxfError::malformed("LWPOLYLINE 未解析到任何顶点"));
        }

        Ok(Entity::LwPolyline(LwPolyline {
            vertices,
            is_closed,
            elevation,
            layer: layer.unwrap_or_else(|| "0".to_string()),
        }))
    }

    fn parse_spline(&mut self) -> Result<Entity, DxfError> {
        let mut layer = None;
        let mut flags: i16 = 0;
        let mut degree: Option<i16> = None;
        let mut control_points: Vec<Point3> = Vec::new();
        let mut fit_points: Vec<Point3> = Vec::new();
        let mut pending_control_x: Option<f64> = None;
        let mut pending_fit_x: Option<f64> = None;

        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value))?;
                    break;
                }
                Some((code, value)) => match code {
                    8 => layer = Some(value.trim().to_string()),
                    67 => self.paper_space = is_paper_space(&value)?,
                    70 => {
                        flags = parse_i16(&value, "SPLINE 类型标志（组码 70）")?;
                    }
                    71 => {
                        degree = Some(parse_i16(&value, "SPLINE 阶数（组码 71）")?);
                    }
                    10 => {
                        if pending_control_x
                            .replace(parse_f64(&value, "SPLINE 控制点 X（组码 10）")?)
                            .is_some()
                        {
                            return Err(DxfError::malformed(
                                "SPLINE 控制点 X（组码 10）在未提供 Y 之前重复出现",
                            ));
                        }
                    }
                    20 => {
                        let y = parse_f64(&value, "SPLINE 控制点 Y（组码 20）")?;
                        let x = pending_control_x.take().ok_or_else(|| {
                            DxfError::malformed("SPLINE 控制点 Y（组码 20）缺少对应的 X")
                        })?;
                        control_points.push(Point3::new(x, y, 0.0));
                    }
                    30 => {
                        let z = parse_f64(&value, "SPLINE 控制点 Z（组码 30）")?;
                        let point = control_points.last_mut().ok_or_else(|| {
                            DxfError::malformed("SPLINE 控制点 Z（组码 30）缺少对应的 XY")
                        })?;
                        *point = Point3::new(point.x(), point.y(), z);
                    }
                    11 => {
                        if pending_fit_x
                            .replace(parse_f64(&value, "SPLINE 拟合点 X（组码 11）")?)
                            .is_some()
                        {
                            return Err(DxfError::malformed(
                                "SPLINE 拟合点 X（组码 11）在未提供 Y 之前重复出现",
                            ));
                        }
                    }
                    21 => {
                        let y = parse_f64(&value, "SPLINE 拟合点 Y（组码 21）")?;
                        let x = pending_fit_x.take().ok_or_else(|| {
                            DxfError::malformed("SPLINE 拟合点 Y（组码 21）缺少对应的 X")
                        })?;
                        fit_points.push(Point3::new(x, y, 0.0));
                    }
                    31 => {
                        let z = parse_f64(&value, "SPLINE 拟合点 Z（组码 31）")?;
                        let point = fit_points.last_mut().ok_or_else(|| {
                            DxfError::malformed("SPLINE 拟合点 Z（组码 31）缺少对应的 XY")
                        })?;
                        *point = Point3::new(point.x(), point.y(), z);
                    }
                    _ => {
                        // 节点、权重、切向量、法向量等暂不需要
                    }
                },
                None => return Err(DxfError::invalid("SPLINE 未正确结束")),
            }
        }

        if let Some(x) = pending_control_x.take() {
            return Err(DxfError::malformed(format!(
                "SPLINE 控制点 X={x} 缺少对应的 Y（组码 20）"
            )));
        }
        if let Some(x) = pending_fit_x.take() {
            return Err(DxfError::malformed(format!(
                "SPLINE 拟合点 X={x} 缺少对应的 Y（组码 21）"
            )));
        }

        let degree =
            degree.ok_or_else(|| DxfError::malformed("SPLINE 缺少阶数（组码 71）"))? as i32;

        Ok(Entity::Spline(Spline {
            degree,
            is_closed: flags & 0x01 != 0,
            control_points,
            fit_points,
            layer: layer.unwrap_or_else(|| "0".to_string()),
        }))
    }

    fn parse_text(&mut self) -> Result<Entity, DxfError> {
        let mut layer = None;
        let mut insert = PointSlots::default();
        let mut height = None;
        let mut rotation_deg = 0.0;
        let mut text: Option<String> = None;
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value))?;
                    break;
                }
                Some((code, value)) => match code {
                    8 => layer = Some(value.trim().to_string()),
                    67 => self.paper_space = is_paper_space(&value)?,
                    10 => assign_coord(&mut insert.x, &value, "TEXT 插入点 X（组码 10）")?,
                    20 => assign_coord(&mut insert.y, &value, "TEXT 插入点 Y（组码 20）")?,
                    30 => assign_coord(&mut insert.z, &value, "TEXT 插入点 Z（组码 30）")?,
                    40 => assign_coord(&mut height, &value, "TEXT 文字高度（组码 40）")?,
                    50 => {
                        rotation_deg = parse_f64(&value, "TEXT 旋转角")?;
                    }
                    1 => text = Some(value),
                    _ => {
                        // 文字样式、对齐点等暂不使用
                    }
                },
                None => return Err(DxfError::invalid("TEXT 未正确结束")),
            }
        }

        let insert = insert.require("TEXT 插入点（组码 10/20）")?;
        let height = height.ok_or_else(|| DxfError::malformed("TEXT 缺少文字高度（组码 40）"))?;
        let content = text.ok_or_else(|| DxfError::malformed("TEXT 缺少文本内容（组码 1）"))?;

        Ok(Entity::Text(Text {
            insert,
            content,
            height,
            rotation: rotation_deg,
            layer: layer.unwrap_or_else(|| "0".to_string()),
        }))
    }

    fn parse_mtext(&mut self) -> Result<Entity, DxfError> {
        let mut layer = None;
        let mut insert = PointSlots::default();
        let mut height = None;
        let mut style: Option<String> = None;
        let mut head: Option<String> = None;
        let mut chunks: Vec<String> = Vec::new();

        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value))?;
                    break;
                }
                Some((code, value)) => match code {
                    8 => layer = Some(value.trim().to_string()),
                    67 => self.paper_space = is_paper_space(&value)?,
                    10 => assign_coord(&mut insert.x, &value, "MTEXT 插入点 X（组码 10）")?,
                    20 => assign_coord(&mut insert.y, &value, "MTEXT 插入点 Y（组码 20）")?,
                    30 => assign_coord(&mut insert.z, &value, "MTEXT 插入点 Z（组码 30）")?,
                    40 => assign_coord(&mut height, &value, "MTEXT 文本高度（组码 40）")?,
                    7 => style = Some(value.trim().to_string()),
                    // 长文本先写若干组码 3 分块，最后一块放在组码 1
                    3 => chunks.push(value),
                    1 => head = Some(value),
                    _ => {}
                },
                None => return Err(DxfError::invalid("MTEXT 未正确结束")),
            }
        }

        let insert = insert.require("MTEXT 插入点（组码 10/20）")?;
        let height = height.ok_or_else(|| DxfError::malformed("MTEXT 缺少文本高度（组码 40）"))?;
        if head.is_none() && chunks.is_empty() {
            return Err(DxfError::malformed("MTEXT 缺少内容（组码 1/3）"));
        }
        chunks.extend(head);

        Ok(Entity::MText(MText {
            insert,
            content: chunks.concat(),
            height,
            style,
            layer: layer.unwrap_or_else(|| "0".to_string()),
        }))
    }

    fn parse_dimension(&mut self) -> Result<Entity, DxfError> {
        let mut layer = None;
        let mut flags: i16 = 0;
        let mut definition = PointSlots::default();
        let mut first = PointSlots::default();
        let mut second = PointSlots::default();
        let mut text: Option<String> = None;
        let mut style_name: Option<String> = None;
        let mut overrides = DimStyleOverrides::default();

        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value))?;
                    break;
                }
                Some((code, value)) => match code {
                    8 => layer = Some(value.trim().to_string()),
                    67 => self.paper_space = is_paper_space(&value)?,
                    70 => {
                        flags = parse_i16(&value, "DIMENSION 类型标志（组码 70）")?;
                    }
                    1 => text = Some(value),
                    3 => style_name = Some(value.trim().to_string()),
                    10 => assign_coord(&mut definition.x, &value, "DIMENSION 定义点 X（组码 10）")?,
                    20 => assign_coord(&mut definition.y, &value, "DIMENSION 定义点 Y（组码 20）")?,
                    30 => assign_coord(&mut definition.z, &value, "DIMENSION 定义点 Z（组码 30）")?,
                    13 => assign_coord(&mut first.x, &value, "DIMENSION 第一尺寸界线点 X（组码 13）")?,
                    23 => assign_coord(&mut first.y, &value, "DIMENSION 第一尺寸界线点 Y（组码 23）")?,
                    33 => assign_coord(&mut first.z, &value, "DIMENSION 第一尺寸界线点 Z（组码 33）")?,
                    14 => assign_coord(&mut second.x, &value, "DIMENSION 第二尺寸界线点 X（组码 14）")?,
                    24 => assign_coord(&mut second.y, &value, "DIMENSION 第二尺寸界线点 Y（组码 24）")?,
                    34 => assign_coord(&mut second.z, &value, "DIMENSION 第二尺寸界线点 Z（组码 34）")?,
                    1000..=1071 => overrides.accept(code, &value)?,
                    _ => {}
                },
                None => return Err(DxfError::invalid("DIMENSION 未正确结束")),
            }
        }

        Ok(Entity::Dimension(Dimension {
            kind: DimensionKind::from_flags(flags),
            definition_point: definition.finish("DIMENSION 定义点")?,
            first_point: first.finish("DIMENSION 第一尺寸界线点")?,
            second_point: second.finish("DIMENSION 第二尺寸界线点")?,
            text,
            style_name: style_name.unwrap_or_else(|| "Standard".to_string()),
            linear_scale: overrides.linear_scale,
            layer: layer.unwrap_or_else(|| "0".to_string()),
        }))
    }

    fn parse_other(&mut self, kind: &str) -> Result<Entity, DxfError> {
        let mut layer = None;
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value))?;
                    break;
                }
                Some((8, value)) => layer = Some(value.trim().to_string()),
                Some((67, value)) => self.paper_space = is_paper_space(&value)?,
                Some(_) => continue,
                None => break,
            }
        }
        debug!(kind, "保留未处理的实体类型");
        Ok(Entity::Other(OtherEntity {
            kind: kind.to_string(),
            layer: layer.unwrap_or_else(|| "0".to_string()),
        }))
    }

    fn skip_entity_body(&mut self) -> Result<(), DxfError> {
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value))?;
                    break;
                }
                Some(_) => continue,
                None => break,
            }
        }
        Ok(())
    }
}

/// 三维点的分量暂存，缺省 Z 为 0。
#[derive(Debug, Default)]
struct PointSlots {
    x: Option<f64>,
    y: Option<f64>,
    z: Option<f64>,
}

impl PointSlots {
    fn finish(self, context: &str) -> Result<Option<Point3>, DxfError> {
        match (self.x, self.y) {
            (None, None) => Ok(None),
            (Some(x), Some(y)) => Ok(Some(Point3::new(x, y, self.z.unwrap_or(0.0)))),
            _ => Err(DxfError::malformed(format!("{context} 缺少完整的 XY 坐标"))),
        }
    }

    fn require(self, context: &str) -> Result<Point3, DxfError> {
        self.finish(context)?
            .ok_or_else(|| DxfError::malformed(format!("{context} 缺失")))
    }
}

/// DIMENSION 实体 XDATA 中 `ACAD` / `DSTYLE` 块的标注变量覆盖，
/// 形如 `1070 <变量组码>` 后跟一个值。目前只关心 DIMLFAC（144）。
#[derive(Debug, Default)]
struct DimStyleOverrides {
    is_acad: bool,
    marker_seen: bool,
    open: bool,
    key: Option<i32>,
    linear_scale: Option<f64>,
}

impl DimStyleOverrides {
    const DIMLFAC: i32 = 144;

    fn accept(&mut self, code: i32, value: &str) -> Result<(), DxfError> {
        let value = value.trim();
        match code {
            1001 => {
                self.is_acad = value.eq_ignore_ascii_case("ACAD");
                self.marker_seen = false;
                self.open = false;
                self.key = None;
            }
            _ if !self.is_acad => {}
            1002 => match value {
                "{" if self.marker_seen => self.open = true,
                "}" => {
                    self.open = false;
                    self.marker_seen = false;
                    self.key = None;
                }
                _ => {}
            },
            1000 if !self.open => self.marker_seen = value.eq_ignore_ascii_case("DSTYLE"),
            _ if !self.open => {}
            1070 if self.key.is_none() => {
                self.key = Some(parse_i32(value, "DIMENSION 标注变量覆盖组码（XDATA 1070）")?);
            }
            _ => {
                if self.key.take() == Some(Self::DIMLFAC) && code == 1040 {
                    self.linear_scale = Some(parse_f64(value, "DIMENSION DIMLFAC 覆盖值（XDATA 1040）")?);
                }
            }
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
        let value = value_line.trim_end_matches('\r').to_string();
        Ok(Some((code, value)))
    }

    fn put_back(&mut self, pair: (i32, String)) -> Result<(), DxfError> {
        if self.buffer.is_some() {
            return Err(DxfError::invalid(format!(
                "第 {} 行附近重复回退组码 {}",
                self.line_number, pair.0
            )));
        }
        self.buffer = Some(pair);
        Ok(())
    }
}

fn assign_coord(slot: &mut Option<f64>, raw: &str, context: &str) -> Result<(), DxfError> {
    if slot.is_some() {
        return Err(DxfError::malformed(format!("{context} 出现重复值")));
    }
    *slot = Some(parse_f64(raw, context)?);
    Ok(())
}

fn is_paper_space(raw: &str) -> Result<bool, DxfError> {
    Ok(parse_i16(raw, "实体所在空间（组码 67）")? == 1)
}

fn parse_f64(raw: &str, context: &str) -> Result<f64, DxfError> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| DxfError::malformed(format!("{context} 解析失败（值：\"{raw}\"）")))
}

fn parse_i32(raw: &str, context: &str) -> Result<i32, DxfError> {
    raw.trim()
        .parse::<i32>()
        .map_err(|_| DxfError::malformed(format!("{context} 解析失败（值：\"{raw}\"）")))
}

fn parse_i16(raw: &str, context: &str) -> Result<i16, DxfError> {
    let value = parse_i32(raw, context)?;
    i16::try_from(value)
        .map_err(|_| DxfError::malformed(format!("{context} 超出 i16 范围（值：{value}）")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dxf(entities: &str) -> String {
        format!("0\nSECTION\n2\nENTITIES\n{entities}0\nENDSEC\n0\nEOF\n")
    }

    #[test]
    fn reads_point_with_z() {
        let doc = DxfFacade::new()
            .parse_str(&dxf("0\nPOINT\n8\nPTS\n10\n1.5\n20\n2.5\n30\n3.5\n"))
            .unwrap();
        match doc.entities().next() {
            Some((_, Entity::Point(point))) => {
                assert_eq!(point.location, Point3::new(1.5, 2.5, 3.5));
                assert_eq!(point.layer, "PTS");
            }
            other => panic!("unexpected entity: {other:?}"),
        }
    }

    #[test]
    fn malformed_entity_is_skipped_and_counted() {
        let source = dxf("0\nLINE\n10\n0\n20\n0\n0\nLINE\n10\nabc\n20\n0\n11\n1\n21\n1\n0\nPOINT\n10\n4\n20\n5\n");
        let doc = DxfFacade::new().parse_str(&source).unwrap();
        assert_eq!(doc.skipped_entities(), 2);
        let kinds: Vec<&str> = doc.entities().map(|(_, e)| e.kind_name()).collect();
        assert_eq!(kinds, vec!["POINT"]);
    }

    #[test]
    fn unknown_entities_are_kept_as_other() {
        let doc = DxfFacade::new()
            .parse_str(&dxf("0\nHATCH\n8\nFILL\n2\nSOLID\n0\nCIRCLE\n10\n0\n20\n0\n40\n1\n"))
            .unwrap();
        let kinds: Vec<&str> = doc.entities().map(|(_, e)| e.kind_name()).collect();
        assert_eq!(kinds, vec!["HATCH", "CIRCLE"]);
        assert_eq!(doc.skipped_entities(), 0);
    }

    #[test]
    fn odd_line_count_is_structural_error() {
        let err = DxfFacade::new().parse_str("0\nSECTION\n2").unwrap_err();
        assert!(matches!(err, IoError::InvalidDocument(_)));

        let err = DxfFacade::new()
            .parse_str("0\nSECTION\n2\nENTITIES\nX\nLINE\n")
            .unwrap_err();
        assert!(matches!(err, IoError::InvalidDocument(_)));
    }

    #[test]
    fn lwpolyline_keeps_widths_and_closed_flag() {
        let source = dxf(
            "0\nLWPOLYLINE\n90\n3\n70\n1\n10\n0\n20\n0\n40\n0.5\n41\n0.25\n10\n4\n20\n0\n42\n1\n10\n4\n20\n3\n",
        );
        let doc = DxfFacade::new().parse_str(&source).unwrap();
        match doc.entities().next() {
            Some((_, Entity::LwPolyline(polyline))) => {
                assert!(polyline.is_closed);
                assert_eq!(polyline.vertices.len(), 3);
                assert_eq!(polyline.vertices[0].start_width, 0.5);
                assert_eq!(polyline.vertices[0].end_width, 0.25);
                assert_eq!(polyline.vertices[1].bulge, 1.0);
            }
            other => panic!("unexpected entity: {other:?}"),
        }
    }

    #[test]
    fn mtext_chunks_are_concatenated_in_order() {
        let source = dxf("0\nMTEXT\n10\n1\n20\n2\n40\n3\n3\nAAA\n3\nBBB\n1\nCCC\n");
        let doc = DxfFacade::new().parse_str(&source).unwrap();
        match doc.entities().next() {
            Some((_, Entity::MText(mtext))) => assert_eq!(mtext.content, "AAABBBCCC"),
            other => panic!("unexpected entity: {other:?}"),
        }
    }

    #[test]
    fn dimension_reads_xdata_dimlfac_override() {
        let source = dxf(concat!(
            "0\nDIMENSION\n3\nISO-25\n70\n32\n1\n<>\n",
            "10\n5\n20\n8\n13\n0\n23\n0\n14\n10\n24\n0\n",
            "1001\nACAD\n1000\nDSTYLE\n1002\n{\n1070\n40\n1040\n3.0\n1070\n144\n1040\n2.0\n1002\n}\n",
        ));
        let doc = DxfFacade::new().parse_str(&source).unwrap();
        let (_, dimension) = doc.dimensions().next().expect("dimension missing");
        assert_eq!(dimension.kind, DimensionKind::Linear);
        assert_eq!(dimension.style_name, "ISO-25");
        assert_eq!(dimension.text.as_deref(), Some("<>"));
        assert_eq!(dimension.linear_scale, Some(2.0));
        assert_eq!(dimension.definition_point, Some(Point3::new(5.0, 8.0, 0.0)));
        assert_eq!(dimension.second_point, Some(Point3::new(10.0, 0.0, 0.0)));
    }

    #[test]
    fn foreign_xdata_does_not_set_override() {
        let source = dxf(concat!(
            "0\nDIMENSION\n70\n1\n10\n0\n20\n0\n13\n0\n23\n0\n14\n1\n24\n1\n",
            "1001\nOTHERAPP\n1000\nDSTYLE\n1002\n{\n1070\n144\n1040\n9.0\n1002\n}\n",
        ));
        let doc = DxfFacade::new().parse_str(&source).unwrap();
        let (_, dimension) = doc.dimensions().next().expect("dimension missing");
        assert_eq!(dimension.kind, DimensionKind::Aligned);
        assert_eq!(dimension.linear_scale, None);
    }

    #[test]
    fn paper_space_entities_are_left_out() {
        let source = dxf(concat!(
            "0\nPOINT\n67\n1\n10\n1\n20\n1\n",
            "0\nLINE\n67\n0\n10\n0\n20\n0\n11\n2\n21\n2\n",
            "0\nDIMENSION\n67\n1\n70\n0\n10\n5\n20\n5\n13\n0\n23\n0\n14\n9\n24\n0\n",
            "0\nVIEWPORT\n67\n1\n",
        ));
        let doc = DxfFacade::new().parse_str(&source).unwrap();
        let kinds: Vec<&str> = doc.entities().map(|(_, e)| e.kind_name()).collect();
        assert_eq!(kinds, vec!["LINE"]);
        assert_eq!(doc.dimensions().count(), 0);
        assert_eq!(doc.skipped_entities(), 0);
    }

    #[test]
    fn second_put_back_is_an_error() {
        let mut reader = DxfReader::new("0\nLINE\n8\n0\n");
        let first = reader.next_pair().unwrap().unwrap();
        reader.put_back(first).unwrap();
        let err = reader.put_back((8, "0".to_string())).unwrap_err();
        assert!(matches!(err, DxfError::Invalid { .. }));
        assert_eq!(reader.next_pair().unwrap(), Some((0, "LINE".to_string())));
    }

    #[test]
    fn tables_section_provides_dimension_styles() {
        let source = concat!(
            "0\nSECTION\n2\nTABLES\n",
            "0\nTABLE\n2\nLAYER\n70\n1\n0\nLAYER\n2\n0\n70\n0\n0\nENDTAB\n",
            "0\nTABLE\n2\nDIMSTYLE\n70\n2\n",
            "0\nDIMSTYLE\n105\n27\n2\nStandard\n70\n0\n",
            "0\nDIMSTYLE\n105\n28\n2\nSCALED\n70\n0\n144\n5.0\n",
            "0\nENDTAB\n0\nENDSEC\n0\nEOF\n",
        );
        let doc = DxfFacade::new().parse_str(source).unwrap();
        assert_eq!(doc.dimension_styles().count(), 2);
        assert_eq!(doc.dimension_style("standard").unwrap().linear_scale, None);
        assert_eq!(doc.dimension_style("SCALED").unwrap().linear_scale, Some(5.0));
    }
}

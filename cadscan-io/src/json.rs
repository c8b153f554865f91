use std::fs;
use std::path::Path;

use cadscan_core::records::ExtractionResult;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use tracing::info;

use crate::IoError;

pub trait ResultSaver {
    fn save(&self, result: &ExtractionResult, path: &Path) -> Result<(), IoError>;
}

/// 以缩进 JSON 写出提取结果。非 ASCII 文本不转义，浮点数按最短往返形式输出。
#[derive(Debug, Clone)]
pub struct JsonResultWriter {
    indent: usize,
}

impl JsonResultWriter {
    pub const DEFAULT_INDENT: usize = 4;

    pub fn new() -> Self {
        Self::with_indent(Self::DEFAULT_INDENT)
    }

    pub fn with_indent(indent: usize) -> Self {
        Self { indent }
    }

    pub fn to_bytes(&self, result: &ExtractionResult) -> Result<Vec<u8>, IoError> {
        let indent = vec![b' '; self.indent];
        let mut buffer = Vec::new();
        let formatter = PrettyFormatter::with_indent(&indent);
        let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
        result
            .serialize(&mut serializer)
            .map_err(|source| IoError::Serialization { source })?;
        Ok(buffer)
    }

    pub fn to_string(&self, result: &ExtractionResult) -> Result<String, IoError> {
        let bytes = self.to_bytes(result)?;
        // serde_json 只会写出合法 UTF-8
        String::from_utf8(bytes).map_err(|err| IoError::InvalidDocument(err.to_string()))
    }
}

impl Default for JsonResultWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultSaver for JsonResultWriter {
    fn save(&self, result: &ExtractionResult, path: &Path) -> Result<(), IoError> {
        let bytes = self.to_bytes(result)?;
        fs::write(path, bytes).map_err(|source| IoError::WriteError {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), records = result.record_count(), "结果已写出");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadscan_core::geometry::Point3;
    use cadscan_core::records::{PolylineRecord, TextRecord};

    #[test]
    fn writes_unescaped_unicode_with_four_space_indent() {
        let mut result = ExtractionResult::new();
        result.texts.push(TextRecord {
            text: "闸底板".to_string(),
            location: Point3::new(1.0, 2.0, 0.0),
            height: 2.5,
        });
        let json = JsonResultWriter::new().to_string(&result).unwrap();
        assert!(json.contains("闸底板"));
        assert!(json.contains("\n    \"points\": []"));
        assert!(!json.contains("linear_dimensions"));
    }

    #[test]
    fn open_polyline_area_is_null() {
        let mut result = ExtractionResult::new();
        result.lwpolylines.push(PolylineRecord {
            points: vec![Point3::new(0.0, 0.0, 0.0), Point3::new(3.0, 4.0, 0.0)],
            is_closed: false,
            area: None,
            length: 5.0,
        });
        let value: serde_json::Value =
            serde_json::from_slice(&JsonResultWriter::with_indent(2).to_bytes(&result).unwrap())
                .unwrap();
        let polyline = &value["lwpolylines"][0];
        assert!(polyline["area"].is_null());
        assert_eq!(polyline["points"][1], serde_json::json!([3.0, 4.0, 0.0]));
        assert_eq!(polyline["length"], serde_json::json!(5.0));
    }

    #[test]
    fn save_reports_unwritable_path() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("missing").join("out.json");
        let err = JsonResultWriter::new()
            .save(&ExtractionResult::new(), &target)
            .unwrap_err();
        assert!(matches!(err, IoError::WriteError { .. }));
        assert!(!target.exists());
    }
}

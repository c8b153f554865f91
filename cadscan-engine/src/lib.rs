pub mod dimension;
pub mod extents;
pub mod extract;
pub mod pipeline;
pub mod search;

pub mod errors {
    use std::path::PathBuf;

    use cadscan_core::geometry::GeometryError;
    use cadscan_io::IoError;
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum ExtractError {
        #[error("找不到可读取的图纸 {path:?}")]
        FileNotFound {
            path: PathBuf,
            #[source]
            source: Option<std::io::Error>,
        },
        #[error("图纸结构损坏: {message}")]
        StructuralParse { message: String },
        #[error(transparent)]
        Geometry(#[from] GeometryError),
        #[error("标注缺少属性 {attribute}")]
        AnnotationAttributeMissing { attribute: &'static str },
        #[error("写出结果失败: {source}")]
        SerializationFailure {
            #[source]
            source: IoError,
        },
    }

    impl From<IoError> for ExtractError {
        fn from(err: IoError) -> Self {
            match err {
                IoError::NotFound { path } => ExtractError::FileNotFound { path, source: None },
                IoError::ReadError { path, source } => ExtractError::FileNotFound {
                    path,
                    source: Some(source),
                },
                IoError::InvalidDocument(message) => ExtractError::StructuralParse { message },
                other @ (IoError::WriteError { .. } | IoError::Serialization { .. }) => {
                    ExtractError::SerializationFailure { source: other }
                }
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn io_errors_map_onto_extraction_kinds() {
            let missing: ExtractError = IoError::NotFound {
                path: PathBuf::from("a.dxf"),
            }
            .into();
            assert!(matches!(missing, ExtractError::FileNotFound { source: None, .. }));

            let broken: ExtractError = IoError::InvalidDocument("缺少 EOF".to_string()).into();
            assert!(matches!(broken, ExtractError::StructuralParse { .. }));

            let write: ExtractError = IoError::WriteError {
                path: PathBuf::from("out.json"),
                source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
            }
            .into();
            assert!(matches!(write, ExtractError::SerializationFailure { .. }));
        }
    }
}

pub use errors::ExtractError;


use std::fs;
use std::path::PathBuf;

use cadscan_core::{document::Entity, geometry::Point3};
use cadscan_io::{DocumentLoader, DxfFacade, IoError};
use golden::assert_golden;

fn fixture(name: &str) -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests/data");
    path.push(name);
    path
}

#[test]
fn load_basic_entities_matches_expected_document() {
    let loader = DxfFacade::new();
    let doc = loader.load(&fixture("basic_entities.dxf")).expect("读取 DXF 失败");
    assert_golden("basic_entities", &doc);
}

#[test]
fn load_gbk_encoded_text() {
    let doc = DxfFacade::new()
        .load(&fixture("gbk_text.dxf"))
        .expect("读取 GBK 编码的 DXF 失败");

    let mut texts = doc.entities().filter_map(|(_, entity)| match entity {
        Entity::Text(text) => Some(text),
        _ => None,
    });
    let text = texts.next().expect("未找到 TEXT 实体");
    assert!(texts.next().is_none(), "期望仅有一个 TEXT 实体");

    assert_eq!(text.content, "闸底板");
    assert_eq!(text.layer, "标注");
    assert_eq!(text.insert, Point3::new(12.0, 34.0, 0.0));
    assert!((text.height - 3.5).abs() < 1e-9);
}

#[test]
fn missing_file_is_reported_as_not_found() {
    let dir = tempfile::tempdir().expect("创建临时目录失败");
    let err = DxfFacade::new()
        .load(&dir.path().join("absent.dxf"))
        .unwrap_err();
    assert!(matches!(err, IoError::NotFound { .. }));
}

#[test]
fn truncated_file_is_structural_error() {
    let dir = tempfile::tempdir().expect("创建临时目录失败");
    let path = dir.path().join("broken.dxf");
    fs::write(&path, "  0\nSECTION\n  2\nENTITIES\n  0\nLINE\n 10\n").expect("写入测试文件失败");

    let err = DxfFacade::new().load(&path).unwrap_err();
    assert!(matches!(err, IoError::InvalidDocument(_)), "unexpected error: {err:?}");
}

#[test]
fn entities_without_closing_section_are_rejected() {
    let dir = tempfile::tempdir().expect("创建临时目录失败");
    let path = dir.path().join("unterminated.dxf");
    fs::write(&path, "0\nSECTION\n2\nENTITIES\n0\nPOINT\n10\n1\n20\n2\n").expect("写入测试文件失败");

    let err = DxfFacade::new().load(&path).unwrap_err();
    assert!(matches!(err, IoError::InvalidDocument(_)));
}

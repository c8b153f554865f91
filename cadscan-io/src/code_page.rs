use encoding_rs::Encoding;

/// 将 `$DWGCODEPAGE` 映射为 `encoding_rs` 编码；UTF-8/ASCII 返回 `None`。
/// 未知代码页按 Windows-1252 处理。
pub fn encoding_from_code_page(code_page: &str) -> Option<&'static Encoding> {
    match code_page.trim().to_ascii_lowercase().as_str() {
        "gb2312" | "ansi_936" => Some(encoding_rs::GBK),
        "big5" | "ansi_950" => Some(encoding_rs::BIG5),
        "korean" | "ansi_949" | "johab" => Some(encoding_rs::EUC_KR),
        "ansi_932" => Some(encoding_rs::SHIFT_JIS),
        "ansi_874" => Some(encoding_rs::WINDOWS_874),
        "ansi_1250" | "dos852" => Some(encoding_rs::WINDOWS_1250),
        "ansi_1251" => Some(encoding_rs::WINDOWS_1251),
        "dos855" | "dos866" => Some(encoding_rs::IBM866),
        "ansi_1253" | "dos869" => Some(encoding_rs::WINDOWS_1253),
        "ansi_1254" | "dos857" => Some(encoding_rs::WINDOWS_1254),
        "ansi_1255" => Some(encoding_rs::WINDOWS_1255),
        "ansi_1256" => Some(encoding_rs::WINDOWS_1256),
        "ansi_1257" => Some(encoding_rs::WINDOWS_1257),
        "ansi_1258" => Some(encoding_rs::WINDOWS_1258),
        "ascii" | "utf-8" | "utf8" | "unicode" => None,
        _ => Some(encoding_rs::WINDOWS_1252),
    }
}

/// 从（可能不是 UTF-8 的）DXF 文本中找出 HEADER 段的 `$DWGCODEPAGE` 值。
/// 变量名与值都是 ASCII，因此可以在有损解码后的文本上查找。
pub fn find_code_page(lossy_source: &str) -> Option<String> {
    let mut lines = lossy_source.lines().map(str::trim);
    while let Some(line) = lines.next() {
        if line == "$DWGCODEPAGE" {
            // 下一行是组码 3，再下一行才是值
            let code = lines.next()?;
            if code != "3" {
                return None;
            }
            return lines.next().map(str::to_string);
        }
        if line == "ENTITIES" {
            break;
        }
    }
    None
}

/// 将原始字节解码为文本：合法 UTF-8 直接使用，否则按 `$DWGCODEPAGE` 转码。
pub fn decode_source(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    if let Ok(text) = std::str::from_utf8(bytes) {
        return text.to_string();
    }
    let lossy = String::from_utf8_lossy(bytes);
    let encoding = find_code_page(&lossy)
        .and_then(|code_page| encoding_from_code_page(&code_page))
        .unwrap_or(encoding_rs::WINDOWS_1252);
    let (decoded, _, _) = encoding.decode(bytes);
    decoded.into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chinese_code_pages_map_to_gbk() {
        assert_eq!(encoding_from_code_page("ANSI_936"), Some(encoding_rs::GBK));
        assert_eq!(encoding_from_code_page("gb2312"), Some(encoding_rs::GBK));
        assert_eq!(encoding_from_code_page("UTF-8"), None);
        assert_eq!(
            encoding_from_code_page("SOMETHING_ELSE"),
            Some(encoding_rs::WINDOWS_1252)
        );
    }

    #[test]
    fn code_page_is_read_from_header() {
        let source = "0\nSECTION\n2\nHEADER\n9\n$DWGCODEPAGE\n3\nANSI_936\n0\nENDSEC\n";
        assert_eq!(find_code_page(source).as_deref(), Some("ANSI_936"));
        assert_eq!(find_code_page("0\nSECTION\n2\nENTITIES\n"), None);
    }

    #[test]
    fn gbk_bytes_are_transcoded() {
        let (encoded, _, _) = encoding_rs::GBK.encode("9\n$DWGCODEPAGE\n3\nANSI_936\n1\n闸室\n");
        let decoded = decode_source(&encoded);
        assert!(decoded.contains("闸室"));
    }

    #[test]
    fn utf8_with_bom_is_kept() {
        let decoded = decode_source("\u{feff}0\nEOF\n".as_bytes());
        assert_eq!(decoded, "0\nEOF\n");
    }
}

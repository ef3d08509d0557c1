//! 오피스 문서 추출 모듈
//!
//! - DOCX: `word/document.xml`의 문단을 먼저, 표는 행마다 `셀 | 셀`로 이어 붙입니다.
//! - XLSX/XLS: calamine으로 시트마다 `Sheet: 이름` 머리글 아래 행 텍스트를 둡니다.

use std::io::{Cursor, Read};

use anyhow::{Context, Result};
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use quick_xml::events::Event;

// ============================================================================
// DOCX
// ============================================================================

/// DOCX 본문 텍스트 추출
pub fn extract_docx(bytes: &[u8]) -> Result<String> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).context("error reading DOCX")?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .context("DOCX has no word/document.xml")?
        .read_to_string(&mut xml)?;

    let body = parse_document_xml(&xml)?;

    let mut text = String::new();
    for paragraph in body.paragraphs.iter().filter(|p| !p.trim().is_empty()) {
        text.push_str(paragraph);
        text.push('\n');
    }
    for row in &body.table_rows {
        let cells: Vec<&str> = row
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .collect();
        if !cells.is_empty() {
            text.push_str(&cells.join(" | "));
            text.push('\n');
        }
    }

    Ok(text)
}

#[derive(Debug, Default)]
struct DocxBody {
    /// 표 밖의 문단
    paragraphs: Vec<String>,
    /// 표 행별 셀 텍스트
    table_rows: Vec<Vec<String>>,
}

fn parse_document_xml(xml: &str) -> Result<DocxBody> {
    let mut reader = quick_xml::Reader::from_str(xml);
    let mut body = DocxBody::default();

    let mut table_depth = 0usize;
    let mut in_text = false;
    let mut paragraph = String::new();
    let mut cell: Vec<String> = Vec::new();
    let mut row: Vec<String> = Vec::new();

    loop {
        match reader.read_event().context("malformed DOCX XML")? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"tbl" => table_depth += 1,
                b"tr" if table_depth == 1 => row.clear(),
                b"tc" if table_depth == 1 => cell.clear(),
                b"p" => paragraph.clear(),
                b"t" => in_text = true,
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"tab" => paragraph.push('\t'),
                b"br" | b"cr" => paragraph.push('\n'),
                _ => {}
            },
            Event::Text(t) if in_text => {
                paragraph.push_str(&t.unescape().context("malformed DOCX text")?);
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" if table_depth == 0 => body.paragraphs.push(std::mem::take(&mut paragraph)),
                b"p" => cell.push(std::mem::take(&mut paragraph)),
                b"tc" if table_depth == 1 => row.push(cell.join("\n")),
                b"tr" if table_depth == 1 => body.table_rows.push(std::mem::take(&mut row)),
                b"tbl" => table_depth = table_depth.saturating_sub(1),
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(body)
}

// ============================================================================
// Excel
// ============================================================================

/// XLSX/XLS 시트별 텍스트 추출
pub fn extract_excel(bytes: &[u8]) -> Result<String> {
    let mut workbook =
        open_workbook_auto_from_rs(Cursor::new(bytes.to_vec())).context("error reading Excel")?;

    let mut text = String::new();
    for sheet in workbook.sheet_names() {
        let range = workbook
            .worksheet_range(&sheet)
            .with_context(|| format!("error reading sheet {}", sheet))?;

        text.push_str(&format!("Sheet: {}\n", sheet));
        for row in range.rows() {
            let cells: Vec<String> = row
                .iter()
                .filter(|c| !matches!(c, Data::Empty))
                .map(|c| c.to_string().trim().to_string())
                .filter(|c| !c.is_empty())
                .collect();
            if !cells.is_empty() {
                text.push_str(&cells.join(" | "));
                text.push('\n');
            }
        }
        text.push('\n');
    }

    Ok(text)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    /// 주어진 파일들로 zip 아카이브 생성
    pub(crate) fn zip_bytes(files: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in files {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    pub(crate) fn docx_bytes(body: &str) -> Vec<u8> {
        let xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{}</w:body></w:document>"#,
            body
        );
        zip_bytes(&[("word/document.xml", &xml)])
    }

    fn xlsx_bytes() -> Vec<u8> {
        let content_types = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/></Types>"#;
        let root_rels = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;
        let workbook = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="Staff" sheetId="1" r:id="rId1"/></sheets></workbook>"#;
        let workbook_rels = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#;
        let sheet = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData><row r="1"><c r="A1" t="inlineStr"><is><t>name</t></is></c><c r="B1" t="inlineStr"><is><t>age</t></is></c></row><row r="2"><c r="A2" t="inlineStr"><is><t>Ada</t></is></c><c r="B2"><v>36</v></c></row></sheetData></worksheet>"#;

        zip_bytes(&[
            ("[Content_Types].xml", content_types),
            ("_rels/.rels", root_rels),
            ("xl/workbook.xml", workbook),
            ("xl/_rels/workbook.xml.rels", workbook_rels),
            ("xl/worksheets/sheet1.xml", sheet),
        ])
    }

    #[test]
    fn test_extract_docx_paragraphs_then_tables() {
        let bytes = docx_bytes(
            "<w:p><w:r><w:t>Install</w:t></w:r><w:r><w:t xml:space=\"preserve\"> guide</w:t></w:r></w:p>\
             <w:p></w:p>\
             <w:tbl><w:tr>\
               <w:tc><w:p><w:r><w:t>OS</w:t></w:r></w:p></w:tc>\
               <w:tc><w:p></w:p></w:tc>\
               <w:tc><w:p><w:r><w:t> Linux </w:t></w:r></w:p></w:tc>\
             </w:tr></w:tbl>\
             <w:p><w:r><w:t>Tom &amp; Jerry</w:t></w:r></w:p>",
        );

        let text = extract_docx(&bytes).unwrap();
        assert_eq!(text, "Install guide\nTom & Jerry\nOS | Linux\n");
    }

    #[test]
    fn test_extract_docx_rejects_non_zip() {
        assert!(extract_docx(b"plain text").is_err());
        let bytes = zip_bytes(&[("other.xml", "<a/>")]);
        assert!(extract_docx(&bytes).is_err());
    }

    #[test]
    fn test_extract_excel_sheets() {
        let text = extract_excel(&xlsx_bytes()).unwrap();
        assert_eq!(text, "Sheet: Staff\nname | age\nAda | 36\n\n");
    }

    #[test]
    fn test_extract_excel_rejects_garbage() {
        assert!(extract_excel(b"not a workbook").is_err());
    }
}

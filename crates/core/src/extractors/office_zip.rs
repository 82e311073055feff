//! DOCX / PPTX / XLSX extraction. All three are zip containers holding
//! OOXML parts; each format variant locates its text-bearing parts by name
//! and strips markup with a streaming XML reader.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::reader::Reader;
use zip::ZipArchive;

use crate::types::FailReason;

use super::Extractor;

pub struct OfficeZipExtractor;

impl Extractor for OfficeZipExtractor {
    fn extract(&self, temp_path: &Path) -> Result<String, FailReason> {
        let file = std::fs::File::open(temp_path).map_err(|_| FailReason::TransientIO)?;
        let mut archive = ZipArchive::new(file).map_err(|_| FailReason::Corrupted)?;

        let ext = temp_path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "docx" => extract_part_text(&mut archive, "word/document.xml"),
            "pptx" => extract_pptx(&mut archive),
            "xlsx" => extract_xlsx(&mut archive),
            _ => Err(FailReason::UnsupportedFormat),
        }
    }
}

fn read_zip_entry(
    archive: &mut ZipArchive<std::fs::File>,
    name: &str,
) -> Result<String, FailReason> {
    let mut entry = archive.by_name(name).map_err(|_| FailReason::Corrupted)?;
    let mut buf = String::new();
    entry
        .read_to_string(&mut buf)
        .map_err(|_| FailReason::Corrupted)?;
    Ok(buf)
}

/// Strip XML markup from a part, keeping only `<w:t>`/`<a:t>`-style text
/// runs as whitespace-joined plain text. Any element that isn't a text run
/// is dropped; a trailing newline is inserted after paragraph-like
/// elements so extracted text remains readable.
fn strip_xml_text(xml: &str) -> String {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut out = String::new();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Text(t)) => {
                if let Ok(text) = t.unescape() {
                    out.push_str(&text);
                }
            }
            Ok(Event::End(e)) => {
                let name = e.name();
                let local = String::from_utf8_lossy(name.as_ref());
                if local.ends_with(":p") || local == "p" {
                    out.push('\n');
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }
    out
}

fn extract_part_text(
    archive: &mut ZipArchive<std::fs::File>,
    part_name: &str,
) -> Result<String, FailReason> {
    let xml = read_zip_entry(archive, part_name)?;
    Ok(strip_xml_text(&xml))
}

fn extract_pptx(archive: &mut ZipArchive<std::fs::File>) -> Result<String, FailReason> {
    let slide_names: Vec<String> = (0..archive.len())
        .filter_map(|i| archive.by_index(i).ok().map(|f| f.name().to_string()))
        .filter(|name| name.starts_with("ppt/slides/slide") && name.ends_with(".xml"))
        .collect();

    if slide_names.is_empty() {
        return Err(FailReason::Corrupted);
    }

    let mut sorted = slide_names;
    sorted.sort_by_key(|name| slide_number(name));

    let mut out = String::new();
    for name in sorted {
        let xml = read_zip_entry(archive, &name)?;
        out.push_str(&strip_xml_text(&xml));
        out.push('\n');
    }
    Ok(out)
}

fn slide_number(name: &str) -> u32 {
    name.trim_start_matches("ppt/slides/slide")
        .trim_end_matches(".xml")
        .parse()
        .unwrap_or(0)
}

/// XLSX text is split across `xl/sharedStrings.xml` (the string pool) and
/// per-sheet `xl/worksheets/sheetN.xml` files that reference pool indices
/// for string cells and carry literal values for numeric/formula cells
/// (formulas store their cached value in `<v>`, which is what gets read
/// here — the formula text itself is never evaluated or shown). Sheet
/// display names come from `xl/workbook.xml`'s `<sheet name="...">`
/// elements, resolved to their worksheet part through
/// `xl/_rels/workbook.xml.rels` — the declared name has no fixed relation
/// to the part's file name, so it is searchable only if resolved this way.
fn extract_xlsx(archive: &mut ZipArchive<std::fs::File>) -> Result<String, FailReason> {
    let shared_strings = read_zip_entry(archive, "xl/sharedStrings.xml")
        .map(|xml| parse_shared_strings(&xml))
        .unwrap_or_default();

    let ordered_sheets = resolve_sheet_parts(archive);

    if ordered_sheets.is_empty() {
        return Err(FailReason::Corrupted);
    }

    let mut out = String::new();
    for (display_name, part_name) in &ordered_sheets {
        let xml = match read_zip_entry(archive, part_name) {
            Ok(xml) => xml,
            Err(_) => continue,
        };
        out.push_str(&format!("[Sheet: {display_name}]\n"));
        out.push_str(&extract_sheet_rows(&xml, &shared_strings));
        out.push('\n');
    }
    Ok(out)
}

/// Resolve each declared worksheet to its display name and zip part path,
/// in workbook order. Falls back to a numbered sheet list derived from the
/// zip's own file names if `workbook.xml`/its rels are missing or
/// unparseable, so a malformed-but-readable workbook still extracts.
fn resolve_sheet_parts(archive: &mut ZipArchive<std::fs::File>) -> Vec<(String, String)> {
    let workbook_xml = read_zip_entry(archive, "xl/workbook.xml").ok();
    let rels_xml = read_zip_entry(archive, "xl/_rels/workbook.xml.rels").ok();

    if let (Some(workbook_xml), Some(rels_xml)) = (workbook_xml, rels_xml) {
        let declared = parse_workbook_sheets(&workbook_xml);
        let rels = parse_workbook_rels(&rels_xml);
        if !declared.is_empty() {
            let resolved: Vec<(String, String)> = declared
                .into_iter()
                .filter_map(|(name, rid)| {
                    let target = rels.get(&rid)?;
                    Some((name, normalize_part_path(target)))
                })
                .collect();
            if !resolved.is_empty() {
                return resolved;
            }
        }
    }

    let mut sheet_names: Vec<String> = (0..archive.len())
        .filter_map(|i| archive.by_index(i).ok().map(|f| f.name().to_string()))
        .filter(|name| name.starts_with("xl/worksheets/sheet") && name.ends_with(".xml"))
        .collect();
    sheet_names.sort_by_key(|name| {
        name.trim_start_matches("xl/worksheets/sheet")
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(0)
    });
    sheet_names
        .into_iter()
        .enumerate()
        .map(|(idx, part)| (format!("Sheet{}", idx + 1), part))
        .collect()
}

/// `Target` attributes in the rels file are relative to `xl/`, e.g.
/// `worksheets/sheet1.xml`; some writers emit an absolute `/xl/...` form.
fn normalize_part_path(target: &str) -> String {
    if let Some(stripped) = target.strip_prefix('/') {
        stripped.to_string()
    } else {
        format!("xl/{target}")
    }
}

/// Parses `<sheets><sheet name="..." r:id="..."/>...</sheets>` from
/// `workbook.xml`, preserving declaration order.
fn parse_workbook_sheets(xml: &str) -> Vec<(String, String)> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut sheets = Vec::new();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.name().as_ref() == b"sheet" => {
                let mut name = None;
                let mut rid = None;
                for attr in e.attributes().flatten() {
                    let key = attr.key.as_ref();
                    if key == b"name" {
                        name = attr.unescape_value().ok().map(|v| v.into_owned());
                    } else if key == b"r:id" || key.ends_with(b":id") {
                        rid = attr.unescape_value().ok().map(|v| v.into_owned());
                    }
                }
                if let (Some(name), Some(rid)) = (name, rid) {
                    sheets.push((name, rid));
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }
    sheets
}

/// Parses `<Relationship Id="..." Target="..."/>` entries from
/// `workbook.xml.rels` into an `Id -> Target` map.
fn parse_workbook_rels(xml: &str) -> HashMap<String, String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut rels = HashMap::new();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.name().as_ref() == b"Relationship" => {
                let mut id = None;
                let mut target = None;
                for attr in e.attributes().flatten() {
                    match attr.key.as_ref() {
                        b"Id" => id = attr.unescape_value().ok().map(|v| v.into_owned()),
                        b"Target" => target = attr.unescape_value().ok().map(|v| v.into_owned()),
                        _ => {}
                    }
                }
                if let (Some(id), Some(target)) = (id, target) {
                    rels.insert(id, target);
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }
    rels
}

fn parse_shared_strings(xml: &str) -> Vec<String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut strings = Vec::new();
    let mut current = String::new();
    let mut buf = Vec::new();
    let mut in_si = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.name().as_ref() == b"si" => {
                in_si = true;
                current.clear();
            }
            Ok(Event::End(e)) if e.name().as_ref() == b"si" => {
                in_si = false;
                strings.push(std::mem::take(&mut current));
            }
            Ok(Event::Text(t)) if in_si => {
                if let Ok(text) = t.unescape() {
                    current.push_str(&text);
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }
    strings
}

fn extract_sheet_rows(xml: &str, shared_strings: &[String]) -> String {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut row_cells: Vec<String> = Vec::new();
    let mut out = String::new();
    let mut current_cell = String::new();
    let mut current_is_shared = false;
    let mut in_value = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.name().as_ref() == b"c" => {
                current_is_shared = e
                    .attributes()
                    .flatten()
                    .any(|a| a.key.as_ref() == b"t" && a.value.as_ref() == b"s");
                current_cell.clear();
            }
            Ok(Event::Start(e)) if e.name().as_ref() == b"v" => {
                in_value = true;
            }
            Ok(Event::Text(t)) if in_value => {
                if let Ok(text) = t.unescape() {
                    current_cell.push_str(&text);
                }
            }
            Ok(Event::End(e)) if e.name().as_ref() == b"v" => {
                in_value = false;
            }
            Ok(Event::End(e)) if e.name().as_ref() == b"c" => {
                let resolved = if current_is_shared {
                    current_cell
                        .parse::<usize>()
                        .ok()
                        .and_then(|idx| shared_strings.get(idx).cloned())
                        .unwrap_or_default()
                } else {
                    std::mem::take(&mut current_cell)
                };
                row_cells.push(resolved);
            }
            Ok(Event::End(e)) if e.name().as_ref() == b"row" => {
                out.push_str(&row_cells.join("\t"));
                out.push('\n');
                row_cells.clear();
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn strip_xml_text_keeps_text_runs_and_drops_markup() {
        let xml = r#"<w:document><w:p><w:r><w:t>Hello</w:t></w:r><w:r><w:t> World</w:t></w:r></w:p></w:document>"#;
        let text = strip_xml_text(xml);
        assert!(text.contains("Hello World"));
    }

    #[test]
    fn parse_shared_strings_extracts_pool_entries() {
        let xml = r#"<sst><si><t>Alpha</t></si><si><t>Beta</t></si></sst>"#;
        let strings = parse_shared_strings(xml);
        assert_eq!(strings, vec!["Alpha".to_string(), "Beta".to_string()]);
    }

    #[test]
    fn extract_sheet_rows_resolves_shared_strings_and_tab_joins() {
        let shared = vec!["Name".to_string(), "Age".to_string()];
        let xml = r#"<worksheet><sheetData>
            <row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1" t="s"><v>1</v></c></row>
            <row r="2"><c r="A1"><v>42</v></c></row>
        </sheetData></worksheet>"#;
        let text = extract_sheet_rows(xml, &shared);
        assert!(text.contains("Name\tAge"));
        assert!(text.contains("42"));
    }

    #[test]
    fn parse_workbook_sheets_reads_declared_name_and_rid_in_order() {
        let xml = r#"<workbook><sheets>
            <sheet name="Q3 Budget" sheetId="1" r:id="rId2"/>
            <sheet name="Notes" sheetId="2" r:id="rId1"/>
        </sheets></workbook>"#;
        let sheets = parse_workbook_sheets(xml);
        assert_eq!(
            sheets,
            vec![
                ("Q3 Budget".to_string(), "rId2".to_string()),
                ("Notes".to_string(), "rId1".to_string()),
            ]
        );
    }

    #[test]
    fn parse_workbook_rels_maps_id_to_target() {
        let xml = r#"<Relationships>
            <Relationship Id="rId1" Type="worksheet" Target="worksheets/sheet1.xml"/>
            <Relationship Id="rId2" Type="worksheet" Target="worksheets/sheet2.xml"/>
        </Relationships>"#;
        let rels = parse_workbook_rels(xml);
        assert_eq!(rels.get("rId2").map(String::as_str), Some("worksheets/sheet2.xml"));
    }

    fn write_xlsx(path: &Path, entries: &[(&str, &[u8])]) {
        let file = std::fs::File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        for (name, contents) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(contents).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn extract_xlsx_uses_declared_sheet_name_not_file_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.xlsx");
        write_xlsx(
            &path,
            &[
                (
                    "xl/workbook.xml",
                    br#"<workbook><sheets><sheet name="Q3 Budget" sheetId="1" r:id="rId1"/></sheets></workbook>"#,
                ),
                (
                    "xl/_rels/workbook.xml.rels",
                    br#"<Relationships><Relationship Id="rId1" Type="worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#,
                ),
                (
                    "xl/worksheets/sheet1.xml",
                    br#"<worksheet><sheetData><row r="1"><c r="A1"><v>42</v></c></row></sheetData></worksheet>"#,
                ),
            ],
        );

        let file = std::fs::File::open(&path).unwrap();
        let mut archive = ZipArchive::new(file).unwrap();
        let text = extract_xlsx(&mut archive).unwrap();
        assert!(text.contains("[Sheet: Q3 Budget]"));
        assert!(text.contains("42"));
    }

    #[test]
    fn resolve_sheet_parts_falls_back_to_numbered_names_without_workbook_xml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.xlsx");
        write_xlsx(
            &path,
            &[(
                "xl/worksheets/sheet1.xml",
                b"<worksheet><sheetData></sheetData></worksheet>",
            )],
        );

        let file = std::fs::File::open(&path).unwrap();
        let mut archive = ZipArchive::new(file).unwrap();
        let resolved = resolve_sheet_parts(&mut archive);
        assert_eq!(
            resolved,
            vec![("Sheet1".to_string(), "xl/worksheets/sheet1.xml".to_string())]
        );
    }
}

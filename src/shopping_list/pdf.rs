//! Minimal PDF 1.4 output: A4 pages of left-aligned text lines set in the
//! base-14 Helvetica fonts, so no font data has to be embedded.
//!
//! The base-14 fonts only cover WinAnsi, so Cyrillic is transliterated and
//! anything else outside Latin-1 is replaced with `?`.

use super::render::line;
use super::ShoppingItem;

const PAGE_WIDTH: i32 = 595;
const PAGE_HEIGHT: i32 = 842;
const LEFT: i32 = 100;
const TITLE_Y: i32 = 800;
const FIRST_LINE_Y: i32 = 750;
const LINE_STEP: i32 = 20;
const BOTTOM_Y: i32 = 50;

const TITLE: &str = "Список покупок";

pub(super) const LINES_PER_PAGE: usize = ((FIRST_LINE_Y - BOTTOM_Y) / LINE_STEP + 1) as usize;

const CATALOG_ID: usize = 1;
const PAGES_ID: usize = 2;
const FONT_ID: usize = 3;
const BOLD_FONT_ID: usize = 4;
const FIRST_PAGE_ID: usize = 5;

struct PdfWriter {
    buf: Vec<u8>,
    offsets: Vec<usize>,
}

impl PdfWriter {
    fn new() -> Self {
        Self {
            buf: b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n".to_vec(),
            offsets: Vec::new(),
        }
    }

    /// Objects must be written in id order, starting at 1.
    fn object(&mut self, id: usize, body: &[u8]) {
        debug_assert_eq!(id, self.offsets.len() + 1);
        self.offsets.push(self.buf.len());
        self.buf.extend_from_slice(format!("{id} 0 obj\n").as_bytes());
        self.buf.extend_from_slice(body);
        self.buf.extend_from_slice(b"\nendobj\n");
    }

    fn stream(&mut self, id: usize, data: &[u8]) {
        let mut body = format!("<< /Length {} >>\nstream\n", data.len()).into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(b"\nendstream");
        self.object(id, &body);
    }

    fn finish(mut self) -> Vec<u8> {
        let xref_offset = self.buf.len();
        let size = self.offsets.len() + 1;
        let mut tail = format!("xref\n0 {size}\n0000000000 65535 f \n");
        for offset in &self.offsets {
            tail.push_str(&format!("{offset:010} 00000 n \n"));
        }
        tail.push_str(&format!(
            "trailer\n<< /Size {size} /Root {CATALOG_ID} 0 R >>\nstartxref\n{xref_offset}\n%%EOF\n"
        ));
        self.buf.extend_from_slice(tail.as_bytes());
        self.buf
    }
}

fn transliterate(c: char) -> Option<&'static str> {
    let lower = match c.to_lowercase().next()? {
        'а' => "a",
        'б' => "b",
        'в' => "v",
        'г' => "g",
        'д' => "d",
        'е' => "e",
        'ё' => "e",
        'ж' => "zh",
        'з' => "z",
        'и' => "i",
        'й' => "y",
        'к' => "k",
        'л' => "l",
        'м' => "m",
        'н' => "n",
        'о' => "o",
        'п' => "p",
        'р' => "r",
        'с' => "s",
        'т' => "t",
        'у' => "u",
        'ф' => "f",
        'х' => "kh",
        'ц' => "ts",
        'ч' => "ch",
        'ш' => "sh",
        'щ' => "shch",
        'ъ' => "",
        'ы' => "y",
        'ь' => "",
        'э' => "e",
        'ю' => "yu",
        'я' => "ya",
        _ => return None,
    };
    Some(lower)
}

/// Escapes `text` for use inside a PDF literal string in WinAnsi encoding.
fn pdf_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' | '(' | ')' => {
                out.push('\\');
                out.push(c);
            }
            ' '..='~' => out.push(c),
            '\u{a0}'..='\u{ff}' => out.push_str(&format!("\\{:03o}", c as u32)),
            _ => match transliterate(c) {
                Some(latin) if c.is_uppercase() => {
                    let mut chars = latin.chars();
                    if let Some(first) = chars.next() {
                        out.push(first.to_ascii_uppercase());
                        out.push_str(chars.as_str());
                    }
                }
                Some(latin) => out.push_str(latin),
                None => out.push('?'),
            },
        }
    }
    out
}

fn page_content(lines: &[String], with_title: bool) -> Vec<u8> {
    let mut content = String::new();
    if with_title {
        content.push_str(&format!(
            "BT /F2 16 Tf {LEFT} {TITLE_Y} Td ({}) Tj ET\n",
            pdf_string(TITLE)
        ));
    }
    let mut y = FIRST_LINE_Y;
    for text in lines {
        content.push_str(&format!(
            "BT /F1 12 Tf {LEFT} {y} Td ({}) Tj ET\n",
            pdf_string(text)
        ));
        y -= LINE_STEP;
    }
    content.into_bytes()
}

pub(super) fn render(items: &[ShoppingItem]) -> Vec<u8> {
    let lines: Vec<String> = items.iter().map(line).collect();
    let mut pages: Vec<&[String]> = lines.chunks(LINES_PER_PAGE).collect();
    if pages.is_empty() {
        pages.push(&[]);
    }

    let page_ids: Vec<usize> = (0..pages.len()).map(|i| FIRST_PAGE_ID + 2 * i).collect();
    let kids = page_ids
        .iter()
        .map(|id| format!("{id} 0 R"))
        .collect::<Vec<_>>()
        .join(" ");

    let mut pdf = PdfWriter::new();
    pdf.object(
        CATALOG_ID,
        format!("<< /Type /Catalog /Pages {PAGES_ID} 0 R >>").as_bytes(),
    );
    pdf.object(
        PAGES_ID,
        format!("<< /Type /Pages /Kids [{kids}] /Count {} >>", pages.len()).as_bytes(),
    );
    pdf.object(
        FONT_ID,
        b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>",
    );
    pdf.object(
        BOLD_FONT_ID,
        b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica-Bold /Encoding /WinAnsiEncoding >>",
    );

    for (index, (page_lines, page_id)) in pages.iter().zip(&page_ids).enumerate() {
        let content_id = page_id + 1;
        pdf.object(
            *page_id,
            format!(
                "<< /Type /Page /Parent {PAGES_ID} 0 R /MediaBox [0 0 {PAGE_WIDTH} {PAGE_HEIGHT}] \
                 /Resources << /Font << /F1 {FONT_ID} 0 R /F2 {BOLD_FONT_ID} 0 R >> >> \
                 /Contents {content_id} 0 R >>"
            )
            .as_bytes(),
        );
        pdf.stream(content_id, &page_content(page_lines, index == 0));
    }

    pdf.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(count: usize) -> Vec<ShoppingItem> {
        (0..count)
            .map(|i| ShoppingItem {
                name: format!("item{i:03}"),
                measurement_unit: "g".into(),
                amount: i as i64 + 1,
            })
            .collect()
    }

    fn as_text(bytes: &[u8]) -> String {
        String::from_utf8_lossy(bytes).into_owned()
    }

    #[test]
    fn layout_fits_thirty_six_lines_per_page() {
        assert_eq!(LINES_PER_PAGE, 36);
    }

    #[test]
    fn single_page_document_is_well_formed() {
        let out = render(&items(2));
        let text = as_text(&out);
        assert!(out.starts_with(b"%PDF-1.4\n"));
        assert!(text.ends_with("%%EOF\n"));
        assert!(text.contains("/Count 1"));
        assert!(text.contains("(Spisok pokupok) Tj"));
        assert!(text.contains("BT /F1 12 Tf 100 750 Td (- item000: 1 g) Tj ET"));
        assert!(text.contains("BT /F1 12 Tf 100 730 Td (- item001: 2 g) Tj ET"));
    }

    #[test]
    fn long_lists_break_onto_new_pages() {
        let text = as_text(&render(&items(LINES_PER_PAGE + 1)));
        assert!(text.contains("/Count 2"));
        assert!(text.contains("/Kids [5 0 R 7 0 R]"));
        // the overflow line starts the second page at the top
        assert!(text.contains(&format!(
            "100 750 Td (- item{:03}: {} g) Tj",
            LINES_PER_PAGE,
            LINES_PER_PAGE + 1
        )));
        assert_eq!(text.matches("(Spisok pokupok)").count(), 1);
    }

    #[test]
    fn xref_offsets_point_at_objects() {
        let out = render(&items(40));
        let text = as_text(&out);
        let xref_at: usize = text
            .rsplit("startxref\n")
            .next()
            .and_then(|tail| tail.lines().next())
            .and_then(|n| n.parse().ok())
            .unwrap();
        assert!(out[xref_at..].starts_with(b"xref\n"));

        // everything after the binary comment line is ASCII
        let table = std::str::from_utf8(&out[xref_at..]).unwrap();
        let entries: Vec<usize> = table
            .lines()
            .skip(3)
            .take_while(|l| l.ends_with(" n "))
            .map(|l| l[..10].parse().unwrap())
            .collect();
        assert_eq!(entries.len(), 4 + 2 * 2);
        for (index, offset) in entries.iter().enumerate() {
            let header = format!("{} 0 obj", index + 1);
            assert!(out[*offset..].starts_with(header.as_bytes()));
        }
    }

    #[test]
    fn strings_are_escaped_and_transliterated() {
        assert_eq!(pdf_string("a (b) \\ c"), "a \\(b\\) \\\\ c");
        assert_eq!(pdf_string("Мука: 200 г"), "Muka: 200 g");
        assert_eq!(pdf_string("crème"), "cr\\350me");
        assert_eq!(pdf_string("盐"), "?");
    }
}

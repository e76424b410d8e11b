//! EPUB artifact writing.

use anyhow::{Context, Result};
use chrono::Utc;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// One article as a book chapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chapter {
    pub title: String,
    pub content_html: String,
}

/// Writes a complete book artifact in one call.
pub trait BookWriter {
    fn write_book(&self, title: &str, chapters: &[Chapter], output_path: &Path) -> Result<()>;
}

/// EPUB 3 writer. Produces a minimal package: stored `mimetype` entry first,
/// `META-INF/container.xml`, one OPF, a nav document, and one XHTML file per
/// chapter.
#[derive(Debug, Default)]
pub struct EpubBookWriter;

impl BookWriter for EpubBookWriter {
    fn write_book(&self, title: &str, chapters: &[Chapter], output_path: &Path) -> Result<()> {
        let file = File::create(output_path)
            .with_context(|| format!("Failed to create {:?}", output_path))?;
        let mut zip = ZipWriter::new(file);

        // The mimetype entry must come first and be uncompressed.
        let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        zip.start_file("mimetype", stored)?;
        zip.write_all(b"application/epub+zip")?;

        let deflated =
            SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        zip.start_file("META-INF/container.xml", deflated)?;
        zip.write_all(CONTAINER_XML.as_bytes())?;

        zip.start_file("OEBPS/content.opf", deflated)?;
        zip.write_all(package_document(title, chapters).as_bytes())?;

        zip.start_file("OEBPS/nav.xhtml", deflated)?;
        zip.write_all(nav_document(title, chapters).as_bytes())?;

        for (idx, chapter) in chapters.iter().enumerate() {
            zip.start_file(format!("OEBPS/{}", chapter_file_name(idx)), deflated)?;
            zip.write_all(chapter_document(chapter).as_bytes())?;
        }

        zip.finish()
            .with_context(|| format!("Failed to finalize {:?}", output_path))?;
        Ok(())
    }
}

const CONTAINER_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>
"#;

fn chapter_file_name(idx: usize) -> String {
    format!("chap_{}.xhtml", idx + 1)
}

fn package_document(title: &str, chapters: &[Chapter]) -> String {
    let now = Utc::now();
    let mut manifest = String::from(
        "    <item id=\"nav\" href=\"nav.xhtml\" media-type=\"application/xhtml+xml\" properties=\"nav\"/>\n",
    );
    let mut spine = String::new();
    for idx in 0..chapters.len() {
        manifest.push_str(&format!(
            "    <item id=\"chap{}\" href=\"{}\" media-type=\"application/xhtml+xml\"/>\n",
            idx + 1,
            chapter_file_name(idx)
        ));
        spine.push_str(&format!("    <itemref idref=\"chap{}\"/>\n", idx + 1));
    }
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="book-id">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:identifier id="book-id">urn:clipbook:{stamp}</dc:identifier>
    <dc:title>{title}</dc:title>
    <dc:creator>Unknown</dc:creator>
    <dc:language>en</dc:language>
    <meta property="dcterms:modified">{modified}</meta>
  </metadata>
  <manifest>
{manifest}  </manifest>
  <spine>
{spine}  </spine>
</package>
"#,
        stamp = now.timestamp(),
        title = xml_escape(title),
        modified = now.format("%Y-%m-%dT%H:%M:%SZ"),
    )
}

fn nav_document(title: &str, chapters: &[Chapter]) -> String {
    let mut entries = String::new();
    for (idx, chapter) in chapters.iter().enumerate() {
        entries.push_str(&format!(
            "        <li><a href=\"{}\">{}</a></li>\n",
            chapter_file_name(idx),
            xml_escape(&chapter.title)
        ));
    }
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
  <head><title>{title}</title></head>
  <body>
    <nav epub:type="toc">
      <ol>
{entries}      </ol>
    </nav>
  </body>
</html>
"#,
        title = xml_escape(title),
    )
}

fn chapter_document(chapter: &Chapter) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml">
  <head><title>{title}</title></head>
  <body>
    <h1>{title}</h1>
{content}
  </body>
</html>
"#,
        title = xml_escape(&chapter.title),
        content = chapter.content_html,
    )
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;
    use zip::ZipArchive;

    fn read_entry(archive: &mut ZipArchive<File>, name: &str) -> String {
        let mut entry = archive.by_name(name).unwrap();
        let mut content = String::new();
        entry.read_to_string(&mut content).unwrap();
        content
    }

    #[test]
    fn writes_a_well_formed_package() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.epub");
        let chapters = vec![
            Chapter {
                title: "First & Best".to_string(),
                content_html: "<p>one</p>".to_string(),
            },
            Chapter {
                title: "Second".to_string(),
                content_html: "<p>two</p>".to_string(),
            },
        ];
        EpubBookWriter
            .write_book("Collected Articles - 2026-08-26", &chapters, &path)
            .unwrap();

        let mut archive = ZipArchive::new(File::open(&path).unwrap()).unwrap();

        // First entry is the uncompressed mimetype.
        let first = archive.by_index(0).unwrap();
        assert_eq!(first.name(), "mimetype");
        assert_eq!(first.compression(), CompressionMethod::Stored);
        drop(first);

        assert_eq!(
            read_entry(&mut archive, "mimetype"),
            "application/epub+zip"
        );
        assert!(read_entry(&mut archive, "META-INF/container.xml")
            .contains("OEBPS/content.opf"));

        let opf = read_entry(&mut archive, "OEBPS/content.opf");
        assert!(opf.contains("<dc:title>Collected Articles - 2026-08-26</dc:title>"));
        assert!(opf.contains("chap_1.xhtml"));
        assert!(opf.contains("chap_2.xhtml"));

        let nav = read_entry(&mut archive, "OEBPS/nav.xhtml");
        assert!(nav.contains("First &amp; Best"));

        let chap = read_entry(&mut archive, "OEBPS/chap_1.xhtml");
        assert!(chap.contains("<p>one</p>"));
        assert!(chap.contains("<h1>First &amp; Best</h1>"));
    }

    #[test]
    fn zero_chapter_book_is_still_a_valid_archive() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.epub");
        EpubBookWriter.write_book("Collected Articles", &[], &path).unwrap();

        let mut archive = ZipArchive::new(File::open(&path).unwrap()).unwrap();
        let opf = read_entry(&mut archive, "OEBPS/content.opf");
        assert!(!opf.contains("chap_1.xhtml"));
    }
}

use chrono::TimeZone;
use chrono_tz::Europe::London;
use tempfile::tempdir;

use osf_export::contract::{
    DocumentBuilder, Footer, ImageAnchor, ImageGenerator, ImagePlacement, Run, TableCell, Table,
    TextSize,
};
use osf_export::error::RenderError;
use osf_export::markup::MarkdownRenderer;
use osf_export::materialize::{materialize, MaterializeOptions};
use osf_export::pdf::PdfBuilder;
use osf_export::qr::QrImageGenerator;
use osf_export::record::{FileEntry, ProjectRecord};
use osf_export::render::Renderer;
use osf_export::stubs::StubFetcher;

const HOST: &str = "https://api.test.osf.io/v2";

fn load_pdf(path: &std::path::Path) -> lopdf::Document {
    lopdf::Document::load_mem(&std::fs::read(path).unwrap()).unwrap()
}

fn resolve<'a>(doc: &'a lopdf::Document, object: &'a lopdf::Object) -> &'a lopdf::Object {
    match object.as_reference() {
        Ok(id) => doc.get_object(id).unwrap(),
        Err(_) => object,
    }
}

/// URI targets of the link annotations on each page, in page order.
fn link_uris(doc: &lopdf::Document) -> Vec<Vec<String>> {
    doc.get_pages()
        .values()
        .map(|page_id| {
            let page = doc.get_dictionary(*page_id).unwrap();
            let Ok(annots) = page.get(b"Annots") else {
                return Vec::new();
            };
            resolve(doc, annots)
                .as_array()
                .unwrap()
                .iter()
                .filter_map(|annot| {
                    let annot = resolve(doc, annot).as_dict().ok()?;
                    if annot.get(b"Subtype").ok()?.as_name().ok()? != b"Link" {
                        return None;
                    }
                    let action = resolve(doc, annot.get(b"A").ok()?).as_dict().ok()?;
                    let uri = action.get(b"URI").ok()?.as_str().ok()?;
                    Some(String::from_utf8_lossy(uri).into_owned())
                })
                .collect()
        })
        .collect()
}

fn image_count(doc: &lopdf::Document) -> usize {
    doc.objects
        .values()
        .filter_map(|object| object.as_stream().ok())
        .filter(|stream| {
            stream
                .dict
                .get(b"Subtype")
                .and_then(|s| s.as_name())
                .is_ok_and(|name| name == b"Image")
        })
        .count()
}

async fn stub_records() -> Vec<ProjectRecord> {
    let stub = StubFetcher::bundled(HOST).unwrap();
    materialize(&stub, &MaterializeOptions::new(HOST).project("x"))
        .await
        .unwrap()
        .records
}

/// Produces bytes that are not an image.
struct BrokenImages;

impl ImageGenerator for BrokenImages {
    fn generate(&self, _payload: &str) -> Result<Vec<u8>, RenderError> {
        Ok(b"not a png".to_vec())
    }
}

#[tokio::test]
async fn writes_a_pdf_for_a_project_tree() {
    let records = stub_records().await;
    let dir = tempdir().unwrap();
    let markup = MarkdownRenderer;
    let images = QrImageGenerator::default();
    let at = London.with_ymd_and_hms(2024, 5, 1, 10, 11, 12).unwrap();

    let (written, path) = Renderer::new(&markup, &images)
        .time_zone(London)
        .exported_at(at)
        .render(PdfBuilder::new("Test1"), &records, 0, Some(dir.path()))
        .unwrap();

    let bytes = std::fs::read(&path).unwrap();
    assert!(bytes.starts_with(b"%PDF"));
    assert_eq!(bytes.len(), written.bytes);
    // Root: content and three wikis; each component: content and wiki.
    assert!(written.pages >= 8, "only {} pages", written.pages);
    assert!(path
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("Test1-2024-05-01-10-11-12-BST"));
}

#[tokio::test]
async fn long_file_tables_break_across_pages() {
    let mut records = stub_records().await;
    records.truncate(1);
    records[0].children.clear();
    records[0].wikis.clear();
    records[0].files = (0..200)
        .map(|i| FileEntry(format!("/data/file-{i:03}.csv"), Some("0.01".into()), None))
        .collect();

    let dir = tempdir().unwrap();
    let markup = MarkdownRenderer;
    let images = QrImageGenerator::default();
    let (written, _) = Renderer::new(&markup, &images)
        .render(PdfBuilder::new("Test1"), &records, 0, Some(dir.path()))
        .unwrap();

    // At least three pages of table plus the wiki page.
    assert!(written.pages >= 4, "only {} pages", written.pages);
}

#[tokio::test]
async fn failed_render_leaves_no_file() {
    let records = stub_records().await;
    let dir = tempdir().unwrap();
    let markup = MarkdownRenderer;

    let err = Renderer::new(&markup, &BrokenImages)
        .render(PdfBuilder::new("Test1"), &records, 0, Some(dir.path()))
        .unwrap_err();

    assert!(matches!(err, RenderError::Image(_)));
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn builder_wraps_long_text_onto_new_pages() {
    let dir = tempdir().unwrap();
    let mut builder = PdfBuilder::new("wrap");
    builder.add_page();
    let paragraph = "lorem ipsum dolor sit amet ".repeat(400);
    builder.write_text(TextSize::Body, &[Run::plain(paragraph)]);
    let pages = builder.page_number();
    assert!(pages > 1);

    let written = builder.finish(&dir.path().join("wrap.pdf")).unwrap();
    assert_eq!(written.pages, pages);
    assert!(dir.path().join("wrap.pdf").is_file());
}

#[tokio::test]
async fn links_become_clickable_uri_annotations() {
    let records = stub_records().await;
    let dir = tempdir().unwrap();
    let markup = MarkdownRenderer;
    let images = QrImageGenerator::default();

    let (_, path) = Renderer::new(&markup, &images)
        .render(PdfBuilder::new("Test1"), &records, 0, Some(dir.path()))
        .unwrap();

    let pages = link_uris(&load_pdf(&path));
    assert!(pages[0].contains(&"https://test.osf.io/x/".to_string()), "{:?}", pages[0]);

    let all: Vec<&str> = pages.iter().flatten().map(String::as_str).collect();
    assert!(all.contains(&"https://test.osf.io/userid/"));
    assert!(all.contains(&"https://test.osf.io/userid2/"));
    assert!(all.iter().any(|uri| uri.starts_with("https://test.osf.io/download/")));
    assert!(all.contains(&"https://test.osf.io/a/"));
    // Project URL of the root plus the parent line of both components.
    assert!(all.iter().filter(|uri| **uri == "https://test.osf.io/x/").count() >= 3);
}

#[test]
fn table_cells_without_links_get_no_annotation() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("table.pdf");
    let mut builder = PdfBuilder::new("table");
    builder.add_page();
    builder.write_table(&Table {
        column_widths: vec![1.0, 1.0],
        header: vec!["Name".into(), "Link".into()],
        rows: vec![
            vec![TableCell::text("plain"), TableCell::linked("N/A", None)],
            vec![
                TableCell::text("linked"),
                TableCell::linked("https://osf.io/ada/", Some("https://osf.io/ada/".into())),
            ],
        ],
    });
    builder.finish(&path).unwrap();

    assert_eq!(link_uris(&load_pdf(&path)), vec![vec!["https://osf.io/ada/".to_string()]]);
}

#[test]
fn undecodable_footer_image_is_an_error() {
    let mut builder = PdfBuilder::new("broken");
    let err = builder
        .set_footer(Footer {
            exported: "2024-05-01 10:11:12 BST".into(),
            qr_png: Some(b"not a png".to_vec()),
        })
        .unwrap_err();
    assert!(matches!(err, RenderError::Image(_)));
}

#[test]
fn repeated_qr_image_is_embedded_once() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("qr.pdf");
    let png = QrImageGenerator::default().generate("https://osf.io/x/").unwrap();

    let mut builder = PdfBuilder::new("qr");
    builder
        .set_footer(Footer {
            exported: "2024-05-01 10:11:12 BST".into(),
            qr_png: Some(png.clone()),
        })
        .unwrap();
    builder.add_page();
    builder
        .place_image(
            &png,
            ImagePlacement {
                size_mm: 30.0,
                anchor: ImageAnchor::TopRight { top_mm: 5.0 },
            },
        )
        .unwrap();
    builder.add_page();
    builder.add_page();
    builder.finish(&path).unwrap();

    assert_eq!(image_count(&load_pdf(&path)), 1);
}

//! In-memory EPUB fixtures for unit tests

use std::{
    fs,
    io::{Cursor, Write},
    path::{Path, PathBuf},
};

use image::{ImageFormat, Rgb, RgbImage};
use zip::{CompressionMethod, ZipWriter, write::FileOptions};

const CONTAINER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="{package}" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;

/// Builds a small EPUB container whose OPF lives in `OEBPS/content.opf`
pub struct EpubFixture {
    metadata: Vec<String>,
    manifest: Vec<String>,
    spine: Vec<String>,
    files: Vec<(String, Vec<u8>)>,
    with_spine: bool,
}

impl EpubFixture {
    pub fn new() -> Self {
        Self {
            metadata: vec![],
            manifest: vec![],
            spine: vec![],
            files: vec![],
            with_spine: true,
        }
    }

    /// Adds a raw element to `<metadata>`, e.g. `<dc:title>Book</dc:title>`
    pub fn metadata(mut self, element: &str) -> Self {
        self.metadata.push(element.to_string());
        self
    }

    /// Adds an XHTML document to the manifest, the spine and the archive
    pub fn document(mut self, id: &str, href: &str, content: &str) -> Self {
        self.manifest.push(format!(
            r#"<item id="{}" href="{}" media-type="application/xhtml+xml"/>"#,
            id, href
        ));
        self.spine.push(format!(r#"<itemref idref="{}"/>"#, id));
        self.files.push((href.to_string(), content.as_bytes().to_vec()));
        self
    }

    /// Adds an image to the manifest and the archive
    pub fn image(mut self, id: &str, href: &str, mime: &str, data: Vec<u8>) -> Self {
        self.manifest.push(format!(
            r#"<item id="{}" href="{}" media-type="{}"/>"#,
            id, href, mime
        ));
        self.files.push((href.to_string(), data));
        self
    }

    pub fn manifest_item(mut self, element: &str) -> Self {
        self.manifest.push(element.to_string());
        self
    }

    pub fn spine_item(mut self, element: &str) -> Self {
        self.spine.push(element.to_string());
        self
    }

    /// Stores a file relative to the OPF directory without declaring it
    pub fn file(mut self, path: &str, data: &[u8]) -> Self {
        self.files.push((path.to_string(), data.to_vec()));
        self
    }

    pub fn without_spine(mut self) -> Self {
        self.with_spine = false;
        self
    }

    pub fn package(&self) -> String {
        let spine = if self.with_spine {
            format!("  <spine>\n    {}\n  </spine>\n", self.spine.join("\n    "))
        } else {
            String::new()
        };

        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="uid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    {}
  </metadata>
  <manifest>
    {}
  </manifest>
{}</package>"#,
            self.metadata.join("\n    "),
            self.manifest.join("\n    "),
            spine
        )
    }

    pub fn build(&self) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::<()>::default().compression_method(CompressionMethod::Stored);

        let mut entries = vec![
            ("mimetype".to_string(), b"application/epub+zip".to_vec()),
            (
                "META-INF/container.xml".to_string(),
                CONTAINER
                    .replace("{package}", "OEBPS/content.opf")
                    .into_bytes(),
            ),
            ("OEBPS/content.opf".to_string(), self.package().into_bytes()),
        ];
        for (path, data) in &self.files {
            entries.push((format!("OEBPS/{}", path), data.clone()));
        }

        for (name, data) in entries {
            zip.start_file(name, options).unwrap();
            zip.write_all(&data).unwrap();
        }

        zip.finish().unwrap().into_inner()
    }

    /// Writes the archive to `dir/name` and returns its path
    pub fn write_to(&self, dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, self.build()).unwrap();
        path
    }
}

/// Wraps a body in an XHTML document with an optional `<title>`
pub fn xhtml(title: Option<&str>, body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<html xmlns="http://www.w3.org/1999/xhtml">
<head><title>{}</title></head>
<body>
{}
</body>
</html>"#,
        title.unwrap_or_default(),
        body
    )
}

/// Encodes a solid-colour PNG of the given size
pub fn png(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_pixel(width, height, Rgb([200, 120, 40]));
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Png).unwrap();
    buffer.into_inner()
}

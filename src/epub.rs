use std::{
    fs::File,
    io::{BufReader, Read, Seek},
    path::Path,
};

use indexmap::IndexMap;
use log::{debug, warn};
use zip::ZipArchive;

use crate::{
    error::EpubError,
    types::{ContentDocument, ImageResource, ManifestItem, MetadataItem, SpineItem},
    utils::{
        DecodeBytes, XmlElement, XmlReader, archive_dir, compression_method_check,
        get_file_in_zip_archive, percent_decode, resolve_archive_path,
    },
};

const DC_NAMESPACE: &str = "http://purl.org/dc/elements/1.1/";
const OPF_NAMESPACE: &str = "http://www.idpf.org/2007/opf";

/// An opened EPUB container
///
/// `EpubArchive` reads the container description and the OPF package document
/// once, keeping the metadata, the manifest (in declaration order) and the
/// spine in memory. Resource bytes are only read from the archive when they
/// are requested, so opening a large publication stays cheap.
///
/// The generic parameter `R: Read + Seek` allows reading from a file as well
/// as from an in-memory buffer.
pub struct EpubArchive<R: Read + Seek> {
    /// The structure of the epub file that actually holds it
    archive: ZipArchive<R>,

    /// The path to the OPF file, relative to the container root
    pub package_path: String,

    /// The directory containing the OPF file, empty for the container root
    pub base_path: String,

    /// Epub metadata extracted from OPF, in declaration order
    pub metadata: Vec<MetadataItem>,

    /// The resources declared in the manifest, keyed by id in declaration order
    pub manifest: IndexMap<String, ManifestItem>,

    /// Reading order of the publication
    pub spine: Vec<SpineItem>,
}

impl<R: Read + Seek> EpubArchive<R> {
    /// Opens an EPUB container from a reader
    ///
    /// # Parameters
    /// - `reader`: The data source, usually a file or memory buffer
    ///
    /// # Return
    /// - `Ok(EpubArchive<R>)`: The opened container
    /// - `Err(EpubError)`: The data is not a ZIP archive, uses an unusable
    ///   compression method, or lacks the container file, the package
    ///   document, its manifest or its spine
    ///
    /// # Notes
    /// - A package document without `<metadata>` is accepted; every field
    ///   then falls back to its placeholder.
    pub fn from_reader(reader: R) -> Result<Self, EpubError> {
        let mut archive = ZipArchive::new(reader).map_err(EpubError::from)?;
        compression_method_check(&mut archive)?;

        let container = get_file_in_zip_archive(&mut archive, "META-INF/container.xml")
            .map_err(|err| match err {
                EpubError::ResourceNotFound { .. } => EpubError::NonCanonicalEpub {
                    expected_file: "META-INF/container.xml".to_string(),
                },
                err => err,
            })?
            .decode()?;
        let package_path = Self::parse_container(&container)?;
        let base_path = archive_dir(&package_path).to_string();

        let opf_file = get_file_in_zip_archive(&mut archive, &package_path)?.decode()?;
        let package = XmlReader::parse(&opf_file)?;

        let manifest_element = package
            .find_elements_by_name("manifest")
            .next()
            .ok_or_else(|| EpubError::NonCanonicalFile {
                tag: "manifest".to_string(),
            })?;
        let spine_element = package
            .find_elements_by_name("spine")
            .next()
            .ok_or_else(|| EpubError::NonCanonicalFile {
                tag: "spine".to_string(),
            })?;

        let mut epub = Self {
            archive,
            package_path,
            base_path,
            metadata: vec![],
            manifest: IndexMap::new(),
            spine: vec![],
        };

        match package.find_elements_by_name("metadata").next() {
            Some(metadata_element) => epub.parse_metadata(metadata_element),
            None => warn!(
                "Package document \"{}\" has no metadata section.",
                epub.package_path
            ),
        }
        epub.parse_manifest(manifest_element)?;
        epub.parse_spine(spine_element)?;

        debug!(
            "Opened package \"{}\": {} metadata items, {} manifest items, {} spine items",
            epub.package_path,
            epub.metadata.len(),
            epub.manifest.len(),
            epub.spine.len()
        );

        Ok(epub)
    }

    /// Parse the EPUB container file (META-INF/container.xml)
    ///
    /// The first `rootfile` element names the OPF package document.
    fn parse_container(data: &str) -> Result<String, EpubError> {
        let root = XmlReader::parse(data)?;
        let rootfile = root
            .find_elements_by_name("rootfile")
            .next()
            .ok_or_else(|| EpubError::NonCanonicalFile {
                tag: "rootfile".to_string(),
            })?;

        let full_path =
            rootfile
                .get_attr("full-path")
                .ok_or_else(|| EpubError::MissingRequiredAttribute {
                    tag: "rootfile".to_string(),
                    attribute: "full-path".to_string(),
                })?;

        resolve_archive_path("", &percent_decode(&full_path))
            .ok_or(EpubError::RelativeLinkLeakage { path: full_path })
    }

    /// Parse the EPUB metadata section
    ///
    /// Dublin Core elements are kept under their local name ("title",
    /// "creator", ...). Of the OPF `<meta>` elements, EPUB 2 `name`/`content`
    /// pairs and EPUB 3 primary `property` entries are kept; refinements are
    /// not needed for conversion and are dropped.
    fn parse_metadata(&mut self, metadata_element: &XmlElement) {
        for element in &metadata_element.children {
            let is_dc = element.namespace.as_deref() == Some(DC_NAMESPACE)
                || element.prefix.as_deref() == Some("dc");

            if is_dc {
                self.metadata.push(MetadataItem {
                    id: element.get_attr("id"),
                    property: element.name.clone(),
                    value: element.text(),
                    lang: element.get_attr("xml:lang"),
                });
            } else if element.namespace.as_deref() == Some(OPF_NAMESPACE)
                && element.name == "meta"
            {
                if let Some(item) = Self::parse_meta_element(element) {
                    self.metadata.push(item);
                }
            }
        }
    }

    #[inline]
    fn parse_meta_element(element: &XmlElement) -> Option<MetadataItem> {
        if let (Some(property), Some(value)) =
            (element.get_attr("name"), element.get_attr("content"))
        {
            return Some(MetadataItem {
                id: None,
                property,
                value,
                lang: None,
            });
        }

        if element.get_attr("refines").is_some() {
            return None;
        }

        element.get_attr("property").map(|property| MetadataItem {
            id: element.get_attr("id"),
            property,
            value: element.text(),
            lang: element.get_attr("xml:lang"),
        })
    }

    /// Parse the EPUB manifest section
    ///
    /// Every `href` is percent-decoded and resolved against the directory of
    /// the OPF file, so [ManifestItem::path] can be used to read the resource
    /// straight from the archive.
    fn parse_manifest(&mut self, manifest_element: &XmlElement) -> Result<(), EpubError> {
        for element in manifest_element.find_children_by_name("item") {
            let id = element
                .get_attr("id")
                .ok_or_else(|| EpubError::MissingRequiredAttribute {
                    tag: element.tag_name(),
                    attribute: "id".to_string(),
                })?;
            let href = element
                .get_attr("href")
                .map(|href| percent_decode(&href))
                .ok_or_else(|| EpubError::MissingRequiredAttribute {
                    tag: element.tag_name(),
                    attribute: "href".to_string(),
                })?;
            let mime = element
                .get_attr("media-type")
                .ok_or_else(|| EpubError::MissingRequiredAttribute {
                    tag: element.tag_name(),
                    attribute: "media-type".to_string(),
                })?;
            let properties = element.get_attr("properties");

            let path = resolve_archive_path(&self.base_path, &href)
                .ok_or_else(|| EpubError::RelativeLinkLeakage { path: href.clone() })?;

            if self.manifest.contains_key(&id) {
                warn!("Duplicate manifest id \"{}\", keeping the first item.", id);
                continue;
            }

            self.manifest.insert(
                id.clone(),
                ManifestItem {
                    id,
                    href,
                    path,
                    mime,
                    properties,
                },
            );
        }

        Ok(())
    }

    /// Parse the EPUB spine section
    fn parse_spine(&mut self, spine_element: &XmlElement) -> Result<(), EpubError> {
        for element in spine_element.find_children_by_name("itemref") {
            let idref = element
                .get_attr("idref")
                .ok_or_else(|| EpubError::MissingRequiredAttribute {
                    tag: element.tag_name(),
                    attribute: "idref".to_string(),
                })?;
            let id = element.get_attr("id");
            let linear = element
                .get_attr("linear")
                .map(|linear| linear != "no")
                .unwrap_or(true);

            self.spine.push(SpineItem { idref, id, linear });
        }

        Ok(())
    }

    /// Retrieves the first value of a metadata property
    ///
    /// # Parameters
    /// - `key`: The property name, e.g. "title", "creator", "language"
    ///
    /// # Return
    /// - `Some(&str)`: The value of the first matching metadata item
    /// - `None`: If no matching metadata item is found
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata
            .iter()
            .find(|item| item.property == key)
            .map(|item| item.value.as_str())
    }

    /// Retrieves all values of a metadata property, in declaration order
    pub fn metadata_values(&self, key: &str) -> Vec<&str> {
        self.metadata
            .iter()
            .filter(|item| item.property == key)
            .map(|item| item.value.as_str())
            .collect()
    }

    /// Iterates over the XHTML/HTML content documents in spine order
    ///
    /// Spine entries that reference an unknown manifest id, or a resource that
    /// is not a content document, are skipped. The document bytes are read
    /// lazily as the iterator advances; a document that cannot be read yields
    /// an `Err` and iteration continues with the next one.
    pub fn content_documents(&mut self) -> ContentDocuments<'_, R> {
        ContentDocuments {
            epub: self,
            spine_index: 0,
        }
    }

    /// Returns the image resources declared in the manifest, in manifest order
    pub fn image_resources(&self) -> Vec<ImageResource> {
        self.manifest
            .values()
            .filter(|item| item.is_image())
            .map(|item| ImageResource {
                path: item.path.clone(),
                mime: item.mime.clone(),
            })
            .collect()
    }

    /// Reads the bytes of a resource by its path relative to the container root
    pub fn read_resource(&mut self, path: &str) -> Result<Vec<u8>, EpubError> {
        get_file_in_zip_archive(&mut self.archive, path)
    }
}

impl EpubArchive<BufReader<File>> {
    /// Opens an EPUB file
    ///
    /// # Parameters
    /// - `path`: The path to the EPUB file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, EpubError> {
        let file = File::open(&path).map_err(EpubError::from)?;

        Self::from_reader(BufReader::new(file))
    }
}

/// Lazy iterator over the content documents of an [EpubArchive]
pub struct ContentDocuments<'a, R: Read + Seek> {
    epub: &'a mut EpubArchive<R>,
    spine_index: usize,
}

impl<R: Read + Seek> Iterator for ContentDocuments<'_, R> {
    type Item = Result<ContentDocument, EpubError>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.spine_index < self.epub.spine.len() {
            let spine_index = self.spine_index;
            self.spine_index += 1;

            let idref = &self.epub.spine[spine_index].idref;
            let item = match self.epub.manifest.get(idref) {
                Some(item) => item,
                None => {
                    warn!("Spine item \"{}\" is not declared in the manifest.", idref);
                    continue;
                }
            };

            if !item.is_document() {
                debug!(
                    "Spine item \"{}\" is not a content document ({}), skipping.",
                    idref, item.mime
                );
                continue;
            }

            let name = item.href.clone();
            let path = item.path.clone();
            let document =
                get_file_in_zip_archive(&mut self.epub.archive, &path).map(|data| {
                    ContentDocument {
                        spine_index,
                        name,
                        path,
                        data,
                    }
                });

            return Some(document);
        }

        None
    }
}

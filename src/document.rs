//! Document loading and structural access.
//!
//! [`Document`] owns the original file bytes plus the merged cross-reference
//! data, and resolves indirect objects on demand with caching and cycle
//! guards. It exposes the structural anchors the signing pipeline needs:
//! the catalog, page dictionaries in reading order, and the trailer keys
//! that must be carried into an incremental update (`/Size`, `/Root`,
//! `/Info`, `/ID`).
//!
//! The buffer is never modified. The incremental writer appends after it,
//! which is why loading keeps the exact bytes around instead of a reparsed
//! model.

use crate::error::{Error, Result};
use crate::object::{Object, ObjectRef};
use crate::objstm;
use crate::parser::{find_stream_end, parse_indirect_at};
use crate::xref::{self, XrefEntry, XrefTable};
use bytes::Bytes;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Depth limit for chained object resolution (e.g. /Length references).
const MAX_RESOLVE_DEPTH: u32 = 100;

/// Depth limit for page tree descent.
const MAX_TREE_DEPTH: u32 = 64;

/// A loaded PDF document, read-only.
pub struct Document {
    buf: Bytes,
    version: String,
    xref: XrefTable,
    startxref: u64,
    page_count: usize,
    cache: RefCell<HashMap<ObjectRef, Object>>,
    resolving: RefCell<HashSet<ObjectRef>>,
    depth: RefCell<u32>,
}

impl Document {
    /// Load a document from a byte buffer.
    ///
    /// Validates the structural landmarks a signature depends on: the
    /// `%PDF-` header, the `startxref` anchor, a readable cross-reference
    /// chain, and a trailer with `/Root`. Encrypted documents are rejected.
    ///
    /// # Errors
    ///
    /// * [`Error::EmptyDocument`] for a zero-length buffer
    /// * [`Error::TruncatedPdf`] when a landmark is missing
    /// * [`Error::EncryptedDocument`] when the trailer carries `/Encrypt`
    /// * [`Error::InvalidPdf`] for structural damage
    pub fn from_bytes(data: impl Into<Bytes>) -> Result<Self> {
        let buf: Bytes = data.into();
        if buf.is_empty() {
            return Err(Error::EmptyDocument);
        }

        let version = parse_header_version(&buf)?;
        let startxref = xref::find_startxref(&buf)?;
        let table = xref::read_xref_chain(&buf, startxref)?;

        if table.trailer().get("Encrypt").is_some_and(|o| !o.is_null()) {
            return Err(Error::EncryptedDocument);
        }
        if !table.trailer().contains_key("Root") {
            return Err(Error::InvalidPdf("trailer missing /Root".to_string()));
        }

        let mut doc = Self {
            buf,
            version,
            xref: table,
            startxref,
            page_count: 0,
            cache: RefCell::new(HashMap::new()),
            resolving: RefCell::new(HashSet::new()),
            depth: RefCell::new(0),
        };
        doc.page_count = doc.compute_page_count()?;

        log::info!(
            "loaded PDF {} ({} bytes, {} xref entries, {} page(s))",
            doc.version,
            doc.buf.len(),
            doc.xref.len(),
            doc.page_count
        );
        Ok(doc)
    }

    /// Load a document from a file path.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use pdf_signet::document::Document;
    ///
    /// let doc = Document::open("contract.pdf")?;
    /// println!("{} page(s)", doc.page_count());
    /// # Ok::<(), pdf_signet::error::Error>(())
    /// ```
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read(path)?;
        Self::from_bytes(data)
    }

    /// The original file bytes, untouched.
    pub fn bytes(&self) -> &Bytes {
        &self.buf
    }

    /// Header version string ("1.4", "1.7", ...).
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Byte offset recorded by the last `startxref`, the `/Prev` target of
    /// an incremental update.
    pub fn startxref(&self) -> u64 {
        self.startxref
    }

    /// The merged trailer dictionary (newest update wins per key).
    pub fn trailer(&self) -> &HashMap<String, Object> {
        self.xref.trailer()
    }

    /// Number of pages, from the root `/Pages` node's `/Count` (verified by
    /// a tree walk when `/Count` is missing or invalid).
    pub fn page_count(&self) -> usize {
        self.page_count
    }

    /// First unused object number for appended objects.
    pub fn next_object_number(&self) -> u32 {
        let from_size = self
            .trailer()
            .get("Size")
            .and_then(Object::as_integer)
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(0);
        from_size.max(self.xref.max_object_number() + 1)
    }

    /// Reference to the document catalog from the trailer `/Root`.
    pub fn catalog_ref(&self) -> Result<ObjectRef> {
        self.trailer()
            .get("Root")
            .and_then(Object::as_reference)
            .ok_or_else(|| Error::InvalidPdf("trailer /Root is not a reference".to_string()))
    }

    /// The catalog dictionary, resolved and cloned.
    pub fn catalog_dict(&self) -> Result<HashMap<String, Object>> {
        let catalog_ref = self.catalog_ref()?;
        let catalog = self.load_object(catalog_ref)?;
        catalog
            .as_dict()
            .cloned()
            .ok_or_else(|| Error::InvalidPdf("catalog is not a dictionary".to_string()))
    }

    /// The page at `index` (zero-based, reading order): its reference and
    /// its dictionary exactly as stored, without inherited attributes.
    ///
    /// # Errors
    ///
    /// [`Error::PageOutOfRange`] when `index` is past the last page; the
    /// reported page number is one-based.
    pub fn page(&self, index: usize) -> Result<(ObjectRef, HashMap<String, Object>)> {
        if index >= self.page_count {
            return Err(Error::PageOutOfRange {
                requested: index + 1,
                page_count: self.page_count,
            });
        }

        let pages = self.collect_pages(Some(index + 1))?;
        let page_ref = pages.get(index).copied().ok_or_else(|| {
            Error::InvalidPdf(format!(
                "page tree yields {} page(s), /Count promised {}",
                pages.len(),
                self.page_count
            ))
        })?;

        let page = self.load_object(page_ref)?;
        let dict = page
            .as_dict()
            .cloned()
            .ok_or_else(|| Error::InvalidPdf("page object is not a dictionary".to_string()))?;
        Ok((page_ref, dict))
    }

    /// Load an indirect object, consulting the cache first.
    ///
    /// Compressed objects are unpacked from their object stream (all
    /// members land in the cache in one pass). Circular reference chains
    /// and runaway depth are both cut off with an error.
    pub fn load_object(&self, obj_ref: ObjectRef) -> Result<Object> {
        if let Some(cached) = self.cache.borrow().get(&obj_ref) {
            return Ok(cached.clone());
        }

        if *self.depth.borrow() >= MAX_RESOLVE_DEPTH {
            log::error!("resolution depth limit hit while loading {}", obj_ref);
            return Err(Error::InvalidPdf(format!(
                "object resolution exceeded depth {} at {}",
                MAX_RESOLVE_DEPTH, obj_ref
            )));
        }
        if !self.resolving.borrow_mut().insert(obj_ref) {
            log::error!("circular reference detected at {}", obj_ref);
            return Err(Error::InvalidPdf(format!("circular reference resolving {}", obj_ref)));
        }

        *self.depth.borrow_mut() += 1;
        let result = self.load_uncached(obj_ref);
        *self.depth.borrow_mut() -= 1;
        self.resolving.borrow_mut().remove(&obj_ref);

        if let Ok(obj) = &result {
            self.cache.borrow_mut().insert(obj_ref, obj.clone());
        }
        result
    }

    /// Resolve one level of indirection: references load their target,
    /// anything else is returned as-is.
    pub fn resolve(&self, obj: &Object) -> Result<Object> {
        match obj {
            Object::Reference(obj_ref) => self.load_object(*obj_ref),
            other => Ok(other.clone()),
        }
    }

    /// Fetch `key` from a dictionary and resolve it if it is a reference.
    pub fn resolved_entry(
        &self,
        dict: &HashMap<String, Object>,
        key: &str,
    ) -> Result<Option<Object>> {
        match dict.get(key) {
            Some(obj) => Ok(Some(self.resolve(obj)?)),
            None => Ok(None),
        }
    }

    fn load_uncached(&self, obj_ref: ObjectRef) -> Result<Object> {
        let entry = *self.xref.get(obj_ref.id).ok_or_else(|| {
            Error::InvalidPdf(format!("{} not present in cross-reference data", obj_ref))
        })?;
        log::debug!("loading {} via {:?}", obj_ref, entry);

        match entry {
            XrefEntry::InFile { offset, generation } => {
                if generation != obj_ref.gen {
                    log::warn!(
                        "{} resolved through an entry with generation {}",
                        obj_ref,
                        generation
                    );
                }
                self.load_at_offset(obj_ref, offset)
            },
            XrefEntry::InStream { stream_number, .. } => {
                self.load_from_object_stream(obj_ref, stream_number)
            },
            XrefEntry::Free { .. } => {
                Err(Error::InvalidPdf(format!("{} is marked free", obj_ref)))
            },
        }
    }

    fn load_at_offset(&self, obj_ref: ObjectRef, offset: u64) -> Result<Object> {
        let offset = usize::try_from(offset)
            .map_err(|_| Error::InvalidPdf(format!("{}: offset {} overflows", obj_ref, offset)))?;
        let parsed = parse_indirect_at(&self.buf, offset)?;
        if parsed.reference.id != obj_ref.id {
            return Err(Error::InvalidPdf(format!(
                "offset {} holds {}, cross-reference expected {}",
                offset, parsed.reference, obj_ref
            )));
        }

        let Some(data_start) = parsed.stream_data_start else {
            return Ok(parsed.object);
        };
        let dict = match parsed.object {
            Object::Dictionary(dict) => dict,
            other => {
                return Err(Error::InvalidPdf(format!(
                    "{}: stream keyword follows a {}",
                    obj_ref,
                    other.type_name()
                )));
            },
        };

        // /Length may itself be indirect; the resolve depth guard covers it
        let length = match dict.get("Length") {
            Some(Object::Integer(n)) if *n >= 0 => Some(*n as usize),
            Some(Object::Reference(len_ref)) => {
                self.load_object(*len_ref)?.as_integer().and_then(|v| usize::try_from(v).ok())
            },
            _ => None,
        };

        let data_end = match length {
            Some(len)
                if data_start.checked_add(len).is_some_and(|e| e <= self.buf.len())
                    && endstream_follows(&self.buf, data_start + len) =>
            {
                data_start + len
            },
            _ => {
                log::warn!("{}: /Length unusable, scanning for endstream", obj_ref);
                find_stream_end(&self.buf, data_start).ok_or_else(|| {
                    Error::TruncatedPdf(format!("{}: stream never terminates", obj_ref))
                })?
            },
        };

        Ok(Object::Stream { dict, data: self.buf.slice(data_start..data_end) })
    }

    fn load_from_object_stream(&self, obj_ref: ObjectRef, stream_number: u32) -> Result<Object> {
        let container = self.load_object(ObjectRef::new(stream_number, 0))?;
        let members = objstm::extract_members(&container)?;

        // Compressed objects always have generation 0; prime the cache with
        // every member so sibling lookups skip the unpack.
        {
            let mut cache = self.cache.borrow_mut();
            for (number, obj) in &members {
                cache.entry(ObjectRef::new(*number, 0)).or_insert_with(|| obj.clone());
            }
        }

        members.get(&obj_ref.id).cloned().ok_or_else(|| {
            Error::InvalidPdf(format!(
                "{} missing from object stream {}",
                obj_ref, stream_number
            ))
        })
    }

    fn pages_root_ref(&self) -> Result<ObjectRef> {
        let catalog = self.catalog_dict()?;
        catalog
            .get("Pages")
            .and_then(Object::as_reference)
            .ok_or_else(|| Error::InvalidPdf("catalog /Pages is not a reference".to_string()))
    }

    fn compute_page_count(&self) -> Result<usize> {
        let root_ref = self.pages_root_ref()?;
        let root = self.load_object(root_ref)?;
        let dict = root
            .as_dict()
            .ok_or_else(|| Error::InvalidPdf("/Pages root is not a dictionary".to_string()))?;

        if let Some(count) = dict.get("Count").and_then(Object::as_integer) {
            if let Ok(count) = usize::try_from(count) {
                return Ok(count);
            }
        }

        log::warn!("/Pages root has no usable /Count, walking the tree");
        Ok(self.collect_pages(None)?.len())
    }

    /// Depth-first walk over the page tree, collecting page references in
    /// reading order. Stops early once `limit` pages are found.
    fn collect_pages(&self, limit: Option<usize>) -> Result<Vec<ObjectRef>> {
        let root_ref = self.pages_root_ref()?;
        let mut pages = Vec::new();
        let mut visited = HashSet::new();
        self.walk_pages(root_ref, 0, &mut visited, &mut pages, limit)?;
        Ok(pages)
    }

    fn walk_pages(
        &self,
        node_ref: ObjectRef,
        depth: u32,
        visited: &mut HashSet<ObjectRef>,
        pages: &mut Vec<ObjectRef>,
        limit: Option<usize>,
    ) -> Result<()> {
        if limit.is_some_and(|l| pages.len() >= l) {
            return Ok(());
        }
        if depth > MAX_TREE_DEPTH {
            return Err(Error::InvalidPdf(format!(
                "page tree deeper than {} levels",
                MAX_TREE_DEPTH
            )));
        }
        if !visited.insert(node_ref) {
            return Err(Error::InvalidPdf(format!("page tree cycle at {}", node_ref)));
        }

        let node = self.load_object(node_ref)?;
        let dict = node
            .as_dict()
            .ok_or_else(|| Error::InvalidPdf(format!("{} in page tree is not a dictionary", node_ref)))?;

        match dict.get("Type").and_then(Object::as_name) {
            Some("Page") => {
                pages.push(node_ref);
                Ok(())
            },
            Some("Pages") => {
                let kids = dict.get("Kids").and_then(Object::as_array).ok_or_else(|| {
                    Error::InvalidPdf(format!("{} /Pages node missing /Kids", node_ref))
                })?;
                for kid in kids {
                    let Some(kid_ref) = kid.as_reference() else {
                        log::warn!("non-reference kid under {}, skipping", node_ref);
                        continue;
                    };
                    self.walk_pages(kid_ref, depth + 1, visited, pages, limit)?;
                }
                Ok(())
            },
            other => Err(Error::InvalidPdf(format!(
                "page tree node {} has /Type {:?}",
                node_ref, other
            ))),
        }
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("version", &self.version)
            .field("bytes", &self.buf.len())
            .field("pages", &self.page_count)
            .field("xref_entries", &self.xref.len())
            .finish()
    }
}

/// Extract the header version, tolerating junk before `%PDF-`.
fn parse_header_version(buf: &[u8]) -> Result<String> {
    let window = &buf[..buf.len().min(1024)];
    let pos = window
        .windows(5)
        .position(|w| w == b"%PDF-")
        .ok_or_else(|| Error::TruncatedPdf("missing %PDF- header".to_string()))?;
    if pos != 0 {
        log::warn!("{} byte(s) of junk before the PDF header", pos);
    }

    let tail = &buf[pos + 5..];
    let end = tail
        .iter()
        .position(|&c| !(c.is_ascii_digit() || c == b'.'))
        .unwrap_or(tail.len());
    let version = String::from_utf8_lossy(&tail[..end]).to_string();
    if version.is_empty() {
        log::warn!("header carries no version number, assuming 1.4");
        return Ok("1.4".to_string());
    }
    Ok(version)
}

/// True when `endstream` follows at `pos`, allowing leading whitespace.
fn endstream_follows(buf: &[u8], pos: usize) -> bool {
    let mut i = pos;
    while let Some(&c) = buf.get(i) {
        if matches!(c, b' ' | b'\t' | b'\r' | b'\n' | 0x00 | 0x0C) {
            i += 1;
        } else {
            break;
        }
    }
    buf[i.min(buf.len())..].starts_with(b"endstream")
}

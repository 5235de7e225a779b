//! Document model: an immutable byte buffer plus the revision chain,
//! merged cross-reference map, object cache and encryption wiring.

use crate::encryption::EncryptionHandler;
use crate::error::{Error, Result};
use crate::object::{stream_filters, Object, ObjectRef};
use crate::parser::parse_indirect_object;
use crate::xref::{parse_revisions, CrossRefTable, ObjectLocation, ParserOptions, XRefSection};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Maximum recursion depth for object resolution.
const MAX_RECURSION_DEPTH: u32 = 100;

/// An open PDF document.
///
/// Construction parses the header, every cross-reference revision and the
/// trailer, then initializes encryption (attempting the empty password).
/// The raw bytes are never modified; mutation records replacement objects
/// that the writer emits.
pub struct Document {
    data: Vec<u8>,
    version: (u8, u8),
    revisions: Vec<XRefSection>,
    xref: CrossRefTable,
    object_cache: HashMap<ObjectRef, Object>,
    container_cache: HashMap<u32, HashMap<u32, Object>>,
    resolving: RefCell<HashSet<ObjectRef>>,
    depth: RefCell<u32>,
    encryption: Option<EncryptionHandler>,
    encrypt_obj_num: Option<u32>,
    replacements: HashMap<ObjectRef, Object>,
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("version", &self.version)
            .field("revisions", &self.revisions.len())
            .field("xref_entries", &self.xref.len())
            .field("encrypted", &self.encryption.is_some())
            .finish_non_exhaustive()
    }
}

impl Document {
    /// Open a document from a file path.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_bytes(std::fs::read(path)?)
    }

    /// Open a document from raw bytes with default parser options.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        Self::from_bytes_with_options(data, ParserOptions::default())
    }

    /// Open a document from raw bytes.
    pub fn from_bytes_with_options(data: Vec<u8>, options: ParserOptions) -> Result<Self> {
        let version = parse_header(&data)?;
        let revisions = parse_revisions(&data, &options)?;
        let xref = CrossRefTable::merge(&revisions);

        if xref.is_empty() {
            return Err(Error::InvalidXref("no objects resolved".to_string()));
        }

        let mut document = Self {
            data,
            version,
            revisions,
            xref,
            object_cache: HashMap::new(),
            container_cache: HashMap::new(),
            resolving: RefCell::new(HashSet::new()),
            depth: RefCell::new(0),
            encryption: None,
            encrypt_obj_num: None,
            replacements: HashMap::new(),
        };

        document.init_encryption()?;
        Ok(document)
    }

    /// The raw input bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// PDF version as (major, minor).
    pub fn version(&self) -> (u8, u8) {
        self.version
    }

    /// Number of incremental-update revisions, oldest first.
    pub fn revision_count(&self) -> usize {
        self.revisions.len()
    }

    /// The revision chain, oldest first.
    pub fn revisions(&self) -> &[XRefSection] {
        &self.revisions
    }

    /// The merged cross-reference map (newest revision wins).
    pub fn xref(&self) -> &CrossRefTable {
        &self.xref
    }

    /// The newest revision's trailer dictionary.
    pub fn trailer(&self) -> &HashMap<String, Object> {
        &self.revisions.last().expect("at least one revision").trailer
    }

    /// The encryption handler, when the document has an `/Encrypt` entry.
    pub fn encryption(&self) -> Option<&EncryptionHandler> {
        self.encryption.as_ref()
    }

    /// Object number of the indirect `/Encrypt` dictionary, when present.
    pub(crate) fn encrypt_obj_num(&self) -> Option<u32> {
        self.encrypt_obj_num
    }

    /// Replacement objects recorded by mutation, keyed by id.
    pub(crate) fn replacements(&self) -> &HashMap<ObjectRef, Object> {
        &self.replacements
    }

    /// Record a replacement object to be emitted by the writer.
    pub fn replace_object(&mut self, obj_ref: ObjectRef, obj: Object) {
        self.object_cache.remove(&obj_ref);
        self.replacements.insert(obj_ref, obj);
    }

    fn init_encryption(&mut self) -> Result<()> {
        let trailer = self.revisions.last().expect("at least one revision").trailer.clone();

        let encrypt_entry = match trailer.get("Encrypt") {
            Some(entry) => entry.clone(),
            None => return Ok(()),
        };

        let file_id = trailer
            .get("ID")
            .and_then(|o| o.as_array())
            .and_then(|arr| arr.first())
            .and_then(|o| o.as_string())
            .map(|s| s.to_vec())
            .unwrap_or_else(|| {
                log::warn!("missing /ID in trailer of an encrypted document");
                Vec::new()
            });

        let encrypt_obj = match encrypt_entry {
            Object::Dictionary(_) => encrypt_entry,
            Object::Reference(obj_ref) => {
                self.encrypt_obj_num = Some(obj_ref.id);
                self.load_object_raw(obj_ref)?
            }
            other => {
                return Err(Error::InvalidPdf(format!(
                    "/Encrypt entry is {}",
                    other.type_name()
                )))
            }
        };

        let mut handler = EncryptionHandler::new(&encrypt_obj, file_id)?;
        if handler.authenticate(b"")? {
            log::info!("authenticated with the empty password");
        } else {
            log::warn!("document requires a password");
        }
        self.encryption = Some(handler);
        Ok(())
    }

    /// Authenticate against the security handler with one password.
    pub fn authenticate(&mut self, password: &[u8]) -> Result<bool> {
        match self.encryption.as_mut() {
            Some(handler) => {
                let ok = handler.authenticate(password)?;
                if ok {
                    // Cached objects may hold still-encrypted strings
                    self.object_cache.clear();
                    self.container_cache.clear();
                }
                Ok(ok)
            }
            None => Ok(true),
        }
    }

    /// Whether object content is readable (unencrypted or unlocked).
    pub fn is_unlocked(&self) -> bool {
        self.encryption
            .as_ref()
            .map(|h| h.is_authenticated())
            .unwrap_or(true)
    }

    /// Try the empty password, then each candidate in order.
    ///
    /// Returns the password that unlocked the document, `None` when it was
    /// not encrypted to begin with, or an error naming the failure after
    /// all candidates are rejected.
    pub fn unlock_with_passwords(&mut self, candidates: &[&str]) -> Result<Option<String>> {
        if self.encryption.is_none() {
            return Ok(None);
        }
        if self.is_unlocked() {
            return Ok(Some(String::new()));
        }
        for candidate in candidates {
            if self.authenticate(candidate.as_bytes())? {
                log::info!("password accepted after retry");
                return Ok(Some((*candidate).to_string()));
            }
        }
        Err(Error::Decryption(format!(
            "password rejected after {} candidate(s)",
            candidates.len()
        )))
    }

    /// Load an object by reference, decrypting strings when the document
    /// is encrypted and unlocked. Results are cached.
    pub fn load_object(&mut self, obj_ref: ObjectRef) -> Result<Object> {
        {
            let depth = *self.depth.borrow();
            if depth >= MAX_RECURSION_DEPTH {
                return Err(Error::RecursionLimitExceeded(MAX_RECURSION_DEPTH));
            }
        }
        if self.resolving.borrow().contains(&obj_ref) {
            return Err(Error::CircularReference(obj_ref));
        }
        if let Some(cached) = self.object_cache.get(&obj_ref) {
            return Ok(cached.clone());
        }

        self.resolving.borrow_mut().insert(obj_ref);
        *self.depth.borrow_mut() += 1;
        let result = self.load_object_inner(obj_ref);
        *self.depth.borrow_mut() -= 1;
        self.resolving.borrow_mut().remove(&obj_ref);

        let obj = result?;
        self.object_cache.insert(obj_ref, obj.clone());
        Ok(obj)
    }

    fn load_object_inner(&mut self, obj_ref: ObjectRef) -> Result<Object> {
        let location = self
            .xref
            .get(obj_ref.id)
            .ok_or(Error::ObjectNotFound(obj_ref.id, obj_ref.gen))?;

        match location {
            ObjectLocation::Free => Err(Error::ObjectNotFound(obj_ref.id, obj_ref.gen)),
            ObjectLocation::Direct { offset, .. } => {
                let mut obj = self.parse_object_at(obj_ref, offset)?;
                self.decrypt_strings(&mut obj, obj_ref);
                Ok(obj)
            }
            ObjectLocation::InStream { container_id, index } => {
                // Members of object streams carry no separate encryption;
                // the container stream was decrypted as a whole.
                self.load_container_member(obj_ref, container_id, index)
            }
        }
    }

    /// Parse a direct object without any decryption (used for the
    /// /Encrypt dictionary itself).
    fn load_object_raw(&mut self, obj_ref: ObjectRef) -> Result<Object> {
        match self.xref.get(obj_ref.id) {
            Some(ObjectLocation::Direct { offset, .. }) => self.parse_object_at(obj_ref, offset),
            Some(_) | None => Err(Error::ObjectNotFound(obj_ref.id, obj_ref.gen)),
        }
    }

    fn parse_object_at(&self, obj_ref: ObjectRef, offset: u64) -> Result<Object> {
        let start = offset as usize;
        if start >= self.data.len() {
            return Err(Error::InvalidPdf(format!(
                "object {} offset {} beyond end of file",
                obj_ref, offset
            )));
        }

        let (_, (parsed_ref, obj)) =
            parse_indirect_object(&self.data[start..]).map_err(|e| Error::ParseError {
                offset: start,
                reason: format!("{:?}", e),
            })?;

        if parsed_ref.id != obj_ref.id {
            log::warn!(
                "object header at {} says {} but xref expected {}",
                offset,
                parsed_ref,
                obj_ref
            );
        }

        Ok(obj)
    }

    fn load_container_member(
        &mut self,
        obj_ref: ObjectRef,
        container_id: u32,
        index: u16,
    ) -> Result<Object> {
        if !self.container_cache.contains_key(&container_id) {
            let container_ref = ObjectRef::new(container_id, 0);
            let container = self.load_object(container_ref)?;

            let (dict, data) = match &container {
                Object::Stream { dict, data } => (dict, data),
                other => {
                    return Err(Error::InvalidPdf(format!(
                        "object-stream container {} is {}",
                        container_id,
                        other.type_name()
                    )))
                }
            };
            if !container.has_type("ObjStm") {
                log::warn!("container {} lacks /Type /ObjStm", container_id);
            }

            let n = dict
                .get("N")
                .and_then(|o| o.as_integer())
                .ok_or_else(|| Error::InvalidPdf("object stream missing /N".to_string()))?;
            let first = dict
                .get("First")
                .and_then(|o| o.as_integer())
                .ok_or_else(|| Error::InvalidPdf("object stream missing /First".to_string()))?;

            let decoded = self.stream_plaintext(dict, data, container_ref, true)?;
            let members = crate::objstm::parse_container(n, first, &decoded)?;
            self.container_cache.insert(container_id, members);
        }

        let members = &self.container_cache[&container_id];
        members
            .get(&obj_ref.id)
            .cloned()
            .or_else(|| {
                // Fall back to positional lookup when numbering disagrees
                log::warn!(
                    "object {} not found by number in container {}, index {} unused",
                    obj_ref.id,
                    container_id,
                    index
                );
                None
            })
            .ok_or(Error::ObjectNotFound(obj_ref.id, obj_ref.gen))
    }

    /// Decrypted and filter-decoded bytes of a stream object.
    pub fn stream_data(&mut self, obj_ref: ObjectRef) -> Result<Vec<u8>> {
        let obj = self.load_object(obj_ref)?;
        match &obj {
            Object::Stream { dict, data } => self.stream_plaintext(dict, data, obj_ref, true),
            other => Err(Error::InvalidObjectType {
                expected: "Stream".to_string(),
                found: other.type_name().to_string(),
            }),
        }
    }

    /// Decrypted but still filtered stream payload (for the rewriter).
    pub(crate) fn stream_raw_plaintext(
        &mut self,
        obj_ref: ObjectRef,
        dict: &HashMap<String, Object>,
        data: &[u8],
    ) -> Result<Vec<u8>> {
        self.decrypt_stream_payload(dict, data, obj_ref)
    }

    fn stream_plaintext(
        &self,
        dict: &HashMap<String, Object>,
        data: &[u8],
        obj_ref: ObjectRef,
        decode: bool,
    ) -> Result<Vec<u8>> {
        let decrypted = self.decrypt_stream_payload(dict, data, obj_ref)?;
        if !decode {
            return Ok(decrypted);
        }
        let filters = stream_filters(dict);
        let params = dict
            .get("DecodeParms")
            .and_then(|o| crate::xref::decode_params_from(o));
        crate::decoders::decode_stream_with_params(&decrypted, &filters, params.as_ref())
    }

    fn decrypt_stream_payload(
        &self,
        dict: &HashMap<String, Object>,
        data: &[u8],
        obj_ref: ObjectRef,
    ) -> Result<Vec<u8>> {
        let handler = match &self.encryption {
            Some(h) => h,
            None => return Ok(trim_stream_whitespace(data).to_vec()),
        };

        if self.is_decryption_exempt(dict, obj_ref) {
            return Ok(data.to_vec());
        }
        if !handler.is_authenticated() {
            return Err(Error::Decryption(
                "document is locked; authenticate first".to_string(),
            ));
        }

        log::debug!("decrypting stream of object {}", obj_ref);
        handler.decrypt_object_bytes(data, obj_ref.id, obj_ref.gen)
    }

    /// Streams never covered by the security handler: cross-reference
    /// streams, the /Encrypt dictionary, and metadata when
    /// /EncryptMetadata is false.
    pub(crate) fn is_decryption_exempt(
        &self,
        dict: &HashMap<String, Object>,
        obj_ref: ObjectRef,
    ) -> bool {
        if Some(obj_ref.id) == self.encrypt_obj_num {
            return true;
        }
        let type_name = dict.get("Type").and_then(|t| t.as_name());
        if type_name == Some("XRef") {
            return true;
        }
        if type_name == Some("Metadata") {
            if let Some(handler) = &self.encryption {
                return !handler.dict().encrypt_metadata;
            }
        }
        false
    }

    fn decrypt_strings(&self, obj: &mut Object, obj_ref: ObjectRef) {
        let handler = match &self.encryption {
            Some(h) if h.is_authenticated() => h,
            _ => return,
        };
        if Some(obj_ref.id) == self.encrypt_obj_num {
            return;
        }
        if let Object::Stream { dict, .. } = obj {
            if dict.get("Type").and_then(|t| t.as_name()) == Some("XRef") {
                return;
            }
        }
        decrypt_strings_walk(handler, obj, obj_ref);
    }

    /// Resolve one level of indirection.
    pub fn resolve(&mut self, obj: &Object) -> Result<Object> {
        match obj.as_reference() {
            Some(obj_ref) => self.load_object(obj_ref),
            None => Ok(obj.clone()),
        }
    }

    /// The document catalog (trailer `/Root`).
    pub fn catalog(&mut self) -> Result<Object> {
        let root_ref = self
            .revisions
            .last()
            .and_then(|s| s.root_ref())
            .ok_or_else(|| Error::InvalidPdf("trailer has no /Root".to_string()))?;
        self.load_object(root_ref)
    }

    /// Apply a field-value map to the XFA datasets packet.
    ///
    /// Convenience wrapper over [`crate::xfa::apply_field_values`].
    pub fn set_xfa_fields(
        &mut self,
        values: &crate::xfa::FieldValueMap,
    ) -> Result<crate::xfa::MutationReport> {
        crate::xfa::apply_field_values(self, values)
    }

    /// Extract the questionnaire schema from the XFA template packet.
    pub fn extract_schema(&mut self) -> Result<crate::xfa::FormSchema> {
        crate::xfa::extract_schema(self)
    }

    /// Serialize the document, including any recorded replacements.
    pub fn save_to_bytes(&mut self, mode: crate::writer::SaveMode) -> Result<Vec<u8>> {
        match mode {
            crate::writer::SaveMode::FullRewrite => crate::writer::write_full(self),
            crate::writer::SaveMode::Incremental => crate::writer::write_incremental(self),
        }
    }

    /// Serialize the document to a file.
    pub fn save_to(&mut self, path: impl AsRef<Path>, mode: crate::writer::SaveMode) -> Result<()> {
        let bytes = self.save_to_bytes(mode)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }
}

/// Recursively decrypt string values inside a loaded object.
fn decrypt_strings_walk(handler: &EncryptionHandler, obj: &mut Object, obj_ref: ObjectRef) {
    match obj {
        Object::String(bytes) => {
            match handler.decrypt_object_bytes(bytes, obj_ref.id, obj_ref.gen) {
                Ok(plain) => *bytes = plain,
                Err(e) => log::warn!("string in {} failed to decrypt: {}", obj_ref, e),
            }
        }
        Object::Array(items) => {
            for item in items {
                decrypt_strings_walk(handler, item, obj_ref);
            }
        }
        Object::Dictionary(dict) => {
            for value in dict.values_mut() {
                decrypt_strings_walk(handler, value, obj_ref);
            }
        }
        Object::Stream { dict, .. } => {
            for value in dict.values_mut() {
                decrypt_strings_walk(handler, value, obj_ref);
            }
        }
        _ => {}
    }
}

/// Leading whitespace after the `stream` keyword is not part of the data
/// for unencrypted streams. Encrypted payloads are never trimmed.
fn trim_stream_whitespace(data: &[u8]) -> &[u8] {
    let mut start = 0;
    while start < data.len() && crate::lexer::is_pdf_whitespace(data[start]) {
        start += 1;
    }
    &data[start..]
}

/// Parse the `%PDF-M.m` header, tolerating junk before the marker.
fn parse_header(data: &[u8]) -> Result<(u8, u8)> {
    let window = &data[..data.len().min(1024)];
    let pos = window
        .windows(5)
        .position(|w| w == b"%PDF-")
        .ok_or_else(|| {
            Error::InvalidHeader(String::from_utf8_lossy(&window[..window.len().min(16)]).to_string())
        })?;

    let rest = &window[pos + 5..];
    let major = rest.first().and_then(|c| (*c as char).to_digit(10));
    let minor = rest.get(2).and_then(|c| (*c as char).to_digit(10));
    match (major, rest.get(1).copied(), minor) {
        (Some(major), Some(b'.'), Some(minor)) => Ok((major as u8, minor as u8)),
        _ => Err(Error::InvalidHeader(
            String::from_utf8_lossy(&rest[..rest.len().min(8)]).to_string(),
        )),
    }
}

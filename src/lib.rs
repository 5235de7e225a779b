//! # formfill
//!
//! Read, decrypt, mutate and rewrite PDF documents, with an emphasis on
//! XFA form workflows: given a possibly-encrypted PDF and a map of field
//! names to values, locate the XFA datasets stream, update the field
//! values in place, and emit a new PDF. The template packet can also be
//! distilled into a typed questionnaire schema.
//!
//! The core is the PDF object layer: a reader that resolves objects
//! across incremental-update revisions (traditional `xref` tables and
//! cross-reference streams), decrypts them per the standard security
//! handler (V=1..5, RC4 and AES-128/AES-256), and decodes their stream
//! filters. On top sit the security handler and the XFA locator/mutator.
//!
//! Everything is synchronous and free of process-wide state; the raw
//! input buffer is never modified in place.
//!
//! ## Quick start
//!
//! ```ignore
//! use formfill::{Document, SaveMode};
//! use formfill::xfa::FieldValueMap;
//!
//! let mut doc = Document::load("form.pdf")?;
//! doc.unlock_with_passwords(&["", "admin", "password", "1234"])?;
//!
//! let values = FieldValueMap::from_json(&serde_json::json!({
//!     "TextField1": "new value",
//!     "Amount": 12.5,
//! }))?;
//! let report = doc.set_xfa_fields(&values)?;
//! println!("updated {} field occurrence(s)", report.total_updates());
//!
//! doc.save_to("filled.pdf", SaveMode::FullRewrite)?;
//! # Ok::<(), formfill::Error>(())
//! ```

#![warn(missing_docs)]

// Error handling
pub mod error;

// Core PDF object layer
pub mod document;
pub mod lexer;
pub mod object;
pub mod objstm;
pub mod parser;
pub mod xref;

// Stream filters
pub mod decoders;

// Standard security handler
pub mod encryption;

// XFA packets, mutation and schema extraction
pub mod xfa;

// Output
pub mod writer;

// Re-exports
pub use document::Document;
pub use error::{Error, Result};
pub use object::{Object, ObjectRef};
pub use writer::SaveMode;
pub use xref::ParserOptions;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name.
pub const NAME: &str = env!("CARGO_PKG_NAME");

//! XFA (XML Forms Architecture) support.
//!
//! Three coupled pieces:
//! - packet location: walk the catalog to `/AcroForm` `/XFA` and split it
//!   into named packets,
//! - datasets mutation: apply a field-value map to the `datasets` packet
//!   and record the rewritten stream for the writer,
//! - schema extraction: turn the `template` packet into a typed
//!   questionnaire description.
//!
//! Dynamic XFA behavior (scripts, calculations) is never executed; script
//! text is carried through as data.

mod mutator;
mod packets;
mod schema;
mod values;

pub use mutator::{apply_field_values, MutationReport};
pub use packets::{find_packet, has_xfa, locate_packets, XfaPacket};
pub use schema::{
    extract_schema, extract_schema_from_template, FormSchema, Question, QuestionType, Rule,
    RuleKind, SchemaMetadata, Validation,
};
pub use values::{FieldValue, FieldValueMap};

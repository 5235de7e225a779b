//! Revision-chain and cross-reference-stream behavior over whole files:
//! incremental updates, xref streams with object-stream members, hybrid
//! tables and cyclic /Prev chains.

mod common;

use common::PdfFixture;
use formfill::xref::ObjectLocation;
use formfill::{Document, ObjectRef};

/// Two revisions: the second adds object 42 and chains via /Prev.
#[test]
fn incremental_update_merges_newest_wins() {
    common::init_logging();
    let mut base = PdfFixture::new();
    base.object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(2, "<< /Type /Pages /Kids [] /Count 0 >>")
        .trailer("/Root 1 0 R");
    let mut pdf = base.build();

    // Find the first revision's xref offset for /Prev
    let first_xref = {
        let text = String::from_utf8_lossy(&pdf);
        let pos = text.rfind("startxref").unwrap();
        text[pos + 9..].trim().split_whitespace().next().unwrap().parse::<u64>().unwrap()
    };

    // Revision 2: add object 42
    let obj42_offset = pdf.len();
    pdf.extend_from_slice(b"42 0 obj\n<< /Role /Added >>\nendobj\n");
    let xref2_offset = pdf.len();
    pdf.extend_from_slice(b"xref\n42 1\n");
    pdf.extend_from_slice(format!("{:010} 00000 n \n", obj42_offset).as_bytes());
    pdf.extend_from_slice(
        format!(
            "trailer\n<< /Size 43 /Root 1 0 R /Prev {} >>\nstartxref\n{}\n%%EOF\n",
            first_xref, xref2_offset
        )
        .as_bytes(),
    );

    let mut doc = Document::from_bytes(pdf).unwrap();
    assert_eq!(doc.revision_count(), 2);

    // The merged map resolves object 42 to the second revision's offset
    assert_eq!(
        doc.xref().get(42),
        Some(ObjectLocation::Direct { offset: obj42_offset as u64, gen: 0 })
    );

    let added = doc.load_object(ObjectRef::new(42, 0)).unwrap();
    assert_eq!(
        added.as_dict().unwrap().get("Role").unwrap().as_name(),
        Some("Added")
    );

    // First-revision objects still resolve
    assert!(doc.load_object(ObjectRef::new(1, 0)).unwrap().has_type("Catalog"));
}

/// A document whose sole xref is a cross-reference stream, with two
/// members living in an object-stream container.
#[test]
fn xref_stream_with_object_stream_members() {
    let mut pdf: Vec<u8> = Vec::new();
    pdf.extend_from_slice(b"%PDF-1.5\n%\xE2\xE3\xCF\xD3\n");

    let obj1_offset = pdf.len();
    pdf.extend_from_slice(b"1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n");
    let obj2_offset = pdf.len();
    pdf.extend_from_slice(b"2 0 obj\n<< /Type /Pages /Kids [] /Count 0 >>\nendobj\n");

    // Object 4: container holding objects 5 and 6. The member bodies are
    // "<< /Role /First >>" (18 bytes) then a space, so object 6 sits at
    // offset 19 of the body section.
    let first = 10; // pair table "5 0 6 19 " plus one pad space
    let payload = b"5 0 6 19  << /Role /First >> << /Role /Second >>".to_vec();
    let obj4_offset = pdf.len();
    pdf.extend_from_slice(
        format!(
            "4 0 obj\n<< /Type /ObjStm /N 2 /First {} /Length {} >>\nstream\n",
            first,
            payload.len()
        )
        .as_bytes(),
    );
    pdf.extend_from_slice(&payload);
    pdf.extend_from_slice(b"\nendstream\nendobj\n");

    // Object 3: the cross-reference stream, W [1 4 2], uncompressed
    let xref_offset = pdf.len();
    let mut entries: Vec<u8> = Vec::new();
    let push_entry = |kind: u8, field2: u32, field3: u16, entries: &mut Vec<u8>| {
        entries.push(kind);
        entries.extend_from_slice(&field2.to_be_bytes());
        entries.extend_from_slice(&field3.to_be_bytes());
    };
    push_entry(0, 0, 0xFFFF, &mut entries); // 0: free
    push_entry(1, obj1_offset as u32, 0, &mut entries); // 1: direct
    push_entry(1, obj2_offset as u32, 0, &mut entries); // 2: direct
    push_entry(1, xref_offset as u32, 0, &mut entries); // 3: this stream
    push_entry(1, obj4_offset as u32, 0, &mut entries); // 4: container
    push_entry(2, 4, 0, &mut entries); // 5: in container 4, index 0
    push_entry(2, 4, 1, &mut entries); // 6: in container 4, index 1

    pdf.extend_from_slice(
        format!(
            "3 0 obj\n<< /Type /XRef /Size 7 /W [1 4 2] /Root 1 0 R /Length {} >>\nstream\n",
            entries.len()
        )
        .as_bytes(),
    );
    pdf.extend_from_slice(&entries);
    pdf.extend_from_slice(b"\nendstream\nendobj\n");
    pdf.extend_from_slice(format!("startxref\n{}\n%%EOF\n", xref_offset).as_bytes());

    let mut doc = Document::from_bytes(pdf).unwrap();
    assert_eq!(doc.revision_count(), 1);
    assert_eq!(doc.version(), (1, 5));

    assert!(doc.load_object(ObjectRef::new(1, 0)).unwrap().has_type("Catalog"));

    // Compressed members resolve through the container
    assert_eq!(
        doc.xref().get(5),
        Some(ObjectLocation::InStream { container_id: 4, index: 0 })
    );
    let first_member = doc.load_object(ObjectRef::new(5, 0)).unwrap();
    assert_eq!(
        first_member.as_dict().unwrap().get("Role").unwrap().as_name(),
        Some("First")
    );
    let second_member = doc.load_object(ObjectRef::new(6, 0)).unwrap();
    assert_eq!(
        second_member.as_dict().unwrap().get("Role").unwrap().as_name(),
        Some("Second")
    );
}

/// A cyclic /Prev chain ends the walk instead of looping.
#[test]
fn cyclic_prev_chain_is_broken() {
    let mut pdf: Vec<u8> = Vec::new();
    pdf.extend_from_slice(b"%PDF-1.4\n");
    let obj1_offset = pdf.len();
    pdf.extend_from_slice(b"1 0 obj\n<< /Type /Catalog >>\nendobj\n");
    let xref_offset = pdf.len();
    pdf.extend_from_slice(b"xref\n0 2\n0000000000 65535 f \n");
    pdf.extend_from_slice(format!("{:010} 00000 n \n", obj1_offset).as_bytes());
    // /Prev points at this very section
    pdf.extend_from_slice(
        format!(
            "trailer\n<< /Size 2 /Root 1 0 R /Prev {} >>\nstartxref\n{}\n%%EOF\n",
            xref_offset, xref_offset
        )
        .as_bytes(),
    );

    let doc = Document::from_bytes(pdf).unwrap();
    assert_eq!(doc.revision_count(), 1);
}

/// Missing startxref is fatal.
#[test]
fn missing_startxref_is_fatal() {
    let pdf = b"%PDF-1.4\n1 0 obj\n<< >>\nendobj\n".to_vec();
    assert!(Document::from_bytes(pdf).is_err());
}

/// Offsets beyond the end of the file are rejected.
#[test]
fn startxref_out_of_bounds_is_fatal() {
    let pdf = b"%PDF-1.4\nstartxref\n99999\n%%EOF\n".to_vec();
    assert!(Document::from_bytes(pdf).is_err());
}

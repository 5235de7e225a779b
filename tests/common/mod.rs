//! Shared fixture builder for integration tests.
//!
//! Assembles small PDFs byte by byte, tracking object offsets so the
//! xref table and trailer are internally consistent.
#![allow(dead_code)]

/// Route `log` output to the test harness; `RUST_LOG=debug` shows the
/// per-object diagnostics. Safe to call from every test.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Incremental PDF assembler for test fixtures.
pub struct PdfFixture {
    bytes: Vec<u8>,
    objects: Vec<(u32, usize)>,
    trailer_extra: String,
}

impl PdfFixture {
    pub fn new() -> Self {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"%PDF-1.7\n%\xE2\xE3\xCF\xD3\n");
        Self {
            bytes,
            objects: Vec::new(),
            trailer_extra: String::new(),
        }
    }

    /// Append `id 0 obj <body> endobj`.
    pub fn object(&mut self, id: u32, body: &str) -> &mut Self {
        self.raw_object(id, body.as_bytes())
    }

    /// Append an object with a raw (possibly binary) body.
    pub fn raw_object(&mut self, id: u32, body: &[u8]) -> &mut Self {
        self.objects.push((id, self.bytes.len()));
        self.bytes
            .extend_from_slice(format!("{} 0 obj\n", id).as_bytes());
        self.bytes.extend_from_slice(body);
        self.bytes.extend_from_slice(b"\nendobj\n");
        self
    }

    /// Append a stream object with the given dictionary body and payload.
    pub fn stream_object(&mut self, id: u32, dict: &str, data: &[u8]) -> &mut Self {
        let mut body = Vec::new();
        body.extend_from_slice(dict.replace("{len}", &data.len().to_string()).as_bytes());
        body.extend_from_slice(b"\nstream\n");
        body.extend_from_slice(data);
        body.extend_from_slice(b"\nendstream");
        self.raw_object(id, &body)
    }

    /// Extra entries spliced into the trailer dictionary.
    pub fn trailer(&mut self, extra: &str) -> &mut Self {
        self.trailer_extra = extra.to_string();
        self
    }

    /// Emit the xref table, trailer and EOF marker.
    pub fn build(&mut self) -> Vec<u8> {
        let xref_offset = self.bytes.len();
        let max_id = self.objects.iter().map(|(id, _)| *id).max().unwrap_or(0);

        self.bytes.extend_from_slice(b"xref\n");
        self.bytes
            .extend_from_slice(b"0 1\n0000000000 65535 f \n");

        let mut sorted = self.objects.clone();
        sorted.sort_by_key(|(id, _)| *id);
        let mut i = 0;
        while i < sorted.len() {
            let run_start = i;
            while i + 1 < sorted.len() && sorted[i + 1].0 == sorted[i].0 + 1 {
                i += 1;
            }
            i += 1;
            self.bytes.extend_from_slice(
                format!("{} {}\n", sorted[run_start].0, i - run_start).as_bytes(),
            );
            for (_, offset) in &sorted[run_start..i] {
                self.bytes
                    .extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
            }
        }

        self.bytes.extend_from_slice(
            format!(
                "trailer\n<< /Size {} {} >>\nstartxref\n{}\n%%EOF\n",
                max_id + 1,
                self.trailer_extra,
                xref_offset
            )
            .as_bytes(),
        );

        std::mem::take(&mut self.bytes)
    }
}

/// Hex-encode bytes for embedding as a PDF hex string.
pub fn hex(data: &[u8]) -> String {
    data.iter().map(|b| format!("{:02X}", b)).collect()
}

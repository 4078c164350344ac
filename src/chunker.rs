use log::debug;

/// A line-bounded slice of a document, small enough for one structuring call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub index: usize,
    pub text: String,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Split `text` into chunks of at most `max_size` bytes without ever
/// splitting a line. A single line longer than `max_size` becomes its own
/// chunk. Joining the chunk texts with `\n` yields the document's lines.
pub fn chunk_document(text: &str, max_size: usize) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut buffer: Vec<&str> = Vec::new();
    let mut buffer_len = 0usize;

    for line in text.lines() {
        let appended_len = if buffer.is_empty() {
            line.len()
        } else {
            buffer_len + 1 + line.len()
        };

        if appended_len > max_size && !buffer.is_empty() {
            flush(&mut chunks, &mut buffer);
            buffer_len = line.len();
        } else {
            buffer_len = appended_len;
        }
        buffer.push(line);
    }

    if !buffer.is_empty() {
        flush(&mut chunks, &mut buffer);
    }

    debug!(
        "Split {} bytes into {} chunk(s) with max size {}",
        text.len(),
        chunks.len(),
        max_size
    );

    chunks
}

fn flush(chunks: &mut Vec<Chunk>, buffer: &mut Vec<&str>) {
    chunks.push(Chunk {
        index: chunks.len(),
        text: buffer.join("\n"),
    });
    buffer.clear();
}

use loupe_ingest::IngestContext;
use loupe_store::Store;

/// Everything a tool handler needs: the durable store for V1 query tools and
/// the ingest context (session registry + `send_capture`) for V2 live tools
/// (spec.md §4.5, §4.7). One `ToolContext` is built at startup and shared
/// across every call on the stdio transport.
#[derive(Clone)]
pub struct ToolContext {
    pub store: Store,
    pub ingest: IngestContext,
}

impl ToolContext {
    pub fn new(ingest: IngestContext) -> Self {
        Self { store: ingest.store.clone(), ingest }
    }
}

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use tantivy::collector::TopDocs;
use tantivy::directory::MmapDirectory;
use tantivy::query::QueryParser;
use tantivy::schema::{Field, Schema, Value, STORED, STRING, TEXT};
use tantivy::{doc, Index, IndexWriter, TantivyDocument, Term};

use crate::models::Chunk;

const WRITER_HEAP_BYTES: usize = 50_000_000;

/// BM25 index over chunk text, kept next to the sqlite database.
#[derive(Clone)]
pub struct TantivyStore {
    index_dir: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

#[derive(Clone, Copy)]
struct TantivyFields {
    chunk_id: Field,
    document_id: Field,
    content: Field,
    source: Field,
}

impl TantivyStore {
    pub fn new(index_dir: PathBuf) -> Self {
        Self {
            index_dir,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    fn open_or_create(&self) -> Result<Index> {
        std::fs::create_dir_all(&self.index_dir)?;
        let (schema, _) = build_schema();
        let directory = MmapDirectory::open(&self.index_dir)?;
        Ok(Index::open_or_create(directory, schema)?)
    }

    pub fn add_chunks(&self, chunks: &[Chunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| anyhow::anyhow!("tantivy write lock poisoned"))?;
        let index = self.open_or_create()?;
        let fields = resolve_fields(&index.schema())?;
        let mut writer: IndexWriter = index.writer(WRITER_HEAP_BYTES)?;

        for chunk in chunks {
            writer.add_document(doc!(
                fields.chunk_id => chunk.id.clone(),
                fields.document_id => chunk.document_id.clone(),
                fields.content => chunk.content.clone(),
                fields.source => chunk.source.clone(),
            ))?;
        }

        writer.commit()?;
        Ok(())
    }

    pub fn delete_document(&self, document_id: &str) -> Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| anyhow::anyhow!("tantivy write lock poisoned"))?;
        let index = self.open_or_create()?;
        let fields = resolve_fields(&index.schema())?;
        let mut writer: IndexWriter = index.writer(WRITER_HEAP_BYTES)?;
        writer.delete_term(Term::from_field_text(fields.document_id, document_id));
        writer.commit()?;
        Ok(())
    }

    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<(String, f32)>> {
        if query.trim().is_empty() || limit == 0 || !self.index_dir.join("meta.json").exists() {
            return Ok(vec![]);
        }

        let index = Index::open_in_dir(&self.index_dir)?;
        let fields = resolve_fields(&index.schema())?;
        let reader = index.reader()?;
        let searcher = reader.searcher();

        let query_parser = QueryParser::for_index(&index, vec![fields.content, fields.source]);
        // user questions are free text, not query syntax
        let (query, _errors) = query_parser.parse_query_lenient(query);
        let top_docs = searcher.search(&query, &TopDocs::with_limit(limit))?;

        let mut out = Vec::with_capacity(top_docs.len());
        for (score, addr) in top_docs {
            let doc = searcher.doc::<TantivyDocument>(addr)?;
            if let Some(chunk_id) = doc
                .get_first(fields.chunk_id)
                .and_then(|value| value.as_str())
            {
                out.push((chunk_id.to_string(), score));
            }
        }

        Ok(out)
    }
}

fn build_schema() -> (Schema, TantivyFields) {
    let mut builder = Schema::builder();

    let chunk_id = builder.add_text_field("chunk_id", STRING | STORED);
    let document_id = builder.add_text_field("document_id", STRING | STORED);
    let content = builder.add_text_field("content", TEXT | STORED);
    let source = builder.add_text_field("source", TEXT | STORED);

    (
        builder.build(),
        TantivyFields {
            chunk_id,
            document_id,
            content,
            source,
        },
    )
}

fn resolve_fields(schema: &Schema) -> Result<TantivyFields> {
    let field = |name: &str| {
        schema
            .get_field(name)
            .map_err(|err| anyhow::anyhow!(err.to_string()))
    };
    Ok(TantivyFields {
        chunk_id: field("chunk_id")?,
        document_id: field("document_id")?,
        content: field("content")?,
        source: field("source")?,
    })
}

//! Multi-format ingestion tests: office and image uploads flow through the
//! whole pipeline and come out searchable.

use std::io::Write;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use knowledge_pipeline::config::Config;
use knowledge_pipeline::embedding::EmbeddingProvider;
use knowledge_pipeline::index::InMemoryVectorIndex;
use knowledge_pipeline::ingest::IngestionPipeline;
use knowledge_pipeline::llm::LanguageModelProvider;
use knowledge_pipeline::models::UploadedFile;
use knowledge_pipeline::retrieve::RetrievalService;
use knowledge_pipeline::storage::InMemoryBlobStore;
use knowledge_pipeline::summarize::SummaryTagger;

const DIMS: usize = 256;

struct BagOfWordsEmbedder;

#[async_trait]
impl EmbeddingProvider for BagOfWordsEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                let mut v = vec![0.0f32; DIMS];
                for word in t.to_lowercase().split_whitespace() {
                    let mut h: u32 = 2166136261;
                    for b in word.bytes() {
                        h ^= b as u32;
                        h = h.wrapping_mul(16777619);
                    }
                    v[(h as usize) % DIMS] += 1.0;
                }
                v
            })
            .collect())
    }

    fn dims(&self) -> usize {
        DIMS
    }

    fn model_name(&self) -> &str {
        "bag-of-words"
    }
}

struct StubLlm;

#[async_trait]
impl LanguageModelProvider for StubLlm {
    async fn complete(&self, _prompt: &str, _max_tokens: usize, _temperature: f32) -> Result<String> {
        Ok(r#"["office", "test"]"#.to_string())
    }

    fn model_name(&self) -> &str {
        "stub"
    }
}

fn pipeline_with(index: Arc<InMemoryVectorIndex>) -> IngestionPipeline {
    let config = Config::default();
    let tagger = SummaryTagger::new(Arc::new(StubLlm), config.llm.clone());
    IngestionPipeline::new(
        Arc::new(InMemoryBlobStore::new()),
        Arc::new(BagOfWordsEmbedder),
        index,
        tagger,
        config,
    )
}

/// Minimal docx (ZIP) containing word/document.xml with the given paragraphs.
fn minimal_docx(paragraphs: &[&str]) -> Vec<u8> {
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        let body: String = paragraphs
            .iter()
            .map(|p| format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", p))
            .collect();
        let xml = format!(
            "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{}</w:body></w:document>",
            body
        );
        zip.write_all(xml.as_bytes()).unwrap();
        zip.finish().unwrap();
    }
    buf
}

/// Minimal xlsx with one shared-strings table and one worksheet.
fn minimal_xlsx(shared: &[&str], rows_xml: &str) -> Vec<u8> {
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        let opts = zip::write::SimpleFileOptions::default();
        zip.start_file("xl/sharedStrings.xml", opts).unwrap();
        let items: String = shared
            .iter()
            .map(|s| format!("<si><t>{}</t></si>", s))
            .collect();
        zip.write_all(format!("<?xml version=\"1.0\"?><sst>{}</sst>", items).as_bytes())
            .unwrap();
        zip.start_file("xl/worksheets/sheet1.xml", opts).unwrap();
        zip.write_all(
            format!(
                "<?xml version=\"1.0\"?><worksheet><sheetData>{}</sheetData></worksheet>",
                rows_xml
            )
            .as_bytes(),
        )
        .unwrap();
        zip.finish().unwrap();
    }
    buf
}

fn minimal_png() -> Vec<u8> {
    use image::{ImageBuffer, Rgba};
    let img: ImageBuffer<Rgba<u8>, Vec<u8>> =
        ImageBuffer::from_fn(4, 4, |x, y| Rgba([(x * 60) as u8, (y * 60) as u8, 0, 255]));
    let mut bytes = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
const MIME_XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

#[tokio::test]
async fn docx_upload_is_ingested_and_searchable() {
    let index = Arc::new(InMemoryVectorIndex::new());
    let pipeline = pipeline_with(index.clone());

    let bytes = minimal_docx(&[
        "The onboarding runbook describes deployment steps.",
        "Escalation contacts are listed at the end.",
    ]);
    let doc = pipeline
        .process(
            UploadedFile::new("runbook.docx", MIME_DOCX, bytes),
            "ws-1",
            "user-1",
        )
        .await
        .unwrap();

    assert!(doc.content.contains("onboarding runbook"));
    assert!(doc.content.contains("Escalation contacts"));
    assert_eq!(doc.chunks.len(), doc.metadata.chunk_count);

    let retrieval = RetrievalService::new(
        Arc::new(BagOfWordsEmbedder),
        index,
        Config::default().retrieval,
    );
    let results = retrieval
        .retrieve("onboarding runbook deployment", "ws-1", None, None)
        .await;
    assert!(!results.is_empty());
    assert_eq!(results[0].source_document_id, doc.id);
}

#[tokio::test]
async fn xlsx_upload_flattens_to_tab_separated_rows() {
    let index = Arc::new(InMemoryVectorIndex::new());
    let pipeline = pipeline_with(index.clone());

    let rows = concat!(
        "<row><c t=\"s\"><v>0</v></c><c t=\"s\"><v>1</v></c></row>",
        "<row><c t=\"s\"><v>2</v></c><c><v>1250</v></c></row>",
    );
    let bytes = minimal_xlsx(&["account", "owner", "renewal"], rows);
    let doc = pipeline
        .process(
            UploadedFile::new("pipeline.xlsx", MIME_XLSX, bytes),
            "ws-1",
            "user-1",
        )
        .await
        .unwrap();

    assert_eq!(doc.content, "account\towner\nrenewal\t1250");
    assert_eq!(doc.metadata.chunk_count, 1);
}

#[tokio::test]
async fn csv_upload_is_ingested() {
    let index = Arc::new(InMemoryVectorIndex::new());
    let pipeline = pipeline_with(index.clone());

    let doc = pipeline
        .process(
            UploadedFile::new(
                "contacts.csv",
                "text/csv",
                b"name,company\nAda,Analytical Engines\n".to_vec(),
            ),
            "ws-1",
            "user-1",
        )
        .await
        .unwrap();

    assert_eq!(doc.content, "name\tcompany\nAda\tAnalytical Engines");
}

#[tokio::test]
async fn image_upload_stores_descriptive_metadata() {
    let index = Arc::new(InMemoryVectorIndex::new());
    let pipeline = pipeline_with(index.clone());

    let doc = pipeline
        .process(
            UploadedFile::new("diagram.png", "image/png", minimal_png()),
            "ws-1",
            "user-1",
        )
        .await
        .unwrap();

    assert!(doc.content.contains("4x4"), "got: {}", doc.content);
    assert!(doc.content.contains("png"));
    assert_eq!(doc.metadata.chunk_count, 1);
}

#[tokio::test]
async fn markdown_upload_keeps_structure() {
    let index = Arc::new(InMemoryVectorIndex::new());
    let pipeline = pipeline_with(index.clone());

    let doc = pipeline
        .process(
            UploadedFile::new(
                "notes.md",
                "text/markdown",
                b"# Notes\n\nFirst point.\n\nSecond point.\n".to_vec(),
            ),
            "ws-1",
            "user-1",
        )
        .await
        .unwrap();

    assert!(doc.content.starts_with("# Notes"));
    assert!(doc.content.contains("Second point."));
}

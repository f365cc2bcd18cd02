use super::*;
use super::chunking::char_len;
use tempfile::TempDir;

fn write_file(root: &Path, relative: &str, content: &str) -> PathBuf {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("should create parent directories");
    }
    fs::write(&path, content).expect("should write test file");
    path
}

fn create_test_tree() -> TempDir {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let root = temp_dir.path();

    write_file(
        root,
        "intro.txt",
        "Retrieval augmented generation pairs search with language models.",
    );
    write_file(
        root,
        "guides/setup.md",
        "# Setup\n\nInstall the **toolkit** with `cargo install`.\n\n- first step\n- second step\n",
    );
    write_file(root, "guides/nested/NOTES.TXT", "Upper case extension.");
    write_file(root, "data.csv", "a,b,c\n1,2,3\n");
    write_file(root, "image.png", "not really a png");

    temp_dir
}

const MANUAL_PAGES: [[&str; 3]; 3] = [
    [
        "Alpha chapter explains how the indexer walks each folder.",
        "It reads portable documents and plain text notes alike.",
        "Every file becomes a list of overlapping text windows.",
    ],
    [
        "Bravo chapter covers embeddings returned by the provider.",
        "Vectors are compared with cosine distance during search.",
        "Batches are retried when the service reports overload.",
    ],
    [
        "Charlie chapter closes with storage on local disk tables.",
        "Records keep their source path and original position.",
        "Clearing the collection removes every stored record.",
    ],
];

/// Build a minimal PDF with one Helvetica text line per entry on each page
fn build_pdf(pages: &[[&str; 3]]) -> Vec<u8> {
    let page_count = pages.len();
    let mut objects: Vec<String> = vec![
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        format!(
            "<< /Type /Pages /Kids [{}] /Count {} >>",
            (0..page_count)
                .map(|i| format!("{} 0 R", 4 + 2 * i))
                .collect::<Vec<_>>()
                .join(" "),
            page_count
        ),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>"
            .to_string(),
    ];

    for (i, lines) in pages.iter().enumerate() {
        let mut content = String::from("BT\n/F1 12 Tf\n14 TL\n72 720 Td\n");
        for line in lines {
            content.push_str(&format!("({}) Tj\nT*\n", line));
        }
        content.push_str("ET\n");

        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
             /Resources << /Font << /F1 3 0 R >> >> /Contents {} 0 R >>",
            5 + 2 * i
        ));
        objects.push(format!(
            "<< /Length {} >>\nstream\n{}endstream",
            content.len(),
            content
        ));
    }

    let mut pdf = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, object) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        pdf.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, object).as_bytes());
    }

    let xref_offset = pdf.len();
    let mut xref = format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
    for offset in offsets {
        xref.push_str(&format!("{:010} 00000 n \n", offset));
    }
    xref.push_str(&format!(
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
        objects.len() + 1,
        xref_offset
    ));
    pdf.extend_from_slice(xref.as_bytes());
    pdf
}

/// Length of the longest suffix of `previous` that is also a prefix of `next`
fn shared_boundary_len(previous: &str, next: &str) -> usize {
    let previous: Vec<char> = previous.chars().collect();
    let next: Vec<char> = next.chars().collect();
    (1..=previous.len().min(next.len()))
        .rev()
        .find(|&len| previous[previous.len() - len..] == next[..len])
        .unwrap_or(0)
}

fn loader(directory: &Path) -> DocumentLoader {
    DocumentLoader::new(directory, &ChunkingConfig::default())
}

#[test]
fn format_detection() {
    assert_eq!(
        DocumentFormat::from_path(Path::new("a/report.pdf")),
        Some(DocumentFormat::Pdf)
    );
    assert_eq!(
        DocumentFormat::from_path(Path::new("REPORT.PDF")),
        Some(DocumentFormat::Pdf)
    );
    assert_eq!(
        DocumentFormat::from_path(Path::new("notes.txt")),
        Some(DocumentFormat::PlainText)
    );
    assert_eq!(
        DocumentFormat::from_path(Path::new("README.markdown")),
        Some(DocumentFormat::Markdown)
    );
    assert_eq!(DocumentFormat::from_path(Path::new("data.csv")), None);
    assert_eq!(DocumentFormat::from_path(Path::new("Makefile")), None);
}

#[test]
fn discover_files_is_recursive_filtered_and_sorted() {
    let temp_dir = create_test_tree();
    let files = loader(temp_dir.path())
        .discover_files()
        .expect("discovery should succeed");

    let relative: Vec<String> = files
        .iter()
        .map(|p| {
            p.strip_prefix(temp_dir.path())
                .expect("should be under root")
                .display()
                .to_string()
        })
        .collect();

    assert_eq!(relative.len(), 3);
    assert!(relative.iter().any(|p| p.ends_with("intro.txt")));
    assert!(relative.iter().any(|p| p.ends_with("setup.md")));
    assert!(relative.iter().any(|p| p.ends_with("NOTES.TXT")));

    let mut sorted = files.clone();
    sorted.sort();
    assert_eq!(files, sorted);
}

#[test]
fn missing_directory_is_load_error() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let result = loader(&temp_dir.path().join("does-not-exist")).discover_files();
    assert!(matches!(result, Err(RagError::Load(_))));
}

#[test]
fn directory_without_documents_is_load_error() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    write_file(temp_dir.path(), "only.csv", "x,y");

    let result = loader(temp_dir.path()).load_and_split();
    assert!(matches!(
        result,
        Err(RagError::Load(message)) if message.contains("No supported documents")
    ));
}

#[test]
fn load_file_uses_relative_source() {
    let temp_dir = create_test_tree();
    let path = temp_dir.path().join("guides").join("setup.md");

    let document = loader(temp_dir.path())
        .load_file(&path)
        .expect("should load markdown");

    assert_eq!(
        document.source,
        Path::new("guides").join("setup.md").display().to_string()
    );
    assert!(document.text.starts_with("Setup"));
    assert!(document.text.contains("Install the toolkit with cargo install."));
    assert!(!document.text.contains('#'));
    assert!(!document.text.contains("**"));
}

#[test]
fn invalid_pdf_is_load_error() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = write_file(temp_dir.path(), "broken.pdf", "this is not a pdf file");

    let result = loader(temp_dir.path()).load_file(&path);
    assert!(matches!(result, Err(RagError::Load(_))));
}

#[test]
fn multi_page_pdf_is_loaded_and_split() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    fs::write(temp_dir.path().join("manual.pdf"), build_pdf(&MANUAL_PAGES))
        .expect("should write pdf");
    let chunking = ChunkingConfig {
        chunk_size: 100,
        chunk_overlap: 20,
    };

    let chunks = DocumentLoader::new(temp_dir.path(), &chunking)
        .load_and_split()
        .expect("should load and split pdf");

    assert!(chunks.len() >= 5, "chunks: {:#?}", chunks);
    for (expected, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.position, expected);
        assert_eq!(chunk.source, "manual.pdf");
        assert!(char_len(&chunk.content) <= 100, "too long: {:?}", chunk.content);
        assert!(!chunk.content.contains('\u{c}'));
        assert!(!chunk.content.contains('\r'));
        assert!(!chunk.content.contains("\n\n\n"));
    }
    for pair in chunks.windows(2) {
        let shared = shared_boundary_len(&pair[0].content, &pair[1].content);
        assert!(shared <= 20, "{} shared chars: {:?}", shared, pair);
    }

    let first_chunk_with = |word: &str| {
        chunks
            .iter()
            .position(|chunk| chunk.content.contains(word))
            .unwrap_or_else(|| panic!("no chunk contains {:?}: {:#?}", word, chunks))
    };
    let alpha = first_chunk_with("Alpha");
    let bravo = first_chunk_with("Bravo");
    let charlie = first_chunk_with("Charlie");
    assert!(alpha < bravo && bravo < charlie);
    assert!(first_chunk_with("removes") >= charlie);
}

#[test]
fn pdf_text_keeps_page_order() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("manual.pdf");
    fs::write(&path, build_pdf(&MANUAL_PAGES)).expect("should write pdf");

    let document = loader(temp_dir.path())
        .load_file(&path)
        .expect("should load pdf");

    assert_eq!(document.source, "manual.pdf");
    let alpha = document.text.find("Alpha").expect("should contain page one");
    let bravo = document.text.find("Bravo").expect("should contain page two");
    let charlie = document.text.find("Charlie").expect("should contain page three");
    assert!(alpha < bravo && bravo < charlie);
    assert_eq!(document.text, normalize_text(&document.text));
}

#[test]
fn load_and_split_attributes_chunks() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let sentence = "Each sentence in this document talks about vector search and embeddings. ";
    write_file(temp_dir.path(), "long.txt", &sentence.repeat(10));
    write_file(temp_dir.path(), "short.txt", "Tiny file.");

    let chunks = loader(temp_dir.path())
        .load_and_split()
        .expect("load_and_split should succeed");

    let long_chunks: Vec<&Chunk> = chunks.iter().filter(|c| c.source == "long.txt").collect();
    let short_chunks: Vec<&Chunk> = chunks.iter().filter(|c| c.source == "short.txt").collect();

    assert!(long_chunks.len() > 1);
    assert_eq!(short_chunks.len(), 1);
    assert_eq!(short_chunks[0].content, "Tiny file.");
    assert_eq!(short_chunks[0].position, 0);

    for (expected, chunk) in long_chunks.iter().enumerate() {
        assert_eq!(chunk.position, expected);
        assert!(chunk.content.chars().count() <= 100);
    }
}

#[test]
fn split_empty_document_yields_no_chunks() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let document = SourceDocument {
        source: "empty.txt".to_string(),
        text: String::new(),
    };
    assert!(loader(temp_dir.path()).split(&document).is_empty());
}

#[test]
fn normalize_text_cleans_whitespace() {
    let raw = "Title\r\n\r\n\r\n\r\nFirst   line\t\twith  gaps   \nsecond line\u{c}Next page";
    let normalized = normalize_text(raw);

    assert_eq!(
        normalized,
        "Title\n\nFirst line with gaps\nsecond line\n\nNext page"
    );
}

#[test]
fn markdown_to_text_keeps_block_boundaries() {
    let markdown = "# Heading\n\nBody with `code` and [a link](https://example.com).\n";
    let text = markdown_to_text(markdown);
    assert_eq!(
        normalize_text(&text),
        "Heading\n\nBody with code and a link."
    );
}

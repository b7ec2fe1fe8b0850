use super::*;

fn numbered_words(count: usize) -> String {
    (0..count)
        .map(|i| format!("word{i:02}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn splitter(chunk_size: usize, chunk_overlap: usize) -> TextSplitter {
    TextSplitter::new(&ChunkingConfig {
        chunk_size,
        chunk_overlap,
        ..ChunkingConfig::default()
    })
    .expect("valid splitter config")
}

fn sample_document() -> Document {
    Document {
        title: "Day of the Dead".to_string(),
        source: "https://en.wikipedia.org/wiki/Day_of_the_Dead".to_string(),
        summary: "The Day of the Dead is a holiday.".to_string(),
        content: format!(
            "The Day of the Dead is a holiday traditionally celebrated on November 1 and 2.\n\n{}",
            "Families build altars called ofrendas to honor the departed. ".repeat(10)
        ),
    }
}

#[test]
fn short_text_is_a_single_chunk() {
    let chunks = splitter(100, 20)
        .split_text("Hello world.")
        .expect("split should succeed");
    assert_eq!(chunks, vec!["Hello world.".to_string()]);
}

#[test]
fn blank_text_yields_no_chunks() {
    let splitter = splitter(100, 20);
    assert!(splitter.split_text("").expect("split").is_empty());
    assert!(splitter.split_text("  \n\n \n ").expect("split").is_empty());
}

#[test]
fn chunks_never_exceed_chunk_size() {
    let document = sample_document();
    let chunks = splitter(100, 20)
        .split_text(&document.content)
        .expect("split should succeed");

    assert!(chunks.len() > 1);
    for chunk in &chunks {
        assert!(
            chunk.chars().count() <= 100,
            "chunk too long ({}): {chunk:?}",
            chunk.chars().count()
        );
        assert_eq!(chunk.trim(), chunk);
        assert!(!chunk.is_empty());
    }
}

#[test]
fn consecutive_chunks_overlap() {
    let chunks = splitter(100, 20)
        .split_text(&numbered_words(50))
        .expect("split should succeed");

    assert!(chunks.len() > 1);
    // Packing stops after word13; the last two words fit in the overlap
    assert!(chunks[0].starts_with("word00"));
    assert!(chunks[0].ends_with("word13"));
    assert!(chunks[1].starts_with("word12 word13 word14"));

    for pair in chunks.windows(2) {
        let last_word = pair[0]
            .split_whitespace()
            .last()
            .expect("chunk has words");
        assert!(
            pair[1].contains(last_word),
            "{last_word} missing from {:?}",
            pair[1]
        );
    }
}

#[test]
fn zero_overlap_partitions_the_text() {
    let text = numbered_words(50);
    let chunks = splitter(100, 0)
        .split_text(&text)
        .expect("split should succeed");

    let rejoined: Vec<&str> = chunks.iter().flat_map(|c| c.split_whitespace()).collect();
    let original: Vec<&str> = text.split_whitespace().collect();
    assert_eq!(rejoined, original);
}

#[test]
fn paragraph_breaks_are_preferred() {
    let text = "First paragraph short.\n\nSecond paragraph short.";
    let chunks = splitter(30, 0).split_text(text).expect("split");

    assert_eq!(
        chunks,
        vec![
            "First paragraph short.".to_string(),
            "Second paragraph short.".to_string()
        ]
    );
}

#[test]
fn small_paragraphs_are_merged() {
    let text = "First paragraph short.\n\nSecond paragraph short.";
    let chunks = splitter(100, 20).split_text(text).expect("split");
    assert_eq!(chunks, vec![text.to_string()]);
}

#[test]
fn unbroken_text_falls_back_to_characters() {
    let text = "a".repeat(250);
    let chunks = splitter(100, 20).split_text(&text).expect("split");

    let lengths: Vec<usize> = chunks.iter().map(|c| c.chars().count()).collect();
    assert_eq!(lengths, vec![100, 100, 90]);
}

#[test]
fn lengths_are_measured_in_characters() {
    let text = "é".repeat(150);
    let chunks = splitter(100, 20).split_text(&text).expect("split");

    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].chars().count(), 100);
    assert_eq!(chunks[1].chars().count(), 70);
}

#[test]
fn regex_separators() {
    let config = ChunkingConfig {
        chunk_size: 10,
        chunk_overlap: 0,
        separators: vec![r"\.\s+".to_string(), String::new()],
        separator_is_regex: true,
    };
    let chunks = TextSplitter::new(&config)
        .expect("valid pattern")
        .split_text("One. Two. Three.")
        .expect("split");

    assert_eq!(chunks, vec!["One. Two".to_string(), ". Three.".to_string()]);
}

#[test]
fn literal_separators_are_not_patterns() {
    let config = ChunkingConfig {
        chunk_size: 10,
        chunk_overlap: 0,
        separators: vec![".".to_string(), String::new()],
        separator_is_regex: false,
    };
    let chunks = TextSplitter::new(&config)
        .expect("valid config")
        .split_text("abcdefgh.ijklmnop")
        .expect("split");

    assert_eq!(chunks, vec!["abcdefgh".to_string(), ".ijklmnop".to_string()]);
}

#[test]
fn invalid_pattern_is_rejected() {
    let config = ChunkingConfig {
        separators: vec!["(".to_string()],
        separator_is_regex: true,
        ..ChunkingConfig::default()
    };
    assert!(TextSplitter::new(&config).is_err());
}

#[test]
fn invalid_sizes_are_rejected() {
    let overlap_too_large = ChunkingConfig {
        chunk_size: 20,
        chunk_overlap: 20,
        ..ChunkingConfig::default()
    };
    assert!(TextSplitter::new(&overlap_too_large).is_err());

    let zero_size = ChunkingConfig {
        chunk_size: 0,
        chunk_overlap: 0,
        ..ChunkingConfig::default()
    };
    assert!(TextSplitter::new(&zero_size).is_err());
}

#[test]
fn chunk_document_numbers_chunks() {
    let document = sample_document();
    let chunks =
        chunk_document(&document, &ChunkingConfig::default()).expect("chunking should succeed");

    assert!(chunks.len() > 1);
    for (i, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.chunk_index, i);
        assert_eq!(chunk.source, document.source);
        assert_eq!(chunk.title, document.title);
        assert_eq!(chunk.id(), format!("{}-{i}", document.source));
    }
    assert!(chunks[0].content.starts_with("The Day of the Dead"));
}

#[test]
fn chunk_document_is_deterministic() {
    let document = sample_document();
    let config = ChunkingConfig::default();

    let first = chunk_document(&document, &config).expect("chunking should succeed");
    let second = chunk_document(&document, &config).expect("chunking should succeed");
    assert_eq!(first, second);
}

#[test]
fn empty_document_has_no_chunks() {
    let document = Document {
        content: String::new(),
        ..sample_document()
    };
    let chunks =
        chunk_document(&document, &ChunkingConfig::default()).expect("chunking should succeed");
    assert!(chunks.is_empty());
}

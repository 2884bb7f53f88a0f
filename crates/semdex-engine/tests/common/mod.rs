#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

use semdex_core::config::{IndexBackend, Settings};
use semdex_core::extract::FileExtractor;
use semdex_core::traits::Embedder;
use semdex_embed::FakeEmbedder;
use semdex_engine::Semdex;
use semdex_vector::MemoryStore;

pub const DIM: usize = 1024;

pub struct Fixture {
    pub tmp: TempDir,
    pub docs: PathBuf,
    pub store: Arc<MemoryStore>,
    pub engine: Semdex,
}

impl Fixture {
    pub fn write(&self, name: &str, content: &str) -> String {
        let p = self.docs.join(name);
        fs::write(&p, content).expect("write fixture");
        p.to_string_lossy().to_string()
    }
}

pub fn settings(base: &Path) -> Settings {
    let mut s = Settings { base_dir: base.to_path_buf(), ..Settings::default() };
    s.directories.insert("docs".to_string(), "docs".to_string());
    s.directories.insert("empty".to_string(), "empty".to_string());
    s.index.backend = IndexBackend::Memory;
    s
}

pub fn fixture() -> Fixture {
    fixture_with(|_| {}, Arc::new(FakeEmbedder::new(DIM)))
}

pub fn fixture_with(tweak: impl FnOnce(&mut Settings), embedder: Arc<dyn Embedder>) -> Fixture {
    let tmp = TempDir::new().expect("tmp");
    make_dirs(tmp.path());
    let docs = tmp.path().join("docs").canonicalize().expect("canonical docs");
    let mut s = settings(tmp.path());
    tweak(&mut s);
    let (engine, store) = engine_for(s, embedder);
    Fixture { tmp, docs, store, engine }
}

/// Create the `docs` and `empty` directories the settings point at.
pub fn make_dirs(base: &Path) {
    fs::create_dir(base.join("docs")).expect("mkdir docs");
    fs::create_dir(base.join("empty")).expect("mkdir empty");
}

pub fn engine_for(s: Settings, embedder: Arc<dyn Embedder>) -> (Semdex, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new(DIM));
    let extractor = Arc::new(FileExtractor::new(s.jobs.extensions.clone()));
    let engine = Semdex::with_components(s, embedder, store.clone(), extractor).expect("engine");
    (engine, store)
}

/// Exactly `len` chars of filler words; never contains the word "zebra".
pub fn filler(len: usize) -> String {
    let words = ["river", "stone", "amber", "cloud", "maple", "orbit", "lantern"];
    let mut out = String::new();
    let mut i = 0;
    while out.len() < len {
        out.push_str(words[i % words.len()]);
        out.push(' ');
        i += 1;
    }
    out.truncate(len);
    out
}

/// Write a minimal PDF with one line of text per page.
pub fn write_pdf(path: &Path, pages: &[&str]) {
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! { "Font" => dictionary! { "F1" => font_id } });
    let mut kids: Vec<Object> = Vec::new();
    for text in pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().expect("encode content")));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        kids.push(page_id.into());
    }
    doc.objects.insert(pages_id, Object::Dictionary(dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => pages.len() as i64,
    }));
    let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).expect("save pdf");
}

use crate::error::{Error, Result};
use crate::index::{DocLengths, DocMap, InvertedIndex, Postings, TermFrequencies};
use crate::tokenizer::Tokenizer;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::{self, create_dir_all, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

pub const FORMAT_VERSION: u32 = 2;

/// Manifest written after every table of a snapshot is in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaFile {
    pub num_docs: usize,
    pub num_terms: usize,
    pub created_at: String,
    pub version: u32,
    /// [`Tokenizer::fingerprint`] of the tokenizer the tables were built with.
    #[serde(default)]
    pub stopwords: String,
}

pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    pub fn postings(&self) -> PathBuf { self.root.join("postings.bin") }
    pub fn docmap(&self) -> PathBuf { self.root.join("docmap.bin") }
    pub fn term_frequencies(&self) -> PathBuf { self.root.join("term_frequencies.bin") }
    pub fn doc_lengths(&self) -> PathBuf { self.root.join("doc_lengths.bin") }
    pub fn meta(&self) -> PathBuf { self.root.join("meta.json") }

    /// Every file a complete snapshot consists of, manifest last.
    pub fn artifacts(&self) -> [PathBuf; 5] {
        [self.postings(), self.docmap(), self.term_frequencies(), self.doc_lengths(), self.meta()]
    }

    pub fn snapshot_exists(&self) -> bool {
        self.artifacts().iter().all(|p| p.is_file())
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    let mut f = File::create(&tmp).map_err(|e| Error::io(&tmp, e))?;
    f.write_all(bytes).map_err(|e| Error::io(&tmp, e))?;
    f.sync_all().map_err(|e| Error::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| Error::io(path, e))?;
    Ok(())
}

fn save_table<T: Serialize>(path: &Path, table: &T) -> Result<()> {
    let bytes = bincode::serialize(table).map_err(|e| Error::corrupt(path, e.to_string()))?;
    write_atomic(path, &bytes)
}

fn read_existing(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => Error::MissingSnapshot { path: path.to_path_buf() },
        _ => Error::io(path, e),
    })
}

fn load_table<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let buf = read_existing(path)?;
    bincode::deserialize(&buf).map_err(|e| Error::corrupt(path, e.to_string()))
}

/// Writes the four tables and then the manifest.
///
/// The previous manifest is removed first, so an interrupted save leaves a
/// directory that loads as "not built" rather than a mix of two builds.
pub fn save_snapshot(paths: &IndexPaths, index: &InvertedIndex, created_at: impl Into<String>) -> Result<MetaFile> {
    create_dir_all(&paths.root).map_err(|e| Error::io(&paths.root, e))?;
    match fs::remove_file(paths.meta()) {
        Err(e) if e.kind() != ErrorKind::NotFound => return Err(Error::io(paths.meta(), e)),
        _ => {}
    }

    save_table(&paths.postings(), index.postings())?;
    save_table(&paths.docmap(), index.doc_map())?;
    save_table(&paths.term_frequencies(), index.term_frequencies())?;
    save_table(&paths.doc_lengths(), index.doc_lengths())?;

    let meta = MetaFile {
        num_docs: index.num_docs(),
        num_terms: index.num_terms(),
        created_at: created_at.into(),
        version: FORMAT_VERSION,
        stopwords: index.tokenizer().fingerprint(),
    };
    save_meta(paths, &meta)?;
    tracing::info!(root = %paths.root.display(), num_docs = meta.num_docs, num_terms = meta.num_terms, "saved index snapshot");
    Ok(meta)
}

pub fn save_meta(paths: &IndexPaths, meta: &MetaFile) -> Result<()> {
    let json = serde_json::to_string_pretty(meta).map_err(|source| Error::Json { path: paths.meta(), source })?;
    write_atomic(&paths.meta(), json.as_bytes())
}

pub fn load_meta(paths: &IndexPaths) -> Result<MetaFile> {
    let buf = read_existing(&paths.meta())?;
    serde_json::from_slice(&buf).map_err(|e| Error::corrupt(paths.meta(), e.to_string()))
}

/// Loads all tables of one snapshot or fails; never returns a partial index.
pub fn load_snapshot(paths: &IndexPaths, tokenizer: Tokenizer) -> Result<InvertedIndex> {
    if let Some(missing) = paths.artifacts().into_iter().find(|p| !p.is_file()) {
        return Err(Error::MissingSnapshot { path: missing });
    }

    let meta = load_meta(paths)?;
    if meta.version != FORMAT_VERSION {
        return Err(Error::corrupt(
            paths.meta(),
            format!("format version {} is not supported (expected {FORMAT_VERSION})", meta.version),
        ));
    }

    // Queries tokenized with another stopword list would silently miss terms.
    let fingerprint = tokenizer.fingerprint();
    if meta.stopwords != fingerprint {
        return Err(Error::corrupt(
            paths.meta(),
            format!("index was built with stopword list {}, loading with {fingerprint}", meta.stopwords),
        ));
    }

    let postings: Postings = load_table(&paths.postings())?;
    let docs: DocMap = load_table(&paths.docmap())?;
    let term_frequencies: TermFrequencies = load_table(&paths.term_frequencies())?;
    let doc_lengths: DocLengths = load_table(&paths.doc_lengths())?;

    let index = InvertedIndex::from_tables(tokenizer, postings, docs, term_frequencies, doc_lengths)
        .map_err(|reason| Error::corrupt(&paths.root, reason))?;
    if index.num_docs() != meta.num_docs || index.num_terms() != meta.num_terms {
        return Err(Error::corrupt(
            paths.meta(),
            format!(
                "manifest lists {} documents and {} terms, tables hold {} and {}",
                meta.num_docs,
                meta.num_terms,
                index.num_docs(),
                index.num_terms()
            ),
        ));
    }
    tracing::info!(root = %paths.root.display(), num_docs = meta.num_docs, created_at = %meta.created_at, "loaded index snapshot");
    Ok(index)
}

impl InvertedIndex {
    pub fn save(&self, paths: &IndexPaths, created_at: impl Into<String>) -> Result<MetaFile> {
        save_snapshot(paths, self, created_at)
    }

    pub fn load(paths: &IndexPaths, tokenizer: Tokenizer) -> Result<Self> {
        load_snapshot(paths, tokenizer)
    }
}

//! Classification of the user's input files and the run facts derived from
//! them: sample id, sequencing platform and read pairing.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{bail, Context, Result};
use flate2::read::MultiGzDecoder;
use regex::Regex;

use crate::domain::models::{SeqPairing, SeqPlatform};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

static ILLUMINA_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^@[^:]+:\d+:[^:]+:\d+:\d+:\d+:\d+ [12]:[YN]:\d+:[^:]+$")
        .expect("Illumina header pattern is a valid regex")
});

static ILLUMINA_FILE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.*)_S[0-9]+_L[0-9]+_R[12]_[0-9]+\.fastq\.gz$")
        .expect("Illumina file name pattern is a valid regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Fasta,
    Fastq,
    Other,
}

/// Open `path` for reading text, transparently decompressing gzip.
fn open_text(path: &Path) -> std::io::Result<Box<dyn BufRead>> {
    let mut reader = BufReader::new(File::open(path)?);
    if reader.fill_buf()?.starts_with(&GZIP_MAGIC) {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(reader))))
    } else {
        Ok(Box::new(reader))
    }
}

/// Sniff the file type from the first byte of its (decompressed) content.
pub fn detect_filetype(path: &Path) -> Result<FileType> {
    let mut reader = open_text(path).with_context(|| format!("cannot read file: {}", path.display()))?;
    let head = reader
        .fill_buf()
        .with_context(|| format!("cannot read file: {}", path.display()))?;
    Ok(match head.first() {
        Some(b'>') => FileType::Fasta,
        Some(b'@') => FileType::Fastq,
        _ => FileType::Other,
    })
}

/// Whether the reads carry Illumina (CASAVA 1.8+) headers.
pub fn is_illumina_fastq(path: &Path) -> bool {
    let Ok(mut reader) = open_text(path) else {
        return false;
    };
    let mut first = String::new();
    match reader.read_line(&mut first) {
        Ok(_) => ILLUMINA_HEADER.is_match(first.trim_end_matches(['\r', '\n'])),
        Err(_) => false,
    }
}

fn file_name(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or_default()
}

/// The user's data files, resolved to absolute paths.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inputs {
    pub contigs: Option<PathBuf>,
    pub fastqs: Vec<PathBuf>,
    pub reference: Option<PathBuf>,
}

impl Inputs {
    /// Sort `files` into at most one FASTA and at most two fastqs, and check
    /// that `reference` is a FASTA file.
    pub fn classify(files: &[PathBuf], reference: Option<&Path>) -> Result<Self> {
        let mut inputs = Self::default();
        for file in files {
            let path = existing(file)?;
            match detect_filetype(&path)? {
                FileType::Fasta => {
                    if inputs.contigs.is_some() {
                        bail!("more than one FASTA file passed: {}", file.display());
                    }
                    inputs.contigs = Some(path);
                }
                FileType::Fastq => {
                    if inputs.fastqs.len() == 2 {
                        bail!("more than two fastq files passed: {}", file.display());
                    }
                    inputs.fastqs.push(path);
                }
                FileType::Other => bail!("file is neither FASTA nor fastq: {}", file.display()),
            }
        }

        if let Some(reference) = reference {
            let path = existing(reference)?;
            if detect_filetype(&path)? != FileType::Fasta {
                bail!("reference not a FASTA file: {}", reference.display());
            }
            inputs.reference = Some(path);
        }

        if inputs.contigs.is_none() && inputs.fastqs.is_empty() {
            bail!("no input files were provided");
        }
        Ok(inputs)
    }

    /// Sample id from the file names; `SAMPLE` when nothing usable remains.
    pub fn sample_id(&self) -> String {
        let id = match (self.contigs.as_deref(), self.fastqs.first()) {
            (_, Some(first)) => {
                let name = file_name(first);
                ILLUMINA_FILE_NAME.captures(name).map_or_else(
                    || common_prefix_id(&self.fastqs),
                    |caps| caps[1].to_string(),
                )
            }
            (Some(contigs), None) => {
                let name = file_name(contigs);
                let name = name.strip_suffix(".gz").unwrap_or(name);
                Path::new(name)
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or_default()
                    .to_string()
            }
            (None, None) => String::new(),
        };
        if id.is_empty() {
            "SAMPLE".to_string()
        } else {
            id
        }
    }

    /// `--sq-p` when given; Illumina when every fastq has Illumina headers.
    pub fn seq_platform(&self, requested: Option<SeqPlatform>) -> Result<Option<SeqPlatform>> {
        if self.fastqs.is_empty() {
            return Ok(None);
        }
        if let Some(platform) = requested {
            return Ok(Some(platform));
        }
        if self.fastqs.iter().all(|f| is_illumina_fastq(f)) {
            return Ok(Some(SeqPlatform::Illumina));
        }
        bail!("please specify sequencing platform (--sq-p)")
    }

    /// `--sq-r` when given; otherwise paired for two files and unpaired for
    /// one, in which case the second value is the warning to record.
    pub fn seq_pairing(&self, requested: Option<SeqPairing>) -> (Option<SeqPairing>, Option<String>) {
        if self.fastqs.is_empty() {
            return (None, None);
        }
        if let Some(pairing) = requested {
            return (Some(pairing), None);
        }
        let assumed = if self.fastqs.len() == 2 {
            SeqPairing::Paired
        } else {
            SeqPairing::Unpaired
        };
        (Some(assumed), Some(format!("assuming {assumed} reads")))
    }
}

fn existing(path: &Path) -> Result<PathBuf> {
    if !path.is_file() {
        bail!("no such file: {}", path.display());
    }
    path.canonicalize()
        .with_context(|| format!("cannot resolve path: {}", path.display()))
}

/// Common leading part of the fastq file names without extensions, minus a
/// trailing `_R`, `_r` or `_`.
fn common_prefix_id(fastqs: &[PathBuf]) -> String {
    let names: Vec<&str> = fastqs.iter().map(|p| file_name(p)).collect();
    let Some((first, rest)) = names.split_first() else {
        return String::new();
    };
    let len = rest.iter().fold(first.len(), |len, name| {
        first
            .bytes()
            .zip(name.bytes())
            .take(len)
            .take_while(|(a, b)| a == b)
            .count()
    });
    let mut prefix = &first[..floor_char_boundary(first, len)];
    prefix = prefix.strip_suffix(".gz").unwrap_or(prefix);
    prefix = prefix
        .strip_suffix(".fastq")
        .or_else(|| prefix.strip_suffix(".fq"))
        .unwrap_or(prefix);
    if let Some(p) = prefix.strip_suffix("_R").or_else(|| prefix.strip_suffix("_r")) {
        prefix = p;
    } else if let Some(p) = prefix.strip_suffix('_') {
        prefix = p;
    }
    prefix.to_string()
}

fn floor_char_boundary(s: &str, mut index: usize) -> usize {
    while !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}

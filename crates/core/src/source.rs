//! Where clip and ambient audio comes from.
//!
//! The engine only sees the [`ClipSource`] trait; the directory-backed
//! implementation resolves clip ids as file names under a music folder.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::audio::buffer::{AudioFormat, SampleBuffer};
use crate::audio::io::{conform, load_audio};
use crate::error::ClipError;

/// Clip-loading backend.
pub trait ClipSource: Send + Sync {
    /// Format every loaded clip is converted to.
    fn format(&self) -> AudioFormat;

    /// Decode a clip into [`Self::format`].
    fn load_clip(&self, id: &str) -> std::result::Result<SampleBuffer, ClipError>;
}

/// Clips stored as audio files named by their id.
pub struct DirectoryClipSource {
    pub root: PathBuf,
    pub format: AudioFormat,
}

impl DirectoryClipSource {
    pub fn new(root: impl Into<PathBuf>, format: AudioFormat) -> Self {
        Self {
            root: root.into(),
            format,
        }
    }

    /// Resolve an id to a file directly under `root`.
    ///
    /// Only a single plain file name is accepted, so a library entry cannot
    /// point outside the music directory.
    fn path_for(&self, id: &str) -> std::result::Result<PathBuf, ClipError> {
        let mut components = Path::new(id).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(name)), None) if name == id => Ok(self.root.join(name)),
            _ => Err(ClipError::InvalidId(id.to_string())),
        }
    }
}

impl ClipSource for DirectoryClipSource {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn load_clip(&self, id: &str) -> std::result::Result<SampleBuffer, ClipError> {
        let path = self.path_for(id)?;
        if !path.is_file() {
            return Err(ClipError::NotFound(id.to_string()));
        }
        let buffer = load_audio(&path, self.format).map_err(|e| ClipError::Decode {
            id: id.to_string(),
            message: format!("{:#}", e),
        })?;
        if buffer.is_empty() {
            return Err(ClipError::Empty(id.to_string()));
        }
        Ok(buffer)
    }
}

/// Clips held in memory, keyed by id.
#[derive(Debug, Clone)]
pub struct MemoryClipSource {
    format: AudioFormat,
    clips: HashMap<String, SampleBuffer>,
}

impl MemoryClipSource {
    pub fn new(format: AudioFormat) -> Self {
        Self {
            format,
            clips: HashMap::new(),
        }
    }

    /// Store a clip, converting it to this source's format.
    pub fn insert(&mut self, id: impl Into<String>, buffer: SampleBuffer) -> Result<()> {
        let id = id.into();
        let buffer = conform(buffer, self.format)
            .with_context(|| format!("Failed to convert clip '{}'", id))?;
        self.clips.insert(id, buffer);
        Ok(())
    }
}

impl ClipSource for MemoryClipSource {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn load_clip(&self, id: &str) -> std::result::Result<SampleBuffer, ClipError> {
        match self.clips.get(id) {
            Some(buffer) if buffer.is_empty() => Err(ClipError::Empty(id.to_string())),
            Some(buffer) => Ok(buffer.clone()),
            None => Err(ClipError::NotFound(id.to_string())),
        }
    }
}

/// Decodes each clip at most once and hands out copies afterwards.
///
/// The planner loads through this so a clip that fails to decode is caught
/// before it is assigned, and the assembler reuses the decoded audio.
pub struct ClipCache<'a> {
    inner: &'a dyn ClipSource,
    clips: Mutex<HashMap<String, SampleBuffer>>,
}

impl<'a> ClipCache<'a> {
    pub fn new(inner: &'a dyn ClipSource) -> Self {
        Self {
            inner,
            clips: Mutex::new(HashMap::new()),
        }
    }

    /// Decode `id` now and keep it. Failures are not cached.
    pub fn preload(&self, id: &str) -> std::result::Result<(), ClipError> {
        if self.lock().contains_key(id) {
            return Ok(());
        }
        let buffer = self.inner.load_clip(id)?;
        self.lock().insert(id.to_string(), buffer);
        Ok(())
    }

    /// Number of clips decoded so far.
    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, SampleBuffer>> {
        self.clips.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ClipSource for ClipCache<'_> {
    fn format(&self) -> AudioFormat {
        self.inner.format()
    }

    fn load_clip(&self, id: &str) -> std::result::Result<SampleBuffer, ClipError> {
        if let Some(buffer) = self.lock().get(id) {
            return Ok(buffer.clone());
        }
        let buffer = self.inner.load_clip(id)?;
        self.lock().insert(id.to_string(), buffer.clone());
        Ok(buffer)
    }
}

/// Directory of ambient beds; one is picked per render.
pub struct AmbientPool {
    pub dir: PathBuf,
}

impl AmbientPool {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// All `.wav` files in the directory, sorted by name.
    ///
    /// A missing directory yields an empty list.
    pub fn candidates(&self) -> Result<Vec<PathBuf>> {
        if !self.dir.is_dir() {
            log::debug!("Ambience directory not found: {}", self.dir.display());
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to list {}", self.dir.display()))?
        {
            let path = entry?.path();
            if path.is_file() && is_wav(&path) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Pick one candidate at random. Deterministic when `seed` is given.
    pub fn choose(&self, seed: Option<u64>) -> Result<Option<PathBuf>> {
        let candidates = self.candidates()?;
        let mut rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        Ok(candidates.choose(&mut rng).cloned())
    }
}

fn is_wav(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("wav"))
        .unwrap_or(false)
}

use log::{info, warn};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tempfile::{NamedTempFile, TempDir};
use walkdir::WalkDir;
use zip::result::ZipError;
use zip::{ZipArchive, ZipWriter, write::FileOptions};

use crate::Error;
use crate::apkg_schema::{self, Timestamp};
use crate::error::zip_error;
use crate::importer;
use crate::project::Project;
use crate::store::Store;

/// An open package: its unpacked scratch directory and the databases in it.
///
/// Field order is drop order; the store must close before the scratch
/// directory is removed.
struct Session {
    store: Store,
    scratch: TempDir,
    target: PathBuf,
}

enum State {
    Closed,
    Open(Session),
}

/// `Package` owns the on-disk `.apkg` container while it is being compiled.
///
/// Opening unpacks the archive (or starts a fresh schema), closing repacks the
/// scratch directory over the original path. Only one container can be open
/// per instance. Any failing operation on an open package discards it: the
/// scratch directory is removed and the target is left as it was.
///
/// # Example
/// ```rust,no_run
/// use flashcard_pkg::{Package, Project};
///
/// # fn build(project: &Project) -> Result<(), flashcard_pkg::Error> {
/// let mut package = Package::new();
/// package.open("deck.apkg")?;
/// package.import_project(project)?;
/// package.close()?;
/// # Ok(())
/// # }
/// ```
pub struct Package {
    state: State,
    timestamp: Option<f64>,
}

impl Default for Package {
    fn default() -> Self {
        Self::new()
    }
}

impl Package {
    pub fn new() -> Self {
        Self {
            state: State::Closed,
            timestamp: None,
        }
    }

    /// Pins the clock (seconds since the epoch) used for every timestamp the
    /// package writes.
    pub fn set_timestamp(&mut self, timestamp: f64) {
        self.timestamp = Some(timestamp);
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, State::Open(_))
    }

    /// Directory the open package is unpacked into.
    pub fn scratch_dir(&self) -> Option<&Path> {
        match &self.state {
            State::Open(session) => Some(session.scratch.path()),
            State::Closed => None,
        }
    }

    fn now(&self) -> Timestamp {
        let secs = self.timestamp.unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs_f64()
        });
        Timestamp::from_secs_f64(secs)
    }

    fn session(&self) -> Result<&Session, Error> {
        match &self.state {
            State::Open(session) => Ok(session),
            State::Closed => Err(Error::InvalidState("package is not open".to_string())),
        }
    }

    fn take_session(&mut self) -> Result<Session, Error> {
        match std::mem::replace(&mut self.state, State::Closed) {
            State::Open(session) => Ok(session),
            State::Closed => Err(Error::InvalidState("package is not open".to_string())),
        }
    }

    /// Opens the package at `path`.
    ///
    /// A missing file is a fresh package: an empty placeholder is created at
    /// `path` and every table is initialized. Any existing file, even an empty
    /// one, is unpacked into a new scratch directory and its schema is used as
    /// is; a file that is not a readable archive fails with `ContainerCorrupt`.
    pub fn open<P: AsRef<Path>>(&mut self, path: P) -> Result<(), Error> {
        if let State::Open(session) = &self.state {
            return Err(Error::InvalidState(format!(
                "package is already open in temporary directory {}",
                session.scratch.path().display()
            )));
        }
        let target = path.as_ref().to_path_buf();

        let is_new = match fs::metadata(&target) {
            Ok(_) => false,
            Err(e) if e.kind() == io::ErrorKind::NotFound => true,
            Err(e) => return Err(e.into()),
        };

        let scratch = tempfile::Builder::new().prefix("flashcard-").tempdir()?;
        if is_new {
            OpenOptions::new().write(true).create(true).truncate(false).open(&target)?;
        } else {
            let entries = unpack(&target, scratch.path())?;
            info!("Unpacked {} entries from {}", entries, target.display());
        }

        let store = Store::open(scratch.path())?;
        if is_new {
            apkg_schema::init_all(&store, &self.now())?;
            info!("Initialized fresh package {}", target.display());
        }

        self.state = State::Open(Session {
            store,
            scratch,
            target,
        });
        Ok(())
    }

    /// Closes the databases and rewrites the archive at the opened path from
    /// the scratch directory, then removes the scratch directory.
    pub fn close(&mut self) -> Result<(), Error> {
        let Session {
            store,
            scratch,
            target,
        } = self.take_session()?;

        store.close()?;
        let entries = repack(scratch.path(), &target)?;
        scratch.close()?;
        info!("Wrote {} entries to {}", entries, target.display());
        Ok(())
    }

    /// Drops the open package without repacking it.
    pub fn discard(&mut self) -> Result<(), Error> {
        let session = self.take_session()?;
        warn!("Discarding package {}", session.target.display());
        session.store.close()?;
        session.scratch.close()?;
        Ok(())
    }

    /// Writes the project's note type, templates and fields.
    pub fn import_project(&mut self, project: &Project) -> Result<(), Error> {
        let now = self.now();
        let result = match &mut self.state {
            State::Open(session) => importer::import_project(&mut session.store, project, now),
            State::Closed => return Err(Error::InvalidState("package is not open".to_string())),
        };
        self.discard_on_error(result)
    }

    /// Adds a media file to the package and its media index. Returns the file
    /// name it is stored under.
    pub fn add_media<P: AsRef<Path>>(&mut self, path: P) -> Result<String, Error> {
        let now = self.now();
        let session = self.session()?;
        let result = importer::import_media(&session.store, session.scratch.path(), path.as_ref(), now);
        self.discard_on_error(result)
    }

    fn discard_on_error<T>(&mut self, result: Result<T, Error>) -> Result<T, Error> {
        if let Err(e) = &result {
            warn!("Aborting package build: {}", e);
            self.state = State::Closed;
        }
        result
    }
}

/// Compiles `project` into the package file it names.
pub fn compile(project: &Project) -> Result<(), Error> {
    compile_to(&project.filename, project)
}

/// Compiles `project` into the package file at `path`.
pub fn compile_to<P: AsRef<Path>>(path: P, project: &Project) -> Result<(), Error> {
    let mut package = Package::new();
    package.open(path)?;
    package.import_project(project)?;
    package.close()
}

fn unpack(archive_path: &Path, root: &Path) -> Result<usize, Error> {
    let file = File::open(archive_path)?;
    let mut archive = ZipArchive::new(file).map_err(zip_error(archive_path))?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(zip_error(archive_path))?;
        let relative = entry
            .enclosed_name()
            .map(Path::to_path_buf)
            .ok_or_else(|| Error::PathEscape(entry.name().to_string()))?;
        let out = root.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out)?;
            continue;
        }
        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut data = Vec::new();
        entry
            .read_to_end(&mut data)
            .map_err(|e| zip_error(archive_path)(ZipError::Io(e)))?;
        fs::write(&out, data)?;
    }
    Ok(archive.len())
}

fn write_error(e: ZipError) -> Error {
    match e {
        ZipError::Io(e) => Error::Io(e),
        other => Error::Io(io::Error::other(other)),
    }
}

/// Zips every regular file under `root` into a temporary file next to
/// `target`, then renames it over `target`.
fn repack(root: &Path, target: &Path) -> Result<usize, Error> {
    let parent = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let archive = NamedTempFile::new_in(parent)?;
    let mut outzip = ZipWriter::new(archive.as_file());

    let mut count = 0;
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(root).map_err(io::Error::other)?;
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        outzip
            .start_file(name, FileOptions::default())
            .map_err(write_error)?;
        io::copy(&mut File::open(entry.path())?, &mut outzip)?;
        count += 1;
    }
    outzip.finish().map_err(write_error)?;
    drop(outzip);

    archive.persist(target).map_err(|e| Error::Io(e.error))?;
    Ok(count)
}

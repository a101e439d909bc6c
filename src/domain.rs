//! Domain folders and the solve directory.
//!
//! A domain is a folder holding `train/` and `test/` subfolders of graph
//! files, or a `.zip` archive of such a folder. Learning happens in a solve
//! directory named after the solver program and the synthesis bounds, e.g.
//! `blocks/solver_a=3_p=12/`.

use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use tempfile::TempDir;
use zip::ZipArchive;

use crate::error::{Error, Result};
use crate::graph::count_nodes;

pub const PARTIAL_FILE: &str = "partial.lp";
pub const SOLUTION_FILE: &str = "solution.lp";
pub const LOG_FILE: &str = "log.txt";

/// An opened domain.
#[derive(Debug)]
pub struct Domain {
    pub name: String,
    /// Folder holding `train/` and `test/`.
    pub root: PathBuf,
    /// Where results go when no results folder is given.
    pub default_results: Option<PathBuf>,
    /// Keeps an extracted archive alive.
    _extracted: Option<TempDir>,
}

impl Domain {
    /// Opens a domain folder, or extracts a `.zip` archive into a temporary
    /// folder.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.is_dir() {
            return Ok(Domain {
                name: file_stem(path),
                root: path.to_path_buf(),
                default_results: None,
                _extracted: None,
            });
        }
        if path.extension().map_or(false, |e| e == "zip") {
            return Self::extract(path);
        }
        Err(Error::io(
            path,
            io::Error::new(io::ErrorKind::NotFound, "domain is neither a folder nor a .zip archive"),
        ))
    }

    fn extract(path: &Path) -> Result<Self> {
        let tmp = TempDir::new().map_err(|e| Error::io(path, e))?;
        info!("Domain {} is compressed; extracting it into {}", path.display(), tmp.path().display());

        let file = File::open(path).map_err(|e| Error::io(path, e))?;
        let mut archive = ZipArchive::new(BufReader::new(file))
            .map_err(|e| Error::io(path, io::Error::new(io::ErrorKind::InvalidData, e)))?;
        archive
            .extract(tmp.path())
            .map_err(|e| Error::io(path, io::Error::new(io::ErrorKind::InvalidData, e)))?;

        // The archive holds either the domain folder or its content.
        let mut subfolders: Vec<PathBuf> = read_dir(tmp.path())?.into_iter().filter(|p| p.is_dir()).collect();
        subfolders.sort();
        let root = match subfolders.first() {
            Some(sub) if !tmp.path().join("train").is_dir() && !tmp.path().join("test").is_dir() => sub.clone(),
            _ => tmp.path().to_path_buf(),
        };
        debug!("Using {} as domain folder", root.display());

        let name = if root.as_path() == tmp.path() { file_stem(path) } else { file_stem(&root) };
        Ok(Domain {
            name,
            root,
            default_results: path.parent().map(Path::to_path_buf),
            _extracted: Some(tmp),
        })
    }

    pub fn train_dir(&self) -> PathBuf {
        self.root.join("train")
    }

    pub fn test_dir(&self) -> PathBuf {
        self.root.join("test")
    }

    /// Held-out graph files, smallest first.
    pub fn test_files(&self) -> Result<Vec<PathBuf>> {
        sort_by_size(lp_files(self.test_dir(), &[])?)
    }

    /// The solve directory for `solver` and the given bounds.
    ///
    /// Without a results folder, a plain domain folder holds its own solve
    /// directories and an archive's live next to it.
    pub fn solve_dir(&self, results: Option<&Path>, solver: &Path, arity: usize, predicates: usize) -> PathBuf {
        let folder = format!("{}_a={}_p={}", file_stem(solver), arity, predicates);
        match (results, &self.default_results) {
            (Some(results), _) => results.join(&self.name).join(folder),
            (None, Some(parent)) => parent.join(&self.name).join(folder),
            (None, None) => self.root.join(folder),
        }
    }

    /// Creates (or, with `resume`, reuses) the solve directory.
    ///
    /// A fresh solve directory is emptied and receives the training graphs
    /// and a copy of the solver program.
    pub fn prepare(&self, solve_dir: &Path, solver: &Path, resume: bool) -> Result<()> {
        if resume && solve_dir.is_dir() {
            info!("Continuing in {}", solve_dir.display());
            return Ok(());
        }
        fs::create_dir_all(solve_dir).map_err(|e| Error::io(solve_dir, e))?;
        for entry in read_dir(solve_dir)? {
            if entry.is_file() {
                debug!("Unlink {}", entry.display());
                fs::remove_file(&entry).map_err(|e| Error::io(&entry, e))?;
            }
        }

        let train = self.train_dir();
        if train.is_dir() {
            for file in lp_files(&train, &[])? {
                copy_into(&file, solve_dir)?;
            }
        } else {
            warn!("Domain {} has no train folder", self.name);
        }
        copy_into(solver, solve_dir)?;
        Ok(())
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn read_dir(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| Error::io(dir, e))?;
    let mut paths = Vec::new();
    for entry in entries {
        paths.push(entry.map_err(|e| Error::io(dir, e))?.path());
    }
    Ok(paths)
}

/// Copies `file` into `dir`, keeping its name. Returns the new path.
pub fn copy_into(file: &Path, dir: &Path) -> Result<PathBuf> {
    let name = file
        .file_name()
        .ok_or_else(|| Error::io(file, io::Error::new(io::ErrorKind::InvalidInput, "not a file")))?;
    let target = dir.join(name);
    debug!("File copy {} to {}", file.display(), dir.display());
    fs::copy(file, &target).map_err(|e| Error::io(file, e))?;
    Ok(target)
}

/// The `.lp` files of `dir`, by name, skipping the names in `exclude`.
pub fn lp_files<P: AsRef<Path>>(dir: P, exclude: &[&str]) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    let mut files: Vec<PathBuf> = read_dir(dir)?
        .into_iter()
        .filter(|p| p.is_file() && p.extension().map_or(false, |e| e == "lp"))
        .filter(|p| {
            let name = p.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
            !exclude.contains(&name.as_str())
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Orders graph files by node count, keeping name order among equals.
pub fn sort_by_size(files: Vec<PathBuf>) -> Result<Vec<PathBuf>> {
    let mut sized = Vec::with_capacity(files.len());
    for file in files {
        sized.push((count_nodes(&file)?, file));
    }
    sized.sort_by_key(|(size, _)| *size);
    Ok(sized.into_iter().map(|(_, f)| f).collect())
}

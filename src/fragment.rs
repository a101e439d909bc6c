//! The partial-training fragment.
//!
//! Counterexample nodes are handed to the synthesizer through an
//! append-only fact file in the solve directory:
//!
//! ```text
//! filename("g3.lp").
//! partial(3,"g3.lp").
//! relevant(3,17).
//! ```
//!
//! `relevant(I,N)` asks the synthesizer to explain the transitions of node
//! `N` of instance `I`. Reading the fragment back recovers which nodes were
//! injected, so an interrupted run can continue.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::error::{Error, Result};
use crate::facts::{fact_body, records, unquote, Source};
use crate::types::NodeId;

#[derive(Debug, Clone)]
pub struct Fragment {
    path: PathBuf,
}

impl Fragment {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Fragment { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one batch of relevant nodes of `file`.
    pub fn append(&self, file: &str, instance: u32, nodes: &[NodeId]) -> Result<()> {
        let mut fd = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| Error::io(&self.path, e))?;
        let mut text = format!("filename(\"{}\").\npartial({},\"{}\").\n", file, instance, file);
        for node in nodes {
            info!("Add to partial: relevant({},{})", instance, node);
            text.push_str(&format!("relevant({},{}).\n", instance, node));
        }
        fd.write_all(text.as_bytes()).map_err(|e| Error::io(&self.path, e))
    }

    /// Nodes injected so far, per graph file name.
    ///
    /// A missing fragment means nothing was injected yet.
    pub fn injected(&self) -> Result<BTreeMap<String, BTreeSet<NodeId>>> {
        let mut injected: BTreeMap<String, BTreeSet<NodeId>> = BTreeMap::new();
        if !self.path.exists() {
            return Ok(injected);
        }
        let content = fs::read_to_string(&self.path).map_err(|e| Error::io(&self.path, e))?;
        let name = self.path.display().to_string();
        let src = Source::new(&name);

        let mut files: BTreeMap<u32, String> = BTreeMap::new();
        for rec in records(&content) {
            if let Some(body) = fact_body(rec.text, "partial") {
                let f = src.fields(rec, body, &[2])?;
                let file = unquote(f[1]).to_string();
                injected.entry(file.clone()).or_default();
                files.insert(src.number(rec, f[0])?, file);
            } else if let Some(body) = fact_body(rec.text, "relevant") {
                let f = src.fields(rec, body, &[2])?;
                let instance: u32 = src.number(rec, f[0])?;
                let node = NodeId::new(src.number(rec, f[1])?);
                match files.get(&instance) {
                    Some(file) => {
                        injected.entry(file.clone()).or_default().insert(node);
                    }
                    None => warn!("{}:{}: relevant node of unknown instance {}", name, rec.line, instance),
                }
            } else if fact_body(rec.text, "filename").is_none() {
                warn!("{}:{}: unrecognized record `{}`", name, rec.line, rec.text);
            }
        }
        Ok(injected)
    }
}

use crate::config::{LabelsConfig, Validatable};
use std::{
    fs::File,
    io::{self, BufRead},
    path::Path,
};

/// Class id to name table. Loaded once and shared read-only.
#[derive(Debug, Clone, Default)]
pub struct ClassLabels {
    names: Vec<String>,
}

impl ClassLabels {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    pub fn from_config(labels_cfg: &LabelsConfig) -> io::Result<Self> {
        load_labels(&labels_cfg.get_path()).map(Self::new)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn name(&self, class_id: usize) -> String {
        match self.names.get(class_id) {
            Some(name) => name.clone(),
            None => format!("Unknown class {}", class_id),
        }
    }
}

/// Reads one class name per line. Blank lines are skipped; anything after a
/// comma is ignored so `name,r,g,b` label files load too.
pub fn load_labels(filepath: &Path) -> io::Result<Vec<String>> {
    let file = File::open(filepath)?;
    read_labels(io::BufReader::new(file))
}

fn read_labels<R: BufRead>(reader: R) -> io::Result<Vec<String>> {
    let mut names = Vec::new();

    for line_result in reader.lines() {
        let line = line_result?;
        let name = line.split(',').next().unwrap_or_default().trim();
        if name.is_empty() {
            continue;
        }
        names.push(name.to_string());
    }

    if names.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "Labels file contains no class names",
        ));
    }

    Ok(names)
}

//! Ingestion and enrichment of the class graph.
//!
//! Archives are parsed in parallel, classes split across several input
//! archives are merged, and the ordered passes then run single-threaded:
//! header linking (done while draining the graph's pending queue), reference
//! wiring, initializer detection, hierarchy grouping, parent/child linking with
//! kind classification, and temporary naming.

mod hierarchy;
mod naming;
mod refs;

use rayon::ThreadPool;
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::archive;
use crate::classfile::ClassFile;
use crate::config::ProjectConfig;
use crate::error::LoadError;
use crate::graph::{ClassGraph, NamePatterns};
use crate::model::Side;

pub struct FeatureExtractor<'a> {
    pool: &'a ThreadPool,
}

impl<'a> FeatureExtractor<'a> {
    pub fn new(pool: &'a ThreadPool) -> Self {
        Self { pool }
    }

    /// Reads every archive named by the project and returns the enriched graph.
    pub fn load(&self, project: &ProjectConfig) -> Result<ClassGraph, LoadError> {
        for side in [Side::A, Side::B] {
            if project.inputs(side).is_empty() {
                return Err(LoadError::NoInputs(side.label()));
            }
        }

        let patterns = project.patterns()?;
        let shared = self.read_archives(&project.shared_classpath)?;

        let mut classpath_index = Vec::new();
        for side in [Side::A, Side::B] {
            classpath_index.push((side, index_classpath(project.classpath(side))?));
        }

        let a = self.read_archives(project.inputs(Side::A))?;
        let b = self.read_archives(project.inputs(Side::B))?;

        let mut graph = ClassGraph::new(patterns);
        for (side, index) in classpath_index {
            graph.set_classpath_index(side, index);
        }
        build(&mut graph, shared, a, b)?;
        Ok(graph)
    }

    fn read_archives(&self, paths: &[PathBuf]) -> Result<Vec<ClassFile>, LoadError> {
        let mut entries = Vec::new();
        for path in paths {
            if !path.exists() {
                return Err(LoadError::MissingInput(path.clone()));
            }
            let single = path.is_file() && path.extension().is_some_and(|e| e == "class");
            let read = archive::read_class_entries(path).map_err(|source| LoadError::Archive {
                path: path.clone(),
                source,
            })?;
            for (entry, bytes) in read {
                if entry.starts_with("META-INF/") || entry.ends_with("module-info.class") {
                    continue;
                }
                entries.push((path.as_path(), entry, bytes, single));
            }
        }

        let parsed: Vec<Result<ClassFile, LoadError>> = self.pool.install(|| {
            entries
                .par_iter()
                .map(|(path, entry, bytes, single)| parse_entry(path, entry, bytes, *single))
                .collect()
        });

        let mut out: Vec<ClassFile> = Vec::with_capacity(parsed.len());
        let mut by_name: HashMap<String, usize> = HashMap::new();
        for file in parsed {
            let file = file?;
            match by_name.get(&file.this_class) {
                Some(&index) => {
                    debug!(class = %file.this_class, "merging split class body");
                    out[index].merge(file);
                }
                None => {
                    by_name.insert(file.this_class.clone(), out.len());
                    out.push(file);
                }
            }
        }
        Ok(out)
    }
}

fn parse_entry(path: &Path, entry: &str, bytes: &[u8], single: bool) -> Result<ClassFile, LoadError> {
    let file = ClassFile::parse(bytes).map_err(|source| LoadError::ClassFile {
        path: path.to_path_buf(),
        entry: entry.to_string(),
        source,
    })?;
    if !single && entry.strip_suffix(".class") != Some(file.this_class.as_str()) {
        return Err(LoadError::MisplacedClass {
            path: path.to_path_buf(),
            entry: entry.to_string(),
            declared: file.this_class,
        });
    }
    Ok(file)
}

fn index_classpath(paths: &[PathBuf]) -> Result<HashMap<String, archive::ClassLocation>, LoadError> {
    let mut index = HashMap::new();
    for path in paths {
        if !path.exists() {
            return Err(LoadError::MissingInput(path.clone()));
        }
        let names = archive::index_class_names(path).map_err(|source| LoadError::Archive {
            path: path.clone(),
            source,
        })?;
        for (name, location) in names {
            // earlier classpath entries shadow later ones
            index.entry(name).or_insert(location);
        }
    }
    Ok(index)
}

/// Populates `graph` from already parsed bodies and runs every enrichment pass.
pub fn build(
    graph: &mut ClassGraph,
    shared: Vec<ClassFile>,
    a: Vec<ClassFile>,
    b: Vec<ClassFile>,
) -> Result<(), LoadError> {
    for file in shared {
        graph.add_class(Side::Shared, file, false);
    }
    graph.drain_pending()?;

    for (side, files) in [(Side::A, a), (Side::B, b)] {
        for file in files {
            graph.add_class(side, file, true);
        }
    }
    graph.drain_pending()?;

    refs::wire_references(graph)?;
    refs::detect_initializers(graph);
    hierarchy::group_methods(graph);
    hierarchy::link_parents(graph);
    hierarchy::classify_kinds(graph);
    naming::assign_tmp_names(graph);

    for side in [Side::A, Side::B, Side::Shared] {
        let classes = graph.classes(side);
        let inputs = classes.iter().filter(|c| graph.class(**c).is_input()).count();
        info!(
            side = %side,
            classes = classes.len(),
            inputs,
            "class graph ready"
        );
    }
    Ok(())
}

/// Builds a graph from in-memory bodies with the given patterns.
pub fn build_graph(
    patterns: NamePatterns,
    shared: Vec<ClassFile>,
    a: Vec<ClassFile>,
    b: Vec<ClassFile>,
) -> Result<ClassGraph, LoadError> {
    let mut graph = ClassGraph::new(patterns);
    build(&mut graph, shared, a, b)?;
    Ok(graph)
}

//! Read-only in-memory concept index.
//!
//! Built once per run from one or more ontology sources, then shared by
//! every resolver worker. Concepts live in an insertion-ordered arena;
//! label and synonym maps hold indices into it, and parent links are
//! identifier-based, so the graph needs no pointer cycles.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument};

use phenolink_core::defaults;
use phenolink_core::{Error, OntologyConcept, Result};

use crate::{obo, owl};

/// One ontology input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OntologySource {
    /// OBO flat file (`.obo`).
    Obo(PathBuf),
    /// OWL RDF/XML release (`.owl`, `.rdf`, `.xml`).
    OwlXml(PathBuf),
}

impl OntologySource {
    /// Pick the parser from the file extension.
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        match path.extension().and_then(|e| e.to_str()) {
            Some("obo") => Ok(Self::Obo(path)),
            Some("owl") | Some("rdf") | Some("xml") => Ok(Self::OwlXml(path)),
            _ => Err(Error::MalformedOntology(format!(
                "{}: unrecognized ontology extension",
                path.display()
            ))),
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            Self::Obo(p) | Self::OwlXml(p) => p,
        }
    }

    fn parse(&self) -> Result<Vec<OntologyConcept>> {
        match self {
            Self::Obo(p) => obo::parse_file(p),
            Self::OwlXml(p) => owl::parse_file(p),
        }
    }
}

/// Immutable label/synonym lookup structure over all concepts of a run.
///
/// Safe for concurrent read access; share via `Arc`.
#[derive(Debug)]
pub struct OntologyIndex {
    concepts: Vec<OntologyConcept>,
    by_id: HashMap<String, usize>,
    /// Case-folded label → first indexed concept.
    by_label: HashMap<String, usize>,
    /// Case-folded synonym → first indexed concept.
    by_synonym: HashMap<String, usize>,
}

impl OntologyIndex {
    /// Build the index from the given sources.
    ///
    /// Fails with [`Error::MalformedOntology`] when a source cannot be
    /// parsed, or [`Error::DuplicateConcept`] when two sources assign the
    /// same identifier to conflicting labels. Identical re-declarations are
    /// merged (synonyms deduplicated, first occurrence wins for ordering).
    #[instrument(skip(sources), fields(source_count = sources.len()))]
    pub fn build(sources: &[OntologySource]) -> Result<Self> {
        let mut all = Vec::new();
        for source in sources {
            let parsed = source.parse()?;
            debug!(
                source = %source.path().display(),
                concept_count = parsed.len(),
                "Loaded ontology source"
            );
            all.extend(parsed);
        }

        let index = Self::from_concepts(all)?;
        info!(concept_count = index.concepts.len(), "Ontology index built");
        Ok(index)
    }

    /// Build from already-parsed concepts.
    pub fn from_concepts(concepts: Vec<OntologyConcept>) -> Result<Self> {
        let mut index = Self {
            concepts: Vec::new(),
            by_id: HashMap::new(),
            by_label: HashMap::new(),
            by_synonym: HashMap::new(),
        };
        for concept in concepts {
            index.insert(concept)?;
        }
        for (i, concept) in index.concepts.iter().enumerate() {
            index.by_label.entry(fold(&concept.label)).or_insert(i);
            for synonym in &concept.synonyms {
                index.by_synonym.entry(fold(synonym)).or_insert(i);
            }
        }
        Ok(index)
    }

    fn insert(&mut self, concept: OntologyConcept) -> Result<()> {
        if let Some(&existing_idx) = self.by_id.get(&concept.id) {
            let existing = &mut self.concepts[existing_idx];
            if existing.label != concept.label {
                return Err(Error::DuplicateConcept {
                    id: concept.id,
                    existing: existing.label.clone(),
                    conflicting: concept.label,
                });
            }
            for synonym in concept.synonyms {
                if !existing.synonyms.contains(&synonym) {
                    existing.synonyms.push(synonym);
                }
            }
            for parent in concept.parents {
                if !existing.parents.contains(&parent) {
                    existing.parents.push(parent);
                }
            }
            return Ok(());
        }

        self.by_id.insert(concept.id.clone(), self.concepts.len());
        self.concepts.push(concept);
        Ok(())
    }

    /// Case-insensitive exact match: label first, then synonym.
    ///
    /// Deterministic; the first indexed concept wins on tie.
    pub fn lookup(&self, text: &str) -> Option<&OntologyConcept> {
        let key = fold(text.trim());
        self.by_label
            .get(&key)
            .or_else(|| self.by_synonym.get(&key))
            .map(|&i| &self.concepts[i])
    }

    /// Whether an exact lookup would hit a label (rather than a synonym).
    pub fn lookup_is_label(&self, text: &str) -> bool {
        self.by_label.contains_key(&fold(text.trim()))
    }

    /// Candidates above `threshold`, ranked by Jaro-Winkler similarity
    /// descending, ties broken by concept identifier ascending.
    ///
    /// At most [`defaults::FUZZY_CANDIDATE_LIMIT`] results; empty when no
    /// candidate meets the threshold.
    pub fn fuzzy_lookup(&self, text: &str, threshold: f32) -> Vec<(&OntologyConcept, f32)> {
        let query = fold(text.trim());
        if query.is_empty() {
            return Vec::new();
        }

        let mut candidates: Vec<(&OntologyConcept, f32)> = self
            .concepts
            .iter()
            .filter_map(|concept| {
                let score = concept_score(concept, &query);
                (score >= threshold).then_some((concept, score))
            })
            .collect();

        candidates.sort_by(|(a, sa), (b, sb)| {
            sb.partial_cmp(sa)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        candidates.truncate(defaults::FUZZY_CANDIDATE_LIMIT);
        candidates
    }

    /// Concept by identifier.
    pub fn get(&self, id: &str) -> Option<&OntologyConcept> {
        self.by_id.get(id).map(|&i| &self.concepts[i])
    }

    /// Parent concepts of an identifier; lookup-only traversal of the DAG.
    pub fn parents_of(&self, id: &str) -> Vec<&OntologyConcept> {
        self.get(id)
            .map(|c| c.parents.iter().filter_map(|p| self.get(p)).collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.concepts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.concepts.is_empty()
    }
}

/// Best similarity between the query and the concept's label or synonyms.
fn concept_score(concept: &OntologyConcept, query: &str) -> f32 {
    let label_score = strsim::jaro_winkler(&fold(&concept.label), query) as f32;
    concept
        .synonyms
        .iter()
        .map(|s| strsim::jaro_winkler(&fold(s), query) as f32)
        .fold(label_score, f32::max)
}

/// Case-fold for matching.
fn fold(s: &str) -> String {
    s.to_lowercase()
}

//! OBO flat-file parsing.
//!
//! Reads `[Term]` stanzas into [`OntologyConcept`]s. Only the tag subset the
//! pipeline resolves against is kept: `id`, `name`, EXACT `synonym` lines,
//! and `is_a` parent links. Obsolete terms are skipped.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, trace};

use phenolink_core::{Error, OntologyConcept, Result};

/// Quoted synonym text followed by its scope keyword, e.g.
/// `synonym: "Epileptic seizure" EXACT []`.
fn synonym_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"^"(.*)"\s+([A-Z_]+)"#).expect("valid synonym regex"))
}

/// Parse an OBO file into concepts, in stanza order.
pub fn parse_file(path: &Path) -> Result<Vec<OntologyConcept>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::MalformedOntology(format!("{}: {}", path.display(), e))
    })?;
    parse_str(&content).map_err(|e| match e {
        Error::MalformedOntology(msg) => {
            Error::MalformedOntology(format!("{}: {}", path.display(), msg))
        }
        other => other,
    })
}

/// Parse OBO text into concepts.
///
/// Fails with [`Error::MalformedOntology`] when a `[Term]` stanza lacks an
/// `id` or `name`, since such a term could never be matched.
pub fn parse_str(content: &str) -> Result<Vec<OntologyConcept>> {
    let mut concepts = Vec::new();
    let mut current: Option<TermStanza> = None;
    let mut in_term = false;

    for (lineno, raw_line) in content.lines().enumerate() {
        let line = raw_line.trim();

        if line.starts_with('[') {
            if let Some(stanza) = current.take() {
                if let Some(concept) = stanza.finish(lineno)? {
                    concepts.push(concept);
                }
            }
            in_term = line == "[Term]";
            if in_term {
                current = Some(TermStanza::default());
            }
            continue;
        }

        if !in_term || line.is_empty() || line.starts_with('!') {
            continue;
        }

        let Some((tag, value)) = line.split_once(':') else {
            continue;
        };
        let value = strip_trailing_comment(value.trim());
        let stanza = current.as_mut().expect("in_term implies open stanza");

        match tag {
            "id" => stanza.id = Some(value.to_string()),
            "name" => stanza.name = Some(value.to_string()),
            "synonym" => {
                if let Some(caps) = synonym_re().captures(value) {
                    // Only EXACT synonyms are reliable match targets.
                    if &caps[2] == "EXACT" {
                        stanza.synonyms.push(caps[1].to_string());
                    } else {
                        trace!(scope = &caps[2], "Skipping non-exact synonym");
                    }
                }
            }
            "is_a" => {
                if let Some(parent) = value.split_whitespace().next() {
                    stanza.parents.push(parent.to_string());
                }
            }
            "is_obsolete" => stanza.obsolete = value == "true",
            _ => {}
        }
    }

    if let Some(stanza) = current.take() {
        if let Some(concept) = stanza.finish(content.lines().count())? {
            concepts.push(concept);
        }
    }

    debug!(concept_count = concepts.len(), "Parsed OBO source");
    Ok(concepts)
}

/// OBO values may carry a trailing `! comment`.
fn strip_trailing_comment(value: &str) -> &str {
    match value.split_once(" !") {
        Some((v, _)) => v.trim(),
        None => value,
    }
}

#[derive(Default)]
struct TermStanza {
    id: Option<String>,
    name: Option<String>,
    synonyms: Vec<String>,
    parents: Vec<String>,
    obsolete: bool,
}

impl TermStanza {
    /// Convert a completed stanza, dropping obsolete terms.
    fn finish(self, lineno: usize) -> Result<Option<OntologyConcept>> {
        if self.obsolete {
            return Ok(None);
        }
        let id = self.id.ok_or_else(|| {
            Error::MalformedOntology(format!("term stanza ending near line {} has no id", lineno))
        })?;
        let label = self.name.ok_or_else(|| {
            Error::MalformedOntology(format!("term {} has no name", id))
        })?;
        Ok(Some(OntologyConcept {
            id,
            label,
            synonyms: self.synonyms,
            parents: self.parents,
        }))
    }
}

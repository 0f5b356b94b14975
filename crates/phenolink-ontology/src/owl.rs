//! OWL RDF/XML parsing.
//!
//! Streams `owl:Class` declarations out of an RDF/XML ontology release,
//! keeping the annotation subset the pipeline resolves against: identifier,
//! `rdfs:label`, exact synonyms, and plain `rdfs:subClassOf` parent links.
//! Deprecated classes are skipped. No reasoning is performed.

use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::{debug, trace};

use phenolink_core::{Error, OntologyConcept, Result};

/// Parse an OWL RDF/XML file into concepts, in declaration order.
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

/// Parse OWL RDF/XML text into concepts.
pub fn parse_str(content: &str) -> Result<Vec<OntologyConcept>> {
    let mut reader = Reader::from_str(content);
    reader.trim_text(true);

    let mut concepts = Vec::new();
    let mut depth: usize = 0;
    let mut class: Option<ClassState> = None;
    // Element whose text content we are waiting for, valid only for direct
    // children of the open class element.
    let mut pending_text: Option<TextField> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                depth += 1;
                on_element(&e, depth, &mut class, &mut pending_text, false)?;
            }
            Ok(Event::Empty(e)) => {
                // Self-closing elements never produce text; depth unchanged.
                on_element(&e, depth + 1, &mut class, &mut pending_text, true)?;
                pending_text = None;
            }
            Ok(Event::Text(t)) => {
                if let (Some(state), Some(field)) = (class.as_mut(), pending_text.take()) {
                    let text = t
                        .unescape()
                        .map_err(|e| Error::MalformedOntology(e.to_string()))?;
                    state.set_text(field, text.trim());
                }
            }
            Ok(Event::End(_)) => {
                pending_text = None;
                if let Some(state) = class.as_ref() {
                    if depth == state.depth {
                        let finished = class.take().expect("class is open");
                        if let Some(concept) = finished.finish() {
                            concepts.push(concept);
                        }
                    }
                }
                depth = depth.saturating_sub(1);
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(Error::MalformedOntology(format!(
                    "XML error at byte {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
        }
    }

    if class.is_some() {
        return Err(Error::MalformedOntology(
            "unterminated owl:Class element".to_string(),
        ));
    }

    debug!(concept_count = concepts.len(), "Parsed OWL source");
    Ok(concepts)
}

/// Fields captured from direct children of `owl:Class`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextField {
    Id,
    Label,
    ExactSynonym,
    Deprecated,
}

struct ClassState {
    /// Depth of the `owl:Class` element itself.
    depth: usize,
    iri: Option<String>,
    id: Option<String>,
    label: Option<String>,
    synonyms: Vec<String>,
    parents: Vec<String>,
    deprecated: bool,
}

impl ClassState {
    fn set_text(&mut self, field: TextField, text: &str) {
        match field {
            TextField::Id => self.id = Some(text.to_string()),
            TextField::Label => {
                // First label wins; releases occasionally carry duplicates.
                if self.label.is_none() {
                    self.label = Some(text.to_string());
                }
            }
            TextField::ExactSynonym => self.synonyms.push(text.to_string()),
            TextField::Deprecated => self.deprecated = text == "true",
        }
    }

    fn finish(self) -> Option<OntologyConcept> {
        if self.deprecated {
            return None;
        }
        let id = self
            .id
            .or_else(|| self.iri.as_deref().and_then(curie_from_iri))?;
        let label = self.label?;
        Some(OntologyConcept {
            id,
            label,
            synonyms: self.synonyms,
            parents: self.parents,
        })
    }
}

/// Dispatch one opening or self-closing element.
fn on_element(
    e: &BytesStart<'_>,
    depth: usize,
    class: &mut Option<ClassState>,
    pending_text: &mut Option<TextField>,
    self_closing: bool,
) -> Result<()> {
    let name = e.name();
    let local = local_name(name.as_ref());

    match class.as_mut() {
        None => {
            // A self-closing class carries no label and could never match;
            // opening it would leave the state dangling at EOF.
            if local == b"Class" && !self_closing {
                *class = Some(ClassState {
                    depth,
                    iri: attr_value(e, b"about")?,
                    id: None,
                    label: None,
                    synonyms: Vec::new(),
                    parents: Vec::new(),
                    deprecated: false,
                });
            }
        }
        Some(state) => {
            // Only direct children carry class annotations; anything deeper
            // (axiom annotations, restrictions) is ignored.
            if depth != state.depth + 1 {
                return Ok(());
            }
            *pending_text = None;
            match local {
                b"id" => *pending_text = Some(TextField::Id),
                b"label" => *pending_text = Some(TextField::Label),
                b"hasExactSynonym" => *pending_text = Some(TextField::ExactSynonym),
                b"deprecated" => *pending_text = Some(TextField::Deprecated),
                b"subClassOf" => {
                    // Plain parent links carry rdf:resource; restriction
                    // subclass axioms nest instead and are skipped.
                    if let Some(resource) = attr_value(e, b"resource")? {
                        if let Some(parent) = curie_from_iri(&resource) {
                            state.parents.push(parent);
                        } else {
                            trace!(resource = %resource, "Skipping non-CURIE parent");
                        }
                    }
                }
                _ => {}
            }
            if self_closing {
                *pending_text = None;
            }
        }
    }
    Ok(())
}

/// Local part of a possibly-prefixed element name.
fn local_name(name: &[u8]) -> &[u8] {
    match name.iter().rposition(|&b| b == b':') {
        Some(pos) => &name[pos + 1..],
        None => name,
    }
}

/// Value of the attribute with the given local name, e.g. `rdf:about`.
fn attr_value(e: &BytesStart<'_>, local: &[u8]) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr.map_err(|err| Error::MalformedOntology(err.to_string()))?;
        if local_name(attr.key.as_ref()) == local {
            let value = attr
                .unescape_value()
                .map_err(|err| Error::MalformedOntology(err.to_string()))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

/// Convert an OBO PURL (`.../obo/HP_0001250`) to CURIE form (`HP:0001250`).
fn curie_from_iri(iri: &str) -> Option<String> {
    let fragment = iri.rsplit(['/', '#']).next()?;
    let (prefix, local) = fragment.split_once('_')?;
    if prefix.is_empty() || local.is_empty() {
        return None;
    }
    Some(format!("{}:{}", prefix, local))
}

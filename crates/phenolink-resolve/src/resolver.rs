//! Term resolution against the ontology index.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::trace;

use phenolink_core::{MatchStrategy, RawRecord, ResolvedTerm};
use phenolink_ontology::OntologyIndex;

/// Maps raw field values to ontology concepts.
///
/// Strategy order per field, first success wins: exact label/synonym match
/// (confidence 1.0), fuzzy match above the threshold (confidence = score),
/// unresolved (confidence 0.0). Unresolved is never an error here; the
/// resource builder decides whether it is acceptable.
pub struct Resolver {
    index: Arc<OntologyIndex>,
    threshold: f32,
}

impl Resolver {
    pub fn new(index: Arc<OntologyIndex>, threshold: f32) -> Self {
        Self {
            index,
            threshold: threshold.clamp(0.0, 1.0),
        }
    }

    /// Resolve the named fields of one record.
    ///
    /// Fields absent from the record produce no entry. Output is keyed and
    /// ordered by field name; identical `(record, index)` inputs always
    /// yield identical output.
    pub fn resolve(&self, record: &RawRecord, fields: &[String]) -> BTreeMap<String, ResolvedTerm> {
        let mut resolved = BTreeMap::new();

        for field in fields {
            let Some(raw) = record.get(field) else {
                continue;
            };
            let term = self.resolve_term(raw);
            trace!(
                row = record.row(),
                field = %field,
                strategy = %term.strategy,
                score = term.confidence,
                "Resolved term"
            );
            resolved.insert(field.clone(), term);
        }

        resolved
    }

    /// Resolve one raw value.
    pub fn resolve_term(&self, raw: &str) -> ResolvedTerm {
        if raw.trim().is_empty() {
            return ResolvedTerm::unresolved(raw);
        }

        if let Some(concept) = self.index.lookup(raw) {
            let strategy = if self.index.lookup_is_label(raw) {
                MatchStrategy::ExactLabel
            } else {
                MatchStrategy::ExactSynonym
            };
            return ResolvedTerm {
                raw: raw.to_string(),
                concept: Some(concept.to_ref()),
                strategy,
                confidence: 1.0,
            };
        }

        if let Some((concept, score)) = self.index.fuzzy_lookup(raw, self.threshold).first() {
            return ResolvedTerm {
                raw: raw.to_string(),
                concept: Some(concept.to_ref()),
                strategy: MatchStrategy::Fuzzy,
                confidence: *score,
            };
        }

        ResolvedTerm::unresolved(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use phenolink_core::OntologyConcept;

    fn sample_resolver(threshold: f32) -> Resolver {
        let index = OntologyIndex::from_concepts(vec![
            OntologyConcept {
                id: "HP:0001250".to_string(),
                label: "Seizure".to_string(),
                synonyms: vec!["Epileptic seizure".to_string()],
                parents: Vec::new(),
            },
            OntologyConcept {
                id: "HP:0002315".to_string(),
                label: "Headache".to_string(),
                synonyms: vec!["Cephalgia".to_string()],
                parents: Vec::new(),
            },
        ])
        .unwrap();
        Resolver::new(Arc::new(index), threshold)
    }

    fn record(fields: &[(&str, &str)]) -> RawRecord {
        RawRecord::new(
            1,
            fields
                .iter()
                .map(|(n, v)| (n.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn exact_label_match_wins() {
        let resolver = sample_resolver(0.85);
        let term = resolver.resolve_term("seizure");
        assert_eq!(term.strategy, MatchStrategy::ExactLabel);
        assert_eq!(term.confidence, 1.0);
        assert_eq!(term.concept.as_ref().unwrap().id, "HP:0001250");
    }

    #[test]
    fn exact_synonym_match_is_flagged() {
        let resolver = sample_resolver(0.85);
        let term = resolver.resolve_term("Cephalgia");
        assert_eq!(term.strategy, MatchStrategy::ExactSynonym);
        assert_eq!(term.confidence, 1.0);
        assert_eq!(term.concept.as_ref().unwrap().id, "HP:0002315");
    }

    #[test]
    fn fuzzy_match_carries_similarity_score() {
        let resolver = sample_resolver(0.85);
        let term = resolver.resolve_term("Siezure");
        assert_eq!(term.strategy, MatchStrategy::Fuzzy);
        assert!(term.confidence >= 0.85);
        assert!(term.confidence < 1.0);
        assert_eq!(term.concept.as_ref().unwrap().id, "HP:0001250");
    }

    #[test]
    fn unmatched_term_is_unresolved_not_error() {
        let resolver = sample_resolver(0.85);
        let term = resolver.resolve_term("completely unknown finding");
        assert_eq!(term.strategy, MatchStrategy::Unresolved);
        assert_eq!(term.confidence, 0.0);
        assert!(term.concept.is_none());
    }

    #[test]
    fn empty_value_is_unresolved() {
        let resolver = sample_resolver(0.85);
        let term = resolver.resolve_term("   ");
        assert_eq!(term.strategy, MatchStrategy::Unresolved);
    }

    #[test]
    fn resolve_covers_named_fields_only() {
        let resolver = sample_resolver(0.85);
        let rec = record(&[("phenotype", "Seizure"), ("notes", "irrelevant")]);
        let resolved = resolver.resolve(&rec, &["phenotype".to_string()]);
        assert_eq!(resolved.len(), 1);
        assert!(resolved.contains_key("phenotype"));
    }

    #[test]
    fn absent_fields_produce_no_entry() {
        let resolver = sample_resolver(0.85);
        let rec = record(&[("phenotype", "Seizure")]);
        let resolved = resolver.resolve(&rec, &["phenotype".to_string(), "finding".to_string()]);
        assert_eq!(resolved.len(), 1);
        assert!(!resolved.contains_key("finding"));
    }

    #[test]
    fn resolution_is_deterministic() {
        let resolver = sample_resolver(0.85);
        let rec = record(&[("phenotype", "Siezure"), ("finding", "Cephalgia")]);
        let fields = vec!["phenotype".to_string(), "finding".to_string()];

        let first = resolver.resolve(&rec, &fields);
        for _ in 0..10 {
            assert_eq!(resolver.resolve(&rec, &fields), first);
        }
    }

    #[test]
    fn threshold_gates_fuzzy_matches() {
        let strict = sample_resolver(0.99);
        let term = strict.resolve_term("Siezure");
        assert_eq!(term.strategy, MatchStrategy::Unresolved);
    }
}

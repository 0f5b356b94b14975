//! Canonical resource assembly.
//!
//! A pure function of the record and its resolved terms: no I/O, no clock,
//! no network. Deterministic by construction so it can be unit tested
//! independent of ontology or remote state.

use std::collections::{BTreeMap, BTreeSet};

use sha2::{Digest, Sha256};

use phenolink_core::{
    CanonicalResource, CodeableConcept, Error, RawRecord, ResolvedTerm, Result,
};

/// Fixed schema of the assembled resource.
#[derive(Debug, Clone)]
pub struct ResourceSchema {
    /// FHIR resource type emitted, e.g. `Condition`.
    pub resource_type: String,
    /// Record field holding the subject (patient) identifier.
    pub subject_field: String,
    /// Record fields resolved against the ontology, in emission order.
    pub term_fields: Vec<String>,
    /// Term fields that must resolve for the resource to be built.
    pub mandatory_fields: BTreeSet<String>,
    /// Terminology system URI stamped on codings.
    pub system: String,
    /// Short tag naming the source, folded into the resource identifier.
    pub source_tag: String,
}

impl ResourceSchema {
    pub fn new(subject_field: impl Into<String>, term_fields: Vec<String>) -> Self {
        Self {
            resource_type: "Condition".to_string(),
            subject_field: subject_field.into(),
            term_fields,
            mandatory_fields: BTreeSet::new(),
            system: "http://purl.obolibrary.org/obo/hp.owl".to_string(),
            source_tag: "phenolink".to_string(),
        }
    }

    pub fn with_mandatory_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mandatory_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_resource_type(mut self, resource_type: impl Into<String>) -> Self {
        self.resource_type = resource_type.into();
        self
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = system.into();
        self
    }

    pub fn with_source_tag(mut self, tag: impl Into<String>) -> Self {
        self.source_tag = tag.into();
        self
    }
}

/// Assembles [`CanonicalResource`]s from resolved records.
pub struct ResourceBuilder {
    schema: ResourceSchema,
}

impl ResourceBuilder {
    pub fn new(schema: ResourceSchema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &ResourceSchema {
        &self.schema
    }

    /// Build one resource.
    ///
    /// Fails with [`Error::SchemaViolation`] when the subject is missing or
    /// a mandatory coded field is unresolved; optional unresolved fields
    /// fall back to their free text.
    pub fn build(
        &self,
        record: &RawRecord,
        resolved: &BTreeMap<String, ResolvedTerm>,
    ) -> Result<CanonicalResource> {
        let subject = record
            .get(&self.schema.subject_field)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                Error::SchemaViolation(format!(
                    "row {}: missing subject field {}",
                    record.row(),
                    self.schema.subject_field
                ))
            })?;

        let mut codes = BTreeMap::new();
        for field in &self.schema.term_fields {
            let mandatory = self.schema.mandatory_fields.contains(field);
            match resolved.get(field) {
                Some(term) => match &term.concept {
                    Some(concept) => {
                        codes.insert(
                            field.clone(),
                            CodeableConcept::coded(
                                self.schema.system.clone(),
                                concept.id.clone(),
                                concept.label.clone(),
                            ),
                        );
                    }
                    None if mandatory => {
                        return Err(Error::SchemaViolation(format!(
                            "row {}: mandatory field {} unresolved (\"{}\")",
                            record.row(),
                            field,
                            term.raw
                        )));
                    }
                    None => {
                        if !term.raw.is_empty() {
                            codes.insert(field.clone(), CodeableConcept::text_only(&term.raw));
                        }
                    }
                },
                None if mandatory => {
                    return Err(Error::SchemaViolation(format!(
                        "row {}: mandatory field {} absent",
                        record.row(),
                        field
                    )));
                }
                None => {}
            }
        }

        Ok(CanonicalResource {
            resource_id: derive_resource_id(subject, record.row(), &self.schema.source_tag),
            resource_type: self.schema.resource_type.clone(),
            subject: subject.to_string(),
            codes,
            source_row: record.row(),
        })
    }
}

/// Client-assigned stable identifier for idempotent upserts.
///
/// Stable across retries and resumed runs over the same source, so the
/// remote repository can treat re-submission as an upsert.
pub fn derive_resource_id(subject: &str, row: u64, source_tag: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(subject.as_bytes());
    hasher.update(b"|");
    hasher.update(row.to_be_bytes());
    hasher.update(b"|");
    hasher.update(source_tag.as_bytes());
    hex::encode(hasher.finalize())[..32].to_string()
}

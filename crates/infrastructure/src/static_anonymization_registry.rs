//! Declaration table backing the anonymization metadata provider port.

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use scrubline_application::{AnonymizationDefaults, AnonymizationMetadataProvider};
use scrubline_core::{AppError, AppResult};
use scrubline_domain::{
    AnonymizableEntityDeclaration, AnonymizableFieldDeclaration, FieldType, RetentionPeriod,
};
use serde::Deserialize;
use serde_json::Value;


/// Anonymizable entity and field declarations held in memory.
#[derive(Debug, Clone, Default)]
pub struct StaticAnonymizationRegistry {
    entities: BTreeMap<String, AnonymizableEntityDeclaration>,
    fields: BTreeMap<String, Vec<AnonymizableFieldDeclaration>>,
    field_types: BTreeMap<(String, String), FieldType>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManifestDocument {
    defaults: ManifestDefaults,
    #[serde(default)]
    entities: Vec<ManifestEntity>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManifestDefaults {
    anonymize_after: String,
    #[serde(default)]
    anonymized_values: BTreeMap<String, Value>,
    #[serde(default)]
    fallback: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManifestEntity {
    logical_name: String,
    reference_date: String,
    #[serde(default)]
    reference_date_type: Option<String>,
    #[serde(default)]
    anonymize_after: Option<String>,
    #[serde(default)]
    fields: Vec<ManifestField>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManifestField {
    logical_name: String,
    #[serde(default)]
    field_type: Option<String>,
    #[serde(default)]
    anonymized_value: Option<Value>,
}

impl StaticAnonymizationRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares an entity type anonymizable.
    pub fn register_entity(&mut self, declaration: AnonymizableEntityDeclaration) -> AppResult<()> {
        let logical_name = declaration.logical_name().as_str().to_owned();
        if self.entities.contains_key(&logical_name) {
            return Err(AppError::Conflict(format!(
                "entity '{logical_name}' is already declared anonymizable"
            )));
        }

        self.fields.entry(logical_name.clone()).or_default();
        self.entities.insert(logical_name, declaration);
        Ok(())
    }

    /// Declares one anonymizable field of an already declared entity type.
    pub fn register_field(&mut self, declaration: AnonymizableFieldDeclaration) -> AppResult<()> {
        let entity_logical_name = declaration.entity_logical_name().as_str().to_owned();
        let field_logical_name = declaration.logical_name().as_str().to_owned();

        let Some(fields) = self.fields.get_mut(&entity_logical_name) else {
            return Err(AppError::NotFound(format!(
                "entity '{entity_logical_name}' must be declared before its field '{field_logical_name}'"
            )));
        };

        if fields
            .iter()
            .any(|field| field.logical_name().as_str() == field_logical_name)
        {
            return Err(AppError::Conflict(format!(
                "field '{field_logical_name}' of entity '{entity_logical_name}' is already declared anonymizable"
            )));
        }

        if let Some(field_type) = declaration.field_type() {
            self.field_types
                .insert((entity_logical_name, field_logical_name), field_type);
        }

        fields.push(declaration);
        Ok(())
    }

    /// Records the semantic type of a field that is not itself anonymizable.
    pub fn register_field_type(
        &mut self,
        entity_logical_name: &str,
        field_logical_name: &str,
        field_type: FieldType,
    ) {
        self.field_types.insert(
            (
                entity_logical_name.to_owned(),
                field_logical_name.to_owned(),
            ),
            field_type,
        );
    }

    /// Reads a JSON manifest file into a registry and engine defaults.
    pub async fn from_manifest_path(
        path: impl AsRef<Path>,
    ) -> AppResult<(Self, AnonymizationDefaults)> {
        let path = path.as_ref();
        let manifest = tokio::fs::read_to_string(path).await.map_err(|error| {
            AppError::Configuration(format!(
                "failed to read anonymization manifest '{}': {error}",
                path.display()
            ))
        })?;

        Self::from_manifest_json(manifest.as_str())
    }

    /// Parses a JSON manifest into a registry and engine defaults.
    pub fn from_manifest_json(manifest: &str) -> AppResult<(Self, AnonymizationDefaults)> {
        let document: ManifestDocument = serde_json::from_str(manifest).map_err(|error| {
            AppError::Configuration(format!("invalid anonymization manifest: {error}"))
        })?;

        let defaults = manifest_defaults(document.defaults)?;

        let mut registry = Self::new();
        for entity in document.entities {
            let anonymize_after = entity
                .anonymize_after
                .as_deref()
                .map(parse_retention_period)
                .transpose()?;

            registry.register_entity(
                AnonymizableEntityDeclaration::new(
                    entity.logical_name.as_str(),
                    entity.reference_date.as_str(),
                    anonymize_after,
                )
                .map_err(into_configuration_error)?,
            )?;

            if let Some(reference_date_type) = entity.reference_date_type.as_deref() {
                registry.register_field_type(
                    entity.logical_name.as_str(),
                    entity.reference_date.as_str(),
                    parse_field_type(reference_date_type)?,
                );
            }

            for field in entity.fields {
                let field_type = field
                    .field_type
                    .as_deref()
                    .map(parse_field_type)
                    .transpose()?;

                registry.register_field(
                    AnonymizableFieldDeclaration::new(
                        entity.logical_name.as_str(),
                        field.logical_name,
                        field_type,
                        field.anonymized_value,
                    )
                    .map_err(into_configuration_error)?,
                )?;
            }
        }

        Ok((registry, defaults))
    }
}

fn manifest_defaults(defaults: ManifestDefaults) -> AppResult<AnonymizationDefaults> {
    let mut resolved = AnonymizationDefaults::new(parse_retention_period(
        defaults.anonymize_after.as_str(),
    )?);

    for (field_type, value) in defaults.anonymized_values {
        let field_type = parse_field_type(field_type.as_str())?;
        if !value.is_null() {
            field_type
                .validate_value(&value)
                .map_err(into_configuration_error)?;
        }
        resolved = resolved.with_type_value(field_type, value);
    }

    if let Some(fallback) = defaults.fallback {
        resolved = resolved.with_fallback_value(fallback);
    }

    Ok(resolved)
}

fn parse_retention_period(value: &str) -> AppResult<RetentionPeriod> {
    RetentionPeriod::from_str(value).map_err(into_configuration_error)
}

fn parse_field_type(value: &str) -> AppResult<FieldType> {
    FieldType::from_str(value).map_err(into_configuration_error)
}

fn into_configuration_error(error: AppError) -> AppError {
    match error {
        AppError::Validation(message) => AppError::Configuration(message),
        other => other,
    }
}

#[async_trait]
impl AnonymizationMetadataProvider for StaticAnonymizationRegistry {
    async fn list_anonymizable_entities(&self) -> AppResult<Vec<String>> {
        Ok(self.entities.keys().cloned().collect())
    }

    async fn find_entity_declaration(
        &self,
        entity_logical_name: &str,
    ) -> AppResult<Option<AnonymizableEntityDeclaration>> {
        Ok(self.entities.get(entity_logical_name).cloned())
    }

    async fn list_anonymizable_fields(
        &self,
        entity_logical_name: &str,
    ) -> AppResult<Vec<AnonymizableFieldDeclaration>> {
        Ok(self
            .fields
            .get(entity_logical_name)
            .cloned()
            .unwrap_or_default())
    }

    async fn field_semantic_type(
        &self,
        entity_logical_name: &str,
        field_logical_name: &str,
    ) -> AppResult<Option<FieldType>> {
        Ok(self
            .field_types
            .get(&(
                entity_logical_name.to_owned(),
                field_logical_name.to_owned(),
            ))
            .copied())
    }
}

use std::collections::BTreeSet;
use std::sync::Arc;

use scrubline_core::{AppError, AppResult};
use scrubline_domain::{AnonymizationPolicy, AnonymizationPolicyInput, FieldMutation, FieldType};

use super::config::AnonymizationDefaults;
use crate::anonymization_ports::AnonymizationMetadataProvider;

/// Resolves anonymization policies from declarations and defaults.
#[derive(Clone)]
pub struct PolicyRegistry {
    metadata_provider: Arc<dyn AnonymizationMetadataProvider>,
    defaults: AnonymizationDefaults,
}

impl PolicyRegistry {
    /// Creates a registry over a metadata provider.
    #[must_use]
    pub fn new(
        metadata_provider: Arc<dyn AnonymizationMetadataProvider>,
        defaults: AnonymizationDefaults,
    ) -> Self {
        Self {
            metadata_provider,
            defaults,
        }
    }

    /// Returns the defaults used for resolution.
    #[must_use]
    pub fn defaults(&self) -> &AnonymizationDefaults {
        &self.defaults
    }

    /// Lists declared entity types that have at least one anonymizable field, sorted.
    pub async fn list_anonymizable_types(&self) -> AppResult<Vec<String>> {
        let declared: BTreeSet<String> = self
            .metadata_provider
            .list_anonymizable_entities()
            .await?
            .into_iter()
            .collect();

        let mut anonymizable = Vec::with_capacity(declared.len());
        for entity_logical_name in declared {
            let fields = self
                .metadata_provider
                .list_anonymizable_fields(entity_logical_name.as_str())
                .await?;
            if !fields.is_empty() {
                anonymizable.push(entity_logical_name);
            }
        }

        Ok(anonymizable)
    }

    /// Resolves the retention window and field mutations of one entity type.
    ///
    /// A declared entity without anonymizable fields resolves to a policy without
    /// mutations.
    pub async fn resolve_policy(
        &self,
        entity_logical_name: &str,
    ) -> AppResult<AnonymizationPolicy> {
        let declaration = self
            .metadata_provider
            .find_entity_declaration(entity_logical_name)
            .await?
            .ok_or_else(|| {
                AppError::Policy(format!(
                    "entity '{entity_logical_name}' is not declared anonymizable"
                ))
            })?;

        let retention_period = declaration
            .anonymize_after()
            .unwrap_or(self.defaults.retention_period())
            .clone();

        let reference_field_type = self
            .metadata_provider
            .field_semantic_type(entity_logical_name, declaration.reference_field().as_str())
            .await?
            .unwrap_or(FieldType::DateTime);

        let fields = self
            .metadata_provider
            .list_anonymizable_fields(entity_logical_name)
            .await?;

        let mut mutations = Vec::with_capacity(fields.len());
        for field in fields {
            let placeholder = match field.anonymized_value() {
                Some(value) => value.clone(),
                None => {
                    let field_type = self
                        .metadata_provider
                        .field_semantic_type(entity_logical_name, field.logical_name().as_str())
                        .await?;

                    self.defaults
                        .placeholder_for(field_type)
                        .cloned()
                        .ok_or_else(|| {
                            AppError::Configuration(format!(
                                "no anonymized value for field '{}' of entity '{}': no override, no default for type '{}' and no fallback",
                                field.logical_name(),
                                entity_logical_name,
                                field_type.map(|field_type| field_type.as_str()).unwrap_or("unknown")
                            ))
                        })?
                }
            };

            mutations.push(FieldMutation::new(field.logical_name().as_str(), placeholder)?);
        }

        AnonymizationPolicy::new(AnonymizationPolicyInput {
            entity_logical_name: declaration.logical_name().as_str().to_owned(),
            reference_field: declaration.reference_field().as_str().to_owned(),
            reference_field_type,
            retention_period,
            mutations,
        })
    }
}

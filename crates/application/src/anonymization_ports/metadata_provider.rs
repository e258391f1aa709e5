use async_trait::async_trait;
use scrubline_core::AppResult;
use scrubline_domain::{AnonymizableEntityDeclaration, AnonymizableFieldDeclaration, FieldType};

/// Declaration source describing which entity types and fields are anonymizable.
#[async_trait]
pub trait AnonymizationMetadataProvider: Send + Sync {
    /// Lists every entity type declared anonymizable, with or without fields.
    async fn list_anonymizable_entities(&self) -> AppResult<Vec<String>>;

    /// Returns the retention declaration of an entity type, if it is declared anonymizable.
    async fn find_entity_declaration(
        &self,
        entity_logical_name: &str,
    ) -> AppResult<Option<AnonymizableEntityDeclaration>>;

    /// Lists the anonymizable fields of an entity type in declaration order.
    async fn list_anonymizable_fields(
        &self,
        entity_logical_name: &str,
    ) -> AppResult<Vec<AnonymizableFieldDeclaration>>;

    /// Returns the declared semantic type of one field.
    async fn field_semantic_type(
        &self,
        entity_logical_name: &str,
        field_logical_name: &str,
    ) -> AppResult<Option<FieldType>>;

    /// Returns whether an entity type is declared anonymizable.
    async fn is_anonymizable(&self, entity_logical_name: &str) -> AppResult<bool> {
        Ok(self
            .find_entity_declaration(entity_logical_name)
            .await?
            .is_some())
    }
}

use crate::backend::Backend;
use crate::core::{Result, StoreError};
use crate::extended::ExtendedDataType;
use crate::provider::ExtensibilityProvider;
use crate::schema::{EntityTypeId, EntityTypeRegistry, FieldDef};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Longest native name the flat-table provider can store: the `Name`
/// column of the side table is part of the primary key.
pub const MAX_NATIVE_NAME_LEN: usize = 64;

lazy_static! {
    static ref NATIVE_NAME_RE: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
}

/// A dynamically declared, typed attribute of one entity type.
///
/// `(entity_type_id, native_name)` is the storage identity; the display
/// `name` is separately unique per entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtendedPropertyDef {
    pub entity_type_id: EntityTypeId,
    pub name: String,
    pub native_name: String,
    pub data_type: ExtendedDataType,
    pub size: Option<usize>,
    pub multi_value: bool,
}

impl ExtendedPropertyDef {
    /// Project the definition into a core-field shape, used by query
    /// construction. Scalar properties become plain fields, lookups a
    /// link-shaped field carrying the set name.
    pub fn entity_field(&self) -> FieldDef {
        let mut field = FieldDef::new(self.name.clone(), self.data_type.db_type())
            .column(self.native_name.clone());
        field.extended = true;
        field.size = self.size;
        if let ExtendedDataType::Lookup { set } = &self.data_type {
            field.link_set = Some(set.clone());
        }
        field
    }
}

/// Registry of extended property definitions across all entity types.
#[derive(Debug, Default)]
pub struct PropertyCatalog {
    registry: EntityTypeRegistry,
    properties: Vec<ExtendedPropertyDef>,
    lookups: Vec<String>,
}

impl PropertyCatalog {
    pub fn new(registry: EntityTypeRegistry) -> Self {
        Self {
            registry,
            properties: Vec::new(),
            lookups: Vec::new(),
        }
    }

    pub fn registry(&self) -> &EntityTypeRegistry {
        &self.registry
    }

    /// Check a native name for legality: identifier characters only, no
    /// leading digit, bounded length.
    pub fn validate_native_name(name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(StoreError::IllegalName(
                name.to_string(),
                "name is empty".to_string(),
            ));
        }
        if name.len() > MAX_NATIVE_NAME_LEN {
            return Err(StoreError::IllegalName(
                name.to_string(),
                format!("name exceeds {} characters", MAX_NATIVE_NAME_LEN),
            ));
        }
        if !NATIVE_NAME_RE.is_match(name) {
            return Err(StoreError::IllegalName(
                name.to_string(),
                "only alphanumerics and underscore are allowed, not leading with a digit"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Derive a legal, unused native name from a display name: strip
    /// illegal characters, prefix an underscore when the result would lead
    /// with a digit, then de-duplicate with a numeric suffix starting at 2.
    pub fn suggest_native_name(&self, entity_type_id: EntityTypeId, display_name: &str) -> String {
        let mut base: String = display_name
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
            .collect();
        if base.is_empty() {
            base.push('_');
        }
        if base.chars().next().is_some_and(|c| c.is_ascii_digit()) {
            base.insert(0, '_');
        }
        base.truncate(MAX_NATIVE_NAME_LEN);

        if self.by_native_name(entity_type_id, &base).is_none() {
            return base;
        }
        let mut suffix = 2usize;
        loop {
            // Leave room for the suffix so the candidate stays legal.
            let digits = format!("{}", suffix);
            let mut candidate = base.clone();
            candidate.truncate(MAX_NATIVE_NAME_LEN - digits.len());
            candidate.push_str(&digits);
            if self.by_native_name(entity_type_id, &candidate).is_none() {
                return candidate;
            }
            suffix += 1;
        }
    }

    /// Create and register an extended property definition.
    ///
    /// Validates display-name uniqueness, suggests and validates the
    /// native name, applies the default-size rule, and asks the provider
    /// to assert storage feasibility before registering.
    pub fn create_property(
        &mut self,
        provider: &dyn ExtensibilityProvider,
        entity_type_id: EntityTypeId,
        display_name: &str,
        data_type: ExtendedDataType,
        size: Option<usize>,
        multi_value: bool,
    ) -> Result<&ExtendedPropertyDef> {
        if display_name.trim().is_empty() {
            return Err(StoreError::InvalidArgument(
                "Property display name must not be empty".to_string(),
            ));
        }
        if !self.registry.contains(entity_type_id) {
            return Err(StoreError::EntityTypeNotFound(entity_type_id.to_string()));
        }
        if self.by_name(entity_type_id, display_name).is_some() {
            return Err(StoreError::InvalidArgument(format!(
                "Property '{}' already exists for entity type {}",
                display_name, entity_type_id
            )));
        }

        let native_name = self.suggest_native_name(entity_type_id, display_name);
        Self::validate_native_name(&native_name)?;

        let size = size.or_else(|| data_type.effective_size());
        // Lookups are stored one row per referenced value.
        let multi_value = multi_value || data_type.supports_multi_value();

        let def = ExtendedPropertyDef {
            entity_type_id,
            name: display_name.to_string(),
            native_name,
            data_type,
            size,
            multi_value,
        };
        provider.assert_property_feasible(&def)?;

        tracing::debug!(
            entity_type_id,
            name = %def.name,
            native_name = %def.native_name,
            "registered extended property"
        );
        self.properties.push(def);
        Ok(self.properties.last().unwrap())
    }

    /// Remove a property definition. Fails with the `PropertyInUse`
    /// conflict when the provider reports at least one stored value; the
    /// definition and the stored values are left intact in that case.
    pub fn delete_property(
        &mut self,
        provider: &dyn ExtensibilityProvider,
        backend: &mut dyn Backend,
        entity_type_id: EntityTypeId,
        name: &str,
    ) -> Result<()> {
        let position = self
            .properties
            .iter()
            .position(|p| p.entity_type_id == entity_type_id && p.name == name)
            .ok_or_else(|| {
                StoreError::InvalidArgument(format!(
                    "Property '{}' is not defined for entity type {}",
                    name, entity_type_id
                ))
            })?;

        let entity_type = self.registry.get(entity_type_id)?;
        let native_name = self.properties[position].native_name.clone();
        if provider.is_property_in_use(backend, &entity_type, &native_name)? {
            return Err(StoreError::PropertyInUse(name.to_string()));
        }

        self.properties.remove(position);
        Ok(())
    }

    pub fn by_name(&self, entity_type_id: EntityTypeId, name: &str) -> Option<&ExtendedPropertyDef> {
        self.properties
            .iter()
            .find(|p| p.entity_type_id == entity_type_id && p.name == name)
    }

    pub fn by_native_name(
        &self,
        entity_type_id: EntityTypeId,
        native_name: &str,
    ) -> Option<&ExtendedPropertyDef> {
        self.properties
            .iter()
            .find(|p| p.entity_type_id == entity_type_id && p.native_name == native_name)
    }

    pub fn properties_for(
        &self,
        entity_type_id: EntityTypeId,
    ) -> impl Iterator<Item = &ExtendedPropertyDef> {
        self.properties
            .iter()
            .filter(move |p| p.entity_type_id == entity_type_id)
    }

    pub fn lookups(&self) -> &[String] {
        &self.lookups
    }

    pub fn add_lookup(&mut self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(StoreError::InvalidArgument(
                "Lookup set name must not be empty".to_string(),
            ));
        }
        if !self.lookups.contains(&name) {
            self.lookups.push(name);
        }
        Ok(())
    }

    /// Replace the catalog content from a deserialized settings document.
    pub(crate) fn restore(
        &mut self,
        lookups: Vec<String>,
        properties: Vec<ExtendedPropertyDef>,
    ) {
        self.lookups = lookups;
        self.properties = properties;
    }

    pub(crate) fn snapshot(&self) -> (Vec<String>, Vec<ExtendedPropertyDef>) {
        (self.lookups.clone(), self.properties.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extended::ScalarKind;

    #[test]
    fn test_validate_native_name() {
        assert!(PropertyCatalog::validate_native_name("Priority").is_ok());
        assert!(PropertyCatalog::validate_native_name("_1stContact").is_ok());
        assert!(PropertyCatalog::validate_native_name("").is_err());
        assert!(PropertyCatalog::validate_native_name("1st").is_err());
        assert!(PropertyCatalog::validate_native_name("with space").is_err());
        assert!(PropertyCatalog::validate_native_name(&"x".repeat(65)).is_err());
    }

    #[test]
    fn test_suggest_strips_and_prefixes() {
        let catalog = PropertyCatalog::default();
        assert_eq!(catalog.suggest_native_name(1, "1st Contact!"), "_1stContact");
        assert_eq!(catalog.suggest_native_name(1, "Priority"), "Priority");
        assert_eq!(catalog.suggest_native_name(1, "!!!"), "_");
    }

    #[test]
    fn test_suggest_keeps_suffixed_names_within_length_limit() {
        let long = "x".repeat(MAX_NATIVE_NAME_LEN);
        let mut catalog = PropertyCatalog::default();
        catalog.properties.push(ExtendedPropertyDef {
            entity_type_id: 1,
            name: long.clone(),
            native_name: long.clone(),
            data_type: ExtendedDataType::scalar(ScalarKind::Integer),
            size: None,
            multi_value: false,
        });

        let suggested = catalog.suggest_native_name(1, &long);
        assert_eq!(suggested.len(), MAX_NATIVE_NAME_LEN);
        assert!(suggested.ends_with('2'));
        assert!(PropertyCatalog::validate_native_name(&suggested).is_ok());
    }

    #[test]
    fn test_entity_field_projection() {
        let scalar = ExtendedPropertyDef {
            entity_type_id: 1,
            name: "Priority".into(),
            native_name: "Priority".into(),
            data_type: ExtendedDataType::scalar(ScalarKind::Integer),
            size: None,
            multi_value: false,
        };
        let field = scalar.entity_field();
        assert!(field.extended);
        assert!(field.link_set.is_none());
        assert_eq!(field.db_type, crate::core::DbType::Int64);

        let lookup = ExtendedPropertyDef {
            data_type: ExtendedDataType::lookup("Priorities"),
            ..scalar
        };
        let field = lookup.entity_field();
        assert_eq!(field.link_set.as_deref(), Some("Priorities"));
    }
}

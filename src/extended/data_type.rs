use crate::core::{DbType, Result, StoreError};
use serde::{Deserialize, Serialize};

/// Default size given to string-typed extended properties that declare
/// none. Matches the `String` column width of the side table.
pub const DEFAULT_STRING_SIZE: usize = 2048;

/// Identity prefix baked into serialized data-type ids. The settings
/// document stays self-describing without any runtime type loading: ids
/// resolve back through the closed match in `ExtendedDataType::from_id`.
const TYPE_ASSEMBLY: &str = "Flexstore.Extended";

const SCALAR_TYPE_NAME: &str = "ScalarDataType";
const LOOKUP_TYPE_NAME: &str = "LookupDataType";

/// Primitive kinds an extended property can carry directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarKind {
    Boolean,
    String,
    DateTime,
    Integer,
    Decimal,
}

impl ScalarKind {
    pub const ALL: [ScalarKind; 5] = [
        Self::Boolean,
        Self::String,
        Self::DateTime,
        Self::Integer,
        Self::Decimal,
    ];

    pub fn db_type(self) -> DbType {
        match self {
            Self::Boolean => DbType::Boolean,
            Self::String => DbType::String,
            Self::DateTime => DbType::DateTime,
            Self::Integer => DbType::Int64,
            Self::Decimal => DbType::Decimal,
        }
    }

    /// Default size rule: strings default to the provider maximum, other
    /// kinds are unsized.
    pub fn default_size(self) -> Option<usize> {
        match self {
            Self::String => Some(DEFAULT_STRING_SIZE),
            _ => None,
        }
    }

    fn token(self) -> &'static str {
        match self {
            Self::Boolean => "Boolean",
            Self::String => "String",
            Self::DateTime => "DateTime",
            Self::Integer => "Integer",
            Self::Decimal => "Decimal",
        }
    }

    fn from_token(token: &str) -> Option<Self> {
        match token {
            "Boolean" => Some(Self::Boolean),
            "String" => Some(Self::String),
            "DateTime" => Some(Self::DateTime),
            "Integer" => Some(Self::Integer),
            "Decimal" => Some(Self::Decimal),
            _ => None,
        }
    }
}

/// Logical data type of an extended property. A closed sum type: the side
/// table has exactly five value columns, so open extensibility buys
/// nothing and exhaustive matching catches drift.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtendedDataType {
    Scalar { kind: ScalarKind, size: Option<usize> },

    /// Reference into a named lookup set. Surfaces as an integer key and
    /// always supports multiple values per entity.
    Lookup { set: String },
}

impl ExtendedDataType {
    pub fn scalar(kind: ScalarKind) -> Self {
        Self::Scalar { kind, size: None }
    }

    pub fn lookup(set: impl Into<String>) -> Self {
        Self::Lookup { set: set.into() }
    }

    pub fn db_type(&self) -> DbType {
        match self {
            Self::Scalar { kind, .. } => kind.db_type(),
            Self::Lookup { .. } => DbType::Int64,
        }
    }

    pub fn supports_multi_value(&self) -> bool {
        matches!(self, Self::Lookup { .. })
    }

    /// Effective declared size after applying the default-size rule.
    pub fn effective_size(&self) -> Option<usize> {
        match self {
            Self::Scalar { kind, size } => size.or_else(|| kind.default_size()),
            Self::Lookup { .. } => None,
        }
    }

    /// Serialized identity: `"<variant type>, <assembly>|<specific id>"`.
    /// This is the string the settings document stores in its `Type`
    /// attribute.
    pub fn id(&self) -> String {
        match self {
            Self::Scalar { kind, .. } => {
                format!("{}, {}|{}", SCALAR_TYPE_NAME, TYPE_ASSEMBLY, kind.token())
            }
            Self::Lookup { set } => {
                format!("{}, {}|{}", LOOKUP_TYPE_NAME, TYPE_ASSEMBLY, set)
            }
        }
    }

    /// Reverse factory for serialized ids.
    pub fn from_id(id: &str) -> Result<Self> {
        let (type_part, specific) = id.split_once('|').ok_or_else(|| {
            StoreError::Settings(format!("Malformed data type id '{}'", id))
        })?;
        let type_name = type_part.split(',').next().unwrap_or("").trim();
        match type_name {
            SCALAR_TYPE_NAME => {
                let kind = ScalarKind::from_token(specific).ok_or_else(|| {
                    StoreError::Settings(format!("Unknown scalar kind '{}'", specific))
                })?;
                Ok(Self::Scalar { kind, size: None })
            }
            LOOKUP_TYPE_NAME => {
                if specific.is_empty() {
                    return Err(StoreError::Settings(
                        "Lookup data type id carries no set name".to_string(),
                    ));
                }
                Ok(Self::Lookup {
                    set: specific.to_string(),
                })
            }
            other => Err(StoreError::Settings(format!(
                "Unknown data type '{}' in id '{}'",
                other, id
            ))),
        }
    }
}

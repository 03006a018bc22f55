//! # Model Configuration
//!
//! The immutable per-model configuration record: backing column family,
//! identity-key attribute, ordered attribute declarations, and the derived
//! write mode. Built once at model registration and never mutated.

use crate::mutation::WriteMode;
use crate::WiderowError;

/// Identity-key attribute name used when a model declares none.
pub const DEFAULT_KEY_ATTRIBUTE: &str = "key";

// =============================================================================
// ATTRIBUTE DECLARATIONS
// =============================================================================

/// Kind of a declared attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrKind {
    /// A single scalar column.
    Scalar,
    /// A super-column group of sub-columns.
    Group,
}

/// One declared attribute: name plus kind. Declaration order is the order
/// attributes appear in write projections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeSpec {
    /// Attribute name.
    pub name: String,
    /// Scalar column or super-column group.
    pub kind: AttrKind,
}

impl AttributeSpec {
    /// Declare a scalar attribute.
    #[must_use]
    pub fn scalar(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: AttrKind::Scalar,
        }
    }

    /// Declare a grouped (super-column) attribute.
    #[must_use]
    pub fn group(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: AttrKind::Group,
        }
    }
}

// =============================================================================
// MODEL CONFIG
// =============================================================================

/// Immutable configuration for one registered model type.
///
/// The write mode is fixed by the kind of the first declared non-key
/// attribute; a model never mixes scalar and grouped attributes. The key
/// attribute is always scalar, is auto-declared when absent, and addresses
/// the row instead of appearing in write projections.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    column_family: String,
    key_attribute: String,
    attributes: Vec<AttributeSpec>,
    write_mode: WriteMode,
}

impl ModelConfig {
    /// Build a validated configuration.
    ///
    /// Validation:
    /// - column family and attribute names must be non-empty
    /// - attribute names must be unique
    /// - the key attribute, when declared, must be scalar
    /// - all non-key attributes must share one kind
    pub fn new(
        column_family: impl Into<String>,
        key_attribute: Option<String>,
        mut attributes: Vec<AttributeSpec>,
    ) -> Result<Self, WiderowError> {
        let column_family = column_family.into();
        if column_family.is_empty() {
            return Err(WiderowError::InvalidArgument(
                "column family name must be non-empty".into(),
            ));
        }

        let key_attribute = key_attribute.unwrap_or_else(|| DEFAULT_KEY_ATTRIBUTE.to_string());
        if key_attribute.is_empty() {
            return Err(WiderowError::InvalidArgument(
                "key attribute name must be non-empty".into(),
            ));
        }

        for (i, spec) in attributes.iter().enumerate() {
            if spec.name.is_empty() {
                return Err(WiderowError::InvalidArgument(
                    "attribute names must be non-empty".into(),
                ));
            }
            if attributes[..i].iter().any(|prior| prior.name == spec.name) {
                return Err(WiderowError::InvalidArgument(format!(
                    "duplicate attribute declaration '{}'",
                    spec.name
                )));
            }
        }

        if let Some(key_spec) = attributes.iter().find(|s| s.name == key_attribute) {
            if key_spec.kind != AttrKind::Scalar {
                return Err(WiderowError::InvalidArgument(format!(
                    "key attribute '{key_attribute}' must be scalar"
                )));
            }
        } else {
            attributes.push(AttributeSpec::scalar(key_attribute.clone()));
        }

        // Mode is set by the first declared non-key attribute; the key
        // addresses the row and does not participate.
        let mut non_key = attributes.iter().filter(|s| s.name != key_attribute);
        let write_mode = match non_key.next().map(|s| s.kind) {
            Some(AttrKind::Group) => WriteMode::Grouped,
            _ => WriteMode::Flat,
        };
        let expected = match write_mode {
            WriteMode::Flat => AttrKind::Scalar,
            WriteMode::Grouped => AttrKind::Group,
        };
        if let Some(mixed) = non_key.find(|s| s.kind != expected) {
            return Err(WiderowError::InvalidArgument(format!(
                "attribute '{}' mixes scalar and grouped kinds in one model",
                mixed.name
            )));
        }

        Ok(Self {
            column_family,
            key_attribute,
            attributes,
            write_mode,
        })
    }

    /// Backing column family name.
    #[must_use]
    pub fn column_family(&self) -> &str {
        &self.column_family
    }

    /// Identity-key attribute name.
    #[must_use]
    pub fn key_attribute(&self) -> &str {
        &self.key_attribute
    }

    /// Declared attributes in declaration order (key attribute included).
    #[must_use]
    pub fn attributes(&self) -> &[AttributeSpec] {
        &self.attributes
    }

    /// The fixed write strategy for this model.
    #[must_use]
    pub fn write_mode(&self) -> WriteMode {
        self.write_mode
    }

    /// Look up a declaration by name.
    #[must_use]
    pub fn spec(&self, name: &str) -> Option<&AttributeSpec> {
        self.attributes.iter().find(|s| s.name == name)
    }

    /// Check whether an attribute is declared.
    #[must_use]
    pub fn is_declared(&self, name: &str) -> bool {
        self.spec(name).is_some()
    }
}

// =============================================================================
// TESTS
// =============================================================================

pub mod condition;
pub mod field;
pub mod form;

use serde::{Deserialize, Deserializer};

pub use condition::{Condition, ConditionalLogic, Operator};
pub use field::{
    FieldDefinition, FieldOptions, FieldType, FieldWidth, SelectOption, ValidationRules,
};
pub use form::{
    ButtonStyle, DEFAULT_CONSENT_TEXT, FormDefinition, FormDesign, FormLayout, FormSettings,
    FormStep,
};

/// Reads an explicit `null` as the type's default, same as a missing key.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

use std::collections::{BTreeMap, BTreeSet};

use crate::condition::ValueSnapshot;
use crate::spec::field::FieldDefinition;

/// Field name to current visibility.
pub type VisibilityMap = BTreeMap<String, bool>;

/// `show_if` decides when present; otherwise `hide_if` is negated; otherwise visible.
pub fn is_visible(field: &FieldDefinition, values: &ValueSnapshot) -> bool {
    let Some(logic) = &field.conditional_logic else {
        return true;
    };
    if let Some(show_if) = &logic.show_if {
        return show_if.evaluate(values);
    }
    if let Some(hide_if) = &logic.hide_if {
        return !hide_if.evaluate(values);
    }
    true
}

/// Static `required` OR'd with `required_if`; the condition can only add requiredness.
pub fn is_required(field: &FieldDefinition, values: &ValueSnapshot) -> bool {
    if field.required {
        return true;
    }
    field
        .conditional_logic
        .as_ref()
        .and_then(|logic| logic.required_if.as_ref())
        .is_some_and(|condition| condition.evaluate(values))
}

/// Active fields that are currently visible, in input order.
pub fn visible_fields<'a, I>(fields: I, values: &ValueSnapshot) -> Vec<&'a FieldDefinition>
where
    I: IntoIterator<Item = &'a FieldDefinition>,
{
    fields
        .into_iter()
        .filter(|field| field.is_active && is_visible(field, values))
        .collect()
}

/// Names of active fields that are currently required.
pub fn required_names<'a, I>(fields: I, values: &ValueSnapshot) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a FieldDefinition>,
{
    fields
        .into_iter()
        .filter(|field| field.is_active && is_required(field, values))
        .map(|field| field.name.clone())
        .collect()
}

pub fn resolve_visibility<'a, I>(fields: I, values: &ValueSnapshot) -> VisibilityMap
where
    I: IntoIterator<Item = &'a FieldDefinition>,
{
    fields
        .into_iter()
        .filter(|field| field.is_active)
        .map(|field| (field.name.clone(), is_visible(field, values)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn field(value: Value) -> FieldDefinition {
        serde_json::from_value(value).expect("field")
    }

    fn snapshot(value: Value) -> ValueSnapshot {
        value.as_object().cloned().unwrap_or_default()
    }

    fn state_field() -> FieldDefinition {
        field(json!({
            "id": "f-state",
            "name": "state",
            "field_type": "state",
            "label": "State",
            "required": false,
            "conditional_logic": {
                "required_if": { "field_name": "country", "operator": "equals", "value": "US" }
            }
        }))
    }

    #[test]
    fn required_if_adds_requiredness() {
        let state = state_field();
        assert!(!is_required(&state, &ValueSnapshot::new()));
        assert!(is_required(&state, &snapshot(json!({ "country": "US" }))));
        assert!(!is_required(&state, &snapshot(json!({ "country": "CA" }))));
    }

    #[test]
    fn required_if_never_removes_static_requirement() {
        let mut state = state_field();
        state.required = true;
        assert!(is_required(&state, &snapshot(json!({ "country": "CA" }))));
    }

    #[test]
    fn show_if_takes_precedence_over_hide_if() {
        let both = field(json!({
            "id": "f1",
            "name": "details",
            "field_type": "text",
            "conditional_logic": {
                "show_if": { "field_name": "more", "operator": "equals", "value": "yes" },
                "hide_if": { "field_name": "more", "operator": "equals", "value": "yes" }
            }
        }));
        let values = snapshot(json!({ "more": "yes" }));
        assert!(is_visible(&both, &values));
        assert!(!is_visible(&both, &ValueSnapshot::new()));
    }

    #[test]
    fn hide_if_negates() {
        let hidden = field(json!({
            "id": "f1",
            "name": "reason",
            "field_type": "text",
            "conditional_logic": {
                "hide_if": { "field_name": "happy", "operator": "equals", "value": true }
            }
        }));
        assert!(!is_visible(&hidden, &snapshot(json!({ "happy": true }))));
        assert!(is_visible(&hidden, &snapshot(json!({ "happy": false }))));
    }

    #[test]
    fn inactive_fields_are_excluded() {
        let mut inactive = state_field();
        inactive.is_active = false;
        inactive.required = true;
        let fields = vec![inactive];
        let values = ValueSnapshot::new();
        assert!(visible_fields(&fields, &values).is_empty());
        assert!(required_names(&fields, &values).is_empty());
        assert!(resolve_visibility(&fields, &values).is_empty());
    }

    #[test]
    fn visibility_is_idempotent_and_pure() {
        let fields = vec![state_field()];
        let values = snapshot(json!({ "country": "US" }));
        let before = values.clone();
        let first = resolve_visibility(&fields, &values);
        let second = resolve_visibility(&fields, &values);
        assert_eq!(first, second);
        assert_eq!(values, before);
    }
}

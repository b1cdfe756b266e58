use std::borrow::Cow;
use std::collections::BTreeSet;

use crate::condition::ValueSnapshot;
use crate::spec::field::FieldDefinition;
use crate::spec::form::{FormDefinition, FormLayout, FormStep};
use crate::visibility::is_visible;

pub const IMPLICIT_STEP_ID: &str = "default";

/// A step together with the fields it currently shows.
#[derive(Debug, Clone)]
pub struct StepView<'a> {
    pub index: usize,
    pub step: Cow<'a, FormStep>,
    pub fields: Vec<&'a FieldDefinition>,
}

/// Declared steps sorted by `display_order`, or empty for single-step forms.
pub fn ordered_steps(form: &FormDefinition) -> Vec<&FormStep> {
    let mut steps: Vec<&FormStep> = form
        .declared_steps()
        .map(|steps| steps.iter().collect())
        .unwrap_or_default();
    steps.sort_by_key(|step| step.display_order);
    steps
}

fn implicit_step(form: &FormDefinition) -> FormStep {
    FormStep {
        id: IMPLICIT_STEP_ID.to_string(),
        name: form.name.clone(),
        description: form.description.clone(),
        field_ids: form.active_fields().iter().map(|field| field.id.clone()).collect(),
        display_order: 0,
    }
}

/// The step definition at `index`; single-step forms expose one implicit step.
pub fn step_at(form: &FormDefinition, index: usize) -> Option<Cow<'_, FormStep>> {
    let steps = ordered_steps(form);
    if steps.is_empty() {
        return (index == 0).then(|| Cow::Owned(implicit_step(form)));
    }
    steps.get(index).map(|step| Cow::Borrowed(*step))
}

/// Active member fields of a step in `display_order`, regardless of visibility.
pub fn step_members(form: &FormDefinition, index: usize) -> Vec<&FieldDefinition> {
    let steps = ordered_steps(form);
    if steps.is_empty() {
        return if index == 0 { form.active_fields() } else { Vec::new() };
    }
    let Some(step) = steps.get(index) else {
        return Vec::new();
    };
    let ids: BTreeSet<&str> = step.field_ids.iter().map(String::as_str).collect();
    form.active_fields()
        .into_iter()
        .filter(|field| ids.contains(field.id.as_str()))
        .collect()
}

/// Active and currently visible members of a step.
pub fn visible_step_fields<'a>(
    form: &'a FormDefinition,
    index: usize,
    values: &ValueSnapshot,
) -> Vec<&'a FieldDefinition> {
    step_members(form, index)
        .into_iter()
        .filter(|field| is_visible(field, values))
        .collect()
}

/// Every step in order with its visible fields. Empty steps are kept.
pub fn steps_for<'a>(form: &'a FormDefinition, values: &ValueSnapshot) -> Vec<StepView<'a>> {
    (0..form.total_steps())
        .filter_map(|index| {
            step_at(form, index).map(|step| StepView {
                index,
                step,
                fields: visible_step_fields(form, index, values),
            })
        })
        .collect()
}

/// Rounded completion percentage shown next to the step indicator.
pub fn progress_percent(current: usize, total: usize) -> u8 {
    if total <= 1 {
        return 100;
    }
    let ratio = (current as f64 + 1.0) / total as f64;
    (ratio * 100.0).round().clamp(0.0, 100.0) as u8
}

/// Groups fields into rows for the given layout.
pub fn layout_rows<'a>(
    fields: &[&'a FieldDefinition],
    layout: FormLayout,
) -> Vec<Vec<&'a FieldDefinition>> {
    match layout {
        FormLayout::TwoColumn => pack_rows(fields.iter().copied(), |field| field.width.fraction()),
        FormLayout::Vertical | FormLayout::Horizontal => {
            fields.iter().map(|field| vec![*field]).collect()
        }
    }
}

/// Greedy first-fit packing of fractional widths into rows of width 1.
///
/// Items of width `>= 1` always sit alone. Otherwise an item that would push
/// the running width past 1 starts a new row. Order is never changed.
pub fn pack_rows<T>(items: impl IntoIterator<Item = T>, width: impl Fn(&T) -> f64) -> Vec<Vec<T>> {
    let mut rows = Vec::new();
    let mut current: Vec<T> = Vec::new();
    let mut current_width = 0.0;

    for item in items {
        let item_width = width(&item);
        if item_width >= 1.0 {
            if !current.is_empty() {
                rows.push(std::mem::take(&mut current));
                current_width = 0.0;
            }
            rows.push(vec![item]);
            continue;
        }

        if current_width + item_width > 1.0 {
            rows.push(std::mem::take(&mut current));
            current.push(item);
            current_width = item_width;
        } else {
            current.push(item);
            current_width += item_width;
        }
    }

    if !current.is_empty() {
        rows.push(current);
    }
    rows
}

//! Dynamic checklist rendering driven by a template's item list.

use std::collections::BTreeMap;

use super::html::escape;
use crate::model::{ChecklistAnswer, ChecklistItem, ChecklistKind, ChecklistResults};

fn field_name(item: &ChecklistItem) -> String {
    format!("checklist-item-{}", escape(&item.id))
}

fn text_value(answer: Option<&ChecklistAnswer>) -> String {
    answer.map(|a| escape(&a.as_text())).unwrap_or_default()
}

fn render_item(item: &ChecklistItem, answer: Option<&ChecklistAnswer>, disabled: bool) -> String {
    let required = if item.required {
        r#"<span class="required">*</span>"#
    } else {
        ""
    };
    let name = field_name(item);
    let id = escape(&item.id);
    let label = escape(&item.label);
    let off = if disabled { " disabled" } else { "" };
    let placeholder = escape(item.placeholder.as_deref().unwrap_or(""));

    let input = match item.kind {
        ChecklistKind::Checkbox => {
            let checked = match answer {
                Some(ChecklistAnswer::Flag(true)) => " checked",
                Some(ChecklistAnswer::Text(t)) if t == "true" => " checked",
                _ => "",
            };
            format!(
                r#"<label class="checkbox-label"><input type="checkbox" name="{name}" data-item-id="{id}"{checked}{off}><span class="checkbox-text">{label}{required}</span></label>"#
            )
        }
        ChecklistKind::Radio => {
            let current = answer.map(ChecklistAnswer::as_text);
            let options = item
                .options
                .iter()
                .map(|option| {
                    let checked = if current.as_deref() == Some(option.as_str()) {
                        " checked"
                    } else {
                        ""
                    };
                    let option = escape(option);
                    format!(
                        r#"<label class="radio-label"><input type="radio" name="{name}" value="{option}" data-item-id="{id}"{checked}{off}><span>{option}</span></label>"#
                    )
                })
                .collect::<String>();
            format!(
                r#"<div class="radio-group"><label class="radio-group-label">{label}{required}</label>{options}</div>"#
            )
        }
        ChecklistKind::Text => format!(
            r#"<label class="text-label"><span>{label}{required}</span><input type="text" name="{name}" data-item-id="{id}" placeholder="{placeholder}" value="{}" class="text-input"{off}></label>"#,
            text_value(answer)
        ),
        ChecklistKind::Number => {
            let min = item.min.unwrap_or(0.0);
            let max = item.max.map(|m| m.to_string()).unwrap_or_default();
            format!(
                r#"<label class="text-label"><span>{label}{required}</span><input type="number" name="{name}" data-item-id="{id}" placeholder="{placeholder}" value="{}" min="{min}" max="{max}" class="text-input"{off}></label>"#,
                text_value(answer)
            )
        }
        ChecklistKind::Textarea => format!(
            r#"<label class="textarea-label"><span>{label}{required}</span><textarea name="{name}" data-item-id="{id}" placeholder="{placeholder}" class="textarea-input" rows="3"{off}>{}</textarea></label>"#,
            text_value(answer)
        ),
        ChecklistKind::Select => {
            let current = answer.map(ChecklistAnswer::as_text);
            let options = item
                .options
                .iter()
                .map(|option| {
                    let selected = if current.as_deref() == Some(option.as_str()) {
                        " selected"
                    } else {
                        ""
                    };
                    let option = escape(option);
                    format!(r#"<option value="{option}"{selected}>{option}</option>"#)
                })
                .collect::<String>();
            format!(
                r#"<label class="select-label"><span>{label}{required}</span><select name="{name}" data-item-id="{id}" class="select-input"{off}><option value="">Seçiniz...</option>{options}</select></label>"#
            )
        }
        ChecklistKind::Unsupported => {
            format!("<p>Desteklenmeyen item tipi: {label}</p>")
        }
    };

    let class = if item.required {
        "checklist-item required-item"
    } else {
        "checklist-item"
    };
    format!(r#"<div class="{class}" data-item-id="{id}">{input}</div>"#)
}

/// Editable checklist, prefilled from `results`.
pub fn render(items: &[ChecklistItem], results: &ChecklistResults) -> String {
    render_with(items, results, false)
}

/// Same markup with every input disabled (completed records).
pub fn render_disabled(items: &[ChecklistItem], results: &ChecklistResults) -> String {
    render_with(items, results, true)
}

fn render_with(items: &[ChecklistItem], results: &ChecklistResults, disabled: bool) -> String {
    if items.is_empty() {
        return r#"<p class="no-data">Checklist tanımlanmamış.</p>"#.to_string();
    }
    let body = items
        .iter()
        .map(|item| render_item(item, results.get(&item.id), disabled))
        .collect::<String>();
    format!(r#"<div class="checklist">{body}</div>"#)
}

/// Read-only label/value listing.
pub fn render_results(items: &[ChecklistItem], results: &ChecklistResults) -> String {
    if items.is_empty() {
        return r#"<p class="no-data">Checklist sonuçları bulunamadı.</p>"#.to_string();
    }
    let rows = items
        .iter()
        .map(|item| {
            let answer = results.get(&item.id);
            let value = match (item.kind, answer) {
                (ChecklistKind::Checkbox, Some(a)) if a.is_filled() && a.as_text() == "true" => {
                    "✅ Evet".to_string()
                }
                (ChecklistKind::Checkbox, _) => "❌ Hayır".to_string(),
                (_, Some(a)) => escape(&a.as_text()),
                (_, None) => "-".to_string(),
            };
            format!(
                r#"<div class="checklist-result-item"><span class="result-label">{}:</span><span class="result-value">{value}</span></div>"#,
                escape(&item.label)
            )
        })
        .collect::<String>();
    format!(r#"<div class="checklist-results">{rows}</div>"#)
}

/// One message per required item left blank.
pub fn validate(items: &[ChecklistItem], results: &ChecklistResults) -> Vec<String> {
    items
        .iter()
        .filter(|item| item.required)
        .filter(|item| !results.get(&item.id).is_some_and(ChecklistAnswer::is_filled))
        .map(|item| format!("{} zorunludur", item.label.trim()))
        .collect()
}

/// Turns raw form values (keyed by item id) into typed answers. Unticked
/// checkboxes answer `false`; blank inputs are left out.
pub fn collect(items: &[ChecklistItem], form: &BTreeMap<String, String>) -> ChecklistResults {
    let mut results = ChecklistResults::new();
    for item in items {
        let raw = form.get(&item.id).map(|v| v.trim());
        let answer = match (item.kind, raw) {
            (ChecklistKind::Checkbox, raw) => Some(ChecklistAnswer::Flag(matches!(
                raw,
                Some("true" | "on" | "1")
            ))),
            (_, None | Some("")) => None,
            (ChecklistKind::Number, Some(v)) => Some(
                v.parse::<f64>()
                    .map(ChecklistAnswer::Number)
                    .unwrap_or_else(|_| ChecklistAnswer::Text(v.to_string())),
            ),
            (_, Some(v)) => Some(ChecklistAnswer::Text(v.to_string())),
        };
        if let Some(answer) = answer {
            results.insert(item.id.clone(), answer);
        }
    }
    results
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn items() -> Vec<ChecklistItem> {
        serde_json::from_value(json!([
            {"id": "oil", "type": "checkbox", "label": "Yağ kontrolü", "required": true},
            {"id": "state", "type": "radio", "label": "Durum", "required": true, "options": ["İyi", "Kötü"]},
            {"id": "temp", "type": "number", "label": "Sıcaklık", "min": 10},
            {"id": "note", "type": "textarea", "label": "Not"}
        ]))
        .expect("items")
    }

    #[test]
    fn renders_each_kind_and_prefills() {
        let results = ChecklistResults::from([
            ("oil".to_string(), ChecklistAnswer::Flag(true)),
            ("state".to_string(), ChecklistAnswer::Text("Kötü".to_string())),
        ]);
        let html = render(&items(), &results);
        assert!(html.contains(r#"type="checkbox" name="checklist-item-oil" data-item-id="oil" checked"#));
        assert!(html.contains(r#"value="Kötü" data-item-id="state" checked"#));
        assert!(html.contains(r#"min="10""#));
        assert!(!html.contains("disabled"));
        assert!(render_disabled(&items(), &results).contains(" disabled"));
        assert!(render(&[], &results).contains("Checklist tanımlanmamış."));
    }

    #[test]
    fn required_items_must_be_answered() {
        let form = BTreeMap::from([("temp".to_string(), "42.5".to_string())]);
        let results = collect(&items(), &form);
        assert_eq!(results["oil"], ChecklistAnswer::Flag(false));
        assert_eq!(results["temp"], ChecklistAnswer::Number(42.5));
        assert!(!results.contains_key("note"));
        assert_eq!(
            validate(&items(), &results),
            vec!["Yağ kontrolü zorunludur", "Durum zorunludur"]
        );
    }

    #[test]
    fn results_view_shows_yes_no_and_dash() {
        let results = ChecklistResults::from([("oil".to_string(), ChecklistAnswer::Flag(true))]);
        let html = render_results(&items(), &results);
        assert!(html.contains("✅ Evet"));
        assert!(html.contains(r#"<span class="result-label">Not:</span><span class="result-value">-</span>"#));
        assert!(render_results(&[], &results).contains("Checklist sonuçları bulunamadı."));
    }
}

//! Questionnaire schema extraction from the XFA template packet.
//!
//! Walks the template's `<field>` elements into typed questions and turns
//! `<event activity="...">` children into control-flow rules. Script text
//! is preserved verbatim, never interpreted.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::Serialize;
use std::collections::BTreeMap;

use super::packets::find_packet;
use crate::document::Document;
use crate::error::{Error, Result};

/// Closed set of question types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionType {
    /// Single-line text input
    Text,
    /// Multi-line text input
    Textarea,
    /// Radio button group
    Radio,
    /// Checkbox
    Checkbox,
    /// Choice list / dropdown
    Select,
    /// Numeric input
    Number,
    /// Date input
    Date,
    /// Email input
    Email,
    /// Push button
    Button,
    /// Signature field
    Signature,
}

impl QuestionType {
    /// Map an XFA field type or UI hint name; unknown names become text.
    pub fn from_xfa_name(name: &str) -> Self {
        match name {
            "textEdit" | "text" => QuestionType::Text,
            "textarea" => QuestionType::Textarea,
            "radioButton" | "radio" => QuestionType::Radio,
            "checkButton" | "checkbox" => QuestionType::Checkbox,
            "choiceList" | "select" => QuestionType::Select,
            "numericEdit" | "numeric" | "number" => QuestionType::Number,
            "dateTimeEdit" | "date" => QuestionType::Date,
            "email" => QuestionType::Email,
            "button" => QuestionType::Button,
            "signature" => QuestionType::Signature,
            _ => QuestionType::Text,
        }
    }
}

/// Validation constraints from a `<validate>` child.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Validation {
    /// Picture clause from `<formatTest>`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format_test: Option<String>,
    /// Script body from `<scriptTest>`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script_test: Option<String>,
    /// User-facing message from `<messageText>`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Picture pattern from a child `<pattern>`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

impl Validation {
    fn is_empty(&self) -> bool {
        self.format_test.is_none()
            && self.script_test.is_none()
            && self.message.is_none()
            && self.pattern.is_none()
    }
}

/// One typed question extracted from the template.
#[derive(Debug, Clone, Serialize)]
pub struct Question {
    /// Field name attribute
    pub name: String,
    /// Caption or label text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Description or tooltip
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Question type
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    /// `required="1"`
    pub required: bool,
    /// `access="readOnly"`
    pub read_only: bool,
    /// `access="hidden"`
    pub hidden: bool,
    /// `page` attribute
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
    /// Default from the `<value>` child
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    /// Choice options from `<items><text>...</text></items>`
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    /// Validation constraints
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<Validation>,
    /// Free-form layout properties (x, y, w, h)
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
}

impl Question {
    fn new(name: String) -> Self {
        Self {
            name,
            label: None,
            description: None,
            question_type: QuestionType::Text,
            required: false,
            read_only: false,
            hidden: false,
            page_number: None,
            default: None,
            options: Vec::new(),
            validation: None,
            properties: BTreeMap::new(),
        }
    }
}

/// Kind of control-flow rule derived from an event activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    /// `initialize` / `enter` activities
    SetValue,
    /// `change` / `exit` activities
    Calculate,
    /// `validate` activity
    Validate,
}

impl RuleKind {
    fn from_activity(activity: &str) -> Option<Self> {
        match activity {
            "initialize" | "enter" => Some(RuleKind::SetValue),
            "change" | "exit" => Some(RuleKind::Calculate),
            "validate" => Some(RuleKind::Validate),
            _ => None,
        }
    }
}

/// A control-flow rule from an `<event>` element.
#[derive(Debug, Clone, Serialize)]
pub struct Rule {
    /// Field the event is attached to
    pub field: String,
    /// Derived rule kind
    pub kind: RuleKind,
    /// Original activity name
    pub activity: String,
    /// Script text, preserved but not interpreted
    pub script: String,
}

/// Schema metadata.
#[derive(Debug, Clone, Serialize)]
pub struct SchemaMetadata {
    /// Always "xfa" for this extractor
    pub form_type: String,
    /// Distinct page count seen across fields (minimum 1)
    pub total_pages: u32,
    /// Root subform name when present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Template description when present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Template version attribute when present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// The extracted questionnaire schema.
#[derive(Debug, Clone, Serialize)]
pub struct FormSchema {
    /// Form-level metadata
    pub metadata: SchemaMetadata,
    /// Questions in template order
    pub questions: Vec<Question>,
    /// Control-flow rules in template order
    pub rules: Vec<Rule>,
}

/// Extract the schema from a document's template packet.
pub fn extract_schema(doc: &mut Document) -> Result<FormSchema> {
    let packet = match find_packet(doc, "template") {
        Ok(p) => p,
        // Single-stream XDP: the template section is inside the envelope
        Err(_) => find_packet(doc, "xdp")?,
    };
    extract_schema_from_template(&packet.data)
}

/// Extract the schema from raw template XML.
pub fn extract_schema_from_template(xml: &[u8]) -> Result<FormSchema> {
    let mut reader = Reader::from_reader(xml);
    reader.trim_text(true);
    reader.check_end_names(false);

    let mut questions: Vec<Question> = Vec::new();
    let mut rules: Vec<Rule> = Vec::new();
    let mut title: Option<String> = None;
    let mut version: Option<String> = None;

    let mut stack: Vec<String> = Vec::new();
    let mut current: Option<Question> = None;
    let mut in_items = false;
    let mut in_caption = false;
    let mut event_activity: Option<String> = None;
    let mut event_script = String::new();
    let mut buf = Vec::new();

    loop {
        let event = reader.read_event_into(&mut buf).map_err(|e| {
            Error::xfa("Parsed", format!("template XML error: {}", e))
        })?;

        match event {
            Event::Start(ref start) | Event::Empty(ref start) => {
                let empty = matches!(&event, Event::Empty(_));
                let name = local_name(start.name().as_ref()).to_string();

                match name.as_str() {
                    "template" => {
                        if version.is_none() {
                            version = attribute(start, "version");
                        }
                    }
                    "subform" => {
                        if title.is_none() {
                            title = attribute(start, "name");
                        }
                    }
                    "field" if current.is_none() => {
                        let mut question =
                            Question::new(attribute(start, "name").unwrap_or_default());
                        if let Some(type_attr) = attribute(start, "type") {
                            question.question_type = QuestionType::from_xfa_name(&type_attr);
                        }
                        question.required =
                            attribute(start, "required").as_deref() == Some("1");
                        match attribute(start, "access").as_deref() {
                            Some("readOnly") => question.read_only = true,
                            Some("hidden") => question.hidden = true,
                            _ => {}
                        }
                        question.page_number =
                            attribute(start, "page").and_then(|p| p.parse().ok());
                        for layout in ["x", "y", "w", "h"] {
                            if let Some(value) = attribute(start, layout) {
                                question.properties.insert(layout.to_string(), value);
                            }
                        }
                        current = Some(question);
                        if empty {
                            questions.push(current.take().expect("just set"));
                        }
                    }
                    "textEdit" | "numericEdit" | "dateTimeEdit" | "checkButton" | "radioButton"
                    | "choiceList" | "button" | "signature" => {
                        if let Some(question) = current.as_mut() {
                            question.question_type = QuestionType::from_xfa_name(&name);
                            if name == "textEdit"
                                && attribute(start, "multiLine").as_deref() == Some("1")
                            {
                                question.question_type = QuestionType::Textarea;
                            }
                        }
                    }
                    "items" => in_items = true,
                    "caption" => in_caption = true,
                    "validate" => {
                        if let Some(question) = current.as_mut() {
                            question.validation.get_or_insert_with(Validation::default);
                        }
                    }
                    "event" => {
                        event_activity = attribute(start, "activity");
                        event_script.clear();
                    }
                    _ => {}
                }

                if !empty {
                    stack.push(name);
                }
            }
            Event::Text(text) => {
                let content = text.unescape().unwrap_or_default().to_string();
                let context = stack.last().map(String::as_str).unwrap_or("");

                if event_activity.is_some() && context == "script" {
                    event_script.push_str(&content);
                } else if let Some(question) = current.as_mut() {
                    match context {
                        "label" => question.label = Some(content),
                        "desc" | "description" => question.description = Some(content),
                        "toolTip" => {
                            if question.description.is_none() {
                                question.description = Some(content);
                            }
                        }
                        "text" if in_items => question.options.push(content),
                        "text" if in_caption => {
                            if question.label.is_none() {
                                question.label = Some(content);
                            }
                        }
                        "value" if !in_items && !in_caption => {
                            if question.default.is_none() {
                                question.default = Some(content);
                            }
                        }
                        "formatTest" => {
                            question
                                .validation
                                .get_or_insert_with(Validation::default)
                                .format_test = Some(content);
                        }
                        "scriptTest" => {
                            question
                                .validation
                                .get_or_insert_with(Validation::default)
                                .script_test = Some(content);
                        }
                        "messageText" => {
                            question
                                .validation
                                .get_or_insert_with(Validation::default)
                                .message = Some(content);
                        }
                        "pattern" => {
                            question
                                .validation
                                .get_or_insert_with(Validation::default)
                                .pattern = Some(content);
                        }
                        _ => {}
                    }
                }
            }
            Event::End(end) => {
                let name = local_name(end.name().as_ref()).to_string();
                // Pop through tolerated mismatches
                while let Some(top) = stack.pop() {
                    if top == name {
                        break;
                    }
                }

                match name.as_str() {
                    "field" => {
                        if let Some(mut question) = current.take() {
                            if question
                                .validation
                                .as_ref()
                                .map(Validation::is_empty)
                                .unwrap_or(false)
                            {
                                question.validation = None;
                            }
                            questions.push(question);
                        }
                    }
                    "items" => in_items = false,
                    "caption" => in_caption = false,
                    "event" => {
                        if let (Some(activity), Some(question)) =
                            (event_activity.take(), current.as_ref())
                        {
                            if let Some(kind) = RuleKind::from_activity(&activity) {
                                rules.push(Rule {
                                    field: question.name.clone(),
                                    kind,
                                    activity,
                                    script: std::mem::take(&mut event_script),
                                });
                            }
                        }
                    }
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    let total_pages = questions
        .iter()
        .filter_map(|q| q.page_number)
        .collect::<std::collections::HashSet<_>>()
        .len()
        .max(1) as u32;

    Ok(FormSchema {
        metadata: SchemaMetadata {
            form_type: "xfa".to_string(),
            total_pages,
            title,
            description: None,
            version,
        },
        questions,
        rules,
    })
}

fn attribute(start: &BytesStart, name: &str) -> Option<String> {
    start.attributes().flatten().find_map(|attr| {
        if attr.key.as_ref() == name.as_bytes() {
            Some(String::from_utf8_lossy(&attr.value).to_string())
        } else {
            None
        }
    })
}

fn local_name(name: &[u8]) -> &str {
    let bare = name
        .iter()
        .rposition(|&c| c == b':')
        .map(|pos| &name[pos + 1..])
        .unwrap_or(name);
    std::str::from_utf8(bare).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_question_type_mapping() {
        assert_eq!(QuestionType::from_xfa_name("textEdit"), QuestionType::Text);
        assert_eq!(QuestionType::from_xfa_name("numeric"), QuestionType::Number);
        assert_eq!(QuestionType::from_xfa_name("radioButton"), QuestionType::Radio);
        assert_eq!(QuestionType::from_xfa_name("choiceList"), QuestionType::Select);
        assert_eq!(QuestionType::from_xfa_name("whatever"), QuestionType::Text);
    }

    #[test]
    fn test_numeric_required_field() {
        let template = br#"<?xml version="1.0"?>
<template xmlns="http://www.xfa.org/schema/xfa-template/3.0/">
    <subform name="form1">
        <field name="age" type="numeric" required="1">
            <label>Age</label>
            <value>0</value>
        </field>
    </subform>
</template>"#;

        let schema = extract_schema_from_template(template).unwrap();
        assert_eq!(schema.questions.len(), 1);

        let q = &schema.questions[0];
        assert_eq!(q.name, "age");
        assert_eq!(q.question_type, QuestionType::Number);
        assert!(q.required);
        assert_eq!(q.label.as_deref(), Some("Age"));
        assert_eq!(q.default.as_deref(), Some("0"));
    }

    #[test]
    fn test_ui_hint_and_caption() {
        let template = br#"<template>
  <subform name="f">
    <field name="firstName" w="200pt" h="20pt">
      <ui><textEdit/></ui>
      <caption><value><text>First Name</text></value></caption>
    </field>
  </subform>
</template>"#;

        let schema = extract_schema_from_template(template).unwrap();
        let q = &schema.questions[0];
        assert_eq!(q.question_type, QuestionType::Text);
        assert_eq!(q.label.as_deref(), Some("First Name"));
        assert_eq!(q.properties.get("w").map(String::as_str), Some("200pt"));
        // Caption text must not leak into the default value
        assert!(q.default.is_none());
    }

    #[test]
    fn test_choice_options() {
        let template = br#"<template>
  <subform name="f">
    <field name="country">
      <ui><choiceList/></ui>
      <items>
        <text>United States</text>
        <text>Canada</text>
        <text>Mexico</text>
      </items>
    </field>
  </subform>
</template>"#;

        let schema = extract_schema_from_template(template).unwrap();
        let q = &schema.questions[0];
        assert_eq!(q.question_type, QuestionType::Select);
        assert_eq!(q.options, vec!["United States", "Canada", "Mexico"]);
    }

    #[test]
    fn test_access_and_page_attributes() {
        let template = br#"<template>
  <field name="ro" access="readOnly" page="2"/>
  <field name="hid" access="hidden"/>
</template>"#;

        let schema = extract_schema_from_template(template).unwrap();
        assert_eq!(schema.questions.len(), 2);
        assert!(schema.questions[0].read_only);
        assert_eq!(schema.questions[0].page_number, Some(2));
        assert!(schema.questions[1].hidden);
    }

    #[test]
    fn test_validation_block() {
        let template = br#"<template>
  <field name="zip">
    <validate>
      <formatTest>99999</formatTest>
      <messageText>Invalid ZIP</messageText>
      <pattern>text{99999}</pattern>
    </validate>
  </field>
</template>"#;

        let schema = extract_schema_from_template(template).unwrap();
        let v = schema.questions[0].validation.as_ref().unwrap();
        assert_eq!(v.format_test.as_deref(), Some("99999"));
        assert_eq!(v.message.as_deref(), Some("Invalid ZIP"));
        assert_eq!(v.pattern.as_deref(), Some("text{99999}"));
    }

    #[test]
    fn test_event_rules() {
        let template = br#"<template>
  <field name="total">
    <event activity="initialize"><script>this.rawValue = 0</script></event>
    <event activity="exit"><script>recalc()</script></event>
    <event activity="validate"><script>check()</script></event>
    <event activity="mouseUp"><script>ignored()</script></event>
  </field>
</template>"#;

        let schema = extract_schema_from_template(template).unwrap();
        assert_eq!(schema.rules.len(), 3);
        assert_eq!(schema.rules[0].kind, RuleKind::SetValue);
        assert_eq!(schema.rules[0].script, "this.rawValue = 0");
        assert_eq!(schema.rules[1].kind, RuleKind::Calculate);
        assert_eq!(schema.rules[2].kind, RuleKind::Validate);
        assert!(schema.rules.iter().all(|r| r.field == "total"));
    }

    #[test]
    fn test_metadata() {
        let template = br#"<template version="3.3">
  <subform name="TaxForm">
    <field name="a" page="1"/>
    <field name="b" page="2"/>
    <field name="c" page="2"/>
  </subform>
</template>"#;

        let schema = extract_schema_from_template(template).unwrap();
        assert_eq!(schema.metadata.form_type, "xfa");
        assert_eq!(schema.metadata.total_pages, 2);
        assert_eq!(schema.metadata.title.as_deref(), Some("TaxForm"));
        assert_eq!(schema.metadata.version.as_deref(), Some("3.3"));
    }

    #[test]
    fn test_schema_serializes_to_expected_shape() {
        let template = br#"<template><field name="age" type="numeric" required="1"><label>Age</label><value>0</value></field></template>"#;
        let schema = extract_schema_from_template(template).unwrap();
        let json = serde_json::to_value(&schema).unwrap();

        assert!(json.get("metadata").is_some());
        let q = &json["questions"][0];
        assert_eq!(q["name"], "age");
        assert_eq!(q["type"], "number");
        assert_eq!(q["required"], true);
        assert_eq!(q["label"], "Age");
        assert_eq!(q["default"], "0");
    }
}

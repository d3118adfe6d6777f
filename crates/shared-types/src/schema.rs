//! Service schema types: which extra fields a service type asks for, how
//! they render, and when they are shown.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
}

/// Input kind of an extra field. Options only exist on `Select`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Number,
    Date,
    Time,
    Select { options: Vec<SelectOption> },
    Textarea,
    Qr,
}

impl FieldKind {
    /// Input element type the host UI renders for this kind.
    pub fn input_type(&self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Number => "number",
            FieldKind::Date => "date",
            FieldKind::Time => "time",
            FieldKind::Select { .. } => "select",
            FieldKind::Textarea => "textarea",
            FieldKind::Qr => "qr",
        }
    }

    pub fn options(&self) -> &[SelectOption] {
        match self {
            FieldKind::Select { options } => options,
            _ => &[],
        }
    }

    /// Whether a QR decoder result may be written into this field.
    pub fn accepts_scan(&self) -> bool {
        matches!(self, FieldKind::Qr)
    }
}

/// Show a field only while another field holds one of the listed values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Visibility {
    pub depends_on_field: String,
    pub show_when_value_in: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDefinition {
    pub name: String,
    pub label: String,
    #[serde(flatten)]
    pub kind: FieldKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<Visibility>,
}

impl FieldDefinition {
    pub fn new(name: &str, label: &str, kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            kind,
            placeholder: None,
            required: false,
            validation_pattern: None,
            visibility: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn placeholder(mut self, placeholder: &str) -> Self {
        self.placeholder = Some(placeholder.to_string());
        self
    }

    pub fn pattern(mut self, pattern: &str) -> Self {
        self.validation_pattern = Some(pattern.to_string());
        self
    }

    pub fn visible_when(mut self, depends_on: &str, values: &[&str]) -> Self {
        self.visibility = Some(Visibility {
            depends_on_field: depends_on.to_string(),
            show_when_value_in: values.iter().map(|v| v.to_string()).collect(),
        });
        self
    }
}

/// One municipal service type and its extra-field schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDefinition {
    pub id: String,
    pub name: String,
    /// Stable short identifier sent to the backend.
    pub code: String,
    pub fields: Vec<FieldDefinition>,
}

impl ServiceDefinition {
    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn has_extra_fields(&self) -> bool {
        !self.fields.is_empty()
    }
}

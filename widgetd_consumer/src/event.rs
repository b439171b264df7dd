//! Decoding of raw event payloads into structured change events.
//!
//! Events arrive as JSON documents with a `type` discriminator. Decoding goes
//! through an intermediate raw document so that a missing or unrecognized
//! `type`, or missing identity fields, surface as distinct [`ParseError`]
//! variants at decode time instead of presence checks scattered through the
//! dispatch path.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single `{name, value}` pair from an event's `otherAttributes` list.
///
/// Semantically a sparse mapping; entries with an empty name are ignored when
/// the record is flattened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

/// Error decoding an event payload.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("event payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("event is missing required field '{field}'")]
    MissingField { field: &'static str },

    #[error("unrecognized event type '{event_type}'")]
    UnknownType { event_type: String },
}

/// The fields shared by create and update events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WidgetChange {
    /// Free-text originator. Identity derivation lower-cases this and
    /// replaces whitespace runs with hyphens.
    pub owner: String,
    /// Opaque widget identifier, with any leading path-like namespace
    /// segment already stripped.
    pub widget_id: String,
    pub description: Option<String>,
    pub other_attributes: Vec<Attribute>,
}

/// The fields required to address an existing widget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WidgetIdentity {
    pub owner: String,
    pub widget_id: String,
}

/// A decoded change event, tagged by intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WidgetEvent {
    Create(WidgetChange),
    Update(WidgetChange),
    Delete(WidgetIdentity),
}

impl WidgetEvent {
    /// The wire name of this event's type.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Create(_) => "create",
            Self::Update(_) => "update",
            Self::Delete(_) => "delete",
        }
    }
}

/// The mirrored entity document as stored in the destination container.
///
/// This keeps the event's original field shape: `owner` stays `owner` and
/// `otherAttributes` stays an ordered list. Flattening and the `owner` to
/// `id` rename happen only on the table-store path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetRecord {
    pub owner: String,
    pub widget_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub other_attributes: Vec<Attribute>,
}

impl From<&WidgetChange> for WidgetRecord {
    fn from(change: &WidgetChange) -> Self {
        Self {
            owner: change.owner.clone(),
            widget_id: change.widget_id.clone(),
            description: change.description.clone(),
            other_attributes: change.other_attributes.clone(),
        }
    }
}

impl WidgetRecord {
    /// Overlay an update's changes onto this record.
    ///
    /// A provided description replaces the stored one; attributes merge by
    /// name with the event's list order winning on duplicates.
    pub fn merge(&mut self, change: &WidgetChange) {
        if let Some(description) = &change.description {
            self.description = Some(description.clone());
        }
        for attr in &change.other_attributes {
            if attr.name.is_empty() {
                continue;
            }
            match self
                .other_attributes
                .iter_mut()
                .find(|existing| existing.name == attr.name)
            {
                Some(existing) => existing.value = attr.value.clone(),
                None => self.other_attributes.push(attr.clone()),
            }
        }
    }
}

/// Wire shape of an event payload. All fields optional so that validation
/// happens here, in one place, rather than as a JSON type error.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEvent {
    #[serde(rename = "type")]
    event_type: Option<String>,
    owner: Option<String>,
    widget_id: Option<String>,
    description: Option<String>,
    #[serde(default)]
    other_attributes: Vec<Attribute>,
}

/// Decode a raw payload into a [`WidgetEvent`].
pub fn parse(payload: &[u8]) -> Result<WidgetEvent, ParseError> {
    let raw: RawEvent = serde_json::from_slice(payload)?;

    let event_type = raw
        .event_type
        .ok_or(ParseError::MissingField { field: "type" })?;
    let owner = raw.owner.ok_or(ParseError::MissingField { field: "owner" })?;
    let widget_id = raw
        .widget_id
        .ok_or(ParseError::MissingField { field: "widgetId" })?;
    let widget_id = strip_namespace(&widget_id).to_string();

    match event_type.as_str() {
        "create" => Ok(WidgetEvent::Create(WidgetChange {
            owner,
            widget_id,
            description: raw.description,
            other_attributes: raw.other_attributes,
        })),
        "update" => Ok(WidgetEvent::Update(WidgetChange {
            owner,
            widget_id,
            description: raw.description,
            other_attributes: raw.other_attributes,
        })),
        "delete" => Ok(WidgetEvent::Delete(WidgetIdentity { owner, widget_id })),
        _ => Err(ParseError::UnknownType { event_type }),
    }
}

/// Strip a leading path-like namespace from a widget identifier, e.g.
/// `widgets/123` becomes `123`. Identifiers arrive in both shapes.
fn strip_namespace(widget_id: &str) -> &str {
    match widget_id.rsplit_once('/') {
        Some((_, id)) => id,
        None => widget_id,
    }
}

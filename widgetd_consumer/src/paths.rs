use crate::normalize::normalize_owner;
use object_store::path::Path as ObjPath;
use std::ops::Deref;

/// Namespace prefix shared by all mirrored widget records.
pub const WIDGET_NAMESPACE: &str = "widgets";

/// Derived addressing path for a widget entity:
/// `widgets/<normalized-owner>/<widgetId>`.
///
/// A pure function of `owner` and `widgetId`; two events with the same
/// normalized owner and widget id address the same entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WidgetKey(ObjPath);

impl WidgetKey {
    pub fn new(owner: &str, widget_id: &str) -> Self {
        Self(ObjPath::from(format!(
            "{WIDGET_NAMESPACE}/{}/{widget_id}",
            normalize_owner(owner)
        )))
    }
}

impl Deref for WidgetKey {
    type Target = ObjPath;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<ObjPath> for WidgetKey {
    fn as_ref(&self) -> &ObjPath {
        &self.0
    }
}

impl std::fmt::Display for WidgetKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[test]
fn widget_key_new() {
    assert_eq!(
        *WidgetKey::new("John Doe", "123"),
        ObjPath::from("widgets/john-doe/123")
    );
}

#[test]
fn widget_key_is_stable_across_owner_spellings() {
    assert_eq!(
        WidgetKey::new("John Doe", "123"),
        WidgetKey::new("  john   DOE ", "123")
    );
}

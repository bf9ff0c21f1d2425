//! Shared Objects - the drawable entities every client sees.
//!
//! A [`SharedObject`] is what the remote store holds and what snapshots
//! deliver. Local mutations are expressed as [`ObjectPatch`]es, which merge
//! field-wise so that a burst of edits can be collapsed into one write.
//!
//! The `id` and the kind (carried by [`Geometry`]) can never be changed by a
//! patch: a patch has no field for either.

use crate::id::{ObjectId, UserId};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

/// Milliseconds since the Unix epoch.
pub type Timestamp = u64;

/// Local-only synchronization state of an object. Never persisted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Matches the last snapshot or the last acknowledged write.
    #[default]
    Synced,
    /// A local change has not been confirmed yet.
    Pending,
    /// Remote and local state disagree.
    Conflict,
    /// The last write for this object failed.
    Error,
}

/// Discriminant of a shared object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Rectangle,
    Circle,
    Image,
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObjectKind::Rectangle => write!(f, "rectangle"),
            ObjectKind::Circle => write!(f, "circle"),
            ObjectKind::Image => write!(f, "image"),
        }
    }
}

/// Kind-specific geometry. Serialized inline with a `type` tag.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Geometry {
    #[serde(rename_all = "camelCase")]
    Rectangle {
        width: f64,
        height: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        corner_radius: Option<f64>,
    },
    Circle { radius: f64 },
    Image {
        src: String,
        width: f64,
        height: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        alt: Option<String>,
    },
}

impl Geometry {
    pub fn kind(&self) -> ObjectKind {
        match self {
            Geometry::Rectangle { .. } => ObjectKind::Rectangle,
            Geometry::Circle { .. } => ObjectKind::Circle,
            Geometry::Image { .. } => ObjectKind::Image,
        }
    }

    /// Width and height of the bounding box.
    pub fn extent(&self) -> (f64, f64) {
        match self {
            Geometry::Rectangle { width, height, .. } | Geometry::Image { width, height, .. } => {
                (*width, *height)
            }
            Geometry::Circle { radius } => (radius * 2.0, radius * 2.0),
        }
    }

    /// Apply the geometry fields of `patch` that exist for this kind.
    fn apply(&mut self, patch: &ObjectPatch) {
        match self {
            Geometry::Rectangle {
                width,
                height,
                corner_radius,
            } => {
                assign(width, patch.width);
                assign(height, patch.height);
                if patch.corner_radius.is_some() {
                    *corner_radius = patch.corner_radius;
                }
            }
            Geometry::Circle { radius } => assign(radius, patch.radius),
            Geometry::Image {
                src,
                width,
                height,
                alt,
            } => {
                if let Some(new_src) = &patch.src {
                    *src = new_src.clone();
                }
                assign(width, patch.width);
                assign(height, patch.height);
                if patch.alt.is_some() {
                    *alt = patch.alt.clone();
                }
            }
        }
    }
}

/// Who holds the lock on an object, denormalized onto the object for display.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockAnnotation {
    #[serde(rename = "lockedByUserId")]
    pub user_id: UserId,
    #[serde(rename = "lockedByUserName")]
    pub user_name: String,
    #[serde(rename = "lockedByUserColor")]
    pub user_color: String,
    #[serde(rename = "lockedAt")]
    pub locked_at: Timestamp,
}

/// A drawable entity shared by every client of a canvas.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedObject {
    pub id: ObjectId,
    #[serde(flatten)]
    pub geometry: Geometry,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub rotation: f64,
    #[serde(default)]
    pub fill: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke_width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f64>,
    pub created_by: UserId,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    #[serde(flatten)]
    pub lock: Option<LockAnnotation>,
    #[serde(skip)]
    pub sync_status: Option<SyncStatus>,
}

impl SharedObject {
    pub fn kind(&self) -> ObjectKind {
        self.geometry.kind()
    }

    /// Apply a partial update in place. Fields that do not exist for this
    /// object's kind are ignored.
    pub fn apply(&mut self, patch: &ObjectPatch) {
        assign(&mut self.x, patch.x);
        assign(&mut self.y, patch.y);
        assign(&mut self.rotation, patch.rotation);
        if let Some(fill) = &patch.fill {
            self.fill = fill.clone();
        }
        if patch.stroke.is_some() {
            self.stroke = patch.stroke.clone();
        }
        if patch.stroke_width.is_some() {
            self.stroke_width = patch.stroke_width;
        }
        if patch.opacity.is_some() {
            self.opacity = patch.opacity;
        }
        if let Some(lock) = &patch.lock {
            self.lock = lock.clone();
        }
        self.geometry.apply(patch);
    }

    /// Return a copy with the given patch applied.
    pub fn patched(&self, patch: &ObjectPatch) -> Self {
        let mut next = self.clone();
        next.apply(patch);
        next
    }

    pub fn is_locked_by(&self, user: &UserId) -> bool {
        self.lock.as_ref().is_some_and(|l| &l.user_id == user)
    }
}

/// A new object as submitted by a client, before the store assigns an id and
/// timestamps.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectDraft {
    #[serde(flatten)]
    pub geometry: Geometry,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub rotation: f64,
    #[serde(default)]
    pub fill: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke_width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f64>,
}

impl ObjectDraft {
    /// A rectangle with the default styling.
    pub fn rectangle(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            geometry: Geometry::Rectangle {
                width,
                height,
                corner_radius: None,
            },
            x,
            y,
            rotation: 0.0,
            fill: "#3b82f6".to_string(),
            stroke: Some("#1e40af".to_string()),
            stroke_width: Some(2.0),
            opacity: Some(1.0),
        }
    }

    /// A circle with the default styling.
    pub fn circle(x: f64, y: f64, radius: f64) -> Self {
        Self {
            geometry: Geometry::Circle { radius },
            x,
            y,
            rotation: 0.0,
            fill: "#10b981".to_string(),
            stroke: Some("#047857".to_string()),
            stroke_width: Some(2.0),
            opacity: Some(1.0),
        }
    }

    pub fn image(x: f64, y: f64, src: impl Into<String>, width: f64, height: f64) -> Self {
        Self {
            geometry: Geometry::Image {
                src: src.into(),
                width,
                height,
                alt: Some("Image".to_string()),
            },
            x,
            y,
            rotation: 0.0,
            fill: String::new(),
            stroke: None,
            stroke_width: None,
            opacity: Some(1.0),
        }
    }

    pub fn with_fill(mut self, fill: impl Into<String>) -> Self {
        self.fill = fill.into();
        self
    }

    pub fn with_stroke(mut self, stroke: impl Into<String>, width: f64) -> Self {
        self.stroke = Some(stroke.into());
        self.stroke_width = Some(width);
        self
    }

    pub fn with_rotation(mut self, rotation: f64) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn kind(&self) -> ObjectKind {
        self.geometry.kind()
    }

    /// Materialize the draft with store-assigned identity and timestamps.
    pub fn into_object(self, id: ObjectId, created_by: UserId, now: Timestamp) -> SharedObject {
        SharedObject {
            id,
            geometry: self.geometry,
            x: self.x,
            y: self.y,
            rotation: self.rotation,
            fill: self.fill,
            stroke: self.stroke,
            stroke_width: self.stroke_width,
            opacity: self.opacity,
            created_by,
            created_at: now,
            updated_at: now,
            lock: None,
            sync_status: None,
        }
    }
}

/// A partial update. Absent fields are left untouched.
///
/// `lock` distinguishes "leave the annotation alone" (`None`) from "clear it"
/// (`Some(None)`). On the wire a lock change uses the record's flattened
/// `lockedBy*` fields, all four null when clearing.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ObjectPatch {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub rotation: Option<f64>,
    pub fill: Option<String>,
    pub stroke: Option<String>,
    pub stroke_width: Option<f64>,
    pub opacity: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub radius: Option<f64>,
    pub corner_radius: Option<f64>,
    pub src: Option<String>,
    pub alt: Option<String>,
    pub lock: Option<Option<LockAnnotation>>,
}

const LOCK_FIELDS: [&str; 4] = [
    "lockedByUserId",
    "lockedByUserName",
    "lockedByUserColor",
    "lockedAt",
];

impl Serialize for ObjectPatch {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        present(&mut map, "x", &self.x)?;
        present(&mut map, "y", &self.y)?;
        present(&mut map, "rotation", &self.rotation)?;
        present(&mut map, "fill", &self.fill)?;
        present(&mut map, "stroke", &self.stroke)?;
        present(&mut map, "strokeWidth", &self.stroke_width)?;
        present(&mut map, "opacity", &self.opacity)?;
        present(&mut map, "width", &self.width)?;
        present(&mut map, "height", &self.height)?;
        present(&mut map, "radius", &self.radius)?;
        present(&mut map, "cornerRadius", &self.corner_radius)?;
        present(&mut map, "src", &self.src)?;
        present(&mut map, "alt", &self.alt)?;

        match &self.lock {
            Some(Some(annotation)) => {
                map.serialize_entry(LOCK_FIELDS[0], &annotation.user_id)?;
                map.serialize_entry(LOCK_FIELDS[1], &annotation.user_name)?;
                map.serialize_entry(LOCK_FIELDS[2], &annotation.user_color)?;
                map.serialize_entry(LOCK_FIELDS[3], &annotation.locked_at)?;
            }
            Some(None) => {
                for key in LOCK_FIELDS {
                    map.serialize_entry(key, &Option::<()>::None)?;
                }
            }
            None => {}
        }
        map.end()
    }
}

fn present<M, T>(map: &mut M, key: &'static str, value: &Option<T>) -> Result<(), M::Error>
where
    M: SerializeMap,
    T: Serialize,
{
    match value {
        Some(value) => map.serialize_entry(key, value),
        None => Ok(()),
    }
}

impl ObjectPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(x: f64, y: f64) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            ..Self::default()
        }
    }

    pub fn size(width: f64, height: f64) -> Self {
        Self {
            width: Some(width),
            height: Some(height),
            ..Self::default()
        }
    }

    /// Set the lock annotation.
    pub fn lock(annotation: LockAnnotation) -> Self {
        Self {
            lock: Some(Some(annotation)),
            ..Self::default()
        }
    }

    /// Clear the lock annotation.
    pub fn unlock() -> Self {
        Self {
            lock: Some(None),
            ..Self::default()
        }
    }

    pub fn with_x(mut self, x: f64) -> Self {
        self.x = Some(x);
        self
    }

    pub fn with_y(mut self, y: f64) -> Self {
        self.y = Some(y);
        self
    }

    pub fn with_rotation(mut self, rotation: f64) -> Self {
        self.rotation = Some(rotation);
        self
    }

    pub fn with_fill(mut self, fill: impl Into<String>) -> Self {
        self.fill = Some(fill.into());
        self
    }

    pub fn with_radius(mut self, radius: f64) -> Self {
        self.radius = Some(radius);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Fold a newer patch into this one. Fields present in `newer` win.
    pub fn merge(&mut self, newer: ObjectPatch) {
        overwrite(&mut self.x, newer.x);
        overwrite(&mut self.y, newer.y);
        overwrite(&mut self.rotation, newer.rotation);
        overwrite(&mut self.fill, newer.fill);
        overwrite(&mut self.stroke, newer.stroke);
        overwrite(&mut self.stroke_width, newer.stroke_width);
        overwrite(&mut self.opacity, newer.opacity);
        overwrite(&mut self.width, newer.width);
        overwrite(&mut self.height, newer.height);
        overwrite(&mut self.radius, newer.radius);
        overwrite(&mut self.corner_radius, newer.corner_radius);
        overwrite(&mut self.src, newer.src);
        overwrite(&mut self.alt, newer.alt);
        overwrite(&mut self.lock, newer.lock);
    }

    /// `self` followed by `newer`, as a new patch.
    pub fn merged(mut self, newer: ObjectPatch) -> Self {
        self.merge(newer);
        self
    }
}

fn assign(slot: &mut f64, value: Option<f64>) {
    if let Some(v) = value {
        *slot = v;
    }
}

fn overwrite<T>(slot: &mut Option<T>, newer: Option<T>) {
    if newer.is_some() {
        *slot = newer;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect() -> SharedObject {
        ObjectDraft::rectangle(0.0, 0.0, 100.0, 80.0)
            .with_fill("#FF0000")
            .into_object(ObjectId::new("r1"), UserId::new("alice"), 1_000)
    }

    #[test]
    fn test_apply_ignores_foreign_geometry() {
        let mut obj = rect();
        obj.apply(&ObjectPatch::new().with_radius(40.0).with_x(12.0));

        assert_eq!(obj.x, 12.0);
        assert_eq!(
            obj.geometry,
            Geometry::Rectangle {
                width: 100.0,
                height: 80.0,
                corner_radius: None
            }
        );
    }

    #[test]
    fn test_apply_lock_annotation() {
        let mut obj = rect();
        let annotation = LockAnnotation {
            user_id: UserId::new("bob"),
            user_name: "Bob".to_string(),
            user_color: "#45B7D1".to_string(),
            locked_at: 5,
        };

        obj.apply(&ObjectPatch::lock(annotation));
        assert!(obj.is_locked_by(&UserId::new("bob")));

        // A patch without a lock field leaves the annotation alone
        obj.apply(&ObjectPatch::position(1.0, 2.0));
        assert!(obj.lock.is_some());

        obj.apply(&ObjectPatch::unlock());
        assert!(obj.lock.is_none());
    }

    #[test]
    fn test_merge_keeps_latest_values() {
        let mut patch = ObjectPatch::position(1.0, 1.0).with_fill("#000000");
        patch.merge(ObjectPatch::new().with_x(5.0));
        patch.merge(ObjectPatch::size(30.0, 40.0));

        assert_eq!(patch.x, Some(5.0));
        assert_eq!(patch.y, Some(1.0));
        assert_eq!(patch.fill.as_deref(), Some("#000000"));
        assert_eq!(patch.width, Some(30.0));
        assert!(!patch.is_empty());
        assert!(ObjectPatch::new().is_empty());
    }

    #[test]
    fn test_record_serialization() {
        let obj = rect();
        let json = serde_json::to_value(&obj).unwrap();

        assert_eq!(json["type"], "rectangle");
        assert_eq!(json["width"], 100.0);
        assert_eq!(json["createdBy"], "alice");
        assert!(json.get("syncStatus").is_none());
        assert!(json.get("lockedByUserId").is_none());
    }

    #[test]
    fn test_record_deserialization() {
        let json = r##"{
            "id": "c1",
            "type": "circle",
            "radius": 25.5,
            "x": 10.0,
            "y": 20.0,
            "fill": "#10b981",
            "createdBy": "alice",
            "createdAt": 1,
            "updatedAt": 2,
            "lockedByUserId": "bob",
            "lockedByUserName": "Bob",
            "lockedByUserColor": "#45B7D1",
            "lockedAt": 3
        }"##;

        let obj: SharedObject = serde_json::from_str(json).unwrap();
        assert_eq!(obj.kind(), ObjectKind::Circle);
        assert_eq!(obj.geometry.extent(), (51.0, 51.0));
        assert_eq!(obj.rotation, 0.0);
        assert!(obj.is_locked_by(&UserId::new("bob")));
        assert_eq!(obj.sync_status, None);
    }

    #[test]
    fn test_cleared_lock_fields_deserialize_as_unlocked() {
        let mut record = serde_json::to_value(rect()).unwrap();
        let cleared = serde_json::to_value(ObjectPatch::unlock()).unwrap();
        for (key, value) in cleared.as_object().unwrap() {
            record[key] = value.clone();
        }

        let obj: SharedObject = serde_json::from_value(record).unwrap();
        assert!(obj.lock.is_none());
    }

    #[test]
    fn test_patch_serializes_only_present_fields() {
        let json = serde_json::to_value(ObjectPatch::new().with_x(5.0)).unwrap();
        assert_eq!(json, serde_json::json!({ "x": 5.0 }));

        let json = serde_json::to_value(ObjectPatch::size(30.0, 40.0).with_fill("#000000")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "fill": "#000000", "width": 30.0, "height": 40.0 })
        );
    }

    #[test]
    fn test_lock_patch_uses_record_fields() {
        let annotation = LockAnnotation {
            user_id: UserId::new("alice"),
            user_name: "Alice".into(),
            user_color: "#FF6B6B".into(),
            locked_at: 5,
        };
        let json = serde_json::to_value(ObjectPatch::lock(annotation.clone()).with_x(1.0)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "x": 1.0,
                "lockedByUserId": "alice",
                "lockedByUserName": "Alice",
                "lockedByUserColor": "#FF6B6B",
                "lockedAt": 5
            })
        );

        // Same keys as the annotated record
        let mut obj = rect();
        obj.apply(&ObjectPatch::lock(annotation));
        let record = serde_json::to_value(&obj).unwrap();
        for key in LOCK_FIELDS {
            assert_eq!(record[key], json[key]);
        }

        let json = serde_json::to_value(ObjectPatch::unlock()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "lockedByUserId": null,
                "lockedByUserName": null,
                "lockedByUserColor": null,
                "lockedAt": null
            })
        );
    }
}

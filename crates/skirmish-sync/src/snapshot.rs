//! Wire shape of the server's game-state snapshots.
//!
//! A snapshot is never a delta: each one lists every unit that exists at one
//! instant. [`parse_snapshot`] validates a raw `state_update` payload and
//! produces a [`GameSnapshot`]; unknown unit kinds and actions are passed
//! through untouched so the render layer can decide what to do with them.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Inbound channel event carrying a full snapshot payload.
pub const STATE_UPDATE_EVENT: &str = "state_update";

// ---------------------------------------------------------------------------
// UnitId
// ---------------------------------------------------------------------------

/// Opaque, server-assigned unit identity. Stable across snapshots.
///
/// The server may send ids as JSON strings or integers; both normalize to the
/// same textual form so `7` and `"7"` name the same unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct UnitId(pub String);

impl UnitId {
    /// Creates an id from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UnitId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl<'de> Deserialize<'de> for UnitId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Signed(i64),
            Unsigned(u64),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Text(text) => Self(text),
            RawId::Signed(n) => Self(n.to_string()),
            RawId::Unsigned(n) => Self(n.to_string()),
        })
    }
}

// ---------------------------------------------------------------------------
// UnitKind / UnitAction
// ---------------------------------------------------------------------------

/// Unit classification. Kinds the client has never heard of are kept as
/// [`UnitKind::Other`] rather than rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum UnitKind {
    /// Infantry.
    Soldier,
    /// Ranged infantry.
    Archer,
    /// Mounted unit.
    Cavalry,
    /// Any kind not known to this client.
    Other(String),
}

impl UnitKind {
    /// Wire name of the kind.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Soldier => "soldier",
            Self::Archer => "archer",
            Self::Cavalry => "cavalry",
            Self::Other(name) => name,
        }
    }
}

impl From<&str> for UnitKind {
    fn from(name: &str) -> Self {
        match name {
            "soldier" => Self::Soldier,
            "archer" => Self::Archer,
            "cavalry" => Self::Cavalry,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for UnitKind {
    fn from(name: String) -> Self {
        Self::from(name.as_str())
    }
}

impl From<UnitKind> for String {
    fn from(kind: UnitKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a unit is currently doing. Drives animation selection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum UnitAction {
    /// Standing still. Also the fallback animation slot for every kind.
    #[default]
    Idle,
    /// Moving.
    Walk,
    /// Fighting.
    Attack,
    /// Dying. Usually a non-looping animation.
    Death,
    /// Any action not known to this client.
    Other(String),
}

impl UnitAction {
    /// Wire name of the action.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Idle => "idle",
            Self::Walk => "walk",
            Self::Attack => "attack",
            Self::Death => "death",
            Self::Other(name) => name,
        }
    }
}

impl From<&str> for UnitAction {
    fn from(name: &str) -> Self {
        match name {
            "idle" => Self::Idle,
            "walk" => Self::Walk,
            "attack" => Self::Attack,
            "death" => Self::Death,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for UnitAction {
    fn from(name: String) -> Self {
        Self::from(name.as_str())
    }
}

impl From<UnitAction> for String {
    fn from(action: UnitAction) -> Self {
        action.as_str().to_string()
    }
}

impl fmt::Display for UnitAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// UnitSnapshot / GameSnapshot
// ---------------------------------------------------------------------------

/// One unit as reported by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitSnapshot {
    /// Stable identity.
    pub id: UnitId,
    /// Unit classification. The game server names this field `type`.
    #[serde(alias = "type")]
    pub kind: UnitKind,
    /// Horizontal position in scene pixels.
    #[serde(default)]
    pub x: f32,
    /// Vertical position in scene pixels.
    #[serde(default)]
    pub y: f32,
    /// Current action. Missing means idle.
    #[serde(default)]
    pub action: UnitAction,
}

impl UnitSnapshot {
    /// Convenience constructor, mostly for tests and tools.
    pub fn new(
        id: impl Into<String>,
        kind: UnitKind,
        x: f32,
        y: f32,
        action: UnitAction,
    ) -> Self {
        Self {
            id: UnitId::new(id),
            kind,
            x,
            y,
            action,
        }
    }
}

/// The complete set of units that exist at one instant. Unit ids are unique.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GameSnapshot {
    units: Vec<UnitSnapshot>,
}

impl GameSnapshot {
    /// Builds a snapshot, rejecting duplicate unit ids.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedSnapshot::DuplicateId`] if two units share an id.
    pub fn new(units: Vec<UnitSnapshot>) -> Result<Self, MalformedSnapshot> {
        {
            let mut seen = HashSet::with_capacity(units.len());
            for unit in &units {
                if !seen.insert(&unit.id) {
                    return Err(MalformedSnapshot::DuplicateId(unit.id.clone()));
                }
            }
        }
        Ok(Self { units })
    }

    /// A snapshot with no units. Applying it retires every sprite.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Units in the order the server listed them.
    pub fn units(&self) -> &[UnitSnapshot] {
        &self.units
    }

    /// Looks up a unit by id.
    pub fn get(&self, id: &UnitId) -> Option<&UnitSnapshot> {
        self.units.iter().find(|u| &u.id == id)
    }

    /// Iterates over unit ids in snapshot order.
    pub fn ids(&self) -> impl Iterator<Item = &UnitId> {
        self.units.iter().map(|u| &u.id)
    }

    /// Number of units.
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Returns `true` if the snapshot has no units.
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A `state_update` payload that cannot be turned into a [`GameSnapshot`].
///
/// The receiver drops the snapshot and keeps the previous scene.
#[derive(Debug, thiserror::Error)]
pub enum MalformedSnapshot {
    /// The payload has no `units` field.
    #[error("snapshot has no `units` field")]
    MissingUnits,

    /// `units` is present but is not an array.
    #[error("snapshot `units` is not an array")]
    UnitsNotArray,

    /// A unit record is missing `id`/`kind` or has a field of the wrong type.
    #[error("unit record {index} is invalid: {source}")]
    InvalidUnit {
        /// Position of the record inside `units`.
        index: usize,
        /// Underlying decode error.
        #[source]
        source: serde_json::Error,
    },

    /// Two unit records share the same id.
    #[error("duplicate unit id {0}")]
    DuplicateId(UnitId),
}

/// Validates a raw `state_update` payload and shapes it into a snapshot.
///
/// # Errors
///
/// Returns [`MalformedSnapshot`] if `units` is absent or not an array, if any
/// record lacks `id`/`kind`, or if ids repeat.
pub fn parse_snapshot(payload: &Value) -> Result<GameSnapshot, MalformedSnapshot> {
    let units = payload
        .get("units")
        .ok_or(MalformedSnapshot::MissingUnits)?;
    let records = units.as_array().ok_or(MalformedSnapshot::UnitsNotArray)?;

    let mut parsed = Vec::with_capacity(records.len());
    for (index, record) in records.iter().enumerate() {
        let unit = UnitSnapshot::deserialize(record)
            .map_err(|source| MalformedSnapshot::InvalidUnit { index, source })?;
        parsed.push(unit);
    }

    GameSnapshot::new(parsed)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parses_full_unit_record() {
        let payload = json!({
            "units": [
                { "id": "u1", "kind": "soldier", "x": 10.0, "y": 20.5, "action": "walk" }
            ]
        });
        let snapshot = parse_snapshot(&payload).unwrap();
        assert_eq!(snapshot.len(), 1);
        let unit = &snapshot.units()[0];
        assert_eq!(unit.id, UnitId::from("u1"));
        assert_eq!(unit.kind, UnitKind::Soldier);
        assert_eq!(unit.action, UnitAction::Walk);
        assert!((unit.x - 10.0).abs() < f32::EPSILON);
        assert!((unit.y - 20.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_server_type_field_is_accepted_as_kind() {
        let payload = json!({ "units": [ { "id": 1, "type": "archer", "x": 0, "y": 0 } ] });
        let snapshot = parse_snapshot(&payload).unwrap();
        assert_eq!(snapshot.units()[0].kind, UnitKind::Archer);
    }

    #[test]
    fn test_numeric_and_string_ids_normalize() {
        let payload = json!({ "units": [ { "id": 7, "kind": "cavalry" } ] });
        let snapshot = parse_snapshot(&payload).unwrap();
        assert_eq!(snapshot.units()[0].id, UnitId::from("7"));
    }

    #[test]
    fn test_missing_position_and_action_default() {
        let payload = json!({ "units": [ { "id": "a", "kind": "soldier" } ] });
        let unit = parse_snapshot(&payload).unwrap().units()[0].clone();
        assert_eq!(unit.action, UnitAction::Idle);
        assert_eq!(unit.x, 0.0);
        assert_eq!(unit.y, 0.0);
    }

    #[test]
    fn test_unknown_kind_and_action_pass_through() {
        let payload = json!({
            "units": [ { "id": "d", "kind": "dragon", "action": "breathe_fire" } ]
        });
        let unit = parse_snapshot(&payload).unwrap().units()[0].clone();
        assert_eq!(unit.kind, UnitKind::Other("dragon".to_string()));
        assert_eq!(unit.action, UnitAction::Other("breathe_fire".to_string()));
    }

    #[test]
    fn test_empty_units_is_valid() {
        let snapshot = parse_snapshot(&json!({ "units": [] })).unwrap();
        assert!(snapshot.is_empty());
    }

    #[test]
    fn test_missing_units_rejected() {
        let result = parse_snapshot(&json!({ "tick": 4 }));
        assert!(matches!(result, Err(MalformedSnapshot::MissingUnits)));
    }

    #[test]
    fn test_non_object_payload_rejected() {
        let result = parse_snapshot(&json!("units"));
        assert!(matches!(result, Err(MalformedSnapshot::MissingUnits)));
    }

    #[test]
    fn test_units_not_array_rejected() {
        let result = parse_snapshot(&json!({ "units": { "u1": {} } }));
        assert!(matches!(result, Err(MalformedSnapshot::UnitsNotArray)));
    }

    #[test]
    fn test_unit_missing_id_rejected() {
        let payload = json!({ "units": [ { "id": "ok", "kind": "soldier" }, { "kind": "soldier" } ] });
        let result = parse_snapshot(&payload);
        assert!(
            matches!(result, Err(MalformedSnapshot::InvalidUnit { index: 1, .. })),
            "expected InvalidUnit at index 1, got: {result:?}"
        );
    }

    #[test]
    fn test_unit_missing_kind_rejected() {
        let payload = json!({ "units": [ { "id": "u1", "x": 1.0 } ] });
        let result = parse_snapshot(&payload);
        assert!(matches!(
            result,
            Err(MalformedSnapshot::InvalidUnit { index: 0, .. })
        ));
    }

    #[test]
    fn test_wrong_position_type_rejected() {
        let payload = json!({ "units": [ { "id": "u1", "kind": "soldier", "x": "left" } ] });
        assert!(parse_snapshot(&payload).is_err());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let payload = json!({
            "units": [
                { "id": "u1", "kind": "soldier" },
                { "id": "u1", "kind": "archer" }
            ]
        });
        let result = parse_snapshot(&payload);
        assert!(
            matches!(&result, Err(MalformedSnapshot::DuplicateId(id)) if id.as_str() == "u1"),
            "got: {result:?}"
        );
    }

    #[test]
    fn test_snapshot_preserves_server_order() {
        let payload = json!({
            "units": [
                { "id": "c", "kind": "soldier" },
                { "id": "a", "kind": "soldier" },
                { "id": "b", "kind": "soldier" }
            ]
        });
        let snapshot = parse_snapshot(&payload).unwrap();
        let ids: Vec<&str> = snapshot.ids().map(UnitId::as_str).collect();
        assert_eq!(ids, ["c", "a", "b"]);
    }
}

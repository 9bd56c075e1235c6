//! JSON payloads carried on device topics
//!
//! | Device | Write payload                                   | Read payload        |
//! |--------|-------------------------------------------------|---------------------|
//! | servo  | `{"percent": 0.5}`                              | `{"percent": 0.5}`  |
//! | led    | `{"r": 255, "g": 0}` (missing fields keep value) | `{"r":..,"g":..,"b":..}` |
//! | strip  | `[[r,g,b], ...]`, `{"index": 3, "color": [r,g,b]}`, `{"color": [r,g,b]}` | `[[r,g,b], ...]` |

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::{Color, Error, Result};

/// Color as a JSON `[r, g, b]` triple. Channels are clamped to 0..=255.
#[derive(Debug, Clone, Copy, Deserialize)]
struct WireColor([f64; 3]);

impl From<WireColor> for Color {
    fn from(WireColor([r, g, b]): WireColor) -> Self {
        Color::clamped(r, g, b)
    }
}

#[derive(Serialize)]
struct ServoState {
    percent: f32,
}

/// Partial LED update; absent channels keep their current value
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct ColorPatch {
    #[serde(default)]
    pub r: Option<f64>,
    #[serde(default)]
    pub g: Option<f64>,
    #[serde(default)]
    pub b: Option<f64>,
}

impl ColorPatch {
    pub fn apply(&self, current: Color) -> Color {
        Color::clamped(
            self.r.unwrap_or(current.r as f64),
            self.g.unwrap_or(current.g as f64),
            self.b.unwrap_or(current.b as f64),
        )
    }
}

/// Strip write addressing a single pixel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SingleWrite {
    pub index: usize,
    pub color: Color,
}

#[derive(Deserialize)]
struct SingleWriteWire {
    index: usize,
    color: WireColor,
}

#[derive(Deserialize)]
struct BroadcastWire {
    color: WireColor,
}

fn parse_json(payload: &[u8]) -> Result<JsonValue> {
    Ok(serde_json::from_slice(payload)?)
}

fn parse_object(payload: &[u8]) -> Result<Map<String, JsonValue>> {
    match parse_json(payload)? {
        JsonValue::Object(map) => Ok(map),
        other => Err(Error::InvalidPayload(format!(
            "expected JSON object, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "bool",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

/// Parse a servo write. The value is returned at full width and not
/// range-checked here; see [`Fraction::from_f64`](crate::Fraction::from_f64).
pub fn parse_servo_write(payload: &[u8]) -> Result<f64> {
    let object = parse_object(payload)?;
    match object.get("percent") {
        Some(JsonValue::Number(n)) => n
            .as_f64()
            .ok_or_else(|| Error::InvalidPayload(format!("percent is not a float: {}", n))),
        Some(other) => Err(Error::InvalidPayload(format!(
            "percent must be a number, got {}",
            json_kind(other)
        ))),
        None => Err(Error::InvalidPayload("missing field: percent".to_string())),
    }
}

pub fn parse_color_patch(payload: &[u8]) -> Result<ColorPatch> {
    let object = parse_object(payload)?;
    Ok(serde_json::from_value(JsonValue::Object(object))?)
}

pub fn parse_color_list(payload: &[u8]) -> Result<Vec<Color>> {
    match parse_json(payload)? {
        list @ JsonValue::Array(_) => {
            let colors: Vec<WireColor> = serde_json::from_value(list)?;
            Ok(colors.into_iter().map(Color::from).collect())
        }
        other => Err(Error::InvalidPayload(format!(
            "expected array of [r, g, b], got {}",
            json_kind(&other)
        ))),
    }
}

pub fn parse_single_write(payload: &[u8]) -> Result<SingleWrite> {
    let object = parse_object(payload)?;
    let wire: SingleWriteWire = serde_json::from_value(JsonValue::Object(object))?;
    Ok(SingleWrite {
        index: wire.index,
        color: wire.color.into(),
    })
}

pub fn parse_broadcast(payload: &[u8]) -> Result<Color> {
    let object = parse_object(payload)?;
    let wire: BroadcastWire = serde_json::from_value(JsonValue::Object(object))?;
    Ok(wire.color.into())
}

pub fn servo_state(percent: f32) -> Vec<u8> {
    serde_json::to_vec(&ServoState { percent }).unwrap_or_default()
}

pub fn color_state(color: Color) -> Vec<u8> {
    serde_json::to_vec(&color).unwrap_or_default()
}

pub fn strip_state(colors: &[Color]) -> Vec<u8> {
    let triples: Vec<[u8; 3]> = colors.iter().map(|c| c.to_triple()).collect();
    serde_json::to_vec(&triples).unwrap_or_default()
}
